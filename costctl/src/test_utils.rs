//! Test fixtures and helpers shared by unit and HTTP tests.

use std::str::FromStr;
use std::sync::Arc;

use axum_test::TestServer;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;

use crate::{
    AppState, Application,
    api::models::users::{CurrentUser, Role},
    auth::session::create_session_token,
    config::{AuthConfig, Config, DatabaseConfig, NativeAuthConfig, ProxyHeaderAuthConfig},
    cost_tracking::CostAggregator,
    db::{
        handlers::{CostStore, InMemoryCostStore},
        models::{
            agents::{AgentDBResponse, AgentVersion},
            transactions::{BillableTransaction, TransactionDBResponse},
        },
    },
};

pub fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).expect("valid RFC 3339 timestamp").with_timezone(&Utc)
}

fn dec(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("valid decimal")
}

/// A transaction row; an empty `agent` is stored as `Some("")` like upstream writers do
pub fn transaction(agent: &str, user: &str, cost: Option<&str>, at: &str) -> TransactionDBResponse {
    TransactionDBResponse {
        user_id: user.to_string(),
        conversation_id: None,
        model: Some("gpt-4o".to_string()),
        provider: Some("openai".to_string()),
        agent_id: Some(agent.to_string()),
        estimated_cost_usd: cost.map(dec),
        raw_amount: -100,
        created_at: ts(at),
    }
}

pub fn transaction_in_conversation(agent: &str, conversation: &str, cost: &str) -> TransactionDBResponse {
    TransactionDBResponse {
        conversation_id: Some(conversation.to_string()),
        ..transaction(agent, "u1", Some(cost), "2024-03-01T00:00:00Z")
    }
}

pub fn agent(id: &str, name: Option<&str>, models: &[&str]) -> AgentDBResponse {
    AgentDBResponse {
        id: id.to_string(),
        name: name.map(str::to_string),
        versions: Json(
            models
                .iter()
                .map(|model| AgentVersion {
                    model: Some(model.to_string()),
                })
                .collect(),
        ),
    }
}

pub fn billable(agent: &str, user: &str, cost: &str, at: &str) -> BillableTransaction {
    BillableTransaction::from_row(&transaction(agent, user, Some(cost), at)).expect("positive cost")
}

/// Two persisted agents and one ephemeral agent with March and April 2024 traffic.
///
/// Within March: five billable rows totalling 7.75 across three agents and three users, plus a
/// zero-cost row and a row with no cost. Two of the billable rows fall in the last 7 days before
/// 2024-03-31T12:00Z and four in the last 30.
pub async fn seeded_store() -> InMemoryCostStore {
    let store = InMemoryCostStore::new();
    store
        .insert_agent(agent("agent_research", Some("Research Assistant"), &["claude-3-5-sonnet"]))
        .await;
    store.insert_agent(agent("agent_support", Some("Support Bot"), &["gpt-4o"])).await;

    for row in [
        transaction("agent_research", "u1", Some("1.50"), "2024-03-01T08:00:00Z"),
        transaction("agent_support", "u2", Some("2.00"), "2024-03-10T09:00:00Z"),
        transaction("openAI__gpt-4o___u3", "u3", Some("0.25"), "2024-03-15T10:00:00Z"),
        transaction("agent_research", "u1", Some("3.00"), "2024-03-26T11:00:00Z"),
        transaction("agent_support", "u2", Some("1.00"), "2024-03-30T12:00:00Z"),
        transaction("agent_support", "u1", Some("0"), "2024-03-12T00:00:00Z"),
        transaction("agent_research", "u2", None, "2024-03-13T00:00:00Z"),
        transaction("agent_support", "u2", Some("4.00"), "2024-04-02T00:00:00Z"),
    ] {
        store.insert_transaction(row).await;
    }
    store
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig::Memory { fixtures: None },
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: AuthConfig {
            native: NativeAuthConfig {
                enabled: true,
                ..Default::default()
            },
            proxy_header: ProxyHeaderAuthConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        },
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

pub fn admin_user() -> CurrentUser {
    CurrentUser {
        id: "admin-1".to_string(),
        email: "admin@example.com".to_string(),
        roles: vec![Role::Admin],
    }
}

pub fn standard_user() -> CurrentUser {
    CurrentUser {
        id: "user-1".to_string(),
        email: "user@example.com".to_string(),
        roles: vec![Role::User],
    }
}

/// Bearer session token for [`admin_user`] signed with the [`create_test_config`] secret
pub fn admin_headers() -> Vec<(String, String)> {
    let token = create_session_token(&admin_user(), &create_test_config()).expect("test token");
    vec![("authorization".to_string(), format!("Bearer {token}"))]
}

/// Proxy headers for [`standard_user`]
pub fn standard_user_headers() -> Vec<(String, String)> {
    let proxy = ProxyHeaderAuthConfig::default();
    let user = standard_user();
    vec![
        (proxy.header_name, user.id),
        (proxy.email_header_name, user.email),
        (proxy.roles_header_name, "user".to_string()),
    ]
}

pub fn test_state(config: Config) -> AppState {
    let costs = CostAggregator::new(Arc::new(InMemoryCostStore::new()), config.cost_tracking.clone());
    AppState::builder().config(config).costs(costs).build()
}

pub fn create_test_app_with_store(config: Config, store: Arc<dyn CostStore>) -> TestServer {
    Application::with_store(config, store)
        .expect("Failed to create application")
        .into_test_server()
}

pub fn create_test_app(store: InMemoryCostStore) -> TestServer {
    create_test_app_with_store(create_test_config(), Arc::new(store))
}
