//! In-memory cost store.
//!
//! Holds transactions, agents and conversations in insertion order. It's suitable for tests and
//! for local exploration of a JSON fixture; it has the same filtering semantics as the
//! PostgreSQL store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use super::store::{CostStore, TransactionFilter};
use crate::db::{
    errors::Result,
    models::{
        agents::AgentDBResponse,
        conversations::{ConversationDBResponse, ConversationLink},
        transactions::{BillableTransaction, TransactionDBResponse},
    },
};
use crate::types::{AgentId, ConversationId};

/// Contents of a fixture file, see `fixtures/sample.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostFixtures {
    pub transactions: Vec<TransactionDBResponse>,
    pub agents: Vec<AgentDBResponse>,
    pub conversations: Vec<ConversationDBResponse>,
}

#[derive(Debug, Default)]
struct Tables {
    transactions: Vec<TransactionDBResponse>,
    agents: Vec<AgentDBResponse>,
    conversations: Vec<ConversationDBResponse>,
}

/// In-memory implementation of [`CostStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCostStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryCostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixtures(fixtures: CostFixtures) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables {
                transactions: fixtures.transactions,
                agents: fixtures.agents,
                conversations: fixtures.conversations,
            })),
        }
    }

    /// Load a JSON fixture file
    pub async fn from_fixture_file(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading cost fixtures from {}", path.display()))?;
        let fixtures: CostFixtures =
            serde_json::from_str(&raw).with_context(|| format!("parsing cost fixtures from {}", path.display()))?;
        info!(
            transactions = fixtures.transactions.len(),
            agents = fixtures.agents.len(),
            conversations = fixtures.conversations.len(),
            "Loaded cost fixtures from {}",
            path.display()
        );
        Ok(Self::from_fixtures(fixtures))
    }

    pub async fn insert_transaction(&self, transaction: TransactionDBResponse) {
        self.tables.write().await.transactions.push(transaction);
    }

    pub async fn insert_agent(&self, agent: AgentDBResponse) {
        self.tables.write().await.agents.push(agent);
    }

    pub async fn insert_conversation(&self, conversation: ConversationDBResponse) {
        self.tables.write().await.conversations.push(conversation);
    }
}

fn sorted_by_id(mut agents: Vec<AgentDBResponse>) -> Vec<AgentDBResponse> {
    agents.sort_by(|a, b| a.id.cmp(&b.id));
    agents
}

/// Distinct (agent, conversation) pairs on transactions accepted by `keep`, ordered by their
/// earliest transaction like the PostgreSQL store
fn links_by_first_seen(
    transactions: &[TransactionDBResponse],
    keep: impl Fn(&str, &str) -> bool,
) -> Vec<ConversationLink> {
    let mut first_seen: HashMap<ConversationLink, DateTime<Utc>> = HashMap::new();
    for tx in transactions {
        let (Some(agent_id), Some(conversation_id)) = (tx.agent(), tx.conversation_id.as_deref()) else {
            continue;
        };
        if !keep(agent_id, conversation_id) {
            continue;
        }
        let link = ConversationLink {
            agent_id: agent_id.to_string(),
            conversation_id: conversation_id.to_string(),
        };
        first_seen
            .entry(link)
            .and_modify(|at| *at = (*at).min(tx.created_at))
            .or_insert(tx.created_at);
    }

    let mut links: Vec<_> = first_seen.into_iter().collect();
    links.sort_by(|(a, a_at), (b, b_at)| {
        a_at.cmp(b_at)
            .then_with(|| a.agent_id.cmp(&b.agent_id))
            .then_with(|| a.conversation_id.cmp(&b.conversation_id))
    });
    links.into_iter().map(|(link, _)| link).collect()
}

#[async_trait]
impl CostStore for InMemoryCostStore {
    #[instrument(skip(self), err)]
    async fn billable_transactions(&self, filter: &TransactionFilter) -> Result<Vec<BillableTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .filter_map(BillableTransaction::from_row)
            .filter(|tx| filter.matches(tx))
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn agents_by_ids(&self, ids: &[AgentId]) -> Result<Vec<AgentDBResponse>> {
        let tables = self.tables.read().await;
        let agents = tables.agents.iter().filter(|agent| ids.contains(&agent.id)).cloned().collect();
        Ok(sorted_by_id(agents))
    }

    #[instrument(skip(self), err)]
    async fn search_agents(&self, needle: &str) -> Result<Vec<AgentDBResponse>> {
        let needle_lower = needle.to_lowercase();
        let tables = self.tables.read().await;
        let agents = tables
            .agents
            .iter()
            .filter(|agent| {
                agent.id == needle
                    || agent
                        .name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&needle_lower))
            })
            .cloned()
            .collect();
        Ok(sorted_by_id(agents))
    }

    #[instrument(skip(self), err)]
    async fn conversation_links(&self, agent_ids: &[AgentId]) -> Result<Vec<ConversationLink>> {
        let tables = self.tables.read().await;
        Ok(links_by_first_seen(&tables.transactions, |agent_id, _| {
            agent_ids.iter().any(|id| id == agent_id)
        }))
    }

    #[instrument(skip(self), err)]
    async fn conversations_with_persisted_agent(
        &self,
        conversation_ids: &[ConversationId],
        persisted_prefix: &str,
    ) -> Result<Vec<ConversationLink>> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .iter()
            .filter(|conversation| conversation_ids.contains(&conversation.conversation_id))
            .filter_map(|conversation| {
                let agent_id = conversation.agent_id.as_deref()?;
                agent_id.starts_with(persisted_prefix).then(|| ConversationLink {
                    agent_id: agent_id.to_string(),
                    conversation_id: conversation.conversation_id.clone(),
                })
            })
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn persisted_agents_on_conversations(
        &self,
        conversation_ids: &[ConversationId],
        persisted_prefix: &str,
    ) -> Result<Vec<ConversationLink>> {
        let tables = self.tables.read().await;
        Ok(links_by_first_seen(&tables.transactions, |agent_id, conversation_id| {
            agent_id.starts_with(persisted_prefix) && conversation_ids.iter().any(|id| id == conversation_id)
        }))
    }

    #[instrument(skip(self), err)]
    async fn agents_by_current_model(&self, model: &str) -> Result<Vec<AgentDBResponse>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .iter()
            .filter(|agent| agent.current_model() == Some(model))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::store::AgentFilter;
    use crate::test_utils::{agent, transaction, ts};
    use std::io::Write;

    async fn store() -> InMemoryCostStore {
        let store = InMemoryCostStore::new();
        store
            .insert_transaction(transaction("agent_a", "u1", Some("1.5"), "2024-03-01T10:00:00Z"))
            .await;
        store
            .insert_transaction(transaction("agent_b", "u1", Some("0"), "2024-03-02T10:00:00Z"))
            .await;
        store
            .insert_transaction(transaction("", "u2", Some("2.0"), "2024-03-03T10:00:00Z"))
            .await;
        store
            .insert_transaction(transaction("agent_b", "u2", None, "2024-03-04T10:00:00Z"))
            .await;
        store
            .insert_transaction(transaction("agent_b", "u3", Some("0.25"), "2024-03-05T23:59:59Z"))
            .await;
        store
    }

    #[tokio::test]
    async fn test_billable_excludes_zero_and_missing_costs() {
        let store = store().await;
        let rows = store.billable_transactions(&TransactionFilter::new()).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_window_bounds_are_inclusive() {
        let store = store().await;
        let filter = TransactionFilter::new()
            .with_start(Some(ts("2024-03-01T10:00:00Z")))
            .with_end(Some(ts("2024-03-05T23:59:59Z")));
        let rows = store.billable_transactions(&filter).await.unwrap();
        assert_eq!(rows.len(), 3);

        let filter = TransactionFilter::new().with_start(Some(ts("2024-03-01T10:00:01Z")));
        let rows = store.billable_transactions(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_require_agent_drops_empty_ids() {
        let store = store().await;
        let rows = store
            .billable_transactions(&TransactionFilter::new().require_agent())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.agent().is_some()));
    }

    #[tokio::test]
    async fn test_agent_filters() {
        let store = store().await;
        let exact = TransactionFilter::new().with_agents(AgentFilter::Exact("agent_b".to_string()));
        assert_eq!(store.billable_transactions(&exact).await.unwrap().len(), 1);

        let one_of = TransactionFilter::new().with_agents(AgentFilter::OneOf(vec!["agent_a".to_string(), "agent_b".to_string()]));
        assert_eq!(store.billable_transactions(&one_of).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_agents_by_id_or_name() {
        let store = InMemoryCostStore::new();
        store.insert_agent(agent("agent_2", Some("Support Helper"), &["gpt-4o"])).await;
        store.insert_agent(agent("agent_1", Some("Research Bot"), &["claude"])).await;
        store.insert_agent(agent("agent_3", None, &[])).await;

        let by_name = store.search_agents("HELP").await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, "agent_2");

        let by_id = store.search_agents("agent_3").await.unwrap();
        assert_eq!(by_id.len(), 1);

        // Substring matching is literal, not a pattern
        assert!(store.search_agents("R.search").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agents_by_current_model_keeps_insertion_order() {
        let store = InMemoryCostStore::new();
        store.insert_agent(agent("agent_z", None, &["gpt-4o"])).await;
        store.insert_agent(agent("agent_a", None, &["gpt-4o", "claude"])).await;
        store.insert_agent(agent("agent_m", None, &["claude", "gpt-4o"])).await;

        let matches = store.agents_by_current_model("gpt-4o").await.unwrap();
        let ids: Vec<_> = matches.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["agent_z", "agent_m"]);
    }

    #[tokio::test]
    async fn test_load_fixture_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "transactions": [
                    {{"user_id": "u1", "agent_id": "agent_a", "estimated_cost_usd": 1.25, "raw_amount": -10, "created_at": "2024-01-01T00:00:00Z"}}
                ],
                "agents": [{{"id": "agent_a", "name": "Alpha", "versions": [{{"model": "gpt-4o"}}]}}],
                "conversations": [{{"conversation_id": "c1", "agent_id": "agent_a"}}]
            }}"#
        )
        .unwrap();

        let store = InMemoryCostStore::from_fixture_file(file.path()).await.unwrap();
        let rows = store.billable_transactions(&TransactionFilter::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].input_tokens(), 10);
        let agents = store.agents_by_ids(&["agent_a".to_string()]).await.unwrap();
        assert_eq!(agents[0].current_model(), Some("gpt-4o"));
    }

    fn in_conversation(agent: &str, conversation: &str, at: &str) -> TransactionDBResponse {
        TransactionDBResponse {
            conversation_id: Some(conversation.to_string()),
            ..transaction(agent, "u1", Some("0.1"), at)
        }
    }

    #[tokio::test]
    async fn test_conversation_links_follow_first_transaction() {
        let store = InMemoryCostStore::new();
        // Inserted out of time order; c_late sorts first by id but was used last
        store.insert_transaction(in_conversation("web__gpt-4o", "c_late", "2024-03-05T00:00:00Z")).await;
        store.insert_transaction(in_conversation("web__gpt-4o", "c_zulu", "2024-03-01T00:00:00Z")).await;
        store.insert_transaction(in_conversation("web__gpt-4o", "c_late", "2024-03-06T00:00:00Z")).await;

        let links = store.conversation_links(&["web__gpt-4o".to_string()]).await.unwrap();
        let conversations: Vec<_> = links.iter().map(|l| l.conversation_id.as_str()).collect();
        assert_eq!(conversations, vec!["c_zulu", "c_late"]);
    }

    #[tokio::test]
    async fn test_sample_fixture_loads() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample.json");
        let store = InMemoryCostStore::from_fixture_file(&path).await.unwrap();

        // The zero-cost row is dropped
        let rows = store.billable_transactions(&TransactionFilter::new()).await.unwrap();
        assert_eq!(rows.len(), 7);
        let triage = store.agents_by_ids(&["agent_triage".to_string()]).await.unwrap();
        assert_eq!(triage[0].display_name(), "agent_triage");
    }

    #[tokio::test]
    async fn test_fixture_rejects_unknown_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"projects": []}}"#).unwrap();
        assert!(InMemoryCostStore::from_fixture_file(file.path()).await.is_err());
    }
}
