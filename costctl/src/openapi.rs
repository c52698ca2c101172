//! OpenAPI documentation for the admin API at `/admin/api/v1/*`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Security schemes matching the authentication methods in [`crate::auth`].
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Session token signed with the service secret key"))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "costctl_session",
                    "Session token in a cookie (name configurable via auth.native.session.cookie_name)",
                ))),
            );
            components.security_schemes.insert(
                "X-Doubleword-User".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-doubleword-user",
                    "Identity set by a trusted upstream proxy; roles are read from x-doubleword-roles",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "costctl admin API",
        description = "Cost tracking reports over billing transactions"
    ),
    servers(
        (url = "/admin/api/v1", description = "Admin API server")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::cost_tracking::get_cost_summary,
        api::handlers::cost_tracking::get_cost_by_agent,
        api::handlers::cost_tracking::get_cost_by_period,
        api::handlers::cost_tracking::get_cost_by_agent_and_period,
    ),
    components(schemas(
        api::models::cost_tracking::CostSummary,
        api::models::cost_tracking::WindowTotals,
        api::models::cost_tracking::CostByAgent,
        api::models::cost_tracking::CostByPeriod,
        api::models::cost_tracking::CostByAgentAndPeriod,
        api::models::cost_tracking::ErrorResponse,
        crate::cost_tracking::Period,
    )),
    tags(
        (name = "cost-tracking", description = "Billable cost reports by agent and period"),
    )
)]
pub struct AdminApiDoc;
