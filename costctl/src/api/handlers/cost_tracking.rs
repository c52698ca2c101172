//! HTTP handlers for cost tracking reports.
//!
//! All endpoints are read-only and admin-only. Query validation (period, dates) happens here so
//! a bad request never reaches the store.

use axum::{
    extract::{Query, State},
    response::Json,
};

use crate::{
    AppState,
    api::models::cost_tracking::{
        CostByAgent, CostByAgentAndPeriod, CostByAgentAndPeriodQuery, CostByAgentQuery, CostByPeriod, CostByPeriodQuery,
        CostSummary, CostSummaryQuery, ErrorResponse, parse_agent_filter, parse_period,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    errors::Result,
};

/// Overall spend summary
#[utoipa::path(
    get,
    path = "/cost-tracking/summary",
    tag = "cost-tracking",
    summary = "Cost summary",
    description = "Total billable cost, transaction count, distinct agents and users within the window, \
                   plus trailing 7 and 30 day totals (admin only)",
    params(CostSummaryQuery),
    responses(
        (status = 200, description = "Cost summary", body = CostSummary),
        (status = 400, description = "Malformed date", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden - requires admin role", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = []),
        ("X-Doubleword-User" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_cost_summary(
    State(state): State<AppState>,
    Query(query): Query<CostSummaryQuery>,
    _: RequiresPermission<resource::CostTracking, operation::ReadAll>,
) -> Result<Json<CostSummary>> {
    let window = query.window()?;
    let summary = state.costs.summary(window).await?;
    Ok(Json(summary))
}

/// Spend per agent
#[utoipa::path(
    get,
    path = "/cost-tracking/by-agent",
    tag = "cost-tracking",
    summary = "Cost by agent",
    description = "Billable cost grouped by agent id, most expensive first, with resolved display names. \
                   `agentId` matches a persisted agent id, a case-insensitive fragment of an agent name, \
                   or a raw ephemeral id (admin only)",
    params(CostByAgentQuery),
    responses(
        (status = 200, description = "Per-agent costs", body = Vec<CostByAgent>),
        (status = 400, description = "Malformed date", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden - requires admin role", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = []),
        ("X-Doubleword-User" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_cost_by_agent(
    State(state): State<AppState>,
    Query(query): Query<CostByAgentQuery>,
    _: RequiresPermission<resource::CostTracking, operation::ReadAll>,
) -> Result<Json<Vec<CostByAgent>>> {
    let window = query.window()?;
    let agent = parse_agent_filter(query.agent_id.as_deref());
    let report = state.costs.by_agent(window, agent).await?;
    Ok(Json(report))
}

/// Spend per time bucket
#[utoipa::path(
    get,
    path = "/cost-tracking/by-period",
    tag = "cost-tracking",
    summary = "Cost by period",
    description = "Billable cost bucketed by UTC day, ISO week or month, ascending (admin only)",
    params(CostByPeriodQuery),
    responses(
        (status = 200, description = "Per-period costs", body = Vec<CostByPeriod>),
        (status = 400, description = "Invalid period or malformed date", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden - requires admin role", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = []),
        ("X-Doubleword-User" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_cost_by_period(
    State(state): State<AppState>,
    Query(query): Query<CostByPeriodQuery>,
    _: RequiresPermission<resource::CostTracking, operation::ReadAll>,
) -> Result<Json<Vec<CostByPeriod>>> {
    let period = parse_period(query.period.as_deref())?;
    let window = query.window()?;
    let agent = parse_agent_filter(query.agent_id.as_deref());
    let report = state.costs.by_period(window, period, agent).await?;
    Ok(Json(report))
}

/// Spend per agent and time bucket
#[utoipa::path(
    get,
    path = "/cost-tracking/by-agent-and-period",
    tag = "cost-tracking",
    summary = "Cost by agent and period",
    description = "Billable cost grouped by (agent id, bucket), ordered by bucket then cost descending. \
                   Agent ids are reported raw (admin only)",
    params(CostByAgentAndPeriodQuery),
    responses(
        (status = 200, description = "Per-agent, per-period costs", body = Vec<CostByAgentAndPeriod>),
        (status = 400, description = "Invalid period or malformed date", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden - requires admin role", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = []),
        ("X-Doubleword-User" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_cost_by_agent_and_period(
    State(state): State<AppState>,
    Query(query): Query<CostByAgentAndPeriodQuery>,
    _: RequiresPermission<resource::CostTracking, operation::ReadAll>,
) -> Result<Json<Vec<CostByAgentAndPeriod>>> {
    let period = parse_period(query.period.as_deref())?;
    let window = query.window()?;
    let report = state.costs.by_agent_and_period(window, period).await?;
    Ok(Json(report))
}
