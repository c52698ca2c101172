//! Cost tracking report API types
//!
//! Field names follow the dashboard client: agent identifiers are snake_case (`agent_id`,
//! `agent_name`), every other field is camelCase.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::cost_tracking::{DateWindow, Period};
use crate::errors::Error;
use crate::types::AgentId;

pub const INVALID_PERIOD_MESSAGE: &str = "Invalid period. Must be: day, week, or month";

/// Query parameters for the summary report
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CostSummaryQuery {
    /// Inclusive lower bound, `YYYY-MM-DD` or RFC 3339
    pub start_date: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD` (whole day) or RFC 3339
    pub end_date: Option<String>,
}

/// Query parameters for the per-agent report
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CostByAgentQuery {
    /// Persisted agent id, a case-insensitive fragment of an agent name, or a raw ephemeral id
    pub agent_id: Option<String>,
    /// Inclusive lower bound, `YYYY-MM-DD` or RFC 3339
    pub start_date: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD` (whole day) or RFC 3339
    pub end_date: Option<String>,
}

/// Query parameters for the per-period report
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CostByPeriodQuery {
    /// Bucket size: `day`, `week` or `month`
    pub period: Option<String>,
    /// Persisted agent id, a case-insensitive fragment of an agent name, or a raw ephemeral id
    pub agent_id: Option<String>,
    /// Inclusive lower bound, `YYYY-MM-DD` or RFC 3339
    pub start_date: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD` (whole day) or RFC 3339
    pub end_date: Option<String>,
}

/// Query parameters for the agent by period report
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CostByAgentAndPeriodQuery {
    /// Bucket size: `day`, `week` or `month`
    pub period: Option<String>,
    /// Inclusive lower bound, `YYYY-MM-DD` or RFC 3339
    pub start_date: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD` (whole day) or RFC 3339
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bound(name: &str, raw: &str, bound: Bound) -> Result<DateTime<Utc>, Error> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = match bound {
            Bound::Start => date.and_hms_opt(0, 0, 0),
            Bound::End => date.and_hms_nano_opt(23, 59, 59, 999_999_999),
        };
        return time.map(|t| t.and_utc()).ok_or_else(|| Error::BadRequest {
            message: format!("Invalid {name}: {raw}"),
        });
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::BadRequest {
            message: format!("Invalid {name}: {raw}. Expected YYYY-MM-DD or an RFC 3339 timestamp"),
        })
}

/// Parse the optional `startDate`/`endDate` pair into an inclusive window
pub fn parse_window(start_date: Option<&str>, end_date: Option<&str>) -> Result<DateWindow, Error> {
    let start = non_empty(start_date)
        .map(|raw| parse_bound("startDate", raw, Bound::Start))
        .transpose()?;
    let end = non_empty(end_date).map(|raw| parse_bound("endDate", raw, Bound::End)).transpose()?;

    if let (Some(start), Some(end)) = (start, end)
        && start > end
    {
        return Err(Error::BadRequest {
            message: "startDate must not be after endDate".to_string(),
        });
    }

    Ok(DateWindow { start, end })
}

/// Parse a required `period` parameter; unlike the service default, absence is an error here
pub fn parse_period(period: Option<&str>) -> Result<Period, Error> {
    non_empty(period)
        .and_then(|p| p.parse::<Period>().ok())
        .ok_or_else(|| Error::BadRequest {
            message: INVALID_PERIOD_MESSAGE.to_string(),
        })
}

/// Empty agent filters are treated as absent
pub fn parse_agent_filter(agent_id: Option<&str>) -> Option<&str> {
    non_empty(agent_id)
}

impl CostSummaryQuery {
    pub fn window(&self) -> Result<DateWindow, Error> {
        parse_window(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

impl CostByAgentQuery {
    pub fn window(&self) -> Result<DateWindow, Error> {
        parse_window(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

impl CostByPeriodQuery {
    pub fn window(&self) -> Result<DateWindow, Error> {
        parse_window(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

impl CostByAgentAndPeriodQuery {
    pub fn window(&self) -> Result<DateWindow, Error> {
        parse_window(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

/// Cost and count over one trailing window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WindowTotals {
    /// USD, rounded to 6 decimal places
    pub total_cost: f64,
    pub total_transactions: u64,
}

/// Totals over the requested window plus trailing 7 and 30 day slices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    /// USD, rounded to 6 decimal places
    pub total_cost: f64,
    pub total_transactions: u64,
    /// Distinct non-empty agent ids
    pub unique_agents: u64,
    pub unique_users: u64,
    #[serde(rename = "last7Days")]
    pub last_7_days: WindowTotals,
    #[serde(rename = "last30Days")]
    pub last_30_days: WindowTotals,
}

/// Cost attributed to a single agent id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostByAgent {
    #[serde(rename = "agent_id")]
    pub agent_id: AgentId,
    /// Resolved display name; the raw id when nothing better is known. Omitted when name
    /// resolution is disabled.
    #[serde(rename = "agent_name", default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub total_cost: f64,
    pub total_transactions: u64,
    /// Sum of absolute token counts
    pub total_input_tokens: i64,
    pub avg_cost_per_transaction: f64,
    /// Distinct models, sorted
    pub models: Vec<String>,
    /// Distinct providers, sorted
    pub providers: Vec<String>,
}

/// Cost within one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostByPeriod {
    /// Bucket label: `YYYY-MM-DD`, `YYYY-Www` or `YYYY-MM`
    pub period: String,
    pub total_cost: f64,
    pub total_transactions: u64,
    pub total_input_tokens: i64,
    /// 1 when the report is filtered to an agent
    pub agent_count: u64,
    pub model_count: u64,
}

/// Cost of one agent within one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostByAgentAndPeriod {
    #[serde(rename = "agent_id")]
    pub agent_id: AgentId,
    pub period: String,
    pub total_cost: f64,
    pub total_transactions: u64,
    pub total_input_tokens: i64,
}

/// Body returned for every error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ts;

    #[test]
    fn test_date_only_end_covers_whole_day() {
        let window = parse_window(Some("2024-03-01"), Some("2024-03-01")).unwrap();
        assert_eq!(window.start, Some(ts("2024-03-01T00:00:00Z")));
        let end = window.end.unwrap();
        assert!(end > ts("2024-03-01T23:59:59Z"));
        assert!(end < ts("2024-03-02T00:00:00Z"));
    }

    #[test]
    fn test_rfc3339_bounds_are_normalized_to_utc() {
        let window = parse_window(Some("2024-03-01T02:00:00+02:00"), None).unwrap();
        assert_eq!(window.start, Some(ts("2024-03-01T00:00:00Z")));
        assert_eq!(window.end, None);
    }

    #[test]
    fn test_malformed_dates_are_rejected() {
        for bad in ["2024-13-01", "yesterday", "2024/03/01", "2024-02-30"] {
            let err = parse_window(Some(bad), None).unwrap_err();
            assert!(matches!(err, Error::BadRequest { .. }), "{bad} should be rejected");
        }
        assert!(parse_window(None, Some("not-a-date")).is_err());
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        assert!(parse_window(Some("2024-03-02"), Some("2024-03-01")).is_err());
    }

    #[test]
    fn test_blank_params_are_absent() {
        let window = parse_window(Some(""), Some("  ")).unwrap();
        assert_eq!(window, DateWindow::default());
        assert_eq!(parse_agent_filter(Some("")), None);
        assert_eq!(parse_agent_filter(Some("agent_x")), Some("agent_x"));
    }

    #[test]
    fn test_period_is_required_and_validated() {
        assert_eq!(parse_period(Some("week")).unwrap(), Period::Week);
        for bad in [None, Some(""), Some("year"), Some("Day ")] {
            match parse_period(bad) {
                Err(Error::BadRequest { message }) => assert_eq!(message, INVALID_PERIOD_MESSAGE),
                other => panic!("expected bad request for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_wire_field_names() {
        let summary = serde_json::to_value(CostSummary::default()).unwrap();
        for key in ["totalCost", "totalTransactions", "uniqueAgents", "uniqueUsers", "last7Days", "last30Days"] {
            assert!(summary.get(key).is_some(), "missing {key}");
        }

        let by_agent = serde_json::to_value(CostByAgent {
            agent_id: "agent_a".to_string(),
            agent_name: Some("Alpha".to_string()),
            total_cost: 1.0,
            total_transactions: 1,
            total_input_tokens: 10,
            avg_cost_per_transaction: 1.0,
            models: vec![],
            providers: vec![],
        })
        .unwrap();
        for key in ["agent_id", "agent_name", "totalInputTokens", "avgCostPerTransaction"] {
            assert!(by_agent.get(key).is_some(), "missing {key}");
        }
    }
}
