//! Database models for billing transactions.

use crate::types::{AgentId, ConversationId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A transaction row as written by the billing pipeline.
///
/// Only rows with a strictly positive `estimated_cost_usd` are billable; the store layer returns
/// those as [`BillableTransaction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDBResponse {
    pub user_id: UserId,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub estimated_cost_usd: Option<Decimal>,
    #[serde(default)]
    pub raw_amount: i64,
    pub created_at: DateTime<Utc>,
}

impl TransactionDBResponse {
    /// The positive cost of this transaction, or `None` if it is not billable
    pub fn billable_cost(&self) -> Option<Decimal> {
        self.estimated_cost_usd.filter(|cost| *cost > Decimal::ZERO)
    }

    /// Agent id with empty strings treated as absent
    pub fn agent(&self) -> Option<&str> {
        self.agent_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// A transaction known to carry a positive cost.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BillableTransaction {
    pub user_id: UserId,
    pub conversation_id: Option<ConversationId>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub agent_id: Option<AgentId>,
    pub cost_usd: Decimal,
    pub raw_amount: i64,
    pub created_at: DateTime<Utc>,
}

impl BillableTransaction {
    /// Agent id with empty strings treated as absent
    pub fn agent(&self) -> Option<&str> {
        self.agent_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Token count reported as input tokens; the sign of `raw_amount` is a debit marker
    pub fn input_tokens(&self) -> i64 {
        self.raw_amount.saturating_abs()
    }
}

impl BillableTransaction {
    /// Project a raw row onto its billable form, or `None` if it carries no positive cost
    pub fn from_row(row: &TransactionDBResponse) -> Option<Self> {
        let cost_usd = row.billable_cost()?;
        Some(Self {
            user_id: row.user_id.clone(),
            conversation_id: row.conversation_id.clone(),
            model: row.model.clone(),
            provider: row.provider.clone(),
            agent_id: row.agent_id.clone(),
            cost_usd,
            raw_amount: row.raw_amount,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn row(cost: Option<&str>) -> TransactionDBResponse {
        TransactionDBResponse {
            user_id: "user-1".to_string(),
            conversation_id: None,
            model: Some("gpt-4o".to_string()),
            provider: Some("openai".to_string()),
            agent_id: Some("agent_abc".to_string()),
            estimated_cost_usd: cost.map(dec),
            raw_amount: -120,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_only_positive_costs_are_billable() {
        assert!(BillableTransaction::from_row(&row(Some("0.25"))).is_some());
        assert!(BillableTransaction::from_row(&row(Some("0"))).is_none());
        assert!(BillableTransaction::from_row(&row(Some("-1.5"))).is_none());
        assert!(BillableTransaction::from_row(&row(None)).is_none());
    }

    #[test]
    fn test_input_tokens_are_absolute() {
        let billable = BillableTransaction::from_row(&row(Some("0.25"))).unwrap();
        assert_eq!(billable.input_tokens(), 120);
    }

    #[test]
    fn test_empty_agent_id_is_absent() {
        let mut r = row(Some("1"));
        r.agent_id = Some(String::new());
        assert_eq!(r.agent(), None);
    }
}
