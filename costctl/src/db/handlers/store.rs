//! The read-only store interface the cost reports are computed from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{
    errors::Result,
    models::{agents::AgentDBResponse, conversations::ConversationLink, transactions::BillableTransaction},
};
use crate::types::{AgentId, ConversationId};

/// Restriction on the `agent_id` column of billable transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AgentFilter {
    #[default]
    Any,
    /// Exact string match, used for ids that matched no persisted agent
    Exact(AgentId),
    /// Any of the given persisted agent ids
    OneOf(Vec<AgentId>),
}

impl AgentFilter {
    pub fn is_active(&self) -> bool {
        !matches!(self, AgentFilter::Any)
    }

    pub fn matches(&self, agent_id: Option<&str>) -> bool {
        match self {
            AgentFilter::Any => true,
            AgentFilter::Exact(id) => agent_id == Some(id.as_str()),
            AgentFilter::OneOf(ids) => agent_id.is_some_and(|agent_id| ids.iter().any(|id| id == agent_id)),
        }
    }
}

/// Filter for billable transaction queries. Time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub agents: AgentFilter,
    /// Drop rows with no (or an empty) `agent_id`
    pub require_agent: bool,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, start: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self
    }

    pub fn with_end(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.end = end;
        self
    }

    pub fn with_agents(mut self, agents: AgentFilter) -> Self {
        self.agents = agents;
        self
    }

    pub fn require_agent(mut self) -> Self {
        self.require_agent = true;
        self
    }

    pub fn matches(&self, tx: &BillableTransaction) -> bool {
        self.start.is_none_or(|start| tx.created_at >= start)
            && self.end.is_none_or(|end| tx.created_at <= end)
            && (!self.require_agent || tx.agent().is_some())
            && self.agents.matches(tx.agent())
    }
}

/// Read access to transactions, agents and conversations.
///
/// Every method is a plain read; implementations never mutate state. Results that feed name
/// resolution are returned in a stable order so that "first match" tie-breaks are reproducible.
#[async_trait]
pub trait CostStore: Send + Sync {
    /// Transactions with a strictly positive cost that match `filter`
    async fn billable_transactions(&self, filter: &TransactionFilter) -> Result<Vec<BillableTransaction>>;

    /// Persisted agents with the given ids, in id order
    async fn agents_by_ids(&self, ids: &[AgentId]) -> Result<Vec<AgentDBResponse>>;

    /// Persisted agents whose id equals `needle` or whose name contains it (case-insensitive)
    async fn search_agents(&self, needle: &str) -> Result<Vec<AgentDBResponse>>;

    /// Distinct (agent, conversation) pairs seen on transactions for the given agent ids
    async fn conversation_links(&self, agent_ids: &[AgentId]) -> Result<Vec<ConversationLink>>;

    /// Conversation records among `conversation_ids` whose agent id starts with `persisted_prefix`
    async fn conversations_with_persisted_agent(
        &self,
        conversation_ids: &[ConversationId],
        persisted_prefix: &str,
    ) -> Result<Vec<ConversationLink>>;

    /// Distinct persisted agent ids seen on transactions in the given conversations
    async fn persisted_agents_on_conversations(
        &self,
        conversation_ids: &[ConversationId],
        persisted_prefix: &str,
    ) -> Result<Vec<ConversationLink>>;

    /// Persisted agents whose current version uses `model`, in store order
    async fn agents_by_current_model(&self, model: &str) -> Result<Vec<AgentDBResponse>>;
}
