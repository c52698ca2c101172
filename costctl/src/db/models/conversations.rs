//! Database models for conversations and the agent links derived from them.

use crate::types::{AgentId, ConversationId};
use serde::{Deserialize, Serialize};

/// Database response for a conversation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationDBResponse {
    pub conversation_id: ConversationId,
    /// May be persisted or ephemeral, and may lag behind the agent used by later transactions
    #[serde(default)]
    pub agent_id: Option<AgentId>,
}

/// An observed (agent, conversation) pair, from either transactions or conversation records
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct ConversationLink {
    pub agent_id: AgentId,
    pub conversation_id: ConversationId,
}
