//! Database models for persisted agents.

use crate::types::AgentId;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// One entry of an agent's version history. Only the model is relevant to cost reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVersion {
    #[serde(default)]
    pub model: Option<String>,
}

/// Database response for a persisted agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentDBResponse {
    pub id: AgentId,
    #[serde(default)]
    pub name: Option<String>,
    /// Ordered oldest first; the last entry is the current version
    #[serde(default = "no_versions")]
    pub versions: Json<Vec<AgentVersion>>,
}

fn no_versions() -> Json<Vec<AgentVersion>> {
    Json(Vec::new())
}

impl AgentDBResponse {
    /// Human-readable label, falling back to the id when the name is blank
    pub fn display_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.id,
        }
    }

    /// Model used by the current (last) version, if any
    pub fn current_model(&self) -> Option<&str> {
        self.versions.last().and_then(|version| version.model.as_deref())
    }
}
