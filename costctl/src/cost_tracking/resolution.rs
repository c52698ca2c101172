//! Best-effort display names for agent ids found on transactions.
//!
//! Persisted agent ids carry a fixed prefix and resolve by direct lookup. Ephemeral ids are
//! minted per session as `<endpoint>__<model>` (optionally followed by `___<sender>`) and are
//! never stored as agents, so they are resolved heuristically:
//!
//! 1. [`Strategy::DirectId`]: persisted ids, looked up by id.
//! 2. [`Strategy::ConversationChain`]: ephemeral id → conversations it appeared in → a
//!    persisted agent recorded on one of those conversations → that agent's name.
//! 3. [`Strategy::ModelMatch`]: the model embedded in the ephemeral id → the first persisted
//!    agent whose current version uses that model.
//!
//! Each strategy only sees the ids the previous ones left unresolved. A failing lookup is
//! logged and skipped; whatever is still unresolved at the end reports its own id.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, instrument, warn};

use crate::db::{errors::Result, handlers::CostStore};
use crate::metrics;
use crate::types::{AgentId, ConversationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectId,
    ConversationChain,
    ModelMatch,
}

const STRATEGIES: [Strategy; 3] = [Strategy::DirectId, Strategy::ConversationChain, Strategy::ModelMatch];

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::DirectId => "direct_id",
            Strategy::ConversationChain => "conversation_chain",
            Strategy::ModelMatch => "model_match",
        }
    }

    fn applies_to(&self, agent_id: &str, persisted_prefix: &str) -> bool {
        match self {
            Strategy::DirectId => is_persisted(agent_id, persisted_prefix),
            Strategy::ConversationChain | Strategy::ModelMatch => !is_persisted(agent_id, persisted_prefix),
        }
    }
}

pub fn is_persisted(agent_id: &str, persisted_prefix: &str) -> bool {
    agent_id.starts_with(persisted_prefix)
}

/// Model embedded in an ephemeral id, if it has one
pub fn ephemeral_model(agent_id: &str) -> Option<&str> {
    let (_endpoint, rest) = agent_id.split_once("__")?;
    let model = rest.split("___").next().unwrap_or(rest);
    (!model.is_empty()).then_some(model)
}

pub struct AgentNameResolver<'a> {
    store: &'a dyn CostStore,
    persisted_prefix: &'a str,
}

impl<'a> AgentNameResolver<'a> {
    pub fn new(store: &'a dyn CostStore, persisted_prefix: &'a str) -> Self {
        Self { store, persisted_prefix }
    }

    /// Map every id in `agent_ids` to a display name. Never fails.
    #[instrument(skip_all, fields(agents = agent_ids.len()))]
    pub async fn resolve(&self, agent_ids: &[AgentId]) -> HashMap<AgentId, String> {
        let mut names: HashMap<AgentId, String> = HashMap::new();

        for strategy in STRATEGIES {
            let pending: Vec<AgentId> = agent_ids
                .iter()
                .filter(|id| !names.contains_key(*id) && strategy.applies_to(id, self.persisted_prefix))
                .cloned()
                .collect();
            if pending.is_empty() {
                continue;
            }

            match self.run(strategy, &pending).await {
                Ok(found) => {
                    debug!(strategy = strategy.as_str(), pending = pending.len(), resolved = found.len(), "Resolved agent names");
                    metrics::record_agent_names_resolved(strategy.as_str(), found.len());
                    for (id, name) in found {
                        if pending.contains(&id) {
                            names.entry(id).or_insert(name);
                        }
                    }
                }
                Err(e) => {
                    metrics::record_agent_name_resolution_failure(strategy.as_str());
                    warn!(strategy = strategy.as_str(), error = %e, "Agent name resolution stage failed, continuing");
                }
            }
        }

        let mut unresolved = 0;
        for id in agent_ids {
            names.entry(id.clone()).or_insert_with(|| {
                unresolved += 1;
                id.clone()
            });
        }
        metrics::record_agent_names_resolved("raw_id", unresolved);

        names
    }

    async fn run(&self, strategy: Strategy, pending: &[AgentId]) -> Result<HashMap<AgentId, String>> {
        match strategy {
            Strategy::DirectId => self.by_direct_id(pending).await,
            Strategy::ConversationChain => self.by_conversation_chain(pending).await,
            Strategy::ModelMatch => self.by_model_match(pending).await,
        }
    }

    async fn by_direct_id(&self, persisted: &[AgentId]) -> Result<HashMap<AgentId, String>> {
        let agents = self.store.agents_by_ids(persisted).await?;
        Ok(agents
            .iter()
            .map(|agent| (agent.id.clone(), agent.display_name().to_string()))
            .collect())
    }

    async fn by_conversation_chain(&self, ephemeral: &[AgentId]) -> Result<HashMap<AgentId, String>> {
        let links = self.store.conversation_links(ephemeral).await?;
        if links.is_empty() {
            return Ok(HashMap::new());
        }

        let conversation_ids: Vec<ConversationId> = links
            .iter()
            .map(|link| link.conversation_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Conversation records take precedence; transactions on the same conversations fill in
        // conversations whose stored agent pointer is missing or still ephemeral.
        let mut conversation_agents: HashMap<ConversationId, AgentId> = HashMap::new();
        match self
            .store
            .conversations_with_persisted_agent(&conversation_ids, self.persisted_prefix)
            .await
        {
            Ok(records) => {
                for link in records {
                    conversation_agents.entry(link.conversation_id).or_insert(link.agent_id);
                }
            }
            Err(e) => warn!(error = %e, "Conversation lookup failed, relying on transactions only"),
        }
        match self
            .store
            .persisted_agents_on_conversations(&conversation_ids, self.persisted_prefix)
            .await
        {
            Ok(seen) => {
                for link in seen {
                    conversation_agents.entry(link.conversation_id).or_insert(link.agent_id);
                }
            }
            Err(e) => warn!(error = %e, "Transaction scan for persisted agents failed, relying on conversations only"),
        }
        if conversation_agents.is_empty() {
            return Ok(HashMap::new());
        }

        let persisted_ids: Vec<AgentId> = conversation_agents.values().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let agents = self.store.agents_by_ids(&persisted_ids).await?;
        let agent_names: HashMap<&str, &str> = agents.iter().map(|agent| (agent.id.as_str(), agent.display_name())).collect();

        let mut names = HashMap::new();
        for link in &links {
            if names.contains_key(&link.agent_id) {
                continue;
            }
            let name = conversation_agents
                .get(&link.conversation_id)
                .and_then(|persisted_id| agent_names.get(persisted_id.as_str()));
            if let Some(name) = name {
                names.insert(link.agent_id.clone(), name.to_string());
            }
        }
        Ok(names)
    }

    async fn by_model_match(&self, ephemeral: &[AgentId]) -> Result<HashMap<AgentId, String>> {
        let mut by_model: HashMap<&str, Option<String>> = HashMap::new();
        let mut names = HashMap::new();

        for id in ephemeral {
            let Some(model) = ephemeral_model(id) else {
                continue;
            };
            if !by_model.contains_key(model) {
                let first = match self.store.agents_by_current_model(model).await {
                    Ok(agents) => agents.first().map(|agent| agent.display_name().to_string()),
                    Err(e) => {
                        warn!(model, error = %e, "Model lookup failed for ephemeral agent");
                        None
                    }
                };
                by_model.insert(model, first);
            }
            if let Some(Some(name)) = by_model.get(model) {
                names.insert(id.clone(), name.clone());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        errors::DbError,
        handlers::{InMemoryCostStore, TransactionFilter},
        models::{
            agents::AgentDBResponse,
            conversations::{ConversationDBResponse, ConversationLink},
            transactions::BillableTransaction,
        },
    };
    use crate::test_utils::{agent, transaction, transaction_in_conversation, ts};
    use async_trait::async_trait;

    const PREFIX: &str = "agent_";

    #[test]
    fn test_ephemeral_model_parsing() {
        assert_eq!(ephemeral_model("openAI__gpt-4o"), Some("gpt-4o"));
        assert_eq!(ephemeral_model("openAI__gpt-4o___user42"), Some("gpt-4o"));
        assert_eq!(ephemeral_model("custom__org/llama-3.1-70b"), Some("org/llama-3.1-70b"));
        assert_eq!(ephemeral_model("ephemeral_X"), None);
        assert_eq!(ephemeral_model("openAI__"), None);
    }

    #[test]
    fn test_persisted_prefix() {
        assert!(is_persisted("agent_abc", PREFIX));
        assert!(!is_persisted("openAI__gpt-4o", PREFIX));
    }

    #[tokio::test]
    async fn test_direct_lookup_and_blank_names() {
        let store = InMemoryCostStore::new();
        store.insert_agent(agent("agent_a", Some("Alpha"), &[])).await;
        store.insert_agent(agent("agent_b", Some(""), &[])).await;

        let names = AgentNameResolver::new(&store, PREFIX)
            .resolve(&["agent_a".to_string(), "agent_b".to_string(), "agent_gone".to_string()])
            .await;
        assert_eq!(names["agent_a"], "Alpha");
        assert_eq!(names["agent_b"], "agent_b");
        assert_eq!(names["agent_gone"], "agent_gone");
    }

    #[tokio::test]
    async fn test_conversation_record_chain() {
        let store = InMemoryCostStore::new();
        store.insert_agent(agent("agent_a", Some("Alpha"), &["gpt-4o"])).await;
        store
            .insert_transaction(transaction_in_conversation("openAI__gpt-4o", "c1", "0.5"))
            .await;
        store
            .insert_conversation(ConversationDBResponse {
                conversation_id: "c1".to_string(),
                agent_id: Some("agent_a".to_string()),
            })
            .await;

        let names = AgentNameResolver::new(&store, PREFIX).resolve(&["openAI__gpt-4o".to_string()]).await;
        assert_eq!(names["openAI__gpt-4o"], "Alpha");
    }

    #[tokio::test]
    async fn test_transactions_supplement_lagging_conversation_pointer() {
        let store = InMemoryCostStore::new();
        store.insert_agent(agent("agent_late", Some("Late Binder"), &[])).await;
        store
            .insert_transaction(transaction_in_conversation("bedrock__claude", "c9", "0.5"))
            .await;
        // The conversation still points at the ephemeral id, a later transaction used a persisted agent
        store
            .insert_conversation(ConversationDBResponse {
                conversation_id: "c9".to_string(),
                agent_id: Some("bedrock__claude".to_string()),
            })
            .await;
        store
            .insert_transaction(transaction_in_conversation("agent_late", "c9", "0.1"))
            .await;

        let names = AgentNameResolver::new(&store, PREFIX).resolve(&["bedrock__claude".to_string()]).await;
        assert_eq!(names["bedrock__claude"], "Late Binder");
    }

    #[tokio::test]
    async fn test_conversation_chain_prefers_earliest_conversation() {
        let store = InMemoryCostStore::new();
        store.insert_agent(agent("agent_first", Some("First Home"), &[])).await;
        store.insert_agent(agent("agent_second", Some("Second Home"), &[])).await;

        let mut later = transaction_in_conversation("web__mixtral", "c_a", "0.2");
        later.created_at = ts("2024-03-09T00:00:00Z");
        let mut earlier = transaction_in_conversation("web__mixtral", "c_z", "0.2");
        earlier.created_at = ts("2024-03-02T00:00:00Z");
        store.insert_transaction(later).await;
        store.insert_transaction(earlier).await;
        for (conversation, owner) in [("c_a", "agent_second"), ("c_z", "agent_first")] {
            store
                .insert_conversation(ConversationDBResponse {
                    conversation_id: conversation.to_string(),
                    agent_id: Some(owner.to_string()),
                })
                .await;
        }

        let names = AgentNameResolver::new(&store, PREFIX).resolve(&["web__mixtral".to_string()]).await;
        assert_eq!(names["web__mixtral"], "First Home");
    }

    #[tokio::test]
    async fn test_model_match_fallback_takes_first_in_store_order() {
        let store = InMemoryCostStore::new();
        store.insert_agent(agent("agent_z", Some("Zed"), &["gpt-4o"])).await;
        store.insert_agent(agent("agent_a", Some("Ace"), &["gpt-4o"])).await;
        store.insert_agent(agent("agent_old", Some("Old"), &["gpt-4o", "gpt-5"])).await;
        store.insert_transaction(transaction("openAI__gpt-4o___u1", "u1", Some("1"), "2024-03-01T00:00:00Z")).await;

        let names = AgentNameResolver::new(&store, PREFIX)
            .resolve(&["openAI__gpt-4o___u1".to_string(), "openAI__unknown-model".to_string()])
            .await;
        assert_eq!(names["openAI__gpt-4o___u1"], "Zed");
        assert_eq!(names["openAI__unknown-model"], "openAI__unknown-model");
    }

    #[tokio::test]
    async fn test_conversation_chain_wins_over_model_match() {
        let store = InMemoryCostStore::new();
        store.insert_agent(agent("agent_model", Some("By Model"), &["gpt-4o"])).await;
        store.insert_agent(agent("agent_conv", Some("By Conversation"), &["claude"])).await;
        store
            .insert_transaction(transaction_in_conversation("openAI__gpt-4o", "c1", "1"))
            .await;
        store
            .insert_conversation(ConversationDBResponse {
                conversation_id: "c1".to_string(),
                agent_id: Some("agent_conv".to_string()),
            })
            .await;

        let names = AgentNameResolver::new(&store, PREFIX).resolve(&["openAI__gpt-4o".to_string()]).await;
        assert_eq!(names["openAI__gpt-4o"], "By Conversation");
    }

    /// Delegates to an in-memory store but fails the selected lookups
    struct FlakyStore {
        inner: InMemoryCostStore,
        fail_links: bool,
        fail_agents: bool,
    }

    fn boom() -> DbError {
        DbError::Other(anyhow::anyhow!("connection reset by peer"))
    }

    #[async_trait]
    impl CostStore for FlakyStore {
        async fn billable_transactions(&self, filter: &TransactionFilter) -> Result<Vec<BillableTransaction>> {
            self.inner.billable_transactions(filter).await
        }

        async fn agents_by_ids(&self, ids: &[AgentId]) -> Result<Vec<AgentDBResponse>> {
            if self.fail_agents {
                return Err(boom());
            }
            self.inner.agents_by_ids(ids).await
        }

        async fn search_agents(&self, needle: &str) -> Result<Vec<AgentDBResponse>> {
            self.inner.search_agents(needle).await
        }

        async fn conversation_links(&self, agent_ids: &[AgentId]) -> Result<Vec<ConversationLink>> {
            if self.fail_links {
                return Err(boom());
            }
            self.inner.conversation_links(agent_ids).await
        }

        async fn conversations_with_persisted_agent(
            &self,
            conversation_ids: &[ConversationId],
            persisted_prefix: &str,
        ) -> Result<Vec<ConversationLink>> {
            self.inner.conversations_with_persisted_agent(conversation_ids, persisted_prefix).await
        }

        async fn persisted_agents_on_conversations(
            &self,
            conversation_ids: &[ConversationId],
            persisted_prefix: &str,
        ) -> Result<Vec<ConversationLink>> {
            self.inner.persisted_agents_on_conversations(conversation_ids, persisted_prefix).await
        }

        async fn agents_by_current_model(&self, model: &str) -> Result<Vec<AgentDBResponse>> {
            self.inner.agents_by_current_model(model).await
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_stage_falls_through_to_next_strategy() {
        let inner = InMemoryCostStore::new();
        inner.insert_agent(agent("agent_m", Some("Model Twin"), &["gpt-4o"])).await;
        let store = FlakyStore {
            inner,
            fail_links: true,
            fail_agents: false,
        };

        let names = AgentNameResolver::new(&store, PREFIX).resolve(&["openAI__gpt-4o".to_string()]).await;
        assert_eq!(names["openAI__gpt-4o"], "Model Twin");
    }

    #[test_log::test(tokio::test)]
    async fn test_all_stages_failing_returns_raw_ids() {
        let store = FlakyStore {
            inner: InMemoryCostStore::new(),
            fail_links: true,
            fail_agents: true,
        };
        let ids = vec!["agent_a".to_string(), "ephemeral_X".to_string()];
        let names = AgentNameResolver::new(&store, PREFIX).resolve(&ids).await;
        assert_eq!(names.len(), 2);
        assert_eq!(names["agent_a"], "agent_a");
        assert_eq!(names["ephemeral_X"], "ephemeral_X");
    }
}
