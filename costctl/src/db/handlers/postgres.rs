//! PostgreSQL cost store.
//!
//! Billable filtering happens in SQL (`estimated_cost_usd > 0`, which also drops NULL costs);
//! grouping happens in the aggregator so that every store shares one set of report semantics.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::store::{AgentFilter, CostStore, TransactionFilter};
use crate::db::{
    errors::Result,
    models::{agents::AgentDBResponse, conversations::ConversationLink, transactions::BillableTransaction},
};
use crate::types::{AgentId, ConversationId};

#[derive(Debug, Clone)]
pub struct PgCostStore {
    pool: PgPool,
}

impl PgCostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends the WHERE clauses for `filter` to a query that already has a WHERE
fn push_transaction_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    if let Some(start) = filter.start {
        query.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        query.push(" AND created_at <= ").push_bind(end);
    }
    if filter.require_agent {
        query.push(" AND agent_id IS NOT NULL AND agent_id <> ''");
    }
    match &filter.agents {
        AgentFilter::Any => {}
        AgentFilter::Exact(agent_id) => {
            query.push(" AND agent_id = ").push_bind(agent_id.clone());
        }
        AgentFilter::OneOf(agent_ids) => {
            query.push(" AND agent_id = ANY(").push_bind(agent_ids.clone()).push(")");
        }
    }
}

#[async_trait]
impl CostStore for PgCostStore {
    #[instrument(skip(self), err)]
    async fn billable_transactions(&self, filter: &TransactionFilter) -> Result<Vec<BillableTransaction>> {
        let mut query = QueryBuilder::new(
            "SELECT user_id, conversation_id, model, provider, agent_id, estimated_cost_usd AS cost_usd, raw_amount, created_at \
             FROM transactions WHERE estimated_cost_usd > 0",
        );
        push_transaction_filter(&mut query, filter);
        query.push(" ORDER BY created_at ASC");

        let rows = query.build_query_as::<BillableTransaction>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    #[instrument(skip(self), err)]
    async fn agents_by_ids(&self, ids: &[AgentId]) -> Result<Vec<AgentDBResponse>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let agents = sqlx::query_as::<_, AgentDBResponse>("SELECT id, name, versions FROM agents WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(agents)
    }

    #[instrument(skip(self), err)]
    async fn search_agents(&self, needle: &str) -> Result<Vec<AgentDBResponse>> {
        // strpos keeps the match literal; LIKE would treat '_' and '%' in user input as wildcards
        let agents = sqlx::query_as::<_, AgentDBResponse>(
            "SELECT id, name, versions FROM agents \
             WHERE id = $1 OR strpos(lower(coalesce(name, '')), lower($1)) > 0 \
             ORDER BY id",
        )
        .bind(needle)
        .fetch_all(&self.pool)
        .await?;
        Ok(agents)
    }

    #[instrument(skip(self), err)]
    async fn conversation_links(&self, agent_ids: &[AgentId]) -> Result<Vec<ConversationLink>> {
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }
        // Earliest transaction first, matching the in-memory store
        let links = sqlx::query_as::<_, ConversationLink>(
            "SELECT agent_id, conversation_id FROM ( \
                 SELECT agent_id, conversation_id, MIN(created_at) AS first_seen FROM transactions \
                 WHERE agent_id = ANY($1) AND conversation_id IS NOT NULL \
                 GROUP BY agent_id, conversation_id \
             ) seen ORDER BY first_seen, agent_id, conversation_id",
        )
        .bind(agent_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    #[instrument(skip(self), err)]
    async fn conversations_with_persisted_agent(
        &self,
        conversation_ids: &[ConversationId],
        persisted_prefix: &str,
    ) -> Result<Vec<ConversationLink>> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }
        let links = sqlx::query_as::<_, ConversationLink>(
            "SELECT agent_id, conversation_id FROM conversations \
             WHERE conversation_id = ANY($1) AND agent_id IS NOT NULL AND starts_with(agent_id, $2) \
             ORDER BY conversation_id",
        )
        .bind(conversation_ids)
        .bind(persisted_prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    #[instrument(skip(self), err)]
    async fn persisted_agents_on_conversations(
        &self,
        conversation_ids: &[ConversationId],
        persisted_prefix: &str,
    ) -> Result<Vec<ConversationLink>> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }
        // Earliest transaction first, so the first persisted agent seen on a conversation wins
        let links = sqlx::query_as::<_, ConversationLink>(
            "SELECT agent_id, conversation_id FROM ( \
                 SELECT agent_id, conversation_id, MIN(created_at) AS first_seen FROM transactions \
                 WHERE conversation_id = ANY($1) AND agent_id IS NOT NULL AND starts_with(agent_id, $2) \
                 GROUP BY agent_id, conversation_id \
             ) seen ORDER BY first_seen, agent_id",
        )
        .bind(conversation_ids)
        .bind(persisted_prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    #[instrument(skip(self), err)]
    async fn agents_by_current_model(&self, model: &str) -> Result<Vec<AgentDBResponse>> {
        let agents = sqlx::query_as::<_, AgentDBResponse>(
            "SELECT id, name, versions FROM agents \
             WHERE versions -> -1 ->> 'model' = $1 \
             ORDER BY created_at, id",
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await?;
        Ok(agents)
    }
}
