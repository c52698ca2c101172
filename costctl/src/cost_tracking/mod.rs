//! Cost aggregation over billing transactions.
//!
//! [`CostAggregator`] answers the four report queries. Each report reads billable
//! transactions (strictly positive `estimated_cost_usd`) from a [`CostStore`] and groups them
//! in memory, so the PostgreSQL and in-memory stores produce identical output.
//!
//! Top-level reads either fully succeed or fail with the store error. Agent-name resolution in
//! [`CostAggregator::by_agent`] is the exception: it is best effort, bounded by
//! `cost_tracking.name_resolution_timeout`, and falls back to raw ids rather than failing the
//! report.

pub mod aggregate;
pub mod period;
pub mod resolution;
mod window;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

pub use period::Period;
pub use resolution::AgentNameResolver;
pub use window::DateWindow;

use crate::api::models::cost_tracking::{CostByAgent, CostByAgentAndPeriod, CostByPeriod, CostSummary};
use crate::config::CostTrackingConfig;
use crate::db::{
    errors::Result,
    handlers::{AgentFilter, CostStore},
};
use crate::metrics;
use crate::types::AgentId;

#[derive(Clone)]
pub struct CostAggregator {
    store: Arc<dyn CostStore>,
    settings: CostTrackingConfig,
}

impl CostAggregator {
    pub fn new(store: Arc<dyn CostStore>, settings: CostTrackingConfig) -> Self {
        Self { store, settings }
    }

    /// Totals for `window`, plus trailing 7 and 30 day slices measured from now.
    pub async fn summary(&self, window: DateWindow) -> Result<CostSummary> {
        self.summary_at(window, Utc::now()).await
    }

    /// [`summary`](Self::summary) with an explicit "now"
    #[instrument(skip(self), err)]
    pub async fn summary_at(&self, window: DateWindow, now: DateTime<Utc>) -> Result<CostSummary> {
        let started = Instant::now();

        let full = window.filter();
        let last_7 = window.trailing(now, 7).filter();
        let last_30 = window.trailing(now, 30).filter();

        let (all_rows, rows_7, rows_30) = tokio::try_join!(
            self.store.billable_transactions(&full),
            self.store.billable_transactions(&last_7),
            self.store.billable_transactions(&last_30),
        )?;

        let mut summary = aggregate::summarize(&all_rows);
        summary.last_7_days = aggregate::window_totals(&rows_7);
        summary.last_30_days = aggregate::window_totals(&rows_30);

        metrics::record_report_duration("summary", started.elapsed().as_secs_f64());
        Ok(summary)
    }

    /// Per-agent totals, most expensive first, with resolved display names.
    #[instrument(skip(self), err)]
    pub async fn by_agent(&self, window: DateWindow, agent: Option<&str>) -> Result<Vec<CostByAgent>> {
        let started = Instant::now();

        let agents = self.agent_filter(agent).await?;
        let rows = self
            .store
            .billable_transactions(&window.filter().with_agents(agents).require_agent())
            .await?;
        let mut report = aggregate::group_by_agent(&rows);

        if self.settings.resolve_agent_names && !report.is_empty() {
            let ids: Vec<AgentId> = report.iter().map(|row| row.agent_id.clone()).collect();
            let names = self.agent_names(&ids).await;
            for row in &mut report {
                row.agent_name = Some(names.get(&row.agent_id).cloned().unwrap_or_else(|| row.agent_id.clone()));
            }
        }

        metrics::record_report_duration("by_agent", started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Totals per time bucket, ascending.
    #[instrument(skip(self), err)]
    pub async fn by_period(&self, window: DateWindow, period: Period, agent: Option<&str>) -> Result<Vec<CostByPeriod>> {
        let started = Instant::now();

        let agents = self.agent_filter(agent).await?;
        let agent_filtered = agents.is_active();
        let rows = self.store.billable_transactions(&window.filter().with_agents(agents)).await?;
        let report = aggregate::group_by_period(&rows, period, agent_filtered);

        metrics::record_report_duration("by_period", started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Totals per (agent, bucket). Agent ids are reported raw.
    #[instrument(skip(self), err)]
    pub async fn by_agent_and_period(&self, window: DateWindow, period: Period) -> Result<Vec<CostByAgentAndPeriod>> {
        let started = Instant::now();

        let rows = self.store.billable_transactions(&window.filter().require_agent()).await?;
        let report = aggregate::group_by_agent_and_period(&rows, period);

        metrics::record_report_duration("by_agent_and_period", started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Turn a caller-supplied agent filter into a store filter.
    ///
    /// Persisted agents matching by exact id or by case-insensitive name fragment widen the
    /// filter to all of them; with no match the value is compared verbatim against `agent_id`,
    /// which is how ephemeral ids are selected.
    #[instrument(skip(self), err)]
    pub async fn resolve_agent_filter(&self, agent: &str) -> Result<AgentFilter> {
        let matches = self.store.search_agents(agent).await?;
        if matches.is_empty() {
            debug!("No persisted agent matched, filtering on the raw agent id");
            return Ok(AgentFilter::Exact(agent.to_string()));
        }
        Ok(AgentFilter::OneOf(matches.into_iter().map(|agent| agent.id).collect()))
    }

    async fn agent_filter(&self, agent: Option<&str>) -> Result<AgentFilter> {
        match agent {
            Some(agent) => self.resolve_agent_filter(agent).await,
            None => Ok(AgentFilter::Any),
        }
    }

    async fn agent_names(&self, ids: &[AgentId]) -> HashMap<AgentId, String> {
        let resolver = AgentNameResolver::new(self.store.as_ref(), &self.settings.persisted_agent_prefix);
        match tokio::time::timeout(self.settings.name_resolution_timeout, resolver.resolve(ids)).await {
            Ok(names) => names,
            Err(_) => {
                metrics::record_agent_name_resolution_failure("timeout");
                warn!(
                    timeout = ?self.settings.name_resolution_timeout,
                    agents = ids.len(),
                    "Agent name resolution timed out, reporting raw ids"
                );
                HashMap::new()
            }
        }
    }
}
