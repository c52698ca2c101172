//! Grouping and rounding over billable transactions.
//!
//! Sums are kept as exact decimals and only rounded when a report row is produced. Ordering
//! uses the unrounded totals.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use super::period::Period;
use crate::api::models::cost_tracking::{CostByAgent, CostByAgentAndPeriod, CostByPeriod, CostSummary, WindowTotals};
use crate::db::models::transactions::BillableTransaction;

/// Decimal places reported for every USD figure
pub const COST_DECIMALS: u32 = 6;

/// Round half to even, matching the reporting pipeline the dashboards were built against
pub fn round_cost(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(COST_DECIMALS, RoundingStrategy::MidpointNearestEven)
        .to_f64()
        .unwrap_or_default()
}

#[derive(Debug, Default)]
struct Accumulator {
    cost: Decimal,
    transactions: u64,
    input_tokens: i64,
    agents: BTreeSet<String>,
    users: BTreeSet<String>,
    models: BTreeSet<String>,
    providers: BTreeSet<String>,
}

impl Accumulator {
    fn add(&mut self, tx: &BillableTransaction) {
        self.cost += tx.cost_usd;
        self.transactions += 1;
        self.input_tokens = self.input_tokens.saturating_add(tx.input_tokens());
        if let Some(agent) = tx.agent() {
            self.agents.insert(agent.to_string());
        }
        self.users.insert(tx.user_id.clone());
        if let Some(model) = &tx.model {
            self.models.insert(model.clone());
        }
        if let Some(provider) = &tx.provider {
            self.providers.insert(provider.clone());
        }
    }

    fn average_cost(&self) -> f64 {
        if self.transactions == 0 {
            return 0.0;
        }
        round_cost(self.cost / Decimal::from(self.transactions))
    }
}

fn accumulate<'a>(rows: impl IntoIterator<Item = &'a BillableTransaction>) -> Accumulator {
    let mut acc = Accumulator::default();
    for tx in rows {
        acc.add(tx);
    }
    acc
}

/// Cost and count over `rows`
pub fn window_totals(rows: &[BillableTransaction]) -> WindowTotals {
    let acc = accumulate(rows);
    WindowTotals {
        total_cost: round_cost(acc.cost),
        total_transactions: acc.transactions,
    }
}

/// Full-window part of the summary. Trailing windows are left zeroed for the caller to fill.
pub fn summarize(rows: &[BillableTransaction]) -> CostSummary {
    let acc = accumulate(rows);
    CostSummary {
        total_cost: round_cost(acc.cost),
        total_transactions: acc.transactions,
        unique_agents: acc.agents.len() as u64,
        unique_users: acc.users.len() as u64,
        ..Default::default()
    }
}

/// One row per non-empty agent id, most expensive first (ties by id). Names are not resolved.
pub fn group_by_agent(rows: &[BillableTransaction]) -> Vec<CostByAgent> {
    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();
    for tx in rows {
        if let Some(agent) = tx.agent() {
            groups.entry(agent).or_default().add(tx);
        }
    }

    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|(a_id, a), (b_id, b)| b.cost.cmp(&a.cost).then_with(|| a_id.cmp(b_id)));

    groups
        .into_iter()
        .map(|(agent_id, acc)| CostByAgent {
            agent_id: agent_id.to_string(),
            agent_name: None,
            total_cost: round_cost(acc.cost),
            total_transactions: acc.transactions,
            total_input_tokens: acc.input_tokens,
            avg_cost_per_transaction: acc.average_cost(),
            models: acc.models.into_iter().collect(),
            providers: acc.providers.into_iter().collect(),
        })
        .collect()
}

/// One row per bucket in ascending label order.
///
/// With `agent_filtered` the report describes a single logical agent, so `agentCount` is 1.
pub fn group_by_period(rows: &[BillableTransaction], period: Period, agent_filtered: bool) -> Vec<CostByPeriod> {
    let mut buckets: BTreeMap<String, Accumulator> = BTreeMap::new();
    for tx in rows {
        buckets.entry(period.label(&tx.created_at)).or_default().add(tx);
    }

    buckets
        .into_iter()
        .map(|(label, acc)| CostByPeriod {
            period: label,
            total_cost: round_cost(acc.cost),
            total_transactions: acc.transactions,
            total_input_tokens: acc.input_tokens,
            agent_count: if agent_filtered { 1 } else { acc.agents.len() as u64 },
            model_count: acc.models.len() as u64,
        })
        .collect()
}

/// One row per (agent, bucket); period ascending, then cost descending, then agent id.
pub fn group_by_agent_and_period(rows: &[BillableTransaction], period: Period) -> Vec<CostByAgentAndPeriod> {
    let mut groups: BTreeMap<(String, &str), Accumulator> = BTreeMap::new();
    for tx in rows {
        if let Some(agent) = tx.agent() {
            groups.entry((period.label(&tx.created_at), agent)).or_default().add(tx);
        }
    }

    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|((a_period, a_agent), a), ((b_period, b_agent), b)| {
        a_period
            .cmp(b_period)
            .then_with(|| match b.cost.cmp(&a.cost) {
                Ordering::Equal => a_agent.cmp(b_agent),
                other => other,
            })
    });

    groups
        .into_iter()
        .map(|((label, agent_id), acc)| CostByAgentAndPeriod {
            agent_id: agent_id.to_string(),
            period: label,
            total_cost: round_cost(acc.cost),
            total_transactions: acc.transactions,
            total_input_tokens: acc.input_tokens,
        })
        .collect()
}
