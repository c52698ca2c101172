//! Store implementations for cost data.
//!
//! # Available Stores
//!
//! - [`PgCostStore`]: PostgreSQL, used in production
//! - [`InMemoryCostStore`]: In-process tables, used by tests and fixture-backed local runs
//!
//! Both implement [`CostStore`], the read interface the aggregator is written against.

pub mod in_memory;
pub mod postgres;
pub mod store;

pub use in_memory::{CostFixtures, InMemoryCostStore};
pub use postgres::PgCostStore;
pub use store::{AgentFilter, CostStore, TransactionFilter};
