//! Database record structures matching the cost tracking tables.

pub mod agents;
pub mod conversations;
pub mod transactions;
