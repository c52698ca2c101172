//! Data access layer for billing transactions, agents and conversations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Aggregator   │  (cost_tracking - grouping, rounding, name resolution)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │  CostStore   │  (db::handlers - read queries, Postgres or in-memory)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │   Models     │  (db::models - database records)
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: The [`handlers::CostStore`] trait and its implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! The store is strictly read-only. Rows are written by the billing pipeline that owns these
//! tables; this crate only ships the schema so that it can run against an empty database.

pub mod errors;
pub mod handlers;
pub mod models;
