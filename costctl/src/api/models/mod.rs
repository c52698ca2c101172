//! API request and response data models.
//!
//! These structures define the public API contract and are annotated with `utoipa` for the
//! generated OpenAPI document. Query structs keep dates and periods as strings so that
//! validation errors can be reported with the messages clients expect, rather than the
//! extractor's generic rejection text.
//!
//! - [`cost_tracking`]: Report queries and responses
//! - [`users`]: Caller identity and roles

pub mod cost_tracking;
pub mod users;
