//! REST API for cost reports.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Query parameters and response bodies
//!
//! Report endpoints live under `/admin/api/v1/cost-tracking/*`. All endpoints are documented with
//! `utoipa` annotations; the OpenAPI document is served at `/admin/docs`.

pub mod handlers;
pub mod models;
