//! HTTP request handlers.
//!
//! - [`cost_tracking`]: Summary, per-agent and per-period cost reports
//!
//! Handlers authenticate and authorize through extractors from [`crate::auth`] and return
//! [`crate::errors::Error`], which renders as a JSON `{"error": ...}` body.

pub mod cost_tracking;
