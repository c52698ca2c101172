//! Common type definitions and permission system types.
//!
//! Identifiers in the cost tracking store are opaque strings written by upstream services, so
//! they are aliased rather than wrapped.
//!
//! # Permission System
//!
//! - [`Resource`]: What is being accessed
//! - [`Operation`]: What action is being performed
//! - [`Permission`]: Authorization requirement combining resource and operation

use std::fmt;

// Type aliases for IDs
pub type UserId = String;
pub type AgentId = String;
pub type ConversationId = String;

// Operations that can be performed on resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadAll,
}

// Resources that can be operated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    CostTracking,
}

// Permission types for authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    /// Simple permission: (Resource, Operation)
    Allow(Resource, Operation),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ReadAll => write!(f, "Read"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::CostTracking => write!(f, "cost tracking reports"),
        }
    }
}
