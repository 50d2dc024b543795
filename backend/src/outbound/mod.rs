//! Outbound adapters implementing the domain's driven ports.
//!
//! - **persistence**: PostgreSQL repositories using Diesel
//! - **email**: webhook and log-only email transports
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no authorization or notification policy.

pub mod email;
pub mod persistence;
