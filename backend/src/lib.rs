//! PinPoint organization-scoped authorization and notification core.
//!
//! The [`domain`] module holds entities, the rejection taxonomy, and the
//! services that authorize issue mutations and decide who is notified.
//! [`outbound`] adapts the driven ports to PostgreSQL and an email webhook.

pub mod config;
pub mod domain;
pub mod outbound;
pub mod services;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::PinpointSettings;
pub use services::{PinpointPorts, PinpointServices};
