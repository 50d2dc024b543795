//! Port for the outbound email collaborator.
//!
//! Sends are best effort. The notification engine catches and logs every
//! failure; nothing here is retried.

use async_trait::async_trait;

use crate::domain::{EmailAddress, EmailTemplate, NotificationPayload};

use super::define_port_error;

define_port_error! {
    /// Errors raised by email transports.
    pub enum EmailTransportError {
        /// The transport could not be reached.
        Transport { message: String } => "email transport failed: {message}",
        /// The transport rejected the message.
        Rejected { message: String } => "email rejected: {message}",
    }
}

/// Capability to hand one rendered message to the mail provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Send `template` rendered with `payload` to `to`.
    async fn send(
        &self,
        to: &EmailAddress,
        template: EmailTemplate,
        payload: &NotificationPayload,
    ) -> Result<(), EmailTransportError>;
}

/// Transport that accepts and discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureEmailTransport;

#[async_trait]
impl EmailTransport for FixtureEmailTransport {
    async fn send(
        &self,
        _to: &EmailAddress,
        _template: EmailTemplate,
        _payload: &NotificationPayload,
    ) -> Result<(), EmailTransportError> {
        Ok(())
    }
}
