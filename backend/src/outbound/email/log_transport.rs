//! Transport that records emails in the log instead of sending them.

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{EmailTransport, EmailTransportError};
use crate::domain::{EmailAddress, EmailTemplate, NotificationPayload};

/// Development transport used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(
        &self,
        to: &EmailAddress,
        template: EmailTemplate,
        payload: &NotificationPayload,
    ) -> Result<(), EmailTransportError> {
        info!(
            to = %to,
            template = template.as_str(),
            link = payload.link.as_str(),
            "email suppressed: no transport configured"
        );
        Ok(())
    }
}
