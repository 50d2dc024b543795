//! Email transport adapters.
//!
//! [`HttpEmailTransport`] posts to a webhook when `email_endpoint` is set;
//! otherwise [`LogEmailTransport`] writes each email to the log.

use std::sync::Arc;

use crate::config::{PinpointSettings, SettingsError};
use crate::domain::ports::EmailTransport;

mod dto;
mod http_transport;
mod log_transport;

pub use http_transport::HttpEmailTransport;
pub use log_transport::LogEmailTransport;

/// Failure to assemble the configured transport.
#[derive(Debug, thiserror::Error)]
pub enum EmailSetupError {
    /// Settings were invalid.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The HTTP client could not be built.
    #[error("failed to build email client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Choose the transport described by `settings`.
///
/// # Errors
///
/// Returns [`EmailSetupError`] when the endpoint or timeout is invalid, or the
/// HTTP client cannot be built.
pub fn transport_from_settings(
    settings: &PinpointSettings,
) -> Result<Arc<dyn EmailTransport>, EmailSetupError> {
    match settings.email_endpoint()? {
        Some(endpoint) => Ok(Arc::new(HttpEmailTransport::new(
            endpoint,
            settings.email_timeout()?,
            settings.email_from(),
            settings.email_api_key.clone(),
        )?)),
        None => Ok(Arc::new(LogEmailTransport)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmailAddress, EmailTemplate, IssueId, NotificationPayload};
    use rstest::rstest;

    fn settings(endpoint: Option<&str>) -> PinpointSettings {
        PinpointSettings {
            database_url: None,
            pool_max_size: None,
            email_endpoint: endpoint.map(str::to_owned),
            email_api_key: None,
            email_from: None,
            email_timeout_seconds: None,
        }
    }

    #[tokio::test]
    async fn missing_endpoint_falls_back_to_logging() {
        let transport = transport_from_settings(&settings(None)).expect("log transport");
        let to = EmailAddress::new("tech@example.com").expect("valid address");

        let sent = transport
            .send(
                &to,
                EmailTemplate::CommentAdded,
                &NotificationPayload::for_issue(IssueId::random(), "New comment"),
            )
            .await;
        assert!(sent.is_ok());
    }

    #[rstest]
    fn invalid_endpoint_is_reported() {
        assert!(matches!(
            transport_from_settings(&settings(Some("::nope"))),
            Err(EmailSetupError::Settings(
                SettingsError::InvalidEmailEndpoint { .. }
            ))
        ));
    }

    #[rstest]
    fn configured_endpoint_builds_http_transport() {
        assert!(transport_from_settings(&settings(Some("https://mail.example.test/send"))).is_ok());
    }
}
