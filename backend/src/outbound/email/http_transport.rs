//! Reqwest-backed email webhook transport.
//!
//! Posts one JSON document per recipient. Client errors from the webhook are
//! rejections; everything else, including timeouts, is a transport failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use super::dto::EmailRequestDto;
use crate::domain::ports::{EmailTransport, EmailTransportError};
use crate::domain::{EmailAddress, EmailTemplate, NotificationPayload};

/// Email transport posting to a configured webhook.
pub struct HttpEmailTransport {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    from: String,
}

impl HttpEmailTransport {
    /// Build a transport with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        endpoint: Url,
        timeout: Duration,
        from: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            from: from.into(),
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(
        &self,
        to: &EmailAddress,
        template: EmailTemplate,
        payload: &NotificationPayload,
    ) -> Result<(), EmailTransportError> {
        let body = EmailRequestDto::new(&self.from, to, template, payload);
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.map_err(map_transport_error)?;
        Err(map_status_error(status, body.as_ref()))
    }
}

fn map_transport_error(error: reqwest::Error) -> EmailTransportError {
    if error.is_timeout() {
        EmailTransportError::transport(format!("timed out: {error}"))
    } else {
        EmailTransportError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> EmailTransportError {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {preview}", status.as_u16())
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            EmailTransportError::transport(message)
        }
        _ if status.is_client_error() => EmailTransportError::rejected(message),
        _ => EmailTransportError::transport(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
