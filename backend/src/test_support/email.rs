//! Email transport that records sends instead of performing them.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{EmailTransport, EmailTransportError};
use crate::domain::{EmailAddress, EmailTemplate, NotificationPayload};

/// One accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Destination address.
    pub to: EmailAddress,
    /// Rendered template.
    pub template: EmailTemplate,
    /// Template payload.
    pub payload: NotificationPayload,
}

#[derive(Debug, Default)]
struct Inner {
    sent: Vec<SentEmail>,
    attempts: usize,
    failing: BTreeSet<String>,
}

/// [`EmailTransport`] double recording every accepted message.
#[derive(Debug, Default)]
pub struct RecordingEmailTransport {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl RecordingEmailTransport {
    /// Transport accepting every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that waits `latency` before answering each send.
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Reject every send to `address`.
    pub fn fail_for(&self, address: &str) {
        self.lock().failing.insert(address.to_owned());
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.lock().sent.clone()
    }

    /// Addresses of accepted messages.
    pub fn recipients(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .map(|email| email.to.as_str().to_owned())
            .collect()
    }

    /// Number of send attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EmailTransport for RecordingEmailTransport {
    async fn send(
        &self,
        to: &EmailAddress,
        template: EmailTemplate,
        payload: &NotificationPayload,
    ) -> Result<(), EmailTransportError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut inner = self.lock();
        inner.attempts += 1;
        if inner.failing.contains(to.as_str()) {
            return Err(EmailTransportError::rejected(format!(
                "mailbox {to} unavailable"
            )));
        }
        inner.sent.push(SentEmail {
            to: to.clone(),
            template,
            payload: payload.clone(),
        });
        Ok(())
    }
}
