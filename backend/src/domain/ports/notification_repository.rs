//! Port for notification delivery records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Notification, NotificationId, OrganizationId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by notification repository adapters.
    pub enum NotificationRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "notification repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "notification repository query failed: {message}",
    }
}

/// Query for a recipient's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboxQuery {
    /// Organization scope.
    pub organization_id: OrganizationId,
    /// Recipient.
    pub recipient_id: UserId,
    /// Only rows without `read_at`.
    pub unread_only: bool,
    /// Maximum rows, newest first.
    pub limit: usize,
}

/// Port for notification rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert rows, skipping ids that already exist. Returns rows inserted.
    async fn insert_many(
        &self,
        notifications: &[Notification],
    ) -> Result<usize, NotificationRepositoryError>;

    /// Inbox rows, newest first.
    async fn list(&self, query: &InboxQuery) -> Result<Vec<Notification>, NotificationRepositoryError>;

    /// Number of unread rows for the recipient.
    async fn count_unread(
        &self,
        organization_id: &OrganizationId,
        recipient_id: &UserId,
    ) -> Result<u64, NotificationRepositoryError>;

    /// Row `id` within `organization_id`, if any.
    async fn find(
        &self,
        organization_id: &OrganizationId,
        id: &NotificationId,
    ) -> Result<Option<Notification>, NotificationRepositoryError>;

    /// Stamp `read_at` on one row if unread. Returns whether it changed.
    async fn mark_read(
        &self,
        organization_id: &OrganizationId,
        id: &NotificationId,
        read_at: DateTime<Utc>,
    ) -> Result<bool, NotificationRepositoryError>;

    /// Stamp `read_at` on every unread row of the recipient.
    async fn mark_all_read(
        &self,
        organization_id: &OrganizationId,
        recipient_id: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, NotificationRepositoryError>;
}
