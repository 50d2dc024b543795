//! Recipient-facing view of notification rows.

use std::sync::Arc;

use mockable::Clock;

use super::port_errors::map_notification_error;
use super::ports::{InboxQuery, NotificationRepository};
use super::{Error, Notification, NotificationId, PermissionResolver, Session, scoped};

/// Largest page the inbox returns.
pub const INBOX_PAGE_MAX: usize = 100;

/// Listing and read-state toggles for the session user's notifications.
#[derive(Clone)]
pub struct NotificationInbox {
    resolver: PermissionResolver,
    notifications: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
}

impl NotificationInbox {
    /// Create the inbox.
    pub fn new(
        resolver: PermissionResolver,
        notifications: Arc<dyn NotificationRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver,
            notifications,
            clock,
        }
    }

    /// Newest notifications first, at most `limit` (capped at
    /// [`INBOX_PAGE_MAX`]).
    pub async fn list(
        &self,
        session: &Session,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>, Error> {
        if limit == 0 {
            return Err(Error::validation("limit must be positive"));
        }
        self.ensure_member(session).await?;
        let query = InboxQuery {
            organization_id: session.organization_id,
            recipient_id: session.user_id,
            unread_only,
            limit: limit.min(INBOX_PAGE_MAX),
        };
        let rows = self
            .notifications
            .list(&query)
            .await
            .map_err(map_notification_error)?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                row.organization_id == session.organization_id
                    && row.recipient_id == session.user_id
            })
            .collect())
    }

    /// Number of unread notifications.
    pub async fn unread_count(&self, session: &Session) -> Result<u64, Error> {
        self.ensure_member(session).await?;
        self.notifications
            .count_unread(&session.organization_id, &session.user_id)
            .await
            .map_err(map_notification_error)
    }

    /// Mark one notification read. Rows addressed to someone else, or in
    /// another organization, are `not_found`.
    pub async fn mark_read(
        &self,
        session: &Session,
        id: &NotificationId,
    ) -> Result<Notification, Error> {
        self.ensure_member(session).await?;
        let row = self
            .notifications
            .find(&session.organization_id, id)
            .await
            .map_err(map_notification_error)?;
        let mut notification = scoped(row, &session.organization_id)
            .filter(|row| row.recipient_id == session.user_id)
            .ok_or_else(|| Error::not_found("notification not found"))?;

        if notification.is_unread() {
            let now = self.clock.utc();
            self.notifications
                .mark_read(&session.organization_id, id, now)
                .await
                .map_err(map_notification_error)?;
            notification.read_at = Some(now);
        }
        Ok(notification)
    }

    /// Mark every unread notification read. Returns how many changed.
    pub async fn mark_all_read(&self, session: &Session) -> Result<u64, Error> {
        self.ensure_member(session).await?;
        self.notifications
            .mark_all_read(
                &session.organization_id,
                &session.user_id,
                self.clock.utc(),
            )
            .await
            .map_err(map_notification_error)
    }

    async fn ensure_member(&self, session: &Session) -> Result<(), Error> {
        self.resolver
            .resolve_permissions(&session.user_id, &session.organization_id)
            .await
            .map(|_| ())
    }
}
