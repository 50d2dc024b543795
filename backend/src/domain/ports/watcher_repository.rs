//! Port for issue watcher persistence.

use async_trait::async_trait;

use crate::domain::{IssueId, OrganizationId, UserId, Watcher};

use super::define_port_error;

define_port_error! {
    /// Errors raised by watcher repository adapters.
    pub enum WatcherRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "watcher repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "watcher repository query failed: {message}",
    }
}

/// Port for watcher rows, unique per (issue, user).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatcherRepository: Send + Sync {
    /// Insert the row, or union its reasons into the existing row.
    async fn upsert(&self, watcher: &Watcher) -> Result<(), WatcherRepositoryError>;

    /// Delete the row. Returns whether a row existed.
    async fn remove(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
        user_id: &UserId,
    ) -> Result<bool, WatcherRepositoryError>;

    /// Every watcher of the issue.
    async fn list_for_issue(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
    ) -> Result<Vec<Watcher>, WatcherRepositoryError>;
}
