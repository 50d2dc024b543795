//! Port for issue persistence.
//!
//! Reads are organization scoped. Writes go through [`IssueRepository::commit`],
//! which applies the issue change, its comment, the auto-watch rows, and the
//! notification rows in one transaction: either all of them land or none do.

use async_trait::async_trait;

use crate::domain::{Comment, Issue, IssueId, Notification, OrganizationId, Watcher};

use super::define_port_error;

define_port_error! {
    /// Errors raised by issue repository adapters.
    pub enum IssueRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "issue repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "issue repository query failed: {message}",
        /// The issue to update no longer matches the organization scope.
        Missing { message: String } =>
            "issue repository row missing: {message}",
    }
}

/// How the issue row itself changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueWrite {
    /// Insert a freshly reported issue.
    Insert(Issue),
    /// Overwrite the mutable columns of an existing issue.
    Update(Issue),
    /// Leave the issue row untouched (e.g. a comment).
    Unchanged,
}

/// Everything a single mutation persists atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueChangeSet {
    /// Organization every row belongs to.
    pub organization_id: OrganizationId,
    /// Issue row change.
    pub issue: IssueWrite,
    /// Comment to insert, if any.
    pub comment: Option<Comment>,
    /// Watcher rows to upsert; reasons are unioned with existing rows.
    pub watchers: Vec<Watcher>,
    /// Notification rows; ids already present are skipped.
    pub notifications: Vec<Notification>,
}

/// Port for issue storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssueRepository: Send + Sync {
    /// Issue `issue_id` within `organization_id`, if any.
    async fn find(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
    ) -> Result<Option<Issue>, IssueRepositoryError>;

    /// Apply `change` in a single transaction.
    async fn commit(&self, change: &IssueChangeSet) -> Result<(), IssueRepositoryError>;
}
