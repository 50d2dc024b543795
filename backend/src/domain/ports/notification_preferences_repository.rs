//! Port for notification preference persistence.

use async_trait::async_trait;

use crate::domain::{NotificationPreferences, OrganizationId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by notification preference adapters.
    pub enum NotificationPreferencesRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "preferences repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "preferences repository query failed: {message}",
    }
}

/// Port for per-(user, organization) notification preferences.
///
/// Lookups return `None` when the user never saved preferences; callers fall
/// back to [`NotificationPreferences::defaults`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationPreferencesRepository: Send + Sync {
    /// Stored preferences of one user.
    async fn find(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreferences>, NotificationPreferencesRepositoryError>;

    /// Stored preferences of several users; users without a row are omitted.
    async fn find_many(
        &self,
        organization_id: &OrganizationId,
        user_ids: &[UserId],
    ) -> Result<Vec<NotificationPreferences>, NotificationPreferencesRepositoryError>;

    /// Insert or replace the row.
    async fn save(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<(), NotificationPreferencesRepositoryError>;

    /// Members of the organization whose new-issue feed has any channel on.
    async fn list_global_watchers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<UserId>, NotificationPreferencesRepositoryError>;
}
