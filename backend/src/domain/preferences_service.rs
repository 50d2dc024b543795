//! Notification preference store.
//!
//! Reads never fail for lack of a row: users who never saved preferences get
//! the documented defaults. Only storage faults surface as errors.

use std::collections::HashMap;
use std::sync::Arc;

use mockable::Clock;
use tracing::info;

use super::port_errors::map_preferences_error;
use super::ports::NotificationPreferencesRepository;
use super::{
    Error, NotificationPreferences, OrganizationId, PermissionResolver, PreferencesPatch, Session,
    UserId,
};

/// Service reading and updating per-(user, organization) preferences.
#[derive(Clone)]
pub struct PreferenceService {
    repo: Arc<dyn NotificationPreferencesRepository>,
    resolver: PermissionResolver,
    clock: Arc<dyn Clock>,
}

impl PreferenceService {
    /// Create the service.
    pub fn new(
        repo: Arc<dyn NotificationPreferencesRepository>,
        resolver: PermissionResolver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            resolver,
            clock,
        }
    }

    /// Stored preferences, or the defaults when none were saved.
    pub async fn get_preferences(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<NotificationPreferences, Error> {
        let stored = self
            .repo
            .find(organization_id, user_id)
            .await
            .map_err(map_preferences_error)?;
        Ok(stored.unwrap_or_else(|| {
            NotificationPreferences::defaults(*user_id, *organization_id, self.clock.utc())
        }))
    }

    /// Preferences for every user in `user_ids`, defaults filled in.
    pub async fn preferences_for(
        &self,
        organization_id: &OrganizationId,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, NotificationPreferences>, Error> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let stored = self
            .repo
            .find_many(organization_id, user_ids)
            .await
            .map_err(map_preferences_error)?;
        Ok(with_defaults(
            organization_id,
            user_ids,
            stored,
            self.clock.as_ref(),
        ))
    }

    /// Apply `patch` to the session user's preferences and persist the result.
    pub async fn update_preferences(
        &self,
        session: &Session,
        patch: &PreferencesPatch,
    ) -> Result<NotificationPreferences, Error> {
        self.resolver
            .resolve_permissions(&session.user_id, &session.organization_id)
            .await?;

        let current = self
            .get_preferences(&session.user_id, &session.organization_id)
            .await?;
        let updated = current.apply(patch, self.clock.utc());
        self.repo
            .save(&updated)
            .await
            .map_err(map_preferences_error)?;
        info!(
            organization_id = %session.organization_id,
            user_id = %session.user_id,
            "notification preferences updated"
        );
        Ok(updated)
    }
}

/// Index `stored` by user, filling defaults for users without a row.
pub(crate) fn with_defaults(
    organization_id: &OrganizationId,
    user_ids: &[UserId],
    stored: Vec<NotificationPreferences>,
    clock: &dyn Clock,
) -> HashMap<UserId, NotificationPreferences> {
    let mut by_user: HashMap<UserId, NotificationPreferences> = stored
        .into_iter()
        .filter(|prefs| prefs.organization_id == *organization_id)
        .map(|prefs| (prefs.user_id, prefs))
        .collect();
    let now = clock.utc();
    for user_id in user_ids {
        by_user
            .entry(*user_id)
            .or_insert_with(|| NotificationPreferences::defaults(*user_id, *organization_id, now));
    }
    by_user
}

#[cfg(test)]
#[path = "preferences_service_tests.rs"]
mod tests;
