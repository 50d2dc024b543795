//! PostgreSQL-backed notification preferences adapter.
//!
//! The channel matrix is stored as JSON. `new_issue_watch` mirrors whether
//! either new-issue channel is on so global watchers can be selected without
//! decoding every row.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{
    NotificationPreferencesRepository, NotificationPreferencesRepositoryError,
};
use crate::domain::{NotificationPreferences, OrganizationId, UserId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{InvalidRow, PreferencesRow};
use super::pool::{DbPool, PoolError};
use super::schema::{memberships, notification_preferences};

/// Diesel-backed implementation of [`NotificationPreferencesRepository`].
#[derive(Clone)]
pub struct DieselNotificationPreferencesRepository {
    pool: DbPool,
}

impl DieselNotificationPreferencesRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> NotificationPreferencesRepositoryError {
    map_basic_pool_error(error, |message| {
        NotificationPreferencesRepositoryError::connection(message)
    })
}

fn map_diesel_error(error: diesel::result::Error) -> NotificationPreferencesRepositoryError {
    map_basic_diesel_error(
        error,
        NotificationPreferencesRepositoryError::query,
        NotificationPreferencesRepositoryError::connection,
    )
}

fn map_invalid_row(error: InvalidRow) -> NotificationPreferencesRepositoryError {
    NotificationPreferencesRepositoryError::query(error.to_string())
}

#[async_trait]
impl NotificationPreferencesRepository for DieselNotificationPreferencesRepository {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreferences>, NotificationPreferencesRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<PreferencesRow> = notification_preferences::table
            .filter(notification_preferences::organization_id.eq(organization_id.as_uuid()))
            .filter(notification_preferences::user_id.eq(user_id.as_uuid()))
            .select(PreferencesRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(NotificationPreferences::try_from)
            .transpose()
            .map_err(map_invalid_row)
    }

    async fn find_many(
        &self,
        organization_id: &OrganizationId,
        user_ids: &[UserId],
    ) -> Result<Vec<NotificationPreferences>, NotificationPreferencesRepositoryError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<uuid::Uuid> = user_ids.iter().map(|id| *id.as_uuid()).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<PreferencesRow> = notification_preferences::table
            .filter(notification_preferences::organization_id.eq(organization_id.as_uuid()))
            .filter(notification_preferences::user_id.eq_any(&ids))
            .select(PreferencesRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter()
            .map(|row| NotificationPreferences::try_from(row).map_err(map_invalid_row))
            .collect()
    }

    async fn save(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<(), NotificationPreferencesRepositoryError> {
        let row = PreferencesRow::from_preferences(preferences).map_err(map_invalid_row)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(notification_preferences::table)
            .values(&row)
            .on_conflict((
                notification_preferences::user_id,
                notification_preferences::organization_id,
            ))
            .do_update()
            .set((
                notification_preferences::email_enabled
                    .eq(excluded(notification_preferences::email_enabled)),
                notification_preferences::auto_watch_created
                    .eq(excluded(notification_preferences::auto_watch_created)),
                notification_preferences::auto_watch_owned_machines
                    .eq(excluded(notification_preferences::auto_watch_owned_machines)),
                notification_preferences::new_issue_watch
                    .eq(excluded(notification_preferences::new_issue_watch)),
                notification_preferences::categories
                    .eq(excluded(notification_preferences::categories)),
                notification_preferences::updated_at
                    .eq(excluded(notification_preferences::updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn list_global_watchers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<UserId>, NotificationPreferencesRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let members = memberships::table
            .filter(memberships::organization_id.eq(organization_id.as_uuid()))
            .select(memberships::user_id);
        let ids: Vec<uuid::Uuid> = notification_preferences::table
            .filter(notification_preferences::organization_id.eq(organization_id.as_uuid()))
            .filter(notification_preferences::new_issue_watch.eq(true))
            .filter(notification_preferences::user_id.eq_any(members))
            .select(notification_preferences::user_id)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }
}
