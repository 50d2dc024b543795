//! PostgreSQL-backed notification adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{InboxQuery, NotificationRepository, NotificationRepositoryError};
use crate::domain::{Notification, NotificationId, OrganizationId, UserId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::diesel_issue_repository::insert_notifications;
use super::models::NotificationRow;
use super::pool::{DbPool, PoolError};
use super::schema::notifications;

/// Diesel-backed implementation of [`NotificationRepository`].
#[derive(Clone)]
pub struct DieselNotificationRepository {
    pool: DbPool,
}

impl DieselNotificationRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> NotificationRepositoryError {
    map_basic_pool_error(error, |message| {
        NotificationRepositoryError::connection(message)
    })
}

fn map_diesel_error(error: diesel::result::Error) -> NotificationRepositoryError {
    map_basic_diesel_error(
        error,
        NotificationRepositoryError::query,
        NotificationRepositoryError::connection,
    )
}

fn decode(row: NotificationRow) -> Result<Notification, NotificationRepositoryError> {
    Notification::try_from(row).map_err(|err| NotificationRepositoryError::query(err.to_string()))
}

fn count_to_u64(count: i64) -> Result<u64, NotificationRepositoryError> {
    u64::try_from(count).map_err(|_| NotificationRepositoryError::query("negative row count"))
}

#[async_trait]
impl NotificationRepository for DieselNotificationRepository {
    async fn insert_many(
        &self,
        notifications: &[Notification],
    ) -> Result<usize, NotificationRepositoryError> {
        let rows: Vec<NotificationRow> = notifications.iter().map(NotificationRow::from).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        insert_notifications(&mut conn, &rows)
            .await
            .map_err(map_diesel_error)
    }

    async fn list(&self, query: &InboxQuery) -> Result<Vec<Notification>, NotificationRepositoryError> {
        let limit = i64::try_from(query.limit)
            .map_err(|_| NotificationRepositoryError::query("inbox limit out of range"))?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let mut select = notifications::table
            .filter(notifications::organization_id.eq(*query.organization_id.as_uuid()))
            .filter(notifications::recipient_id.eq(*query.recipient_id.as_uuid()))
            .into_boxed();
        if query.unread_only {
            select = select.filter(notifications::read_at.is_null());
        }
        let rows: Vec<NotificationRow> = select
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .limit(limit)
            .select(NotificationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter().map(decode).collect()
    }

    async fn count_unread(
        &self,
        organization_id: &OrganizationId,
        recipient_id: &UserId,
    ) -> Result<u64, NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let count: i64 = notifications::table
            .filter(notifications::organization_id.eq(organization_id.as_uuid()))
            .filter(notifications::recipient_id.eq(recipient_id.as_uuid()))
            .filter(notifications::read_at.is_null())
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        count_to_u64(count)
    }

    async fn find(
        &self,
        organization_id: &OrganizationId,
        id: &NotificationId,
    ) -> Result<Option<Notification>, NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<NotificationRow> = notifications::table
            .filter(notifications::id.eq(id.as_uuid()))
            .filter(notifications::organization_id.eq(organization_id.as_uuid()))
            .select(NotificationRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(decode).transpose()
    }

    async fn mark_read(
        &self,
        organization_id: &OrganizationId,
        id: &NotificationId,
        read_at: DateTime<Utc>,
    ) -> Result<bool, NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(notifications::table)
            .filter(notifications::id.eq(id.as_uuid()))
            .filter(notifications::organization_id.eq(organization_id.as_uuid()))
            .filter(notifications::read_at.is_null())
            .set(notifications::read_at.eq(Some(read_at)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(updated > 0)
    }

    async fn mark_all_read(
        &self,
        organization_id: &OrganizationId,
        recipient_id: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(notifications::table)
            .filter(notifications::organization_id.eq(organization_id.as_uuid()))
            .filter(notifications::recipient_id.eq(recipient_id.as_uuid()))
            .filter(notifications::read_at.is_null())
            .set(notifications::read_at.eq(Some(read_at)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        u64::try_from(updated)
            .map_err(|_| NotificationRepositoryError::query("row count out of range"))
    }
}
