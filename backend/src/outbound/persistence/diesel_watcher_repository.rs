//! PostgreSQL-backed watcher adapter.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{WatcherRepository, WatcherRepositoryError};
use crate::domain::{IssueId, OrganizationId, UserId, Watcher};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::diesel_issue_repository::upsert_watchers;
use super::models::WatcherRow;
use super::pool::{DbPool, PoolError};
use super::schema::watchers;

/// Diesel-backed implementation of [`WatcherRepository`].
#[derive(Clone)]
pub struct DieselWatcherRepository {
    pool: DbPool,
}

impl DieselWatcherRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> WatcherRepositoryError {
    map_basic_pool_error(error, |message| WatcherRepositoryError::connection(message))
}

fn map_diesel_error(error: diesel::result::Error) -> WatcherRepositoryError {
    map_basic_diesel_error(
        error,
        WatcherRepositoryError::query,
        WatcherRepositoryError::connection,
    )
}

#[async_trait]
impl WatcherRepository for DieselWatcherRepository {
    async fn upsert(&self, watcher: &Watcher) -> Result<(), WatcherRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        upsert_watchers(&mut conn, &[WatcherRow::from(watcher)])
            .await
            .map_err(map_diesel_error)
    }

    async fn remove(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
        user_id: &UserId,
    ) -> Result<bool, WatcherRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let deleted = diesel::delete(watchers::table)
            .filter(watchers::organization_id.eq(organization_id.as_uuid()))
            .filter(watchers::issue_id.eq(issue_id.as_uuid()))
            .filter(watchers::user_id.eq(user_id.as_uuid()))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(deleted > 0)
    }

    async fn list_for_issue(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
    ) -> Result<Vec<Watcher>, WatcherRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<WatcherRow> = watchers::table
            .filter(watchers::organization_id.eq(organization_id.as_uuid()))
            .filter(watchers::issue_id.eq(issue_id.as_uuid()))
            .select(WatcherRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter()
            .map(|row| {
                Watcher::try_from(row).map_err(|err| WatcherRepositoryError::query(err.to_string()))
            })
            .collect()
    }
}
