//! PostgreSQL-backed machine catalogue and user contact lookups.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{DirectoryError, MachineRepository, UserDirectory};
use crate::domain::{Machine, MachineId, OrganizationId, UserContact, UserId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{ContactRow, MachineRow};
use super::pool::{DbPool, PoolError};
use super::schema::{machines, users};

/// Diesel-backed implementation of [`MachineRepository`] and
/// [`UserDirectory`].
#[derive(Clone)]
pub struct DieselDirectory {
    pool: DbPool,
}

impl DieselDirectory {
    /// Create a new directory with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> DirectoryError {
    map_basic_pool_error(error, |message| DirectoryError::connection(message))
}

fn map_diesel_error(error: diesel::result::Error) -> DirectoryError {
    map_basic_diesel_error(error, DirectoryError::query, DirectoryError::connection)
}

#[async_trait]
impl MachineRepository for DieselDirectory {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        machine_id: &MachineId,
    ) -> Result<Option<Machine>, DirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<MachineRow> = machines::table
            .filter(machines::id.eq(machine_id.as_uuid()))
            .filter(machines::organization_id.eq(organization_id.as_uuid()))
            .select(MachineRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(Machine::from))
    }
}

#[async_trait]
impl UserDirectory for DieselDirectory {
    async fn find_contacts(&self, user_ids: &[UserId]) -> Result<Vec<UserContact>, DirectoryError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<uuid::Uuid> = user_ids.iter().map(|id| *id.as_uuid()).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<ContactRow> = users::table
            .filter(users::id.eq_any(&ids))
            .select(ContactRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows.into_iter().map(UserContact::from).collect())
    }
}
