//! PostgreSQL-backed role adapter.
//!
//! A role is one `roles` row plus one `role_permissions` row per capability.
//! Inserts touching both tables run in a single transaction; edits and
//! deletions go through the guarded membership adapter.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::domain::ports::{AccessRepositoryError, RoleRepository};
use crate::domain::{OrganizationId, Role, RoleId};

use super::diesel_membership_repository::{map_diesel_error, map_pool_error};
use super::models::{NewRolePermissionRow, RolePermissionRow, RoleRow};
use super::pool::DbPool;
use super::schema::{role_permissions, roles};

/// Diesel-backed implementation of [`RoleRepository`].
#[derive(Clone)]
pub struct DieselRoleRepository {
    pool: DbPool,
}

impl DieselRoleRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(super) async fn load_roles(
    conn: &mut AsyncPgConnection,
    rows: Vec<RoleRow>,
) -> Result<Vec<Role>, AccessRepositoryError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<uuid::Uuid> = rows.iter().map(|row| row.id).collect();
    let permissions: Vec<RolePermissionRow> = role_permissions::table
        .filter(role_permissions::role_id.eq_any(&ids))
        .select(RolePermissionRow::as_select())
        .load(conn)
        .await
        .map_err(map_diesel_error)?;

    rows.into_iter()
        .map(|row| {
            row.into_role(&permissions)
                .map_err(|err| AccessRepositoryError::query(err.to_string()))
        })
        .collect()
}

#[async_trait]
impl RoleRepository for DieselRoleRepository {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> Result<Option<Role>, AccessRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<RoleRow> = roles::table
            .filter(roles::id.eq(role_id.as_uuid()))
            .filter(roles::organization_id.eq(organization_id.as_uuid()))
            .select(RoleRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(load_roles(&mut conn, vec![row]).await?.pop())
    }

    async fn list_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Role>, AccessRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<RoleRow> = roles::table
            .filter(roles::organization_id.eq(organization_id.as_uuid()))
            .order(roles::name.asc())
            .select(RoleRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        load_roles(&mut conn, rows).await
    }

    async fn insert(&self, role: &Role) -> Result<(), AccessRepositoryError> {
        let role_row = RoleRow::from_role(role);
        let permission_rows = NewRolePermissionRow::for_role(role);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        conn.transaction(|conn| {
            async move {
                diesel::insert_into(roles::table)
                    .values(&role_row)
                    .execute(conn)
                    .await?;
                if !permission_rows.is_empty() {
                    diesel::insert_into(role_permissions::table)
                        .values(&permission_rows)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }
}
