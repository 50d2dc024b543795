//! PostgreSQL-backed membership adapter.
//!
//! Guarded access changes lock the organization row with `SELECT ... FOR
//! UPDATE` before reading memberships and roles, so concurrent changes to one
//! organization evaluate the last-administrator rule one at a time against
//! committed state.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{AccessChangeOutcome, AccessRepositoryError, MembershipRepository};
use crate::domain::{
    AccessChange, Membership, OrganizationId, Role, UserId, violates_last_admin,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::diesel_role_repository::load_roles;
use super::models::{MembershipRow, NewRolePermissionRow, RoleRow};
use super::pool::{DbPool, PoolError};
use super::schema::{memberships, organizations, role_permissions, roles};

/// Diesel-backed implementation of [`MembershipRepository`].
#[derive(Clone)]
pub struct DieselMembershipRepository {
    pool: DbPool,
}

impl DieselMembershipRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(super) fn map_pool_error(error: PoolError) -> AccessRepositoryError {
    map_basic_pool_error(error, |message| AccessRepositoryError::connection(message))
}

pub(super) fn map_diesel_error(error: diesel::result::Error) -> AccessRepositoryError {
    map_basic_diesel_error(
        error,
        AccessRepositoryError::query,
        AccessRepositoryError::connection,
    )
}

impl From<diesel::result::Error> for AccessRepositoryError {
    fn from(error: diesel::result::Error) -> Self {
        map_diesel_error(error)
    }
}

async fn lock_organization(
    conn: &mut AsyncPgConnection,
    organization_id: Uuid,
) -> Result<bool, AccessRepositoryError> {
    let locked = organizations::table
        .filter(organizations::id.eq(organization_id))
        .select(organizations::id)
        .for_update()
        .first::<Uuid>(conn)
        .await
        .optional()?;
    Ok(locked.is_some())
}

async fn load_state(
    conn: &mut AsyncPgConnection,
    organization_id: Uuid,
) -> Result<(Vec<Membership>, Vec<Role>), AccessRepositoryError> {
    let members: Vec<MembershipRow> = memberships::table
        .filter(memberships::organization_id.eq(organization_id))
        .select(MembershipRow::as_select())
        .load(conn)
        .await?;
    let role_rows: Vec<RoleRow> = roles::table
        .filter(roles::organization_id.eq(organization_id))
        .select(RoleRow::as_select())
        .load(conn)
        .await?;
    let roles = load_roles(conn, role_rows).await?;
    Ok((members.into_iter().map(Membership::from).collect(), roles))
}

async fn write_change(
    conn: &mut AsyncPgConnection,
    organization_id: Uuid,
    roles_in_org: &[Role],
    change: &AccessChange,
) -> Result<(), AccessRepositoryError> {
    match change {
        AccessChange::RolePermissions {
            role_id,
            permissions,
        } => {
            let Some(role) = roles_in_org.iter().find(|role| role.id == *role_id) else {
                return Err(AccessRepositoryError::query("role not found"));
            };
            let updated = Role {
                permissions: permissions.clone(),
                ..role.clone()
            };
            let rows = NewRolePermissionRow::for_role(&updated);
            diesel::delete(role_permissions::table)
                .filter(role_permissions::role_id.eq(role_id.as_uuid()))
                .execute(conn)
                .await?;
            if !rows.is_empty() {
                diesel::insert_into(role_permissions::table)
                    .values(&rows)
                    .execute(conn)
                    .await?;
            }
        }
        AccessChange::DeleteRole {
            role_id,
            reassign_to,
        } => {
            diesel::update(memberships::table)
                .filter(memberships::organization_id.eq(organization_id))
                .filter(memberships::role_id.eq(role_id.as_uuid()))
                .set(memberships::role_id.eq(reassign_to.as_uuid()))
                .execute(conn)
                .await?;
            diesel::delete(role_permissions::table)
                .filter(role_permissions::role_id.eq(role_id.as_uuid()))
                .execute(conn)
                .await?;
            diesel::delete(roles::table)
                .filter(roles::id.eq(role_id.as_uuid()))
                .filter(roles::organization_id.eq(organization_id))
                .execute(conn)
                .await?;
        }
        AccessChange::MemberRole { user_id, role_id } => {
            diesel::update(memberships::table)
                .filter(memberships::organization_id.eq(organization_id))
                .filter(memberships::user_id.eq(user_id.as_uuid()))
                .set(memberships::role_id.eq(role_id.as_uuid()))
                .execute(conn)
                .await?;
        }
        AccessChange::RemoveMember { user_id } => {
            diesel::delete(memberships::table)
                .filter(memberships::organization_id.eq(organization_id))
                .filter(memberships::user_id.eq(user_id.as_uuid()))
                .execute(conn)
                .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl MembershipRepository for DieselMembershipRepository {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<Option<Membership>, AccessRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<MembershipRow> = memberships::table
            .filter(memberships::organization_id.eq(organization_id.as_uuid()))
            .filter(memberships::user_id.eq(user_id.as_uuid()))
            .select(MembershipRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(Membership::from))
    }

    async fn list_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Membership>, AccessRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<MembershipRow> = memberships::table
            .filter(memberships::organization_id.eq(organization_id.as_uuid()))
            .select(MembershipRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows.into_iter().map(Membership::from).collect())
    }

    async fn apply_access_change(
        &self,
        organization_id: &OrganizationId,
        change: &AccessChange,
    ) -> Result<AccessChangeOutcome, AccessRepositoryError> {
        let organization = *organization_id.as_uuid();
        let change = change.clone();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let outcome = conn
            .transaction(|conn| {
                async move {
                    if !lock_organization(conn, organization).await? {
                        return Ok(AccessChangeOutcome::Missing);
                    }
                    let (members, roles_in_org) = load_state(conn, organization).await?;
                    if !change.targets_exist(&members, &roles_in_org) {
                        return Ok(AccessChangeOutcome::Missing);
                    }
                    if violates_last_admin(&members, &roles_in_org, &change) {
                        return Ok(AccessChangeOutcome::LastAdminViolation);
                    }
                    write_change(conn, organization, &roles_in_org, &change).await?;
                    Ok::<_, AccessRepositoryError>(AccessChangeOutcome::Applied)
                }
                .scope_boxed()
            })
            .await?;

        debug!(
            organization_id = %organization_id,
            ?outcome,
            "guarded access change evaluated"
        );
        Ok(outcome)
    }
}
