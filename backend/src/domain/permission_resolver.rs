//! Role and permission resolution.
//!
//! Roles are flat bundles: a member's capabilities are exactly the permission
//! set of the single role their membership points at. Role and membership
//! mutations hand an [`AccessChange`] to the membership port, which evaluates
//! the last-administrator check inside the same transaction as the write.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::port_errors::map_access_error;
use super::ports::{AccessChangeOutcome, MembershipRepository, RoleRepository};
use super::{
    AccessChange, Error, Membership, OrganizationId, Permission, PermissionSet, Role, RoleId,
    Session, UserId,
};

/// Whether `change` takes the organization from at least one administrator
/// to none.
///
/// `memberships` and `roles` must be the organization's state as seen by the
/// transaction that applies `change`.
pub fn violates_last_admin(
    memberships: &[Membership],
    roles: &[Role],
    change: &AccessChange,
) -> bool {
    let before: HashMap<RoleId, &PermissionSet> =
        roles.iter().map(|role| (role.id, &role.permissions)).collect();
    let mut after = before.clone();
    if let AccessChange::RolePermissions {
        role_id,
        permissions,
    } = change
    {
        after.insert(*role_id, permissions);
    }

    let admins_before = count_admins(memberships.iter().map(|m| Some(m.role_id)), &before);
    let admins_after = count_admins(
        memberships.iter().map(|membership| match change {
            AccessChange::DeleteRole {
                role_id,
                reassign_to,
            } if membership.role_id == *role_id => Some(*reassign_to),
            AccessChange::MemberRole { user_id, role_id } if membership.user_id == *user_id => {
                Some(*role_id)
            }
            AccessChange::RemoveMember { user_id } if membership.user_id == *user_id => None,
            _ => Some(membership.role_id),
        }),
        &after,
    );

    admins_before > 0 && admins_after == 0
}

fn count_admins(
    role_ids: impl Iterator<Item = Option<RoleId>>,
    permissions: &HashMap<RoleId, &PermissionSet>,
) -> usize {
    role_ids
        .flatten()
        .filter(|role_id| {
            permissions
                .get(role_id)
                .is_some_and(|bundle| bundle.is_admin())
        })
        .count()
}

/// Resolves capabilities and guards role and membership mutations.
#[derive(Clone)]
pub struct PermissionResolver {
    memberships: Arc<dyn MembershipRepository>,
    roles: Arc<dyn RoleRepository>,
}

impl PermissionResolver {
    /// Create a resolver over the given repositories.
    pub fn new(memberships: Arc<dyn MembershipRepository>, roles: Arc<dyn RoleRepository>) -> Self {
        Self { memberships, roles }
    }

    /// Permission set of `user_id` in `organization_id`.
    ///
    /// Fails with `no_membership` when the pair has no membership row.
    pub async fn resolve_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<PermissionSet, Error> {
        let membership = self
            .memberships
            .find(organization_id, user_id)
            .await
            .map_err(map_access_error)?
            .ok_or_else(|| Error::no_membership("no membership in this organization"))?;

        let role = self
            .roles
            .find(organization_id, &membership.role_id)
            .await
            .map_err(map_access_error)?
            .ok_or_else(|| {
                Error::internal(format!(
                    "membership references missing role {}",
                    membership.role_id
                ))
            })?;
        Ok(role.permissions)
    }

    /// Resolve the session's permissions and require `permission` among them.
    pub async fn require(
        &self,
        session: &Session,
        permission: Permission,
    ) -> Result<PermissionSet, Error> {
        let permissions = self
            .resolve_permissions(&session.user_id, &session.organization_id)
            .await?;
        if permissions.contains(permission) {
            Ok(permissions)
        } else {
            Err(Error::forbidden(format!("missing permission {permission}")))
        }
    }

    /// Create a custom role.
    pub async fn create_role(
        &self,
        session: &Session,
        name: &str,
        permissions: PermissionSet,
    ) -> Result<Role, Error> {
        self.require(session, Permission::RoleManage).await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("role name must not be empty"));
        }
        let existing = self
            .roles
            .list_for_organization(&session.organization_id)
            .await
            .map_err(map_access_error)?;
        if existing
            .iter()
            .any(|role| role.name.eq_ignore_ascii_case(name))
        {
            return Err(Error::validation(format!("role {name} already exists")));
        }

        let role = Role {
            id: RoleId::random(),
            organization_id: session.organization_id,
            name: name.to_owned(),
            permissions,
            is_system: false,
            is_default: false,
        };
        self.roles.insert(&role).await.map_err(map_access_error)?;
        info!(
            organization_id = %role.organization_id,
            role_id = %role.id,
            "custom role created"
        );
        Ok(role)
    }

    /// Replace the permission bundle of a custom role.
    pub async fn update_role_permissions(
        &self,
        session: &Session,
        role_id: &RoleId,
        permissions: PermissionSet,
    ) -> Result<Role, Error> {
        self.require(session, Permission::RoleManage).await?;
        let role = self.find_custom_role(&session.organization_id, role_id).await?;

        self.apply_guarded(
            &session.organization_id,
            &AccessChange::RolePermissions {
                role_id: role.id,
                permissions: permissions.clone(),
            },
        )
        .await?;

        let updated = Role { permissions, ..role };
        info!(
            organization_id = %updated.organization_id,
            role_id = %updated.id,
            "role permissions updated"
        );
        Ok(updated)
    }

    /// Delete a custom role, moving its members to `reassign_to`.
    pub async fn delete_role(
        &self,
        session: &Session,
        role_id: &RoleId,
        reassign_to: &RoleId,
    ) -> Result<(), Error> {
        self.require(session, Permission::RoleManage).await?;
        let role = self.find_custom_role(&session.organization_id, role_id).await?;
        if role.id == *reassign_to {
            return Err(Error::validation(
                "members must be reassigned to a different role",
            ));
        }
        self.find_role(&session.organization_id, reassign_to).await?;

        self.apply_guarded(
            &session.organization_id,
            &AccessChange::DeleteRole {
                role_id: role.id,
                reassign_to: *reassign_to,
            },
        )
        .await?;
        info!(
            organization_id = %session.organization_id,
            role_id = %role.id,
            reassign_to = %reassign_to,
            "role deleted"
        );
        Ok(())
    }

    /// Move `member` to `role_id`.
    pub async fn assign_member_role(
        &self,
        session: &Session,
        member: &UserId,
        role_id: &RoleId,
    ) -> Result<Membership, Error> {
        self.require(session, Permission::UserManage).await?;
        let current = self.find_membership(&session.organization_id, member).await?;
        let role = self.find_role(&session.organization_id, role_id).await?;

        self.apply_guarded(
            &session.organization_id,
            &AccessChange::MemberRole {
                user_id: *member,
                role_id: role.id,
            },
        )
        .await?;

        let membership = Membership {
            role_id: role.id,
            ..current
        };
        info!(
            organization_id = %membership.organization_id,
            user_id = %membership.user_id,
            role_id = %membership.role_id,
            "member role changed"
        );
        Ok(membership)
    }

    /// Remove `member` from the organization.
    pub async fn remove_member(&self, session: &Session, member: &UserId) -> Result<(), Error> {
        self.require(session, Permission::UserManage).await?;
        self.find_membership(&session.organization_id, member).await?;

        self.apply_guarded(
            &session.organization_id,
            &AccessChange::RemoveMember { user_id: *member },
        )
        .await?;
        info!(
            organization_id = %session.organization_id,
            user_id = %member,
            "member removed"
        );
        Ok(())
    }

    /// Whether `user_id` holds any membership in `organization_id`.
    pub async fn is_member(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<bool, Error> {
        self.memberships
            .find(organization_id, user_id)
            .await
            .map(|membership| membership.is_some())
            .map_err(map_access_error)
    }

    async fn find_role(
        &self,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> Result<Role, Error> {
        self.roles
            .find(organization_id, role_id)
            .await
            .map_err(map_access_error)?
            .ok_or_else(|| Error::not_found(format!("role {role_id} not found")))
    }

    async fn find_custom_role(
        &self,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> Result<Role, Error> {
        let role = self.find_role(organization_id, role_id).await?;
        if role.is_system {
            return Err(Error::validation(format!(
                "system role {} cannot be modified",
                role.name
            )));
        }
        Ok(role)
    }

    async fn find_membership(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<Membership, Error> {
        self.memberships
            .find(organization_id, user_id)
            .await
            .map_err(map_access_error)?
            .ok_or_else(|| Error::not_found(format!("member {user_id} not found")))
    }

    async fn apply_guarded(
        &self,
        organization_id: &OrganizationId,
        change: &AccessChange,
    ) -> Result<(), Error> {
        let outcome = self
            .memberships
            .apply_access_change(organization_id, change)
            .await
            .map_err(map_access_error)?;
        match outcome {
            AccessChangeOutcome::Applied => Ok(()),
            AccessChangeOutcome::LastAdminViolation => Err(Error::last_admin_violation(
                "organization must keep at least one member with organization:manage",
            )),
            AccessChangeOutcome::Missing => Err(Error::not_found(
                "role or member changed concurrently and no longer exists",
            )),
        }
    }
}

#[cfg(test)]
#[path = "permission_resolver_tests.rs"]
mod tests;
