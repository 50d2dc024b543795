//! Roles, memberships, and the trusted request session.

use serde::{Deserialize, Serialize};

use super::{OrganizationId, Permission, PermissionSet, RoleId, UserId};

/// Identity pair supplied by the session collaborator for one request.
///
/// The core trusts this pair without re-validating credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Authenticated user.
    pub user_id: UserId,
    /// Organization the session was issued for.
    pub organization_id: OrganizationId,
}

impl Session {
    /// Build a session from its parts.
    pub const fn new(user_id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            user_id,
            organization_id,
        }
    }
}

/// Named bundle of permissions scoped to one organization.
///
/// System roles are immutable templates seeded per organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Role identifier.
    pub id: RoleId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Display name, unique within the organization.
    pub name: String,
    /// Granted capabilities.
    pub permissions: PermissionSet,
    /// Immutable template seeded by the system.
    pub is_system: bool,
    /// Role given to new members.
    pub is_default: bool,
}

/// Built-in role templates seeded for every organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemRole {
    /// Every permission.
    Admin,
    /// Day-to-day issue work; the default for new members.
    Member,
    /// Read, report, and comment only.
    Guest,
}

impl SystemRole {
    /// All templates in seeding order.
    pub const ALL: [Self; 3] = [Self::Admin, Self::Member, Self::Guest];

    /// Template display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Member => "Member",
            Self::Guest => "Guest",
        }
    }

    /// Capabilities carried by the template.
    pub fn permissions(self) -> PermissionSet {
        match self {
            Self::Admin => PermissionSet::all(),
            Self::Member => PermissionSet::from([
                Permission::IssueView,
                Permission::IssueCreate,
                Permission::IssueEdit,
                Permission::IssueAssign,
                Permission::CommentCreate,
            ]),
            Self::Guest => PermissionSet::from([
                Permission::IssueView,
                Permission::IssueCreate,
                Permission::CommentCreate,
            ]),
        }
    }

    /// Materialise the template for one organization.
    pub fn instantiate(self, organization_id: OrganizationId) -> Role {
        Role {
            id: RoleId::random(),
            organization_id,
            name: self.name().to_owned(),
            permissions: self.permissions(),
            is_system: true,
            is_default: matches!(self, Self::Member),
        }
    }
}

/// Binding of a user to an organization with a role.
///
/// At most one membership exists per (user, organization) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// Member.
    pub user_id: UserId,
    /// Organization.
    pub organization_id: OrganizationId,
    /// Role held in the organization.
    pub role_id: RoleId,
}

/// Role or membership mutation that can change who administers an
/// organization.
///
/// Adapters apply these through
/// [`MembershipRepository::apply_access_change`](super::ports::MembershipRepository::apply_access_change),
/// evaluating [`violates_last_admin`](super::violates_last_admin) against the
/// state they lock for the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessChange {
    /// A role's permission bundle is replaced.
    RolePermissions {
        /// Role being edited.
        role_id: RoleId,
        /// Replacement bundle.
        permissions: PermissionSet,
    },
    /// A role is deleted and its members moved to another role.
    DeleteRole {
        /// Role being deleted.
        role_id: RoleId,
        /// Role its members move to.
        reassign_to: RoleId,
    },
    /// A member is moved to another role.
    MemberRole {
        /// Member being moved.
        user_id: UserId,
        /// Target role.
        role_id: RoleId,
    },
    /// A member leaves the organization.
    RemoveMember {
        /// Departing member.
        user_id: UserId,
    },
}

impl AccessChange {
    /// Whether every role and member the change names is present.
    pub fn targets_exist(&self, memberships: &[Membership], roles: &[Role]) -> bool {
        let has_role = |id: &RoleId| roles.iter().any(|role| role.id == *id);
        let has_member = |id: &UserId| memberships.iter().any(|m| m.user_id == *id);
        match self {
            Self::RolePermissions { role_id, .. } => has_role(role_id),
            Self::DeleteRole {
                role_id,
                reassign_to,
            } => has_role(role_id) && has_role(reassign_to),
            Self::MemberRole { user_id, role_id } => has_member(user_id) && has_role(role_id),
            Self::RemoveMember { user_id } => has_member(user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn only_member_template_is_default() {
        let organization_id = OrganizationId::random();
        let defaults: Vec<_> = SystemRole::ALL
            .into_iter()
            .map(|template| template.instantiate(organization_id))
            .filter(|role| role.is_default)
            .collect();

        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults.first().map(|role| role.name.as_str()), Some("Member"));
    }

    #[rstest]
    #[case::admin(SystemRole::Admin, true)]
    #[case::member(SystemRole::Member, false)]
    #[case::guest(SystemRole::Guest, false)]
    fn only_admin_template_manages_the_organization(
        #[case] template: SystemRole,
        #[case] expected: bool,
    ) {
        assert_eq!(template.permissions().is_admin(), expected);
    }
}
