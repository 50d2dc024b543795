//! Ports for memberships and roles.
//!
//! Both repositories are scoped by organization: every lookup takes the
//! caller's organization id and adapters must filter on it, so a row owned by
//! another tenant is indistinguishable from a missing one.

use async_trait::async_trait;

use crate::domain::{AccessChange, Membership, OrganizationId, Role, RoleId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by membership and role repository adapters.
    pub enum AccessRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "access repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "access repository query failed: {message}",
    }
}

/// Result of [`MembershipRepository::apply_access_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessChangeOutcome {
    /// The change was written.
    Applied,
    /// The change would leave no member holding `organization:manage`; nothing
    /// was written.
    LastAdminViolation,
    /// The role or membership named by the change no longer exists.
    Missing,
}

/// Port for reading and mutating memberships.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Membership of `user_id` in `organization_id`, if any.
    async fn find(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<Option<Membership>, AccessRepositoryError>;

    /// Every membership of the organization.
    async fn list_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Membership>, AccessRepositoryError>;

    /// Apply a role or membership change guarded by the last-administrator
    /// rule.
    ///
    /// Adapters must serialize concurrent changes to one organization, read
    /// its memberships and roles under that serialization, evaluate
    /// [`violates_last_admin`](crate::domain::violates_last_admin), and write
    /// in the same transaction. Two changes racing to demote the last two
    /// administrators must not both see the other administrator.
    async fn apply_access_change(
        &self,
        organization_id: &OrganizationId,
        change: &AccessChange,
    ) -> Result<AccessChangeOutcome, AccessRepositoryError>;
}

/// Port for reading and mutating roles and their permission bundles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Role `role_id` within `organization_id`, if any.
    async fn find(
        &self,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> Result<Option<Role>, AccessRepositoryError>;

    /// Every role of the organization, system templates included.
    async fn list_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Role>, AccessRepositoryError>;

    /// Insert a new role with its permissions.
    async fn insert(&self, role: &Role) -> Result<(), AccessRepositoryError>;
}
