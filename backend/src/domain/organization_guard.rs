//! Organization boundary enforcement.
//!
//! Every tenant-scoped fetch is keyed by the caller's organization. A row that
//! exists in another organization yields the same `not_found` as a row that
//! does not exist at all; `forbidden` is reserved for rows the caller can see
//! but lacks the capability to act on.

use std::sync::Arc;

use super::port_errors::{map_directory_error, map_issue_error};
use super::ports::{IssueRepository, MachineRepository};
use super::{
    Comment, Error, Issue, IssueId, Machine, MachineId, Membership, Notification, OrganizationId,
    Permission, PermissionResolver, PermissionSet, Role, Session, Watcher,
};

/// Entity owned by exactly one organization.
pub trait OrganizationScoped {
    /// Owning organization.
    fn organization_id(&self) -> OrganizationId;
}

macro_rules! scoped_by_field {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl OrganizationScoped for $ty {
                fn organization_id(&self) -> OrganizationId {
                    self.organization_id
                }
            }
        )+
    };
}

scoped_by_field!(Issue, Machine, Comment, Membership, Notification, Role, Watcher);

/// Drop `row` unless it belongs to `organization_id`.
///
/// # Examples
/// ```
/// use pinpoint::domain::{OrganizationId, SystemRole, scoped};
///
/// let home = OrganizationId::random();
/// let role = SystemRole::Guest.instantiate(home);
/// assert!(scoped(Some(role.clone()), &home).is_some());
/// assert!(scoped(Some(role), &OrganizationId::random()).is_none());
/// ```
pub fn scoped<T: OrganizationScoped>(row: Option<T>, organization_id: &OrganizationId) -> Option<T> {
    row.filter(|value| value.organization_id() == *organization_id)
}

/// Issue the caller may act on, with the permissions that admitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedIssue {
    /// Session that was authorized.
    pub session: Session,
    /// The issue, guaranteed to belong to the session's organization.
    pub issue: Issue,
    /// Caller's full permission set.
    pub permissions: PermissionSet,
}

/// Guard combining the permission resolver with organization-scoped fetches.
#[derive(Clone)]
pub struct OrganizationGuard {
    resolver: PermissionResolver,
    issues: Arc<dyn IssueRepository>,
    machines: Arc<dyn MachineRepository>,
}

impl OrganizationGuard {
    /// Create a guard.
    pub fn new(
        resolver: PermissionResolver,
        issues: Arc<dyn IssueRepository>,
        machines: Arc<dyn MachineRepository>,
    ) -> Self {
        Self {
            resolver,
            issues,
            machines,
        }
    }

    /// Resolver used for capability checks.
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Issue visible to the session.
    pub async fn load_issue(&self, session: &Session, issue_id: &IssueId) -> Result<Issue, Error> {
        self.authorize_issue(session, issue_id, Permission::IssueView)
            .await
            .map(|authorized| authorized.issue)
    }

    /// Check membership, then scope, then capability, in that order.
    pub async fn authorize_issue(
        &self,
        session: &Session,
        issue_id: &IssueId,
        permission: Permission,
    ) -> Result<AuthorizedIssue, Error> {
        let permissions = self
            .resolver
            .resolve_permissions(&session.user_id, &session.organization_id)
            .await?;

        let issue = self.find_issue(&session.organization_id, issue_id).await?;

        if !permissions.contains(permission) {
            return Err(Error::forbidden(format!("missing permission {permission}")));
        }
        Ok(AuthorizedIssue {
            session: *session,
            issue,
            permissions,
        })
    }

    /// Issue within `organization_id`, without a capability check.
    pub async fn find_issue(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
    ) -> Result<Issue, Error> {
        let row = self
            .issues
            .find(organization_id, issue_id)
            .await
            .map_err(map_issue_error)?;
        scoped(row, organization_id).ok_or_else(|| Error::not_found("issue not found"))
    }

    /// Machine within `organization_id`.
    pub async fn load_machine(
        &self,
        organization_id: &OrganizationId,
        machine_id: &MachineId,
    ) -> Result<Machine, Error> {
        let row = self
            .machines
            .find(organization_id, machine_id)
            .await
            .map_err(map_directory_error)?;
        scoped(row, organization_id).ok_or_else(|| Error::not_found("machine not found"))
    }
}
