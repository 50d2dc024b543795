//! Capability catalogue and permission sets.
//!
//! Capabilities are a closed enumeration. Roles are flat bundles over this
//! enumeration; resolving a caller's permissions is a single set lookup with
//! no inheritance between roles.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Atomic capability granted by a role.
///
/// # Examples
/// ```
/// use pinpoint::domain::Permission;
///
/// let permission: Permission = "issue:edit".parse().unwrap();
/// assert_eq!(permission, Permission::IssueEdit);
/// assert_eq!(permission.as_str(), "issue:edit");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Permission {
    /// Read issues and their comments.
    IssueView,
    /// File new issues as an authenticated member.
    IssueCreate,
    /// Change status, priority, and severity.
    IssueEdit,
    /// Assign or unassign issues.
    IssueAssign,
    /// Add comments to issues.
    CommentCreate,
    /// Edit machines in the catalogue.
    MachineEdit,
    /// Create, edit, and delete custom roles.
    RoleManage,
    /// Change member roles and remove members.
    UserManage,
    /// Administrative control over the organization.
    OrganizationManage,
}

impl Permission {
    /// Every capability, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::IssueView,
        Self::IssueCreate,
        Self::IssueEdit,
        Self::IssueAssign,
        Self::CommentCreate,
        Self::MachineEdit,
        Self::RoleManage,
        Self::UserManage,
        Self::OrganizationManage,
    ];

    /// Stable wire and storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IssueView => "issue:view",
            Self::IssueCreate => "issue:create",
            Self::IssueEdit => "issue:edit",
            Self::IssueAssign => "issue:assign",
            Self::CommentCreate => "comment:create",
            Self::MachineEdit => "machine:edit",
            Self::RoleManage => "role:manage",
            Self::UserManage => "user:manage",
            Self::OrganizationManage => "organization:manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown capability string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {input}")]
pub struct ParsePermissionError {
    /// The unrecognised input value.
    pub input: String,
}

impl FromStr for Permission {
    type Err = ParsePermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|permission| permission.as_str() == s)
            .ok_or_else(|| ParsePermissionError {
                input: s.to_owned(),
            })
    }
}

impl TryFrom<String> for Permission {
    type Error = ParsePermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for &'static str {
    fn from(value: Permission) -> Self {
        value.as_str()
    }
}

/// Flat set of capabilities held by a role or resolved for a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// An empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every capability in the catalogue.
    pub fn all() -> Self {
        Self(Permission::ALL.into_iter().collect())
    }

    /// Whether the set grants `permission`.
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// Grant a capability. Returns `false` if it was already present.
    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    /// Revoke a capability. Returns `false` if it was absent.
    pub fn remove(&mut self, permission: Permission) -> bool {
        self.0.remove(&permission)
    }

    /// Iterate capabilities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Number of capabilities held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no capability is held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the set carries administrative control.
    pub fn is_admin(&self) -> bool {
        self.contains(Permission::OrganizationManage)
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Permission; N]> for PermissionSet {
    fn from(value: [Permission; N]) -> Self {
        value.into_iter().collect()
    }
}
