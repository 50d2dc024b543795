//! Internal Diesel row structs and their conversions to domain types.
//!
//! Rows never leave the persistence module. Decoding a row whose enum text or
//! bit set no longer matches the domain yields [`InvalidRow`], which each
//! repository maps onto its own `Query` variant.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{
    CategoryPreferences, Comment, EmailAddress, EventId, Issue, IssueId, Machine, MachineId,
    Membership, Notification, NotificationId, NotificationPayload, NotificationPreferences,
    OrganizationId, ParseIssueFieldError, Permission, PermissionSet, Role, RoleId, UserContact,
    UserId, WatchReasons, Watcher,
};

use super::schema::{
    comments, issues, machines, memberships, notification_preferences, notifications,
    role_permissions, roles, users, watchers,
};

/// A stored row that no longer decodes into the domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {table} row: {message}")]
pub(crate) struct InvalidRow {
    table: &'static str,
    message: String,
}

impl InvalidRow {
    fn new(table: &'static str, message: impl ToString) -> Self {
        Self {
            table,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = roles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RoleRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub is_system: bool,
    pub is_default: bool,
}

impl RoleRow {
    pub fn from_role(role: &Role) -> Self {
        Self {
            id: *role.id.as_uuid(),
            organization_id: *role.organization_id.as_uuid(),
            name: role.name.clone(),
            is_system: role.is_system,
            is_default: role.is_default,
        }
    }

    /// Attach the permission rows belonging to this role.
    pub fn into_role(self, permissions: &[RolePermissionRow]) -> Result<Role, InvalidRow> {
        let permissions: PermissionSet = permissions
            .iter()
            .filter(|row| row.role_id == self.id)
            .map(|row| {
                row.permission
                    .parse::<Permission>()
                    .map_err(|err| InvalidRow::new("role_permissions", err))
            })
            .collect::<Result<_, _>>()?;
        Ok(Role {
            id: RoleId::from_uuid(self.id),
            organization_id: OrganizationId::from_uuid(self.organization_id),
            name: self.name,
            permissions,
            is_system: self.is_system,
            is_default: self.is_default,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = role_permissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RolePermissionRow {
    pub role_id: Uuid,
    pub permission: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = role_permissions)]
pub(crate) struct NewRolePermissionRow {
    pub role_id: Uuid,
    pub permission: &'static str,
}

impl NewRolePermissionRow {
    pub fn for_role(role: &Role) -> Vec<Self> {
        role.permissions
            .iter()
            .map(|permission| Self {
                role_id: *role.id.as_uuid(),
                permission: permission.as_str(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Queryable, Selectable)]
#[diesel(table_name = memberships)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct MembershipRow {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role_id: Uuid,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Self {
            user_id: UserId::from_uuid(row.user_id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            role_id: RoleId::from_uuid(row.role_id),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = machines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct MachineRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub owner_id: Option<Uuid>,
}

impl From<MachineRow> for Machine {
    fn from(row: MachineRow) -> Self {
        Self {
            id: MachineId::from_uuid(row.id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            name: row.name,
            owner_id: row.owner_id.map(UserId::from_uuid),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ContactRow {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
}

impl From<ContactRow> for UserContact {
    /// Addresses that fail validation are treated as absent.
    fn from(row: ContactRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            display_name: row.display_name,
            email: row.email.and_then(|raw| EmailAddress::new(raw).ok()),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = issues)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub(crate) struct IssueRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub machine_id: Uuid,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub severity: String,
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Issue> for IssueRow {
    fn from(issue: &Issue) -> Self {
        Self {
            id: *issue.id.as_uuid(),
            organization_id: *issue.organization_id.as_uuid(),
            machine_id: *issue.machine_id.as_uuid(),
            title: issue.title.clone(),
            status: issue.status.as_str().to_owned(),
            priority: issue.priority.as_str().to_owned(),
            severity: issue.severity.as_str().to_owned(),
            created_by: issue.created_by.map(|id| *id.as_uuid()),
            assigned_to: issue.assigned_to.map(|id| *id.as_uuid()),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
        }
    }
}

impl TryFrom<IssueRow> for Issue {
    type Error = InvalidRow;

    fn try_from(row: IssueRow) -> Result<Self, Self::Error> {
        let decode = |err: ParseIssueFieldError| InvalidRow::new("issues", err);
        Ok(Self {
            id: IssueId::from_uuid(row.id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            machine_id: MachineId::from_uuid(row.machine_id),
            title: row.title,
            status: row.status.parse().map_err(decode)?,
            priority: row.priority.parse().map_err(decode)?,
            severity: row.severity.parse().map_err(decode)?,
            created_by: row.created_by.map(UserId::from_uuid),
            assigned_to: row.assigned_to.map(UserId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = comments)]
pub(crate) struct NewCommentRow<'a> {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub issue_id: Uuid,
    pub author_id: Uuid,
    pub body: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a Comment> for NewCommentRow<'a> {
    fn from(comment: &'a Comment) -> Self {
        Self {
            id: *comment.id.as_uuid(),
            organization_id: *comment.organization_id.as_uuid(),
            issue_id: *comment.issue_id.as_uuid(),
            author_id: *comment.author_id.as_uuid(),
            body: comment.body.as_str(),
            created_at: comment.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Queryable, Selectable, Insertable)]
#[diesel(table_name = watchers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct WatcherRow {
    pub issue_id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub reasons: i16,
}

impl From<&Watcher> for WatcherRow {
    fn from(watcher: &Watcher) -> Self {
        Self {
            issue_id: *watcher.issue_id.as_uuid(),
            user_id: *watcher.user_id.as_uuid(),
            organization_id: *watcher.organization_id.as_uuid(),
            reasons: i16::from(watcher.reasons.bits()),
        }
    }
}

impl TryFrom<WatcherRow> for Watcher {
    type Error = InvalidRow;

    fn try_from(row: WatcherRow) -> Result<Self, Self::Error> {
        let bits = u8::try_from(row.reasons).map_err(|err| InvalidRow::new("watchers", err))?;
        Ok(Self {
            organization_id: OrganizationId::from_uuid(row.organization_id),
            issue_id: IssueId::from_uuid(row.issue_id),
            user_id: UserId::from_uuid(row.user_id),
            reasons: WatchReasons::from_bits_truncate(bits),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = notification_preferences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PreferencesRow {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub email_enabled: bool,
    pub auto_watch_created: bool,
    pub auto_watch_owned_machines: bool,
    pub new_issue_watch: bool,
    pub categories: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl PreferencesRow {
    pub fn from_preferences(preferences: &NotificationPreferences) -> Result<Self, InvalidRow> {
        let categories = serde_json::to_value(preferences.categories)
            .map_err(|err| InvalidRow::new("notification_preferences", err))?;
        Ok(Self {
            user_id: *preferences.user_id.as_uuid(),
            organization_id: *preferences.organization_id.as_uuid(),
            email_enabled: preferences.email_enabled,
            auto_watch_created: preferences.auto_watch_created,
            auto_watch_owned_machines: preferences.auto_watch_owned_machines,
            new_issue_watch: preferences.watches_all_new_issues(),
            categories,
            updated_at: preferences.updated_at,
        })
    }
}

impl TryFrom<PreferencesRow> for NotificationPreferences {
    type Error = InvalidRow;

    fn try_from(row: PreferencesRow) -> Result<Self, Self::Error> {
        let categories: CategoryPreferences = serde_json::from_value(row.categories)
            .map_err(|err| InvalidRow::new("notification_preferences", err))?;
        Ok(Self {
            user_id: UserId::from_uuid(row.user_id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            email_enabled: row.email_enabled,
            auto_watch_created: row.auto_watch_created,
            auto_watch_owned_machines: row.auto_watch_owned_machines,
            categories,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NotificationRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub recipient_id: Uuid,
    pub event_id: Uuid,
    pub category: String,
    pub message: String,
    pub link: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationRow {
    fn from(notification: &Notification) -> Self {
        Self {
            id: *notification.id.as_uuid(),
            organization_id: *notification.organization_id.as_uuid(),
            recipient_id: *notification.recipient_id.as_uuid(),
            event_id: *notification.event_id.as_uuid(),
            category: notification.category.as_str().to_owned(),
            message: notification.payload.message.clone(),
            link: notification.payload.link.clone(),
            read_at: notification.read_at,
            created_at: notification.created_at,
        }
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = InvalidRow;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: NotificationId::from_uuid(row.id),
            recipient_id: UserId::from_uuid(row.recipient_id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            category: row
                .category
                .parse()
                .map_err(|err| InvalidRow::new("notifications", err))?,
            payload: NotificationPayload {
                message: row.message,
                link: row.link,
            },
            event_id: EventId::from_uuid(row.event_id),
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssuePriority, IssueSeverity, IssueStatus, WatchReason};
    use rstest::rstest;

    fn issue_row(status: &str) -> IssueRow {
        let now = Utc::now();
        IssueRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            machine_id: Uuid::new_v4(),
            title: "Drop target stuck".to_owned(),
            status: status.to_owned(),
            priority: "high".to_owned(),
            severity: "unplayable".to_owned(),
            created_by: None,
            assigned_to: Some(Uuid::new_v4()),
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    fn issue_row_decodes_enum_text() {
        let issue = Issue::try_from(issue_row("needs_parts")).expect("valid row");

        assert_eq!(issue.status, IssueStatus::NeedsParts);
        assert_eq!(issue.priority, IssuePriority::High);
        assert_eq!(issue.severity, IssueSeverity::Unplayable);
        assert!(issue.created_by.is_none());
    }

    #[rstest]
    fn unknown_status_is_an_invalid_row() {
        let error = Issue::try_from(issue_row("resolved")).expect_err("unknown status");
        assert!(error.to_string().contains("issues"));
    }

    #[rstest]
    fn negative_reason_bits_are_rejected() {
        let row = WatcherRow {
            issue_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            reasons: -1,
        };
        assert!(Watcher::try_from(row).is_err());
    }

    #[rstest]
    fn watcher_reasons_are_stored_as_bits() {
        let watcher = Watcher::new(
            OrganizationId::random(),
            IssueId::random(),
            UserId::random(),
            WatchReason::AutoAssigned,
        );
        let row = WatcherRow::from(&watcher);

        assert_eq!(row.reasons, 4);
        assert_eq!(Watcher::try_from(row), Ok(watcher));
    }

    #[rstest]
    fn role_keeps_only_its_own_permissions() {
        let role_id = Uuid::new_v4();
        let row = RoleRow {
            id: role_id,
            organization_id: Uuid::new_v4(),
            name: "Mechanic".to_owned(),
            is_system: false,
            is_default: false,
        };
        let permissions = [
            RolePermissionRow {
                role_id,
                permission: "issue:edit".to_owned(),
            },
            RolePermissionRow {
                role_id: Uuid::new_v4(),
                permission: "role:manage".to_owned(),
            },
        ];

        let role = row.into_role(&permissions).expect("valid role");
        assert_eq!(role.permissions, PermissionSet::from([Permission::IssueEdit]));
    }

    #[rstest]
    fn preferences_round_trip_through_json() {
        let prefs = NotificationPreferences::defaults(
            UserId::random(),
            OrganizationId::random(),
            Utc::now(),
        );
        let row = PreferencesRow::from_preferences(&prefs).expect("serialise");

        assert!(!row.new_issue_watch);
        assert_eq!(NotificationPreferences::try_from(row), Ok(prefs));
    }

    #[rstest]
    fn malformed_contact_email_is_dropped() {
        let contact = UserContact::from(ContactRow {
            id: Uuid::new_v4(),
            display_name: "Ada".to_owned(),
            email: Some("not an address".to_owned()),
        });
        assert!(contact.email.is_none());
    }
}
