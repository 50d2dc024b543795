//! Domain primitives, aggregates, and services.
//!
//! Purpose: model organizations, memberships, issues, and subscriptions, and
//! host the services that authorize mutations and decide who is notified.
//! Adapters live behind the traits in [`ports`].
//!
//! Public surface:
//! - Error (alias to `error::Error`) and ErrorCode: the rejection taxonomy.
//! - PermissionResolver and OrganizationGuard: authorization at the tenant
//!   boundary.
//! - WatcherRegistry, PreferenceService, NotificationEngine: the dispatch core.
//! - IssueCommandService and NotificationInbox: callers of the core.

pub mod error;
pub mod ports;

mod access;
mod ids;
mod issue;
mod issue_command_service;
mod notification;
mod notification_engine;
mod notification_inbox;
mod organization_guard;
mod permission;
mod permission_resolver;
mod port_errors;
mod preferences;
mod preferences_service;
mod user;
mod watcher;
mod watcher_registry;

pub use self::access::{AccessChange, Membership, Role, Session, SystemRole};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::ids::{
    CommentId, EventId, IdValidationError, IssueId, MachineId, NotificationId, OrganizationId,
    RoleId, UserId,
};
pub use self::issue::{
    COMMENT_BODY_MAX, Comment, ISSUE_TITLE_MAX, Issue, IssuePriority, IssueSeverity, IssueStatus,
    Machine, NewIssue, ParseIssueFieldError, validate_comment_body, validate_title,
};
pub use self::issue_command_service::{
    IssueCommandOutcome, IssueCommandParts, IssueCommandService,
};
pub use self::notification::{
    DeliveryHandle, DeliveryPlan, DeliveryReport, EmailDelivery, EmailTemplate, IssueEvent,
    IssueEventKind, Notification, NotificationPayload, PlanFault,
};
pub use self::notification_engine::{NotificationEngine, NotificationEngineParts};
pub use self::notification_inbox::{INBOX_PAGE_MAX, NotificationInbox};
pub use self::organization_guard::{
    AuthorizedIssue, OrganizationGuard, OrganizationScoped, scoped,
};
pub use self::permission::{ParsePermissionError, Permission, PermissionSet};
pub use self::permission_resolver::{PermissionResolver, violates_last_admin};
pub use self::preferences::{
    CategoryPreferences, ChannelPatch, ChannelToggles, NotificationCategory,
    NotificationPreferences, ParseCategoryError, PreferencesPatch,
};
pub use self::preferences_service::PreferenceService;
pub use self::user::{
    EmailAddress, EmailValidationError, INTERNAL_EMAIL_DOMAIN, UserContact, deliverable_email,
};
pub use self::watcher::{WatchReason, WatchReasons, Watcher};
pub use self::watcher_registry::WatcherRegistry;

/// Convenient domain result alias.
///
/// # Examples
/// ```
/// use pinpoint::domain::{DomainResult, Error};
///
/// fn reject() -> DomainResult<()> {
///     Err(Error::forbidden("nope"))
/// }
/// assert!(reject().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
