//! Notification records, issue events, and delivery plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use super::{
    CommentId, EmailAddress, EventId, IssueId, IssueStatus, MachineId, NotificationCategory,
    NotificationId, OrganizationId, UserId,
};

/// Namespace for deriving notification ids from (event, recipient).
const NOTIFICATION_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5f0c_9a3e_2b71_4d8e_9c41_7a2e_d0b3_6f15);

impl NotificationId {
    /// Stable id for the notification `recipient` receives about `event`.
    ///
    /// Retrying the same event yields the same id, so a second insert is
    /// absorbed by the primary key instead of duplicating the row.
    pub fn for_delivery(event: EventId, recipient: UserId) -> Self {
        let name = [
            event.as_uuid().as_bytes().as_slice(),
            recipient.as_uuid().as_bytes().as_slice(),
        ]
        .concat();
        Self::from_uuid(Uuid::new_v5(&NOTIFICATION_ID_NAMESPACE, &name))
    }
}

/// Human-readable message plus the deep link it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Message shown to the recipient.
    pub message: String,
    /// Relative link into the application.
    pub link: String,
}

impl NotificationPayload {
    /// Payload linking to `issue_id`.
    pub fn for_issue(issue_id: IssueId, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            link: format!("/issues/{issue_id}"),
        }
    }
}

/// Persisted, user-visible record of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Deterministic identifier, see [`NotificationId::for_delivery`].
    pub id: NotificationId,
    /// Recipient.
    pub recipient_id: UserId,
    /// Organization the event happened in.
    pub organization_id: OrganizationId,
    /// Event category.
    pub category: NotificationCategory,
    /// Rendered message and link.
    pub payload: NotificationPayload,
    /// Event that produced the notification.
    pub event_id: EventId,
    /// When the recipient read it.
    pub read_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Whether the recipient has not read it yet.
    pub const fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// What happened to the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum IssueEventKind {
    /// An issue was reported.
    Created {
        /// Machine the issue was filed against.
        machine_id: MachineId,
    },
    /// The status changed.
    StatusChanged {
        /// Previous status.
        from: IssueStatus,
        /// New status.
        to: IssueStatus,
    },
    /// The assignee changed.
    Assigned {
        /// New assignee; `None` when unassigned.
        assignee: Option<UserId>,
    },
    /// A comment was added.
    Commented {
        /// The new comment.
        comment_id: CommentId,
    },
}

impl IssueEventKind {
    /// Category used for per-issue watchers.
    pub const fn category(&self) -> NotificationCategory {
        match self {
            Self::Created { .. } => NotificationCategory::NewIssue,
            Self::StatusChanged { .. } => NotificationCategory::StatusChange,
            Self::Assigned { .. } => NotificationCategory::Assignment,
            Self::Commented { .. } => NotificationCategory::Comment,
        }
    }
}

/// Descriptor passed from a mutation to the notification engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueEvent {
    /// Identifier reused across retries of the same mutation.
    pub event_id: EventId,
    /// Organization the issue lives in.
    pub organization_id: OrganizationId,
    /// Acting user; `None` for anonymous public reports.
    pub actor: Option<UserId>,
    /// Subject issue.
    pub issue_id: IssueId,
    /// What happened.
    pub kind: IssueEventKind,
    /// Rendered message and link.
    pub payload: NotificationPayload,
}

/// Template the email transport renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    /// New issue in the organization feed.
    IssueCreated,
    /// New issue on an owned machine.
    MachineIssueCreated,
    /// Status change.
    IssueStatusChanged,
    /// Assignment.
    IssueAssigned,
    /// New comment.
    CommentAdded,
}

impl EmailTemplate {
    /// Template for a category.
    pub const fn for_category(category: NotificationCategory) -> Self {
        match category {
            NotificationCategory::NewIssue => Self::IssueCreated,
            NotificationCategory::MachineOwned => Self::MachineIssueCreated,
            NotificationCategory::StatusChange => Self::IssueStatusChanged,
            NotificationCategory::Assignment => Self::IssueAssigned,
            NotificationCategory::Comment => Self::CommentAdded,
        }
    }

    /// Template identifier understood by the transport.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IssueCreated => "issue-created",
            Self::MachineIssueCreated => "machine-issue-created",
            Self::IssueStatusChanged => "issue-status-changed",
            Self::IssueAssigned => "issue-assigned",
            Self::CommentAdded => "comment-added",
        }
    }
}

/// One email the engine decided to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDelivery {
    /// Recipient user.
    pub recipient_id: UserId,
    /// Deliverable address; never on the internal facade domain.
    pub address: EmailAddress,
    /// Template to render.
    pub template: EmailTemplate,
    /// Template payload.
    pub payload: NotificationPayload,
}

/// Step of planning that failed without aborting the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanFault {
    /// Watchers of the issue could not be listed.
    Watchers {
        /// Adapter message.
        message: String,
    },
    /// Current members of the organization could not be listed; nobody was
    /// notified.
    Memberships {
        /// Adapter message.
        message: String,
    },
    /// Global watchers of the organization could not be listed.
    GlobalWatchers {
        /// Adapter message.
        message: String,
    },
    /// Preferences could not be loaded; defaults were used.
    Preferences {
        /// Adapter message.
        message: String,
    },
    /// Contacts could not be loaded; emails were skipped.
    Contacts {
        /// Adapter message.
        message: String,
    },
    /// Notification rows could not be persisted.
    Persistence {
        /// Adapter message.
        message: String,
    },
}

impl PlanFault {
    /// Short label for log fields.
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Watchers { .. } => "watchers",
            Self::Memberships { .. } => "memberships",
            Self::GlobalWatchers { .. } => "global_watchers",
            Self::Preferences { .. } => "preferences",
            Self::Contacts { .. } => "contacts",
            Self::Persistence { .. } => "persistence",
        }
    }

    /// Adapter message.
    pub fn message(&self) -> &str {
        match self {
            Self::Watchers { message }
            | Self::Memberships { message }
            | Self::GlobalWatchers { message }
            | Self::Preferences { message }
            | Self::Contacts { message }
            | Self::Persistence { message } => message,
        }
    }
}

/// Outcome of deciding who hears about an event and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPlan {
    /// Event the plan was built for.
    pub event_id: EventId,
    /// In-app rows to persist with the triggering mutation.
    pub notifications: Vec<Notification>,
    /// Emails to attempt after commit.
    pub emails: Vec<EmailDelivery>,
    /// Faults encountered while planning; the plan may be partial.
    pub faults: Vec<PlanFault>,
}

impl DeliveryPlan {
    /// Empty plan for `event_id`.
    pub const fn empty(event_id: EventId) -> Self {
        Self {
            event_id,
            notifications: Vec::new(),
            emails: Vec::new(),
            faults: Vec::new(),
        }
    }

    /// Ids of the planned notification rows.
    pub fn notification_ids(&self) -> Vec<NotificationId> {
        self.notifications.iter().map(|row| row.id).collect()
    }

    /// Users receiving an in-app notification.
    pub fn in_app_recipients(&self) -> Vec<UserId> {
        self.notifications.iter().map(|row| row.recipient_id).collect()
    }

    /// Users receiving an email.
    pub fn email_recipients(&self) -> Vec<UserId> {
        self.emails.iter().map(|email| email.recipient_id).collect()
    }

    /// Whether any fault was recorded.
    pub fn is_partial(&self) -> bool {
        !self.faults.is_empty()
    }
}

/// Result of attempting the planned emails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Emails accepted by the transport.
    pub sent: usize,
    /// Recipients whose send failed.
    pub failed: Vec<UserId>,
}

/// Emails handed off after a mutation committed.
///
/// The command returns as soon as the handle exists; sends run on a spawned
/// task when a Tokio runtime is available. Awaiting [`DeliveryHandle::finished`]
/// is optional and only observes the outcome.
#[derive(Debug)]
pub struct DeliveryHandle {
    queued: usize,
    state: DeliveryState,
}

#[derive(Debug)]
enum DeliveryState {
    Done(DeliveryReport),
    Running(JoinHandle<DeliveryReport>),
}

impl DeliveryHandle {
    /// Handle for sends that already completed.
    pub const fn done(queued: usize, report: DeliveryReport) -> Self {
        Self {
            queued,
            state: DeliveryState::Done(report),
        }
    }

    /// Handle for sends running on `task`.
    pub const fn running(queued: usize, task: JoinHandle<DeliveryReport>) -> Self {
        Self {
            queued,
            state: DeliveryState::Running(task),
        }
    }

    /// Number of emails handed to the transport.
    pub const fn queued(&self) -> usize {
        self.queued
    }

    /// Wait for every send and return their outcomes.
    ///
    /// A task that panicked or was cancelled reports every queued email as
    /// unsent without naming recipients.
    pub async fn finished(self) -> DeliveryReport {
        let Self { queued, state } = self;
        match state {
            DeliveryState::Done(report) => report,
            DeliveryState::Running(task) => task.await.unwrap_or_else(|error| {
                warn!(%error, queued, "email delivery task did not finish");
                DeliveryReport::default()
            }),
        }
    }
}
