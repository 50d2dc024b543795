//! Issues, comments, and the machine catalogue view the core needs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CommentId, IssueId, MachineId, OrganizationId, UserId};

/// Maximum issue title length in characters.
pub const ISSUE_TITLE_MAX: usize = 200;
/// Maximum comment body length in characters.
pub const COMMENT_BODY_MAX: usize = 5000;

/// Error returned when parsing an unknown enumeration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {input}")]
pub struct ParseIssueFieldError {
    /// Field being parsed.
    pub kind: &'static str,
    /// The unrecognised input value.
    pub input: String,
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$variant_meta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$variant_meta])* $variant, )+
        }

        impl $name {
            /// Storage representation.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseIssueFieldError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    _ => Err(ParseIssueFieldError {
                        kind: $kind,
                        input: s.to_owned(),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// Lifecycle status of an issue. Issues are never deleted.
    IssueStatus, "issue status" {
        /// Freshly reported.
        New => "new",
        /// Reproduced by a technician.
        Confirmed => "confirmed",
        /// Work has started.
        InProgress => "in_progress",
        /// Blocked on parts.
        NeedsParts => "needs_parts",
        /// Blocked on the machine owner.
        WaitingOnOwner => "waiting_on_owner",
        /// Repaired.
        Fixed => "fixed",
        /// Closed without a repair.
        WontFix => "wont_fix",
        /// Closed as a duplicate of another issue.
        Duplicate => "duplicate",
    }
);

impl IssueStatus {
    /// Whether the status closes the issue.
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Fixed | Self::WontFix | Self::Duplicate)
    }
}

string_enum!(
    /// How soon the issue should be handled.
    IssuePriority, "issue priority" {
        /// Whenever convenient.
        Low => "low",
        /// Normal queue.
        Medium => "medium",
        /// Next visit.
        High => "high",
    }
);

string_enum!(
    /// Player-facing impact of the fault.
    IssueSeverity, "issue severity" {
        /// Cosmetic.
        Minor => "minor",
        /// Degraded but playable.
        Playable => "playable",
        /// Machine cannot be played.
        Unplayable => "unplayable",
    }
);

/// Machine as seen by the core: only ownership and tenancy matter here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// Machine identifier.
    pub id: MachineId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Display name used in notification messages.
    pub name: String,
    /// Member who owns the physical machine, if any.
    pub owner_id: Option<UserId>,
}

/// Equipment fault reported against a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Issue identifier.
    pub id: IssueId,
    /// Owning organization; set at creation and never reassigned.
    pub organization_id: OrganizationId,
    /// Machine the fault was reported against.
    pub machine_id: MachineId,
    /// Short description.
    pub title: String,
    /// Lifecycle status.
    pub status: IssueStatus,
    /// Handling priority.
    pub priority: IssuePriority,
    /// Player impact.
    pub severity: IssueSeverity,
    /// Reporter; `None` for anonymous public reports.
    pub created_by: Option<UserId>,
    /// Current assignee.
    pub assigned_to: Option<UserId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Input for reporting a new issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssue {
    /// Machine the fault concerns.
    pub machine_id: MachineId,
    /// Short description.
    pub title: String,
    /// Handling priority.
    pub priority: IssuePriority,
    /// Player impact.
    pub severity: IssueSeverity,
}

/// Validated, trimmed issue title.
pub fn validate_title(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("issue title must not be empty".to_owned());
    }
    if trimmed.chars().count() > ISSUE_TITLE_MAX {
        return Err(format!(
            "issue title must be at most {ISSUE_TITLE_MAX} characters"
        ));
    }
    Ok(trimmed.to_owned())
}

/// Validated, trimmed comment body.
pub fn validate_comment_body(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("comment must not be empty".to_owned());
    }
    if trimmed.chars().count() > COMMENT_BODY_MAX {
        return Err(format!(
            "comment must be at most {COMMENT_BODY_MAX} characters"
        ));
    }
    Ok(trimmed.to_owned())
}

/// Comment left on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment identifier.
    pub id: CommentId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Issue commented on.
    pub issue_id: IssueId,
    /// Author.
    pub author_id: UserId,
    /// Trimmed body text.
    pub body: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
