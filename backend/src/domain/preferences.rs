//! Per-user, per-organization notification preferences.
//!
//! A user with no stored row uses [`NotificationPreferences::defaults`]. The
//! per-category defaults are part of the contract: status changes, assignments,
//! comments, and issues on owned machines notify in-app and by email, while the
//! organization-wide new-issue feed is off until the user opts in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OrganizationId, UserId};

/// Event category a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// A new issue anywhere in the organization ("watch all new issues").
    NewIssue,
    /// An issue changed status.
    StatusChange,
    /// An issue was assigned.
    Assignment,
    /// A comment was added.
    Comment,
    /// A new issue was filed against a machine the user owns.
    MachineOwned,
}

impl NotificationCategory {
    /// Every category.
    pub const ALL: [Self; 5] = [
        Self::NewIssue,
        Self::StatusChange,
        Self::Assignment,
        Self::Comment,
        Self::MachineOwned,
    ];

    /// Storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewIssue => "new_issue",
            Self::StatusChange => "status_change",
            Self::Assignment => "assignment",
            Self::Comment => "comment",
            Self::MachineOwned => "machine_owned",
        }
    }

    /// Channel defaults used when the user stored no preference row.
    pub const fn default_channels(self) -> ChannelToggles {
        match self {
            Self::NewIssue => ChannelToggles::OFF,
            Self::StatusChange | Self::Assignment | Self::Comment | Self::MachineOwned => {
                ChannelToggles::ON
            }
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification category: {input}")]
pub struct ParseCategoryError {
    /// The unrecognised input value.
    pub input: String,
}

impl FromStr for NotificationCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ParseCategoryError {
                input: s.to_owned(),
            })
    }
}

/// Delivery channels enabled for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelToggles {
    /// Create an in-app notification row.
    pub in_app: bool,
    /// Send an email through the transport.
    pub email: bool,
}

impl ChannelToggles {
    /// Both channels enabled.
    pub const ON: Self = Self {
        in_app: true,
        email: true,
    };
    /// Both channels disabled.
    pub const OFF: Self = Self {
        in_app: false,
        email: false,
    };

    /// Channel-wise OR.
    #[must_use]
    pub const fn or(self, other: Self) -> Self {
        Self {
            in_app: self.in_app || other.in_app,
            email: self.email || other.email,
        }
    }

    /// Whether any channel is enabled.
    pub const fn any(self) -> bool {
        self.in_app || self.email
    }
}

/// Channel toggles for every category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPreferences {
    /// Organization-wide new-issue feed.
    pub new_issue: ChannelToggles,
    /// Status changes on watched issues.
    pub status_change: ChannelToggles,
    /// Assignments on watched issues.
    pub assignment: ChannelToggles,
    /// Comments on watched issues.
    pub comment: ChannelToggles,
    /// New issues on owned machines.
    pub machine_owned: ChannelToggles,
}

impl Default for CategoryPreferences {
    fn default() -> Self {
        Self {
            new_issue: NotificationCategory::NewIssue.default_channels(),
            status_change: NotificationCategory::StatusChange.default_channels(),
            assignment: NotificationCategory::Assignment.default_channels(),
            comment: NotificationCategory::Comment.default_channels(),
            machine_owned: NotificationCategory::MachineOwned.default_channels(),
        }
    }
}

impl CategoryPreferences {
    /// Toggles for `category`.
    pub const fn get(&self, category: NotificationCategory) -> ChannelToggles {
        match category {
            NotificationCategory::NewIssue => self.new_issue,
            NotificationCategory::StatusChange => self.status_change,
            NotificationCategory::Assignment => self.assignment,
            NotificationCategory::Comment => self.comment,
            NotificationCategory::MachineOwned => self.machine_owned,
        }
    }

    fn get_mut(&mut self, category: NotificationCategory) -> &mut ChannelToggles {
        match category {
            NotificationCategory::NewIssue => &mut self.new_issue,
            NotificationCategory::StatusChange => &mut self.status_change,
            NotificationCategory::Assignment => &mut self.assignment,
            NotificationCategory::Comment => &mut self.comment,
            NotificationCategory::MachineOwned => &mut self.machine_owned,
        }
    }
}

/// Notification settings for one user in one organization.
///
/// Email toggles are kept for accounts without a deliverable address; the
/// decision engine simply never acts on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    /// Owner of the preferences.
    pub user_id: UserId,
    /// Organization the preferences apply to.
    pub organization_id: OrganizationId,
    /// Master switch for the email channel.
    pub email_enabled: bool,
    /// Watch issues the user reports.
    pub auto_watch_created: bool,
    /// Watch new issues on machines the user owns.
    pub auto_watch_owned_machines: bool,
    /// Per-category channel toggles.
    pub categories: CategoryPreferences,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    /// Contractual defaults for a user with no stored row.
    pub fn defaults(user_id: UserId, organization_id: OrganizationId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            organization_id,
            email_enabled: true,
            auto_watch_created: true,
            auto_watch_owned_machines: true,
            categories: CategoryPreferences::default(),
            updated_at: now,
        }
    }

    /// Channels enabled for `category`, with the email master switch applied.
    pub fn channels_for(&self, category: NotificationCategory) -> ChannelToggles {
        let toggles = self.categories.get(category);
        ChannelToggles {
            in_app: toggles.in_app,
            email: toggles.email && self.email_enabled,
        }
    }

    /// Whether the user follows every new issue in the organization.
    pub fn watches_all_new_issues(&self) -> bool {
        self.categories.new_issue.any()
    }

    /// Apply `patch`, stamping `now` as the update time.
    #[must_use]
    pub fn apply(mut self, patch: &PreferencesPatch, now: DateTime<Utc>) -> Self {
        if let Some(value) = patch.email_enabled {
            self.email_enabled = value;
        }
        if let Some(value) = patch.auto_watch_created {
            self.auto_watch_created = value;
        }
        if let Some(value) = patch.auto_watch_owned_machines {
            self.auto_watch_owned_machines = value;
        }
        for (category, channel_patch) in &patch.categories {
            let toggles = self.categories.get_mut(*category);
            if let Some(in_app) = channel_patch.in_app {
                toggles.in_app = in_app;
            }
            if let Some(email) = channel_patch.email {
                toggles.email = email;
            }
        }
        self.updated_at = now;
        self
    }
}

/// Partial update of one category's channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPatch {
    /// New in-app toggle.
    pub in_app: Option<bool>,
    /// New email toggle.
    pub email: Option<bool>,
}

/// Partial update of [`NotificationPreferences`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    /// New email master switch.
    pub email_enabled: Option<bool>,
    /// New auto-watch-on-create setting.
    pub auto_watch_created: Option<bool>,
    /// New auto-watch-owned-machines setting.
    pub auto_watch_owned_machines: Option<bool>,
    /// Category channel changes, applied in order.
    #[serde(default)]
    pub categories: Vec<(NotificationCategory, ChannelPatch)>,
}

impl PreferencesPatch {
    /// Add a category channel change.
    #[must_use]
    pub fn with_category(mut self, category: NotificationCategory, patch: ChannelPatch) -> Self {
        self.categories.push((category, patch));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn defaults() -> NotificationPreferences {
        NotificationPreferences::defaults(UserId::random(), OrganizationId::random(), Utc::now())
    }

    #[rstest]
    #[case::new_issue(NotificationCategory::NewIssue, ChannelToggles::OFF)]
    #[case::status(NotificationCategory::StatusChange, ChannelToggles::ON)]
    #[case::assignment(NotificationCategory::Assignment, ChannelToggles::ON)]
    #[case::comment(NotificationCategory::Comment, ChannelToggles::ON)]
    #[case::machine_owned(NotificationCategory::MachineOwned, ChannelToggles::ON)]
    fn category_defaults(#[case] category: NotificationCategory, #[case] expected: ChannelToggles) {
        assert_eq!(defaults().channels_for(category), expected);
    }

    #[rstest]
    fn defaults_do_not_watch_all_new_issues() {
        assert!(!defaults().watches_all_new_issues());
    }

    #[rstest]
    fn email_master_switch_masks_categories() {
        let patch = PreferencesPatch {
            email_enabled: Some(false),
            ..PreferencesPatch::default()
        };
        let prefs = defaults().apply(&patch, Utc::now());

        let toggles = prefs.channels_for(NotificationCategory::Comment);
        assert!(toggles.in_app);
        assert!(!toggles.email);
    }

    #[rstest]
    fn patch_only_touches_named_channels() {
        let patch = PreferencesPatch::default().with_category(
            NotificationCategory::NewIssue,
            ChannelPatch {
                in_app: Some(true),
                email: None,
            },
        );
        let prefs = defaults().apply(&patch, Utc::now());

        assert_eq!(
            prefs.categories.new_issue,
            ChannelToggles {
                in_app: true,
                email: false
            }
        );
        assert!(prefs.watches_all_new_issues());
        assert_eq!(prefs.categories.comment, ChannelToggles::ON);
    }

    #[rstest]
    fn category_strings_round_trip() {
        for category in NotificationCategory::ALL {
            assert_eq!(category.as_str().parse(), Ok(category));
        }
    }
}
