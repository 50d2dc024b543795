//! Issue subscriptions.
//!
//! A watcher row is unique per (issue, user). The reasons that caused the
//! subscription are an annotation unioned on every insert, never part of the
//! key, so auto-watch rules firing twice leave exactly one row.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{IssueId, OrganizationId, UserId};

/// Why a user watches an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchReason {
    /// The user subscribed by hand.
    Explicit,
    /// The user reported the issue.
    AutoCreated,
    /// The issue was assigned to the user.
    AutoAssigned,
    /// The user owns the machine the issue was filed against.
    AutoOwnedMachine,
}

impl WatchReason {
    /// Every reason, in flag-bit order.
    pub const ALL: [Self; 4] = [
        Self::Explicit,
        Self::AutoCreated,
        Self::AutoAssigned,
        Self::AutoOwnedMachine,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::Explicit => 1,
            Self::AutoCreated => 1 << 1,
            Self::AutoAssigned => 1 << 2,
            Self::AutoOwnedMachine => 1 << 3,
        }
    }
}

/// Union of [`WatchReason`] flags persisted as a small integer mask.
///
/// # Examples
/// ```
/// use pinpoint::domain::{WatchReason, WatchReasons};
///
/// let reasons = WatchReasons::from(WatchReason::AutoCreated).union(WatchReason::Explicit.into());
/// assert!(reasons.contains(WatchReason::Explicit));
/// assert_eq!(reasons.bits(), 0b0011);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchReasons(u8);

impl WatchReasons {
    const KNOWN_BITS: u8 = 0b1111;

    /// No reason recorded.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Rebuild from a stored mask, dropping unknown bits.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::KNOWN_BITS)
    }

    /// Raw mask for storage.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Union of both sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `reason` is present.
    pub const fn contains(self, reason: WatchReason) -> bool {
        self.0 & reason.bit() != 0
    }

    /// Whether no reason is present.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate present reasons in flag-bit order.
    pub fn iter(self) -> impl Iterator<Item = WatchReason> {
        WatchReason::ALL
            .into_iter()
            .filter(move |reason| self.contains(*reason))
    }
}

impl From<WatchReason> for WatchReasons {
    fn from(value: WatchReason) -> Self {
        Self(value.bit())
    }
}

impl FromIterator<WatchReason> for WatchReasons {
    fn from_iter<T: IntoIterator<Item = WatchReason>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, reason| acc.union(reason.into()))
    }
}

impl fmt::Display for WatchReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iter()
            .map(|reason| match reason {
                WatchReason::Explicit => "explicit",
                WatchReason::AutoCreated => "auto_created",
                WatchReason::AutoAssigned => "auto_assigned",
                WatchReason::AutoOwnedMachine => "auto_owned_machine",
            })
            .collect();
        f.write_str(&names.join("|"))
    }
}

/// Subscription of one user to one issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watcher {
    /// Organization owning the issue.
    pub organization_id: OrganizationId,
    /// Watched issue.
    pub issue_id: IssueId,
    /// Subscribed user.
    pub user_id: UserId,
    /// Union of reasons for the subscription.
    pub reasons: WatchReasons,
}

impl Watcher {
    /// Build a watcher with a single reason.
    pub fn new(
        organization_id: OrganizationId,
        issue_id: IssueId,
        user_id: UserId,
        reason: WatchReason,
    ) -> Self {
        Self {
            organization_id,
            issue_id,
            user_id,
            reasons: reason.into(),
        }
    }
}
