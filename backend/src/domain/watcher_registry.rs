//! Issue subscriptions and the auto-watch rules.
//!
//! Per-issue subscriptions are rows unique per (issue, user). The
//! organization-wide "watch all new issues" preference is never materialised
//! as rows; [`WatcherRegistry::list_global_watchers`] resolves it from stored
//! preferences at dispatch time.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use super::port_errors::{map_preferences_error, map_watcher_error};
use super::ports::{NotificationPreferencesRepository, WatcherRepository};
use super::{
    Error, Issue, IssueId, Machine, NotificationPreferences, OrganizationGuard, OrganizationId,
    Permission, Session, UserId, WatchReason, Watcher,
};

/// Subscription store plus the rules that decide who auto-watches an issue.
#[derive(Clone)]
pub struct WatcherRegistry {
    guard: OrganizationGuard,
    watchers: Arc<dyn WatcherRepository>,
    preferences: Arc<dyn NotificationPreferencesRepository>,
}

impl WatcherRegistry {
    /// Create a registry.
    pub fn new(
        guard: OrganizationGuard,
        watchers: Arc<dyn WatcherRepository>,
        preferences: Arc<dyn NotificationPreferencesRepository>,
    ) -> Self {
        Self {
            guard,
            watchers,
            preferences,
        }
    }

    /// Subscribe a user; re-adding an existing pair unions the reasons.
    pub async fn add_watcher(&self, watcher: &Watcher) -> Result<(), Error> {
        self.watchers
            .upsert(watcher)
            .await
            .map_err(map_watcher_error)?;
        debug!(
            organization_id = %watcher.organization_id,
            issue_id = %watcher.issue_id,
            user_id = %watcher.user_id,
            reasons = %watcher.reasons,
            "watcher upserted"
        );
        Ok(())
    }

    /// Unsubscribe a user. Returns whether a subscription existed.
    pub async fn remove_watcher(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
        user_id: &UserId,
    ) -> Result<bool, Error> {
        self.watchers
            .remove(organization_id, issue_id, user_id)
            .await
            .map_err(map_watcher_error)
    }

    /// Watchers of the issue, one entry per user, ordered by user id.
    pub async fn list_watchers(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
    ) -> Result<Vec<Watcher>, Error> {
        let rows = self
            .watchers
            .list_for_issue(organization_id, issue_id)
            .await
            .map_err(map_watcher_error)?;
        Ok(merge_by_user(
            rows.into_iter()
                .filter(|row| row.organization_id == *organization_id),
        ))
    }

    /// Members following every new issue in the organization.
    pub async fn list_global_watchers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<BTreeSet<UserId>, Error> {
        self.preferences
            .list_global_watchers(organization_id)
            .await
            .map(|users| users.into_iter().collect())
            .map_err(map_preferences_error)
    }

    /// Explicitly subscribe the session user to an issue they can view.
    pub async fn watch(&self, session: &Session, issue_id: &IssueId) -> Result<Watcher, Error> {
        let authorized = self
            .guard
            .authorize_issue(session, issue_id, Permission::IssueView)
            .await?;
        let watcher = Watcher::new(
            session.organization_id,
            authorized.issue.id,
            session.user_id,
            WatchReason::Explicit,
        );
        self.add_watcher(&watcher).await?;
        Ok(watcher)
    }

    /// Unsubscribe the session user from an issue they can view.
    pub async fn unwatch(&self, session: &Session, issue_id: &IssueId) -> Result<bool, Error> {
        let authorized = self
            .guard
            .authorize_issue(session, issue_id, Permission::IssueView)
            .await?;
        self.remove_watcher(
            &session.organization_id,
            &authorized.issue.id,
            &session.user_id,
        )
        .await
    }

    /// Subscriptions created when `issue` is reported against `machine`.
    ///
    /// The authenticated reporter watches unless `auto_watch_created` is off;
    /// the machine owner watches when `auto_watch_owned_machines` is on.
    /// Missing preference rows mean the defaults, which enable both.
    pub fn watchers_for_new_issue(
        issue: &Issue,
        creator_preferences: Option<&NotificationPreferences>,
        machine: &Machine,
        owner_preferences: Option<&NotificationPreferences>,
    ) -> Vec<Watcher> {
        let creator = issue.created_by.filter(|_| {
            creator_preferences.is_none_or(|prefs| prefs.auto_watch_created)
        });
        let owner = machine.owner_id.filter(|_| {
            owner_preferences.is_none_or(|prefs| prefs.auto_watch_owned_machines)
        });

        let rows = creator
            .map(|user| Watcher::new(issue.organization_id, issue.id, user, WatchReason::AutoCreated))
            .into_iter()
            .chain(owner.map(|user| {
                Watcher::new(
                    issue.organization_id,
                    issue.id,
                    user,
                    WatchReason::AutoOwnedMachine,
                )
            }));
        merge_by_user(rows)
    }

    /// Subscription created when `issue` is assigned to `assignee`.
    pub fn watchers_for_assignment(issue: &Issue, assignee: Option<UserId>) -> Vec<Watcher> {
        assignee
            .map(|user| {
                Watcher::new(
                    issue.organization_id,
                    issue.id,
                    user,
                    WatchReason::AutoAssigned,
                )
            })
            .into_iter()
            .collect()
    }
}

/// Collapse rows sharing a user into one, unioning their reasons.
pub(crate) fn merge_by_user(rows: impl IntoIterator<Item = Watcher>) -> Vec<Watcher> {
    let mut merged: BTreeMap<UserId, Watcher> = BTreeMap::new();
    for row in rows {
        merged
            .entry(row.user_id)
            .and_modify(|existing| existing.reasons = existing.reasons.union(row.reasons))
            .or_insert(row);
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::{IssuePriority, IssueSeverity, IssueStatus, MachineId, WatchReasons};

    #[fixture]
    fn issue() -> Issue {
        let now = Utc::now();
        Issue {
            id: IssueId::random(),
            organization_id: OrganizationId::random(),
            machine_id: MachineId::random(),
            title: "Coin mech rejects tokens".to_owned(),
            status: IssueStatus::New,
            priority: IssuePriority::High,
            severity: IssueSeverity::Unplayable,
            created_by: Some(UserId::random()),
            assigned_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn machine_for(issue: &Issue, owner: Option<UserId>) -> Machine {
        Machine {
            id: issue.machine_id,
            organization_id: issue.organization_id,
            name: "Medieval Madness".to_owned(),
            owner_id: owner,
        }
    }

    #[rstest]
    fn reporter_and_owner_auto_watch_by_default(issue: Issue) {
        let owner = UserId::random();
        let rows =
            WatcherRegistry::watchers_for_new_issue(&issue, None, &machine_for(&issue, Some(owner)), None);

        let users: Vec<UserId> = rows.iter().map(|row| row.user_id).collect();
        assert_eq!(users.len(), 2);
        assert!(users.contains(&owner));
        assert!(issue.created_by.is_some_and(|creator| users.contains(&creator)));
    }

    #[rstest]
    fn reporter_who_owns_the_machine_gets_one_row(issue: Issue) {
        let creator = issue.created_by;
        let rows =
            WatcherRegistry::watchers_for_new_issue(&issue, None, &machine_for(&issue, creator), None);

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows.first().map(|row| row.reasons),
            Some(WatchReasons::from_iter([
                WatchReason::AutoCreated,
                WatchReason::AutoOwnedMachine
            ]))
        );
    }

    #[rstest]
    fn preferences_can_disable_auto_watch(issue: Issue) {
        let owner = UserId::random();
        let mut creator_prefs =
            NotificationPreferences::defaults(UserId::random(), issue.organization_id, Utc::now());
        creator_prefs.auto_watch_created = false;
        let mut owner_prefs =
            NotificationPreferences::defaults(owner, issue.organization_id, Utc::now());
        owner_prefs.auto_watch_owned_machines = false;

        let rows = WatcherRegistry::watchers_for_new_issue(
            &issue,
            Some(&creator_prefs),
            &machine_for(&issue, Some(owner)),
            Some(&owner_prefs),
        );
        assert!(rows.is_empty());
    }

    #[rstest]
    fn anonymous_report_on_unowned_machine_creates_no_rows(mut issue: Issue) {
        issue.created_by = None;
        let rows =
            WatcherRegistry::watchers_for_new_issue(&issue, None, &machine_for(&issue, None), None);
        assert!(rows.is_empty());
    }

    #[rstest]
    fn unassignment_creates_no_rows(issue: Issue) {
        assert!(WatcherRegistry::watchers_for_assignment(&issue, None).is_empty());
    }

    #[rstest]
    fn merge_unions_duplicate_users(issue: Issue) {
        let user = UserId::random();
        let merged = merge_by_user([
            Watcher::new(issue.organization_id, issue.id, user, WatchReason::Explicit),
            Watcher::new(issue.organization_id, issue.id, user, WatchReason::AutoAssigned),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.first().map(|row| row.reasons.bits()), Some(0b0101));
    }
}
