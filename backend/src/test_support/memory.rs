//! In-memory implementation of every persistence port.
//!
//! Mirrors the relational constraints the migrations declare: one membership
//! per (user, organization), one watcher row per (issue, user) with reasons
//! unioned, and notification ids as primary keys with duplicate inserts
//! skipped. `commit` applies a change set all-or-nothing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;

use crate::domain::ports::{
    AccessChangeOutcome, AccessRepositoryError, DirectoryError, EmailTransport, InboxQuery,
    IssueChangeSet, IssueRepository, IssueRepositoryError, IssueWrite, MachineRepository,
    MembershipRepository, NotificationPreferencesRepository,
    NotificationPreferencesRepositoryError, NotificationRepository, NotificationRepositoryError,
    RoleRepository, UserDirectory, WatcherRepository, WatcherRepositoryError,
};
use crate::domain::{
    AccessChange, Comment, EmailAddress, Issue, IssueId, Machine, MachineId, Membership,
    Notification, NotificationId, NotificationPreferences, OrganizationId, Role, RoleId,
    SystemRole, UserContact, UserId, Watcher, violates_last_admin,
};
use crate::services::PinpointPorts;

/// Storage operations that can be made to fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// `WatcherRepository::list_for_issue` fails.
    pub watchers: bool,
    /// `NotificationPreferencesRepository::list_global_watchers` fails.
    pub global_watchers: bool,
    /// Preference lookups fail.
    pub preferences: bool,
    /// `UserDirectory::find_contacts` fails.
    pub contacts: bool,
    /// `MembershipRepository::list_for_organization` fails.
    pub memberships: bool,
    /// Notification inserts fail.
    pub notifications: bool,
    /// `IssueRepository::commit` fails.
    pub commit: bool,
}

/// Role ids seeded for a new organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededOrganization {
    /// Organization id.
    pub id: OrganizationId,
    /// System Admin role.
    pub admin_role: RoleId,
    /// System Member role.
    pub member_role: RoleId,
    /// System Guest role.
    pub guest_role: RoleId,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserId, UserContact>,
    roles: BTreeMap<RoleId, Role>,
    memberships: Vec<Membership>,
    machines: BTreeMap<MachineId, Machine>,
    issues: BTreeMap<IssueId, Issue>,
    comments: Vec<Comment>,
    watchers: BTreeMap<(IssueId, UserId), Watcher>,
    preferences: BTreeMap<(OrganizationId, UserId), NotificationPreferences>,
    notifications: BTreeMap<NotificationId, Notification>,
    faults: Faults,
    commits: usize,
}

/// Shared in-memory store; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports backed by this store.
    pub fn ports(&self, transport: Arc<dyn EmailTransport>, clock: Arc<dyn Clock>) -> PinpointPorts {
        PinpointPorts {
            memberships: Arc::new(self.clone()),
            roles: Arc::new(self.clone()),
            issues: Arc::new(self.clone()),
            machines: Arc::new(self.clone()),
            directory: Arc::new(self.clone()),
            watchers: Arc::new(self.clone()),
            preferences: Arc::new(self.clone()),
            notifications: Arc::new(self.clone()),
            transport,
            clock,
        }
    }

    /// Seed an organization with the system role templates.
    pub fn create_organization(&self) -> SeededOrganization {
        let id = OrganizationId::random();
        let [admin, member, guest] = SystemRole::ALL.map(|template| template.instantiate(id));
        let seeded = SeededOrganization {
            id,
            admin_role: admin.id,
            member_role: member.id,
            guest_role: guest.id,
        };
        let mut state = self.lock();
        for role in [admin, member, guest] {
            state.roles.insert(role.id, role);
        }
        seeded
    }

    /// Register a user. Unparseable addresses are stored as no address.
    pub fn add_user(&self, display_name: &str, email: Option<&str>) -> UserId {
        let id = UserId::random();
        let contact = UserContact {
            id,
            display_name: display_name.to_owned(),
            email: email.and_then(|raw| EmailAddress::new(raw).ok()),
        };
        self.lock().users.insert(id, contact);
        id
    }

    /// Make `user_id` a member of `organization_id` holding `role_id`.
    pub fn add_member(&self, organization_id: OrganizationId, user_id: UserId, role_id: RoleId) {
        let mut state = self.lock();
        state
            .memberships
            .retain(|m| !(m.organization_id == organization_id && m.user_id == user_id));
        state.memberships.push(Membership {
            user_id,
            organization_id,
            role_id,
        });
    }

    /// Register a user and make them a member in one step.
    pub fn add_user_with_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
        display_name: &str,
        email: Option<&str>,
    ) -> UserId {
        let user_id = self.add_user(display_name, email);
        self.add_member(organization_id, user_id, role_id);
        user_id
    }

    /// Store a role.
    pub fn put_role(&self, role: Role) {
        self.lock().roles.insert(role.id, role);
    }

    /// Register a machine.
    pub fn add_machine(
        &self,
        organization_id: OrganizationId,
        name: &str,
        owner_id: Option<UserId>,
    ) -> Machine {
        let machine = Machine {
            id: MachineId::random(),
            organization_id,
            name: name.to_owned(),
            owner_id,
        };
        self.lock().machines.insert(machine.id, machine.clone());
        machine
    }

    /// Store an issue directly, bypassing the command service.
    pub fn put_issue(&self, issue: Issue) {
        self.lock().issues.insert(issue.id, issue);
    }

    /// Store preferences directly.
    pub fn put_preferences(&self, preferences: NotificationPreferences) {
        self.lock().preferences.insert(
            (preferences.organization_id, preferences.user_id),
            preferences,
        );
    }

    /// Replace the fault switches.
    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Stored issue, regardless of organization.
    pub fn issue(&self, issue_id: &IssueId) -> Option<Issue> {
        self.lock().issues.get(issue_id).cloned()
    }

    /// Comments stored for an issue.
    pub fn comments(&self, issue_id: &IssueId) -> Vec<Comment> {
        self.lock()
            .comments
            .iter()
            .filter(|comment| comment.issue_id == *issue_id)
            .cloned()
            .collect()
    }

    /// Raw watcher rows for an issue.
    pub fn watcher_rows(&self, issue_id: &IssueId) -> Vec<Watcher> {
        self.lock()
            .watchers
            .values()
            .filter(|watcher| watcher.issue_id == *issue_id)
            .copied()
            .collect()
    }

    /// Every stored notification.
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.values().cloned().collect()
    }

    /// Notifications addressed to `user_id`.
    pub fn notifications_for(&self, user_id: &UserId) -> Vec<Notification> {
        self.lock()
            .notifications
            .values()
            .filter(|row| row.recipient_id == *user_id)
            .cloned()
            .collect()
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn upsert_watcher(state: &mut State, watcher: &Watcher) {
    state
        .watchers
        .entry((watcher.issue_id, watcher.user_id))
        .and_modify(|existing| existing.reasons = existing.reasons.union(watcher.reasons))
        .or_insert(*watcher);
}

fn insert_notifications(state: &mut State, rows: &[Notification]) -> usize {
    let mut inserted = 0;
    for row in rows {
        if !state.notifications.contains_key(&row.id) {
            state.notifications.insert(row.id, row.clone());
            inserted += 1;
        }
    }
    inserted
}

fn apply_change(state: &mut State, organization_id: &OrganizationId, change: &AccessChange) {
    let in_org = |m: &Membership| m.organization_id == *organization_id;
    match change {
        AccessChange::RolePermissions {
            role_id,
            permissions,
        } => {
            if let Some(role) = state.roles.get_mut(role_id) {
                role.permissions = permissions.clone();
            }
        }
        AccessChange::DeleteRole {
            role_id,
            reassign_to,
        } => {
            for membership in state
                .memberships
                .iter_mut()
                .filter(|m| in_org(m) && m.role_id == *role_id)
            {
                membership.role_id = *reassign_to;
            }
            state.roles.remove(role_id);
        }
        AccessChange::MemberRole { user_id, role_id } => {
            for membership in state
                .memberships
                .iter_mut()
                .filter(|m| in_org(m) && m.user_id == *user_id)
            {
                membership.role_id = *role_id;
            }
        }
        AccessChange::RemoveMember { user_id } => state
            .memberships
            .retain(|m| !(in_org(m) && m.user_id == *user_id)),
    }
}

#[async_trait]
impl MembershipRepository for InMemoryStore {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<Option<Membership>, AccessRepositoryError> {
        Ok(self
            .lock()
            .memberships
            .iter()
            .find(|m| m.organization_id == *organization_id && m.user_id == *user_id)
            .copied())
    }

    async fn list_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Membership>, AccessRepositoryError> {
        let state = self.lock();
        if state.faults.memberships {
            return Err(AccessRepositoryError::connection("memberships unavailable"));
        }
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.organization_id == *organization_id)
            .copied()
            .collect())
    }

    async fn apply_access_change(
        &self,
        organization_id: &OrganizationId,
        change: &AccessChange,
    ) -> Result<AccessChangeOutcome, AccessRepositoryError> {
        let mut state = self.lock();
        let members: Vec<Membership> = state
            .memberships
            .iter()
            .filter(|m| m.organization_id == *organization_id)
            .copied()
            .collect();
        let roles: Vec<Role> = state
            .roles
            .values()
            .filter(|role| role.organization_id == *organization_id)
            .cloned()
            .collect();
        if !change.targets_exist(&members, &roles) {
            return Ok(AccessChangeOutcome::Missing);
        }
        if violates_last_admin(&members, &roles, change) {
            return Ok(AccessChangeOutcome::LastAdminViolation);
        }
        apply_change(&mut state, organization_id, change);
        Ok(AccessChangeOutcome::Applied)
    }
}

#[async_trait]
impl RoleRepository for InMemoryStore {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> Result<Option<Role>, AccessRepositoryError> {
        Ok(self
            .lock()
            .roles
            .get(role_id)
            .filter(|role| role.organization_id == *organization_id)
            .cloned())
    }

    async fn list_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Role>, AccessRepositoryError> {
        Ok(self
            .lock()
            .roles
            .values()
            .filter(|role| role.organization_id == *organization_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, role: &Role) -> Result<(), AccessRepositoryError> {
        self.lock().roles.insert(role.id, role.clone());
        Ok(())
    }
}

#[async_trait]
impl IssueRepository for InMemoryStore {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
    ) -> Result<Option<Issue>, IssueRepositoryError> {
        Ok(self
            .lock()
            .issues
            .get(issue_id)
            .filter(|issue| issue.organization_id == *organization_id)
            .cloned())
    }

    async fn commit(&self, change: &IssueChangeSet) -> Result<(), IssueRepositoryError> {
        let mut state = self.lock();
        if state.faults.commit {
            return Err(IssueRepositoryError::connection("transaction aborted"));
        }
        match &change.issue {
            IssueWrite::Insert(issue) => {
                if state.issues.contains_key(&issue.id) {
                    return Err(IssueRepositoryError::query("duplicate issue id"));
                }
                state.issues.insert(issue.id, issue.clone());
            }
            IssueWrite::Update(issue) => {
                let stored = state
                    .issues
                    .get_mut(&issue.id)
                    .filter(|stored| stored.organization_id == change.organization_id)
                    .ok_or_else(|| IssueRepositoryError::missing(issue.id.to_string()))?;
                *stored = issue.clone();
            }
            IssueWrite::Unchanged => {}
        }
        if let Some(comment) = &change.comment {
            state.comments.push(comment.clone());
        }
        for watcher in &change.watchers {
            upsert_watcher(&mut state, watcher);
        }
        insert_notifications(&mut state, &change.notifications);
        state.commits += 1;
        Ok(())
    }
}

#[async_trait]
impl MachineRepository for InMemoryStore {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        machine_id: &MachineId,
    ) -> Result<Option<Machine>, DirectoryError> {
        Ok(self
            .lock()
            .machines
            .get(machine_id)
            .filter(|machine| machine.organization_id == *organization_id)
            .cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_contacts(&self, user_ids: &[UserId]) -> Result<Vec<UserContact>, DirectoryError> {
        let state = self.lock();
        if state.faults.contacts {
            return Err(DirectoryError::connection("directory unavailable"));
        }
        Ok(user_ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl WatcherRepository for InMemoryStore {
    async fn upsert(&self, watcher: &Watcher) -> Result<(), WatcherRepositoryError> {
        upsert_watcher(&mut self.lock(), watcher);
        Ok(())
    }

    async fn remove(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
        user_id: &UserId,
    ) -> Result<bool, WatcherRepositoryError> {
        let mut state = self.lock();
        let key = (*issue_id, *user_id);
        let owned = state
            .watchers
            .get(&key)
            .is_some_and(|row| row.organization_id == *organization_id);
        Ok(owned && state.watchers.remove(&key).is_some())
    }

    async fn list_for_issue(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
    ) -> Result<Vec<Watcher>, WatcherRepositoryError> {
        let state = self.lock();
        if state.faults.watchers {
            return Err(WatcherRepositoryError::connection("watchers unavailable"));
        }
        Ok(state
            .watchers
            .values()
            .filter(|row| row.organization_id == *organization_id && row.issue_id == *issue_id)
            .copied()
            .collect())
    }
}

#[async_trait]
impl NotificationPreferencesRepository for InMemoryStore {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreferences>, NotificationPreferencesRepositoryError> {
        let state = self.lock();
        if state.faults.preferences {
            return Err(NotificationPreferencesRepositoryError::connection(
                "preferences unavailable",
            ));
        }
        Ok(state.preferences.get(&(*organization_id, *user_id)).cloned())
    }

    async fn find_many(
        &self,
        organization_id: &OrganizationId,
        user_ids: &[UserId],
    ) -> Result<Vec<NotificationPreferences>, NotificationPreferencesRepositoryError> {
        let state = self.lock();
        if state.faults.preferences {
            return Err(NotificationPreferencesRepositoryError::connection(
                "preferences unavailable",
            ));
        }
        Ok(user_ids
            .iter()
            .filter_map(|user_id| state.preferences.get(&(*organization_id, *user_id)).cloned())
            .collect())
    }

    async fn save(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<(), NotificationPreferencesRepositoryError> {
        self.put_preferences(preferences.clone());
        Ok(())
    }

    async fn list_global_watchers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<UserId>, NotificationPreferencesRepositoryError> {
        let state = self.lock();
        if state.faults.global_watchers {
            return Err(NotificationPreferencesRepositoryError::connection(
                "preferences unavailable",
            ));
        }
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.organization_id == *organization_id)
            .filter(|m| {
                state
                    .preferences
                    .get(&(m.organization_id, m.user_id))
                    .is_some_and(NotificationPreferences::watches_all_new_issues)
            })
            .map(|m| m.user_id)
            .collect())
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn insert_many(
        &self,
        notifications: &[Notification],
    ) -> Result<usize, NotificationRepositoryError> {
        let mut state = self.lock();
        if state.faults.notifications {
            return Err(NotificationRepositoryError::connection(
                "notifications unavailable",
            ));
        }
        Ok(insert_notifications(&mut state, notifications))
    }

    async fn list(&self, query: &InboxQuery) -> Result<Vec<Notification>, NotificationRepositoryError> {
        let state = self.lock();
        let mut rows: Vec<Notification> = state
            .notifications
            .values()
            .filter(|row| {
                row.organization_id == query.organization_id
                    && row.recipient_id == query.recipient_id
                    && (!query.unread_only || row.is_unread())
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn count_unread(
        &self,
        organization_id: &OrganizationId,
        recipient_id: &UserId,
    ) -> Result<u64, NotificationRepositoryError> {
        let count = self
            .lock()
            .notifications
            .values()
            .filter(|row| {
                row.organization_id == *organization_id
                    && row.recipient_id == *recipient_id
                    && row.is_unread()
            })
            .count();
        u64::try_from(count).map_err(|err| NotificationRepositoryError::query(err.to_string()))
    }

    async fn find(
        &self,
        organization_id: &OrganizationId,
        id: &NotificationId,
    ) -> Result<Option<Notification>, NotificationRepositoryError> {
        Ok(self
            .lock()
            .notifications
            .get(id)
            .filter(|row| row.organization_id == *organization_id)
            .cloned())
    }

    async fn mark_read(
        &self,
        organization_id: &OrganizationId,
        id: &NotificationId,
        read_at: DateTime<Utc>,
    ) -> Result<bool, NotificationRepositoryError> {
        let mut state = self.lock();
        let Some(row) = state
            .notifications
            .get_mut(id)
            .filter(|row| row.organization_id == *organization_id && row.is_unread())
        else {
            return Ok(false);
        };
        row.read_at = Some(read_at);
        Ok(true)
    }

    async fn mark_all_read(
        &self,
        organization_id: &OrganizationId,
        recipient_id: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, NotificationRepositoryError> {
        let mut changed: u64 = 0;
        for row in self.lock().notifications.values_mut().filter(|row| {
            row.organization_id == *organization_id
                && row.recipient_id == *recipient_id
                && row.is_unread()
        }) {
            row.read_at = Some(read_at);
            changed += 1;
        }
        Ok(changed)
    }
}
