//! Issue mutations and their notification side effects.
//!
//! Each command follows the same shape: authorize through the organization
//! guard, build the new state, derive auto-watch rows, plan notifications,
//! commit everything in one transaction, then hand emails to a background
//! task. Email outcomes never change or delay the command's result.

use std::sync::Arc;

use mockable::Clock;
use tracing::{info, warn};

use super::port_errors::map_issue_error;
use super::ports::{IssueChangeSet, IssueRepository, IssueWrite};
use super::{
    Comment, CommentId, DeliveryHandle, DeliveryPlan, Error, EventId, Issue, IssueEvent,
    IssueEventKind, IssueId, IssueStatus, Machine, NewIssue, NotificationEngine,
    NotificationPayload, NotificationPreferences, OrganizationGuard, OrganizationId, Permission,
    PreferenceService, Session, UserId, WatcherRegistry, validate_comment_body, validate_title,
};

/// Result of a committed issue command.
#[derive(Debug)]
pub struct IssueCommandOutcome {
    /// Issue state after the command.
    pub issue: Issue,
    /// Comment created by the command, if any.
    pub comment: Option<Comment>,
    /// Recipients and channels decided for the event.
    pub plan: DeliveryPlan,
    /// Emails queued after commit; await it only to observe their outcome.
    pub delivery: DeliveryHandle,
}

/// Collaborators of [`IssueCommandService`].
pub struct IssueCommandParts {
    /// Boundary checks.
    pub guard: OrganizationGuard,
    /// Preference lookups for the auto-watch rules.
    pub preferences: PreferenceService,
    /// Notification planning and delivery.
    pub engine: NotificationEngine,
    /// Transactional issue storage.
    pub issues: Arc<dyn IssueRepository>,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
}

/// Mutation handlers for issues.
#[derive(Clone)]
pub struct IssueCommandService {
    guard: OrganizationGuard,
    preferences: PreferenceService,
    engine: NotificationEngine,
    issues: Arc<dyn IssueRepository>,
    clock: Arc<dyn Clock>,
}

struct Mutation {
    event: IssueEvent,
    change: IssueChangeSet,
    issue: Issue,
    comment: Option<Comment>,
}

impl IssueCommandService {
    /// Assemble the service.
    pub fn new(parts: IssueCommandParts) -> Self {
        let IssueCommandParts {
            guard,
            preferences,
            engine,
            issues,
            clock,
        } = parts;
        Self {
            guard,
            preferences,
            engine,
            issues,
            clock,
        }
    }

    /// Report an issue as an authenticated member.
    pub async fn report_issue(
        &self,
        session: &Session,
        new_issue: NewIssue,
    ) -> Result<IssueCommandOutcome, Error> {
        self.guard
            .resolver()
            .require(session, Permission::IssueCreate)
            .await?;
        self.create(session.organization_id, Some(session.user_id), new_issue)
            .await
    }

    /// Report an issue through the public form; there is no actor.
    pub async fn report_anonymous_issue(
        &self,
        organization_id: &OrganizationId,
        new_issue: NewIssue,
    ) -> Result<IssueCommandOutcome, Error> {
        self.create(*organization_id, None, new_issue).await
    }

    /// Move an issue to `status`.
    pub async fn change_status(
        &self,
        session: &Session,
        issue_id: &IssueId,
        status: IssueStatus,
    ) -> Result<IssueCommandOutcome, Error> {
        let authorized = self
            .guard
            .authorize_issue(session, issue_id, Permission::IssueEdit)
            .await?;
        let current = authorized.issue;
        if current.status == status {
            return Err(Error::validation(format!("issue is already {status}")));
        }

        let issue = Issue {
            status,
            updated_at: self.clock.utc(),
            ..current.clone()
        };
        let payload = NotificationPayload::for_issue(
            issue.id,
            format!("\"{}\" changed from {} to {}", issue.title, current.status, status),
        );
        let event = issue_event(
            &issue,
            Some(session.user_id),
            IssueEventKind::StatusChanged {
                from: current.status,
                to: status,
            },
            payload,
        );
        self.apply(Mutation {
            change: change_set(&issue, IssueWrite::Update(issue.clone())),
            event,
            issue,
            comment: None,
        })
        .await
    }

    /// Assign an issue to a member, or clear the assignee.
    pub async fn assign(
        &self,
        session: &Session,
        issue_id: &IssueId,
        assignee: Option<UserId>,
    ) -> Result<IssueCommandOutcome, Error> {
        let authorized = self
            .guard
            .authorize_issue(session, issue_id, Permission::IssueAssign)
            .await?;
        let current = authorized.issue;
        if current.assigned_to == assignee {
            return Err(Error::validation("issue already has that assignee"));
        }
        if let Some(user_id) = assignee {
            let member = self
                .guard
                .resolver()
                .is_member(&session.organization_id, &user_id)
                .await?;
            if !member {
                return Err(Error::validation(
                    "assignee must be a member of the organization",
                ));
            }
        }

        let issue = Issue {
            assigned_to: assignee,
            updated_at: self.clock.utc(),
            ..current
        };
        let message = if assignee.is_some() {
            format!("\"{}\" was assigned", issue.title)
        } else {
            format!("\"{}\" was unassigned", issue.title)
        };
        let event = issue_event(
            &issue,
            Some(session.user_id),
            IssueEventKind::Assigned { assignee },
            NotificationPayload::for_issue(issue.id, message),
        );
        let mut change = change_set(&issue, IssueWrite::Update(issue.clone()));
        change.watchers = WatcherRegistry::watchers_for_assignment(&issue, assignee);
        self.apply(Mutation {
            event,
            change,
            issue,
            comment: None,
        })
        .await
    }

    /// Add a comment to an issue.
    pub async fn add_comment(
        &self,
        session: &Session,
        issue_id: &IssueId,
        body: &str,
    ) -> Result<IssueCommandOutcome, Error> {
        let authorized = self
            .guard
            .authorize_issue(session, issue_id, Permission::CommentCreate)
            .await?;
        let body = validate_comment_body(body).map_err(Error::validation)?;
        let issue = authorized.issue;

        let comment = Comment {
            id: CommentId::random(),
            organization_id: issue.organization_id,
            issue_id: issue.id,
            author_id: session.user_id,
            body,
            created_at: self.clock.utc(),
        };
        let event = issue_event(
            &issue,
            Some(session.user_id),
            IssueEventKind::Commented {
                comment_id: comment.id,
            },
            NotificationPayload::for_issue(
                issue.id,
                format!("New comment on \"{}\"", issue.title),
            ),
        );
        let mut change = change_set(&issue, IssueWrite::Unchanged);
        change.comment = Some(comment.clone());
        self.apply(Mutation {
            event,
            change,
            issue,
            comment: Some(comment),
        })
        .await
    }

    async fn create(
        &self,
        organization_id: OrganizationId,
        reporter: Option<UserId>,
        new_issue: NewIssue,
    ) -> Result<IssueCommandOutcome, Error> {
        let title = validate_title(&new_issue.title).map_err(Error::validation)?;
        let mut machine = self
            .guard
            .load_machine(&organization_id, &new_issue.machine_id)
            .await?;
        machine.owner_id = self.member_owner(&machine).await;

        let now = self.clock.utc();
        let issue = Issue {
            id: IssueId::random(),
            organization_id,
            machine_id: machine.id,
            title,
            status: IssueStatus::New,
            priority: new_issue.priority,
            severity: new_issue.severity,
            created_by: reporter,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        };

        let creator_prefs = match reporter {
            Some(user_id) => Some(self.auto_watch_preferences(&organization_id, &user_id).await),
            None => None,
        };
        let owner_prefs = match machine.owner_id {
            Some(owner) => Some(self.auto_watch_preferences(&organization_id, &owner).await),
            None => None,
        };

        let payload = NotificationPayload::for_issue(issue.id, new_issue_message(&issue, &machine));
        let event = issue_event(
            &issue,
            reporter,
            IssueEventKind::Created {
                machine_id: machine.id,
            },
            payload,
        );
        let mut change = change_set(&issue, IssueWrite::Insert(issue.clone()));
        change.watchers = WatcherRegistry::watchers_for_new_issue(
            &issue,
            creator_prefs.as_ref(),
            &machine,
            owner_prefs.as_ref(),
        );
        self.apply(Mutation {
            event,
            change,
            issue,
            comment: None,
        })
        .await
    }

    /// Preferences for an auto-watch decision, falling back to defaults when
    /// storage cannot answer.
    /// Machine owner, kept only while they belong to the machine's
    /// organization.
    async fn member_owner(&self, machine: &Machine) -> Option<UserId> {
        let owner = machine.owner_id?;
        match self
            .guard
            .resolver()
            .is_member(&machine.organization_id, &owner)
            .await
        {
            Ok(true) => Some(owner),
            Ok(false) => None,
            Err(error) => {
                warn!(
                    machine_id = %machine.id,
                    owner_id = %owner,
                    %error,
                    "owner membership unavailable; skipping owner auto-watch"
                );
                None
            }
        }
    }

    async fn auto_watch_preferences(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
    ) -> NotificationPreferences {
        match self
            .preferences
            .get_preferences(user_id, organization_id)
            .await
        {
            Ok(prefs) => prefs,
            Err(error) => {
                warn!(
                    organization_id = %organization_id,
                    user_id = %user_id,
                    %error,
                    "preferences unavailable; applying auto-watch defaults"
                );
                NotificationPreferences::defaults(*user_id, *organization_id, self.clock.utc())
            }
        }
    }

    async fn apply(&self, mutation: Mutation) -> Result<IssueCommandOutcome, Error> {
        let Mutation {
            event,
            mut change,
            issue,
            comment,
        } = mutation;

        let plan = self.engine.plan(&event, &change.watchers).await;
        change.notifications.clone_from(&plan.notifications);
        self.issues
            .commit(&change)
            .await
            .map_err(map_issue_error)?;
        info!(
            organization_id = %event.organization_id,
            issue_id = %event.issue_id,
            event_id = %event.event_id,
            category = %event.kind.category(),
            notifications = plan.notifications.len(),
            "issue mutation committed"
        );

        let delivery = self.engine.hand_off(&plan).await;
        Ok(IssueCommandOutcome {
            issue,
            comment,
            plan,
            delivery,
        })
    }
}

fn change_set(issue: &Issue, write: IssueWrite) -> IssueChangeSet {
    IssueChangeSet {
        organization_id: issue.organization_id,
        issue: write,
        comment: None,
        watchers: Vec::new(),
        notifications: Vec::new(),
    }
}

fn issue_event(
    issue: &Issue,
    actor: Option<UserId>,
    kind: IssueEventKind,
    payload: NotificationPayload,
) -> IssueEvent {
    IssueEvent {
        event_id: EventId::random(),
        organization_id: issue.organization_id,
        actor,
        issue_id: issue.id,
        kind,
        payload,
    }
}

fn new_issue_message(issue: &Issue, machine: &Machine) -> String {
    format!("New issue on {}: {}", machine.name, issue.title)
}

#[cfg(test)]
#[path = "issue_command_service_tests.rs"]
mod tests;
