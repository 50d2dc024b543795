//! Tests for issue mutations and their notification side effects.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use super::*;
use crate::domain::{
    ChannelPatch, ErrorCode, ISSUE_TITLE_MAX, IssuePriority, IssueSeverity, NotificationCategory,
    PreferencesPatch, WatchReason, WatchReasons,
};
use crate::services::PinpointServices;
use crate::test_support::{
    Faults, InMemoryStore, MutableClock, RecordingEmailTransport, SeededOrganization,
};

struct World {
    store: InMemoryStore,
    transport: Arc<RecordingEmailTransport>,
    clock: Arc<MutableClock>,
    services: PinpointServices,
    org: SeededOrganization,
    machine: Machine,
    owner: UserId,
    tech: UserId,
}

impl World {
    fn session(&self, user_id: UserId) -> Session {
        Session::new(user_id, self.org.id)
    }

    fn new_issue(&self, title: &str) -> NewIssue {
        NewIssue {
            machine_id: self.machine.id,
            title: title.to_owned(),
            priority: IssuePriority::High,
            severity: IssueSeverity::Unplayable,
        }
    }

    async fn reported_by(&self, reporter: UserId) -> Issue {
        let outcome = self
            .services
            .issues
            .report_issue(&self.session(reporter), self.new_issue("Ball stuck in scoop"))
            .await
            .expect("issue reported");
        outcome.delivery.finished().await;
        outcome.issue
    }

    fn reasons_of(&self, issue_id: &IssueId, user_id: UserId) -> Option<WatchReasons> {
        self.store
            .watcher_rows(issue_id)
            .into_iter()
            .find(|row| row.user_id == user_id)
            .map(|row| row.reasons)
    }
}

#[fixture]
fn world() -> World {
    let store = InMemoryStore::new();
    let transport = Arc::new(RecordingEmailTransport::new());
    let clock = Arc::new(MutableClock::fixed());
    let services = PinpointServices::new(store.ports(transport.clone(), clock.clone()));
    let org = store.create_organization();
    let owner = store.add_user_with_role(
        org.id,
        org.member_role,
        "Owner",
        Some("owner@example.com"),
    );
    let tech = store.add_user_with_role(
        org.id,
        org.member_role,
        "Tech",
        Some("tech@example.com"),
    );
    let machine = store.add_machine(org.id, "Attack from Mars", Some(owner));
    World {
        store,
        transport,
        clock,
        services,
        org,
        machine,
        owner,
        tech,
    }
}

#[rstest]
#[tokio::test]
async fn reporting_auto_watches_reporter_and_owner(world: World) {
    let outcome = world
        .services
        .issues
        .report_issue(&world.session(world.tech), world.new_issue("  Ball stuck  "))
        .await
        .expect("issue reported");

    let issue = &outcome.issue;
    assert_eq!(issue.title, "Ball stuck");
    assert_eq!(issue.status, IssueStatus::New);
    assert_eq!(issue.created_by, Some(world.tech));
    assert_eq!(
        world.reasons_of(&issue.id, world.tech),
        Some(WatchReason::AutoCreated.into())
    );
    assert_eq!(
        world.reasons_of(&issue.id, world.owner),
        Some(WatchReason::AutoOwnedMachine.into())
    );
    assert_eq!(outcome.plan.in_app_recipients(), vec![world.owner]);
    assert_eq!(world.store.notifications_for(&world.owner).len(), 1);
    assert_eq!(outcome.delivery.queued(), 1);
    assert_eq!(outcome.delivery.finished().await.sent, 1);
    assert_eq!(world.transport.recipients(), vec!["owner@example.com"]);
    assert_eq!(world.store.commit_count(), 1);
}

#[rstest]
#[tokio::test]
async fn disabled_auto_watch_is_respected(world: World) {
    let now = world.clock.utc();
    world.store.put_preferences(
        NotificationPreferences::defaults(world.tech, world.org.id, now).apply(
            &PreferencesPatch {
                auto_watch_created: Some(false),
                ..PreferencesPatch::default()
            },
            now,
        ),
    );

    let issue = world.reported_by(world.tech).await;

    assert_eq!(world.reasons_of(&issue.id, world.tech), None);
    assert!(world.reasons_of(&issue.id, world.owner).is_some());
}

#[rstest]
#[tokio::test]
async fn owner_reporting_their_own_machine_is_not_notified(world: World) {
    let outcome = world
        .services
        .issues
        .report_issue(&world.session(world.owner), world.new_issue("Display dim"))
        .await
        .expect("issue reported");

    let reasons = world
        .reasons_of(&outcome.issue.id, world.owner)
        .expect("owner watches");
    assert!(reasons.contains(WatchReason::AutoCreated));
    assert!(reasons.contains(WatchReason::AutoOwnedMachine));
    assert!(outcome.plan.notifications.is_empty());
    assert_eq!(outcome.delivery.queued(), 0);
    assert_eq!(world.transport.attempts(), 0);
}

#[rstest]
#[tokio::test]
async fn owners_outside_the_organization_do_not_auto_watch(world: World) {
    let outsider = world.store.add_user("Former owner", Some("former@example.com"));
    let machine = world.store.add_machine(world.org.id, "Twilight Zone", Some(outsider));

    let outcome = world
        .services
        .issues
        .report_issue(
            &world.session(world.tech),
            NewIssue {
                machine_id: machine.id,
                ..world.new_issue("Clock stuck")
            },
        )
        .await
        .expect("issue reported");
    outcome.delivery.finished().await;

    assert_eq!(world.reasons_of(&outcome.issue.id, outsider), None);
    assert_eq!(
        world.reasons_of(&outcome.issue.id, world.tech),
        Some(WatchReason::AutoCreated.into())
    );
    assert!(world.store.notifications_for(&outsider).is_empty());
    assert!(world.transport.recipients().is_empty());
}

#[rstest]
#[tokio::test]
async fn anonymous_reports_reach_owner_and_global_watchers(world: World) {
    let now = world.clock.utc();
    world.store.put_preferences(
        NotificationPreferences::defaults(world.tech, world.org.id, now).apply(
            &PreferencesPatch::default().with_category(
                NotificationCategory::NewIssue,
                ChannelPatch {
                    in_app: Some(true),
                    email: Some(true),
                },
            ),
            now,
        ),
    );

    let outcome = world
        .services
        .issues
        .report_anonymous_issue(&world.org.id, world.new_issue("Left flipper weak"))
        .await
        .expect("issue reported");

    assert_eq!(outcome.issue.created_by, None);
    let mut recipients = outcome.plan.in_app_recipients();
    recipients.sort();
    let mut expected = vec![world.owner, world.tech];
    expected.sort();
    assert_eq!(recipients, expected);
    let tech_row = outcome
        .plan
        .notifications
        .iter()
        .find(|row| row.recipient_id == world.tech)
        .expect("feed row");
    assert_eq!(tech_row.category, NotificationCategory::NewIssue);
    assert_eq!(world.store.watcher_rows(&outcome.issue.id).len(), 1);
}

#[rstest]
#[tokio::test]
async fn reporting_against_a_foreign_machine_is_not_found(world: World) {
    let other = world.store.create_organization();
    let foreign = world.store.add_machine(other.id, "Twilight Zone", None);
    let new_issue = NewIssue {
        machine_id: foreign.id,
        ..world.new_issue("Clock broken")
    };

    let error = world
        .services
        .issues
        .report_issue(&world.session(world.tech), new_issue)
        .await
        .expect_err("foreign machine");

    assert_eq!(error.code(), ErrorCode::NotFound);
    assert_eq!(world.store.commit_count(), 0);
}

#[rstest]
#[case::empty("   ".to_owned())]
#[case::too_long("x".repeat(ISSUE_TITLE_MAX + 1))]
#[tokio::test]
async fn invalid_titles_are_rejected(world: World, #[case] title: String) {
    let error = world
        .services
        .issues
        .report_issue(&world.session(world.tech), world.new_issue(&title))
        .await
        .expect_err("invalid title");

    assert_eq!(error.code(), ErrorCode::ValidationError);
}

#[rstest]
#[tokio::test]
async fn status_change_notifies_watchers_but_not_actor(world: World) {
    let issue = world.reported_by(world.tech).await;

    let outcome = world
        .services
        .issues
        .change_status(&world.session(world.tech), &issue.id, IssueStatus::InProgress)
        .await
        .expect("status changed");

    assert_eq!(outcome.issue.status, IssueStatus::InProgress);
    assert_eq!(outcome.plan.in_app_recipients(), vec![world.owner]);
    let row = outcome.plan.notifications.first().expect("row");
    assert_eq!(row.category, NotificationCategory::StatusChange);
    assert_eq!(
        world.store.issue(&issue.id).map(|stored| stored.status),
        Some(IssueStatus::InProgress)
    );
}

#[rstest]
#[tokio::test]
async fn repeating_the_current_status_is_a_validation_error(world: World) {
    let issue = world.reported_by(world.tech).await;

    let error = world
        .services
        .issues
        .change_status(&world.session(world.tech), &issue.id, IssueStatus::New)
        .await
        .expect_err("same status");

    assert_eq!(error.code(), ErrorCode::ValidationError);
}

#[rstest]
#[tokio::test]
async fn guests_cannot_change_status(world: World) {
    let issue = world.reported_by(world.tech).await;
    let guest = world
        .store
        .add_user_with_role(world.org.id, world.org.guest_role, "Guest", None);

    let error = world
        .services
        .issues
        .change_status(&world.session(guest), &issue.id, IssueStatus::Fixed)
        .await
        .expect_err("guest");

    assert_eq!(error.code(), ErrorCode::Forbidden);
}

#[rstest]
#[tokio::test]
async fn other_organizations_see_no_issue(world: World) {
    let issue = world.reported_by(world.tech).await;
    let other = world.store.create_organization();
    let admin = world
        .store
        .add_user_with_role(other.id, other.admin_role, "Admin", None);

    let error = world
        .services
        .issues
        .change_status(&Session::new(admin, other.id), &issue.id, IssueStatus::Fixed)
        .await
        .expect_err("foreign issue");

    assert_eq!(error.code(), ErrorCode::NotFound);
    assert_eq!(
        world.store.issue(&issue.id).map(|stored| stored.status),
        Some(IssueStatus::New)
    );
}

#[rstest]
#[tokio::test]
async fn assignment_subscribes_and_notifies_the_assignee(world: World) {
    let issue = world.reported_by(world.owner).await;

    let outcome = world
        .services
        .issues
        .assign(&world.session(world.owner), &issue.id, Some(world.tech))
        .await
        .expect("assigned");

    assert_eq!(outcome.issue.assigned_to, Some(world.tech));
    assert_eq!(
        world.reasons_of(&issue.id, world.tech),
        Some(WatchReason::AutoAssigned.into())
    );
    let row = outcome.plan.notifications.first().expect("assignee row");
    assert_eq!(row.recipient_id, world.tech);
    assert_eq!(row.category, NotificationCategory::Assignment);
}

#[rstest]
#[tokio::test]
async fn assigning_a_non_member_is_rejected(world: World) {
    let issue = world.reported_by(world.owner).await;
    let stranger = world.store.add_user("Stranger", None);

    let error = world
        .services
        .issues
        .assign(&world.session(world.owner), &issue.id, Some(stranger))
        .await
        .expect_err("non-member");

    assert_eq!(error.code(), ErrorCode::ValidationError);
    assert_eq!(world.reasons_of(&issue.id, stranger), None);
}

#[rstest]
#[tokio::test]
async fn comments_are_stored_and_fan_out(world: World) {
    let issue = world.reported_by(world.tech).await;

    let outcome = world
        .services
        .issues
        .add_comment(&world.session(world.owner), &issue.id, "  Ordered a new coil ")
        .await
        .expect("commented");

    let comment = outcome.comment.expect("comment");
    assert_eq!(comment.body, "Ordered a new coil");
    assert_eq!(world.store.comments(&issue.id), vec![comment]);
    assert_eq!(outcome.plan.in_app_recipients(), vec![world.tech]);
}

#[rstest]
#[tokio::test]
async fn blank_comments_are_rejected(world: World) {
    let issue = world.reported_by(world.tech).await;

    let error = world
        .services
        .issues
        .add_comment(&world.session(world.owner), &issue.id, " \n ")
        .await
        .expect_err("blank");

    assert_eq!(error.code(), ErrorCode::ValidationError);
    assert!(world.store.comments(&issue.id).is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_commit_sends_nothing(world: World) {
    let issue = world.reported_by(world.tech).await;
    let attempts_before = world.transport.attempts();
    world.store.set_faults(Faults {
        commit: true,
        ..Faults::default()
    });

    let error = world
        .services
        .issues
        .change_status(&world.session(world.tech), &issue.id, IssueStatus::Fixed)
        .await
        .expect_err("commit fails");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    assert_eq!(world.transport.attempts(), attempts_before);
    assert_eq!(world.store.notifications().len(), 1);
}

#[rstest]
#[tokio::test]
async fn email_failures_do_not_fail_the_command(world: World) {
    world.transport.fail_for("owner@example.com");

    let outcome = world
        .services
        .issues
        .report_issue(&world.session(world.tech), world.new_issue("Coil dead"))
        .await
        .expect("issue reported");

    assert_eq!(world.store.notifications_for(&world.owner).len(), 1);
    assert_eq!(outcome.delivery.finished().await.failed, vec![world.owner]);
}

#[rstest]
#[tokio::test]
async fn slow_mail_does_not_hold_up_the_command() {
    const LATENCY: Duration = Duration::from_millis(200);
    let store = InMemoryStore::new();
    let transport = Arc::new(RecordingEmailTransport::slow(LATENCY));
    let services = PinpointServices::new(
        store.ports(transport.clone(), Arc::new(MutableClock::fixed())),
    );
    let org = store.create_organization();
    let owner =
        store.add_user_with_role(org.id, org.member_role, "Owner", Some("owner@example.com"));
    let reporter = store.add_user_with_role(org.id, org.member_role, "Tech", None);
    let machine = store.add_machine(org.id, "Medieval Madness", Some(owner));
    let issue = services
        .issues
        .report_issue(
            &Session::new(reporter, org.id),
            NewIssue {
                machine_id: machine.id,
                title: "Castle gate stuck".to_owned(),
                priority: IssuePriority::Medium,
                severity: IssueSeverity::Playable,
            },
        )
        .await
        .expect("issue reported");
    issue.delivery.finished().await;
    for name in ["Ann", "Ben", "Cal"] {
        let watcher = store.add_user_with_role(
            org.id,
            org.member_role,
            name,
            Some(&format!("{}@example.com", name.to_lowercase())),
        );
        services
            .watchers
            .watch(&Session::new(watcher, org.id), &issue.issue.id)
            .await
            .expect("watching");
    }
    let before = transport.attempts();

    let started = Instant::now();
    let outcome = services
        .issues
        .change_status(
            &Session::new(reporter, org.id),
            &issue.issue.id,
            IssueStatus::InProgress,
        )
        .await
        .expect("status changed");
    let elapsed = started.elapsed();

    assert!(elapsed < LATENCY, "command waited {elapsed:?} on mail");
    assert_eq!(outcome.issue.status, IssueStatus::InProgress);
    assert_eq!(outcome.delivery.queued(), 4);
    let report = outcome.delivery.finished().await;
    assert_eq!(report.sent, 4);
    assert_eq!(transport.attempts(), before + 4);
}
