//! Tests for recipient and channel decisions.

use std::sync::Arc;

use chrono::Utc;
use rstest::{fixture, rstest};

use super::*;
use crate::domain::{
    ChannelPatch, EventId, Issue, IssueId, IssuePriority, IssueSeverity, IssueStatus, MachineId,
    NotificationPayload, OrganizationId, PreferencesPatch,
};
use crate::services::PinpointServices;
use crate::test_support::{
    Faults, InMemoryStore, MutableClock, RecordingEmailTransport, SeededOrganization,
};

struct Harness {
    store: InMemoryStore,
    transport: Arc<RecordingEmailTransport>,
    clock: Arc<MutableClock>,
    services: PinpointServices,
    org: SeededOrganization,
    issue: Issue,
}

impl Harness {
    fn member(&self, name: &str, email: Option<&str>) -> UserId {
        self.store
            .add_user_with_role(self.org.id, self.org.member_role, name, email)
    }

    async fn watch(&self, user_id: UserId, reason: WatchReason) {
        self.services
            .watchers
            .add_watcher(&Watcher::new(self.org.id, self.issue.id, user_id, reason))
            .await
            .expect("watcher stored");
    }

    fn follow_new_issues(&self, user_id: UserId) {
        let now = self.clock.utc();
        let prefs = NotificationPreferences::defaults(user_id, self.org.id, now).apply(
            &PreferencesPatch::default().with_category(
                NotificationCategory::NewIssue,
                ChannelPatch {
                    in_app: Some(true),
                    email: Some(false),
                },
            ),
            now,
        );
        self.store.put_preferences(prefs);
    }

    fn event(&self, actor: Option<UserId>, kind: IssueEventKind) -> IssueEvent {
        IssueEvent {
            event_id: EventId::random(),
            organization_id: self.org.id,
            actor,
            issue_id: self.issue.id,
            kind,
            payload: NotificationPayload::for_issue(self.issue.id, "Flipper sticks"),
        }
    }

    fn status_event(&self, actor: Option<UserId>) -> IssueEvent {
        self.event(
            actor,
            IssueEventKind::StatusChanged {
                from: IssueStatus::New,
                to: IssueStatus::InProgress,
            },
        )
    }

    fn created_event(&self, actor: Option<UserId>) -> IssueEvent {
        self.event(
            actor,
            IssueEventKind::Created {
                machine_id: self.issue.machine_id,
            },
        )
    }
}

#[fixture]
fn harness() -> Harness {
    let store = InMemoryStore::new();
    let transport = Arc::new(RecordingEmailTransport::new());
    let clock = Arc::new(MutableClock::fixed());
    let services = PinpointServices::new(store.ports(transport.clone(), clock.clone()));
    let org = store.create_organization();
    let machine = store.add_machine(org.id, "Medieval Madness", None);
    let now = clock.utc();
    let issue = Issue {
        id: IssueId::random(),
        organization_id: org.id,
        machine_id: machine.id,
        title: "Flipper sticks".to_owned(),
        status: IssueStatus::New,
        priority: IssuePriority::Medium,
        severity: IssueSeverity::Playable,
        created_by: None,
        assigned_to: None,
        created_at: now,
        updated_at: now,
    };
    store.put_issue(issue.clone());
    Harness {
        store,
        transport,
        clock,
        services,
        org,
        issue,
    }
}

#[rstest]
#[tokio::test]
async fn actor_is_never_notified(harness: Harness) {
    let actor = harness.member("Ada", Some("ada@example.com"));
    let other = harness.member("Grace", Some("grace@example.com"));
    harness.watch(actor, WatchReason::Explicit).await;
    harness.watch(other, WatchReason::Explicit).await;

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(Some(actor)), &[])
        .await;

    assert_eq!(plan.in_app_recipients(), vec![other]);
    assert_eq!(plan.email_recipients(), vec![other]);
    assert!(!plan.is_partial());
}

#[rstest]
#[tokio::test]
async fn missing_preferences_use_the_defaults(harness: Harness) {
    let watcher = harness.member("Grace", Some("grace@example.com"));
    harness.watch(watcher, WatchReason::Explicit).await;

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &[])
        .await;

    let row = plan.notifications.first().expect("one row");
    assert_eq!(row.category, NotificationCategory::StatusChange);
    assert_eq!(row.id, NotificationId::for_delivery(plan.event_id, watcher));
    assert_eq!(row.created_at, harness.clock.utc());
    let email = plan.emails.first().expect("one email");
    assert_eq!(email.template, EmailTemplate::IssueStatusChanged);
}

#[rstest]
#[tokio::test]
async fn disabled_categories_are_skipped(harness: Harness) {
    let watcher = harness.member("Grace", Some("grace@example.com"));
    harness.watch(watcher, WatchReason::Explicit).await;
    let now = harness.clock.utc();
    harness.store.put_preferences(
        NotificationPreferences::defaults(watcher, harness.org.id, now).apply(
            &PreferencesPatch::default().with_category(
                NotificationCategory::StatusChange,
                ChannelPatch {
                    in_app: Some(false),
                    email: Some(false),
                },
            ),
            now,
        ),
    );

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &[])
        .await;

    assert!(plan.notifications.is_empty());
    assert!(plan.emails.is_empty());
}

#[rstest]
#[case::facade(Some("tech@pinpoint.internal"))]
#[case::no_address(None)]
#[tokio::test]
async fn undeliverable_addresses_get_in_app_only(
    harness: Harness,
    #[case] email: Option<&'static str>,
) {
    let watcher = harness.member("Tech", email);
    harness.watch(watcher, WatchReason::Explicit).await;

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &[])
        .await;

    assert_eq!(plan.in_app_recipients(), vec![watcher]);
    assert!(plan.emails.is_empty());
}

#[rstest]
#[tokio::test]
async fn global_watchers_hear_only_about_new_issues(harness: Harness) {
    let follower = harness.member("Lin", Some("lin@example.com"));
    harness.follow_new_issues(follower);

    let created = harness
        .services
        .engine
        .plan(&harness.created_event(None), &[])
        .await;
    let status = harness
        .services
        .engine
        .plan(&harness.status_event(None), &[])
        .await;

    let row = created.notifications.first().expect("feed row");
    assert_eq!(row.recipient_id, follower);
    assert_eq!(row.category, NotificationCategory::NewIssue);
    assert!(created.emails.is_empty());
    assert!(status.notifications.is_empty());
}

#[rstest]
#[tokio::test]
async fn owners_receive_machine_owned_notifications(harness: Harness) {
    let owner = harness.member("Owner", Some("owner@example.com"));
    let pending = [Watcher::new(
        harness.org.id,
        harness.issue.id,
        owner,
        WatchReason::AutoOwnedMachine,
    )];

    let plan = harness
        .services
        .engine
        .plan(&harness.created_event(None), &pending)
        .await;

    let row = plan.notifications.first().expect("owner row");
    assert_eq!(row.category, NotificationCategory::MachineOwned);
    let email = plan.emails.first().expect("owner email");
    assert_eq!(email.template, EmailTemplate::MachineIssueCreated);
}

#[rstest]
#[tokio::test]
async fn a_user_with_several_reasons_gets_one_row(harness: Harness) {
    let owner = harness.member("Owner", Some("owner@example.com"));
    harness.follow_new_issues(owner);
    harness.watch(owner, WatchReason::Explicit).await;
    let pending = [Watcher::new(
        harness.org.id,
        harness.issue.id,
        owner,
        WatchReason::AutoOwnedMachine,
    )];

    let plan = harness
        .services
        .engine
        .plan(&harness.created_event(None), &pending)
        .await;

    assert_eq!(plan.in_app_recipients(), vec![owner]);
    assert_eq!(plan.email_recipients(), vec![owner]);
}

#[rstest]
#[tokio::test]
async fn watchers_from_other_organizations_are_ignored(harness: Harness) {
    let outsider = harness.store.add_user("Mallory", Some("mallory@example.com"));
    let pending = [Watcher::new(
        OrganizationId::random(),
        harness.issue.id,
        outsider,
        WatchReason::Explicit,
    )];

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &pending)
        .await;

    assert!(plan.notifications.is_empty());
}

#[rstest]
#[tokio::test]
async fn former_members_are_dropped(harness: Harness) {
    let former = harness.store.add_user("Former", Some("former@example.com"));
    let pending = [Watcher::new(
        harness.org.id,
        harness.issue.id,
        former,
        WatchReason::Explicit,
    )];

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &pending)
        .await;

    assert!(plan.notifications.is_empty());
    assert!(!plan.is_partial());
}

#[rstest]
#[tokio::test]
async fn watcher_fault_still_reaches_global_watchers(harness: Harness) {
    let follower = harness.member("Lin", None);
    harness.follow_new_issues(follower);
    harness.store.set_faults(Faults {
        watchers: true,
        ..Faults::default()
    });

    let plan = harness
        .services
        .engine
        .plan(&harness.created_event(None), &[])
        .await;

    assert!(plan.is_partial());
    assert!(matches!(
        plan.faults.as_slice(),
        [PlanFault::Watchers { .. }]
    ));
    assert_eq!(plan.in_app_recipients(), vec![follower]);
}

#[rstest]
#[tokio::test]
async fn membership_fault_notifies_nobody(harness: Harness) {
    let watcher = harness.member("Grace", Some("grace@example.com"));
    harness.watch(watcher, WatchReason::Explicit).await;
    harness.store.set_faults(Faults {
        memberships: true,
        ..Faults::default()
    });

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &[])
        .await;

    assert!(plan.notifications.is_empty());
    assert!(plan.emails.is_empty());
    assert_eq!(
        plan.faults.first().map(PlanFault::stage),
        Some("memberships")
    );
}

#[rstest]
#[tokio::test]
async fn preference_fault_falls_back_to_defaults(harness: Harness) {
    let watcher = harness.member("Grace", Some("grace@example.com"));
    harness.watch(watcher, WatchReason::Explicit).await;
    harness.store.set_faults(Faults {
        preferences: true,
        ..Faults::default()
    });

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &[])
        .await;

    assert_eq!(plan.in_app_recipients(), vec![watcher]);
    assert_eq!(
        plan.faults.first().map(PlanFault::stage),
        Some("preferences")
    );
}

#[rstest]
#[tokio::test]
async fn contact_fault_skips_email_but_keeps_rows(harness: Harness) {
    let watcher = harness.member("Grace", Some("grace@example.com"));
    harness.watch(watcher, WatchReason::Explicit).await;
    harness.store.set_faults(Faults {
        contacts: true,
        ..Faults::default()
    });

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &[])
        .await;

    assert_eq!(plan.in_app_recipients(), vec![watcher]);
    assert!(plan.emails.is_empty());
    assert_eq!(plan.faults.first().map(PlanFault::stage), Some("contacts"));
}

#[rstest]
#[tokio::test]
async fn dispatching_twice_inserts_once(harness: Harness) {
    let watcher = harness.member("Grace", None);
    harness.watch(watcher, WatchReason::Explicit).await;
    let event = harness.status_event(None);

    let first = harness.services.engine.dispatch(&event).await;
    let second = harness.services.engine.dispatch(&event).await;

    assert_eq!(first.notification_ids(), second.notification_ids());
    assert_eq!(harness.store.notifications_for(&watcher).len(), 1);
}

#[rstest]
#[tokio::test]
async fn persistence_fault_is_recorded_on_dispatch(harness: Harness) {
    let watcher = harness.member("Grace", Some("grace@example.com"));
    harness.watch(watcher, WatchReason::Explicit).await;
    harness.store.set_faults(Faults {
        notifications: true,
        ..Faults::default()
    });

    let plan = harness
        .services
        .engine
        .dispatch(&harness.status_event(None))
        .await;

    assert_eq!(
        plan.faults.first().map(PlanFault::stage),
        Some("persistence")
    );
    assert!(harness.store.notifications().is_empty());
    assert_eq!(harness.transport.sent().len(), 1);
}

#[rstest]
#[tokio::test]
async fn failed_sends_are_reported_not_raised(harness: Harness) {
    let bounced = harness.member("Bounce", Some("bounce@example.com"));
    let fine = harness.member("Fine", Some("fine@example.com"));
    harness.watch(bounced, WatchReason::Explicit).await;
    harness.watch(fine, WatchReason::Explicit).await;
    harness.transport.fail_for("bounce@example.com");

    let plan = harness
        .services
        .engine
        .plan(&harness.status_event(None), &[])
        .await;
    let report = harness.services.engine.deliver(&plan).await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, vec![bounced]);
    assert_eq!(harness.transport.attempts(), 2);
    assert_eq!(harness.transport.recipients(), vec!["fine@example.com"]);
}

#[rstest]
fn owner_category_wins_on_created_events() {
    let prefs =
        NotificationPreferences::defaults(UserId::random(), OrganizationId::random(), Utc::now());
    let kind = IssueEventKind::Created {
        machine_id: MachineId::random(),
    };
    let interest = Interest {
        reasons: WatchReasons::from_iter([WatchReason::AutoOwnedMachine, WatchReason::Explicit]),
        global: false,
    };

    let resolved = resolve_channels(&prefs, &interest.categories(&kind));

    assert_eq!(
        resolved,
        Some((NotificationCategory::MachineOwned, ChannelToggles::ON))
    );
}

#[rstest]
fn no_categories_resolve_to_nothing() {
    let prefs =
        NotificationPreferences::defaults(UserId::random(), OrganizationId::random(), Utc::now());

    assert_eq!(resolve_channels(&prefs, &[]), None);
}
