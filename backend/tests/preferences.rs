//! Preference defaults and their effect on delivery.

use std::sync::Arc;

use mockable::Clock;
use pinpoint::PinpointServices;
use pinpoint::domain::{
    ChannelPatch, ChannelToggles, ErrorCode, EventId, IssueEvent, IssueEventKind, IssueId,
    IssueStatus, MachineId, NotificationCategory, NotificationPayload, PreferencesPatch, Session,
    UserId, WatchReason, Watcher,
};
use pinpoint::test_support::{
    InMemoryStore, MutableClock, RecordingEmailTransport, SeededOrganization,
};
use rstest::{fixture, rstest};

struct Prefs {
    services: PinpointServices,
    clock: Arc<MutableClock>,
    org: SeededOrganization,
    user: UserId,
}

impl Prefs {
    fn session(&self) -> Session {
        Session::new(self.user, self.org.id)
    }

    fn event(&self, kind: IssueEventKind) -> IssueEvent {
        let issue_id = IssueId::random();
        IssueEvent {
            event_id: EventId::random(),
            organization_id: self.org.id,
            actor: None,
            issue_id,
            kind,
            payload: NotificationPayload::for_issue(issue_id, "Something happened"),
        }
    }
}

#[fixture]
fn prefs() -> Prefs {
    let store = InMemoryStore::new();
    let clock = Arc::new(MutableClock::fixed());
    let services = PinpointServices::new(
        store.ports(Arc::new(RecordingEmailTransport::new()), clock.clone()),
    );
    let org = store.create_organization();
    let user = store.add_user_with_role(org.id, org.member_role, "Member", Some("m@example.com"));
    Prefs {
        services,
        clock,
        org,
        user,
    }
}

fn watch_all_new_issues() -> PreferencesPatch {
    PreferencesPatch::default().with_category(
        NotificationCategory::NewIssue,
        ChannelPatch {
            in_app: Some(true),
            email: None,
        },
    )
}

#[rstest]
#[tokio::test]
async fn absent_rows_read_as_defaults(prefs: Prefs) {
    let stored = prefs
        .services
        .preferences
        .get_preferences(&prefs.user, &prefs.org.id)
        .await
        .expect("defaults");

    assert!(stored.email_enabled);
    assert!(stored.auto_watch_created);
    assert!(stored.auto_watch_owned_machines);
    assert_eq!(
        stored.channels_for(NotificationCategory::NewIssue),
        ChannelToggles::OFF
    );
    assert_eq!(
        stored.channels_for(NotificationCategory::Comment),
        ChannelToggles::ON
    );
}

#[rstest]
#[tokio::test]
async fn updates_persist_and_stamp_the_clock(prefs: Prefs) {
    prefs.clock.advance_seconds(3_600);
    let patch = PreferencesPatch {
        email_enabled: Some(false),
        ..watch_all_new_issues()
    };

    let updated = prefs
        .services
        .preferences
        .update_preferences(&prefs.session(), &patch)
        .await
        .expect("updated");
    let reread = prefs
        .services
        .preferences
        .get_preferences(&prefs.user, &prefs.org.id)
        .await
        .expect("stored");

    assert_eq!(updated, reread);
    assert_eq!(reread.updated_at, prefs.clock.utc());
    assert!(!reread.email_enabled);
    assert!(!reread.channels_for(NotificationCategory::Comment).email);
    assert!(reread.channels_for(NotificationCategory::NewIssue).in_app);
}

#[rstest]
#[tokio::test]
async fn watch_all_preference_makes_a_global_watcher(prefs: Prefs) {
    let before = prefs
        .services
        .watchers
        .list_global_watchers(&prefs.org.id)
        .await
        .expect("listed");
    prefs
        .services
        .preferences
        .update_preferences(&prefs.session(), &watch_all_new_issues())
        .await
        .expect("updated");
    let after = prefs
        .services
        .watchers
        .list_global_watchers(&prefs.org.id)
        .await
        .expect("listed");

    assert!(before.is_empty());
    assert!(after.contains(&prefs.user));
}

#[rstest]
#[tokio::test]
async fn non_members_cannot_store_preferences(prefs: Prefs) {
    let outsider = Session::new(UserId::random(), prefs.org.id);

    let error = prefs
        .services
        .preferences
        .update_preferences(&outsider, &watch_all_new_issues())
        .await
        .expect_err("no membership");

    assert_eq!(error.code(), ErrorCode::NoMembership);
}

#[rstest]
#[tokio::test]
async fn defaults_cover_status_changes_but_not_new_issues(prefs: Prefs) {
    let status = prefs.event(IssueEventKind::StatusChanged {
        from: IssueStatus::New,
        to: IssueStatus::Confirmed,
    });
    let pending = [Watcher::new(
        prefs.org.id,
        status.issue_id,
        prefs.user,
        WatchReason::Explicit,
    )];

    let planned = prefs.services.engine.plan(&status, &pending).await;

    assert_eq!(planned.in_app_recipients(), vec![prefs.user]);

    let created = prefs.event(IssueEventKind::Created {
        machine_id: MachineId::random(),
    });
    let feed = prefs.services.engine.plan(&created, &[]).await;
    assert!(feed.notifications.is_empty());
}
