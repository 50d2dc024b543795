//! Tenant isolation across every organization-scoped entry point.
//!
//! A member of organization B asking for anything owned by organization A must
//! see `not_found` (or `no_membership` when the session names A), never
//! `forbidden` and never the row itself.

use std::sync::Arc;

use pinpoint::PinpointServices;
use pinpoint::domain::{
    ErrorCode, IssuePriority, IssueSeverity, IssueStatus, NewIssue, Session, UserId,
};
use pinpoint::test_support::{
    InMemoryStore, MutableClock, RecordingEmailTransport, SeededOrganization,
};
use rstest::{fixture, rstest};

struct TwoTenants {
    store: InMemoryStore,
    services: PinpointServices,
    org_a: SeededOrganization,
    org_b: SeededOrganization,
    owner_a: UserId,
    member_b: UserId,
    issue_a: pinpoint::domain::Issue,
}

#[fixture]
fn tenants() -> TwoTenants {
    let store = InMemoryStore::new();
    let services = PinpointServices::new(store.ports(
        Arc::new(RecordingEmailTransport::new()),
        Arc::new(MutableClock::fixed()),
    ));
    let org_a = store.create_organization();
    let org_b = store.create_organization();
    let owner_a = store.add_user_with_role(
        org_a.id,
        org_a.admin_role,
        "U1",
        Some("u1@example.com"),
    );
    let member_b = store.add_user_with_role(
        org_b.id,
        org_b.admin_role,
        "U2",
        Some("u2@example.com"),
    );
    let tech_a = store.add_user_with_role(org_a.id, org_a.member_role, "Tech", None);
    let machine = store.add_machine(org_a.id, "Theatre of Magic", Some(owner_a));
    let issue_a = futures::executor::block_on(services.issues.report_issue(
        &Session::new(tech_a, org_a.id),
        NewIssue {
            machine_id: machine.id,
            title: "Trunk magnet dead".to_owned(),
            priority: IssuePriority::Medium,
            severity: IssueSeverity::Playable,
        },
    ))
    .expect("issue reported")
    .issue;

    TwoTenants {
        store,
        services,
        org_a,
        org_b,
        owner_a,
        member_b,
        issue_a,
    }
}

#[rstest]
#[tokio::test]
async fn foreign_issue_reads_are_not_found(tenants: TwoTenants) {
    let session = Session::new(tenants.member_b, tenants.org_b.id);

    let error = tenants
        .services
        .guard
        .load_issue(&session, &tenants.issue_a.id)
        .await
        .expect_err("issue belongs to A");

    assert_eq!(error.code(), ErrorCode::NotFound);
    assert!(!error.message().contains(&tenants.issue_a.title));
}

#[rstest]
#[tokio::test]
async fn naming_a_foreign_organization_is_no_membership(tenants: TwoTenants) {
    let session = Session::new(tenants.member_b, tenants.org_a.id);

    let error = tenants
        .services
        .guard
        .load_issue(&session, &tenants.issue_a.id)
        .await
        .expect_err("B's member has no membership in A");

    assert_eq!(error.code(), ErrorCode::NoMembership);
}

#[rstest]
#[tokio::test]
async fn foreign_issue_mutations_are_not_found_and_leave_no_trace(tenants: TwoTenants) {
    let session = Session::new(tenants.member_b, tenants.org_b.id);
    let issue_id = tenants.issue_a.id;
    let notifications_before = tenants.store.notifications().len();

    let status = tenants
        .services
        .issues
        .change_status(&session, &issue_id, IssueStatus::Fixed)
        .await
        .expect_err("status");
    let assign = tenants
        .services
        .issues
        .assign(&session, &issue_id, Some(tenants.member_b))
        .await
        .expect_err("assign");
    let comment = tenants
        .services
        .issues
        .add_comment(&session, &issue_id, "hello from B")
        .await
        .expect_err("comment");
    let watch = tenants
        .services
        .watchers
        .watch(&session, &issue_id)
        .await
        .expect_err("watch");

    for error in [status, assign, comment, watch] {
        assert_eq!(error.code(), ErrorCode::NotFound);
    }
    assert_eq!(
        tenants.store.issue(&issue_id).map(|issue| issue.status),
        Some(IssueStatus::New)
    );
    assert!(tenants.store.comments(&issue_id).is_empty());
    assert!(
        tenants
            .store
            .watcher_rows(&issue_id)
            .iter()
            .all(|row| row.user_id != tenants.member_b)
    );
    assert_eq!(tenants.store.notifications().len(), notifications_before);
}

#[rstest]
#[tokio::test]
async fn foreign_notifications_cannot_be_marked_read(tenants: TwoTenants) {
    let rows = tenants.store.notifications_for(&tenants.owner_a);
    assert_eq!(rows.len(), 1);
    let session = Session::new(tenants.member_b, tenants.org_b.id);

    for row in rows {
        let error = tenants
            .services
            .inbox
            .mark_read(&session, &row.id)
            .await
            .expect_err("row belongs to A");
        assert_eq!(error.code(), ErrorCode::NotFound);
    }
    let listed = tenants
        .services
        .inbox
        .list(&session, false, 50)
        .await
        .expect("B's inbox");
    assert!(listed.is_empty());
}

#[rstest]
#[tokio::test]
async fn foreign_machines_are_not_found(tenants: TwoTenants) {
    let machine = tenants.store.add_machine(tenants.org_a.id, "Cirqus Voltaire", None);

    let error = tenants
        .services
        .guard
        .load_machine(&tenants.org_b.id, &machine.id)
        .await
        .expect_err("machine belongs to A");

    assert_eq!(error.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn owner_still_sees_their_issue(tenants: TwoTenants) {
    let session = Session::new(tenants.owner_a, tenants.org_a.id);

    let issue = tenants
        .services
        .guard
        .load_issue(&session, &tenants.issue_a.id)
        .await
        .expect("visible in A");

    assert_eq!(issue, tenants.issue_a);
}
