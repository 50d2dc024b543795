//! Notification decision engine.
//!
//! Given an [`IssueEvent`], decide who hears about it and through which
//! channel. Planning never fails: storage faults are logged, recorded on the
//! plan, and the plan is returned with whatever could be decided. Email sends
//! happen after the triggering mutation commits and their failures are logged
//! and counted, never returned; commands hand them to a spawned task so the
//! caller does not wait on the transport.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use mockable::Clock;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::ports::{EmailTransport, MembershipRepository, NotificationRepository, UserDirectory};
use super::preferences_service::with_defaults;
use super::{
    ChannelToggles, DeliveryHandle, DeliveryPlan, DeliveryReport, EmailDelivery, EmailTemplate,
    EventId, IssueEvent, IssueEventKind, Notification, NotificationCategory, NotificationId,
    NotificationPreferences, PlanFault, PreferenceService, UserId, WatchReason, WatchReasons,
    Watcher, WatcherRegistry, deliverable_email,
};

/// Why a candidate is in the recipient set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Interest {
    reasons: WatchReasons,
    global: bool,
}

impl Interest {
    /// Categories whose toggles apply, most specific first.
    fn categories(self, kind: &IssueEventKind) -> Vec<NotificationCategory> {
        match kind {
            IssueEventKind::Created { .. } => {
                let owner = self.reasons.contains(WatchReason::AutoOwnedMachine);
                let other = self.global
                    || self
                        .reasons
                        .iter()
                        .any(|reason| reason != WatchReason::AutoOwnedMachine);
                let mut categories = Vec::with_capacity(2);
                if owner {
                    categories.push(NotificationCategory::MachineOwned);
                }
                if other {
                    categories.push(NotificationCategory::NewIssue);
                }
                categories
            }
            other => vec![other.category()],
        }
    }
}

/// Channels and row category for one recipient.
pub(crate) fn resolve_channels(
    preferences: &NotificationPreferences,
    categories: &[NotificationCategory],
) -> Option<(NotificationCategory, ChannelToggles)> {
    let primary = *categories.first()?;
    let channels = categories
        .iter()
        .map(|category| preferences.channels_for(*category))
        .fold(ChannelToggles::OFF, ChannelToggles::or);
    channels.any().then_some((primary, channels))
}

/// Engine turning issue events into notification rows and emails.
#[derive(Clone)]
pub struct NotificationEngine {
    registry: WatcherRegistry,
    preferences: PreferenceService,
    memberships: Arc<dyn MembershipRepository>,
    directory: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationRepository>,
    transport: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
}

/// Collaborators of [`NotificationEngine`].
pub struct NotificationEngineParts {
    /// Watcher lookups.
    pub registry: WatcherRegistry,
    /// Preference lookups.
    pub preferences: PreferenceService,
    /// Current members, used to drop former members from recipient sets.
    pub memberships: Arc<dyn MembershipRepository>,
    /// Contact lookups for email.
    pub directory: Arc<dyn UserDirectory>,
    /// Row persistence for [`NotificationEngine::dispatch`].
    pub notifications: Arc<dyn NotificationRepository>,
    /// Outbound email.
    pub transport: Arc<dyn EmailTransport>,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
}

impl NotificationEngine {
    /// Assemble the engine.
    pub fn new(parts: NotificationEngineParts) -> Self {
        let NotificationEngineParts {
            registry,
            preferences,
            memberships,
            directory,
            notifications,
            transport,
            clock,
        } = parts;
        Self {
            registry,
            preferences,
            memberships,
            directory,
            notifications,
            transport,
            clock,
        }
    }

    /// Decide recipients and channels without persisting anything.
    ///
    /// `pending` holds watcher rows the triggering mutation is about to
    /// commit; they count as watchers even though storage has not seen them.
    pub async fn plan(&self, event: &IssueEvent, pending: &[Watcher]) -> DeliveryPlan {
        let mut plan = DeliveryPlan::empty(event.event_id);
        let candidates = self.candidates(event, pending, &mut plan).await;
        if candidates.is_empty() {
            log_faults(event, &plan);
            return plan;
        }

        let user_ids: Vec<UserId> = candidates.keys().copied().collect();
        let preferences = match self
            .preferences
            .preferences_for(&event.organization_id, &user_ids)
            .await
        {
            Ok(found) => found,
            Err(error) => {
                plan.faults.push(PlanFault::Preferences {
                    message: error.message().to_owned(),
                });
                with_defaults(
                    &event.organization_id,
                    &user_ids,
                    Vec::new(),
                    self.clock.as_ref(),
                )
            }
        };

        let now = self.clock.utc();
        let mut email_wanted: Vec<(UserId, NotificationCategory)> = Vec::new();
        for (user_id, interest) in &candidates {
            let Some(prefs) = preferences.get(user_id) else {
                continue;
            };
            let Some((category, channels)) =
                resolve_channels(prefs, &interest.categories(&event.kind))
            else {
                continue;
            };
            if channels.in_app {
                plan.notifications.push(Notification {
                    id: NotificationId::for_delivery(event.event_id, *user_id),
                    recipient_id: *user_id,
                    organization_id: event.organization_id,
                    category,
                    payload: event.payload.clone(),
                    event_id: event.event_id,
                    read_at: None,
                    created_at: now,
                });
            }
            if channels.email {
                email_wanted.push((*user_id, category));
            }
        }

        self.plan_emails(event, &email_wanted, &mut plan).await;
        log_faults(event, &plan);
        debug!(
            event_id = %event.event_id,
            issue_id = %event.issue_id,
            in_app = plan.notifications.len(),
            emails = plan.emails.len(),
            "delivery planned"
        );
        plan
    }

    /// Hand every planned email to the transport and wait for the outcomes.
    pub async fn deliver(&self, plan: &DeliveryPlan) -> DeliveryReport {
        send_all(self.transport.as_ref(), plan.event_id, &plan.emails).await
    }

    /// Start sending the planned emails without waiting for them.
    ///
    /// Inside a Tokio runtime the sends run on a spawned task and this
    /// returns immediately. Without one they run inline.
    pub async fn hand_off(&self, plan: &DeliveryPlan) -> DeliveryHandle {
        let queued = plan.emails.len();
        if queued == 0 {
            return DeliveryHandle::done(0, DeliveryReport::default());
        }
        let Ok(runtime) = Handle::try_current() else {
            return DeliveryHandle::done(queued, self.deliver(plan).await);
        };
        let transport = Arc::clone(&self.transport);
        let event_id = plan.event_id;
        let emails = plan.emails.clone();
        debug!(event_id = %event_id, queued, "emails handed off");
        DeliveryHandle::running(
            queued,
            runtime.spawn(async move { send_all(transport.as_ref(), event_id, &emails).await }),
        )
    }

    /// Plan, persist the rows, and deliver, for events whose mutation has
    /// already committed.
    ///
    /// Rows are keyed by (event, recipient), so dispatching the same event
    /// twice inserts nothing the second time.
    pub async fn dispatch(&self, event: &IssueEvent) -> DeliveryPlan {
        let mut plan = self.plan(event, &[]).await;
        if !plan.notifications.is_empty() {
            match self.notifications.insert_many(&plan.notifications).await {
                Ok(inserted) => debug!(
                    event_id = %event.event_id,
                    inserted,
                    planned = plan.notifications.len(),
                    "notification rows persisted"
                ),
                Err(error) => {
                    warn!(
                        event_id = %event.event_id,
                        organization_id = %event.organization_id,
                        %error,
                        "notification rows not persisted"
                    );
                    plan.faults.push(PlanFault::Persistence {
                        message: error.to_string(),
                    });
                }
            }
        }
        self.deliver(&plan).await;
        plan
    }

    async fn candidates(
        &self,
        event: &IssueEvent,
        pending: &[Watcher],
        plan: &mut DeliveryPlan,
    ) -> BTreeMap<UserId, Interest> {
        let mut candidates: BTreeMap<UserId, Interest> = BTreeMap::new();
        let mut add = |watcher: &Watcher| {
            if watcher.organization_id == event.organization_id && watcher.issue_id == event.issue_id
            {
                let entry = candidates.entry(watcher.user_id).or_default();
                entry.reasons = entry.reasons.union(watcher.reasons);
            }
        };

        match self
            .registry
            .list_watchers(&event.organization_id, &event.issue_id)
            .await
        {
            Ok(stored) => stored.iter().for_each(&mut add),
            Err(error) => plan.faults.push(PlanFault::Watchers {
                message: error.message().to_owned(),
            }),
        }
        pending.iter().for_each(&mut add);

        if matches!(event.kind, IssueEventKind::Created { .. }) {
            match self
                .registry
                .list_global_watchers(&event.organization_id)
                .await
            {
                Ok(global) => {
                    for user_id in global {
                        candidates.entry(user_id).or_default().global = true;
                    }
                }
                Err(error) => plan.faults.push(PlanFault::GlobalWatchers {
                    message: error.message().to_owned(),
                }),
            }
        }

        if let Some(actor) = event.actor {
            candidates.remove(&actor);
        }
        if candidates.is_empty() {
            return candidates;
        }

        match self
            .memberships
            .list_for_organization(&event.organization_id)
            .await
        {
            Ok(memberships) => {
                let members: HashSet<UserId> = memberships
                    .iter()
                    .filter(|membership| membership.organization_id == event.organization_id)
                    .map(|membership| membership.user_id)
                    .collect();
                candidates.retain(|user_id, _| members.contains(user_id));
                candidates
            }
            Err(error) => {
                plan.faults.push(PlanFault::Memberships {
                    message: error.to_string(),
                });
                BTreeMap::new()
            }
        }
    }

    async fn plan_emails(
        &self,
        event: &IssueEvent,
        wanted: &[(UserId, NotificationCategory)],
        plan: &mut DeliveryPlan,
    ) {
        if wanted.is_empty() {
            return;
        }
        let user_ids: Vec<UserId> = wanted.iter().map(|(user_id, _)| *user_id).collect();
        let contacts = match self.directory.find_contacts(&user_ids).await {
            Ok(contacts) => contacts,
            Err(error) => {
                plan.faults.push(PlanFault::Contacts {
                    message: error.to_string(),
                });
                return;
            }
        };
        let by_user: HashMap<UserId, _> = contacts
            .iter()
            .map(|contact| (contact.id, contact))
            .collect();

        let mut suppressed = BTreeSet::new();
        for (user_id, category) in wanted {
            let address = by_user
                .get(user_id)
                .and_then(|contact| deliverable_email(contact));
            match address {
                Some(address) => plan.emails.push(EmailDelivery {
                    recipient_id: *user_id,
                    address: address.clone(),
                    template: EmailTemplate::for_category(*category),
                    payload: event.payload.clone(),
                }),
                None => {
                    suppressed.insert(*user_id);
                }
            }
        }
        if !suppressed.is_empty() {
            debug!(
                event_id = %event.event_id,
                suppressed = suppressed.len(),
                "email skipped for recipients without a deliverable address"
            );
        }
    }
}

async fn send_all(
    transport: &dyn EmailTransport,
    event_id: EventId,
    emails: &[EmailDelivery],
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for email in emails {
        match transport
            .send(&email.address, email.template, &email.payload)
            .await
        {
            Ok(()) => report.sent += 1,
            Err(error) => {
                warn!(
                    event_id = %event_id,
                    recipient_id = %email.recipient_id,
                    template = email.template.as_str(),
                    %error,
                    "email send failed"
                );
                report.failed.push(email.recipient_id);
            }
        }
    }
    if !emails.is_empty() {
        info!(
            event_id = %event_id,
            sent = report.sent,
            failed = report.failed.len(),
            "emails delivered"
        );
    }
    report
}

fn log_faults(event: &IssueEvent, plan: &DeliveryPlan) {
    for fault in &plan.faults {
        warn!(
            event_id = %event.event_id,
            organization_id = %event.organization_id,
            issue_id = %event.issue_id,
            stage = fault.stage(),
            message = fault.message(),
            "notification planning degraded"
        );
    }
}

#[cfg(test)]
#[path = "notification_engine_tests.rs"]
mod tests;
