//! Wiring of domain services from port implementations.

use std::sync::Arc;

use mockable::Clock;

use crate::domain::ports::{
    EmailTransport, IssueRepository, MachineRepository, MembershipRepository,
    NotificationPreferencesRepository, NotificationRepository, RoleRepository, UserDirectory,
    WatcherRepository,
};
use crate::domain::{
    IssueCommandParts, IssueCommandService, NotificationEngine, NotificationEngineParts,
    NotificationInbox, OrganizationGuard, PermissionResolver, PreferenceService, WatcherRegistry,
};

/// Parameter object bundling every driven port the core needs.
#[derive(Clone)]
pub struct PinpointPorts {
    /// Membership storage.
    pub memberships: Arc<dyn MembershipRepository>,
    /// Role storage.
    pub roles: Arc<dyn RoleRepository>,
    /// Issue storage.
    pub issues: Arc<dyn IssueRepository>,
    /// Machine catalogue.
    pub machines: Arc<dyn MachineRepository>,
    /// User contact directory.
    pub directory: Arc<dyn UserDirectory>,
    /// Watcher storage.
    pub watchers: Arc<dyn WatcherRepository>,
    /// Preference storage.
    pub preferences: Arc<dyn NotificationPreferencesRepository>,
    /// Notification storage.
    pub notifications: Arc<dyn NotificationRepository>,
    /// Outbound email.
    pub transport: Arc<dyn EmailTransport>,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
}

/// Fully assembled domain services.
#[derive(Clone)]
pub struct PinpointServices {
    /// Capability resolution and role administration.
    pub resolver: PermissionResolver,
    /// Tenant boundary checks.
    pub guard: OrganizationGuard,
    /// Subscriptions.
    pub watchers: WatcherRegistry,
    /// Notification preferences.
    pub preferences: PreferenceService,
    /// Notification decisions and delivery.
    pub engine: NotificationEngine,
    /// Issue mutations.
    pub issues: IssueCommandService,
    /// Recipient inbox.
    pub inbox: NotificationInbox,
}

impl PinpointServices {
    /// Build every service over `ports`.
    pub fn new(ports: PinpointPorts) -> Self {
        let resolver = PermissionResolver::new(ports.memberships.clone(), ports.roles.clone());
        let guard = OrganizationGuard::new(
            resolver.clone(),
            ports.issues.clone(),
            ports.machines.clone(),
        );
        let watchers = WatcherRegistry::new(
            guard.clone(),
            ports.watchers.clone(),
            ports.preferences.clone(),
        );
        let preferences = PreferenceService::new(
            ports.preferences.clone(),
            resolver.clone(),
            ports.clock.clone(),
        );
        let engine = NotificationEngine::new(NotificationEngineParts {
            registry: watchers.clone(),
            preferences: preferences.clone(),
            memberships: ports.memberships.clone(),
            directory: ports.directory.clone(),
            notifications: ports.notifications.clone(),
            transport: ports.transport.clone(),
            clock: ports.clock.clone(),
        });
        let issues = IssueCommandService::new(IssueCommandParts {
            guard: guard.clone(),
            preferences: preferences.clone(),
            engine: engine.clone(),
            issues: ports.issues.clone(),
            clock: ports.clock.clone(),
        });
        let inbox = NotificationInbox::new(resolver.clone(), ports.notifications, ports.clock);

        Self {
            resolver,
            guard,
            watchers,
            preferences,
            engine,
            issues,
            inbox,
        }
    }
}
