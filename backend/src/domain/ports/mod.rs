//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod access_repository;
mod directory;
mod email_transport;
mod issue_repository;
mod notification_preferences_repository;
mod notification_repository;
mod watcher_repository;

pub use access_repository::{
    AccessChangeOutcome, AccessRepositoryError, MembershipRepository, RoleRepository,
};
#[cfg(test)]
pub use access_repository::{MockMembershipRepository, MockRoleRepository};
pub use directory::{DirectoryError, MachineRepository, UserDirectory};
#[cfg(test)]
pub use directory::{MockMachineRepository, MockUserDirectory};
#[cfg(test)]
pub use email_transport::MockEmailTransport;
pub use email_transport::{EmailTransport, EmailTransportError, FixtureEmailTransport};
#[cfg(test)]
pub use issue_repository::MockIssueRepository;
pub use issue_repository::{IssueChangeSet, IssueRepository, IssueRepositoryError, IssueWrite};
#[cfg(test)]
pub use notification_preferences_repository::MockNotificationPreferencesRepository;
pub use notification_preferences_repository::{
    NotificationPreferencesRepository, NotificationPreferencesRepositoryError,
};
#[cfg(test)]
pub use notification_repository::MockNotificationRepository;
pub use notification_repository::{
    InboxQuery, NotificationRepository, NotificationRepositoryError,
};
#[cfg(test)]
pub use watcher_repository::MockWatcherRepository;
pub use watcher_repository::{WatcherRepository, WatcherRepositoryError};
