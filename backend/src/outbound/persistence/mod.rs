//! PostgreSQL persistence adapters using Diesel.
//!
//! Repositories translate between internal row structs (`models.rs`) and
//! domain types. Every tenant-scoped read filters on `organization_id` in SQL
//! so a foreign row is indistinguishable from a missing one.
//!
//! ```ignore
//! use pinpoint::outbound::persistence::{DbPool, PoolConfig, postgres_ports};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/pinpoint")).await?;
//! let ports = postgres_ports(pool, transport, clock);
//! ```

use std::sync::Arc;

use mockable::Clock;

use crate::domain::ports::EmailTransport;
use crate::services::PinpointPorts;

mod diesel_basic_error_mapping;
mod diesel_directory;
mod diesel_issue_repository;
mod diesel_membership_repository;
mod diesel_notification_preferences_repository;
mod diesel_notification_repository;
mod diesel_role_repository;
mod diesel_watcher_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_directory::DieselDirectory;
pub use diesel_issue_repository::DieselIssueRepository;
pub use diesel_membership_repository::DieselMembershipRepository;
pub use diesel_notification_preferences_repository::DieselNotificationPreferencesRepository;
pub use diesel_notification_repository::DieselNotificationRepository;
pub use diesel_role_repository::DieselRoleRepository;
pub use diesel_watcher_repository::DieselWatcherRepository;
pub use migrations::{MIGRATIONS, MigrationError, pending_migrations, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};

/// Wire every repository port to `pool`.
pub fn postgres_ports(
    pool: DbPool,
    transport: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
) -> PinpointPorts {
    let directory = Arc::new(DieselDirectory::new(pool.clone()));
    PinpointPorts {
        memberships: Arc::new(DieselMembershipRepository::new(pool.clone())),
        roles: Arc::new(DieselRoleRepository::new(pool.clone())),
        issues: Arc::new(DieselIssueRepository::new(pool.clone())),
        machines: directory.clone(),
        directory,
        watchers: Arc::new(DieselWatcherRepository::new(pool.clone())),
        preferences: Arc::new(DieselNotificationPreferencesRepository::new(pool.clone())),
        notifications: Arc::new(DieselNotificationRepository::new(pool)),
        transport,
        clock,
    }
}
