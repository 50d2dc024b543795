//! Embedded schema migrations.

use diesel::{Connection, PgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

/// Migrations under `backend/migrations`, compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Failure while applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The database could not be reached.
    #[error("failed to connect for migrations: {message}")]
    Connection {
        /// Driver message.
        message: String,
    },
    /// A migration failed to apply or list.
    #[error("migration failed: {message}")]
    Migration {
        /// Harness message.
        message: String,
    },
}

fn connect(database_url: &str) -> Result<PgConnection, MigrationError> {
    PgConnection::establish(database_url).map_err(|err| MigrationError::Connection {
        message: err.to_string(),
    })
}

/// Apply every pending migration. Returns the applied versions.
///
/// # Errors
///
/// Returns [`MigrationError`] when the database is unreachable or a migration
/// fails; a failed migration rolls back its own transaction.
pub fn run_pending_migrations(database_url: &str) -> Result<Vec<String>, MigrationError> {
    let mut conn = connect(database_url)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| MigrationError::Migration {
            message: err.to_string(),
        })?;
    Ok(applied.iter().map(ToString::to_string).collect())
}

/// Versions not yet applied.
///
/// # Errors
///
/// Returns [`MigrationError`] when the database is unreachable or the
/// migration table cannot be read.
pub fn pending_migrations(database_url: &str) -> Result<Vec<String>, MigrationError> {
    let mut conn = connect(database_url)?;
    let pending = conn
        .pending_migrations(MIGRATIONS)
        .map_err(|err| MigrationError::Migration {
            message: err.to_string(),
        })?;
    Ok(pending
        .iter()
        .map(|migration| migration.name().to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    const CORE_UP: &str =
        include_str!("../../../migrations/2026-03-01-000000_notification_core/up.sql");

    #[rstest]
    fn organizations_carry_a_unique_subdomain() {
        let table = CORE_UP
            .split("CREATE TABLE organizations (")
            .nth(1)
            .and_then(|rest| rest.split(");").next())
            .expect("organizations table");

        assert!(table.contains("subdomain VARCHAR(63) NOT NULL UNIQUE"));
    }
}
