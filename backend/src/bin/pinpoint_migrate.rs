//! Apply PinPoint's embedded schema migrations.
//!
//! The database URL comes from `--database-url` or `PINPOINT_DATABASE_URL`.

use std::ffi::OsString;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use ortho_config::OrthoConfig;
use pinpoint::PinpointSettings;
use pinpoint::outbound::persistence::{pending_migrations, run_pending_migrations};
use pinpoint::telemetry::init_tracing;
use tracing::info;

/// `pinpoint-migrate` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pinpoint-migrate",
    about = "Apply pending PinPoint database migrations",
    version
)]
struct CliArgs {
    /// Database connection URL. Overrides `PINPOINT_DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url")]
    database_url: Option<String>,
    /// List pending migrations without applying them.
    #[arg(long)]
    pending: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    let args = CliArgs::parse();

    let settings = PinpointSettings::load_from_iter([OsString::from("pinpoint-migrate")])
        .context("failed to load settings")?;
    let database_url = match args.database_url {
        Some(url) => url,
        None => settings.database_url()?.to_owned(),
    };

    if args.pending {
        let pending = pending_migrations(&database_url)?;
        info!(count = pending.len(), migrations = ?pending, "pending migrations");
        return Ok(());
    }

    let applied = run_pending_migrations(&database_url).context("failed to apply migrations")?;
    info!(count = applied.len(), migrations = ?applied, "migrations applied");
    Ok(())
}
