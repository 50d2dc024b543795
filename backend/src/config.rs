//! Runtime settings loaded via OrthoConfig.
//!
//! Values come from CLI flags, `PINPOINT_*` environment variables, and config
//! files, in OrthoConfig's usual precedence.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

const DEFAULT_POOL_MAX_SIZE: u32 = 10;
const DEFAULT_EMAIL_FROM: &str = "notifications@pinpoint.app";
const DEFAULT_EMAIL_TIMEOUT_SECONDS: u64 = 10;

/// Errors raised while interpreting loaded settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// No database URL was configured.
    #[error("database_url is required")]
    MissingDatabaseUrl,
    /// The email endpoint is not a valid absolute URL.
    #[error("email_endpoint is not a valid URL: {message}")]
    InvalidEmailEndpoint {
        /// Parser message.
        message: String,
    },
    /// A numeric setting is out of range.
    #[error("{field} must be positive")]
    NotPositive {
        /// Offending setting.
        field: &'static str,
    },
}

/// Settings for the persistence pool and the email transport.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PINPOINT")]
pub struct PinpointSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Maximum pooled connections.
    pub pool_max_size: Option<u32>,
    /// Webhook receiving outbound email; unset logs emails instead.
    pub email_endpoint: Option<String>,
    /// Bearer token for the email webhook.
    pub email_api_key: Option<String>,
    /// Sender address.
    pub email_from: Option<String>,
    /// Per-request timeout for the email webhook.
    pub email_timeout_seconds: Option<u64>,
}

impl PinpointSettings {
    /// Configured database URL.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(SettingsError::MissingDatabaseUrl)
    }

    /// Pool size, falling back to the default.
    pub fn pool_max_size(&self) -> Result<u32, SettingsError> {
        match self.pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE) {
            0 => Err(SettingsError::NotPositive {
                field: "pool_max_size",
            }),
            size => Ok(size),
        }
    }

    /// Parsed email endpoint, if configured.
    pub fn email_endpoint(&self) -> Result<Option<Url>, SettingsError> {
        self.email_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                Url::parse(raw).map_err(|err| SettingsError::InvalidEmailEndpoint {
                    message: err.to_string(),
                })
            })
            .transpose()
    }

    /// Sender address, falling back to the default.
    pub fn email_from(&self) -> &str {
        self.email_from.as_deref().unwrap_or(DEFAULT_EMAIL_FROM)
    }

    /// Email request timeout, falling back to the default.
    pub fn email_timeout(&self) -> Result<Duration, SettingsError> {
        match self
            .email_timeout_seconds
            .unwrap_or(DEFAULT_EMAIL_TIMEOUT_SECONDS)
        {
            0 => Err(SettingsError::NotPositive {
                field: "email_timeout_seconds",
            }),
            seconds => Ok(Duration::from_secs(seconds)),
        }
    }
}
