//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Client settings for the hosted backend project. None of them are required;
/// missing ones are reported at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendSettings {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub measurement_id: Option<String>,
}

impl BackendSettings {
    /// Names of the variables that were not set.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("BACKEND_API_KEY", &self.api_key),
            ("BACKEND_AUTH_DOMAIN", &self.auth_domain),
            ("BACKEND_PROJECT_ID", &self.project_id),
            ("BACKEND_STORAGE_BUCKET", &self.storage_bucket),
            ("BACKEND_MESSAGING_SENDER_ID", &self.messaging_sender_id),
            ("BACKEND_APP_ID", &self.app_id),
            ("BACKEND_MEASUREMENT_ID", &self.measurement_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Postgres connection string. Without it the service runs on the in-memory backend.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub seed_path: Option<PathBuf>,
    pub cors_origin: String,
    pub probe_interval: Duration,
    pub banner_linger: Duration,
    pub backend: BackendSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Storage ---
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        let seed_path = lookup("SEED_PATH").map(PathBuf::from);

        // --- Connectivity ---
        let probe_interval = Duration::from_secs(parse_number(&lookup, "PROBE_INTERVAL_SECS", 5)?);
        if probe_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PROBE_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let banner_linger = Duration::from_millis(parse_number(&lookup, "BANNER_LINGER_MS", 3000)?);

        // --- Backend Client Settings ---
        let backend = BackendSettings {
            api_key: lookup("BACKEND_API_KEY"),
            auth_domain: lookup("BACKEND_AUTH_DOMAIN"),
            project_id: lookup("BACKEND_PROJECT_ID"),
            storage_bucket: lookup("BACKEND_STORAGE_BUCKET"),
            messaging_sender_id: lookup("BACKEND_MESSAGING_SENDER_ID"),
            app_id: lookup("BACKEND_APP_ID"),
            measurement_id: lookup("BACKEND_MEASUREMENT_ID"),
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            seed_path,
            cors_origin,
            probe_interval,
            banner_linger,
            backend,
        })
    }
}

fn parse_number<F>(lookup: &F, name: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
