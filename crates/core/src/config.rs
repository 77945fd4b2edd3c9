//! Shared configuration loader for Fanbase services
//!
//! Configuration is read from environment variables carrying the `FANBASE_`
//! prefix, optionally seeded from a `.env` file. Override hierarchy:
//! defaults < .env < environment.
//!
//! # Example
//!
//! ```no_run
//! use fanbase_core::config::{load_dotenv, ConfigLoader, DatabaseConfig};
//!
//! # fn example() -> Result<(), fanbase_core::FanbaseError> {
//! load_dotenv();
//! let db_config = DatabaseConfig::from_env()?;
//! db_config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::FanbaseError;
use std::time::Duration;
use url::Url;

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, applying defaults for
    /// missing optional values.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a required variable is missing or a
    /// value cannot be parsed.
    fn from_env() -> Result<Self, FanbaseError>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if any validation check fails.
    fn validate(&self) -> Result<(), FanbaseError>;
}

/// Database configuration
///
/// # Environment Variables
///
/// - `FANBASE_DATABASE_URL` (required, falls back to `DATABASE_URL`)
/// - `FANBASE_DATABASE_MAX_CONNECTIONS` (default: 10)
/// - `FANBASE_DATABASE_MIN_CONNECTIONS` (default: 1)
/// - `FANBASE_DATABASE_CONNECT_TIMEOUT` seconds (default: 30)
/// - `FANBASE_DATABASE_IDLE_TIMEOUT` seconds (default: 600)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection acquire timeout
    pub connect_timeout: Duration,
    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/fanbase".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl ConfigLoader for DatabaseConfig {
    fn from_env() -> Result<Self, FanbaseError> {
        let url = std::env::var("FANBASE_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| {
                FanbaseError::config(
                    "DATABASE_URL or FANBASE_DATABASE_URL must be set",
                    "FANBASE_DATABASE_URL",
                )
            })?;

        let defaults = DatabaseConfig::default();
        let max_connections =
            parse_env_var("FANBASE_DATABASE_MAX_CONNECTIONS", defaults.max_connections)?;
        let min_connections =
            parse_env_var("FANBASE_DATABASE_MIN_CONNECTIONS", defaults.min_connections)?;
        let connect_timeout_secs = parse_env_var("FANBASE_DATABASE_CONNECT_TIMEOUT", 30u64)?;
        let idle_timeout_secs = parse_env_var("FANBASE_DATABASE_IDLE_TIMEOUT", 600u64)?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), FanbaseError> {
        Url::parse(&self.url).map_err(|e| {
            FanbaseError::config(
                format!("Invalid DATABASE_URL: {}", e),
                "FANBASE_DATABASE_URL",
            )
        })?;

        if self.max_connections == 0 {
            return Err(FanbaseError::config(
                "max_connections must be greater than 0",
                "FANBASE_DATABASE_MAX_CONNECTIONS",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(FanbaseError::config(
                format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    self.min_connections, self.max_connections
                ),
                "FANBASE_DATABASE_MIN_CONNECTIONS",
            ));
        }

        if self.connect_timeout.as_secs() == 0 {
            return Err(FanbaseError::config(
                "connect_timeout must be greater than 0 seconds",
                "FANBASE_DATABASE_CONNECT_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable into `T`, falling back to `default` when unset
///
/// # Errors
///
/// Returns a `ConfigurationError` if the variable is set but cannot be parsed.
pub fn parse_env_var<T>(key: &str, default: T) -> Result<T, FanbaseError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| FanbaseError::config(format!("Failed to parse {}: {}", key, e), key))
        })
        .unwrap_or(Ok(default))
}

/// Read a comma-separated list from an environment variable
///
/// Blank entries are dropped; an unset variable yields an empty list.
pub fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Read the first set variable among `keys`, or `default`
pub fn env_or(keys: &[&str], default: &str) -> String {
    keys.iter()
        .find_map(|key| std::env::var(key).ok())
        .unwrap_or_else(|| default.to_string())
}

/// Load .env file if present
///
/// Does not fail when the file is missing.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}
