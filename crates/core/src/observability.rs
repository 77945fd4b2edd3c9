//! Structured logging initialization
//!
//! All services log through `tracing`. The subscriber emits JSON lines by
//! default, or human-readable output for local development.

use crate::error::FanbaseError;
use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = FanbaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(FanbaseError::config(
                format!("Unknown log format '{}', expected json or pretty", other),
                "FANBASE_LOG_FORMAT",
            )),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `fanbase_ingestion=debug,sqlx=warn`
    pub filter: String,
    pub format: LogFormat,
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Json,
            service_name: "fanbase".to_string(),
        }
    }
}

impl LogConfig {
    /// Read `FANBASE_LOG_LEVEL` (falls back to `RUST_LOG`) and `FANBASE_LOG_FORMAT`
    pub fn from_env(service_name: &str) -> Result<Self, FanbaseError> {
        let filter = std::env::var("FANBASE_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let format = match std::env::var("FANBASE_LOG_FORMAT") {
            Ok(raw) => raw.parse()?,
            Err(_) => LogFormat::Json,
        };

        Ok(Self {
            filter,
            format,
            service_name: service_name.to_string(),
        })
    }
}

/// Install the global tracing subscriber
///
/// Fails if the filter directive is invalid or a subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<(), FanbaseError> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| FanbaseError::config(e.to_string(), "FANBASE_LOG_LEVEL"))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    result.map_err(|e| FanbaseError::LoggingError(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        format = ?config.format,
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            filter: "fanbase=notalevel".to_string(),
            ..LogConfig::default()
        };
        let err = init_logging(&config).unwrap_err();
        assert_eq!(err.config_key(), Some("FANBASE_LOG_LEVEL"));
    }
}
