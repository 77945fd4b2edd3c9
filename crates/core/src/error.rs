//! Shared error type for Fanbase services

use thiserror::Error;

/// Errors shared by every Fanbase crate
#[derive(Debug, Error)]
pub enum FanbaseError {
    /// A configuration value is missing, unparseable or out of range
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        /// Environment variable the error refers to, when known
        key: Option<String>,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Logging initialization failed: {0}")]
    LoggingError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FanbaseError {
    /// Shorthand for a configuration error tied to an environment key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Environment key associated with a configuration error
    pub fn config_key(&self) -> Option<&str> {
        match self {
            Self::ConfigurationError { key, .. } => key.as_deref(),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for FanbaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}
