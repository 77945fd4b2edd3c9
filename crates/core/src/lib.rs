//! # Fanbase Core
//!
//! Shared building blocks for Fanbase services.
//!
//! ## Modules
//!
//! - `config`: environment configuration loading and validation
//! - `database`: shared PostgreSQL connection pool
//! - `error`: error type shared across crates
//! - `observability`: structured logging setup
//! - `pagination`: offset pagination for read-side queries
//! - `retry`: fixed-delay and exponential retry helpers

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod pagination;
pub mod retry;

pub use config::{env_list, env_or, load_dotenv, parse_env_var, ConfigLoader, DatabaseConfig};
pub use database::{DatabasePool, PoolStats};
pub use error::FanbaseError;
pub use observability::{init_logging, LogConfig, LogFormat};
pub use pagination::{PageRequest, PaginatedResponse, DEFAULT_LIMIT, MAX_LIMIT};
pub use retry::{retry_with_backoff, RetryPolicy};

/// Result type alias for Fanbase operations
pub type Result<T> = std::result::Result<T, FanbaseError>;
