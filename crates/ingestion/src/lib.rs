//! Fanbase Video Ingestion Pipeline
//!
//! Scheduled jobs that poll the YouTube Data API, normalize results into
//! video records, classify them into feeds and merge them into the store
//! while tracking metric history.

pub mod classifier;
pub mod client;
pub mod config;
pub mod formatter;
pub mod jobs;
pub mod models;
pub mod query;
pub mod rate_limit;
pub mod reconcile;
pub mod refresh;
pub mod scheduler;
pub mod scorer;
pub mod store;
pub mod youtube;

// Re-export main types
pub use classifier::CategoryClassifier;
pub use client::{ClientConfig, RateLimitedClient};
pub use config::IngestionConfig;
pub use formatter::{metrics_from_detail, parse_iso8601_duration, VideoRecordFormatter};
pub use jobs::{
    ingest_video_by_id, IngestReport, JobContext, MetricsRefreshJob, SearchIngestJob,
    SearchSettings,
};
pub use models::{
    CategoryLabel, FeedJob, FormattedVideo, HistoryCap, MetricSnapshot, Metrics, Thumbnails,
    VideoRecord,
};
pub use query::VideoQueryService;
pub use rate_limit::SlidingWindowLimiter;
pub use reconcile::{ReconcileReport, ReconciliationEngine};
pub use refresh::{RefreshReport, StaleMetricsRefresher};
pub use scheduler::{JobReport, JobState, JobStatus, JobTrigger, ScheduledJob, Scheduler};
pub use scorer::EngagementScorer;
pub use store::{
    BulkWriteReport, InMemoryVideoStore, PostgresVideoStore, VideoFilter, VideoSort, VideoStore,
    VideoUpsert, VideoWrite, WriteOutcome,
};
pub use youtube::{SearchOrder, SearchQuery, VideoSource, YouTubeApi};

use fanbase_core::FanbaseError;

/// Common error type for the ingestion pipeline
#[derive(Debug, Clone, thiserror::Error)]
pub enum IngestionError {
    /// Network failure, timeout, HTTP 5xx or 429. Safe to retry.
    #[error("Transient failure calling {endpoint}: {message}")]
    Transient { endpoint: String, message: String },

    /// Client error or malformed payload. Retrying will not help.
    #[error("Permanent failure calling {endpoint}: {message}")]
    Permanent { endpoint: String, message: String },

    /// Store write failed for a single record
    #[error("Failed to persist {external_id}: {message}")]
    Persistence {
        external_id: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestionError {
    pub fn transient(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn permanent(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn persistence(external_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            external_id: external_id.into(),
            message: message.into(),
        }
    }

    /// Whether the client should retry the call that produced this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<sqlx::Error> for IngestionError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<FanbaseError> for IngestionError {
    fn from(err: FanbaseError) -> Self {
        match err {
            FanbaseError::ConfigurationError { .. } => Self::ConfigError(err.to_string()),
            FanbaseError::DatabaseError(msg) => Self::DatabaseError(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_retry() {
        assert!(IngestionError::transient("/search", "503").is_transient());
        assert!(!IngestionError::permanent("/search", "403").is_transient());
        assert!(!IngestionError::persistence("abc", "constraint").is_transient());
        assert!(!IngestionError::Internal("boom".into()).is_transient());
    }

    #[test]
    fn test_core_config_error_maps_to_config() {
        let err: IngestionError = FanbaseError::config("missing", "FANBASE_SEARCH_QUERY").into();
        assert!(matches!(err, IngestionError::ConfigError(_)));
    }
}
