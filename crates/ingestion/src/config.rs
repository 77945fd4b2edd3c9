//! Ingestion service configuration
//!
//! # Environment Variables
//!
//! All keys carry the `FANBASE_` prefix.
//!
//! - `YOUTUBE_API_KEY` (required, falls back to unprefixed `YOUTUBE_API_KEY`)
//! - `YOUTUBE_BASE_URL` (default: `https://www.googleapis.com/youtube/v3`)
//! - `OFFICIAL_CHANNEL_IDS` comma-separated
//! - `SEARCH_QUERY` (required)
//! - `REGION_CODE` (default: NG), `MAX_RESULTS` (default: 50)
//! - `MAX_REQUESTS_PER_WINDOW` (default: 50), `RATE_WINDOW_MS` (default: 1000)
//! - `REQUEST_TIMEOUT_SECS` (default: 10)
//! - `MAX_RETRIES` (default: 3), `RETRY_DELAY_MS` (default: 5000)
//! - `CRON_TRENDING`, `CRON_MUSIC`, `CRON_GENERAL`, `CRON_METRICS`
//! - `TRENDING_LOOKBACK_DAYS`, `GENERAL_LOOKBACK_DAYS` (default: 30)
//! - `STALE_THRESHOLD_HOURS` (default: 6), `STALE_BATCH_LIMIT` (default: 100)
//! - `BATCH_SIZE` (default: 5), `BATCH_PAUSE_MS` (default: 1500)
//! - `METRIC_HISTORY_CAP` (default: 100, 0 keeps everything)
//! - `HEALTH_PORT` (default: 8085)

use crate::client::ClientConfig;
use crate::jobs::SearchSettings;
use crate::models::HistoryCap;
use crate::scheduler::JobTrigger;
use fanbase_core::config::{env_list, env_or, parse_env_var, ConfigLoader};
use fanbase_core::FanbaseError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub youtube_api_key: String,
    pub youtube_base_url: String,
    pub official_channel_ids: Vec<String>,
    pub search_query: String,
    pub region_code: String,
    pub max_results: u32,

    pub max_requests_per_window: usize,
    pub rate_window_ms: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,

    pub cron_trending: String,
    pub cron_music: String,
    pub cron_general: String,
    pub cron_metrics: String,

    pub trending_lookback_days: i64,
    pub general_lookback_days: i64,
    pub stale_threshold_hours: i64,
    pub stale_batch_limit: usize,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub metric_history_cap: usize,

    pub health_port: u16,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            youtube_api_key: String::new(),
            youtube_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            official_channel_ids: Vec::new(),
            search_query: String::new(),
            region_code: "NG".to_string(),
            max_results: 50,
            max_requests_per_window: 50,
            rate_window_ms: 1000,
            request_timeout_secs: 10,
            max_retries: 3,
            retry_delay_ms: 5000,
            cron_trending: "0 */6 * * *".to_string(),
            cron_music: "30 0,12 * * *".to_string(),
            cron_general: "15 */3 * * *".to_string(),
            cron_metrics: "45 */4 * * *".to_string(),
            trending_lookback_days: 30,
            general_lookback_days: 30,
            stale_threshold_hours: 6,
            stale_batch_limit: 100,
            batch_size: 5,
            batch_pause_ms: 1500,
            metric_history_cap: 100,
            health_port: 8085,
        }
    }
}

impl ConfigLoader for IngestionConfig {
    fn from_env() -> Result<Self, FanbaseError> {
        let d = Self::default();

        Ok(Self {
            youtube_api_key: env_or(&["FANBASE_YOUTUBE_API_KEY", "YOUTUBE_API_KEY"], ""),
            youtube_base_url: env_or(&["FANBASE_YOUTUBE_BASE_URL"], &d.youtube_base_url),
            official_channel_ids: env_list("FANBASE_OFFICIAL_CHANNEL_IDS"),
            search_query: env_or(&["FANBASE_SEARCH_QUERY"], ""),
            region_code: env_or(&["FANBASE_REGION_CODE"], &d.region_code),
            max_results: parse_env_var("FANBASE_MAX_RESULTS", d.max_results)?,
            max_requests_per_window: parse_env_var(
                "FANBASE_MAX_REQUESTS_PER_WINDOW",
                d.max_requests_per_window,
            )?,
            rate_window_ms: parse_env_var("FANBASE_RATE_WINDOW_MS", d.rate_window_ms)?,
            request_timeout_secs: parse_env_var(
                "FANBASE_REQUEST_TIMEOUT_SECS",
                d.request_timeout_secs,
            )?,
            max_retries: parse_env_var("FANBASE_MAX_RETRIES", d.max_retries)?,
            retry_delay_ms: parse_env_var("FANBASE_RETRY_DELAY_MS", d.retry_delay_ms)?,
            cron_trending: env_or(&["FANBASE_CRON_TRENDING"], &d.cron_trending),
            cron_music: env_or(&["FANBASE_CRON_MUSIC"], &d.cron_music),
            cron_general: env_or(&["FANBASE_CRON_GENERAL"], &d.cron_general),
            cron_metrics: env_or(&["FANBASE_CRON_METRICS"], &d.cron_metrics),
            trending_lookback_days: parse_env_var(
                "FANBASE_TRENDING_LOOKBACK_DAYS",
                d.trending_lookback_days,
            )?,
            general_lookback_days: parse_env_var(
                "FANBASE_GENERAL_LOOKBACK_DAYS",
                d.general_lookback_days,
            )?,
            stale_threshold_hours: parse_env_var(
                "FANBASE_STALE_THRESHOLD_HOURS",
                d.stale_threshold_hours,
            )?,
            stale_batch_limit: parse_env_var("FANBASE_STALE_BATCH_LIMIT", d.stale_batch_limit)?,
            batch_size: parse_env_var("FANBASE_BATCH_SIZE", d.batch_size)?,
            batch_pause_ms: parse_env_var("FANBASE_BATCH_PAUSE_MS", d.batch_pause_ms)?,
            metric_history_cap: parse_env_var(
                "FANBASE_METRIC_HISTORY_CAP",
                d.metric_history_cap,
            )?,
            health_port: parse_env_var("FANBASE_HEALTH_PORT", d.health_port)?,
        })
    }

    fn validate(&self) -> Result<(), FanbaseError> {
        if self.youtube_api_key.trim().is_empty() {
            return Err(FanbaseError::config(
                "YouTube API key must be set",
                "FANBASE_YOUTUBE_API_KEY",
            ));
        }
        if self.search_query.trim().is_empty() {
            return Err(FanbaseError::config(
                "search query must be set",
                "FANBASE_SEARCH_QUERY",
            ));
        }
        if self.max_requests_per_window == 0 {
            return Err(FanbaseError::config(
                "max_requests_per_window must be greater than 0",
                "FANBASE_MAX_REQUESTS_PER_WINDOW",
            ));
        }
        if self.rate_window_ms == 0 {
            return Err(FanbaseError::config(
                "rate window must be greater than 0 ms",
                "FANBASE_RATE_WINDOW_MS",
            ));
        }
        if self.batch_size == 0 {
            return Err(FanbaseError::config(
                "batch_size must be greater than 0",
                "FANBASE_BATCH_SIZE",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(FanbaseError::config(
                "request timeout must be greater than 0 seconds",
                "FANBASE_REQUEST_TIMEOUT_SECS",
            ));
        }
        if self.max_results == 0 || self.max_results > 50 {
            return Err(FanbaseError::config(
                format!("max_results must be between 1 and 50, got {}", self.max_results),
                "FANBASE_MAX_RESULTS",
            ));
        }

        for (key, expression) in [
            ("FANBASE_CRON_TRENDING", &self.cron_trending),
            ("FANBASE_CRON_MUSIC", &self.cron_music),
            ("FANBASE_CRON_GENERAL", &self.cron_general),
            ("FANBASE_CRON_METRICS", &self.cron_metrics),
        ] {
            JobTrigger::cron(expression).map_err(|e| FanbaseError::config(e.to_string(), key))?;
        }

        Ok(())
    }
}

impl IngestionConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.youtube_base_url.clone(),
            api_key: self.youtube_api_key.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            search_query: self.search_query.clone(),
            region_code: self.region_code.clone(),
            max_results: self.max_results,
            official_channel_ids: self.official_channel_ids.clone(),
            trending_lookback_days: self.trending_lookback_days,
            general_lookback_days: self.general_lookback_days,
            batch_size: self.batch_size,
            batch_pause: self.batch_pause(),
        }
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stale_threshold_hours)
    }

    /// `METRIC_HISTORY_CAP = 0` means unbounded
    pub fn history_cap(&self) -> HistoryCap {
        (self.metric_history_cap > 0).then_some(self.metric_history_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> IngestionConfig {
        IngestionConfig {
            youtube_api_key: "key".to_string(),
            search_query: "artist".to_string(),
            ..IngestionConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate_once_required_values_set() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = IngestionConfig {
            youtube_api_key: " ".to_string(),
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.config_key(), Some("FANBASE_YOUTUBE_API_KEY"));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = IngestionConfig {
            max_requests_per_window: 0,
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.config_key(), Some("FANBASE_MAX_REQUESTS_PER_WINDOW"));

        let config = IngestionConfig {
            batch_size: 0,
            ..valid()
        };
        assert_eq!(
            config.validate().unwrap_err().config_key(),
            Some("FANBASE_BATCH_SIZE")
        );
    }

    #[test]
    fn test_bad_cron_names_its_key() {
        let config = IngestionConfig {
            cron_music: "whenever".to_string(),
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.config_key(), Some("FANBASE_CRON_MUSIC"));
    }

    #[test]
    fn test_history_cap_zero_is_unbounded() {
        let config = IngestionConfig {
            metric_history_cap: 0,
            ..valid()
        };
        assert_eq!(config.history_cap(), None);
        assert_eq!(valid().history_cap(), Some(100));
    }

    #[test]
    fn test_derived_settings() {
        let config = valid();
        assert_eq!(config.client_config().max_retries, 3);
        assert_eq!(config.rate_window(), Duration::from_millis(1000));
        assert_eq!(config.search_settings().batch_pause, Duration::from_millis(1500));
        assert_eq!(config.stale_threshold(), chrono::Duration::hours(6));
    }
}
