//! YouTube Data API v3 endpoints used by the ingestion jobs

use crate::client::RateLimitedClient;
use crate::{IngestionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

/// Result ordering accepted by `/search`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOrder {
    Date,
    ViewCount,
}

impl SearchOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::ViewCount => "viewCount",
        }
    }
}

/// Parameters for a single `/search` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub channel_id: Option<String>,
    pub order: SearchOrder,
    pub region_code: Option<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub max_results: u32,
}

impl SearchQuery {
    pub fn new(order: SearchOrder, max_results: u32) -> Self {
        Self {
            query: None,
            channel_id: None,
            order,
            region_code: None,
            published_after: None,
            max_results,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_region(mut self, region_code: impl Into<String>) -> Self {
        self.region_code = Some(region_code.into());
        self
    }

    pub fn published_after(mut self, at: DateTime<Utc>) -> Self {
        self.published_after = Some(at);
        self
    }

    pub(crate) fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("type", "video".to_string()),
            ("order", self.order.as_str().to_string()),
            ("maxResults", self.max_results.clamp(1, 50).to_string()),
        ];
        if let Some(q) = &self.query {
            params.push(("q", q.clone()));
        }
        if let Some(channel_id) = &self.channel_id {
            params.push(("channelId", channel_id.clone()));
        }
        if let Some(region) = &self.region_code {
            params.push(("regionCode", region.clone()));
        }
        if let Some(after) = self.published_after {
            params.push((
                "publishedAfter",
                after.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        params
    }
}

/// Source of raw video payloads
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Search items (`id.videoId` + `snippet`)
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>>;

    /// Detail item for one video, `None` if the platform no longer has it
    async fn video_details(&self, external_id: &str) -> Result<Option<Value>>;
}

/// `VideoSource` backed by the live API
#[derive(Clone)]
pub struct YouTubeApi {
    client: RateLimitedClient,
}

impl YouTubeApi {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VideoSource for YouTubeApi {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>> {
        let params = query.to_params();
        let response = self.client.fetch("search", &params).await?;
        let items = take_items("search", response)?;

        debug!(
            order = query.order.as_str(),
            channel_id = query.channel_id.as_deref().unwrap_or(""),
            count = items.len(),
            "Search returned items"
        );
        Ok(items)
    }

    async fn video_details(&self, external_id: &str) -> Result<Option<Value>> {
        let params = [
            ("part", "snippet,contentDetails,statistics".to_string()),
            ("id", external_id.to_string()),
        ];
        let response = self.client.fetch("videos", &params).await?;
        Ok(take_items("videos", response)?.into_iter().next())
    }
}

/// The `items` array of a list response; anything else is malformed
fn take_items(endpoint: &str, mut response: Value) -> Result<Vec<Value>> {
    match response.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(IngestionError::permanent(
            endpoint,
            format!("expected items array, got {}", other),
        )),
        None => Err(IngestionError::permanent(endpoint, "response has no items")),
    }
}
