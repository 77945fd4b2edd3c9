//! Ingestion jobs driven by the scheduler
//!
//! Search jobs page through one `/search` call per query, fetch details per
//! item in small chunks with a pause between chunks, and reconcile each
//! chunk. A failing item is skipped; it never stops the batch.

use crate::formatter::VideoRecordFormatter;
use crate::models::FeedJob;
use crate::reconcile::{ReconcileReport, ReconciliationEngine};
use crate::refresh::{RefreshReport, StaleMetricsRefresher};
use crate::scheduler::{JobReport, ScheduledJob};
use crate::youtube::{SearchOrder, SearchQuery, VideoSource};
use crate::{IngestionError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Search and pacing parameters shared by the search jobs
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub search_query: String,
    pub region_code: String,
    pub max_results: u32,
    pub official_channel_ids: Vec<String>,
    pub trending_lookback_days: i64,
    pub general_lookback_days: i64,
    pub batch_size: usize,
    pub batch_pause: Duration,
}

/// Collaborators every search job needs
pub struct JobContext {
    pub source: Arc<dyn VideoSource>,
    pub formatter: VideoRecordFormatter,
    pub engine: ReconciliationEngine,
    pub settings: SearchSettings,
}

impl JobContext {
    pub fn new(
        source: Arc<dyn VideoSource>,
        engine: ReconciliationEngine,
        settings: SearchSettings,
    ) -> Self {
        let formatter = VideoRecordFormatter::new(settings.official_channel_ids.iter().cloned());
        Self {
            source,
            formatter,
            engine,
            settings,
        }
    }
}

/// Outcome of one search job run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub fetched: usize,
    pub fetch_failed: usize,
    pub not_found: usize,
    pub format_failed: usize,
    pub reconcile: ReconcileReport,
}

impl From<IngestReport> for JobReport {
    fn from(report: IngestReport) -> Self {
        JobReport {
            succeeded: report.reconcile.succeeded(),
            failed: report.fetch_failed + report.format_failed + report.reconcile.failed_count,
            skipped: report.not_found + report.reconcile.skipped_count,
        }
    }
}

impl From<RefreshReport> for JobReport {
    fn from(report: RefreshReport) -> Self {
        JobReport {
            succeeded: report.refreshed,
            failed: report.fetch_failed + report.persist_failed,
            skipped: report.not_found,
        }
    }
}

/// Trending, music or general feed ingestion
#[derive(Clone)]
pub struct SearchIngestJob {
    ctx: Arc<JobContext>,
    feed: FeedJob,
}

impl SearchIngestJob {
    pub fn new(ctx: Arc<JobContext>, feed: FeedJob) -> Self {
        Self { ctx, feed }
    }

    /// Queries issued by one run of this job
    pub fn queries(&self) -> Vec<SearchQuery> {
        let s = &self.ctx.settings;
        let now = Utc::now();

        match self.feed {
            FeedJob::Trending => vec![SearchQuery::new(SearchOrder::ViewCount, s.max_results)
                .with_query(&s.search_query)
                .with_region(&s.region_code)
                .published_after(now - chrono::Duration::days(s.trending_lookback_days))],
            FeedJob::Music => s
                .official_channel_ids
                .iter()
                .map(|channel_id| {
                    SearchQuery::new(SearchOrder::Date, s.max_results).with_channel(channel_id)
                })
                .collect(),
            FeedJob::General => vec![SearchQuery::new(SearchOrder::Date, s.max_results)
                .with_query(&s.search_query)
                .with_region(&s.region_code)
                .published_after(now - chrono::Duration::days(s.general_lookback_days))],
        }
    }

    /// Run every query and ingest the results
    ///
    /// Fails only when every query failed; partial search failures are logged.
    pub async fn run_once(&self) -> Result<IngestReport> {
        let queries = self.queries();
        if queries.is_empty() {
            debug!(job = %self.feed, "No queries configured");
            return Ok(IngestReport::default());
        }

        let mut items = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0;
        for query in &queries {
            match self.ctx.source.search(query).await {
                Ok(found) => {
                    succeeded += 1;
                    items.extend(found);
                }
                Err(e) => {
                    warn!(
                        job = %self.feed,
                        channel_id = query.channel_id.as_deref().unwrap_or(""),
                        error = %e,
                        "Search failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let report = self.ingest_items(items).await;
        info!(
            job = %self.feed,
            fetched = report.fetched,
            inserted = report.reconcile.inserted_count,
            updated = report.reconcile.updated_count,
            failed = report.fetch_failed + report.format_failed + report.reconcile.failed_count,
            "Search ingestion finished"
        );
        Ok(report)
    }

    /// Fetch details, format and reconcile search items chunk by chunk
    pub async fn ingest_items(&self, items: Vec<Value>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut seen = HashSet::new();

        let mut pending = Vec::with_capacity(items.len());
        for item in items {
            let Some(id) = search_item_id(&item) else {
                report.format_failed += 1;
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            if self.feed == FeedJob::General && self.is_official_item(&item) {
                report.reconcile.skipped_count += 1;
                continue;
            }
            pending.push((id, item));
        }
        report.fetched = pending.len();

        let batch_size = self.ctx.settings.batch_size.max(1);
        for (index, chunk) in pending.chunks(batch_size).enumerate() {
            if index > 0 && !self.ctx.settings.batch_pause.is_zero() {
                tokio::time::sleep(self.ctx.settings.batch_pause).await;
            }

            let mut formatted = Vec::with_capacity(chunk.len());
            for (id, item) in chunk {
                let detail = match self.ctx.source.video_details(id).await {
                    Ok(Some(detail)) => detail,
                    Ok(None) => {
                        debug!(external_id = %id, "Video disappeared before detail fetch");
                        report.not_found += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(external_id = %id, job = %self.feed, error = %e, "Skipping video");
                        report.fetch_failed += 1;
                        continue;
                    }
                };

                match self.ctx.formatter.format(item, Some(&detail)) {
                    Ok(video) => formatted.push(video),
                    Err(e) => {
                        warn!(external_id = %id, error = %e, "Skipping malformed video");
                        report.format_failed += 1;
                    }
                }
            }

            let chunk_report = self.ctx.engine.reconcile(formatted, self.feed).await;
            report.reconcile.absorb(chunk_report);
        }

        report
    }

    fn is_official_item(&self, item: &Value) -> bool {
        item.get("snippet")
            .and_then(|s| s.get("channelId"))
            .and_then(Value::as_str)
            .is_some_and(|channel_id| self.ctx.formatter.is_official(channel_id))
    }
}

#[async_trait]
impl ScheduledJob for SearchIngestJob {
    fn name(&self) -> &str {
        self.feed.as_str()
    }

    async fn run(&self) -> Result<JobReport> {
        Ok(self.run_once().await?.into())
    }
}

/// Fetch a single video by id and reconcile it as a batch of one
pub async fn ingest_video_by_id(
    ctx: &JobContext,
    external_id: &str,
    feed: FeedJob,
) -> Result<ReconcileReport> {
    let detail = ctx
        .source
        .video_details(external_id)
        .await?
        .ok_or_else(|| {
            IngestionError::permanent("videos", format!("video {} not found", external_id))
        })?;

    let video = ctx.formatter.format(&detail, Some(&detail))?;
    Ok(ctx.engine.reconcile(vec![video], feed).await)
}

/// Periodic refresh of stale metrics
#[derive(Clone)]
pub struct MetricsRefreshJob {
    refresher: StaleMetricsRefresher,
    max_age: chrono::Duration,
    limit: usize,
}

impl MetricsRefreshJob {
    pub fn new(refresher: StaleMetricsRefresher, max_age: chrono::Duration, limit: usize) -> Self {
        Self {
            refresher,
            max_age,
            limit,
        }
    }
}

#[async_trait]
impl ScheduledJob for MetricsRefreshJob {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn run(&self) -> Result<JobReport> {
        Ok(self.refresher.run(self.max_age, self.limit).await?.into())
    }
}

fn search_item_id(item: &Value) -> Option<String> {
    let id = match item.get("id")? {
        Value::String(id) => id.as_str(),
        id => id.get("videoId")?.as_str()?,
    };
    (!id.is_empty()).then(|| id.to_string())
}
