//! Metrics refresh for records that have not been synced recently
//!
//! Only metrics, score, `last_synced_at` and history are touched. Labels
//! are left alone and unknown ids are never inserted. A video that could not
//! be refreshed gets its attempt recorded, which moves it behind the rest of
//! the stale queue until `max_age` passes again.

use crate::formatter::metrics_from_detail;
use crate::store::{VideoFilter, VideoSort, VideoStore, VideoWrite, WriteOutcome};
use crate::youtube::VideoSource;
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counts from one refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub selected: usize,
    pub refreshed: usize,
    /// Fetch failed after retries
    pub fetch_failed: usize,
    /// Platform no longer returns the video
    pub not_found: usize,
    pub persist_failed: usize,
}

#[derive(Clone)]
pub struct StaleMetricsRefresher {
    store: Arc<dyn VideoStore>,
    source: Arc<dyn VideoSource>,
    batch_size: usize,
    batch_pause: Duration,
}

impl StaleMetricsRefresher {
    pub fn new(
        store: Arc<dyn VideoStore>,
        source: Arc<dyn VideoSource>,
        batch_size: usize,
        batch_pause: Duration,
    ) -> Self {
        Self {
            store,
            source,
            batch_size: batch_size.max(1),
            batch_pause,
        }
    }

    /// Ids not synced or attempted within `max_age`, longest overdue first
    pub async fn select_stale(&self, max_age: chrono::Duration, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let cutoff = Utc::now() - max_age;
        let filter = VideoFilter::new()
            .refresh_due_before(cutoff)
            .sort(VideoSort::RefreshDueAsc)
            .page(0, limit);

        let stale = self.store.find(&filter).await?;
        Ok(stale.into_iter().map(|r| r.external_id).collect())
    }

    /// Re-fetch metrics for `ids` in chunks, one bulk write per chunk
    pub async fn refresh(&self, ids: Vec<String>) -> RefreshReport {
        let mut report = RefreshReport {
            selected: ids.len(),
            ..Default::default()
        };

        for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }

            let attempted_at = Utc::now();
            let mut writes = Vec::with_capacity(chunk.len());
            let mut unrefreshed = Vec::new();
            for external_id in chunk {
                match self.source.video_details(external_id).await {
                    Ok(Some(detail)) => writes.push(VideoWrite::RefreshMetrics {
                        external_id: external_id.clone(),
                        metrics: metrics_from_detail(&detail),
                        synced_at: Utc::now(),
                    }),
                    Ok(None) => {
                        debug!(external_id = %external_id, "Video no longer available");
                        report.not_found += 1;
                        unrefreshed.push(external_id.clone());
                    }
                    Err(e) => {
                        warn!(external_id = %external_id, error = %e, "Skipping metrics refresh");
                        report.fetch_failed += 1;
                        unrefreshed.push(external_id.clone());
                    }
                }
            }

            if !writes.is_empty() {
                let bulk = self.store.bulk_upsert(writes).await;
                for (external_id, outcome) in bulk.outcomes {
                    match outcome {
                        WriteOutcome::Updated | WriteOutcome::Inserted => report.refreshed += 1,
                        WriteOutcome::Missing => report.not_found += 1,
                        WriteOutcome::Failed(e) => {
                            warn!(
                                external_id = %external_id,
                                error = %e,
                                "Failed to store refreshed metrics"
                            );
                            report.persist_failed += 1;
                            unrefreshed.push(external_id);
                        }
                    }
                }
            }

            self.record_attempts(unrefreshed, attempted_at).await;
        }

        info!(
            selected = report.selected,
            refreshed = report.refreshed,
            fetch_failed = report.fetch_failed,
            not_found = report.not_found,
            persist_failed = report.persist_failed,
            "Metrics refresh finished"
        );
        report
    }

    async fn record_attempts(&self, ids: Vec<String>, attempted_at: chrono::DateTime<Utc>) {
        if ids.is_empty() {
            return;
        }

        let writes = ids
            .into_iter()
            .map(|external_id| VideoWrite::MarkRefreshAttempt {
                external_id,
                attempted_at,
            })
            .collect();
        let bulk = self.store.bulk_upsert(writes).await;
        for (external_id, e) in bulk.failures() {
            warn!(external_id = %external_id, error = %e, "Failed to record refresh attempt");
        }
    }

    /// Select stale records and refresh them
    pub async fn run(&self, max_age: chrono::Duration, limit: usize) -> Result<RefreshReport> {
        let ids = self.select_stale(max_age, limit).await?;
        if ids.is_empty() {
            debug!("No stale videos to refresh");
            return Ok(RefreshReport::default());
        }
        Ok(self.refresh(ids).await)
    }
}
