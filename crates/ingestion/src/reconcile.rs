//! Batch reconciliation of fetched videos into the store

use crate::classifier::CategoryClassifier;
use crate::models::{FeedJob, FormattedVideo};
use crate::store::{VideoStore, VideoUpsert, VideoWrite, WriteOutcome};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub inserted_count: usize,
    pub updated_count: usize,
    pub failed_count: usize,
    /// Items the job was not allowed to merge
    pub skipped_count: usize,
}

impl ReconcileReport {
    pub fn succeeded(&self) -> usize {
        self.inserted_count + self.updated_count
    }

    pub fn absorb(&mut self, other: ReconcileReport) {
        self.inserted_count += other.inserted_count;
        self.updated_count += other.updated_count;
        self.failed_count += other.failed_count;
        self.skipped_count += other.skipped_count;
    }
}

/// Merges formatted batches into the store using the classifier's labels
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn VideoStore>,
    classifier: CategoryClassifier,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self {
            store,
            classifier: CategoryClassifier::new(),
        }
    }

    /// Insert unseen videos and merge known ones as a single bulk write
    ///
    /// Per-record failures are logged and counted; they never abort the
    /// rest of the batch.
    pub async fn reconcile(&self, batch: Vec<FormattedVideo>, job: FeedJob) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if batch.is_empty() {
            return report;
        }

        let synced_at = Utc::now();
        let mut writes = Vec::with_capacity(batch.len());
        for video in batch {
            if !self.classifier.admits(video.is_official_content, job) {
                debug!(
                    external_id = %video.external_id,
                    job = %job,
                    "Skipping official video in general feed"
                );
                report.skipped_count += 1;
                continue;
            }

            let labels = self.classifier.classify(video.is_official_content, job);
            writes.push(VideoWrite::Upsert(VideoUpsert {
                video,
                labels,
                synced_at,
            }));
        }

        if writes.is_empty() {
            return report;
        }

        let bulk = self.store.bulk_upsert(writes).await;
        for (external_id, outcome) in &bulk.outcomes {
            match outcome {
                WriteOutcome::Inserted => report.inserted_count += 1,
                WriteOutcome::Updated => report.updated_count += 1,
                WriteOutcome::Missing => {}
                WriteOutcome::Failed(err) => {
                    warn!(external_id = %external_id, job = %job, error = %err, "Failed to persist video");
                    report.failed_count += 1;
                }
            }
        }

        info!(
            job = %job,
            inserted = report.inserted_count,
            updated = report.updated_count,
            failed = report.failed_count,
            skipped = report.skipped_count,
            "Reconciled batch"
        );
        report
    }
}
