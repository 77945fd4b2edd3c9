//! In-process `VideoStore`, used by tests and local runs without Postgres

use super::{BulkWriteReport, VideoFilter, VideoStore, VideoWrite, WriteOutcome};
use crate::models::{CategoryLabel, HistoryCap, VideoRecord};
use crate::{IngestionError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// `VideoStore` over a `HashMap` guarded by an async `RwLock`
///
/// Each write takes the lock on its own, so concurrent batches interleave
/// per record and converge under the merge rules.
#[derive(Debug, Default)]
pub struct InMemoryVideoStore {
    records: RwLock<HashMap<String, VideoRecord>>,
    history_cap: HistoryCap,
    rejected_ids: RwLock<HashSet<String>>,
}

impl InMemoryVideoStore {
    pub fn new(history_cap: HistoryCap) -> Self {
        Self {
            history_cap,
            ..Self::default()
        }
    }

    /// Make every subsequent write for these ids fail with a persistence error
    pub async fn reject_writes_for<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected_ids
            .write()
            .await
            .extend(ids.into_iter().map(Into::into));
    }

    /// Put a record in place as-is, bypassing merge rules
    pub async fn seed(&self, record: VideoRecord) {
        self.records
            .write()
            .await
            .insert(record.external_id.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn apply(&self, write: VideoWrite) -> WriteOutcome {
        let external_id = write.external_id().to_string();
        if self.rejected_ids.read().await.contains(&external_id) {
            return WriteOutcome::Failed(IngestionError::persistence(
                external_id,
                "write rejected by store",
            ));
        }

        let mut records = self.records.write().await;
        match write {
            VideoWrite::Upsert(upsert) => match records.get_mut(&external_id) {
                Some(existing) => {
                    existing.merge_upsert(
                        upsert.video,
                        &upsert.labels,
                        upsert.synced_at,
                        self.history_cap,
                    );
                    WriteOutcome::Updated
                }
                None => {
                    let record =
                        VideoRecord::insert_from(upsert.video, upsert.labels, upsert.synced_at);
                    records.insert(external_id, record);
                    WriteOutcome::Inserted
                }
            },
            VideoWrite::RefreshMetrics {
                metrics, synced_at, ..
            } => match records.get_mut(&external_id) {
                Some(existing) => {
                    existing.refresh_metrics(metrics, synced_at, self.history_cap);
                    WriteOutcome::Updated
                }
                None => WriteOutcome::Missing,
            },
            VideoWrite::MarkRefreshAttempt { attempted_at, .. } => {
                match records.get_mut(&external_id) {
                    Some(existing) => {
                        existing.mark_refresh_attempt(attempted_at);
                        WriteOutcome::Updated
                    }
                    None => WriteOutcome::Missing,
                }
            }
        }
    }
}

#[async_trait]
impl VideoStore for InMemoryVideoStore {
    async fn find_one(&self, external_id: &str) -> Result<Option<VideoRecord>> {
        Ok(self.records.read().await.get(external_id).cloned())
    }

    async fn find(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>> {
        let records = self.records.read().await;
        let mut matched: Vec<&VideoRecord> =
            records.values().filter(|r| filter.matches(r)).collect();
        matched.sort_by(|a, b| filter.sort.compare(a, b));

        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &VideoFilter) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| filter.matches(r)).count())
    }

    async fn bulk_upsert(&self, writes: Vec<VideoWrite>) -> BulkWriteReport {
        let mut report = BulkWriteReport::default();
        for write in writes {
            let external_id = write.external_id().to_string();
            let outcome = self.apply(write).await;
            debug!(external_id = %external_id, outcome = ?outcome, "Applied write");
            report.push(external_id, outcome);
        }
        report
    }

    async fn remove_label(&self, external_id: &str, label: CategoryLabel) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records
            .get_mut(external_id)
            .is_some_and(|record| record.remove_label(label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::video;
    use crate::models::Metrics;
    use crate::store::VideoUpsert;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn upsert(id: &str, label: CategoryLabel) -> VideoWrite {
        VideoWrite::Upsert(VideoUpsert {
            video: video(id, false, 100),
            labels: BTreeSet::from([label]),
            synced_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_insert_then_update() {
        let store = InMemoryVideoStore::new(None);

        let first = store
            .bulk_upsert(vec![upsert("a", CategoryLabel::Music)])
            .await;
        assert_eq!(first.inserted(), 1);

        let second = store
            .bulk_upsert(vec![upsert("a", CategoryLabel::Trending)])
            .await;
        assert_eq!(second.updated(), 1);

        let record = store.find_one("a").await.unwrap().unwrap();
        assert!(record.has_label(CategoryLabel::Music));
        assert!(record.has_label(CategoryLabel::Trending));
    }

    #[tokio::test]
    async fn test_refresh_never_inserts() {
        let store = InMemoryVideoStore::new(None);
        let report = store
            .bulk_upsert(vec![VideoWrite::RefreshMetrics {
                external_id: "ghost".to_string(),
                metrics: Metrics::default(),
                synced_at: Utc::now(),
            }])
            .await;

        assert_eq!(report.missing(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejected_ids_fail_alone() {
        let store = InMemoryVideoStore::new(None);
        store.reject_writes_for(["b"]).await;

        let report = store
            .bulk_upsert(vec![
                upsert("a", CategoryLabel::General),
                upsert("b", CategoryLabel::General),
                upsert("c", CategoryLabel::General),
            ])
            .await;

        assert_eq!(report.inserted(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_label() {
        let store = InMemoryVideoStore::new(None);
        store
            .bulk_upsert(vec![upsert("a", CategoryLabel::Music)])
            .await;

        assert!(store.remove_label("a", CategoryLabel::Music).await.unwrap());
        assert!(!store.remove_label("a", CategoryLabel::Music).await.unwrap());
        assert!(!store.remove_label("missing", CategoryLabel::Music).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_sorts_and_pages() {
        let store = InMemoryVideoStore::new(None);
        let now = Utc::now();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let record = VideoRecord::insert_from(
                video(id, false, 100),
                BTreeSet::from([CategoryLabel::General]),
                now - Duration::hours(i as i64),
            );
            store.seed(record).await;
        }

        let filter = VideoFilter::new()
            .sort(crate::store::VideoSort::RefreshDueAsc)
            .page(0, 2);
        let ids: Vec<String> = store
            .find(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.external_id)
            .collect();

        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(store.count(&filter).await.unwrap(), 3);
    }
}
