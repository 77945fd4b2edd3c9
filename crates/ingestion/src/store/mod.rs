//! Video persistence
//!
//! `VideoStore` is the only write path for video records. Every write goes
//! through the typed merge rules on `VideoRecord` (in memory) or their SQL
//! equivalent (Postgres), so the engagement score and label union are
//! enforced in one place per backend.

mod memory;
mod postgres;

pub use memory::InMemoryVideoStore;
pub use postgres::PostgresVideoStore;

use crate::models::{CategoryLabel, FormattedVideo, Metrics, VideoRecord};
use crate::{IngestionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Insert-or-merge of a freshly formatted video
#[derive(Debug, Clone)]
pub struct VideoUpsert {
    pub video: FormattedVideo,
    pub labels: BTreeSet<CategoryLabel>,
    pub synced_at: DateTime<Utc>,
}

/// One operation in a bulk write
#[derive(Debug, Clone)]
pub enum VideoWrite {
    /// Insert when unseen, merge otherwise
    Upsert(VideoUpsert),
    /// Metrics-only update; never inserts
    RefreshMetrics {
        external_id: String,
        metrics: Metrics,
        synced_at: DateTime<Utc>,
    },
    /// Record a refresh that yielded no metrics; never inserts
    MarkRefreshAttempt {
        external_id: String,
        attempted_at: DateTime<Utc>,
    },
}

impl VideoWrite {
    pub fn external_id(&self) -> &str {
        match self {
            Self::Upsert(upsert) => &upsert.video.external_id,
            Self::RefreshMetrics { external_id, .. }
            | Self::MarkRefreshAttempt { external_id, .. } => external_id,
        }
    }
}

/// Result of a single write within a bulk operation
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    /// Refresh write for an id the store does not hold
    Missing,
    Failed(IngestionError),
}

/// Per-write outcomes of `bulk_upsert`, in submission order
#[derive(Debug, Clone, Default)]
pub struct BulkWriteReport {
    pub outcomes: Vec<(String, WriteOutcome)>,
}

impl BulkWriteReport {
    pub fn push(&mut self, external_id: impl Into<String>, outcome: WriteOutcome) {
        self.outcomes.push((external_id.into(), outcome));
    }

    pub fn inserted(&self) -> usize {
        self.count(|o| matches!(o, WriteOutcome::Inserted))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, WriteOutcome::Updated))
    }

    pub fn missing(&self) -> usize {
        self.count(|o| matches!(o, WriteOutcome::Missing))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, WriteOutcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &IngestionError)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            WriteOutcome::Failed(err) => Some((id.as_str(), err)),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&WriteOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Result ordering for reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VideoSort {
    #[default]
    PublishedAtDesc,
    EngagementDesc,
    /// Longest overdue for a metrics refresh first
    RefreshDueAsc,
}

impl VideoSort {
    /// Ties fall back to `external_id` so paging is stable
    pub fn compare(&self, a: &VideoRecord, b: &VideoRecord) -> Ordering {
        let primary = match self {
            Self::PublishedAtDesc => b.published_at.cmp(&a.published_at),
            Self::EngagementDesc => b.engagement_score().cmp(&a.engagement_score()),
            Self::RefreshDueAsc => a.refresh_due_from().cmp(&b.refresh_due_from()),
        };
        primary.then_with(|| a.external_id.cmp(&b.external_id))
    }
}

/// Read filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoFilter {
    pub ids: Option<Vec<String>>,
    pub label: Option<CategoryLabel>,
    /// Matches records whose `refresh_due_from` is before the cutoff
    pub refresh_due_before: Option<DateTime<Utc>>,
    /// Case-insensitive substring over title, description, tags and channel name
    pub text: Option<String>,
    pub sort: VideoSort,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl VideoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn label(mut self, label: CategoryLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn refresh_due_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.refresh_due_before = Some(cutoff);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        self.text = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn sort(mut self, sort: VideoSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Whether `record` passes every predicate (ignores sort and paging)
    pub fn matches(&self, record: &VideoRecord) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &record.external_id) {
                return false;
            }
        }
        if let Some(label) = self.label {
            if !record.has_label(label) {
                return false;
            }
        }
        if let Some(cutoff) = self.refresh_due_before {
            if record.refresh_due_from() >= cutoff {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if !record.matches_text(&text.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Document store for video records
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn find_one(&self, external_id: &str) -> Result<Option<VideoRecord>>;

    async fn find(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>>;

    /// Number of records matching `filter`, ignoring paging
    async fn count(&self, filter: &VideoFilter) -> Result<usize>;

    /// Apply each write independently; one failure never rolls back another
    async fn bulk_upsert(&self, writes: Vec<VideoWrite>) -> BulkWriteReport;

    /// Administrative label removal. Returns whether the label was present.
    async fn remove_label(&self, external_id: &str, label: CategoryLabel) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::video;

    fn record(id: &str, views: u64, label: CategoryLabel) -> VideoRecord {
        VideoRecord::insert_from(video(id, false, views), BTreeSet::from([label]), Utc::now())
    }

    #[test]
    fn test_filter_matches() {
        let r = record("a", 10, CategoryLabel::Trending);

        assert!(VideoFilter::new().matches(&r));
        assert!(VideoFilter::new().label(CategoryLabel::Trending).matches(&r));
        assert!(!VideoFilter::new().label(CategoryLabel::Music).matches(&r));
        assert!(VideoFilter::new().ids(["a", "b"]).matches(&r));
        assert!(!VideoFilter::new().ids(["b"]).matches(&r));
        assert!(VideoFilter::new().text("AFROBEATS").matches(&r));
        assert!(!VideoFilter::new()
            .refresh_due_before(r.last_synced_at)
            .matches(&r));
    }

    #[test]
    fn test_blank_text_is_ignored() {
        assert_eq!(VideoFilter::new().text("   ").text, None);
    }

    #[test]
    fn test_engagement_sort_breaks_ties_by_id() {
        let a = record("a", 10, CategoryLabel::General);
        let b = record("b", 10, CategoryLabel::General);
        let c = record("c", 1_000, CategoryLabel::General);

        let mut records = vec![b.clone(), a.clone(), c.clone()];
        records.sort_by(|x, y| VideoSort::EngagementDesc.compare(x, y));
        let ids: Vec<_> = records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_report_counts() {
        let mut report = BulkWriteReport::default();
        report.push("a", WriteOutcome::Inserted);
        report.push("b", WriteOutcome::Updated);
        report.push("c", WriteOutcome::Failed(IngestionError::persistence("c", "boom")));
        report.push("d", WriteOutcome::Missing);

        assert_eq!(report.inserted(), 1);
        assert_eq!(report.updated(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.missing(), 1);
        assert_eq!(report.failures().next().map(|(id, _)| id), Some("c"));
    }
}
