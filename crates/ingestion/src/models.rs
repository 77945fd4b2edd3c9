//! Video record model and its typed merge rules

use crate::scorer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Feed a video can appear in. A record may carry several at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryLabel {
    Trending,
    Music,
    General,
}

impl CategoryLabel {
    pub const ALL: [CategoryLabel; 3] = [Self::Trending, Self::Music, Self::General];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trending => "trending",
            Self::Music => "music",
            Self::General => "general",
        }
    }
}

impl fmt::Display for CategoryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trending" => Ok(Self::Trending),
            "music" => Ok(Self::Music),
            "general" => Ok(Self::General),
            other => Err(format!("unknown category label '{}'", other)),
        }
    }
}

/// Search job that produced a batch of videos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedJob {
    Trending,
    Music,
    General,
}

impl FeedJob {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trending => "trending",
            Self::Music => "music",
            Self::General => "general",
        }
    }

    /// Label every video from this job receives
    pub fn primary_label(&self) -> CategoryLabel {
        match self {
            Self::Trending => CategoryLabel::Trending,
            Self::Music => CategoryLabel::Music,
            Self::General => CategoryLabel::General,
        }
    }
}

impl fmt::Display for FeedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engagement counters reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub views: u64,
    pub likes: u64,
    pub dislikes: u64,
    pub comment_count: u64,
}

/// Metrics captured at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub metrics: Metrics,
    pub recorded_at: DateTime<Utc>,
}

/// Thumbnail URLs by resolution tier; missing tiers are empty strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnails {
    pub default: String,
    pub medium: String,
    pub high: String,
    pub standard: String,
    pub maxres: String,
}

/// Freshly fetched video, normalized but not yet merged into the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedVideo {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub channel_name: String,
    pub channel_id: String,
    pub published_at: DateTime<Utc>,
    pub thumbnails: Thumbnails,
    pub tags: Vec<String>,
    pub duration_iso: String,
    pub duration_seconds: u64,
    /// False when `duration_iso` could not be parsed
    pub duration_resolved: bool,
    pub metrics: Metrics,
    pub is_official_content: bool,
}

/// Bound on `metric_history` length; `None` keeps everything
pub type HistoryCap = Option<usize>;

/// Stored video document
///
/// `engagement_score` is private: it is recomputed from `metrics` by every
/// constructor and mutator and cannot be set any other way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub channel_name: String,
    pub channel_id: String,
    pub published_at: DateTime<Utc>,
    pub thumbnails: Thumbnails,
    pub tags: Vec<String>,
    pub duration_iso: String,
    pub duration_seconds: u64,
    pub duration_resolved: bool,
    metrics: Metrics,
    engagement_score: i64,
    pub category_labels: BTreeSet<CategoryLabel>,
    pub is_official_content: bool,
    pub last_synced_at: DateTime<Utc>,
    /// Last metrics refresh that did not produce new metrics
    pub last_refresh_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metric_history: Vec<MetricSnapshot>,
}

impl VideoRecord {
    /// First sighting of an id: labels as classified, one history entry
    pub fn insert_from(
        video: FormattedVideo,
        labels: BTreeSet<CategoryLabel>,
        synced_at: DateTime<Utc>,
    ) -> Self {
        let metrics = video.metrics;
        Self {
            external_id: video.external_id,
            title: video.title,
            description: video.description,
            channel_name: video.channel_name,
            channel_id: video.channel_id,
            published_at: video.published_at,
            thumbnails: video.thumbnails,
            tags: video.tags,
            duration_iso: video.duration_iso,
            duration_seconds: video.duration_seconds,
            duration_resolved: video.duration_resolved,
            metrics,
            engagement_score: scorer::score(&metrics),
            category_labels: labels,
            is_official_content: video.is_official_content,
            last_synced_at: synced_at,
            last_refresh_attempt_at: None,
            created_at: synced_at,
            metric_history: vec![MetricSnapshot {
                metrics,
                recorded_at: synced_at,
            }],
        }
    }

    /// Rebuild a record from persisted columns, recomputing the score
    pub fn from_stored(
        video: FormattedVideo,
        category_labels: BTreeSet<CategoryLabel>,
        last_synced_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        metric_history: Vec<MetricSnapshot>,
    ) -> Self {
        let mut record = Self::insert_from(video, category_labels, last_synced_at);
        record.created_at = created_at;
        record.metric_history = metric_history;
        record
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn engagement_score(&self) -> i64 {
        self.engagement_score
    }

    /// Merge a fresh fetch into an existing record
    ///
    /// - overwritten: title, description, channel, published_at, thumbnails,
    ///   tags, duration fields, metrics, official flag, last_synced_at
    /// - unioned: category_labels
    /// - appended: one metric snapshot (skipped when metrics are unchanged)
    /// - recomputed: engagement_score
    /// - kept: external_id, created_at
    pub fn merge_upsert(
        &mut self,
        video: FormattedVideo,
        labels: &BTreeSet<CategoryLabel>,
        synced_at: DateTime<Utc>,
        cap: HistoryCap,
    ) {
        self.title = video.title;
        self.description = video.description;
        self.channel_name = video.channel_name;
        self.channel_id = video.channel_id;
        self.published_at = video.published_at;
        self.thumbnails = video.thumbnails;
        self.tags = video.tags;
        self.duration_iso = video.duration_iso;
        self.duration_seconds = video.duration_seconds;
        self.duration_resolved = video.duration_resolved;
        self.is_official_content = video.is_official_content;
        self.category_labels.extend(labels.iter().copied());
        self.apply_metrics(video.metrics, synced_at, cap);
    }

    /// Metrics-only refresh; labels and descriptive fields are untouched
    pub fn refresh_metrics(&mut self, metrics: Metrics, synced_at: DateTime<Utc>, cap: HistoryCap) {
        self.apply_metrics(metrics, synced_at, cap);
    }

    /// Note a refresh that left metrics untouched (video gone or fetch failed)
    pub fn mark_refresh_attempt(&mut self, attempted_at: DateTime<Utc>) {
        self.last_refresh_attempt_at = Some(attempted_at);
    }

    /// Instant staleness is measured from: the later of the last sync and
    /// the last failed refresh attempt
    pub fn refresh_due_from(&self) -> DateTime<Utc> {
        self.last_refresh_attempt_at
            .map_or(self.last_synced_at, |attempt| attempt.max(self.last_synced_at))
    }

    /// Administrative label removal. Returns whether the label was present.
    pub fn remove_label(&mut self, label: CategoryLabel) -> bool {
        self.category_labels.remove(&label)
    }

    pub fn has_label(&self, label: CategoryLabel) -> bool {
        self.category_labels.contains(&label)
    }

    /// Case-insensitive match over title, description, tags and channel name.
    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.channel_name.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }

    fn apply_metrics(&mut self, metrics: Metrics, synced_at: DateTime<Utc>, cap: HistoryCap) {
        self.metrics = metrics;
        self.engagement_score = scorer::score(&metrics);
        self.last_synced_at = synced_at;

        let unchanged = self
            .metric_history
            .last()
            .is_some_and(|latest| latest.metrics == metrics);
        if !unchanged {
            self.metric_history.push(MetricSnapshot {
                metrics,
                recorded_at: synced_at,
            });
        }

        if let Some(cap) = cap {
            let excess = self.metric_history.len().saturating_sub(cap.max(1));
            if excess > 0 {
                self.metric_history.drain(..excess);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::video;
    use super::*;
    use chrono::Duration;

    fn labels(items: &[CategoryLabel]) -> BTreeSet<CategoryLabel> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_insert_sets_score_and_initial_history() {
        let now = Utc::now();
        let record = VideoRecord::insert_from(
            video("a", false, 100),
            labels(&[CategoryLabel::General]),
            now,
        );

        assert_eq!(record.engagement_score(), 50 + 20 + 6 - 1);
        assert_eq!(record.metric_history.len(), 1);
        assert_eq!(record.created_at, now);
        assert_eq!(record.last_synced_at, now);
    }

    #[test]
    fn test_failed_refresh_attempt_defers_staleness() {
        let synced = Utc::now() - Duration::hours(48);
        let mut record = VideoRecord::insert_from(
            video("a", false, 100),
            labels(&[CategoryLabel::General]),
            synced,
        );
        assert_eq!(record.refresh_due_from(), synced);

        let attempted = synced + Duration::hours(40);
        record.mark_refresh_attempt(attempted);
        assert_eq!(record.refresh_due_from(), attempted);
        assert_eq!(record.last_synced_at, synced);
        assert_eq!(record.metric_history.len(), 1);

        record.refresh_metrics(*record.metrics(), attempted + Duration::hours(1), None);
        assert_eq!(record.refresh_due_from(), attempted + Duration::hours(1));
    }

    #[test]
    fn test_merge_unions_labels_and_overwrites_scalars() {
        let t0 = Utc::now();
        let mut record =
            VideoRecord::insert_from(video("a", true, 100), labels(&[CategoryLabel::Music]), t0);

        let mut fresh = video("a", true, 500);
        fresh.title = "Renamed".to_string();
        let t1 = t0 + Duration::hours(1);
        record.merge_upsert(fresh, &labels(&[CategoryLabel::Trending]), t1, None);

        assert_eq!(record.title, "Renamed");
        assert_eq!(record.metrics().views, 500);
        assert_eq!(record.engagement_score(), 250 + 20 + 6 - 1);
        assert_eq!(
            record.category_labels,
            labels(&[CategoryLabel::Music, CategoryLabel::Trending])
        );
        assert_eq!(record.metric_history.len(), 2);
        assert_eq!(record.created_at, t0);
        assert_eq!(record.last_synced_at, t1);
    }

    #[test]
    fn test_unchanged_metrics_do_not_grow_history() {
        let t0 = Utc::now();
        let mut record =
            VideoRecord::insert_from(video("a", false, 100), labels(&[CategoryLabel::General]), t0);

        record.merge_upsert(
            video("a", false, 100),
            &labels(&[CategoryLabel::General]),
            t0 + Duration::minutes(5),
            None,
        );

        assert_eq!(record.metric_history.len(), 1);
    }

    #[test]
    fn test_history_cap_keeps_newest() {
        let t0 = Utc::now();
        let mut record =
            VideoRecord::insert_from(video("a", false, 1), labels(&[CategoryLabel::General]), t0);

        for views in 2..=6 {
            let metrics = Metrics {
                views,
                ..Metrics::default()
            };
            record.refresh_metrics(metrics, t0 + Duration::minutes(views as i64), Some(3));
        }

        assert_eq!(record.metric_history.len(), 3);
        let kept: Vec<u64> = record
            .metric_history
            .iter()
            .map(|s| s.metrics.views)
            .collect();
        assert_eq!(kept, vec![4, 5, 6]);
    }

    #[test]
    fn test_refresh_leaves_labels_alone() {
        let t0 = Utc::now();
        let mut record =
            VideoRecord::insert_from(video("a", true, 1), labels(&[CategoryLabel::Music]), t0);

        record.refresh_metrics(Metrics::default(), t0, None);
        assert_eq!(record.category_labels, labels(&[CategoryLabel::Music]));
    }

    #[test]
    fn test_text_match_covers_tags_and_channel() {
        let record = VideoRecord::insert_from(
            video("a", false, 1),
            labels(&[CategoryLabel::General]),
            Utc::now(),
        );

        assert!(record.matches_text("afrobeats"));
        assert!(record.matches_text("fan channel"));
        assert!(record.matches_text("live"));
        assert!(!record.matches_text("interview"));
    }

    #[test]
    fn test_label_round_trip_through_str() {
        for label in CategoryLabel::ALL {
            assert_eq!(label.as_str().parse::<CategoryLabel>().unwrap(), label);
        }
        assert!("videos".parse::<CategoryLabel>().is_err());
    }
}
