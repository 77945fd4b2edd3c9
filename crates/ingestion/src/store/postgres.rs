//! PostgreSQL `VideoStore`
//!
//! Videos live in `youtube_videos`, snapshots in
//! `youtube_video_metric_history`. Each write runs in its own transaction;
//! the `ON CONFLICT` row lock serializes concurrent writers for the same id.

use super::{
    BulkWriteReport, VideoFilter, VideoSort, VideoStore, VideoUpsert, VideoWrite, WriteOutcome,
};
use crate::models::{
    CategoryLabel, FormattedVideo, HistoryCap, MetricSnapshot, Metrics, Thumbnails, VideoRecord,
};
use crate::{scorer, IngestionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

const VIDEO_COLUMNS: &str = "external_id, title, description, channel_name, channel_id, \
     published_at, thumbnails, tags, duration_iso, duration_seconds, duration_resolved, \
     views, likes, dislikes, comment_count, engagement_score, category_labels, \
     is_official_content, last_synced_at, last_refresh_attempt_at, created_at";

#[derive(Clone)]
pub struct PostgresVideoStore {
    pool: PgPool,
    history_cap: HistoryCap,
}

impl PostgresVideoStore {
    pub fn new(pool: PgPool, history_cap: HistoryCap) -> Self {
        Self { pool, history_cap }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IngestionError::DatabaseError(format!("Migration failed: {}", e)))
    }

    async fn apply(&self, write: VideoWrite) -> Result<WriteOutcome> {
        let mut tx = self.pool.begin().await?;

        let outcome = match write {
            VideoWrite::Upsert(upsert) => {
                let metrics = upsert.video.metrics;
                let synced_at = upsert.synced_at;
                let external_id = upsert.video.external_id.clone();
                let inserted = upsert_video(&mut tx, upsert).await?;
                append_snapshot(&mut tx, &external_id, &metrics, synced_at, self.history_cap)
                    .await?;
                if inserted {
                    WriteOutcome::Inserted
                } else {
                    WriteOutcome::Updated
                }
            }
            VideoWrite::RefreshMetrics {
                external_id,
                metrics,
                synced_at,
            } => {
                let result = sqlx::query(
                    r#"
                    UPDATE youtube_videos
                    SET views = $2, likes = $3, dislikes = $4, comment_count = $5,
                        engagement_score = $6, last_synced_at = $7
                    WHERE external_id = $1
                    "#,
                )
                .bind(&external_id)
                .bind(to_db(metrics.views))
                .bind(to_db(metrics.likes))
                .bind(to_db(metrics.dislikes))
                .bind(to_db(metrics.comment_count))
                .bind(scorer::score(&metrics))
                .bind(synced_at)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    WriteOutcome::Missing
                } else {
                    append_snapshot(&mut tx, &external_id, &metrics, synced_at, self.history_cap)
                        .await?;
                    WriteOutcome::Updated
                }
            }
            VideoWrite::MarkRefreshAttempt {
                external_id,
                attempted_at,
            } => {
                let result = sqlx::query(
                    "UPDATE youtube_videos SET last_refresh_attempt_at = $2 WHERE external_id = $1",
                )
                .bind(&external_id)
                .bind(attempted_at)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    WriteOutcome::Missing
                } else {
                    WriteOutcome::Updated
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn load_history(&self, ids: &[String]) -> Result<HashMap<String, Vec<MetricSnapshot>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT external_id, views, likes, dislikes, comment_count, recorded_at
            FROM youtube_video_metric_history
            WHERE external_id = ANY($1)
            ORDER BY external_id, id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut history: HashMap<String, Vec<MetricSnapshot>> = HashMap::new();
        for row in rows {
            let external_id: String = row.try_get("external_id")?;
            history.entry(external_id).or_default().push(MetricSnapshot {
                metrics: metrics_from_row(&row)?,
                recorded_at: row.try_get("recorded_at")?,
            });
        }
        Ok(history)
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<VideoRecord>> {
        let ids: Vec<String> = rows
            .iter()
            .map(|row| row.try_get("external_id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut history = self.load_history(&ids).await?;

        rows.iter()
            .map(|row| {
                let external_id: String = row.try_get("external_id")?;
                let snapshots = history.remove(&external_id).unwrap_or_default();
                record_from_row(row, snapshots)
            })
            .collect()
    }
}

#[async_trait]
impl VideoStore for PostgresVideoStore {
    async fn find_one(&self, external_id: &str) -> Result<Option<VideoRecord>> {
        let records = self.find(&VideoFilter::new().ids([external_id])).await?;
        Ok(records.into_iter().next())
    }

    async fn find(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        qb.push(VIDEO_COLUMNS);
        qb.push(" FROM youtube_videos WHERE TRUE");
        push_predicates(&mut qb, filter);

        qb.push(" ORDER BY ");
        qb.push(match filter.sort {
            VideoSort::PublishedAtDesc => "published_at DESC, external_id ASC",
            VideoSort::EngagementDesc => "engagement_score DESC, external_id ASC",
            VideoSort::RefreshDueAsc => {
                "GREATEST(last_synced_at, last_refresh_attempt_at) ASC, external_id ASC"
            }
        });
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        qb.push(" OFFSET ").push_bind(filter.offset as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn count(&self, filter: &VideoFilter) -> Result<usize> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM youtube_videos WHERE TRUE");
        push_predicates(&mut qb, filter);

        let row = qb.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as usize)
    }

    async fn bulk_upsert(&self, writes: Vec<VideoWrite>) -> BulkWriteReport {
        let mut report = BulkWriteReport::default();

        for write in writes {
            let external_id = write.external_id().to_string();
            let outcome = match self.apply(write).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(external_id = %external_id, error = %e, "Video write failed");
                    WriteOutcome::Failed(IngestionError::persistence(&external_id, e.to_string()))
                }
            };
            debug!(external_id = %external_id, outcome = ?outcome, "Applied write");
            report.push(external_id, outcome);
        }

        report
    }

    async fn remove_label(&self, external_id: &str, label: CategoryLabel) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE youtube_videos
            SET category_labels = array_remove(category_labels, $2)
            WHERE external_id = $1 AND $2 = ANY(category_labels)
            "#,
        )
        .bind(external_id)
        .bind(label.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Insert or merge one video. Returns true when the row was newly inserted.
async fn upsert_video(tx: &mut Transaction<'_, Postgres>, upsert: VideoUpsert) -> Result<bool> {
    let VideoUpsert {
        video,
        labels,
        synced_at,
    } = upsert;
    let labels: Vec<&str> = labels.iter().map(CategoryLabel::as_str).collect();

    let row = sqlx::query(
        r#"
        INSERT INTO youtube_videos (
            external_id, title, description, channel_name, channel_id, published_at,
            thumbnails, tags, duration_iso, duration_seconds, duration_resolved,
            views, likes, dislikes, comment_count, engagement_score, category_labels,
            is_official_content, last_synced_at, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $19)
        ON CONFLICT (external_id) DO UPDATE SET
            title = EXCLUDED.title,
            description = EXCLUDED.description,
            channel_name = EXCLUDED.channel_name,
            channel_id = EXCLUDED.channel_id,
            published_at = EXCLUDED.published_at,
            thumbnails = EXCLUDED.thumbnails,
            tags = EXCLUDED.tags,
            duration_iso = EXCLUDED.duration_iso,
            duration_seconds = EXCLUDED.duration_seconds,
            duration_resolved = EXCLUDED.duration_resolved,
            views = EXCLUDED.views,
            likes = EXCLUDED.likes,
            dislikes = EXCLUDED.dislikes,
            comment_count = EXCLUDED.comment_count,
            engagement_score = EXCLUDED.engagement_score,
            category_labels = ARRAY(
                SELECT DISTINCT unnest(youtube_videos.category_labels || EXCLUDED.category_labels)
                ORDER BY 1
            ),
            is_official_content = EXCLUDED.is_official_content,
            last_synced_at = EXCLUDED.last_synced_at
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(&video.external_id)
    .bind(&video.title)
    .bind(&video.description)
    .bind(&video.channel_name)
    .bind(&video.channel_id)
    .bind(video.published_at)
    .bind(Json(&video.thumbnails))
    .bind(&video.tags)
    .bind(&video.duration_iso)
    .bind(to_db(video.duration_seconds))
    .bind(video.duration_resolved)
    .bind(to_db(video.metrics.views))
    .bind(to_db(video.metrics.likes))
    .bind(to_db(video.metrics.dislikes))
    .bind(to_db(video.metrics.comment_count))
    .bind(scorer::score(&video.metrics))
    .bind(&labels)
    .bind(video.is_official_content)
    .bind(synced_at)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.try_get("inserted")?)
}

/// Append a snapshot unless it equals the latest one, then prune to the cap
async fn append_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    external_id: &str,
    metrics: &Metrics,
    recorded_at: DateTime<Utc>,
    cap: HistoryCap,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO youtube_video_metric_history
            (external_id, views, likes, dislikes, comment_count, recorded_at)
        SELECT $1, $2, $3, $4, $5, $6
        WHERE NOT EXISTS (
            SELECT 1 FROM (
                SELECT views, likes, dislikes, comment_count
                FROM youtube_video_metric_history
                WHERE external_id = $1
                ORDER BY id DESC
                LIMIT 1
            ) latest
            WHERE latest.views = $2 AND latest.likes = $3
              AND latest.dislikes = $4 AND latest.comment_count = $5
        )
        "#,
    )
    .bind(external_id)
    .bind(to_db(metrics.views))
    .bind(to_db(metrics.likes))
    .bind(to_db(metrics.dislikes))
    .bind(to_db(metrics.comment_count))
    .bind(recorded_at)
    .execute(&mut **tx)
    .await?;

    if let Some(cap) = cap {
        sqlx::query(
            r#"
            DELETE FROM youtube_video_metric_history
            WHERE external_id = $1
              AND id NOT IN (
                  SELECT id FROM youtube_video_metric_history
                  WHERE external_id = $1
                  ORDER BY id DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(external_id)
        .bind(cap.max(1) as i64)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn push_predicates(qb: &mut QueryBuilder<'_, Postgres>, filter: &VideoFilter) {
    if let Some(ids) = &filter.ids {
        qb.push(" AND external_id = ANY(")
            .push_bind(ids.clone())
            .push(")");
    }
    if let Some(label) = filter.label {
        qb.push(" AND ")
            .push_bind(label.as_str())
            .push(" = ANY(category_labels)");
    }
    if let Some(cutoff) = filter.refresh_due_before {
        // GREATEST skips NULLs, so records never attempted fall back to last_synced_at
        qb.push(" AND GREATEST(last_synced_at, last_refresh_attempt_at) < ")
            .push_bind(cutoff);
    }
    if let Some(text) = &filter.text {
        let pattern = format!("%{}%", escape_like(text));
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR channel_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM unnest(tags) AS tag WHERE tag ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Counts above `i64::MAX` saturate
fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    value.max(0) as u64
}

fn metrics_from_row(row: &PgRow) -> Result<Metrics> {
    Ok(Metrics {
        views: from_db(row.try_get("views")?),
        likes: from_db(row.try_get("likes")?),
        dislikes: from_db(row.try_get("dislikes")?),
        comment_count: from_db(row.try_get("comment_count")?),
    })
}

fn record_from_row(row: &PgRow, history: Vec<MetricSnapshot>) -> Result<VideoRecord> {
    let external_id: String = row.try_get("external_id")?;
    let raw_labels: Vec<String> = row.try_get("category_labels")?;
    let labels: BTreeSet<CategoryLabel> = raw_labels
        .iter()
        .filter_map(|raw| match raw.parse() {
            Ok(label) => Some(label),
            Err(e) => {
                warn!(external_id = %external_id, error = %e, "Ignoring stored label");
                None
            }
        })
        .collect();
    let Json(thumbnails): Json<Thumbnails> = row.try_get("thumbnails")?;

    let video = FormattedVideo {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        channel_name: row.try_get("channel_name")?,
        channel_id: row.try_get("channel_id")?,
        published_at: row.try_get("published_at")?,
        thumbnails,
        tags: row.try_get("tags")?,
        duration_iso: row.try_get("duration_iso")?,
        duration_seconds: from_db(row.try_get("duration_seconds")?),
        duration_resolved: row.try_get("duration_resolved")?,
        metrics: metrics_from_row(row)?,
        is_official_content: row.try_get("is_official_content")?,
        external_id,
    };

    let mut record = VideoRecord::from_stored(
        video,
        labels,
        row.try_get("last_synced_at")?,
        row.try_get("created_at")?,
        history,
    );
    record.last_refresh_attempt_at = row.try_get("last_refresh_attempt_at")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_real\\"), "100\\%\\_real\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_db_conversions_saturate() {
        assert_eq!(to_db(u64::MAX), i64::MAX);
        assert_eq!(to_db(42), 42);
        assert_eq!(from_db(-5), 0);
    }
}
