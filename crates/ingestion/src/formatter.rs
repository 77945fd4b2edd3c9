//! Normalizes raw YouTube payloads into `FormattedVideo`
//!
//! Accepts a search item (`id.videoId`) or a detail item (`id` string) as the
//! primary payload, plus the optional detail item carrying `contentDetails`
//! and `statistics`. Only a missing id or snippet is fatal; every other gap
//! falls back to an empty value.

use crate::models::{FormattedVideo, Metrics, Thumbnails};
use crate::{IngestionError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

const ENDPOINT: &str = "format";

#[derive(Debug, Clone, Default)]
pub struct VideoRecordFormatter {
    official_channel_ids: HashSet<String>,
}

impl VideoRecordFormatter {
    pub fn new<I, S>(official_channel_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            official_channel_ids: official_channel_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_official(&self, channel_id: &str) -> bool {
        self.official_channel_ids.contains(channel_id)
    }

    /// Build a pre-merge record from a search item and its optional detail item
    pub fn format(&self, item: &Value, detail: Option<&Value>) -> Result<FormattedVideo> {
        let external_id = extract_video_id(item)
            .or_else(|| detail.and_then(extract_video_id))
            .ok_or_else(|| IngestionError::permanent(ENDPOINT, "payload has no video id"))?;

        let snippet = item
            .get("snippet")
            .or_else(|| detail.and_then(|d| d.get("snippet")))
            .filter(|s| s.is_object())
            .ok_or_else(|| {
                IngestionError::permanent(ENDPOINT, format!("video {} has no snippet", external_id))
            })?;

        let channel_id = extract_string(snippet, "channelId").unwrap_or_default();
        let published_at = extract_string(snippet, "publishedAt")
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default();

        let tags = detail
            .and_then(|d| d.get("snippet"))
            .and_then(extract_tags)
            .or_else(|| extract_tags(snippet))
            .unwrap_or_default();

        let duration_iso = detail
            .and_then(|d| d.get("contentDetails"))
            .and_then(|c| extract_string(c, "duration"))
            .unwrap_or_default();
        let parsed_duration = parse_iso8601_duration(&duration_iso);

        let metrics = detail.map(metrics_from_detail).unwrap_or_default();

        Ok(FormattedVideo {
            is_official_content: self.is_official(&channel_id),
            external_id,
            title: extract_string(snippet, "title").unwrap_or_default(),
            description: extract_string(snippet, "description").unwrap_or_default(),
            channel_name: extract_string(snippet, "channelTitle").unwrap_or_default(),
            channel_id,
            published_at,
            thumbnails: extract_thumbnails(snippet),
            tags,
            duration_iso,
            duration_seconds: parsed_duration.unwrap_or(0),
            duration_resolved: parsed_duration.is_some(),
            metrics,
        })
    }
}

/// Parse an ISO-8601 duration of the form `P[nD][T[nH][nM][nS]]` into seconds
///
/// ```
/// use fanbase_ingestion::parse_iso8601_duration;
///
/// assert_eq!(parse_iso8601_duration("PT1M33S"), Some(93));
/// assert_eq!(parse_iso8601_duration("P1DT2H"), Some(93_600));
/// assert_eq!(parse_iso8601_duration("garbage"), None);
/// ```
pub fn parse_iso8601_duration(raw: &str) -> Option<u64> {
    let rest = raw.trim().strip_prefix('P')?;

    let (date_part, time_part) = match rest.split_once('T') {
        Some((_, "")) => return None,
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };

    let (days, date_components) = sum_components(date_part, &[('D', 86_400)])?;
    let (clock, time_components) =
        sum_components(time_part, &[('H', 3_600), ('M', 60), ('S', 1)])?;

    if date_components + time_components == 0 {
        return None;
    }
    days.checked_add(clock)
}

/// Sum `<digits><unit>` groups, requiring units in the given order, each at most once
fn sum_components(part: &str, units: &[(char, u64)]) -> Option<(u64, usize)> {
    let mut total: u64 = 0;
    let mut count = 0;
    let mut next_unit = 0;
    let mut digits = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return None;
        }

        let offset = units[next_unit..].iter().position(|(unit, _)| *unit == c)?;
        let (_, multiplier) = units[next_unit + offset];
        let value: u64 = digits.parse().ok()?;
        total = total.checked_add(value.checked_mul(multiplier)?)?;

        next_unit += offset + 1;
        count += 1;
        digits.clear();
    }

    if !digits.is_empty() {
        return None;
    }
    Some((total, count))
}

fn extract_string(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(|s| s.to_string())
}

/// Statistics arrive as numeric strings; plain numbers are accepted too
fn extract_count(value: &Value, key: &str) -> u64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn extract_video_id(item: &Value) -> Option<String> {
    let id = item.get("id")?;
    let video_id = match id {
        Value::String(s) => s.clone(),
        Value::Object(_) => extract_string(id, "videoId")?,
        _ => return None,
    };
    (!video_id.is_empty()).then_some(video_id)
}

fn extract_tags(snippet: &Value) -> Option<Vec<String>> {
    let tags = snippet.get("tags")?.as_array()?;
    Some(
        tags.iter()
            .filter_map(|t| t.as_str().map(|s| s.to_string()))
            .collect(),
    )
}

fn extract_thumbnails(snippet: &Value) -> Thumbnails {
    let tier = |name: &str| {
        snippet
            .get("thumbnails")
            .and_then(|t| t.get(name))
            .and_then(|t| extract_string(t, "url"))
            .unwrap_or_default()
    };

    Thumbnails {
        default: tier("default"),
        medium: tier("medium"),
        high: tier("high"),
        standard: tier("standard"),
        maxres: tier("maxres"),
    }
}

/// Metrics from a detail item's `statistics`, zeroed when absent
pub fn metrics_from_detail(detail: &Value) -> Metrics {
    detail
        .get("statistics")
        .map(extract_metrics)
        .unwrap_or_default()
}

fn extract_metrics(statistics: &Value) -> Metrics {
    Metrics {
        views: extract_count(statistics, "viewCount"),
        likes: extract_count(statistics, "likeCount"),
        dislikes: extract_count(statistics, "dislikeCount"),
        comment_count: extract_count(statistics, "commentCount"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn formatter() -> VideoRecordFormatter {
        VideoRecordFormatter::new(["UC_OFFICIAL"])
    }

    fn search_item() -> Value {
        json!({
            "id": { "kind": "youtube#video", "videoId": "abc123" },
            "snippet": {
                "publishedAt": "2024-03-01T10:00:00Z",
                "channelId": "UC_OFFICIAL",
                "channelTitle": "Official Channel",
                "title": "New Single",
                "description": "Out now",
                "thumbnails": {
                    "default": { "url": "https://i.ytimg.com/vi/abc123/default.jpg" },
                    "high": { "url": "https://i.ytimg.com/vi/abc123/hqdefault.jpg" }
                }
            }
        })
    }

    fn detail_item() -> Value {
        json!({
            "id": "abc123",
            "snippet": {
                "channelId": "UC_OFFICIAL",
                "title": "New Single",
                "tags": ["afrobeats", "live"]
            },
            "contentDetails": { "duration": "PT3M5S" },
            "statistics": {
                "viewCount": "1500",
                "likeCount": "120",
                "commentCount": 14
            }
        })
    }

    #[test]
    fn test_format_search_and_detail() {
        let video = formatter()
            .format(&search_item(), Some(&detail_item()))
            .unwrap();

        assert_eq!(video.external_id, "abc123");
        assert_eq!(video.title, "New Single");
        assert_eq!(video.channel_name, "Official Channel");
        assert!(video.is_official_content);
        assert_eq!(video.duration_seconds, 185);
        assert!(video.duration_resolved);
        assert_eq!(video.tags, vec!["afrobeats", "live"]);
        assert_eq!(video.metrics.views, 1500);
        assert_eq!(video.metrics.likes, 120);
        assert_eq!(video.metrics.comment_count, 14);
        assert_eq!(video.metrics.dislikes, 0);
        assert_eq!(
            video.thumbnails.high,
            "https://i.ytimg.com/vi/abc123/hqdefault.jpg"
        );
        assert_eq!(video.thumbnails.maxres, "");
        assert_eq!(video.published_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_format_tolerates_missing_detail() {
        let video = formatter().format(&search_item(), None).unwrap();

        assert_eq!(video.metrics, Metrics::default());
        assert_eq!(video.duration_seconds, 0);
        assert!(!video.duration_resolved);
        assert!(video.tags.is_empty());
    }

    #[test]
    fn test_format_detail_shape_alone() {
        let detail = detail_item();
        let video = formatter().format(&detail, Some(&detail)).unwrap();
        assert_eq!(video.external_id, "abc123");
        assert_eq!(video.published_at, DateTime::<Utc>::default());
    }

    #[test]
    fn test_non_allow_listed_channel_is_not_official() {
        let mut item = search_item();
        item["snippet"]["channelId"] = json!("UC_FAN");
        let video = formatter().format(&item, None).unwrap();
        assert!(!video.is_official_content);
    }

    #[test]
    fn test_missing_id_is_permanent() {
        let item = json!({ "snippet": { "title": "x" } });
        let err = formatter().format(&item, None).unwrap_err();
        assert!(matches!(err, IngestionError::Permanent { .. }));
    }

    #[test]
    fn test_missing_snippet_is_permanent() {
        let item = json!({ "id": { "videoId": "abc" } });
        let err = formatter().format(&item, None).unwrap_err();
        assert!(matches!(err, IngestionError::Permanent { .. }));
    }

    #[test]
    fn test_garbage_duration_flags_unresolved() {
        let mut detail = detail_item();
        detail["contentDetails"]["duration"] = json!("garbage");
        let video = formatter().format(&search_item(), Some(&detail)).unwrap();
        assert_eq!(video.duration_seconds, 0);
        assert!(!video.duration_resolved);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_iso8601_duration("PT1M33S"), Some(93));
        assert_eq!(parse_iso8601_duration("PT2H"), Some(7_200));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3_723));
        assert_eq!(parse_iso8601_duration("P1D"), Some(86_400));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
    }

    #[test]
    fn test_parse_duration_rejects_malformed() {
        for raw in ["", "garbage", "P", "PT", "PT1M33", "PTM", "PT3S1M", "PT1H1H", "1M33S", "PT1X"] {
            assert_eq!(parse_iso8601_duration(raw), None, "{:?}", raw);
        }
    }
}
