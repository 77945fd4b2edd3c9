//! Engagement scoring
//!
//! `round(views * 0.5 + likes * 2 + comment_count * 3 - dislikes)`
//!
//! The score is the only ranking signal derived from metrics. It is never
//! clamped, so heavily disliked videos go negative.

use crate::models::Metrics;

/// Weighted engagement score for a set of metrics
///
/// Evaluated on doubled weights in `i128` so the half-view term stays exact;
/// halves round toward positive infinity.
pub fn score(metrics: &Metrics) -> i64 {
    let doubled = i128::from(metrics.views)
        + 4 * i128::from(metrics.likes)
        + 6 * i128::from(metrics.comment_count)
        - 2 * i128::from(metrics.dislikes);

    let rounded = (doubled + 1).div_euclid(2);
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Stateless scorer handle for callers that prefer a value over a free function
#[derive(Debug, Clone, Copy, Default)]
pub struct EngagementScorer;

impl EngagementScorer {
    pub fn score(&self, metrics: &Metrics) -> i64 {
        score(metrics)
    }
}
