//! Feed classification
//!
//! Label rules per source job:
//!
//! | job      | official            | non-official          |
//! |----------|---------------------|-----------------------|
//! | music    | music, trending     | music                 |
//! | trending | trending            | trending, general     |
//! | general  | excluded before merge | general             |
//!
//! Music releases leak into trending, non-official trending hits leak into
//! general, and the general feed never carries official uploads. The
//! directions are not symmetric and must stay that way.

use crate::models::{CategoryLabel, FeedJob};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryClassifier;

impl CategoryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Labels a video receives when seen by `job`
    pub fn classify(&self, is_official: bool, job: FeedJob) -> BTreeSet<CategoryLabel> {
        let mut labels = BTreeSet::from([job.primary_label()]);

        match job {
            FeedJob::Music if is_official => {
                labels.insert(CategoryLabel::Trending);
            }
            FeedJob::Trending if !is_official => {
                labels.insert(CategoryLabel::General);
            }
            _ => {}
        }

        labels
    }

    /// Whether `job` may merge this video at all
    pub fn admits(&self, is_official: bool, job: FeedJob) -> bool {
        !(job == FeedJob::General && is_official)
    }
}
