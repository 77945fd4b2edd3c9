//! Read-only access to video records for the rest of the application

use crate::models::{CategoryLabel, VideoRecord};
use crate::store::{VideoFilter, VideoSort, VideoStore};
use crate::Result;
use fanbase_core::pagination::{PageRequest, PaginatedResponse};
use std::sync::Arc;

#[derive(Clone)]
pub struct VideoQueryService {
    store: Arc<dyn VideoStore>,
}

impl VideoQueryService {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self { store }
    }

    pub async fn by_id(&self, external_id: &str) -> Result<Option<VideoRecord>> {
        self.store.find_one(external_id).await
    }

    /// One feed, e.g. everything labelled `music`
    pub async fn by_label(
        &self,
        label: CategoryLabel,
        page: PageRequest,
        sort: VideoSort,
    ) -> Result<PaginatedResponse<VideoRecord>> {
        self.paginate(VideoFilter::new().label(label).sort(sort), page)
            .await
    }

    /// Case-insensitive match over title, description, tags and channel name
    pub async fn search(
        &self,
        text: &str,
        page: PageRequest,
        sort: VideoSort,
    ) -> Result<PaginatedResponse<VideoRecord>> {
        let filter = VideoFilter::new().text(text).sort(sort);
        if filter.text.is_none() {
            return Ok(PaginatedResponse::empty(page));
        }
        self.paginate(filter, page).await
    }

    async fn paginate(
        &self,
        filter: VideoFilter,
        page: PageRequest,
    ) -> Result<PaginatedResponse<VideoRecord>> {
        let page = PageRequest::new(page.offset, page.limit);
        let total = self.store.count(&filter).await?;
        let items = self.store.find(&filter.page(page.offset, page.limit)).await?;
        Ok(PaginatedResponse::new(items, total, page))
    }
}
