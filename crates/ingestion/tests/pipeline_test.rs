use fanbase_ingestion::{
    CategoryLabel, ClientConfig, FeedJob, InMemoryVideoStore, JobContext, RateLimitedClient,
    ReconciliationEngine, SearchIngestJob, SearchSettings, SlidingWindowLimiter,
    StaleMetricsRefresher, VideoSource, VideoStore, YouTubeApi,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OFFICIAL: &str = "UC_OFFICIAL";

fn search_item(id: &str, channel_id: &str) -> Value {
    json!({
        "id": { "kind": "youtube#video", "videoId": id },
        "snippet": {
            "channelId": channel_id,
            "channelTitle": "Channel",
            "title": format!("Search title {}", id),
            "description": "",
            "publishedAt": "2024-03-01T10:00:00Z"
        }
    })
}

fn detail_item(id: &str, channel_id: &str, views: u64) -> Value {
    json!({
        "id": id,
        "snippet": {
            "channelId": channel_id,
            "channelTitle": "Channel",
            "title": format!("Detail title {}", id),
            "description": "Official video",
            "publishedAt": "2024-03-01T10:00:00Z",
            "tags": ["live", "tour"],
            "thumbnails": { "high": { "url": format!("https://i.ytimg.com/vi/{}/hq.jpg", id) } }
        },
        "contentDetails": { "duration": "PT3M20S" },
        "statistics": {
            "viewCount": views.to_string(),
            "likeCount": "10",
            "commentCount": "5"
        }
    })
}

async fn mount_detail(server: &MockServer, id: &str, channel_id: &str, views: u64) {
    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", id))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "items": [detail_item(id, channel_id, views)] })),
        )
        .mount(server)
        .await;
}

fn source_for(server: &MockServer) -> Arc<dyn VideoSource> {
    let config = ClientConfig {
        base_url: server.uri(),
        api_key: "test-key".to_string(),
        request_timeout: Duration::from_secs(5),
        max_retries: 1,
        retry_delay_ms: 10,
    };
    let limiter = Arc::new(SlidingWindowLimiter::new(100, Duration::from_secs(1)));
    Arc::new(YouTubeApi::new(RateLimitedClient::new(config, limiter).unwrap()))
}

fn settings() -> SearchSettings {
    SearchSettings {
        search_query: "artist".to_string(),
        region_code: "NG".to_string(),
        max_results: 50,
        official_channel_ids: vec![OFFICIAL.to_string()],
        trending_lookback_days: 7,
        general_lookback_days: 30,
        batch_size: 2,
        batch_pause: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_trending_run_then_metrics_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("order", "viewCount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                search_item("off1", OFFICIAL),
                search_item("fan1", "UC_FAN"),
                search_item("fan1", "UC_FAN"),
                search_item("gone", "UC_FAN")
            ]
        })))
        .mount(&server)
        .await;
    mount_detail(&server, "off1", OFFICIAL, 1_000).await;
    mount_detail(&server, "fan1", "UC_FAN", 200).await;
    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", "gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryVideoStore::new(Some(10)));
    let source = source_for(&server);
    let ctx = Arc::new(JobContext::new(
        Arc::clone(&source),
        ReconciliationEngine::new(store.clone()),
        settings(),
    ));

    let report = SearchIngestJob::new(ctx, FeedJob::Trending)
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.not_found, 1);
    assert_eq!(report.reconcile.inserted_count, 2);

    let official = store.find_one("off1").await.unwrap().unwrap();
    assert!(official.is_official_content);
    assert_eq!(
        official.category_labels.iter().copied().collect::<Vec<_>>(),
        vec![CategoryLabel::Trending]
    );
    assert_eq!(official.title, "Detail title off1");
    assert_eq!(official.tags, vec!["live".to_string(), "tour".to_string()]);
    assert_eq!(official.duration_seconds, 200);
    // 500 + 20 + 15
    assert_eq!(official.engagement_score(), 535);

    let fan = store.find_one("fan1").await.unwrap().unwrap();
    assert!(fan.has_label(CategoryLabel::General));
    assert!(fan.has_label(CategoryLabel::Trending));

    server.reset().await;
    mount_detail(&server, "off1", OFFICIAL, 3_000).await;
    mount_detail(&server, "fan1", "UC_FAN", 200).await;

    let refresher = StaleMetricsRefresher::new(store.clone(), source, 10, Duration::ZERO);
    let refresh = refresher
        .refresh(vec!["off1".to_string(), "fan1".to_string()])
        .await;
    assert_eq!(refresh.refreshed, 2);

    let official = store.find_one("off1").await.unwrap().unwrap();
    assert_eq!(official.metrics().views, 3_000);
    assert_eq!(official.engagement_score(), 1_535);
    assert_eq!(official.metric_history.len(), 2);

    let fan = store.find_one("fan1").await.unwrap().unwrap();
    assert_eq!(fan.metric_history.len(), 1);
}

#[tokio::test]
async fn test_general_run_never_fetches_official_videos() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("order", "date"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [search_item("off1", OFFICIAL), search_item("fan1", "UC_FAN")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", "off1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    mount_detail(&server, "fan1", "UC_FAN", 50).await;

    let store = Arc::new(InMemoryVideoStore::new(None));
    let ctx = Arc::new(JobContext::new(
        source_for(&server),
        ReconciliationEngine::new(store.clone()),
        settings(),
    ));

    let report = SearchIngestJob::new(ctx, FeedJob::General)
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.reconcile.skipped_count, 1);
    assert_eq!(report.reconcile.inserted_count, 1);
    assert!(store.find_one("off1").await.unwrap().is_none());
    assert!(store
        .find_one("fan1")
        .await
        .unwrap()
        .unwrap()
        .has_label(CategoryLabel::General));
}

#[tokio::test]
async fn test_search_failure_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryVideoStore::new(None));
    let ctx = Arc::new(JobContext::new(
        source_for(&server),
        ReconciliationEngine::new(store.clone()),
        settings(),
    ));

    let result = SearchIngestJob::new(ctx, FeedJob::Trending).run_once().await;
    assert!(result.is_err());
    assert!(store.is_empty().await);
}
