//! Ingestion Service - YouTube feed pipeline
//!
//! Port: 8085 (`FANBASE_HEALTH_PORT`)

use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::Context;
use fanbase_core::config::{load_dotenv, ConfigLoader, DatabaseConfig};
use fanbase_core::observability::{init_logging, LogConfig};
use fanbase_core::DatabasePool;
use fanbase_ingestion::jobs::{JobContext, MetricsRefreshJob, SearchIngestJob};
use fanbase_ingestion::youtube::{VideoSource, YouTubeApi};
use fanbase_ingestion::{
    FeedJob, IngestionConfig, JobTrigger, PostgresVideoStore, RateLimitedClient,
    ReconciliationEngine, Scheduler, SlidingWindowLimiter, StaleMetricsRefresher, VideoStore,
};
use std::sync::Arc;
use tracing::info;

struct AppState {
    scheduler: Arc<Scheduler>,
    pool: DatabasePool,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_logging(&LogConfig::from_env("ingestion-service")?)?;

    let config = IngestionConfig::from_env()?;
    config.validate()?;
    let db_config = DatabaseConfig::from_env()?;
    db_config.validate()?;

    let pool = DatabasePool::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PostgresVideoStore::new(
        pool.pool().clone(),
        config.history_cap(),
    ));
    store.migrate().await?;
    let store: Arc<dyn VideoStore> = store;

    let limiter = Arc::new(SlidingWindowLimiter::new(
        config.max_requests_per_window,
        config.rate_window(),
    ));
    let client = RateLimitedClient::new(config.client_config(), limiter)?;
    let source: Arc<dyn VideoSource> = Arc::new(YouTubeApi::new(client));

    let ctx = Arc::new(JobContext::new(
        Arc::clone(&source),
        ReconciliationEngine::new(Arc::clone(&store)),
        config.search_settings(),
    ));
    let refresher = StaleMetricsRefresher::new(
        store,
        source,
        config.batch_size,
        config.batch_pause(),
    );

    let mut scheduler = Scheduler::new();
    for (feed, expression) in [
        (FeedJob::Trending, &config.cron_trending),
        (FeedJob::Music, &config.cron_music),
        (FeedJob::General, &config.cron_general),
    ] {
        scheduler.add(
            Arc::new(SearchIngestJob::new(Arc::clone(&ctx), feed)),
            JobTrigger::cron(expression)?,
        )?;
    }
    scheduler.add(
        Arc::new(MetricsRefreshJob::new(
            refresher,
            config.stale_threshold(),
            config.stale_batch_limit,
        )),
        JobTrigger::cron(&config.cron_metrics)?,
    )?;

    let scheduler = Arc::new(scheduler);
    scheduler.start();

    info!(
        port = config.health_port,
        official_channels = config.official_channel_ids.len(),
        "Starting Ingestion Service"
    );

    let state = web::Data::new(AppState {
        scheduler: Arc::clone(&scheduler),
        pool,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
    })
    .bind(("0.0.0.0", config.health_port))?
    .run()
    .await?;

    scheduler.shutdown();
    info!("Ingestion Service stopped");
    Ok(())
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database_healthy = state.pool.is_healthy().await;
    let body = serde_json::json!({
        "status": if database_healthy { "healthy" } else { "degraded" },
        "service": "ingestion-service",
        "version": env!("CARGO_PKG_VERSION"),
        "database": {
            "healthy": database_healthy,
            "pool": state.pool.stats(),
        },
        "jobs": state.scheduler.statuses(),
    });

    if database_healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
