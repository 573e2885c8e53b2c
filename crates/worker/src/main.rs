//! Headless worker: serves the job queues without the HTTP surface.
//!
//! Progress reaches clients through the persisted polling path, since the
//! in-process bus has no stream subscribers here.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelforge_comfyui::{ComfyUIService, InferenceService};
use reelforge_events::{ProgressBus, ProgressPersistence};
use reelforge_pipeline::{Pipeline, PipelineConfig, PipelineContext};
use reelforge_worker::{JobNotifier, WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "reelforge_worker=debug,reelforge_pipeline=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let pipeline_config = PipelineConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    tracing::info!(
        comfyui_url = %pipeline_config.comfyui_url,
        output_dir = %pipeline_config.output_dir.display(),
        queues = ?worker_config.job_types,
        "Loaded worker configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = reelforge_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    reelforge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    reelforge_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Inference service ---
    let inference = Arc::new(ComfyUIService::new(&pipeline_config.comfyui_url));
    if !inference.is_available().await {
        tracing::warn!(url = %pipeline_config.comfyui_url, "Inference service is not reachable yet");
    }

    // --- Progress ---
    let bus = Arc::new(ProgressBus::default());
    let persistence_handle = tokio::spawn(ProgressPersistence::run(pool.clone(), bus.subscribe()));

    // --- Worker pool ---
    let timeouts = pipeline_config.timeouts;
    let ctx = PipelineContext::new(pool.clone(), inference, bus.clone(), pipeline_config);
    let workers = WorkerPool::start(
        pool,
        bus.clone(),
        Arc::new(Pipeline::new(ctx)),
        timeouts,
        &JobNotifier::new(),
        &worker_config,
    )
    .await
    .expect("Failed to start worker pool");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl-C handler");
    tracing::info!("Received SIGINT, finishing in-flight jobs");

    if workers.shutdown_within(worker_config.shutdown_timeout).await {
        tracing::info!("Queue workers stopped");
    }
    persistence_handle.abort();
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    tracing::info!("Worker stopped");
}
