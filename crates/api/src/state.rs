use std::sync::Arc;

use reelforge_comfyui::InferenceService;
use reelforge_events::ProgressBus;
use reelforge_pipeline::PipelineConfig;
use reelforge_worker::JobNotifier;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: reelforge_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Output locations and defaults shared with the workers.
    pub pipeline: Arc<PipelineConfig>,
    /// Progress fan-out; the stream endpoint subscribes here.
    pub bus: Arc<ProgressBus>,
    /// Wakes the queue worker of a job type after an enqueue.
    pub notifier: JobNotifier,
    /// Probed before GPU jobs are accepted.
    pub inference: Arc<dyn InferenceService>,
}
