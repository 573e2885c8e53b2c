//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{enqueue, jobs, progress};
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /generate        -> enqueue::generate
/// POST   /merge           -> enqueue::merge
/// POST   /upscale         -> enqueue::upscale
/// POST   /interpolate     -> enqueue::interpolate
/// POST   /export          -> enqueue::export
/// POST   /long-video      -> enqueue::long_video
/// GET    /{id}            -> get_job
/// GET    /{id}/logs       -> list_job_logs
/// POST   /{id}/cancel     -> cancel_job
/// GET    /{id}/progress   -> progress::stream
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(enqueue::generate))
        .route("/merge", post(enqueue::merge))
        .route("/upscale", post(enqueue::upscale))
        .route("/interpolate", post(enqueue::interpolate))
        .route("/export", post(enqueue::export))
        .route("/long-video", post(enqueue::long_video))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/logs", get(jobs::list_job_logs))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/progress", get(progress::stream))
}
