pub mod clips;
pub mod health;
pub mod jobs;
pub mod projects;
pub mod resolution;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /projects                        create (POST)
/// /projects/{id}                   get, delete
///
/// /clips/{id}                      delete (removes output files)
///
/// /jobs/generate                   enqueue a clip generation (POST)
/// /jobs/merge                      enqueue a merge (POST)
/// /jobs/upscale                    enqueue an upscale (POST)
/// /jobs/interpolate                enqueue a frame interpolation (POST)
/// /jobs/export                     enqueue the export pipeline (POST)
/// /jobs/long-video                 enqueue a long video (POST)
/// /jobs/{id}                       get (polling fallback)
/// /jobs/{id}/logs                  structured job log
/// /jobs/{id}/cancel                cancel (POST)
/// /jobs/{id}/progress              progress stream (SSE)
///
/// /resolution/preview              effective generation resolution
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/projects", projects::router())
        .nest("/clips", clips::router())
        .nest("/jobs", jobs::router())
        .nest("/resolution", resolution::router())
}
