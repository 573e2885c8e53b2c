//! Handlers for reading and cancelling jobs.
//!
//! The job row is authoritative; the progress stream is only a
//! low-latency hint on top of it.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use reelforge_core::error::CoreError;
use reelforge_core::job_type::JobType;
use reelforge_core::types::DbId;
use reelforge_db::models::job::Job;
use reelforge_db::models::status::JobStatus;
use reelforge_db::repositories::{ClipRepo, JobLogRepo, JobRepo};
use reelforge_events::ProgressReporter;
use reelforge_worker::runner::CANCELLED_MESSAGE;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn find_job(pool: &sqlx::PgPool, job_id: DbId) -> AppResult<Job> {
    JobRepo::find_by_id(pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Polling fallback for clients without a progress stream.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/jobs/{id}/logs
///
/// Structured log entries in insertion order.
pub async fn list_job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    let logs = JobLogRepo::list_for_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse { data: logs }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// A pending job is cancelled outright and will never be claimed; its
/// terminal event is published here. A processing job is marked
/// cancelled and its worker stops at the next step boundary, publishing
/// the terminal event itself. Cancelling a finished job is a 409.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state.pool, job_id).await?;
    let Some(previous) = JobRepo::cancel(&state.pool, job_id).await? else {
        let status = find_job(&state.pool, job_id).await?.status();
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {job_id} is already {}",
            status.map_or("finished", JobStatus::as_str)
        ))));
    };

    // The status the update replaced decides who publishes the terminal event.
    if previous == JobStatus::Pending {
        if job.kind() == Some(JobType::Generate) {
            ClipRepo::fail_unfinished(&state.pool, &job.clip_ids).await?;
        }
        ProgressReporter::new(state.bus.clone(), job_id).error(CANCELLED_MESSAGE);
    }

    tracing::info!(
        job_id,
        job_type = %job.job_type,
        was = previous.as_str(),
        "Job cancelled",
    );

    let job = find_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}
