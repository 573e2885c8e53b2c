//! Handlers for the `/clips` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use reelforge_core::error::CoreError;
use reelforge_core::types::DbId;
use reelforge_db::models::status::ClipStatus;
use reelforge_db::repositories::ClipRepo;
use reelforge_pipeline::outputs;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/clips/{id}
pub async fn get_clip(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let clip = ClipRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Clip", id }))?;
    Ok(Json(DataResponse { data: clip }))
}

/// DELETE /api/v1/clips/{id}
///
/// A clip that a worker is currently producing cannot be deleted (409).
/// The row goes first; the video and thumbnail files are then removed
/// best-effort, so a missing file never fails the request.
pub async fn delete_clip(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let clip = ClipRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Clip", id }))?;
    if ClipStatus::from_id(clip.status_id) == Some(ClipStatus::Processing) {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Clip {id} is being generated"
        ))));
    }

    let Some(deleted) = ClipRepo::delete(&state.pool, id).await? else {
        return Err(AppError::Core(CoreError::NotFound { entity: "Clip", id }));
    };

    let root = &state.pipeline.output_dir;
    for stored in [deleted.output_path.as_deref(), deleted.thumbnail_path.as_deref()]
        .into_iter()
        .flatten()
    {
        outputs::remove_best_effort(&outputs::resolve(root, stored)).await;
    }

    tracing::info!(clip_id = id, project_id = deleted.project_id, "Clip deleted");
    Ok(StatusCode::NO_CONTENT)
}
