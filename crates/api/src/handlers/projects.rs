//! Handlers for the `/projects` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use reelforge_core::error::CoreError;
use reelforge_core::resolution::parse_resolution;
use reelforge_core::types::DbId;
use reelforge_db::models::project::CreateProject;
use reelforge_db::repositories::ProjectRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/projects
///
/// Returns 201 with the created project. The resolution must have the
/// form `WxH`.
pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProject>,
) -> AppResult<impl IntoResponse> {
    if input.name.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Project name must not be empty".to_string(),
        )));
    }
    parse_resolution(&input.resolution)?;
    if let Some(fps) = input.fps {
        if fps <= 0 {
            return Err(AppError::Core(CoreError::Validation(format!(
                "fps must be positive (got {fps})"
            ))));
        }
    }
    if let Some(multiplier) = input.upscale_multiplier {
        if !(multiplier >= 1.0) {
            return Err(AppError::Core(CoreError::Validation(format!(
                "upscale_multiplier must be at least 1.0 (got {multiplier})"
            ))));
        }
    }

    let project = ProjectRepo::create(&state.pool, &input).await?;
    tracing::info!(project_id = project.id, resolution = %project.resolution, "Project created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: project })))
}

/// GET /api/v1/projects/{id}
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let project = ProjectRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Project",
            id,
        }))?;
    Ok(Json(DataResponse { data: project }))
}

/// DELETE /api/v1/projects/{id}
///
/// Clips and jobs are removed with the project. Returns 204.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !ProjectRepo::delete(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Project",
            id,
        }));
    }
    tracing::info!(project_id = id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}
