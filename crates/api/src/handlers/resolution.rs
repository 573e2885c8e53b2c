//! Resolution preview.
//!
//! Runs the same budget scaler the generate worker uses, so the size
//! shown before submission is the size that will be generated.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use reelforge_core::error::CoreError;
use reelforge_core::generation::{GenerationMode, ModelId};
use reelforge_core::resolution::{
    parse_resolution, pixel_budget, scale_for_budget, validate_dimensions,
};
use reelforge_core::types::DbId;
use reelforge_db::repositories::ProjectRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters of `GET /resolution/preview`.
///
/// The base size comes from `width`/`height`, or else from the project's
/// resolution.
#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub project_id: Option<DbId>,
    pub frame_count: Option<u32>,
    pub model_id: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolutionPreview {
    pub model_id: &'static str,
    pub mode: &'static str,
    pub requested_width: u32,
    pub requested_height: u32,
    pub frame_count: u32,
    pub width: u32,
    pub height: u32,
    pub was_scaled: bool,
    /// Pixel budget (`width * height * frames`); absent for fixed-size models.
    pub pixel_budget: Option<u64>,
}

/// GET /api/v1/resolution/preview
pub async fn preview(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> AppResult<impl IntoResponse> {
    let model = match query.model_id.as_deref() {
        Some(value) => ModelId::parse(value)?,
        None => ModelId::Wan,
    };
    let mode = match query.mode.as_deref() {
        Some(value) => GenerationMode::parse(value)?,
        None => GenerationMode::TextToVideo,
    };

    let (requested_width, requested_height) = match (query.width, query.height, query.project_id)
    {
        (Some(w), Some(h), _) => {
            validate_dimensions(w, h)?;
            (w, h)
        }
        (None, None, Some(project_id)) => {
            let project = ProjectRepo::find_by_id(&state.pool, project_id)
                .await?
                .ok_or(AppError::Core(CoreError::NotFound {
                    entity: "Project",
                    id: project_id,
                }))?;
            parse_resolution(&project.resolution)?
        }
        _ => {
            return Err(AppError::BadRequest(
                "Give width and height, or a project_id".to_string(),
            ))
        }
    };
    let frame_count = query
        .frame_count
        .unwrap_or_else(|| model.default_frame_count());
    if frame_count == 0 {
        return Err(AppError::Core(CoreError::Validation(
            "frame_count must be positive".to_string(),
        )));
    }

    let scaled = scale_for_budget(requested_width, requested_height, frame_count, mode, model);
    Ok(Json(DataResponse {
        data: ResolutionPreview {
            model_id: model.as_str(),
            mode: mode.as_str(),
            requested_width,
            requested_height,
            frame_count,
            width: scaled.width,
            height: scaled.height,
            was_scaled: scaled.was_scaled,
            pixel_budget: pixel_budget(model, mode),
        },
    }))
}
