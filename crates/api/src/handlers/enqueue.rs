//! Enqueue endpoints, one per job type.
//!
//! Every payload is validated here with the same rules the workers apply,
//! so a bad request is rejected before any job row exists. Each endpoint
//! returns `{"jobId": ..}` immediately; the work happens on the job
//! type's queue worker.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use reelforge_core::error::CoreError;
use reelforge_core::generation::{
    GenerationMode, GenerationParams, ModelId, DEFAULT_ADAPTER_WEIGHT, MAX_STEPS,
};
use reelforge_core::job_type::JobType;
use reelforge_core::resolution::{parse_resolution, scale_for_budget, validate_dimensions};
use reelforge_core::segments::{plan_segment_count, segment_duration_secs};
use reelforge_core::types::DbId;
use reelforge_db::models::clip::{Clip, CreateClip};
use reelforge_db::models::job::SubmitJob;
use reelforge_db::models::project::Project;
use reelforge_db::models::status::ClipStatus;
use reelforge_db::repositories::{ClipRepo, JobRepo, ProjectRepo};
use reelforge_pipeline::settings::{
    self, ExportSettings, GenerateSettings, InterpolateSettings, LongVideoSettings,
    MergeSettings, UpscaleSettings,
};
use reelforge_pipeline::outputs;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, Enqueued};
use crate::state::AppState;

const DEFAULT_STEPS: u32 = 20;
const DEFAULT_CFG_SCALE: f64 = 7.0;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Body of `POST /jobs/generate`.
///
/// The prompt and sampler settings are stored on a new pending clip; the
/// job references that clip.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub project_id: DbId,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// `animatediff`, `svd` or `wan` (default `wan`).
    #[serde(default)]
    pub model_id: Option<String>,
    /// `text_to_video` (default) or `image_to_video`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Requested size; defaults to the project resolution.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub frame_count: Option<u32>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub cfg_scale: Option<f64>,
    /// Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Local image path, absolute or relative to the output directory.
    #[serde(default)]
    pub reference_image: Option<String>,
    #[serde(default)]
    pub adapter_weight: Option<f64>,
    #[serde(default)]
    pub denoise: Option<f64>,
}

/// Body shared by the clip-consuming endpoints and long video.
///
/// `settings` is the job-type-specific payload and is stored verbatim.
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    /// Defaults to the project of the first input clip.
    #[serde(default)]
    pub project_id: Option<DbId>,
    #[serde(default)]
    pub clip_ids: Vec<DbId>,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl JobRequest {
    /// The settings payload as stored on the job row.
    fn stored_settings(&self) -> serde_json::Value {
        if self.settings.is_null() {
            serde_json::json!({})
        } else {
            self.settings.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

fn validation(message: impl Into<String>) -> AppError {
    AppError::Core(CoreError::Validation(message.into()))
}

async fn find_project(state: &AppState, id: DbId) -> AppResult<Project> {
    ProjectRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Project",
            id,
        }))
}

/// Refuse GPU work up front when the inference service is down.
async fn ensure_inference(state: &AppState) -> AppResult<()> {
    if state.inference.is_available().await {
        Ok(())
    } else {
        Err(AppError::ServiceUnavailable(
            "Inference service is not reachable".to_string(),
        ))
    }
}

/// Reference images must exist before a job that uploads them is queued.
async fn ensure_reference_exists(state: &AppState, stored: &str) -> AppResult<()> {
    let local = outputs::resolve(&state.pipeline.output_dir, stored);
    outputs::verify_output(&local)
        .await
        .map(|_| ())
        .map_err(|_| validation(format!("Reference image {stored} was not found")))
}

/// Load the input clips in request order and check they are all finished.
async fn completed_clips(state: &AppState, ids: &[DbId]) -> AppResult<Vec<Clip>> {
    let clips = ClipRepo::list_by_ids(&state.pool, ids).await?;
    if clips.len() != ids.len() {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !clips.iter().any(|clip| clip.id == **id))
            .map(ToString::to_string)
            .collect();
        return Err(validation(format!("Clips not found: {}", missing.join(", "))));
    }
    if let Some(clip) = clips
        .iter()
        .find(|clip| ClipStatus::from_id(clip.status_id) != Some(ClipStatus::Completed))
    {
        return Err(validation(format!("Clip {} has not completed", clip.id)));
    }
    Ok(clips)
}

/// Insert the job row and wake its queue worker.
async fn submit(state: &AppState, input: SubmitJob) -> AppResult<DbId> {
    let job = JobRepo::submit(&state.pool, &input).await?;
    state.notifier.notify(input.job_type);
    tracing::info!(
        job_id = job.id,
        job_type = %input.job_type,
        project_id = ?job.project_id,
        clips = ?job.clip_ids,
        "Job enqueued",
    );
    Ok(job.id)
}

fn accepted(job_id: DbId, clip_id: Option<DbId>) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: Enqueued { job_id, clip_id },
        }),
    )
}

/// Validate a clip-consuming request and submit it.
///
/// `check` validates the typed settings against the number of input clips.
async fn enqueue_clip_job<T, F>(
    state: &AppState,
    job_type: JobType,
    request: JobRequest,
    check: F,
) -> AppResult<DbId>
where
    T: serde::de::DeserializeOwned,
    F: FnOnce(&T, usize) -> AppResult<()>,
{
    let parsed: T = settings::parse(&request.settings)?;
    check(&parsed, request.clip_ids.len())?;
    let clips = completed_clips(state, &request.clip_ids).await?;

    let project_id = match request.project_id {
        Some(id) => Some(find_project(state, id).await?.id),
        None => clips.first().map(|clip| clip.project_id),
    };

    submit(
        state,
        SubmitJob {
            project_id,
            job_type,
            settings: request.stored_settings(),
            clip_ids: request.clip_ids,
        },
    )
    .await
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/generate
///
/// Creates a pending clip holding the generation parameters, then a
/// generate job for it. Returns 202 with the job and clip ids.
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> AppResult<impl IntoResponse> {
    let project = find_project(&state, request.project_id).await?;

    let model = match request.model_id.as_deref() {
        Some(value) => ModelId::parse(value)?,
        None => ModelId::Wan,
    };
    let mode = match request.mode.as_deref() {
        Some(value) => GenerationMode::parse(value)?,
        None => GenerationMode::TextToVideo,
    };

    let (base_width, base_height) = match (request.width, request.height) {
        (Some(w), Some(h)) => {
            validate_dimensions(w, h)?;
            (w, h)
        }
        (None, None) => parse_resolution(&project.resolution)?,
        _ => return Err(validation("width and height must be given together")),
    };
    let frame_count = request
        .frame_count
        .unwrap_or_else(|| model.default_frame_count());
    let scaled = scale_for_budget(base_width, base_height, frame_count, mode, model);

    let steps = request.steps.unwrap_or(DEFAULT_STEPS);
    if steps == 0 || steps > MAX_STEPS {
        return Err(validation(format!(
            "Steps must be between 1 and {MAX_STEPS} (got {steps})"
        )));
    }
    let seed = request.seed.unwrap_or_else(|| rand::random::<u32>() as u64);
    let stored_seed = i64::try_from(seed)
        .map_err(|_| validation(format!("Seed {seed} is out of range")))?;

    let params = GenerationParams {
        prompt: request.prompt.clone(),
        negative_prompt: request.negative_prompt.clone(),
        width: scaled.width,
        height: scaled.height,
        frame_count,
        fps: model.native_fps(),
        steps,
        cfg_scale: request.cfg_scale.unwrap_or(DEFAULT_CFG_SCALE),
        seed,
        denoise: request.denoise.unwrap_or(1.0),
        reference_image: request.reference_image.clone(),
        adapter_weight: request.adapter_weight.unwrap_or(DEFAULT_ADAPTER_WEIGHT),
        filename_prefix: "reelforge".to_string(),
    };
    params.validate(model, mode)?;
    if mode == GenerationMode::ImageToVideo {
        if let Some(reference) = &request.reference_image {
            ensure_reference_exists(&state, reference).await?;
        }
    }
    ensure_inference(&state).await?;

    let order_index = ClipRepo::next_order_index(
        &state.pool,
        project.id,
        0,
        state.pipeline.long_video_order_base,
    )
    .await?;
    let clip = ClipRepo::create_pending(
        &state.pool,
        &CreateClip {
            project_id: project.id,
            order_index,
            prompt: request.prompt,
            negative_prompt: request.negative_prompt,
            steps: steps as i32,
            cfg_scale: params.cfg_scale,
            seed: stored_seed,
            reference_image: request.reference_image,
            adapter_weight: request.adapter_weight,
            model_id: model.as_str().to_string(),
            mode: mode.as_str().to_string(),
            width: Some(base_width as i32),
            height: Some(base_height as i32),
            fps: Some(params.fps as i32),
        },
        None,
    )
    .await?;

    let job_settings = GenerateSettings {
        frame_count: request.frame_count,
        denoise: request.denoise,
    };
    let job_id = submit(
        &state,
        SubmitJob {
            project_id: Some(project.id),
            job_type: JobType::Generate,
            settings: serde_json::to_value(&job_settings)
                .map_err(|e| AppError::InternalError(e.to_string()))?,
            clip_ids: vec![clip.id],
        },
    )
    .await?;
    ClipRepo::attach_job(&state.pool, clip.id, job_id).await?;

    Ok(accepted(job_id, Some(clip.id)))
}

// ---------------------------------------------------------------------------
// Media passes
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/merge
///
/// Needs at least two completed clips, concatenated in request order.
pub async fn merge(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = enqueue_clip_job(
        &state,
        JobType::Merge,
        request,
        |settings: &MergeSettings, clips| {
            if clips < 2 {
                return Err(validation("Merge needs at least two clips"));
            }
            Ok(settings.validate()?)
        },
    )
    .await?;
    Ok(accepted(job_id, None))
}

/// POST /api/v1/jobs/upscale
pub async fn upscale(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = enqueue_clip_job(
        &state,
        JobType::Upscale,
        request,
        |settings: &UpscaleSettings, clips| {
            exactly_one(clips, "Upscale")?;
            Ok(settings.validate()?)
        },
    )
    .await?;
    Ok(accepted(job_id, None))
}

/// POST /api/v1/jobs/interpolate
pub async fn interpolate(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = enqueue_clip_job(
        &state,
        JobType::Interpolate,
        request,
        |settings: &InterpolateSettings, clips| {
            exactly_one(clips, "Interpolation")?;
            Ok(settings.validate()?)
        },
    )
    .await?;
    Ok(accepted(job_id, None))
}

/// POST /api/v1/jobs/export
///
/// A present `merge`, `upscale` or `interpolate` section enables that
/// stage; encode always runs.
pub async fn export(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = enqueue_clip_job(
        &state,
        JobType::Export,
        request,
        |settings: &ExportSettings, clips| Ok(settings.validate(clips)?),
    )
    .await?;
    Ok(accepted(job_id, None))
}

fn exactly_one(clips: usize, what: &str) -> AppResult<()> {
    if clips == 1 {
        Ok(())
    } else {
        Err(validation(format!("{what} takes exactly one clip (got {clips})")))
    }
}

// ---------------------------------------------------------------------------
// Long video
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/long-video
///
/// Requires a project. Either `target_duration` or `segment_count` must
/// be set; the planned segment count and the per-segment generation
/// parameters are checked here so an impossible plan never reaches the
/// queue.
pub async fn long_video(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> AppResult<impl IntoResponse> {
    let project_id = request
        .project_id
        .ok_or_else(|| validation("Long video jobs require a project_id"))?;
    let project = find_project(&state, project_id).await?;
    if !request.clip_ids.is_empty() {
        return Err(validation("Long video jobs do not take input clips"));
    }

    let parsed: LongVideoSettings = settings::parse(&request.settings)?;
    parsed.validate()?;
    let segment_secs = segment_duration_secs(parsed.frames_per_segment(), parsed.model.native_fps());
    let segments = plan_segment_count(parsed.target_duration, parsed.segment_count, segment_secs)?;
    let size = parsed.plan_segments(&project.resolution)?;
    if let Some(reference) = &parsed.reference_image {
        ensure_reference_exists(&state, reference).await?;
    }
    ensure_inference(&state).await?;

    tracing::debug!(
        project_id = project.id,
        segments,
        width = size.width,
        height = size.height,
        "Long video planned"
    );
    let job_id = submit(
        &state,
        SubmitJob {
            project_id: Some(project.id),
            job_type: JobType::LongVideo,
            settings: request.stored_settings(),
            clip_ids: Vec::new(),
        },
    )
    .await?;
    Ok(accepted(job_id, None))
}
