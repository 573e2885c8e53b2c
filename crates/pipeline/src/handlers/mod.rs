//! One module per job type, plus helpers shared between them.

pub mod export;
pub mod generate;
pub mod long_video;
pub mod media;

use std::path::{Path, PathBuf};

use reelforge_core::ffmpeg::{MediaInfo, ProgressFn, Transition};
use reelforge_core::types::DbId;
use reelforge_db::models::clip::Clip;
use reelforge_db::models::project::Project;
use reelforge_db::models::status::ClipStatus;
use reelforge_db::repositories::{ClipRepo, ProjectRepo};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::outputs::{self, THUMBNAILS_DIR};
use crate::run::JobRun;
use crate::scratch::ScratchDir;
use crate::settings::MergeSettings;

/// Frame rate assumed when neither project nor clip provides one.
const FALLBACK_FPS: u32 = 16;

/// Upscale factor used when neither the job nor a project names one.
const DEFAULT_SCALE_FACTOR: f64 = 2.0;

/// Upscale factor for a pass: the job's own factor, else the project's
/// multiplier, else [`DEFAULT_SCALE_FACTOR`]. A factor that would not
/// enlarge the video is rejected rather than replaced.
pub(crate) fn upscale_factor(
    requested: Option<f64>,
    project_multiplier: Option<f64>,
) -> Result<f64, PipelineError> {
    let factor = requested
        .or(project_multiplier)
        .unwrap_or(DEFAULT_SCALE_FACTOR);
    if factor <= 1.0 {
        return Err(PipelineError::Validation(format!(
            "Upscale factor must be greater than 1 (got {factor}); set scale_factor on the job"
        )));
    }
    Ok(factor)
}

/// A completed input clip and its file on disk.
pub(crate) struct InputClip {
    pub clip: Clip,
    pub path: PathBuf,
}

/// Load the job's input clips in order and check that each one finished
/// and still has its file.
pub(crate) async fn resolve_inputs(
    ctx: &PipelineContext,
    run: &JobRun,
) -> Result<Vec<InputClip>, PipelineError> {
    let ids = &run.job.clip_ids;
    let clips = ClipRepo::list_by_ids(&ctx.pool, ids).await?;
    if clips.len() != ids.len() {
        let missing: Vec<DbId> = ids
            .iter()
            .copied()
            .filter(|id| !clips.iter().any(|c| c.id == *id))
            .collect();
        return Err(PipelineError::Validation(format!("Clips not found: {missing:?}")));
    }

    let mut inputs = Vec::with_capacity(clips.len());
    for clip in clips {
        if clip.status_id != ClipStatus::Completed.id() {
            return Err(PipelineError::Validation(format!(
                "Clip {} has not completed",
                clip.id
            )));
        }
        let stored = clip.output_path.as_deref().ok_or_else(|| {
            PipelineError::ArtifactMissing(format!("Clip {} has no output file", clip.id))
        })?;
        let path = outputs::resolve(&ctx.config.output_dir, stored);
        outputs::verify_output(&path).await?;
        inputs.push(InputClip { clip, path });
    }
    Ok(inputs)
}

/// Project the job belongs to, falling back to its first input clip's.
pub(crate) async fn load_project(
    ctx: &PipelineContext,
    run: &JobRun,
    inputs: &[InputClip],
) -> Result<Option<Project>, PipelineError> {
    let project_id = run
        .job
        .project_id
        .or_else(|| inputs.first().map(|i| i.clip.project_id));
    match project_id {
        Some(id) => Ok(ProjectRepo::find_by_id(&ctx.pool, id).await?),
        None => Ok(None),
    }
}

pub(crate) fn output_fps(project: Option<&Project>, inputs: &[InputClip]) -> u32 {
    project
        .map(|p| p.fps)
        .or_else(|| inputs.first().and_then(|i| i.clip.fps))
        .filter(|fps| *fps > 0)
        .map_or(FALLBACK_FPS, |fps| fps as u32)
}

/// Join clips: a lossless concat for hard cuts, otherwise a re-encoding
/// cross-fade.
pub(crate) async fn merge_clips(
    ctx: &PipelineContext,
    paths: &[PathBuf],
    settings: &MergeSettings,
    fps: u32,
    scratch: &ScratchDir,
    dest: &Path,
    on_progress: ProgressFn<'_>,
) -> Result<(), PipelineError> {
    match settings.transition {
        Transition::None => {
            ctx.media
                .concat(paths, &scratch.file("concat.txt"), dest, Some(on_progress))
                .await?
        }
        transition => {
            ctx.media
                .merge_with_transition(
                    paths,
                    transition,
                    settings.transition_duration,
                    fps,
                    dest,
                    Some(on_progress),
                )
                .await?
        }
    }
    outputs::verify_output(dest).await?;
    Ok(())
}

/// Write a thumbnail next to the other thumbnails. Failure only warns.
pub(crate) async fn thumbnail(
    ctx: &PipelineContext,
    run: &JobRun,
    video: &Path,
    stem: &str,
) -> Option<PathBuf> {
    let dest = match outputs::output_path(
        &ctx.config.output_dir,
        THUMBNAILS_DIR,
        &format!("{stem}.jpg"),
    )
    .await
    {
        Ok(dest) => dest,
        Err(e) => {
            run.warn(format!("Thumbnail skipped: {e}")).await;
            return None;
        }
    };
    match ctx
        .media
        .thumbnail(video, &dest, ctx.config.thumbnail_width)
        .await
    {
        Ok(()) => Some(dest),
        Err(e) => {
            run.warn(format!("Thumbnail skipped: {e}")).await;
            None
        }
    }
}

/// Derived metadata merged into the job settings and result.
pub(crate) fn media_metadata(path: &Path, info: &MediaInfo) -> serde_json::Value {
    serde_json::json!({
        "path": outputs::display(path),
        "file_name": outputs::file_name(path),
        "duration_sec": info.duration_secs,
        "frame_count": info.frame_count,
        "width": info.width,
        "height": info.height,
        "fps": info.fps,
    })
}
