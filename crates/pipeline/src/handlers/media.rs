//! Single-pass media jobs: merge, upscale and interpolate.
//!
//! Each pass reads completed clips, runs one media tool invocation and
//! writes a new file under the output root. Clips are never modified.

use std::path::{Path, PathBuf};

use reelforge_core::progress::media_pass as milestones;
use reelforge_core::resolution::multiply_resolution;
use reelforge_db::models::job::JobOutput;

use super::InputClip;
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::outputs::{self, INTERPOLATIONS_DIR, MERGES_DIR, UPSCALES_DIR};
use crate::run::JobRun;
use crate::scratch::ScratchDir;
use crate::settings::{self, InterpolateSettings, MergeSettings, UpscaleSettings};

pub async fn merge(ctx: &PipelineContext, run: &JobRun) -> Result<JobOutput, PipelineError> {
    let settings: MergeSettings = settings::parse(&run.job.settings)?;
    settings.validate()?;
    if run.job.clip_ids.len() < 2 {
        return Err(PipelineError::Validation(
            "Merge needs at least two clips".to_string(),
        ));
    }

    run.set_stage("merge");
    run.milestone(milestones::STARTED, "Merge started").await;
    let inputs = super::resolve_inputs(ctx, run).await?;
    let project = super::load_project(ctx, run, &inputs).await?;
    let fps = super::output_fps(project.as_ref(), &inputs);
    run.milestone(
        milestones::INPUTS_RESOLVED,
        format!("Merging {} clips", inputs.len()),
    )
    .await;

    run.ensure_active().await?;
    let scratch = ScratchDir::create(&ctx.config.scratch_dir, run.id())?;
    let dest = outputs::output_path(
        &ctx.config.output_dir,
        MERGES_DIR,
        &format!("merge_{}.mp4", run.id()),
    )
    .await?;
    let paths: Vec<PathBuf> = inputs.iter().map(|i| i.path.clone()).collect();
    let reporter = &run.reporter;
    let on_progress = |p: f64| reporter.tick(milestones::PROCESSING.map(p));
    super::merge_clips(ctx, &paths, &settings, fps, &scratch, &dest, &on_progress).await?;

    let extra = serde_json::json!({
        "transition": settings.transition,
        "transition_duration": settings.transition_duration,
        "clip_ids": &run.job.clip_ids,
    });
    finish(ctx, run, &dest, "merge", extra).await
}

pub async fn upscale(ctx: &PipelineContext, run: &JobRun) -> Result<JobOutput, PipelineError> {
    let settings: UpscaleSettings = settings::parse(&run.job.settings)?;
    settings.validate()?;

    run.set_stage("upscale");
    run.milestone(milestones::STARTED, "Upscale started").await;
    let input = single_input(ctx, run).await?;
    let project = super::load_project(ctx, run, std::slice::from_ref(&input)).await?;
    let factor = super::upscale_factor(
        settings.scale_factor,
        project.as_ref().map(|p| p.upscale_multiplier),
    )?;

    let info = ctx.media.info(&input.path).await?;
    let (width, height) = multiply_resolution(info.width.max(1) as u32, info.height.max(1) as u32, factor);
    run.milestone(
        milestones::INPUTS_RESOLVED,
        format!("Upscaling {}x{} to {width}x{height}", info.width, info.height),
    )
    .await;

    run.ensure_active().await?;
    let dest = outputs::output_path(
        &ctx.config.output_dir,
        UPSCALES_DIR,
        &format!("upscale_{}.mp4", run.id()),
    )
    .await?;
    let reporter = &run.reporter;
    let on_progress = |p: f64| reporter.tick(milestones::PROCESSING.map(p));
    ctx.media
        .scale(&input.path, &dest, width, height, Some(&on_progress))
        .await?;
    outputs::verify_output(&dest).await?;

    let extra = serde_json::json!({ "scale_factor": factor, "clip_id": input.clip.id });
    finish(ctx, run, &dest, "upscale", extra).await
}

pub async fn interpolate(
    ctx: &PipelineContext,
    run: &JobRun,
) -> Result<JobOutput, PipelineError> {
    let settings: InterpolateSettings = settings::parse(&run.job.settings)?;
    settings.validate()?;
    let target_fps = settings.target_fps.unwrap_or(ctx.config.enhance_target_fps);

    run.set_stage("interpolate");
    run.milestone(milestones::STARTED, "Interpolation started").await;
    let input = single_input(ctx, run).await?;
    run.milestone(
        milestones::INPUTS_RESOLVED,
        format!("Interpolating clip {} to {target_fps} fps", input.clip.id),
    )
    .await;

    run.ensure_active().await?;
    let dest = outputs::output_path(
        &ctx.config.output_dir,
        INTERPOLATIONS_DIR,
        &format!("interpolate_{}.mp4", run.id()),
    )
    .await?;
    let reporter = &run.reporter;
    let on_progress = |p: f64| reporter.tick(milestones::PROCESSING.map(p));
    ctx.media
        .interpolate(&input.path, &dest, target_fps, Some(&on_progress))
        .await?;
    outputs::verify_output(&dest).await?;

    let extra = serde_json::json!({ "target_fps": target_fps, "clip_id": input.clip.id });
    finish(ctx, run, &dest, "interpolate", extra).await
}

async fn single_input(ctx: &PipelineContext, run: &JobRun) -> Result<InputClip, PipelineError> {
    if run.job.clip_ids.len() != 1 {
        return Err(PipelineError::Validation(format!(
            "{} takes exactly one clip (got {})",
            run.job_type.as_str(),
            run.job.clip_ids.len()
        )));
    }
    let mut inputs = super::resolve_inputs(ctx, run).await?;
    inputs
        .pop()
        .ok_or_else(|| PipelineError::Validation("No input clip".to_string()))
}

/// Probe, thumbnail and record the pass output.
async fn finish(
    ctx: &PipelineContext,
    run: &JobRun,
    dest: &Path,
    kind: &str,
    extra: serde_json::Value,
) -> Result<JobOutput, PipelineError> {
    let info = ctx.media.info(dest).await?;
    run.milestone(
        milestones::PROBED,
        format!("Output is {:.2}s at {}x{}", info.duration_secs, info.width, info.height),
    )
    .await;

    let thumb = super::thumbnail(ctx, run, dest, &format!("{kind}_{}", run.id())).await;
    run.milestone(milestones::THUMBNAIL, "Thumbnail ready").await;

    run.ensure_active().await?;
    let mut metadata = super::media_metadata(dest, &info);
    metadata["thumbnail_path"] = thumb
        .as_deref()
        .map(outputs::display)
        .map_or(serde_json::Value::Null, serde_json::Value::from);
    metadata["pass"] = extra;
    run.record_output(metadata.clone()).await?;
    run.milestone(milestones::DB_UPDATED, "Output recorded").await;

    Ok(JobOutput {
        output_path: Some(outputs::display(dest)),
        output_file_name: Some(outputs::file_name(dest)),
        result: metadata,
    })
}
