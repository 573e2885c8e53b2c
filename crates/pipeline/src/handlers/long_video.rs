//! Long-video generation by segment chaining.
//!
//! Segment 1 is conditioned on the reference image. Every later segment is
//! conditioned on the continuation frame grabbed from the end of the
//! segment before it, so segment `i + 1` never starts before segment `i`'s
//! frame has been uploaded. Finished segments are stored as clips above
//! the long-video order base and then concatenated.

use std::path::PathBuf;

use reelforge_comfyui::workflow;
use reelforge_core::generation::{GenerationMode, GenerationParams, ModelId, DEFAULT_ADAPTER_WEIGHT};
use reelforge_core::progress::{long_video as milestones, ProgressBand};
use reelforge_core::resolution::{multiply_resolution, DIMENSION_ALIGNMENT};
use reelforge_core::segments::{
    plan_segment_count, segment_duration_secs, segment_order_index, SegmentChain,
};
use reelforge_db::models::clip::{ClipOutput, CreateClip};
use reelforge_db::models::job::JobOutput;
use reelforge_db::models::project::Project;
use reelforge_db::repositories::{ClipRepo, JobRepo, ProjectRepo};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::inference;
use crate::outputs::{self, LONG_VIDEO_DIR, REFERENCES_DIR};
use crate::run::JobRun;
use crate::scratch::ScratchDir;
use crate::settings::{self, LongVideoSettings};

/// Share of a segment's progress slice spent in inference; the rest covers
/// download, storage and frame extraction.
const SEGMENT_INFERENCE_SHARE: f64 = 0.9;

/// Sampler steps for the synthesized reference image.
const REFERENCE_STEPS: u32 = 25;
const REFERENCE_CFG_SCALE: f64 = 7.0;

pub async fn run(ctx: &PipelineContext, run: &JobRun) -> Result<JobOutput, PipelineError> {
    let settings: LongVideoSettings = settings::parse(&run.job.settings)?;
    settings.validate()?;
    let project_id = run.job.project_id.ok_or_else(|| {
        PipelineError::Validation("Long-video jobs must belong to a project".to_string())
    })?;
    let project = ProjectRepo::find_by_id(&ctx.pool, project_id)
        .await?
        .ok_or_else(|| PipelineError::Validation(format!("Project {project_id} not found")))?;

    let model = settings.model;
    let frames = settings.frames_per_segment();
    let fps = model.native_fps();
    let total = plan_segment_count(
        settings.target_duration,
        settings.segment_count,
        segment_duration_secs(frames, fps),
    )?;
    // Checked before any GPU work, including the reference image.
    let size = settings.plan_segments(&project.resolution)?;

    run.set_stage("reference");
    run.milestone(
        milestones::STARTED,
        format!(
            "Long video of {total} segment(s) at {}x{}, {frames} frames each",
            size.width, size.height
        ),
    )
    .await;
    if size.was_scaled {
        run.warn(format!(
            "Resolution {} adjusted to {}x{} for {model}",
            project.resolution, size.width, size.height
        ))
        .await;
    }

    let scratch = ScratchDir::create(&ctx.config.scratch_dir, run.id())?;
    let reference = prepare_reference(ctx, run, &settings, size.width, size.height).await?;
    run.milestone(milestones::REFERENCE_READY, "Reference image ready")
        .await;

    // ---- segments ----

    run.set_stage("segments");
    let first_index = ClipRepo::next_order_index(
        &ctx.pool,
        project.id,
        ctx.config.long_video_order_base,
        i32::MAX,
    )
    .await?;
    let segment_dir = format!("{LONG_VIDEO_DIR}/job_{}", run.id());
    let bands = milestones::SEGMENTS.split(total as usize);
    let mut chain = SegmentChain::new(reference, total);
    let mut segment_paths: Vec<PathBuf> = Vec::with_capacity(total as usize);

    for band in bands {
        let segment = chain.current_segment();
        run.set_segment(segment, total);
        run.ensure_active().await?;
        ctx.inference.release_memory().await;

        let seed = rand::random::<u32>() as u64;
        let params = settings.segment_params(
            size.width,
            size.height,
            chain.current_reference().to_string(),
            seed,
            format!("reelforge/long_video_{}_seg{segment:03}", run.id()),
        );
        let graph = workflow::build(GenerationMode::ImageToVideo, model, &params)?;
        let inference_band = ProgressBand::new(
            band.start,
            band.start + band.width() * SEGMENT_INFERENCE_SHARE,
        );
        let executed = inference::execute(ctx, run, &graph, band.start, inference_band).await?;
        let artifact = executed.primary_video().ok_or_else(|| {
            PipelineError::ArtifactMissing(format!(
                "segment {segment} (prompt {}) produced no video",
                executed.prompt_id
            ))
        })?;

        let dest = outputs::output_path(
            &ctx.config.output_dir,
            &segment_dir,
            &format!("segment_{segment:03}.mp4"),
        )
        .await?;
        inference::download(ctx, artifact, &dest).await?;
        outputs::verify_output(&dest).await?;
        let info = ctx.media.info(&dest).await?;

        let clip = ClipRepo::create_completed(
            &ctx.pool,
            &segment_clip(&project, &params, model, segment_order_index(first_index, segment)),
            &ClipOutput {
                output_path: outputs::display(&dest),
                output_name: outputs::file_name(&dest),
                thumbnail_path: None,
                thumbnail_name: None,
                duration_sec: info.duration_secs,
                frame_count: info.frame_count as i32,
                width: info.width,
                height: info.height,
                fps: fps as i32,
            },
            run.id(),
        )
        .await?;
        JobRepo::append_clip_id(&ctx.pool, run.id(), clip.id).await?;
        segment_paths.push(dest.clone());

        if !chain.is_last() {
            let frame = scratch.file(&format!("segment_{segment:03}_last.png"));
            let at = ctx.media.extract_last_frame(&dest, &frame).await?;
            let name = format!("long_video_{}_seg{segment:03}_last.png", run.id());
            let uploaded = inference::upload(ctx, &frame, &name).await?;
            tracing::debug!(job_id = run.id(), segment, at, "Continuation frame uploaded");
            chain.advance(uploaded)?;
        }
        run.milestone(
            band.end,
            format!("Segment {segment}/{total} done (clip {}, seed {seed})", clip.id),
        )
        .await;
    }
    ctx.inference.release_memory().await;

    // ---- assembly ----

    run.ensure_active().await?;
    run.set_stage("concat");
    let merged = outputs::output_path(
        &ctx.config.output_dir,
        LONG_VIDEO_DIR,
        &format!("long_video_{}.mp4", run.id()),
    )
    .await?;
    let concat_band = ProgressBand::new(milestones::SEGMENTS.end, milestones::CONCATENATED);
    let reporter = &run.reporter;
    let on_concat = |p: f64| reporter.tick(concat_band.map(p));
    ctx.media
        .concat(&segment_paths, &scratch.file("segments.txt"), &merged, Some(&on_concat))
        .await?;
    outputs::verify_output(&merged).await?;
    run.milestone(
        milestones::CONCATENATED,
        format!("Concatenated {} segments", segment_paths.len()),
    )
    .await;

    let final_path = if settings.enhance {
        run.ensure_active().await?;
        run.set_stage("enhance");
        let target_fps = settings.enhance_fps.unwrap_or(ctx.config.enhance_target_fps);
        let source = ctx.media.info(&merged).await?;
        let (width, height) = multiply_resolution(
            source.width.max(1) as u32,
            source.height.max(1) as u32,
            project.upscale_multiplier,
        );
        let enhanced = outputs::output_path(
            &ctx.config.output_dir,
            LONG_VIDEO_DIR,
            &format!("long_video_{}_enhanced.mp4", run.id()),
        )
        .await?;
        let on_enhance = |p: f64| reporter.tick(milestones::ENHANCE.map(p));
        ctx.media
            .upscale_interpolate(&merged, &enhanced, width, height, target_fps, Some(&on_enhance))
            .await?;
        outputs::verify_output(&enhanced).await?;
        outputs::remove_best_effort(&merged).await;
        run.milestone(
            milestones::ENHANCE.end,
            format!("Enhanced to {width}x{height} at {target_fps} fps"),
        )
        .await;
        enhanced
    } else {
        merged
    };

    let info = ctx.media.info(&final_path).await?;
    run.set_stage("finalize");
    let thumb = super::thumbnail(ctx, run, &final_path, &format!("long_video_{}", run.id())).await;

    run.ensure_active().await?;
    let mut metadata = super::media_metadata(&final_path, &info);
    metadata["segments"] = serde_json::json!(total);
    metadata["frames_per_segment"] = serde_json::json!(frames);
    metadata["model_id"] = serde_json::json!(model.as_str());
    metadata["enhanced"] = serde_json::json!(settings.enhance);
    metadata["thumbnail_path"] = thumb
        .as_deref()
        .map(outputs::display)
        .map_or(serde_json::Value::Null, serde_json::Value::from);
    run.record_output(metadata.clone()).await?;
    run.milestone(milestones::DB_UPDATED, "Long video recorded").await;

    Ok(JobOutput {
        output_path: Some(outputs::display(&final_path)),
        output_file_name: Some(outputs::file_name(&final_path)),
        result: metadata,
    })
}

/// Upload the supplied reference image, or synthesize one from the prompt.
/// Returns the name the inference service knows it by.
async fn prepare_reference(
    ctx: &PipelineContext,
    run: &JobRun,
    settings: &LongVideoSettings,
    width: u32,
    height: u32,
) -> Result<String, PipelineError> {
    if let Some(stored) = &settings.reference_image {
        let local = outputs::resolve(&ctx.config.output_dir, stored);
        let name = format!("long_video_{}_{}", run.id(), outputs::file_name(&local));
        return inference::upload(ctx, &local, &name).await;
    }

    let params = GenerationParams {
        prompt: settings.prompt.clone(),
        negative_prompt: settings.negative_prompt.clone(),
        width: align(width),
        height: align(height),
        frame_count: 1,
        fps: 1,
        steps: REFERENCE_STEPS,
        cfg_scale: REFERENCE_CFG_SCALE,
        seed: rand::random::<u32>() as u64,
        denoise: 1.0,
        reference_image: None,
        adapter_weight: DEFAULT_ADAPTER_WEIGHT,
        filename_prefix: format!("reelforge/long_video_{}_reference", run.id()),
    };
    let graph = workflow::build_still_image(&params)?;
    let band = ProgressBand::new(milestones::STARTED, milestones::REFERENCE_READY);
    let executed = inference::execute(ctx, run, &graph, milestones::STARTED, band).await?;
    let artifact = executed.primary_image().ok_or_else(|| {
        PipelineError::ArtifactMissing(format!(
            "reference prompt {} produced no image",
            executed.prompt_id
        ))
    })?;

    let dest = outputs::output_path(
        &ctx.config.output_dir,
        REFERENCES_DIR,
        &format!("long_video_{}_reference.png", run.id()),
    )
    .await?;
    inference::download(ctx, artifact, &dest).await?;
    outputs::verify_output(&dest).await?;
    run.log(
        reelforge_core::job_events::LOG_INFO,
        format!("Reference image synthesized at {}", outputs::display(&dest)),
    )
    .await;
    inference::upload(ctx, &dest, &outputs::file_name(&dest)).await
}

fn align(value: u32) -> u32 {
    (value - value % DIMENSION_ALIGNMENT).max(DIMENSION_ALIGNMENT)
}

fn segment_clip(
    project: &Project,
    params: &GenerationParams,
    model: ModelId,
    order_index: i32,
) -> CreateClip {
    CreateClip {
        project_id: project.id,
        order_index,
        prompt: params.prompt.clone(),
        negative_prompt: params.negative_prompt.clone(),
        steps: params.steps as i32,
        cfg_scale: params.cfg_scale,
        seed: params.seed as i64,
        reference_image: params.reference_image.clone(),
        adapter_weight: None,
        model_id: model.as_str().to_string(),
        mode: GenerationMode::ImageToVideo.as_str().to_string(),
        width: Some(params.width as i32),
        height: Some(params.height as i32),
        fps: Some(params.fps as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_dimensions_are_aligned() {
        assert_eq!(align(832), 832);
        assert_eq!(align(830), 824);
        assert_eq!(align(3), DIMENSION_ALIGNMENT);
    }
}
