//! Single clip generation.

use reelforge_comfyui::workflow;
use reelforge_core::generation::{GenerationMode, GenerationParams, ModelId, DEFAULT_ADAPTER_WEIGHT};
use reelforge_core::progress::generate as milestones;
use reelforge_core::resolution::{parse_resolution, scale_for_budget};
use reelforge_db::models::clip::ClipOutput;
use reelforge_db::models::job::JobOutput;
use reelforge_db::models::status::ClipStatus;
use reelforge_db::repositories::{ClipRepo, ProjectRepo};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::inference;
use crate::outputs::{self, CLIPS_DIR};
use crate::run::JobRun;
use crate::settings::{self, GenerateSettings};

pub async fn run(ctx: &PipelineContext, run: &JobRun) -> Result<JobOutput, PipelineError> {
    let settings: GenerateSettings = settings::parse(&run.job.settings)?;
    let clip_id = *run.job.clip_ids.first().ok_or_else(|| {
        PipelineError::Validation("Generate job does not reference a clip".to_string())
    })?;
    let clip = ClipRepo::find_by_id(&ctx.pool, clip_id)
        .await?
        .ok_or_else(|| PipelineError::Validation(format!("Clip {clip_id} not found")))?;
    let project = ProjectRepo::find_by_id(&ctx.pool, clip.project_id)
        .await?
        .ok_or_else(|| {
            PipelineError::Validation(format!("Project {} not found", clip.project_id))
        })?;

    let model = ModelId::parse(&clip.model_id)?;
    let mode = GenerationMode::parse(&clip.mode)?;
    let (base_width, base_height) = match (clip.width, clip.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w as u32, h as u32),
        _ => parse_resolution(&project.resolution)?,
    };
    let frame_count = settings
        .frame_count
        .unwrap_or_else(|| model.default_frame_count());
    let fps = model.native_fps();
    let scaled = scale_for_budget(base_width, base_height, frame_count, mode, model);

    if !ClipRepo::transition(&ctx.pool, clip.id, ClipStatus::Pending, ClipStatus::Processing)
        .await?
    {
        return Err(PipelineError::Validation(format!(
            "Clip {} is not pending",
            clip.id
        )));
    }
    run.set_stage("generate");
    run.milestone(milestones::STARTED, "Generation started").await;
    if scaled.was_scaled {
        run.warn(format!(
            "Resolution {base_width}x{base_height} adjusted to {}x{} for {model}",
            scaled.width, scaled.height
        ))
        .await;
    }

    let reference_image = match mode {
        GenerationMode::TextToVideo => None,
        GenerationMode::ImageToVideo => {
            let stored = clip.reference_image.as_deref().ok_or_else(|| {
                PipelineError::Validation(format!(
                    "Model '{model}' requires a reference image for image-to-video"
                ))
            })?;
            let local = outputs::resolve(&ctx.config.output_dir, stored);
            let name = format!("clip_{}_{}", clip.id, outputs::file_name(&local));
            Some(inference::upload(ctx, &local, &name).await?)
        }
    };

    let params = GenerationParams {
        prompt: clip.prompt.clone(),
        negative_prompt: clip.negative_prompt.clone(),
        width: scaled.width,
        height: scaled.height,
        frame_count,
        fps,
        steps: clip.steps.max(0) as u32,
        cfg_scale: clip.cfg_scale,
        seed: clip.seed as u64,
        denoise: settings.denoise.unwrap_or(1.0),
        reference_image,
        adapter_weight: clip.adapter_weight.unwrap_or(DEFAULT_ADAPTER_WEIGHT),
        filename_prefix: format!("reelforge/clip_{}", clip.id),
    };
    let graph = workflow::build(mode, model, &params)?;
    run.milestone(
        milestones::GRAPH_BUILT,
        format!("Graph built ({} nodes)", graph.len()),
    )
    .await;

    ctx.inference.release_memory().await;
    run.ensure_active().await?;
    let executed = inference::execute(
        ctx,
        run,
        &graph,
        milestones::SUBMITTED,
        milestones::INFERENCE,
    )
    .await?;

    let artifact = executed.primary_video().ok_or_else(|| {
        PipelineError::ArtifactMissing(format!("prompt {} produced no video", executed.prompt_id))
    })?;
    let dest = outputs::output_path(
        &ctx.config.output_dir,
        CLIPS_DIR,
        &format!("clip_{}_{}.mp4", clip.id, clip.seed),
    )
    .await?;
    inference::download(ctx, artifact, &dest).await?;
    outputs::verify_output(&dest).await?;
    run.milestone(milestones::DOWNLOADED, "Clip downloaded").await;

    let info = ctx.media.info(&dest).await?;
    let thumb = super::thumbnail(ctx, run, &dest, &format!("clip_{}", clip.id)).await;
    run.milestone(milestones::THUMBNAIL, "Thumbnail ready").await;

    run.ensure_active().await?;
    let output = ClipOutput {
        output_path: outputs::display(&dest),
        output_name: outputs::file_name(&dest),
        thumbnail_path: thumb.as_deref().map(outputs::display),
        thumbnail_name: thumb.as_deref().map(outputs::file_name),
        duration_sec: info.duration_secs,
        frame_count: info.frame_count as i32,
        width: info.width,
        height: info.height,
        fps: fps as i32,
    };
    ClipRepo::complete(&ctx.pool, clip.id, &output)
        .await?
        .ok_or_else(|| PipelineError::Execution(format!("Clip {} left processing", clip.id)))?;

    let metadata = serde_json::json!({
        "clip_id": clip.id,
        "model_id": model.as_str(),
        "mode": mode.as_str(),
        "requested": { "width": base_width, "height": base_height },
        "was_scaled": scaled.was_scaled,
        "prompt_id": executed.prompt_id,
        "media": super::media_metadata(&dest, &info),
    });
    run.record_output(metadata.clone()).await?;
    run.milestone(milestones::DB_UPDATED, "Clip saved").await;

    ctx.inference.release_memory().await;
    Ok(JobOutput {
        output_path: Some(output.output_path),
        output_file_name: Some(output.output_name),
        result: metadata,
    })
}
