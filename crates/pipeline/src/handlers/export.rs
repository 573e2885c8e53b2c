//! The export pipeline: merge, upscale and interpolate (each optional),
//! then a final encode.
//!
//! Each stage reads the previous stage's file. Intermediates live in the
//! job's scratch directory, which is removed when the run ends whether it
//! succeeded or not.

use std::path::PathBuf;

use reelforge_core::progress::{
    ExportStage, StagePlan, EXPORT_DB_PERCENT, EXPORT_SETUP_PERCENT,
    EXPORT_THUMBNAIL_PERCENT,
};
use reelforge_core::resolution::multiply_resolution;
use reelforge_db::models::job::JobOutput;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::outputs::{self, EXPORTS_DIR};
use crate::run::JobRun;
use crate::scratch::ScratchDir;
use crate::settings::{self, ExportSettings};

pub async fn run(ctx: &PipelineContext, run: &JobRun) -> Result<JobOutput, PipelineError> {
    let settings: ExportSettings = settings::parse(&run.job.settings)?;
    settings.validate(run.job.clip_ids.len())?;
    let plan = StagePlan::new(
        settings.merge.is_some(),
        settings.upscale.is_some(),
        settings.interpolate.is_some(),
    );

    run.set_stage("setup");
    let inputs = super::resolve_inputs(ctx, run).await?;
    let project = super::load_project(ctx, run, &inputs).await?;
    let fps = super::output_fps(project.as_ref(), &inputs);
    // Resolved up front so a bad factor fails before any stage runs.
    let scale_factor = settings
        .upscale
        .as_ref()
        .map(|u| {
            super::upscale_factor(u.scale_factor, project.as_ref().map(|p| p.upscale_multiplier))
        })
        .transpose()?;
    let scratch = ScratchDir::create(&ctx.config.scratch_dir, run.id())?;
    let stage_names: Vec<&str> = plan.stages().iter().map(|(s, _)| s.as_str()).collect();
    run.milestone(
        EXPORT_SETUP_PERCENT,
        format!("Export of {} clip(s): {}", inputs.len(), stage_names.join(" -> ")),
    )
    .await;

    let mut current: PathBuf = inputs
        .first()
        .map(|i| i.path.clone())
        .ok_or_else(|| PipelineError::Validation("Export needs at least one clip".to_string()))?;
    let final_dest = outputs::output_path(
        &ctx.config.output_dir,
        EXPORTS_DIR,
        &format!("export_{}.{}", run.id(), settings.encode.format.extension()),
    )
    .await?;

    for &(stage, band) in plan.stages() {
        run.ensure_active().await?;
        run.set_stage(stage.as_str());
        run.milestone(band.start, format!("Stage {} started", stage.as_str()))
            .await;

        let next = match stage {
            ExportStage::Encode => final_dest.clone(),
            _ => scratch.file(&format!("{}.mp4", stage.as_str())),
        };
        let reporter = &run.reporter;
        let on_progress = move |p: f64| reporter.tick(band.map(p));

        match stage {
            ExportStage::Merge => {
                let merge = settings.merge.clone().unwrap_or_default();
                let paths: Vec<PathBuf> = inputs.iter().map(|i| i.path.clone()).collect();
                super::merge_clips(ctx, &paths, &merge, fps, &scratch, &next, &on_progress)
                    .await?;
            }
            ExportStage::Upscale => {
                let factor = scale_factor.ok_or_else(|| {
                    PipelineError::Validation("Upscale stage has no settings".to_string())
                })?;
                let info = ctx.media.info(&current).await?;
                let (width, height) = multiply_resolution(
                    info.width.max(1) as u32,
                    info.height.max(1) as u32,
                    factor,
                );
                ctx.media
                    .scale(&current, &next, width, height, Some(&on_progress))
                    .await?;
            }
            ExportStage::Interpolate => {
                let target_fps = settings
                    .interpolate
                    .as_ref()
                    .and_then(|i| i.target_fps)
                    .unwrap_or(ctx.config.enhance_target_fps);
                ctx.media
                    .interpolate(&current, &next, target_fps, Some(&on_progress))
                    .await?;
            }
            ExportStage::Encode => {
                ctx.media
                    .encode(&current, &next, settings.encode, Some(&on_progress))
                    .await?;
            }
        }
        outputs::verify_output(&next).await?;
        run.milestone(band.end, format!("Stage {} finished", stage.as_str()))
            .await;
        current = next;
    }

    let info = ctx.media.info(&final_dest).await?;
    run.set_stage("finalize");
    let thumb = super::thumbnail(ctx, run, &final_dest, &format!("export_{}", run.id())).await;
    run.milestone(EXPORT_THUMBNAIL_PERCENT, "Thumbnail ready").await;

    run.ensure_active().await?;
    let mut metadata = super::media_metadata(&final_dest, &info);
    metadata["stages"] = serde_json::json!(stage_names);
    metadata["encode"] = serde_json::json!(settings.encode);
    metadata["thumbnail_path"] = thumb
        .as_deref()
        .map(outputs::display)
        .map_or(serde_json::Value::Null, serde_json::Value::from);
    run.record_output(metadata.clone()).await?;
    run.milestone(EXPORT_DB_PERCENT, "Export recorded").await;

    Ok(JobOutput {
        output_path: Some(outputs::display(&final_dest)),
        output_file_name: Some(outputs::file_name(&final_dest)),
        result: metadata,
    })
}
