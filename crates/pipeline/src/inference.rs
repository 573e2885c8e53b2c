//! Inference round trips shared by the generating handlers.

use std::path::Path;

use reelforge_comfyui::{ArtifactRef, ExecutionOutputs, Graph, InferenceEvent};
use reelforge_core::progress::ProgressBand;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::run::JobRun;

/// Submit `graph`, report `submitted_percent`, then wait for it while
/// remapping step progress into `band`.
pub(crate) async fn execute(
    ctx: &PipelineContext,
    run: &JobRun,
    graph: &Graph,
    submitted_percent: f64,
    band: ProgressBand,
) -> Result<ExecutionOutputs, PipelineError> {
    let handle = ctx.inference.submit(graph).await?;
    let prompt_id = handle.prompt_id.clone();
    run.milestone(submitted_percent, format!("Submitted to inference ({prompt_id})"))
        .await;

    let job_id = run.id();
    let reporter = &run.reporter;
    let on_event = move |event: InferenceEvent| match event {
        InferenceEvent::StepProgress { value, max, .. } => reporter.tick(band.map_steps(value, max)),
        InferenceEvent::NodeExecuting { node } => {
            tracing::trace!(job_id, node = %node, "Executing node");
        }
    };

    let outputs = ctx
        .inference
        .await_completion(handle, &on_event, ctx.config.inference_timeout)
        .await?;
    tracing::info!(job_id, prompt_id = %prompt_id, artifacts = outputs.artifacts.len(), "Inference finished");
    Ok(outputs)
}

/// Download an artifact to `dest`.
pub(crate) async fn download(
    ctx: &PipelineContext,
    artifact: &ArtifactRef,
    dest: &Path,
) -> Result<(), PipelineError> {
    let bytes = ctx.inference.fetch_artifact(artifact).await?;
    if bytes.is_empty() {
        return Err(PipelineError::ArtifactMissing(format!(
            "artifact {} is empty",
            artifact.filename
        )));
    }
    tokio::fs::write(dest, bytes).await?;
    Ok(())
}

/// Upload a local image into the service's input store.
pub(crate) async fn upload(
    ctx: &PipelineContext,
    path: &Path,
    name: &str,
) -> Result<String, PipelineError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::Validation(format!(
                "Reference image {} does not exist",
                path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(ctx.inference.upload_image(bytes, name).await?)
}
