//! Handler behaviour against a real database with scripted inference and
//! media services.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;

use reelforge_comfyui::service::EventFn;
use reelforge_comfyui::{
    ArtifactRef, ExecutionHandle, ExecutionOutputs, Graph, InferenceError, InferenceEvent,
    InferenceService,
};
use reelforge_core::ffmpeg::{
    EncodeSettings, FfmpegError, MediaInfo, MediaService, ProgressFn, Transition,
};
use reelforge_core::job_type::JobType;
use reelforge_core::segments::LONG_VIDEO_ORDER_BASE;
use reelforge_db::models::clip::{Clip, ClipOutput, CreateClip};
use reelforge_db::models::job::SubmitJob;
use reelforge_db::models::project::CreateProject;
use reelforge_db::models::status::{ClipStatus, JobStatus};
use reelforge_db::repositories::{ClipRepo, JobRepo, ProjectRepo};
use reelforge_events::{JobSubscription, ProgressBus, ProgressEventKind};
use reelforge_pipeline::{JobHandler, JobRun, Pipeline, PipelineConfig, PipelineContext, PipelineError};

// ---------------------------------------------------------------------------
// Scripted inference service
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Script {
    Unavailable,
    /// Completes with no artifacts at all.
    Empty,
    /// Every graph yields one artifact: an image for still-image graphs,
    /// a video otherwise.
    Renders,
    /// Like `Renders`, but the n-th submitted graph (1-based) fails.
    FailsOnSubmit(usize),
}

struct FakeInference {
    script: Script,
    submitted: Mutex<Vec<serde_json::Value>>,
    uploads: Mutex<Vec<String>>,
    releases: AtomicUsize,
}

impl FakeInference {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            submitted: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
        })
    }

    fn submitted(&self) -> Vec<serde_json::Value> {
        self.submitted.lock().unwrap().clone()
    }

    fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn renders(&self) -> bool {
        matches!(self.script, Script::Renders | Script::FailsOnSubmit(_))
    }
}

fn has_node(graph: &serde_json::Value, class_type: &str) -> bool {
    graph
        .as_object()
        .is_some_and(|nodes| nodes.values().any(|n| n["class_type"] == class_type))
}

#[async_trait]
impl InferenceService for FakeInference {
    async fn is_available(&self) -> bool {
        !matches!(self.script, Script::Unavailable)
    }

    async fn submit(&self, graph: &Graph) -> Result<ExecutionHandle, InferenceError> {
        if let Script::Unavailable = self.script {
            return Err(InferenceError::ServiceUnavailable("connection refused".into()));
        }
        let json = graph.to_json();
        let still = has_node(&json, "SaveImage");
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(json);
        let n = submitted.len();
        if let Script::FailsOnSubmit(failing) = self.script {
            if n == failing {
                return Err(InferenceError::Execution(format!("node 3 failed in prompt {n}")));
            }
        }
        let suffix = if still { "-still" } else { "" };
        Ok(ExecutionHandle::new(format!("prompt-{n}{suffix}")))
    }

    async fn await_completion(
        &self,
        handle: ExecutionHandle,
        on_event: EventFn<'_>,
        _timeout: Duration,
    ) -> Result<ExecutionOutputs, InferenceError> {
        for value in [5, 10, 20] {
            on_event(InferenceEvent::StepProgress {
                value,
                max: 20,
                node: Some("3".into()),
            });
        }
        let artifacts = if self.renders() {
            let filename = if handle.prompt_id.ends_with("-still") {
                "frame_00001_.png"
            } else {
                "clip_00001.mp4"
            };
            vec![ArtifactRef {
                filename: filename.into(),
                subfolder: String::new(),
                kind: "output".into(),
            }]
        } else {
            Vec::new()
        };
        Ok(ExecutionOutputs {
            prompt_id: handle.prompt_id,
            artifacts,
        })
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, InferenceError> {
        if self.renders() {
            Ok(b"rendered".to_vec())
        } else {
            Err(InferenceError::ArtifactMissing(artifact.filename.clone()))
        }
    }

    async fn upload_image(&self, _bytes: Vec<u8>, filename: &str) -> Result<String, InferenceError> {
        self.uploads.lock().unwrap().push(filename.to_string());
        Ok(filename.to_string())
    }

    async fn release_memory(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Scripted media service
// ---------------------------------------------------------------------------

/// Writes a small placeholder for every output and records each call.
#[derive(Default)]
struct FakeMedia {
    calls: Mutex<Vec<String>>,
    concatenated: Mutex<Vec<PathBuf>>,
    /// Operation that exits non-zero instead of writing its output.
    fail_on: Option<&'static str>,
}

impl FakeMedia {
    fn failing_on(op: &'static str) -> Self {
        Self {
            fail_on: Some(op),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn produce(
        &self,
        op: &str,
        output_path: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.calls.lock().unwrap().push(op.to_string());
        if self.fail_on == Some(op) {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: Some(1),
                stderr: format!("{op}: conversion failed"),
            });
        }
        if let Some(report) = on_progress {
            for percent in [25.0, 60.0, 100.0] {
                report(percent);
            }
        }
        tokio::fs::write(output_path, b"rendered").await?;
        Ok(())
    }
}

#[async_trait]
impl MediaService for FakeMedia {
    async fn info(&self, _path: &Path) -> Result<MediaInfo, FfmpegError> {
        Ok(MediaInfo {
            duration_secs: 5.0625,
            frame_count: 81,
            width: 832,
            height: 480,
            fps: 16.0,
        })
    }

    async fn extract_last_frame(
        &self,
        _video_path: &Path,
        output_path: &Path,
    ) -> Result<f64, FfmpegError> {
        self.produce("extract_last_frame", output_path, None).await?;
        Ok(4.9625)
    }

    async fn thumbnail(
        &self,
        _video_path: &Path,
        output_path: &Path,
        _width: u32,
    ) -> Result<(), FfmpegError> {
        self.produce("thumbnail", output_path, None).await
    }

    async fn concat(
        &self,
        inputs: &[PathBuf],
        _list_path: &Path,
        output_path: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.concatenated.lock().unwrap().extend_from_slice(inputs);
        self.produce("concat", output_path, on_progress).await
    }

    async fn merge_with_transition(
        &self,
        _inputs: &[PathBuf],
        _transition: Transition,
        _transition_secs: f64,
        _fps: u32,
        output_path: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.produce("merge_with_transition", output_path, on_progress).await
    }

    async fn scale(
        &self,
        _input: &Path,
        output_path: &Path,
        width: u32,
        height: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.produce(&format!("scale {width}x{height}"), output_path, on_progress)
            .await
    }

    async fn interpolate(
        &self,
        _input: &Path,
        output_path: &Path,
        fps: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.produce(&format!("interpolate {fps}"), output_path, on_progress)
            .await
    }

    async fn upscale_interpolate(
        &self,
        _input: &Path,
        output_path: &Path,
        _width: u32,
        _height: u32,
        _fps: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.produce("upscale_interpolate", output_path, on_progress).await
    }

    async fn encode(
        &self,
        _input: &Path,
        output_path: &Path,
        _settings: EncodeSettings,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.produce("encode", output_path, on_progress).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    pipeline: Pipeline,
    inference: Arc<FakeInference>,
    media: Arc<FakeMedia>,
    bus: Arc<ProgressBus>,
    output: tempfile::TempDir,
}

impl Harness {
    fn output_root(&self) -> PathBuf {
        self.output.path().join("outputs")
    }

    /// Entries left in the scratch root; every run removes its own.
    fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.output.path().join("scratch"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn harness(pool: &PgPool, script: Script) -> Harness {
    harness_with_media(pool, script, FakeMedia::default())
}

fn harness_with_media(pool: &PgPool, script: Script, media: FakeMedia) -> Harness {
    let output = tempfile::tempdir().unwrap();
    let inference = FakeInference::new(script);
    let media = Arc::new(media);
    let bus = Arc::new(ProgressBus::default());
    let config = PipelineConfig {
        output_dir: output.path().join("outputs"),
        scratch_dir: output.path().join("scratch"),
        ..PipelineConfig::default()
    };
    let ctx = PipelineContext::new(pool.clone(), inference.clone(), bus.clone(), config)
        .with_media(media.clone());
    Harness {
        pipeline: Pipeline::new(ctx),
        inference,
        media,
        bus,
        output,
    }
}

/// Drain buffered progress percents, asserting they never go backwards.
async fn monotonic_percents(events: &mut JobSubscription) -> Vec<i16> {
    let mut percents = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(50), events.recv()).await
    {
        if event.kind != ProgressEventKind::Progress {
            continue;
        }
        let percent = event.percent.unwrap_or_default();
        if let Some(&last) = percents.last() {
            assert!(percent >= last, "{percent} < {last}");
        }
        percents.push(percent);
    }
    percents
}

async fn project(pool: &PgPool) -> i64 {
    ProjectRepo::create(
        pool,
        &CreateProject {
            name: "Lighthouse".into(),
            resolution: "832x480".into(),
            fps: None,
            upscale_multiplier: None,
        },
    )
    .await
    .unwrap()
    .id
}

async fn pending_clip(pool: &PgPool, project_id: i64, mode: &str) -> Clip {
    ClipRepo::create_pending(
        pool,
        &CreateClip {
            project_id,
            order_index: 0,
            prompt: "a lighthouse at dusk, waves crashing".into(),
            negative_prompt: String::new(),
            steps: 20,
            cfg_scale: 5.0,
            seed: 42,
            reference_image: None,
            adapter_weight: None,
            model_id: "wan".into(),
            mode: mode.into(),
            width: None,
            height: None,
            fps: None,
        },
        None,
    )
    .await
    .unwrap()
}

/// A completed clip whose output file exists under the harness output root.
async fn completed_clip(h: &Harness, pool: &PgPool, project_id: i64, name: &str) -> Clip {
    let clip = pending_clip(pool, project_id, "text_to_video").await;
    ClipRepo::transition(pool, clip.id, ClipStatus::Pending, ClipStatus::Processing)
        .await
        .unwrap();
    let dir = h.output_root().join("clips");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), b"rendered").unwrap();
    let output = ClipOutput {
        output_path: format!("clips/{name}"),
        output_name: name.into(),
        thumbnail_path: None,
        thumbnail_name: None,
        duration_sec: 5.0625,
        frame_count: 81,
        width: 832,
        height: 480,
        fps: 16,
    };
    ClipRepo::complete(pool, clip.id, &output).await.unwrap().unwrap()
}

/// Submit and claim a job so it sits in `processing` like a worker's would.
async fn claimed(
    h: &Harness,
    pool: &PgPool,
    job_type: JobType,
    project_id: Option<i64>,
    settings: serde_json::Value,
    clip_ids: Vec<i64>,
) -> JobRun {
    JobRepo::submit(
        pool,
        &SubmitJob {
            project_id,
            job_type,
            settings,
            clip_ids,
        },
    )
    .await
    .unwrap();
    let job = JobRepo::claim_next(pool, job_type).await.unwrap().unwrap();
    JobRun::new(pool.clone(), h.bus.clone(), job, job_type)
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn unavailable_service_fails_generation_and_clip(pool: PgPool) {
    let h = harness(&pool, Script::Unavailable);
    let project_id = project(&pool).await;
    let clip = pending_clip(&pool, project_id, "text_to_video").await;
    let run = claimed(&h, &pool, JobType::Generate, Some(project_id), json!({}), vec![clip.id]).await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::ServiceUnavailable(_));
    assert_eq!(err.kind(), "service_unavailable");

    let clip_now = ClipRepo::find_by_id(&pool, clip.id).await.unwrap().unwrap();
    assert_eq!(clip_now.status_id, ClipStatus::Processing.id());

    let releases_before = h.inference.releases.load(Ordering::SeqCst);
    h.pipeline.on_failure(&run.job, JobType::Generate).await;
    let clip_now = ClipRepo::find_by_id(&pool, clip.id).await.unwrap().unwrap();
    assert_eq!(clip_now.status_id, ClipStatus::Failed.id());
    assert_eq!(h.inference.releases.load(Ordering::SeqCst), releases_before + 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn generation_without_artifacts_is_artifact_missing(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let clip = pending_clip(&pool, project_id, "text_to_video").await;
    let run = claimed(&h, &pool, JobType::Generate, Some(project_id), json!({}), vec![clip.id]).await;
    let mut events = h.bus.subscribe_job(run.id());

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::ArtifactMissing(_));

    let graphs = h.inference.submitted.lock().unwrap().clone();
    assert_eq!(graphs.len(), 1);
    let graph = graphs[0].as_object().unwrap();
    let sampler = graph
        .values()
        .find(|n| n["class_type"] == "KSampler")
        .expect("sampler node");
    assert_eq!(sampler["inputs"]["seed"], 42);

    // Milestones and step ticks arrive in non-decreasing order.
    let mut last = 0;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(50), events.recv()).await
    {
        assert_eq!(event.kind, ProgressEventKind::Progress);
        let percent = event.percent.unwrap_or_default();
        assert!(percent >= last, "{percent} < {last}");
        last = percent;
    }
    assert!(last >= 15);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn image_mode_without_reference_is_rejected(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let clip = pending_clip(&pool, project_id, "image_to_video").await;
    let run = claimed(&h, &pool, JobType::Generate, Some(project_id), json!({}), vec![clip.id]).await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg.contains("reference image"));
    assert!(h.inference.submitted.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn cancelled_generation_stops_before_submit(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let clip = pending_clip(&pool, project_id, "text_to_video").await;
    let run = claimed(&h, &pool, JobType::Generate, Some(project_id), json!({}), vec![clip.id]).await;
    assert_eq!(
        JobRepo::cancel(&pool, run.id()).await.unwrap(),
        Some(JobStatus::Processing)
    );

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Cancelled);
    assert!(h.inference.submitted.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn generating_a_clip_twice_is_rejected(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let clip = pending_clip(&pool, project_id, "text_to_video").await;
    ClipRepo::transition(&pool, clip.id, ClipStatus::Pending, ClipStatus::Processing)
        .await
        .unwrap();
    let run = claimed(&h, &pool, JobType::Generate, Some(project_id), json!({}), vec![clip.id]).await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg.contains("not pending"));
}

// ---------------------------------------------------------------------------
// Media passes and export
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn merge_needs_two_clips(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let clip = pending_clip(&pool, project_id, "text_to_video").await;
    let run = claimed(&h, &pool, JobType::Merge, Some(project_id), json!({}), vec![clip.id]).await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(_));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn merge_rejects_unfinished_clips(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let a = pending_clip(&pool, project_id, "text_to_video").await;
    let b = pending_clip(&pool, project_id, "text_to_video").await;
    let run = claimed(&h, &pool, JobType::Merge, Some(project_id), json!({}), vec![a.id, b.id]).await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg.contains("has not completed"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn upscale_reports_missing_clips(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let run = claimed(&h, &pool, JobType::Upscale, None, json!({}), vec![9999]).await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg.contains("9999"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn export_of_several_clips_requires_merge(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let a = pending_clip(&pool, project_id, "text_to_video").await;
    let b = pending_clip(&pool, project_id, "text_to_video").await;
    let run = claimed(
        &h,
        &pool,
        JobType::Export,
        Some(project_id),
        json!({"upscale": {"scale_factor": 2.0}}),
        vec![a.id, b.id],
    )
    .await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg.contains("merge"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn export_runs_each_stage_on_the_previous_output(pool: PgPool) {
    let h = harness(&pool, Script::Renders);
    let project_id = project(&pool).await;
    let a = completed_clip(&h, &pool, project_id, "a.mp4").await;
    let b = completed_clip(&h, &pool, project_id, "b.mp4").await;
    let run = claimed(
        &h,
        &pool,
        JobType::Export,
        Some(project_id),
        json!({
            "merge": {"transition": "fade"},
            "upscale": {"scale_factor": 2.0},
            "interpolate": {"target_fps": 32}
        }),
        vec![a.id, b.id],
    )
    .await;
    let mut events = h.bus.subscribe_job(run.id());

    let output = h.pipeline.handle(&run).await.unwrap();

    assert_eq!(
        h.media.calls(),
        [
            "merge_with_transition",
            "scale 1664x960",
            "interpolate 32",
            "encode",
            "thumbnail"
        ]
    );
    let path = PathBuf::from(output.output_path.unwrap());
    assert!(path.ends_with(format!("exports/export_{}.mp4", run.id())));
    assert!(path.exists());
    assert_eq!(output.result["stages"], json!(["merge", "upscale", "interpolate", "encode"]));

    let percents = monotonic_percents(&mut events).await;
    assert_eq!(percents.last(), Some(&98));
    assert_eq!(h.scratch_entries(), 0);

    let job = JobRepo::find_by_id(&pool, run.id()).await.unwrap().unwrap();
    assert_eq!(job.settings["output"]["stages"], output.result["stages"]);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn export_stage_failure_stops_the_chain_and_cleans_up(pool: PgPool) {
    let h = harness_with_media(&pool, Script::Renders, FakeMedia::failing_on("interpolate 24"));
    let project_id = project(&pool).await;
    let clip = completed_clip(&h, &pool, project_id, "a.mp4").await;
    let run = claimed(
        &h,
        &pool,
        JobType::Export,
        Some(project_id),
        json!({"upscale": {}, "interpolate": {"target_fps": 24}}),
        vec![clip.id],
    )
    .await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Execution(msg) if msg.contains("conversion failed"));
    assert_eq!(h.media.calls(), ["scale 1664x960", "interpolate 24"]);
    assert!(!h
        .output_root()
        .join(format!("exports/export_{}.mp4", run.id()))
        .exists());
    assert_eq!(h.scratch_entries(), 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn export_upscale_refuses_a_unit_project_multiplier(pool: PgPool) {
    let h = harness(&pool, Script::Renders);
    let project_id = ProjectRepo::create(
        &pool,
        &CreateProject {
            name: "Native size".into(),
            resolution: "832x480".into(),
            fps: None,
            upscale_multiplier: Some(1.0),
        },
    )
    .await
    .unwrap()
    .id;
    let clip = completed_clip(&h, &pool, project_id, "a.mp4").await;
    let run = claimed(
        &h,
        &pool,
        JobType::Export,
        Some(project_id),
        json!({"upscale": {}}),
        vec![clip.id],
    )
    .await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg.contains("greater than 1"));
    assert!(h.media.calls().is_empty());
    assert_eq!(h.scratch_entries(), 0);
}

// ---------------------------------------------------------------------------
// Long video
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn long_video_without_segments_plan_is_rejected(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let run = claimed(
        &h,
        &pool,
        JobType::LongVideo,
        Some(project_id),
        json!({"prompt": "a drifting cloud"}),
        vec![],
    )
    .await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg.contains("segment_count"));
    assert!(h.inference.submitted.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn long_video_reference_without_image_output_fails(pool: PgPool) {
    let h = harness(&pool, Script::Empty);
    let project_id = project(&pool).await;
    let run = claimed(
        &h,
        &pool,
        JobType::LongVideo,
        Some(project_id),
        json!({"prompt": "a drifting cloud", "segment_count": 2}),
        vec![],
    )
    .await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::ArtifactMissing(msg) if msg.contains("reference"));

    // Only the still-image graph was submitted.
    let graphs = h.inference.submitted.lock().unwrap().clone();
    assert_eq!(graphs.len(), 1);
    assert!(graphs[0]
        .as_object()
        .unwrap()
        .values()
        .any(|n| n["class_type"] == "SaveImage"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn long_video_with_unchainable_frame_count_submits_nothing(pool: PgPool) {
    let h = harness(&pool, Script::Renders);
    let project_id = project(&pool).await;
    let run = claimed(
        &h,
        &pool,
        JobType::LongVideo,
        Some(project_id),
        json!({"prompt": "a drifting cloud", "segment_count": 2, "frames_per_segment": 80}),
        vec![],
    )
    .await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg.contains("4n+1"));
    assert!(h.inference.submitted().is_empty());
    assert!(h.inference.uploads().is_empty());
}

/// The image each segment graph is conditioned on.
fn conditioning_image(graph: &serde_json::Value) -> String {
    graph
        .as_object()
        .unwrap()
        .values()
        .find(|n| n["class_type"] == "LoadImage")
        .and_then(|n| n["inputs"]["image"].as_str())
        .expect("LoadImage node")
        .to_string()
}

#[sqlx::test(migrations = "../db/migrations")]
async fn long_video_chains_segments_through_continuation_frames(pool: PgPool) {
    let h = harness(&pool, Script::Renders);
    let project_id = project(&pool).await;
    let run = claimed(
        &h,
        &pool,
        JobType::LongVideo,
        Some(project_id),
        json!({"prompt": "a drifting cloud", "segment_count": 3}),
        vec![],
    )
    .await;
    let mut events = h.bus.subscribe_job(run.id());

    let output = h.pipeline.handle(&run).await.unwrap();

    // The synthesized reference first, then one graph per segment.
    let graphs = h.inference.submitted();
    assert_eq!(graphs.len(), 4);
    assert!(has_node(&graphs[0], "SaveImage"));
    let uploads = h.inference.uploads();
    assert_eq!(
        uploads,
        [
            format!("long_video_{}_reference.png", run.id()),
            format!("long_video_{}_seg001_last.png", run.id()),
            format!("long_video_{}_seg002_last.png", run.id()),
        ]
    );
    for (segment, graph) in graphs[1..].iter().enumerate() {
        assert_eq!(conditioning_image(graph), uploads[segment]);
    }

    // Segments are concatenated in order.
    let concatenated = h.media.concatenated.lock().unwrap().clone();
    let names: Vec<_> = concatenated
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["segment_001.mp4", "segment_002.mp4", "segment_003.mp4"]);
    assert_eq!(
        h.media.calls().iter().filter(|c| *c == "extract_last_frame").count(),
        2
    );

    let job = JobRepo::find_by_id(&pool, run.id()).await.unwrap().unwrap();
    assert_eq!(job.clip_ids.len(), 3);
    let clips = ClipRepo::list_by_ids(&pool, &job.clip_ids).await.unwrap();
    assert!(clips.iter().all(|c| c.status_id == ClipStatus::Completed.id()));
    let order: Vec<i32> = clips.iter().map(|c| c.order_index).collect();
    assert_eq!(
        order,
        [LONG_VIDEO_ORDER_BASE, LONG_VIDEO_ORDER_BASE + 1, LONG_VIDEO_ORDER_BASE + 2]
    );
    assert_eq!(job.settings["output"]["segments"], 3);

    let path = output.output_path.clone().unwrap();
    assert!(path.ends_with(&format!("long_video_{}.mp4", run.id())));
    assert!(Path::new(&path).exists());
    assert_eq!(h.scratch_entries(), 0);

    let percents = monotonic_percents(&mut events).await;
    assert_eq!(percents.last(), Some(&98));

    // What the worker does with a successful run.
    assert!(JobRepo::complete(&pool, run.id(), &output).await.unwrap());
    run.reporter.completed(output.output_path.as_deref(), "Job completed");
    let completed = events.recv().await.unwrap();
    assert_eq!(completed.kind, ProgressEventKind::Completed);
    assert_eq!(completed.percent, Some(100));

    let job = JobRepo::find_by_id(&pool, run.id()).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(JobStatus::Completed));
    assert_eq!(job.output_path, output.output_path);
    assert_eq!(job.progress_percent, 100);
    assert_eq!(job.clip_ids.len(), 3);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_segment_keeps_the_segments_before_it(pool: PgPool) {
    // Graph 1 is the reference, so graph 3 is the second segment.
    let h = harness(&pool, Script::FailsOnSubmit(3));
    let project_id = project(&pool).await;
    let run = claimed(
        &h,
        &pool,
        JobType::LongVideo,
        Some(project_id),
        json!({"prompt": "a drifting cloud", "segment_count": 3}),
        vec![],
    )
    .await;

    let err = h.pipeline.handle(&run).await.unwrap_err();
    assert_matches!(err, PipelineError::Execution(ref msg) if msg.contains("node 3"));
    h.pipeline.on_failure(&run.job, JobType::LongVideo).await;
    assert!(JobRepo::fail(&pool, run.id(), &err.to_string()).await.unwrap());

    let job = JobRepo::find_by_id(&pool, run.id()).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(JobStatus::Failed));
    assert_eq!(job.clip_ids.len(), 1);
    let first = ClipRepo::find_by_id(&pool, job.clip_ids[0]).await.unwrap().unwrap();
    assert_eq!(first.status_id, ClipStatus::Completed.id());
    assert_eq!(first.order_index, LONG_VIDEO_ORDER_BASE);

    assert!(!h.media.calls().iter().any(|c| c == "concat"));
    assert_eq!(h.scratch_entries(), 0);
}
