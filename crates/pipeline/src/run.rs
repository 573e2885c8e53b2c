//! The per-job handle passed to handlers, and the handler seam.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use reelforge_core::job_events::{LOG_INFO, LOG_WARN};
use reelforge_core::job_type::JobType;
use reelforge_core::types::DbId;
use reelforge_db::models::job::{Job, JobOutput};
use reelforge_db::models::job_log::NewJobLog;
use reelforge_db::models::status::JobStatus;
use reelforge_db::repositories::{ClipRepo, JobLogRepo, JobRepo};
use reelforge_db::DbPool;
use reelforge_events::{ProgressBus, ProgressReporter};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::handlers;

// ---------------------------------------------------------------------------
// JobRun
// ---------------------------------------------------------------------------

/// A claimed job together with its progress reporter.
///
/// Milestones go to the progress bus and to the job log; the log rows
/// carry the current stage and segment as structured fields.
pub struct JobRun {
    pub job: Job,
    pub job_type: JobType,
    pub reporter: ProgressReporter,
    pool: DbPool,
    position: Mutex<Position>,
}

#[derive(Default, Clone)]
struct Position {
    stage: Option<String>,
    segment: Option<(u32, u32)>,
}

impl JobRun {
    pub fn new(pool: DbPool, bus: Arc<ProgressBus>, job: Job, job_type: JobType) -> Self {
        let reporter = ProgressReporter::new(bus, job.id);
        Self {
            job,
            job_type,
            reporter,
            pool,
            position: Mutex::new(Position::default()),
        }
    }

    pub fn id(&self) -> DbId {
        self.job.id
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn set_stage(&self, stage: &str) {
        self.reporter.set_stage(stage);
        self.lock().stage = Some(stage.to_string());
    }

    pub fn set_segment(&self, segment: u32, total_segments: u32) {
        self.reporter.set_segment(segment, total_segments);
        self.lock().segment = Some((segment, total_segments));
    }

    /// Publish a progress milestone and record it in the job log.
    pub async fn milestone(&self, percent: f64, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(job_id = self.id(), percent, message = %message, "Job milestone");
        self.reporter.report(percent, message.clone());
        self.log(LOG_INFO, message).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(job_id = self.id(), message = %message, "Job warning");
        self.log(LOG_WARN, message).await;
    }

    /// Append a job log row. A failed write is logged and otherwise ignored.
    pub async fn log(&self, level: &str, message: impl Into<String>) {
        let position = self.lock().clone();
        let mut entry = NewJobLog::new(self.id(), level, message);
        if let Some(stage) = position.stage {
            entry = entry.stage(stage);
        }
        if let Some((segment, total)) = position.segment {
            entry = entry.segment(segment, total);
        }
        if let Err(e) = JobLogRepo::append(&self.pool, &entry).await {
            tracing::error!(job_id = self.id(), error = %e, "Failed to append job log");
        }
    }

    /// Fail with [`PipelineError::Cancelled`] once the job has left
    /// `processing`. Called between steps; running work is not preempted.
    pub async fn ensure_active(&self) -> Result<(), PipelineError> {
        match JobRepo::status_of(&self.pool, self.id()).await? {
            Some(status) if status == JobStatus::Processing.id() => Ok(()),
            _ => Err(PipelineError::Cancelled),
        }
    }

    /// Merge derived output metadata into the job's settings payload.
    pub async fn record_output(&self, metadata: serde_json::Value) -> Result<(), PipelineError> {
        JobRepo::merge_settings(&self.pool, self.id(), &serde_json::json!({ "output": metadata }))
            .await?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Position> {
        self.position.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Handler seam
// ---------------------------------------------------------------------------

/// Executes claimed jobs for the worker pool.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the job to completion and describe its output.
    async fn handle(&self, run: &JobRun) -> Result<JobOutput, PipelineError>;

    /// Clean-up after a failed, cancelled or timed-out run.
    async fn on_failure(&self, _job: &Job, _job_type: JobType) {}
}

/// The production handler: dispatches each job type to its pipeline.
pub struct Pipeline {
    ctx: PipelineContext,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }
}

#[async_trait]
impl JobHandler for Pipeline {
    async fn handle(&self, run: &JobRun) -> Result<JobOutput, PipelineError> {
        match run.job_type {
            JobType::Generate => handlers::generate::run(&self.ctx, run).await,
            JobType::Merge => handlers::media::merge(&self.ctx, run).await,
            JobType::Upscale => handlers::media::upscale(&self.ctx, run).await,
            JobType::Interpolate => handlers::media::interpolate(&self.ctx, run).await,
            JobType::Export => handlers::export::run(&self.ctx, run).await,
            JobType::LongVideo => handlers::long_video::run(&self.ctx, run).await,
        }
    }

    async fn on_failure(&self, job: &Job, job_type: JobType) {
        if job_type == JobType::Generate {
            match ClipRepo::fail_unfinished(&self.ctx.pool, &job.clip_ids).await {
                Ok(n) if n > 0 => tracing::info!(job_id = job.id, clips = n, "Marked clip failed"),
                Ok(_) => {}
                Err(e) => tracing::error!(job_id = job.id, error = %e, "Failed to mark clip failed"),
            }
        }
        if job_type.uses_gpu() {
            self.ctx.inference.release_memory().await;
        }
    }
}
