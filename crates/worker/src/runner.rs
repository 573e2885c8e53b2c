//! The job lifecycle around one handler invocation.
//!
//! ```text
//! pending --claim--> processing --ok--> completed
//!                        |  \--err/timeout--> failed
//!                        \--cancel (API)--> cancelled
//! ```
//!
//! Exactly one terminal progress event is published per run. A job the
//! API cancelled mid-run is already `cancelled` when the handler returns,
//! so the store update is a no-op and the runner reports the cancellation.

use std::sync::Arc;

use reelforge_core::job_events::LOG_ERROR;
use reelforge_core::job_type::JobType;
use reelforge_core::types::DbId;
use reelforge_db::models::job::Job;
use reelforge_db::repositories::job_repo::INTERRUPTED_MESSAGE;
use reelforge_db::repositories::JobRepo;
use reelforge_db::DbPool;
use reelforge_events::{ProgressBus, ProgressReporter};
use reelforge_pipeline::{JobHandler, JobRun, JobTimeouts, PipelineError};

pub const CANCELLED_MESSAGE: &str = "Job was cancelled";

/// How a run ended, as recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { kind: &'static str, message: String },
    Cancelled,
}

/// Drives claimed jobs through a [`JobHandler`].
#[derive(Clone)]
pub struct JobRunner {
    pool: DbPool,
    bus: Arc<ProgressBus>,
    handler: Arc<dyn JobHandler>,
    timeouts: JobTimeouts,
}

impl JobRunner {
    pub fn new(
        pool: DbPool,
        bus: Arc<ProgressBus>,
        handler: Arc<dyn JobHandler>,
        timeouts: JobTimeouts,
    ) -> Self {
        Self {
            pool,
            bus,
            handler,
            timeouts,
        }
    }

    /// Run one claimed job to a terminal state.
    pub async fn execute(&self, job: Job, job_type: JobType) -> RunOutcome {
        let job_id = job.id;
        let ceiling = self.timeouts.for_type(job_type);
        let run = JobRun::new(self.pool.clone(), self.bus.clone(), job, job_type);
        tracing::info!(job_id, job_type = %job_type, timeout_secs = ceiling.as_secs(), "Job started");

        let result = match tokio::time::timeout(ceiling, self.handler.handle(&run)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                secs: ceiling.as_secs(),
            }),
        };

        match result {
            Ok(output) => match JobRepo::complete(&self.pool, job_id, &output).await {
                Ok(true) => {
                    run.reporter
                        .completed(output.output_path.as_deref(), "Job completed");
                    tracing::info!(job_id, job_type = %job_type, output = ?output.output_path, "Job completed");
                    RunOutcome::Completed
                }
                Ok(false) => {
                    // Cancelled after the last step check.
                    self.cancelled(&run).await
                }
                Err(e) => {
                    let err = PipelineError::from(e);
                    self.failed(&run, err).await
                }
            },
            Err(PipelineError::Cancelled) => self.cancelled(&run).await,
            Err(err) => self.failed(&run, err).await,
        }
    }

    /// Fail jobs of `job_type` left `processing` by a previous owner of the
    /// queue, publishing one error event each. Only the holder of the
    /// queue's lock may call this.
    pub async fn recover_interrupted(&self, job_type: JobType) -> Result<Vec<DbId>, sqlx::Error> {
        let interrupted = JobRepo::fail_interrupted(&self.pool, job_type).await?;
        for job_id in &interrupted {
            ProgressReporter::new(self.bus.clone(), *job_id).error(INTERRUPTED_MESSAGE);
        }
        if !interrupted.is_empty() {
            tracing::warn!(job_type = %job_type, jobs = ?interrupted, "Failed jobs interrupted by restart");
        }
        Ok(interrupted)
    }

    async fn cancelled(&self, run: &JobRun) -> RunOutcome {
        tracing::info!(job_id = run.id(), job_type = %run.job_type, "Job cancelled");
        run.reporter.error(CANCELLED_MESSAGE);
        self.handler.on_failure(&run.job, run.job_type).await;
        RunOutcome::Cancelled
    }

    async fn failed(&self, run: &JobRun, err: PipelineError) -> RunOutcome {
        let job_id = run.id();
        let kind = err.kind();
        let message = err.to_string();
        tracing::error!(job_id, job_type = %run.job_type, kind, error = %message, "Job failed");

        let recorded = match JobRepo::fail(&self.pool, job_id, &message).await {
            Ok(recorded) => recorded,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to record job failure");
                true
            }
        };
        self.handler.on_failure(&run.job, run.job_type).await;

        if !recorded {
            // The API cancelled the job while it was failing.
            run.reporter.error(CANCELLED_MESSAGE);
            return RunOutcome::Cancelled;
        }
        run.log(LOG_ERROR, format!("[{kind}] {message}")).await;
        run.reporter.error(&message);
        RunOutcome::Failed { kind, message }
    }
}
