//! Start-up and shutdown of the per-type queue workers.

use std::sync::Arc;
use std::time::Duration;

use reelforge_db::{DbPool, QueueLock};
use reelforge_events::ProgressBus;
use reelforge_pipeline::{JobHandler, JobTimeouts};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::dispatcher::QueueWorker;
use crate::notifier::JobNotifier;
use crate::runner::JobRunner;

/// A running set of queue workers, one task per job type.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn one queue worker per configured job type.
    ///
    /// Each queue this process can lock has its interrupted jobs failed
    /// before its worker starts. Queues locked by another process are left
    /// alone; their workers wait to take over.
    pub async fn start(
        pool: DbPool,
        bus: Arc<ProgressBus>,
        handler: Arc<dyn JobHandler>,
        timeouts: JobTimeouts,
        notifier: &JobNotifier,
        config: &WorkerConfig,
    ) -> Result<Self, sqlx::Error> {
        let cancel = CancellationToken::new();
        let runner = JobRunner::new(pool.clone(), bus, handler, timeouts);
        let mut handles = Vec::with_capacity(config.job_types.len());

        for &job_type in &config.job_types {
            let mut worker = QueueWorker::new(
                job_type,
                pool.clone(),
                runner.clone(),
                notifier.waiter(job_type),
                config.poll_interval,
            );
            match QueueLock::try_acquire(&pool, job_type).await? {
                Some(lock) => {
                    runner.recover_interrupted(job_type).await?;
                    worker = worker.with_lock(lock);
                }
                None => {
                    tracing::warn!(job_type = %job_type, "Queue is served by another process; standing by");
                }
            }
            let token = cancel.child_token();
            handles.push(tokio::spawn(async move { worker.run(token).await }));
        }

        tracing::info!(queues = config.job_types.len(), "Worker pool started");
        Ok(Self { cancel, handles })
    }

    /// Stop claiming new jobs and wait for in-flight ones to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Queue worker task panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }

    /// [`shutdown`](Self::shutdown), giving in-flight jobs at most `grace`.
    ///
    /// Returns `false` when jobs were still running at the deadline. Their
    /// rows stay `processing` until the next owner of the queue fails them.
    pub async fn shutdown_within(self, grace: Duration) -> bool {
        if tokio::time::timeout(grace, self.shutdown()).await.is_ok() {
            return true;
        }
        tracing::warn!(
            grace_secs = grace.as_secs(),
            "Queue workers did not stop in time; unfinished jobs are failed by the next queue owner"
        );
        false
    }
}
