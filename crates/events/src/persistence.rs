//! Store-writer consumer for progress events.
//!
//! [`ProgressPersistence`] subscribes to the [`ProgressBus`](crate::bus::ProgressBus)
//! and mirrors every `progress` event into `jobs.progress_percent`. Terminal
//! state is written by the worker itself; this loop only tracks percent
//! and message. It shuts down when the bus is dropped.

use reelforge_db::repositories::JobRepo;
use reelforge_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::{ProgressEvent, ProgressEventKind};

/// Background service that persists job progress.
pub struct ProgressPersistence;

impl ProgressPersistence {
    /// Run the persistence loop until the bus closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<ProgressEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            job_id = event.job_id,
                            "Failed to persist job progress"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Later events carry a higher percent, so skipping is harmless.
                    tracing::warn!(skipped = n, "Progress persistence lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Progress bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    async fn persist(pool: &DbPool, event: &ProgressEvent) -> Result<(), sqlx::Error> {
        if event.kind != ProgressEventKind::Progress {
            return Ok(());
        }
        let Some(percent) = event.percent else {
            return Ok(());
        };
        JobRepo::update_progress(pool, event.job_id, percent, event.message.as_deref()).await
    }
}
