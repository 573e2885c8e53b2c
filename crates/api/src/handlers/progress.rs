//! Server-sent progress stream for one job.
//!
//! The first frame is always `{"type":"connected"}`. A job that already
//! finished gets its terminal event replayed from the store; otherwise
//! bus events are forwarded until a terminal one, after which the stream
//! closes with a short delay so the client sees the final frame.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use reelforge_core::job_events::STREAM_CLOSE_DELAY_MS;
use reelforge_core::types::DbId;
use reelforge_db::models::job::Job;
use reelforge_db::models::status::JobStatus;
use reelforge_events::{JobSubscription, ProgressEvent, ProgressEventKind};
use reelforge_worker::runner::CANCELLED_MESSAGE;

use super::jobs::find_job;
use crate::error::AppResult;
use crate::state::AppState;

const STREAM_BUFFER: usize = 32;

/// GET /api/v1/jobs/{id}/progress
pub async fn stream(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Response> {
    // Subscribe before reading the row so no event falls between the two.
    let subscription = state.bus.subscribe_job(job_id);
    let job = find_job(&state.pool, job_id).await?;

    let (tx, rx) = mpsc::channel::<String>(STREAM_BUFFER);
    tokio::spawn(forward(job, subscription, tx));

    let stream = ReceiverStream::new(rx).map(|frame| Ok::<_, Infallible>(Event::default().data(frame)));
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// Feed one client until the job ends or the client goes away.
async fn forward(job: Job, mut subscription: JobSubscription, tx: mpsc::Sender<String>) {
    let job_id = job.id;
    if !send(&tx, &ProgressEvent::connected(job_id)).await {
        return;
    }

    if let Some(terminal) = terminal_event(&job) {
        send(&tx, &terminal).await;
        close_after_delay().await;
        return;
    }
    if let Some(snapshot) = snapshot_event(&job) {
        if !send(&tx, &snapshot).await {
            return;
        }
    }

    while let Some(event) = subscription.recv().await {
        let terminal = event.kind.is_terminal();
        if !send(&tx, &event).await {
            tracing::debug!(job_id, "Progress client disconnected");
            return;
        }
        if terminal {
            close_after_delay().await;
            return;
        }
    }
}

/// Serialize and push one frame. `false` once the client is gone.
async fn send(tx: &mpsc::Sender<String>, event: &ProgressEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(frame) => tx.send(frame).await.is_ok(),
        Err(e) => {
            tracing::error!(job_id = event.job_id, error = %e, "Failed to serialize progress event");
            true
        }
    }
}

async fn close_after_delay() {
    tokio::time::sleep(Duration::from_millis(STREAM_CLOSE_DELAY_MS)).await;
}

/// Terminal event reconstructed from a finished job row.
fn terminal_event(job: &Job) -> Option<ProgressEvent> {
    match job.status()? {
        JobStatus::Completed => {
            let mut event = ProgressEvent::new(ProgressEventKind::Completed, job.id);
            event.percent = Some(100);
            event.message = Some("Job completed".to_string());
            event.output_path = job.output_path.clone();
            Some(event)
        }
        JobStatus::Failed => {
            let mut event = ProgressEvent::new(ProgressEventKind::Error, job.id);
            event.error = Some(
                job.error_message
                    .clone()
                    .unwrap_or_else(|| "Job failed".to_string()),
            );
            Some(event)
        }
        JobStatus::Cancelled => {
            let mut event = ProgressEvent::new(ProgressEventKind::Error, job.id);
            event.error = Some(CANCELLED_MESSAGE.to_string());
            Some(event)
        }
        JobStatus::Pending | JobStatus::Processing => None,
    }
}

/// Last persisted progress of a running job, so late subscribers start
/// from where the job is rather than from zero.
fn snapshot_event(job: &Job) -> Option<ProgressEvent> {
    if job.progress_percent <= 0 {
        return None;
    }
    let mut event = ProgressEvent::new(ProgressEventKind::Progress, job.id);
    event.percent = Some(job.progress_percent);
    event.message = job.progress_message.clone();
    Some(event)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn job(status: JobStatus) -> Job {
        Job {
            id: 7,
            project_id: None,
            job_type: "merge".to_string(),
            status_id: status.id(),
            progress_percent: 0,
            progress_message: None,
            settings: serde_json::json!({}),
            clip_ids: vec![1, 2],
            result: None,
            output_path: None,
            output_file_name: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn finished_jobs_replay_their_terminal_event() {
        let mut done = job(JobStatus::Completed);
        done.output_path = Some("merges/merge_7.mp4".into());
        let event = terminal_event(&done).unwrap();
        assert_eq!(event.kind, ProgressEventKind::Completed);
        assert_eq!(event.percent, Some(100));
        assert_eq!(event.output_path.as_deref(), Some("merges/merge_7.mp4"));

        let mut failed = job(JobStatus::Failed);
        failed.error_message = Some("ffmpeg exited 1".into());
        assert_eq!(
            terminal_event(&failed).unwrap().error.as_deref(),
            Some("ffmpeg exited 1")
        );

        let cancelled = terminal_event(&job(JobStatus::Cancelled)).unwrap();
        assert_eq!(cancelled.error.as_deref(), Some(CANCELLED_MESSAGE));
    }

    #[test]
    fn running_jobs_have_no_terminal_event() {
        assert!(terminal_event(&job(JobStatus::Pending)).is_none());
        assert!(terminal_event(&job(JobStatus::Processing)).is_none());
    }

    #[test]
    fn snapshot_only_once_progress_exists() {
        let mut running = job(JobStatus::Processing);
        assert!(snapshot_event(&running).is_none());
        running.progress_percent = 42;
        running.progress_message = Some("Merging clips".into());
        let snapshot = snapshot_event(&running).unwrap();
        assert_eq!(snapshot.percent, Some(42));
        assert_eq!(snapshot.kind, ProgressEventKind::Progress);
    }
}
