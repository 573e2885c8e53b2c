//! Per-job progress producer.

use std::sync::{Arc, Mutex, MutexGuard};

use reelforge_core::progress::to_persisted_percent;
use reelforge_core::types::DbId;

use crate::bus::{ProgressBus, ProgressEvent, ProgressEventKind};

/// Publishes a single job's progress onto the [`ProgressBus`].
///
/// Percent is monotonically non-decreasing and capped at 99 until
/// [`completed`](Self::completed), which always carries 100. Exactly one
/// terminal event is published; anything reported after it is dropped.
///
/// The reporter is `Sync` so it can be borrowed by the `Fn` callbacks the
/// inference client and media tool invoke.
pub struct ProgressReporter {
    bus: Arc<ProgressBus>,
    job_id: DbId,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    percent: i16,
    message: Option<String>,
    stage: Option<String>,
    segment: Option<(u32, u32)>,
    finished: bool,
}

impl ProgressReporter {
    pub fn new(bus: Arc<ProgressBus>, job_id: DbId) -> Self {
        Self {
            bus,
            job_id,
            state: Mutex::new(State::default()),
        }
    }

    pub fn job_id(&self) -> DbId {
        self.job_id
    }

    /// Last published percent.
    pub fn percent(&self) -> i16 {
        self.lock().percent
    }

    /// Stage name attached to subsequent events.
    pub fn set_stage(&self, stage: &str) {
        self.lock().stage = Some(stage.to_string());
    }

    /// Segment position attached to subsequent events.
    pub fn set_segment(&self, segment: u32, total_segments: u32) {
        self.lock().segment = Some((segment, total_segments));
    }

    /// Publish a milestone.
    pub fn report(&self, percent: f64, message: impl Into<String>) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        state.percent = to_persisted_percent(percent).max(state.percent);
        state.message = Some(message.into());
        let event = self.progress_event(&state);
        drop(state);
        self.bus.publish(event);
    }

    /// Publish sub-progress, only when the whole percent actually rises.
    pub fn tick(&self, percent: f64) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        let next = to_persisted_percent(percent);
        if next <= state.percent {
            return;
        }
        state.percent = next;
        let event = self.progress_event(&state);
        drop(state);
        self.bus.publish(event);
    }

    /// Publish the terminal success event at 100%.
    pub fn completed(&self, output_path: Option<&str>, message: impl Into<String>) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        state.percent = 100;
        let mut event = ProgressEvent::new(ProgressEventKind::Completed, self.job_id);
        event.percent = Some(100);
        event.message = Some(message.into());
        event.output_path = output_path.map(str::to_string);
        apply_context(&mut event, &state);
        drop(state);
        self.bus.publish(event);
    }

    /// Publish the terminal failure event.
    pub fn error(&self, error: &str) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        let mut event = ProgressEvent::new(ProgressEventKind::Error, self.job_id);
        event.percent = Some(state.percent);
        event.error = Some(error.to_string());
        apply_context(&mut event, &state);
        drop(state);
        self.bus.publish(event);
    }

    fn progress_event(&self, state: &State) -> ProgressEvent {
        let mut event = ProgressEvent::new(ProgressEventKind::Progress, self.job_id);
        event.percent = Some(state.percent);
        event.message = state.message.clone();
        apply_context(&mut event, state);
        event
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply_context(event: &mut ProgressEvent, state: &State) {
    event.stage = state.stage.clone();
    if let Some((segment, total)) = state.segment {
        event.segment = Some(segment);
        event.total_segments = Some(total);
    }
}
