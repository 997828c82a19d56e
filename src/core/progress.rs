use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use crate::core::{BatchId, BatchState, JobId, JobState};

/// Which state machine a progress event reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "state", rename_all = "camelCase")]
pub enum ProgressState {
    /// Per-job event; `Running` marks an action completion, terminal states end the job
    Job(JobState),
    /// Batch aggregate; `Running` after each job terminal event, then the final state
    Batch(BatchState),
}

/// Unified progress event pushed to every subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub batch_id: BatchId,
    /// Set for job-level events only
    #[serde(default)]
    pub job_id: Option<JobId>,
    /// Fraction in `0.0..=1.0`
    pub fraction_complete: f64,
    pub state: ProgressState,
    /// Action that just completed, for action-completion events
    #[serde(default)]
    pub action: Option<String>,
    /// Error message for failed jobs
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Whether this event reports one completed action of a running job
    pub fn is_action_completion(&self) -> bool {
        self.job_id.is_some() && self.state == ProgressState::Job(JobState::Running)
    }

    /// Whether this event ends a job
    pub fn is_job_terminal(&self) -> bool {
        matches!(self.state, ProgressState::Job(state) if state.is_terminal())
    }

    /// Whether this event ends the batch
    pub fn is_batch_terminal(&self) -> bool {
        matches!(
            self.state,
            ProgressState::Batch(BatchState::Completed | BatchState::Cancelled)
        )
    }

    /// Progress percentage (0-100)
    pub fn percentage(&self) -> usize {
        (self.fraction_complete.clamp(0.0, 1.0) * 100.0).round() as usize
    }
}

fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

/// Push-based progress stream shared by every batch of an engine.
///
/// Events are sent without blocking. A receiver that falls more than the channel
/// capacity behind observes `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, event: ProgressEvent) {
        // No subscribers is fine; progress is advisory
        let _ = self.sender.send(event);
    }

    pub fn action_completed(&self, job: JobId, action: &str, done: usize, total: usize) {
        self.emit(ProgressEvent {
            batch_id: job.batch,
            job_id: Some(job),
            fraction_complete: fraction(done, total),
            state: ProgressState::Job(JobState::Running),
            action: Some(action.to_string()),
            error: None,
        });
    }

    pub fn job_finished(
        &self,
        job: JobId,
        state: JobState,
        done: usize,
        total: usize,
        error: Option<String>,
    ) {
        let fraction_complete = if state == JobState::Completed { 1.0 } else { fraction(done, total) };
        self.emit(ProgressEvent {
            batch_id: job.batch,
            job_id: Some(job),
            fraction_complete,
            state: ProgressState::Job(state),
            action: None,
            error,
        });
    }

    pub fn batch_progress(&self, batch: BatchId, state: BatchState, finished: usize, total: usize) {
        self.emit(ProgressEvent {
            batch_id: batch,
            job_id: None,
            fraction_complete: fraction(finished, total),
            state: ProgressState::Batch(state),
            action: None,
            error: None,
        });
    }
}
