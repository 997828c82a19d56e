//! Core types for batch runs, jobs and their outcomes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::utils::TransformError;

/// Identifies one BatchRun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one Job within a batch; `index` is its submission position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobId {
    pub batch: BatchId,
    pub index: usize,
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.batch, self.index)
    }
}

/// Per-job state machine: `Pending -> Running -> {Completed, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running | Self::Cancelled | Self::Failed) => true,
            (Self::Running, Self::Completed | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

/// BatchRun-level state: `Running -> {Completed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchState {
    Running,
    Completed,
    Cancelled,
}

/// Terminal result of one Job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum JobOutcome {
    /// Written artifacts; more than one when the pipeline produced several pages
    Completed { outputs: Vec<PathBuf> },
    Failed { error: TransformError },
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            Self::Completed { .. } => JobState::Completed,
            Self::Failed { .. } => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }

    /// Primary output path of a completed job
    pub fn output_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Completed { outputs } => outputs.first(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&TransformError> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Memory budget metrics for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetMetrics {
    pub budget_bytes: u64,
    /// Highest amount reserved at any one time
    pub peak_reserved_bytes: u64,
    /// Jobs admitted against the budget
    pub admissions: usize,
    /// Times a job was passed over because its estimate did not fit the free budget
    pub deferrals: usize,
}

/// Outcome of one job as shown in the batch summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub id: JobId,
    pub source: PathBuf,
    pub outcome: JobOutcome,
}

/// Summary of a finished batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub state: BatchState,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub jobs: Vec<JobReport>,
    pub elapsed: Duration,
    pub memory: BudgetMetrics,
}

impl BatchReport {
    /// `(source, error)` pairs for every failed job
    pub fn errors(&self) -> impl Iterator<Item = (&PathBuf, &TransformError)> {
        self.jobs
            .iter()
            .filter_map(|job| job.outcome.error().map(|e| (&job.source, e)))
    }
}
