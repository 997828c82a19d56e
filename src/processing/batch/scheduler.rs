//! Budget-gated worker pool running the Jobs of one batch.
//!
//! Each worker is a tokio task that repeatedly admits the next Pending Job
//! whose estimate fits the free budget, runs its actions on the blocking pool
//! and releases the reservation. Workers never wait on each other, only on a
//! budget release.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use crate::core::{
    BatchId, BatchReport, BatchState, Job, JobId, JobOutcome, JobReport, JobState, ProgressBus,
    QueueSnapshot, SourceItem,
};
use crate::processing::cache::{CacheKey, ResultCache};
use crate::processing::media::IntermediateResult;
use crate::processing::transform::Transform;
use crate::utils::{FileIo, OutputSettings, TransformError};
use super::estimate::estimate_peak_bytes;
use super::metrics::BudgetTracker;

/// Collaborators a batch run borrows from its engine.
#[derive(Clone)]
pub struct RunContext {
    pub transform: Arc<dyn Transform>,
    pub io: Arc<dyn FileIo>,
    pub cache: Arc<ResultCache>,
    pub bus: ProgressBus,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
struct JobRecord {
    state: JobState,
    outcome: Option<JobOutcome>,
}

struct RunState {
    /// Indices of Pending jobs in submission order
    pending: VecDeque<usize>,
    budget: BudgetTracker,
    records: Vec<JobRecord>,
    finished: usize,
    final_state: Option<BatchState>,
    /// Output paths already taken by a Job of this run
    claimed_outputs: HashSet<PathBuf>,
}

enum Admission {
    Run(usize),
    Wait,
    Done,
}

/// Shared state of one batch run.
pub struct BatchRun {
    id: BatchId,
    jobs: Vec<Job>,
    ctx: RunContext,
    /// Set when the snapshot's referenced files could not be loaded; fails every Job
    setup_error: Option<TransformError>,
    state: Mutex<RunState>,
    cancelled: AtomicBool,
    budget_released: Notify,
    finished: Notify,
    started: Instant,
    worker_count: usize,
}

/// Worker count: min(parallelism, available CPUs, budget / average estimate), at least 1
fn worker_count(parallelism: usize, budget_bytes: u64, jobs: &[Job]) -> usize {
    let cpus = num_cpus::get().max(1);
    let mut count = parallelism.max(1).min(cpus);
    if !jobs.is_empty() {
        let total: u64 = jobs.iter().map(|job| job.estimate_bytes).sum();
        let average = (total / jobs.len() as u64).max(1);
        let by_budget = (budget_bytes / average).max(1);
        count = count.min(usize::try_from(by_budget).unwrap_or(usize::MAX));
        count = count.min(jobs.len());
    }
    count.max(1)
}

impl BatchRun {
    fn new(
        sources: Vec<SourceItem>,
        snapshot: QueueSnapshot,
        memory_budget_bytes: u64,
        parallelism: usize,
        ctx: RunContext,
    ) -> Self {
        let id = BatchId::new();
        let (snapshot, setup_error) = match snapshot.bind_assets(ctx.io.as_ref()) {
            Ok(bound) => (bound, None),
            Err(error) => {
                warn!("Cannot load files referenced by the queue: {}", error);
                (snapshot, Some(error))
            }
        };
        let jobs: Vec<Job> = sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| Job {
                estimate_bytes: estimate_peak_bytes(&source, snapshot.steps()),
                id: JobId { batch: id, index },
                source,
                snapshot: snapshot.clone(),
            })
            .collect();

        let records = vec![JobRecord { state: JobState::Pending, outcome: None }; jobs.len()];
        let worker_count = worker_count(parallelism, memory_budget_bytes, &jobs);

        Self {
            id,
            state: Mutex::new(RunState {
                pending: (0..jobs.len()).collect(),
                budget: BudgetTracker::new(memory_budget_bytes),
                records,
                finished: 0,
                final_state: None,
                claimed_outputs: HashSet::new(),
            }),
            jobs,
            ctx,
            setup_error,
            cancelled: AtomicBool::new(false),
            budget_released: Notify::new(),
            finished: Notify::new(),
            started: Instant::now(),
            worker_count,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Picks the next Job to start, under the state lock
    fn try_admit(&self) -> Admission {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if self.is_cancelled() {
            self.cancel_pending_locked(state);
            return Admission::Done;
        }
        if let Some(error) = &self.setup_error {
            while let Some(index) = state.pending.pop_front() {
                self.finish_locked(state, index, JobOutcome::Failed { error: error.clone() }, 0);
            }
            return Admission::Done;
        }

        // A Job larger than the whole budget can never be admitted
        let budget = state.budget.budget();
        let (oversize, admissible): (Vec<usize>, Vec<usize>) = state
            .pending
            .iter()
            .copied()
            .partition(|&index| self.jobs[index].estimate_bytes > budget);
        if !oversize.is_empty() {
            state.pending = admissible.into();
            for index in oversize {
                let job = &self.jobs[index];
                let error = TransformError::exhausted(format!(
                    "Estimated {} bytes for {} exceeds the memory budget of {} bytes",
                    job.estimate_bytes,
                    job.source.path.display(),
                    budget
                ));
                self.finish_locked(state, index, JobOutcome::Failed { error }, 0);
            }
        }

        let position = state
            .pending
            .iter()
            .position(|&index| state.budget.fits(self.jobs[index].estimate_bytes));
        if let Some(position) = position {
            if let Some(index) = state.pending.remove(position) {
                let estimate = self.jobs[index].estimate_bytes;
                state.budget.defer(position);
                state.budget.reserve(estimate);
                state.records[index].state = JobState::Running;
                debug!(
                    "Admitted {} ({} bytes), {} skipped ahead of it",
                    self.jobs[index].source.file_name(),
                    estimate,
                    position
                );
                return Admission::Run(index);
            }
        }

        if state.pending.is_empty() {
            Admission::Done
        } else {
            Admission::Wait
        }
    }

    fn cancel_pending_locked(&self, state: &mut RunState) {
        while let Some(index) = state.pending.pop_front() {
            self.finish_locked(state, index, JobOutcome::Cancelled, 0);
        }
    }

    /// Sets the cancel flag and moves every Pending Job to Cancelled at once
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!("Cancellation requested for batch {}", self.id);
        }
        {
            let mut guard = self.state.lock();
            self.cancel_pending_locked(&mut guard);
        }
        // Idle workers exit once they see the empty queue
        self.budget_released.notify_waiters();
    }

    /// Reserves `paths` for one Job; fails if another Job of the run holds one of them
    fn claim_outputs(&self, paths: &[PathBuf]) -> Result<(), TransformError> {
        let mut state = self.state.lock();
        let mut unique = HashSet::with_capacity(paths.len());
        if let Some(taken) = paths
            .iter()
            .find(|p| state.claimed_outputs.contains(*p) || !unique.insert(*p))
        {
            return Err(TransformError::io(format!(
                "Output {} is already written by another file in this batch",
                taken.display()
            )));
        }
        state.claimed_outputs.extend(paths.iter().cloned());
        Ok(())
    }

    /// Records a terminal outcome and emits the job and batch events
    fn finish_locked(&self, state: &mut RunState, index: usize, outcome: JobOutcome, actions_done: usize) {
        let job = &self.jobs[index];
        let record = &mut state.records[index];
        let next = outcome.state();
        if !record.state.can_transition_to(next) {
            warn!("Ignoring {:?} -> {:?} for job {}", record.state, next, job.id);
            return;
        }

        record.state = next;
        let error = outcome.error().map(ToString::to_string);
        if let Some(message) = &error {
            warn!("Job failed for {}: {}", job.source.path.display(), message);
        }
        record.outcome = Some(outcome);
        state.finished += 1;

        let total = self.jobs.len();
        self.ctx.bus.job_finished(job.id, next, actions_done, job.action_count(), error);
        self.ctx.bus.batch_progress(self.id, BatchState::Running, state.finished, total);

        if state.finished == total {
            self.finalize_locked(state);
        }
    }

    fn finalize_locked(&self, state: &mut RunState) {
        let final_state = if self.is_cancelled() { BatchState::Cancelled } else { BatchState::Completed };
        state.final_state = Some(final_state);
        self.ctx.bus.batch_progress(self.id, final_state, state.finished, self.jobs.len());
        info!(
            "Batch {} {:?} after {:.2}s",
            self.id,
            final_state,
            self.started.elapsed().as_secs_f64()
        );
        self.finished.notify_waiters();
    }

    /// Releases the Job's reservation and records its outcome
    fn complete(&self, index: usize, outcome: JobOutcome, actions_done: usize) {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.budget.release(self.jobs[index].estimate_bytes);
            self.finish_locked(state, index, outcome, actions_done);
        }
        self.budget_released.notify_waiters();
    }

    fn report(&self) -> BatchReport {
        let state = self.state.lock();
        // Jobs still Pending or Running have no outcome yet and are left out
        let jobs: Vec<JobReport> = self
            .jobs
            .iter()
            .zip(&state.records)
            .filter_map(|(job, record)| {
                record.outcome.clone().map(|outcome| JobReport {
                    id: job.id,
                    source: job.source.path.clone(),
                    outcome,
                })
            })
            .collect();
        let count = |wanted: JobState| jobs.iter().filter(|j| j.outcome.state() == wanted).count();

        BatchReport {
            batch_id: self.id,
            state: state.final_state.unwrap_or(BatchState::Running),
            total: self.jobs.len(),
            completed: count(JobState::Completed),
            failed: count(JobState::Failed),
            cancelled: count(JobState::Cancelled),
            elapsed: self.started.elapsed(),
            memory: state.budget.snapshot(),
            jobs,
        }
    }
}

/// Runs one Job's actions in order; returns the outcome and actions completed
async fn run_job(run: Arc<BatchRun>, index: usize) -> (JobOutcome, usize) {
    let job = &run.jobs[index];
    let steps = job.snapshot.steps();
    let total = steps.len();
    let mut current: Option<IntermediateResult> = None;

    for (i, step) in steps.iter().enumerate() {
        // Cancellation is cooperative, checked at every action boundary
        if run.is_cancelled() {
            return (JobOutcome::Cancelled, i);
        }

        let key = CacheKey::new(job.source.fingerprint, step.prefix);
        let result = match run.ctx.cache.get(&key) {
            Some(hit) => {
                debug!("Cache hit for {} after {}", job.source.file_name(), step.action.name());
                Ok(hit)
            }
            None => {
                let worker_run = Arc::clone(&run);
                let input = current.take();
                let applied = tokio::task::spawn_blocking(move || -> Result<_, TransformError> {
                    let job = &worker_run.jobs[index];
                    let step = &job.snapshot.steps()[i];
                    let input = match input {
                        Some(input) => input,
                        None => decode(&worker_run.ctx, &job.source)?,
                    };
                    let output = worker_run.ctx.transform.apply(&step.action, input)?;
                    // Copy only what the cache will keep
                    if worker_run.ctx.cache.admits(output.size_bytes()) {
                        worker_run.ctx.cache.put(
                            CacheKey::new(job.source.fingerprint, step.prefix),
                            output.clone(),
                        );
                    }
                    Ok(output)
                })
                .await;
                flatten(applied)
            }
        };

        match result {
            Ok(output) => current = Some(output),
            Err(error) => return (JobOutcome::Failed { error }, i),
        }

        run.ctx.bus.action_completed(job.id, step.action.name(), i + 1, total);
    }
    if run.is_cancelled() {
        return (JobOutcome::Cancelled, total);
    }

    let worker_run = Arc::clone(&run);
    let written = tokio::task::spawn_blocking(move || -> Result<_, TransformError> {
        let job = &worker_run.jobs[index];
        let result = match current {
            Some(result) => result,
            None => decode(&worker_run.ctx, &job.source)?,
        };
        write_outputs(&worker_run, job, &result)
    })
    .await;

    match flatten(written) {
        Ok(outputs) => (JobOutcome::Completed { outputs }, total),
        Err(error) => (JobOutcome::Failed { error }, total),
    }
}

fn flatten<T>(joined: Result<Result<T, TransformError>, tokio::task::JoinError>) -> Result<T, TransformError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(TransformError::exhausted(format!("Transform worker aborted: {e}"))),
    }
}

fn decode(ctx: &RunContext, source: &SourceItem) -> Result<IntermediateResult, TransformError> {
    let bytes = ctx.io.read_source(&source.path)?;
    ctx.transform.decode(source, bytes)
}

fn write_outputs(run: &BatchRun, job: &Job, result: &IntermediateResult) -> Result<Vec<PathBuf>, TransformError> {
    let ctx = &run.ctx;
    let encoded = ctx.transform.encode(result)?;
    let multi_page = encoded.len() > 1;
    let outputs = encoded
        .iter()
        .enumerate()
        .map(|(page, output)| {
            ctx.output.resolve(
                &job.source.path,
                job.id.index + 1,
                multi_page.then_some(page + 1),
                &output.extension,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    run.claim_outputs(&outputs)?;
    for (path, output) in outputs.iter().zip(&encoded) {
        ctx.io.write_output(path, &output.bytes)?;
    }
    Ok(outputs)
}

async fn worker_loop(run: Arc<BatchRun>, worker: usize) {
    debug!("Worker {} started for batch {}", worker, run.id);
    loop {
        // Register for a release before deciding, so none is missed
        let released = run.budget_released.notified();
        match run.try_admit() {
            Admission::Run(index) => {
                let (outcome, actions_done) = run_job(Arc::clone(&run), index).await;
                run.complete(index, outcome, actions_done);
            }
            Admission::Wait => released.await,
            Admission::Done => break,
        }
    }
    debug!("Worker {} finished for batch {}", worker, run.id);
}

/// Cloneable handle to a running or finished batch.
#[derive(Clone)]
pub struct BatchRunHandle {
    run: Arc<BatchRun>,
}

impl BatchRunHandle {
    pub fn id(&self) -> BatchId {
        self.run.id
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.run.jobs.iter().map(|job| job.id).collect()
    }

    pub fn len(&self) -> usize {
        self.run.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.run.jobs.is_empty()
    }

    /// Number of workers the run was started with
    pub fn worker_count(&self) -> usize {
        self.run.worker_count
    }

    /// Requests cancellation; idempotent.
    ///
    /// Pending Jobs become Cancelled before this returns. Running Jobs stop
    /// after their current action.
    pub fn cancel(&self) {
        self.run.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.run.is_cancelled()
    }

    pub fn state(&self, job: JobId) -> Option<JobState> {
        if job.batch != self.run.id {
            return None;
        }
        self.run.state.lock().records.get(job.index).map(|r| r.state)
    }

    /// Terminal outcome of `job`, once it has one
    pub fn result(&self, job: JobId) -> Option<JobOutcome> {
        if job.batch != self.run.id {
            return None;
        }
        self.run.state.lock().records.get(job.index).and_then(|r| r.outcome.clone())
    }

    pub fn batch_state(&self) -> BatchState {
        self.run.state.lock().final_state.unwrap_or(BatchState::Running)
    }

    /// Waits for every Job to reach a terminal state
    pub async fn wait(&self) -> BatchReport {
        loop {
            let finished = self.run.finished.notified();
            if self.run.state.lock().final_state.is_some() {
                return self.run.report();
            }
            finished.await;
        }
    }

    /// Summary of the run so far
    pub fn report(&self) -> BatchReport {
        self.run.report()
    }
}

impl std::fmt::Debug for BatchRunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunHandle")
            .field("id", &self.run.id)
            .field("jobs", &self.run.jobs.len())
            .field("workers", &self.run.worker_count)
            .finish()
    }
}

/// Creates the run and spawns its workers on the current tokio runtime.
///
/// Panics if called outside a tokio runtime.
pub fn start(
    sources: Vec<SourceItem>,
    snapshot: QueueSnapshot,
    memory_budget_bytes: u64,
    parallelism: usize,
    ctx: RunContext,
) -> BatchRunHandle {
    let run = Arc::new(BatchRun::new(sources, snapshot, memory_budget_bytes, parallelism, ctx));
    info!(
        "Starting batch {} with {} jobs, {} actions, {} workers, budget {}MB",
        run.id,
        run.jobs.len(),
        run.jobs.first().map(Job::action_count).unwrap_or(0),
        run.worker_count,
        memory_budget_bytes / (1024 * 1024)
    );

    if run.jobs.is_empty() {
        let mut guard = run.state.lock();
        run.finalize_locked(&mut guard);
    } else {
        for worker in 0..run.worker_count {
            tokio::spawn(worker_loop(Arc::clone(&run), worker));
        }
    }
    BatchRunHandle { run }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_respects_every_cap() {
        let job = |estimate_bytes| Job {
            id: JobId { batch: BatchId::new(), index: 0 },
            source: SourceItem {
                path: "a.png".into(),
                fingerprint: crate::core::Fingerprint::of_bytes(b"a"),
                kind: crate::core::MediaKind::Image,
                byte_len: 1,
                dimensions: None,
            },
            snapshot: crate::core::ActionQueue::new().snapshot(),
            estimate_bytes,
        };
        let jobs: Vec<Job> = (0..8).map(|_| job(100)).collect();

        assert_eq!(worker_count(1, 10_000, &jobs), 1);
        // Budget admits two average jobs at a time
        assert_eq!(worker_count(64, 250, &jobs), 2.min(num_cpus::get()));
        // Never zero, even when nothing fits
        assert_eq!(worker_count(4, 10, &jobs), 1);
        assert_eq!(worker_count(64, u64::MAX, &jobs[..3]), 3.min(num_cpus::get()));
    }
}
