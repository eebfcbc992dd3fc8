//! Job controller: the orchestration state machine.
//!
//! One controller owns one job for its lifetime. The controller's own
//! logic is single-threaded per job: one logical task runs the job loop
//! from `RUNNING` to a finished status, whether spawned
//! ([`JobController::start_async`]) or driven on the caller's task
//! ([`JobController::start_sync`]). True parallelism exists only across
//! nodes executing task runners; the controller reaches them exclusively
//! through repository reads and writes, a shared-state polling model
//! that lets a restarted controller resume purely from repository state.
//!
//! The final status is computed by priority **ERROR > CANCELED > DONE**:
//! any observed error wins, an external stop without an error yields
//! `CANCELED`, and a clean finish forces progress to 1.0.
//!
//! Controller bookkeeping writes (progress, cancel requests, even the
//! terminal status report) are best-effort: transient repository
//! unavailability is logged and never wedges job monitoring. The one
//! unrecoverable failure is decomposition itself; a job that never got
//! an id has no record to monitor, and the error propagates to the
//! caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use shale_core::{Job, JobId, JobUpdate, MetaRepository, RunStatus, Task, TaskId, TaskUpdate};

use crate::dispatch::{TaskDispatcher, TaskEnvelope};
use crate::error::{Error, Result};
use crate::metrics::FlowMetrics;

/// Timing knobs of the controller loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobControllerConfig {
    /// Poll interval while no error has been observed.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Shortened poll interval once a task error was seen, so sibling
    /// cancellation propagates quickly without busy-polling.
    #[serde(with = "humantime_serde")]
    pub error_poll_interval: Duration,
    /// Re-check cadence inside [`JobController::stop`].
    #[serde(with = "humantime_serde")]
    pub stop_check_interval: Duration,
    /// Upper bound on how long [`JobController::stop`] blocks.
    #[serde(with = "humantime_serde")]
    pub stop_max_wait: Duration,
}

impl Default for JobControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            error_poll_interval: Duration::from_millis(500),
            stop_check_interval: Duration::from_millis(30),
            stop_max_wait: Duration::from_millis(3000),
        }
    }
}

/// A decomposed job: the created record plus its initial task records.
#[derive(Debug, Clone)]
pub struct JobPlan {
    /// The job record, inserted with a non-zero id.
    pub job: Job,
    /// Initial task records. Multi-phase drivers create further tasks
    /// during dispatch.
    pub tasks: Vec<Task>,
}

/// Job-type-specific decomposition and dispatch policy.
///
/// The controller owns the lifecycle; the driver owns what the job
/// *means*: which task records to create, which nodes get them, and how
/// their completion blends into overall progress via one or more
/// [`DispatchContext::join_tasks`] calls.
#[async_trait]
pub trait JobDriver: Send + Sync {
    /// Creates the job record and its initial tasks. Must persist both
    /// and return the job with a non-zero id.
    async fn decompose(
        &self,
        repository: &Arc<dyn MetaRepository>,
        params: Bytes,
    ) -> Result<JobPlan>;

    /// Issues tasks to nodes and monitors them to completion.
    async fn dispatch(&self, cx: &DispatchContext) -> Result<()>;
}

struct ControllerShared {
    repository: Arc<dyn MetaRepository>,
    dispatcher: Arc<dyn TaskDispatcher>,
    config: JobControllerConfig,
    metrics: FlowMetrics,
    stop: CancellationToken,
    stopped: AtomicBool,
    error_seen: AtomicBool,
    error_message: Mutex<Option<String>>,
    job_id: AtomicU64,
}

impl ControllerShared {
    fn job_id(&self) -> Option<JobId> {
        let raw = self.job_id.load(Ordering::SeqCst);
        (raw != 0).then(|| JobId::new(raw))
    }

    fn error_seen(&self) -> bool {
        self.error_seen.load(Ordering::SeqCst)
    }

    /// Records an error message; the first observer wins and later
    /// messages are dropped, not merged.
    fn record_error(&self, message: String) {
        if !self.error_seen.swap(true, Ordering::SeqCst) {
            if let Ok(mut slot) = self.error_message.lock() {
                *slot = Some(message);
            }
        }
    }

    fn first_error(&self) -> Option<String> {
        self.error_message.lock().ok().and_then(|slot| slot.clone())
    }

    /// Best-effort bookkeeping write: failures are logged, never
    /// propagated.
    fn bookkeeping<T>(&self, result: shale_core::Result<T>, what: &str) {
        if let Err(error) = result {
            tracing::warn!(job_id = ?self.job_id(), %error, "{what} failed");
        }
    }

    async fn broadcast_cancel(&self, tasks: &mut HashMap<TaskId, Task>) {
        for (task_id, snapshot) in tasks.iter_mut() {
            if snapshot.is_finished() || snapshot.status == RunStatus::CancelRequested {
                continue;
            }
            match self
                .repository
                .update_task(*task_id, TaskUpdate::status(RunStatus::CancelRequested))
                .await
            {
                Ok(()) => snapshot.status = RunStatus::CancelRequested,
                Err(error) => {
                    tracing::warn!(%task_id, %error, "cancel request write failed");
                }
            }
        }
    }

    /// The polling/aggregation loop. See the module docs for the exit
    /// asymmetry between an external stop and an internally observed
    /// error.
    async fn join_tasks(
        &self,
        tasks: &mut HashMap<TaskId, Task>,
        base_progress: f64,
        completed_progress: f64,
    ) -> Result<()> {
        let job_id = self
            .job_id()
            .ok_or_else(|| Error::decomposition("join_tasks before a job id was assigned"))?;
        let total = tasks.len();
        if total == 0 {
            self.bookkeeping(
                self.repository
                    .update_job(job_id, JobUpdate::progress(completed_progress))
                    .await,
                "progress write",
            );
            return Ok(());
        }

        loop {
            let finished = tasks.values().filter(|t| t.is_finished()).count();
            if finished == total {
                break;
            }
            if self.stop.is_cancelled() {
                // An external stop broadcasts the cancellation and
                // returns without waiting for confirmation. An internal
                // error keeps looping until every task finishes.
                self.broadcast_cancel(tasks).await;
                break;
            }

            let interval = if self.error_seen() {
                self.config.error_poll_interval
            } else {
                self.config.poll_interval
            };
            tokio::select! {
                () = sleep(interval) => {}
                () = self.stop.cancelled() => {}
            }

            let mut newly_finished = false;
            for (task_id, snapshot) in tasks.iter_mut() {
                if snapshot.is_finished() {
                    continue;
                }
                match self.repository.get_task(*task_id).await {
                    Ok(fresh) => {
                        let changed = fresh.status != snapshot.status
                            || (fresh.progress - snapshot.progress).abs() > f64::EPSILON;
                        if !changed {
                            continue;
                        }
                        *snapshot = fresh;
                        if snapshot.is_finished() {
                            newly_finished = true;
                            self.metrics
                                .record_task_finished(snapshot.task_type.as_label(), snapshot.status.as_label());
                            if snapshot.status == RunStatus::Error {
                                let message = snapshot.error_messages.clone().unwrap_or_else(|| {
                                    format!("task {task_id} failed without a message")
                                });
                                self.record_error(message);
                            }
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%task_id, %error, "task poll failed");
                    }
                }
            }

            if newly_finished {
                let finished = tasks.values().filter(|t| t.is_finished()).count();
                #[allow(clippy::cast_precision_loss)]
                let progress = base_progress
                    + (completed_progress - base_progress) * finished as f64 / total as f64;
                self.bookkeeping(
                    self.repository
                        .update_job(job_id, JobUpdate::progress(progress))
                        .await,
                    "progress write",
                );
            }

            if self.error_seen() {
                self.broadcast_cancel(tasks).await;
            }
        }
        Ok(())
    }
}

/// Execution context handed to [`JobDriver::dispatch`].
pub struct DispatchContext {
    job: Job,
    initial_tasks: Vec<Task>,
    shared: Arc<ControllerShared>,
}

impl DispatchContext {
    /// The job being executed.
    #[must_use]
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Task records created during decomposition.
    #[must_use]
    pub fn initial_tasks(&self) -> &[Task] {
        &self.initial_tasks
    }

    /// The metadata repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn MetaRepository> {
        &self.shared.repository
    }

    /// True once any task error (or dispatch failure) was observed.
    #[must_use]
    pub fn error_encountered(&self) -> bool {
        self.shared.error_seen()
    }

    /// True once a stop was requested externally.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.shared.stop.is_cancelled()
    }

    /// Marks the tasks start-requested and hands their envelopes to the
    /// dispatcher. Returns the snapshot map [`Self::join_tasks`] polls.
    ///
    /// # Errors
    ///
    /// Propagates repository and dispatch failures: a task that could
    /// not be issued will never finish, so the job must fail rather than
    /// poll forever.
    pub async fn issue(&self, tasks: &[Task]) -> Result<HashMap<TaskId, Task>> {
        let mut snapshots = HashMap::with_capacity(tasks.len());
        for task in tasks {
            self.shared
                .repository
                .update_task(task.id, TaskUpdate::status(RunStatus::StartRequested))
                .await?;
            self.shared
                .dispatcher
                .dispatch(TaskEnvelope::for_task(task))
                .await?;
            let mut snapshot = task.clone();
            snapshot.status = RunStatus::StartRequested;
            snapshots.insert(task.id, snapshot);
        }
        Ok(snapshots)
    }

    /// Polls the task map until every task finishes (or the loop exits
    /// early on an external stop), blending completion into the job's
    /// progress over `[base_progress, completed_progress)`.
    ///
    /// # Errors
    ///
    /// Only fails if called before a job id exists; task errors are
    /// recorded on the shared error state, not returned.
    pub async fn join_tasks(
        &self,
        tasks: &mut HashMap<TaskId, Task>,
        base_progress: f64,
        completed_progress: f64,
    ) -> Result<()> {
        self.shared
            .join_tasks(tasks, base_progress, completed_progress)
            .await
    }
}

/// Per-job orchestration handle.
pub struct JobController {
    driver: Arc<dyn JobDriver>,
    shared: Arc<ControllerShared>,
}

impl JobController {
    /// Creates a controller with default timing.
    #[must_use]
    pub fn new(
        repository: Arc<dyn MetaRepository>,
        dispatcher: Arc<dyn TaskDispatcher>,
        driver: Arc<dyn JobDriver>,
    ) -> Self {
        Self::with_config(repository, dispatcher, driver, JobControllerConfig::default())
    }

    /// Creates a controller with explicit timing (tests shorten every
    /// interval).
    #[must_use]
    pub fn with_config(
        repository: Arc<dyn MetaRepository>,
        dispatcher: Arc<dyn TaskDispatcher>,
        driver: Arc<dyn JobDriver>,
        config: JobControllerConfig,
    ) -> Self {
        Self {
            driver,
            shared: Arc::new(ControllerShared {
                repository,
                dispatcher,
                config,
                metrics: FlowMetrics::new(),
                stop: CancellationToken::new(),
                stopped: AtomicBool::new(false),
                error_seen: AtomicBool::new(false),
                error_message: Mutex::new(None),
                job_id: AtomicU64::new(0),
            }),
        }
    }

    /// The controlled job's id, once decomposition assigned one.
    #[must_use]
    pub fn job_id(&self) -> Option<JobId> {
        self.shared.job_id()
    }

    /// True once the job loop has exited, successfully or not.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Requests a cooperative stop. Non-blocking; no repository write.
    pub fn request_stop(&self) {
        self.shared.stop.cancel();
    }

    /// Creates the job synchronously, then runs it on a spawned task and
    /// returns immediately.
    ///
    /// # Errors
    ///
    /// Propagates decomposition failures (including a job record that
    /// never got an id).
    pub async fn start_async(&self, params: Bytes) -> Result<Job> {
        let plan = self.decompose(params).await?;
        let job = plan.job.clone();
        let shared = Arc::clone(&self.shared);
        let driver = Arc::clone(&self.driver);
        tokio::spawn(async move {
            run_job(shared, driver, plan).await;
        });
        Ok(job)
    }

    /// Identical decomposition, but the job loop runs on the caller's
    /// task; returns only after the job reached a finished status.
    ///
    /// # Errors
    ///
    /// Propagates decomposition failures and the final record read.
    pub async fn start_sync(&self, params: Bytes) -> Result<Job> {
        let plan = self.decompose(params).await?;
        let job_id = plan.job.id;
        run_job(Arc::clone(&self.shared), Arc::clone(&self.driver), plan).await;
        Ok(self.shared.repository.get_job(job_id).await?)
    }

    /// Requests a stop, eagerly (best-effort) marks the job record
    /// `CANCEL_REQUESTED`, and blocks until the job loop exits or the
    /// configured bound elapses, whichever comes first. Never a
    /// termination guarantee: on timeout a warning is logged and control
    /// returns anyway.
    pub async fn stop(&self) {
        self.request_stop();
        let job_id = self.shared.job_id();
        if let Some(job_id) = job_id {
            self.shared.bookkeeping(
                self.shared
                    .repository
                    .update_job(job_id, JobUpdate::status(RunStatus::CancelRequested))
                    .await,
                "cancel request write",
            );
        }
        let deadline = Instant::now() + self.shared.config.stop_max_wait;
        while !self.is_stopped() {
            if Instant::now() >= deadline {
                tracing::warn!(?job_id, "stop wait elapsed before the job loop exited");
                return;
            }
            sleep(self.shared.config.stop_check_interval).await;
        }
    }

    async fn decompose(&self, params: Bytes) -> Result<JobPlan> {
        let plan = self
            .driver
            .decompose(&self.shared.repository, params)
            .await?;
        if plan.job.id.is_unassigned() {
            return Err(Error::decomposition(
                "decomposition did not assign a job id",
            ));
        }
        self.shared
            .job_id
            .store(plan.job.id.as_u64(), Ordering::SeqCst);
        self.shared.bookkeeping(
            self.shared
                .repository
                .update_job(plan.job.id, JobUpdate::status(RunStatus::StartRequested))
                .await,
            "start request write",
        );
        Ok(plan)
    }
}

#[tracing::instrument(skip_all, fields(job_id = %plan.job.id, job_type = plan.job.job_type.as_label()))]
async fn run_job(shared: Arc<ControllerShared>, driver: Arc<dyn JobDriver>, plan: JobPlan) {
    let job_id = plan.job.id;
    shared.bookkeeping(
        shared
            .repository
            .update_job(job_id, JobUpdate::status(RunStatus::Running))
            .await,
        "running write",
    );

    let cx = DispatchContext {
        job: plan.job,
        initial_tasks: plan.tasks,
        shared: Arc::clone(&shared),
    };
    let outcome = std::panic::AssertUnwindSafe(driver.dispatch(&cx))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(Error::TaskExecutionFailed {
                message: "job dispatch panicked".to_string(),
            })
        });
    if let Err(error) = &outcome {
        shared.record_error(error.to_string());
    }

    let final_status = if shared.error_seen() {
        RunStatus::Error
    } else if shared.stop.is_cancelled() {
        RunStatus::Canceled
    } else {
        RunStatus::Done
    };
    let update = match final_status {
        RunStatus::Error => JobUpdate {
            status: Some(RunStatus::Error),
            error_messages: shared.first_error(),
            ..JobUpdate::default()
        },
        RunStatus::Canceled => JobUpdate::status(RunStatus::Canceled),
        _ => JobUpdate {
            status: Some(RunStatus::Done),
            progress: Some(1.0),
            ..JobUpdate::default()
        },
    };
    // A failure while reporting the final status is itself logged and
    // swallowed, never re-thrown.
    shared.bookkeeping(
        shared.repository.update_job(job_id, update).await,
        "terminal status write",
    );
    shared
        .metrics
        .record_job_finished(final_status.as_label());
    tracing::info!(status = %final_status, "job finished");
    shared.stopped.store(true, Ordering::SeqCst);
}
