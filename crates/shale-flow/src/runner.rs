//! Task execution contract and node-side harness.
//!
//! A [`TaskRunner`] is one unit of node-local work: it reads source
//! partitions through the node's [`ColumnStore`], does its work, writes
//! output files, and reports everything through its own task record. A
//! runner never mutates another task's record.
//!
//! Cancellation is cooperative: runners call back into their
//! [`TaskProbe`] at least once per bounded chunk of rows. The probe
//! reports progress and aborts with [`Error::TaskCanceled`] as soon as a
//! cancellation request is observed on the task record.
//!
//! The [`TaskExecutor`] harness is what a node embeds: it instantiates
//! the runner from the registry, drives it, and maps the outcome onto the
//! task record; a failure becomes an error message and terminal `ERROR`
//! status, never a crash of the hosting process.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use shale_core::{
    MetaRepository, NodeId, RunStatus, TaskId, TaskUpdate,
};

use crate::column_io::ColumnStore;
use crate::error::{Error, Result};
use crate::paths::DataPaths;
use crate::recovery::manifest::ManifestStore;
use crate::registry::TaskRegistry;
use crate::transport::NodeTransport;

/// Rows processed between two cancellation checkpoints.
pub const CANCEL_CHECK_ROWS: u64 = 100_000;

/// Node-local execution context shared by every runner on a node.
#[derive(Clone)]
pub struct NodeContext {
    /// The executing node.
    pub node_id: NodeId,
    /// Metadata repository handle.
    pub repository: Arc<dyn MetaRepository>,
    /// Column file collaborator.
    pub columns: Arc<dyn ColumnStore>,
    /// Remote fetch transport.
    pub transport: Arc<dyn NodeTransport>,
    /// Repartition summary store.
    pub manifests: Arc<dyn ManifestStore>,
    /// Node-local path layout (permanent, temp, fragment areas).
    pub paths: DataPaths,
}

/// Output of a successful task run.
#[derive(Debug, Clone, Default)]
pub struct TaskOutput {
    /// Node-local relative paths of the produced files.
    pub output_paths: Vec<String>,
    /// Rows written across all outputs.
    pub rows_written: u64,
}

/// Progress reporter and cancellation checkpoint for one task.
pub struct TaskProbe {
    repository: Arc<dyn MetaRepository>,
    task_id: TaskId,
    rows_since_checkpoint: u64,
    check_interval_rows: u64,
}

impl TaskProbe {
    /// Creates a probe for a task with the default checkpoint interval.
    #[must_use]
    pub fn new(repository: Arc<dyn MetaRepository>, task_id: TaskId) -> Self {
        Self {
            repository,
            task_id,
            rows_since_checkpoint: 0,
            check_interval_rows: CANCEL_CHECK_ROWS,
        }
    }

    /// Overrides the checkpoint interval (tests use small intervals).
    #[must_use]
    pub fn with_check_interval(mut self, rows: u64) -> Self {
        self.check_interval_rows = rows.max(1);
        self
    }

    /// The task this probe reports for.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Reports progress and aborts if cancellation was requested.
    ///
    /// The progress write is best-effort: a failing repository must not
    /// wedge the runner, so write failures are logged and swallowed. The
    /// status read is not, since without it the runner could never observe a
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskCanceled`] once `CANCEL_REQUESTED` is
    /// observed, or a repository error if the status read fails.
    pub async fn checkpoint(&mut self, progress: f64) -> Result<()> {
        self.rows_since_checkpoint = 0;
        if let Err(error) = self
            .repository
            .update_task(self.task_id, TaskUpdate::progress(progress))
            .await
        {
            tracing::warn!(task_id = %self.task_id, %error, "progress write failed");
        }
        let task = self.repository.get_task(self.task_id).await?;
        if task.status == RunStatus::CancelRequested {
            return Err(Error::TaskCanceled {
                task_id: self.task_id,
            });
        }
        Ok(())
    }

    /// Row-counting wrapper: checkpoints once per configured chunk.
    ///
    /// # Errors
    ///
    /// Same as [`TaskProbe::checkpoint`].
    pub async fn tick_rows(&mut self, rows: u64, progress: f64) -> Result<()> {
        self.rows_since_checkpoint += rows;
        if self.rows_since_checkpoint >= self.check_interval_rows {
            self.checkpoint(progress).await?;
        }
        Ok(())
    }
}

/// One unit of node-local work.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Executes the task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskCanceled`] on cooperative cancellation, or
    /// any other error on failure; the harness maps both onto the task
    /// record.
    async fn run(&self, cx: &NodeContext, probe: &mut TaskProbe) -> Result<TaskOutput>;
}

/// Node-side harness executing tasks against their records.
pub struct TaskExecutor {
    cx: NodeContext,
    registry: Arc<TaskRegistry>,
}

impl TaskExecutor {
    /// Creates an executor for one node.
    #[must_use]
    pub fn new(cx: NodeContext, registry: Arc<TaskRegistry>) -> Self {
        Self { cx, registry }
    }

    /// The node this executor runs on.
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.cx.node_id
    }

    /// Executes one task to a finished status and returns that status.
    ///
    /// Every failure path ends in a terminal record write; the hosting
    /// process never sees a panic or an unrecorded failure.
    ///
    /// # Errors
    ///
    /// Returns an error only if the task record itself cannot be read.
    #[tracing::instrument(skip(self), fields(node_id = %self.cx.node_id))]
    pub async fn execute(&self, task_id: TaskId) -> Result<RunStatus> {
        let task = self.cx.repository.get_task(task_id).await?;

        // A cancellation that lands before the task starts skips the run
        // entirely.
        if task.status == RunStatus::CancelRequested {
            self.finish(task_id, RunStatus::Canceled, TaskUpdate::default())
                .await;
            return Ok(RunStatus::Canceled);
        }

        let runner = match self.registry.instantiate(task.task_type, &task.params) {
            Ok(runner) => runner,
            Err(error) => {
                let update = TaskUpdate {
                    error_messages: Some(error.to_string()),
                    ..TaskUpdate::default()
                };
                self.finish(task_id, RunStatus::Error, update).await;
                return Ok(RunStatus::Error);
            }
        };

        if let Err(error) = self
            .cx
            .repository
            .update_task(task_id, TaskUpdate::status(RunStatus::Running))
            .await
        {
            tracing::warn!(%task_id, %error, "failed to mark task running");
        }

        let mut probe = TaskProbe::new(Arc::clone(&self.cx.repository), task_id);
        let outcome = std::panic::AssertUnwindSafe(runner.run(&self.cx, &mut probe))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(Error::TaskExecutionFailed {
                    message: "task runner panicked".to_string(),
                })
            });

        let status = match outcome {
            Ok(output) => {
                let update = TaskUpdate {
                    progress: Some(1.0),
                    output_paths: Some(output.output_paths),
                    ..TaskUpdate::default()
                };
                self.finish(task_id, RunStatus::Done, update).await;
                RunStatus::Done
            }
            Err(error) if error.is_cancellation() => {
                self.finish(task_id, RunStatus::Canceled, TaskUpdate::default())
                    .await;
                RunStatus::Canceled
            }
            Err(error) => {
                tracing::warn!(%task_id, %error, "task failed");
                let update = TaskUpdate {
                    error_messages: Some(error.to_string()),
                    ..TaskUpdate::default()
                };
                self.finish(task_id, RunStatus::Error, update).await;
                RunStatus::Error
            }
        };
        Ok(status)
    }

    async fn finish(&self, task_id: TaskId, status: RunStatus, mut update: TaskUpdate) {
        update.status = Some(status);
        if let Err(error) = self.cx.repository.update_task(task_id, update).await {
            tracing::warn!(%task_id, %status, %error, "terminal task write failed");
        }
    }
}
