//! Task records.
//!
//! A task is one unit of node-local work within a job. The record is the
//! only channel between the job controller and the executing node: the
//! node reports status, progress, and outputs through it; the controller
//! writes cancellation requests into it. A task never mutates another
//! task's record.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{JobId, NodeId, TaskId};
use crate::job::blob;
use crate::status::RunStatus;

/// Node-local task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// K-way merge of pre-sorted partitions sharing a replica scheme.
    MergeSameScheme,
    /// Bucket local source rows into per-target-range fragment files.
    Repartition,
    /// Rebuild a partition from its same-group buddy.
    RecoverFromBuddy,
    /// Rebuild a partition from repartitioned foreign fragments.
    RecoverFromRepartitionedFragments,
    /// Delete node-local files.
    DeleteFiles,
}

impl TaskType {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::MergeSameScheme => "merge_same_scheme",
            Self::Repartition => "repartition",
            Self::RecoverFromBuddy => "recover_from_buddy",
            Self::RecoverFromRepartitionedFragments => "recover_from_repartitioned_fragments",
            Self::DeleteFiles => "delete_files",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Durable record of one unit of node-local work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier (zero until inserted).
    pub id: TaskId,
    /// The job this task belongs to.
    pub job_id: JobId,
    /// The node assigned to execute this task.
    pub node_id: NodeId,
    /// Task kind.
    pub task_type: TaskType,
    /// Lifecycle status (same machine as the job's).
    pub status: RunStatus,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// When execution started on the node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When a finished status was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Node-local relative paths of produced output files.
    #[serde(default)]
    pub output_paths: Vec<String>,
    /// Error message reported by the executing node, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_messages: Option<String>,
    /// Opaque serialized parameters; layout is owned by the task type.
    #[serde(with = "blob")]
    pub params: Bytes,
}

impl Task {
    /// Creates a new unstarted task record with an unassigned id.
    #[must_use]
    pub fn new(job_id: JobId, node_id: NodeId, task_type: TaskType, params: Bytes) -> Self {
        Self {
            id: TaskId::UNASSIGNED,
            job_id,
            node_id,
            task_type,
            status: RunStatus::Created,
            progress: 0.0,
            started_at: None,
            finished_at: None,
            output_paths: Vec::new(),
            error_messages: None,
            params,
        }
    }

    /// Returns true if the task has reached a finished status.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.status.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_unassigned_and_created() {
        let task = Task::new(
            JobId::new(3),
            NodeId::new(1),
            TaskType::MergeSameScheme,
            Bytes::new(),
        );
        assert!(task.id.is_unassigned());
        assert_eq!(task.job_id, JobId::new(3));
        assert_eq!(task.status, RunStatus::Created);
        assert!(task.output_paths.is_empty());
    }

    #[test]
    fn task_type_labels() {
        assert_eq!(
            TaskType::RecoverFromRepartitionedFragments.as_label(),
            "recover_from_repartitioned_fragments"
        );
        assert_eq!(TaskType::DeleteFiles.to_string(), "delete_files");
    }
}
