//! Task dispatch abstraction.
//!
//! The controller never talks to a node directly: after creating task
//! records it hands lightweight envelopes to a [`TaskDispatcher`], and
//! from then on the task record is the only channel. The dispatch
//! mechanism itself (RPC, queue, whatever the deployment uses) is
//! external; [`memory::InMemoryDispatcher`] routes envelopes to local
//! worker loops for tests and development.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shale_core::task::TaskType;
use shale_core::{JobId, NodeId, Task, TaskId};

use crate::error::Result;

/// Envelope for a task handed to a dispatch backend.
///
/// Deliberately thin: the executing node loads the authoritative record
/// (parameters included) from the repository by task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope {
    /// The task to execute.
    pub task_id: TaskId,
    /// Owning job.
    pub job_id: JobId,
    /// Node the task is assigned to.
    pub node_id: NodeId,
    /// Task kind, for routing and logging.
    pub task_type: TaskType,
    /// When the envelope was created.
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    /// Builds the envelope for a task record.
    #[must_use]
    pub fn for_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            job_id: task.job_id,
            node_id: task.node_id,
            task_type: task.task_type,
            enqueued_at: Utc::now(),
        }
    }
}

/// Dispatch backend delivering envelopes to their assigned nodes.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Delivers one envelope to its node.
    async fn dispatch(&self, envelope: TaskEnvelope) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn envelope_carries_task_coordinates() {
        let mut task = Task::new(
            JobId::new(3),
            NodeId::new(7),
            TaskType::Repartition,
            Bytes::new(),
        );
        task.id = TaskId::new(11);

        let envelope = TaskEnvelope::for_task(&task);
        assert_eq!(envelope.task_id, TaskId::new(11));
        assert_eq!(envelope.job_id, JobId::new(3));
        assert_eq!(envelope.node_id, NodeId::new(7));
        assert_eq!(envelope.task_type, TaskType::Repartition);
    }

    #[test]
    fn envelope_serializes() {
        let task = Task::new(
            JobId::new(1),
            NodeId::new(2),
            TaskType::DeleteFiles,
            Bytes::new(),
        );
        let envelope = TaskEnvelope::for_task(&task);
        let json = serde_json::to_string(&envelope).expect("serialize");
        let parsed: TaskEnvelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.node_id, envelope.node_id);
    }
}
