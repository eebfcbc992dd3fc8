//! Error types for the orchestration domain.

use shale_core::{JobId, NodeId, ReplicaPartitionId, TaskId};

/// The result type used throughout shale-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration and recovery operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Job decomposition failed to produce a usable job record.
    #[error("job decomposition failed: {message}")]
    DecompositionFailed {
        /// Description of the failure.
        message: String,
    },

    /// A task type tag has no registered runner.
    #[error("no runner registered for task type {task_type}")]
    UnknownTaskType {
        /// Label of the unmapped task type.
        task_type: String,
    },

    /// A task observed a cancellation request and aborted.
    #[error("task {task_id} canceled")]
    TaskCanceled {
        /// The canceled task.
        task_id: TaskId,
    },

    /// A task runner failed.
    #[error("task execution failed: {message}")]
    TaskExecutionFailed {
        /// Description of the failure.
        message: String,
    },

    /// A parameter blob could not be decoded.
    #[error("parameter decode error: {message}")]
    ParamDecode {
        /// Description of the decode failure.
        message: String,
    },

    /// No healthy source exists to recover a damaged partition from.
    #[error("no recovery source for partition {partition_id}: {message}")]
    NoRecoverySource {
        /// The damaged partition.
        partition_id: ReplicaPartitionId,
        /// Why no source qualified.
        message: String,
    },

    /// A repartition manifest was published twice for one source node.
    #[error("repartition manifest for job {job_id} already published by node {node_id}")]
    ManifestAlreadyPublished {
        /// The job whose manifest was written.
        job_id: JobId,
        /// The publishing source node.
        node_id: NodeId,
    },

    /// A column file read or write failed.
    #[error("column io error: {message}")]
    ColumnIo {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A node-to-node transfer failed.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// An error from shale-core (repository, entity invariants).
    #[error("core error: {0}")]
    Core(#[from] shale_core::Error),
}

impl Error {
    /// Creates a new decomposition error.
    #[must_use]
    pub fn decomposition(message: impl Into<String>) -> Self {
        Self::DecompositionFailed {
            message: message.into(),
        }
    }

    /// Creates a new parameter decode error.
    #[must_use]
    pub fn param_decode(message: impl Into<String>) -> Self {
        Self::ParamDecode {
            message: message.into(),
        }
    }

    /// Creates a new column io error.
    #[must_use]
    pub fn column_io(message: impl Into<String>) -> Self {
        Self::ColumnIo {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new column io error with a source.
    #[must_use]
    pub fn column_io_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ColumnIo {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns true if this error is a cooperative cancellation, not a
    /// genuine failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::TaskCanceled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_task_type_display() {
        let err = Error::UnknownTaskType {
            task_type: "repartition".into(),
        };
        assert!(err.to_string().contains("repartition"));
    }

    #[test]
    fn cancellation_is_not_a_failure() {
        let err = Error::TaskCanceled {
            task_id: TaskId::new(4),
        };
        assert!(err.is_cancellation());
        assert!(!Error::transport("boom").is_cancellation());
    }

    #[test]
    fn core_error_wraps() {
        let core = shale_core::Error::not_found("job", 1);
        let err: Error = core.into();
        assert!(err.to_string().contains("core error"));
    }
}
