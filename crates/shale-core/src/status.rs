//! Lifecycle state machines for jobs, tasks, partitions, and replicas.
//!
//! Jobs and tasks share one state machine:
//!
//! ```text
//! ┌─────────┐      ┌─────────────────┐      ┌─────────┐
//! │ CREATED │─────►│ START_REQUESTED │─────►│ RUNNING │
//! └─────────┘      └─────────────────┘      └─────────┘
//!                                                │
//!                              ┌─────────────────┼──────────┬──────────┐
//!                              ▼                 ▼          ▼          │
//!                   ┌──────────────────┐     ┌──────┐   ┌───────┐      │
//!                   │ CANCEL_REQUESTED │     │ DONE │   │ ERROR │      │
//!                   └──────────────────┘     └──────┘   └───────┘      │
//!                              │                                       ▼
//!                              │                                 ┌──────────┐
//!                              └────────────────────────────────►│ CANCELED │
//!                                                                └──────────┘
//! ```
//!
//! `CANCEL_REQUESTED` is a cooperative request, not a terminal state: the
//! executing side observes it and winds down to one of the three finished
//! statuses. All three finished statuses are final.

use serde::{Deserialize, Serialize};

/// Shared job/task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Record exists, execution not yet requested.
    Created,
    /// Execution requested, not yet picked up.
    StartRequested,
    /// Actively executing.
    Running,
    /// Cooperative cancellation requested; executor has not confirmed yet.
    CancelRequested,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Error,
    /// Finished after a cancellation.
    Canceled,
}

impl RunStatus {
    /// Returns true if this is a finished (terminal) status.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Created => matches!(target, Self::StartRequested | Self::Canceled),
            Self::StartRequested => {
                matches!(target, Self::Running | Self::CancelRequested | Self::Canceled)
            }
            Self::Running => matches!(
                target,
                Self::CancelRequested | Self::Done | Self::Error | Self::Canceled
            ),
            Self::CancelRequested => matches!(target, Self::Done | Self::Error | Self::Canceled),
            Self::Done | Self::Error | Self::Canceled => false,
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::StartRequested => "start_requested",
            Self::Running => "running",
            Self::CancelRequested => "cancel_requested",
            Self::Done => "done",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::StartRequested => write!(f, "START_REQUESTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::CancelRequested => write!(f, "CANCEL_REQUESTED"),
            Self::Done => write!(f, "DONE"),
            Self::Error => write!(f, "ERROR"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Health of a single replica partition.
///
/// `Empty` is a valid terminal state for a partition that holds zero
/// tuples and zero files; it must never be conflated with `Lost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionStatus {
    /// Present and readable.
    Ok,
    /// Contains no tuples and no files.
    Empty,
    /// Physically lost; must be recovered before reads.
    Lost,
    /// A recovery task currently owns the rebuild.
    BeingRecovered,
}

impl PartitionStatus {
    /// Returns true if the partition is readable without recovery.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Ok | Self::Empty)
    }

    /// Returns true if the partition needs (or is undergoing) recovery.
    #[must_use]
    pub const fn is_damaged(&self) -> bool {
        matches!(self, Self::Lost | Self::BeingRecovered)
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Empty => "empty",
            Self::Lost => "lost",
            Self::BeingRecovered => "being_recovered",
        }
    }
}

impl std::fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Empty => write!(f, "EMPTY"),
            Self::Lost => write!(f, "LOST"),
            Self::BeingRecovered => write!(f, "BEING_RECOVERED"),
        }
    }
}

/// Health of a replica, derived from its partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicaStatus {
    /// Every partition is healthy.
    Ok,
    /// At least one partition is not healthy.
    NotReady,
}

impl ReplicaStatus {
    /// Derives the replica status from its partitions' statuses.
    #[must_use]
    pub fn from_partitions<I>(partitions: I) -> Self
    where
        I: IntoIterator<Item = PartitionStatus>,
    {
        if partitions.into_iter().all(|p| p.is_healthy()) {
            Self::Ok
        } else {
            Self::NotReady
        }
    }
}

impl std::fmt::Display for ReplicaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::NotReady => write!(f, "NOT_READY"),
        }
    }
}
