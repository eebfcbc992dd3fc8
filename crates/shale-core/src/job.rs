//! Job records.
//!
//! A job is the durable record of one high-level operation (merge,
//! recovery, import). It is created by the job controller that owns it,
//! mutated only by that controller, and never deleted by the core.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::JobId;
use crate::status::RunStatus;

/// High-level operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Merge partitions that share a replica scheme.
    Merge,
    /// Rebuild damaged replica partitions.
    Recovery,
    /// Bulk-load external data into a new fracture.
    Import,
}

impl JobType {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Recovery => "recovery",
            Self::Import => "import",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "MERGE"),
            Self::Recovery => write!(f, "RECOVERY"),
            Self::Import => write!(f, "IMPORT"),
        }
    }
}

/// Durable record of one high-level operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier (zero until inserted).
    pub id: JobId,
    /// Operation kind.
    pub job_type: JobType,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Human-readable description.
    pub description: String,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// When execution started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When a finished status was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// First error message observed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_messages: Option<String>,
    /// Opaque serialized parameters; layout is owned by the job type.
    #[serde(with = "blob")]
    pub params: Bytes,
}

impl Job {
    /// Creates a new unstarted job record with an unassigned id.
    #[must_use]
    pub fn new(job_type: JobType, description: impl Into<String>, params: Bytes) -> Self {
        Self {
            id: JobId::UNASSIGNED,
            job_type,
            status: RunStatus::Created,
            description: description.into(),
            progress: 0.0,
            started_at: None,
            finished_at: None,
            error_messages: None,
            params,
        }
    }

    /// Returns true if the job has reached a finished status.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.status.is_finished()
    }
}

pub(crate) mod blob {
    //! Serde adapter storing opaque parameter blobs as byte arrays.

    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let raw = Vec::<u8>::deserialize(deserializer)?;
        Ok(Bytes::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_unassigned_and_created() {
        let job = Job::new(JobType::Recovery, "recover replica 4", Bytes::new());
        assert!(job.id.is_unassigned());
        assert_eq!(job.status, RunStatus::Created);
        assert_eq!(job.progress, 0.0);
        assert!(!job.is_finished());
    }

    #[test]
    fn job_type_labels() {
        assert_eq!(JobType::Merge.as_label(), "merge");
        assert_eq!(JobType::Recovery.to_string(), "RECOVERY");
    }
}
