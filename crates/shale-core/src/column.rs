//! Column file records and compression tags.
//!
//! The encoders and decoders behind each [`CompressionType`] are external
//! collaborators; the core only carries the tag so that merges and
//! recoveries can re-encode outputs with the target scheme's layout.

use serde::{Deserialize, Serialize};

use crate::id::{ColumnFileId, ColumnId, ReplicaPartitionId};

/// Physical encoding applied to one column of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompressionType {
    /// No compression.
    None,
    /// Dictionary encoding.
    Dictionary,
    /// Run-length encoding.
    RunLength,
    /// Block compression.
    Block,
}

impl Default for CompressionType {
    fn default() -> Self {
        Self::None
    }
}

impl CompressionType {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Dictionary => "dictionary",
            Self::RunLength => "run_length",
            Self::Block => "block",
        }
    }
}

/// Registration record of one physical column file of a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnFile {
    /// Unique file identifier (zero until inserted).
    pub id: ColumnFileId,
    /// Partition this file belongs to.
    pub partition_id: ReplicaPartitionId,
    /// Logical column stored in this file.
    pub column_id: ColumnId,
    /// Node-local relative path.
    pub file_path: String,
    /// Tuples stored in the file.
    pub tuple_count: u64,
}

impl ColumnFile {
    /// Creates a new registration record with an unassigned id.
    #[must_use]
    pub fn new(
        partition_id: ReplicaPartitionId,
        column_id: ColumnId,
        file_path: impl Into<String>,
        tuple_count: u64,
    ) -> Self {
        Self {
            id: ColumnFileId::UNASSIGNED,
            partition_id,
            column_id,
            file_path: file_path.into(),
            tuple_count,
        }
    }
}
