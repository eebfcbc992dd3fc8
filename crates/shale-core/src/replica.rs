//! Replica layout entities: groups, schemes, replicas, and partitions.
//!
//! A **replica group** fixes a partitioning column and an ordered array of
//! key ranges. Every **replica scheme** in the group lays the same rows
//! out under its own sort column and compressions, but shares the group's
//! ranges. That is what makes two schemes in one group "buddies": their
//! partitions at the same range index cover identical key ranges, so a
//! lost partition can be rebuilt from its buddy by plain copy + merge.
//!
//! A **replica** is one scheme instantiated for one fracture; a **replica
//! partition** is the smallest physically stored unit, one (replica,
//! range) pair owned by at most one node.
//!
//! Groups, schemes, and sub-partition schemes are created at table or
//! fracture creation and immutable afterward; only partition status and
//! ownership change, and only through the recovery protocol and the
//! normal write path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::column::CompressionType;
use crate::error::Result;
use crate::id::{
    ColumnId, FractureId, NodeId, ReplicaGroupId, ReplicaId, ReplicaPartitionId, ReplicaSchemeId,
    SubPartitionSchemeId, TableId,
};
use crate::status::{PartitionStatus, ReplicaStatus};
use crate::value::{validate_ranges, KeyRange};

/// A set of replica schemes sharing identical partition ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaGroup {
    /// Unique group identifier.
    pub id: ReplicaGroupId,
    /// Owning table.
    pub table_id: TableId,
    /// Column whose values the ranges partition. `None` for groups that
    /// hold a single unpartitioned range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitioning_column_id: Option<ColumnId>,
    /// Ordered, non-overlapping key ranges, one per partition.
    pub ranges: Vec<KeyRange>,
    /// Group in another table sharing these ranges, for co-partitioned
    /// joins. Acyclic by construction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_group_id: Option<ReplicaGroupId>,
}

impl ReplicaGroup {
    /// Validates the group's range array (sorted, non-overlapping,
    /// non-empty ranges).
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending range index.
    pub fn validate(&self) -> Result<()> {
        validate_ranges(&self.ranges)
    }

    /// Returns the number of partitions per replica in this group.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.ranges.len()
    }
}

/// One physical layout: a sort column plus per-column compressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaScheme {
    /// Unique scheme identifier.
    pub id: ReplicaSchemeId,
    /// Owning replica group.
    pub group_id: ReplicaGroupId,
    /// Column the partitions of this scheme are sorted by.
    pub sort_column_id: ColumnId,
    /// Per-column compression. An absent entry means no compression.
    #[serde(default)]
    pub compressions: HashMap<ColumnId, CompressionType>,
}

impl ReplicaScheme {
    /// Returns the compression configured for a column, defaulting to
    /// [`CompressionType::None`] for absent entries.
    #[must_use]
    pub fn compression_for(&self, column_id: ColumnId) -> CompressionType {
        self.compressions
            .get(&column_id)
            .copied()
            .unwrap_or(CompressionType::None)
    }
}

/// One replica scheme instantiated for one fracture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
    /// Unique replica identifier.
    pub id: ReplicaId,
    /// The layout being instantiated.
    pub scheme_id: ReplicaSchemeId,
    /// The fracture whose rows this replica holds.
    pub fracture_id: FractureId,
    /// Derived health: `NotReady` iff any partition is not healthy.
    pub status: ReplicaStatus,
}

/// The smallest physically stored unit: one (replica, range) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaPartition {
    /// Unique partition identifier.
    pub id: ReplicaPartitionId,
    /// Owning replica.
    pub replica_id: ReplicaId,
    /// The shared range definition this partition indexes into.
    pub sub_partition_scheme_id: SubPartitionSchemeId,
    /// Index into the group's range array.
    pub range_index: usize,
    /// Node physically holding the partition. `None` means not yet
    /// physically present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Partition health.
    pub status: PartitionStatus,
}

impl ReplicaPartition {
    /// Returns true if this partition and `other` cover the same key
    /// range (same shared range definition, same index).
    #[must_use]
    pub fn is_buddy_of(&self, other: &Self) -> bool {
        self.sub_partition_scheme_id == other.sub_partition_scheme_id
            && self.range_index == other.range_index
            && self.id != other.id
    }
}

/// The shared per-(fracture, group) range definition every scheme in the
/// group reuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubPartitionScheme {
    /// Unique identifier.
    pub id: SubPartitionSchemeId,
    /// The fracture these ranges slice.
    pub fracture_id: FractureId,
    /// The group whose schemes share these ranges.
    pub group_id: ReplicaGroupId,
    /// Ordered, non-overlapping key ranges.
    pub ranges: Vec<KeyRange>,
}

impl SubPartitionScheme {
    /// Validates the range array.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending range index.
    pub fn validate(&self) -> Result<()> {
        validate_ranges(&self.ranges)
    }
}
