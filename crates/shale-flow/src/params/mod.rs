//! Job and task parameter blobs.
//!
//! Every job and task type owns an opaque binary parameter layout stored
//! on its record (see [`codec`] for the field encoding rules). All types
//! round-trip exactly: `decode(encode(p)) == p` for every valid `p`,
//! including all-absent and all-present nullable fields.

pub mod codec;

use bytes::Bytes;

use shale_core::{
    ColumnId, FractureId, NodeId, ReplicaGroupId, ReplicaId, ReplicaPartitionId, ReplicaSchemeId,
};

use crate::error::Result;
use codec::{BlobReader, BlobWriter};

/// A parameter payload that can be stored on a job or task record.
pub trait ParamBlob: Sized {
    /// Serializes the parameters into their blob layout.
    fn encode(&self) -> Bytes;

    /// Parses the parameters back out of a blob.
    ///
    /// # Errors
    ///
    /// Returns a decode error on truncation, trailing bytes, or invalid
    /// field contents.
    fn decode(blob: &Bytes) -> Result<Self>;
}

fn ids_to_raw<T: Copy, F: Fn(T) -> u64>(ids: &[T], f: F) -> Vec<u64> {
    ids.iter().map(|&id| f(id)).collect()
}

/// Parameters of a same-scheme merge task: k-way merge the source
/// partitions into the target partition under the given scheme's sort
/// column and compressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSameSchemeParams {
    /// Layout governing sort column and output compressions.
    pub scheme_id: ReplicaSchemeId,
    /// Partition receiving the merged output.
    pub target_partition_id: ReplicaPartitionId,
    /// Pre-sorted input partitions, all under `scheme_id`.
    pub source_partition_ids: Vec<ReplicaPartitionId>,
    /// Logical columns of the layout, in row order.
    pub column_ids: Vec<ColumnId>,
}

impl ParamBlob for MergeSameSchemeParams {
    fn encode(&self) -> Bytes {
        let mut w = BlobWriter::new();
        w.put_u64(self.scheme_id.as_u64());
        w.put_u64(self.target_partition_id.as_u64());
        w.put_u64_array(&ids_to_raw(&self.source_partition_ids, |id: ReplicaPartitionId| {
            id.as_u64()
        }));
        w.put_u64_array(&ids_to_raw(&self.column_ids, |id: ColumnId| id.as_u64()));
        w.finish()
    }

    fn decode(blob: &Bytes) -> Result<Self> {
        let mut r = BlobReader::new(blob);
        let params = Self {
            scheme_id: ReplicaSchemeId::new(r.get_u64()?),
            target_partition_id: ReplicaPartitionId::new(r.get_u64()?),
            source_partition_ids: r
                .get_u64_array()?
                .into_iter()
                .map(ReplicaPartitionId::new)
                .collect(),
            column_ids: r.get_u64_array()?.into_iter().map(ColumnId::new).collect(),
        };
        r.expect_end()?;
        Ok(params)
    }
}

/// Parameters of a buddy recovery task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverFromBuddyParams {
    /// The damaged partition being rebuilt.
    pub partition_id: ReplicaPartitionId,
    /// The healthy same-group partition to copy from.
    pub buddy_partition_id: ReplicaPartitionId,
    /// Layout of the rebuilt partition.
    pub target_scheme_id: ReplicaSchemeId,
    /// Layout of the buddy (its sort column may differ).
    pub buddy_scheme_id: ReplicaSchemeId,
    /// Node holding the buddy; `None` when co-located with the executing
    /// node.
    pub buddy_node_id: Option<NodeId>,
    /// Logical columns, in row order.
    pub column_ids: Vec<ColumnId>,
}

impl ParamBlob for RecoverFromBuddyParams {
    fn encode(&self) -> Bytes {
        let mut w = BlobWriter::new();
        w.put_u64(self.partition_id.as_u64());
        w.put_u64(self.buddy_partition_id.as_u64());
        w.put_u64(self.target_scheme_id.as_u64());
        w.put_u64(self.buddy_scheme_id.as_u64());
        w.put_opt_u64(self.buddy_node_id.map(|id| id.as_u64()));
        w.put_u64_array(&ids_to_raw(&self.column_ids, |id: ColumnId| id.as_u64()));
        w.finish()
    }

    fn decode(blob: &Bytes) -> Result<Self> {
        let mut r = BlobReader::new(blob);
        let params = Self {
            partition_id: ReplicaPartitionId::new(r.get_u64()?),
            buddy_partition_id: ReplicaPartitionId::new(r.get_u64()?),
            target_scheme_id: ReplicaSchemeId::new(r.get_u64()?),
            buddy_scheme_id: ReplicaSchemeId::new(r.get_u64()?),
            buddy_node_id: r.get_opt_u64()?.map(NodeId::new),
            column_ids: r.get_u64_array()?.into_iter().map(ColumnId::new).collect(),
        };
        r.expect_end()?;
        Ok(params)
    }
}

/// Parameters of a repartition task: bucket local source rows by the
/// target group's partitioning column into per-range fragment files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepartitionParams {
    /// Local source partitions to read.
    pub source_partition_ids: Vec<ReplicaPartitionId>,
    /// Group whose ranges define the target buckets.
    pub target_group_id: ReplicaGroupId,
    /// Column whose values select the bucket.
    pub partitioning_column_id: ColumnId,
    /// Logical columns required by the recover phase, in row order.
    pub column_ids: Vec<ColumnId>,
}

impl ParamBlob for RepartitionParams {
    fn encode(&self) -> Bytes {
        let mut w = BlobWriter::new();
        w.put_u64_array(&ids_to_raw(&self.source_partition_ids, |id: ReplicaPartitionId| {
            id.as_u64()
        }));
        w.put_u64(self.target_group_id.as_u64());
        w.put_u64(self.partitioning_column_id.as_u64());
        w.put_u64_array(&ids_to_raw(&self.column_ids, |id: ColumnId| id.as_u64()));
        w.finish()
    }

    fn decode(blob: &Bytes) -> Result<Self> {
        let mut r = BlobReader::new(blob);
        let params = Self {
            source_partition_ids: r
                .get_u64_array()?
                .into_iter()
                .map(ReplicaPartitionId::new)
                .collect(),
            target_group_id: ReplicaGroupId::new(r.get_u64()?),
            partitioning_column_id: ColumnId::new(r.get_u64()?),
            column_ids: r.get_u64_array()?.into_iter().map(ColumnId::new).collect(),
        };
        r.expect_end()?;
        Ok(params)
    }
}

/// Parameters of a recover-from-fragments task: collect every fragment
/// addressed to the target partition, merge-sort, and register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverFragmentsParams {
    /// The damaged partition being rebuilt.
    pub partition_id: ReplicaPartitionId,
    /// Index of the partition's range in the target group's array.
    pub range_index: u32,
    /// Layout of the rebuilt partition.
    pub target_scheme_id: ReplicaSchemeId,
    /// Logical columns, in row order.
    pub column_ids: Vec<ColumnId>,
}

impl ParamBlob for RecoverFragmentsParams {
    fn encode(&self) -> Bytes {
        let mut w = BlobWriter::new();
        w.put_u64(self.partition_id.as_u64());
        w.put_u32(self.range_index);
        w.put_u64(self.target_scheme_id.as_u64());
        w.put_u64_array(&ids_to_raw(&self.column_ids, |id: ColumnId| id.as_u64()));
        w.finish()
    }

    fn decode(blob: &Bytes) -> Result<Self> {
        let mut r = BlobReader::new(blob);
        let params = Self {
            partition_id: ReplicaPartitionId::new(r.get_u64()?),
            range_index: r.get_u32()?,
            target_scheme_id: ReplicaSchemeId::new(r.get_u64()?),
            column_ids: r.get_u64_array()?.into_iter().map(ColumnId::new).collect(),
        };
        r.expect_end()?;
        Ok(params)
    }
}

/// Parameters of a file-deletion task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFilesParams {
    /// Node-local relative paths to remove.
    pub paths: Vec<String>,
}

impl ParamBlob for DeleteFilesParams {
    fn encode(&self) -> Bytes {
        let mut w = BlobWriter::new();
        w.put_string_array(&self.paths);
        w.finish()
    }

    fn decode(blob: &Bytes) -> Result<Self> {
        let mut r = BlobReader::new(blob);
        let params = Self {
            paths: r.get_string_array()?,
        };
        r.expect_end()?;
        Ok(params)
    }
}

/// One unit of a merge job: sources merged into a target on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeUnit {
    /// Partition receiving the merged output.
    pub target_partition_id: ReplicaPartitionId,
    /// Node that will execute the merge.
    pub node_id: NodeId,
    /// Pre-sorted input partitions.
    pub source_partition_ids: Vec<ReplicaPartitionId>,
}

/// Parameters of a merge job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeJobParams {
    /// Layout shared by all units.
    pub scheme_id: ReplicaSchemeId,
    /// Logical columns of the layout, in row order.
    pub column_ids: Vec<ColumnId>,
    /// Optional operator-facing note carried into the job description.
    pub description: Option<String>,
    /// The merge units, one task each.
    pub units: Vec<MergeUnit>,
}

impl ParamBlob for MergeJobParams {
    fn encode(&self) -> Bytes {
        let mut w = BlobWriter::new();
        w.put_u64(self.scheme_id.as_u64());
        w.put_u64_array(&ids_to_raw(&self.column_ids, |id: ColumnId| id.as_u64()));
        w.put_opt_string(self.description.as_deref());
        w.put_u32(u32::try_from(self.units.len()).unwrap_or(u32::MAX));
        for unit in &self.units {
            w.put_u64(unit.target_partition_id.as_u64());
            w.put_u64(unit.node_id.as_u64());
            w.put_u64_array(&ids_to_raw(&unit.source_partition_ids, |id: ReplicaPartitionId| {
                id.as_u64()
            }));
        }
        w.finish()
    }

    fn decode(blob: &Bytes) -> Result<Self> {
        let mut r = BlobReader::new(blob);
        let scheme_id = ReplicaSchemeId::new(r.get_u64()?);
        let column_ids = r.get_u64_array()?.into_iter().map(ColumnId::new).collect();
        let description = r.get_opt_string()?;
        let unit_count = r.get_u32()? as usize;
        let mut units = Vec::with_capacity(unit_count.min(1024));
        for _ in 0..unit_count {
            units.push(MergeUnit {
                target_partition_id: ReplicaPartitionId::new(r.get_u64()?),
                node_id: NodeId::new(r.get_u64()?),
                source_partition_ids: r
                    .get_u64_array()?
                    .into_iter()
                    .map(ReplicaPartitionId::new)
                    .collect(),
            });
        }
        r.expect_end()?;
        Ok(Self {
            scheme_id,
            column_ids,
            description,
            units,
        })
    }
}

/// Parameters of a recovery job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryJobParams {
    /// The fracture whose replica is damaged.
    pub fracture_id: FractureId,
    /// The replica to rebuild.
    pub replica_id: ReplicaId,
    /// Node that should own the rebuilt partitions; `None` lets the
    /// decomposition pick (the buddy's node, or the first repartition
    /// source).
    pub target_node_id: Option<NodeId>,
    /// Optional operator-facing note carried into the job description.
    pub description: Option<String>,
}

impl ParamBlob for RecoveryJobParams {
    fn encode(&self) -> Bytes {
        let mut w = BlobWriter::new();
        w.put_u64(self.fracture_id.as_u64());
        w.put_u64(self.replica_id.as_u64());
        w.put_opt_u64(self.target_node_id.map(|id| id.as_u64()));
        w.put_opt_string(self.description.as_deref());
        w.finish()
    }

    fn decode(blob: &Bytes) -> Result<Self> {
        let mut r = BlobReader::new(blob);
        let params = Self {
            fracture_id: FractureId::new(r.get_u64()?),
            replica_id: ReplicaId::new(r.get_u64()?),
            target_node_id: r.get_opt_u64()?.map(NodeId::new),
            description: r.get_opt_string()?,
        };
        r.expect_end()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_roundtrip<P: ParamBlob + PartialEq + std::fmt::Debug>(params: &P) {
        let blob = params.encode();
        let decoded = P::decode(&blob).expect("decode");
        assert_eq!(&decoded, params);
    }

    #[test]
    fn merge_same_scheme_roundtrip() {
        assert_roundtrip(&MergeSameSchemeParams {
            scheme_id: ReplicaSchemeId::new(1),
            target_partition_id: ReplicaPartitionId::new(2),
            source_partition_ids: vec![ReplicaPartitionId::new(3), ReplicaPartitionId::new(4)],
            column_ids: vec![ColumnId::new(1), ColumnId::new(2), ColumnId::new(3)],
        });
    }

    #[test]
    fn buddy_roundtrip_with_and_without_node() {
        let mut params = RecoverFromBuddyParams {
            partition_id: ReplicaPartitionId::new(10),
            buddy_partition_id: ReplicaPartitionId::new(11),
            target_scheme_id: ReplicaSchemeId::new(1),
            buddy_scheme_id: ReplicaSchemeId::new(2),
            buddy_node_id: None,
            column_ids: vec![ColumnId::new(5)],
        };
        assert_roundtrip(&params);
        params.buddy_node_id = Some(NodeId::new(3));
        assert_roundtrip(&params);
    }

    #[test]
    fn repartition_roundtrip() {
        assert_roundtrip(&RepartitionParams {
            source_partition_ids: vec![ReplicaPartitionId::new(7)],
            target_group_id: ReplicaGroupId::new(2),
            partitioning_column_id: ColumnId::new(1),
            column_ids: vec![ColumnId::new(1), ColumnId::new(2)],
        });
    }

    #[test]
    fn recover_fragments_roundtrip() {
        assert_roundtrip(&RecoverFragmentsParams {
            partition_id: ReplicaPartitionId::new(9),
            range_index: 4,
            target_scheme_id: ReplicaSchemeId::new(3),
            column_ids: vec![ColumnId::new(1), ColumnId::new(2)],
        });
    }

    #[test]
    fn delete_files_roundtrip_empty_and_populated() {
        assert_roundtrip(&DeleteFilesParams { paths: vec![] });
        assert_roundtrip(&DeleteFilesParams {
            paths: vec!["frag/j1/n2/r0-c1.frag".into(), "tmp/t3/c2.col".into()],
        });
    }

    #[test]
    fn merge_job_roundtrip_all_nullable_states() {
        let mut params = MergeJobParams {
            scheme_id: ReplicaSchemeId::new(1),
            column_ids: vec![ColumnId::new(1)],
            description: None,
            units: vec![MergeUnit {
                target_partition_id: ReplicaPartitionId::new(2),
                node_id: NodeId::new(1),
                source_partition_ids: vec![ReplicaPartitionId::new(3)],
            }],
        };
        assert_roundtrip(&params);
        params.description = Some("nightly merge".into());
        assert_roundtrip(&params);
    }

    #[test]
    fn recovery_job_roundtrip_all_nullable_states() {
        let mut params = RecoveryJobParams {
            fracture_id: FractureId::new(1),
            replica_id: ReplicaId::new(2),
            target_node_id: None,
            description: None,
        };
        assert_roundtrip(&params);
        params.target_node_id = Some(NodeId::new(4));
        params.description = Some("rack 3 failure".into());
        assert_roundtrip(&params);
    }

    #[test]
    fn decode_rejects_trailing_garbage() {
        let params = DeleteFilesParams { paths: vec![] };
        let mut raw = params.encode().to_vec();
        raw.push(0xFF);
        let blob = Bytes::from(raw);
        assert!(DeleteFilesParams::decode(&blob).is_err());
    }
}
