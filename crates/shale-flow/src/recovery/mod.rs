//! Partition recovery protocol.
//!
//! A damaged replica partition is rebuilt from one of two sources:
//!
//! - **Buddy recovery**: another scheme in the same replica group holds
//!   a healthy partition over the identical key range (the group
//!   invariant). The buddy's files are fetched and merge-sorted into the
//!   target layout. Cheap: no repartitioning, one source partition.
//! - **Cross-group recovery**: no buddy exists, so a healthy replica in
//!   a *foreign* group (different partitioning) is repartitioned: every
//!   node holding a relevant source partition buckets its rows by the
//!   target group's partitioning column into per-range fragment files,
//!   publishes a fragment table, and the responsible node then copies,
//!   sorts, merges, and registers the fragments addressed to each
//!   damaged partition.
//!
//! Strategy selection keys off the group relationship alone; see
//! [`select_strategy`].

pub mod buddy;
pub mod manifest;
pub mod recover;
pub mod repartition;

use shale_core::{
    MetaRepository, PartitionStatus, Replica, ReplicaPartition, ReplicaSchemeId, ReplicaStatus,
};

use crate::error::{Error, Result};

/// The recovery source chosen for one damaged partition.
#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    /// A healthy same-group partition covering the identical key range.
    Buddy {
        /// The healthy source partition.
        buddy_partition: ReplicaPartition,
        /// The buddy's layout (its sort column may differ from the
        /// target's).
        buddy_scheme_id: ReplicaSchemeId,
    },
    /// A healthy replica in a foreign group; its partitioning does not
    /// align with the target ranges, so recovery goes through the
    /// repartition pipeline.
    CrossGroup {
        /// The healthy foreign-group source replica.
        source_replica: Replica,
    },
}

impl RecoveryStrategy {
    /// True for the cheap same-group path.
    #[must_use]
    pub const fn is_buddy(&self) -> bool {
        matches!(self, Self::Buddy { .. })
    }
}

/// Picks the recovery source for a damaged partition.
///
/// Buddy recovery wins whenever any scheme in the damaged partition's
/// own group holds a healthy partition at the same range index;
/// otherwise a healthy replica from any other group of the same fracture
/// is used. Only replicas of the same fracture are ever considered;
/// fractures are independent.
///
/// # Errors
///
/// Returns [`Error::NoRecoverySource`] when neither path has a healthy
/// source.
pub async fn select_strategy(
    repository: &dyn MetaRepository,
    damaged: &ReplicaPartition,
) -> Result<RecoveryStrategy> {
    let replica = repository.get_replica(damaged.replica_id).await?;
    let scheme = repository.get_replica_scheme(replica.scheme_id).await?;
    let candidates = repository.replicas_by_fracture(replica.fracture_id).await?;

    let mut foreign_source: Option<Replica> = None;
    for candidate in candidates {
        if candidate.id == replica.id {
            continue;
        }
        let candidate_scheme = repository.get_replica_scheme(candidate.scheme_id).await?;
        if candidate_scheme.group_id == scheme.group_id {
            for partition in repository.partitions_by_replica(candidate.id).await? {
                if partition.is_buddy_of(damaged)
                    && partition.status == PartitionStatus::Ok
                    && partition.node_id.is_some()
                {
                    return Ok(RecoveryStrategy::Buddy {
                        buddy_partition: partition,
                        buddy_scheme_id: candidate_scheme.id,
                    });
                }
            }
        } else if candidate.status == ReplicaStatus::Ok && foreign_source.is_none() {
            foreign_source = Some(candidate);
        }
    }

    foreign_source
        .map(|source_replica| RecoveryStrategy::CrossGroup { source_replica })
        .ok_or_else(|| Error::NoRecoverySource {
            partition_id: damaged.id,
            message: "no healthy buddy partition and no healthy foreign-group replica".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_core::{
        FractureId, InMemoryRepository, NodeId, ReplicaGroup, ReplicaGroupId, ReplicaId,
        ReplicaPartitionId, ReplicaScheme, SubPartitionSchemeId, TableId,
    };
    use shale_core::{ColumnId, Datum, KeyRange};
    use std::collections::HashMap;

    async fn scheme(
        repo: &InMemoryRepository,
        id: u64,
        group: u64,
    ) -> shale_core::Result<ReplicaScheme> {
        repo.create_replica_scheme(ReplicaScheme {
            id: ReplicaSchemeId::new(id),
            group_id: ReplicaGroupId::new(group),
            sort_column_id: ColumnId::new(1),
            compressions: HashMap::new(),
        })
        .await
    }

    async fn group(repo: &InMemoryRepository, id: u64) -> shale_core::Result<ReplicaGroup> {
        repo.create_replica_group(ReplicaGroup {
            id: ReplicaGroupId::new(id),
            table_id: TableId::new(1),
            partitioning_column_id: Some(ColumnId::new(1)),
            ranges: vec![KeyRange::new(Datum::Int64(0), Datum::Int64(100))],
            linked_group_id: None,
        })
        .await
    }

    async fn replica(
        repo: &InMemoryRepository,
        id: u64,
        scheme: u64,
        status: ReplicaStatus,
    ) -> shale_core::Result<Replica> {
        repo.create_replica(Replica {
            id: ReplicaId::new(id),
            scheme_id: ReplicaSchemeId::new(scheme),
            fracture_id: FractureId::new(1),
            status,
        })
        .await
    }

    async fn partition(
        repo: &InMemoryRepository,
        replica: u64,
        range_index: usize,
        status: PartitionStatus,
        node: Option<u64>,
    ) -> shale_core::Result<ReplicaPartition> {
        repo.create_replica_partition(ReplicaPartition {
            id: ReplicaPartitionId::UNASSIGNED,
            replica_id: ReplicaId::new(replica),
            sub_partition_scheme_id: SubPartitionSchemeId::new(1),
            range_index,
            node_id: node.map(NodeId::new),
            status,
        })
        .await
    }

    #[tokio::test]
    async fn picks_buddy_when_same_group_scheme_is_healthy() -> Result<()> {
        let repo = InMemoryRepository::new();
        group(&repo, 1).await?;
        scheme(&repo, 1, 1).await?;
        scheme(&repo, 2, 1).await?;
        replica(&repo, 1, 1, ReplicaStatus::NotReady).await?;
        replica(&repo, 2, 2, ReplicaStatus::Ok).await?;
        let damaged = partition(&repo, 1, 0, PartitionStatus::Lost, None).await?;
        partition(&repo, 2, 0, PartitionStatus::Ok, Some(3)).await?;

        let strategy = select_strategy(&repo, &damaged).await?;
        assert!(strategy.is_buddy());
        Ok(())
    }

    #[tokio::test]
    async fn falls_back_to_foreign_group() -> Result<()> {
        let repo = InMemoryRepository::new();
        group(&repo, 1).await?;
        group(&repo, 2).await?;
        scheme(&repo, 1, 1).await?;
        scheme(&repo, 3, 2).await?;
        replica(&repo, 1, 1, ReplicaStatus::NotReady).await?;
        replica(&repo, 3, 3, ReplicaStatus::Ok).await?;
        let damaged = partition(&repo, 1, 0, PartitionStatus::Lost, None).await?;
        partition(&repo, 3, 0, PartitionStatus::Ok, Some(2)).await?;

        let strategy = select_strategy(&repo, &damaged).await?;
        assert!(!strategy.is_buddy());
        Ok(())
    }

    #[tokio::test]
    async fn damaged_buddy_does_not_qualify() -> Result<()> {
        let repo = InMemoryRepository::new();
        group(&repo, 1).await?;
        scheme(&repo, 1, 1).await?;
        scheme(&repo, 2, 1).await?;
        replica(&repo, 1, 1, ReplicaStatus::NotReady).await?;
        replica(&repo, 2, 2, ReplicaStatus::NotReady).await?;
        let damaged = partition(&repo, 1, 0, PartitionStatus::Lost, None).await?;
        // Same group, same range index, but itself lost.
        partition(&repo, 2, 0, PartitionStatus::Lost, Some(3)).await?;

        let result = select_strategy(&repo, &damaged).await;
        assert!(matches!(result, Err(Error::NoRecoverySource { .. })));
        Ok(())
    }
}
