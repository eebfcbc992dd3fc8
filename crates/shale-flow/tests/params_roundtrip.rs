//! Property-based round-trip tests for every job/task parameter blob:
//! `decode(encode(p)) == p` across arbitrary valid values, including
//! all-absent and all-present nullable fields.

use proptest::prelude::*;

use shale_core::{ColumnId, FractureId, NodeId, ReplicaGroupId, ReplicaId, ReplicaPartitionId, ReplicaSchemeId};
use shale_flow::params::{
    DeleteFilesParams, MergeJobParams, MergeSameSchemeParams, MergeUnit, ParamBlob,
    RecoverFragmentsParams, RecoverFromBuddyParams, RecoveryJobParams, RepartitionParams,
};

fn arb_partition_ids() -> impl Strategy<Value = Vec<ReplicaPartitionId>> {
    prop::collection::vec(any::<u64>().prop_map(ReplicaPartitionId::new), 0..6)
}

fn arb_column_ids() -> impl Strategy<Value = Vec<ColumnId>> {
    prop::collection::vec(any::<u64>().prop_map(ColumnId::new), 0..6)
}

fn arb_opt_node() -> impl Strategy<Value = Option<NodeId>> {
    prop::option::of(any::<u64>().prop_map(NodeId::new))
}

fn arb_opt_string() -> impl Strategy<Value = Option<String>> {
    prop::option::of(".{0,40}")
}

fn arb_paths() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9/._-]{0,60}", 0..8)
}

fn arb_merge_unit() -> impl Strategy<Value = MergeUnit> {
    (
        any::<u64>().prop_map(ReplicaPartitionId::new),
        any::<u64>().prop_map(NodeId::new),
        arb_partition_ids(),
    )
        .prop_map(|(target_partition_id, node_id, source_partition_ids)| MergeUnit {
            target_partition_id,
            node_id,
            source_partition_ids,
        })
}

fn assert_roundtrip<P: ParamBlob + PartialEq + std::fmt::Debug>(params: &P) {
    let blob = params.encode();
    let decoded = P::decode(&blob).expect("decode");
    assert_eq!(&decoded, params);
}

proptest! {
    #[test]
    fn merge_same_scheme_roundtrips(
        scheme in any::<u64>(),
        target in any::<u64>(),
        sources in arb_partition_ids(),
        columns in arb_column_ids(),
    ) {
        assert_roundtrip(&MergeSameSchemeParams {
            scheme_id: ReplicaSchemeId::new(scheme),
            target_partition_id: ReplicaPartitionId::new(target),
            source_partition_ids: sources,
            column_ids: columns,
        });
    }

    #[test]
    fn recover_from_buddy_roundtrips(
        partition in any::<u64>(),
        buddy in any::<u64>(),
        target_scheme in any::<u64>(),
        buddy_scheme in any::<u64>(),
        buddy_node in arb_opt_node(),
        columns in arb_column_ids(),
    ) {
        assert_roundtrip(&RecoverFromBuddyParams {
            partition_id: ReplicaPartitionId::new(partition),
            buddy_partition_id: ReplicaPartitionId::new(buddy),
            target_scheme_id: ReplicaSchemeId::new(target_scheme),
            buddy_scheme_id: ReplicaSchemeId::new(buddy_scheme),
            buddy_node_id: buddy_node,
            column_ids: columns,
        });
    }

    #[test]
    fn repartition_roundtrips(
        sources in arb_partition_ids(),
        group in any::<u64>(),
        bucket_column in any::<u64>(),
        columns in arb_column_ids(),
    ) {
        assert_roundtrip(&RepartitionParams {
            source_partition_ids: sources,
            target_group_id: ReplicaGroupId::new(group),
            partitioning_column_id: ColumnId::new(bucket_column),
            column_ids: columns,
        });
    }

    #[test]
    fn recover_fragments_roundtrips(
        partition in any::<u64>(),
        range_index in any::<u32>(),
        scheme in any::<u64>(),
        columns in arb_column_ids(),
    ) {
        assert_roundtrip(&RecoverFragmentsParams {
            partition_id: ReplicaPartitionId::new(partition),
            range_index,
            target_scheme_id: ReplicaSchemeId::new(scheme),
            column_ids: columns,
        });
    }

    #[test]
    fn delete_files_roundtrips(paths in arb_paths()) {
        assert_roundtrip(&DeleteFilesParams { paths });
    }

    #[test]
    fn merge_job_roundtrips(
        scheme in any::<u64>(),
        columns in arb_column_ids(),
        description in arb_opt_string(),
        units in prop::collection::vec(arb_merge_unit(), 0..5),
    ) {
        assert_roundtrip(&MergeJobParams {
            scheme_id: ReplicaSchemeId::new(scheme),
            column_ids: columns,
            description,
            units,
        });
    }

    #[test]
    fn recovery_job_roundtrips(
        fracture in any::<u64>(),
        replica in any::<u64>(),
        target_node in arb_opt_node(),
        description in arb_opt_string(),
    ) {
        assert_roundtrip(&RecoveryJobParams {
            fracture_id: FractureId::new(fracture),
            replica_id: ReplicaId::new(replica),
            target_node_id: target_node,
            description,
        });
    }
}
