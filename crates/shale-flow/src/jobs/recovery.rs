//! Recovery job driver.
//!
//! Decomposition walks the damaged replica's partitions, claims them
//! (`LOST` → `BEING_RECOVERED`), and picks a strategy per partition:
//! partitions with a healthy same-group buddy get a buddy-recovery task;
//! the rest share the cross-group pipeline. Dispatch then runs up to
//! three monitored phases:
//!
//! 1. buddy tasks + repartition tasks (every node holding a relevant
//!    foreign-group source partition buckets its rows),
//! 2. one recover task per cross-group target partition, created only
//!    after phase 1 joined, so the manifest is complete before any
//!    reader exists,
//! 3. deletion of the source-side fragment files.
//!
//! The driver re-derives its outline from the repository in both
//! `decompose` and `dispatch`; the repository is the only state that
//! survives a controller restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use shale_core::task::TaskType;
use shale_core::{
    ColumnId, Job, JobType, MetaRepository, NodeId, PartitionStatus, PartitionUpdate, Replica,
    ReplicaPartition, ReplicaPartitionId, ReplicaSchemeId, Task,
};

use crate::controller::{DispatchContext, JobDriver, JobPlan};
use crate::error::{Error, Result};
use crate::params::{
    DeleteFilesParams, ParamBlob, RecoverFragmentsParams, RecoverFromBuddyParams,
    RecoveryJobParams, RepartitionParams,
};
use crate::recovery::manifest::ManifestStore;
use crate::recovery::{select_strategy, RecoveryStrategy};

/// Driver for [`JobType::Recovery`].
pub struct RecoveryJobDriver {
    manifests: Arc<dyn ManifestStore>,
}

impl RecoveryJobDriver {
    /// Creates the driver over the manifest store shared with the nodes.
    #[must_use]
    pub fn new(manifests: Arc<dyn ManifestStore>) -> Self {
        Self { manifests }
    }
}

struct BuddyPlan {
    damaged: ReplicaPartition,
    buddy_partition: ReplicaPartition,
    buddy_scheme_id: ReplicaSchemeId,
}

struct RecoveryOutline {
    target_scheme_id: ReplicaSchemeId,
    column_ids: Vec<ColumnId>,
    partitioning_column_id: Option<ColumnId>,
    group_id: shale_core::ReplicaGroupId,
    buddies: Vec<BuddyPlan>,
    cross_targets: Vec<ReplicaPartition>,
    source_replica: Option<Replica>,
}

async fn outline(
    repository: &Arc<dyn MetaRepository>,
    params: &RecoveryJobParams,
) -> Result<RecoveryOutline> {
    let replica = repository.get_replica(params.replica_id).await?;
    if replica.fracture_id != params.fracture_id {
        return Err(Error::decomposition(format!(
            "replica {} belongs to fracture {}, not {}",
            replica.id, replica.fracture_id, params.fracture_id
        )));
    }
    let scheme = repository.get_replica_scheme(replica.scheme_id).await?;
    let group = repository.get_replica_group(scheme.group_id).await?;
    let table = repository.get_table(group.table_id).await?;

    let damaged: Vec<ReplicaPartition> = repository
        .partitions_by_replica(replica.id)
        .await?
        .into_iter()
        .filter(|p| p.status.is_damaged())
        .collect();
    if damaged.is_empty() {
        return Err(Error::decomposition(format!(
            "replica {} has no damaged partitions",
            replica.id
        )));
    }

    let mut buddies = Vec::new();
    let mut cross_targets = Vec::new();
    let mut source_replica = None;
    for partition in damaged {
        match select_strategy(repository.as_ref(), &partition).await? {
            RecoveryStrategy::Buddy {
                buddy_partition,
                buddy_scheme_id,
            } => buddies.push(BuddyPlan {
                damaged: partition,
                buddy_partition,
                buddy_scheme_id,
            }),
            RecoveryStrategy::CrossGroup {
                source_replica: source,
            } => {
                source_replica.get_or_insert(source);
                cross_targets.push(partition);
            }
        }
    }

    Ok(RecoveryOutline {
        target_scheme_id: scheme.id,
        column_ids: table.column_ids,
        partitioning_column_id: group.partitioning_column_id,
        group_id: group.id,
        buddies,
        cross_targets,
        source_replica,
    })
}

/// Healthy source partitions of the foreign-group replica, grouped by
/// the node that holds them.
async fn source_partitions_by_node(
    repository: &Arc<dyn MetaRepository>,
    source_replica: &Replica,
) -> Result<BTreeMap<NodeId, Vec<ReplicaPartitionId>>> {
    let mut by_node: BTreeMap<NodeId, Vec<ReplicaPartitionId>> = BTreeMap::new();
    for partition in repository.partitions_by_replica(source_replica.id).await? {
        if partition.status != PartitionStatus::Ok {
            // Empty partitions hold no rows and no files.
            continue;
        }
        if let Some(node) = partition.node_id {
            by_node.entry(node).or_default().push(partition.id);
        }
    }
    Ok(by_node)
}

fn executor_node(
    params: &RecoveryJobParams,
    damaged: &ReplicaPartition,
    fallback: Option<NodeId>,
) -> Result<NodeId> {
    params
        .target_node_id
        .or(damaged.node_id)
        .or(fallback)
        .ok_or_else(|| {
            Error::decomposition(format!(
                "no executor node available for partition {}",
                damaged.id
            ))
        })
}

#[async_trait]
impl JobDriver for RecoveryJobDriver {
    async fn decompose(
        &self,
        repository: &Arc<dyn MetaRepository>,
        params: Bytes,
    ) -> Result<JobPlan> {
        let job_params = RecoveryJobParams::decode(&params)?;
        let plan = outline(repository, &job_params).await?;

        let description = job_params.description.clone().unwrap_or_else(|| {
            format!(
                "recover replica {} of fracture {}",
                job_params.replica_id, job_params.fracture_id
            )
        });
        let job = repository
            .create_job(Job::new(JobType::Recovery, description, params))
            .await?;

        // Claim every damaged partition before any task exists.
        for partition in plan
            .buddies
            .iter()
            .map(|b| &b.damaged)
            .chain(plan.cross_targets.iter())
        {
            if partition.status == PartitionStatus::Lost {
                repository
                    .update_replica_partition(
                        partition.id,
                        PartitionUpdate::status(PartitionStatus::BeingRecovered),
                    )
                    .await?;
            }
        }

        let mut tasks = Vec::new();
        for buddy in &plan.buddies {
            let node = executor_node(&job_params, &buddy.damaged, buddy.buddy_partition.node_id)?;
            let task_params = RecoverFromBuddyParams {
                partition_id: buddy.damaged.id,
                buddy_partition_id: buddy.buddy_partition.id,
                target_scheme_id: plan.target_scheme_id,
                buddy_scheme_id: buddy.buddy_scheme_id,
                buddy_node_id: buddy.buddy_partition.node_id.filter(|&n| n != node),
                column_ids: plan.column_ids.clone(),
            };
            tasks.push(
                repository
                    .create_task(Task::new(
                        job.id,
                        node,
                        TaskType::RecoverFromBuddy,
                        task_params.encode(),
                    ))
                    .await?,
            );
        }

        if !plan.cross_targets.is_empty() {
            let source_replica = plan.source_replica.as_ref().ok_or_else(|| {
                Error::decomposition("cross-group targets without a source replica")
            })?;
            let partitioning_column_id = plan.partitioning_column_id.ok_or_else(|| {
                Error::decomposition(format!(
                    "group {} has no partitioning column; cannot repartition into it",
                    plan.group_id
                ))
            })?;
            let by_node = source_partitions_by_node(repository, source_replica).await?;
            if by_node.is_empty() {
                return Err(Error::decomposition(format!(
                    "source replica {} has no physically present partitions",
                    source_replica.id
                )));
            }
            for (node, source_partition_ids) in by_node {
                let task_params = RepartitionParams {
                    source_partition_ids,
                    target_group_id: plan.group_id,
                    partitioning_column_id,
                    column_ids: plan.column_ids.clone(),
                };
                tasks.push(
                    repository
                        .create_task(Task::new(
                            job.id,
                            node,
                            TaskType::Repartition,
                            task_params.encode(),
                        ))
                        .await?,
                );
            }
        }

        Ok(JobPlan { job, tasks })
    }

    async fn dispatch(&self, cx: &DispatchContext) -> Result<()> {
        let job_params = RecoveryJobParams::decode(&cx.job().params)?;
        let plan = outline(cx.repository(), &job_params).await?;
        let has_cross = !plan.cross_targets.is_empty();

        let mut phase_one = cx.issue(cx.initial_tasks()).await?;
        if !has_cross {
            return cx.join_tasks(&mut phase_one, 0.0, 1.0).await;
        }

        // Phase 1: buddies and repartitioning.
        cx.join_tasks(&mut phase_one, 0.0, 0.45).await?;
        if cx.error_encountered() || cx.stop_requested() {
            return Ok(());
        }

        // Phase 2: the manifest is fully published now; rebuild each
        // damaged target from its addressed fragments.
        let repository = cx.repository();
        let by_node = match plan.source_replica.as_ref() {
            Some(source) => source_partitions_by_node(repository, source).await?,
            None => BTreeMap::new(),
        };
        let fallback_node = by_node.keys().next().copied();
        let mut recover_tasks = Vec::with_capacity(plan.cross_targets.len());
        for damaged in &plan.cross_targets {
            let node = executor_node(&job_params, damaged, fallback_node)?;
            let task_params = RecoverFragmentsParams {
                partition_id: damaged.id,
                range_index: u32::try_from(damaged.range_index).unwrap_or(u32::MAX),
                target_scheme_id: plan.target_scheme_id,
                column_ids: plan.column_ids.clone(),
            };
            recover_tasks.push(
                repository
                    .create_task(Task::new(
                        cx.job().id,
                        node,
                        TaskType::RecoverFromRepartitionedFragments,
                        task_params.encode(),
                    ))
                    .await?,
            );
        }
        let mut phase_two = cx.issue(&recover_tasks).await?;
        cx.join_tasks(&mut phase_two, 0.45, 0.9).await?;
        if cx.error_encountered() || cx.stop_requested() {
            return Ok(());
        }

        // Phase 3: drop the source-side fragments.
        let manifest = self.manifests.manifest(cx.job().id).await?;
        let mut delete_tasks = Vec::new();
        for node in manifest.nodes() {
            let Some(table) = manifest.table(node) else {
                continue;
            };
            let paths = table.all_paths();
            if paths.is_empty() {
                continue;
            }
            let task_params = DeleteFilesParams { paths };
            delete_tasks.push(
                repository
                    .create_task(Task::new(
                        cx.job().id,
                        node,
                        TaskType::DeleteFiles,
                        task_params.encode(),
                    ))
                    .await?,
            );
        }
        let mut phase_three = cx.issue(&delete_tasks).await?;
        cx.join_tasks(&mut phase_three, 0.9, 1.0).await
    }
}
