//! In-memory repository implementation for tests and development.
//!
//! ## Limitations
//!
//! - **No durability**: All state is lost when the process exits
//! - **Single-process only**: State is not shared across process
//!   boundaries
//!
//! The implementation keeps one table per entity kind behind a single
//! `RwLock`, with per-entity-type id sequences starting at 1 so that id
//! zero stays free as the "unassigned" sentinel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::{JobUpdate, MetaRepository, PartitionUpdate, TaskUpdate};
use crate::column::ColumnFile;
use crate::error::{Error, Result};
use crate::fracture::Fracture;
use crate::id::{
    ColumnFileId, ColumnId, FractureId, JobId, RackAssignmentId, ReplicaGroupId, ReplicaId,
    ReplicaPartitionId, ReplicaSchemeId, SubPartitionSchemeId, TableId, TaskId,
};
use crate::job::Job;
use crate::placement::RackAssignment;
use crate::replica::{Replica, ReplicaGroup, ReplicaPartition, ReplicaScheme, SubPartitionScheme};
use crate::status::{ReplicaStatus, RunStatus};
use crate::table::Table;
use crate::task::Task;

/// Converts a lock poison error to a repository error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::repository("lock poisoned")
}

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, Job>,
    tasks: HashMap<TaskId, Task>,
    tables: HashMap<TableId, Table>,
    fractures: HashMap<FractureId, Fracture>,
    groups: HashMap<ReplicaGroupId, ReplicaGroup>,
    schemes: HashMap<ReplicaSchemeId, ReplicaScheme>,
    sub_schemes: HashMap<SubPartitionSchemeId, SubPartitionScheme>,
    replicas: HashMap<ReplicaId, Replica>,
    partitions: HashMap<ReplicaPartitionId, ReplicaPartition>,
    column_files: HashMap<ColumnFileId, ColumnFile>,
    rack_assignments: HashMap<RackAssignmentId, RackAssignment>,
}

#[derive(Debug)]
struct Sequences {
    jobs: AtomicU64,
    tasks: AtomicU64,
    fractures: AtomicU64,
    groups: AtomicU64,
    schemes: AtomicU64,
    sub_schemes: AtomicU64,
    replicas: AtomicU64,
    partitions: AtomicU64,
    column_files: AtomicU64,
    rack_assignments: AtomicU64,
}

impl Default for Sequences {
    fn default() -> Self {
        let one = || AtomicU64::new(1);
        Self {
            jobs: one(),
            tasks: one(),
            fractures: one(),
            groups: one(),
            schemes: one(),
            sub_schemes: one(),
            replicas: one(),
            partitions: one(),
            column_files: one(),
            rack_assignments: one(),
        }
    }
}

fn next(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::Relaxed)
}

/// In-memory metadata repository.
///
/// ## Example
///
/// ```rust
/// use shale_core::repository::memory::InMemoryRepository;
///
/// let repo = InMemoryRepository::new();
/// // Use repo in tests...
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    sequences: Sequences,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored jobs.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn job_count(&self) -> Result<usize> {
        Ok(self.tables.read().map_err(poison_err)?.jobs.len())
    }

    fn rederive_replica_status(tables: &mut Tables, replica_id: ReplicaId) {
        let derived = ReplicaStatus::from_partitions(
            tables
                .partitions
                .values()
                .filter(|p| p.replica_id == replica_id)
                .map(|p| p.status),
        );
        if let Some(replica) = tables.replicas.get_mut(&replica_id) {
            replica.status = derived;
        }
    }
}

/// Applies the shared status-write rule for job and task records: a
/// finished status is immutable.
fn guard_status_write(kind: &'static str, id: u64, current: RunStatus) -> Result<()> {
    if current.is_finished() {
        return Err(Error::repository(format!(
            "{kind} {id} already finished with status {current}"
        )));
    }
    Ok(())
}

#[async_trait]
impl MetaRepository for InMemoryRepository {
    async fn create_job(&self, mut job: Job) -> Result<Job> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if job.id.is_unassigned() {
            job.id = JobId::new(next(&self.sequences.jobs));
        } else if tables.jobs.contains_key(&job.id) {
            return Err(Error::repository(format!("job {} already exists", job.id)));
        }
        tables.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        self.tables
            .read()
            .map_err(poison_err)?
            .jobs
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("job", id.as_u64()))
    }

    async fn update_job(&self, id: JobId, update: JobUpdate) -> Result<()> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        let job = tables
            .jobs
            .get_mut(&id)
            .ok_or(Error::not_found("job", id.as_u64()))?;

        if let Some(status) = update.status {
            guard_status_write("job", id.as_u64(), job.status)?;
            job.status = status;
            let now = Utc::now();
            if status == RunStatus::Running && job.started_at.is_none() {
                job.started_at = Some(now);
            }
            if status.is_finished() {
                job.finished_at = Some(now);
            }
        }
        if let Some(progress) = update.progress {
            job.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(message) = update.error_messages {
            job.error_messages = Some(message);
        }
        Ok(())
    }

    async fn create_task(&self, mut task: Task) -> Result<Task> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if task.id.is_unassigned() {
            task.id = TaskId::new(next(&self.sequences.tasks));
        } else if tables.tasks.contains_key(&task.id) {
            return Err(Error::repository(format!("task {} already exists", task.id)));
        }
        tables.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.tables
            .read()
            .map_err(poison_err)?
            .tasks
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("task", id.as_u64()))
    }

    async fn update_task(&self, id: TaskId, update: TaskUpdate) -> Result<()> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or(Error::not_found("task", id.as_u64()))?;

        if let Some(status) = update.status {
            guard_status_write("task", id.as_u64(), task.status)?;
            task.status = status;
            let now = Utc::now();
            if status == RunStatus::Running && task.started_at.is_none() {
                task.started_at = Some(now);
            }
            if status.is_finished() {
                task.finished_at = Some(now);
            }
        }
        if let Some(progress) = update.progress {
            task.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(paths) = update.output_paths {
            task.output_paths = paths;
        }
        if let Some(message) = update.error_messages {
            task.error_messages = Some(message);
        }
        Ok(())
    }

    async fn tasks_by_job(&self, job_id: JobId) -> Result<Vec<Task>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn create_table(&self, table: Table) -> Result<Table> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        tables.tables.insert(table.id, table.clone());
        Ok(table)
    }

    async fn get_table(&self, id: TableId) -> Result<Table> {
        self.tables
            .read()
            .map_err(poison_err)?
            .tables
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("table", id.as_u64()))
    }

    async fn create_fracture(&self, mut fracture: Fracture) -> Result<Fracture> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if fracture.id.is_unassigned() {
            fracture.id = FractureId::new(next(&self.sequences.fractures));
        }
        tables.fractures.insert(fracture.id, fracture.clone());
        Ok(fracture)
    }

    async fn get_fracture(&self, id: FractureId) -> Result<Fracture> {
        self.tables
            .read()
            .map_err(poison_err)?
            .fractures
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("fracture", id.as_u64()))
    }

    async fn create_replica_group(&self, mut group: ReplicaGroup) -> Result<ReplicaGroup> {
        group.validate()?;
        let mut tables = self.tables.write().map_err(poison_err)?;
        if group.id.is_unassigned() {
            group.id = ReplicaGroupId::new(next(&self.sequences.groups));
        }
        tables.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn get_replica_group(&self, id: ReplicaGroupId) -> Result<ReplicaGroup> {
        self.tables
            .read()
            .map_err(poison_err)?
            .groups
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("replica group", id.as_u64()))
    }

    async fn create_replica_scheme(&self, mut scheme: ReplicaScheme) -> Result<ReplicaScheme> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if scheme.id.is_unassigned() {
            scheme.id = ReplicaSchemeId::new(next(&self.sequences.schemes));
        }
        tables.schemes.insert(scheme.id, scheme.clone());
        Ok(scheme)
    }

    async fn get_replica_scheme(&self, id: ReplicaSchemeId) -> Result<ReplicaScheme> {
        self.tables
            .read()
            .map_err(poison_err)?
            .schemes
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("replica scheme", id.as_u64()))
    }

    async fn schemes_by_group(&self, group_id: ReplicaGroupId) -> Result<Vec<ReplicaScheme>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut schemes: Vec<ReplicaScheme> = tables
            .schemes
            .values()
            .filter(|s| s.group_id == group_id)
            .cloned()
            .collect();
        schemes.sort_by_key(|s| s.id);
        Ok(schemes)
    }

    async fn create_sub_partition_scheme(
        &self,
        mut scheme: SubPartitionScheme,
    ) -> Result<SubPartitionScheme> {
        scheme.validate()?;
        let mut tables = self.tables.write().map_err(poison_err)?;
        if scheme.id.is_unassigned() {
            scheme.id = SubPartitionSchemeId::new(next(&self.sequences.sub_schemes));
        }
        tables.sub_schemes.insert(scheme.id, scheme.clone());
        Ok(scheme)
    }

    async fn get_sub_partition_scheme(
        &self,
        id: SubPartitionSchemeId,
    ) -> Result<SubPartitionScheme> {
        self.tables
            .read()
            .map_err(poison_err)?
            .sub_schemes
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("sub-partition scheme", id.as_u64()))
    }

    async fn create_replica(&self, mut replica: Replica) -> Result<Replica> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if replica.id.is_unassigned() {
            replica.id = ReplicaId::new(next(&self.sequences.replicas));
        }
        tables.replicas.insert(replica.id, replica.clone());
        Ok(replica)
    }

    async fn get_replica(&self, id: ReplicaId) -> Result<Replica> {
        self.tables
            .read()
            .map_err(poison_err)?
            .replicas
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("replica", id.as_u64()))
    }

    async fn replicas_by_fracture(&self, fracture_id: FractureId) -> Result<Vec<Replica>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut replicas: Vec<Replica> = tables
            .replicas
            .values()
            .filter(|r| r.fracture_id == fracture_id)
            .cloned()
            .collect();
        replicas.sort_by_key(|r| r.id);
        Ok(replicas)
    }

    async fn create_replica_partition(
        &self,
        mut partition: ReplicaPartition,
    ) -> Result<ReplicaPartition> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if partition.id.is_unassigned() {
            partition.id = ReplicaPartitionId::new(next(&self.sequences.partitions));
        }
        let replica_id = partition.replica_id;
        tables.partitions.insert(partition.id, partition.clone());
        Self::rederive_replica_status(&mut tables, replica_id);
        Ok(partition)
    }

    async fn get_replica_partition(&self, id: ReplicaPartitionId) -> Result<ReplicaPartition> {
        self.tables
            .read()
            .map_err(poison_err)?
            .partitions
            .get(&id)
            .cloned()
            .ok_or(Error::not_found("replica partition", id.as_u64()))
    }

    async fn update_replica_partition(
        &self,
        id: ReplicaPartitionId,
        update: PartitionUpdate,
    ) -> Result<()> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        let partition = tables
            .partitions
            .get_mut(&id)
            .ok_or(Error::not_found("replica partition", id.as_u64()))?;

        if let Some(status) = update.status {
            partition.status = status;
        }
        if let Some(node_id) = update.node_id {
            partition.node_id = Some(node_id);
        }
        let replica_id = partition.replica_id;
        Self::rederive_replica_status(&mut tables, replica_id);
        Ok(())
    }

    async fn partitions_by_replica(&self, replica_id: ReplicaId) -> Result<Vec<ReplicaPartition>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut partitions: Vec<ReplicaPartition> = tables
            .partitions
            .values()
            .filter(|p| p.replica_id == replica_id)
            .cloned()
            .collect();
        partitions.sort_by_key(|p| p.range_index);
        Ok(partitions)
    }

    async fn insert_column_file(&self, mut file: ColumnFile) -> Result<ColumnFile> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if file.id.is_unassigned() {
            file.id = ColumnFileId::new(next(&self.sequences.column_files));
        }
        tables.column_files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn all_column_files_by_partition(
        &self,
        partition_id: ReplicaPartitionId,
    ) -> Result<Vec<ColumnFile>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut files: Vec<ColumnFile> = tables
            .column_files
            .values()
            .filter(|f| f.partition_id == partition_id)
            .cloned()
            .collect();
        files.sort_by_key(|f| f.column_id);
        Ok(files)
    }

    async fn column_file_by_partition_and_column(
        &self,
        partition_id: ReplicaPartitionId,
        column_id: ColumnId,
    ) -> Result<ColumnFile> {
        let tables = self.tables.read().map_err(poison_err)?;
        tables
            .column_files
            .values()
            .find(|f| f.partition_id == partition_id && f.column_id == column_id)
            .cloned()
            .ok_or(Error::not_found("column file", column_id.as_u64()))
    }

    async fn replace_partition_column_files(
        &self,
        partition_id: ReplicaPartitionId,
        files: Vec<ColumnFile>,
    ) -> Result<Vec<ColumnFile>> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        tables.column_files.retain(|_, f| f.partition_id != partition_id);
        let mut inserted = Vec::with_capacity(files.len());
        for mut file in files {
            file.partition_id = partition_id;
            if file.id.is_unassigned() {
                file.id = ColumnFileId::new(next(&self.sequences.column_files));
            }
            tables.column_files.insert(file.id, file.clone());
            inserted.push(file);
        }
        Ok(inserted)
    }

    async fn insert_rack_assignment(
        &self,
        mut assignment: RackAssignment,
    ) -> Result<RackAssignment> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if let Some(existing) = tables
            .rack_assignments
            .values()
            .find(|a| a.fracture_id == assignment.fracture_id && a.rack_id == assignment.rack_id)
        {
            return Err(Error::invariant(format!(
                "rack {} already owned by group {} for fracture {}",
                assignment.rack_id, existing.group_id, assignment.fracture_id
            )));
        }
        if assignment.id.is_unassigned() {
            assignment.id = RackAssignmentId::new(next(&self.sequences.rack_assignments));
        }
        tables
            .rack_assignments
            .insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    async fn rack_assignments_by_fracture(
        &self,
        fracture_id: FractureId,
    ) -> Result<Vec<RackAssignment>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut assignments: Vec<RackAssignment> = tables
            .rack_assignments
            .values()
            .filter(|a| a.fracture_id == fracture_id)
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.id);
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{NodeId, RackId};
    use crate::job::JobType;
    use crate::status::PartitionStatus;
    use crate::task::TaskType;
    use crate::value::{Datum, KeyRange};
    use bytes::Bytes;

    fn repo() -> InMemoryRepository {
        InMemoryRepository::new()
    }

    fn int_range(lo: i64, hi: i64) -> KeyRange {
        KeyRange::new(Datum::Int64(lo), Datum::Int64(hi))
    }

    #[tokio::test]
    async fn create_job_assigns_nonzero_id() -> Result<()> {
        let repo = repo();
        let job = repo
            .create_job(Job::new(JobType::Merge, "merge", Bytes::new()))
            .await?;
        assert!(!job.id.is_unassigned());

        let loaded = repo.get_job(job.id).await?;
        assert_eq!(loaded.status, RunStatus::Created);
        Ok(())
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields_untouched() -> Result<()> {
        let repo = repo();
        let job = repo
            .create_job(Job::new(JobType::Merge, "merge", Bytes::new()))
            .await?;

        repo.update_job(job.id, JobUpdate::progress(0.5)).await?;
        let loaded = repo.get_job(job.id).await?;
        assert_eq!(loaded.status, RunStatus::Created);
        assert!((loaded.progress - 0.5).abs() < f64::EPSILON);
        assert!(loaded.error_messages.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn status_timestamps_are_maintained() -> Result<()> {
        let repo = repo();
        let task = repo
            .create_task(Task::new(
                JobId::new(1),
                NodeId::new(1),
                TaskType::Repartition,
                Bytes::new(),
            ))
            .await?;

        repo.update_task(task.id, TaskUpdate::status(RunStatus::Running))
            .await?;
        let running = repo.get_task(task.id).await?;
        assert!(running.started_at.is_some());
        assert!(running.finished_at.is_none());

        repo.update_task(task.id, TaskUpdate::status(RunStatus::Done))
            .await?;
        let done = repo.get_task(task.id).await?;
        assert!(done.finished_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn finished_status_is_immutable() -> Result<()> {
        let repo = repo();
        let task = repo
            .create_task(Task::new(
                JobId::new(1),
                NodeId::new(1),
                TaskType::DeleteFiles,
                Bytes::new(),
            ))
            .await?;
        repo.update_task(task.id, TaskUpdate::status(RunStatus::Done))
            .await?;

        let result = repo
            .update_task(task.id, TaskUpdate::status(RunStatus::CancelRequested))
            .await;
        assert!(result.is_err());

        // Non-status fields can still be amended.
        repo.update_task(task.id, TaskUpdate::progress(1.0)).await?;
        Ok(())
    }

    #[tokio::test]
    async fn replica_status_follows_partitions() -> Result<()> {
        let repo = repo();
        let replica = repo
            .create_replica(Replica {
                id: ReplicaId::UNASSIGNED,
                scheme_id: ReplicaSchemeId::new(1),
                fracture_id: FractureId::new(1),
                status: ReplicaStatus::Ok,
            })
            .await?;

        let partition = repo
            .create_replica_partition(ReplicaPartition {
                id: ReplicaPartitionId::UNASSIGNED,
                replica_id: replica.id,
                sub_partition_scheme_id: SubPartitionSchemeId::new(1),
                range_index: 0,
                node_id: Some(NodeId::new(1)),
                status: PartitionStatus::Ok,
            })
            .await?;
        assert_eq!(repo.get_replica(replica.id).await?.status, ReplicaStatus::Ok);

        repo.update_replica_partition(partition.id, PartitionUpdate::status(PartitionStatus::Lost))
            .await?;
        assert_eq!(
            repo.get_replica(replica.id).await?.status,
            ReplicaStatus::NotReady
        );

        repo.update_replica_partition(
            partition.id,
            PartitionUpdate::recovered(PartitionStatus::Ok, NodeId::new(2)),
        )
        .await?;
        let recovered = repo.get_replica_partition(partition.id).await?;
        assert_eq!(recovered.node_id, Some(NodeId::new(2)));
        assert_eq!(repo.get_replica(replica.id).await?.status, ReplicaStatus::Ok);
        Ok(())
    }

    #[tokio::test]
    async fn rack_exclusivity_is_enforced() -> Result<()> {
        let repo = repo();
        let fracture = FractureId::new(1);
        let rack = RackId::new(10);

        repo.insert_rack_assignment(RackAssignment::new(fracture, rack, ReplicaGroupId::new(1)))
            .await?;

        let conflict = repo
            .insert_rack_assignment(RackAssignment::new(fracture, rack, ReplicaGroupId::new(2)))
            .await;
        assert!(conflict.is_err());

        // The same rack may serve another fracture.
        repo.insert_rack_assignment(RackAssignment::new(
            FractureId::new(2),
            rack,
            ReplicaGroupId::new(2),
        ))
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn replace_partition_column_files_swaps_the_set() -> Result<()> {
        let repo = repo();
        let partition = ReplicaPartitionId::new(5);

        repo.insert_column_file(ColumnFile::new(partition, ColumnId::new(1), "old/c1", 10))
            .await?;
        repo.insert_column_file(ColumnFile::new(partition, ColumnId::new(2), "old/c2", 10))
            .await?;

        let replaced = repo
            .replace_partition_column_files(
                partition,
                vec![
                    ColumnFile::new(partition, ColumnId::new(1), "new/c1", 20),
                    ColumnFile::new(partition, ColumnId::new(2), "new/c2", 20),
                ],
            )
            .await?;
        assert_eq!(replaced.len(), 2);

        let files = repo.all_column_files_by_partition(partition).await?;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.file_path.starts_with("new/")));

        let c1 = repo
            .column_file_by_partition_and_column(partition, ColumnId::new(1))
            .await?;
        assert_eq!(c1.file_path, "new/c1");
        Ok(())
    }

    #[tokio::test]
    async fn group_creation_validates_ranges() -> Result<()> {
        let repo = repo();
        let invalid = ReplicaGroup {
            id: ReplicaGroupId::UNASSIGNED,
            table_id: TableId::new(1),
            partitioning_column_id: Some(ColumnId::new(1)),
            ranges: vec![int_range(0, 10), int_range(5, 20)],
            linked_group_id: None,
        };
        assert!(repo.create_replica_group(invalid).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn tasks_by_job_filters_and_sorts() -> Result<()> {
        let repo = repo();
        let job_a = JobId::new(1);
        let job_b = JobId::new(2);
        for job_id in [job_a, job_b, job_a] {
            repo.create_task(Task::new(
                job_id,
                NodeId::new(1),
                TaskType::MergeSameScheme,
                Bytes::new(),
            ))
            .await?;
        }

        let tasks = repo.tasks_by_job(job_a).await?;
        assert_eq!(tasks.len(), 2);
        assert!(tasks.windows(2).all(|w| w[0].id < w[1].id));
        Ok(())
    }
}
