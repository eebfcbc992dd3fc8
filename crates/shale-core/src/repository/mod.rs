//! Metadata repository contract.
//!
//! The repository is the durable record store for every entity in the
//! model, keyed by integer ids with a few secondary indexes (by parent
//! id). It is also the only channel between the job controller and the
//! nodes executing tasks: the node writes status and progress into its
//! task record, the controller reads them back and writes cancellation
//! requests.
//!
//! ## Update semantics
//!
//! - Partial updates: `None` fields of an update struct leave the stored
//!   field untouched.
//! - Writes are last-writer-wins at record granularity. The one hard rule
//!   an implementation must enforce is that finished job/task statuses
//!   are immutable: once a record reads `DONE`, `ERROR`, or `CANCELED`,
//!   status writes are rejected.
//! - Implementations maintain `started_at`/`finished_at` on status
//!   transitions into `RUNNING` / a finished status, and re-derive a
//!   replica's status whenever one of its partitions is updated.
//!
//! ## Durability
//!
//! [`memory::InMemoryRepository`] backs tests and development. Durable
//! backends implement the same trait; the orchestration engine can be
//! restarted and resume purely from repository state.

pub mod memory;

use async_trait::async_trait;

use crate::column::ColumnFile;
use crate::error::Result;
use crate::fracture::Fracture;
use crate::id::{
    ColumnId, FractureId, JobId, NodeId, ReplicaGroupId, ReplicaId, ReplicaPartitionId,
    ReplicaSchemeId, SubPartitionSchemeId, TableId, TaskId,
};
use crate::job::Job;
use crate::placement::RackAssignment;
use crate::replica::{Replica, ReplicaGroup, ReplicaPartition, ReplicaScheme, SubPartitionScheme};
use crate::status::{PartitionStatus, RunStatus};
use crate::table::Table;
use crate::task::Task;

/// Partial update of a job record.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    /// New lifecycle status.
    pub status: Option<RunStatus>,
    /// New completion fraction, clamped to `[0, 1]`.
    pub progress: Option<f64>,
    /// Error message to record.
    pub error_messages: Option<String>,
}

impl JobUpdate {
    /// Creates an update that only changes the status.
    #[must_use]
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Creates an update that only changes the progress.
    #[must_use]
    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }
}

/// Partial update of a task record.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// New lifecycle status.
    pub status: Option<RunStatus>,
    /// New completion fraction, clamped to `[0, 1]`.
    pub progress: Option<f64>,
    /// Output file paths produced by the task.
    pub output_paths: Option<Vec<String>>,
    /// Error message to record.
    pub error_messages: Option<String>,
}

impl TaskUpdate {
    /// Creates an update that only changes the status.
    #[must_use]
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Creates an update that only changes the progress.
    #[must_use]
    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }
}

/// Partial update of a replica partition record.
#[derive(Debug, Clone, Default)]
pub struct PartitionUpdate {
    /// New partition health.
    pub status: Option<PartitionStatus>,
    /// New owning node.
    pub node_id: Option<NodeId>,
}

impl PartitionUpdate {
    /// Creates an update that only changes the status.
    #[must_use]
    pub fn status(status: PartitionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Creates an update changing status and owner together.
    #[must_use]
    pub fn recovered(status: PartitionStatus, node_id: NodeId) -> Self {
        Self {
            status: Some(status),
            node_id: Some(node_id),
        }
    }
}

/// Durable record store for the entity model.
#[async_trait]
pub trait MetaRepository: Send + Sync {
    // --- Jobs & tasks ---

    /// Inserts a job record, assigning a fresh non-zero id.
    async fn create_job(&self, job: Job) -> Result<Job>;

    /// Gets a job by id.
    async fn get_job(&self, id: JobId) -> Result<Job>;

    /// Applies a partial update to a job record.
    async fn update_job(&self, id: JobId, update: JobUpdate) -> Result<()>;

    /// Inserts a task record, assigning a fresh non-zero id.
    async fn create_task(&self, task: Task) -> Result<Task>;

    /// Gets a task by id.
    async fn get_task(&self, id: TaskId) -> Result<Task>;

    /// Applies a partial update to a task record.
    async fn update_task(&self, id: TaskId, update: TaskUpdate) -> Result<()>;

    /// Lists all tasks belonging to a job.
    async fn tasks_by_job(&self, job_id: JobId) -> Result<Vec<Task>>;

    // --- Layout entities (created once, immutable afterward) ---

    /// Inserts a table record.
    async fn create_table(&self, table: Table) -> Result<Table>;

    /// Gets a table by id.
    async fn get_table(&self, id: TableId) -> Result<Table>;

    /// Inserts a fracture record, assigning a fresh id.
    async fn create_fracture(&self, fracture: Fracture) -> Result<Fracture>;

    /// Gets a fracture by id.
    async fn get_fracture(&self, id: FractureId) -> Result<Fracture>;

    /// Inserts a replica group after validating its range array.
    async fn create_replica_group(&self, group: ReplicaGroup) -> Result<ReplicaGroup>;

    /// Gets a replica group by id.
    async fn get_replica_group(&self, id: ReplicaGroupId) -> Result<ReplicaGroup>;

    /// Inserts a replica scheme record.
    async fn create_replica_scheme(&self, scheme: ReplicaScheme) -> Result<ReplicaScheme>;

    /// Gets a replica scheme by id.
    async fn get_replica_scheme(&self, id: ReplicaSchemeId) -> Result<ReplicaScheme>;

    /// Lists the schemes of a replica group.
    async fn schemes_by_group(&self, group_id: ReplicaGroupId) -> Result<Vec<ReplicaScheme>>;

    /// Inserts a sub-partition scheme after validating its ranges.
    async fn create_sub_partition_scheme(
        &self,
        scheme: SubPartitionScheme,
    ) -> Result<SubPartitionScheme>;

    /// Gets a sub-partition scheme by id.
    async fn get_sub_partition_scheme(&self, id: SubPartitionSchemeId)
        -> Result<SubPartitionScheme>;

    // --- Replicas & partitions ---

    /// Inserts a replica record.
    async fn create_replica(&self, replica: Replica) -> Result<Replica>;

    /// Gets a replica by id.
    async fn get_replica(&self, id: ReplicaId) -> Result<Replica>;

    /// Lists the replicas of a fracture.
    async fn replicas_by_fracture(&self, fracture_id: FractureId) -> Result<Vec<Replica>>;

    /// Inserts a replica partition record.
    async fn create_replica_partition(
        &self,
        partition: ReplicaPartition,
    ) -> Result<ReplicaPartition>;

    /// Gets a replica partition by id.
    async fn get_replica_partition(&self, id: ReplicaPartitionId) -> Result<ReplicaPartition>;

    /// Applies a partial update to a replica partition and re-derives the
    /// owning replica's status.
    async fn update_replica_partition(
        &self,
        id: ReplicaPartitionId,
        update: PartitionUpdate,
    ) -> Result<()>;

    /// Lists the partitions of a replica.
    async fn partitions_by_replica(&self, replica_id: ReplicaId) -> Result<Vec<ReplicaPartition>>;

    // --- Column files ---

    /// Registers a column file, assigning a fresh id.
    async fn insert_column_file(&self, file: ColumnFile) -> Result<ColumnFile>;

    /// Lists every registered column file of a partition.
    async fn all_column_files_by_partition(
        &self,
        partition_id: ReplicaPartitionId,
    ) -> Result<Vec<ColumnFile>>;

    /// Gets the column file of a partition for one logical column.
    async fn column_file_by_partition_and_column(
        &self,
        partition_id: ReplicaPartitionId,
        column_id: ColumnId,
    ) -> Result<ColumnFile>;

    /// Atomically replaces a partition's registered column files.
    ///
    /// Used when recovery registers freshly produced files as the
    /// partition's permanent set.
    async fn replace_partition_column_files(
        &self,
        partition_id: ReplicaPartitionId,
        files: Vec<ColumnFile>,
    ) -> Result<Vec<ColumnFile>>;

    // --- Placement ---

    /// Inserts a rack assignment, enforcing that for a given fracture a
    /// rack is owned by at most one replica group.
    async fn insert_rack_assignment(&self, assignment: RackAssignment) -> Result<RackAssignment>;

    /// Lists the rack assignments of a fracture.
    async fn rack_assignments_by_fracture(
        &self,
        fracture_id: FractureId,
    ) -> Result<Vec<RackAssignment>>;
}
