//! Node-local data layout.
//!
//! All paths handed to the column store and transport are relative to a
//! node's data root. Permanent column files get collision-free names by
//! embedding the partition id, column id, and a per-registration sequence
//! number; temp and fragment files are scoped under the producing task or
//! job so cleanup can remove whole file sets.

use shale_core::{ColumnId, JobId, NodeId, ReplicaPartitionId, TaskId};

/// Path layout for one node's data root.
#[derive(Debug, Clone)]
pub struct DataPaths {
    parts_root: String,
    temp_root: String,
    frag_root: String,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            parts_root: "parts".to_string(),
            temp_root: "tmp".to_string(),
            frag_root: "frag".to_string(),
        }
    }
}

impl DataPaths {
    /// Creates the default layout (`parts/`, `tmp/`, `frag/`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a layout with custom root directories.
    #[must_use]
    pub fn with_roots(
        parts_root: impl Into<String>,
        temp_root: impl Into<String>,
        frag_root: impl Into<String>,
    ) -> Self {
        Self {
            parts_root: parts_root.into(),
            temp_root: temp_root.into(),
            frag_root: frag_root.into(),
        }
    }

    /// The temp area root.
    #[must_use]
    pub fn temp_root(&self) -> &str {
        &self.temp_root
    }

    /// Permanent column file path for a partition's column.
    ///
    /// The sequence number distinguishes successive registrations for the
    /// same (partition, column) pair, keeping replacements collision-free.
    #[must_use]
    pub fn column_file(
        &self,
        partition_id: ReplicaPartitionId,
        column_id: ColumnId,
        seq: u64,
    ) -> String {
        format!("{}/p{partition_id}/c{column_id}-{seq}.col", self.parts_root)
    }

    /// Temp area for one task's intermediate outputs.
    #[must_use]
    pub fn task_temp_dir(&self, task_id: TaskId) -> String {
        format!("{}/t{task_id}", self.temp_root)
    }

    /// Temp column file inside a task's temp area.
    #[must_use]
    pub fn temp_column_file(&self, task_id: TaskId, column_id: ColumnId) -> String {
        format!("{}/t{task_id}/c{column_id}.col", self.temp_root)
    }

    /// Repartition fragment file: rows of `column_id` addressed to target
    /// range `range_index`, produced on `source_node` for `job_id`.
    #[must_use]
    pub fn fragment_file(
        &self,
        job_id: JobId,
        source_node: NodeId,
        range_index: usize,
        column_id: ColumnId,
    ) -> String {
        format!(
            "{}/j{job_id}/n{source_node}/r{range_index}-c{column_id}.frag",
            self.frag_root
        )
    }

    /// Local destination for a buddy column file fetched from a remote
    /// node during buddy recovery.
    #[must_use]
    pub fn copied_buddy_file(&self, task_id: TaskId, column_id: ColumnId) -> String {
        format!("{}/t{task_id}/buddy-c{column_id}.col", self.temp_root)
    }

    /// Local destination for a fragment copied from a source node during
    /// the recover phase.
    #[must_use]
    pub fn copied_fragment_file(
        &self,
        task_id: TaskId,
        source_node: NodeId,
        range_index: usize,
        column_id: ColumnId,
    ) -> String {
        format!(
            "{}/t{task_id}/copy-n{source_node}-r{range_index}-c{column_id}.frag",
            self.temp_root
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_file_paths_are_collision_free_across_seq() {
        let paths = DataPaths::new();
        let a = paths.column_file(ReplicaPartitionId::new(3), ColumnId::new(7), 1);
        let b = paths.column_file(ReplicaPartitionId::new(3), ColumnId::new(7), 2);
        assert_ne!(a, b);
        assert!(a.starts_with("parts/p3/"));
    }

    #[test]
    fn fragment_paths_encode_all_coordinates() {
        let paths = DataPaths::new();
        let path = paths.fragment_file(JobId::new(9), NodeId::new(2), 4, ColumnId::new(1));
        assert_eq!(path, "frag/j9/n2/r4-c1.frag");
    }

    #[test]
    fn temp_paths_are_task_scoped() {
        let paths = DataPaths::new();
        let dir = paths.task_temp_dir(TaskId::new(11));
        let file = paths.temp_column_file(TaskId::new(11), ColumnId::new(2));
        assert!(file.starts_with(&dir));
    }

    #[test]
    fn custom_roots_apply() {
        let paths = DataPaths::with_roots("data", "scratch", "spill");
        assert!(paths
            .column_file(ReplicaPartitionId::new(1), ColumnId::new(1), 0)
            .starts_with("data/"));
        assert_eq!(paths.temp_root(), "scratch");
    }
}
