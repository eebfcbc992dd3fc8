//! Repartition summaries.
//!
//! The repartition phase of cross-group recovery produces one fragment
//! table per source node: a (target range index × logical column index)
//! grid of fragment file paths. A node's table is published exactly once
//! and is immutable afterward; recover-phase readers are only created
//! after every repartition task has finished, so a reader never observes
//! a partially written manifest.
//!
//! Absent cells mean "this node had no rows for this range" and are
//! treated as empty, never as an error.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use shale_core::{JobId, NodeId};

use crate::error::{Error, Result};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Core(shale_core::Error::repository("lock poisoned"))
}

/// Fragment files produced by one source node, addressed by
/// (target range index, logical column index).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFragmentTable {
    cells: BTreeMap<u32, BTreeMap<u32, String>>,
}

impl NodeFragmentTable {
    /// Creates an empty table (a node whose sources held no rows at all).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the fragment file for one (range, column) cell.
    pub fn insert(&mut self, range_index: u32, column_index: u32, path: impl Into<String>) {
        self.cells
            .entry(range_index)
            .or_default()
            .insert(column_index, path.into());
    }

    /// Returns the fragment path for one cell, if the node produced rows
    /// for that range.
    #[must_use]
    pub fn fragment(&self, range_index: u32, column_index: u32) -> Option<&str> {
        self.cells
            .get(&range_index)
            .and_then(|columns| columns.get(&column_index))
            .map(String::as_str)
    }

    /// Returns the full column file set this node produced for a target
    /// range: one path per column index `0..column_count`, or `None` if
    /// the node had no rows for the range.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is only partially populated; a
    /// producer writes all columns of a range or none.
    pub fn range_files(&self, range_index: u32, column_count: u32) -> Result<Option<Vec<String>>> {
        let Some(columns) = self.cells.get(&range_index) else {
            return Ok(None);
        };
        let mut paths = Vec::with_capacity(column_count as usize);
        for column_index in 0..column_count {
            let path = columns.get(&column_index).ok_or_else(|| {
                Error::Core(shale_core::Error::invariant(format!(
                    "fragment table missing column {column_index} for range {range_index}"
                )))
            })?;
            paths.push(path.clone());
        }
        Ok(Some(paths))
    }

    /// Every fragment path in the table.
    #[must_use]
    pub fn all_paths(&self) -> Vec<String> {
        self.cells
            .values()
            .flat_map(|columns| columns.values().cloned())
            .collect()
    }

    /// True if the node produced no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// The full manifest of one recovery job's repartition phase, keyed by
/// source node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepartitionManifest {
    by_node: BTreeMap<NodeId, NodeFragmentTable>,
}

impl RepartitionManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The source nodes that have published tables.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.by_node.keys().copied().collect()
    }

    /// One node's fragment table, if published.
    #[must_use]
    pub fn table(&self, node: NodeId) -> Option<&NodeFragmentTable> {
        self.by_node.get(&node)
    }

    fn insert(&mut self, node: NodeId, table: NodeFragmentTable) {
        self.by_node.insert(node, table);
    }
}

/// Storage for repartition summaries.
///
/// A (job, source node) table is write-once: a second publish for the
/// same key is an error, never a silent overwrite.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Publishes one source node's fragment table for a job.
    async fn publish(&self, job_id: JobId, node_id: NodeId, table: NodeFragmentTable)
        -> Result<()>;

    /// Reads the manifest accumulated for a job. A job with no published
    /// tables yields an empty manifest.
    async fn manifest(&self, job_id: JobId) -> Result<RepartitionManifest>;
}

/// In-memory manifest store for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryManifestStore {
    manifests: RwLock<BTreeMap<JobId, RepartitionManifest>>,
}

impl InMemoryManifestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestStore for InMemoryManifestStore {
    async fn publish(
        &self,
        job_id: JobId,
        node_id: NodeId,
        table: NodeFragmentTable,
    ) -> Result<()> {
        let mut manifests = self.manifests.write().map_err(poison_err)?;
        let manifest = manifests.entry(job_id).or_default();
        if manifest.table(node_id).is_some() {
            return Err(Error::ManifestAlreadyPublished { job_id, node_id });
        }
        manifest.insert(node_id, table);
        Ok(())
    }

    async fn manifest(&self, job_id: JobId) -> Result<RepartitionManifest> {
        let manifests = self.manifests.read().map_err(poison_err)?;
        Ok(manifests.get(&job_id).cloned().unwrap_or_default())
    }
}
