//! Recover task: phase two of cross-group recovery.
//!
//! For one damaged target partition: consult the repartition manifest
//! for every fragment addressed to the partition's range, copy the
//! remote ones to local storage first (shrinking the window during
//! which the data exists only on a remote, possibly still-failing node),
//! sort each fragment by the target sort column, k-way merge, re-encode
//! under the target scheme, register the result, and delete the local
//! copies.

use async_trait::async_trait;

use shale_core::{CompressionType, MetaRepository as _};

use crate::column_io::{ColumnStore as _, RowReader, RowWriter as _};
use crate::error::Result;
use crate::recovery::manifest::ManifestStore as _;
use crate::merge::{sort_rows, SortedMerge, VecRowReader};
use crate::output::{drain_merge, register_partition_output, sort_column_index};
use crate::params::RecoverFragmentsParams;
use crate::runner::{NodeContext, TaskOutput, TaskProbe, TaskRunner};
use crate::transport::FetchSession;

/// Runner for
/// [`shale_core::task::TaskType::RecoverFromRepartitionedFragments`].
pub struct RecoverFragmentsRunner {
    params: RecoverFragmentsParams,
}

impl RecoverFragmentsRunner {
    /// Creates the runner from decoded parameters.
    #[must_use]
    pub const fn new(params: RecoverFragmentsParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl TaskRunner for RecoverFragmentsRunner {
    async fn run(&self, cx: &NodeContext, probe: &mut TaskProbe) -> Result<TaskOutput> {
        let task = cx.repository.get_task(probe.task_id()).await?;
        let scheme = cx
            .repository
            .get_replica_scheme(self.params.target_scheme_id)
            .await?;
        let sort_index = sort_column_index(&self.params.column_ids, scheme.sort_column_id)?;
        let column_count = u32::try_from(self.params.column_ids.len()).unwrap_or(u32::MAX);

        let manifest = cx.manifests.manifest(task.job_id).await?;

        // Copy phase: pull every remote fragment set local over one
        // reused connection per source node.
        let mut copied: Vec<String> = Vec::new();
        let mut fragment_sets: Vec<Vec<String>> = Vec::new();
        {
            let mut session = FetchSession::new(cx.transport.as_ref());
            for node in manifest.nodes() {
                let Some(table) = manifest.table(node) else {
                    continue;
                };
                // An absent range means the node had no rows for it.
                let Some(remote_paths) = table.range_files(self.params.range_index, column_count)?
                else {
                    continue;
                };
                if node == cx.node_id {
                    fragment_sets.push(remote_paths);
                    continue;
                }
                let mut local_paths = Vec::with_capacity(remote_paths.len());
                for (column_index, remote_path) in remote_paths.iter().enumerate() {
                    let dest = cx.paths.copied_fragment_file(
                        probe.task_id(),
                        node,
                        self.params.range_index as usize,
                        self.params.column_ids[column_index],
                    );
                    session.fetch(node, remote_path, &dest).await?;
                    copied.push(dest.clone());
                    local_paths.push(dest);
                }
                fragment_sets.push(local_paths);
                probe.checkpoint(0.0).await?;
            }
        }

        // Fragments are bucketed, never sorted: order each one locally
        // before the k-way merge.
        let mut inputs: Vec<Box<dyn RowReader>> = Vec::with_capacity(fragment_sets.len());
        let mut total_rows: u64 = 0;
        for paths in &fragment_sets {
            let mut reader = cx.columns.open_rows(paths)?;
            let rows = sort_rows(reader.as_mut(), sort_index)?;
            total_rows += rows.len() as u64;
            inputs.push(Box::new(VecRowReader::new(rows)));
        }

        let compressions: Vec<CompressionType> = self
            .params
            .column_ids
            .iter()
            .map(|&c| scheme.compression_for(c))
            .collect();
        let temp_paths: Vec<String> = self
            .params
            .column_ids
            .iter()
            .map(|&c| cx.paths.temp_column_file(probe.task_id(), c))
            .collect();

        let mut merge = SortedMerge::new(inputs, sort_index)?;
        let mut writer = cx.columns.create_rows(&temp_paths, &compressions)?;
        let rows = drain_merge(&mut merge, writer.as_mut(), probe, total_rows).await?;
        let outputs = writer.finish()?;

        let final_paths = register_partition_output(
            cx,
            probe.task_id(),
            self.params.partition_id,
            &self.params.column_ids,
            outputs,
            rows,
        )
        .await?;

        // The copies are redundant once the partition is registered.
        for path in &copied {
            cx.columns.delete_file(path)?;
        }

        Ok(TaskOutput {
            output_paths: final_paths,
            rows_written: rows,
        })
    }
}
