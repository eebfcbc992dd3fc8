//! Buddy recovery task.
//!
//! Rebuilds a damaged partition from the healthy partition at the same
//! range index in a sibling scheme of the same replica group. The buddy
//! covers the identical key range by the group invariant, so recovery is
//! a fetch (one reused connection when the buddy is remote) followed by a
//! sort into the target scheme's layout: when the two schemes share a
//! sort column the buddy streams straight through the merge, otherwise
//! its rows are re-sorted first.

use async_trait::async_trait;

use shale_core::{CompressionType, MetaRepository as _};

use crate::column_io::{ColumnStore as _, RowReader, RowWriter as _};
use crate::error::Result;
use crate::merge::{sort_rows, SortedMerge, VecRowReader};
use crate::output::{partition_column_paths, register_partition_output, sort_column_index};
use crate::params::RecoverFromBuddyParams;
use crate::runner::{NodeContext, TaskOutput, TaskProbe, TaskRunner};
use crate::transport::FetchSession;

/// Runner for [`shale_core::task::TaskType::RecoverFromBuddy`].
pub struct RecoverFromBuddyRunner {
    params: RecoverFromBuddyParams,
}

impl RecoverFromBuddyRunner {
    /// Creates the runner from decoded parameters.
    #[must_use]
    pub const fn new(params: RecoverFromBuddyParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl TaskRunner for RecoverFromBuddyRunner {
    async fn run(&self, cx: &NodeContext, probe: &mut TaskProbe) -> Result<TaskOutput> {
        let target_scheme = cx
            .repository
            .get_replica_scheme(self.params.target_scheme_id)
            .await?;
        let buddy_scheme = cx
            .repository
            .get_replica_scheme(self.params.buddy_scheme_id)
            .await?;
        let sort_index = sort_column_index(&self.params.column_ids, target_scheme.sort_column_id)?;

        // Locate the buddy's column files, fetching them over one reused
        // connection when the buddy lives on another node.
        let remote = self
            .params
            .buddy_node_id
            .filter(|&node| node != cx.node_id);
        let mut total_rows: u64 = 0;
        let mut copied: Vec<String> = Vec::new();
        let local_paths = if let Some(source_node) = remote {
            let mut session = FetchSession::new(cx.transport.as_ref());
            let mut paths = Vec::with_capacity(self.params.column_ids.len());
            for &column_id in &self.params.column_ids {
                let file = cx
                    .repository
                    .column_file_by_partition_and_column(
                        self.params.buddy_partition_id,
                        column_id,
                    )
                    .await?;
                let dest = cx.paths.copied_buddy_file(probe.task_id(), column_id);
                let tuples = session.fetch(source_node, &file.file_path, &dest).await?;
                total_rows = total_rows.max(tuples);
                paths.push(dest);
            }
            copied.clone_from(&paths);
            paths
            // Session drops here: the connection is released once the
            // fetch of every column completes.
        } else {
            for &column_id in &self.params.column_ids {
                let file = cx
                    .repository
                    .column_file_by_partition_and_column(
                        self.params.buddy_partition_id,
                        column_id,
                    )
                    .await?;
                total_rows = total_rows.max(file.tuple_count);
            }
            partition_column_paths(
                cx.repository.as_ref(),
                self.params.buddy_partition_id,
                &self.params.column_ids,
            )
            .await?
        };

        let mut reader = cx.columns.open_rows(&local_paths)?;
        let input: Box<dyn RowReader> =
            if buddy_scheme.sort_column_id == target_scheme.sort_column_id {
                reader
            } else {
                // Pre-sorted, but by the wrong column: load and re-sort
                // under the target key.
                Box::new(VecRowReader::new(sort_rows(reader.as_mut(), sort_index)?))
            };

        let compressions: Vec<CompressionType> = self
            .params
            .column_ids
            .iter()
            .map(|&c| target_scheme.compression_for(c))
            .collect();
        let temp_paths: Vec<String> = self
            .params
            .column_ids
            .iter()
            .map(|&c| cx.paths.temp_column_file(probe.task_id(), c))
            .collect();

        let mut merge = SortedMerge::new(vec![input], sort_index)?;
        let mut writer = cx.columns.create_rows(&temp_paths, &compressions)?;
        let rows = crate::output::drain_merge(&mut merge, writer.as_mut(), probe, total_rows).await?;
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

        for path in &copied {
            cx.columns.delete_file(path)?;
        }

        Ok(TaskOutput {
            output_paths: final_paths,
            rows_written: rows,
        })
    }
}
