//! Same-scheme merge task.
//!
//! K-way merges one or more pre-sorted source partitions of a replica
//! scheme into a target partition, re-encoding every output column with
//! the scheme's compressions. No deduplication; duplicates by sort key
//! are preserved.

use async_trait::async_trait;

use shale_core::{CompressionType, MetaRepository as _};

use crate::column_io::{ColumnStore as _, RowReader, RowWriter as _};
use crate::error::Result;
use crate::merge::SortedMerge;
use crate::output::{drain_merge, partition_column_paths, register_partition_output, sort_column_index};
use crate::params::MergeSameSchemeParams;
use crate::runner::{NodeContext, TaskOutput, TaskProbe, TaskRunner};

/// Runner for [`shale_core::task::TaskType::MergeSameScheme`].
pub struct MergeSameSchemeRunner {
    params: MergeSameSchemeParams,
}

impl MergeSameSchemeRunner {
    /// Creates the runner from decoded parameters.
    #[must_use]
    pub const fn new(params: MergeSameSchemeParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl TaskRunner for MergeSameSchemeRunner {
    async fn run(&self, cx: &NodeContext, probe: &mut TaskProbe) -> Result<TaskOutput> {
        let scheme = cx
            .repository
            .get_replica_scheme(self.params.scheme_id)
            .await?;
        let sort_index = sort_column_index(&self.params.column_ids, scheme.sort_column_id)?;

        let mut inputs: Vec<Box<dyn RowReader>> = Vec::with_capacity(self.params.source_partition_ids.len());
        let mut total_rows: u64 = 0;
        for &source_id in &self.params.source_partition_ids {
            for file in cx.repository.all_column_files_by_partition(source_id).await? {
                if file.column_id == scheme.sort_column_id {
                    total_rows += file.tuple_count;
                }
            }
            let paths =
                partition_column_paths(cx.repository.as_ref(), source_id, &self.params.column_ids)
                    .await?;
            inputs.push(cx.columns.open_rows(&paths)?);
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
            self.params.target_partition_id,
            &self.params.column_ids,
            outputs,
            rows,
        )
        .await?;

        Ok(TaskOutput {
            output_paths: final_paths,
            rows_written: rows,
        })
    }
}
