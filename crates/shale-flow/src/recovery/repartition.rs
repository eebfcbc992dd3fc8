//! Repartition task: phase one of cross-group recovery.
//!
//! Reads the node's local source partitions and redistributes their rows
//! by the *target* group's partitioning column into one fragment file
//! set per target range. This is bucketing, not sorting: fragments are
//! written in arrival order and the recover phase sorts them locally.
//! Fragments are uncompressed: they are short-lived transfer files, and
//! the recover phase re-encodes under the target scheme anyway.
//!
//! When every source row is bucketed the node publishes its fragment
//! table exactly once; the table is immutable afterward.

use async_trait::async_trait;

use shale_core::value::range_index_for;
use shale_core::{CompressionType, MetaRepository as _};

use crate::column_io::{ColumnStore as _, RowReader as _, RowWriter};
use crate::error::{Error, Result};
use crate::recovery::manifest::ManifestStore as _;
use crate::output::partition_column_paths;
use crate::params::RepartitionParams;
use crate::recovery::manifest::NodeFragmentTable;
use crate::runner::{NodeContext, TaskOutput, TaskProbe, TaskRunner};

/// Runner for [`shale_core::task::TaskType::Repartition`].
pub struct RepartitionRunner {
    params: RepartitionParams,
}

impl RepartitionRunner {
    /// Creates the runner from decoded parameters.
    #[must_use]
    pub const fn new(params: RepartitionParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl TaskRunner for RepartitionRunner {
    async fn run(&self, cx: &NodeContext, probe: &mut TaskProbe) -> Result<TaskOutput> {
        let task = cx.repository.get_task(probe.task_id()).await?;
        let group = cx
            .repository
            .get_replica_group(self.params.target_group_id)
            .await?;
        if group.partitioning_column_id != Some(self.params.partitioning_column_id) {
            return Err(Error::TaskExecutionFailed {
                message: format!(
                    "group {} does not partition by column {}",
                    group.id, self.params.partitioning_column_id
                ),
            });
        }
        let bucket_index = self
            .params
            .column_ids
            .iter()
            .position(|&c| c == self.params.partitioning_column_id)
            .ok_or_else(|| Error::TaskExecutionFailed {
                message: "partitioning column not among task columns".to_string(),
            })?;

        let mut total_rows: u64 = 0;
        for &source_id in &self.params.source_partition_ids {
            let file = cx
                .repository
                .column_file_by_partition_and_column(source_id, self.params.partitioning_column_id)
                .await?;
            total_rows += file.tuple_count;
        }

        // One lazily created writer per target range; an untouched range
        // simply never appears in the fragment table.
        let fragment_compressions =
            vec![CompressionType::None; self.params.column_ids.len()];
        let mut writers: Vec<Option<Box<dyn RowWriter>>> = Vec::new();
        writers.resize_with(group.ranges.len(), || None);

        let mut rows_done: u64 = 0;
        for &source_id in &self.params.source_partition_ids {
            let paths =
                partition_column_paths(cx.repository.as_ref(), source_id, &self.params.column_ids)
                    .await?;
            let mut reader = cx.columns.open_rows(&paths)?;
            while let Some(row) = reader.next_row()? {
                let range_index = range_index_for(&group.ranges, &row[bucket_index])
                    .ok_or_else(|| Error::TaskExecutionFailed {
                        message: format!(
                            "row key {} outside every target range of group {}",
                            row[bucket_index], group.id
                        ),
                    })?;
                if writers[range_index].is_none() {
                    let paths: Vec<String> = self
                        .params
                        .column_ids
                        .iter()
                        .map(|&c| {
                            cx.paths
                                .fragment_file(task.job_id, cx.node_id, range_index, c)
                        })
                        .collect();
                    writers[range_index] =
                        Some(cx.columns.create_rows(&paths, &fragment_compressions)?);
                }
                if let Some(writer) = writers[range_index].as_mut() {
                    writer.write_row(&row)?;
                }
                rows_done += 1;
                #[allow(clippy::cast_precision_loss)]
                let fraction = if total_rows == 0 {
                    0.0
                } else {
                    (rows_done as f64 / total_rows as f64).min(0.99)
                };
                probe.tick_rows(1, fraction).await?;
            }
        }

        let mut table = NodeFragmentTable::new();
        let mut output_paths = Vec::new();
        for (range_index, slot) in writers.into_iter().enumerate() {
            let Some(writer) = slot else { continue };
            let outputs = writer.finish()?;
            for (column_index, output) in outputs.into_iter().enumerate() {
                let range = u32::try_from(range_index).unwrap_or(u32::MAX);
                let column = u32::try_from(column_index).unwrap_or(u32::MAX);
                table.insert(range, column, output.path.clone());
                output_paths.push(output.path);
            }
        }

        cx.manifests
            .publish(task.job_id, cx.node_id, table)
            .await?;

        Ok(TaskOutput {
            output_paths,
            rows_written: rows_done,
        })
    }
}
