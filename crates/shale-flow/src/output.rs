//! Shared output plumbing for merge and recovery runners.
//!
//! Every producing task ends the same way: drain a sorted stream into a
//! temp file set, promote the temp files to permanent collision-free
//! paths, register them as the partition's column files, and flip the
//! partition status: `OK` with the executing node as owner, or `EMPTY`
//! (zero tuples, zero files) when the stream held no rows.

use shale_core::{
    ColumnFile, ColumnId, MetaRepository, PartitionStatus, PartitionUpdate, ReplicaPartitionId,
    TaskId,
};

use crate::column_io::{ColumnStore as _, OutputFile, RowWriter};
use crate::error::{Error, Result};
use crate::merge::SortedMerge;
use crate::runner::{NodeContext, TaskProbe};

/// Locates the sort column inside a task's column list.
pub(crate) fn sort_column_index(column_ids: &[ColumnId], sort_column_id: ColumnId) -> Result<usize> {
    column_ids
        .iter()
        .position(|&c| c == sort_column_id)
        .ok_or_else(|| {
            Error::TaskExecutionFailed {
                message: format!("sort column {sort_column_id} not among task columns"),
            }
        })
}

/// Resolves a partition's registered column file paths in column order.
pub(crate) async fn partition_column_paths(
    repository: &dyn MetaRepository,
    partition_id: ReplicaPartitionId,
    column_ids: &[ColumnId],
) -> Result<Vec<String>> {
    let mut paths = Vec::with_capacity(column_ids.len());
    for &column_id in column_ids {
        let file = repository
            .column_file_by_partition_and_column(partition_id, column_id)
            .await?;
        paths.push(file.file_path);
    }
    Ok(paths)
}

/// Drains a merge into a writer, reporting progress and honoring
/// cancellation once per bounded chunk. Returns the row count.
pub(crate) async fn drain_merge(
    merge: &mut SortedMerge,
    writer: &mut dyn RowWriter,
    probe: &mut TaskProbe,
    total_rows_hint: u64,
) -> Result<u64> {
    let mut rows: u64 = 0;
    while let Some(row) = merge.next_row()? {
        writer.write_row(&row)?;
        rows += 1;
        #[allow(clippy::cast_precision_loss)]
        let fraction = if total_rows_hint == 0 {
            0.0
        } else {
            (rows as f64 / total_rows_hint as f64).min(0.99)
        };
        probe.tick_rows(1, fraction).await?;
    }
    Ok(rows)
}

/// Promotes temp outputs to permanent paths, registers them, and updates
/// the partition status and owner. Returns the final paths.
///
/// A zero-row output registers no files and marks the partition `EMPTY`.
pub(crate) async fn register_partition_output(
    cx: &NodeContext,
    task_id: TaskId,
    partition_id: ReplicaPartitionId,
    column_ids: &[ColumnId],
    temp_outputs: Vec<OutputFile>,
    rows: u64,
) -> Result<Vec<String>> {
    if rows == 0 {
        for output in &temp_outputs {
            cx.columns.delete_file(&output.path)?;
        }
        cx.repository
            .replace_partition_column_files(partition_id, Vec::new())
            .await?;
        cx.repository
            .update_replica_partition(
                partition_id,
                PartitionUpdate::recovered(PartitionStatus::Empty, cx.node_id),
            )
            .await?;
        return Ok(Vec::new());
    }

    // The task id doubles as the registration sequence number, keeping
    // replacement paths distinct from whatever they replace.
    let seq = task_id.as_u64();
    let mut final_paths = Vec::with_capacity(temp_outputs.len());
    let mut records = Vec::with_capacity(temp_outputs.len());
    for (&column_id, output) in column_ids.iter().zip(&temp_outputs) {
        let final_path = cx.paths.column_file(partition_id, column_id, seq);
        cx.columns.rename_file(&output.path, &final_path)?;
        records.push(ColumnFile::new(
            partition_id,
            column_id,
            final_path.clone(),
            output.tuple_count,
        ));
        final_paths.push(final_path);
    }
    cx.repository
        .replace_partition_column_files(partition_id, records)
        .await?;
    cx.repository
        .update_replica_partition(
            partition_id,
            PartitionUpdate::recovered(PartitionStatus::Ok, cx.node_id),
        )
        .await?;
    Ok(final_paths)
}
