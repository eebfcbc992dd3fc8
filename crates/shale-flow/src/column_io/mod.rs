//! Row-aligned access to partition column files.
//!
//! The physical encodings (fixed-length, variable-length, dictionary,
//! RLE, block compression) live behind this seam in an external
//! collaborator. The engine only needs two capabilities:
//!
//! - open the column files of a partition and iterate its tuples in
//!   stored order ([`RowReader`]), and
//! - write a new file set, one file per logical column, re-encoding each
//!   column with a caller-chosen [`CompressionType`] ([`RowWriter`]).
//!
//! Readers and writers are synchronous: they wrap node-local disk I/O,
//! and the runners driving them interleave their own cancellation
//! checkpoints between bounded row chunks.

pub mod memory;

use shale_core::CompressionType;
use shale_core::Row;

use crate::error::Result;

/// One produced column file, positionally aligned with the writer's
/// path/compression arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Node-local relative path.
    pub path: String,
    /// Tuples written.
    pub tuple_count: u64,
}

/// Iterates a partition's tuples in stored order.
pub trait RowReader: Send {
    /// Returns the next row, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if a column file is missing, truncated, or
    /// row-misaligned with its siblings.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Writes tuples into one file per logical column.
pub trait RowWriter: Send {
    /// Appends one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row's arity does not match the writer's
    /// column count or the underlying write fails.
    fn write_row(&mut self, row: &Row) -> Result<()>;

    /// Flushes and closes every column file, returning one entry per
    /// column in writer order.
    ///
    /// # Errors
    ///
    /// Returns an error if finalizing any column file fails.
    fn finish(self: Box<Self>) -> Result<Vec<OutputFile>>;
}

/// Node-local column file store.
///
/// Paths are relative to the node's data root (see
/// [`crate::paths::DataPaths`]).
pub trait ColumnStore: Send + Sync {
    /// Opens one file per logical column and zips them into row-aligned
    /// iteration. Files must hold the same tuple count.
    ///
    /// # Errors
    ///
    /// Returns an error if any file is missing or the files disagree on
    /// tuple count.
    fn open_rows(&self, paths: &[String]) -> Result<Box<dyn RowReader>>;

    /// Creates a writer producing one file per path, encoding column `i`
    /// with `compressions[i]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the arrays disagree in length or a file
    /// cannot be created.
    fn create_rows(
        &self,
        paths: &[String],
        compressions: &[CompressionType],
    ) -> Result<Box<dyn RowWriter>>;

    /// Moves a file to a new path. Used to promote temp outputs to their
    /// permanent, collision-free locations at registration time.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is missing or the move fails.
    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    /// Deletes a file, returning whether it existed. Missing files are
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the delete itself fails.
    fn delete_file(&self, path: &str) -> Result<bool>;
}
