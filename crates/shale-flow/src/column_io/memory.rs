//! In-memory column store for tests and development.
//!
//! "Files" are decoded column vectors keyed by relative path. The store
//! records the compression tag each file was written with so tests can
//! assert re-encoding, but values are held decoded; the real codecs are
//! external collaborators.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use shale_core::{CompressionType, Datum, Row};

use super::{ColumnStore, OutputFile, RowReader, RowWriter};
use crate::error::{Error, Result};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::column_io("lock poisoned")
}

/// One stored column file.
#[derive(Debug, Clone)]
pub struct ColumnData {
    /// Compression the file was written with.
    pub compression: CompressionType,
    /// Decoded values in stored order.
    pub values: Vec<Datum>,
}

/// In-memory column store; cheap to clone, clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryColumnStore {
    files: Arc<RwLock<HashMap<String, ColumnData>>>,
}

impl MemoryColumnStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a column file directly; test fixture setup.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn put_file(
        &self,
        path: impl Into<String>,
        compression: CompressionType,
        values: Vec<Datum>,
    ) -> Result<()> {
        let mut files = self.files.write().map_err(poison_err)?;
        files.insert(path.into(), ColumnData { compression, values });
        Ok(())
    }

    /// Reads a column file's data, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get_file(&self, path: &str) -> Result<Option<ColumnData>> {
        Ok(self.files.read().map_err(poison_err)?.get(path).cloned())
    }

    /// Returns true if the path holds a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn contains(&self, path: &str) -> Result<bool> {
        Ok(self.files.read().map_err(poison_err)?.contains_key(path))
    }

    /// Number of stored files.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn file_count(&self) -> Result<usize> {
        Ok(self.files.read().map_err(poison_err)?.len())
    }
}

struct MemoryRowReader {
    columns: Vec<Vec<Datum>>,
    pos: usize,
    len: usize,
}

impl RowReader for MemoryRowReader {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.pos >= self.len {
            return Ok(None);
        }
        let row: Row = self
            .columns
            .iter()
            .map(|col| col[self.pos].clone())
            .collect();
        self.pos += 1;
        Ok(Some(row))
    }
}

struct MemoryRowWriter {
    store: MemoryColumnStore,
    paths: Vec<String>,
    compressions: Vec<CompressionType>,
    buffers: Vec<Vec<Datum>>,
}

impl RowWriter for MemoryRowWriter {
    fn write_row(&mut self, row: &Row) -> Result<()> {
        if row.len() != self.buffers.len() {
            return Err(Error::column_io(format!(
                "row arity {} does not match writer column count {}",
                row.len(),
                self.buffers.len()
            )));
        }
        for (buffer, value) in self.buffers.iter_mut().zip(row) {
            buffer.push(value.clone());
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<OutputFile>> {
        let mut outputs = Vec::with_capacity(self.paths.len());
        let mut files = self.store.files.write().map_err(poison_err)?;
        for ((path, compression), values) in self
            .paths
            .into_iter()
            .zip(self.compressions)
            .zip(self.buffers)
        {
            let tuple_count = values.len() as u64;
            files.insert(path.clone(), ColumnData { compression, values });
            outputs.push(OutputFile { path, tuple_count });
        }
        Ok(outputs)
    }
}

impl ColumnStore for MemoryColumnStore {
    fn open_rows(&self, paths: &[String]) -> Result<Box<dyn RowReader>> {
        let files = self.files.read().map_err(poison_err)?;
        let mut columns = Vec::with_capacity(paths.len());
        for path in paths {
            let data = files
                .get(path)
                .ok_or_else(|| Error::column_io(format!("no such column file: {path}")))?;
            columns.push(data.values.clone());
        }
        drop(files);

        let len = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != len) {
            return Err(Error::column_io(format!(
                "column files disagree on tuple count: {paths:?}"
            )));
        }
        Ok(Box::new(MemoryRowReader {
            columns,
            pos: 0,
            len,
        }))
    }

    fn create_rows(
        &self,
        paths: &[String],
        compressions: &[CompressionType],
    ) -> Result<Box<dyn RowWriter>> {
        if paths.len() != compressions.len() {
            return Err(Error::column_io(format!(
                "{} paths but {} compressions",
                paths.len(),
                compressions.len()
            )));
        }
        Ok(Box::new(MemoryRowWriter {
            store: self.clone(),
            paths: paths.to_vec(),
            compressions: compressions.to_vec(),
            buffers: vec![Vec::new(); paths.len()],
        }))
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.write().map_err(poison_err)?;
        let data = files
            .remove(from)
            .ok_or_else(|| Error::column_io(format!("cannot rename missing file: {from}")))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<bool> {
        let mut files = self.files.write().map_err(poison_err)?;
        Ok(files.remove(path).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_col(values: &[i64]) -> Vec<Datum> {
        values.iter().map(|&v| Datum::Int64(v)).collect()
    }

    #[test]
    fn roundtrip_rows_through_store() -> Result<()> {
        let store = MemoryColumnStore::new();
        let paths = vec!["a.col".to_string(), "b.col".to_string()];
        let compressions = vec![CompressionType::None, CompressionType::RunLength];

        let mut writer = store.create_rows(&paths, &compressions)?;
        writer.write_row(&vec![Datum::Int64(1), Datum::String("x".into())])?;
        writer.write_row(&vec![Datum::Int64(2), Datum::String("y".into())])?;
        let outputs = writer.finish()?;
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].tuple_count, 2);

        let mut reader = store.open_rows(&paths)?;
        assert_eq!(
            reader.next_row()?,
            Some(vec![Datum::Int64(1), Datum::String("x".into())])
        );
        assert_eq!(
            reader.next_row()?,
            Some(vec![Datum::Int64(2), Datum::String("y".into())])
        );
        assert_eq!(reader.next_row()?, None);

        // Compression tags are remembered per file.
        let b = store.get_file("b.col")?.unwrap();
        assert_eq!(b.compression, CompressionType::RunLength);
        Ok(())
    }

    #[test]
    fn open_rejects_misaligned_columns() -> Result<()> {
        let store = MemoryColumnStore::new();
        store.put_file("a.col", CompressionType::None, int_col(&[1, 2, 3]))?;
        store.put_file("b.col", CompressionType::None, int_col(&[1, 2]))?;

        let result = store.open_rows(&["a.col".to_string(), "b.col".to_string()]);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn write_rejects_wrong_arity() -> Result<()> {
        let store = MemoryColumnStore::new();
        let mut writer = store.create_rows(
            &["a.col".to_string()],
            &[CompressionType::None],
        )?;
        assert!(writer
            .write_row(&vec![Datum::Int64(1), Datum::Int64(2)])
            .is_err());
        Ok(())
    }

    #[test]
    fn delete_is_idempotent() -> Result<()> {
        let store = MemoryColumnStore::new();
        store.put_file("a.col", CompressionType::None, int_col(&[1]))?;
        assert!(store.delete_file("a.col")?);
        assert!(!store.delete_file("a.col")?);
        Ok(())
    }
}
