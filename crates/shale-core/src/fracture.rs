//! Fracture records.

use serde::{Deserialize, Serialize};

use crate::id::{FractureId, TableId};
use crate::value::KeyRange;

/// An independent, non-overlapping slice of a table along its monotonic
/// fracturing column.
///
/// Fractures are wholly independent: no recovery, I/O, or consistency
/// constraint ever spans two fractures. They are created once at import
/// time and immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fracture {
    /// Unique fracture identifier.
    pub id: FractureId,
    /// Owning table.
    pub table_id: TableId,
    /// Key range of the fracturing column covered by this fracture.
    pub key_range: KeyRange,
    /// Approximate tuple count, maintained at import time.
    pub tuple_count: u64,
}

impl Fracture {
    /// Creates a new fracture record.
    #[must_use]
    pub const fn new(
        id: FractureId,
        table_id: TableId,
        key_range: KeyRange,
        tuple_count: u64,
    ) -> Self {
        Self {
            id,
            table_id,
            key_range,
            tuple_count,
        }
    }
}
