//! Table records.

use serde::{Deserialize, Serialize};

use crate::id::{ColumnId, TableId};

/// A table: the logical column set shared by every replica layout.
///
/// Created once and immutable afterward. The column order here is the
/// row order used by merges and recoveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Unique table identifier.
    pub id: TableId,
    /// Human-readable name.
    pub name: String,
    /// Logical columns in row order.
    pub column_ids: Vec<ColumnId>,
}

impl Table {
    /// Creates a new table record.
    #[must_use]
    pub fn new(id: TableId, name: impl Into<String>, column_ids: Vec<ColumnId>) -> Self {
        Self {
            id,
            name: name.into(),
            column_ids,
        }
    }
}
