//! Strongly-typed identifiers for Shale entities.
//!
//! All identifiers are:
//! - **Strongly typed**: Prevents mixing up different id types at compile time
//! - **Repository-assigned**: Small integers handed out by the metadata
//!   repository's per-entity sequences; zero is the "unassigned" sentinel
//!   carried by freshly built records before their first insert
//! - **Stable**: An id never changes for the lifetime of its entity
//!
//! # Example
//!
//! ```rust
//! use shale_core::id::{FractureId, ReplicaId};
//!
//! let fracture = FractureId::new(3);
//! let replica = ReplicaId::new(3);
//!
//! // Ids are different types - this won't compile:
//! // let wrong: FractureId = replica;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// The zero sentinel for records that have not been inserted yet.
            pub const UNASSIGNED: Self = Self(0);

            /// Creates an id from a raw value.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw integer value.
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            /// Returns true if this id has not been assigned by the
            /// repository yet.
            #[must_use]
            pub const fn is_unassigned(&self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.parse::<u64>().map(Self).map_err(|e| Error::InvalidId {
                    message: format!(concat!("invalid ", $label, " id '{}': {}"), s, e),
                })
            }
        }
    };
}

entity_id!(
    /// A unique identifier for an orchestration job.
    JobId, "job"
);
entity_id!(
    /// A unique identifier for a node-local task within a job.
    TaskId, "task"
);
entity_id!(
    /// A unique identifier for a storage node.
    NodeId, "node"
);
entity_id!(
    /// A unique identifier for a table.
    TableId, "table"
);
entity_id!(
    /// A unique identifier for a logical column of a table.
    ColumnId, "column"
);
entity_id!(
    /// A unique identifier for a fracture (an independent slice of a
    /// table along its monotonic fracturing column).
    FractureId, "fracture"
);
entity_id!(
    /// A unique identifier for a replica group.
    ReplicaGroupId, "replica group"
);
entity_id!(
    /// A unique identifier for a replica scheme (one physical layout).
    ReplicaSchemeId, "replica scheme"
);
entity_id!(
    /// A unique identifier for a replica (one scheme instantiated for one
    /// fracture).
    ReplicaId, "replica"
);
entity_id!(
    /// A unique identifier for a replica partition (the smallest
    /// physically stored unit).
    ReplicaPartitionId, "replica partition"
);
entity_id!(
    /// A unique identifier for a sub-partition scheme (the shared
    /// per-fracture, per-group range definition).
    SubPartitionSchemeId, "sub-partition scheme"
);
entity_id!(
    /// A unique identifier for a rack of storage nodes.
    RackId, "rack"
);
entity_id!(
    /// A unique identifier for a rack assignment record.
    RackAssignmentId, "rack assignment"
);
entity_id!(
    /// A unique identifier for a registered column file.
    ColumnFileId, "column file"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrip() {
        let id = JobId::new(17);
        let s = id.to_string();
        let parsed: JobId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn unassigned_sentinel() {
        assert!(TaskId::UNASSIGNED.is_unassigned());
        assert!(!TaskId::new(1).is_unassigned());
    }

    #[test]
    fn invalid_id_returns_error() {
        let result: Result<FractureId> = "not-a-number".parse();
        assert!(result.is_err());
    }

    #[test]
    fn serde_transparent() {
        let id = ReplicaPartitionId::new(9);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "9");
        let back: ReplicaPartitionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
