//! # shale-core
//!
//! Core abstractions for the Shale fractured columnar store.
//!
//! This crate provides the foundational types shared by all Shale
//! components:
//!
//! - **Identifiers**: Strongly-typed integer ids for every entity kind
//! - **Entity Model**: Jobs, tasks, fractures, replica layouts, placement
//! - **Status Machines**: The shared job/task lifecycle and partition health
//! - **Metadata Repository**: The durable record store contract, with an
//!   in-memory implementation for tests and development
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `shale-core` is the only crate allowed to define shared primitives.
//! It carries no orchestration logic: decomposing jobs into tasks and
//! recovering partitions live in `shale-flow`.
//!
//! ## Example
//!
//! ```rust
//! use shale_core::prelude::*;
//!
//! let fracture = FractureId::new(7);
//! assert_eq!(fracture.to_string(), "7");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod column;
pub mod error;
pub mod fracture;
pub mod id;
pub mod job;
pub mod observability;
pub mod placement;
pub mod replica;
pub mod repository;
pub mod status;
pub mod table;
pub mod task;
pub mod value;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use shale_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::column::{ColumnFile, CompressionType};
    pub use crate::error::{Error, Result};
    pub use crate::fracture::Fracture;
    pub use crate::id::{
        ColumnFileId, ColumnId, FractureId, JobId, NodeId, RackAssignmentId, RackId, ReplicaGroupId,
        ReplicaId, ReplicaPartitionId, ReplicaSchemeId, SubPartitionSchemeId, TableId, TaskId,
    };
    pub use crate::job::{Job, JobType};
    pub use crate::placement::RackAssignment;
    pub use crate::replica::{Replica, ReplicaGroup, ReplicaPartition, ReplicaScheme, SubPartitionScheme};
    pub use crate::repository::{
        memory::InMemoryRepository, JobUpdate, MetaRepository, PartitionUpdate, TaskUpdate,
    };
    pub use crate::status::{PartitionStatus, ReplicaStatus, RunStatus};
    pub use crate::table::Table;
    pub use crate::task::{Task, TaskType};
    pub use crate::value::{Datum, KeyRange, Row};
}

// Re-export key types at crate root for ergonomics
pub use column::{ColumnFile, CompressionType};
pub use error::{Error, Result};
pub use fracture::Fracture;
pub use id::{
    ColumnFileId, ColumnId, FractureId, JobId, NodeId, RackAssignmentId, RackId, ReplicaGroupId,
    ReplicaId, ReplicaPartitionId, ReplicaSchemeId, SubPartitionSchemeId, TableId, TaskId,
};
pub use job::{Job, JobType};
pub use observability::{init_logging, LogFormat};
pub use placement::RackAssignment;
pub use replica::{Replica, ReplicaGroup, ReplicaPartition, ReplicaScheme, SubPartitionScheme};
pub use repository::memory::InMemoryRepository;
pub use repository::{JobUpdate, MetaRepository, PartitionUpdate, TaskUpdate};
pub use status::{PartitionStatus, ReplicaStatus, RunStatus};
pub use table::Table;
pub use task::{Task, TaskType};
pub use value::{Datum, KeyRange, Row};
