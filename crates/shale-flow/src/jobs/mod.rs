//! Concrete job drivers.
//!
//! A driver owns one job type's decomposition and dispatch policy;
//! the controller owns the lifecycle around it. Import decomposition
//! lives with the bulk loader, outside this crate.

pub mod merge;
pub mod recovery;
