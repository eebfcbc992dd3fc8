//! Task runner implementations outside the recovery protocol.

pub mod delete;
pub mod merge;
