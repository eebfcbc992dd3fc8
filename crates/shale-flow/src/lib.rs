//! # shale-flow
//!
//! Job orchestration engine and partition recovery protocol for the
//! Shale fractured columnar store.
//!
//! This crate turns a high-level operation (merge, recover-from-failure)
//! into a set of node-local tasks, monitors them to completion under
//! partial failure, and implements the two algorithms that rebuild a
//! lost partition:
//!
//! - **Job Controller**: the per-job state machine, from decomposition
//!   and dispatch through a sleep-then-poll aggregation loop and a
//!   cooperative stop with a bounded wait
//! - **Task Runners**: polymorphic node-local work units with
//!   cooperative cancellation checkpoints, resolved through a static
//!   registry
//! - **Recovery Protocol**: buddy recovery inside a replica group, and
//!   the two-phase repartition pipeline across groups
//! - **K-way Merge**: the shared sorted-merge both paths re-encode
//!   their output through
//!
//! The controller and the nodes communicate exclusively through task
//! records in the metadata repository, a shared-state polling model
//! that trades sub-second responsiveness for restartability.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use shale_core::{InMemoryRepository, MetaRepository};
//! use shale_flow::controller::JobController;
//! use shale_flow::dispatch::memory::InMemoryDispatcher;
//! use shale_flow::error::Result;
//! use shale_flow::jobs::merge::MergeJobDriver;
//!
//! # async fn demo(params: Bytes) -> Result<()> {
//! let repository: Arc<dyn MetaRepository> = Arc::new(InMemoryRepository::new());
//! let dispatcher = Arc::new(InMemoryDispatcher::new());
//! let controller = JobController::new(repository, dispatcher, Arc::new(MergeJobDriver::new()));
//!
//! let job = controller.start_async(params).await?;
//! println!("started job {}", job.id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod column_io;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod merge;
pub mod metrics;
mod output;
pub mod params;
pub mod paths;
pub mod recovery;
pub mod registry;
pub mod runner;
pub mod tasks;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::column_io::{ColumnStore, OutputFile, RowReader, RowWriter};
    pub use crate::controller::{
        DispatchContext, JobController, JobControllerConfig, JobDriver, JobPlan,
    };
    pub use crate::dispatch::{TaskDispatcher, TaskEnvelope};
    pub use crate::error::{Error, Result};
    pub use crate::merge::{sort_rows, SortedMerge, VecRowReader};
    pub use crate::metrics::FlowMetrics;
    pub use crate::params::ParamBlob;
    pub use crate::paths::DataPaths;
    pub use crate::recovery::manifest::{
        ManifestStore, NodeFragmentTable, RepartitionManifest,
    };
    pub use crate::recovery::{select_strategy, RecoveryStrategy};
    pub use crate::registry::TaskRegistry;
    pub use crate::runner::{NodeContext, TaskExecutor, TaskOutput, TaskProbe, TaskRunner};
    pub use crate::transport::{FetchSession, NodeConnection, NodeTransport};
}
