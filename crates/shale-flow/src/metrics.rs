//! Observability metrics for orchestration and recovery.
//!
//! Exposed through the `metrics` crate facade; install an exporter
//! (e.g. Prometheus) in the embedding process to scrape them.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `shale_flow_jobs_total` | Counter | `status` | Finished jobs by final status |
//! | `shale_flow_tasks_total` | Counter | `task_type`, `status` | Finished tasks |
//! | `shale_flow_rows_merged_total` | Counter | `task_type` | Rows written by merging runners |
//! | `shale_flow_poll_tick_seconds` | Histogram | - | Controller poll tick duration |

use metrics::{counter, histogram};
use std::time::Duration;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: finished jobs by final status.
    pub const JOBS_TOTAL: &str = "shale_flow_jobs_total";
    /// Counter: finished tasks by type and final status.
    pub const TASKS_TOTAL: &str = "shale_flow_tasks_total";
    /// Counter: rows written by merging runners.
    pub const ROWS_MERGED_TOTAL: &str = "shale_flow_rows_merged_total";
    /// Histogram: controller poll tick duration in seconds.
    pub const POLL_TICK_SECONDS: &str = "shale_flow_poll_tick_seconds";
}

/// Label keys used across metrics.
pub mod labels {
    /// Final status label (done, error, canceled).
    pub const STATUS: &str = "status";
    /// Task type label.
    pub const TASK_TYPE: &str = "task_type";
}

/// High-level recorder for orchestration metrics. Cheap to clone and
/// share.
#[derive(Debug, Clone, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates a new recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a job reaching a finished status.
    pub fn record_job_finished(&self, status: &str) {
        counter!(names::JOBS_TOTAL, labels::STATUS => status.to_string()).increment(1);
    }

    /// Records a task reaching a finished status.
    pub fn record_task_finished(&self, task_type: &str, status: &str) {
        counter!(
            names::TASKS_TOTAL,
            labels::TASK_TYPE => task_type.to_string(),
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records rows written by a merging runner.
    pub fn record_rows_merged(&self, task_type: &str, rows: u64) {
        counter!(names::ROWS_MERGED_TOTAL, labels::TASK_TYPE => task_type.to_string())
            .increment(rows);
    }

    /// Records one controller poll tick.
    pub fn observe_poll_tick(&self, duration: Duration) {
        histogram!(names::POLL_TICK_SECONDS).record(duration.as_secs_f64());
    }
}
