//! Observability infrastructure for Shale.
//!
//! Structured logging with consistent spans: initialization helpers plus
//! span constructors used by the controller and the node-side task
//! harness.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `shale_flow=debug`)
///
/// # Example
///
/// ```rust
/// use shale_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for job controller operations.
///
/// # Example
///
/// ```rust
/// use shale_core::observability::job_span;
///
/// let span = job_span("join_tasks", 42);
/// let _guard = span.enter();
/// // ... poll task records
/// ```
#[must_use]
pub fn job_span(operation: &str, job_id: u64) -> Span {
    tracing::info_span!("job", op = operation, job_id = job_id)
}

/// Creates a span for node-side task execution.
#[must_use]
pub fn task_span(operation: &str, task_id: u64, node_id: u64) -> Span {
    tracing::info_span!("task", op = operation, task_id = task_id, node_id = node_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty); // Second call should be no-op
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = job_span("run", 1);
        let _guard = span.enter();
        tracing::info!("message in job span");

        let span = task_span("execute", 2, 3);
        let _guard = span.enter();
        tracing::info!("message in task span");
    }
}
