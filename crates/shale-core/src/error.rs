//! Error types shared across Shale components.

/// The result type used throughout shale-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the core entity model and metadata repository.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An identifier string failed to parse.
    #[error("invalid id: {message}")]
    InvalidId {
        /// Description of the parse failure.
        message: String,
    },

    /// An entity lookup failed.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind label (e.g. "job", "replica partition").
        kind: &'static str,
        /// The id that was looked up.
        id: u64,
    },

    /// An invalid status transition was attempted.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// The current status.
        from: String,
        /// The attempted target status.
        to: String,
    },

    /// A layout invariant was violated (ranges out of order, duplicate
    /// rack ownership, mismatched column counts).
    #[error("layout invariant violated: {message}")]
    InvariantViolated {
        /// Description of the violation.
        message: String,
    },

    /// A repository operation failed.
    #[error("repository error: {message}")]
    Repository {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a not-found error for the given entity kind and id.
    #[must_use]
    pub const fn not_found(kind: &'static str, id: u64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Creates a new repository error.
    #[must_use]
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new repository error with a source.
    #[must_use]
    pub fn repository_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Repository {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new invariant-violation error.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolated {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("replica partition", 42);
        assert!(err.to_string().contains("replica partition"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn transition_error_display() {
        let err = Error::InvalidStatusTransition {
            from: "DONE".into(),
            to: "RUNNING".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DONE"));
        assert!(msg.contains("RUNNING"));
    }

    #[test]
    fn repository_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::repository_with_source("failed to load record", source);
        assert!(err.to_string().contains("repository error"));
        assert!(StdError::source(&err).is_some());
    }
}
