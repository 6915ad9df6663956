//! Error types for the job queue.

use thiserror::Error;

/// Errors raised by [`JobStore`](crate::JobStore) operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("job row carries unknown status '{0}'")]
    CorruptStatus(String),
}

/// A handler failure, classified so the worker can decide whether to retry.
///
/// The category is part of the type rather than something the worker sniffs
/// out of a message string: configuration, validation and output-parsing
/// failures never self-resolve and are terminal on first occurrence, while
/// everything else is retried until the attempt ceiling.
#[derive(Debug, Error)]
pub enum JobError {
    /// Missing credentials, unregistered job type, or similar deployment
    /// problems. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Structurally invalid caller input. Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The referenced entry no longer exists; retrying cannot help.
    #[error("entry not found: {0}")]
    MissingEntry(sqlx::types::Uuid),

    /// Upstream produced output we could not parse into the expected shape.
    /// Carries the raw text (truncated by the worker) for operator debugging.
    #[error("unparseable upstream output: {message}")]
    OutputParsing { message: String, raw_response: String },

    #[error("database error: {0}")]
    Database(#[from] shelfmark_db::DbError),

    #[error("storage error: {0}")]
    Storage(#[from] shelfmark_storage::StorageError),

    /// Transient upstream failure (timeouts, 5xx, unavailable resources).
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("{0}")]
    Other(String),
}

impl JobError {
    /// True when retrying cannot change the outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Validation(_)
                | Self::MissingEntry(_)
                | Self::OutputParsing { .. }
        )
    }

    /// Raw upstream text attached to parsing failures, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::OutputParsing { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(JobError::Configuration("missing api key".into()).is_fatal());
        assert!(JobError::Validation("bad id".into()).is_fatal());
        assert!(JobError::OutputParsing {
            message: "no json".into(),
            raw_response: "hello".into()
        }
        .is_fatal());
        assert!(!JobError::Upstream("HTTP 503".into()).is_fatal());
        assert!(!JobError::Other("boom".into()).is_fatal());
    }

    #[test]
    fn raw_response_only_on_parsing() {
        let err = JobError::OutputParsing {
            message: "no json".into(),
            raw_response: "I'm sorry, as a language model...".into(),
        };
        assert_eq!(err.raw_response(), Some("I'm sorry, as a language model..."));
        assert!(JobError::Upstream("x".into()).raw_response().is_none());
    }
}
