//! Common error types used throughout mediaflow.
//!
//! This module provides a unified error type covering the failure classes of
//! the transcoding workflow: configuration problems, input validation,
//! copy-integrity violations, premature publication requests, and failures
//! reported by the storage and engine collaborators.

/// Common error type for mediaflow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The process or a job submission is misconfigured (missing credentials,
    /// unknown processor name). Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input was provided (unsupported source object, malformed
    /// notification payload).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A copied object's byte length does not match its source.
    #[error("Integrity error: copied {actual} bytes, expected {expected}")]
    Integrity {
        /// Byte length of the source object.
        expected: u64,
        /// Byte length observed at the destination.
        actual: u64,
    },

    /// Publication was requested for a job that is not finished. Surfaced to
    /// the caller, never retried automatically.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The requested item was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An object store or queue operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The transcoding engine reported a failure.
    #[error("Engine error: {0}")]
    Engine(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new Configuration error.
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new Validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new NotReady error.
    pub fn not_ready<S: Into<String>>(msg: S) -> Self {
        Self::NotReady(msg.into())
    }

    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new Engine error.
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        Self::Engine(msg.into())
    }

    /// Whether queue redelivery may succeed where this attempt failed.
    ///
    /// Configuration and not-ready errors are terminal: redelivering the same
    /// message cannot fix a missing processor or a job that was never
    /// finished. Everything else is left to the bounded retry policy of the
    /// queue runtime; in particular an integrity failure preserves the source
    /// object precisely so a redelivery can re-attempt the copy.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::Configuration(_) | Self::NotReady(_))
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::configuration("missing media service key");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing media service key"
        );

        let err = Error::validation("not a block object");
        assert_eq!(err.to_string(), "Invalid input: not a block object");

        let err = Error::Integrity {
            expected: 100,
            actual: 42,
        };
        assert_eq!(
            err.to_string(),
            "Integrity error: copied 42 bytes, expected 100"
        );

        let err = Error::not_ready("job is not finished");
        assert_eq!(err.to_string(), "Not ready: job is not finished");

        let err = Error::not_found("asset");
        assert_eq!(err.to_string(), "Not found: asset");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_retry_classification() {
        assert!(!Error::configuration("bad").is_retriable());
        assert!(!Error::not_ready("pending").is_retriable());

        assert!(Error::validation("garbage payload").is_retriable());
        assert!(Error::storage("network fault").is_retriable());
        assert!(Error::engine("throttled").is_retriable());
        assert!(Error::Integrity {
            expected: 1,
            actual: 0
        }
        .is_retriable());
    }

    #[test]
    fn test_result_type() {
        fn test_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(test_fn().unwrap(), 42);

        fn error_fn() -> Result<i32> {
            Err(Error::not_found("job"))
        }
        assert!(error_fn().is_err());
    }
}
