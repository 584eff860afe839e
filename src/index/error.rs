//! Namespace index error types
//!
//! Every failure a caller can observe from the write, query and lifecycle
//! paths of the namespace index.

use crate::segment::SegmentError;
use thiserror::Error;

/// Errors that can occur in the namespace index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Document construction rejected the identifier/tag pair
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation attempted after the index began closing
    #[error("Namespace index is closed")]
    Closed,

    /// Enqueue into the insert queue failed
    #[error("Insert queue error: {0}")]
    Queue(String),

    /// Bulk insert of a whole batch failed
    #[error("Batch insert failed: {0}")]
    BatchInsert(String),

    /// Segment index could not evaluate the query
    #[error("Query error: {0}")]
    Query(String),

    /// Query was cancelled or timed out
    #[error("Query cancelled")]
    Cancelled,

    /// Insert queue failed to start
    #[error("Startup error: {0}")]
    Startup(String),

    /// Insert queue failed to stop cleanly
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// Invalid options
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<SegmentError> for IndexError {
    fn from(err: SegmentError) -> Self {
        match err {
            SegmentError::Cancelled => IndexError::Cancelled,
            SegmentError::Closed => IndexError::Closed,
            SegmentError::Insert(msg) => IndexError::BatchInsert(msg),
            other => IndexError::Query(other.to_string()),
        }
    }
}

/// Result type alias for namespace index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::Validation("reserved field name".to_string());
        assert_eq!(err.to_string(), "Validation error: reserved field name");

        assert_eq!(IndexError::Closed.to_string(), "Namespace index is closed");
    }

    #[test]
    fn test_segment_error_conversion() {
        let err: IndexError = SegmentError::Cancelled.into();
        assert_eq!(err, IndexError::Cancelled);

        let err: IndexError = SegmentError::Insert("disk full".to_string()).into();
        assert!(matches!(err, IndexError::BatchInsert(_)));

        let err: IndexError = SegmentError::InvalidRegexp {
            pattern: "(".to_string(),
            error: "unclosed group".to_string(),
        }
        .into();
        assert!(matches!(err, IndexError::Query(_)));
    }
}
