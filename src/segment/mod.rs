//! Segment Index
//!
//! The search structure underneath a namespace index. The namespace index
//! only relies on the `SegmentIndex` contract:
//!
//! - **insert**: bulk write of documents
//! - **execute**: run a structured query, returning a lazy document
//!   iterator plus whether the result is exhaustive
//!
//! `MemIndex` is the in-memory implementation: a list of `MemSegment`s
//! where the newest one accepts inserts until it seals.
//!
//! # Architecture
//!
//! ```text
//! insert(batch) ──▶ active MemSegment ──(full)──▶ sealed segments
//!
//! execute(query)
//!        ↓
//! snapshot [seg0, seg1, ..., active]
//!        ↓
//! per-segment postings → lazy iterator, IDs de-duplicated across segments
//! ```

mod index;
mod mem;
mod query;

pub use index::{MemIndex, DEFAULT_MAX_SEGMENT_DOCS};
pub use mem::MemSegment;
pub use query::{CompiledQuery, Conjunction, Filter, SegmentQuery};

use crate::index::Document;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised by a segment index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// Regexp filter failed to compile
    #[error("Invalid regexp {pattern:?}: {error}")]
    InvalidRegexp { pattern: String, error: String },

    /// Execution was cancelled by the caller
    #[error("Execution cancelled")]
    Cancelled,

    /// Segment index has been closed
    #[error("Segment index is closed")]
    Closed,

    /// Bulk insert failed
    #[error("Insert failed: {0}")]
    Insert(String),
}

/// Result type alias for segment operations
pub type SegmentResult<T> = Result<T, SegmentError>;

/// Lazy stream of matched documents
pub type DocIter = Box<dyn Iterator<Item = SegmentResult<Document>> + Send>;

/// Options for a single query execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Maximum number of documents to return
    pub limit: Option<usize>,
}

/// Output of `SegmentIndex::execute`
pub struct ExecuteResult {
    pub iter: DocIter,
    /// False when `iter` may omit matching documents
    pub exhaustive: bool,
}

/// Statistics about a segment index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStats {
    /// Number of segments, including the one accepting inserts
    pub segments: usize,
    /// Number of indexed documents
    pub documents: usize,
}

/// Contract of the segment index consumed by the namespace index
///
/// Implementations must allow concurrent `execute` calls alongside one
/// in-flight `insert`.
#[async_trait]
pub trait SegmentIndex: Send + Sync {
    /// Insert documents in order
    async fn insert(&self, docs: &[Document]) -> SegmentResult<()>;

    /// Execute a query
    async fn execute(
        &self,
        query: &SegmentQuery,
        opts: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> SegmentResult<ExecuteResult>;

    /// Release resources; later calls fail with `SegmentError::Closed`
    async fn close(&self) -> SegmentResult<()>;

    fn stats(&self) -> SegmentStats;
}
