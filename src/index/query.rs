//! Caller-level query types
//!
//! A `Query` is a tag predicate expressed over series tags (and the
//! reserved `_id` field). It translates one-to-one into a `SegmentQuery`.

use crate::segment::{Filter, SegmentQuery};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A tag predicate over series in one namespace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub query: SegmentQuery,
}

impl Query {
    pub fn new(query: SegmentQuery) -> Self {
        Self { query }
    }

    /// Every filter must match
    pub fn and(filters: Vec<Filter>) -> Self {
        Self::new(SegmentQuery::and(filters))
    }

    /// Any filter may match
    pub fn or(filters: Vec<Filter>) -> Self {
        Self::new(SegmentQuery::or(filters))
    }

    pub(crate) fn segment_query(&self) -> &SegmentQuery {
        &self.query
    }
}

impl From<SegmentQuery> for Query {
    fn from(query: SegmentQuery) -> Self {
        Self::new(query)
    }
}

/// Per-query options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of series to return
    pub limit: Option<usize>,
}

impl QueryOptions {
    pub fn limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

/// Cancellation scope for a query
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the query if it has not finished within `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout: Some(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
