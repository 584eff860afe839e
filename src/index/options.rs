//! Namespace index options and namespace metadata

use crate::index::error::{IndexError, IndexResult};
use crate::index::Id;
use crate::segment::DEFAULT_MAX_SEGMENT_DOCS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Source of "now" for lifecycle success timestamps
pub type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Whether `write` waits for the batch holding the series to be inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    /// Block until the batch is in the segment index
    Sync,
    /// Return once enqueued
    #[default]
    Async,
}

impl std::str::FromStr for InsertMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sync" => Ok(InsertMode::Sync),
            "async" => Ok(InsertMode::Async),
            other => Err(IndexError::Config(format!("unknown insert mode: {}", other))),
        }
    }
}

impl std::fmt::Display for InsertMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertMode::Sync => write!(f, "sync"),
            InsertMode::Async => write!(f, "async"),
        }
    }
}

/// Insert queue tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertQueueOptions {
    /// Flush interval
    pub batch_backoff: Duration,
    /// Active batch size that forces a flush before the interval elapses
    pub batch_size_threshold: usize,
    /// Active batch size beyond which inserts are refused
    pub max_pending: usize,
}

impl Default for InsertQueueOptions {
    fn default() -> Self {
        Self {
            batch_backoff: Duration::from_millis(2),
            batch_size_threshold: 1024,
            max_pending: 65_536,
        }
    }
}

/// Options for a namespace index
#[derive(Clone)]
pub struct IndexOptions {
    pub insert_mode: InsertMode,
    pub queue: InsertQueueOptions,
    /// Documents per in-memory segment before it seals
    pub max_segment_docs: usize,
    /// Applied when a query does not set its own limit
    pub default_query_limit: Option<usize>,
    pub now_fn: NowFn,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mode(mut self, mode: InsertMode) -> Self {
        self.insert_mode = mode;
        self
    }

    pub fn batch_backoff(mut self, backoff: Duration) -> Self {
        self.queue.batch_backoff = backoff;
        self
    }

    pub fn batch_size_threshold(mut self, threshold: usize) -> Self {
        self.queue.batch_size_threshold = threshold;
        self
    }

    pub fn now_fn(mut self, now_fn: NowFn) -> Self {
        self.now_fn = now_fn;
        self
    }

    /// Reject option combinations the queue cannot run with
    pub fn validate(&self) -> IndexResult<()> {
        if self.queue.batch_backoff.is_zero() {
            return Err(IndexError::Config("batch backoff must be positive".to_string()));
        }
        if self.queue.batch_size_threshold == 0 {
            return Err(IndexError::Config(
                "batch size threshold must be positive".to_string(),
            ));
        }
        if self.queue.max_pending < self.queue.batch_size_threshold {
            return Err(IndexError::Config(format!(
                "max pending ({}) must be at least the batch size threshold ({})",
                self.queue.max_pending, self.queue.batch_size_threshold
            )));
        }
        if self.max_segment_docs == 0 {
            return Err(IndexError::Config("max segment docs must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            insert_mode: InsertMode::default(),
            queue: InsertQueueOptions::default(),
            max_segment_docs: DEFAULT_MAX_SEGMENT_DOCS,
            default_query_limit: None,
            now_fn: Arc::new(Utc::now),
        }
    }
}

impl std::fmt::Debug for IndexOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexOptions")
            .field("insert_mode", &self.insert_mode)
            .field("queue", &self.queue)
            .field("max_segment_docs", &self.max_segment_docs)
            .field("default_query_limit", &self.default_query_limit)
            .finish()
    }
}

/// Namespace-level options relevant to indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceOptions {
    pub index_enabled: bool,
}

impl Default for NamespaceOptions {
    fn default() -> Self {
        Self {
            index_enabled: true,
        }
    }
}

/// Read-only description of the namespace being indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMetadata {
    id: Id,
    options: NamespaceOptions,
}

impl NamespaceMetadata {
    pub fn new(id: impl Into<Id>, options: NamespaceOptions) -> IndexResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(IndexError::Validation("namespace id must not be empty".to_string()));
        }
        Ok(Self { id, options })
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn options(&self) -> &NamespaceOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_valid() {
        let opts = IndexOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.insert_mode, InsertMode::Async);
    }

    #[test]
    fn test_invalid_options() {
        let opts = IndexOptions::new().batch_backoff(Duration::ZERO);
        assert!(matches!(opts.validate(), Err(IndexError::Config(_))));

        let opts = IndexOptions::new().batch_size_threshold(0);
        assert!(opts.validate().is_err());

        let mut opts = IndexOptions::new();
        opts.queue.max_pending = 1;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_insert_mode_parse() {
        assert_eq!("sync".parse::<InsertMode>().unwrap(), InsertMode::Sync);
        assert_eq!("ASYNC".parse::<InsertMode>().unwrap(), InsertMode::Async);
        assert!("eventually".parse::<InsertMode>().is_err());
        assert_eq!(InsertMode::Sync.to_string(), "sync");
    }

    #[test]
    fn test_namespace_metadata() {
        let md = NamespaceMetadata::new("metrics", NamespaceOptions::default()).unwrap();
        assert_eq!(md.id().to_string(), "metrics");
        assert!(md.options().index_enabled);

        assert!(NamespaceMetadata::new("", NamespaceOptions::default()).is_err());
    }
}
