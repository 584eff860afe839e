//! Namespace Index - Write and query entry point for one namespace
//!
//! Owns the insert queue and the segment index:
//!
//! ```text
//! write(id, tags, hooks)
//!   1. build_document        ── invalid ──▶ finalize, Validation error
//!   2. closed?               ── yes ──────▶ finalize, Closed error
//!   3. queue.insert          ── refused ──▶ (queue finalizes) Queue error
//!   4. Sync: await batch completion / Async: return
//!
//! query(ctx, query, opts)
//!   segment.execute ──▶ ResultsIter (namespace, id, tags)
//! ```
//!
//! The closed flag is read under the same lock that is held while the
//! request is placed in the active batch, and `close` takes that lock
//! exclusively before stopping the queue. A write therefore either lands in
//! a batch the stopping queue still drains, or sees the index closed.

use crate::index::error::{IndexError, IndexResult};
use crate::index::insert_queue::{
    new_insert_queue_fn, InsertBatchFn, InsertQueue, InsertQueueStats, NewInsertQueueFn,
};
use crate::index::lifecycle::{LifecycleGuard, OnIndexSeries};
use crate::index::options::{IndexOptions, InsertMode, NamespaceMetadata};
use crate::index::query::{Query, QueryContext, QueryOptions};
use crate::index::results::{QueryResults, ResultsIter};
use crate::index::{build_document, Document, Id, Tag};
use crate::segment::{ExecuteOptions, MemIndex, SegmentError, SegmentIndex, SegmentStats};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Statistics about a namespace index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub queue: InsertQueueStats,
    pub segment: SegmentStats,
}

/// Feeds queue batches into the segment index
struct SegmentBatchInserter {
    segment: Arc<dyn SegmentIndex>,
}

#[async_trait]
impl InsertBatchFn for SegmentBatchInserter {
    async fn insert_batch(&self, docs: &[Document]) -> IndexResult<()> {
        self.segment
            .insert(docs)
            .await
            .map_err(|e| IndexError::BatchInsert(e.to_string()))
    }
}

struct IndexState {
    closed: bool,
}

/// Index over the series of one namespace
pub struct NamespaceIndex {
    metadata: NamespaceMetadata,
    insert_mode: InsertMode,
    default_query_limit: Option<usize>,
    queue: Arc<dyn InsertQueue>,
    segment: Arc<dyn SegmentIndex>,
    state: RwLock<IndexState>,
}

impl NamespaceIndex {
    /// Open an index backed by an in-memory segment index
    pub fn new(
        metadata: NamespaceMetadata,
        new_queue_fn: NewInsertQueueFn,
        opts: IndexOptions,
    ) -> IndexResult<Self> {
        let segment = Arc::new(MemIndex::with_max_segment_docs(opts.max_segment_docs));
        Self::with_segment_index(metadata, segment, new_queue_fn, opts)
    }

    /// Open an index with the production insert queue
    pub fn open(metadata: NamespaceMetadata, opts: IndexOptions) -> IndexResult<Self> {
        Self::new(metadata, new_insert_queue_fn(), opts)
    }

    /// Open an index over any segment index
    pub fn with_segment_index(
        metadata: NamespaceMetadata,
        segment: Arc<dyn SegmentIndex>,
        new_queue_fn: NewInsertQueueFn,
        opts: IndexOptions,
    ) -> IndexResult<Self> {
        if !metadata.options().index_enabled {
            return Err(IndexError::Config(format!(
                "indexing is disabled for namespace {}",
                metadata.id()
            )));
        }
        opts.validate()?;

        let batch_fn = Arc::new(SegmentBatchInserter {
            segment: Arc::clone(&segment),
        });
        let queue = new_queue_fn(batch_fn, Arc::clone(&opts.now_fn), opts.queue.clone());
        queue.start().map_err(|e| match e {
            IndexError::Startup(_) => e,
            other => IndexError::Startup(other.to_string()),
        })?;

        tracing::info!(
            namespace = %metadata.id(),
            insert_mode = %opts.insert_mode,
            batch_backoff = ?opts.queue.batch_backoff,
            "Namespace index opened"
        );

        Ok(Self {
            metadata,
            insert_mode: opts.insert_mode,
            default_query_limit: opts.default_query_limit,
            queue,
            segment,
            state: RwLock::new(IndexState { closed: false }),
        })
    }

    /// Index a series
    ///
    /// `hooks.on_index_finalize` fires exactly once whatever the outcome;
    /// `on_index_success` fires only once the series is in the segment
    /// index. In `InsertMode::Async` a batch insert failure is not reported
    /// here; it is logged and counted in `stats()`.
    pub async fn write(&self, id: &Id, tags: &[Tag], hooks: Arc<dyn OnIndexSeries>) -> IndexResult<()> {
        let lifecycle = LifecycleGuard::new(hooks);

        let doc = match build_document(id, tags) {
            Ok(doc) => doc,
            Err(e) => {
                lifecycle.finalize();
                tracing::debug!(namespace = %self.metadata.id(), series = %id, error = %e, "Rejected series");
                return Err(e);
            }
        };

        let handle = {
            let state = self.state.read();
            if state.closed {
                drop(state);
                lifecycle.finalize();
                return Err(IndexError::Closed);
            }
            self.queue.insert(doc, lifecycle).map_err(|e| {
                tracing::debug!(namespace = %self.metadata.id(), series = %id, error = %e, "Enqueue failed");
                e
            })?
        };

        match self.insert_mode {
            InsertMode::Async => Ok(()),
            InsertMode::Sync => handle.wait().await,
        }
    }

    /// Find series matching `query`
    pub async fn query(
        &self,
        ctx: &QueryContext,
        query: Query,
        opts: QueryOptions,
    ) -> IndexResult<QueryResults> {
        if self.state.read().closed {
            return Err(IndexError::Closed);
        }
        if ctx.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let exec_opts = ExecuteOptions {
            limit: opts.limit.or(self.default_query_limit),
        };
        let token = ctx.token();

        let execute = async {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(SegmentError::Cancelled),
                res = self.segment.execute(query.segment_query(), &exec_opts, token) => res,
            }
        };

        let result = match ctx.timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, execute).await {
                Ok(res) => res,
                Err(_) => {
                    ctx.cancel();
                    Err(SegmentError::Cancelled)
                }
            },
            None => execute.await,
        }
        .map_err(|e| {
            tracing::debug!(namespace = %self.metadata.id(), error = %e, "Query failed");
            IndexError::from(e)
        })?;

        tracing::debug!(
            namespace = %self.metadata.id(),
            exhaustive = result.exhaustive,
            "Query executed"
        );

        Ok(QueryResults {
            exhaustive: result.exhaustive,
            iter: ResultsIter::new(self.metadata.id().clone(), result.iter),
        })
    }

    /// Stop accepting writes and queries, drain the queue, close segments
    ///
    /// A second call returns `IndexError::Closed`.
    pub async fn close(&self) -> IndexResult<()> {
        {
            let mut state = self.state.write();
            if state.closed {
                return Err(IndexError::Closed);
            }
            state.closed = true;
        }

        let queue_result = self.queue.stop().await.map_err(|e| match e {
            IndexError::Shutdown(_) => e,
            other => IndexError::Shutdown(other.to_string()),
        });
        let segment_result = self
            .segment
            .close()
            .await
            .map_err(|e| IndexError::Shutdown(e.to_string()));

        match (&queue_result, &segment_result) {
            (Ok(()), Ok(())) => {
                tracing::info!(namespace = %self.metadata.id(), "Namespace index closed")
            }
            _ => tracing::warn!(namespace = %self.metadata.id(), "Namespace index closed with errors"),
        }

        queue_result?;
        segment_result
    }

    pub fn metadata(&self) -> &NamespaceMetadata {
        &self.metadata
    }

    pub fn insert_mode(&self) -> InsertMode {
        self.insert_mode
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            queue: self.queue.stats(),
            segment: self.segment.stats(),
        }
    }
}
