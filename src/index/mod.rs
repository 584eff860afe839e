//! Namespace Index
//!
//! Indexes the series of one namespace by their tags:
//!
//! - **Types**: series identifiers, tags and the documents built from them
//! - **Insert queue**: batches writes from many callers into bulk inserts
//! - **Lifecycle**: per-series success/finalize callbacks
//! - **NamespaceIndex**: write, query and close
//!
//! # Architecture
//!
//! ```text
//! write(id, tags, hooks)
//!        ↓
//! build_document → InsertQueue ──(batch_backoff | size threshold)──▶ SegmentIndex::insert
//!                                                                        ↓
//!                                                  on_index_success + on_index_finalize
//!
//! query(ctx, query, opts) → SegmentIndex::execute → ResultsIter
//! ```

mod error;
mod insert_queue;
mod lifecycle;
mod namespace;
mod options;
mod query;
mod results;
mod types;

pub use error::{IndexError, IndexResult};
pub use insert_queue::{
    new_insert_queue_fn, CompletionHandle, InsertBatchFn, InsertQueue, InsertQueueStats,
    NamespaceIndexInsertQueue, NewInsertQueueFn,
};
pub use lifecycle::{LifecycleGuard, NoopLifecycle, OnIndexSeries};
pub use namespace::{IndexStats, NamespaceIndex};
pub use options::{
    IndexOptions, InsertMode, InsertQueueOptions, NamespaceMetadata, NamespaceOptions, NowFn,
};
pub use query::{Query, QueryContext, QueryOptions};
pub use results::{QueryResults, ResultsIter, SeriesEntry};
pub use types::{build_document, Document, Field, Id, Tag, Tags, RESERVED_FIELD_NAME_ID};
