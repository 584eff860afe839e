//! # nsindex
//!
//! Per-namespace series index for a time-series store. Series are written
//! with their tags, batched into bulk inserts, and found again with tag
//! term or regexp queries.
//!
//! ## Modules
//!
//! - [`index`]: Namespace index, insert queue and lifecycle callbacks
//! - [`segment`]: Segment index contract and the in-memory implementation
//! - [`config`]: TOML/env configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nsindex::index::*;
//! use nsindex::segment::Filter;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let md = NamespaceMetadata::new("metrics", NamespaceOptions::default())?;
//!     let opts = IndexOptions::new().insert_mode(InsertMode::Sync);
//!     let index = NamespaceIndex::open(md, opts)?;
//!
//!     // Write a series
//!     let tags = vec![Tag::new("host", "web-01"), Tag::new("dc", "east")];
//!     index.write(&Id::from("cpu.host=web-01"), &tags, Arc::new(NoopLifecycle)).await?;
//!
//!     // Find it again
//!     let query = Query::and(vec![Filter::regexp("host", "web-.*")]);
//!     let results = index.query(&QueryContext::new(), query, QueryOptions::default()).await?;
//!
//!     let mut iter = results.iter;
//!     while iter.next() {
//!         if let Some((_, id, _)) = iter.current() {
//!             println!("{}", id);
//!         }
//!     }
//!
//!     // Graceful shutdown
//!     index.close().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod segment;

// Re-export top-level types for convenience
pub use index::{
    Document, Id, IndexError, IndexOptions, IndexResult, InsertMode, NamespaceIndex,
    NamespaceMetadata, OnIndexSeries, Query, QueryContext, QueryOptions, QueryResults, Tag,
};

pub use segment::{Filter, MemIndex, SegmentError, SegmentIndex, SegmentQuery};

pub use config::{Config, ConfigError, IndexSection, LoggingConfig};
