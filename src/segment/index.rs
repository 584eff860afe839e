//! MemIndex - In-memory segment index
//!
//! Holds sealed segments plus one active segment. The active segment seals
//! once it reaches `max_segment_docs` and a fresh one takes over.
//!
//! Queries run against a snapshot of `Arc<MemSegment>`s: an insert that
//! lands while a query iterates copies the active segment instead of
//! mutating the one the query holds.

use crate::index::Document;
use crate::segment::{
    CompiledQuery, DocIter, ExecuteOptions, ExecuteResult, MemSegment, SegmentError,
    SegmentIndex, SegmentQuery, SegmentResult, SegmentStats,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default number of documents per segment before sealing
pub const DEFAULT_MAX_SEGMENT_DOCS: usize = 100_000;

struct MemIndexState {
    sealed: Vec<Arc<MemSegment>>,
    active: Arc<MemSegment>,
    closed: bool,
}

impl MemIndexState {
    fn snapshot(&self) -> Vec<Arc<MemSegment>> {
        let mut segments = self.sealed.clone();
        if !self.active.is_empty() {
            segments.push(Arc::clone(&self.active));
        }
        segments
    }

    fn contains_id(&self, id: &[u8]) -> bool {
        self.active.contains_id(id) || self.sealed.iter().any(|s| s.contains_id(id))
    }
}

/// In-memory `SegmentIndex`
pub struct MemIndex {
    state: RwLock<MemIndexState>,
    max_segment_docs: usize,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::with_max_segment_docs(DEFAULT_MAX_SEGMENT_DOCS)
    }

    pub fn with_max_segment_docs(max_segment_docs: usize) -> Self {
        Self {
            state: RwLock::new(MemIndexState {
                sealed: Vec::new(),
                active: Arc::new(MemSegment::new()),
                closed: false,
            }),
            max_segment_docs: max_segment_docs.max(1),
        }
    }

    fn insert_docs(&self, docs: &[Document]) -> SegmentResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(SegmentError::Closed);
        }

        let mut skipped = 0usize;
        for doc in docs {
            if state.contains_id(&doc.id) {
                skipped += 1;
                continue;
            }

            Arc::make_mut(&mut state.active).insert(doc.clone());

            if state.active.len() >= self.max_segment_docs {
                let full = std::mem::replace(&mut state.active, Arc::new(MemSegment::new()));
                tracing::debug!(docs = full.len(), "Sealing segment");
                state.sealed.push(full);
            }
        }

        if skipped > 0 {
            tracing::trace!(skipped, "Skipped already indexed documents");
        }

        Ok(())
    }
}

impl Default for MemIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentIndex for MemIndex {
    async fn insert(&self, docs: &[Document]) -> SegmentResult<()> {
        self.insert_docs(docs)
    }

    async fn execute(
        &self,
        query: &SegmentQuery,
        opts: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> SegmentResult<ExecuteResult> {
        let compiled = query.compile()?;

        let segments = {
            let state = self.state.read();
            if state.closed {
                return Err(SegmentError::Closed);
            }
            state.snapshot()
        };

        let (matched, total) = search_segments(segments, &compiled, cancel)?;
        let exhaustive = opts.limit.map(|limit| total <= limit).unwrap_or(true);

        let iter = SegmentsIter {
            segments: matched.into_iter(),
            current: None,
            seen: HashSet::new(),
            remaining: opts.limit,
            cancel: cancel.clone(),
            done: false,
        };

        Ok(ExecuteResult {
            iter: Box::new(iter) as DocIter,
            exhaustive,
        })
    }

    async fn close(&self) -> SegmentResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(SegmentError::Closed);
        }
        state.closed = true;
        state.sealed.clear();
        state.active = Arc::new(MemSegment::new());
        Ok(())
    }

    fn stats(&self) -> SegmentStats {
        let state = self.state.read();
        SegmentStats {
            segments: state.sealed.len() + usize::from(!state.active.is_empty()),
            documents: state.sealed.iter().map(|s| s.len()).sum::<usize>() + state.active.len(),
        }
    }
}

type SegmentMatches = Vec<(Arc<MemSegment>, Vec<u32>)>;

fn search_segments(
    segments: Vec<Arc<MemSegment>>,
    query: &CompiledQuery,
    cancel: &CancellationToken,
) -> SegmentResult<(SegmentMatches, usize)> {
    let mut matched = Vec::with_capacity(segments.len());
    let mut total = 0usize;

    for segment in segments {
        if cancel.is_cancelled() {
            return Err(SegmentError::Cancelled);
        }
        let postings = segment.search(query);
        if postings.is_empty() {
            continue;
        }
        total += postings.len();
        matched.push((segment, postings));
    }

    Ok((matched, total))
}

/// Walks matched postings segment by segment, cloning documents on demand
struct SegmentsIter {
    segments: std::vec::IntoIter<(Arc<MemSegment>, Vec<u32>)>,
    current: Option<(Arc<MemSegment>, std::vec::IntoIter<u32>)>,
    seen: HashSet<Bytes>,
    remaining: Option<usize>,
    cancel: CancellationToken,
    done: bool,
}

impl Iterator for SegmentsIter {
    type Item = SegmentResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }

        loop {
            if let Some((segment, postings)) = self.current.as_mut() {
                for doc_num in postings.by_ref() {
                    let Some(doc) = segment.doc(doc_num) else {
                        continue;
                    };
                    if !self.seen.insert(doc.id.clone()) {
                        continue;
                    }
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(doc.clone()));
                }
            }

            let (segment, postings) = self.segments.next()?;
            if self.cancel.is_cancelled() {
                self.done = true;
                return Some(Err(SegmentError::Cancelled));
            }
            self.current = Some((segment, postings.into_iter()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{build_document, Id, Tag};
    use crate::segment::Filter;

    fn doc(id: &str, tags: &[(&str, &str)]) -> Document {
        let tags: Vec<Tag> = tags.iter().map(|(k, v)| Tag::new(*k, *v)).collect();
        build_document(&Id::from(id), &tags).unwrap()
    }

    async fn collect(index: &MemIndex, query: SegmentQuery, limit: Option<usize>) -> (Vec<String>, bool) {
        let res = index
            .execute(&query, &ExecuteOptions { limit }, &CancellationToken::new())
            .await
            .unwrap();
        let ids = res
            .iter
            .map(|d| String::from_utf8(d.unwrap().id.to_vec()).unwrap())
            .collect();
        (ids, res.exhaustive)
    }

    #[tokio::test]
    async fn test_insert_and_execute() {
        let index = MemIndex::new();
        index
            .insert(&[doc("foo", &[("name", "value")]), doc("bar", &[("name", "other")])])
            .await
            .unwrap();

        let (ids, exhaustive) =
            collect(&index, SegmentQuery::and(vec![Filter::regexp("name", "val.*")]), None).await;
        assert_eq!(ids, vec!["foo"]);
        assert!(exhaustive);
    }

    #[tokio::test]
    async fn test_segments_seal_and_fan_out() {
        let index = MemIndex::with_max_segment_docs(2);
        let docs: Vec<Document> = (0..5).map(|i| doc(&format!("s{}", i), &[("app", "api")])).collect();
        index.insert(&docs).await.unwrap();

        let stats = index.stats();
        assert_eq!(stats.segments, 3);
        assert_eq!(stats.documents, 5);

        let (ids, _) = collect(&index, SegmentQuery::and(vec![Filter::term("app", "api")]), None).await;
        assert_eq!(ids, vec!["s0", "s1", "s2", "s3", "s4"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_across_batches() {
        let index = MemIndex::with_max_segment_docs(1);
        index.insert(&[doc("a", &[("k", "v")])]).await.unwrap();
        index.insert(&[doc("a", &[("k", "v")])]).await.unwrap();

        assert_eq!(index.stats().documents, 1);
        let (ids, _) = collect(&index, SegmentQuery::and(vec![Filter::term("k", "v")]), None).await;
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_limit_marks_non_exhaustive() {
        let index = MemIndex::with_max_segment_docs(2);
        let docs: Vec<Document> = (0..4).map(|i| doc(&format!("s{}", i), &[("k", "v")])).collect();
        index.insert(&docs).await.unwrap();

        let (ids, exhaustive) =
            collect(&index, SegmentQuery::and(vec![Filter::term("k", "v")]), Some(3)).await;
        assert_eq!(ids.len(), 3);
        assert!(!exhaustive);

        let (ids, exhaustive) =
            collect(&index, SegmentQuery::and(vec![Filter::term("k", "v")]), Some(4)).await;
        assert_eq!(ids.len(), 4);
        assert!(exhaustive);
    }

    #[tokio::test]
    async fn test_snapshot_isolated_from_inserts() {
        let index = MemIndex::new();
        index.insert(&[doc("a", &[("k", "v")])]).await.unwrap();

        let res = index
            .execute(
                &SegmentQuery::and(vec![Filter::term("k", "v")]),
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        index.insert(&[doc("b", &[("k", "v")])]).await.unwrap();

        let ids: Vec<_> = res.iter.map(|d| d.unwrap().id).collect();
        assert_eq!(ids, vec![Bytes::from_static(b"a")]);
    }

    #[tokio::test]
    async fn test_cancelled_execute() {
        let index = MemIndex::new();
        index.insert(&[doc("a", &[("k", "v")])]).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = index
            .execute(
                &SegmentQuery::and(vec![Filter::term("k", "v")]),
                &ExecuteOptions::default(),
                &cancel,
            )
            .await
            .err()
            .unwrap();
        assert_eq!(err, SegmentError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_during_iteration() {
        let index = MemIndex::with_max_segment_docs(1);
        index
            .insert(&[doc("a", &[("k", "v")]), doc("b", &[("k", "v")])])
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let mut iter = index
            .execute(
                &SegmentQuery::and(vec![Filter::term("k", "v")]),
                &ExecuteOptions::default(),
                &cancel,
            )
            .await
            .unwrap()
            .iter;

        assert!(iter.next().unwrap().is_ok());
        cancel.cancel();
        assert_eq!(iter.next().unwrap().unwrap_err(), SegmentError::Cancelled);
        assert!(iter.next().is_none());
    }

    #[tokio::test]
    async fn test_invalid_regexp() {
        let index = MemIndex::new();
        let err = index
            .execute(
                &SegmentQuery::and(vec![Filter::regexp("k", "[")]),
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SegmentError::InvalidRegexp { .. }));
    }

    #[tokio::test]
    async fn test_closed_index() {
        let index = MemIndex::new();
        index.close().await.unwrap();

        assert_eq!(index.insert(&[doc("a", &[])]).await.unwrap_err(), SegmentError::Closed);
        assert_eq!(index.close().await.unwrap_err(), SegmentError::Closed);
    }
}
