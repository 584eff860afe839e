//! Query results
//!
//! `ResultsIter` is a forward-only cursor over matched series:
//!
//! ```text
//! while iter.next() {
//!     let (ns, id, tags) = iter.current().unwrap();
//! }
//! if let Some(err) = iter.err() { ... }
//! ```
//!
//! `next()` returns false both at the end and on error; `err()` tells them
//! apart. Documents are pulled from the segment iterator one at a time.

use crate::index::error::{IndexError, IndexResult};
use crate::index::{Id, Tags};
use crate::segment::DocIter;
use serde::Serialize;

/// Output of `NamespaceIndex::query`
pub struct QueryResults {
    /// False when the index may have left out matching series
    pub exhaustive: bool,
    pub iter: ResultsIter,
}

impl std::fmt::Debug for QueryResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResults")
            .field("exhaustive", &self.exhaustive)
            .finish_non_exhaustive()
    }
}

/// One matched series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesEntry {
    pub namespace: Id,
    pub id: Id,
    pub tags: Tags,
}

/// Cursor over (namespace, id, tags)
pub struct ResultsIter {
    namespace: Id,
    docs: DocIter,
    current: Option<(Id, Tags)>,
    err: Option<IndexError>,
    done: bool,
}

impl ResultsIter {
    pub(crate) fn new(namespace: Id, docs: DocIter) -> Self {
        Self {
            namespace,
            docs,
            current: None,
            err: None,
            done: false,
        }
    }

    /// Advance to the next series
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.done {
            return false;
        }

        match self.docs.next() {
            Some(Ok(doc)) => {
                let tags = doc.tags();
                self.current = Some((Id::from(doc.id), tags));
                true
            }
            Some(Err(e)) => {
                self.err = Some(e.into());
                self.current = None;
                self.done = true;
                false
            }
            None => {
                self.current = None;
                self.done = true;
                false
            }
        }
    }

    /// The series the cursor is on; only set after `next()` returned true
    pub fn current(&self) -> Option<(&Id, &Id, &Tags)> {
        self.current
            .as_ref()
            .map(|(id, tags)| (&self.namespace, id, tags))
    }

    /// Error that ended iteration, if any
    pub fn err(&self) -> Option<&IndexError> {
        self.err.as_ref()
    }

    /// Drain the remaining series
    pub fn collect_series(mut self) -> IndexResult<Vec<SeriesEntry>> {
        let mut entries = Vec::new();
        while self.next() {
            if let Some((namespace, id, tags)) = self.current() {
                entries.push(SeriesEntry {
                    namespace: namespace.clone(),
                    id: id.clone(),
                    tags: tags.clone(),
                });
            }
        }
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{build_document, Tag};
    use crate::segment::{SegmentError, SegmentResult};

    fn docs(items: Vec<SegmentResult<&str>>) -> DocIter {
        let docs: Vec<_> = items
            .into_iter()
            .map(|r| r.map(|id| build_document(&Id::from(id), &[Tag::new("name", id)]).unwrap()))
            .collect();
        Box::new(docs.into_iter())
    }

    #[test]
    fn test_cursor_protocol() {
        let mut iter = ResultsIter::new(Id::from("ns"), docs(vec![Ok("a"), Ok("b")]));
        assert!(iter.current().is_none());

        assert!(iter.next());
        let (ns, id, tags) = iter.current().unwrap();
        assert_eq!(ns.to_string(), "ns");
        assert_eq!(id.to_string(), "a");
        assert_eq!(tags, &vec![Tag::new("name", "a")]);

        assert!(iter.next());
        assert_eq!(iter.current().unwrap().1.to_string(), "b");

        assert!(!iter.next());
        assert!(iter.current().is_none());
        assert!(iter.err().is_none());
        assert!(!iter.next());
    }

    #[test]
    fn test_error_stops_iteration() {
        let mut iter = ResultsIter::new(
            Id::from("ns"),
            docs(vec![Ok("a"), Err(SegmentError::Cancelled), Ok("b")]),
        );

        assert!(iter.next());
        assert!(!iter.next());
        assert_eq!(iter.err(), Some(&IndexError::Cancelled));
        assert!(!iter.next());
    }

    #[test]
    fn test_collect_series() {
        let iter = ResultsIter::new(Id::from("ns"), docs(vec![Ok("a"), Ok("b")]));
        let entries = iter.collect_series().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].id.to_string(), "b");

        let iter = ResultsIter::new(Id::from("ns"), docs(vec![Err(SegmentError::Cancelled)]));
        assert_eq!(iter.collect_series().unwrap_err(), IndexError::Cancelled);
    }
}
