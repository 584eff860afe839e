//! Mem Segment - Inverted index over a run of documents
//!
//! Maps field name → field value → posting list of local document numbers.
//! Documents are numbered in insert order, so posting lists stay sorted
//! without extra work.
//!
//! # Example
//! ```ignore
//! segment.insert(doc);
//! let postings = segment.search(&SegmentQuery::and(vec![Filter::term("host", "a")]).compile()?);
//! let doc = segment.doc(postings[0]);
//! ```

use crate::index::Document;
use crate::segment::query::{CompiledFilter, CompiledQuery, Conjunction};
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};

/// In-memory inverted index segment
#[derive(Debug, Clone, Default)]
pub struct MemSegment {
    /// Documents by local doc number
    docs: Vec<Document>,
    /// Document ID → local doc number
    ids: HashMap<Bytes, u32>,
    /// Field name → value → doc numbers
    postings: HashMap<Bytes, HashMap<Bytes, Vec<u32>>>,
}

impl MemSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document; returns false if its ID is already present
    pub fn insert(&mut self, doc: Document) -> bool {
        if self.ids.contains_key(&doc.id) {
            return false;
        }

        let doc_num = self.docs.len() as u32;
        self.ids.insert(doc.id.clone(), doc_num);

        for field in &doc.fields {
            let values = self.postings.entry(field.name.clone()).or_default();
            let list = values.entry(field.value.clone()).or_default();
            // A repeated (name, value) pair on one document posts once
            if list.last() != Some(&doc_num) {
                list.push(doc_num);
            }
        }

        self.docs.push(doc);
        true
    }

    /// Check whether a document ID is indexed here
    pub fn contains_id(&self, id: &[u8]) -> bool {
        self.ids.contains_key(id)
    }

    /// Document by local doc number
    pub fn doc(&self, doc_num: u32) -> Option<&Document> {
        self.docs.get(doc_num as usize)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Get count of distinct field names
    pub fn field_count(&self) -> usize {
        self.postings.len()
    }

    /// Get all distinct values for a field
    pub fn field_values(&self, field: &[u8]) -> Vec<Bytes> {
        self.postings
            .get(field)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted doc numbers matching the query
    pub fn search(&self, query: &CompiledQuery) -> Vec<u32> {
        if query.filters.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let mut result: Option<BTreeSet<u32>> = None;

        for filter in &query.filters {
            let matched = self.filter_postings(filter);

            result = Some(match (result, query.conjunction) {
                (None, _) => matched,
                (Some(existing), Conjunction::And) => {
                    existing.intersection(&matched).copied().collect()
                }
                (Some(mut existing), Conjunction::Or) => {
                    existing.extend(matched);
                    existing
                }
            });

            if query.conjunction == Conjunction::And
                && result.as_ref().map(|s| s.is_empty()).unwrap_or(false)
            {
                break;
            }
        }

        result.map(|s| s.into_iter().collect()).unwrap_or_default()
    }

    fn filter_postings(&self, filter: &CompiledFilter) -> BTreeSet<u32> {
        let mut matched = BTreeSet::new();

        if let Some(values) = self.postings.get(&filter.field) {
            for (value, docs) in values {
                if filter.matcher.matches(value) {
                    matched.extend(docs.iter().copied());
                }
            }
        }

        if filter.negate {
            (0..self.docs.len() as u32)
                .filter(|n| !matched.contains(n))
                .collect()
        } else {
            matched
        }
    }
}
