//! Structured segment queries
//!
//! A `SegmentQuery` is a flat predicate: a list of field filters joined by
//! one conjunction. Each filter matches a field value exactly or against a
//! fully anchored regular expression, optionally negated.
//!
//! ```text
//! SegmentQuery::and(vec![
//!     Filter::regexp("name", "val.*"),
//!     Filter::term("host", "a").negate(),
//! ])
//! ```

use crate::segment::{SegmentError, SegmentResult};
use bytes::Bytes;
use regex::bytes::Regex;

/// How filters combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conjunction {
    /// Every filter must match
    #[default]
    And,
    /// At least one filter must match
    Or,
}

/// A predicate on one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field_name: Bytes,
    /// Exact value, or a pattern when `regexp` is set
    pub field_value_filter: Bytes,
    pub regexp: bool,
    pub negate: bool,
}

impl Filter {
    /// Field equals `value`
    pub fn term(field: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        Self {
            field_name: Bytes::copy_from_slice(field.as_ref()),
            field_value_filter: Bytes::copy_from_slice(value.as_ref()),
            regexp: false,
            negate: false,
        }
    }

    /// Field matches `pattern` in full
    pub fn regexp(field: impl AsRef<[u8]>, pattern: impl AsRef<[u8]>) -> Self {
        Self {
            regexp: true,
            ..Self::term(field, pattern)
        }
    }

    /// Invert this filter
    pub fn negate(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    fn compile(&self) -> SegmentResult<CompiledFilter> {
        let matcher = if self.regexp {
            let pattern = std::str::from_utf8(&self.field_value_filter).map_err(|e| {
                SegmentError::InvalidRegexp {
                    pattern: String::from_utf8_lossy(&self.field_value_filter).into_owned(),
                    error: e.to_string(),
                }
            })?;
            let anchored = format!("^(?:{})$", pattern);
            let re = Regex::new(&anchored).map_err(|e| SegmentError::InvalidRegexp {
                pattern: pattern.to_string(),
                error: e.to_string(),
            })?;
            ValueMatcher::Regexp(re)
        } else {
            ValueMatcher::Exact(self.field_value_filter.clone())
        };

        Ok(CompiledFilter {
            field: self.field_name.clone(),
            matcher,
            negate: self.negate,
        })
    }
}

/// A conjunction of field filters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentQuery {
    pub conjunction: Conjunction,
    pub filters: Vec<Filter>,
}

impl SegmentQuery {
    pub fn and(filters: Vec<Filter>) -> Self {
        Self {
            conjunction: Conjunction::And,
            filters,
        }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self {
            conjunction: Conjunction::Or,
            filters,
        }
    }

    /// Compile every filter, surfacing malformed patterns up front
    pub fn compile(&self) -> SegmentResult<CompiledQuery> {
        let filters = self
            .filters
            .iter()
            .map(Filter::compile)
            .collect::<SegmentResult<Vec<_>>>()?;

        Ok(CompiledQuery {
            conjunction: self.conjunction,
            filters,
        })
    }
}

#[derive(Debug)]
pub(crate) enum ValueMatcher {
    Exact(Bytes),
    Regexp(Regex),
}

impl ValueMatcher {
    pub(crate) fn matches(&self, value: &[u8]) -> bool {
        match self {
            ValueMatcher::Exact(expected) => expected.as_ref() == value,
            ValueMatcher::Regexp(re) => re.is_match(value),
        }
    }
}

#[derive(Debug)]
pub(crate) struct CompiledFilter {
    pub(crate) field: Bytes,
    pub(crate) matcher: ValueMatcher,
    pub(crate) negate: bool,
}

/// A query ready to run against segments
#[derive(Debug)]
pub struct CompiledQuery {
    pub(crate) conjunction: Conjunction,
    pub(crate) filters: Vec<CompiledFilter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regexp_is_anchored() {
        let q = SegmentQuery::and(vec![Filter::regexp("name", "val.*")]).compile().unwrap();
        let m = &q.filters[0].matcher;

        assert!(m.matches(b"value"));
        assert!(m.matches(b"val"));
        assert!(!m.matches(b"xvalue"));
    }

    #[test]
    fn test_exact_match() {
        let q = SegmentQuery::and(vec![Filter::term("host", "a")]).compile().unwrap();
        assert!(q.filters[0].matcher.matches(b"a"));
        assert!(!q.filters[0].matcher.matches(b"ab"));
    }

    #[test]
    fn test_invalid_regexp() {
        let err = SegmentQuery::and(vec![Filter::regexp("name", "(unclosed")])
            .compile()
            .unwrap_err();
        assert!(matches!(err, SegmentError::InvalidRegexp { .. }));
    }

    #[test]
    fn test_negate_toggles() {
        let f = Filter::term("a", "b").negate();
        assert!(f.negate);
        assert!(!f.negate().negate);
    }
}
