//! Core data types for the namespace index
//!
//! - `Id`: opaque byte identifier (series ID, namespace ID, tag names/values)
//! - `Tag` / `Tags`: ordered (name, value) pairs describing a series
//! - `Document` / `Field`: the searchable form of a series
//!
//! `build_document` is the only way series enter the index: it validates
//! the tag-set before anything is queued.

use crate::index::error::{IndexError, IndexResult};
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::fmt;

/// Field name under which the series identifier is stored in a document.
///
/// Tags may not reuse it.
pub const RESERVED_FIELD_NAME_ID: &[u8] = b"_id";

/// Opaque byte identifier
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id(Bytes);

impl Id {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Id {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&[u8]> for Id {
    fn from(v: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(v))
    }
}

impl From<Bytes> for Id {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

/// A single (name, value) tag on a series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Tag {
    pub name: Id,
    pub value: Id,
}

impl Tag {
    pub fn new(name: impl Into<Id>, value: impl Into<Id>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered tag-set. Order carries through to document field order.
pub type Tags = Vec<Tag>;

/// One (name, value) field of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: Bytes,
    pub value: Bytes,
}

/// Searchable representation of a series
///
/// Field 0 is always the reserved identifier field; the remaining fields
/// mirror the tag-set in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Bytes,
    pub fields: Vec<Field>,
}

impl Document {
    /// Value of the first field with the given name
    pub fn field(&self, name: &[u8]) -> Option<&Bytes> {
        self.fields
            .iter()
            .find(|f| f.name.as_ref() == name)
            .map(|f| &f.value)
    }

    /// Rebuild the tag-set this document was built from
    pub fn tags(&self) -> Tags {
        self.fields
            .iter()
            .filter(|f| f.name.as_ref() != RESERVED_FIELD_NAME_ID)
            .map(|f| Tag {
                name: Id::from(f.name.clone()),
                value: Id::from(f.value.clone()),
            })
            .collect()
    }
}

/// Convert an identifier and tag-set into a document
///
/// Fails with `IndexError::Validation` when a tag name is empty or equals
/// `RESERVED_FIELD_NAME_ID`.
pub fn build_document(id: &Id, tags: &[Tag]) -> IndexResult<Document> {
    let mut fields = Vec::with_capacity(1 + tags.len());
    fields.push(Field {
        name: Bytes::from_static(RESERVED_FIELD_NAME_ID),
        value: id.bytes(),
    });

    for tag in tags {
        if tag.name.is_empty() {
            return Err(IndexError::Validation(format!(
                "empty tag name on series {}",
                id
            )));
        }
        if tag.name.as_bytes() == RESERVED_FIELD_NAME_ID {
            return Err(IndexError::Validation(format!(
                "tag name {} is reserved for the series id (series {})",
                tag.name, id
            )));
        }
        fields.push(Field {
            name: tag.name.bytes(),
            value: tag.value.bytes(),
        });
    }

    Ok(Document {
        id: id.bytes(),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_document() {
        let id = Id::from("foo");
        let tags = vec![Tag::new("name", "value"), Tag::new("host", "a")];

        let doc = build_document(&id, &tags).unwrap();
        assert_eq!(doc.id.as_ref(), b"foo");
        assert_eq!(doc.fields.len(), 3);
        assert_eq!(doc.fields[0].name.as_ref(), RESERVED_FIELD_NAME_ID);
        assert_eq!(doc.fields[0].value.as_ref(), b"foo");
        assert_eq!(doc.fields[1].name.as_ref(), b"name");
        assert_eq!(doc.fields[1].value.as_ref(), b"value");
        assert_eq!(doc.fields[2].name.as_ref(), b"host");
        assert_eq!(doc.fields[2].value.as_ref(), b"a");
    }

    #[test]
    fn test_build_document_no_tags() {
        let doc = build_document(&Id::from("bare"), &[]).unwrap();
        assert_eq!(doc.fields.len(), 1);
        assert!(doc.tags().is_empty());
    }

    #[test]
    fn test_reserved_tag_name_rejected() {
        let id = Id::from("foo");
        let tags = vec![
            Tag::new("name", "value"),
            Tag::new(Id::from(RESERVED_FIELD_NAME_ID), "value"),
        ];

        let err = build_document(&id, &tags).unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
    }

    #[test]
    fn test_empty_tag_name_rejected() {
        let err = build_document(&Id::from("foo"), &[Tag::new("", "v")]).unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
    }

    #[test]
    fn test_tags_round_trip_order() {
        let tags = vec![
            Tag::new("zone", "b"),
            Tag::new("app", "api"),
            Tag::new("zone", "a"),
        ];
        let doc = build_document(&Id::from("s1"), &tags).unwrap();
        assert_eq!(doc.tags(), tags);
        assert_eq!(doc.field(b"zone").unwrap().as_ref(), b"b");
        assert!(doc.field(b"missing").is_none());
    }

    #[test]
    fn test_id_display() {
        let id = Id::from("cpu.user");
        assert_eq!(id.to_string(), "cpu.user");
        assert_eq!(id.len(), 8);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"cpu.user\"");
    }
}
