//! Document keys.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;
use snafu::ensure;

/// Longest accepted collection or document segment, in bytes.
const MAX_SEGMENT_LEN: usize = 120;

/// Error building a [`DocumentKey`].
#[derive(Debug, Snafu)]
pub enum InvalidDocumentKey {
    /// A key segment was empty.
    #[snafu(display("document key segment must not be empty"))]
    EmptySegment,

    /// A key segment exceeded the length bound.
    #[snafu(display("document key segment exceeds {MAX_SEGMENT_LEN} bytes: {len}"))]
    SegmentTooLong {
        /// Actual segment length.
        len: usize,
    },

    /// A key segment contained the reserved separator.
    #[snafu(display("document key segment contains reserved '$'"))]
    ReservedSeparator,
}

/// Identifies a document within a collection.
///
/// The combined form `collection$document` is the canonical external
/// rendering, used as the storage key and in coordinator lock names.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    collection: String,
    document: String,
}

impl DocumentKey {
    /// Create a validated key.
    pub fn new(
        collection: impl Into<String>,
        document: impl Into<String>,
    ) -> Result<Self, InvalidDocumentKey> {
        let collection = collection.into();
        let document = document.into();
        for segment in [&collection, &document] {
            ensure!(!segment.is_empty(), EmptySegmentSnafu);
            ensure!(
                segment.len() <= MAX_SEGMENT_LEN,
                SegmentTooLongSnafu { len: segment.len() }
            );
            ensure!(!segment.contains('$'), ReservedSeparatorSnafu);
        }
        Ok(DocumentKey {
            collection,
            document,
        })
    }

    /// The collection segment.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The document segment.
    pub fn document(&self) -> &str {
        &self.document
    }

    /// The canonical `collection$document` rendering.
    pub fn combined(&self) -> String {
        format!("{}${}", self.collection, self.document)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.collection, self.document)
    }
}

impl fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_form() {
        let key = DocumentKey::new("todos", "alpha").unwrap();
        assert_eq!(key.combined(), "todos$alpha");
    }

    #[test]
    fn rejects_invalid_segments() {
        assert!(DocumentKey::new("", "doc").is_err());
        assert!(DocumentKey::new("col", "").is_err());
        assert!(DocumentKey::new("a$b", "doc").is_err());
        assert!(DocumentKey::new("c".repeat(121), "doc").is_err());
    }
}
