//! Delimiter-based document splitting.

use crate::types::Chunk;

/// Marker separating chunks inside a source document.
pub const DEFAULT_DELIMITER: &str = "***";

#[derive(Debug, Clone)]
pub struct Chunker {
    delimiter: String,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl Chunker {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self { delimiter: delimiter.into() }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Splits `document_text` on the delimiter into text chunks in document order.
    ///
    /// Each non-empty trimmed segment becomes one chunk with id `<source>:<n>`.
    /// Without any delimiter the whole trimmed document is a single chunk; an
    /// empty document yields no chunks.
    pub fn split(&self, document_text: &str, source_name: &str) -> Vec<Chunk> {
        let segments: Vec<&str> = if self.delimiter.is_empty() {
            vec![document_text]
        } else {
            document_text.split(self.delimiter.as_str()).collect()
        };
        segments
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, segment)| Chunk::text(format!("{source_name}:{i}"), segment, source_name))
            .collect()
    }
}
