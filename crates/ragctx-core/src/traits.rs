use crate::error::Result;

/// Converts text into fixed-dimension vectors.
///
/// `embed_batch` returns one vector per input, in input order. A batch either
/// succeeds completely or fails; there is no partial success.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model (e.g. `hash:d1024:s0`).
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Turns a binary document into plain text. Unparseable input is an
/// [`Error::Extraction`](crate::error::Error::Extraction), never an empty string.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// Looks up the description of an image belonging to a source document.
pub trait DescriptionLookup: Send + Sync {
    fn describe(&self, source: &str, filename: &str) -> Option<String>;
}
