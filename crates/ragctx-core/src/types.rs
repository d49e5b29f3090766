//! Domain types shared by the chunker, index and retriever.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type ChunkId = String;
pub type Extra = BTreeMap<String, String>;

/// `extra` key holding the image path of an image chunk.
pub const IMAGE_FILENAME: &str = "image_filename";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Text,
    Image,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Image => "image",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(ChunkKind::Text),
            "image" => Ok(ChunkKind::Image),
            other => Err(Error::validation(format!("unknown chunk kind '{other}'"))),
        }
    }
}

/// Minimal retrievable unit of corpus content.
///
/// - `id`: unique within a collection, stable across rebuilds of the same corpus
/// - `text`: the chunk body (image chunks carry the image description)
/// - `source`: logical document name, e.g. the file stem of a manual
/// - `kind`: text or image-derived description
/// - `extra`: free-form metadata; image chunks carry [`IMAGE_FILENAME`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub source: String,
    pub kind: ChunkKind,
    #[serde(default)]
    pub extra: Extra,
}

impl Chunk {
    pub fn text(id: impl Into<String>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), source: source.into(), kind: ChunkKind::Text, extra: Extra::new() }
    }

    pub fn image(
        id: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
        image_filename: impl Into<String>,
    ) -> Self {
        let mut extra = Extra::new();
        extra.insert(IMAGE_FILENAME.to_string(), image_filename.into());
        Self { id: id.into(), text: description.into(), source: source.into(), kind: ChunkKind::Image, extra }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn image_filename(&self) -> Option<&str> {
        self.extra.get(IMAGE_FILENAME).map(String::as_str)
    }

    pub fn is_image(&self) -> bool {
        self.kind == ChunkKind::Image
    }

    /// Checks the invariants every indexed chunk must hold.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("chunk id must not be empty"));
        }
        if self.text.trim().is_empty() {
            return Err(Error::validation(format!("chunk '{}' has empty text", self.id)));
        }
        if self.kind == ChunkKind::Image && self.image_filename().map_or(true, |f| f.trim().is_empty()) {
            return Err(Error::validation(format!("image chunk '{}' has no {IMAGE_FILENAME}", self.id)));
        }
        Ok(())
    }
}

/// A chunk together with its embedding, as stored in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One ranked hit. `rank` starts at 1; higher `score` is more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub score: f32,
    pub chunk: Chunk,
    pub rank: usize,
}

/// Ordered hits produced for a single query. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    hits: Vec<ScoredChunk>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a result from `(score, chunk)` pairs already in rank order.
    pub fn from_ranked(ranked: Vec<(f32, Chunk)>) -> Self {
        let hits = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (score, chunk))| ScoredChunk { score, chunk, rank: i + 1 })
            .collect();
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.hits.iter()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.hits.iter().map(|h| &h.chunk)
    }

    pub fn ids(&self) -> Vec<ChunkId> {
        self.hits.iter().map(|h| h.chunk.id.clone()).collect()
    }

    pub fn into_hits(self) -> Vec<ScoredChunk> {
        self.hits
    }
}

impl IntoIterator for QueryResult {
    type Item = ScoredChunk;
    type IntoIter = std::vec::IntoIter<ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a ScoredChunk;
    type IntoIter = std::slice::Iter<'a, ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}
