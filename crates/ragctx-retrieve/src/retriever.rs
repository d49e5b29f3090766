use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use ragctx_core::config::RetrievalSettings;
use ragctx_core::traits::Embedder;
use ragctx_core::types::{Chunk, ChunkKind, QueryResult};
use ragctx_vector::search::cosine;
use ragctx_vector::{CollectionHandle, VectorIndex};

use crate::scope::resolve_scope;
use crate::RetrievalError;

/// Assembled context for one query.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Text chunk bodies in rank order, each capped at `max_chars_per_chunk`.
    pub context: String,
    /// Primary text hits followed by cross-referenced image chunks.
    pub chunks: QueryResult,
    /// The scope hint matched nothing and the unfiltered hits were used.
    pub scope_fallback: bool,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    collection: String,
    settings: RetrievalSettings,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, collection: impl Into<String>, settings: RetrievalSettings) -> Self {
        Self { embedder, index, collection: collection.into(), settings }
    }

    pub fn settings(&self) -> &RetrievalSettings { &self.settings }

    pub async fn retrieve(&self, query: &str, scope: Option<&str>) -> Result<Retrieval, RetrievalError> {
        self.retrieve_top(query, scope, self.settings.top_n).await
    }

    /// Like [`Retriever::retrieve`] with an explicit number of primary hits.
    pub async fn retrieve_top(&self, query: &str, scope: Option<&str>, top_n: usize) -> Result<Retrieval, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery("query text is empty".into()));
        }
        if top_n == 0 {
            return Err(RetrievalError::InvalidQuery("top_n must be positive".into()));
        }
        let start = Instant::now();
        let scope = scope.map(str::trim).filter(|s| !s.is_empty());

        let query_vec = self
            .embedder
            .embed_batch(&[query.to_string()])
            .map_err(RetrievalError::Embedding)?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding(ragctx_core::Error::backend("embedder returned no vector")))?;

        let handle = self.index.collection(&self.collection).await.map_err(RetrievalError::Index)?;
        let pool = if scope.is_some() { top_n.max(self.settings.scoped_pool) } else { top_n };
        // Images join only through their source, so they never take a primary slot.
        let candidates = self
            .index
            .query_kind(&handle, &query_vec, pool, Some(ChunkKind::Text))
            .await
            .map_err(RetrievalError::Index)?;
        debug!(candidates = candidates.len(), pool, "vector candidates");

        let mut scope_fallback = false;
        let mut ranked: Vec<(f32, Chunk)> = candidates.into_iter().map(|h| (h.score, h.chunk)).collect();
        if let Some(scope) = scope {
            let known = self.index.sources(&handle).await.map_err(RetrievalError::Index)?;
            let allowed = resolve_scope(self.settings.scope_match, scope, known.iter().map(String::as_str));
            debug!(scope, sources = ?allowed, "resolved scope");
            let filtered: Vec<(f32, Chunk)> = ranked.iter().filter(|(_, c)| allowed.contains(&c.source)).cloned().collect();
            if filtered.is_empty() && !ranked.is_empty() {
                warn!(scope, "scope matched no candidates; using unfiltered results");
                scope_fallback = true;
            } else {
                ranked = filtered;
            }
        }

        let mut seen = HashSet::new();
        ranked.retain(|(_, c)| seen.insert(c.id.clone()));
        ranked.truncate(top_n);

        let images = self.cross_referenced_images(&handle, &ranked, &query_vec, &mut seen).await?;
        let primary = ranked.len();
        ranked.extend(images);

        let chunks = QueryResult::from_ranked(ranked);
        let context = flatten_context(&chunks, self.settings.max_chars_per_chunk);
        info!(
            collection = %self.collection,
            hits = primary,
            images = chunks.len() - primary,
            scope_fallback,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "retrieved context"
        );
        Ok(Retrieval { context, chunks, scope_fallback })
    }

    /// Image chunks sharing a source with a retained text chunk, capped per source.
    async fn cross_referenced_images(
        &self,
        handle: &CollectionHandle,
        ranked: &[(f32, Chunk)],
        query_vec: &[f32],
        seen: &mut HashSet<String>,
    ) -> Result<Vec<(f32, Chunk)>, RetrievalError> {
        let cap = self.settings.images_per_source;
        let mut out = Vec::new();
        if cap == 0 {
            return Ok(out);
        }
        let mut visited: HashSet<&str> = HashSet::new();
        for (_, chunk) in ranked {
            if !visited.insert(chunk.source.as_str()) {
                continue;
            }
            let entries = self
                .index
                .entries_by_source(handle, &chunk.source, ChunkKind::Image, cap)
                .await
                .map_err(RetrievalError::Index)?;
            for entry in entries {
                if seen.insert(entry.chunk.id.clone()) {
                    out.push((cosine(query_vec, &entry.vector), entry.chunk));
                }
            }
        }
        Ok(out)
    }
}

/// Text chunk bodies in rank order, each truncated to `max_chars` characters.
pub fn flatten_context(result: &QueryResult, max_chars: usize) -> String {
    result
        .chunks()
        .filter(|c| c.kind == ChunkKind::Text)
        .map(|c| truncate_chars(&c.text, max_chars))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => &s[..byte],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn flattened_context_skips_images() {
        let result = QueryResult::from_ranked(vec![
            (0.9, Chunk::text("a:0", "first body", "a")),
            (0.5, Chunk::image("a:image:f.png", "diagram", "a", "/f.png")),
            (0.4, Chunk::text("a:1", "second body", "a")),
        ]);
        assert_eq!(flatten_context(&result, 6), "first \n\nsecond");
    }
}
