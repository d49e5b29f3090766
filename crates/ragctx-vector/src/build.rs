//! Embedding and indexing of a prepared corpus.
//!
//! Typical flow:
//! 1) Embed every chunk text in batches, showing progress
//! 2) Stage a fresh generation of the collection and insert into it
//! 3) Publish the generation, retiring the previous one
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tracing::{info, warn};

use ragctx_core::traits::Embedder;
use ragctx_core::types::{Chunk, ChunkKind};
use ragctx_core::{Error, Result};
use ragctx_embed::embed_in_batches_with;

use crate::VectorIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub collection: String,
    pub chunks: usize,
    pub text_chunks: usize,
    pub image_chunks: usize,
}

pub struct IndexBuilder<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn Embedder,
    batch_size: usize,
    show_progress: bool,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(index: &'a VectorIndex, embedder: &'a dyn Embedder, batch_size: usize) -> Self {
        Self { index, embedder, batch_size, show_progress: true }
    }

    pub fn with_progress(mut self, show: bool) -> Self { self.show_progress = show; self }

    /// Rebuilds `collection` from scratch with `chunks`.
    pub async fn build(&self, collection: &str, chunks: &[Chunk]) -> Result<BuildReport> {
        let start = Instant::now();
        let vectors = self.embed(chunks)?;
        let handle = self.index.stage_collection(collection).await?;
        if let Err(e) = self.index.insert_chunks(&handle, chunks, &vectors).await {
            if let Err(cleanup) = self.index.discard(&handle).await {
                warn!(table = handle.table_name(), error = %cleanup, "could not drop staged generation");
            }
            return Err(e);
        }
        self.index.publish(&handle).await?;
        let report = report(collection, chunks);
        info!(
            collection,
            chunks = report.chunks,
            images = report.image_chunks,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Index build completed"
        );
        Ok(report)
    }

    /// Adds `chunks` to `collection`, creating it if needed.
    pub async fn append(&self, collection: &str, chunks: &[Chunk]) -> Result<BuildReport> {
        let vectors = self.embed(chunks)?;
        let handle = self.index.create_or_open_collection(collection).await?;
        self.index.insert_chunks(&handle, chunks, &vectors).await?;
        info!(collection, chunks = chunks.len(), "Appended to collection");
        Ok(report(collection, chunks))
    }

    fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        if self.embedder.dim() != self.index.dim() {
            return Err(Error::validation(format!(
                "embedder '{}' produces dimension {}, index expects {}",
                self.embedder.id(),
                self.embedder.dim(),
                self.index.dim()
            )));
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let pb = if self.show_progress { ProgressBar::new(texts.len() as u64) } else { ProgressBar::hidden() };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message(format!("embedding with {}", self.embedder.id()));
        let vectors = embed_in_batches_with(self.embedder, &texts, self.batch_size, |n| pb.inc(n as u64));
        match &vectors {
            Ok(_) => pb.finish_with_message("embedded"),
            Err(_) => pb.abandon_with_message("embedding failed"),
        }
        vectors
    }
}

fn report(collection: &str, chunks: &[Chunk]) -> BuildReport {
    let image_chunks = chunks.iter().filter(|c| c.kind == ChunkKind::Image).count();
    BuildReport { collection: collection.to_string(), chunks: chunks.len(), text_chunks: chunks.len() - image_chunks, image_chunks }
}
