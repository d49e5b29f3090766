use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::chunker::Chunker;
use crate::error::{Error, Result};
use crate::extract::PlainTextExtractor;
use crate::images::associate_images;
use crate::traits::{DescriptionLookup, TextExtractor};
use crate::types::{Chunk, ChunkKind};

/// Chunks gathered from a corpus directory plus the soft failures met on the way.
#[derive(Debug, Default)]
pub struct Corpus {
    pub chunks: Vec<Chunk>,
    pub documents: usize,
    pub warnings: Vec<String>,
}

impl Corpus {
    pub fn count(&self, kind: ChunkKind) -> usize {
        self.chunks.iter().filter(|c| c.kind == kind).count()
    }
}

pub struct DataProcessor {
    chunker: Chunker,
    extractor: Box<dyn TextExtractor>,
    images: Option<(PathBuf, Box<dyn DescriptionLookup>)>,
}

impl Default for DataProcessor {
    fn default() -> Self {
        Self { chunker: Chunker::default(), extractor: Box::new(PlainTextExtractor), images: None }
    }
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self { self.chunker = chunker; self }

    pub fn with_extractor(mut self, extractor: Box<dyn TextExtractor>) -> Self { self.extractor = extractor; self }

    /// Attach image descriptions found under `images_root/<source>/`.
    pub fn with_images(mut self, images_root: impl Into<PathBuf>, lookup: Box<dyn DescriptionLookup>) -> Self {
        self.images = Some((images_root.into(), lookup));
        self
    }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Corpus> {
        if !data_dir.is_dir() {
            return Err(Error::not_found(format!("corpus directory {}", data_dir.display())));
        }
        let files = self.list_txt_files(data_dir);
        let mut corpus = Corpus::default();
        if files.is_empty() {
            warn!("No .txt files found under {}", data_dir.display());
            return Ok(corpus);
        }
        for (file_index, file_path) in files.iter().enumerate() {
            info!("Processing file {}/{}: {}", file_index + 1, files.len(), file_path.display());
            let bytes = fs::read(file_path).map_err(|e| Error::not_found(format!("{}: {e}", file_path.display())))?;
            let text = self.extractor.extract(&bytes)?;
            let source = self.source_name(file_path);
            corpus.chunks.extend(self.process_document(&text, &source, &mut corpus.warnings)?);
            corpus.documents += 1;
        }
        info!(
            "Processed {} files into {} chunks ({} image)",
            corpus.documents,
            corpus.chunks.len(),
            corpus.count(ChunkKind::Image)
        );
        Ok(corpus)
    }

    /// Text chunks of one document followed by its associated image chunks.
    pub fn process_document(&self, text: &str, source: &str, warnings: &mut Vec<String>) -> Result<Vec<Chunk>> {
        let mut chunks = self.chunker.split(text, source);
        if let Some((root, lookup)) = &self.images {
            let assoc = associate_images(root, source, lookup.as_ref())?;
            chunks.extend(assoc.chunks);
            warnings.extend(assoc.warnings);
        }
        Ok(chunks)
    }

    fn source_name(&self, file_path: &Path) -> String {
        file_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path(); if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
        }
        txt_files.sort(); txt_files
    }
}
