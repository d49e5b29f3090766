//! Image-description chunks associated with a source document.
//!
//! Images live under `<images_root>/<source>/`. Each supported image file becomes
//! one `image` chunk whose text is the description supplied by a
//! [`DescriptionLookup`]. A missing description is a soft failure: the image is
//! skipped and a warning recorded.
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::DescriptionLookup;
use crate::types::Chunk;

pub const SUPPORTED_IMAGE_EXTS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Default)]
pub struct ImageAssociation {
    pub chunks: Vec<Chunk>,
    pub warnings: Vec<String>,
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_IMAGE_EXTS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn associate_images(images_root: &Path, source: &str, lookup: &dyn DescriptionLookup) -> Result<ImageAssociation> {
    let folder = images_root.join(source);
    let mut out = ImageAssociation::default();
    if !folder.is_dir() {
        debug!(folder = %folder.display(), "no image folder for source");
        return Ok(out);
    }

    let mut files: Vec<_> = walkdir::WalkDir::new(&folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_image(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();

    for path in files {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else { continue };
        match lookup.describe(source, &filename).filter(|d| !d.trim().is_empty()) {
            Some(desc) => {
                debug!(image = %path.display(), "associating image");
                out.chunks.push(Chunk::image(
                    format!("{source}:image:{filename}"),
                    desc.trim(),
                    source,
                    path.to_string_lossy(),
                ));
            }
            None => {
                let msg = format!("No description found for {filename} in {source}; skipping");
                warn!("{}", msg);
                out.warnings.push(msg);
            }
        }
    }
    Ok(out)
}

/// Description map `{source: {filename: description}}` loaded from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct JsonDescriptions {
    map: HashMap<String, HashMap<String, String>>,
}

impl JsonDescriptions {
    pub fn from_map(map: HashMap<String, HashMap<String, String>>) -> Self {
        Self { map }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::not_found(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfig(format!("bad description file {}: {e}", path.display())))
    }

    pub fn insert(&mut self, source: impl Into<String>, filename: impl Into<String>, description: impl Into<String>) {
        self.map.entry(source.into()).or_default().insert(filename.into(), description.into());
    }
}

impl DescriptionLookup for JsonDescriptions {
    fn describe(&self, source: &str, filename: &str) -> Option<String> {
        self.map.get(source).and_then(|m| m.get(filename)).cloned()
    }
}
