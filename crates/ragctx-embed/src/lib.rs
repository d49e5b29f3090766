//! Embedding backends and the batching driver.
//!
//! Every embedder returns L2-normalised vectors, so cosine similarity and inner
//! product agree downstream.
use anyhow::anyhow;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use twox_hash::XxHash64;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use ragctx_core::config::{expand_path, EmbeddingBackend, EmbeddingSettings};
use ragctx_core::traits::Embedder;
use ragctx_core::{Error, Result};

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

/// Transformer encoder (XLM-RoBERTa family, e.g. BGE-M3) run locally with candle.
pub struct ModelEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    id: String,
}

impl ModelEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        Self::load_inner(model_dir, max_len).map_err(|e| Error::backend(format!("failed to load model from {}: {e:#}", model_dir.display())))
    }

    fn load_inner(model_dir: &Path, max_len: usize) -> anyhow::Result<Self> {
        let device = device::select_device();
        info!("Loading embedding model from {}", model_dir.display());
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let raw_config: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dim = raw_config
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;
        let config: XLMRobertaConfig = serde_json::from_value(raw_config)?;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        let name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "model".into());
        info!(dim, "Embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, id: format!("model:{name}:d{dim}") })
    }

    fn forward_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros(input_ids.dims(), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> anyhow::Result<std::collections::HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&pickle)?;
    Ok(weights.into_iter().collect())
}

impl Embedder for ModelEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        self.forward_batch(texts).map_err(|e| Error::backend(format!("{e:#}")))
    }
}

/// Deterministic token-hash embedder for tests and offline development.
///
/// Tokens are lowercased alphanumeric runs, so "Fuse." and "fuse" embed alike.
/// Each token adds a signed weight to one bucket; the seed picks the hash family,
/// so vectors are only comparable between embedders with the same id.
pub struct HashEmbedder {
    dim: usize,
    seed: u64,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self::with_seed(dim, 0) }

    pub fn with_seed(dim: usize, seed: u64) -> Self {
        Self { dim, seed, id: format!("hash:d{dim}:s{seed}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 {
            return v;
        }
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(self.seed);
            hasher.write(token.to_lowercase().as_bytes());
            let h = hasher.finish();
            let bucket = (h % self.dim as u64) as usize;
            let weight = 1.0 + ((h >> 32) & 0xff) as f32 / 255.0;
            v[bucket] += if h >> 63 == 0 { weight } else { -weight };
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| self.embed_one(t)).collect()) }
}

/// Builds the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the hash embedder.
pub fn get_default_embedder(settings: &EmbeddingSettings, dim: usize) -> Result<Box<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake || settings.backend == EmbeddingBackend::Hash {
        info!(dim, "Using HashEmbedder");
        return Ok(Box::new(HashEmbedder::new(dim)));
    }
    let model = ModelEmbedder::load(&resolve_model_dir(&settings.model_dir)?, settings.max_len)?;
    if model.dim() != dim {
        return Err(Error::InvalidConfig(format!("model dimension {} does not match index.dim {}", model.dim(), dim)));
    }
    Ok(Box::new(model))
}

fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("MODEL_DIR") { let p = expand_path(&dir); if p.exists() { info!("Using MODEL_DIR: {}", p.display()); return Ok(p); } }
    let p = expand_path(configured); if p.exists() { return Ok(p); }
    let legacy = Path::new("models/bge-m3"); if legacy.exists() { info!("Using legacy model dir: {}", legacy.display()); return Ok(legacy.to_path_buf()); }
    Err(Error::InvalidConfig(format!("Could not locate embedding model directory '{configured}'")))
}

/// Embeds `texts` in batches of `batch_size`, preserving order.
///
/// The call is atomic: any backend failure, or a batch returning the wrong
/// count or dimension, fails the whole call.
pub fn embed_in_batches(embedder: &dyn Embedder, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
    embed_in_batches_with(embedder, texts, batch_size, |_| {})
}

/// Like [`embed_in_batches`], calling `on_batch(n)` after each batch of `n` texts.
pub fn embed_in_batches_with(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    mut on_batch: impl FnMut(usize),
) -> Result<Vec<Vec<f32>>> {
    if batch_size == 0 {
        return Err(Error::validation("batch_size must be positive"));
    }
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size) {
        let vectors = embedder.embed_batch(batch)?;
        if vectors.len() != batch.len() {
            warn!(expected = batch.len(), got = vectors.len(), "embedder returned wrong count");
            return Err(Error::backend(format!("embedder returned {} vectors for {} texts", vectors.len(), batch.len())));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dim()) {
            return Err(Error::backend(format!("embedder returned dimension {} (expected {})", bad.len(), embedder.dim())));
        }
        out.extend(vectors);
        on_batch(batch.len());
    }
    Ok(out)
}
