use std::sync::atomic::{AtomicUsize, Ordering};

use ragctx_core::config::{EmbeddingBackend, EmbeddingSettings};
use ragctx_core::traits::Embedder;
use ragctx_core::{Error, Result};
use ragctx_embed::{embed_in_batches, embed_in_batches_with, get_default_embedder, HashEmbedder};

#[test]
fn hash_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { backend: EmbeddingBackend::Hash, ..Default::default() };
    let embedder = get_default_embedder(&settings, 1024).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 1024, "embedding dim is 1024");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    assert_eq!(v1, v2, "identical text gives identical vectors");
}

#[test]
fn batching_preserves_order_and_length() {
    let embedder = HashEmbedder::new(64);
    let texts: Vec<String> = (0..37).map(|i| format!("chunk number {i}")).collect();
    let batched = embed_in_batches(&embedder, &texts, 16).unwrap();
    let single = embedder.embed_batch(&texts).unwrap();
    assert_eq!(batched.len(), 37);
    assert_eq!(batched, single);
}

#[test]
fn progress_callback_sees_every_batch() {
    let embedder = HashEmbedder::new(16);
    let texts: Vec<String> = (0..5).map(|i| format!("t{i}")).collect();
    let mut sizes = Vec::new();
    embed_in_batches_with(&embedder, &texts, 2, |n| sizes.push(n)).unwrap();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[test]
fn zero_batch_size_is_a_validation_error() {
    let err = embed_in_batches(&HashEmbedder::new(8), &["a".to_string()], 0).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn empty_input_embeds_nothing() {
    assert!(embed_in_batches(&HashEmbedder::new(8), &[], 16).unwrap().is_empty());
}

struct FailsOnSecondBatch { calls: AtomicUsize }

impl Embedder for FailsOnSecondBatch {
    fn id(&self) -> &str { "failing" }
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 16 }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(Error::backend("model crashed"));
        }
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }
}

#[test]
fn backend_failure_fails_the_whole_call() {
    let embedder = FailsOnSecondBatch { calls: AtomicUsize::new(0) };
    let texts: Vec<String> = (0..4).map(|i| i.to_string()).collect();
    let err = embed_in_batches(&embedder, &texts, 2).unwrap_err();
    assert!(err.is_retryable());
}

struct WrongDim;

impl Embedder for WrongDim {
    fn id(&self) -> &str { "wrong" }
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 16 }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|_| vec![1.0; 3]).collect()) }
}

#[test]
fn dimension_drift_is_rejected() {
    let err = embed_in_batches(&WrongDim, &["a".to_string()], 4).unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
}

#[test]
fn hash_tokens_ignore_case_and_punctuation() {
    let embedder = HashEmbedder::new(64);
    let v = embedder.embed_batch(&["Check the FUSE.".to_string(), "check the fuse".to_string()]).unwrap();
    assert_eq!(v[0], v[1]);
}

#[test]
fn hash_seed_changes_vectors_and_id() {
    let a = HashEmbedder::new(64);
    let b = HashEmbedder::with_seed(64, 7);
    assert_ne!(a.id(), b.id());
    let text = vec!["replace the water filter every six months".to_string()];
    assert_ne!(a.embed_batch(&text).unwrap(), b.embed_batch(&text).unwrap());
    assert_eq!(b.embed_batch(&text).unwrap(), HashEmbedder::with_seed(64, 7).embed_batch(&text).unwrap());
}
