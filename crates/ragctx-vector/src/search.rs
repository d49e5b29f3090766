//! Decoding of stored rows and ranking of vector search results.
use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, StringArray};
use std::cmp::Ordering;

use ragctx_core::types::{Chunk, ChunkKind, Extra, IMAGE_FILENAME};
use ragctx_core::{Error, Result};

use crate::schema::{COL_DISTANCE, COL_EXTRA, COL_ID, COL_IMAGE_FILENAME, COL_KIND, COL_SEQ, COL_SOURCE, COL_TEXT, COL_VECTOR};

/// One stored row. `distance` is present only on vector search results.
#[derive(Debug, Clone)]
pub struct StoredRow {
	pub chunk: Chunk,
	pub seq: i64,
	pub vector: Option<Vec<f32>>,
	pub distance: Option<f32>,
}

impl StoredRow {
	/// Similarity derived from the cosine distance.
	pub fn score(&self) -> f32 {
		self.distance.map_or(0.0, |d| 1.0 - d)
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::backend(format!("column '{name}' missing or not utf8")))
}

pub fn rows_from_batch(batch: &RecordBatch) -> Result<Vec<StoredRow>> {
	let ids = string_col(batch, COL_ID)?;
	let texts = string_col(batch, COL_TEXT)?;
	let sources = string_col(batch, COL_SOURCE)?;
	let kinds = string_col(batch, COL_KIND)?;
	let image_files = string_col(batch, COL_IMAGE_FILENAME)?;
	let extras = string_col(batch, COL_EXTRA)?;
	let seqs = batch
		.column_by_name(COL_SEQ)
		.and_then(|c| c.as_any().downcast_ref::<Int64Array>())
		.ok_or_else(|| Error::backend("column 'seq' missing"))?;
	let vectors = batch.column_by_name(COL_VECTOR).and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());
	let distances = batch.column_by_name(COL_DISTANCE).and_then(|c| c.as_any().downcast_ref::<Float32Array>());

	let mut rows = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let mut extra: Extra = serde_json::from_str(extras.value(i)).map_err(|e| Error::backend(format!("corrupt extra for '{}': {e}", ids.value(i))))?;
		if image_files.is_valid(i) {
			extra.insert(IMAGE_FILENAME.to_string(), image_files.value(i).to_string());
		}
		let chunk = Chunk {
			id: ids.value(i).to_string(),
			text: texts.value(i).to_string(),
			source: sources.value(i).to_string(),
			kind: kinds.value(i).parse::<ChunkKind>()?,
			extra,
		};
		let vector = vectors.filter(|v| v.is_valid(i)).map(|v| v.value(i).as_primitive::<arrow_array::types::Float32Type>().values().to_vec());
		rows.push(StoredRow { chunk, seq: seqs.value(i), vector, distance: distances.map(|d| d.value(i)) });
	}
	Ok(rows)
}

/// Descending score, then ascending insertion order.
pub fn rank_rows(rows: &mut [StoredRow]) {
	rows.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal).then(a.seq.cmp(&b.seq)));
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
	if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}
