//! Conversion of chunks and vectors into Arrow record batches.
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, StringArray};
use std::sync::Arc;

use ragctx_core::types::{Chunk, Extra, IMAGE_FILENAME};
use ragctx_core::{Error, Result};

use crate::schema::build_chunk_schema;

/// Serialises `extra` without the image path, which has its own column.
pub fn extra_to_json(extra: &Extra) -> Result<String> {
	let rest: Extra = extra.iter().filter(|(k, _)| k.as_str() != IMAGE_FILENAME).map(|(k, v)| (k.clone(), v.clone())).collect();
	serde_json::to_string(&rest).map_err(|e| Error::validation(format!("unserialisable chunk metadata: {e}")))
}

/// Builds one batch; row `i` gets insertion sequence `first_seq + i`.
pub fn chunks_to_record_batch(chunks: &[Chunk], vectors: &[Vec<f32>], first_seq: i64, dim: usize) -> Result<RecordBatch> {
	let schema = build_chunk_schema(dim);
	let mut ids = Vec::with_capacity(chunks.len()); let mut texts = Vec::with_capacity(chunks.len()); let mut sources = Vec::with_capacity(chunks.len());
	let mut kinds = Vec::with_capacity(chunks.len()); let mut image_files: Vec<Option<String>> = Vec::with_capacity(chunks.len()); let mut extras = Vec::with_capacity(chunks.len());
	let mut seqs = Vec::with_capacity(chunks.len()); let mut vecs: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
	for (i, (chunk, vector)) in chunks.iter().zip(vectors).enumerate() {
		ids.push(chunk.id.clone()); texts.push(chunk.text.clone()); sources.push(chunk.source.clone());
		kinds.push(chunk.kind.as_str().to_string()); image_files.push(chunk.image_filename().map(str::to_string)); extras.push(extra_to_json(&chunk.extra)?);
		seqs.push(first_seq + i as i64); vecs.push(Some(vector.iter().map(|&x| Some(x)).collect()));
	}
	RecordBatch::try_new(schema, vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(texts)),
		Arc::new(StringArray::from(sources)),
		Arc::new(StringArray::from(kinds)),
		Arc::new(StringArray::from(image_files)),
		Arc::new(StringArray::from(extras)),
		Arc::new(Int64Array::from(seqs)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vecs.into_iter(), dim as i32)),
	])
	.map_err(Error::backend)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn image_filename_is_kept_out_of_extra_json() {
		let chunk = Chunk::image("a:image:f.png", "diagram", "a", "/img/a/f.png").with_extra("page", "4");
		assert_eq!(extra_to_json(&chunk.extra).unwrap(), r#"{"page":"4"}"#);
	}

	#[test]
	fn batch_rows_carry_sequential_seq() {
		let chunks = vec![Chunk::text("a:0", "one", "a"), Chunk::text("a:1", "two", "a")];
		let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
		let rb = chunks_to_record_batch(&chunks, &vectors, 7, 2).unwrap();
		assert_eq!(rb.num_rows(), 2);
		let seq = rb.column_by_name("seq").unwrap().as_any().downcast_ref::<Int64Array>().unwrap();
		assert_eq!((seq.value(0), seq.value(1)), (7, 8));
	}
}
