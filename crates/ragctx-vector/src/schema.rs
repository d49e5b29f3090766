use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const COL_ID: &str = "id";
pub const COL_TEXT: &str = "text";
pub const COL_SOURCE: &str = "source";
pub const COL_KIND: &str = "kind";
pub const COL_IMAGE_FILENAME: &str = "image_filename";
pub const COL_EXTRA: &str = "extra";
pub const COL_SEQ: &str = "seq";
pub const COL_VECTOR: &str = "vector";
/// Cosine distance column added by vector search.
pub const COL_DISTANCE: &str = "_distance";

/// Layout of one collection generation.
///
/// `extra` holds the chunk's free-form metadata as a JSON object, minus
/// `image_filename` which lives in its own column. `seq` records insertion
/// order and breaks score ties.
pub fn build_chunk_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(COL_ID, DataType::Utf8, false),
		Field::new(COL_TEXT, DataType::Utf8, false),
		Field::new(COL_SOURCE, DataType::Utf8, false),
		Field::new(COL_KIND, DataType::Utf8, false),
		Field::new(COL_IMAGE_FILENAME, DataType::Utf8, true),
		Field::new(COL_EXTRA, DataType::Utf8, false),
		Field::new(COL_SEQ, DataType::Int64, false),
		Field::new(COL_VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
	]))
}

/// Key/value table mapping collection names to their active physical table.
pub fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}

/// Vector width declared by a stored chunk schema, if any.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(COL_VECTOR).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => Some(*n as usize),
		_ => None,
	}
}
