//! LanceDB connection and housekeeping helpers.
//!
//! Provides the open function, an ensure-table helper, and a simple key/value
//! metadata table used to store pointers from collection names to the
//! physical table currently serving them.
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

use ragctx_core::{Error, Result};

use crate::schema::build_meta_schema;

/// Table holding `collection name -> physical table` pointers.
pub const META_TABLE: &str = "collections";

pub async fn open_db(uri: &str) -> Result<Connection> {
	connect(uri).execute().await.map_err(Error::backend)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
	let names = conn.table_names().execute().await.map_err(Error::backend)?;
	Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
	if table_exists(conn, name).await? {
		return Ok(());
	}
	// create empty table with 0 rows
	let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
	conn.create_table(name, Box::new(iter)).execute().await.map_err(Error::backend)?;
	Ok(())
}

/// Escapes a value for use inside a single-quoted SQL literal.
pub fn sql_quote(value: &str) -> String {
	value.replace('\'', "''")
}

pub async fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
	ensure_table(conn, META_TABLE, build_meta_schema()).await?;
	let t = conn.open_table(META_TABLE).execute().await.map_err(Error::backend)?;
	let rb = RecordBatch::try_new(
		build_meta_schema(),
		vec![
			Arc::new(StringArray::from(vec![key.to_string()])),
			Arc::new(StringArray::from(vec![value.to_string()])),
			Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
		],
	)
	.map_err(Error::backend)?;
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
	// Upsert behavior via merge_insert: key is unique
	let mut mi = t.merge_insert(&["key"]);
	mi.when_matched_update_all(None).when_not_matched_insert_all();
	mi.execute(reader).await.map_err(Error::backend)?;
	Ok(())
}

pub async fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
	if !table_exists(conn, META_TABLE).await? { return Ok(None); }
	let t = conn.open_table(META_TABLE).execute().await.map_err(Error::backend)?;
	let mut stream = t.query().only_if(format!("key = '{}'", sql_quote(key))).execute().await.map_err(Error::backend)?;
	while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
		if batch.num_rows() == 0 { continue; }
		let val = batch
			.column_by_name("value")
			.and_then(|c| c.as_any().downcast_ref::<StringArray>())
			.ok_or_else(|| Error::backend("meta.value column missing"))?;
		return Ok(Some(val.value(0).to_string()));
	}
	Ok(None)
}

pub async fn delete_meta(conn: &Connection, key: &str) -> Result<()> {
	if !table_exists(conn, META_TABLE).await? { return Ok(()); }
	let t = conn.open_table(META_TABLE).execute().await.map_err(Error::backend)?;
	t.delete(&format!("key = '{}'", sql_quote(key))).await.map_err(Error::backend)?;
	Ok(())
}

/// All `(key, value)` pairs, sorted by key.
pub async fn list_meta(conn: &Connection) -> Result<Vec<(String, String)>> {
	if !table_exists(conn, META_TABLE).await? { return Ok(Vec::new()); }
	let t = conn.open_table(META_TABLE).execute().await.map_err(Error::backend)?;
	let mut stream = t.query().execute().await.map_err(Error::backend)?;
	let mut out = Vec::new();
	while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
		let keys = batch.column_by_name("key").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| Error::backend("meta.key column missing"))?;
		let vals = batch.column_by_name("value").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| Error::backend("meta.value column missing"))?;
		for i in 0..batch.num_rows() { out.push((keys.value(i).to_string(), vals.value(i).to_string())); }
	}
	out.sort();
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sql_quote_doubles_single_quotes() {
		assert_eq!(sql_quote("o'brien"), "o''brien");
		assert_eq!(sql_quote("plain"), "plain");
	}

	#[tokio::test]
	async fn meta_roundtrip_and_delete() {
		let tmp = tempfile::tempdir().unwrap();
		let conn = open_db(&tmp.path().to_string_lossy()).await.unwrap();
		assert_eq!(get_meta(&conn, "docs").await.unwrap(), None);
		set_meta(&conn, "docs", "docs-g1").await.unwrap();
		set_meta(&conn, "docs", "docs-g2").await.unwrap();
		assert_eq!(get_meta(&conn, "docs").await.unwrap().as_deref(), Some("docs-g2"));
		assert_eq!(list_meta(&conn).await.unwrap().len(), 1);
		delete_meta(&conn, "docs").await.unwrap();
		assert_eq!(get_meta(&conn, "docs").await.unwrap(), None);
	}
}
