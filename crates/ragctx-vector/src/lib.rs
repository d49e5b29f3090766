//! Durable vector index over LanceDB.
//!
//! Each collection name points (through the [`table::META_TABLE`] meta table)
//! at one physical table, a "generation". Rebuilds stage a fresh generation and
//! publish it by flipping the pointer, so readers never see a half-built
//! collection. The replaced generation is dropped on publish, so handles to it
//! stop working. Vectors are expected to be unit length; search uses cosine
//! distance and reports `score = 1 - distance`.
use arrow_array::{Int64Array, RecordBatchIterator, StringArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use ragctx_core::config::{expand_path, DuplicatePolicy, IndexSettings};
use ragctx_core::types::{Chunk, ChunkId, ChunkKind, IndexEntry, QueryResult};
use ragctx_core::{Error, Result};

pub mod build;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use build::{BuildReport, IndexBuilder};

use schema::{build_chunk_schema, vector_dim, COL_ID, COL_SEQ, COL_SOURCE};
use search::{rank_rows, rows_from_batch, StoredRow};
use table::{delete_meta, get_meta, list_meta, open_db, set_meta, sql_quote, table_exists, META_TABLE};

/// Extra candidates fetched past `k` so ties on the boundary resolve by insertion order.
const TIE_SLACK: usize = 16;

/// Opaque reference to one generation of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    name: String,
    table: String,
}

impl CollectionHandle {
    pub fn name(&self) -> &str { &self.name }

    /// Physical table backing this generation.
    pub fn table_name(&self) -> &str { &self.table }
}

pub struct VectorIndex {
    conn: Connection,
    dim: usize,
    duplicates: DuplicatePolicy,
}

impl VectorIndex {
    pub async fn open(uri: &str, dim: usize, duplicates: DuplicatePolicy) -> Result<Self> {
        if dim == 0 {
            return Err(Error::validation("index dimension must be positive"));
        }
        info!(uri, dim, ?duplicates, "Opening vector index");
        Ok(Self { conn: open_db(uri).await?, dim, duplicates })
    }

    pub async fn from_settings(settings: &IndexSettings) -> Result<Self> {
        let path = expand_path(&settings.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::backend)?;
        }
        Self::open(&path.to_string_lossy(), settings.dim, settings.duplicate_ids).await
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn duplicate_policy(&self) -> DuplicatePolicy { self.duplicates }

    /// Attach to `name`, creating an empty collection if it does not exist.
    /// Never empties an existing collection.
    pub async fn create_or_open_collection(&self, name: &str) -> Result<CollectionHandle> {
        validate_collection_name(name)?;
        if let Some(handle) = self.lookup(name).await? {
            return Ok(handle);
        }
        let handle = self.create_generation(name).await?;
        set_meta(&self.conn, name, &handle.table).await?;
        info!(collection = name, table = %handle.table, "Created collection");
        Ok(handle)
    }

    /// Attach to an existing collection.
    pub async fn collection(&self, name: &str) -> Result<CollectionHandle> {
        validate_collection_name(name)?;
        self.lookup(name).await?.ok_or_else(|| Error::not_found(format!("collection '{name}'")))
    }

    pub async fn collection_names(&self) -> Result<Vec<String>> {
        Ok(list_meta(&self.conn).await?.into_iter().map(|(k, _)| k).collect())
    }

    /// Creates a fresh, unpublished generation of `name`.
    pub async fn stage_collection(&self, name: &str) -> Result<CollectionHandle> {
        validate_collection_name(name)?;
        let handle = self.create_generation(name).await?;
        debug!(collection = name, table = %handle.table, "Staged collection generation");
        Ok(handle)
    }

    /// Points the collection name at `handle`'s generation and drops the
    /// generation it replaces.
    pub async fn publish(&self, handle: &CollectionHandle) -> Result<()> {
        let previous = get_meta(&self.conn, &handle.name).await?;
        set_meta(&self.conn, &handle.name, &handle.table).await?;
        info!(collection = %handle.name, table = %handle.table, "Published collection generation");
        if let Some(old) = previous.filter(|old| *old != handle.table) {
            self.drop_generation(&old).await?;
        }
        Ok(())
    }

    /// Drops an unpublished generation, e.g. after a failed build.
    pub async fn discard(&self, handle: &CollectionHandle) -> Result<()> {
        if get_meta(&self.conn, &handle.name).await?.as_deref() == Some(handle.table.as_str()) {
            return Err(Error::validation(format!("'{}' is the published generation of '{}'", handle.table, handle.name)));
        }
        self.drop_generation(&handle.table).await
    }

    /// Removes `name` and its data. Dropping a missing collection is a no-op.
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        let Some(table) = get_meta(&self.conn, name).await? else {
            debug!(collection = name, "drop of missing collection ignored");
            return Ok(());
        };
        delete_meta(&self.conn, name).await?;
        self.drop_generation(&table).await?;
        info!(collection = name, "Dropped collection");
        Ok(())
    }

    /// Physical tables backing collection generations, sorted.
    pub async fn generation_tables(&self) -> Result<Vec<String>> {
        let mut names = self.conn.table_names().execute().await.map_err(Error::backend)?;
        names.retain(|n| n != META_TABLE);
        names.sort();
        Ok(names)
    }

    /// Inserts entries keyed by `ids`; `ids[i]` becomes the stored id of
    /// `chunks[i]`. Existing ids follow the configured [`DuplicatePolicy`].
    pub async fn insert(&self, handle: &CollectionHandle, chunks: &[Chunk], vectors: &[Vec<f32>], ids: &[ChunkId]) -> Result<usize> {
        if chunks.len() != vectors.len() || chunks.len() != ids.len() {
            return Err(Error::validation(format!(
                "length mismatch: {} chunks, {} vectors, {} ids",
                chunks.len(),
                vectors.len(),
                ids.len()
            )));
        }
        let keyed: Vec<Chunk> = chunks.iter().zip(ids).map(|(c, id)| Chunk { id: id.clone(), ..c.clone() }).collect();
        self.insert_chunks(handle, &keyed, vectors).await
    }

    /// Inserts entries keyed by their own `Chunk::id`.
    pub async fn insert_chunks(&self, handle: &CollectionHandle, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(Error::validation(format!("length mismatch: {} chunks, {} vectors", chunks.len(), vectors.len())));
        }
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut seen = HashSet::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(vectors) {
            chunk.validate()?;
            if !seen.insert(chunk.id.as_str()) {
                return Err(Error::validation(format!("duplicate id '{}' in one insert", chunk.id)));
            }
            if vector.len() != self.dim {
                return Err(Error::validation(format!(
                    "vector for '{}' has dimension {} (index expects {})",
                    chunk.id,
                    vector.len(),
                    self.dim
                )));
            }
        }

        let table = self.open_physical(&handle.table).await?;
        if self.duplicates == DuplicatePolicy::Reject {
            let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
            if let Some(existing) = self.existing_ids(&table, &ids).await?.into_iter().next() {
                return Err(Error::validation(format!("id '{existing}' already exists in '{}'", handle.name)));
            }
        }

        let first_seq = self.next_seq(&table).await?;
        let batch = writer::chunks_to_record_batch(chunks, vectors, first_seq, self.dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let mut mi = table.merge_insert(&[COL_ID]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        let res = mi.execute(reader).await.map_err(Error::backend)?;
        if res.num_updated_rows > 0 {
            debug!(collection = %handle.name, updated = res.num_updated_rows, "Overwrote existing ids");
        }
        debug!(collection = %handle.name, inserted = chunks.len(), "Inserted entries");
        Ok(chunks.len())
    }

    /// Top-`k` entries by descending cosine similarity; ties keep insertion order.
    pub async fn query(&self, handle: &CollectionHandle, query_vector: &[f32], k: usize) -> Result<QueryResult> {
        self.query_kind(handle, query_vector, k, None).await
    }

    /// Like [`VectorIndex::query`], restricted to entries of `kind` when given.
    pub async fn query_kind(
        &self,
        handle: &CollectionHandle,
        query_vector: &[f32],
        k: usize,
        kind: Option<ChunkKind>,
    ) -> Result<QueryResult> {
        if k == 0 {
            return Err(Error::validation("k must be positive"));
        }
        if query_vector.len() != self.dim {
            return Err(Error::validation(format!("query vector has dimension {} (index expects {})", query_vector.len(), self.dim)));
        }
        let table = self.open_physical(&handle.table).await?;
        let total = table.count_rows(None).await.map_err(Error::backend)?;
        if total == 0 {
            return Ok(QueryResult::empty());
        }
        let mut search = table
            .vector_search(query_vector.to_vec())
            .map_err(Error::backend)?
            .distance_type(DistanceType::Cosine)
            .limit(k.min(total).saturating_add(TIE_SLACK));
        if let Some(kind) = kind {
            search = search.only_if(format!("kind = '{}'", kind.as_str()));
        }
        let mut stream = search.execute().await.map_err(Error::backend)?;
        let mut rows: Vec<StoredRow> = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
            rows.extend(rows_from_batch(&batch)?);
        }
        rank_rows(&mut rows);
        rows.truncate(k);
        Ok(QueryResult::from_ranked(rows.into_iter().map(|r| (r.score(), r.chunk)).collect()))
    }

    pub async fn count(&self, handle: &CollectionHandle) -> Result<usize> {
        let table = self.open_physical(&handle.table).await?;
        table.count_rows(None).await.map_err(Error::backend)
    }

    /// Distinct sources present in the collection, sorted.
    pub async fn sources(&self, handle: &CollectionHandle) -> Result<Vec<String>> {
        let table = self.open_physical(&handle.table).await?;
        let mut stream = table.query().select(Select::columns(&[COL_SOURCE])).execute().await.map_err(Error::backend)?;
        let mut sources = BTreeSet::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
            if let Some(col) = batch.column_by_name(COL_SOURCE).and_then(|c| c.as_any().downcast_ref::<StringArray>()) {
                sources.extend((0..batch.num_rows()).map(|i| col.value(i).to_string()));
            }
        }
        Ok(sources.into_iter().collect())
    }

    /// Entries of one source and kind, in insertion order, with their vectors.
    pub async fn entries_by_source(&self, handle: &CollectionHandle, source: &str, kind: ChunkKind, limit: usize) -> Result<Vec<IndexEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let table = self.open_physical(&handle.table).await?;
        let filter = format!("source = '{}' AND kind = '{}'", sql_quote(source), kind.as_str());
        let mut stream = table.query().only_if(filter).execute().await.map_err(Error::backend)?;
        let mut rows: Vec<StoredRow> = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
            rows.extend(rows_from_batch(&batch)?);
        }
        rows.sort_by_key(|r| r.seq);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|r| IndexEntry { vector: r.vector.unwrap_or_default(), chunk: r.chunk })
            .collect())
    }

    async fn lookup(&self, name: &str) -> Result<Option<CollectionHandle>> {
        let Some(table) = get_meta(&self.conn, name).await? else { return Ok(None) };
        if !table_exists(&self.conn, &table).await? {
            warn!(collection = name, table = %table, "collection points at a missing table");
            return Ok(None);
        }
        let t = self.open_physical(&table).await?;
        let schema = t.schema().await.map_err(Error::backend)?;
        match vector_dim(&schema) {
            Some(d) if d == self.dim => Ok(Some(CollectionHandle { name: name.to_string(), table })),
            Some(d) => Err(Error::validation(format!("collection '{name}' stores dimension {d}, index configured for {}", self.dim))),
            None => Err(Error::backend(format!("table '{table}' has no vector column"))),
        }
    }

    async fn create_generation(&self, name: &str) -> Result<CollectionHandle> {
        let stamp = Utc::now().timestamp_micros();
        let mut table = format!("{name}-g{stamp}");
        let mut n = 1;
        while table_exists(&self.conn, &table).await? {
            table = format!("{name}-g{stamp}-{n}");
            n += 1;
        }
        let iter = RecordBatchIterator::new(vec![].into_iter(), build_chunk_schema(self.dim));
        self.conn.create_table(&table, Box::new(iter)).execute().await.map_err(Error::backend)?;
        Ok(CollectionHandle { name: name.to_string(), table })
    }

    async fn open_physical(&self, table: &str) -> Result<Table> {
        self.conn.open_table(table).execute().await.map_err(|e| match e {
            lancedb::Error::TableNotFound { .. } => Error::not_found(format!("table '{table}'")),
            other => Error::backend(other),
        })
    }

    async fn drop_generation(&self, table: &str) -> Result<()> {
        if !table_exists(&self.conn, table).await? {
            return Ok(());
        }
        self.conn.drop_table(table, &[]).await.map_err(Error::backend)?;
        debug!(table, "Dropped generation");
        Ok(())
    }

    async fn next_seq(&self, table: &Table) -> Result<i64> {
        let mut stream = table.query().select(Select::columns(&[COL_SEQ])).execute().await.map_err(Error::backend)?;
        let mut max = -1i64;
        while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
            if let Some(seqs) = batch.column_by_name(COL_SEQ).and_then(|c| c.as_any().downcast_ref::<Int64Array>()) {
                max = seqs.values().iter().copied().fold(max, i64::max);
            }
        }
        Ok(max + 1)
    }

    async fn existing_ids(&self, table: &Table, ids: &[&str]) -> Result<Vec<String>> {
        let list = ids.iter().map(|id| format!("'{}'", sql_quote(id))).collect::<Vec<_>>().join(", ");
        let mut stream = table
            .query()
            .only_if(format!("id IN ({list})"))
            .select(Select::columns(&[COL_ID]))
            .execute()
            .await
            .map_err(Error::backend)?;
        let mut found = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::backend)? {
            if let Some(col) = batch.column_by_name(COL_ID).and_then(|c| c.as_any().downcast_ref::<StringArray>()) {
                found.extend((0..batch.num_rows()).map(|i| col.value(i).to_string()));
            }
        }
        Ok(found)
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return Err(Error::validation(format!("invalid collection name '{name}'")));
    }
    Ok(())
}
