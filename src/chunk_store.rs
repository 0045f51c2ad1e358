//! SQLite chunk store: the `chunks` and `chunk_tags` tables.
//!
//! In a full deployment these tables are written by the chunk extraction
//! index and its tag bookkeeping; the full-text index only reads them.
//! [`SqliteChunkStore`] provides that read path as a [`ChunkProvider`],
//! plus the small write surface `cfts ingest` and tests use to stand in
//! for the extractor.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use codebase_fts_core::dedup::deduplicate_chunks;
use codebase_fts_core::models::{Chunk, IndexTag, PathAndCacheKey};
use codebase_fts_core::provider::ChunkProvider;
use codebase_fts_core::tag::tag_to_string;

/// A `chunks` row with its columns renamed to snake case.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChunkRow {
    pub id: i64,
    pub path: String,
    pub chunk_index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
    pub cache_key: String,
}

impl ChunkRow {
    pub const SELECT: &'static str = "SELECT id, path, idx AS chunk_index, startLine AS start_line, \
         endLine AS end_line, content, cacheKey AS cache_key FROM chunks";
}

impl From<ChunkRow> for Chunk {
    fn from(row: ChunkRow) -> Self {
        Chunk {
            id: row.id,
            path: row.path,
            index: row.chunk_index,
            start_line: row.start_line,
            end_line: row.end_line,
            content: row.content,
            cache_key: row.cache_key,
        }
    }
}

pub struct SqliteChunkStore {
    pool: SqlitePool,
}

impl SqliteChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist chunks, dropping duplicate line ranges first.
    ///
    /// Incoming `id`s are ignored. A chunk already stored under the same
    /// `(path, cacheKey, idx)` is kept as is. Returns the stored chunks
    /// with their database ids.
    pub async fn insert_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        let chunks = deduplicate_chunks(chunks);
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(chunks.len());

        for mut chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (cacheKey, path, idx, startLine, endLine, content)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(path, cacheKey, idx) DO NOTHING
                "#,
            )
            .bind(&chunk.cache_key)
            .bind(&chunk.path)
            .bind(chunk.index)
            .bind(chunk.start_line)
            .bind(chunk.end_line)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;

            chunk.id = sqlx::query_scalar(
                "SELECT id FROM chunks WHERE path = ? AND cacheKey = ? AND idx = ?",
            )
            .bind(&chunk.path)
            .bind(&chunk.cache_key)
            .bind(chunk.index)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(chunk);
        }

        tx.commit().await?;
        Ok(stored)
    }

    /// Associate every chunk of `item` with `tag`. Returns rows added.
    pub async fn add_tag(&self, tag: &IndexTag, item: &PathAndCacheKey) -> Result<u64> {
        let key = tag_to_string(tag)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chunk_tags (tag, chunkId)
            SELECT ?, id FROM chunks WHERE path = ? AND cacheKey = ?
            "#,
        )
        .bind(&key)
        .bind(&item.path)
        .bind(&item.cache_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Drop the association between `tag` and every chunk of `item`.
    pub async fn remove_tag(&self, tag: &IndexTag, item: &PathAndCacheKey) -> Result<u64> {
        let key = tag_to_string(tag)?;
        let result = sqlx::query(
            r#"
            DELETE FROM chunk_tags
            WHERE tag = ?
              AND chunkId IN (SELECT id FROM chunks WHERE path = ? AND cacheKey = ?)
            "#,
        )
        .bind(&key)
        .bind(&item.path)
        .bind(&item.cache_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChunkProvider for SqliteChunkStore {
    async fn chunks_for(&self, path: &str, cache_key: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>(&format!(
            "{} WHERE path = ? AND cacheKey = ? ORDER BY idx",
            ChunkRow::SELECT
        ))
        .bind(path)
        .bind(cache_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Chunk::from).collect())
    }
}
