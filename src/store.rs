//! SQLite-backed text store.
//!
//! Two tables back the full-text index:
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `fts` | FTS5 virtual table `(path, content)` with the `trigram` tokenizer |
//! | `fts_metadata` | `rowid -> (path, cacheKey, chunkId)`, upserted by id |
//!
//! The trigram tokenizer indexes every overlapping 3-character fragment,
//! so identifiers match on any substring of at least three characters
//! instead of only on whitespace-delimited words.
//!
//! Queries join against the `chunks` and `chunk_tags` tables, which are
//! owned by the chunk extraction side (see [`crate::chunk_store`]).
//!
//! Every write path runs inside a single transaction per diff entry, so
//! a text row and its metadata row are always committed (or rolled back)
//! together.

use std::sync::Arc;

use codebase_fts_core::models::{Chunk, PathAndCacheKey};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::OnceCell;

use crate::chunk_store::ChunkRow;
use crate::error::{IndexError, Result};

/// A full-text candidate row, decoded once at the storage boundary.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateRow {
    pub chunk_id: i64,
    pub path: String,
    pub content: String,
    /// FTS5 BM25 rank; negative, lower is more relevant.
    pub rank: f64,
}

/// Row counts reported by `cfts stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct StoreStats {
    pub text_rows: i64,
    pub metadata_rows: i64,
    pub paths: i64,
}

/// Handle to the full-text tables.
///
/// Construct once per process and clone freely; clones share the pool and
/// the schema-initialized flag.
#[derive(Debug, Clone)]
pub struct TextStore {
    pool: SqlitePool,
    schema: Arc<OnceCell<()>>,
}

impl TextStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema: Arc::new(OnceCell::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the full-text tables if they are missing.
    ///
    /// Runs the DDL at most once per handle; concurrent callers wait on the
    /// first. The statements themselves are `IF NOT EXISTS`, so separate
    /// handles (or processes) racing on one database file are fine too.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| create_tables(&self.pool))
            .await
            .map_err(IndexError::Schema)?;
        Ok(())
    }

    /// Write the text and metadata rows for one compute entry.
    ///
    /// Rows previously written for the same `(path, cacheKey)` are removed
    /// first, so processing an entry twice leaves one row per chunk.
    /// Returns the number of rows written.
    pub async fn replace_rows(&self, item: &PathAndCacheKey, chunks: &[Chunk]) -> Result<usize> {
        self.write_rows(item, chunks)
            .await
            .map_err(|e| IndexError::from_sqlx(format!("compute {}", item.path), e))
    }

    async fn write_rows(
        &self,
        item: &PathAndCacheKey,
        chunks: &[Chunk],
    ) -> std::result::Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM fts WHERE rowid IN (SELECT id FROM fts_metadata WHERE path = ? AND cacheKey = ?)",
        )
        .bind(&item.path)
        .bind(&item.cache_key)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM fts_metadata WHERE path = ? AND cacheKey = ?")
            .bind(&item.path)
            .bind(&item.cache_key)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            let row_id = sqlx::query("INSERT INTO fts (path, content) VALUES (?, ?)")
                .bind(&item.path)
                .bind(&chunk.content)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

            sqlx::query(
                r#"
                INSERT INTO fts_metadata (id, path, cacheKey, chunkId)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    path = excluded.path,
                    cacheKey = excluded.cacheKey,
                    chunkId = excluded.chunkId
                "#,
            )
            .bind(row_id)
            .bind(&item.path)
            .bind(&item.cache_key)
            .bind(chunk.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(chunks.len())
    }

    /// Remove one deleted file version from the index.
    ///
    /// Deletes the text rows and metadata written for `(path, cacheKey)`,
    /// plus any text row for `path` that has no metadata at all. Rows of
    /// other versions of the same path stay, so a diff that computes the
    /// new version and deletes the old one leaves the new one searchable.
    pub async fn delete_rows(&self, item: &PathAndCacheKey) -> Result<()> {
        self.remove_rows(item)
            .await
            .map_err(|e| IndexError::from_sqlx(format!("del {}", item.path), e))
    }

    async fn remove_rows(&self, item: &PathAndCacheKey) -> std::result::Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM fts WHERE rowid IN (SELECT id FROM fts_metadata WHERE path = ? AND cacheKey = ?)",
        )
        .bind(&item.path)
        .bind(&item.cache_key)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM fts_metadata WHERE path = ? AND cacheKey = ?")
            .bind(&item.path)
            .bind(&item.cache_key)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM fts WHERE path = ? AND rowid NOT IN (SELECT id FROM fts_metadata)")
            .bind(&item.path)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM fts_metadata WHERE path = ? AND id NOT IN (SELECT rowid FROM fts)")
            .bind(&item.path)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Run a ranked full-text match restricted to chunks carrying one of
    /// `tag_keys` and, optionally, to `filter_paths`.
    ///
    /// `match_expr` is an FTS5 expression and is always bound, never
    /// spliced into the SQL text. An expression FTS5 cannot parse comes
    /// back as [`IndexError::InvalidArgument`].
    pub async fn search(
        &self,
        match_expr: &str,
        tag_keys: &[String],
        filter_paths: Option<&[String]>,
        limit: i64,
    ) -> Result<Vec<CandidateRow>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT fts_metadata.chunkId AS chunk_id,
                   fts_metadata.path AS path,
                   fts.content AS content,
                   fts.rank AS rank
            FROM fts
            JOIN fts_metadata ON fts.rowid = fts_metadata.id
            WHERE fts MATCH "#,
        );
        qb.push_bind(match_expr);

        qb.push(" AND fts_metadata.chunkId IN (SELECT chunkId FROM chunk_tags WHERE tag IN (");
        let mut tags = qb.separated(", ");
        for key in tag_keys {
            tags.push_bind(key);
        }
        tags.push_unseparated("))");

        if let Some(paths) = filter_paths {
            qb.push(" AND fts_metadata.path IN (");
            let mut sep = qb.separated(", ");
            for path in paths {
                sep.push_bind(path);
            }
            sep.push_unseparated(")");
        }

        qb.push(" ORDER BY fts.rank LIMIT ");
        qb.push_bind(limit);

        qb.build_query_as::<CandidateRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::from_match("retrieve", e))
    }

    /// Load full chunk records by id, in no particular order.
    pub async fn chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(ChunkRow::SELECT);
        qb.push(" WHERE id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");

        let rows = qb
            .build_query_as::<ChunkRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::from_sqlx("retrieve chunks", e))?;

        Ok(rows.into_iter().map(Chunk::from).collect())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.ensure_schema().await?;
        sqlx::query_as::<_, StoreStats>(
            r#"
            SELECT (SELECT COUNT(*) FROM fts) AS text_rows,
                   (SELECT COUNT(*) FROM fts_metadata) AS metadata_rows,
                   (SELECT COUNT(DISTINCT path) FROM fts_metadata) AS paths
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| IndexError::from_sqlx("stats", e))
    }
}

async fn create_tables(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS fts USING fts5(
            path,
            content,
            tokenize = 'trigram'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fts_metadata (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL,
            cacheKey TEXT NOT NULL,
            chunkId INTEGER NOT NULL,
            FOREIGN KEY (chunkId) REFERENCES chunks (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fts_metadata_path_cache_key ON fts_metadata(path, cacheKey)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fts_metadata_chunk_id ON fts_metadata(chunkId)")
        .execute(pool)
        .await?;

    tracing::debug!("full-text schema ready");
    Ok(())
}
