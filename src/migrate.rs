//! Database schema bootstrap.
//!
//! Creates the chunk and tag-association tables that the full-text index
//! joins against, then the full-text tables themselves. Safe to run on a
//! database whose chunk tables were already created by another indexer.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::store::TextStore;

pub async fn run_migrations(store: &TextStore) -> Result<()> {
    create_chunk_tables(store.pool()).await?;
    store.ensure_schema().await?;
    Ok(())
}

async fn create_chunk_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cacheKey TEXT NOT NULL,
            path TEXT NOT NULL,
            idx INTEGER NOT NULL,
            startLine INTEGER NOT NULL,
            endLine INTEGER NOT NULL,
            content TEXT NOT NULL,
            UNIQUE(path, cacheKey, idx)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tag TEXT NOT NULL,
            chunkId INTEGER NOT NULL,
            FOREIGN KEY (chunkId) REFERENCES chunks (id),
            UNIQUE (tag, chunkId)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_path_cache_key ON chunks(path, cacheKey)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_tags_tag ON chunk_tags(tag)")
        .execute(pool)
        .await?;

    Ok(())
}
