//! Chunk provider abstraction.
//!
//! Chunks are extracted and persisted upstream; the index maintainer only
//! reads them back by `(path, cache_key)`. Implementations must be
//! `Send + Sync` to work with async runtimes.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::Chunk;

#[async_trait]
pub trait ChunkProvider: Send + Sync {
    /// Return the materialized chunks for one version of one file, ordered
    /// by chunk index. An empty vector means nothing was materialized.
    async fn chunks_for(&self, path: &str, cache_key: &str) -> Result<Vec<Chunk>>;
}

/// Content-derived cache key: lowercase hex SHA-256.
pub fn cache_key(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
