//! Chunk deduplication.
//!
//! Removes later occurrences of chunks that cover the same line range of
//! the same file, keeping the first one seen. Runs before chunks are
//! persisted and again over merged retrieval results.

use std::collections::HashSet;
use std::hash::Hash;

use crate::models::{Chunk, RetrievedChunk};

/// Keep the first item for each key, preserving input order.
pub fn dedup_by_key<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

/// Drop chunks whose `(path, start_line, end_line)` was already seen.
pub fn deduplicate_chunks(chunks: Vec<Chunk>) -> Vec<Chunk> {
    dedup_by_key(chunks, |c| (c.path.clone(), c.start_line, c.end_line))
}

/// Same as [`deduplicate_chunks`], for query results.
pub fn deduplicate_retrieved(chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    dedup_by_key(chunks, |c| (c.filepath.clone(), c.start_line, c.end_line))
}
