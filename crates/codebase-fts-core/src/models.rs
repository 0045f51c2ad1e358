//! Core data types shared by the index maintainer and the query engine.
//!
//! Field names on the serialized forms follow the JSON produced by the
//! chunk extraction and diff collaborators (`cacheKey`, `startLine`, ...),
//! so diffs and chunk exports can be read straight from their files.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous line range of a source file, as materialized by the
/// upstream chunk extractor.
///
/// Chunks are immutable once created and unique by
/// `(path, cache_key, index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: i64,
    pub path: String,
    pub index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
    pub cache_key: String,
}

/// Scope discriminator partitioning one physical store into many
/// addressable sub-indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexTag {
    pub directory: String,
    pub branch: String,
    pub artifact_kind: String,
}

impl IndexTag {
    pub fn new(
        directory: impl Into<String>,
        branch: impl Into<String>,
        artifact_kind: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            branch: branch.into(),
            artifact_kind: artifact_kind.into(),
        }
    }
}

/// One entry of a [`RefreshIndexResults`] list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathAndCacheKey {
    pub path: String,
    pub cache_key: String,
}

impl PathAndCacheKey {
    pub fn new(path: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cache_key: cache_key.into(),
        }
    }
}

/// The set of operations needed to bring one tag's index up to date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshIndexResults {
    #[serde(default)]
    pub compute: Vec<PathAndCacheKey>,
    #[serde(default)]
    pub add_tag: Vec<PathAndCacheKey>,
    #[serde(default)]
    pub remove_tag: Vec<PathAndCacheKey>,
    #[serde(default)]
    pub del: Vec<PathAndCacheKey>,
}

impl RefreshIndexResults {
    /// Total number of entries across all four lists.
    pub fn len(&self) -> usize {
        self.compute.len() + self.add_tag.len() + self.remove_tag.len() + self.del.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which list of a diff an entry came from, passed to the batch-complete
/// callback so bookkeeping can record what was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexResultType {
    Compute,
    AddTag,
    RemoveTag,
    Delete,
}

impl fmt::Display for IndexResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexResultType::Compute => "compute",
            IndexResultType::AddTag => "addTag",
            IndexResultType::RemoveTag => "removeTag",
            IndexResultType::Delete => "del",
        };
        f.write_str(s)
    }
}

/// A chunk returned from a full-text query.
///
/// `digest` carries the chunk's cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub filepath: String,
    pub index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
    pub digest: String,
}

impl From<Chunk> for RetrievedChunk {
    fn from(chunk: Chunk) -> Self {
        Self {
            filepath: chunk.path,
            index: chunk.index,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            content: chunk.content,
            digest: chunk.cache_key,
        }
    }
}
