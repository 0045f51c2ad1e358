//! Tag-scoped, ranked full-text retrieval.
//!
//! # Algorithm
//!
//! 1. Validate arguments (non-empty tags, positive limit, encodable tags,
//!    non-NaN threshold) before touching storage.
//! 2. Strip the `?` placeholder from the query text and turn it into a
//!    match expression: each whitespace-separated term becomes a quoted
//!    phrase, so `.`, `()` and `-` are matched literally. With `raw` set
//!    the text is used as an FTS5 expression as is. Empty text matches
//!    nothing and returns `[]` without a query.
//! 3. Match the text against the `fts` table, restricted to chunks tagged
//!    with any requested tag (and to `filter_paths`, if given), ordered by
//!    ascending BM25 rank and capped at `limit` rows.
//! 4. Drop rows whose rank exceeds `bm25_threshold`.
//! 5. Resolve chunk ids to full chunk records and return them in rank
//!    order, keeping only the best-ranked chunk per line range (an old and
//!    a new version of a file can both still be indexed). Ties keep
//!    SQLite's iteration order.

use std::collections::{HashMap, HashSet};

use codebase_fts_core::dedup::deduplicate_retrieved;
use codebase_fts_core::models::{IndexTag, RetrievedChunk};
use codebase_fts_core::query::{sanitize_query, terms_query};
use codebase_fts_core::tag::tag_to_string;

use crate::error::{IndexError, Result};
use crate::store::TextStore;

/// Bundles all inputs for a single retrieval.
#[derive(Debug, Clone)]
pub struct RetrieveRequest<'a> {
    /// Scopes to search; a chunk matches if it carries any of them.
    pub tags: &'a [IndexTag],
    /// Query text. Matched as literal terms unless `raw` is set.
    pub text: &'a str,
    /// Treat `text` as an FTS5 match expression. Malformed expressions are
    /// rejected with [`IndexError::InvalidArgument`].
    pub raw: bool,
    /// Maximum number of chunks to return.
    pub limit: i64,
    /// Directory the query was issued from. Tags already carry the
    /// directory, so this only labels log output.
    pub directory: Option<&'a str>,
    /// Only match rows whose path is in this list.
    pub filter_paths: Option<&'a [String]>,
    /// Maximum accepted rank (lower is more relevant).
    pub bm25_threshold: f64,
}

/// Run a full-text query. See the module docs for the algorithm.
pub async fn retrieve(store: &TextStore, req: &RetrieveRequest<'_>) -> Result<Vec<RetrievedChunk>> {
    if req.tags.is_empty() {
        return Err(IndexError::InvalidArgument(
            "at least one tag is required".to_string(),
        ));
    }
    if req.limit < 1 {
        return Err(IndexError::InvalidArgument(format!(
            "limit must be positive, got {}",
            req.limit
        )));
    }
    if req.bm25_threshold.is_nan() {
        return Err(IndexError::InvalidArgument(
            "bm25 threshold must be a number".to_string(),
        ));
    }
    let tag_keys = req
        .tags
        .iter()
        .map(tag_to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let text = if req.raw {
        sanitize_query(req.text)
    } else {
        terms_query(req.text)
    };
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    if req.filter_paths.is_some_and(|paths| paths.is_empty()) {
        return Ok(Vec::new());
    }

    store.ensure_schema().await?;
    let candidates = store
        .search(&text, &tag_keys, req.filter_paths, req.limit)
        .await?;
    let matched = candidates.len();

    let ranked: Vec<i64> = candidates
        .into_iter()
        .filter(|c| c.rank <= req.bm25_threshold)
        .map(|c| c.chunk_id)
        .collect();

    let mut by_id: HashMap<i64, _> = store
        .chunks_by_ids(&ranked)
        .await?
        .into_iter()
        .map(|chunk| (chunk.id, chunk))
        .collect();

    let mut seen = HashSet::new();
    let results: Vec<RetrievedChunk> = ranked
        .into_iter()
        .filter(|id| seen.insert(*id))
        .filter_map(|id| by_id.remove(&id))
        .map(RetrievedChunk::from)
        .collect();
    let results = deduplicate_retrieved(results);

    tracing::debug!(
        directory = req.directory.unwrap_or("-"),
        tags = tag_keys.len(),
        matched,
        returned = results.len(),
        "full-text retrieve"
    );

    Ok(results)
}
