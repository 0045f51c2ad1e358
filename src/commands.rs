//! Implementations of the `cfts` subcommands.
//!
//! Each command opens the configured database, runs, prints a short
//! report on stdout, and closes the pool.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use serde::Deserialize;

use codebase_fts_core::models::{
    Chunk, IndexResultType, IndexTag, PathAndCacheKey, RefreshIndexResults,
};
use codebase_fts_core::progress::IndexingProgressUpdate;
use codebase_fts_core::provider::cache_key;

use crate::chunk_store::SqliteChunkStore;
use crate::config::Config;
use crate::db;
use crate::index::FullTextIndex;
use crate::migrate;
use crate::progress::ProgressMode;
use crate::search::RetrieveRequest;
use crate::store::TextStore;

/// One chunk as exported by an extractor, before it has a database id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedChunk {
    pub path: String,
    #[serde(default)]
    pub index: Option<i64>,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
    #[serde(default)]
    pub cache_key: Option<String>,
}

pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&TextStore::new(pool.clone())).await?;
    pool.close().await;
    println!("Database initialized successfully.");
    Ok(())
}

/// Import chunks from a JSON file and tag them.
///
/// With `emit_diff`, prints a diff computing every imported file version
/// instead of the summary, ready to pipe into `cfts update`.
pub async fn run_ingest(config: &Config, file: &Path, tag: &IndexTag, emit_diff: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read chunk file: {}", file.display()))?;
    let imported: Vec<ImportedChunk> =
        serde_json::from_str(&content).with_context(|| "Failed to parse chunk file")?;
    let chunks = assign_cache_keys(imported);

    let pool = db::connect(config).await?;
    migrate::run_migrations(&TextStore::new(pool.clone())).await?;
    let chunk_store = SqliteChunkStore::new(pool.clone());

    let stored = chunk_store.insert_chunks(chunks).await?;
    let mut versions: Vec<PathAndCacheKey> = Vec::new();
    for chunk in &stored {
        let item = PathAndCacheKey::new(&chunk.path, &chunk.cache_key);
        if !versions.contains(&item) {
            versions.push(item);
        }
    }
    for item in &versions {
        chunk_store.add_tag(tag, item).await?;
    }
    pool.close().await;

    if emit_diff {
        let diff = RefreshIndexResults {
            compute: versions,
            ..Default::default()
        };
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        println!("ingest {}", file.display());
        println!("  chunks stored: {}", stored.len());
        println!("  files: {}", versions.len());
        println!("ok");
    }
    Ok(())
}

/// Fill in missing indexes and cache keys. A file's cache key defaults to
/// the hash of its chunks' contents in input order.
fn assign_cache_keys(imported: Vec<ImportedChunk>) -> Vec<Chunk> {
    let mut file_text: HashMap<String, String> = HashMap::new();
    for c in &imported {
        file_text.entry(c.path.clone()).or_default().push_str(&c.content);
    }
    let file_keys: HashMap<String, String> = file_text
        .into_iter()
        .map(|(path, text)| (path, cache_key(&text)))
        .collect();

    let mut next_index: HashMap<String, i64> = HashMap::new();
    imported
        .into_iter()
        .map(|c| {
            let counter = next_index.entry(c.path.clone()).or_insert(0);
            let index = c.index.unwrap_or(*counter);
            *counter = index + 1;
            let key = c
                .cache_key
                .unwrap_or_else(|| file_keys.get(&c.path).cloned().unwrap_or_default());
            Chunk {
                id: 0,
                path: c.path,
                index,
                start_line: c.start_line,
                end_line: c.end_line,
                content: c.content,
                cache_key: key,
            }
        })
        .collect()
}

/// Apply a diff file to the full-text index.
///
/// The CLI also plays the tag bookkeeper: entries acknowledged as
/// `addTag` gain `tag` in `chunk_tags`; `removeTag` and `del` entries
/// lose it.
pub async fn run_update(
    config: &Config,
    diff_file: &Path,
    tag: &IndexTag,
    repo: Option<&str>,
    progress: ProgressMode,
) -> Result<()> {
    let content = std::fs::read_to_string(diff_file)
        .with_context(|| format!("Failed to read diff file: {}", diff_file.display()))?;
    let diff: RefreshIndexResults =
        serde_json::from_str(&content).with_context(|| "Failed to parse diff file")?;

    let pool = db::connect(config).await?;
    let store = TextStore::new(pool.clone());
    migrate::run_migrations(&store).await?;
    let chunk_store = Arc::new(SqliteChunkStore::new(pool.clone()));
    let index = FullTextIndex::new(store, chunk_store.clone());
    let reporter = progress.reporter();

    let mut completed: Vec<(PathAndCacheKey, IndexResultType)> = Vec::new();
    let outcome = {
        let updates = index.update(
            tag,
            diff,
            |items, kind| completed.extend(items.iter().cloned().map(|item| (item, kind))),
            repo,
        );
        futures::pin_mut!(updates);

        let mut outcome = Ok(());
        while let Some(update) = updates.next().await {
            match update {
                Ok(update) => reporter.report(&update),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        outcome
    };

    for (item, kind) in &completed {
        match kind {
            IndexResultType::AddTag => {
                chunk_store.add_tag(tag, item).await?;
            }
            IndexResultType::RemoveTag | IndexResultType::Delete => {
                chunk_store.remove_tag(tag, item).await?;
            }
            IndexResultType::Compute => {}
        }
    }
    pool.close().await;
    outcome?;

    reporter.report(&IndexingProgressUpdate::done());
    let count = |k: IndexResultType| completed.iter().filter(|(_, kind)| *kind == k).count();
    println!("update {}", diff_file.display());
    println!("  computed: {}", count(IndexResultType::Compute));
    println!("  tagged: {}", count(IndexResultType::AddTag));
    println!("  untagged: {}", count(IndexResultType::RemoveTag));
    println!("  deleted: {}", count(IndexResultType::Delete));
    println!("ok");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: Option<i64>,
    pub threshold: Option<f64>,
    pub paths: Vec<String>,
    pub raw: bool,
    pub json: bool,
}

pub async fn run_search(
    config: &Config,
    query: &str,
    tags: &[IndexTag],
    opts: &SearchOptions,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = TextStore::new(pool.clone());
    migrate::run_migrations(&store).await?;
    let filter_paths = (!opts.paths.is_empty()).then_some(opts.paths.as_slice());
    let req = RetrieveRequest {
        tags,
        text: query,
        raw: opts.raw,
        limit: opts.limit.unwrap_or(config.retrieval.limit),
        directory: tags.first().map(|t| t.directory.as_str()),
        filter_paths,
        bm25_threshold: opts.threshold.unwrap_or(config.retrieval.bm25_threshold),
    };
    let results = crate::search::retrieve(&store, &req).await;
    pool.close().await;
    let results = results?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, chunk) in results.iter().enumerate() {
        println!(
            "{}. {}:{}-{}",
            i + 1,
            chunk.filepath,
            chunk.start_line,
            chunk.end_line
        );
        println!("    chunk: {}", chunk.index);
        println!("    digest: {}", chunk.digest);
        println!("    excerpt: \"{}\"", excerpt(&chunk.content, 120));
        println!();
    }
    Ok(())
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    let trimmed = flat.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = TextStore::new(pool.clone()).stats().await;
    pool.close().await;
    let stats = stats?;

    println!("text rows: {}", stats.text_rows);
    println!("metadata rows: {}", stats.metadata_rows);
    println!("paths: {}", stats.paths);
    if stats.text_rows != stats.metadata_rows {
        bail!(
            "index inconsistent: {} text rows vs {} metadata rows",
            stats.text_rows,
            stats.metadata_rows
        );
    }
    Ok(())
}
