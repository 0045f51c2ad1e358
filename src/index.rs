//! Incremental full-text index maintenance.
//!
//! [`FullTextIndex::update`] applies one [`RefreshIndexResults`] diff to
//! the [`TextStore`] and returns a lazy stream of progress events:
//!
//! 1. The tag is encoded (rejecting reserved characters) and the schema
//!    is ensured.
//! 2. Each `compute` entry has its chunks resolved through the
//!    [`ChunkProvider`] and written as text + metadata rows in one
//!    transaction. One progress event is yielded per entry.
//! 3. Once the compute entries are exhausted, `addTag` and `removeTag`
//!    entries are acknowledged (tag membership lives in `chunk_tags`,
//!    which this index does not own) and `del` entries are removed.
//!
//! Nothing happens until the stream is polled. Dropping the stream after
//! an event stops the pass there; every entry reported through the
//! `mark_complete` callback is fully committed, and nothing else is.
//! A storage error is yielded once and ends the stream.

use std::sync::Arc;

use futures::stream::{self, Stream};

use codebase_fts_core::models::{
    IndexResultType, IndexTag, PathAndCacheKey, RefreshIndexResults, RetrievedChunk,
};
use codebase_fts_core::progress::{basename, IndexingProgressUpdate};
use codebase_fts_core::provider::ChunkProvider;
use codebase_fts_core::tag::tag_to_string;

use crate::error::{IndexError, Result};
use crate::search::{retrieve, RetrieveRequest};
use crate::store::TextStore;

/// The full-text index: a text store plus the chunk provider it indexes from.
#[derive(Clone)]
pub struct FullTextIndex {
    store: TextStore,
    chunks: Arc<dyn ChunkProvider>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Start,
    Compute(usize),
    Finish,
    Done,
}

struct UpdateState<'a, F> {
    index: &'a FullTextIndex,
    tag: IndexTag,
    results: RefreshIndexResults,
    mark_complete: F,
    repo_name: Option<String>,
    phase: Phase,
}

impl FullTextIndex {
    /// Artifact identifier recorded for this index in tag bookkeeping.
    pub const ARTIFACT_ID: &'static str = "sqliteFts";

    pub fn new(store: TextStore, chunks: Arc<dyn ChunkProvider>) -> Self {
        Self { store, chunks }
    }

    pub fn store(&self) -> &TextStore {
        &self.store
    }

    /// Apply `results` for `tag`, yielding one progress event per compute
    /// entry.
    ///
    /// `mark_complete` is called once per entry, after that entry is
    /// committed. `repo_name` only labels log output.
    ///
    /// Callers must not run two updates for the same tag concurrently.
    pub fn update<'a, F>(
        &'a self,
        tag: &IndexTag,
        results: RefreshIndexResults,
        mark_complete: F,
        repo_name: Option<&str>,
    ) -> impl Stream<Item = Result<IndexingProgressUpdate>> + Send + 'a
    where
        F: FnMut(&[PathAndCacheKey], IndexResultType) + Send + 'a,
    {
        let state = UpdateState {
            index: self,
            tag: tag.clone(),
            results,
            mark_complete,
            repo_name: repo_name.map(str::to_string),
            phase: Phase::Start,
        };

        stream::try_unfold(state, UpdateState::step)
    }

    async fn compute_entry(&self, item: &PathAndCacheKey) -> Result<()> {
        let chunks = self
            .chunks
            .chunks_for(&item.path, &item.cache_key)
            .await
            .map_err(|e| {
                let context = format!("compute {}", item.path);
                match e.downcast::<sqlx::Error>() {
                    Ok(db_err) => IndexError::from_sqlx(context, db_err),
                    Err(e) => IndexError::storage(context, e),
                }
            })?;

        if chunks.is_empty() {
            // Possibly owned by a disabled sibling indexer.
            tracing::warn!(
                path = %item.path,
                cache_key = %item.cache_key,
                "no chunks found, skipping"
            );
            return Ok(());
        }

        let written = self.store.replace_rows(item, &chunks).await?;
        tracing::debug!(path = %item.path, rows = written, "indexed");
        Ok(())
    }

    async fn finish<F>(&self, results: &RefreshIndexResults, mark_complete: &mut F) -> Result<()>
    where
        F: FnMut(&[PathAndCacheKey], IndexResultType),
    {
        for item in &results.add_tag {
            mark_complete(std::slice::from_ref(item), IndexResultType::AddTag);
        }

        for item in &results.remove_tag {
            mark_complete(std::slice::from_ref(item), IndexResultType::RemoveTag);
        }

        for item in &results.del {
            self.store.delete_rows(item).await?;
            tracing::debug!(path = %item.path, "deleted");
            mark_complete(std::slice::from_ref(item), IndexResultType::Delete);
        }

        Ok(())
    }

    /// Run a query against this index. See [`retrieve`].
    pub async fn retrieve(&self, req: &RetrieveRequest<'_>) -> Result<Vec<RetrievedChunk>> {
        retrieve(&self.store, req).await
    }
}

impl<'a, F> UpdateState<'a, F>
where
    F: FnMut(&[PathAndCacheKey], IndexResultType) + Send + 'a,
{
    /// Advance to the next progress event, or to the end of the pass.
    async fn step(mut self) -> Result<Option<(IndexingProgressUpdate, Self)>> {
        loop {
            match self.phase {
                Phase::Start => {
                    let key = tag_to_string(&self.tag)?;
                    self.index.store.ensure_schema().await?;
                    tracing::info!(
                        tag = %key,
                        artifact = FullTextIndex::ARTIFACT_ID,
                        repo = self.repo_name.as_deref().unwrap_or("-"),
                        compute = self.results.compute.len(),
                        add_tag = self.results.add_tag.len(),
                        remove_tag = self.results.remove_tag.len(),
                        del = self.results.del.len(),
                        "full-text update started"
                    );
                    self.phase = Phase::Compute(0);
                }
                Phase::Compute(i) if i < self.results.compute.len() => {
                    let total = self.results.compute.len();
                    let item = self.results.compute[i].clone();
                    self.index.compute_entry(&item).await?;
                    (self.mark_complete)(std::slice::from_ref(&item), IndexResultType::Compute);

                    let update = IndexingProgressUpdate::indexing(
                        (i + 1) as f64 / total as f64,
                        basename(&item.path),
                    );
                    self.phase = Phase::Compute(i + 1);
                    return Ok(Some((update, self)));
                }
                Phase::Compute(_) => self.phase = Phase::Finish,
                Phase::Finish => {
                    self.index
                        .finish(&self.results, &mut self.mark_complete)
                        .await?;
                    tracing::info!(
                        repo = self.repo_name.as_deref().unwrap_or("-"),
                        "full-text update finished"
                    );
                    self.phase = Phase::Done;
                }
                Phase::Done => return Ok(None),
            }
        }
    }
}
