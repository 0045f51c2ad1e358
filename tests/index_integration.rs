//! Integration tests for index maintenance and retrieval against a real
//! SQLite database in a temp directory.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tempfile::TempDir;

use codebase_fts::chunk_store::SqliteChunkStore;
use codebase_fts::db;
use codebase_fts::fts_core::models::{
    Chunk, IndexResultType, IndexTag, PathAndCacheKey, RefreshIndexResults, RetrievedChunk,
};
use codebase_fts::fts_core::progress::IndexingStatus;
use codebase_fts::fts_core::provider::ChunkProvider;
use codebase_fts::migrate;
use codebase_fts::{FullTextIndex, IndexError, RetrieveRequest, TextStore};

const ANY_RANK: f64 = 0.0;

struct Harness {
    _tmp: TempDir,
    chunks: Arc<SqliteChunkStore>,
    index: FullTextIndex,
}

async fn setup() -> Harness {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("data/index.sqlite"), 5)
        .await
        .unwrap();
    let store = TextStore::new(pool.clone());
    migrate::run_migrations(&store).await.unwrap();
    let chunks = Arc::new(SqliteChunkStore::new(pool));
    let index = FullTextIndex::new(store, chunks.clone());
    Harness {
        _tmp: tmp,
        chunks,
        index,
    }
}

fn tag(artifact: &str) -> IndexTag {
    IndexTag::new("/work/repo", "main", artifact)
}

fn chunk(path: &str, cache_key: &str, index: i64, content: &str) -> Chunk {
    Chunk {
        id: 0,
        path: path.to_string(),
        index,
        start_line: index * 10,
        end_line: index * 10 + 9,
        content: content.to_string(),
        cache_key: cache_key.to_string(),
    }
}

/// Store one single-chunk file version and tag it.
async fn add_file(h: &Harness, tag: &IndexTag, path: &str, key: &str, content: &str) -> PathAndCacheKey {
    h.chunks
        .insert_chunks(vec![chunk(path, key, 0, content)])
        .await
        .unwrap();
    let item = PathAndCacheKey::new(path, key);
    h.chunks.add_tag(tag, &item).await.unwrap();
    item
}

type Completed = Arc<Mutex<Vec<(PathAndCacheKey, IndexResultType)>>>;

async fn apply(h: &Harness, tag: &IndexTag, diff: RefreshIndexResults) -> Completed {
    let completed: Completed = Arc::new(Mutex::new(Vec::new()));
    let sink = completed.clone();
    let updates: Vec<_> = h
        .index
        .update(
            tag,
            diff,
            move |items, kind| {
                let mut done = sink.lock().unwrap();
                done.extend(items.iter().cloned().map(|i| (i, kind)));
            },
            Some("repo"),
        )
        .collect()
        .await;
    for u in updates {
        u.unwrap();
    }
    completed
}

fn compute(items: &[&PathAndCacheKey]) -> RefreshIndexResults {
    RefreshIndexResults {
        compute: items.iter().map(|i| (*i).clone()).collect(),
        ..Default::default()
    }
}

async fn query(h: &Harness, tags: &[IndexTag], text: &str, limit: i64, threshold: f64) -> Vec<RetrievedChunk> {
    h.index
        .retrieve(&RetrieveRequest {
            tags,
            text,
            raw: false,
            limit,
            directory: Some("/work/repo"),
            filter_paths: None,
            bm25_threshold: threshold,
        })
        .await
        .unwrap()
}

fn paths(results: &[RetrievedChunk]) -> Vec<&str> {
    results.iter().map(|r| r.filepath.as_str()).collect()
}

#[tokio::test]
async fn test_index_query_then_delete() {
    let h = setup().await;
    let t = tag("fts");
    let a = add_file(&h, &t, "a.ts", "ka", "function foo").await;
    let b = add_file(&h, &t, "b.ts", "kb", "function bar").await;
    apply(&h, &t, compute(&[&a, &b])).await;

    let results = query(&h, &[t.clone()], "foo", 10, ANY_RANK).await;
    assert_eq!(paths(&results), vec!["a.ts"]);
    assert_eq!(results[0].content, "function foo");
    assert_eq!(results[0].digest, "ka");
    assert_eq!((results[0].start_line, results[0].end_line), (0, 9));

    let del = RefreshIndexResults {
        del: vec![a.clone()],
        ..Default::default()
    };
    apply(&h, &t, del).await;
    assert!(query(&h, &[t.clone()], "foo", 10, ANY_RANK).await.is_empty());
    assert_eq!(paths(&query(&h, &[t], "bar", 10, ANY_RANK).await), vec!["b.ts"]);
}

#[tokio::test]
async fn test_substring_match_inside_identifier() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "src/config.rs", "k1", "pub fn parseConfigFromEnv() {}").await;
    apply(&h, &t, compute(&[&a])).await;

    assert_eq!(query(&h, &[t.clone()], "ConfigFrom", 5, ANY_RANK).await.len(), 1);
    assert_eq!(query(&h, &[t], "onfigF", 5, ANY_RANK).await.len(), 1);
}

#[tokio::test]
async fn test_progress_events_and_callbacks() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "src/a.ts", "k1", "alpha").await;
    let b = add_file(&h, &t, "src/nested/b.ts", "k2", "bravo").await;
    let c = add_file(&h, &t, "c.ts", "k3", "charlie").await;
    let old = add_file(&h, &t, "old.ts", "k4", "obsolete").await;
    apply(&h, &t, compute(&[&old])).await;

    let diff = RefreshIndexResults {
        compute: vec![a.clone(), b.clone(), c.clone()],
        add_tag: vec![PathAndCacheKey::new("x.ts", "kx")],
        remove_tag: vec![PathAndCacheKey::new("y.ts", "ky")],
        del: vec![old.clone()],
    };
    let completed: Completed = Arc::new(Mutex::new(Vec::new()));
    let sink = completed.clone();
    let updates: Vec<_> = h
        .index
        .update(
            &t,
            diff,
            move |items, kind| sink.lock().unwrap().extend(items.iter().cloned().map(|i| (i, kind))),
            None,
        )
        .map(|u| u.unwrap())
        .collect()
        .await;

    assert_eq!(updates.len(), 3);
    let descs: Vec<&str> = updates.iter().map(|u| u.desc.as_str()).collect();
    assert_eq!(descs, vec!["a.ts", "b.ts", "c.ts"]);
    assert!((updates[0].progress - 1.0 / 3.0).abs() < 1e-9);
    assert!((updates[1].progress - 2.0 / 3.0).abs() < 1e-9);
    assert!((updates[2].progress - 1.0).abs() < 1e-9);
    assert!(updates.iter().all(|u| u.status == IndexingStatus::Indexing));

    let kinds: Vec<IndexResultType> = completed.lock().unwrap().iter().map(|(_, k)| *k).collect();
    assert_eq!(
        kinds,
        vec![
            IndexResultType::Compute,
            IndexResultType::Compute,
            IndexResultType::Compute,
            IndexResultType::AddTag,
            IndexResultType::RemoveTag,
            IndexResultType::Delete,
        ]
    );
    assert!(query(&h, &[t], "obsolete", 5, ANY_RANK).await.is_empty());
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let h = setup().await;
    let t = tag("chunks");
    h.chunks
        .insert_chunks(vec![
            chunk("lib.rs", "k", 0, "fn widget_alpha() {}"),
            chunk("lib.rs", "k", 1, "fn widget_beta() {}"),
        ])
        .await
        .unwrap();
    let item = PathAndCacheKey::new("lib.rs", "k");
    h.chunks.add_tag(&t, &item).await.unwrap();

    apply(&h, &t, compute(&[&item])).await;
    let first = query(&h, &[t.clone()], "widget", 10, ANY_RANK).await;
    let stats_first = h.index.store().stats().await.unwrap();

    apply(&h, &t, compute(&[&item])).await;
    let second = query(&h, &[t], "widget", 10, ANY_RANK).await;
    let stats_second = h.index.store().stats().await.unwrap();

    assert_eq!(first.len(), 2);
    let mut a = first.clone();
    let mut b = second.clone();
    a.sort_by_key(|c| c.index);
    b.sort_by_key(|c| c.index);
    assert_eq!(a, b);
    assert_eq!(stats_first, stats_second);
    assert_eq!(stats_second.text_rows, 2);
    assert_eq!(stats_second.metadata_rows, 2);
}

#[tokio::test]
async fn test_tag_isolation() {
    let h = setup().await;
    let t1 = IndexTag::new("/work/repo", "main", "chunks");
    let t2 = IndexTag::new("/work/repo", "feature", "chunks");
    let a = add_file(&h, &t1, "a.ts", "k1", "const secretToken = 1").await;
    apply(&h, &t1, compute(&[&a])).await;

    assert!(query(&h, &[t2.clone()], "secretToken", 10, ANY_RANK).await.is_empty());
    assert_eq!(query(&h, &[t1.clone()], "secretToken", 10, ANY_RANK).await.len(), 1);
    // OR semantics across tags.
    assert_eq!(query(&h, &[t2, t1], "secretToken", 10, ANY_RANK).await.len(), 1);
}

#[tokio::test]
async fn test_chunk_in_two_requested_tags_returned_once() {
    let h = setup().await;
    let t1 = IndexTag::new("/work/repo", "main", "chunks");
    let t2 = IndexTag::new("/work/repo", "dev", "chunks");
    let a = add_file(&h, &t1, "shared.ts", "k", "sharedHelper()").await;
    h.chunks.add_tag(&t2, &a).await.unwrap();
    apply(&h, &t1, compute(&[&a])).await;

    assert_eq!(query(&h, &[t1, t2], "sharedHelper", 10, ANY_RANK).await.len(), 1);
}

#[tokio::test]
async fn test_limit_caps_results() {
    let h = setup().await;
    let t = tag("chunks");
    let mut items = Vec::new();
    for i in 0..6 {
        let path = format!("file{}.rs", i);
        items.push(add_file(&h, &t, &path, "k", &format!("let needle{} = {};", i, i)).await);
    }
    apply(&h, &t, compute(&items.iter().collect::<Vec<_>>())).await;

    assert_eq!(query(&h, &[t.clone()], "needle", 2, ANY_RANK).await.len(), 2);
    assert_eq!(query(&h, &[t], "needle", 100, ANY_RANK).await.len(), 6);
}

#[tokio::test]
async fn test_threshold_monotonic() {
    let h = setup().await;
    let t = tag("chunks");
    let mut items = Vec::new();
    items.push(add_file(&h, &t, "hit1.rs", "k", "needle needle needle").await);
    items.push(add_file(&h, &t, "hit2.rs", "k", "a needle in a much longer haystack of text").await);
    for i in 0..4 {
        items.push(add_file(&h, &t, &format!("miss{}.rs", i), "k", "nothing to see here").await);
    }
    apply(&h, &t, compute(&items.iter().collect::<Vec<_>>())).await;

    let all = query(&h, &[t.clone()], "needle", 10, f64::INFINITY).await;
    let below_zero = query(&h, &[t.clone()], "needle", 10, ANY_RANK).await;
    let none = query(&h, &[t], "needle", 10, -1e9).await;

    assert_eq!(all.len(), 2);
    assert_eq!(all[0].filepath, "hit1.rs");
    assert!(below_zero.len() <= all.len());
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_path_filter() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "a.rs", "k", "shared_name()").await;
    let b = add_file(&h, &t, "b.rs", "k", "shared_name()").await;
    apply(&h, &t, compute(&[&a, &b])).await;

    let only_b = vec!["b.rs".to_string()];
    let results = h
        .index
        .retrieve(&RetrieveRequest {
            tags: &[t.clone()],
            text: "shared_name",
            raw: false,
            limit: 10,
            directory: None,
            filter_paths: Some(&only_b),
            bm25_threshold: ANY_RANK,
        })
        .await
        .unwrap();
    assert_eq!(paths(&results), vec!["b.rs"]);

    let none: Vec<String> = Vec::new();
    let results = h
        .index
        .retrieve(&RetrieveRequest {
            tags: &[t],
            text: "shared_name",
            raw: false,
            limit: 10,
            directory: None,
            filter_paths: Some(&none),
            bm25_threshold: ANY_RANK,
        })
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_empty_query_matches_nothing() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "a.rs", "k", "anything at all").await;
    apply(&h, &t, compute(&[&a])).await;

    assert!(query(&h, &[t.clone()], "", 10, f64::INFINITY).await.is_empty());
    assert!(query(&h, &[t.clone()], "   ", 10, f64::INFINITY).await.is_empty());
    // Only placeholders: stripped to empty.
    assert!(query(&h, &[t], "???", 10, f64::INFINITY).await.is_empty());
}

#[tokio::test]
async fn test_placeholder_stripped_from_query() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "a.rs", "k", "fn lookup()").await;
    apply(&h, &t, compute(&[&a])).await;

    assert_eq!(query(&h, &[t], "look?up", 10, ANY_RANK).await.len(), 1);
}

async fn raw_query(h: &Harness, tags: &[IndexTag], text: &str) -> Result<Vec<RetrievedChunk>, IndexError> {
    h.index
        .retrieve(&RetrieveRequest {
            tags,
            text,
            raw: true,
            limit: 10,
            directory: None,
            filter_paths: None,
            bm25_threshold: ANY_RANK,
        })
        .await
}

#[tokio::test]
async fn test_code_punctuation_matched_literally() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "loader.rs", "k", "let x = self.config.load();").await;
    apply(&h, &t, compute(&[&a])).await;

    assert_eq!(query(&h, &[t.clone()], "config", 10, ANY_RANK).await.len(), 1);
    assert_eq!(query(&h, &[t.clone()], "config.load", 10, ANY_RANK).await.len(), 1);
    assert_eq!(query(&h, &[t.clone()], "load()", 10, ANY_RANK).await.len(), 1);
    assert_eq!(query(&h, &[t.clone()], "self.config.load();", 10, ANY_RANK).await.len(), 1);
    assert!(query(&h, &[t.clone()], "x-y", 10, ANY_RANK).await.is_empty());
    assert!(query(&h, &[t], "say \"hi\"", 10, ANY_RANK).await.is_empty());
}

#[tokio::test]
async fn test_raw_expression_opt_in() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "loader.rs", "k", "let x = self.config.load();").await;
    apply(&h, &t, compute(&[&a])).await;

    assert_eq!(raw_query(&h, &[t.clone()], "config AND load").await.unwrap().len(), 1);
    assert!(raw_query(&h, &[t.clone()], "config AND missing").await.unwrap().is_empty());

    for bad in ["config.load", "load()", "x-y"] {
        let err = raw_query(&h, &[t.clone()], bad).await.unwrap_err();
        assert!(
            matches!(err, IndexError::InvalidArgument(_)),
            "{:?} gave {:?}",
            bad,
            err
        );
    }
}

#[tokio::test]
async fn test_modify_diff_keeps_new_version() {
    let h = setup().await;
    let t = tag("chunks");
    let old = add_file(&h, &t, "a.ts", "k1", "function oldName() {}").await;
    apply(&h, &t, compute(&[&old])).await;

    let new = add_file(&h, &t, "a.ts", "k2", "function newName() {}").await;
    let diff = RefreshIndexResults {
        compute: vec![new.clone()],
        del: vec![old.clone()],
        ..Default::default()
    };
    apply(&h, &t, diff).await;

    let results = query(&h, &[t.clone()], "newName", 10, ANY_RANK).await;
    assert_eq!(paths(&results), vec!["a.ts"]);
    assert_eq!(results[0].digest, "k2");
    assert!(query(&h, &[t], "oldName", 10, ANY_RANK).await.is_empty());

    let stats = h.index.store().stats().await.unwrap();
    assert_eq!((stats.text_rows, stats.metadata_rows, stats.paths), (1, 1, 1));
}

#[tokio::test]
async fn test_deleted_version_hidden_under_every_tag() {
    let h = setup().await;
    let main = IndexTag::new("/work/repo", "main", "chunks");
    let feature = IndexTag::new("/work/repo", "feature", "chunks");
    let a = add_file(&h, &main, "a.ts", "k", "const removedSymbol = 1").await;
    h.chunks.add_tag(&feature, &a).await.unwrap();
    apply(&h, &main, compute(&[&a])).await;
    assert_eq!(query(&h, &[feature.clone()], "removedSymbol", 10, ANY_RANK).await.len(), 1);

    let del = RefreshIndexResults {
        del: vec![a.clone()],
        ..Default::default()
    };
    apply(&h, &main, del).await;

    assert!(query(&h, &[feature.clone()], "removedSymbol", 10, ANY_RANK).await.is_empty());
    assert!(query(&h, &[main, feature], "removedSymbol", 10, ANY_RANK).await.is_empty());
}

#[tokio::test]
async fn test_invalid_arguments_rejected() {
    let h = setup().await;
    let t = tag("chunks");

    let base = RetrieveRequest {
        tags: &[],
        text: "foo",
        raw: false,
        limit: 10,
        directory: None,
        filter_paths: None,
        bm25_threshold: ANY_RANK,
    };
    let err = h.index.retrieve(&base).await.unwrap_err();
    assert!(matches!(err, IndexError::InvalidArgument(_)));

    let tags = [t];
    for limit in [0, -3] {
        let req = RetrieveRequest {
            tags: &tags,
            limit,
            ..base.clone()
        };
        assert!(matches!(
            h.index.retrieve(&req).await.unwrap_err(),
            IndexError::InvalidArgument(_)
        ));
    }

    let bad = [IndexTag::new("/work/repo", "what?", "chunks")];
    let req = RetrieveRequest {
        tags: &bad,
        ..base.clone()
    };
    assert!(matches!(
        h.index.retrieve(&req).await.unwrap_err(),
        IndexError::InvalidArgument(_)
    ));
}

#[tokio::test]
async fn test_update_rejects_bad_tag_before_io() {
    let h = setup().await;
    let bad = IndexTag::new("a::b", "main", "chunks");
    let a = add_file(&h, &tag("chunks"), "a.rs", "k", "content here").await;

    let calls = Arc::new(Mutex::new(0usize));
    let sink = calls.clone();
    let results: Vec<_> = h
        .index
        .update(&bad, compute(&[&a]), move |_, _| *sink.lock().unwrap() += 1, None)
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(IndexError::InvalidArgument(_))));
    assert_eq!(*calls.lock().unwrap(), 0);
    assert_eq!(h.index.store().stats().await.unwrap().text_rows, 0);
}

#[tokio::test]
async fn test_stopping_early_keeps_only_processed_entries() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "a.rs", "k", "first_entry").await;
    let b = add_file(&h, &t, "b.rs", "k", "second_entry").await;
    let old = add_file(&h, &t, "old.rs", "k", "old_entry").await;
    apply(&h, &t, compute(&[&old])).await;

    let diff = RefreshIndexResults {
        compute: vec![a.clone(), b.clone()],
        del: vec![old.clone()],
        ..Default::default()
    };
    let completed: Completed = Arc::new(Mutex::new(Vec::new()));
    let sink = completed.clone();
    {
        let updates = h.index.update(
            &t,
            diff,
            move |items, kind| sink.lock().unwrap().extend(items.iter().cloned().map(|i| (i, kind))),
            None,
        );
        futures::pin_mut!(updates);
        let first = updates.next().await.unwrap().unwrap();
        assert_eq!(first.desc, "a.rs");
    }

    assert_eq!(*completed.lock().unwrap(), vec![(a, IndexResultType::Compute)]);
    assert_eq!(query(&h, &[t.clone()], "first_entry", 10, ANY_RANK).await.len(), 1);
    assert!(query(&h, &[t.clone()], "second_entry", 10, ANY_RANK).await.is_empty());
    assert_eq!(query(&h, &[t], "old_entry", 10, ANY_RANK).await.len(), 1);
}

#[tokio::test]
async fn test_missing_chunks_are_skipped() {
    let h = setup().await;
    let t = tag("chunks");
    let ghost = PathAndCacheKey::new("ghost.rs", "nothing");
    let completed = apply(&h, &t, compute(&[&ghost])).await;

    assert_eq!(
        *completed.lock().unwrap(),
        vec![(ghost, IndexResultType::Compute)]
    );
    assert_eq!(h.index.store().stats().await.unwrap().text_rows, 0);
}

/// Serves chunks from the database but fails for one path.
struct FlakyProvider {
    inner: Arc<SqliteChunkStore>,
    fail_path: &'static str,
}

#[async_trait]
impl ChunkProvider for FlakyProvider {
    async fn chunks_for(&self, path: &str, cache_key: &str) -> Result<Vec<Chunk>> {
        if path == self.fail_path {
            anyhow::bail!("disk on fire");
        }
        self.inner.chunks_for(path, cache_key).await
    }
}

#[tokio::test]
async fn test_storage_error_halts_with_entry_context() {
    let h = setup().await;
    let t = tag("chunks");
    let a = add_file(&h, &t, "a.rs", "k", "good_entry").await;
    let b = add_file(&h, &t, "b.rs", "k", "bad_entry").await;
    let c = add_file(&h, &t, "c.rs", "k", "never_reached").await;

    let flaky = FullTextIndex::new(
        h.index.store().clone(),
        Arc::new(FlakyProvider {
            inner: h.chunks.clone(),
            fail_path: "b.rs",
        }),
    );
    let completed: Completed = Arc::new(Mutex::new(Vec::new()));
    let sink = completed.clone();
    let results: Vec<_> = flaky
        .update(
            &t,
            compute(&[&a, &b, &c]),
            move |items, kind| sink.lock().unwrap().extend(items.iter().cloned().map(|i| (i, kind))),
            None,
        )
        .collect()
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(IndexError::Storage { context, .. }) => assert!(context.contains("b.rs")),
        other => panic!("expected storage error, got {:?}", other),
    }
    assert_eq!(*completed.lock().unwrap(), vec![(a, IndexResultType::Compute)]);
    assert_eq!(query(&h, &[t.clone()], "good_entry", 10, ANY_RANK).await.len(), 1);
    assert!(query(&h, &[t], "never_reached", 10, ANY_RANK).await.is_empty());
}

#[tokio::test]
async fn test_retrieve_during_update() {
    let h = setup().await;
    let t = tag("chunks");
    let mut items = Vec::new();
    for i in 0..10 {
        items.push(add_file(&h, &t, &format!("f{}.rs", i), "k", "concurrent_marker").await);
    }

    let update = async {
        let updates: Vec<_> = h
            .index
            .update(&t, compute(&items.iter().collect::<Vec<_>>()), |_, _| {}, None)
            .collect()
            .await;
        updates.into_iter().collect::<Result<Vec<_>, _>>().unwrap()
    };
    let reads = async {
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(query(&h, &[t.clone()], "concurrent_marker", 50, ANY_RANK).await.len());
            tokio::task::yield_now().await;
        }
        seen
    };
    let (updates, seen) = tokio::join!(update, reads);

    assert_eq!(updates.len(), 10);
    assert!(seen.iter().all(|n| *n <= 10));
    assert_eq!(query(&h, &[t], "concurrent_marker", 50, ANY_RANK).await.len(), 10);
}

#[tokio::test]
async fn test_schema_creation_races_safely() {
    let h = setup().await;
    let pool = h.index.store().pool().clone();
    let s1 = TextStore::new(pool.clone());
    let s2 = TextStore::new(pool);
    let (r1, r2, r3) = tokio::join!(s1.ensure_schema(), s2.ensure_schema(), s1.ensure_schema());
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();
}
