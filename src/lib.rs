//! # Codebase FTS
//!
//! An incrementally maintained full-text index over chunks of source code,
//! partitioned by `(directory, branch, artifact)` tags and queried with
//! ranked, tag- and path-filtered substring search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  diff  ┌──────────────┐        ┌──────────────────┐
//! │ Chunk index  │───────▶│ FullTextIndex│───────▶│ SQLite           │
//! │ (chunks,     │        │   ::update   │ rows   │ fts (trigram)    │
//! │  chunk_tags) │        └──────┬───────┘        │ fts_metadata     │
//! └──────────────┘               │ progress       └────────┬─────────┘
//!                                ▼                         │
//!                          mark_complete                   ▼
//!                                                  search::retrieve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Chunk, tag, and full-text schema bootstrap |
//! | [`store`] | Full-text tables: row writes, deletes, ranked match |
//! | [`chunk_store`] | `chunks` / `chunk_tags` access and the SQLite chunk provider |
//! | [`index`] | Incremental index maintenance with a lazy progress stream |
//! | [`search`] | Tag-scoped ranked retrieval |
//! | [`progress`] | Progress reporters for the CLI |
//! | [`commands`] | `cfts` subcommand implementations |
//! | [`error`] | Library error type |
//!
//! Storage-free pieces (models, deduplication, tag codec, query helpers)
//! live in [`codebase_fts_core`] and are re-exported as [`fts_core`].

pub mod chunk_store;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod store;

pub use codebase_fts_core as fts_core;
pub use error::{IndexError, Result};
pub use index::FullTextIndex;
pub use search::{retrieve, RetrieveRequest};
pub use store::TextStore;
