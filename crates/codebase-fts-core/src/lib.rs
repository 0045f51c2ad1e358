//! # Codebase FTS Core
//!
//! Storage-free logic shared by every `codebase-fts` frontend: the chunk
//! and diff data model, chunk deduplication, the tag codec, FTS5 match
//! expression helpers, progress event types, and the [`ChunkProvider`]
//! trait through which the index maintainer reads materialized chunks.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O.
//!
//! [`ChunkProvider`]: provider::ChunkProvider

pub mod dedup;
pub mod models;
pub mod progress;
pub mod provider;
pub mod query;
pub mod tag;
