//! Error types for index maintenance and retrieval.
//!
//! A compute entry whose chunks were never materialized is not an error;
//! the maintainer logs it and moves on (the chunk may belong to a sibling
//! indexer that is disabled).

use codebase_fts_core::tag::TagError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Creating the full-text tables failed.
    #[error("schema creation failed: {0}")]
    Schema(#[source] sqlx::Error),

    /// A read or write failed mid-operation. `context` names the diff entry
    /// (or query) that was being processed.
    #[error("storage error during {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: BoxError,
    },

    /// A stored row is missing a column or holds a value of the wrong type.
    #[error("malformed row during {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Rejected before any I/O, or a match expression SQLite refused to
    /// parse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IndexError {
    pub fn storage(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        IndexError::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Classify a database error: row decoding failures become
    /// [`IndexError::Decode`], everything else [`IndexError::Storage`].
    pub fn from_sqlx(context: impl Into<String>, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_) => IndexError::Decode {
                context: context.into(),
                source: err,
            },
            err => IndexError::storage(context, err),
        }
    }

    /// Like [`IndexError::from_sqlx`] for the result of a `MATCH`: FTS5
    /// syntax errors in a raw expression are the caller's fault.
    pub fn from_match(context: impl Into<String>, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let msg = db.message();
            if msg.starts_with("fts5:") || msg.starts_with("no such column") {
                return IndexError::InvalidArgument(format!("invalid match expression: {}", msg));
            }
        }
        IndexError::from_sqlx(context, err)
    }
}

impl From<TagError> for IndexError {
    fn from(err: TagError) -> Self {
        IndexError::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
