//! Progress events emitted while an index update runs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingStatus {
    Indexing,
    Done,
}

/// One step of index maintenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingProgressUpdate {
    /// Completed share of the compute work, in `[0, 1]`.
    pub progress: f64,
    pub desc: String,
    pub status: IndexingStatus,
}

impl IndexingProgressUpdate {
    pub fn indexing(progress: f64, desc: impl Into<String>) -> Self {
        Self {
            progress: progress.clamp(0.0, 1.0),
            desc: desc.into(),
            status: IndexingStatus::Indexing,
        }
    }

    pub fn done() -> Self {
        Self {
            progress: 1.0,
            desc: "Indexing complete".to_string(),
            status: IndexingStatus::Done,
        }
    }
}

/// Last path component, accepting both `/` and `\` separators.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
