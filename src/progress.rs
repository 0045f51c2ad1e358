//! Index update progress reporting.
//!
//! Renders the progress stream of [`crate::index::FullTextIndex::update`]
//! for `cfts update`. Progress goes to **stderr** so stdout stays
//! parseable for scripts.

use std::io::Write;

use codebase_fts_core::progress::{IndexingProgressUpdate, IndexingStatus};

/// Reports update progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, update: &IndexingProgressUpdate);
}

/// Human-friendly progress on stderr: "indexing   50%  parser.rs".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, update: &IndexingProgressUpdate) {
        let line = match update.status {
            IndexingStatus::Indexing => format!(
                "indexing  {:>4}  {}\n",
                format_percent(update.progress),
                update.desc
            ),
            IndexingStatus::Done => format!("done      {}\n", update.desc),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, update: &IndexingProgressUpdate) {
        let obj = serde_json::json!({
            "event": "progress",
            "progress": update.progress,
            "desc": update.desc,
            "status": update.status,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _update: &IndexingProgressUpdate) {}
}

fn format_percent(fraction: f64) -> String {
    format!("{:.0}%", (fraction * 100.0).clamp(0.0, 100.0))
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
