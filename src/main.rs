//! # Codebase FTS CLI (`cfts`)
//!
//! Maintains and queries the tag-scoped full-text index over code chunks.
//!
//! ## Usage
//!
//! ```bash
//! cfts --config ./config/cfts.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cfts init` | Create the SQLite database and all tables |
//! | `cfts ingest <chunks.json>` | Import extracted chunks and tag them |
//! | `cfts update <diff.json>` | Apply a compute/addTag/removeTag/del diff |
//! | `cfts search "<query>"` | Ranked, tag-scoped substring search |
//! | `cfts stats` | Row counts of the full-text tables |
//!
//! ## Examples
//!
//! ```bash
//! cfts init
//! cfts ingest chunks.json --dir /repo --branch main --emit-diff > diff.json
//! cfts update diff.json --dir /repo --branch main --progress human
//! cfts search "parse_config" --dir /repo --branch main --threshold 0
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use codebase_fts::commands::{self, SearchOptions};
use codebase_fts::config;
use codebase_fts::fts_core::models::IndexTag;
use codebase_fts::progress::ProgressMode;

/// Codebase FTS: an incrementally maintained full-text index over
/// source code chunks, partitioned by directory, branch, and artifact.
#[derive(Parser)]
#[command(name = "cfts", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cfts.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// The tag a command operates on.
#[derive(Args, Debug, Clone)]
struct TagArgs {
    /// Workspace directory the index belongs to.
    #[arg(long = "dir")]
    directory: String,

    /// Branch the index belongs to.
    #[arg(long)]
    branch: String,

    /// Artifact the chunks are tagged under.
    #[arg(long, default_value = "chunks")]
    artifact: String,
}

impl TagArgs {
    fn tag(&self) -> IndexTag {
        IndexTag::new(&self.directory, &self.branch, &self.artifact)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the chunk, tag, and full-text tables. Idempotent.
    Init,

    /// Import extracted chunks from a JSON array and tag them.
    Ingest {
        /// JSON file: `[{"path", "startLine", "endLine", "content", "index"?, "cacheKey"?}]`.
        file: PathBuf,

        #[command(flatten)]
        tag: TagArgs,

        /// Print a diff computing every imported file instead of a summary.
        #[arg(long)]
        emit_diff: bool,
    },

    /// Apply a diff (`compute`, `addTag`, `removeTag`, `del`) to the index.
    Update {
        /// JSON diff file.
        diff: PathBuf,

        #[command(flatten)]
        tag: TagArgs,

        /// Repository label for log output.
        #[arg(long)]
        repo: Option<String>,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search the index.
    Search {
        /// Query text. Each term is matched literally unless `--raw` is given.
        query: String,

        #[command(flatten)]
        tag: TagArgs,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,

        /// Maximum BM25 rank to accept (lower is more relevant).
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        /// Only match these paths (repeatable).
        #[arg(long = "path")]
        paths: Vec<String>,

        /// Pass the query to FTS5 as a raw match expression.
        #[arg(long)]
        raw: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print row counts of the full-text tables.
    Stats,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Ingest {
            file,
            tag,
            emit_diff,
        } => {
            commands::run_ingest(&cfg, &file, &tag.tag(), emit_diff).await?;
        }
        Commands::Update {
            diff,
            tag,
            repo,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_update(&cfg, &diff, &tag.tag(), repo.as_deref(), progress).await?;
        }
        Commands::Search {
            query,
            tag,
            limit,
            threshold,
            paths,
            raw,
            json,
        } => {
            let opts = SearchOptions {
                limit,
                threshold,
                paths,
                raw,
                json,
            };
            commands::run_search(&cfg, &query, &[tag.tag()], &opts).await?;
        }
        Commands::Stats => {
            commands::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
