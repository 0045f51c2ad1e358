//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/cfts.sqlite"
//!
//! [retrieval]
//! limit = 20
//! bm25_threshold = -2.5
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of results when the caller gives none.
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Maximum accepted BM25 rank. FTS5 ranks are negative and lower is
    /// more relevant.
    #[serde(default = "default_bm25_threshold")]
    pub bm25_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            bm25_threshold: default_bm25_threshold(),
        }
    }
}

fn default_limit() -> i64 {
    20
}
fn default_bm25_threshold() -> f64 {
    -2.5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }
    if config.retrieval.limit < 1 {
        anyhow::bail!("retrieval.limit must be >= 1");
    }
    if !config.retrieval.bm25_threshold.is_finite() {
        anyhow::bail!("retrieval.bm25_threshold must be a finite number");
    }
    Ok(())
}
