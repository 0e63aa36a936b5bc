use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root: PathBuf,
    /// Extensions to ingest, without the leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Hash file contents during the scan so unchanged-size edits are
    /// still detected. Costs one full read per file.
    #[serde(default)]
    pub verify_hash: bool,
}

fn default_extensions() -> Vec<String> {
    ["pdf", "docx", "pptx", "xlsx", "txt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Base URL of the index service.
    pub url: String,
    pub collection: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Floor for payload-too-large batch splitting.
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key, if the service needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_batch_size() -> usize {
    100
}
fn default_min_batch_size() -> usize {
    8
}
fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ManifestConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetadataConfig {
    /// Project label stamped on every chunk.
    #[serde(default = "default_project")]
    pub project: String,
    /// How many leading characters of a document to search for a year.
    #[serde(default = "default_year_scan_chars")]
    pub year_scan_chars: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            year_scan_chars: default_year_scan_chars(),
        }
    }
}

fn default_project() -> String {
    "unknown".to_string()
}
fn default_year_scan_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Files processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// When set, normalized text is mirrored here as artifacts + sidecars.
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            artifacts_dir: None,
        }
    }
}

fn default_concurrency() -> usize {
    2
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate source
    if config.source.extensions.is_empty() {
        anyhow::bail!("source.extensions must not be empty");
    }

    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    // Validate index
    if config.index.batch_size == 0 {
        anyhow::bail!("index.batch_size must be > 0");
    }
    if config.index.min_batch_size == 0 || config.index.min_batch_size > config.index.batch_size {
        anyhow::bail!("index.min_batch_size must be in 1..=index.batch_size");
    }

    // Validate pipeline
    if config.pipeline.concurrency == 0 {
        anyhow::bail!("pipeline.concurrency must be >= 1");
    }

    Ok(config)
}
