//! Configuration parsing and validation.
//!
//! Bundle Harness is configured via a TOML file (default: `config/bh.toml`).
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! [db]
//! path = "./data/bundles.sqlite"
//!
//! [chunking]
//! chunk_size = 3
//!
//! [processing]
//! max_attempts = 3
//! backoff_base_ms = 500
//! backoff_max_ms = 8000
//! lease_ttl_secs = 300
//! default_batch = 3
//! max_batch = 25
//! bootstrap_batch = 1
//!
//! [views]
//! allow_partial = false
//! timeline_similarity = 0.8
//! contradiction_min_confidence = 0.5
//! overview_max_chars = 1500
//!
//! [search]
//! limit = 25
//! snippet_radius = 80
//!
//! [extractor]
//! provider = "heuristic"   # or "openai", "disabled"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use bundle_harness_core::chunk::DEFAULT_CHUNK_SIZE;
use bundle_harness_core::search::SearchParams;
use bundle_harness_core::views::ViewSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    /// Total extractor attempts per chunk, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    /// Chunks per continue call when the caller does not say.
    #[serde(default = "default_batch")]
    pub default_batch: u32,
    /// Larger requests are clamped to this.
    #[serde(default = "default_max_batch")]
    pub max_batch: u32,
    /// Chunks processed inline when a full bundle is created.
    #[serde(default = "default_bootstrap_batch")]
    pub bootstrap_batch: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            lease_ttl_secs: default_lease_ttl_secs(),
            default_batch: default_batch(),
            max_batch: default_max_batch(),
            bootstrap_batch: default_bootstrap_batch(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_lease_ttl_secs() -> u64 {
    300
}
fn default_batch() -> u32 {
    3
}
fn default_max_batch() -> u32 {
    25
}
fn default_bootstrap_batch() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewsConfig {
    #[serde(default)]
    pub allow_partial: bool,
    #[serde(default = "default_timeline_similarity")]
    pub timeline_similarity: f64,
    #[serde(default = "default_contradiction_min_confidence")]
    pub contradiction_min_confidence: f64,
    #[serde(default = "default_overview_max_chars")]
    pub overview_max_chars: usize,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            allow_partial: false,
            timeline_similarity: default_timeline_similarity(),
            contradiction_min_confidence: default_contradiction_min_confidence(),
            overview_max_chars: default_overview_max_chars(),
        }
    }
}

fn default_timeline_similarity() -> f64 {
    0.8
}
fn default_contradiction_min_confidence() -> f64 {
    0.5
}
fn default_overview_max_chars() -> usize {
    1500
}

impl ViewsConfig {
    pub fn settings(&self) -> ViewSettings {
        ViewSettings {
            allow_partial: self.allow_partial,
            timeline_similarity: self.timeline_similarity,
            contradiction_min_confidence: self.contradiction_min_confidence,
            overview_max_chars: self.overview_max_chars,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default = "default_snippet_radius")]
    pub snippet_radius: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            snippet_radius: default_snippet_radius(),
        }
    }
}

fn default_search_limit() -> usize {
    25
}
fn default_snippet_radius() -> usize {
    80
}

impl SearchConfig {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            limit: self.limit,
            snippet_radius: self.snippet_radius,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Chat-completions endpoint for the `openai` provider.
    #[serde(default = "default_extractor_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: default_extractor_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "heuristic".to_string()
}
fn default_extractor_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// A config with every default and the given database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            chunking: ChunkingConfig::default(),
            processing: ProcessingConfig::default(),
            views: ViewsConfig::default(),
            search: SearchConfig::default(),
            extractor: ExtractorConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    let p = &config.processing;
    if p.max_attempts == 0 {
        anyhow::bail!("processing.max_attempts must be >= 1");
    }
    if p.backoff_max_ms < p.backoff_base_ms {
        anyhow::bail!("processing.backoff_max_ms must be >= processing.backoff_base_ms");
    }
    if p.lease_ttl_secs == 0 {
        anyhow::bail!("processing.lease_ttl_secs must be > 0");
    }
    if p.max_batch == 0 {
        anyhow::bail!("processing.max_batch must be >= 1");
    }
    if p.default_batch == 0 || p.default_batch > p.max_batch {
        anyhow::bail!("processing.default_batch must be in [1, processing.max_batch]");
    }
    if p.bootstrap_batch > p.max_batch {
        anyhow::bail!("processing.bootstrap_batch must be <= processing.max_batch");
    }

    let v = &config.views;
    if !(0.0..=1.0).contains(&v.timeline_similarity) {
        anyhow::bail!("views.timeline_similarity must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&v.contradiction_min_confidence) {
        anyhow::bail!("views.contradiction_min_confidence must be in [0.0, 1.0]");
    }
    if v.overview_max_chars < 80 {
        anyhow::bail!("views.overview_max_chars must be >= 80");
    }

    if config.search.limit < 1 {
        anyhow::bail!("search.limit must be >= 1");
    }

    match config.extractor.provider.as_str() {
        "heuristic" | "disabled" => {}
        "openai" => {
            if config.extractor.model.is_none() {
                anyhow::bail!("extractor.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown extractor provider: '{}'. Must be heuristic, openai, or disabled.",
            other
        ),
    }

    Ok(())
}
