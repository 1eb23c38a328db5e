//! TOML configuration loading and validation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use folio_core::chunk::ChunkParams;
use folio_core::retrieve::{FusionPolicy, RetrievalParams};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Path of the JSON-persisted vector index.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./folio.index.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,
    /// Overlap as a fraction of `target_chars`.
    #[serde(default = "default_overlap")]
    pub overlap: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: default_target_chars(),
            overlap: default_overlap(),
        }
    }
}

fn default_target_chars() -> usize {
    1000
}
fn default_overlap() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fusion_headroom")]
    pub fusion_headroom: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// `"shared"` (one vector space) or `"minmax"` (per-modality
    /// min-max normalization before merging).
    #[serde(default = "default_fusion")]
    pub fusion: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            fusion_headroom: default_fusion_headroom(),
            min_score: default_min_score(),
            fusion: default_fusion(),
        }
    }
}

fn default_k() -> usize {
    8
}
fn default_fusion_headroom() -> usize {
    2
}
fn default_min_score() -> f64 {
    0.25
}
fn default_fusion() -> String {
    "shared".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_budget_chars")]
    pub budget_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_chars: default_budget_chars(),
        }
    }
}

fn default_budget_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Expected vector dimensionality; 0 accepts whatever the model
    /// returns.
    #[serde(default)]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_embed_model(),
            dims: 0,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embed_model() -> String {
    "qwen3-embedding:4b".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Multimodal model used to caption document images and describe
    /// query images.
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum concurrent captioning calls during ingestion.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_vision_model(),
            timeout_secs: default_vision_timeout_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_vision_model() -> String {
    "qwen2.5vl:7b".to_string()
}
fn default_vision_timeout_secs() -> u64 {
    120
}
fn default_max_concurrent() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_vision_model(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_timeout_secs() -> u64 {
    180
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Whole-ingestion time bound.
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// Whole-query time bound.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            upload_timeout_secs: default_upload_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

fn default_upload_timeout_secs() -> u64 {
    600
}
fn default_query_timeout_secs() -> u64 {
    300
}

impl Config {
    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            target_chars: self.chunking.target_chars,
            overlap: self.chunking.overlap,
        }
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            k: self.retrieval.k,
            fusion_headroom: self.retrieval.fusion_headroom,
            min_score: self.retrieval.min_score,
            fusion: match self.retrieval.fusion.as_str() {
                "minmax" => FusionPolicy::MinMaxPerModality,
                _ => FusionPolicy::SharedSpace,
            },
        }
    }
}

/// Load and validate a configuration file. A missing file yields the
/// defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.target_chars == 0 {
        anyhow::bail!("chunking.target_chars must be > 0");
    }
    if !(0.0..=0.5).contains(&config.chunking.overlap) {
        anyhow::bail!("chunking.overlap must be in [0.0, 0.5]");
    }
    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.fusion_headroom == 0 {
        anyhow::bail!("retrieval.fusion_headroom must be >= 1");
    }
    match config.retrieval.fusion.as_str() {
        "shared" | "minmax" => {}
        other => anyhow::bail!(
            "Unknown fusion policy: '{}'. Must be shared or minmax.",
            other
        ),
    }
    if config.context.budget_chars == 0 {
        anyhow::bail!("context.budget_chars must be > 0");
    }
    Ok(())
}
