//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults.
//! [`load_config`] validates the whole file before any command touches the
//! database or the network, so a bad value fails fast and names its key.

use anyhow::{Context, Result};
use rag_eval_core::batch::DEFAULT_BATCH_SIZE;
use rag_eval_core::chunk::{ChunkParams, ChunkStrategy, DEFAULT_WINDOW_SIZE};
use rag_eval_core::metrics::{BaseMetric, MetricRegistry, DEFAULT_CUTOFFS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default)]
    pub overlap: usize,
    /// Structural chunk ceiling. Defaults to `window_size`.
    #[serde(default)]
    pub max_chars: Option<usize>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: 0,
            max_chars: None,
        }
    }
}

fn default_strategy() -> String {
    "fixed".to_string()
}
fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

impl ChunkingConfig {
    /// Chunker parameters, with an optional strategy override from the CLI.
    pub fn params(&self, strategy_override: Option<&str>) -> Result<ChunkParams> {
        let strategy: ChunkStrategy = strategy_override.unwrap_or(&self.strategy).parse()?;
        Ok(ChunkParams {
            strategy,
            window_size: self.window_size,
            overlap: self.overlap,
            max_chars: self.max_chars.unwrap_or(self.window_size),
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama defaults to `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            wait_secs: default_wait_secs(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl RetryConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_wait_secs() -> u64 {
    30
}
fn default_max_in_flight() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluationConfig {
    #[serde(default = "default_cutoffs")]
    pub cutoffs: Vec<usize>,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            cutoffs: default_cutoffs(),
            metrics: default_metrics(),
        }
    }
}

impl EvaluationConfig {
    pub fn registry(&self) -> Result<MetricRegistry> {
        let metrics = self
            .metrics
            .iter()
            .map(|m| m.parse::<BaseMetric>())
            .collect::<Result<Vec<_>>>()?;
        Ok(MetricRegistry::new(&metrics, &self.cutoffs))
    }
}

fn default_cutoffs() -> Vec<usize> {
    DEFAULT_CUTOFFS.to_vec()
}
fn default_metrics() -> Vec<String> {
    BaseMetric::ALL.iter().map(|m| m.name().to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_rerank_model(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RerankConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_rerank_model() -> String {
    "rerank-english-v3.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordsConfig {
    #[serde(default = "default_keywords_provider")]
    pub provider: String,
    #[serde(default = "default_keywords_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            provider: default_keywords_provider(),
            model: default_keywords_model(),
            url: None,
            max_keywords: default_max_keywords(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_keywords_provider() -> String {
    "terms".to_string()
}
fn default_keywords_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_keywords() -> usize {
    10
}

/// Question generator used by `rag-eval generate`.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_keywords_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_keywords_model(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    config
        .chunking
        .strategy
        .parse::<ChunkStrategy>()
        .context("chunking.strategy")?;
    if config.chunking.window_size == 0 {
        anyhow::bail!("chunking.window_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.window_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.window_size ({})",
            config.chunking.overlap,
            config.chunking.window_size
        );
    }
    if config.chunking.max_chars == Some(0) {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.unwrap_or(0) == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Retry
    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }
    if config.retry.max_in_flight == 0 {
        anyhow::bail!("retry.max_in_flight must be >= 1");
    }

    // Retrieval
    if config.retrieval.limit == 0 {
        anyhow::bail!("retrieval.limit must be >= 1");
    }

    // Evaluation
    if config.evaluation.cutoffs.is_empty() {
        anyhow::bail!("evaluation.cutoffs must not be empty");
    }
    if config.evaluation.cutoffs.contains(&0) {
        anyhow::bail!("evaluation.cutoffs must all be >= 1");
    }
    if config.evaluation.metrics.is_empty() {
        anyhow::bail!("evaluation.metrics must not be empty");
    }
    config.evaluation.registry().context("evaluation.metrics")?;

    // Rerank
    match config.rerank.provider.as_str() {
        "disabled" | "cohere" => {}
        other => anyhow::bail!(
            "Unknown rerank provider: '{}'. Must be disabled or cohere.",
            other
        ),
    }

    // Keywords
    match config.keywords.provider.as_str() {
        "terms" | "openai" => {}
        other => anyhow::bail!(
            "Unknown keywords provider: '{}'. Must be terms or openai.",
            other
        ),
    }
    if config.keywords.max_keywords == 0 {
        anyhow::bail!("keywords.max_keywords must be >= 1");
    }

    // Generation
    if config.generation.provider != "openai" {
        anyhow::bail!(
            "Unknown generation provider: '{}'. Must be openai.",
            config.generation.provider
        );
    }

    Ok(())
}
