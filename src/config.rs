//! Configuration for the knowledge engine.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.
//!
//! The engines in this crate take their parameters per call and never read
//! this module on their own; `Config::validate` is the place invalid values
//! are rejected.

use crate::error::{KnowledgeError, Result};
use crate::ranking::RetrievalMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o")
    pub model: String,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Ranking parameters for flat retrieval results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    pub top_k: usize,
    pub min_score: f64,
    pub hybrid_alpha: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Hybrid,
            top_k: 5,
            min_score: 0.35,
            hybrid_alpha: 0.5,
        }
    }
}

/// Which triple extractor to use. Only the LLM extractor exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Llm,
}

/// Knowledge-graph extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KnowledgeGraphSettings {
    pub enabled: bool,
    pub extractor: ExtractorKind,
    /// Provider hint forwarded to the model boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model override for extraction calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub min_triples: usize,
    pub max_triples: usize,
    pub triples_per_k_tokens: usize,
    pub max_depth: usize,
}

impl Default for KnowledgeGraphSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            extractor: ExtractorKind::Llm,
            provider: None,
            model: None,
            min_triples: 20,
            max_triples: 400,
            triples_per_k_tokens: 20,
            max_depth: 2,
        }
    }
}

/// Strategy used to walk a page-index tree during search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Score every leaf independently.
    #[default]
    LeafScan,
    /// Descend only into sections judged relevant.
    TopDown,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "leaf_scan" | "leaf" => Ok(StrategyKind::LeafScan),
            "top_down" | "topdown" => Ok(StrategyKind::TopDown),
            other => Err(format!("unknown search strategy '{}'", other)),
        }
    }
}

/// Page-index search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    pub strategy: StrategyKind,
    /// Cap on concurrent relevance evaluations.
    pub max_concurrency: usize,
    /// Minimum relevance for a section to be descended (top-down only).
    pub relevance_threshold: f64,
    /// Leaves spanning more pages than this are split at index time.
    pub max_pages_per_node: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::LeafScan,
            max_concurrency: 8,
            relevance_threshold: 0.5,
            max_pages_per_node: 10,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub graph: KnowledgeGraphSettings,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    retrieval: Option<RetrievalConfig>,
    graph: Option<KnowledgeGraphSettings>,
    search: Option<SearchConfig>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

/// Parse an env var into `T`, ignoring values that don't parse.
fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_*, KE_*)
    /// 2. Config file (~/.config/knowledge-engine/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(tokens) = env_parsed("LLM_MAX_TOKENS") {
            self.llm.max_tokens = tokens;
        }
        if let Some(temp) = env_parsed("LLM_TEMPERATURE") {
            self.llm.temperature = temp;
        }

        if let Some(mode) = env_parsed("KE_RETRIEVAL_MODE") {
            self.retrieval.mode = mode;
        }
        if let Some(alpha) = env_parsed("KE_HYBRID_ALPHA") {
            self.retrieval.hybrid_alpha = alpha;
        }
        if let Some(min_score) = env_parsed("KE_MIN_SCORE") {
            self.retrieval.min_score = min_score;
        }
        if let Some(top_k) = env_parsed("KE_TOP_K") {
            self.retrieval.top_k = top_k;
        }
        if let Some(concurrency) = env_parsed("KE_SEARCH_CONCURRENCY") {
            self.search.max_concurrency = concurrency;
        }
        if let Some(strategy) = env_parsed("KE_SEARCH_STRATEGY") {
            self.search.strategy = strategy;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KnowledgeError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text; missing sections keep defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| KnowledgeError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
        }
        if let Some(retrieval) = file_config.retrieval {
            config.retrieval = retrieval;
        }
        if let Some(graph) = file_config.graph {
            config.graph = graph;
        }
        if let Some(search) = file_config.search {
            config.search = search;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "knowledge-engine")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required LLM configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(KnowledgeError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(KnowledgeError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(KnowledgeError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        self.validate_engine()
    }

    /// Validate ranking, graph and search parameters.
    ///
    /// Split from [`Config::validate`] so offline commands (ranking a saved
    /// result list) can check their inputs without LLM credentials.
    pub fn validate_engine(&self) -> Result<()> {
        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.hybrid_alpha) {
            return Err(KnowledgeError::InvalidConfig(
                "retrieval.hybridAlpha must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&r.min_score) {
            return Err(KnowledgeError::InvalidConfig(
                "retrieval.minScore must be between 0 and 1".to_string(),
            ));
        }
        if !(1..=20).contains(&r.top_k) {
            return Err(KnowledgeError::InvalidConfig(
                "retrieval.topK must be between 1 and 20".to_string(),
            ));
        }

        let g = &self.graph;
        if g.min_triples > g.max_triples {
            return Err(KnowledgeError::InvalidConfig(format!(
                "graph.minTriples ({}) must not exceed graph.maxTriples ({})",
                g.min_triples, g.max_triples
            )));
        }
        if g.triples_per_k_tokens == 0 {
            return Err(KnowledgeError::InvalidConfig(
                "graph.triplesPerKTokens must be positive".to_string(),
            ));
        }

        let s = &self.search;
        if s.max_concurrency == 0 {
            return Err(KnowledgeError::InvalidConfig(
                "search.maxConcurrency must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&s.relevance_threshold) {
            return Err(KnowledgeError::InvalidConfig(
                "search.relevanceThreshold must be between 0 and 1".to_string(),
            ));
        }
        if s.max_pages_per_node == 0 {
            return Err(KnowledgeError::InvalidConfig(
                "search.maxPagesPerNode must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.retrieval.mode, RetrievalMode::Hybrid);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.min_score, 0.35);
        assert_eq!(config.retrieval.hybrid_alpha, 0.5);
        assert_eq!(config.graph.min_triples, 20);
        assert_eq!(config.graph.max_triples, 400);
        assert_eq!(config.search.strategy, StrategyKind::LeafScan);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());
        // Engine parameters alone are fine.
        assert!(config.validate_engine().is_ok());
    }

    #[test]
    fn test_with_llm() {
        let config = Config::with_llm("https://api.example.com", "test-key", "gpt-4");
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert_eq!(config.llm.model, "gpt-4");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_alpha_out_of_range() {
        let mut config = Config::default();
        config.retrieval.hybrid_alpha = 1.5;
        assert!(matches!(
            config.validate_engine(),
            Err(KnowledgeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_triple_bounds() {
        let mut config = Config::default();
        config.graph.min_triples = 50;
        config.graph.max_triples = 10;
        assert!(config.validate_engine().is_err());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate_engine().is_err());
    }

    #[test]
    fn test_from_yaml_partial_sections() {
        let yaml = r#"
llm:
  api_base: https://llm.local
  model: small
retrieval:
  mode: keyword
  topK: 3
  minScore: 0.2
  hybridAlpha: 0.7
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.llm.api_base, "https://llm.local");
        assert_eq!(config.llm.model, "small");
        assert_eq!(config.retrieval.mode, RetrievalMode::Keyword);
        assert_eq!(config.retrieval.top_k, 3);
        // Untouched sections keep defaults.
        assert_eq!(config.graph.max_triples, 400);
        assert_eq!(config.search.max_concurrency, 8);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("leaf-scan".parse::<StrategyKind>(), Ok(StrategyKind::LeafScan));
        assert_eq!("TOP_DOWN".parse::<StrategyKind>(), Ok(StrategyKind::TopDown));
        assert!("sideways".parse::<StrategyKind>().is_err());
    }
}
