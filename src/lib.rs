//! Monolith Decomposer
//!
//! Proposes and generates a microservice decomposition of a monolith:
//! - Entity extraction (C# source trees via tree-sitter, or model documents)
//! - Weighted dependency graph and coupling metrics
//! - Boundary resolution by greedy agglomerative clustering, optionally
//!   advised by a metered external classifier
//! - Versioned, human-editable decomposition plan
//! - Layered service scaffolding, RPC contracts and a gateway

pub mod accounting;
pub mod advisor;
pub mod codegen;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod resolver;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use error::{DecompositionError, DecompositionResult, ErrorCategory};
pub use pipeline::{DecompositionPipeline, PipelineOutput};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub budget: BudgetConfig,
    pub advisor: AdvisorConfig,
    pub extraction: ExtractionConfig,
    pub generation: GenerationConfig,
    pub report: ReportConfig,
}

/// Token ceiling and decomposition constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_total_tokens: u64,
    pub max_services: Option<usize>,
    pub min_entities_per_service: usize,
    pub coupling_threshold: f64,
    /// Soft target; exceeding it is reported, not enforced
    pub max_cross_service_edge_weight: Option<u64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_total_tokens: 200_000,
            max_services: None,
            min_entities_per_service: 1,
            coupling_threshold: 1.0,
            max_cross_service_edge_weight: None,
        }
    }
}

/// Advisory classifier section. An empty or `disabled` URL turns it off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub min_confidence: f64,
    pub validate_merges: bool,
    pub parallelism: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            timeout_secs: 20,
            min_confidence: 0.5,
            validate_merges: false,
            parallelism: 4,
        }
    }
}

impl AdvisorConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty() && self.url != "disabled"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Fixed worker-pool size for parsing
    pub workers: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Storage technology behind the generated repository adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    InMemory,
    #[default]
    Postgres,
    Mysql,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in_memory",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "in_memory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub storage_backend: StorageBackend,
    /// Fixed worker-pool size for per-service rendering
    pub workers: usize,
    /// Prefix of every generated contract package, e.g. `shop` → `shop.orders`
    pub contract_package: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::default(),
            workers: 4,
            contract_package: "shop".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Number of top consuming analysis units listed
    pub top_files: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { top_files: 10 }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub budget: BudgetConfig,
    pub advisor: AdvisorConfig,
    pub extraction: ExtractionConfig,
    pub generation: GenerationConfig,
    pub report: ReportConfig,
}

fn env_parsed<T: FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "decomposer.yaml" in CWD. If the file
    /// doesn't exist, falls back to env vars / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let mut budget = yaml.budget;
        if let Some(v) = env_parsed("DECOMPOSER_MAX_TOKENS") {
            budget.max_total_tokens = v;
        }
        if let Some(v) = env_parsed("DECOMPOSER_MAX_SERVICES") {
            budget.max_services = Some(v);
        }
        if let Some(v) = env_parsed("DECOMPOSER_COUPLING_THRESHOLD") {
            budget.coupling_threshold = v;
        }

        let mut advisor = yaml.advisor;
        advisor.url = std::env::var("ADVISOR_URL").unwrap_or(advisor.url);
        advisor.model = std::env::var("ADVISOR_MODEL").unwrap_or(advisor.model);
        advisor.api_key = std::env::var("ADVISOR_API_KEY").ok().or(advisor.api_key);
        if let Some(v) = env_parsed("ADVISOR_TIMEOUT_SECS") {
            advisor.timeout_secs = v;
        }

        let mut extraction = yaml.extraction;
        let mut generation = yaml.generation;
        if let Some(v) = env_parsed("DECOMPOSER_STORAGE_BACKEND") {
            generation.storage_backend = v;
        }
        if let Some(v) = env_parsed::<usize>("DECOMPOSER_WORKERS") {
            extraction.workers = v;
            generation.workers = v;
        }

        Ok(Self {
            budget,
            advisor,
            extraction,
            generation,
            report: yaml.report,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("decomposer.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
