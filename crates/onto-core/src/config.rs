//! Engine Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! defaults suitable for local runs. Environment values take precedence.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Entity extraction
    pub extraction: ExtractionConfig,

    /// Relationship inference
    pub relations: RelationConfig,

    /// Semantic deduplication
    pub dedup: DedupConfig,

    /// Critic weights and thresholds
    pub critic: CriticConfig,

    /// Refinement loop
    pub refinement: RefinementConfig,

    /// Generative backend resilience
    pub backend: BackendConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Extraction
        if let Some(v) = env_parse("ONTO_MAX_ENTITIES")? {
            self.extraction.max_entities = v;
        }
        if let Some(v) = env_parse("ONTO_MIN_CONFIDENCE")? {
            self.extraction.min_confidence = v;
        }
        if let Some(v) = env_parse("ONTO_FALLBACK_THRESHOLD")? {
            self.extraction.fallback_threshold = v;
        }
        if let Ok(domains) = std::env::var("ONTO_MANDATORY_DOMAINS") {
            self.extraction.mandatory_domains = domains
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Relations
        if let Some(v) = env_parse("ONTO_PROXIMITY_WINDOW")? {
            self.relations.proximity_window = v;
        }
        if let Some(v) = env_parse("ONTO_MAX_RELATIONSHIPS")? {
            self.relations.max_relationships = v;
        }

        // Dedup
        if let Some(v) = env_parse("ONTO_SIMILARITY_THRESHOLD")? {
            self.dedup.similarity_threshold = v;
        }

        // Refinement
        if let Some(v) = env_parse("ONTO_MAX_ROUNDS")? {
            self.refinement.max_rounds = v;
        }
        if let Some(v) = env_parse("ONTO_CONVERGENCE_DELTA")? {
            self.refinement.convergence_delta = v;
        }

        // Backend
        if let Some(v) = env_parse("ONTO_BACKEND_TIMEOUT_MS")? {
            self.extraction.backend_timeout_ms = v;
        }
        if let Some(v) = env_parse("ONTO_BACKEND_CALL_TIMEOUT_MS")? {
            self.backend.call_timeout_ms = v;
        }
        if let Some(v) = env_parse("ONTO_BACKEND_MAX_RETRIES")? {
            self.backend.max_retries = v;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(v) = env_parse("LOG_JSON")? {
            self.logging.json_format = v;
        }

        Ok(())
    }

    /// Check ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("extraction.min_confidence", self.extraction.min_confidence)?;
        check_unit(
            "extraction.fallback_threshold",
            self.extraction.fallback_threshold,
        )?;
        check_unit("relations.min_confidence", self.relations.min_confidence)?;
        check_unit("dedup.similarity_threshold", self.dedup.similarity_threshold)?;
        check_unit("critic.weakness_threshold", self.critic.weakness_threshold)?;
        check_unit("critic.strength_threshold", self.critic.strength_threshold)?;
        check_unit("refinement.ewma_alpha", self.refinement.ewma_alpha)?;

        if self.extraction.max_entities == 0 {
            return Err(invalid("extraction.max_entities", "0"));
        }
        if self.dedup.batch_size == 0 {
            return Err(invalid("dedup.batch_size", "0"));
        }
        if self.refinement.max_rounds == 0 {
            return Err(invalid("refinement.max_rounds", "0"));
        }
        if self.refinement.patience == 0 {
            return Err(invalid("refinement.patience", "0"));
        }
        if self.refinement.window_growth < 1.0 {
            return Err(invalid(
                "refinement.window_growth",
                &self.refinement.window_growth.to_string(),
            ));
        }
        if self.critic.granularity_min >= self.critic.granularity_max {
            return Err(invalid(
                "critic.granularity_min",
                &self.critic.granularity_min.to_string(),
            ));
        }
        let worst_case = self.backend.worst_case_ms();
        if self.extraction.backend_timeout_ms < worst_case {
            return Err(invalid(
                "extraction.backend_timeout_ms",
                &format!(
                    "{} (retries need up to {worst_case})",
                    self.extraction.backend_timeout_ms
                ),
            ));
        }
        self.critic.weights.validate()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn check_unit(key: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(key, &value.to_string()))
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Entity extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Cap on emitted entities; the highest-confidence ones are kept
    pub max_entities: usize,

    /// Pattern matches below this confidence are discarded
    pub min_confidence: f32,

    /// Spans below this confidence are forwarded to the backend in fallback mode
    pub fallback_threshold: f32,

    /// Characters of surrounding text stored as entity context
    pub context_window: usize,

    /// Resolve unknown domains to the generic pattern set
    pub allow_generic_fallback: bool,

    /// Domains that must have a pattern set at startup
    pub mandatory_domains: Vec<String>,

    /// Deadline for one backend request made by the engine, covering any
    /// retries inside the backend; must cover [`BackendConfig::worst_case_ms`]
    pub backend_timeout_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_entities: 500,
            min_confidence: 0.3,
            fallback_threshold: 0.6,
            context_window: 40,
            allow_generic_fallback: true,
            mandatory_domains: Vec::new(),
            backend_timeout_ms: 60_000,
        }
    }
}

/// Relationship inference configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Maximum character distance between the offsets of a candidate pair
    pub proximity_window: usize,

    /// Cap on emitted relationships; trimmed by confidence
    pub max_relationships: usize,

    /// Relationships below this confidence are discarded
    pub min_confidence: f32,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            proximity_window: 150,
            max_relationships: 1000,
            min_confidence: 0.2,
        }
    }
}

/// Semantic deduplication configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Cosine similarity at or above which two entities are merged
    pub similarity_threshold: f32,

    /// Texts per embedding call and tile size for pairwise comparison
    pub batch_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            batch_size: 64,
        }
    }
}

/// Weights of the critic's overall composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticWeights {
    pub completeness: f32,
    pub consistency: f32,
    pub clarity: f32,
    pub granularity: f32,
    pub relationship_coherence: f32,
    pub domain_alignment: f32,
}

impl Default for CriticWeights {
    fn default() -> Self {
        Self {
            completeness: 0.25,
            consistency: 0.20,
            clarity: 0.15,
            granularity: 0.10,
            relationship_coherence: 0.15,
            domain_alignment: 0.15,
        }
    }
}

impl CriticWeights {
    /// Weights in the order of `CriticScore::dimensions`
    pub fn as_array(&self) -> [f32; 6] {
        [
            self.completeness,
            self.consistency,
            self.clarity,
            self.granularity,
            self.relationship_coherence,
            self.domain_alignment,
        ]
    }

    pub fn total(&self) -> f32 {
        self.as_array().iter().sum()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.as_array().iter().any(|w| *w < 0.0 || w.is_nan()) {
            return Err(invalid("critic.weights", "negative weight"));
        }
        if self.total() <= 0.0 {
            return Err(invalid("critic.weights", "sum must be positive"));
        }
        Ok(())
    }
}

/// Critic configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticConfig {
    pub weights: CriticWeights,

    /// Dimensions below this are reported as weaknesses
    pub weakness_threshold: f32,

    /// Dimensions at or above this are reported as strengths
    pub strength_threshold: f32,

    /// Lower bound of the ideal band, entities per 100 words
    pub granularity_min: f32,

    /// Upper bound of the ideal band, entities per 100 words
    pub granularity_max: f32,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            weights: CriticWeights::default(),
            weakness_threshold: 0.6,
            strength_threshold: 0.8,
            granularity_min: 2.0,
            granularity_max: 12.0,
        }
    }
}

/// Refinement loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Maximum number of critique rounds
    pub max_rounds: usize,

    /// Improvements of `overall` below this count as stalled
    pub convergence_delta: f32,

    /// Consecutive stalled rounds required to converge
    pub patience: usize,

    /// Smoothing factor of the reported score trend
    pub ewma_alpha: f32,

    /// Step applied to the entity confidence floor
    pub confidence_step: f32,

    /// Step applied to the dedup similarity threshold
    pub similarity_step: f32,

    /// Factor applied to the proximity window
    pub window_growth: f32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            convergence_delta: 0.02,
            patience: 2,
            ewma_alpha: 0.5,
            confidence_step: 0.1,
            similarity_step: 0.05,
            window_growth: 1.5,
        }
    }
}

/// Resilience settings for a wrapped generative backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Request timeout in milliseconds
    pub call_timeout_ms: u64,

    pub max_retries: usize,

    pub initial_backoff_ms: u64,

    pub max_backoff_ms: u64,

    /// Consecutive failures that open the circuit
    pub failure_threshold: usize,

    /// Time the circuit stays open before a trial call
    pub cooldown_ms: u64,
}

impl BackendConfig {
    /// Longest time one request can take: every attempt timing out plus the
    /// backoff sleeps between them
    pub fn worst_case_ms(&self) -> u64 {
        let attempts = self.max_retries as u64 + 1;
        let mut total = self.call_timeout_ms.saturating_mul(attempts);
        let mut backoff = self.initial_backoff_ms;
        for _ in 0..self.max_retries {
            total = total.saturating_add(backoff);
            backoff = backoff.saturating_mul(2).min(self.max_backoff_ms);
        }
        total
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 15_000,
            max_retries: 2,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for crate::OntoError {
    fn from(err: ConfigError) -> Self {
        crate::OntoError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.refinement.max_rounds, 5);
        assert_eq!(config.refinement.convergence_delta, 0.02);
        assert_eq!(config.dedup.similarity_threshold, 0.85);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let total = CriticWeights::default().total();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = EngineConfig::default();
        config.dedup.similarity_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = EngineConfig::default();
        config.critic.weights = CriticWeights {
            completeness: 0.0,
            consistency: 0.0,
            clarity: 0.0,
            granularity: 0.0,
            relationship_coherence: 0.0,
            domain_alignment: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_deadline_covers_retries() {
        let backend = BackendConfig::default();
        assert_eq!(backend.worst_case_ms(), 15_000 * 3 + 200 + 400);

        let mut config = EngineConfig::default();
        config.backend.max_retries = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("extraction.backend_timeout_ms"));

        config.extraction.backend_timeout_ms = config.backend.worst_case_ms();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [refinement]
            max_rounds = 3

            [dedup]
            similarity_threshold = 0.9
            "#,
        )
        .unwrap();

        assert_eq!(config.refinement.max_rounds, 3);
        assert_eq!(config.refinement.patience, 2);
        assert_eq!(config.dedup.similarity_threshold, 0.9);
        assert_eq!(config.dedup.batch_size, 64);
    }
}
