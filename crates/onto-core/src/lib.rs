//! Onto Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the
//! ontology extraction and refinement engine:
//! - Ontology models (entities, relationships, statistics, critic scores)
//! - Extraction context and the closed strategy tag
//! - Common error types
//! - Injected capabilities (generative backend, embedding provider)
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod context;
pub mod model;

pub use config::{
    BackendConfig, ConfigError, CriticConfig, CriticWeights, DedupConfig, EngineConfig,
    ExtractionConfig, LoggingConfig, RefinementConfig, RelationConfig,
};
pub use context::{ExtractionContext, ExtractionStrategy, GENERIC_DOMAIN};
pub use model::{
    clamp_confidence, normalize_surface, CriticScore, Entity, EntityType, Finding,
    FindingCategory, IntegrityReport, Ontology, OntologyMetadata, Relationship, SourceSpan,
    Statistics, PROP_ALIASES, PROP_DOMAIN_SPECIFIC, PROP_MATCHER, PROP_MENTIONS,
};

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for extraction and refinement operations
#[derive(Error, Debug)]
pub enum OntoError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown domain '{0}' and no generic fallback is available")]
    UnknownDomain(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OntoError>;

/// Failures surfaced by an injected capability.
///
/// Every variant is recoverable from the engine's point of view: callers
/// fall back to the pattern result or omit the affected span.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("retryable failure: {0}")]
    Retryable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Whether a bounded retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::Unavailable(_))
    }

    /// Whether the affected span must be treated as unresolved
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ============================================================================
// Injected Capabilities
// ============================================================================

/// Generative (LLM) backend used for non-deterministic classification.
///
/// Implementations are expected to be wrapped with timeout, bounded retry
/// and circuit breaking by the caller; see `onto_extractor::backend` for a
/// ready-made wrapper.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &str {
        "generative"
    }
}

/// Embedding capability used by semantic deduplication
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per input in order
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, BackendError>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_classification() {
        assert!(BackendError::Retryable("503".into()).is_retryable());
        assert!(BackendError::Unavailable("down".into()).is_retryable());
        assert!(!BackendError::CircuitOpen.is_retryable());
        assert!(!BackendError::Timeout { after_ms: 10 }.is_retryable());
        assert!(BackendError::Timeout { after_ms: 10 }.is_timeout());
    }

    #[test]
    fn test_backend_error_converts_into_onto_error() {
        let err: OntoError = BackendError::CircuitOpen.into();
        assert!(matches!(err, OntoError::Backend(BackendError::CircuitOpen)));
        assert_eq!(err.to_string(), "Backend error: circuit breaker is open");
    }
}
