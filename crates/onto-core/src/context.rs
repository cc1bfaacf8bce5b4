//! Extraction context and strategy selection

use serde::{Deserialize, Serialize};

use crate::{OntoError, Result};

/// Domain label of the generic pattern set
pub const GENERIC_DOMAIN: &str = "generic";

/// How entities are classified.
///
/// A closed tag: the extraction engine selects behavior with one
/// exhaustive match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Deterministic, pattern library only
    #[default]
    PatternBased,
    /// Pattern pass first, low-confidence spans re-classified by the backend
    PatternWithFallback,
    /// Everything delegated to the generative backend
    FullyGenerative,
}

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternBased => "pattern_based",
            Self::PatternWithFallback => "pattern_with_fallback",
            Self::FullyGenerative => "fully_generative",
        }
    }

    /// Whether this strategy needs a generative backend
    pub fn uses_backend(&self) -> bool {
        !matches!(self, Self::PatternBased)
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExtractionStrategy {
    type Err = OntoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pattern_based" | "pattern" | "rule" => Ok(Self::PatternBased),
            "pattern_with_fallback" | "fallback" | "hybrid" => Ok(Self::PatternWithFallback),
            "fully_generative" | "generative" | "llm" => Ok(Self::FullyGenerative),
            other => Err(OntoError::InvalidInput(format!(
                "unknown extraction strategy: {other}"
            ))),
        }
    }
}

/// Context carried with every extraction call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionContext {
    /// Target domain (e.g. "legal", "medical"); `None` means generic
    pub domain: Option<String>,

    /// Kind of input text, recorded in metadata
    pub data_type: String,

    pub strategy: ExtractionStrategy,
}

impl Default for ExtractionContext {
    fn default() -> Self {
        Self {
            domain: None,
            data_type: "text".to_string(),
            strategy: ExtractionStrategy::PatternBased,
        }
    }
}

impl ExtractionContext {
    /// Create a context for a domain
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Default::default()
        }
    }

    /// Context with no domain; resolves to the generic pattern set
    pub fn generic() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    /// The requested domain label, lowercased, or the generic label
    pub fn domain_label(&self) -> String {
        self.domain
            .as_deref()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| GENERIC_DOMAIN.to_string())
    }

    /// Reject malformed contexts before any matching work begins
    pub fn validate(&self) -> Result<()> {
        if let Some(domain) = &self.domain {
            if domain.trim().is_empty() {
                return Err(OntoError::InvalidInput(
                    "domain must not be blank".to_string(),
                ));
            }
        }
        if self.data_type.trim().is_empty() {
            return Err(OntoError::InvalidInput(
                "data_type must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "pattern-with-fallback".parse::<ExtractionStrategy>().unwrap(),
            ExtractionStrategy::PatternWithFallback
        );
        assert_eq!(
            "llm".parse::<ExtractionStrategy>().unwrap(),
            ExtractionStrategy::FullyGenerative
        );
        assert!("magic".parse::<ExtractionStrategy>().is_err());
    }

    #[test]
    fn test_strategy_serde_tag() {
        let json = serde_json::to_string(&ExtractionStrategy::PatternWithFallback).unwrap();
        assert_eq!(json, "\"pattern_with_fallback\"");
    }

    #[test]
    fn test_domain_label() {
        assert_eq!(ExtractionContext::new(" Legal ").domain_label(), "legal");
        assert_eq!(ExtractionContext::generic().domain_label(), GENERIC_DOMAIN);
    }

    #[test]
    fn test_validate_rejects_blank_domain() {
        assert!(ExtractionContext::new("  ").validate().is_err());
        assert!(ExtractionContext::new("medical").validate().is_ok());
    }
}
