//! Onto Extractor - Knowledge extraction pipeline
//!
//! Turns raw text into an ontology fragment:
//! - Pattern library: compiled, per-domain entity and relationship matchers
//! - Entity extraction with pattern, fallback and generative strategies
//! - Proximity-based relationship inference
//! - Embedding-based semantic deduplication
//! - Merging of partial ontologies produced concurrently
//!
//! Author: hephaex@gmail.com

use onto_core::EntityType;
use serde::{Deserialize, Serialize};

pub mod backend;
pub mod builtin;
pub mod corpus;
pub mod dedup;
pub mod embedding;
pub mod merge;
pub mod ner;
pub mod patterns;
pub mod pipeline;
pub mod relation;

pub use backend::ResilientBackend;
pub use corpus::CorpusExtractor;
pub use dedup::{DedupOutcome, SemanticDeduplicator};
pub use embedding::HashedNgramEmbedder;
pub use merge::{merge_partials, IdAllocator};
pub use ner::{ExtractionEngine, ExtractionOutput, ExtractionParams, ExtractionReport};
pub use patterns::{DomainPatterns, DomainSpec, PatternLibrary};
pub use pipeline::{OntologyPipeline, PipelineParams};
pub use relation::{RelationParams, RelationshipInferencer};

/// A raw mention found by a matcher or the generative backend, before ids
/// are assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSpan {
    pub text: String,
    pub entity_type: EntityType,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    pub confidence: f32,
    /// Matched by a pattern specific to the requested domain
    pub domain_specific: bool,
}

impl ExtractedSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &ExtractedSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}
