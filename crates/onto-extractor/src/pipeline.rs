//! One extraction round: entities, relationships, deduplication
//!
//! The pipeline owns no mutable state; every call builds a fresh
//! [`Ontology`] so rounds stay independently inspectable.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use onto_core::{EngineConfig, ExtractionContext, Ontology, OntologyMetadata, Result};

use crate::dedup::SemanticDeduplicator;
use crate::merge::IdAllocator;
use crate::ner::{ExtractionEngine, ExtractionParams};
use crate::relation::{RelationParams, RelationshipInferencer};

/// Knobs for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub extraction: ExtractionParams,
    pub relations: RelationParams,
    pub similarity_threshold: f32,
    pub batch_size: usize,
}

impl PipelineParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            extraction: ExtractionParams::from_config(&config.extraction),
            relations: RelationParams::from_config(&config.relations),
            similarity_threshold: config.dedup.similarity_threshold,
            batch_size: config.dedup.batch_size,
        }
    }
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Extraction engine, relationship inferencer and deduplicator run in sequence
#[derive(Clone)]
pub struct OntologyPipeline {
    engine: ExtractionEngine,
    inferencer: RelationshipInferencer,
    deduplicator: SemanticDeduplicator,
}

impl OntologyPipeline {
    pub fn new(
        engine: ExtractionEngine,
        inferencer: RelationshipInferencer,
        deduplicator: SemanticDeduplicator,
    ) -> Self {
        Self {
            engine,
            inferencer,
            deduplicator,
        }
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    /// Build a candidate ontology from `text`.
    ///
    /// Only input and configuration problems are errors; backend and
    /// embedding failures are absorbed and counted in the metadata.
    pub async fn build(
        &self,
        text: &str,
        context: &ExtractionContext,
        params: &PipelineParams,
        ids: &mut IdAllocator,
    ) -> Result<Ontology> {
        let started = Instant::now();
        let domain = context.domain_label();

        let output = self
            .engine
            .extract(text, context, &params.extraction, ids)
            .await?;

        let relationships = if output.entities.len() >= 2 {
            self.inferencer
                .infer(&output.entities, text, &domain, &params.relations, ids)?
        } else {
            debug!(entities = output.entities.len(), "Skipping relationship inference");
            Vec::new()
        };

        let dedup = self
            .deduplicator
            .deduplicate(
                output.entities,
                relationships,
                params.similarity_threshold,
                params.batch_size,
            )
            .await;

        let mut ontology = Ontology::new(dedup.entities, dedup.relationships);
        let integrity = ontology.enforce_integrity();

        let report = output.report;
        let mut metadata =
            OntologyMetadata::new(domain.clone(), context.data_type.clone(), context.strategy);
        metadata.extraction_ms = started.elapsed().as_millis() as u64;
        metadata.backend_failures = report.backend_failures;
        metadata.omitted_spans = report.omitted;
        metadata
            .extra
            .insert("extraction".to_string(), serde_json::to_value(&report)?);
        metadata
            .extra
            .insert("dedup_merged".to_string(), dedup.merged.into());
        if let Some(reason) = dedup.skipped {
            metadata
                .extra
                .insert("dedup_skipped".to_string(), reason.into());
        }
        if !integrity.is_clean() {
            metadata
                .extra
                .insert("integrity".to_string(), serde_json::to_value(integrity)?);
        }

        let mut ontology = ontology.with_domain(domain.clone()).with_metadata(metadata);
        ontology.refresh_statistics();

        info!(
            domain = %domain,
            entities = ontology.entities.len(),
            relationships = ontology.relationships.len(),
            merged = dedup.merged,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built candidate ontology"
        );

        Ok(ontology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedNgramEmbedder;
    use crate::patterns::PatternLibrary;
    use std::sync::Arc;

    fn pipeline(dedup: bool) -> OntologyPipeline {
        let library = Arc::new(PatternLibrary::builtin().unwrap());
        let deduplicator = if dedup {
            SemanticDeduplicator::new(Some(Arc::new(HashedNgramEmbedder::default())))
        } else {
            SemanticDeduplicator::disabled()
        };
        OntologyPipeline::new(
            ExtractionEngine::new(library.clone()),
            RelationshipInferencer::new(library),
            deduplicator,
        )
    }

    async fn build(pipeline: &OntologyPipeline, text: &str) -> Ontology {
        pipeline
            .build(
                text,
                &ExtractionContext::generic(),
                &PipelineParams::default(),
                &mut IdAllocator::new(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_builds_employment_edge() {
        let ontology = build(&pipeline(true), "Alice works for Acme Corp.").await;

        let alice = ontology.entities.iter().find(|e| e.text == "Alice").unwrap();
        let acme = ontology.entities.iter().find(|e| e.text == "Acme Corp.").unwrap();
        let edge = ontology
            .relationships
            .iter()
            .find(|r| r.relationship_type == "EMPLOYED_BY")
            .unwrap();
        assert_eq!(edge.source_id, alice.id);
        assert_eq!(edge.target_id, acme.id);
        assert!(edge.confidence > 0.0);

        let metadata = ontology.metadata.as_ref().unwrap();
        assert_eq!(metadata.domain, "generic");
        assert!(metadata.extra.contains_key("extraction"));
        assert!(ontology.statistics.as_ref().unwrap().relationship_count >= 1);
    }

    #[tokio::test]
    async fn test_empty_text_builds_empty_ontology() {
        let ontology = build(&pipeline(true), "").await;
        assert!(ontology.is_empty());
        assert_eq!(ontology.statistics.unwrap().density, 0.0);
    }

    #[tokio::test]
    async fn test_single_entity_skips_inference() {
        let ontology = build(&pipeline(false), "Alice left early.").await;
        assert_eq!(ontology.entities.len(), 1);
        assert!(ontology.relationships.is_empty());
        assert_eq!(
            ontology.metadata.unwrap().extra["dedup_skipped"],
            "no embedding provider"
        );
    }

    #[tokio::test]
    async fn test_output_satisfies_integrity() {
        let text = "Alice works for Acme Corp. in Boston. Acme Corporation hired Bob Smith on March 3, 2021.";
        let ontology = build(&pipeline(true), text).await;

        assert!(ontology.dangling_relationships().is_empty());
        assert!(ontology.self_loops().is_empty());
        assert!(ontology.duplicate_entity_ids().is_empty());
        assert!(ontology.density() <= 1.0);
    }
}
