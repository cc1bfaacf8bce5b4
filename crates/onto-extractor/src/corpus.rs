//! Corpus fan-out
//!
//! Runs one pipeline task per pre-chunked input and merges the partial
//! ontologies. Tasks share the read-only pattern library through the
//! pipeline's `Arc`s and draw ids from their own namespace, so nothing
//! mutable crosses task boundaries.

use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{info, warn};

use onto_core::{ExtractionContext, OntoError, Ontology, Result};

use crate::merge::{merge_partials, IdAllocator};
use crate::pipeline::{OntologyPipeline, PipelineParams};

/// Extracts independent chunks concurrently
#[derive(Clone)]
pub struct CorpusExtractor {
    pipeline: OntologyPipeline,
}

impl CorpusExtractor {
    pub fn new(pipeline: OntologyPipeline) -> Self {
        Self { pipeline }
    }

    /// Extract every chunk on its own task, then merge.
    ///
    /// The result does not depend on task completion order. The first
    /// failing chunk (by position) fails the whole call.
    pub async fn extract_corpus(
        &self,
        chunks: Vec<String>,
        context: &ExtractionContext,
        params: &PipelineParams,
    ) -> Result<Ontology> {
        context.validate()?;
        let started = Instant::now();
        let chunk_count = chunks.len();

        let mut tasks = JoinSet::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let pipeline = self.pipeline.clone();
            let context = context.clone();
            let params = params.clone();
            tasks.spawn(async move {
                let mut ids = IdAllocator::namespaced(format!("c{index}"));
                let result = pipeline.build(&chunk, &context, &params, &mut ids).await;
                (index, result)
            });
        }

        let mut results: Vec<(usize, Result<Ontology>)> = Vec::with_capacity(chunk_count);
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined
                .map_err(|e| OntoError::Extraction(format!("chunk task failed: {e}")))?;
            results.push((index, result));
        }
        results.sort_by_key(|(index, _)| *index);

        let mut partials = Vec::with_capacity(chunk_count);
        for (index, result) in results {
            match result {
                Ok(partial) => partials.push(partial),
                Err(e) => {
                    warn!(chunk = index, error = %e, "Chunk extraction failed");
                    return Err(e);
                }
            }
        }

        let mut merged = merge_partials(partials);
        let domain = context.domain_label();
        if let Some(metadata) = merged.metadata.as_mut() {
            metadata.domain = domain.clone();
            metadata.data_type = context.data_type.clone();
            metadata.strategy = context.strategy;
            // per-chunk reports do not describe the merged graph
            metadata.extra.remove("extraction");
        }
        merged.domain = Some(domain);

        info!(
            chunks = chunk_count,
            entities = merged.entities.len(),
            relationships = merged.relationships.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Corpus extraction complete"
        );

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::SemanticDeduplicator;
    use crate::ner::ExtractionEngine;
    use crate::patterns::PatternLibrary;
    use crate::relation::RelationshipInferencer;
    use std::sync::Arc;

    fn extractor() -> CorpusExtractor {
        let library = Arc::new(PatternLibrary::builtin().unwrap());
        CorpusExtractor::new(OntologyPipeline::new(
            ExtractionEngine::new(library.clone()),
            RelationshipInferencer::new(library),
            SemanticDeduplicator::disabled(),
        ))
    }

    fn chunks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_shared_entities_merge_across_chunks() {
        let merged = extractor()
            .extract_corpus(
                chunks(&["Alice works for Acme Corp.", "Bob Smith works for Acme Corp."]),
                &ExtractionContext::generic(),
                &PipelineParams::default(),
            )
            .await
            .unwrap();

        let acme: Vec<_> = merged
            .entities
            .iter()
            .filter(|e| e.text == "Acme Corp.")
            .collect();
        assert_eq!(acme.len(), 1);
        assert!(merged.duplicate_entity_ids().is_empty());
        assert!(merged.dangling_relationships().is_empty());
        assert!(merged
            .relationships
            .iter()
            .filter(|r| r.relationship_type == "EMPLOYED_BY")
            .all(|r| r.target_id == acme[0].id));
        assert_eq!(merged.domain.as_deref(), Some("generic"));
    }

    #[tokio::test]
    async fn test_chunk_order_does_not_change_result() {
        let texts = [
            "Alice works for Acme Corp. in Boston.",
            "Globex Corporation hired Bob Smith on March 3, 2021.",
            "Carol Jones joined Acme Corp. for $90,000.",
        ];
        let forward = extractor()
            .extract_corpus(
                chunks(&texts),
                &ExtractionContext::generic(),
                &PipelineParams::default(),
            )
            .await
            .unwrap();

        let mut reversed_texts = texts;
        reversed_texts.reverse();
        let reversed = extractor()
            .extract_corpus(
                chunks(&reversed_texts),
                &ExtractionContext::generic(),
                &PipelineParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(forward.entities, reversed.entities);
        assert_eq!(forward.relationships, reversed.relationships);
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let merged = extractor()
            .extract_corpus(Vec::new(), &ExtractionContext::generic(), &PipelineParams::default())
            .await
            .unwrap();
        assert!(merged.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_context_fails_before_spawning() {
        let context = ExtractionContext::new("  ");
        let err = extractor()
            .extract_corpus(chunks(&["Alice"]), &context, &PipelineParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OntoError::InvalidInput(_)));
    }
}
