//! End-to-end refinement scenarios
//!
//! Author: hephaex@gmail.com

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;

use onto_core::{
    BackendError, EmbeddingProvider, EngineConfig, Entity, EntityType, ExtractionContext,
    Ontology, Relationship,
};
use onto_extractor::{HashedNgramEmbedder, SemanticDeduplicator};
use onto_refine::{RefinementMediator, RefinementPhase};

/// Embeds known surface forms to fixed vectors; anything else is orthogonal
struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    fn new(rows: &[(&str, [f32; 3])]) -> Self {
        Self {
            table: rows
                .iter()
                .map(|(text, v)| (text.to_string(), v.to_vec()))
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        Ok(texts
            .iter()
            .map(|t| self.table.get(t).cloned().unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
            .collect())
    }

    fn dimension(&self) -> usize {
        3
    }
}

fn mediator() -> RefinementMediator {
    RefinementMediator::from_config(
        &EngineConfig::default(),
        None,
        Some(Arc::new(HashedNgramEmbedder::default())),
    )
    .unwrap()
}

fn assert_integrity(ontology: &Ontology) {
    for entity in &ontology.entities {
        assert!((0.0..=1.0).contains(&entity.confidence));
    }
    for rel in &ontology.relationships {
        assert_ne!(rel.source_id, rel.target_id);
        assert!(ontology.entity(&rel.source_id).is_some());
        assert!(ontology.entity(&rel.target_id).is_some());
    }
    assert!(ontology.density() <= 1.0);
}

#[tokio::test]
async fn test_alice_works_for_acme() {
    let state = mediator()
        .run_refinement_cycle_async("Alice works for Acme Corp.", &ExtractionContext::generic())
        .await
        .unwrap();
    let ontology = &state.ontology;

    assert!(ontology.entities.len() >= 2);
    let alice = ontology
        .entities
        .iter()
        .find(|e| e.text == "Alice" && e.entity_type == EntityType::Person)
        .unwrap();
    let acme = ontology
        .entities
        .iter()
        .find(|e| e.text == "Acme Corp." && e.entity_type == EntityType::Organization)
        .unwrap();

    let employment = ontology
        .relationships
        .iter()
        .find(|r| r.relationship_type == "EMPLOYED_BY")
        .unwrap();
    assert_eq!(employment.source_id, alice.id);
    assert_eq!(employment.target_id, acme.id);
    assert!(employment.confidence > 0.0);
    assert_integrity(ontology);
}

#[tokio::test]
async fn test_empty_text() {
    let state = mediator()
        .run_refinement_cycle_async("", &ExtractionContext::generic())
        .await
        .unwrap();

    assert!(state.ontology.entities.is_empty());
    assert!(state.ontology.relationships.is_empty());
    assert_ne!(state.phase, RefinementPhase::Failed);
}

#[tokio::test]
async fn test_microsoft_variants_merge_to_one() {
    let embedder = TableEmbedder::new(&[
        ("Microsoft", [1.0, 0.0, 0.0]),
        ("Microsoft Corporation", [0.98, 0.2, 0.0]),
        ("MS", [0.95, 0.31, 0.0]),
        ("Seattle", [0.0, 1.0, 0.0]),
    ]);
    let deduplicator = SemanticDeduplicator::new(Some(Arc::new(embedder)));

    let entities = vec![
        Entity::new("e1", "Microsoft", EntityType::Organization, 0.8).with_span(0, 9),
        Entity::new("e2", "Microsoft Corporation", EntityType::Organization, 0.9).with_span(20, 41),
        Entity::new("e3", "MS", EntityType::Organization, 0.6).with_span(60, 62),
        Entity::new("e4", "Seattle", EntityType::Location, 0.8).with_span(80, 87),
    ];
    let relationships = vec![
        Relationship::new("r1", "e1", "e4", "LOCATED_IN", 0.7),
        Relationship::new("r2", "e3", "e4", "LOCATED_IN", 0.5),
        Relationship::new("r3", "e2", "e3", "RELATED_TO", 0.4),
    ];

    let outcome = deduplicator
        .deduplicate(entities, relationships, 0.85, 64)
        .await;

    let organizations: Vec<&Entity> = outcome
        .entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Organization)
        .collect();
    assert_eq!(organizations.len(), 1);
    assert_eq!(organizations[0].id, "e2");
    assert_eq!(organizations[0].text, "Microsoft Corporation");
    assert_eq!(outcome.merged, 2);

    assert!(outcome.relationships.iter().all(|r| r.source_id != r.target_id));
    let merged_away = ["e1", "e3"];
    assert!(outcome.relationships.iter().all(|r| {
        !merged_away.contains(&r.source_id.as_str()) && !merged_away.contains(&r.target_id.as_str())
    }));
    assert_eq!(outcome.relationships.len(), 1);
    assert_eq!(outcome.relationships[0].source_id, "e2");
    assert_eq!(outcome.self_loops_dropped, 1);
}

#[test]
fn test_duplicate_id_density_clamps() {
    let ontology = Ontology::new(
        vec![
            Entity::new("e1", "Acme", EntityType::Organization, 0.9),
            Entity::new("e1", "Acme Corp", EntityType::Organization, 0.8),
        ],
        vec![
            Relationship::new("r1", "e1", "e2", "RELATED_TO", 0.5),
            Relationship::new("r2", "e2", "e1", "RELATED_TO", 0.5),
        ],
    );

    assert_eq!(ontology.unique_entity_ids().len(), 1);
    assert!(ontology.density() <= 1.0);
    assert_eq!(ontology.compute_statistics().entity_count, 1);
}

#[test]
fn test_cycle_stays_within_round_budget() {
    let mut config = EngineConfig::default();
    config.refinement.max_rounds = 3;
    let mediator = RefinementMediator::from_config(&config, None, None).unwrap();

    let state = mediator
        .run_refinement_cycle(
            "Dr. Sarah Chen joined Globex Corporation in Boston on March 3, 2021 for $120,000.",
            &ExtractionContext::generic(),
        )
        .unwrap();

    assert!(state.phase.is_terminal());
    assert!(state.round <= 3);
    assert_eq!(state.history.len(), state.round);
    assert_integrity(&state.ontology);
}

#[tokio::test]
async fn test_domain_context_is_scored_against_domain() {
    let state = mediator()
        .run_refinement_cycle_async(
            "The patient was diagnosed with hypertension and treated with lisinopril 10 mg daily.",
            &ExtractionContext::new("medical"),
        )
        .await
        .unwrap();

    assert_eq!(state.ontology.domain.as_deref(), Some("medical"));
    let best = state.best_score().unwrap();
    assert_eq!(best.metadata["domain"], "medical");
    assert_integrity(&state.ontology);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_cycle_terminates_with_valid_graph(
        words in prop::collection::vec(
            prop::sample::select(vec![
                "Alice", "works", "for", "Acme", "Corp.", "in", "Boston", "hired", "Bob",
                "Smith", "on", "March", "3,", "2021", "Globex", "Corporation", "$5,000", "the",
            ]),
            0..40,
        ),
        max_rounds in 1usize..5,
    ) {
        let mut config = EngineConfig::default();
        config.refinement.max_rounds = max_rounds;
        let mediator = RefinementMediator::from_config(
            &config,
            None,
            Some(Arc::new(HashedNgramEmbedder::default())),
        )
        .unwrap();

        let text = words.join(" ");
        let state = mediator
            .run_refinement_cycle(&text, &ExtractionContext::generic())
            .unwrap();

        prop_assert!(state.phase.is_terminal());
        prop_assert!(state.round <= max_rounds);
        prop_assert_ne!(state.phase, RefinementPhase::Failed);
        for entity in &state.ontology.entities {
            prop_assert!((0.0..=1.0).contains(&entity.confidence));
        }
        for rel in &state.ontology.relationships {
            prop_assert_ne!(&rel.source_id, &rel.target_id);
            prop_assert!(state.ontology.entity(&rel.source_id).is_some());
            prop_assert!(state.ontology.entity(&rel.target_id).is_some());
        }
        prop_assert!(state.ontology.density() <= 1.0);
    }
}
