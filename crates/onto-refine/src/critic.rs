//! Ontology critic
//!
//! Scores a finished ontology along six independent dimensions plus a
//! weighted `overall`. Every dimension lies in [0, 1] and higher is
//! better. The critic never mutates its input and never fails: structural
//! defects are reported as weaknesses.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use onto_core::{
    CriticConfig, CriticScore, Entity, EntityType, ExtractionContext, Finding, FindingCategory,
    Ontology,
};
use onto_extractor::{DomainPatterns, HashedNgramEmbedder, PatternLibrary};

/// Share of completeness coming from expected-type coverage; the rest is
/// entity participation in relationships
const COVERAGE_WEIGHT: f32 = 0.7;

/// Coherence credit for an edge type the domain has no matcher for
const UNKNOWN_EDGE_CREDIT: f32 = 0.5;

/// Structural counts gathered in one pass over the ontology
#[derive(Debug, Default)]
struct Structure {
    unique_ids: usize,
    relationships: usize,
    duplicate_ids: usize,
    conflicting_types: usize,
    near_duplicates: usize,
    dangling: usize,
    self_loops: usize,
    ambiguous_spans: usize,
    fragments: usize,
}

impl Structure {
    fn consistency_issues(&self) -> usize {
        self.duplicate_ids
            + self.conflicting_types
            + self.near_duplicates
            + self.dangling
            + self.self_loops
    }
}

/// Scores ontologies against the pattern library's domain expectations
#[derive(Debug, Clone)]
pub struct OntologyCritic {
    library: Arc<PatternLibrary>,
    config: CriticConfig,
}

impl OntologyCritic {
    pub fn new(library: Arc<PatternLibrary>, config: CriticConfig) -> Self {
        Self { library, config }
    }

    pub fn config(&self) -> &CriticConfig {
        &self.config
    }

    /// Score an ontology extracted from `source_text` under `context`
    pub fn evaluate(
        &self,
        ontology: &Ontology,
        context: &ExtractionContext,
        source_text: &str,
    ) -> CriticScore {
        let domain = context.domain_label();
        let patterns = self.library.compiled_matchers(&domain).ok();
        let structure = inspect(ontology);

        let words = source_text.split_whitespace().count();
        let per_100_words = if words == 0 {
            0.0
        } else {
            ontology.entities.len() as f32 * 100.0 / words as f32
        };

        let (coverage, missing_types) = type_coverage(ontology, patterns);
        let participation = participation(ontology);

        let mut score = CriticScore {
            completeness: COVERAGE_WEIGHT * coverage + (1.0 - COVERAGE_WEIGHT) * participation,
            consistency: consistency(ontology, &structure),
            clarity: clarity(ontology, &structure),
            granularity: self.granularity(per_100_words),
            relationship_coherence: coherence(ontology, patterns),
            domain_alignment: domain_alignment(ontology),
            ..Default::default()
        };
        score.overall = self.overall(&score);

        self.attach_feedback(&mut score, &structure, per_100_words, &missing_types);

        score.metadata = BTreeMap::from([
            ("domain".to_string(), json!(domain)),
            ("word_count".to_string(), json!(words)),
            ("entities_per_100_words".to_string(), json!(per_100_words)),
            ("type_coverage".to_string(), json!(coverage)),
            ("participation".to_string(), json!(participation)),
            ("unique_entity_ids".to_string(), json!(structure.unique_ids)),
            ("duplicate_ids".to_string(), json!(structure.duplicate_ids)),
            ("conflicting_types".to_string(), json!(structure.conflicting_types)),
            ("near_duplicates".to_string(), json!(structure.near_duplicates)),
            ("dangling_relationships".to_string(), json!(structure.dangling)),
            ("self_loops".to_string(), json!(structure.self_loops)),
            ("ambiguous_spans".to_string(), json!(structure.ambiguous_spans)),
            ("density".to_string(), json!(ontology.density())),
        ]);

        debug!(
            domain = %domain,
            overall = score.overall,
            weaknesses = score.weaknesses.len(),
            "Ontology evaluated"
        );
        score
    }

    /// 1.0 inside the configured band, falling off proportionally outside it
    fn granularity(&self, per_100_words: f32) -> f32 {
        let (low, high) = (self.config.granularity_min, self.config.granularity_max);
        if per_100_words <= 0.0 {
            0.0
        } else if per_100_words < low {
            per_100_words / low
        } else if per_100_words > high {
            high / per_100_words
        } else {
            1.0
        }
    }

    fn overall(&self, score: &CriticScore) -> f32 {
        let weights = self.config.weights.as_array();
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f32 = score
            .dimensions()
            .iter()
            .zip(weights)
            .map(|((_, value), weight)| value * weight)
            .sum();
        (weighted / total).clamp(0.0, 1.0)
    }

    fn attach_feedback(
        &self,
        score: &mut CriticScore,
        structure: &Structure,
        per_100_words: f32,
        missing_types: &[EntityType],
    ) {
        let weak = self.config.weakness_threshold;

        for (name, value) in score.dimensions() {
            if value >= self.config.strength_threshold {
                score.strengths.push(format!("{name} is strong ({value:.2})"));
            }
        }

        let severity = |value: f32| if weak > 0.0 { (weak - value) / weak } else { 0.0 };
        let mut findings = Vec::new();

        if score.completeness < weak {
            let detail = if missing_types.is_empty() {
                "few entities take part in relationships".to_string()
            } else {
                let names: Vec<&str> = missing_types.iter().map(EntityType::as_str).collect();
                format!("expected types missing: {}", names.join(", "))
            };
            findings.push(Finding::new(
                FindingCategory::LowCompleteness,
                severity(score.completeness),
                format!("completeness {:.2}: {detail}", score.completeness),
            ));
        }
        if score.consistency < weak {
            findings.push(Finding::new(
                FindingCategory::LowConsistency,
                severity(score.consistency),
                format!(
                    "consistency {:.2}: {} near-duplicate entities",
                    score.consistency, structure.near_duplicates
                ),
            ));
        }
        if score.clarity < weak {
            findings.push(Finding::new(
                FindingCategory::LowClarity,
                severity(score.clarity),
                format!(
                    "clarity {:.2}: {} overlapping spans, {} fragments",
                    score.clarity, structure.ambiguous_spans, structure.fragments
                ),
            ));
        }
        if score.granularity < weak && per_100_words > 0.0 {
            let category = if per_100_words < self.config.granularity_min {
                FindingCategory::TooSparse
            } else {
                FindingCategory::TooDense
            };
            findings.push(Finding::new(
                category,
                severity(score.granularity),
                format!(
                    "granularity {:.2}: {per_100_words:.1} entities per 100 words",
                    score.granularity
                ),
            ));
        }
        if score.relationship_coherence < weak {
            let category = if structure.relationships == 0 {
                FindingCategory::MissingRelationships
            } else {
                FindingCategory::LowRelationshipCoherence
            };
            findings.push(Finding::new(
                category,
                severity(score.relationship_coherence),
                format!("relationship coherence {:.2}", score.relationship_coherence),
            ));
        }
        if score.domain_alignment < weak {
            findings.push(Finding::new(
                FindingCategory::LowDomainAlignment,
                severity(score.domain_alignment),
                format!(
                    "domain alignment {:.2}: most entities come from generic patterns",
                    score.domain_alignment
                ),
            ));
        }

        // Structural defects are always reported, whatever the scores.
        let structural = [
            (
                FindingCategory::DuplicateIds,
                structure.duplicate_ids,
                "entities share an id",
            ),
            (
                FindingCategory::ConflictingTypes,
                structure.conflicting_types,
                "surface forms carry conflicting types",
            ),
            (
                FindingCategory::DanglingRelationship,
                structure.dangling,
                "relationships point to missing entities",
            ),
            (
                FindingCategory::SelfLoop,
                structure.self_loops,
                "relationships are self-loops",
            ),
        ];
        for (category, count, what) in structural {
            if count > 0 {
                findings.push(Finding::new(category, 1.0, format!("{count} {what}")));
            }
        }

        findings.sort_by(|a, b| {
            b.severity
                .total_cmp(&a.severity)
                .then_with(|| a.category.cmp(&b.category))
        });

        score.weaknesses = findings.iter().map(|f| f.message.clone()).collect();
        score.recommendations = findings
            .iter()
            .map(|f| recommendation(f.category).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        score.findings = findings;
    }
}

fn recommendation(category: FindingCategory) -> &'static str {
    match category {
        FindingCategory::LowCompleteness | FindingCategory::TooSparse => {
            "lower the entity confidence floor to admit more candidates"
        }
        FindingCategory::TooDense => "raise the entity confidence floor to drop weak candidates",
        FindingCategory::LowConsistency | FindingCategory::DuplicateIds => {
            "merge near-duplicate entities more aggressively"
        }
        FindingCategory::LowClarity | FindingCategory::ConflictingTypes => {
            "resolve overlapping spans across entity types"
        }
        FindingCategory::MissingRelationships | FindingCategory::LowRelationshipCoherence => {
            "widen the proximity window for relationship inference"
        }
        FindingCategory::LowDomainAlignment => {
            "prefer domain-specific matches over generic ones"
        }
        FindingCategory::DanglingRelationship | FindingCategory::SelfLoop => {
            "re-run integrity enforcement on relationships"
        }
    }
}

fn inspect(ontology: &Ontology) -> Structure {
    let mut structure = Structure {
        unique_ids: ontology.unique_entity_ids().len(),
        relationships: ontology.relationships.len(),
        duplicate_ids: ontology.entities.len() - ontology.unique_entity_ids().len(),
        dangling: ontology.dangling_relationships().len(),
        self_loops: ontology.self_loops().len(),
        ..Default::default()
    };

    let mut types_by_text: HashMap<String, BTreeSet<&EntityType>> = HashMap::new();
    let mut ids_by_form: HashMap<(&EntityType, String), BTreeSet<&str>> = HashMap::new();
    for entity in &ontology.entities {
        types_by_text
            .entry(entity.normalized_text())
            .or_default()
            .insert(&entity.entity_type);
        ids_by_form
            .entry((&entity.entity_type, HashedNgramEmbedder::normalize(&entity.text)))
            .or_default()
            .insert(entity.id.as_str());
        if entity.text.trim().chars().count() <= 1 {
            structure.fragments += 1;
        }
    }
    structure.conflicting_types = types_by_text.values().map(|t| t.len() - 1).sum();
    structure.near_duplicates = ids_by_form
        .values()
        .map(|ids| ids.len().saturating_sub(1))
        .sum();
    structure.ambiguous_spans = cross_type_overlaps(&ontology.entities);
    structure
}

/// Number of entities whose span overlaps an entity of another type
fn cross_type_overlaps(entities: &[Entity]) -> usize {
    let mut spanned: Vec<(usize, usize, usize, &EntityType)> = entities
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.source_span.map(|s| (s.start, s.end, i, &e.entity_type)))
        .collect();
    spanned.sort_by_key(|(start, end, i, _)| (*start, *end, *i));

    let mut flagged = BTreeSet::new();
    for (a, &(_, end_a, i, type_a)) in spanned.iter().enumerate() {
        for &(start_b, _, j, type_b) in &spanned[a + 1..] {
            if start_b >= end_a {
                break;
            }
            if type_a != type_b {
                flagged.insert(i);
                flagged.insert(j);
            }
        }
    }
    flagged.len()
}

fn type_coverage(ontology: &Ontology, patterns: Option<&DomainPatterns>) -> (f32, Vec<EntityType>) {
    if ontology.entities.is_empty() {
        let expected = patterns.map(|p| p.expected_types().to_vec()).unwrap_or_default();
        return (0.0, expected);
    }
    let expected = match patterns {
        Some(p) if !p.expected_types().is_empty() => p.expected_types(),
        _ => return (1.0, Vec::new()),
    };

    let present: BTreeSet<&EntityType> = ontology.entities.iter().map(|e| &e.entity_type).collect();
    let missing: Vec<EntityType> = expected
        .iter()
        .filter(|t| !present.contains(t))
        .cloned()
        .collect();
    let covered = expected.len() - missing.len();
    (covered as f32 / expected.len() as f32, missing)
}

/// Share of unique entities touched by at least one resolvable relationship
fn participation(ontology: &Ontology) -> f32 {
    let ids = ontology.unique_entity_ids();
    if ids.is_empty() {
        return 0.0;
    }
    let touched: BTreeSet<&str> = ontology
        .relationships
        .iter()
        .flat_map(|r| [r.source_id.as_str(), r.target_id.as_str()])
        .filter(|id| ids.contains(id))
        .collect();
    touched.len() as f32 / ids.len() as f32
}

fn consistency(ontology: &Ontology, structure: &Structure) -> f32 {
    let size = ontology.entities.len() + ontology.relationships.len();
    if size == 0 {
        return 1.0;
    }
    (1.0 - structure.consistency_issues() as f32 / size as f32).clamp(0.0, 1.0)
}

fn clarity(ontology: &Ontology, structure: &Structure) -> f32 {
    let n = ontology.entities.len();
    if n == 0 {
        return 1.0;
    }
    let unclear = (structure.ambiguous_spans + structure.fragments).min(n);
    1.0 - unclear as f32 / n as f32
}

/// Mean per-edge credit: compatible 1, unknown edge type 0.5, incompatible
/// or dangling 0. No edges scores 0.
fn coherence(ontology: &Ontology, patterns: Option<&DomainPatterns>) -> f32 {
    if ontology.relationships.is_empty() {
        return 0.0;
    }
    let by_id: HashMap<&str, &Entity> = ontology
        .entities
        .iter()
        .rev()
        .map(|e| (e.id.as_str(), e))
        .collect();

    let total: f32 = ontology
        .relationships
        .iter()
        .map(|rel| {
            let (Some(source), Some(target)) = (
                by_id.get(rel.source_id.as_str()),
                by_id.get(rel.target_id.as_str()),
            ) else {
                return 0.0;
            };
            if rel.is_self_loop() {
                return 0.0;
            }
            match patterns.and_then(|p| {
                p.relation_compatible(
                    &rel.relationship_type,
                    &source.entity_type,
                    &target.entity_type,
                )
            }) {
                Some(true) => 1.0,
                Some(false) => 0.0,
                None => UNKNOWN_EDGE_CREDIT,
            }
        })
        .sum();
    total / ontology.relationships.len() as f32
}

fn domain_alignment(ontology: &Ontology) -> f32 {
    if ontology.entities.is_empty() {
        return 0.0;
    }
    let specific = ontology
        .entities
        .iter()
        .filter(|e| e.is_domain_specific())
        .count();
    specific as f32 / ontology.entities.len() as f32
}
