//! Relation Extraction (RE) module
//!
//! Proposes typed relationships between entity mentions. Candidate pairs
//! are bounded by a proximity window over source offsets, so the cost is
//! linear in the number of mentions times the neighbours inside the
//! window instead of quadratic in the entity count.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use onto_core::{
    clamp_confidence, Entity, OntoError, RelationConfig, Relationship, Result,
    PROP_DOMAIN_SPECIFIC, PROP_MATCHER, PROP_MENTIONS,
};

use crate::merge::IdAllocator;
use crate::patterns::PatternLibrary;

/// Per-call inference knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationParams {
    /// Maximum distance in bytes between the starts of two mentions
    pub proximity_window: usize,
    pub max_relationships: usize,
    pub min_confidence: f32,
}

impl RelationParams {
    pub fn from_config(config: &RelationConfig) -> Self {
        Self {
            proximity_window: config.proximity_window,
            max_relationships: config.max_relationships,
            min_confidence: config.min_confidence,
        }
    }
}

impl Default for RelationParams {
    fn default() -> Self {
        Self::from_config(&RelationConfig::default())
    }
}

#[derive(Debug, Clone, Copy)]
struct Mention {
    entity: usize,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone)]
struct Proposal {
    relationship_type: String,
    confidence: f32,
    distance: usize,
    /// Offsets of the mention pair, for stable output order
    order: (usize, usize),
    context: (usize, usize),
    domain_specific: bool,
}

impl Proposal {
    fn beats(&self, other: &Proposal) -> bool {
        self.confidence
            .total_cmp(&other.confidence)
            .then_with(|| other.distance.cmp(&self.distance))
            .then_with(|| other.relationship_type.cmp(&self.relationship_type))
            .is_gt()
    }
}

/// Every occurrence of every entity with a usable span
fn collect_mentions(entities: &[Entity], text: &str) -> Vec<Mention> {
    let valid = |start: usize, end: usize| {
        start < end
            && end <= text.len()
            && text.is_char_boundary(start)
            && text.is_char_boundary(end)
    };

    let mut mentions = Vec::new();
    for (index, entity) in entities.iter().enumerate() {
        let listed: Vec<(usize, usize)> = entity
            .properties
            .get(PROP_MENTIONS)
            .and_then(|v| serde_json::from_value::<Vec<[usize; 2]>>(v.clone()).ok())
            .map(|spans| spans.into_iter().map(|[s, e]| (s, e)).collect())
            .unwrap_or_default();

        let spans = if listed.is_empty() {
            entity.source_span.map(|s| vec![(s.start, s.end)]).unwrap_or_default()
        } else {
            listed
        };

        mentions.extend(
            spans
                .into_iter()
                .filter(|&(s, e)| valid(s, e))
                .map(|(start, end)| Mention {
                    entity: index,
                    start,
                    end,
                }),
        );
    }

    mentions.sort_by_key(|m| (m.start, m.end, m.entity));
    mentions
}

/// Proposes relationships between nearby entities using the domain's
/// relationship matchers
#[derive(Debug, Clone)]
pub struct RelationshipInferencer {
    library: Arc<PatternLibrary>,
}

impl RelationshipInferencer {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self { library }
    }

    /// Infer relationships among `entities` found in `text`.
    ///
    /// Fewer than two entities is an input error. The result never
    /// contains a self-loop and holds at most one relationship per
    /// (source, target) pair.
    pub fn infer(
        &self,
        entities: &[Entity],
        text: &str,
        domain: &str,
        params: &RelationParams,
        ids: &mut IdAllocator,
    ) -> Result<Vec<Relationship>> {
        if entities.len() < 2 {
            return Err(OntoError::InvalidInput(format!(
                "relationship inference needs at least two entities, got {}",
                entities.len()
            )));
        }

        let patterns = self.library.compiled_matchers(domain)?;
        let mentions = collect_mentions(entities, text);
        let window = params.proximity_window;

        // Keyed by id so entities sharing an id yield one edge per pair.
        let mut best: HashMap<(&str, &str), Proposal> = HashMap::new();
        let mut examined = 0usize;

        for (i, first) in mentions.iter().enumerate() {
            for second in &mentions[i + 1..] {
                if second.start - first.start > window {
                    break;
                }
                examined += 1;

                if first.entity == second.entity
                    || entities[first.entity].id == entities[second.entity].id
                    || second.start < first.end
                {
                    continue;
                }

                let between = &text[first.end..second.start];
                let distance = second.start - first.end;
                let trimmed_len = between.trim().len();
                let proximity = if window == 0 {
                    1.0
                } else {
                    1.0 - 0.5 * (distance as f32 / window as f32).min(1.0)
                };

                let first_type = &entities[first.entity].entity_type;
                let second_type = &entities[second.entity].entity_type;

                for matcher in patterns.relation_matchers().values() {
                    let Some(hit) = matcher.best_match(between, first_type, second_type) else {
                        continue;
                    };

                    let coverage = if trimmed_len == 0 {
                        1.0
                    } else {
                        (hit.matched_len as f32 / trimmed_len as f32).min(1.0)
                    };
                    let confidence =
                        clamp_confidence(hit.confidence * (0.5 + 0.5 * coverage) * proximity);
                    if confidence < params.min_confidence {
                        continue;
                    }

                    let first_id = entities[first.entity].id.as_str();
                    let second_id = entities[second.entity].id.as_str();
                    let key = if hit.source_is_first {
                        (first_id, second_id)
                    } else {
                        (second_id, first_id)
                    };
                    let proposal = Proposal {
                        relationship_type: matcher.relationship_type().to_string(),
                        confidence,
                        distance,
                        order: (first.start, second.start),
                        context: (first.start, second.end),
                        domain_specific: hit.domain_specific,
                    };

                    match best.get(&key) {
                        Some(existing) if !proposal.beats(existing) => {}
                        _ => {
                            best.insert(key, proposal);
                        }
                    }
                }
            }
        }

        let mut proposals: Vec<((&str, &str), Proposal)> = best.into_iter().collect();
        let proposed = proposals.len();

        if proposals.len() > params.max_relationships {
            proposals.sort_by(|(ka, a), (kb, b)| {
                b.confidence
                    .total_cmp(&a.confidence)
                    .then_with(|| a.order.cmp(&b.order))
                    .then_with(|| ka.cmp(kb))
            });
            proposals.truncate(params.max_relationships);
        }
        proposals.sort_by(|(ka, a), (kb, b)| a.order.cmp(&b.order).then_with(|| ka.cmp(kb)));

        let relationships: Vec<Relationship> = proposals
            .into_iter()
            .map(|((source, target), p)| {
                let context = text[p.context.0..p.context.1]
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                Relationship::new(
                    ids.relationship_id(),
                    source,
                    target,
                    p.relationship_type,
                    p.confidence,
                )
                .with_distance(p.distance)
                .with_context(context)
                .with_property(PROP_MATCHER, "pattern")
                .with_property(PROP_DOMAIN_SPECIFIC, p.domain_specific)
            })
            .collect();

        debug!(
            domain,
            mentions = mentions.len(),
            examined,
            proposed,
            emitted = relationships.len(),
            "Relationship inference complete"
        );

        Ok(relationships)
    }
}

// ============================================================================
// Tests
// ============================================================================
