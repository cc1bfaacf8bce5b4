//! Id allocation and merging of partial ontologies
//!
//! Concurrent extraction tasks each own an `IdAllocator` with a distinct
//! namespace, so ids never collide while tasks run. `merge_partials` then
//! folds the partial results into one ontology whose content does not
//! depend on the order in which the partials arrive.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use onto_core::{Entity, EntityType, Ontology, OntologyMetadata, Relationship, PROP_ALIASES};
use tracing::debug;

/// Per-call id source; never shared between concurrent tasks
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    namespace: String,
    next_entity: usize,
    next_relationship: usize,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator whose ids are prefixed, e.g. `c3:e1`
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let namespace = if namespace.is_empty() {
            namespace
        } else {
            format!("{namespace}:")
        };
        Self {
            namespace,
            ..Self::default()
        }
    }

    pub fn entity_id(&mut self) -> String {
        self.next_entity += 1;
        format!("{}e{}", self.namespace, self.next_entity)
    }

    pub fn relationship_id(&mut self) -> String {
        self.next_relationship += 1;
        format!("{}r{}", self.namespace, self.next_relationship)
    }

    pub fn entities_issued(&self) -> usize {
        self.next_entity
    }
}

type EntityKey = (EntityType, String);

/// Total order picking the representative of a merge group
fn representative_order(a: &Entity, b: &Entity) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| span_start(a).cmp(&span_start(b)))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.id.cmp(&b.id))
}

fn span_start(entity: &Entity) -> usize {
    entity.source_span.map_or(usize::MAX, |s| s.start)
}

/// Merge partial ontologies into one.
///
/// Entities with the same type and normalized surface form collapse into
/// one; ids are reassigned canonically by sorted key; relationships are
/// remapped, deduplicated per (source, target, type) and self-loops dropped.
pub fn merge_partials(partials: Vec<Ontology>) -> Ontology {
    if partials.is_empty() {
        return Ontology::default();
    }
    let partial_count = partials.len();

    let mut groups: BTreeMap<EntityKey, Vec<Entity>> = BTreeMap::new();
    let mut membership: HashMap<(usize, String), EntityKey> = HashMap::new();

    for (index, partial) in partials.iter().enumerate() {
        for entity in &partial.entities {
            let key = (entity.entity_type.clone(), entity.normalized_text());
            membership.insert((index, entity.id.clone()), key.clone());
            groups.entry(key).or_default().push(entity.clone());
        }
    }

    let mut key_to_id: BTreeMap<EntityKey, String> = BTreeMap::new();
    let mut entities = Vec::with_capacity(groups.len());

    for (n, (key, mut members)) in groups.into_iter().enumerate() {
        members.sort_by(representative_order);
        let aliases: BTreeSet<String> = members
            .iter()
            .map(|m| m.text.clone())
            .filter(|t| *t != members[0].text)
            .collect();

        let id = format!("e{}", n + 1);
        let mut merged = members.swap_remove(0);
        merged.id = id.clone();
        if !aliases.is_empty() {
            merged
                .properties
                .insert(PROP_ALIASES.to_string(), serde_json::json!(aliases));
        }

        key_to_id.insert(key, id);
        entities.push(merged);
    }

    let mut edges: BTreeMap<(String, String, String), Relationship> = BTreeMap::new();
    let mut dropped = 0usize;

    for (index, partial) in partials.iter().enumerate() {
        for rel in &partial.relationships {
            let source = membership
                .get(&(index, rel.source_id.clone()))
                .and_then(|k| key_to_id.get(k));
            let target = membership
                .get(&(index, rel.target_id.clone()))
                .and_then(|k| key_to_id.get(k));

            let (Some(source), Some(target)) = (source, target) else {
                dropped += 1;
                continue;
            };
            if source == target {
                dropped += 1;
                continue;
            }

            let mut remapped = rel.clone();
            remapped.source_id = source.clone();
            remapped.target_id = target.clone();

            let key = (
                source.clone(),
                target.clone(),
                remapped.relationship_type.clone(),
            );
            match edges.get(&key) {
                Some(existing) if edge_order(existing, &remapped) != Ordering::Greater => {}
                _ => {
                    edges.insert(key, remapped);
                }
            }
        }
    }

    let relationships: Vec<Relationship> = edges
        .into_values()
        .enumerate()
        .map(|(n, mut rel)| {
            rel.id = format!("r{}", n + 1);
            rel
        })
        .collect();

    debug!(
        partials = partial_count,
        entities = entities.len(),
        relationships = relationships.len(),
        dropped,
        "Merged partial ontologies"
    );

    let domain = partials.iter().filter_map(|p| p.domain.clone()).min();
    let metadata = merge_metadata(&partials);

    let mut merged = Ontology::new(entities, relationships);
    merged.domain = domain;
    merged.metadata = metadata;
    merged.refresh_statistics();
    merged
}

/// Preferred edge sorts first: higher confidence, then shorter distance
fn edge_order(a: &Relationship, b: &Relationship) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| {
            a.distance
                .unwrap_or(usize::MAX)
                .cmp(&b.distance.unwrap_or(usize::MAX))
        })
        .then_with(|| a.context.cmp(&b.context))
}

fn merge_metadata(partials: &[Ontology]) -> Option<OntologyMetadata> {
    let all: Vec<&OntologyMetadata> = partials.iter().filter_map(|p| p.metadata.as_ref()).collect();
    let earliest = all.iter().min_by_key(|m| m.created_at)?;

    let mut merged = (*earliest).clone();
    merged.extraction_ms = all.iter().map(|m| m.extraction_ms).sum();
    merged.backend_failures = all.iter().map(|m| m.backend_failures).sum();
    merged.omitted_spans = all.iter().map(|m| m.omitted_spans).sum();
    merged
        .extra
        .insert("partials".to_string(), serde_json::json!(partials.len()));
    Some(merged)
}
