//! Semantic deduplication
//!
//! Merges entities that name the same referent with different surface
//! forms ("Microsoft", "Microsoft Corporation"). Candidates are blocked by
//! entity type, embedded in batches and compared pairwise; similar pairs
//! are unioned with a disjoint-set forest so transitive matches end up in
//! one group. Every pair inside a block is compared, which makes a second
//! run with the same threshold a no-op.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::unionfind::UnionFind;
use tracing::{debug, info, warn};

use onto_core::{EmbeddingProvider, Entity, EntityType, Relationship, PROP_ALIASES};

use crate::embedding::cosine_similarity;

/// Result of one deduplication pass
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    /// Entities folded into a canonical entity
    pub merged: usize,
    pub self_loops_dropped: usize,
    /// Why the pass did nothing, when it did nothing
    pub skipped: Option<String>,
}

impl DedupOutcome {
    fn unchanged(entities: Vec<Entity>, relationships: Vec<Relationship>, reason: &str) -> Self {
        Self {
            entities,
            relationships,
            skipped: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

/// Embedding-based entity merger; without an embedder every call is a no-op
#[derive(Clone, Default)]
pub struct SemanticDeduplicator {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl SemanticDeduplicator {
    pub fn new(embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { embedder }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.embedder.is_some()
    }

    /// Merge near-duplicate entities and remap relationship endpoints.
    ///
    /// Never fails: a missing or failing embedder returns the input unchanged.
    pub async fn deduplicate(
        &self,
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
        similarity_threshold: f32,
        batch_size: usize,
    ) -> DedupOutcome {
        let Some(embedder) = &self.embedder else {
            return DedupOutcome::unchanged(entities, relationships, "no embedding provider");
        };
        if entities.len() < 2 {
            return DedupOutcome::unchanged(entities, relationships, "fewer than two entities");
        }

        let batch_size = batch_size.max(1);
        let embeddings = match embed_all(embedder.as_ref(), &entities, batch_size).await {
            Ok(embeddings) => embeddings,
            Err(reason) => {
                warn!(reason = %reason, "Embedding failed, skipping deduplication");
                return DedupOutcome::unchanged(entities, relationships, &reason);
            }
        };

        let mut blocks: BTreeMap<&EntityType, Vec<usize>> = BTreeMap::new();
        for (i, entity) in entities.iter().enumerate() {
            blocks.entry(&entity.entity_type).or_default().push(i);
        }

        let mut forest = UnionFind::<usize>::new(entities.len());
        let mut comparisons = 0usize;

        for members in blocks.values() {
            // Tile the block so each comparison round touches two batches.
            let tiles: Vec<&[usize]> = members.chunks(batch_size).collect();
            for a in 0..tiles.len() {
                for b in a..tiles.len() {
                    for (x, &i) in tiles[a].iter().enumerate() {
                        let candidates = if a == b { &tiles[b][x + 1..] } else { tiles[b] };
                        for &j in candidates {
                            comparisons += 1;
                            if cosine_similarity(&embeddings[i], &embeddings[j])
                                >= similarity_threshold
                            {
                                forest.union(i, j);
                            }
                        }
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..entities.len() {
            groups.entry(forest.find(i)).or_default().push(i);
        }

        if groups.len() == entities.len() {
            debug!(comparisons, "No near-duplicates found");
            let (relationships, self_loops_dropped) =
                remap_relationships(relationships, &HashMap::new());
            return DedupOutcome {
                entities,
                relationships,
                self_loops_dropped,
                ..Default::default()
            };
        }

        let mut canonical_of: Vec<usize> = (0..entities.len()).collect();
        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut aliases: HashMap<usize, BTreeSet<String>> = HashMap::new();

        for members in groups.values().filter(|m| m.len() > 1) {
            let canonical = members
                .iter()
                .copied()
                .reduce(|best, i| if prefer(&entities[i], &entities[best]) { i } else { best })
                .unwrap_or(members[0]);

            let names = aliases.entry(canonical).or_default();
            for &i in members {
                canonical_of[i] = canonical;
                if i == canonical {
                    continue;
                }
                if entities[i].text != entities[canonical].text {
                    names.insert(entities[i].text.clone());
                }
                names.extend(existing_aliases(&entities[i]));
                if entities[i].id != entities[canonical].id {
                    id_map.insert(entities[i].id.clone(), entities[canonical].id.clone());
                }
            }
        }

        let merged = canonical_of
            .iter()
            .enumerate()
            .filter(|(i, c)| i != *c)
            .count();

        let entities: Vec<Entity> = entities
            .into_iter()
            .enumerate()
            .filter(|(i, _)| canonical_of[*i] == *i)
            .map(|(i, mut entity)| {
                if let Some(names) = aliases.remove(&i) {
                    let mut all: BTreeSet<String> = existing_aliases(&entity).collect();
                    all.extend(names);
                    all.remove(&entity.text);
                    if !all.is_empty() {
                        entity
                            .properties
                            .insert(PROP_ALIASES.to_string(), serde_json::json!(all));
                    }
                }
                entity
            })
            .collect();

        let (relationships, self_loops_dropped) = remap_relationships(relationships, &id_map);

        info!(
            merged,
            comparisons,
            remaining = entities.len(),
            self_loops_dropped,
            "Semantic deduplication complete"
        );

        DedupOutcome {
            entities,
            relationships,
            merged,
            self_loops_dropped,
            skipped: None,
        }
    }
}

/// Whether `a` should be canonical over `b`: higher confidence, then
/// earlier span, then smaller id
fn prefer(a: &Entity, b: &Entity) -> bool {
    let start = |e: &Entity| e.source_span.map_or(usize::MAX, |s| s.start);
    a.confidence
        .total_cmp(&b.confidence)
        .then_with(|| start(b).cmp(&start(a)))
        .then_with(|| b.id.cmp(&a.id))
        .is_gt()
}

fn existing_aliases(entity: &Entity) -> impl Iterator<Item = String> + '_ {
    entity
        .properties
        .get(PROP_ALIASES)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
}

async fn embed_all(
    embedder: &dyn EmbeddingProvider,
    entities: &[Entity],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, String> {
    let texts: Vec<String> = entities.iter().map(|e| e.text.clone()).collect();
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let vectors = embedder
            .embed_batch(batch)
            .await
            .map_err(|e| e.to_string())?;
        if vectors.len() != batch.len() {
            return Err(format!(
                "embedding provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            ));
        }
        embeddings.extend(vectors);
    }

    Ok(embeddings)
}

/// Point endpoints at canonical ids, drop self-loops and collapse parallel
/// edges of the same type (keeping the most confident)
fn remap_relationships(
    relationships: Vec<Relationship>,
    id_map: &HashMap<String, String>,
) -> (Vec<Relationship>, usize) {
    let mut kept: Vec<Relationship> = Vec::with_capacity(relationships.len());
    let mut position: HashMap<(String, String, String), usize> = HashMap::new();
    let mut self_loops = 0;

    for mut rel in relationships {
        if let Some(canonical) = id_map.get(&rel.source_id) {
            rel.source_id = canonical.clone();
        }
        if let Some(canonical) = id_map.get(&rel.target_id) {
            rel.target_id = canonical.clone();
        }
        if rel.is_self_loop() {
            self_loops += 1;
            continue;
        }

        let key = (
            rel.source_id.clone(),
            rel.target_id.clone(),
            rel.relationship_type.clone(),
        );
        match position.get(&key) {
            Some(&at) => {
                if rel.confidence > kept[at].confidence {
                    let id = kept[at].id.clone();
                    kept[at] = Relationship { id, ..rel };
                }
            }
            None => {
                position.insert(key, kept.len());
                kept.push(rel);
            }
        }
    }

    (kept, self_loops)
}
