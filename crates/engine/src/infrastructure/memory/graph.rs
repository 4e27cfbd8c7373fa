//! In-memory graph store.
//!
//! Nodes and edges are universe-local; forks duplicate nothing. Reads
//! honour the lazy-divergence rule: a universe sees its own nodes, then
//! variants it created of canonical entities, then the canonicals of its
//! ancestors. Variant shadowing is driven by VARIANT_OF edges.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ttasolo_domain::{
    Entity, EntityId, Relationship, RelationshipId, RelationshipKind, Universe, UniverseId,
};

use crate::infrastructure::ports::{GraphRepo, NpcMemory, RepoError};

#[derive(Default)]
struct GraphTables {
    /// Child universe -> parent universe.
    parents: DashMap<UniverseId, Option<UniverseId>>,
    nodes: DashMap<(UniverseId, EntityId), Entity>,
    edges: DashMap<RelationshipId, Relationship>,
    /// (universe, canonical id) -> variant id, maintained from VARIANT_OF
    /// edges.
    variants: DashMap<(UniverseId, EntityId), EntityId>,
    embeddings: DashMap<(UniverseId, EntityId), Vec<f32>>,
    memories: DashMap<EntityId, Vec<NpcMemory>>,
}

/// In-memory [`GraphRepo`].
#[derive(Clone, Default)]
pub struct InMemoryGraphRepo {
    tables: Arc<GraphTables>,
}

impl InMemoryGraphRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// The universe and its ancestors, nearest first.
    fn chain(&self, universe_id: UniverseId) -> Vec<UniverseId> {
        let mut chain = vec![universe_id];
        let mut cursor = universe_id;
        while let Some(parent) = self.tables.parents.get(&cursor).and_then(|p| *p) {
            // A parent cycle would be a corrupted store; stop rather than
            // spin.
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            cursor = parent;
        }
        chain
    }

    /// Map a variant id back to its canonical origin, if any.
    fn canonical_of(&self, universe_id: UniverseId, id: EntityId) -> EntityId {
        self.tables
            .edges
            .iter()
            .find(|kv| {
                let e = kv.value();
                e.kind == RelationshipKind::VariantOf
                    && e.universe_id == universe_id
                    && e.from == id
            })
            .map(|kv| kv.value().to)
            .unwrap_or(id)
    }

    /// Resolve under the variant rule, walking the fork chain nearest
    /// first. At each hop a variant created there shadows the canonical
    /// for that universe and all of its descendants.
    fn resolve(&self, universe_id: UniverseId, id: EntityId) -> Option<Entity> {
        for ancestor in self.chain(universe_id) {
            if let Some(variant_id) = self.tables.variants.get(&(ancestor, id)) {
                if let Some(node) = self.tables.nodes.get(&(ancestor, *variant_id)) {
                    return Some(node.clone());
                }
            }
            if let Some(node) = self.tables.nodes.get(&(ancestor, id)) {
                return Some(node.clone());
            }
        }
        None
    }
}

#[async_trait]
impl GraphRepo for InMemoryGraphRepo {
    async fn register_universe(&self, universe: &Universe) -> Result<(), RepoError> {
        self.tables
            .parents
            .insert(universe.id, universe.parent_id);
        Ok(())
    }

    async fn upsert_node(&self, entity: &Entity) -> Result<(), RepoError> {
        self.tables
            .nodes
            .insert((entity.universe_id, entity.id), entity.clone());
        Ok(())
    }

    async fn delete_node(&self, universe_id: UniverseId, id: EntityId) -> Result<(), RepoError> {
        self.tables.nodes.remove(&(universe_id, id));
        self.tables.embeddings.remove(&(universe_id, id));
        let orphaned: Vec<RelationshipId> = self
            .tables
            .edges
            .iter()
            .filter(|kv| {
                let e = kv.value();
                e.universe_id == universe_id && (e.from == id || e.to == id)
            })
            .map(|kv| *kv.key())
            .collect();
        for edge_id in orphaned {
            self.tables.edges.remove(&edge_id);
        }
        Ok(())
    }

    async fn get_node(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, RepoError> {
        Ok(self.resolve(universe_id, id))
    }

    async fn create_relationship(&self, relationship: &Relationship) -> Result<(), RepoError> {
        // Functional kinds replace any previous edge of that kind leaving
        // the same entity in the same universe.
        if relationship.kind.is_functional() {
            let replaced: Vec<RelationshipId> = self
                .tables
                .edges
                .iter()
                .filter(|kv| {
                    let e = kv.value();
                    e.universe_id == relationship.universe_id
                        && e.from == relationship.from
                        && e.kind == relationship.kind
                })
                .map(|kv| *kv.key())
                .collect();
            for edge_id in replaced {
                self.tables.edges.remove(&edge_id);
            }
        }

        if relationship.kind == RelationshipKind::VariantOf {
            // Reject cycles: the canonical must not itself be a variant of
            // the new variant anywhere in the chain.
            let canonical =
                self.canonical_of(relationship.universe_id, relationship.to);
            if canonical == relationship.from {
                return Err(RepoError::constraint(
                    "VARIANT_OF edges must stay acyclic",
                ));
            }
            self.tables.variants.insert(
                (relationship.universe_id, relationship.to),
                relationship.from,
            );
        }

        self.tables
            .edges
            .insert(relationship.id, relationship.clone());
        Ok(())
    }

    async fn delete_relationship(&self, id: RelationshipId) -> Result<(), RepoError> {
        if let Some((_, edge)) = self.tables.edges.remove(&id) {
            if edge.kind == RelationshipKind::VariantOf {
                self.tables.variants.remove(&(edge.universe_id, edge.to));
            }
        }
        Ok(())
    }

    async fn query_entities_at_location(
        &self,
        universe_id: UniverseId,
        location_id: EntityId,
    ) -> Result<Vec<Entity>, RepoError> {
        let target = self.canonical_of(universe_id, location_id);
        let chain = self.chain(universe_id);

        // Nearest universe wins per occupant: a LOCATED_IN edge written in
        // the fork shadows the parent's edge for the same entity.
        let mut seen: Vec<EntityId> = Vec::new();
        let mut occupants: Vec<Entity> = Vec::new();
        for ancestor in &chain {
            let edges: Vec<Relationship> = self
                .tables
                .edges
                .iter()
                .filter(|kv| {
                    let e = kv.value();
                    e.universe_id == *ancestor && e.kind == RelationshipKind::LocatedIn
                })
                .map(|kv| kv.value().clone())
                .collect();
            for edge in edges {
                let from = self.canonical_of(edge.universe_id, edge.from);
                if seen.contains(&from) {
                    continue;
                }
                seen.push(from);
                if self.canonical_of(edge.universe_id, edge.to) == target {
                    if let Some(entity) = self.resolve(universe_id, from) {
                        occupants.push(entity);
                    }
                }
            }
        }
        occupants.sort_by_key(|e| e.id);
        Ok(occupants)
    }

    async fn query_relationships(
        &self,
        universe_id: UniverseId,
        entity_id: EntityId,
    ) -> Result<Vec<Relationship>, RepoError> {
        let subject = self.canonical_of(universe_id, entity_id);
        let chain = self.chain(universe_id);

        let mut seen: Vec<(EntityId, RelationshipKind, EntityId)> = Vec::new();
        let mut result: Vec<Relationship> = Vec::new();
        for ancestor in &chain {
            let edges: Vec<Relationship> = self
                .tables
                .edges
                .iter()
                .filter(|kv| kv.value().universe_id == *ancestor)
                .map(|kv| kv.value().clone())
                .collect();
            for edge in edges {
                let from = self.canonical_of(edge.universe_id, edge.from);
                let to = self.canonical_of(edge.universe_id, edge.to);
                if from != subject && to != subject {
                    continue;
                }
                // Functional kinds shadow by origin entity; others by the
                // full triple.
                let key = if edge.kind.is_functional() {
                    (from, edge.kind, EntityId::from_uuid(uuid::Uuid::nil()))
                } else {
                    (from, edge.kind, to)
                };
                if seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                result.push(edge);
            }
        }
        result.sort_by_key(|e| e.id);
        Ok(result)
    }

    async fn query_by_vector(
        &self,
        universe_id: UniverseId,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(Entity, f32)>, RepoError> {
        let chain = self.chain(universe_id);
        let mut seen: Vec<EntityId> = Vec::new();
        let mut scored: Vec<(Entity, f32)> = Vec::new();
        for ancestor in &chain {
            let candidates: Vec<(EntityId, Vec<f32>)> = self
                .tables
                .embeddings
                .iter()
                .filter(|kv| kv.key().0 == *ancestor)
                .map(|kv| (kv.key().1, kv.value().clone()))
                .collect();
            for (id, candidate) in candidates {
                let canonical = self.canonical_of(*ancestor, id);
                if seen.contains(&canonical) {
                    continue;
                }
                seen.push(canonical);
                if let Some(entity) = self.resolve(universe_id, canonical) {
                    scored.push((entity, cosine_similarity(embedding, &candidate)));
                }
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn set_embedding(
        &self,
        universe_id: UniverseId,
        id: EntityId,
        embedding: Vec<f32>,
    ) -> Result<(), RepoError> {
        self.tables.embeddings.insert((universe_id, id), embedding);
        Ok(())
    }

    async fn record_memory(&self, memory: &NpcMemory) -> Result<(), RepoError> {
        self.tables
            .memories
            .entry(memory.npc_id)
            .or_default()
            .push(memory.clone());
        Ok(())
    }

    async fn memories_for(
        &self,
        npc_id: EntityId,
        limit: usize,
    ) -> Result<Vec<NpcMemory>, RepoError> {
        let mut memories = self
            .tables
            .memories
            .get(&npc_id)
            .map(|m| m.clone())
            .unwrap_or_default();
        memories.sort_by_key(|m| std::cmp::Reverse(m.recorded_at));
        memories.truncate(limit);
        Ok(memories)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
