//! Repository port traits for the two data stores.
//!
//! The truth store is the branchable system of record: entities, the
//! append-only event log, universes, quests, snapshots. The graph store
//! holds the relationship web and answers universe-scoped queries under
//! the lazy-divergence rule. Both have in-memory implementations for
//! tests and production adapters (SQLite, Neo4j).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ttasolo_domain::{
    Entity, EntityId, EventId, GameEvent, Quest, QuestId, Relationship, RelationshipId, Universe,
    UniverseId,
};
use uuid::Uuid;

use super::error::RepoError;

/// A consistent snapshot of one universe, valid up to a given event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Identified by the event id up to which it is valid.
    pub valid_to_event: EventId,
    pub universe_id: UniverseId,
    pub entities: Vec<Entity>,
}

/// An episodic memory attached to an NPC in the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcMemory {
    pub id: Uuid,
    pub npc_id: EntityId,
    pub universe_id: UniverseId,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
}

impl NpcMemory {
    pub fn new(
        npc_id: EntityId,
        universe_id: UniverseId,
        content: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            npc_id,
            universe_id,
            content: content.into(),
            recorded_at,
        }
    }
}

/// Staged multi-step write against the truth store.
///
/// Writes accumulate in the transaction and hit the store only at
/// `commit`; a failed commit or an explicit `discard` leaves the store
/// untouched. The event log never contains aborted events.
#[async_trait]
pub trait TruthTransaction: Send {
    fn stage_entity(&mut self, entity: Entity);
    fn stage_event(&mut self, event: GameEvent);
    fn stage_quest(&mut self, quest: Quest);
    async fn commit(self: Box<Self>) -> Result<(), RepoError>;
    fn discard(self: Box<Self>);
}

/// The branchable system of record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TruthRepo: Send + Sync {
    // Entities
    async fn load_entity(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, RepoError>;
    async fn find_entity_by_name(
        &self,
        universe_id: UniverseId,
        name: &str,
    ) -> Result<Option<Entity>, RepoError>;
    /// Optimistic save. The stored version must match the caller's copy;
    /// on success the returned entity carries the bumped version. Saving
    /// the same (id, version) twice is a no-op on the second call.
    async fn save_entity(&self, entity: &Entity) -> Result<Entity, RepoError>;
    async fn list_entities(&self, universe_id: UniverseId) -> Result<Vec<Entity>, RepoError>;

    // Event log
    async fn append_event(&self, event: &GameEvent) -> Result<(), RepoError>;
    /// Events of a universe in append order, optionally bounded to the
    /// most recent `limit`.
    async fn list_events(
        &self,
        universe_id: UniverseId,
        limit: Option<usize>,
    ) -> Result<Vec<GameEvent>, RepoError>;

    // Universes and branching
    async fn get_universe(&self, id: UniverseId) -> Result<Option<Universe>, RepoError>;
    async fn save_universe(&self, universe: &Universe) -> Result<(), RepoError>;
    async fn list_universes(&self) -> Result<Vec<Universe>, RepoError>;
    /// Create a branch for `child`, copying the parent's entity and quest
    /// state at the fork point. The child is visible to queries as soon
    /// as this returns.
    async fn create_branch(&self, child: &Universe) -> Result<(), RepoError>;
    /// Materialize the state of a universe as of a given event.
    async fn snapshot_at(
        &self,
        universe_id: UniverseId,
        event_id: EventId,
    ) -> Result<Snapshot, RepoError>;

    // Quests
    async fn load_quest(
        &self,
        universe_id: UniverseId,
        id: QuestId,
    ) -> Result<Option<Quest>, RepoError>;
    async fn save_quest(&self, quest: &Quest) -> Result<(), RepoError>;
    async fn list_quests(&self, universe_id: UniverseId) -> Result<Vec<Quest>, RepoError>;

    // Transactions
    async fn begin(&self) -> Result<Box<dyn TruthTransaction>, RepoError>;
}

/// The relationship web with universe-scoped, variant-aware reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphRepo: Send + Sync {
    /// The graph resolves ancestor chains itself; universes are
    /// registered when created.
    async fn register_universe(&self, universe: &Universe) -> Result<(), RepoError>;

    async fn upsert_node(&self, entity: &Entity) -> Result<(), RepoError>;
    /// Compensating removal for partially persisted creations. Ordinary
    /// gameplay never deletes nodes.
    async fn delete_node(&self, universe_id: UniverseId, id: EntityId) -> Result<(), RepoError>;

    /// Resolve an entity under the lazy-divergence rule: a node in the
    /// queried universe wins; otherwise a variant of the canonical in
    /// this universe wins; otherwise the canonical from the nearest
    /// ancestor is returned.
    async fn get_node(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, RepoError>;

    async fn create_relationship(&self, relationship: &Relationship) -> Result<(), RepoError>;
    async fn delete_relationship(&self, id: RelationshipId) -> Result<(), RepoError>;

    async fn query_entities_at_location(
        &self,
        universe_id: UniverseId,
        location_id: EntityId,
    ) -> Result<Vec<Entity>, RepoError>;
    /// All edges touching the entity in this universe.
    async fn query_relationships(
        &self,
        universe_id: UniverseId,
        entity_id: EntityId,
    ) -> Result<Vec<Relationship>, RepoError>;

    /// Cosine-similarity lookup over description embeddings.
    async fn query_by_vector(
        &self,
        universe_id: UniverseId,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(Entity, f32)>, RepoError>;
    async fn set_embedding(
        &self,
        universe_id: UniverseId,
        id: EntityId,
        embedding: Vec<f32>,
    ) -> Result<(), RepoError>;

    // NPC memories
    async fn record_memory(&self, memory: &NpcMemory) -> Result<(), RepoError>;
    async fn memories_for(
        &self,
        npc_id: EntityId,
        limit: usize,
    ) -> Result<Vec<NpcMemory>, RepoError>;
}
