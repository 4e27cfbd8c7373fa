//! In-memory truth store.
//!
//! The reference store for tests: branchable entity state, an append-only
//! per-universe event log, optimistic versioned saves, and staged-write
//! transactions. Production runs the SQLite adapter with the same
//! contract.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ttasolo_domain::{
    Entity, EntityId, EventId, GameEvent, Quest, QuestId, Universe, UniverseId,
};

use crate::infrastructure::ports::{RepoError, Snapshot, TruthRepo, TruthTransaction};

#[derive(Default)]
struct Tables {
    entities: DashMap<(UniverseId, EntityId), Entity>,
    events: DashMap<UniverseId, Vec<GameEvent>>,
    universes: DashMap<UniverseId, Universe>,
    quests: DashMap<(UniverseId, QuestId), Quest>,
}

/// In-memory [`TruthRepo`].
#[derive(Clone, Default)]
pub struct InMemoryTruthRepo {
    tables: Arc<Tables>,
}

impl InMemoryTruthRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versioned write shared by direct saves and transaction commits.
    ///
    /// The stored version must match the incoming version (optimistic
    /// lock); the write bumps it by one. Replaying the exact same save is
    /// detected by content equality and ignored.
    fn save_versioned(tables: &Tables, entity: &Entity) -> Result<Entity, RepoError> {
        let key = (entity.universe_id, entity.id);
        // Clone out before writing: holding a map guard across the insert
        // would deadlock the shard.
        let existing = tables.entities.get(&key).map(|e| e.clone());
        match existing {
            None => {
                let mut stored = entity.clone();
                stored.version = entity.version + 1;
                tables.entities.insert(key, stored.clone());
                Ok(stored)
            }
            Some(existing) => {
                if existing.version == entity.version + 1 {
                    // Same (id, version) saved twice: no-op if the content
                    // matches what the first save produced.
                    let mut replay = entity.clone();
                    replay.version = existing.version;
                    if replay == existing {
                        return Ok(existing);
                    }
                }
                if existing.version != entity.version {
                    return Err(RepoError::VersionConflict {
                        id: entity.id.to_string(),
                        expected: entity.version,
                        found: existing.version,
                    });
                }
                let mut stored = entity.clone();
                stored.version = entity.version + 1;
                tables.entities.insert(key, stored.clone());
                Ok(stored)
            }
        }
    }

    fn append(tables: &Tables, event: &GameEvent) -> Result<(), RepoError> {
        let mut log = tables.events.entry(event.universe_id).or_default();
        if let Some(last) = log.last() {
            if event.game_time <= last.game_time {
                return Err(RepoError::constraint(format!(
                    "event timestamps must be strictly monotonic per universe ({:?} after {:?})",
                    event.game_time, last.game_time
                )));
            }
        }
        log.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl TruthRepo for InMemoryTruthRepo {
    async fn load_entity(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, RepoError> {
        Ok(self
            .tables
            .entities
            .get(&(universe_id, id))
            .map(|e| e.clone()))
    }

    async fn find_entity_by_name(
        &self,
        universe_id: UniverseId,
        name: &str,
    ) -> Result<Option<Entity>, RepoError> {
        Ok(self
            .tables
            .entities
            .iter()
            .find(|kv| kv.key().0 == universe_id && kv.value().name == name)
            .map(|kv| kv.value().clone()))
    }

    async fn save_entity(&self, entity: &Entity) -> Result<Entity, RepoError> {
        Self::save_versioned(&self.tables, entity)
    }

    async fn list_entities(&self, universe_id: UniverseId) -> Result<Vec<Entity>, RepoError> {
        let mut entities: Vec<Entity> = self
            .tables
            .entities
            .iter()
            .filter(|kv| kv.key().0 == universe_id)
            .map(|kv| kv.value().clone())
            .collect();
        entities.sort_by_key(|e| e.id);
        Ok(entities)
    }

    async fn append_event(&self, event: &GameEvent) -> Result<(), RepoError> {
        Self::append(&self.tables, event)
    }

    async fn list_events(
        &self,
        universe_id: UniverseId,
        limit: Option<usize>,
    ) -> Result<Vec<GameEvent>, RepoError> {
        let log = self
            .tables
            .events
            .get(&universe_id)
            .map(|l| l.clone())
            .unwrap_or_default();
        match limit {
            Some(n) if n < log.len() => Ok(log[log.len() - n..].to_vec()),
            _ => Ok(log),
        }
    }

    async fn get_universe(&self, id: UniverseId) -> Result<Option<Universe>, RepoError> {
        Ok(self.tables.universes.get(&id).map(|u| u.clone()))
    }

    async fn save_universe(&self, universe: &Universe) -> Result<(), RepoError> {
        self.tables.universes.insert(universe.id, universe.clone());
        Ok(())
    }

    async fn list_universes(&self) -> Result<Vec<Universe>, RepoError> {
        let mut universes: Vec<Universe> = self
            .tables
            .universes
            .iter()
            .map(|kv| kv.value().clone())
            .collect();
        universes.sort_by_key(|u| (u.depth, u.id));
        Ok(universes)
    }

    async fn create_branch(&self, child: &Universe) -> Result<(), RepoError> {
        let parent_id = child.parent_id.ok_or_else(|| {
            RepoError::constraint("cannot branch a root universe into existence")
        })?;
        if !self.tables.universes.contains_key(&parent_id) {
            return Err(RepoError::not_found("Universe", parent_id));
        }

        // Copy parent entity and quest state at the fork point. Events are
        // not copied: the child timeline starts at the fork.
        let copied: Vec<Entity> = self
            .tables
            .entities
            .iter()
            .filter(|kv| kv.key().0 == parent_id)
            .map(|kv| {
                let mut entity = kv.value().clone();
                entity.universe_id = child.id;
                entity
            })
            .collect();
        for entity in copied {
            self.tables.entities.insert((child.id, entity.id), entity);
        }

        let quests: Vec<Quest> = self
            .tables
            .quests
            .iter()
            .filter(|kv| kv.value().universe_id == parent_id)
            .map(|kv| {
                let mut quest = kv.value().clone();
                quest.universe_id = child.id;
                quest
            })
            .collect();
        for quest in quests {
            self.tables.quests.insert((child.id, quest.id), quest);
        }

        self.tables.universes.insert(child.id, child.clone());
        Ok(())
    }

    async fn snapshot_at(
        &self,
        universe_id: UniverseId,
        event_id: EventId,
    ) -> Result<Snapshot, RepoError> {
        let log = self
            .tables
            .events
            .get(&universe_id)
            .map(|l| l.clone())
            .unwrap_or_default();
        if !log.iter().any(|e| e.id == event_id) {
            return Err(RepoError::not_found("Event", event_id));
        }
        Ok(Snapshot {
            valid_to_event: event_id,
            universe_id,
            entities: self.list_entities(universe_id).await?,
        })
    }

    async fn load_quest(
        &self,
        universe_id: UniverseId,
        id: QuestId,
    ) -> Result<Option<Quest>, RepoError> {
        Ok(self.tables.quests.get(&(universe_id, id)).map(|q| q.clone()))
    }

    async fn save_quest(&self, quest: &Quest) -> Result<(), RepoError> {
        self.tables
            .quests
            .insert((quest.universe_id, quest.id), quest.clone());
        Ok(())
    }

    async fn list_quests(&self, universe_id: UniverseId) -> Result<Vec<Quest>, RepoError> {
        let mut quests: Vec<Quest> = self
            .tables
            .quests
            .iter()
            .filter(|kv| kv.value().universe_id == universe_id)
            .map(|kv| kv.value().clone())
            .collect();
        quests.sort_by_key(|q| q.id);
        Ok(quests)
    }

    async fn begin(&self) -> Result<Box<dyn TruthTransaction>, RepoError> {
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            staged: Staged::default(),
        }))
    }
}

#[derive(Default)]
struct Staged {
    entities: Vec<Entity>,
    events: Vec<GameEvent>,
    quests: Vec<Quest>,
}

struct InMemoryTransaction {
    tables: Arc<Tables>,
    staged: Staged,
}

#[async_trait]
impl TruthTransaction for InMemoryTransaction {
    fn stage_entity(&mut self, entity: Entity) {
        self.staged.entities.push(entity);
    }

    fn stage_event(&mut self, event: GameEvent) {
        self.staged.events.push(event);
    }

    fn stage_quest(&mut self, quest: Quest) {
        self.staged.quests.push(quest);
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let staged = self.staged;

        // Validate every staged write before applying anything, so a
        // failed commit leaves the store untouched.
        for entity in &staged.entities {
            let key = (entity.universe_id, entity.id);
            if let Some(existing) = self.tables.entities.get(&key) {
                let replay = existing.version == entity.version + 1 && {
                    let mut candidate = entity.clone();
                    candidate.version = existing.version;
                    candidate == *existing
                };
                if existing.version != entity.version && !replay {
                    return Err(RepoError::VersionConflict {
                        id: entity.id.to_string(),
                        expected: entity.version,
                        found: existing.version,
                    });
                }
            }
        }
        let mut last_seen: std::collections::HashMap<UniverseId, ttasolo_domain::GameTime> =
            std::collections::HashMap::new();
        for event in &staged.events {
            let floor = last_seen.get(&event.universe_id).copied().or_else(|| {
                self.tables
                    .events
                    .get(&event.universe_id)
                    .and_then(|log| log.last().map(|e| e.game_time))
            });
            if floor.map(|f| event.game_time <= f).unwrap_or(false) {
                return Err(RepoError::constraint(
                    "event timestamps must be strictly monotonic per universe",
                ));
            }
            last_seen.insert(event.universe_id, event.game_time);
        }

        // The event is the ground truth: append before entity writes.
        for event in &staged.events {
            InMemoryTruthRepo::append(&self.tables, event)?;
        }
        for entity in &staged.entities {
            InMemoryTruthRepo::save_versioned(&self.tables, entity)?;
        }
        for quest in staged.quests {
            self.tables.quests.insert((quest.universe_id, quest.id), quest);
        }
        Ok(())
    }

    fn discard(self: Box<Self>) {
        // Staged writes simply drop.
    }
}
