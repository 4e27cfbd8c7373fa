//! The multiverse service.
//!
//! Forking branches the truth store and registers the child with the
//! graph without duplicating a single node: graph reads follow the lazy
//! divergence rule, and the first mutation of a canonical entity inside a
//! fork creates a variant node with a VARIANT_OF edge back to the
//! original. World travel copies a character (and what it owns or
//! carries) into the destination universe; social edges stay behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use ttasolo_domain::{
    DomainError, Entity, EntityId, EntityKind, EventType, GameEvent, GameTime, LocationStats,
    LocationType, Relationship, RelationshipKind, Universe, UniverseId,
};

use crate::infrastructure::ports::{GraphRepo, TruthRepo};

/// Result of a fork.
#[derive(Debug, Clone)]
pub struct ForkResult {
    pub child: Universe,
    pub parent_event: GameEvent,
    pub child_event: GameEvent,
}

/// Result of world travel.
#[derive(Debug, Clone)]
pub struct TravelResult {
    pub traveler: Entity,
    pub portal: Entity,
    pub items_brought: Vec<EntityId>,
}

/// The multiverse service.
pub struct MultiverseService {
    truth: Arc<dyn TruthRepo>,
    graph: Arc<dyn GraphRepo>,
}

impl MultiverseService {
    pub fn new(truth: Arc<dyn TruthRepo>, graph: Arc<dyn GraphRepo>) -> Self {
        Self { truth, graph }
    }

    /// Next strictly-monotonic in-game timestamp for a universe.
    async fn next_time(&self, universe_id: UniverseId) -> Result<GameTime, DomainError> {
        let recent = self
            .truth
            .list_events(universe_id, Some(1))
            .await
            .map_err(DomainError::from)?;
        Ok(recent
            .last()
            .map(|e| e.game_time.tick())
            .unwrap_or_else(GameTime::zero))
    }

    /// Fork a universe.
    ///
    /// Inserts the child row, branches the truth store (copying parent
    /// state at the fork point), and appends a FORK event to both
    /// timelines, each referencing the other universe. The child is
    /// visible to queries as soon as this returns; the graph only learns
    /// the new universe's ancestry.
    pub async fn fork_universe(
        &self,
        parent_id: UniverseId,
        branch: &str,
        reason: &str,
        actor_id: EntityId,
        now: DateTime<Utc>,
    ) -> Result<ForkResult, DomainError> {
        let parent = self
            .truth
            .get_universe(parent_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Universe", parent_id.to_string()))?;

        // The parent-side FORK event doubles as the fork point.
        let parent_event = GameEvent::new(
            parent_id,
            self.next_time(parent_id).await?,
            now,
            actor_id,
            EventType::Fork,
        )
        .with_payload_field("branch", json!(branch))
        .with_payload_field("reason", json!(reason));

        let child = Universe::fork_of(&parent, branch, &parent.owner, parent_event.id, now)?;

        let parent_event = parent_event
            .with_payload_field("child_universe_id", json!(child.id.to_string()));
        self.truth
            .append_event(&parent_event)
            .await
            .map_err(DomainError::from)?;

        self.truth
            .create_branch(&child)
            .await
            .map_err(DomainError::from)?;
        self.graph
            .register_universe(&child)
            .await
            .map_err(DomainError::from)?;

        let child_event = GameEvent::new(
            child.id,
            GameTime::zero().tick(),
            now,
            actor_id,
            EventType::Fork,
        )
        .caused_by(parent_event.id)
        .with_payload_field("parent_universe_id", json!(parent_id.to_string()))
        .with_payload_field("branch", json!(branch))
        .with_payload_field("reason", json!(reason));
        self.truth
            .append_event(&child_event)
            .await
            .map_err(DomainError::from)?;

        tracing::info!(
            parent = %parent.branch,
            child = %child.branch,
            child_universe_id = %child.id,
            "forked universe"
        );

        Ok(ForkResult {
            child,
            parent_event,
            child_event,
        })
    }

    /// Read an entity under the variant rule.
    pub async fn get_entity(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, DomainError> {
        Ok(self
            .graph
            .get_node(universe_id, id)
            .await
            .map_err(DomainError::from)?)
    }

    /// Write an entity into a universe, diverging the graph lazily.
    ///
    /// The truth store writes to the branch row directly. In the graph, a
    /// universe-local node (or an existing variant) is updated in place;
    /// a canonical resolved from an ancestor gets a fresh variant node
    /// with a VARIANT_OF edge, which shadows it from then on.
    pub async fn write_entity(&self, entity: Entity) -> Result<Entity, DomainError> {
        let universe_id = entity.universe_id;
        let saved = self
            .truth
            .save_entity(&entity)
            .await
            .map_err(DomainError::from)?;

        match self
            .graph
            .get_node(universe_id, entity.id)
            .await
            .map_err(DomainError::from)?
        {
            Some(node) if node.universe_id == universe_id => {
                // Own node, or the variant that already shadows it.
                let mut updated = saved.clone();
                updated.id = node.id;
                updated.universe_id = universe_id;
                self.graph
                    .upsert_node(&updated)
                    .await
                    .map_err(DomainError::from)?;
            }
            Some(canonical) => {
                let mut variant = saved.clone();
                variant.id = EntityId::new();
                variant.universe_id = universe_id;
                self.graph
                    .upsert_node(&variant)
                    .await
                    .map_err(DomainError::from)?;
                self.graph
                    .create_relationship(&Relationship::new(
                        universe_id,
                        variant.id,
                        canonical.id,
                        RelationshipKind::VariantOf,
                    ))
                    .await
                    .map_err(DomainError::from)?;
                tracing::debug!(
                    canonical = %canonical.id,
                    variant = %variant.id,
                    universe_id = %universe_id,
                    "created variant on first write"
                );
            }
            None => {
                self.graph
                    .upsert_node(&saved)
                    .await
                    .map_err(DomainError::from)?;
            }
        }
        Ok(saved)
    }

    /// Move a character to another universe.
    ///
    /// The character state is copied under a new id, placed at a named
    /// portal location (created on first use), and its OWNS and CARRIES
    /// edges are re-established onto copies of the items. KNOWS and FEARS
    /// stay in the origin universe. A WORLD_TRAVEL event lands in both
    /// timelines.
    pub async fn travel(
        &self,
        traveler_id: EntityId,
        from_universe: UniverseId,
        to_universe: UniverseId,
        portal_name: &str,
        now: DateTime<Utc>,
    ) -> Result<TravelResult, DomainError> {
        let original = self
            .truth
            .load_entity(from_universe, traveler_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Entity", traveler_id.to_string()))?;

        if self
            .truth
            .get_universe(to_universe)
            .await
            .map_err(DomainError::from)?
            .is_none()
        {
            return Err(DomainError::not_found("Universe", to_universe.to_string()));
        }

        // Find or create the arrival portal.
        let portal = match self
            .truth
            .find_entity_by_name(to_universe, portal_name)
            .await
            .map_err(DomainError::from)?
        {
            Some(existing) => existing,
            None => {
                let portal = Entity::new(
                    to_universe,
                    portal_name,
                    EntityKind::Location(LocationStats::new(0, LocationType::Other)?),
                )
                .with_description("A thin place between realities.");
                let portal = self
                    .truth
                    .save_entity(&portal)
                    .await
                    .map_err(DomainError::from)?;
                self.graph
                    .upsert_node(&portal)
                    .await
                    .map_err(DomainError::from)?;
                portal
            }
        };

        // Copy the traveler under a fresh id.
        let mut copy = original.clone();
        copy.id = EntityId::new();
        copy.universe_id = to_universe;
        copy.version = 0;
        let copy = self
            .truth
            .save_entity(&copy)
            .await
            .map_err(DomainError::from)?;
        self.graph
            .upsert_node(&copy)
            .await
            .map_err(DomainError::from)?;
        self.graph
            .create_relationship(&Relationship::new(
                to_universe,
                copy.id,
                portal.id,
                RelationshipKind::LocatedIn,
            ))
            .await
            .map_err(DomainError::from)?;

        // Possessions travel; relationships do not.
        let mut items_brought = Vec::new();
        let edges = self
            .graph
            .query_relationships(from_universe, traveler_id)
            .await
            .map_err(DomainError::from)?;
        for edge in edges
            .iter()
            .filter(|e| e.kind.transfers_on_world_travel() && e.from == traveler_id)
        {
            let Some(item) = self
                .truth
                .load_entity(from_universe, edge.to)
                .await
                .map_err(DomainError::from)?
            else {
                continue;
            };
            let mut item_copy = item.clone();
            item_copy.id = EntityId::new();
            item_copy.universe_id = to_universe;
            item_copy.version = 0;
            let item_copy = self
                .truth
                .save_entity(&item_copy)
                .await
                .map_err(DomainError::from)?;
            self.graph
                .upsert_node(&item_copy)
                .await
                .map_err(DomainError::from)?;
            self.graph
                .create_relationship(&Relationship::new(
                    to_universe,
                    copy.id,
                    item_copy.id,
                    edge.kind,
                ))
                .await
                .map_err(DomainError::from)?;
            items_brought.push(item_copy.id);
        }

        // WORLD_TRAVEL in both timelines, cross-referenced.
        let departure = GameEvent::new(
            from_universe,
            self.next_time(from_universe).await?,
            now,
            traveler_id,
            EventType::WorldTravel,
        )
        .with_payload_field("to_universe_id", json!(to_universe.to_string()))
        .with_payload_field("traveler_copy_id", json!(copy.id.to_string()));
        self.truth
            .append_event(&departure)
            .await
            .map_err(DomainError::from)?;

        let arrival = GameEvent::new(
            to_universe,
            self.next_time(to_universe).await?,
            now,
            copy.id,
            EventType::WorldTravel,
        )
        .caused_by(departure.id)
        .with_location(portal.id)
        .with_payload_field("from_universe_id", json!(from_universe.to_string()))
        .with_payload_field("original_id", json!(traveler_id.to_string()));
        self.truth
            .append_event(&arrival)
            .await
            .map_err(DomainError::from)?;

        Ok(TravelResult {
            traveler: copy,
            portal,
            items_brought,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::{InMemoryGraphRepo, InMemoryTruthRepo};
    use ttasolo_domain::{AbilityScores, CharacterStats, ItemStats};

    struct Fixture {
        truth: Arc<InMemoryTruthRepo>,
        graph: Arc<InMemoryGraphRepo>,
        service: MultiverseService,
        root: Universe,
        hero: Entity,
    }

    async fn fixture() -> Fixture {
        let truth = Arc::new(InMemoryTruthRepo::new());
        let graph = Arc::new(InMemoryGraphRepo::new());
        let service = MultiverseService::new(truth.clone(), graph.clone());

        let root = Universe::root("main", "player", Utc::now());
        truth.save_universe(&root).await.unwrap();
        graph.register_universe(&root).await.unwrap();

        let hero = Entity::new(
            root.id,
            "Aria",
            EntityKind::Character(
                CharacterStats::new(3, 24, 15, AbilityScores::all_tens()).unwrap(),
            ),
        );
        let hero = truth.save_entity(&hero).await.unwrap();
        graph.upsert_node(&hero).await.unwrap();

        Fixture {
            truth,
            graph,
            service,
            root,
            hero,
        }
    }

    #[tokio::test]
    async fn test_fork_appends_events_to_both_universes() {
        let f = fixture().await;
        let fork = f
            .service
            .fork_universe(f.root.id, "what-if", "curiosity", f.hero.id, Utc::now())
            .await
            .unwrap();

        assert_eq!(fork.child.parent_id, Some(f.root.id));
        assert_eq!(fork.child.depth, 1);

        let parent_log = f.truth.list_events(f.root.id, None).await.unwrap();
        assert_eq!(parent_log.len(), 1);
        assert_eq!(parent_log[0].event_type, EventType::Fork);
        assert_eq!(
            parent_log[0].payload["child_universe_id"],
            json!(fork.child.id.to_string())
        );

        let child_log = f.truth.list_events(fork.child.id, None).await.unwrap();
        assert_eq!(child_log.len(), 1);
        assert_eq!(child_log[0].caused_by, Some(parent_log[0].id));

        // Immediately visible to queries.
        let listed = f.truth.list_universes().await.unwrap();
        assert!(listed.iter().any(|u| u.id == fork.child.id));
    }

    #[tokio::test]
    async fn test_fork_then_diverge() {
        let f = fixture().await;
        let fork = f
            .service
            .fork_universe(f.root.id, "what-if", "regicide", f.hero.id, Utc::now())
            .await
            .unwrap();

        // Kill the hero's double in the fork.
        let mut doomed = f
            .truth
            .load_entity(fork.child.id, f.hero.id)
            .await
            .unwrap()
            .unwrap();
        doomed.as_character_mut().unwrap().apply_damage(999);
        f.service.write_entity(doomed).await.unwrap();

        // Parent unchanged, through both stores.
        let original = f
            .service
            .get_entity(f.root.id, f.hero.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(original.as_character().unwrap().hp, 24);
        let original_truth = f
            .truth
            .load_entity(f.root.id, f.hero.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(original_truth.as_character().unwrap().hp, 24);

        // Fork sees the variant with 0 HP and a VARIANT_OF edge.
        let variant = f
            .service
            .get_entity(fork.child.id, f.hero.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(variant.as_character().unwrap().hp, 0);
        assert_ne!(variant.id, f.hero.id);
        let edges = f
            .graph
            .query_relationships(fork.child.id, variant.id)
            .await
            .unwrap();
        assert!(edges
            .iter()
            .any(|e| e.kind == RelationshipKind::VariantOf && e.to == f.hero.id));
    }

    #[tokio::test]
    async fn test_second_write_updates_existing_variant() {
        let f = fixture().await;
        let fork = f
            .service
            .fork_universe(f.root.id, "what-if", "testing", f.hero.id, Utc::now())
            .await
            .unwrap();

        let mut first = f
            .truth
            .load_entity(fork.child.id, f.hero.id)
            .await
            .unwrap()
            .unwrap();
        first.as_character_mut().unwrap().apply_damage(10);
        f.service.write_entity(first).await.unwrap();
        let variant_a = f
            .service
            .get_entity(fork.child.id, f.hero.id)
            .await
            .unwrap()
            .unwrap();

        let mut second = f
            .truth
            .load_entity(fork.child.id, f.hero.id)
            .await
            .unwrap()
            .unwrap();
        second.as_character_mut().unwrap().apply_damage(5);
        f.service.write_entity(second).await.unwrap();
        let variant_b = f
            .service
            .get_entity(fork.child.id, f.hero.id)
            .await
            .unwrap()
            .unwrap();

        // Same variant node, updated in place.
        assert_eq!(variant_a.id, variant_b.id);
        assert_eq!(variant_b.as_character().unwrap().hp, 9);
    }

    #[tokio::test]
    async fn test_travel_copies_character_and_possessions() {
        let f = fixture().await;
        let fork = f
            .service
            .fork_universe(f.root.id, "mirror", "travel", f.hero.id, Utc::now())
            .await
            .unwrap();

        // Give the hero a carried item and a friend (who stays behind).
        let locket = Entity::new(
            f.root.id,
            "Silver Locket",
            EntityKind::Item(ItemStats::mundane(0.1, 25)),
        );
        let locket = f.truth.save_entity(&locket).await.unwrap();
        f.graph.upsert_node(&locket).await.unwrap();
        f.graph
            .create_relationship(&Relationship::new(
                f.root.id,
                f.hero.id,
                locket.id,
                RelationshipKind::Carries,
            ))
            .await
            .unwrap();

        let friend = Entity::new(
            f.root.id,
            "Old Tom",
            EntityKind::Character(
                CharacterStats::new(1, 8, 10, AbilityScores::all_tens()).unwrap(),
            ),
        );
        let friend = f.truth.save_entity(&friend).await.unwrap();
        f.graph.upsert_node(&friend).await.unwrap();
        f.graph
            .create_relationship(
                &Relationship::new(f.root.id, f.hero.id, friend.id, RelationshipKind::Knows)
                    .with_trust(0.8)
                    .unwrap(),
            )
            .await
            .unwrap();

        let result = f
            .service
            .travel(f.hero.id, f.root.id, fork.child.id, "Planar Crossing", Utc::now())
            .await
            .unwrap();

        assert_ne!(result.traveler.id, f.hero.id);
        assert_eq!(result.traveler.universe_id, fork.child.id);
        assert_eq!(result.items_brought.len(), 1);

        // Standing at the portal.
        let occupants = f
            .graph
            .query_entities_at_location(fork.child.id, result.portal.id)
            .await
            .unwrap();
        assert!(occupants.iter().any(|e| e.id == result.traveler.id));

        // Possession traveled, the KNOWS edge did not.
        let edges = f
            .graph
            .query_relationships(fork.child.id, result.traveler.id)
            .await
            .unwrap();
        assert!(edges.iter().any(|e| e.kind == RelationshipKind::Carries));
        assert!(!edges.iter().any(|e| e.kind == RelationshipKind::Knows));

        // WORLD_TRAVEL recorded on both sides.
        let origin_log = f.truth.list_events(f.root.id, None).await.unwrap();
        assert!(origin_log
            .iter()
            .any(|e| e.event_type == EventType::WorldTravel));
        let dest_log = f.truth.list_events(fork.child.id, None).await.unwrap();
        assert!(dest_log
            .iter()
            .any(|e| e.event_type == EventType::WorldTravel));
    }
}
