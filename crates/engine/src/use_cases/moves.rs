//! The GM move executor.
//!
//! Each move type has a generator. Generative moves (INTRODUCE_NPC,
//! CHANGE_ENVIRONMENT, REVEAL_UNWELCOME_TRUTH) try the injected LLM port
//! and fall back to a deterministic template table keyed by location type
//! on any failure: timeout, malformed response, or no configured client.
//! Effect moves mutate existing state; the rest only narrate.
//!
//! Created entities reach the graph node-first, then edges; a partial
//! persist triggers a compensating delete so no half-created NPC
//! survives. Truth-store writes ride one staged transaction, keeping the
//! event log free of aborted events.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use ttasolo_domain::{
    CharacterStats, DieRoller, DomainError, Entity, EntityId, EntityKind, EventOutcome,
    EventType, GameEvent, GameTime, GmMoveType, LocationType, ObjectStats, PersonalityProfile,
    Relationship, RelationshipId, RelationshipKind, RollSpec, UniverseId,
};

use crate::infrastructure::ports::{GraphRepo, LlmPort, NpcMemory, TruthRepo, LLM_TIMEOUT_MS};

/// Prompt templates injected by the surrounding shell. The core never
/// authors prompts; absent templates mean the fallback tables run
/// unconditionally.
#[derive(Debug, Clone, Default)]
pub struct MovePrompts {
    pub introduce_npc: Option<String>,
    pub change_environment: Option<String>,
    pub reveal_truth: Option<String>,
}

/// Context the router hands the executor on a miss.
#[derive(Debug, Clone)]
pub struct MoveContext {
    pub universe_id: UniverseId,
    pub actor_id: EntityId,
    /// The actor's current location, resolved by the router.
    pub location: Entity,
    pub game_time: GameTime,
    pub now: DateTime<Utc>,
    pub round: u32,
    /// Event that caused this move (the missed check).
    pub caused_by: Option<ttasolo_domain::EventId>,
}

/// What a move did.
#[derive(Debug, Clone)]
pub struct MoveResult {
    pub move_type: GmMoveType,
    pub success: bool,
    pub narrative: String,
    pub entities_created: Vec<EntityId>,
    pub relationships_created: Vec<RelationshipId>,
    pub entities_modified: Vec<EntityId>,
    pub state_changes: Vec<String>,
    pub used_fallback: bool,
}

impl MoveResult {
    fn narrative_only(move_type: GmMoveType, narrative: impl Into<String>) -> Self {
        Self {
            move_type,
            success: true,
            narrative: narrative.into(),
            entities_created: Vec::new(),
            relationships_created: Vec::new(),
            entities_modified: Vec::new(),
            state_changes: Vec::new(),
            used_fallback: false,
        }
    }
}

/// A generated figure or feature, from the LLM or the template table.
struct Generated {
    name: String,
    description: String,
    used_fallback: bool,
}

/// The move executor.
pub struct MoveExecutor {
    truth: Arc<dyn TruthRepo>,
    graph: Arc<dyn GraphRepo>,
    llm: Option<Arc<dyn LlmPort>>,
    prompts: MovePrompts,
}

impl MoveExecutor {
    pub fn new(
        truth: Arc<dyn TruthRepo>,
        graph: Arc<dyn GraphRepo>,
        llm: Option<Arc<dyn LlmPort>>,
        prompts: MovePrompts,
    ) -> Self {
        Self {
            truth,
            graph,
            llm,
            prompts,
        }
    }

    /// Execute one move.
    pub async fn execute(
        &self,
        move_type: GmMoveType,
        ctx: &MoveContext,
        roller: &mut dyn DieRoller,
    ) -> Result<MoveResult, DomainError> {
        tracing::debug!(move_type = %move_type, universe_id = %ctx.universe_id, "executing GM move");
        match move_type {
            GmMoveType::IntroduceNpc => self.introduce_npc(ctx).await,
            GmMoveType::ChangeEnvironment => self.change_environment(ctx).await,
            GmMoveType::RevealUnwelcomeTruth => self.reveal_truth(ctx).await,
            GmMoveType::DealDamage => self.deal_damage(ctx, roller).await,
            GmMoveType::TakeAway => self.take_away(ctx).await,
            GmMoveType::Capture => self.capture(ctx).await,
            GmMoveType::SeparateThem => self.separate(ctx).await,
            GmMoveType::AdvanceTime => Ok({
                let mut result = MoveResult::narrative_only(
                    move_type,
                    "Time slips past while the situation worsens.",
                );
                result.state_changes.push("time advanced 10 minutes".into());
                result
            }),
            GmMoveType::ShowDanger => Ok(MoveResult::narrative_only(
                move_type,
                "Something in the scene shifts: a danger shows its edge.",
            )),
            GmMoveType::OfferOpportunity => Ok(MoveResult::narrative_only(
                move_type,
                "An opening appears, but it will cost something to take.",
            )),
            GmMoveType::UseMonsterMove => Ok(MoveResult::narrative_only(
                move_type,
                "The opposition presses its signature advantage.",
            )),
        }
    }

    /// Ask the LLM for a `{name, description}` pair, falling back to the
    /// template table on timeout, malformed output, or no client.
    async fn generate(
        &self,
        prompt: Option<&str>,
        fallback: (&str, &str),
    ) -> Generated {
        if let (Some(llm), Some(prompt)) = (self.llm.as_ref(), prompt) {
            let schema = json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["name", "description"]
            });
            let call = llm.generate_structured(prompt, &schema);
            match tokio::time::timeout(Duration::from_millis(LLM_TIMEOUT_MS), call).await {
                Ok(Ok(value)) => {
                    let name = value.get("name").and_then(|v| v.as_str()).unwrap_or("");
                    let description = value
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or("");
                    if !name.is_empty() && !description.is_empty() {
                        return Generated {
                            name: name.to_string(),
                            description: description.to_string(),
                            used_fallback: false,
                        };
                    }
                    tracing::warn!("LLM returned incomplete generation, using template");
                }
                Ok(Err(error)) => {
                    tracing::warn!(%error, "LLM generation failed, using template");
                }
                Err(_) => {
                    tracing::warn!(timeout_ms = LLM_TIMEOUT_MS, "LLM generation timed out, using template");
                }
            }
        }
        Generated {
            name: fallback.0.to_string(),
            description: fallback.1.to_string(),
            used_fallback: true,
        }
    }

    /// Persist a freshly generated entity: graph node, then edges, then
    /// the truth-store transaction. Edge failure rolls the node back.
    async fn persist_created(
        &self,
        ctx: &MoveContext,
        entity: Entity,
        extra_edges: Vec<Relationship>,
    ) -> Result<(Entity, Vec<RelationshipId>), DomainError> {
        self.graph.upsert_node(&entity).await.map_err(DomainError::from)?;

        let located = Relationship::new(
            ctx.universe_id,
            entity.id,
            ctx.location.id,
            RelationshipKind::LocatedIn,
        );
        let mut edge_ids = Vec::new();
        let mut edges = vec![located];
        edges.extend(extra_edges);
        for edge in &edges {
            if let Err(error) = self.graph.create_relationship(edge).await {
                tracing::warn!(%error, entity_id = %entity.id, "edge persist failed, compensating");
                let _ = self.graph.delete_node(ctx.universe_id, entity.id).await;
                return Err(error.into());
            }
            edge_ids.push(edge.id);
        }

        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;
        let mut event = GameEvent::new(
            ctx.universe_id,
            ctx.game_time.tick(),
            ctx.now,
            ctx.actor_id,
            EventType::EntityCreated,
        )
        .with_target(entity.id)
        .with_location(ctx.location.id)
        .with_payload_field("name", json!(entity.name.clone()));
        if let Some(cause) = ctx.caused_by {
            event = event.caused_by(cause);
        }
        tx.stage_event(event);
        tx.stage_entity(entity.clone());
        if let Err(error) = tx.commit().await {
            let _ = self.graph.delete_node(ctx.universe_id, entity.id).await;
            return Err(error.into());
        }

        Ok((entity, edge_ids))
    }

    async fn introduce_npc(&self, ctx: &MoveContext) -> Result<MoveResult, DomainError> {
        let location_type = ctx
            .location
            .as_location()
            .map(|l| l.location_type)
            .unwrap_or_default();
        let generated = self
            .generate(
                self.prompts.introduce_npc.as_deref(),
                npc_template(location_type),
            )
            .await;

        let mut stats = CharacterStats::new(
            1,
            9,
            11,
            ttasolo_domain::AbilityScores::all_tens(),
        )?;
        stats.personality = Some(PersonalityProfile::neutral());
        let npc = Entity::new(ctx.universe_id, generated.name.clone(), EntityKind::Character(stats))
            .with_description(generated.description.clone());

        let (npc, edge_ids) = self.persist_created(ctx, npc, Vec::new()).await?;

        self.graph
            .record_memory(&NpcMemory::new(
                npc.id,
                ctx.universe_id,
                format!("Arrived at {}", ctx.location.name),
                ctx.now,
            ))
            .await
            .map_err(DomainError::from)?;

        Ok(MoveResult {
            move_type: GmMoveType::IntroduceNpc,
            success: true,
            narrative: format!("{} enters: {}", npc.name, npc.description),
            entities_created: vec![npc.id],
            relationships_created: edge_ids,
            entities_modified: Vec::new(),
            state_changes: Vec::new(),
            used_fallback: generated.used_fallback,
        })
    }

    async fn change_environment(&self, ctx: &MoveContext) -> Result<MoveResult, DomainError> {
        let location_type = ctx
            .location
            .as_location()
            .map(|l| l.location_type)
            .unwrap_or_default();
        let generated = self
            .generate(
                self.prompts.change_environment.as_deref(),
                environment_template(location_type),
            )
            .await;

        let feature = Entity::new(
            ctx.universe_id,
            generated.name.clone(),
            EntityKind::Object(ObjectStats { interactable: true }),
        )
        .with_description(generated.description.clone());

        let (feature, edge_ids) = self.persist_created(ctx, feature, Vec::new()).await?;

        Ok(MoveResult {
            move_type: GmMoveType::ChangeEnvironment,
            success: true,
            narrative: format!("The scene changes: {}", feature.description),
            entities_created: vec![feature.id],
            relationships_created: edge_ids,
            entities_modified: Vec::new(),
            state_changes: vec![format!("{} now marks the location", feature.name)],
            used_fallback: generated.used_fallback,
        })
    }

    async fn reveal_truth(&self, ctx: &MoveContext) -> Result<MoveResult, DomainError> {
        let location_type = ctx
            .location
            .as_location()
            .map(|l| l.location_type)
            .unwrap_or_default();
        let generated = self
            .generate(
                self.prompts.reveal_truth.as_deref(),
                truth_template(location_type),
            )
            .await;

        let concept = Entity::new(
            ctx.universe_id,
            generated.name.clone(),
            EntityKind::Object(ObjectStats { interactable: false }),
        )
        .with_description(generated.description.clone())
        .with_tags(vec!["concept".into()]);

        let (concept, edge_ids) = self.persist_created(ctx, concept, Vec::new()).await?;

        Ok(MoveResult {
            move_type: GmMoveType::RevealUnwelcomeTruth,
            success: true,
            narrative: format!("An unwelcome truth surfaces: {}", concept.description),
            entities_created: vec![concept.id],
            relationships_created: edge_ids,
            entities_modified: Vec::new(),
            state_changes: Vec::new(),
            used_fallback: generated.used_fallback,
        })
    }

    async fn deal_damage(
        &self,
        ctx: &MoveContext,
        roller: &mut dyn DieRoller,
    ) -> Result<MoveResult, DomainError> {
        let mut actor = self
            .truth
            .load_entity(ctx.universe_id, ctx.actor_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Entity", ctx.actor_id.to_string()))?;

        let damage = RollSpec::simple(1, 6)?.roll(roller).total.max(1);
        actor
            .as_character_mut()
            .ok_or_else(|| DomainError::invalid_target("actor is not a character"))?
            .apply_damage(damage);

        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;
        let mut event = GameEvent::new(
            ctx.universe_id,
            ctx.game_time.tick(),
            ctx.now,
            ctx.actor_id,
            EventType::CombatRound,
        )
        .with_outcome(EventOutcome::Hit)
        .with_roll(damage)
        .with_payload_field("damage", json!(damage))
        .with_payload_field("source", json!("gm_move"));
        if let Some(cause) = ctx.caused_by {
            event = event.caused_by(cause);
        }
        tx.stage_event(event);
        tx.stage_entity(actor.clone());
        tx.commit().await.map_err(DomainError::from)?;

        Ok(MoveResult {
            move_type: GmMoveType::DealDamage,
            success: true,
            narrative: format!("The danger lands: {} damage.", damage),
            entities_created: Vec::new(),
            relationships_created: Vec::new(),
            entities_modified: vec![ctx.actor_id],
            state_changes: vec![format!("{} took {} damage", actor.name, damage)],
            used_fallback: false,
        })
    }

    async fn take_away(&self, ctx: &MoveContext) -> Result<MoveResult, DomainError> {
        // Take the first active item the actor carries; with nothing to
        // take, the move degrades to narration.
        let edges = self
            .graph
            .query_relationships(ctx.universe_id, ctx.actor_id)
            .await
            .map_err(DomainError::from)?;
        let carried = edges.iter().find(|e| {
            e.kind == RelationshipKind::Carries && e.from == ctx.actor_id
        });

        let Some(edge) = carried else {
            return Ok(MoveResult::narrative_only(
                GmMoveType::TakeAway,
                "Something of value slips out of reach.",
            ));
        };

        let Some(mut item) = self
            .truth
            .load_entity(ctx.universe_id, edge.to)
            .await
            .map_err(DomainError::from)?
        else {
            return Ok(MoveResult::narrative_only(
                GmMoveType::TakeAway,
                "Something of value slips out of reach.",
            ));
        };
        if let Some(stats) = item.as_item_mut() {
            stats.active = false;
        }

        self.graph
            .delete_relationship(edge.id)
            .await
            .map_err(DomainError::from)?;

        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;
        tx.stage_event(
            GameEvent::new(
                ctx.universe_id,
                ctx.game_time.tick(),
                ctx.now,
                ctx.actor_id,
                EventType::ItemLost,
            )
            .with_target(item.id)
            .with_payload_field("item", json!(item.name.clone())),
        );
        tx.stage_entity(item.clone());
        tx.commit().await.map_err(DomainError::from)?;

        Ok(MoveResult {
            move_type: GmMoveType::TakeAway,
            success: true,
            narrative: format!("The {} is gone.", item.name),
            entities_created: Vec::new(),
            relationships_created: Vec::new(),
            entities_modified: vec![item.id],
            state_changes: vec![format!("{} lost", item.name)],
            used_fallback: false,
        })
    }

    async fn capture(&self, ctx: &MoveContext) -> Result<MoveResult, DomainError> {
        let mut actor = self
            .truth
            .load_entity(ctx.universe_id, ctx.actor_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Entity", ctx.actor_id.to_string()))?;

        actor
            .as_character_mut()
            .ok_or_else(|| DomainError::invalid_target("actor is not a character"))?
            .conditions
            .push(ttasolo_domain::ConditionInstance::new(
                ttasolo_domain::ConditionKind::Restrained,
                ttasolo_domain::EffectDuration::until_rest(),
                ctx.round,
            ));

        let trapped = Relationship::new(
            ctx.universe_id,
            ctx.actor_id,
            ctx.location.id,
            RelationshipKind::TrappedIn,
        );
        self.graph
            .create_relationship(&trapped)
            .await
            .map_err(DomainError::from)?;

        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;
        tx.stage_event(
            GameEvent::new(
                ctx.universe_id,
                ctx.game_time.tick(),
                ctx.now,
                ctx.actor_id,
                EventType::ConditionApplied,
            )
            .with_location(ctx.location.id)
            .with_payload_field("condition", json!("restrained"))
            .with_payload_field("source", json!("capture")),
        );
        tx.stage_entity(actor.clone());
        tx.commit().await.map_err(DomainError::from)?;

        Ok(MoveResult {
            move_type: GmMoveType::Capture,
            success: true,
            narrative: format!("{} is seized and held fast.", actor.name),
            entities_created: Vec::new(),
            relationships_created: vec![trapped.id],
            entities_modified: vec![ctx.actor_id],
            state_changes: vec![format!("{} restrained in {}", actor.name, ctx.location.name)],
            used_fallback: false,
        })
    }

    async fn separate(&self, ctx: &MoveContext) -> Result<MoveResult, DomainError> {
        // Push the actor through the first exit of the current location.
        let Some(exit) = ctx
            .location
            .as_location()
            .and_then(|l| {
                let mut exits: Vec<(&String, &EntityId)> = l.exits.iter().collect();
                exits.sort_by_key(|(direction, _)| (*direction).clone());
                exits.first().map(|(d, id)| ((*d).clone(), **id))
            })
        else {
            return Ok(MoveResult::narrative_only(
                GmMoveType::SeparateThem,
                "The group is driven apart within the same walls.",
            ));
        };
        let (direction, destination) = exit;

        let moved = Relationship::new(
            ctx.universe_id,
            ctx.actor_id,
            destination,
            RelationshipKind::LocatedIn,
        );
        self.graph
            .create_relationship(&moved)
            .await
            .map_err(DomainError::from)?;

        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;
        tx.stage_event(
            GameEvent::new(
                ctx.universe_id,
                ctx.game_time.tick(),
                ctx.now,
                ctx.actor_id,
                EventType::Travel,
            )
            .with_location(destination)
            .with_payload_field("direction", json!(direction))
            .with_payload_field("forced", json!(true)),
        );
        tx.commit().await.map_err(DomainError::from)?;

        Ok(MoveResult {
            move_type: GmMoveType::SeparateThem,
            success: true,
            narrative: format!("The press of events forces a retreat {}.", direction),
            entities_created: Vec::new(),
            relationships_created: vec![moved.id],
            entities_modified: vec![ctx.actor_id],
            state_changes: vec![format!("forced move {}", direction)],
            used_fallback: false,
        })
    }
}

/// Fallback NPC seeds by location type.
fn npc_template(location_type: LocationType) -> (&'static str, &'static str) {
    match location_type {
        LocationType::Tavern => (
            "Weathered Bard",
            "A road-worn performer nursing a half-empty cup and a grudge.",
        ),
        LocationType::Dungeon => (
            "Starving Prisoner",
            "A gaunt figure chained to the wall, eyes bright with desperation.",
        ),
        LocationType::Market => (
            "Sharp-Eyed Peddler",
            "A trader whose smile never reaches the ledger in their head.",
        ),
        LocationType::Forest => (
            "Wary Ranger",
            "A hooded tracker who was watching long before being seen.",
        ),
        LocationType::Other => (
            "Hooded Stranger",
            "A silent figure whose intentions are unreadable.",
        ),
    }
}

/// Fallback environment features by location type.
fn environment_template(location_type: LocationType) -> (&'static str, &'static str) {
    match location_type {
        LocationType::Tavern => (
            "Overturned Table",
            "A table crashes over, scattering cards and coin across the floor.",
        ),
        LocationType::Dungeon => (
            "Collapsed Passage",
            "Dust pours from the ceiling as stone grinds shut behind you.",
        ),
        LocationType::Market => (
            "Panicked Crowd",
            "The crowd surges as a stall collapses into the lane.",
        ),
        LocationType::Forest => (
            "Rising Fog",
            "A cold fog rolls between the trees, swallowing the trail.",
        ),
        LocationType::Other => (
            "Failing Light",
            "The light gutters and shadows lengthen across the ground.",
        ),
    }
}

/// Fallback revealed truths by location type.
fn truth_template(location_type: LocationType) -> (&'static str, &'static str) {
    match location_type {
        LocationType::Tavern => (
            "Marked Ledger",
            "The barkeep's ledger lists a debt in your name you never signed.",
        ),
        LocationType::Dungeon => (
            "Fresh Tracks",
            "Bootprints in the dust are newer than anything that should walk here.",
        ),
        LocationType::Market => (
            "Counterfeit Coin",
            "The coin you were paid with is stamped with a dead king's face.",
        ),
        LocationType::Forest => (
            "Cold Campfire",
            "Someone camped here last night, and they were watching your road.",
        ),
        LocationType::Other => (
            "Unsettling Silence",
            "The ordinary noise of the place has stopped entirely.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::{InMemoryGraphRepo, InMemoryTruthRepo};
    use crate::infrastructure::ports::MockLlmPort;
    use crate::infrastructure::rng::ScriptedRoller;
    use ttasolo_domain::{AbilityScores, LocationStats, Universe};

    async fn fixture() -> (Arc<InMemoryTruthRepo>, Arc<InMemoryGraphRepo>, MoveContext) {
        let truth = Arc::new(InMemoryTruthRepo::new());
        let graph = Arc::new(InMemoryGraphRepo::new());
        let universe = Universe::root("main", "player", Utc::now());
        truth.save_universe(&universe).await.unwrap();
        graph.register_universe(&universe).await.unwrap();

        let location = Entity::new(
            universe.id,
            "The Gilded Flagon",
            EntityKind::Location(LocationStats::new(3, LocationType::Tavern).unwrap()),
        );
        let location = truth.save_entity(&location).await.unwrap();
        graph.upsert_node(&location).await.unwrap();

        let hero = Entity::new(
            universe.id,
            "Aria",
            EntityKind::Character(
                CharacterStats::new(3, 24, 15, AbilityScores::all_tens()).unwrap(),
            ),
        );
        let hero = truth.save_entity(&hero).await.unwrap();
        graph.upsert_node(&hero).await.unwrap();

        let ctx = MoveContext {
            universe_id: universe.id,
            actor_id: hero.id,
            location,
            game_time: GameTime::from_seconds(100),
            now: Utc::now(),
            round: 1,
            caused_by: None,
        };
        (truth, graph, ctx)
    }

    #[tokio::test]
    async fn test_introduce_npc_falls_back_without_llm() {
        let (truth, graph, ctx) = fixture().await;
        let executor = MoveExecutor::new(
            truth.clone(),
            graph.clone(),
            None,
            MovePrompts::default(),
        );
        let mut roller = ScriptedRoller::new(vec![3]);

        let result = executor
            .execute(GmMoveType::IntroduceNpc, &ctx, &mut roller)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.used_fallback);
        assert_eq!(result.entities_created.len(), 1);

        // Tavern template, persisted to both stores, standing in the room.
        let npc_id = result.entities_created[0];
        let stored = truth
            .load_entity(ctx.universe_id, npc_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Weathered Bard");
        let occupants = graph
            .query_entities_at_location(ctx.universe_id, ctx.location.id)
            .await
            .unwrap();
        assert!(occupants.iter().any(|e| e.id == npc_id));

        // And the barkeep... the new NPC remembers arriving.
        let memories = graph.memories_for(npc_id, 10).await.unwrap();
        assert_eq!(memories.len(), 1);
    }

    #[tokio::test]
    async fn test_introduce_npc_uses_llm_output() {
        let (truth, graph, ctx) = fixture().await;
        let mut llm = MockLlmPort::new();
        llm.expect_generate_structured().returning(|_, _| {
            Ok(json!({ "name": "Vex the Fence", "description": "A dealer in stolen memories." }))
        });
        let executor = MoveExecutor::new(
            truth.clone(),
            graph,
            Some(Arc::new(llm)),
            MovePrompts {
                introduce_npc: Some("introduce an npc".into()),
                ..Default::default()
            },
        );
        let mut roller = ScriptedRoller::new(vec![3]);

        let result = executor
            .execute(GmMoveType::IntroduceNpc, &ctx, &mut roller)
            .await
            .unwrap();
        assert!(!result.used_fallback);
        let stored = truth
            .load_entity(ctx.universe_id, result.entities_created[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Vex the Fence");
    }

    #[tokio::test]
    async fn test_malformed_llm_response_falls_back() {
        let (truth, graph, ctx) = fixture().await;
        let mut llm = MockLlmPort::new();
        llm.expect_generate_structured()
            .returning(|_, _| Ok(json!({ "name": "" })));
        let executor = MoveExecutor::new(
            truth,
            graph,
            Some(Arc::new(llm)),
            MovePrompts {
                introduce_npc: Some("introduce an npc".into()),
                ..Default::default()
            },
        );
        let mut roller = ScriptedRoller::new(vec![3]);
        let result = executor
            .execute(GmMoveType::IntroduceNpc, &ctx, &mut roller)
            .await
            .unwrap();
        assert!(result.used_fallback);
    }

    #[tokio::test]
    async fn test_deal_damage_mutates_actor_and_logs_event() {
        let (truth, graph, ctx) = fixture().await;
        let executor =
            MoveExecutor::new(truth.clone(), graph, None, MovePrompts::default());
        let mut roller = ScriptedRoller::new(vec![4]);

        let result = executor
            .execute(GmMoveType::DealDamage, &ctx, &mut roller)
            .await
            .unwrap();
        assert_eq!(result.entities_modified, vec![ctx.actor_id]);

        let actor = truth
            .load_entity(ctx.universe_id, ctx.actor_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(actor.as_character().unwrap().hp, 20);

        let events = truth.list_events(ctx.universe_id, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::CombatRound);
        assert_eq!(events[0].payload["damage"], json!(4));
    }

    #[tokio::test]
    async fn test_take_away_without_items_narrates() {
        let (truth, graph, ctx) = fixture().await;
        let executor = MoveExecutor::new(truth.clone(), graph, None, MovePrompts::default());
        let mut roller = ScriptedRoller::new(vec![1]);
        let result = executor
            .execute(GmMoveType::TakeAway, &ctx, &mut roller)
            .await
            .unwrap();
        assert!(result.entities_modified.is_empty());
        assert!(truth.list_events(ctx.universe_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_take_away_marks_item_lost() {
        let (truth, graph, ctx) = fixture().await;
        let item = Entity::new(
            ctx.universe_id,
            "Silver Locket",
            EntityKind::Item(ttasolo_domain::ItemStats::mundane(0.1, 25)),
        );
        let item = truth.save_entity(&item).await.unwrap();
        graph.upsert_node(&item).await.unwrap();
        graph
            .create_relationship(&Relationship::new(
                ctx.universe_id,
                ctx.actor_id,
                item.id,
                RelationshipKind::Carries,
            ))
            .await
            .unwrap();

        let executor =
            MoveExecutor::new(truth.clone(), graph.clone(), None, MovePrompts::default());
        let mut roller = ScriptedRoller::new(vec![1]);
        let result = executor
            .execute(GmMoveType::TakeAway, &ctx, &mut roller)
            .await
            .unwrap();
        assert_eq!(result.entities_modified, vec![item.id]);

        let stored = truth
            .load_entity(ctx.universe_id, item.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.as_item().unwrap().active);
        let events = truth.list_events(ctx.universe_id, None).await.unwrap();
        assert_eq!(events[0].event_type, EventType::ItemLost);
    }

    #[tokio::test]
    async fn test_capture_restrains_actor() {
        let (truth, graph, ctx) = fixture().await;
        let executor =
            MoveExecutor::new(truth.clone(), graph.clone(), None, MovePrompts::default());
        let mut roller = ScriptedRoller::new(vec![1]);
        executor
            .execute(GmMoveType::Capture, &ctx, &mut roller)
            .await
            .unwrap();

        let actor = truth
            .load_entity(ctx.universe_id, ctx.actor_id)
            .await
            .unwrap()
            .unwrap();
        assert!(actor
            .as_character()
            .unwrap()
            .has_condition(ttasolo_domain::ConditionKind::Restrained));
    }
}
