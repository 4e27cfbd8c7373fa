//! The turn router.
//!
//! Single-threaded per session: one structured intent in, one turn result
//! out. Phases: context load, dispatch to the matching skill or service,
//! effect and resource application, event recording through a staged
//! transaction, and response composition. Recoverable rule errors surface
//! as a failed `SkillResult` without touching state; a stale-version
//! conflict earns one retry with a fresh context; repository failures
//! roll the turn back.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use ttasolo_domain::{
    AbilityId, Cover, DieRoller, DomainError, Entity, EntityId, EventId, EventOutcome,
    EventType, GameEvent, GameTime, GmMoveType, OutcomeBand, PhysicsOverlay, Relationship,
    RelationshipKind, RestKind, Skill, TargetMode, UnifiedAbility, Universe, UniverseId,
};

use crate::infrastructure::ports::{GraphRepo, TruthRepo};
use crate::use_cases::effects::{strip_concentration_effects, EffectPipeline};
use crate::use_cases::moves::{MoveContext, MoveExecutor, MoveResult};
use crate::use_cases::multiverse::MultiverseService;
use crate::use_cases::npc::{DecisionContext, NpcDecisionService};
use crate::use_cases::resources::{DefyOutcome, ResourceService};
use crate::use_cases::skills::{AttackResult, CheckResult, SkillService};

/// The closed intent set. Parsing raw text into these is the shell's job;
/// the core begins here.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Attack {
        target: EntityId,
        weapon: EntityId,
        cover: Cover,
    },
    CastSpell {
        ability: AbilityId,
        targets: Vec<EntityId>,
    },
    UseAbility {
        ability: AbilityId,
        targets: Vec<EntityId>,
    },
    Talk {
        target: EntityId,
        topic: Option<String>,
    },
    Persuade {
        target: EntityId,
        dc: i32,
    },
    Intimidate {
        target: EntityId,
        dc: i32,
    },
    Deceive {
        target: EntityId,
        dc: i32,
    },
    Move {
        direction: String,
    },
    Look,
    Search {
        dc: i32,
    },
    Interact {
        target: EntityId,
    },
    UseItem {
        item: EntityId,
    },
    PickUp {
        item: EntityId,
    },
    Drop {
        item: EntityId,
    },
    Give {
        item: EntityId,
        recipient: EntityId,
    },
    Rest {
        kind: RestKind,
    },
    Wait,
    AskQuestion {
        question: String,
    },
    Fork {
        branch: String,
        reason: String,
    },
    Unclear {
        raw: Option<String>,
    },
}

/// Structured result of one resolved turn.
#[derive(Debug, Clone, Default)]
pub struct SkillResult {
    pub success: bool,
    pub reason: Option<String>,
    pub outcome: EventOutcome,
    pub check: Option<CheckResult>,
    pub attack: Option<AttackResult>,
    pub gm_move_type: Option<GmMoveType>,
    pub entities_created: Vec<EntityId>,
    pub state_changes: Vec<String>,
    pub narrative: Option<String>,
}

impl SkillResult {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// A turn's outcome plus the events it appended.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub skill_result: SkillResult,
    pub events: Vec<EventId>,
}

/// Everything loaded for one turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub universe: Universe,
    pub actor: Entity,
    pub location: Option<Entity>,
    pub entities_present: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub recent_events: Vec<GameEvent>,
    next_time: GameTime,
}

impl TurnContext {
    fn danger_level(&self) -> u8 {
        self.location
            .as_ref()
            .and_then(|l| l.as_location())
            .map(|l| l.danger_level)
            .unwrap_or(0)
    }

    /// Hand out strictly increasing in-game timestamps within the turn.
    fn take_time(&mut self) -> GameTime {
        let time = self.next_time;
        self.next_time = self.next_time.tick();
        time
    }
}

/// The router.
pub struct TurnRouter {
    truth: Arc<dyn TruthRepo>,
    graph: Arc<dyn GraphRepo>,
    skills: SkillService,
    effects: EffectPipeline,
    resources: ResourceService,
    npc: NpcDecisionService,
    moves: MoveExecutor,
    multiverse: MultiverseService,
    abilities: HashMap<AbilityId, UnifiedAbility>,
    overlays: HashMap<UniverseId, PhysicsOverlay>,
    roller: Box<dyn DieRoller + Send>,
}

impl TurnRouter {
    pub fn new(
        truth: Arc<dyn TruthRepo>,
        graph: Arc<dyn GraphRepo>,
        moves: MoveExecutor,
        roller: Box<dyn DieRoller + Send>,
    ) -> Self {
        let multiverse = MultiverseService::new(truth.clone(), graph.clone());
        Self {
            truth,
            graph,
            skills: SkillService::new(),
            effects: EffectPipeline::new(),
            resources: ResourceService::new(),
            npc: NpcDecisionService::new(),
            moves,
            multiverse,
            abilities: HashMap::new(),
            overlays: HashMap::new(),
            roller,
        }
    }

    /// Register a usable ability (from the content loader or a test).
    pub fn register_ability(&mut self, ability: UnifiedAbility) -> Result<AbilityId, DomainError> {
        ability.validate()?;
        let id = ability.id;
        self.abilities.insert(id, ability);
        Ok(id)
    }

    /// Configure a universe's physics overlay.
    pub fn set_overlay(&mut self, universe_id: UniverseId, overlay: PhysicsOverlay) {
        self.overlays.insert(universe_id, overlay);
    }

    fn overlay_for(&self, universe_id: UniverseId) -> PhysicsOverlay {
        self.overlays.get(&universe_id).copied().unwrap_or_default()
    }

    /// Run one turn. The single public entry point of the core.
    pub async fn run_turn(
        &mut self,
        universe_id: UniverseId,
        actor_id: EntityId,
        intent: Intent,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        // Unclear intents consume nothing, not even a context load.
        if let Intent::Unclear { .. } = intent {
            return Ok(TurnResult {
                skill_result: SkillResult::failed("unclear"),
                events: Vec::new(),
            });
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut ctx = self.load_context(universe_id, actor_id).await?;
            match self.resolve(&mut ctx, &intent, now).await {
                Ok(result) => return Ok(result),
                Err(DomainError::ConflictState(reason)) if attempts == 1 => {
                    tracing::warn!(%reason, "stale turn state, retrying with fresh context");
                    continue;
                }
                Err(err) if err.is_recoverable() => {
                    return Ok(TurnResult {
                        skill_result: SkillResult::failed(err.to_string()),
                        events: Vec::new(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Context phase: actor, location, co-present entities, known
    /// relationships, recent events.
    async fn load_context(
        &self,
        universe_id: UniverseId,
        actor_id: EntityId,
    ) -> Result<TurnContext, DomainError> {
        let universe = self
            .truth
            .get_universe(universe_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Universe", universe_id.to_string()))?;
        let actor = self
            .truth
            .load_entity(universe_id, actor_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Entity", actor_id.to_string()))?;

        let relationships = self
            .graph
            .query_relationships(universe_id, actor_id)
            .await
            .map_err(DomainError::from)?;
        let location = match relationships
            .iter()
            .find(|r| r.kind == RelationshipKind::LocatedIn && r.from == actor_id)
        {
            Some(edge) => self
                .truth
                .load_entity(universe_id, edge.to)
                .await
                .map_err(DomainError::from)?,
            None => None,
        };

        let entities_present = match &location {
            Some(location) => self
                .graph
                .query_entities_at_location(universe_id, location.id)
                .await
                .map_err(DomainError::from)?,
            None => Vec::new(),
        };

        let recent_events = self
            .truth
            .list_events(universe_id, Some(10))
            .await
            .map_err(DomainError::from)?;
        let next_time = recent_events
            .last()
            .map(|e| e.game_time.tick())
            .unwrap_or_else(GameTime::zero);

        Ok(TurnContext {
            universe,
            actor,
            location,
            entities_present,
            relationships,
            recent_events,
            next_time,
        })
    }

    /// Resolve phase: the fixed dispatch table.
    async fn resolve(
        &mut self,
        ctx: &mut TurnContext,
        intent: &Intent,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        match intent {
            Intent::Attack {
                target,
                weapon,
                cover,
            } => self.do_attack(ctx, *target, *weapon, *cover, now).await,
            Intent::Persuade { target, dc } => {
                self.do_social_check(ctx, *target, Skill::Persuasion, *dc, now).await
            }
            Intent::Intimidate { target, dc } => {
                self.do_social_check(ctx, *target, Skill::Intimidation, *dc, now).await
            }
            Intent::Deceive { target, dc } => {
                self.do_social_check(ctx, *target, Skill::Deception, *dc, now).await
            }
            Intent::Search { dc } => self.do_search(ctx, *dc, now).await,
            Intent::CastSpell { ability, targets } | Intent::UseAbility { ability, targets } => {
                self.do_use_ability(ctx, *ability, targets, now).await
            }
            Intent::Move { direction } => self.do_move(ctx, direction, now).await,
            Intent::Look => Ok(self.do_look(ctx)),
            Intent::Rest { kind } => self.do_rest(ctx, *kind, now).await,
            Intent::Wait => self.do_wait(ctx, now).await,
            Intent::Talk { target, topic } => {
                self.do_talk(ctx, *target, topic.clone(), now).await
            }
            Intent::AskQuestion { question } => {
                self.do_ask_question(ctx, question, now).await
            }
            Intent::Interact { target } => self.do_interact(ctx, *target, now).await,
            Intent::PickUp { item } => self.do_pick_up(ctx, *item, now).await,
            Intent::Drop { item } => self.do_drop(ctx, *item, now).await,
            Intent::Give { item, recipient } => self.do_give(ctx, *item, *recipient, now).await,
            Intent::UseItem { item } => self.do_use_item(ctx, *item, now).await,
            Intent::Fork { branch, reason } => self.do_fork(ctx, branch, reason, now).await,
            Intent::Unclear { .. } => Ok(TurnResult {
                skill_result: SkillResult::failed("unclear"),
                events: Vec::new(),
            }),
        }
    }

    fn find_present(&self, ctx: &TurnContext, id: EntityId) -> Result<Entity, DomainError> {
        ctx.entities_present
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Entity", id.to_string()))
    }

    async fn load_required(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Entity, DomainError> {
        self.truth
            .load_entity(universe_id, id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Entity", id.to_string()))
    }

    /// On a PbtA miss, pick and execute a GM move and merge its results.
    async fn run_gm_move(
        &mut self,
        ctx: &mut TurnContext,
        caused_by: Option<EventId>,
        now: DateTime<Utc>,
        result: &mut SkillResult,
    ) -> Result<(), DomainError> {
        let Some(location) = ctx.location.clone() else {
            return Ok(());
        };
        let move_type = GmMoveType::select(ctx.danger_level(), ctx.recent_events.len());
        let move_ctx = MoveContext {
            universe_id: ctx.universe.id,
            actor_id: ctx.actor.id,
            location,
            game_time: ctx.take_time(),
            now,
            round: ctx.actor.as_character().map(|s| s.resources.solo.round).unwrap_or(0),
            caused_by,
        };
        let move_result: MoveResult = self
            .moves
            .execute(move_type, &move_ctx, self.roller.as_mut())
            .await?;
        // The executor appended its own events; keep local time ahead.
        ctx.next_time = ctx.next_time.tick();

        result.gm_move_type = Some(move_type);
        result.entities_created = move_result.entities_created;
        result.state_changes.extend(move_result.state_changes);
        result.narrative = Some(move_result.narrative);
        Ok(())
    }

    async fn do_attack(
        &mut self,
        ctx: &mut TurnContext,
        target_id: EntityId,
        weapon_id: EntityId,
        cover: Cover,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let mut target = self.load_required(ctx.universe.id, target_id).await?;
        let weapon = self.load_required(ctx.universe.id, weapon_id).await?;

        let attack = self.skills.resolve_attack(
            &ctx.actor,
            &target,
            &weapon,
            cover,
            self.roller.as_mut(),
        )?;
        let band = OutcomeBand::from_attack(attack.hit, attack.critical);

        // Apply the state changes first, then record the events in
        // chronological order.
        let mut state_changes = Vec::new();
        let mut concentration_break = None;
        if let Some(damage) = attack.damage {
            if let Some(stats) = target.as_character_mut() {
                stats.apply_damage(damage);
                state_changes.push(format!("{} took {} damage", target.name, damage));
            }
            // Concentration shaken by the hit.
            if let Some(check) =
                self.effects
                    .check_concentration(&mut target, damage, self.roller.as_mut())?
            {
                if check.broken {
                    state_changes.push(format!("{} lost concentration", target.name));
                    concentration_break = Some(check);
                }
            }
        }

        // A broken concentration strips the ability's effects from every
        // entity it touched, not just the caster.
        let mut collaterals: Vec<Entity> = Vec::new();
        if let Some(dropped) = concentration_break
            .as_ref()
            .and_then(|check| check.dropped_ability)
        {
            for mut entity in self
                .truth
                .list_entities(ctx.universe.id)
                .await
                .map_err(DomainError::from)?
            {
                if entity.id == target.id {
                    continue;
                }
                if !strip_concentration_effects(&mut entity, dropped).is_empty() {
                    collaterals.push(entity);
                }
            }
        }

        // Death bookkeeping for a downed target.
        let mut target_died = false;
        if target.as_character().map(|s| s.hp == 0 && !s.dead).unwrap_or(false) {
            if self.try_defy_death(&mut target)? {
                state_changes.push(format!("{} defied death", target.name));
            } else {
                if let Some(stats) = target.as_character_mut() {
                    stats.dead = true;
                }
                target_died = true;
                state_changes.push(format!("{} died", target.name));
            }
        }

        let mut events = Vec::new();
        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;

        let mut event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::CombatRound,
        )
        .with_target(target_id)
        .with_outcome(band_outcome(band))
        .with_roll(attack.attack_roll)
        .with_payload_field("total_attack", json!(attack.total_attack))
        .with_payload_field("critical", json!(attack.critical));
        if let Some(location) = &ctx.location {
            event = event.with_location(location.id);
        }
        if let Some(damage) = attack.damage {
            event = event.with_payload_field("damage", json!(damage));
        }
        if target_died {
            event = event.with_payload_field("target_death", json!(true));
        }
        let primary_id = event.id;
        events.push(primary_id);
        tx.stage_event(event);

        if let Some(check) = concentration_break {
            let broken = GameEvent::new(
                ctx.universe.id,
                ctx.take_time(),
                now,
                target_id,
                EventType::ConcentrationBroken,
            )
            .caused_by(primary_id)
            .with_roll(check.save.total)
            .with_payload_field("dc", json!(check.dc));
            events.push(broken.id);
            tx.stage_event(broken);
        }

        if target_died {
            let death = GameEvent::new(
                ctx.universe.id,
                ctx.take_time(),
                now,
                target_id,
                EventType::Death,
            )
            .caused_by(primary_id);
            events.push(death.id);
            tx.stage_event(death);
        }

        tx.stage_entity(target.clone());
        for entity in &collaterals {
            tx.stage_entity(entity.clone());
        }
        tx.commit().await.map_err(DomainError::from)?;

        let mut result = SkillResult {
            success: attack.hit,
            reason: None,
            outcome: band_outcome(band),
            check: None,
            attack: Some(attack),
            gm_move_type: None,
            entities_created: Vec::new(),
            state_changes,
            narrative: None,
        };
        if target_died {
            result.state_changes.push("target_death".into());
        }

        if band.triggers_gm_move() {
            self.run_gm_move(ctx, events.first().copied(), now, &mut result).await?;
        }

        Ok(TurnResult {
            skill_result: result,
            events,
        })
    }

    /// Defy-death pre-check; true when the drop to zero was prevented.
    fn try_defy_death(&mut self, target: &mut Entity) -> Result<bool, DomainError> {
        let eligible = target
            .as_character()
            .map(|s| s.resources.defy_death.uses_remaining > 0)
            .unwrap_or(false);
        if !eligible {
            return Ok(false);
        }
        let damage_this_round = target
            .as_character()
            .map(|s| s.resources.solo.damage_this_round)
            .unwrap_or(0);
        match self
            .resources
            .try_defy_death(target, damage_this_round, self.roller.as_mut())
        {
            Ok(DefyOutcome::Prevented { .. }) => Ok(true),
            Ok(DefyOutcome::Failed { .. }) => Ok(false),
            Err(DomainError::InsufficientResource(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn do_social_check(
        &mut self,
        ctx: &mut TurnContext,
        target_id: EntityId,
        skill: Skill,
        dc: i32,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        // The target must at least exist in this universe.
        let _target = self.load_required(ctx.universe.id, target_id).await?;

        let check = self
            .skills
            .skill_check(&ctx.actor, skill, dc, self.roller.as_mut())?;
        let band = check.band;

        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::SkillCheck,
        )
        .with_target(target_id)
        .with_outcome(band_outcome(band))
        .with_roll(check.roll)
        .with_payload_field("skill", json!(check_skill_name(skill)))
        .with_payload_field("dc", json!(dc))
        .with_payload_field("total", json!(check.total))
        .with_payload_field("margin", json!(check.margin));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        let mut result = SkillResult {
            success: check.success,
            reason: None,
            outcome: band_outcome(band),
            check: Some(check),
            attack: None,
            gm_move_type: None,
            entities_created: Vec::new(),
            state_changes: Vec::new(),
            narrative: None,
        };

        if band.triggers_gm_move() {
            self.run_gm_move(ctx, Some(event_id), now, &mut result).await?;
        }

        Ok(TurnResult {
            skill_result: result,
            events: vec![event_id],
        })
    }

    async fn do_search(
        &mut self,
        ctx: &mut TurnContext,
        dc: i32,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let check = self
            .skills
            .skill_check(&ctx.actor, Skill::Perception, dc, self.roller.as_mut())?;
        let band = check.band;

        let mut event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::SkillCheck,
        )
        .with_outcome(band_outcome(band))
        .with_roll(check.roll)
        .with_payload_field("skill", json!("perception"))
        .with_payload_field("dc", json!(dc));
        if let Some(location) = &ctx.location {
            event = event.with_location(location.id);
        }
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        let mut state_changes = Vec::new();
        if check.success {
            for entity in &ctx.entities_present {
                if entity.id != ctx.actor.id {
                    state_changes.push(format!("noticed {}", entity.name));
                }
            }
        }

        let mut result = SkillResult {
            success: check.success,
            reason: None,
            outcome: band_outcome(band),
            check: Some(check),
            attack: None,
            gm_move_type: None,
            entities_created: Vec::new(),
            state_changes,
            narrative: None,
        };
        if band.triggers_gm_move() {
            self.run_gm_move(ctx, Some(event_id), now, &mut result).await?;
        }

        Ok(TurnResult {
            skill_result: result,
            events: vec![event_id],
        })
    }

    async fn do_use_ability(
        &mut self,
        ctx: &mut TurnContext,
        ability_id: AbilityId,
        target_ids: &[EntityId],
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let ability = self
            .abilities
            .get(&ability_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Ability", ability_id.to_string()))?;

        // Targeting validation before any resource is spent.
        match ability.targeting.mode {
            TargetMode::SelfOnly => {
                if !(target_ids.is_empty()
                    || (target_ids.len() == 1 && target_ids[0] == ctx.actor.id))
                {
                    return Err(DomainError::invalid_target(format!(
                        "{} only targets the user",
                        ability.name
                    )));
                }
            }
            TargetMode::Single => {
                if target_ids.len() != 1 {
                    return Err(DomainError::invalid_target(format!(
                        "{} needs exactly one target",
                        ability.name
                    )));
                }
            }
            TargetMode::Multiple => {
                let max = ability.targeting.max_targets.unwrap_or(u32::MAX) as usize;
                if target_ids.is_empty() || target_ids.len() > max {
                    return Err(DomainError::invalid_target(format!(
                        "{} takes between 1 and {} targets",
                        ability.name, max
                    )));
                }
            }
            _ => {
                if target_ids.is_empty() {
                    return Err(DomainError::invalid_target(format!(
                        "{} needs targets in its area",
                        ability.name
                    )));
                }
            }
        }

        let overlay = self.overlay_for(ctx.universe.id);
        if !overlay.allows(ability.source.kind) {
            return Err(DomainError::rule_violation(format!(
                "{} abilities do not function in this universe",
                ability.source.subtype
            )));
        }

        let mut actor = ctx.actor.clone();
        let debit = self
            .resources
            .pay_for_ability(&mut actor, &ability, self.roller.as_mut())?;

        // Load and mutate targets.
        let self_targeting = ability.targeting.mode == TargetMode::SelfOnly
            || target_ids.iter().all(|t| *t == actor.id);
        let mut loaded: Vec<Entity> = Vec::new();
        if !self_targeting {
            for id in target_ids {
                loaded.push(self.load_required(ctx.universe.id, *id).await?);
            }
        }

        let round = actor
            .as_character()
            .map(|s| s.resources.solo.round)
            .unwrap_or(0);
        let application = if self_targeting {
            // Apply to a detached copy, then fold the changes back in.
            let mut target_copy = actor.clone();
            let mut refs = [&mut target_copy];
            let application = self.effects.apply_ability_effects(
                &mut actor,
                &mut refs,
                &ability,
                &overlay,
                round,
                self.roller.as_mut(),
            )?;
            let held = actor.as_character().map(|s| s.resources.solo.concentrating_on);
            actor = target_copy;
            if let (Some(held), Some(stats)) = (held.flatten(), actor.as_character_mut()) {
                stats.resources.solo.concentrating_on = Some(held);
            }
            application
        } else {
            let mut refs: Vec<&mut Entity> = loaded.iter_mut().collect();
            self.effects.apply_ability_effects(
                &mut actor,
                &mut refs,
                &ability,
                &overlay,
                round,
                self.roller.as_mut(),
            )?
        };

        // Record: resource spend, then per-target outcomes.
        let mut events = Vec::new();
        let mut state_changes = Vec::new();
        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;

        let mut spend = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            actor.id,
            EventType::ResourceUsed,
        )
        .with_payload_field("ability", json!(ability.name.clone()))
        .with_payload_field("cost", json!(debit.description.clone()));
        if let Some(first) = target_ids.first() {
            spend = spend.with_target(*first);
        }
        for outcome in &application.targets {
            if outcome.damage_dealt > 0 {
                state_changes.push(format!("{} damage to target", outcome.damage_dealt));
            }
            if outcome.healing_done > 0 {
                state_changes.push(format!("{} healing to target", outcome.healing_done));
            }
            if let Some(kind) = outcome.condition_applied {
                state_changes.push(format!("applied {}", kind));
            }
        }
        let spend_id = spend.id;
        events.push(spend_id);
        tx.stage_event(spend);

        if debit.breaking_point {
            let breaking = GameEvent::new(
                ctx.universe.id,
                ctx.take_time(),
                now,
                actor.id,
                EventType::BreakingPoint,
            )
            .caused_by(spend_id);
            events.push(breaking.id);
            tx.stage_event(breaking);
            state_changes.push(format!("{} hit a breaking point", actor.name));
        }

        tx.stage_entity(actor.clone());
        for target in &loaded {
            tx.stage_entity(target.clone());
        }
        tx.commit().await.map_err(DomainError::from)?;
        ctx.actor = actor;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                reason: None,
                outcome: EventOutcome::Success,
                check: None,
                attack: None,
                gm_move_type: None,
                entities_created: Vec::new(),
                state_changes,
                narrative: None,
            },
            events,
        })
    }

    async fn do_move(
        &mut self,
        ctx: &mut TurnContext,
        direction: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let location = ctx
            .location
            .as_ref()
            .ok_or_else(|| DomainError::bad_input("nowhere to move from"))?;
        let exits = &location.expect_location()?.exits;
        let destination = *exits.get(direction).ok_or_else(|| {
            DomainError::bad_input(format!("no exit '{}' from {}", direction, location.name))
        })?;

        // Strict location change: edge first, then the TRAVEL event.
        self.graph
            .create_relationship(&Relationship::new(
                ctx.universe.id,
                ctx.actor.id,
                destination,
                RelationshipKind::LocatedIn,
            ))
            .await
            .map_err(DomainError::from)?;

        let from_location_id = location.id.to_string();
        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::Travel,
        )
        .with_location(destination)
        .with_payload_field("direction", json!(direction))
        .with_payload_field("from", json!(from_location_id));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                state_changes: vec![format!("moved {}", direction)],
                outcome: EventOutcome::Success,
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    fn do_look(&self, ctx: &TurnContext) -> TurnResult {
        let mut state_changes = Vec::new();
        if let Some(location) = &ctx.location {
            state_changes.push(format!("at {}", location.name));
            if let Ok(stats) = location.expect_location() {
                let mut directions: Vec<&String> = stats.exits.keys().collect();
                directions.sort();
                for direction in directions {
                    state_changes.push(format!("exit {}", direction));
                }
            }
        }
        for entity in &ctx.entities_present {
            if entity.id != ctx.actor.id {
                state_changes.push(format!("present: {}", entity.name));
            }
        }
        // Look is free: no event, no resource.
        TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Neutral,
                state_changes,
                ..Default::default()
            },
            events: Vec::new(),
        }
    }

    async fn do_rest(
        &mut self,
        ctx: &mut TurnContext,
        kind: RestKind,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let mut actor = ctx.actor.clone();
        self.resources.rest(&mut actor, kind)?;

        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;
        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            actor.id,
            EventType::Rest,
        )
        .with_payload_field(
            "kind",
            json!(match kind {
                RestKind::Short => "short",
                RestKind::Long => "long",
            }),
        );
        let event_id = event.id;
        tx.stage_event(event);
        tx.stage_entity(actor.clone());
        tx.commit().await.map_err(DomainError::from)?;
        ctx.actor = actor;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Success,
                state_changes: vec!["rested".into()],
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_wait(
        &mut self,
        ctx: &mut TurnContext,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::TimeAdvanced,
        )
        .with_payload_field("minutes", json!(1));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Neutral,
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_talk(
        &mut self,
        ctx: &mut TurnContext,
        target_id: EntityId,
        topic: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let target = self.find_present(ctx, target_id)?;

        // The narrative layer writes the dialogue; the core records the
        // exchange and reports the NPC's stance.
        let decision = self.npc.decide(
            &target,
            &DecisionContext {
                danger_level: ctx.danger_level(),
                recent_event_count: ctx.recent_events.len(),
                visible_entities: ctx.entities_present.iter().map(|e| e.id).collect(),
                relationships: self
                    .graph
                    .query_relationships(ctx.universe.id, target_id)
                    .await
                    .map_err(DomainError::from)?,
                has_usable_ability: false,
            },
        )?;

        let mut event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::Dialogue,
        )
        .with_target(target_id)
        .with_payload_field("stance", json!(format!("{:?}", decision.action)));
        if let Some(topic) = &topic {
            event = event.with_payload_field("topic", json!(topic));
        }
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Neutral,
                state_changes: vec![format!("{} is inclined to {:?}", target.name, decision.action)],
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_ask_question(
        &mut self,
        ctx: &mut TurnContext,
        question: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::Dialogue,
        )
        .with_payload_field("question", json!(question));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Neutral,
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_interact(
        &mut self,
        ctx: &mut TurnContext,
        target_id: EntityId,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let target = self.find_present(ctx, target_id)?;
        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::Dialogue,
        )
        .with_target(target_id)
        .with_payload_field("kind", json!("interact"));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Neutral,
                state_changes: vec![format!("interacted with {}", target.name)],
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_pick_up(
        &mut self,
        ctx: &mut TurnContext,
        item_id: EntityId,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let item = self.load_required(ctx.universe.id, item_id).await?;
        if item.as_item().map(|s| !s.active).unwrap_or(false) {
            return Err(DomainError::invalid_target(format!(
                "the {} is gone",
                item.name
            )));
        }

        self.graph
            .create_relationship(&Relationship::new(
                ctx.universe.id,
                ctx.actor.id,
                item_id,
                RelationshipKind::Carries,
            ))
            .await
            .map_err(DomainError::from)?;

        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::ItemTransfer,
        )
        .with_target(item_id)
        .with_payload_field("kind", json!("pick_up"));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Success,
                state_changes: vec![format!("picked up {}", item.name)],
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_drop(
        &mut self,
        ctx: &mut TurnContext,
        item_id: EntityId,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let carried = ctx
            .relationships
            .iter()
            .find(|r| {
                r.kind == RelationshipKind::Carries && r.from == ctx.actor.id && r.to == item_id
            })
            .ok_or_else(|| DomainError::invalid_target("not carrying that"))?;

        self.graph
            .delete_relationship(carried.id)
            .await
            .map_err(DomainError::from)?;

        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::ItemTransfer,
        )
        .with_target(item_id)
        .with_payload_field("kind", json!("drop"));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Success,
                state_changes: vec!["dropped item".into()],
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_give(
        &mut self,
        ctx: &mut TurnContext,
        item_id: EntityId,
        recipient_id: EntityId,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let recipient = self.find_present(ctx, recipient_id)?;
        let carried = ctx
            .relationships
            .iter()
            .find(|r| {
                r.kind == RelationshipKind::Carries && r.from == ctx.actor.id && r.to == item_id
            })
            .ok_or_else(|| DomainError::invalid_target("not carrying that"))?;

        self.graph
            .delete_relationship(carried.id)
            .await
            .map_err(DomainError::from)?;
        self.graph
            .create_relationship(&Relationship::new(
                ctx.universe.id,
                recipient_id,
                item_id,
                RelationshipKind::Carries,
            ))
            .await
            .map_err(DomainError::from)?;

        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::ItemTransfer,
        )
        .with_target(recipient_id)
        .with_payload_field("kind", json!("give"))
        .with_payload_field("item", json!(item_id.to_string()));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Success,
                state_changes: vec![format!("gave item to {}", recipient.name)],
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_use_item(
        &mut self,
        ctx: &mut TurnContext,
        item_id: EntityId,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let item = self.load_required(ctx.universe.id, item_id).await?;
        if item.as_item().map(|s| !s.active).unwrap_or(true) {
            return Err(DomainError::invalid_target(format!(
                "the {} cannot be used",
                item.name
            )));
        }

        let event = GameEvent::new(
            ctx.universe.id,
            ctx.take_time(),
            now,
            ctx.actor.id,
            EventType::ResourceUsed,
        )
        .with_target(item_id)
        .with_payload_field("kind", json!("use_item"));
        let event_id = event.id;
        self.truth.append_event(&event).await.map_err(DomainError::from)?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Success,
                state_changes: vec![format!("used {}", item.name)],
                ..Default::default()
            },
            events: vec![event_id],
        })
    }

    async fn do_fork(
        &mut self,
        ctx: &mut TurnContext,
        branch: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, DomainError> {
        let fork = self
            .multiverse
            .fork_universe(ctx.universe.id, branch, reason, ctx.actor.id, now)
            .await?;

        Ok(TurnResult {
            skill_result: SkillResult {
                success: true,
                outcome: EventOutcome::Success,
                state_changes: vec![
                    format!("forked into '{}'", branch),
                    format!("child universe {}", fork.child.id),
                ],
                ..Default::default()
            },
            events: vec![fork.parent_event.id, fork.child_event.id],
        })
    }

    /// Start-of-round upkeep for solo combat: momentum, fray die,
    /// recharges, flag reset, and the actor's effect tick. Enemy kills
    /// land as COMBAT_ROUND events with the target_death flag.
    pub async fn begin_combat_round(
        &mut self,
        universe_id: UniverseId,
        actor_id: EntityId,
        enemy_ids: &[EntityId],
        round: u32,
        split_fray: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventId>, DomainError> {
        let mut ctx = self.load_context(universe_id, actor_id).await?;
        let mut actor = ctx.actor.clone();
        let mut enemies = Vec::new();
        for id in enemy_ids {
            enemies.push(self.load_required(universe_id, *id).await?);
        }

        let mut enemy_refs: Vec<&mut Entity> = enemies.iter_mut().collect();
        let report = self.resources.begin_solo_round(
            &mut actor,
            &mut enemy_refs,
            round,
            split_fray,
            self.roller.as_mut(),
        )?;
        self.effects
            .tick_combat_round(&mut actor, round, self.roller.as_mut())?;

        let mut events = Vec::new();
        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;
        for hit in &report.fray_hits {
            let mut event = GameEvent::new(
                universe_id,
                ctx.take_time(),
                now,
                actor_id,
                EventType::CombatRound,
            )
            .with_target(hit.target_id)
            .with_outcome(EventOutcome::Hit)
            .with_roll(report.fray_roll)
            .with_payload_field("fray_die", json!(format!("d{}", report.fray_die)))
            .with_payload_field("damage", json!(hit.damage));
            if hit.killed {
                event = event.with_payload_field("target_death", json!(true));
            }
            events.push(event.id);
            tx.stage_event(event);
        }

        for enemy in &mut enemies {
            if enemy.as_character().map(|s| s.hp == 0 && !s.dead).unwrap_or(false) {
                if let Some(stats) = enemy.as_character_mut() {
                    stats.dead = true;
                }
            }
            tx.stage_entity(enemy.clone());
        }
        tx.stage_entity(actor.clone());
        tx.commit().await.map_err(DomainError::from)?;

        Ok(events)
    }
}

fn band_outcome(band: OutcomeBand) -> EventOutcome {
    match band {
        OutcomeBand::StrongHit => EventOutcome::StrongHit,
        OutcomeBand::Success => EventOutcome::Success,
        OutcomeBand::WeakHit => EventOutcome::WeakHit,
        OutcomeBand::Miss => EventOutcome::Miss,
    }
}

fn check_skill_name(skill: Skill) -> &'static str {
    match skill {
        Skill::Persuasion => "persuasion",
        Skill::Intimidation => "intimidation",
        Skill::Deception => "deception",
        Skill::Perception => "perception",
        _ => "check",
    }
}
