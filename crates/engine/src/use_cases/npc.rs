//! Personality-driven NPC action selection.
//!
//! Scoring is a deterministic weighted sum over the candidate set: base
//! weights from trait/motivation pairs, modulated by context (danger
//! raises flee and attack weights for high-neuroticism NPCs, trust raises
//! assist). No randomness: ties break toward the lowest action id so
//! replays agree.

use std::collections::BTreeMap;

use ttasolo_domain::{
    DomainError, Entity, EntityId, Motivation, PersonalityProfile, Relationship,
    RelationshipKind,
};

/// The candidate actions, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NpcAction {
    Attack,
    Flee,
    Negotiate,
    Assist,
    Observe,
    UseAbility,
    Leave,
}

impl NpcAction {
    pub const ALL: [NpcAction; 7] = [
        NpcAction::Attack,
        NpcAction::Flee,
        NpcAction::Negotiate,
        NpcAction::Assist,
        NpcAction::Observe,
        NpcAction::UseAbility,
        NpcAction::Leave,
    ];
}

/// What the NPC can see when deciding.
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    pub danger_level: u8,
    pub recent_event_count: usize,
    /// Entities visible in the scene, including the player.
    pub visible_entities: Vec<EntityId>,
    /// The NPC's known relationships.
    pub relationships: Vec<Relationship>,
    /// Whether the NPC has a usable ability.
    pub has_usable_ability: bool,
}

/// The chosen action plus the full score table for tests and narration.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: NpcAction,
    pub scores: BTreeMap<NpcAction, f32>,
}

/// The decision service.
#[derive(Debug, Default, Clone, Copy)]
pub struct NpcDecisionService;

impl NpcDecisionService {
    pub fn new() -> Self {
        Self
    }

    /// Score the candidate set for an NPC and pick the best action.
    pub fn decide(&self, npc: &Entity, ctx: &DecisionContext) -> Result<Decision, DomainError> {
        let stats = npc.expect_character()?;
        let personality = stats.personality.unwrap_or_default();
        let motivations = &stats.motivations;

        let mut scores = BTreeMap::new();
        for action in NpcAction::ALL {
            scores.insert(action, self.score(action, &personality, motivations, npc, ctx));
        }

        // Highest score wins; BTreeMap iteration order makes the lowest
        // action id win ties.
        let mut best = NpcAction::Attack;
        let mut best_score = f32::MIN;
        for (&action, &score) in &scores {
            if score > best_score {
                best = action;
                best_score = score;
            }
        }

        tracing::debug!(npc = %npc.name, action = ?best, score = best_score, "npc decision");
        Ok(Decision {
            action: best,
            scores,
        })
    }

    fn score(
        &self,
        action: NpcAction,
        p: &PersonalityProfile,
        motivations: &[Motivation],
        npc: &Entity,
        ctx: &DecisionContext,
    ) -> f32 {
        let danger = ctx.danger_level as f32;
        let has = |m: Motivation| motivations.contains(&m);
        let max_trust = ctx
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Knows && r.from == npc.id)
            .filter_map(|r| r.trust)
            .fold(0.0f32, f32::max);

        match action {
            NpcAction::Attack => {
                let mut score =
                    10.0 + (100 - p.agreeableness) as f32 * 0.3 + p.extraversion as f32 * 0.1;
                if has(Motivation::Aggression) || has(Motivation::Vengeance) {
                    score += 15.0;
                }
                // Cornered and jumpy: high neuroticism lashes out as danger
                // climbs.
                if danger >= 10.0 && p.neuroticism > 60 {
                    score += danger * 0.4;
                }
                score
            }
            NpcAction::Flee => {
                let mut score =
                    5.0 + p.neuroticism as f32 * 0.2 + danger * (p.neuroticism as f32 / 100.0);
                if has(Motivation::Survival) {
                    score += 15.0;
                }
                score
            }
            NpcAction::Negotiate => {
                let mut score = 5.0
                    + p.agreeableness as f32 * 0.2
                    + p.extraversion as f32 * 0.2
                    + p.openness as f32 * 0.1;
                if has(Motivation::Greed) {
                    score += 12.0;
                }
                score
            }
            NpcAction::Assist => {
                let mut score =
                    5.0 + p.agreeableness as f32 * 0.3 + p.conscientiousness as f32 * 0.1;
                if has(Motivation::Loyalty) || has(Motivation::Duty) {
                    score += 15.0;
                }
                score += max_trust * 10.0;
                score
            }
            NpcAction::Observe => {
                let mut score = 20.0
                    + p.conscientiousness as f32 * 0.15
                    + (100 - p.extraversion) as f32 * 0.1;
                if has(Motivation::Curiosity) {
                    score += 12.0;
                }
                // Watching gets harder to justify as danger rises.
                score - danger * 0.3
            }
            NpcAction::UseAbility => {
                let mut score = p.openness as f32 * 0.15;
                if ctx.has_usable_ability {
                    score += 12.0;
                }
                score
            }
            NpcAction::Leave => {
                5.0 + (100 - p.extraversion) as f32 * 0.1 + (100 - p.openness) as f32 * 0.05
            }
        }
    }
}
