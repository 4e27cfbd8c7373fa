//! TTA-Solo domain layer
//!
//! Pure rules and data shapes: dice notation, the unified ability object,
//! resource pools, conditions, entities, universes, the event model, and
//! the SRD/PbtA math. No I/O and no random source live here; persistence
//! and rolling are injected by the engine crate through ports.

pub mod entities;
pub mod error;
pub mod game_systems;
pub mod game_time;
pub mod ids;
pub mod value_objects;

pub use entities::{
    AbilityScores, CharacterStats, DeathSaves, Entity, EntityKind, EventOutcome, EventType,
    FactionStats, GameEvent, ItemStats, LocationStats, LocationType, ObjectStats, Quest,
    QuestObjective, QuestReward, QuestStatus, Relationship, RelationshipKind, Universe,
    UniverseStatus,
};
pub use error::DomainError;
pub use game_systems::{
    ability_modifier, proficiency_bonus, Ability, Cover, GmMoveType, OutcomeBand, Skill,
};
pub use game_time::GameTime;
pub use ids::{
    AbilityId, EntityId, EventId, QuestId, RelationshipId, SnapshotId, UniverseId,
};
pub use value_objects::{
    fray_die_sides, AbilitySource, ActionCost, ActiveEffect, AdvantageState, ConditionEffect,
    ConditionInstance, ConditionKind, CooldownTracker, DamageEffect, DefyDeath, DiceParseError,
    DiceTerm, DieRoller, DurationKind, EffectDuration, HealingEffect, Keep, ModifierAmount,
    ModifierKind, Motivation, PersonalityProfile, PhysicsOverlay, ResourceMechanism, ResourcePool,
    RestKind, RollOutcome, RollSpec, SaveSpec, SignedTerm, SlotCounter, SoloCombatState,
    SourceKind, SourceRule, StatModifierEffect, StressOutcome, StressPool, TargetMode, Targeting,
    UnifiedAbility, UsageDie, UsageDieRoll, UsageDieSize, DEFY_DEATH_MAX_USES,
};
