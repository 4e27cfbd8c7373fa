//! Value objects: dice, abilities, resources, conditions, personalities,
//! and physics overlays.

pub mod ability;
pub mod conditions;
pub mod dice;
pub mod overlay;
pub mod personality;
pub mod resources;

pub use ability::{
    AbilitySource, ActionCost, ConditionEffect, DamageEffect, HealingEffect, ResourceMechanism,
    SaveSpec, SourceKind, StatModifierEffect, TargetMode, Targeting, UnifiedAbility,
};
pub use conditions::{
    ActiveEffect, AdvantageState, ConditionInstance, ConditionKind, DurationKind, EffectDuration,
    ModifierAmount, ModifierKind,
};
pub use dice::{DiceParseError, DiceTerm, DieRoller, Keep, RollOutcome, RollSpec, SignedTerm};
pub use overlay::{PhysicsOverlay, SourceRule};
pub use personality::{Motivation, PersonalityProfile};
pub use resources::{
    fray_die_sides, CooldownTracker, DefyDeath, ResourcePool, RestKind, SlotCounter,
    SoloCombatState, StressOutcome, StressPool, UsageDie, UsageDieRoll, UsageDieSize,
    DEFY_DEATH_MAX_USES,
};
