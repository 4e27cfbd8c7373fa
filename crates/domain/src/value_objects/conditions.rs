//! Conditions and timed effects
//!
//! Condition semantics are expressed as rule deltas consulted at the
//! attack-roll, save, and movement sites, not as behavior objects. The
//! effect pipeline owns application and expiry; this module owns the data
//! shapes and the advantage arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::game_systems::srd5e::Ability;
use crate::ids::{AbilityId, EntityId};

/// The SRD condition set plus the engine's damage-over-time extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
    Exhaustion,
    // Extensions
    Burning,
    Bleeding,
}

impl ConditionKind {
    /// Conditions that prevent taking actions at all.
    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            ConditionKind::Incapacitated
                | ConditionKind::Paralyzed
                | ConditionKind::Petrified
                | ConditionKind::Stunned
                | ConditionKind::Unconscious
        )
    }

    /// Melee hits against a target in this condition are automatic
    /// criticals.
    pub fn melee_hits_auto_crit(&self) -> bool {
        matches!(self, ConditionKind::Paralyzed | ConditionKind::Unconscious)
    }

    /// Conditions that deal damage at the start of the affected entity's
    /// turn.
    pub fn is_damage_over_time(&self) -> bool {
        matches!(self, ConditionKind::Burning | ConditionKind::Bleeding)
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionKind::Blinded => "blinded",
            ConditionKind::Charmed => "charmed",
            ConditionKind::Deafened => "deafened",
            ConditionKind::Frightened => "frightened",
            ConditionKind::Grappled => "grappled",
            ConditionKind::Incapacitated => "incapacitated",
            ConditionKind::Invisible => "invisible",
            ConditionKind::Paralyzed => "paralyzed",
            ConditionKind::Petrified => "petrified",
            ConditionKind::Poisoned => "poisoned",
            ConditionKind::Prone => "prone",
            ConditionKind::Restrained => "restrained",
            ConditionKind::Stunned => "stunned",
            ConditionKind::Unconscious => "unconscious",
            ConditionKind::Exhaustion => "exhaustion",
            ConditionKind::Burning => "burning",
            ConditionKind::Bleeding => "bleeding",
        };
        write!(f, "{}", s)
    }
}

/// How long a condition or effect persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationKind {
    Rounds,
    Minutes,
    UntilSave,
    UntilRest,
    Permanent,
}

/// Duration state shared by conditions and active effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectDuration {
    pub kind: DurationKind,
    /// Rounds or minutes remaining; unused for the open-ended kinds.
    pub remaining: u32,
}

impl EffectDuration {
    pub fn rounds(remaining: u32) -> Self {
        Self {
            kind: DurationKind::Rounds,
            remaining,
        }
    }

    pub fn minutes(remaining: u32) -> Self {
        Self {
            kind: DurationKind::Minutes,
            remaining,
        }
    }

    pub fn until_save() -> Self {
        Self {
            kind: DurationKind::UntilSave,
            remaining: 0,
        }
    }

    pub fn until_rest() -> Self {
        Self {
            kind: DurationKind::UntilRest,
            remaining: 0,
        }
    }

    pub fn permanent() -> Self {
        Self {
            kind: DurationKind::Permanent,
            remaining: 0,
        }
    }

    /// Decrement one round. Returns true when the duration has expired.
    /// Only round-based durations tick per combat round; minutes tick
    /// every ten rounds of the caller's choosing, so callers convert.
    pub fn tick_round(&mut self) -> bool {
        match self.kind {
            DurationKind::Rounds | DurationKind::Minutes => {
                self.remaining = self.remaining.saturating_sub(1);
                self.remaining == 0
            }
            DurationKind::UntilSave | DurationKind::UntilRest | DurationKind::Permanent => false,
        }
    }

    pub fn expires_on_rest(&self) -> bool {
        matches!(self.kind, DurationKind::UntilRest)
    }
}

/// A condition applied to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionInstance {
    pub kind: ConditionKind,
    pub duration: EffectDuration,
    /// Combat round the condition landed on.
    pub applied_at_round: u32,
    /// End-of-turn save that removes the condition, for until_save
    /// durations.
    pub save_ability: Option<Ability>,
    pub save_dc: Option<i32>,
    /// Damage dealt at the start of the turn, for DoT conditions.
    pub dot_dice: Option<String>,
    /// Event or ability that caused the condition, for narration.
    pub source_ability: Option<AbilityId>,
}

impl ConditionInstance {
    pub fn new(kind: ConditionKind, duration: EffectDuration, applied_at_round: u32) -> Self {
        Self {
            kind,
            duration,
            applied_at_round,
            save_ability: None,
            save_dc: None,
            dot_dice: None,
            source_ability: None,
        }
    }

    pub fn with_save(mut self, ability: Ability, dc: i32) -> Self {
        self.save_ability = Some(ability);
        self.save_dc = Some(dc);
        self
    }

    pub fn with_dot(mut self, dice: impl Into<String>) -> Self {
        self.dot_dice = Some(dice.into());
        self
    }
}

/// How a stat modifier combines with the base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    Bonus,
    Penalty,
    Set,
}

/// A modifier amount: flat or rolled per use (Bless adds 1d4 to attacks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModifierAmount {
    Flat(i32),
    Dice(String),
}

/// A timed stat modification on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEffect {
    pub name: String,
    /// The stat being modified ("attack_roll", "ac", "save", an ability
    /// name, or a custom key).
    pub stat: String,
    pub kind: ModifierKind,
    pub amount: ModifierAmount,
    pub duration: EffectDuration,
    pub applied_at_round: u32,
    /// Ability and caster that created the effect; used to strip effects
    /// when concentration breaks.
    pub source_ability: Option<AbilityId>,
    pub source_caster: Option<EntityId>,
    /// Whether the caster must hold concentration for the effect to last.
    pub concentration: bool,
}

/// Combined advantage state for a roll. Advantage and disadvantage from any
/// number of sources cancel to normal, per the 5e rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvantageState {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl AdvantageState {
    /// Fold advantage/disadvantage counts into a single state.
    pub fn from_counts(advantage: u32, disadvantage: u32) -> Self {
        match (advantage > 0, disadvantage > 0) {
            (true, false) => AdvantageState::Advantage,
            (false, true) => AdvantageState::Disadvantage,
            _ => AdvantageState::Normal,
        }
    }
}
