//! Unified ability model
//!
//! One schema covers magic, tech, and martial abilities. An ability names
//! its power source, the resource mechanism that pays for it, the effect
//! blocks it applies, and a targeting descriptor. The effect pipeline
//! interprets the blocks; the resource service interprets the mechanism.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::game_systems::srd5e::Ability as AbilityScore;
use crate::ids::AbilityId;
use crate::value_objects::conditions::{ConditionKind, EffectDuration, ModifierAmount, ModifierKind};
use crate::value_objects::dice::RollSpec;
use crate::value_objects::resources::UsageDieSize;

/// Where an ability's power comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Magic,
    Tech,
    Martial,
}

/// Source plus free-form subtype ("evocation", "cybernetic", "maneuver").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilitySource {
    pub kind: SourceKind,
    pub subtype: String,
}

/// The resource mechanism paying for an ability, with mechanism-specific
/// details inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mechanism")]
pub enum ResourceMechanism {
    /// Consumes a spell slot of the given level.
    Slots { level: u8 },
    /// Limited uses with a recharge roll.
    Cooldown {
        name: String,
        max_uses: u32,
        recharge_die: u32,
        recharge_threshold: u32,
    },
    /// Rolls a named usage die on activation.
    UsageDie {
        name: String,
        initial: UsageDieSize,
    },
    /// Costs stress to activate.
    Stress { cost: u32 },
    /// Costs momentum to activate.
    Momentum { cost: u32 },
    /// No cost.
    Free,
}

/// Damage effect block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageEffect {
    /// Dice notation, validated at construction.
    pub dice: String,
    pub damage_type: String,
    /// A successful save halves the damage instead of negating it.
    pub half_on_save: bool,
}

/// Healing effect block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingEffect {
    pub dice: String,
}

/// Condition effect block. A successful save negates the condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionEffect {
    pub kind: ConditionKind,
    pub duration: EffectDuration,
    pub dot_dice: Option<String>,
}

/// Stat modifier effect block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatModifierEffect {
    pub stat: String,
    pub kind: ModifierKind,
    pub amount: ModifierAmount,
    pub duration: EffectDuration,
}

/// Save imposed on targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSpec {
    pub ability: AbilityScore,
    pub dc: i32,
}

/// Targeting shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    SelfOnly,
    Single,
    Multiple,
    AreaSphere,
    AreaCone,
    AreaLine,
    AreaCube,
}

impl TargetMode {
    pub fn is_area(&self) -> bool {
        matches!(
            self,
            TargetMode::AreaSphere
                | TargetMode::AreaCone
                | TargetMode::AreaLine
                | TargetMode::AreaCube
        )
    }
}

/// Targeting descriptor: mode, range in feet, and area size for the area
/// modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Targeting {
    pub mode: TargetMode,
    pub range: u32,
    pub area_size: Option<u32>,
    /// Maximum target count for `Multiple`.
    pub max_targets: Option<u32>,
}

impl Targeting {
    pub fn self_only() -> Self {
        Self {
            mode: TargetMode::SelfOnly,
            range: 0,
            area_size: None,
            max_targets: None,
        }
    }

    pub fn single(range: u32) -> Self {
        Self {
            mode: TargetMode::Single,
            range,
            area_size: None,
            max_targets: None,
        }
    }

    pub fn area(mode: TargetMode, range: u32, area_size: u32) -> Self {
        Self {
            mode,
            range,
            area_size: Some(area_size),
            max_targets: None,
        }
    }
}

/// Action economy cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCost {
    Action,
    Bonus,
    Reaction,
    Free,
}

/// The unified ability object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedAbility {
    pub id: AbilityId,
    pub name: String,
    pub source: AbilitySource,
    pub mechanism: ResourceMechanism,
    pub damage: Option<DamageEffect>,
    pub healing: Option<HealingEffect>,
    pub condition: Option<ConditionEffect>,
    pub modifier: Option<StatModifierEffect>,
    pub save: Option<SaveSpec>,
    pub targeting: Targeting,
    pub action_cost: ActionCost,
    pub requires_concentration: bool,
}

impl UnifiedAbility {
    pub fn new(
        name: impl Into<String>,
        source: AbilitySource,
        mechanism: ResourceMechanism,
        targeting: Targeting,
        action_cost: ActionCost,
    ) -> Self {
        Self {
            id: AbilityId::new(),
            name: name.into(),
            source,
            mechanism,
            damage: None,
            healing: None,
            condition: None,
            modifier: None,
            save: None,
            targeting,
            action_cost,
            requires_concentration: false,
        }
    }

    pub fn with_damage(mut self, dice: impl Into<String>, damage_type: impl Into<String>) -> Self {
        self.damage = Some(DamageEffect {
            dice: dice.into(),
            damage_type: damage_type.into(),
            half_on_save: false,
        });
        self
    }

    pub fn with_save_for_half(mut self, ability: AbilityScore, dc: i32) -> Self {
        self.save = Some(SaveSpec { ability, dc });
        if let Some(damage) = &mut self.damage {
            damage.half_on_save = true;
        }
        self
    }

    pub fn with_save(mut self, ability: AbilityScore, dc: i32) -> Self {
        self.save = Some(SaveSpec { ability, dc });
        self
    }

    pub fn with_healing(mut self, dice: impl Into<String>) -> Self {
        self.healing = Some(HealingEffect { dice: dice.into() });
        self
    }

    pub fn with_condition(mut self, kind: ConditionKind, duration: EffectDuration) -> Self {
        self.condition = Some(ConditionEffect {
            kind,
            duration,
            dot_dice: None,
        });
        self
    }

    pub fn with_modifier(
        mut self,
        stat: impl Into<String>,
        kind: ModifierKind,
        amount: ModifierAmount,
        duration: EffectDuration,
    ) -> Self {
        self.modifier = Some(StatModifierEffect {
            stat: stat.into(),
            kind,
            amount,
            duration,
        });
        self
    }

    pub fn concentration(mut self) -> Self {
        self.requires_concentration = true;
        self
    }

    /// Validate the schema rules: cooldowns need at least one use, slots a
    /// sensible level, at least one effect block must be present, and area
    /// targeting needs an area size. Dice notations must parse.
    pub fn validate(&self) -> Result<(), DomainError> {
        match &self.mechanism {
            ResourceMechanism::Slots { level } => {
                if *level > 9 {
                    return Err(DomainError::bad_input(format!(
                        "spell slot level {} out of range",
                        level
                    )));
                }
            }
            ResourceMechanism::Cooldown { max_uses, .. } => {
                if *max_uses < 1 {
                    return Err(DomainError::bad_input(
                        "cooldown abilities need at least one use",
                    ));
                }
            }
            _ => {}
        }

        if self.damage.is_none()
            && self.healing.is_none()
            && self.condition.is_none()
            && self.modifier.is_none()
        {
            return Err(DomainError::bad_input(format!(
                "ability '{}' has no effect blocks",
                self.name
            )));
        }

        if self.targeting.mode.is_area() && self.targeting.area_size.is_none() {
            return Err(DomainError::bad_input(format!(
                "area ability '{}' is missing an area size",
                self.name
            )));
        }

        for dice in [
            self.damage.as_ref().map(|d| d.dice.as_str()),
            self.healing.as_ref().map(|h| h.dice.as_str()),
            self.condition.as_ref().and_then(|c| c.dot_dice.as_deref()),
        ]
        .into_iter()
        .flatten()
        {
            RollSpec::parse(dice)?;
        }

        Ok(())
    }
}
