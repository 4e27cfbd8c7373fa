//! Skill checks, saving throws, and attack resolution.
//!
//! All rule logic here is synchronous and CPU-bound; suspension happens in
//! the router around it. Advantage and disadvantage come from the
//! condition deltas in the effect pipeline; flat and rolled bonuses come
//! from active effects.

use ttasolo_domain::{
    Ability, AdvantageState, Cover, DomainError, Entity, ModifierAmount, ModifierKind,
    OutcomeBand, RollSpec, Skill,
};

use crate::use_cases::effects::{attack_advantage, melee_auto_crit, EffectPipeline};
use ttasolo_domain::DieRoller;

/// Stat keys active effects can target at the roll sites.
pub const STAT_ATTACK_ROLL: &str = "attack_roll";
pub const STAT_SAVING_THROW: &str = "saving_throw";
pub const STAT_SKILL_CHECK: &str = "skill_check";
pub const STAT_AC: &str = "ac";

/// Result of a skill check or saving throw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub success: bool,
    /// Natural die face.
    pub roll: i32,
    pub total: i32,
    pub dc: i32,
    pub margin: i32,
    pub band: OutcomeBand,
}

/// Result of an attack roll.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackResult {
    pub hit: bool,
    pub critical: bool,
    pub fumble: bool,
    /// Natural d20 face.
    pub attack_roll: i32,
    pub total_attack: i32,
    pub damage: Option<i32>,
    pub damage_type: Option<String>,
}

/// Stateless resolution service over entities and an injected roller.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkillService;

impl SkillService {
    pub fn new() -> Self {
        Self
    }

    /// Sum the active-effect modifiers on a stat key, rolling dice
    /// amounts (Bless) through the provided roller.
    fn effect_modifier(entity: &Entity, stat: &str, roller: &mut dyn DieRoller) -> i32 {
        let Some(stats) = entity.as_character() else {
            return 0;
        };
        let mut total = 0;
        for effect in stats.active_effects.iter().filter(|e| e.stat == stat) {
            let amount = match &effect.amount {
                ModifierAmount::Flat(value) => *value,
                ModifierAmount::Dice(notation) => match RollSpec::parse(notation) {
                    Ok(spec) => spec.roll(roller).total,
                    Err(_) => 0,
                },
            };
            total += match effect.kind {
                ModifierKind::Bonus => amount,
                ModifierKind::Penalty => -amount,
                // Overrides are handled at the site that owns the base
                // value.
                ModifierKind::Set => 0,
            };
        }
        total
    }

    /// The last flat `Set` override on a stat, if any.
    fn effect_set_override(entity: &Entity, stat: &str) -> Option<i32> {
        entity.as_character().and_then(|stats| {
            stats
                .active_effects
                .iter()
                .rev()
                .find(|e| e.stat == stat && e.kind == ModifierKind::Set)
                .and_then(|e| match &e.amount {
                    ModifierAmount::Flat(value) => Some(*value),
                    ModifierAmount::Dice(_) => None,
                })
        })
    }

    fn d20_for(advantage: AdvantageState, modifier: i32) -> RollSpec {
        match advantage {
            AdvantageState::Normal => RollSpec::d20(modifier),
            AdvantageState::Advantage => RollSpec::d20_advantage(modifier),
            AdvantageState::Disadvantage => RollSpec::d20_disadvantage(modifier),
        }
    }

    /// Roll a skill check against a DC.
    pub fn skill_check(
        &self,
        entity: &Entity,
        skill: Skill,
        dc: i32,
        roller: &mut dyn DieRoller,
    ) -> Result<CheckResult, DomainError> {
        let stats = entity.expect_character()?;
        let mut modifier = stats.scores.modifier(skill.ability());
        if stats.is_proficient_in_skill(skill) {
            modifier += stats.proficiency_bonus();
        }
        modifier += Self::effect_modifier(entity, STAT_SKILL_CHECK, roller);

        let outcome = RollSpec::d20(modifier).roll(roller);
        let roll = outcome.natural().unwrap_or(outcome.total - modifier);
        let total = outcome.total;
        Ok(CheckResult {
            success: total >= dc,
            roll,
            total,
            dc,
            margin: total - dc,
            band: OutcomeBand::from_check(total, dc),
        })
    }

    /// Roll a saving throw against a DC.
    pub fn saving_throw(
        &self,
        entity: &Entity,
        ability: Ability,
        dc: i32,
        roller: &mut dyn DieRoller,
    ) -> Result<CheckResult, DomainError> {
        let stats = entity.expect_character()?;
        let mut modifier = stats.scores.modifier(ability);
        if stats.is_proficient_in_save(ability) {
            modifier += stats.proficiency_bonus();
        }
        modifier += Self::effect_modifier(entity, STAT_SAVING_THROW, roller);

        let outcome = RollSpec::d20(modifier).roll(roller);
        let roll = outcome.natural().unwrap_or(outcome.total - modifier);
        let total = outcome.total;
        Ok(CheckResult {
            success: total >= dc,
            roll,
            total,
            dc,
            margin: total - dc,
            band: OutcomeBand::from_check(total, dc),
        })
    }

    /// Resolve a weapon attack.
    ///
    /// Natural 20 is a critical: auto-hit with doubled damage dice.
    /// Natural 1 is a fumble: auto-miss regardless of the total. Otherwise
    /// the total (ability modifier, proficiency, effect bonuses) is
    /// compared to the target's AC plus cover.
    pub fn resolve_attack(
        &self,
        attacker: &Entity,
        target: &Entity,
        weapon: &Entity,
        cover: Cover,
        roller: &mut dyn DieRoller,
    ) -> Result<AttackResult, DomainError> {
        let attacker_stats = attacker.expect_character()?;
        let target_stats = target.expect_character()?;
        if EffectPipeline::is_incapacitated(attacker) {
            return Err(DomainError::rule_violation(format!(
                "{} cannot act",
                attacker.name
            )));
        }

        let weapon_stats = weapon
            .as_item()
            .ok_or_else(|| DomainError::invalid_target(format!("{} is not an item", weapon.name)))?;
        let damage_notation = weapon_stats.damage_dice.as_deref().ok_or_else(|| {
            DomainError::invalid_target(format!("{} is not a weapon", weapon.name))
        })?;

        let ranged = weapon.has_tag("ranged");
        let finesse = weapon.has_tag("finesse");
        // Finesse and ranged weapons attack with DEX, everything else STR.
        let ability = if finesse || ranged { Ability::Dex } else { Ability::Str };
        let ability_mod = attacker_stats.scores.modifier(ability);

        let mut modifier = ability_mod;
        let proficient = attacker_stats
            .weapon_proficiencies
            .iter()
            .any(|w| w == &weapon.name)
            || weapon
                .tags
                .iter()
                .any(|t| attacker_stats.weapon_proficiencies.contains(t));
        if proficient {
            modifier += attacker_stats.proficiency_bonus();
        }
        modifier += Self::effect_modifier(attacker, STAT_ATTACK_ROLL, roller);

        let advantage = attack_advantage(attacker, target, ranged);
        let outcome = Self::d20_for(advantage, modifier).roll(roller);
        let natural = outcome.natural().unwrap_or(outcome.total - modifier);
        let total_attack = outcome.total;

        let fumble = natural == 1;
        let mut critical = natural == 20;
        let base_ac =
            Self::effect_set_override(target, STAT_AC).unwrap_or(target_stats.ac);
        let effective_ac =
            base_ac + cover.ac_bonus() + Self::effect_modifier(target, STAT_AC, roller);
        let mut hit = critical || (!fumble && total_attack >= effective_ac);

        if fumble {
            hit = false;
        } else if hit && !ranged && melee_auto_crit(target) {
            critical = true;
        }

        let (damage, damage_type) = if hit {
            let mut spec = RollSpec::parse(damage_notation)?;
            if critical {
                spec = spec.doubled();
            }
            let rolled = spec.plus(ability_mod).roll(roller);
            (
                Some(rolled.total.max(0)),
                weapon_stats.damage_type.clone(),
            )
        } else {
            (None, None)
        };

        Ok(AttackResult {
            hit,
            critical,
            fumble,
            attack_roll: natural,
            total_attack,
            damage,
            damage_type,
        })
    }
}
