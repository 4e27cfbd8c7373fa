//! The effect pipeline.
//!
//! Applies ability effect blocks to targets (damage with save-for-half,
//! conditions negated on save, timed stat modifiers, concentration),
//! ticks durations at the start of each combat round, and answers the
//! condition queries the attack site needs. At most one concentration
//! effect per caster exists at any time; starting a new one drops the
//! old.

use ttasolo_domain::{
    Ability, AbilityId, ActiveEffect, AdvantageState, ConditionInstance, ConditionKind,
    DieRoller, DomainError, DurationKind, Entity, EntityId, PhysicsOverlay, RollSpec,
    UnifiedAbility,
};

use crate::use_cases::skills::{CheckResult, SkillService};

/// Per-target outcome of an ability application.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    pub target_id: EntityId,
    pub damage_dealt: i32,
    pub healing_done: i32,
    pub save: Option<CheckResult>,
    pub condition_applied: Option<ConditionKind>,
    pub condition_negated: bool,
    pub modifier_applied: bool,
}

/// Result of applying an ability.
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityApplication {
    pub targets: Vec<TargetOutcome>,
    /// Set when the caster began concentrating on this ability.
    pub concentration_started: bool,
    /// Prior concentration ability dropped to make room, if any. The
    /// caller strips its effects from entities outside this target set.
    pub concentration_replaced: Option<AbilityId>,
}

/// Report from a round tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub expired_conditions: Vec<ConditionKind>,
    pub saved_conditions: Vec<ConditionKind>,
    pub expired_effects: Vec<String>,
    pub damage_over_time: i32,
    /// False when the entity was already ticked this round.
    pub ticked: bool,
}

/// Result of a concentration check after taking damage.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcentrationCheck {
    pub dc: i32,
    pub save: CheckResult,
    pub broken: bool,
    pub dropped_ability: Option<AbilityId>,
}

/// True when the entity cannot take actions.
pub fn is_incapacitated(entity: &Entity) -> bool {
    entity
        .as_character()
        .map(|s| s.conditions.iter().any(|c| c.kind.is_incapacitating()))
        .unwrap_or(false)
}

/// True when melee hits against the target auto-crit.
pub fn melee_auto_crit(target: &Entity) -> bool {
    target
        .as_character()
        .map(|s| s.conditions.iter().any(|c| c.kind.melee_hits_auto_crit()))
        .unwrap_or(false)
}

/// Combined advantage state for an attack, from both sides' conditions.
///
/// Blinded, frightened, poisoned, prone, and restrained attackers roll at
/// disadvantage; invisible attackers at advantage. Blinded, restrained,
/// stunned, paralyzed, petrified, and unconscious targets grant
/// advantage; invisible targets impose disadvantage. Prone targets grant
/// advantage in melee and impose disadvantage at range.
pub fn attack_advantage(attacker: &Entity, target: &Entity, ranged: bool) -> AdvantageState {
    let mut advantage = 0u32;
    let mut disadvantage = 0u32;

    if let Some(stats) = attacker.as_character() {
        for condition in &stats.conditions {
            match condition.kind {
                ConditionKind::Blinded
                | ConditionKind::Frightened
                | ConditionKind::Poisoned
                | ConditionKind::Prone
                | ConditionKind::Restrained => disadvantage += 1,
                ConditionKind::Invisible => advantage += 1,
                _ => {}
            }
        }
    }

    if let Some(stats) = target.as_character() {
        for condition in &stats.conditions {
            match condition.kind {
                ConditionKind::Blinded
                | ConditionKind::Restrained
                | ConditionKind::Stunned
                | ConditionKind::Paralyzed
                | ConditionKind::Petrified
                | ConditionKind::Unconscious => advantage += 1,
                ConditionKind::Invisible => disadvantage += 1,
                ConditionKind::Prone => {
                    if ranged {
                        disadvantage += 1;
                    } else {
                        advantage += 1;
                    }
                }
                _ => {}
            }
        }
    }

    AdvantageState::from_counts(advantage, disadvantage)
}

/// Remove every effect created by the given concentration ability.
pub fn strip_concentration_effects(entity: &mut Entity, ability_id: AbilityId) -> Vec<String> {
    let Some(stats) = entity.as_character_mut() else {
        return Vec::new();
    };
    let mut removed = Vec::new();
    stats.active_effects.retain(|effect| {
        let drop = effect.concentration && effect.source_ability == Some(ability_id);
        if drop {
            removed.push(effect.name.clone());
        }
        !drop
    });
    stats
        .conditions
        .retain(|condition| condition.source_ability != Some(ability_id));
    removed
}

/// The effect pipeline proper.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectPipeline {
    skills: SkillService,
}

impl EffectPipeline {
    pub fn new() -> Self {
        Self {
            skills: SkillService::new(),
        }
    }

    pub fn is_incapacitated(entity: &Entity) -> bool {
        is_incapacitated(entity)
    }

    pub fn has_condition(entity: &Entity, kind: ConditionKind) -> bool {
        entity
            .as_character()
            .map(|s| s.has_condition(kind))
            .unwrap_or(false)
    }

    /// Apply an ability's effect blocks to the target set.
    ///
    /// Saves are rolled per target against the ability's DC (shifted by
    /// the universe's physics overlay): a successful save halves damage
    /// when the ability says so and negates conditions. Stat modifiers
    /// are attached with their durations; a concentration ability records
    /// the caster as concentrating and replaces any prior concentration.
    pub fn apply_ability_effects(
        &self,
        caster: &mut Entity,
        targets: &mut [&mut Entity],
        ability: &UnifiedAbility,
        overlay: &PhysicsOverlay,
        round: u32,
        roller: &mut dyn DieRoller,
    ) -> Result<AbilityApplication, DomainError> {
        ability.validate()?;
        if !overlay.allows(ability.source.kind) {
            return Err(DomainError::rule_violation(format!(
                "{} abilities do not function in this universe",
                ability.source.subtype
            )));
        }

        let save_dc = ability
            .save
            .map(|s| s.dc + overlay.save_dc_shift(ability.source.kind));

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets.iter_mut() {
            let mut outcome = TargetOutcome {
                target_id: target.id,
                damage_dealt: 0,
                healing_done: 0,
                save: None,
                condition_applied: None,
                condition_negated: false,
                modifier_applied: false,
            };

            let saved = match (ability.save, save_dc) {
                (Some(save), Some(dc)) => {
                    let result = self.skills.saving_throw(target, save.ability, dc, roller)?;
                    let success = result.success;
                    outcome.save = Some(result);
                    success
                }
                _ => false,
            };

            if let Some(damage) = &ability.damage {
                let mut spec = RollSpec::parse(&damage.dice)?;
                let bonus_dice = overlay.bonus_damage_dice(ability.source.kind);
                if bonus_dice > 0 {
                    if let Some(first) = spec.terms.first_mut() {
                        first.term.count += bonus_dice;
                    }
                }
                let mut dealt = spec.roll(roller).total.max(0);
                if saved {
                    dealt = if damage.half_on_save { dealt / 2 } else { 0 };
                }
                if dealt > 0 {
                    if let Some(stats) = target.as_character_mut() {
                        stats.apply_damage(dealt);
                    }
                    outcome.damage_dealt = dealt;
                }
            }

            if let Some(healing) = &ability.healing {
                let healed = RollSpec::parse(&healing.dice)?.roll(roller).total.max(0);
                if let Some(stats) = target.as_character_mut() {
                    stats.heal(healed);
                }
                outcome.healing_done = healed;
            }

            if let Some(condition) = &ability.condition {
                if saved {
                    outcome.condition_negated = true;
                } else if let Some(stats) = target.as_character_mut() {
                    let mut instance =
                        ConditionInstance::new(condition.kind, condition.duration, round);
                    instance.source_ability = Some(ability.id);
                    if let (Some(save), Some(dc)) = (ability.save, save_dc) {
                        instance = instance.with_save(save.ability, dc);
                    }
                    if let Some(dot) = &condition.dot_dice {
                        instance = instance.with_dot(dot.clone());
                    }
                    stats.conditions.push(instance);
                    outcome.condition_applied = Some(condition.kind);
                }
            }

            if let Some(modifier) = &ability.modifier {
                if let Some(stats) = target.as_character_mut() {
                    stats.active_effects.push(ActiveEffect {
                        name: ability.name.clone(),
                        stat: modifier.stat.clone(),
                        kind: modifier.kind,
                        amount: modifier.amount.clone(),
                        duration: modifier.duration,
                        applied_at_round: round,
                        source_ability: Some(ability.id),
                        source_caster: Some(caster.id),
                        concentration: ability.requires_concentration,
                    });
                    outcome.modifier_applied = true;
                }
            }

            outcomes.push(outcome);
        }

        let mut replaced = None;
        let mut started = false;
        if ability.requires_concentration {
            let caster_stats = caster
                .as_character_mut()
                .ok_or_else(|| DomainError::invalid_target("caster is not a character"))?;
            replaced = caster_stats
                .resources
                .solo
                .concentrating_on
                .filter(|prior| *prior != ability.id);
            caster_stats.resources.solo.concentrating_on = Some(ability.id);
            started = true;
            if let Some(prior) = replaced {
                strip_concentration_effects(caster, prior);
                for target in targets.iter_mut() {
                    strip_concentration_effects(target, prior);
                }
            }
        }

        Ok(AbilityApplication {
            targets: outcomes,
            concentration_started: started,
            concentration_replaced: replaced,
        })
    }

    /// Start-of-turn upkeep for one entity.
    ///
    /// Decrements remaining durations, removes expired conditions and
    /// effects, rolls end-of-turn saves for until_save conditions, and
    /// applies damage over time. Idempotent within a round: the second
    /// call for the same round is a no-op.
    pub fn tick_combat_round(
        &self,
        entity: &mut Entity,
        round: u32,
        roller: &mut dyn DieRoller,
    ) -> Result<TickReport, DomainError> {
        // Save rolls need &Entity while conditions need &mut; split by
        // collecting the save attempts first.
        let already_ticked = entity
            .as_character()
            .map(|s| s.resources.solo.last_tick_round == Some(round))
            .unwrap_or(false);
        if already_ticked {
            return Ok(TickReport {
                expired_conditions: Vec::new(),
                saved_conditions: Vec::new(),
                expired_effects: Vec::new(),
                damage_over_time: 0,
                ticked: false,
            });
        }

        let mut save_results: Vec<(usize, bool)> = Vec::new();
        let mut dot_total = 0i32;
        {
            let snapshot = entity.clone();
            let Some(stats) = snapshot.as_character() else {
                return Err(DomainError::invalid_target(format!(
                    "{} has no conditions to tick",
                    entity.name
                )));
            };
            for (index, condition) in stats.conditions.iter().enumerate() {
                if condition.duration.kind == DurationKind::UntilSave {
                    if let (Some(ability), Some(dc)) =
                        (condition.save_ability, condition.save_dc)
                    {
                        let result =
                            self.skills.saving_throw(&snapshot, ability, dc, roller)?;
                        save_results.push((index, result.success));
                    }
                }
                if condition.kind.is_damage_over_time() {
                    if let Some(dice) = &condition.dot_dice {
                        dot_total += RollSpec::parse(dice)?.roll(roller).total.max(0);
                    }
                }
            }
        }

        let stats = entity
            .as_character_mut()
            .ok_or_else(|| DomainError::invalid_target("not a character"))?;

        let mut expired_conditions = Vec::new();
        let mut saved_conditions = Vec::new();
        let mut index = 0usize;
        stats.conditions.retain_mut(|condition| {
            let current = index;
            index += 1;
            if save_results
                .iter()
                .any(|(i, success)| *i == current && *success)
            {
                saved_conditions.push(condition.kind);
                return false;
            }
            if condition.duration.tick_round() {
                expired_conditions.push(condition.kind);
                return false;
            }
            true
        });

        let mut expired_effects = Vec::new();
        stats.active_effects.retain_mut(|effect| {
            if effect.duration.tick_round() {
                expired_effects.push(effect.name.clone());
                return false;
            }
            true
        });

        if dot_total > 0 {
            stats.apply_damage(dot_total);
        }
        stats.resources.solo.last_tick_round = Some(round);

        Ok(TickReport {
            expired_conditions,
            saved_conditions,
            expired_effects,
            damage_over_time: dot_total,
            ticked: true,
        })
    }

    /// Concentration check after taking damage: CON save against
    /// DC = max(10, damage / 2). Failure drops the held ability.
    pub fn check_concentration(
        &self,
        entity: &mut Entity,
        damage: i32,
        roller: &mut dyn DieRoller,
    ) -> Result<Option<ConcentrationCheck>, DomainError> {
        let Some(held) = entity
            .as_character()
            .and_then(|s| s.resources.solo.concentrating_on)
        else {
            return Ok(None);
        };

        let dc = (damage / 2).max(10);
        let save = self.skills.saving_throw(entity, Ability::Con, dc, roller)?;
        let broken = !save.success;
        let mut dropped = None;
        if broken {
            if let Some(stats) = entity.as_character_mut() {
                stats.resources.solo.concentrating_on = None;
            }
            strip_concentration_effects(entity, held);
            dropped = Some(held);
        }
        Ok(Some(ConcentrationCheck {
            dc,
            save,
            broken,
            dropped_ability: dropped,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::rng::ScriptedRoller;
    use ttasolo_domain::{
        AbilityScores, AbilitySource, ActionCost, CharacterStats, EffectDuration, EntityKind,
        ModifierAmount, ModifierKind, ResourceMechanism, SourceKind, SourceRule, Targeting,
        UniverseId,
    };

    fn character(universe: UniverseId, name: &str, con: i32) -> Entity {
        let stats = CharacterStats::new(
            3,
            30,
            14,
            AbilityScores::new(10, 10, con, 10, 10, 10).unwrap(),
        )
        .unwrap();
        Entity::new(universe, name, EntityKind::Character(stats))
    }

    fn fire_burst() -> UnifiedAbility {
        UnifiedAbility::new(
            "Fire Burst",
            AbilitySource {
                kind: SourceKind::Magic,
                subtype: "evocation".into(),
            },
            ResourceMechanism::Slots { level: 3 },
            Targeting::area(ttasolo_domain::TargetMode::AreaSphere, 150, 20),
            ActionCost::Action,
        )
        .with_damage("2d6", "fire")
        .with_save_for_half(Ability::Dex, 15)
    }

    fn bless() -> UnifiedAbility {
        UnifiedAbility::new(
            "Bless",
            AbilitySource {
                kind: SourceKind::Magic,
                subtype: "enchantment".into(),
            },
            ResourceMechanism::Slots { level: 1 },
            Targeting::single(30),
            ActionCost::Action,
        )
        .with_modifier(
            "attack_roll",
            ModifierKind::Bonus,
            ModifierAmount::Dice("1d4".into()),
            EffectDuration::rounds(10),
        )
        .concentration()
    }

    #[test]
    fn test_save_for_half_halves_damage() {
        let universe = UniverseId::new();
        let mut caster = character(universe, "Mage", 10);
        let mut target = character(universe, "Rogue", 10);
        // Save d20=18 (success), damage 2d6 = [6, 4] -> 10 halved to 5.
        let mut roller = ScriptedRoller::new(vec![18, 6, 4]);
        let pipeline = EffectPipeline::new();
        let ability = fire_burst();

        let mut targets = [&mut target];
        let result = pipeline
            .apply_ability_effects(
                &mut caster,
                &mut targets,
                &ability,
                &PhysicsOverlay::default(),
                1,
                &mut roller,
            )
            .unwrap();
        assert_eq!(result.targets[0].damage_dealt, 5);
        assert_eq!(target.as_character().unwrap().hp, 25);
    }

    #[test]
    fn test_failed_save_takes_full_damage() {
        let universe = UniverseId::new();
        let mut caster = character(universe, "Mage", 10);
        let mut target = character(universe, "Rogue", 10);
        // Save d20=3 (fail), damage 2d6 = [6, 4] -> 10.
        let mut roller = ScriptedRoller::new(vec![3, 6, 4]);
        let pipeline = EffectPipeline::new();
        let ability = fire_burst();

        let mut targets = [&mut target];
        let result = pipeline
            .apply_ability_effects(
                &mut caster,
                &mut targets,
                &ability,
                &PhysicsOverlay::default(),
                1,
                &mut roller,
            )
            .unwrap();
        assert_eq!(result.targets[0].damage_dealt, 10);
    }

    #[test]
    fn test_save_negates_condition() {
        let universe = UniverseId::new();
        let mut caster = character(universe, "Mage", 10);
        let mut target = character(universe, "Rogue", 10);
        let ability = UnifiedAbility::new(
            "Hold Person",
            AbilitySource {
                kind: SourceKind::Magic,
                subtype: "enchantment".into(),
            },
            ResourceMechanism::Slots { level: 2 },
            Targeting::single(60),
            ActionCost::Action,
        )
        .with_condition(ConditionKind::Paralyzed, EffectDuration::until_save())
        .with_save(Ability::Wis, 14);

        let pipeline = EffectPipeline::new();

        // Failed save: condition lands.
        let mut roller = ScriptedRoller::new(vec![5]);
        let mut targets = [&mut target];
        let result = pipeline
            .apply_ability_effects(
                &mut caster,
                &mut targets,
                &ability,
                &PhysicsOverlay::default(),
                1,
                &mut roller,
            )
            .unwrap();
        assert_eq!(result.targets[0].condition_applied, Some(ConditionKind::Paralyzed));
        assert!(EffectPipeline::has_condition(&target, ConditionKind::Paralyzed));

        // Successful save on a fresh target: negated.
        let mut other = character(universe, "Bard", 10);
        let mut roller = ScriptedRoller::new(vec![19]);
        let mut targets = [&mut other];
        let result = pipeline
            .apply_ability_effects(
                &mut caster,
                &mut targets,
                &ability,
                &PhysicsOverlay::default(),
                1,
                &mut roller,
            )
            .unwrap();
        assert!(result.targets[0].condition_negated);
        assert!(!EffectPipeline::has_condition(&other, ConditionKind::Paralyzed));
    }

    #[test]
    fn test_concentration_replaces_prior() {
        let universe = UniverseId::new();
        let mut caster = character(universe, "Cleric", 12);
        let mut ally = character(universe, "Fighter", 12);
        let pipeline = EffectPipeline::new();
        let bless = bless();

        let mut roller = ScriptedRoller::new(vec![1]);
        let mut targets = [&mut ally];
        pipeline
            .apply_ability_effects(
                &mut caster,
                &mut targets,
                &bless,
                &PhysicsOverlay::default(),
                1,
                &mut roller,
            )
            .unwrap();
        assert_eq!(
            caster.as_character().unwrap().resources.solo.concentrating_on,
            Some(bless.id)
        );
        assert_eq!(ally.as_character().unwrap().active_effects.len(), 1);

        // A second concentration ability replaces the first and strips its
        // effects from the shared target set.
        let shield = bless_like_named("Shield of Faith");
        let mut targets = [&mut ally];
        let result = pipeline
            .apply_ability_effects(
                &mut caster,
                &mut targets,
                &shield,
                &PhysicsOverlay::default(),
                2,
                &mut roller,
            )
            .unwrap();
        assert_eq!(result.concentration_replaced, Some(bless.id));
        let effects = &ally.as_character().unwrap().active_effects;
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].name, "Shield of Faith");
    }

    fn bless_like_named(name: &str) -> UnifiedAbility {
        UnifiedAbility::new(
            name,
            AbilitySource {
                kind: SourceKind::Magic,
                subtype: "abjuration".into(),
            },
            ResourceMechanism::Slots { level: 1 },
            Targeting::single(30),
            ActionCost::Bonus,
        )
        .with_modifier(
            "ac",
            ModifierKind::Bonus,
            ModifierAmount::Flat(2),
            EffectDuration::minutes(10),
        )
        .concentration()
    }

    #[test]
    fn test_forbidden_source_fails() {
        let universe = UniverseId::new();
        let mut caster = character(universe, "Mage", 10);
        let mut target = character(universe, "Rogue", 10);
        let overlay = PhysicsOverlay {
            magic: SourceRule::Forbidden,
            ..Default::default()
        };
        let mut roller = ScriptedRoller::new(vec![10]);
        let mut targets = [&mut target];
        let err = EffectPipeline::new()
            .apply_ability_effects(&mut caster, &mut targets, &fire_burst(), &overlay, 1, &mut roller)
            .unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn test_enhanced_source_adds_a_damage_die() {
        let universe = UniverseId::new();
        let mut caster = character(universe, "Mage", 10);
        let mut target = character(universe, "Rogue", 10);
        let overlay = PhysicsOverlay {
            magic: SourceRule::Enhanced,
            ..Default::default()
        };
        // Save fails (3), then 3d6 = [6, 4, 5] = 15.
        let mut roller = ScriptedRoller::new(vec![3, 6, 4, 5]);
        let mut targets = [&mut target];
        let result = EffectPipeline::new()
            .apply_ability_effects(&mut caster, &mut targets, &fire_burst(), &overlay, 1, &mut roller)
            .unwrap();
        assert_eq!(result.targets[0].damage_dealt, 15);
    }

    #[test]
    fn test_tick_decrements_and_expires() {
        let universe = UniverseId::new();
        let mut entity = character(universe, "Rogue", 10);
        entity.as_character_mut().unwrap().conditions.push(
            ConditionInstance::new(ConditionKind::Poisoned, EffectDuration::rounds(2), 1),
        );

        let pipeline = EffectPipeline::new();
        let mut roller = ScriptedRoller::new(vec![10]);
        let report = pipeline.tick_combat_round(&mut entity, 2, &mut roller).unwrap();
        assert!(report.ticked);
        assert!(report.expired_conditions.is_empty());

        let report = pipeline.tick_combat_round(&mut entity, 3, &mut roller).unwrap();
        assert_eq!(report.expired_conditions, vec![ConditionKind::Poisoned]);
        assert!(!EffectPipeline::has_condition(&entity, ConditionKind::Poisoned));
    }

    #[test]
    fn test_tick_is_idempotent_within_round() {
        let universe = UniverseId::new();
        let mut entity = character(universe, "Rogue", 10);
        entity.as_character_mut().unwrap().conditions.push(
            ConditionInstance::new(ConditionKind::Poisoned, EffectDuration::rounds(3), 1),
        );

        let pipeline = EffectPipeline::new();
        let mut roller = ScriptedRoller::new(vec![10]);
        pipeline.tick_combat_round(&mut entity, 2, &mut roller).unwrap();
        let second = pipeline.tick_combat_round(&mut entity, 2, &mut roller).unwrap();
        assert!(!second.ticked);
        assert_eq!(
            entity.as_character().unwrap().conditions[0].duration.remaining,
            2
        );
    }

    #[test]
    fn test_until_save_condition_ends_on_save() {
        let universe = UniverseId::new();
        let mut entity = character(universe, "Rogue", 10);
        entity.as_character_mut().unwrap().conditions.push(
            ConditionInstance::new(
                ConditionKind::Paralyzed,
                EffectDuration::until_save(),
                1,
            )
            .with_save(Ability::Wis, 14),
        );

        let pipeline = EffectPipeline::new();
        // First tick: save 5, fails, condition stays.
        let mut roller = ScriptedRoller::new(vec![5]);
        let report = pipeline.tick_combat_round(&mut entity, 2, &mut roller).unwrap();
        assert!(report.saved_conditions.is_empty());
        assert!(EffectPipeline::has_condition(&entity, ConditionKind::Paralyzed));

        // Second tick: save 18, succeeds, condition removed.
        let mut roller = ScriptedRoller::new(vec![18]);
        let report = pipeline.tick_combat_round(&mut entity, 3, &mut roller).unwrap();
        assert_eq!(report.saved_conditions, vec![ConditionKind::Paralyzed]);
        assert!(!EffectPipeline::has_condition(&entity, ConditionKind::Paralyzed));
    }

    #[test]
    fn test_damage_over_time_applies() {
        let universe = UniverseId::new();
        let mut entity = character(universe, "Rogue", 10);
        entity.as_character_mut().unwrap().conditions.push(
            ConditionInstance::new(ConditionKind::Burning, EffectDuration::rounds(3), 1)
                .with_dot("1d4"),
        );

        let pipeline = EffectPipeline::new();
        let mut roller = ScriptedRoller::new(vec![3]);
        let report = pipeline.tick_combat_round(&mut entity, 2, &mut roller).unwrap();
        assert_eq!(report.damage_over_time, 3);
        assert_eq!(entity.as_character().unwrap().hp, 27);
    }

    #[test]
    fn test_concentration_check_breaks_on_failed_save() {
        let universe = UniverseId::new();
        let mut caster = character(universe, "Cleric", 12);
        let ability_id = AbilityId::new();
        let caster_id = caster.id;
        {
            let stats = caster.as_character_mut().unwrap();
            stats.resources.solo.concentrating_on = Some(ability_id);
            stats.active_effects.push(ActiveEffect {
                name: "Bless".into(),
                stat: "attack_roll".into(),
                kind: ModifierKind::Bonus,
                amount: ModifierAmount::Dice("1d4".into()),
                duration: EffectDuration::rounds(10),
                applied_at_round: 1,
                source_ability: Some(ability_id),
                source_caster: Some(caster_id),
                concentration: true,
            });
        }

        // 18 damage -> DC max(10, 9) = 10. Save d20=4 +1 CON = 5: fails.
        let pipeline = EffectPipeline::new();
        let mut roller = ScriptedRoller::new(vec![4]);
        let check = pipeline
            .check_concentration(&mut caster, 18, &mut roller)
            .unwrap()
            .unwrap();
        assert_eq!(check.dc, 10);
        assert_eq!(check.save.total, 5);
        assert!(check.broken);
        assert_eq!(check.dropped_ability, Some(ability_id));
        assert!(caster.as_character().unwrap().active_effects.is_empty());
        assert_eq!(
            caster.as_character().unwrap().resources.solo.concentrating_on,
            None
        );
    }

    #[test]
    fn test_concentration_check_none_when_not_concentrating() {
        let universe = UniverseId::new();
        let mut caster = character(universe, "Cleric", 12);
        let mut roller = ScriptedRoller::new(vec![10]);
        let check = EffectPipeline::new()
            .check_concentration(&mut caster, 20, &mut roller)
            .unwrap();
        assert!(check.is_none());
    }
}
