//! The resource service.
//!
//! Debits ability costs against an entity's pools, runs rests, drives the
//! solo-combat round upkeep (momentum, fray die, recharges, action
//! flags), and owns the defy-death pre-check and heroic-action economy.
//! Event emission stays with the router; this service reports what
//! happened.

use ttasolo_domain::{
    fray_die_sides, Ability, CooldownTracker, DieRoller, DomainError, Entity, EntityId,
    ResourceMechanism, RestKind, StressOutcome, UnifiedAbility, UsageDie, UsageDieRoll,
};

use crate::use_cases::skills::{CheckResult, SkillService};

/// What paying for an ability did to the pools.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDebit {
    pub description: String,
    /// Stress overflowed: the router emits BREAKING_POINT.
    pub breaking_point: bool,
    pub usage_roll: Option<UsageDieRoll>,
}

impl ResourceDebit {
    fn free() -> Self {
        Self {
            description: "free".into(),
            breaking_point: false,
            usage_roll: None,
        }
    }
}

/// One enemy hit by the fray die.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrayHit {
    pub target_id: EntityId,
    pub damage: i32,
    pub killed: bool,
}

/// Report from the start-of-round solo upkeep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoloRoundReport {
    pub round: u32,
    pub momentum_gained: u32,
    pub fray_die: u32,
    pub fray_roll: i32,
    pub fray_hits: Vec<FrayHit>,
    pub recharged_cooldowns: Vec<String>,
}

/// Outcome of the defy-death pre-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefyOutcome {
    /// Save made: the entity stays at 1 HP with one level of exhaustion.
    Prevented { save: CheckResult },
    /// Save failed: the drop to 0 HP proceeds and ordinary death-save
    /// rules engage.
    Failed { save: CheckResult },
}

/// How the heroic second action is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeroicCost {
    #[default]
    Momentum,
    Stress,
}

/// The resource service.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceService {
    skills: SkillService,
}

impl ResourceService {
    pub fn new() -> Self {
        Self {
            skills: SkillService::new(),
        }
    }

    /// Debit an ability's cost. Fails with `InsufficientResource` without
    /// mutating anything when the pool is short.
    pub fn pay_for_ability(
        &self,
        entity: &mut Entity,
        ability: &UnifiedAbility,
        roller: &mut dyn DieRoller,
    ) -> Result<ResourceDebit, DomainError> {
        let stats = entity
            .as_character_mut()
            .ok_or_else(|| DomainError::invalid_target("only characters spend resources"))?;
        match &ability.mechanism {
            ResourceMechanism::Free => Ok(ResourceDebit::free()),
            ResourceMechanism::Slots { level } => {
                stats.resources.spend_slot(*level)?;
                Ok(ResourceDebit {
                    description: format!("level {} spell slot", level),
                    breaking_point: false,
                    usage_roll: None,
                })
            }
            ResourceMechanism::Cooldown {
                name,
                max_uses,
                recharge_die,
                recharge_threshold,
            } => {
                let tracker = stats
                    .resources
                    .cooldowns
                    .entry(name.clone())
                    .or_insert_with(|| {
                        CooldownTracker::new(
                            *max_uses,
                            *recharge_die,
                            *recharge_threshold,
                            RestKind::Long,
                        )
                    });
                tracker.spend()?;
                Ok(ResourceDebit {
                    description: format!("cooldown use of {}", name),
                    breaking_point: false,
                    usage_roll: None,
                })
            }
            ResourceMechanism::UsageDie { name, initial } => {
                let die = stats
                    .resources
                    .usage_dice
                    .entry(name.clone())
                    .or_insert_with(|| UsageDie::new(*initial));
                let roll = die.roll(roller)?;
                Ok(ResourceDebit {
                    description: format!("usage die roll for {}", name),
                    breaking_point: false,
                    usage_roll: Some(roll),
                })
            }
            ResourceMechanism::Stress { cost } => {
                let outcome = stats.resources.stress.add_stress(*cost);
                Ok(ResourceDebit {
                    description: format!("{} stress", cost),
                    breaking_point: outcome == StressOutcome::BreakingPoint,
                    usage_roll: None,
                })
            }
            ResourceMechanism::Momentum { cost } => {
                stats.resources.stress.spend_momentum(*cost)?;
                Ok(ResourceDebit {
                    description: format!("{} momentum", cost),
                    breaking_point: false,
                    usage_roll: None,
                })
            }
        }
    }

    /// Apply a rest to one entity.
    pub fn rest(&self, entity: &mut Entity, kind: RestKind) -> Result<(), DomainError> {
        let stats = entity
            .as_character_mut()
            .ok_or_else(|| DomainError::invalid_target("only characters rest"))?;
        stats.resources.rest(kind);
        if kind == RestKind::Long {
            stats.hp = stats.hp_max;
            stats.exhaustion = stats.exhaustion.saturating_sub(1);
            stats
                .conditions
                .retain(|c| !c.duration.expires_on_rest());
            stats
                .active_effects
                .retain(|e| !e.duration.expires_on_rest());
        }
        Ok(())
    }

    /// Start-of-round solo upkeep.
    ///
    /// Gains one momentum, rolls the level-banded fray die, lands the
    /// fray damage on eligible mooks (hit dice at or below the actor's
    /// level), processes cooldown recharges, and resets per-turn action
    /// flags. With `split_fray` the damage spills over kills to the next
    /// eligible mook; without it a single mook absorbs the roll.
    pub fn begin_solo_round(
        &self,
        actor: &mut Entity,
        enemies: &mut [&mut Entity],
        round: u32,
        split_fray: bool,
        roller: &mut dyn DieRoller,
    ) -> Result<SoloRoundReport, DomainError> {
        let level = actor.expect_character()?.level;

        // (1) momentum, (5) action flags
        {
            let stats = actor
                .as_character_mut()
                .ok_or_else(|| DomainError::invalid_target("solo actor must be a character"))?;
            stats.resources.solo.start_round(round);
            stats.resources.stress.add_momentum(1);
        }

        // (2) fray die
        let fray_die = fray_die_sides(level);
        let fray_roll = roller.roll_die(fray_die) as i32;

        // (3) fray damage on mooks only, lowest hit dice first
        let mut eligible: Vec<&mut &mut Entity> = enemies
            .iter_mut()
            .filter(|e| {
                e.as_character()
                    .map(|s| !s.dead && s.hp > 0 && s.hit_dice <= level)
                    .unwrap_or(false)
            })
            .collect();
        eligible.sort_by_key(|e| e.as_character().map(|s| s.hit_dice).unwrap_or(u32::MAX));

        let mut fray_hits = Vec::new();
        let mut remaining = fray_roll;
        for enemy in eligible {
            if remaining <= 0 {
                break;
            }
            let stats = match enemy.as_character_mut() {
                Some(stats) => stats,
                None => continue,
            };
            let dealt = if split_fray {
                remaining.min(stats.hp)
            } else {
                remaining
            };
            stats.apply_damage(dealt);
            let killed = stats.hp == 0;
            fray_hits.push(FrayHit {
                target_id: enemy.id,
                damage: dealt,
                killed,
            });
            if !split_fray {
                remaining = 0;
            } else {
                remaining -= dealt;
            }
        }

        // (4) cooldown recharges
        let mut recharged = Vec::new();
        {
            let stats = actor
                .as_character_mut()
                .ok_or_else(|| DomainError::invalid_target("solo actor must be a character"))?;
            for (name, tracker) in stats.resources.cooldowns.iter_mut() {
                let (_, restored) = tracker.try_recharge(roller);
                if restored {
                    recharged.push(name.clone());
                }
            }
            recharged.sort();
        }

        Ok(SoloRoundReport {
            round,
            momentum_gained: 1,
            fray_die,
            fray_roll,
            fray_hits,
            recharged_cooldowns: recharged,
        })
    }

    /// Defy-death pre-check when the entity would drop to 0 HP.
    ///
    /// Fails immediately with `InsufficientResource` at zero uses. The
    /// save is a CON check against 10 + damage this round + 5 per prior
    /// use; success leaves the entity at 1 HP with one level of
    /// exhaustion, failure lets the drop proceed.
    pub fn try_defy_death(
        &self,
        entity: &mut Entity,
        damage_this_round: i32,
        roller: &mut dyn DieRoller,
    ) -> Result<DefyOutcome, DomainError> {
        {
            let stats = entity.expect_character()?;
            if stats.resources.defy_death.uses_remaining == 0 {
                return Err(DomainError::insufficient("no defy-death uses remaining"));
            }
        }
        let dc = entity
            .expect_character()?
            .resources
            .defy_death
            .next_dc(damage_this_round);

        let save = self.skills.saving_throw(entity, Ability::Con, dc, roller)?;

        let stats = entity
            .as_character_mut()
            .ok_or_else(|| DomainError::invalid_target("not a character"))?;
        stats.resources.defy_death.spend()?;
        if save.success {
            stats.hp = 1;
            stats.exhaustion = (stats.exhaustion + 1).min(6);
            Ok(DefyOutcome::Prevented { save })
        } else {
            Ok(DefyOutcome::Failed { save })
        }
    }

    /// Take the heroic second action, paying one momentum or 1d4 stress.
    pub fn heroic_action(
        &self,
        entity: &mut Entity,
        cost: HeroicCost,
        roller: &mut dyn DieRoller,
    ) -> Result<bool, DomainError> {
        let stats = entity
            .as_character_mut()
            .ok_or_else(|| DomainError::invalid_target("not a character"))?;
        if stats.resources.solo.heroic_action_used {
            return Err(DomainError::rule_violation(
                "the heroic action has already been taken this round",
            ));
        }
        let breaking_point = match cost {
            HeroicCost::Momentum => {
                stats.resources.stress.spend_momentum(1)?;
                false
            }
            HeroicCost::Stress => {
                let gained = roller.roll_die(4);
                stats.resources.stress.add_stress(gained) == StressOutcome::BreakingPoint
            }
        };
        stats.resources.solo.heroic_action_used = true;
        stats.resources.solo.action_available = true;
        Ok(breaking_point)
    }

    /// Spend a reaction. The first each round is free; the second costs
    /// one momentum; a third is a rule violation.
    pub fn use_reaction(&self, entity: &mut Entity) -> Result<(), DomainError> {
        let stats = entity
            .as_character_mut()
            .ok_or_else(|| DomainError::invalid_target("not a character"))?;
        if stats.resources.solo.reactions_available > 0 {
            stats.resources.solo.reactions_available -= 1;
            return Ok(());
        }
        if stats.resources.solo.second_reaction_used {
            return Err(DomainError::rule_violation(
                "no reactions remaining this round",
            ));
        }
        stats.resources.stress.spend_momentum(1)?;
        stats.resources.solo.second_reaction_used = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::rng::ScriptedRoller;
    use ttasolo_domain::{
        AbilityScores, AbilitySource, ActionCost, CharacterStats, EntityKind, SourceKind,
        Targeting, UniverseId, UsageDieSize,
    };

    fn solo_hero(universe: UniverseId, level: u32) -> Entity {
        let stats = CharacterStats::new(
            level,
            40,
            16,
            AbilityScores::new(16, 12, 14, 10, 10, 12).unwrap(),
        )
        .unwrap();
        Entity::new(universe, "Aria", EntityKind::Character(stats))
    }

    fn mook(universe: UniverseId, name: &str, hit_dice: u32, hp: i32) -> Entity {
        let mut stats =
            CharacterStats::new(1, hp, 13, AbilityScores::all_tens()).unwrap();
        stats.hit_dice = hit_dice;
        Entity::new(universe, name, EntityKind::Character(stats))
    }

    fn slot_ability(level: u8) -> UnifiedAbility {
        UnifiedAbility::new(
            "Fireball",
            AbilitySource {
                kind: SourceKind::Magic,
                subtype: "evocation".into(),
            },
            ResourceMechanism::Slots { level },
            Targeting::single(120),
            ActionCost::Action,
        )
        .with_damage("8d6", "fire")
    }

    #[test]
    fn test_slot_debit_and_exhaustion_of_pool() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 5);
        hero.as_character_mut().unwrap().resources =
            ttasolo_domain::ResourcePool::empty().with_spell_slots(&[(3, 1)]);
        let mut roller = ScriptedRoller::new(vec![1]);
        let service = ResourceService::new();
        let ability = slot_ability(3);

        service.pay_for_ability(&mut hero, &ability, &mut roller).unwrap();
        let err = service
            .pay_for_ability(&mut hero, &ability, &mut roller)
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientResource(_)));
    }

    #[test]
    fn test_usage_die_mechanism_rolls_and_degrades() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 3);
        let ability = UnifiedAbility::new(
            "Torchlight",
            AbilitySource {
                kind: SourceKind::Tech,
                subtype: "gear".into(),
            },
            ResourceMechanism::UsageDie {
                name: "torch".into(),
                initial: UsageDieSize::D6,
            },
            Targeting::self_only(),
            ActionCost::Free,
        )
        .with_modifier(
            "skill_check",
            ttasolo_domain::ModifierKind::Bonus,
            ttasolo_domain::ModifierAmount::Flat(1),
            ttasolo_domain::EffectDuration::until_rest(),
        );
        let mut roller = ScriptedRoller::new(vec![2]);
        let debit = ResourceService::new()
            .pay_for_ability(&mut hero, &ability, &mut roller)
            .unwrap();
        assert!(debit.usage_roll.unwrap().degraded);
        assert_eq!(
            hero.as_character().unwrap().resources.usage_dice["torch"].current,
            Some(UsageDieSize::D4)
        );
    }

    #[test]
    fn test_fray_die_lands_on_mooks_only() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 6);
        let mut goblin_a = mook(universe, "Goblin A", 1, 7);
        let mut goblin_b = mook(universe, "Goblin B", 1, 7);
        let mut goblin_c = mook(universe, "Goblin C", 1, 7);
        let mut hobgoblin = mook(universe, "Hobgoblin", 4, 22);
        hobgoblin.as_character_mut().unwrap().hit_dice = 4;

        // Level 6 -> d8 fray; scripted roll 7.
        let mut roller = ScriptedRoller::new(vec![7, 7, 7, 7]);
        let mut enemies = [
            &mut hobgoblin,
            &mut goblin_a,
            &mut goblin_b,
            &mut goblin_c,
        ];
        let report = ResourceService::new()
            .begin_solo_round(&mut hero, &mut enemies, 1, false, &mut roller)
            .unwrap();

        assert_eq!(report.fray_die, 8);
        assert_eq!(report.fray_roll, 7);
        assert_eq!(report.fray_hits.len(), 1);
        let hit = &report.fray_hits[0];
        assert_eq!(hit.damage, 7);
        assert!(hit.killed);
        // The hobgoblin (HD 4, but eligible since 4 <= 6)... goblins sort
        // first on hit dice, so a goblin died and the hobgoblin is whole.
        assert_eq!(hobgoblin.as_character().unwrap().hp, 22);
        assert_eq!(report.momentum_gained, 1);
        assert_eq!(hero.as_character().unwrap().resources.stress.momentum, 1);
    }

    #[test]
    fn test_fray_die_skips_high_hd_enemies() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 2);
        let mut ogre = mook(universe, "Ogre", 7, 59);
        let mut roller = ScriptedRoller::new(vec![5]);
        let mut enemies = [&mut ogre];
        let report = ResourceService::new()
            .begin_solo_round(&mut hero, &mut enemies, 1, false, &mut roller)
            .unwrap();
        assert!(report.fray_hits.is_empty());
        assert_eq!(ogre.as_character().unwrap().hp, 59);
    }

    #[test]
    fn test_split_fray_spills_over_kills() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 13);
        let mut rat_a = mook(universe, "Rat A", 1, 3);
        let mut rat_b = mook(universe, "Rat B", 1, 3);
        // Level 13 -> d12; roll 10: kills rat A (3), spills 7 into rat B.
        let mut roller = ScriptedRoller::new(vec![10]);
        let mut enemies = [&mut rat_a, &mut rat_b];
        let report = ResourceService::new()
            .begin_solo_round(&mut hero, &mut enemies, 1, true, &mut roller)
            .unwrap();
        assert_eq!(report.fray_hits.len(), 2);
        assert!(report.fray_hits[0].killed);
        assert!(report.fray_hits[1].killed);
    }

    #[test]
    fn test_defy_death_success_leaves_one_hp() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 5);
        {
            let stats = hero.as_character_mut().unwrap();
            stats.resources.defy_death = ttasolo_domain::DefyDeath::fresh();
            stats.resources.solo.damage_this_round = 8;
        }
        // DC = 10 + 8 = 18; save d20=17 +2 CON = 19: success.
        let mut roller = ScriptedRoller::new(vec![17]);
        let outcome = ResourceService::new()
            .try_defy_death(&mut hero, 8, &mut roller)
            .unwrap();
        assert!(matches!(outcome, DefyOutcome::Prevented { .. }));
        let stats = hero.as_character().unwrap();
        assert_eq!(stats.hp, 1);
        assert_eq!(stats.exhaustion, 1);
        assert_eq!(stats.resources.defy_death.uses_remaining, 2);
    }

    #[test]
    fn test_defy_death_dc_escalates_with_uses() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 5);
        {
            let dd = &mut hero.as_character_mut().unwrap().resources.defy_death;
            *dd = ttasolo_domain::DefyDeath::fresh();
            dd.spend().unwrap();
        }
        // Second use: DC = 10 + 4 + 5 = 19; d20=16 +2 = 18: fails.
        let mut roller = ScriptedRoller::new(vec![16]);
        let outcome = ResourceService::new()
            .try_defy_death(&mut hero, 4, &mut roller)
            .unwrap();
        assert!(matches!(outcome, DefyOutcome::Failed { .. }));
    }

    #[test]
    fn test_defy_death_at_zero_uses_fails_without_rolling() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 5);
        // Default pool carries no defy-death uses.
        let mut roller = ScriptedRoller::new(vec![20]);
        let err = ResourceService::new()
            .try_defy_death(&mut hero, 10, &mut roller)
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientResource(_)));
    }

    #[test]
    fn test_heroic_action_costs_momentum() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 5);
        {
            let stats = hero.as_character_mut().unwrap();
            stats.resources.stress.add_momentum(2);
            stats.resources.solo.action_available = false;
        }
        let mut roller = ScriptedRoller::new(vec![2]);
        ResourceService::new()
            .heroic_action(&mut hero, HeroicCost::Momentum, &mut roller)
            .unwrap();
        let stats = hero.as_character().unwrap();
        assert!(stats.resources.solo.action_available);
        assert_eq!(stats.resources.stress.momentum, 1);

        // Only once per round.
        assert!(ResourceService::new()
            .heroic_action(&mut hero, HeroicCost::Momentum, &mut roller)
            .is_err());
    }

    #[test]
    fn test_second_reaction_costs_momentum() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 5);
        hero.as_character_mut().unwrap().resources.stress.add_momentum(1);
        let service = ResourceService::new();

        service.use_reaction(&mut hero).unwrap();
        service.use_reaction(&mut hero).unwrap();
        assert_eq!(hero.as_character().unwrap().resources.stress.momentum, 0);
        assert!(service.use_reaction(&mut hero).is_err());
    }

    #[test]
    fn test_long_rest_restores_everything() {
        let universe = UniverseId::new();
        let mut hero = solo_hero(universe, 5);
        {
            let stats = hero.as_character_mut().unwrap();
            stats.resources = ttasolo_domain::ResourcePool::empty().with_spell_slots(&[(1, 2)]);
            stats.resources.spend_slot(1).unwrap();
            stats.apply_damage(20);
            stats.exhaustion = 2;
        }
        ResourceService::new().rest(&mut hero, RestKind::Long).unwrap();
        let stats = hero.as_character().unwrap();
        assert_eq!(stats.hp, stats.hp_max);
        assert_eq!(stats.resources.spell_slots[&1].current, 2);
        assert_eq!(stats.exhaustion, 1);
    }
}
