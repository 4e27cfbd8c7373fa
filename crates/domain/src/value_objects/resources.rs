//! Per-entity resource pools
//!
//! Spell slots, cooldown trackers, usage dice, stress/momentum, defy-death
//! uses, and the solo-combat bookkeeping. All mutation is synchronous; the
//! resource service in the engine decides when these are debited and which
//! events to emit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::DomainError;
use crate::ids::AbilityId;
use crate::value_objects::dice::DieRoller;

/// Rest flavors; cooldowns declare which rest restores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestKind {
    Short,
    Long,
}

/// Current/max pair for one spell-slot level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCounter {
    pub current: u32,
    pub max: u32,
}

/// A named cooldown-based ability pool (e.g. dragon breath, Recharge 5-6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownTracker {
    pub current: u32,
    pub max: u32,
    /// Die rolled by `try_recharge`; a result at or above the threshold
    /// restores one use.
    pub recharge_die: u32,
    pub recharge_threshold: u32,
    /// Which rest restores all uses.
    pub restores_on: RestKind,
}

impl CooldownTracker {
    pub fn new(max: u32, recharge_die: u32, recharge_threshold: u32, restores_on: RestKind) -> Self {
        Self {
            current: max,
            max,
            recharge_die,
            recharge_threshold,
            restores_on,
        }
    }

    /// Spend one use.
    pub fn spend(&mut self) -> Result<(), DomainError> {
        if self.current == 0 {
            return Err(DomainError::insufficient("cooldown has no uses remaining"));
        }
        self.current -= 1;
        Ok(())
    }

    /// Roll the recharge die; restore one use on a result at or above the
    /// threshold. Returns the rolled face and whether a use came back.
    pub fn try_recharge(&mut self, roller: &mut dyn DieRoller) -> (u32, bool) {
        if self.current >= self.max {
            return (0, false);
        }
        let face = roller.roll_die(self.recharge_die);
        let recharged = face >= self.recharge_threshold;
        if recharged {
            self.current += 1;
        }
        (face, recharged)
    }

    /// Restore all uses if this rest qualifies. A long rest also restores
    /// short-rest cooldowns.
    pub fn rest(&mut self, kind: RestKind) {
        let qualifies = match self.restores_on {
            RestKind::Short => true,
            RestKind::Long => kind == RestKind::Long,
        };
        if qualifies {
            self.current = self.max;
        }
    }
}

/// Usage-die sizes, largest to smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageDieSize {
    D4,
    D6,
    D8,
    D10,
    D12,
}

impl UsageDieSize {
    pub fn sides(&self) -> u32 {
        match self {
            UsageDieSize::D4 => 4,
            UsageDieSize::D6 => 6,
            UsageDieSize::D8 => 8,
            UsageDieSize::D10 => 10,
            UsageDieSize::D12 => 12,
        }
    }

    /// The next smaller die, or None when a d4 degrades to depleted.
    pub fn step_down(&self) -> Option<UsageDieSize> {
        match self {
            UsageDieSize::D12 => Some(UsageDieSize::D10),
            UsageDieSize::D10 => Some(UsageDieSize::D8),
            UsageDieSize::D8 => Some(UsageDieSize::D6),
            UsageDieSize::D6 => Some(UsageDieSize::D4),
            UsageDieSize::D4 => None,
        }
    }
}

impl fmt::Display for UsageDieSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Result of rolling a usage die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDieRoll {
    pub face: u32,
    pub degraded: bool,
    pub depleted: bool,
}

/// A named usage die (torches, ammunition, rations).
///
/// Rolling a result in the degrade set steps the die down the chain
/// d12 -> d10 -> d8 -> d6 -> d4 -> depleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDie {
    /// Die size the resource started at; restored on long rest.
    pub initial: UsageDieSize,
    /// None when depleted.
    pub current: Option<UsageDieSize>,
    /// Faces that degrade the die. Defaults to {1, 2}.
    pub degrade_on: Vec<u32>,
}

impl UsageDie {
    pub fn new(size: UsageDieSize) -> Self {
        Self {
            initial: size,
            current: Some(size),
            degrade_on: vec![1, 2],
        }
    }

    pub fn with_degrade_on(mut self, faces: Vec<u32>) -> Self {
        self.degrade_on = faces;
        self
    }

    pub fn is_depleted(&self) -> bool {
        self.current.is_none()
    }

    /// Roll the current die, degrading on a matching face.
    pub fn roll(&mut self, roller: &mut dyn DieRoller) -> Result<UsageDieRoll, DomainError> {
        let size = self
            .current
            .ok_or_else(|| DomainError::insufficient("usage die is depleted"))?;
        let face = roller.roll_die(size.sides());
        let degraded = self.degrade_on.contains(&face);
        if degraded {
            self.current = size.step_down();
        }
        Ok(UsageDieRoll {
            face,
            degraded,
            depleted: self.current.is_none(),
        })
    }

    /// Long rest restores the die to its initial size; short rest does not
    /// touch it.
    pub fn rest(&mut self, kind: RestKind) {
        if kind == RestKind::Long {
            self.current = Some(self.initial);
        }
    }
}

/// Outcome of adding stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressOutcome {
    Absorbed,
    /// Stress passed the maximum; the caller emits BREAKING_POINT.
    BreakingPoint,
}

/// Stress and momentum pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressPool {
    pub stress: u32,
    pub stress_max: u32,
    pub momentum: u32,
    pub momentum_max: u32,
    /// Set once the pool has overflowed, so BREAKING_POINT fires exactly
    /// once until stress drops below max again.
    broken: bool,
}

impl StressPool {
    pub fn new(stress_max: u32, momentum_max: u32) -> Self {
        Self {
            stress: 0,
            stress_max,
            momentum: 0,
            momentum_max,
            broken: false,
        }
    }

    /// Add stress. Overflowing the maximum reports `BreakingPoint` exactly
    /// once; stress itself clamps at max.
    pub fn add_stress(&mut self, amount: u32) -> StressOutcome {
        let overflow = self.stress + amount > self.stress_max;
        self.stress = (self.stress + amount).min(self.stress_max);
        if overflow && !self.broken {
            self.broken = true;
            return StressOutcome::BreakingPoint;
        }
        StressOutcome::Absorbed
    }

    /// Clear stress (rest, recovery scene). Re-arms the breaking point.
    pub fn relieve_stress(&mut self, amount: u32) {
        self.stress = self.stress.saturating_sub(amount);
        if self.stress < self.stress_max {
            self.broken = false;
        }
    }

    pub fn add_momentum(&mut self, amount: u32) {
        self.momentum = (self.momentum + amount).min(self.momentum_max);
    }

    /// Spend momentum, failing when the pool is short.
    pub fn spend_momentum(&mut self, amount: u32) -> Result<(), DomainError> {
        if self.momentum < amount {
            return Err(DomainError::insufficient("not enough momentum"));
        }
        self.momentum -= amount;
        Ok(())
    }

    /// Taking damage resets momentum to zero.
    pub fn on_damage_taken(&mut self) {
        self.momentum = 0;
    }
}

/// Defy-death uses; hard cap of three per long rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefyDeath {
    /// Uses granted per long rest; zero for entities without the feature.
    pub capacity: u32,
    pub uses_remaining: u32,
    pub uses_spent: u32,
}

pub const DEFY_DEATH_MAX_USES: u32 = 3;

impl DefyDeath {
    pub fn fresh() -> Self {
        Self {
            capacity: DEFY_DEATH_MAX_USES,
            uses_remaining: DEFY_DEATH_MAX_USES,
            uses_spent: 0,
        }
    }

    /// No uses at all: the default for entities without the feature.
    pub fn none() -> Self {
        Self {
            capacity: 0,
            uses_remaining: 0,
            uses_spent: 0,
        }
    }

    /// The CON save DC for the next use: 10 + damage this round + 5 per
    /// use already spent.
    pub fn next_dc(&self, damage_this_round: i32) -> i32 {
        10 + damage_this_round + 5 * self.uses_spent as i32
    }

    pub fn spend(&mut self) -> Result<(), DomainError> {
        if self.uses_remaining == 0 {
            return Err(DomainError::insufficient("no defy-death uses remaining"));
        }
        self.uses_remaining -= 1;
        self.uses_spent += 1;
        Ok(())
    }

    pub fn rest(&mut self, kind: RestKind) {
        if kind == RestKind::Long {
            self.uses_remaining = self.capacity;
            self.uses_spent = 0;
        }
    }
}

/// Per-round action economy and concentration cursor for solo combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoloCombatState {
    pub round: u32,
    pub action_available: bool,
    pub bonus_available: bool,
    /// Reactions remaining this round; two are possible, the second costs
    /// momentum.
    pub reactions_available: u32,
    /// Set once the momentum-paid second reaction has been taken.
    pub second_reaction_used: bool,
    /// Whether the extra heroic action has been taken this round.
    pub heroic_action_used: bool,
    pub concentrating_on: Option<AbilityId>,
    /// Damage accumulated this round, feeding the defy-death DC.
    pub damage_this_round: i32,
    /// Round the effect pipeline last ticked, making the tick idempotent.
    pub last_tick_round: Option<u32>,
}

impl SoloCombatState {
    pub fn new() -> Self {
        Self {
            round: 0,
            action_available: true,
            bonus_available: true,
            reactions_available: 1,
            second_reaction_used: false,
            heroic_action_used: false,
            concentrating_on: None,
            damage_this_round: 0,
            last_tick_round: None,
        }
    }

    /// Reset per-turn flags at the start of a round.
    pub fn start_round(&mut self, round: u32) {
        self.round = round;
        self.action_available = true;
        self.bonus_available = true;
        self.reactions_available = 1;
        self.second_reaction_used = false;
        self.heroic_action_used = false;
        self.damage_this_round = 0;
    }
}

impl Default for SoloCombatState {
    fn default() -> Self {
        Self::new()
    }
}

/// The fray die for a solo actor, by level band.
pub fn fray_die_sides(level: u32) -> u32 {
    match level {
        0..=4 => 6,
        5..=8 => 8,
        9..=12 => 10,
        _ => 12,
    }
}

/// Everything an entity can spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    /// Spell slots by level.
    pub spell_slots: BTreeMap<u8, SlotCounter>,
    pub cooldowns: HashMap<String, CooldownTracker>,
    pub usage_dice: HashMap<String, UsageDie>,
    pub stress: StressPool,
    pub defy_death: DefyDeath,
    pub solo: SoloCombatState,
}

impl ResourcePool {
    pub fn empty() -> Self {
        Self {
            spell_slots: BTreeMap::new(),
            cooldowns: HashMap::new(),
            usage_dice: HashMap::new(),
            stress: StressPool::new(10, 10),
            defy_death: DefyDeath::none(),
            solo: SoloCombatState::new(),
        }
    }

    pub fn with_spell_slots(mut self, slots: &[(u8, u32)]) -> Self {
        for &(level, max) in slots {
            self.spell_slots.insert(
                level,
                SlotCounter {
                    current: max,
                    max,
                },
            );
        }
        self
    }

    /// Spend one slot of the given level.
    pub fn spend_slot(&mut self, level: u8) -> Result<(), DomainError> {
        let slot = self.spell_slots.get_mut(&level).ok_or_else(|| {
            DomainError::insufficient(format!("no level {} spell slots", level))
        })?;
        if slot.current == 0 {
            return Err(DomainError::insufficient(format!(
                "no level {} spell slots remaining",
                level
            )));
        }
        slot.current -= 1;
        Ok(())
    }

    /// Apply a rest to every pool that cares.
    pub fn rest(&mut self, kind: RestKind) {
        for tracker in self.cooldowns.values_mut() {
            tracker.rest(kind);
        }
        for die in self.usage_dice.values_mut() {
            die.rest(kind);
        }
        self.defy_death.rest(kind);
        if kind == RestKind::Long {
            for slot in self.spell_slots.values_mut() {
                slot.current = slot.max;
            }
            self.stress.relieve_stress(self.stress.stress);
        }
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRoller(Vec<u32>, usize);

    impl FixedRoller {
        fn new(values: Vec<u32>) -> Self {
            Self(values, 0)
        }
    }

    impl DieRoller for FixedRoller {
        fn roll_die(&mut self, _sides: u32) -> u32 {
            let v = self.0[self.1 % self.0.len()];
            self.1 += 1;
            v
        }
    }

    #[test]
    fn test_usage_die_degrades_on_low_face() {
        let mut die = UsageDie::new(UsageDieSize::D6);
        let mut roller = FixedRoller::new(vec![2]);
        let roll = die.roll(&mut roller).unwrap();
        assert!(roll.degraded);
        assert_eq!(die.current, Some(UsageDieSize::D4));
    }

    #[test]
    fn test_usage_die_holds_on_high_face() {
        let mut die = UsageDie::new(UsageDieSize::D6);
        let mut roller = FixedRoller::new(vec![5]);
        let roll = die.roll(&mut roller).unwrap();
        assert!(!roll.degraded);
        assert_eq!(die.current, Some(UsageDieSize::D6));
    }

    #[test]
    fn test_usage_die_depletes_from_d4() {
        let mut die = UsageDie::new(UsageDieSize::D4);
        let mut roller = FixedRoller::new(vec![1]);
        let roll = die.roll(&mut roller).unwrap();
        assert!(roll.depleted);
        assert!(die.is_depleted());
    }

    #[test]
    fn test_depleted_usage_die_fails() {
        let mut die = UsageDie::new(UsageDieSize::D4);
        die.current = None;
        let mut roller = FixedRoller::new(vec![4]);
        let err = die.roll(&mut roller).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientResource(_)));
    }

    #[test]
    fn test_usage_die_rest_semantics() {
        let mut die = UsageDie::new(UsageDieSize::D6);
        die.current = Some(UsageDieSize::D4);
        die.rest(RestKind::Short);
        assert_eq!(die.current, Some(UsageDieSize::D4));
        die.rest(RestKind::Long);
        assert_eq!(die.current, Some(UsageDieSize::D6));
    }

    #[test]
    fn test_cooldown_spend_and_recharge() {
        let mut tracker = CooldownTracker::new(2, 6, 5, RestKind::Long);
        tracker.spend().unwrap();
        tracker.spend().unwrap();
        assert!(tracker.spend().is_err());

        let mut roller = FixedRoller::new(vec![3, 6]);
        let (face, ok) = tracker.try_recharge(&mut roller);
        assert_eq!((face, ok), (3, false));
        let (face, ok) = tracker.try_recharge(&mut roller);
        assert_eq!((face, ok), (6, true));
        assert_eq!(tracker.current, 1);
    }

    #[test]
    fn test_cooldown_rest_restore() {
        let mut tracker = CooldownTracker::new(3, 6, 5, RestKind::Long);
        tracker.current = 0;
        tracker.rest(RestKind::Short);
        assert_eq!(tracker.current, 0);
        tracker.rest(RestKind::Long);
        assert_eq!(tracker.current, 3);

        let mut short = CooldownTracker::new(1, 6, 5, RestKind::Short);
        short.current = 0;
        short.rest(RestKind::Short);
        assert_eq!(short.current, 1);
    }

    #[test]
    fn test_stress_breaking_point_fires_once() {
        let mut pool = StressPool::new(3, 5);
        assert_eq!(pool.add_stress(2), StressOutcome::Absorbed);
        assert_eq!(pool.add_stress(2), StressOutcome::BreakingPoint);
        assert_eq!(pool.add_stress(1), StressOutcome::Absorbed);
        pool.relieve_stress(2);
        assert_eq!(pool.add_stress(3), StressOutcome::BreakingPoint);
    }

    #[test]
    fn test_momentum_spend_and_reset() {
        let mut pool = StressPool::new(10, 5);
        pool.add_momentum(3);
        pool.spend_momentum(2).unwrap();
        assert_eq!(pool.momentum, 1);
        assert!(pool.spend_momentum(2).is_err());
        pool.add_momentum(4);
        pool.on_damage_taken();
        assert_eq!(pool.momentum, 0);
    }

    #[test]
    fn test_defy_death_dc_escalates() {
        let mut dd = DefyDeath::fresh();
        assert_eq!(dd.next_dc(8), 18);
        dd.spend().unwrap();
        assert_eq!(dd.next_dc(8), 23);
        dd.spend().unwrap();
        dd.spend().unwrap();
        assert!(dd.spend().is_err());
        dd.rest(RestKind::Long);
        assert_eq!(dd.uses_remaining, DEFY_DEATH_MAX_USES);
    }

    #[test]
    fn test_spell_slot_spend_and_long_rest() {
        let mut pool = ResourcePool::empty().with_spell_slots(&[(1, 2), (2, 1)]);
        pool.spend_slot(1).unwrap();
        pool.spend_slot(1).unwrap();
        assert!(pool.spend_slot(1).is_err());
        assert!(pool.spend_slot(3).is_err());
        pool.rest(RestKind::Long);
        assert_eq!(pool.spell_slots[&1].current, 2);
    }

    #[test]
    fn test_fray_die_bands() {
        assert_eq!(fray_die_sides(1), 6);
        assert_eq!(fray_die_sides(4), 6);
        assert_eq!(fray_die_sides(5), 8);
        assert_eq!(fray_die_sides(6), 8);
        assert_eq!(fray_die_sides(9), 10);
        assert_eq!(fray_die_sides(13), 12);
        assert_eq!(fray_die_sides(20), 12);
    }

    #[test]
    fn test_solo_round_reset() {
        let mut solo = SoloCombatState::new();
        solo.action_available = false;
        solo.reactions_available = 0;
        solo.damage_this_round = 12;
        solo.start_round(3);
        assert!(solo.action_available);
        assert_eq!(solo.reactions_available, 1);
        assert_eq!(solo.damage_this_round, 0);
        assert_eq!(solo.round, 3);
    }
}
