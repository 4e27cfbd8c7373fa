//! The polymorphic entity record
//!
//! Entities are a tagged variant with per-variant stats substructures, not
//! an inheritance tree. A thin capability surface (has_hp, has_inventory,
//! is_container) is exposed as methods over the variant. Entities are never
//! destroyed: item loss and character death are state flags plus events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::DomainError;
use crate::game_systems::srd5e::{ability_modifier, proficiency_bonus, Ability, Skill};
use crate::ids::{EntityId, UniverseId};
use crate::value_objects::conditions::{ActiveEffect, ConditionInstance, ConditionKind};
use crate::value_objects::personality::{Motivation, PersonalityProfile};
use crate::value_objects::resources::ResourcePool;

/// Death-save progress for a dying character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

/// The six ability scores. Scores are validated to [1, 30].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl AbilityScores {
    pub fn new(
        strength: i32,
        dexterity: i32,
        constitution: i32,
        intelligence: i32,
        wisdom: i32,
        charisma: i32,
    ) -> Result<Self, DomainError> {
        let scores = Self {
            strength,
            dexterity,
            constitution,
            intelligence,
            wisdom,
            charisma,
        };
        for ability in [
            Ability::Str,
            Ability::Dex,
            Ability::Con,
            Ability::Int,
            Ability::Wis,
            Ability::Cha,
        ] {
            let score = scores.get(ability);
            if !(1..=30).contains(&score) {
                return Err(DomainError::bad_input(format!(
                    "{} score {} out of range [1, 30]",
                    ability, score
                )));
            }
        }
        Ok(scores)
    }

    pub fn all_tens() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Str => self.strength,
            Ability::Dex => self.dexterity,
            Ability::Con => self.constitution,
            Ability::Int => self.intelligence,
            Ability::Wis => self.wisdom,
            Ability::Cha => self.charisma,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        ability_modifier(self.get(ability))
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::all_tens()
    }
}

/// Character variant stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterStats {
    pub hp: i32,
    pub hp_max: i32,
    pub ac: i32,
    pub scores: AbilityScores,
    pub level: u32,
    /// Hit dice count, which doubles as the HD rating fray damage checks
    /// against.
    pub hit_dice: u32,
    pub hit_die_size: u32,
    pub death_saves: DeathSaves,
    pub skill_proficiencies: Vec<Skill>,
    pub save_proficiencies: Vec<Ability>,
    pub weapon_proficiencies: Vec<String>,
    pub resources: ResourcePool,
    /// Faction entity id -> signed reputation.
    pub faction_reputation: HashMap<EntityId, i32>,
    pub conditions: Vec<ConditionInstance>,
    pub active_effects: Vec<ActiveEffect>,
    pub exhaustion: u8,
    pub personality: Option<PersonalityProfile>,
    pub motivations: Vec<Motivation>,
    /// Set by a DEATH event; dead characters stay in the store.
    pub dead: bool,
}

impl CharacterStats {
    pub fn new(level: u32, hp_max: i32, ac: i32, scores: AbilityScores) -> Result<Self, DomainError> {
        if level < 1 {
            return Err(DomainError::bad_input("level must be at least 1"));
        }
        if hp_max < 1 {
            return Err(DomainError::bad_input("hp_max must be positive"));
        }
        Ok(Self {
            hp: hp_max,
            hp_max,
            ac,
            scores,
            level,
            hit_dice: level,
            hit_die_size: 8,
            death_saves: DeathSaves::default(),
            skill_proficiencies: Vec::new(),
            save_proficiencies: Vec::new(),
            weapon_proficiencies: Vec::new(),
            resources: ResourcePool::empty(),
            faction_reputation: HashMap::new(),
            conditions: Vec::new(),
            active_effects: Vec::new(),
            exhaustion: 0,
            personality: None,
            motivations: Vec::new(),
            dead: false,
        })
    }

    pub fn proficiency_bonus(&self) -> i32 {
        proficiency_bonus(self.level)
    }

    pub fn is_proficient_in_skill(&self, skill: Skill) -> bool {
        self.skill_proficiencies.contains(&skill)
    }

    pub fn is_proficient_in_save(&self, ability: Ability) -> bool {
        self.save_proficiencies.contains(&ability)
    }

    /// Apply damage, clamping HP at zero. Momentum resets and the
    /// round-damage counter feeds the defy-death DC.
    pub fn apply_damage(&mut self, amount: i32) {
        let amount = amount.max(0);
        self.hp = (self.hp - amount).max(0);
        self.resources.stress.on_damage_taken();
        self.resources.solo.damage_this_round += amount;
    }

    /// Heal, clamping at hp_max. Healing a dying character clears death
    /// saves.
    pub fn heal(&mut self, amount: i32) {
        let was_down = self.hp == 0;
        self.hp = (self.hp + amount.max(0)).min(self.hp_max);
        if was_down && self.hp > 0 {
            self.death_saves = DeathSaves::default();
        }
    }

    pub fn is_down(&self) -> bool {
        self.hp == 0
    }

    pub fn has_condition(&self, kind: ConditionKind) -> bool {
        self.conditions.iter().any(|c| c.kind == kind)
    }
}

/// Location variant stats. Exits form a directed graph that may be
/// non-symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStats {
    /// Direction name -> destination entity id.
    pub exits: HashMap<String, EntityId>,
    /// 0-20; drives GM move selection.
    pub danger_level: u8,
    pub location_type: LocationType,
}

impl LocationStats {
    pub fn new(danger_level: u8, location_type: LocationType) -> Result<Self, DomainError> {
        if danger_level > 20 {
            return Err(DomainError::bad_input(format!(
                "danger level {} out of range [0, 20]",
                danger_level
            )));
        }
        Ok(Self {
            exits: HashMap::new(),
            danger_level,
            location_type,
        })
    }
}

/// Location flavor, used to key the move executor's template fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Tavern,
    Dungeon,
    Market,
    Forest,
    #[default]
    Other,
}

/// Item variant stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStats {
    pub weight: f32,
    pub value: u32,
    /// Damage dice notation for weapons.
    pub damage_dice: Option<String>,
    pub damage_type: Option<String>,
    /// Armor class for armor.
    pub armor_class: Option<i32>,
    /// Cleared when the item is lost; an ITEM_LOST event records why.
    pub active: bool,
}

impl ItemStats {
    pub fn mundane(weight: f32, value: u32) -> Self {
        Self {
            weight,
            value,
            damage_dice: None,
            damage_type: None,
            armor_class: None,
            active: true,
        }
    }

    pub fn weapon(weight: f32, value: u32, dice: impl Into<String>, damage_type: impl Into<String>) -> Self {
        Self {
            weight,
            value,
            damage_dice: Some(dice.into()),
            damage_type: Some(damage_type.into()),
            armor_class: None,
            active: true,
        }
    }
}

/// Faction variant stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactionStats {
    pub agenda: String,
    pub power: i32,
}

/// Plain scenery objects carry no structured stats.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStats {
    pub interactable: bool,
}

/// Per-variant stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EntityKind {
    Character(CharacterStats),
    Location(LocationStats),
    Item(ItemStats),
    Faction(FactionStats),
    Object(ObjectStats),
}

impl EntityKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EntityKind::Character(_) => "character",
            EntityKind::Location(_) => "location",
            EntityKind::Item(_) => "item",
            EntityKind::Faction(_) => "faction",
            EntityKind::Object(_) => "object",
        }
    }
}

/// An entity in one universe. Names are unique within a universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub universe_id: UniverseId,
    pub name: String,
    pub tags: Vec<String>,
    pub description: String,
    /// Bumped on every save; stale-version saves are rejected.
    pub version: u64,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(
        universe_id: UniverseId,
        name: impl Into<String>,
        kind: EntityKind,
    ) -> Self {
        Self {
            id: EntityId::new(),
            universe_id,
            name: name.into(),
            tags: Vec::new(),
            description: String::new(),
            version: 0,
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    // Capability surface over the variant

    pub fn has_hp(&self) -> bool {
        matches!(self.kind, EntityKind::Character(_))
    }

    pub fn has_inventory(&self) -> bool {
        matches!(self.kind, EntityKind::Character(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, EntityKind::Location(_) | EntityKind::Object(_))
    }

    pub fn as_character(&self) -> Option<&CharacterStats> {
        match &self.kind {
            EntityKind::Character(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn as_character_mut(&mut self) -> Option<&mut CharacterStats> {
        match &mut self.kind {
            EntityKind::Character(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&LocationStats> {
        match &self.kind {
            EntityKind::Location(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn as_location_mut(&mut self) -> Option<&mut LocationStats> {
        match &mut self.kind {
            EntityKind::Location(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&ItemStats> {
        match &self.kind {
            EntityKind::Item(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn as_item_mut(&mut self) -> Option<&mut ItemStats> {
        match &mut self.kind {
            EntityKind::Item(stats) => Some(stats),
            _ => None,
        }
    }

    /// Expect the character variant, with a typed error otherwise.
    pub fn expect_character(&self) -> Result<&CharacterStats, DomainError> {
        self.as_character().ok_or_else(|| {
            DomainError::invalid_target(format!("{} is not a character", self.name))
        })
    }

    pub fn expect_location(&self) -> Result<&LocationStats, DomainError> {
        self.as_location().ok_or_else(|| {
            DomainError::invalid_target(format!("{} is not a location", self.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character() -> CharacterStats {
        CharacterStats::new(3, 24, 15, AbilityScores::all_tens()).unwrap()
    }

    #[test]
    fn test_score_range_enforced() {
        assert!(AbilityScores::new(0, 10, 10, 10, 10, 10).is_err());
        assert!(AbilityScores::new(10, 31, 10, 10, 10, 10).is_err());
        assert!(AbilityScores::new(1, 30, 10, 10, 10, 10).is_ok());
    }

    #[test]
    fn test_level_must_be_positive() {
        assert!(CharacterStats::new(0, 10, 10, AbilityScores::all_tens()).is_err());
    }

    #[test]
    fn test_damage_clamps_at_zero() {
        let mut stats = character();
        stats.apply_damage(100);
        assert_eq!(stats.hp, 0);
        assert!(stats.is_down());
    }

    #[test]
    fn test_damage_resets_momentum_and_tracks_round_damage() {
        let mut stats = character();
        stats.resources.stress.add_momentum(4);
        stats.apply_damage(7);
        stats.apply_damage(5);
        assert_eq!(stats.resources.stress.momentum, 0);
        assert_eq!(stats.resources.solo.damage_this_round, 12);
    }

    #[test]
    fn test_heal_clamps_at_max_and_clears_death_saves() {
        let mut stats = character();
        stats.apply_damage(24);
        stats.death_saves.failures = 2;
        stats.heal(100);
        assert_eq!(stats.hp, 24);
        assert_eq!(stats.death_saves, DeathSaves::default());
    }

    #[test]
    fn test_danger_level_bounds() {
        assert!(LocationStats::new(21, LocationType::Dungeon).is_err());
        assert!(LocationStats::new(20, LocationType::Dungeon).is_ok());
    }

    #[test]
    fn test_capability_surface() {
        let universe = UniverseId::new();
        let pc = Entity::new(universe, "Aria", EntityKind::Character(character()));
        assert!(pc.has_hp());
        assert!(pc.has_inventory());
        assert!(!pc.is_container());

        let room = Entity::new(
            universe,
            "Cellar",
            EntityKind::Location(LocationStats::new(2, LocationType::Dungeon).unwrap()),
        );
        assert!(room.is_container());
        assert!(room.expect_character().is_err());
        assert!(room.expect_location().is_ok());
    }
}
