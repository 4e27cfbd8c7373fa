//! Entity records: the polymorphic entity, universes, events,
//! relationships, and quests.

pub mod entity;
pub mod event;
pub mod quest;
pub mod relationship;
pub mod universe;

pub use entity::{
    AbilityScores, CharacterStats, DeathSaves, Entity, EntityKind, FactionStats, ItemStats,
    LocationStats, LocationType, ObjectStats,
};
pub use event::{EventOutcome, EventType, GameEvent};
pub use quest::{Quest, QuestObjective, QuestReward, QuestStatus};
pub use relationship::{Relationship, RelationshipKind};
pub use universe::{Universe, UniverseStatus};
