//! The immutable event log
//!
//! Events are the sole mechanism by which state changes are recorded: the
//! event is appended before the repository is updated, so the log is the
//! ground truth and replay reproduces current state. Payload shapes are
//! additive-only across versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::game_time::GameTime;
use crate::ids::{EntityId, EventId, UniverseId};

/// Closed set of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    CombatRound,
    Dialogue,
    Travel,
    WorldTravel,
    ItemTransfer,
    ItemLost,
    Fork,
    ConditionApplied,
    ConditionRemoved,
    ConcentrationBroken,
    ResourceUsed,
    BreakingPoint,
    QuestUpdated,
    SkillCheck,
    SavingThrow,
    GmMove,
    EntityCreated,
    Rest,
    Death,
    DefiedDeath,
    TimeAdvanced,
}

/// Outcome label attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOutcome {
    Hit,
    Miss,
    StrongHit,
    WeakHit,
    Success,
    Fail,
    #[default]
    Neutral,
}

/// One immutable entry in a universe's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    pub id: EventId,
    pub universe_id: UniverseId,
    pub game_time: GameTime,
    pub recorded_at: DateTime<Utc>,
    pub actor_id: EntityId,
    pub target_id: Option<EntityId>,
    pub location_id: Option<EntityId>,
    pub event_type: EventType,
    pub outcome: EventOutcome,
    pub roll: Option<i32>,
    /// Causal predecessor; per-universe chains must stay acyclic.
    pub caused_by: Option<EventId>,
    pub payload: Map<String, Value>,
}

impl GameEvent {
    pub fn new(
        universe_id: UniverseId,
        game_time: GameTime,
        recorded_at: DateTime<Utc>,
        actor_id: EntityId,
        event_type: EventType,
    ) -> Self {
        Self {
            id: EventId::new(),
            universe_id,
            game_time,
            recorded_at,
            actor_id,
            target_id: None,
            location_id: None,
            event_type,
            outcome: EventOutcome::Neutral,
            roll: None,
            caused_by: None,
            payload: Map::new(),
        }
    }

    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target_id = Some(target);
        self
    }

    pub fn with_location(mut self, location: EntityId) -> Self {
        self.location_id = Some(location);
        self
    }

    pub fn with_outcome(mut self, outcome: EventOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_roll(mut self, roll: i32) -> Self {
        self.roll = Some(roll);
        self
    }

    pub fn caused_by(mut self, event: EventId) -> Self {
        self.caused_by = Some(event);
        self
    }

    pub fn with_payload_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_labels() {
        assert_eq!(
            serde_json::to_string(&EventType::CombatRound).unwrap(),
            "\"COMBAT_ROUND\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::QuestUpdated).unwrap(),
            "\"QUEST_UPDATED\""
        );
        assert_eq!(
            serde_json::to_string(&EventOutcome::StrongHit).unwrap(),
            "\"STRONG_HIT\""
        );
    }

    #[test]
    fn test_event_builder() {
        let universe = UniverseId::new();
        let actor = EntityId::new();
        let target = EntityId::new();
        let cause = EventId::new();

        let event = GameEvent::new(
            universe,
            GameTime::zero(),
            Utc::now(),
            actor,
            EventType::CombatRound,
        )
        .with_target(target)
        .with_outcome(EventOutcome::Hit)
        .with_roll(17)
        .caused_by(cause)
        .with_payload_field("damage", json!(9));

        assert_eq!(event.target_id, Some(target));
        assert_eq!(event.roll, Some(17));
        assert_eq!(event.caused_by, Some(cause));
        assert_eq!(event.payload["damage"], json!(9));
    }

    #[test]
    fn test_event_round_trips_through_json() {
        let event = GameEvent::new(
            UniverseId::new(),
            GameTime::from_seconds(42),
            Utc::now(),
            EntityId::new(),
            EventType::Travel,
        )
        .with_payload_field("direction", json!("north"));

        let text = serde_json::to_string(&event).unwrap();
        let back: GameEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
