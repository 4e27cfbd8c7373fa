//! Quests and objectives
//!
//! A quest is an ordered objective list with a cursor. Status transitions
//! go available -> active -> completed/failed/abandoned; chains link to a
//! parent and a follow-up quest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{EntityId, QuestId, UniverseId};

/// Quest lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Available,
    Active,
    Completed,
    Failed,
    Abandoned,
}

/// One step of a quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestObjective {
    pub description: String,
    /// Entity or location the objective is about.
    pub target: Option<EntityId>,
    pub required: u32,
    pub progress: u32,
}

impl QuestObjective {
    pub fn new(description: impl Into<String>, required: u32) -> Self {
        Self {
            description: description.into(),
            target: None,
            required: required.max(1),
            progress: 0,
        }
    }

    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= self.required
    }
}

/// Reward granted on completion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestReward {
    pub gold: u32,
    pub items: Vec<EntityId>,
    pub reputation: Vec<(EntityId, i32)>,
}

/// A quest in one universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: QuestId,
    pub universe_id: UniverseId,
    pub giver_id: EntityId,
    pub name: String,
    pub objectives: Vec<QuestObjective>,
    pub current_objective: usize,
    pub status: QuestStatus,
    pub reward: QuestReward,
    pub expires_at: Option<DateTime<Utc>>,
    pub parent_quest: Option<QuestId>,
    pub next_quest: Option<QuestId>,
}

impl Quest {
    pub fn new(
        universe_id: UniverseId,
        giver_id: EntityId,
        name: impl Into<String>,
        objectives: Vec<QuestObjective>,
    ) -> Result<Self, DomainError> {
        if objectives.is_empty() {
            return Err(DomainError::bad_input("a quest needs at least one objective"));
        }
        Ok(Self {
            id: QuestId::new(),
            universe_id,
            giver_id,
            name: name.into(),
            objectives,
            current_objective: 0,
            status: QuestStatus::Available,
            reward: QuestReward::default(),
            expires_at: None,
            parent_quest: None,
            next_quest: None,
        })
    }

    pub fn accept(&mut self) -> Result<(), DomainError> {
        if self.status != QuestStatus::Available {
            return Err(DomainError::rule_violation(format!(
                "quest '{}' is not available",
                self.name
            )));
        }
        self.status = QuestStatus::Active;
        Ok(())
    }

    /// Advance the current objective; completing the last objective
    /// completes the quest. Returns true when the quest finished.
    pub fn record_progress(&mut self, amount: u32) -> Result<bool, DomainError> {
        if self.status != QuestStatus::Active {
            return Err(DomainError::rule_violation(format!(
                "quest '{}' is not active",
                self.name
            )));
        }
        let index = self.current_objective;
        let objective = self
            .objectives
            .get_mut(index)
            .ok_or_else(|| DomainError::rule_violation("quest has no current objective"))?;
        objective.progress = (objective.progress + amount).min(objective.required);

        if objective.is_complete() {
            if index + 1 < self.objectives.len() {
                self.current_objective = index + 1;
            } else {
                self.status = QuestStatus::Completed;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn abandon(&mut self) {
        if self.status == QuestStatus::Active || self.status == QuestStatus::Available {
            self.status = QuestStatus::Abandoned;
        }
    }

    pub fn fail(&mut self) {
        if self.status == QuestStatus::Active {
            self.status = QuestStatus::Failed;
        }
    }
}
