//! Quest progression.
//!
//! Acceptance, progress, completion, and abandonment, each recorded as a
//! QUEST_UPDATED event before the quest row is written back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use ttasolo_domain::{
    DomainError, EntityId, EventType, GameEvent, GameTime, Quest, QuestId, QuestStatus,
    UniverseId,
};

use crate::infrastructure::ports::TruthRepo;

/// The quest service.
pub struct QuestService {
    truth: Arc<dyn TruthRepo>,
}

impl QuestService {
    pub fn new(truth: Arc<dyn TruthRepo>) -> Self {
        Self { truth }
    }

    async fn load(&self, universe_id: UniverseId, id: QuestId) -> Result<Quest, DomainError> {
        self.truth
            .load_quest(universe_id, id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Quest", id.to_string()))
    }

    async fn record(
        &self,
        quest: &Quest,
        actor_id: EntityId,
        game_time: GameTime,
        now: DateTime<Utc>,
        change: &str,
    ) -> Result<(), DomainError> {
        let mut tx = self.truth.begin().await.map_err(DomainError::from)?;
        tx.stage_event(
            GameEvent::new(
                quest.universe_id,
                game_time,
                now,
                actor_id,
                EventType::QuestUpdated,
            )
            .with_target(quest.giver_id)
            .with_payload_field("quest_id", json!(quest.id.to_string()))
            .with_payload_field("change", json!(change))
            .with_payload_field("status", json!(quest.status)),
        );
        tx.stage_quest(quest.clone());
        tx.commit().await.map_err(DomainError::from)?;
        Ok(())
    }

    /// Accept an available quest.
    pub async fn accept(
        &self,
        universe_id: UniverseId,
        quest_id: QuestId,
        actor_id: EntityId,
        game_time: GameTime,
        now: DateTime<Utc>,
    ) -> Result<Quest, DomainError> {
        let mut quest = self.load(universe_id, quest_id).await?;
        quest.accept()?;
        self.record(&quest, actor_id, game_time, now, "accepted").await?;
        Ok(quest)
    }

    /// Record progress on the current objective. Completing the final
    /// objective completes the quest.
    pub async fn record_progress(
        &self,
        universe_id: UniverseId,
        quest_id: QuestId,
        actor_id: EntityId,
        amount: u32,
        game_time: GameTime,
        now: DateTime<Utc>,
    ) -> Result<Quest, DomainError> {
        let mut quest = self.load(universe_id, quest_id).await?;
        let completed = quest.record_progress(amount)?;
        let change = if completed { "completed" } else { "progress" };
        self.record(&quest, actor_id, game_time, now, change).await?;
        Ok(quest)
    }

    /// Abandon a quest.
    pub async fn abandon(
        &self,
        universe_id: UniverseId,
        quest_id: QuestId,
        actor_id: EntityId,
        game_time: GameTime,
        now: DateTime<Utc>,
    ) -> Result<Quest, DomainError> {
        let mut quest = self.load(universe_id, quest_id).await?;
        quest.abandon();
        self.record(&quest, actor_id, game_time, now, "abandoned").await?;
        Ok(quest)
    }

    pub async fn active_quests(
        &self,
        universe_id: UniverseId,
    ) -> Result<Vec<Quest>, DomainError> {
        Ok(self
            .truth
            .list_quests(universe_id)
            .await
            .map_err(DomainError::from)?
            .into_iter()
            .filter(|q| q.status == QuestStatus::Active)
            .collect())
    }
}
