//! SQLite truth store.
//!
//! The durable system of record. `stats`, `tags`, and `payload` are
//! JSON-valued columns; branching copies the parent's entity and quest
//! rows under the child universe id. The staged-write transaction maps
//! onto a real SQLite transaction at commit time.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use ttasolo_domain::{
    Entity, EntityId, EventId, GameEvent, Quest, QuestId, Universe, UniverseId,
};
use uuid::Uuid;

use crate::infrastructure::ports::{RepoError, Snapshot, TruthRepo, TruthTransaction};

/// SQLite-backed [`TruthRepo`].
#[derive(Clone)]
pub struct SqliteTruthRepo {
    pool: SqlitePool,
}

impl SqliteTruthRepo {
    /// Open (or create) the store. Pass ":memory:" for an ephemeral
    /// database.
    pub async fn connect(path: &str) -> Result<Self, RepoError> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|e| RepoError::storage("connect", e))?;
        let repo = Self { pool };
        repo.initialize_schema().await?;
        Ok(repo)
    }

    async fn initialize_schema(&self) -> Result<(), RepoError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS universes (
                id TEXT PRIMARY KEY,
                branch TEXT NOT NULL,
                parent_id TEXT,
                depth INTEGER NOT NULL,
                status TEXT NOT NULL,
                owner TEXT NOT NULL,
                forked_at_event TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS entities (
                universe_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                description TEXT NOT NULL,
                tags TEXT NOT NULL,
                version INTEGER NOT NULL,
                stats TEXT NOT NULL,
                PRIMARY KEY (universe_id, id)
            )",
            "CREATE INDEX IF NOT EXISTS entities_by_name ON entities (universe_id, name)",
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                universe_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                game_seconds INTEGER NOT NULL,
                payload TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS events_by_universe ON events (universe_id, seq)",
            "CREATE TABLE IF NOT EXISTS quests (
                universe_id TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (universe_id, id)
            )",
            "CREATE TABLE IF NOT EXISTS npc_profiles (
                universe_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                personality TEXT NOT NULL,
                PRIMARY KEY (universe_id, entity_id)
            )",
            "CREATE TABLE IF NOT EXISTS npc_memories (
                id TEXT PRIMARY KEY,
                universe_id TEXT NOT NULL,
                npc_id TEXT NOT NULL,
                content TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::storage("initialize_schema", e))?;
        }
        Ok(())
    }

    fn row_to_entity(row: &sqlx::sqlite::SqliteRow) -> Result<Entity, RepoError> {
        let stats: String = row.get("stats");
        let tags: String = row.get("tags");
        let id: String = row.get("id");
        let universe_id: String = row.get("universe_id");
        Ok(Entity {
            id: EntityId::from_uuid(parse_uuid(&id)?),
            universe_id: UniverseId::from_uuid(parse_uuid(&universe_id)?),
            name: row.get("name"),
            tags: serde_json::from_str(&tags).map_err(RepoError::serialization)?,
            description: row.get("description"),
            version: row.get::<i64, _>("version") as u64,
            kind: serde_json::from_str(&stats).map_err(RepoError::serialization)?,
        })
    }

    fn row_to_universe(row: &sqlx::sqlite::SqliteRow) -> Result<Universe, RepoError> {
        let id: String = row.get("id");
        let parent_id: Option<String> = row.get("parent_id");
        let forked_at_event: Option<String> = row.get("forked_at_event");
        let status: String = row.get("status");
        let created_at: String = row.get("created_at");
        Ok(Universe {
            id: UniverseId::from_uuid(parse_uuid(&id)?),
            branch: row.get("branch"),
            parent_id: parent_id
                .map(|p| parse_uuid(&p).map(UniverseId::from_uuid))
                .transpose()?,
            depth: row.get::<i64, _>("depth") as u32,
            status: serde_json::from_str(&format!("\"{}\"", status))
                .map_err(RepoError::serialization)?,
            owner: row.get("owner"),
            forked_at_event: forked_at_event
                .map(|e| parse_uuid(&e).map(ttasolo_domain::EventId::from_uuid))
                .transpose()?,
            created_at: created_at
                .parse()
                .map_err(|e| RepoError::serialization(format!("created_at: {}", e)))?,
        })
    }

    async fn save_entity_in<'e, E>(executor: E, entity: &Entity) -> Result<Entity, RepoError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let stats = serde_json::to_string(&entity.kind).map_err(RepoError::serialization)?;
        let tags = serde_json::to_string(&entity.tags).map_err(RepoError::serialization)?;
        let mut stored = entity.clone();
        stored.version = entity.version + 1;

        // Optimistic insert-or-replace guarded by the version column; the
        // WHERE clause makes a stale write change no rows.
        let result = sqlx::query(
            "INSERT INTO entities (universe_id, id, name, entity_type, description, tags, version, stats)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (universe_id, id) DO UPDATE SET
                 name = excluded.name,
                 entity_type = excluded.entity_type,
                 description = excluded.description,
                 tags = excluded.tags,
                 version = excluded.version,
                 stats = excluded.stats
             WHERE entities.version = ?7 - 1
                OR (entities.version = ?7 AND entities.stats = excluded.stats)",
        )
        .bind(entity.universe_id.to_string())
        .bind(entity.id.to_string())
        .bind(&entity.name)
        .bind(entity.kind.type_name())
        .bind(&entity.description)
        .bind(tags)
        .bind(stored.version as i64)
        .bind(stats)
        .execute(executor)
        .await
        .map_err(|e| RepoError::storage("save_entity", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::VersionConflict {
                id: entity.id.to_string(),
                expected: entity.version,
                found: stored.version,
            });
        }
        Ok(stored)
    }

    async fn append_event_in<'e, E>(executor: E, event: &GameEvent) -> Result<(), RepoError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let payload = serde_json::to_string(event).map_err(RepoError::serialization)?;
        // The strictly-monotonic guard lives in the INSERT itself.
        let result = sqlx::query(
            "INSERT INTO events (id, universe_id, seq, game_seconds, payload)
             SELECT ?1, ?2,
                 COALESCE((SELECT MAX(seq) FROM events WHERE universe_id = ?2), 0) + 1,
                 ?3, ?4
             WHERE NOT EXISTS (
                 SELECT 1 FROM events
                 WHERE universe_id = ?2 AND game_seconds >= ?3
             )",
        )
        .bind(event.id.to_string())
        .bind(event.universe_id.to_string())
        .bind(event.game_time.seconds as i64)
        .bind(payload)
        .execute(executor)
        .await
        .map_err(|e| RepoError::storage("append_event", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::constraint(
                "event timestamps must be strictly monotonic per universe",
            ));
        }
        Ok(())
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepoError> {
    raw.parse()
        .map_err(|e| RepoError::serialization(format!("uuid '{}': {}", raw, e)))
}

#[async_trait]
impl TruthRepo for SqliteTruthRepo {
    async fn load_entity(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, RepoError> {
        let row = sqlx::query("SELECT * FROM entities WHERE universe_id = ?1 AND id = ?2")
            .bind(universe_id.to_string())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::storage("load_entity", e))?;
        row.as_ref().map(Self::row_to_entity).transpose()
    }

    async fn find_entity_by_name(
        &self,
        universe_id: UniverseId,
        name: &str,
    ) -> Result<Option<Entity>, RepoError> {
        let row = sqlx::query("SELECT * FROM entities WHERE universe_id = ?1 AND name = ?2")
            .bind(universe_id.to_string())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::storage("find_entity_by_name", e))?;
        row.as_ref().map(Self::row_to_entity).transpose()
    }

    async fn save_entity(&self, entity: &Entity) -> Result<Entity, RepoError> {
        let saved = Self::save_entity_in(&self.pool, entity).await?;

        // Keep the NPC profile projection current.
        if let Some(personality) = entity.as_character().and_then(|s| s.personality) {
            let json =
                serde_json::to_string(&personality).map_err(RepoError::serialization)?;
            sqlx::query(
                "INSERT INTO npc_profiles (universe_id, entity_id, personality)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (universe_id, entity_id) DO UPDATE SET personality = excluded.personality",
            )
            .bind(entity.universe_id.to_string())
            .bind(entity.id.to_string())
            .bind(json)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::storage("save_npc_profile", e))?;
        }
        Ok(saved)
    }

    async fn list_entities(&self, universe_id: UniverseId) -> Result<Vec<Entity>, RepoError> {
        let rows = sqlx::query("SELECT * FROM entities WHERE universe_id = ?1 ORDER BY id")
            .bind(universe_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::storage("list_entities", e))?;
        rows.iter().map(Self::row_to_entity).collect()
    }

    async fn append_event(&self, event: &GameEvent) -> Result<(), RepoError> {
        Self::append_event_in(&self.pool, event).await
    }

    async fn list_events(
        &self,
        universe_id: UniverseId,
        limit: Option<usize>,
    ) -> Result<Vec<GameEvent>, RepoError> {
        let rows = match limit {
            Some(n) => {
                sqlx::query(
                    "SELECT payload FROM (
                         SELECT seq, payload FROM events
                         WHERE universe_id = ?1 ORDER BY seq DESC LIMIT ?2
                     ) ORDER BY seq ASC",
                )
                .bind(universe_id.to_string())
                .bind(n as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT payload FROM events WHERE universe_id = ?1 ORDER BY seq ASC")
                    .bind(universe_id.to_string())
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| RepoError::storage("list_events", e))?;

        rows.iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(RepoError::serialization)
            })
            .collect()
    }

    async fn get_universe(&self, id: UniverseId) -> Result<Option<Universe>, RepoError> {
        let row = sqlx::query("SELECT * FROM universes WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::storage("get_universe", e))?;
        row.as_ref().map(Self::row_to_universe).transpose()
    }

    async fn save_universe(&self, universe: &Universe) -> Result<(), RepoError> {
        let status = serde_json::to_string(&universe.status)
            .map_err(RepoError::serialization)?
            .trim_matches('"')
            .to_string();
        sqlx::query(
            "INSERT INTO universes (id, branch, parent_id, depth, status, owner, forked_at_event, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (id) DO UPDATE SET
                 branch = excluded.branch,
                 status = excluded.status,
                 owner = excluded.owner",
        )
        .bind(universe.id.to_string())
        .bind(&universe.branch)
        .bind(universe.parent_id.map(|p| p.to_string()))
        .bind(universe.depth as i64)
        .bind(status)
        .bind(&universe.owner)
        .bind(universe.forked_at_event.map(|e| e.to_string()))
        .bind(universe.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::storage("save_universe", e))?;
        Ok(())
    }

    async fn list_universes(&self) -> Result<Vec<Universe>, RepoError> {
        let rows = sqlx::query("SELECT * FROM universes ORDER BY depth, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::storage("list_universes", e))?;
        rows.iter().map(Self::row_to_universe).collect()
    }

    async fn create_branch(&self, child: &Universe) -> Result<(), RepoError> {
        let parent_id = child
            .parent_id
            .ok_or_else(|| RepoError::constraint("cannot branch a root universe into existence"))?;
        if self.get_universe(parent_id).await?.is_none() {
            return Err(RepoError::not_found("Universe", parent_id));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::storage("create_branch", e))?;

        sqlx::query(
            "INSERT INTO entities (universe_id, id, name, entity_type, description, tags, version, stats)
             SELECT ?1, id, name, entity_type, description, tags, version, stats
             FROM entities WHERE universe_id = ?2",
        )
        .bind(child.id.to_string())
        .bind(parent_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::storage("create_branch", e))?;

        sqlx::query(
            "INSERT INTO quests (universe_id, id, data)
             SELECT ?1, id, data FROM quests WHERE universe_id = ?2",
        )
        .bind(child.id.to_string())
        .bind(parent_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::storage("create_branch", e))?;

        tx.commit()
            .await
            .map_err(|e| RepoError::storage("create_branch", e))?;

        self.save_universe(child).await?;
        Ok(())
    }

    async fn snapshot_at(
        &self,
        universe_id: UniverseId,
        event_id: EventId,
    ) -> Result<Snapshot, RepoError> {
        let known = sqlx::query("SELECT 1 FROM events WHERE id = ?1 AND universe_id = ?2")
            .bind(event_id.to_string())
            .bind(universe_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::storage("snapshot_at", e))?;
        if known.is_none() {
            return Err(RepoError::not_found("Event", event_id));
        }
        Ok(Snapshot {
            valid_to_event: event_id,
            universe_id,
            entities: self.list_entities(universe_id).await?,
        })
    }

    async fn load_quest(
        &self,
        universe_id: UniverseId,
        id: QuestId,
    ) -> Result<Option<Quest>, RepoError> {
        let row = sqlx::query("SELECT data FROM quests WHERE universe_id = ?1 AND id = ?2")
            .bind(universe_id.to_string())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::storage("load_quest", e))?;
        row.map(|row| {
            let mut quest: Quest = serde_json::from_str(&row.get::<String, _>("data"))
                .map_err(RepoError::serialization)?;
            // Branch copies keep the serialized parent id in `data`.
            quest.universe_id = universe_id;
            Ok(quest)
        })
        .transpose()
    }

    async fn save_quest(&self, quest: &Quest) -> Result<(), RepoError> {
        let data = serde_json::to_string(quest).map_err(RepoError::serialization)?;
        sqlx::query(
            "INSERT INTO quests (universe_id, id, data) VALUES (?1, ?2, ?3)
             ON CONFLICT (universe_id, id) DO UPDATE SET data = excluded.data",
        )
        .bind(quest.universe_id.to_string())
        .bind(quest.id.to_string())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::storage("save_quest", e))?;
        Ok(())
    }

    async fn list_quests(&self, universe_id: UniverseId) -> Result<Vec<Quest>, RepoError> {
        let rows = sqlx::query("SELECT data FROM quests WHERE universe_id = ?1 ORDER BY id")
            .bind(universe_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::storage("list_quests", e))?;
        rows.iter()
            .map(|row| {
                let mut quest: Quest = serde_json::from_str(&row.get::<String, _>("data"))
                    .map_err(RepoError::serialization)?;
                quest.universe_id = universe_id;
                Ok(quest)
            })
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn TruthTransaction>, RepoError> {
        Ok(Box::new(SqliteTransaction {
            pool: self.pool.clone(),
            entities: Vec::new(),
            events: Vec::new(),
            quests: Vec::new(),
        }))
    }
}

struct SqliteTransaction {
    pool: SqlitePool,
    entities: Vec<Entity>,
    events: Vec<GameEvent>,
    quests: Vec<Quest>,
}

#[async_trait]
impl TruthTransaction for SqliteTransaction {
    fn stage_entity(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    fn stage_event(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    fn stage_quest(&mut self, quest: Quest) {
        self.quests.push(quest);
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::storage("commit", e))?;

        // Events lead, entity writes follow; any failure rolls the whole
        // SQLite transaction back.
        for event in &self.events {
            SqliteTruthRepo::append_event_in(&mut *tx, event).await?;
        }
        for entity in &self.entities {
            SqliteTruthRepo::save_entity_in(&mut *tx, entity).await?;
        }
        for quest in &self.quests {
            let data = serde_json::to_string(quest).map_err(RepoError::serialization)?;
            sqlx::query(
                "INSERT INTO quests (universe_id, id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT (universe_id, id) DO UPDATE SET data = excluded.data",
            )
            .bind(quest.universe_id.to_string())
            .bind(quest.id.to_string())
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::storage("commit", e))?;
        }

        tx.commit().await.map_err(|e| RepoError::storage("commit", e))
    }

    fn discard(self: Box<Self>) {
        // Nothing reached the database.
    }
}
