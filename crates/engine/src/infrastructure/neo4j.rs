//! Neo4j graph store.
//!
//! Nodes carry the serialized entity as a `data` property plus indexed
//! id/name/universe/type properties; relationships are typed edges with
//! an `edge_id` property. Universe ancestry is modeled as `:Universe`
//! nodes joined by `PARENT_OF`, and the variant rule is resolved by
//! walking that chain exactly like the in-memory adapter does.

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph};
use ttasolo_domain::{
    Entity, EntityId, Relationship, RelationshipId, RelationshipKind, Universe, UniverseId,
};

use crate::infrastructure::ports::{GraphRepo, NpcMemory, RepoError};

/// Shared Neo4j connection.
#[derive(Clone)]
pub struct Neo4jConnection {
    graph: Graph,
}

impl Neo4jConnection {
    pub async fn new(
        uri: &str,
        user: &str,
        password: &str,
        database: &str,
    ) -> anyhow::Result<Self> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .db(database)
            .build()?;
        let graph = Graph::connect(config).await?;
        tracing::info!("Connected to Neo4j at {}", uri);
        Ok(Self { graph })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Create constraints and indexes.
    pub async fn initialize_schema(&self) -> anyhow::Result<()> {
        let constraints = [
            "CREATE CONSTRAINT universe_id IF NOT EXISTS FOR (u:Universe) REQUIRE u.id IS UNIQUE",
            "CREATE CONSTRAINT memory_id IF NOT EXISTS FOR (m:Memory) REQUIRE m.id IS UNIQUE",
        ];
        for constraint in constraints {
            if let Err(e) = self.graph.run(query(constraint)).await {
                tracing::warn!("Constraint creation warning: {}", e);
            }
        }

        let indexes = [
            "CREATE INDEX entity_id IF NOT EXISTS FOR (e:Entity) ON (e.id)",
            "CREATE INDEX entity_name IF NOT EXISTS FOR (e:Entity) ON (e.name)",
            "CREATE INDEX entity_universe IF NOT EXISTS FOR (e:Entity) ON (e.universe_id)",
            "CREATE INDEX entity_type IF NOT EXISTS FOR (e:Entity) ON (e.entity_type)",
            "CREATE INDEX memory_npc IF NOT EXISTS FOR (m:Memory) ON (m.npc_id, m.recorded_at)",
        ];
        for index in indexes {
            if let Err(e) = self.graph.run(query(index)).await {
                tracing::warn!("Index creation warning: {}", e);
            }
        }

        tracing::info!("Graph schema initialized");
        Ok(())
    }
}

/// Neo4j-backed [`GraphRepo`].
pub struct Neo4jGraphRepo {
    connection: Neo4jConnection,
}

impl Neo4jGraphRepo {
    pub fn new(connection: Neo4jConnection) -> Self {
        Self { connection }
    }

    fn graph(&self) -> &Graph {
        self.connection.graph()
    }

    fn storage(operation: &'static str, error: neo4rs::Error) -> RepoError {
        RepoError::storage(operation, error)
    }

    /// The universe and its ancestors, nearest first.
    async fn chain(&self, universe_id: UniverseId) -> Result<Vec<UniverseId>, RepoError> {
        let mut result = self
            .graph()
            .execute(
                query(
                    "MATCH (u:Universe {id: $id})
                     OPTIONAL MATCH path = (root:Universe)-[:PARENT_OF*]->(u)
                     WITH u, path ORDER BY length(path) DESC LIMIT 1
                     RETURN CASE
                         WHEN path IS NULL THEN [u.id]
                         ELSE [n IN reverse(nodes(path)) | n.id]
                     END AS chain",
                )
                .param("id", universe_id.to_string()),
            )
            .await
            .map_err(|e| Self::storage("chain", e))?;

        let mut chain = Vec::new();
        if let Ok(Some(row)) = result.next().await {
            let ids: Vec<String> = row.get("chain").unwrap_or_default();
            for raw in ids {
                if let Ok(uuid) = raw.parse() {
                    chain.push(UniverseId::from_uuid(uuid));
                }
            }
        }
        if chain.is_empty() {
            chain.push(universe_id);
        }
        Ok(chain)
    }

    async fn node_in(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, RepoError> {
        let mut result = self
            .graph()
            .execute(
                query(
                    "MATCH (e:Entity {universe_id: $universe_id, id: $id}) RETURN e.data AS data",
                )
                .param("universe_id", universe_id.to_string())
                .param("id", id.to_string()),
            )
            .await
            .map_err(|e| Self::storage("get_node", e))?;
        match result.next().await.map_err(|e| Self::storage("get_node", e))? {
            Some(row) => {
                let data: String = row
                    .get("data")
                    .map_err(|e| RepoError::serialization(e.to_string()))?;
                Ok(Some(
                    serde_json::from_str(&data).map_err(RepoError::serialization)?,
                ))
            }
            None => Ok(None),
        }
    }

    /// The variant shadowing a canonical id in one universe, if any.
    async fn variant_in(
        &self,
        universe_id: UniverseId,
        canonical: EntityId,
    ) -> Result<Option<EntityId>, RepoError> {
        let mut result = self
            .graph()
            .execute(
                query(
                    "MATCH (v:Entity {universe_id: $universe_id})-[r:VARIANT_OF]->(c:Entity {id: $canonical})
                     RETURN v.id AS id",
                )
                .param("universe_id", universe_id.to_string())
                .param("canonical", canonical.to_string()),
            )
            .await
            .map_err(|e| Self::storage("variant_in", e))?;
        match result.next().await.map_err(|e| Self::storage("variant_in", e))? {
            Some(row) => {
                let raw: String = row
                    .get("id")
                    .map_err(|e| RepoError::serialization(e.to_string()))?;
                Ok(Some(EntityId::from_uuid(
                    raw.parse().map_err(|e| {
                        RepoError::serialization(format!("uuid '{}': {}", raw, e))
                    })?,
                )))
            }
            None => Ok(None),
        }
    }

    async fn resolve(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, RepoError> {
        for ancestor in self.chain(universe_id).await? {
            if let Some(variant_id) = self.variant_in(ancestor, id).await? {
                if let Some(node) = self.node_in(ancestor, variant_id).await? {
                    return Ok(Some(node));
                }
            }
            if let Some(node) = self.node_in(ancestor, id).await? {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    async fn edges_in(&self, universe_id: UniverseId) -> Result<Vec<Relationship>, RepoError> {
        let mut result = self
            .graph()
            .execute(
                query(
                    "MATCH (:Entity)-[r {universe_id: $universe_id}]->(:Entity)
                     RETURN r.data AS data",
                )
                .param("universe_id", universe_id.to_string()),
            )
            .await
            .map_err(|e| Self::storage("edges_in", e))?;

        let mut edges = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| Self::storage("edges_in", e))?
        {
            let data: String = row
                .get("data")
                .map_err(|e| RepoError::serialization(e.to_string()))?;
            edges.push(serde_json::from_str(&data).map_err(RepoError::serialization)?);
        }
        Ok(edges)
    }

    async fn canonical_of(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<EntityId, RepoError> {
        let mut result = self
            .graph()
            .execute(
                query(
                    "MATCH (v:Entity {universe_id: $universe_id, id: $id})-[:VARIANT_OF]->(c:Entity)
                     RETURN c.id AS id",
                )
                .param("universe_id", universe_id.to_string())
                .param("id", id.to_string()),
            )
            .await
            .map_err(|e| Self::storage("canonical_of", e))?;
        match result
            .next()
            .await
            .map_err(|e| Self::storage("canonical_of", e))?
        {
            Some(row) => {
                let raw: String = row
                    .get("id")
                    .map_err(|e| RepoError::serialization(e.to_string()))?;
                Ok(EntityId::from_uuid(raw.parse().map_err(|e| {
                    RepoError::serialization(format!("uuid '{}': {}", raw, e))
                })?))
            }
            None => Ok(id),
        }
    }
}

#[async_trait]
impl GraphRepo for Neo4jGraphRepo {
    async fn register_universe(&self, universe: &Universe) -> Result<(), RepoError> {
        self.graph()
            .run(
                query("MERGE (u:Universe {id: $id})")
                    .param("id", universe.id.to_string()),
            )
            .await
            .map_err(|e| Self::storage("register_universe", e))?;
        if let Some(parent) = universe.parent_id {
            self.graph()
                .run(
                    query(
                        "MATCH (p:Universe {id: $parent}), (c:Universe {id: $child})
                         MERGE (p)-[:PARENT_OF]->(c)",
                    )
                    .param("parent", parent.to_string())
                    .param("child", universe.id.to_string()),
                )
                .await
                .map_err(|e| Self::storage("register_universe", e))?;
        }
        Ok(())
    }

    async fn upsert_node(&self, entity: &Entity) -> Result<(), RepoError> {
        let data = serde_json::to_string(entity).map_err(RepoError::serialization)?;
        let label = match entity.kind.type_name() {
            "character" => "Character",
            "location" => "Location",
            "item" => "Item",
            _ => "Concept",
        };
        self.graph()
            .run(
                query(&format!(
                    "MERGE (e:Entity {{universe_id: $universe_id, id: $id}})
                     SET e:{label}, e.name = $name, e.entity_type = $entity_type, e.data = $data"
                ))
                .param("universe_id", entity.universe_id.to_string())
                .param("id", entity.id.to_string())
                .param("name", entity.name.clone())
                .param("entity_type", entity.kind.type_name())
                .param("data", data),
            )
            .await
            .map_err(|e| Self::storage("upsert_node", e))
    }

    async fn delete_node(&self, universe_id: UniverseId, id: EntityId) -> Result<(), RepoError> {
        self.graph()
            .run(
                query("MATCH (e:Entity {universe_id: $universe_id, id: $id}) DETACH DELETE e")
                    .param("universe_id", universe_id.to_string())
                    .param("id", id.to_string()),
            )
            .await
            .map_err(|e| Self::storage("delete_node", e))
    }

    async fn get_node(
        &self,
        universe_id: UniverseId,
        id: EntityId,
    ) -> Result<Option<Entity>, RepoError> {
        self.resolve(universe_id, id).await
    }

    async fn create_relationship(&self, relationship: &Relationship) -> Result<(), RepoError> {
        if relationship.kind.is_functional() {
            self.graph()
                .run(
                    query(&format!(
                        "MATCH (a:Entity {{id: $from}})-[r:{} {{universe_id: $universe_id}}]->()
                         DELETE r",
                        kind_label(relationship.kind)
                    ))
                    .param("from", relationship.from.to_string())
                    .param("universe_id", relationship.universe_id.to_string()),
                )
                .await
                .map_err(|e| Self::storage("create_relationship", e))?;
        }

        if relationship.kind == RelationshipKind::VariantOf {
            let canonical = self
                .canonical_of(relationship.universe_id, relationship.to)
                .await?;
            if canonical == relationship.from {
                return Err(RepoError::constraint("VARIANT_OF edges must stay acyclic"));
            }
        }

        let data = serde_json::to_string(relationship).map_err(RepoError::serialization)?;
        self.graph()
            .run(
                query(&format!(
                    "MATCH (a:Entity {{id: $from}}), (b:Entity {{id: $to}})
                     WHERE a.universe_id IN $universes AND b.universe_id IN $universes
                     WITH a, b LIMIT 1
                     MERGE (a)-[r:{} {{edge_id: $edge_id}}]->(b)
                     SET r.universe_id = $universe_id, r.data = $data",
                    kind_label(relationship.kind)
                ))
                .param("from", relationship.from.to_string())
                .param("to", relationship.to.to_string())
                .param(
                    "universes",
                    self.chain(relationship.universe_id)
                        .await?
                        .iter()
                        .map(|u| u.to_string())
                        .collect::<Vec<_>>(),
                )
                .param("edge_id", relationship.id.to_string())
                .param("universe_id", relationship.universe_id.to_string())
                .param("data", data),
            )
            .await
            .map_err(|e| Self::storage("create_relationship", e))
    }

    async fn delete_relationship(&self, id: RelationshipId) -> Result<(), RepoError> {
        self.graph()
            .run(
                query("MATCH ()-[r {edge_id: $edge_id}]->() DELETE r")
                    .param("edge_id", id.to_string()),
            )
            .await
            .map_err(|e| Self::storage("delete_relationship", e))
    }

    async fn query_entities_at_location(
        &self,
        universe_id: UniverseId,
        location_id: EntityId,
    ) -> Result<Vec<Entity>, RepoError> {
        let target = self.canonical_of(universe_id, location_id).await?;
        let chain = self.chain(universe_id).await?;

        let mut seen: Vec<EntityId> = Vec::new();
        let mut occupants = Vec::new();
        for ancestor in &chain {
            for edge in self.edges_in(*ancestor).await? {
                if edge.kind != RelationshipKind::LocatedIn {
                    continue;
                }
                let from = self.canonical_of(edge.universe_id, edge.from).await?;
                if seen.contains(&from) {
                    continue;
                }
                seen.push(from);
                if self.canonical_of(edge.universe_id, edge.to).await? == target {
                    if let Some(entity) = self.resolve(universe_id, from).await? {
                        occupants.push(entity);
                    }
                }
            }
        }
        occupants.sort_by_key(|e| e.id);
        Ok(occupants)
    }

    async fn query_relationships(
        &self,
        universe_id: UniverseId,
        entity_id: EntityId,
    ) -> Result<Vec<Relationship>, RepoError> {
        let subject = self.canonical_of(universe_id, entity_id).await?;
        let chain = self.chain(universe_id).await?;

        let mut seen: Vec<(EntityId, RelationshipKind, Option<EntityId>)> = Vec::new();
        let mut result = Vec::new();
        for ancestor in &chain {
            for edge in self.edges_in(*ancestor).await? {
                let from = self.canonical_of(edge.universe_id, edge.from).await?;
                let to = self.canonical_of(edge.universe_id, edge.to).await?;
                if from != subject && to != subject {
                    continue;
                }
                let key = if edge.kind.is_functional() {
                    (from, edge.kind, None)
                } else {
                    (from, edge.kind, Some(to))
                };
                if seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                result.push(edge);
            }
        }
        result.sort_by_key(|e| e.id);
        Ok(result)
    }

    async fn query_by_vector(
        &self,
        universe_id: UniverseId,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(Entity, f32)>, RepoError> {
        let chain = self.chain(universe_id).await?;
        let mut seen: Vec<EntityId> = Vec::new();
        let mut scored = Vec::new();

        for ancestor in &chain {
            let mut rows = self
                .graph()
                .execute(
                    query(
                        "MATCH (e:Entity {universe_id: $universe_id})
                         WHERE e.embedding IS NOT NULL
                         RETURN e.id AS id, e.embedding AS embedding",
                    )
                    .param("universe_id", ancestor.to_string()),
                )
                .await
                .map_err(|e| Self::storage("query_by_vector", e))?;
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| Self::storage("query_by_vector", e))?
            {
                let raw: String = row
                    .get("id")
                    .map_err(|e| RepoError::serialization(e.to_string()))?;
                let candidate: Vec<f64> = row.get("embedding").unwrap_or_default();
                let id = EntityId::from_uuid(raw.parse().map_err(|e| {
                    RepoError::serialization(format!("uuid '{}': {}", raw, e))
                })?);
                let canonical = self.canonical_of(*ancestor, id).await?;
                if seen.contains(&canonical) {
                    continue;
                }
                seen.push(canonical);
                if let Some(entity) = self.resolve(universe_id, canonical).await? {
                    let candidate: Vec<f32> = candidate.iter().map(|v| *v as f32).collect();
                    scored.push((entity, cosine(embedding, &candidate)));
                }
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn set_embedding(
        &self,
        universe_id: UniverseId,
        id: EntityId,
        embedding: Vec<f32>,
    ) -> Result<(), RepoError> {
        let embedding: Vec<f64> = embedding.into_iter().map(f64::from).collect();
        self.graph()
            .run(
                query(
                    "MATCH (e:Entity {universe_id: $universe_id, id: $id})
                     SET e.embedding = $embedding",
                )
                .param("universe_id", universe_id.to_string())
                .param("id", id.to_string())
                .param("embedding", embedding),
            )
            .await
            .map_err(|e| Self::storage("set_embedding", e))
    }

    async fn record_memory(&self, memory: &NpcMemory) -> Result<(), RepoError> {
        self.graph()
            .run(
                query(
                    "MATCH (npc:Entity {id: $npc_id})
                     CREATE (m:Memory {
                         id: $id,
                         universe_id: $universe_id,
                         npc_id: $npc_id,
                         content: $content,
                         recorded_at: $recorded_at
                     })
                     CREATE (npc)-[:REMEMBERS]->(m)",
                )
                .param("id", memory.id.to_string())
                .param("universe_id", memory.universe_id.to_string())
                .param("npc_id", memory.npc_id.to_string())
                .param("content", memory.content.clone())
                .param("recorded_at", memory.recorded_at.to_rfc3339()),
            )
            .await
            .map_err(|e| Self::storage("record_memory", e))
    }

    async fn memories_for(
        &self,
        npc_id: EntityId,
        limit: usize,
    ) -> Result<Vec<NpcMemory>, RepoError> {
        let mut rows = self
            .graph()
            .execute(
                query(
                    "MATCH (m:Memory {npc_id: $npc_id})
                     RETURN m.id AS id, m.universe_id AS universe_id, m.content AS content,
                            m.recorded_at AS recorded_at
                     ORDER BY m.recorded_at DESC LIMIT $limit",
                )
                .param("npc_id", npc_id.to_string())
                .param("limit", limit as i64),
            )
            .await
            .map_err(|e| Self::storage("memories_for", e))?;

        let mut memories = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Self::storage("memories_for", e))?
        {
            let id: String = row
                .get("id")
                .map_err(|e| RepoError::serialization(e.to_string()))?;
            let universe: String = row
                .get("universe_id")
                .map_err(|e| RepoError::serialization(e.to_string()))?;
            let recorded_at: String = row
                .get("recorded_at")
                .map_err(|e| RepoError::serialization(e.to_string()))?;
            memories.push(NpcMemory {
                id: id
                    .parse()
                    .map_err(|e| RepoError::serialization(format!("uuid: {}", e)))?,
                npc_id,
                universe_id: UniverseId::from_uuid(universe.parse().map_err(|e| {
                    RepoError::serialization(format!("uuid: {}", e))
                })?),
                content: row
                    .get("content")
                    .map_err(|e| RepoError::serialization(e.to_string()))?,
                recorded_at: recorded_at
                    .parse()
                    .map_err(|e| RepoError::serialization(format!("recorded_at: {}", e)))?,
            });
        }
        Ok(memories)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn kind_label(kind: RelationshipKind) -> &'static str {
    match kind {
        RelationshipKind::Knows => "KNOWS",
        RelationshipKind::Fears => "FEARS",
        RelationshipKind::Desires => "DESIRES",
        RelationshipKind::LocatedIn => "LOCATED_IN",
        RelationshipKind::Owns => "OWNS",
        RelationshipKind::Wields => "WIELDS",
        RelationshipKind::Wears => "WEARS",
        RelationshipKind::Carries => "CARRIES",
        RelationshipKind::Contains => "CONTAINS",
        RelationshipKind::ConnectedTo => "CONNECTED_TO",
        RelationshipKind::TrappedIn => "TRAPPED_IN",
        RelationshipKind::VariantOf => "VARIANT_OF",
        RelationshipKind::HasAtmosphere => "HAS_ATMOSPHERE",
        RelationshipKind::Caused => "CAUSED",
    }
}
