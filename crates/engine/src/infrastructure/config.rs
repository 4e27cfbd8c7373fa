//! Engine configuration from environment variables.

use anyhow::Context;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite path or ":memory:" for the truth store.
    pub truth_db_path: String,
    /// Neo4j connection; None runs the in-memory graph store.
    pub neo4j_uri: Option<String>,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: String,
    /// Ollama endpoint; None disables generative moves (template fallback
    /// only).
    pub ollama_base_url: Option<String>,
    pub ollama_model: String,
    /// Seed for the deterministic roller; None selects the cryptographic
    /// roller.
    pub rng_seed: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            truth_db_path: std::env::var("TTASOLO_TRUTH_DB")
                .unwrap_or_else(|_| ":memory:".to_string()),
            neo4j_uri: std::env::var("TTASOLO_NEO4J_URI").ok(),
            neo4j_user: std::env::var("TTASOLO_NEO4J_USER")
                .unwrap_or_else(|_| "neo4j".to_string()),
            neo4j_password: std::env::var("TTASOLO_NEO4J_PASSWORD").unwrap_or_default(),
            neo4j_database: std::env::var("TTASOLO_NEO4J_DATABASE")
                .unwrap_or_else(|_| "neo4j".to_string()),
            ollama_base_url: std::env::var("TTASOLO_OLLAMA_URL").ok(),
            ollama_model: std::env::var("TTASOLO_OLLAMA_MODEL")
                .unwrap_or_else(|_| "llama3.1:8b".to_string()),
            rng_seed: match std::env::var("TTASOLO_RNG_SEED") {
                Ok(raw) => Some(
                    raw.parse()
                        .with_context(|| format!("invalid TTASOLO_RNG_SEED '{}'", raw))?,
                ),
                Err(_) => None,
            },
        })
    }
}
