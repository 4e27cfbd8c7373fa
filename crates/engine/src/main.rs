//! TTA-Solo engine binary.
//!
//! Wires the adapters from configuration, seeds the demo world, and runs
//! a short scripted session as a smoke path. The interactive REPL and
//! narration live in the outer shell; this binary proves the core
//! resolves turns end to end. Exit codes: 0 success, 1 user error, 2
//! internal error.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use ttasolo_domain::{Cover, DieRoller, RestKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ttasolo_engine::infrastructure::config::AppConfig;
use ttasolo_engine::infrastructure::memory::{InMemoryGraphRepo, InMemoryTruthRepo};
use ttasolo_engine::infrastructure::ollama::OllamaClient;
use ttasolo_engine::infrastructure::rng::{CryptoRoller, SeededRoller};
use ttasolo_engine::infrastructure::sqlite::SqliteTruthRepo;
use ttasolo_engine::seed::seed_demo_world;
use ttasolo_engine::use_cases::{Intent, MoveExecutor, MovePrompts, TurnRouter};
use ttasolo_engine::{GraphRepo, LlmPort, TruthRepo};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ttasolo_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error:#}");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "engine failed");
            ExitCode::from(2)
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting TTA-Solo engine");

    let truth: Arc<dyn TruthRepo> = if config.truth_db_path == ":memory:" {
        Arc::new(InMemoryTruthRepo::new())
    } else {
        Arc::new(SqliteTruthRepo::connect(&config.truth_db_path).await?)
    };
    // The Neo4j adapter is wired by deployments that run the database;
    // the demo session uses the in-memory graph.
    let graph: Arc<dyn GraphRepo> = Arc::new(InMemoryGraphRepo::new());

    let llm: Option<Arc<dyn LlmPort>> = match &config.ollama_base_url {
        Some(url) => Some(Arc::new(OllamaClient::new(url, &config.ollama_model)?)),
        None => None,
    };

    let roller: Box<dyn DieRoller + Send> = match config.rng_seed {
        Some(seed) => Box::new(SeededRoller::new(seed)),
        None => Box::new(CryptoRoller::new()),
    };

    let world = seed_demo_world(&truth, &graph).await?;
    tracing::info!(universe_id = %world.universe.id, "demo world seeded");

    let moves = MoveExecutor::new(truth.clone(), graph.clone(), llm, MovePrompts::default());
    let mut router = TurnRouter::new(truth.clone(), graph.clone(), moves, roller);
    router.register_ability(world.bless.clone())?;
    router.register_ability(world.fire_burst.clone())?;

    // A short scripted session: look around, head down, pick a fight,
    // and sleep it off.
    let turns = [
        Intent::Look,
        Intent::Move {
            direction: "down".into(),
        },
        Intent::Attack {
            target: world.goblin.id,
            weapon: world.longsword.id,
            cover: Cover::None,
        },
        Intent::Rest {
            kind: RestKind::Long,
        },
    ];
    for intent in turns {
        let result = router
            .run_turn(world.universe.id, world.hero.id, intent.clone(), Utc::now())
            .await?;
        tracing::info!(
            success = result.skill_result.success,
            outcome = ?result.skill_result.outcome,
            events = result.events.len(),
            changes = ?result.skill_result.state_changes,
            "turn resolved"
        );
    }

    let log = truth.list_events(world.universe.id, None).await?;
    tracing::info!(events = log.len(), "session complete");
    Ok(())
}
