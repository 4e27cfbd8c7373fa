//! TTA-Solo engine
//!
//! The symbolic core of the text-adventure engine: turn routing, skill
//! and attack resolution with the PbtA overlay, the effect pipeline,
//! resource pools, GM moves, NPC decisions, and the multiverse layer
//! over a branchable truth store and a lazily-diverging graph store.
//!
//! Sessions are single-threaded: one router per player, turns strictly
//! serialized. Repository and LLM calls are the only suspension points;
//! every rule computation is synchronous and deterministic for a given
//! seed.

pub mod infrastructure;
pub mod seed;
pub mod use_cases;

#[cfg(test)]
mod e2e_tests;

pub use infrastructure::config::AppConfig;
pub use infrastructure::memory::{InMemoryGraphRepo, InMemoryTruthRepo};
pub use infrastructure::ports::{
    GraphRepo, LlmError, LlmPort, NpcMemory, RepoError, Snapshot, TruthRepo, TruthTransaction,
};
pub use infrastructure::rng::{CryptoRoller, ScriptedRoller, SeededRoller};
pub use use_cases::{
    Intent, MoveExecutor, MovePrompts, MultiverseService, NpcDecisionService, QuestService,
    SkillResult, TurnResult, TurnRouter,
};
