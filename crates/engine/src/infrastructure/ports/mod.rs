//! Port traits for everything outside the rules core: the truth store,
//! the graph store, and the LLM.

mod error;
mod llm;
mod repos;

pub use error::{LlmError, RepoError};
pub use llm::{LlmPort, LLM_TIMEOUT_MS};
pub use repos::{GraphRepo, NpcMemory, Snapshot, TruthRepo, TruthTransaction};

#[cfg(test)]
pub use llm::MockLlmPort;
#[cfg(test)]
pub use repos::{MockGraphRepo, MockTruthRepo};
