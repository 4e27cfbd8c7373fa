//! Infrastructure: configuration, ports, and adapters for the truth
//! store, graph store, LLM, and RNG.

pub mod config;
pub mod memory;
pub mod neo4j;
pub mod ollama;
pub mod ports;
pub mod rng;
pub mod sqlite;
