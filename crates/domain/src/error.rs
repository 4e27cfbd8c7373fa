//! Unified error types for the domain layer
//!
//! Provides a common error type that can be used across all rule operations,
//! enabling consistent error handling without forcing adapters to use String or anyhow.

use thiserror::Error;

use crate::value_objects::DiceParseError;

/// Unified error type for domain operations
///
/// Mirrors the engine-wide error policy: the first five variants surface to
/// the caller as a failed result without mutating state, `ConflictState`
/// triggers a single retry with reload, `Timeout` is recovered locally, and
/// `Repo` is fatal to the turn.
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    /// Malformed input (dice notation, unknown intent)
    #[error("Bad input: {0}")]
    BadInput(String),

    /// Entity or ability not found
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Out of spell slots, momentum, uses, or similar
    #[error("Insufficient resource: {0}")]
    InsufficientResource(String),

    /// Targeting descriptor does not match the provided targets
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Rule violation (e.g., two concentration effects)
    #[error("Rule violation: {0}")]
    RuleViolation(String),

    /// Stale version or otherwise conflicting state
    #[error("Conflicting state: {0}")]
    ConflictState(String),

    /// External call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Persistence failure (fatal to the turn)
    #[error("Repository error: {0}")]
    Repo(String),
}

impl DomainError {
    /// Create a bad input error
    pub fn bad_input(msg: impl Into<String>) -> Self {
        Self::BadInput(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create an insufficient resource error
    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientResource(msg.into())
    }

    /// Create an invalid target error
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    /// Create a rule violation error
    pub fn rule_violation(msg: impl Into<String>) -> Self {
        Self::RuleViolation(msg.into())
    }

    /// Create a conflicting state error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConflictState(msg.into())
    }

    /// True when the error may be surfaced as a failed skill result
    /// without rolling back the turn.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Repo(_))
    }
}

impl From<DiceParseError> for DomainError {
    fn from(err: DiceParseError) -> Self {
        Self::BadInput(err.to_string())
    }
}
