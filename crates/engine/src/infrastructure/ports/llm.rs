//! LLM port.
//!
//! The core never embeds prompts: the shell injects them. Both methods may
//! fail or time out; callers own the deadline and always have a
//! deterministic fallback.

use async_trait::async_trait;
use serde_json::Value;

use super::error::LlmError;

/// Hard deadline for any LLM call made from the core, in milliseconds.
pub const LLM_TIMEOUT_MS: u64 = 5_000;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// Generate JSON conforming to the given schema.
    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<Value, LlmError>;

    /// Generate free-form narration.
    async fn generate_narrative(&self, prompt: &str) -> Result<String, LlmError>;
}
