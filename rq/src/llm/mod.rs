//! LLM client module
//!
//! The rewrite pipeline only needs one operation: send a system prompt plus
//! a short conversation and get the rewritten text back.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Build the client for the configured provider
///
/// Every supported provider speaks the OpenAI chat completions protocol.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" | "deepseek" | "openai-compatible" => Ok(Arc::new(OpenAIClient::from_config(config)?)),
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::Unconfigured(format!(
                "Unknown LLM provider: '{}'. Supported: openai, deepseek, openai-compatible",
                other
            )))
        }
    }
}
