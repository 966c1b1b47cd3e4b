//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::llm::{LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig};
use std::sync::Arc;

/// Creates the LLM client described by `config`.
///
/// OpenAI needs an API key, taken from `config.api_key` (which the config
/// loader fills from `OPENAI_API_KEY`).
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let provider: LlmProvider = config.provider.parse().map_err(AppError::config)?;

    match provider {
        LlmProvider::OpenAi => {
            let key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    AppError::config(
                        "No API key configured. Set OPENAI_API_KEY or use --provider mock.",
                    )
                })?;
            let client = OpenAiClient::new(OpenAiConfig::from_llm_config(config, key))?;
            Ok(Arc::new(client))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}
