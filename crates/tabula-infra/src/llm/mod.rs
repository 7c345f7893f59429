//! LLM provider implementations.
//!
//! Contains the Anthropic implementation of the [`LlmProvider`] trait
//! defined in `tabula-core`, and a factory ([`create_provider`]) that
//! builds the boxed provider from `[llm]` config.
//!
//! [`LlmProvider`]: tabula_core::llm::provider::LlmProvider

pub mod anthropic;

use secrecy::SecretString;

use tabula_core::llm::box_provider::BoxLlmProvider;
use tabula_types::config::LlmConfig;
use tabula_types::llm::LlmError;

use self::anthropic::AnthropicProvider;

/// Create a [`BoxLlmProvider`] from `[llm]` config and a resolved API key.
pub fn create_provider(config: &LlmConfig, api_key: SecretString) -> Result<BoxLlmProvider, LlmError> {
    let mut provider = AnthropicProvider::new(api_key, config.model.clone())?;
    if let Some(base_url) = config.base_url.as_deref() {
        provider = provider.with_base_url(base_url);
    }
    Ok(BoxLlmProvider::new(provider))
}
