//! Provider selection from configuration

use super::{LlmError, LlmService, LoggingService, OpenAIModel, OpenAIService};
use std::sync::Arc;

/// Default chat model, same one the bot was tuned against
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for the completion provider
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    /// Gateway URL that handles authentication upstream
    pub gateway: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn model_id(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Build the configured completion service, wrapped with logging
pub fn create_service(config: &LlmConfig) -> Result<Arc<dyn LlmService>, LlmError> {
    let model_id = config.model_id();
    let model = OpenAIModel::from_id(model_id)
        .ok_or_else(|| LlmError::invalid_request(format!("Unsupported model: {model_id}")))?;

    // In gateway mode the gateway authenticates; the key is a placeholder
    let api_key = if config.gateway.is_some() {
        "implicit".to_string()
    } else {
        config
            .openai_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::auth("OPENAI_API_KEY is not set"))?
    };

    let service = OpenAIService::new(api_key, model, config.gateway.as_deref())?;
    Ok(Arc::new(LoggingService::new(Arc::new(service))))
}
