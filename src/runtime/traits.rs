//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the controller with mock implementations.

use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use async_trait::async_trait;
use std::sync::Arc;

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete an LLM request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use a configured `LlmService` as `LlmClient`
pub struct ServiceLlmClient {
    service: Arc<dyn LlmService>,
}

impl ServiceLlmClient {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LlmClient for ServiceLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.service.complete(request).await
    }

    fn model_id(&self) -> &str {
        self.service.model_id()
    }
}

/// Stand-in when no provider could be configured.
///
/// Every completion fails, so calls get the spoken apology instead of
/// silence.
pub struct UnconfiguredLlmClient {
    reason: String,
}

impl UnconfiguredLlmClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmClient for UnconfiguredLlmClient {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::auth(format!("No LLM available: {}", self.reason)))
    }

    fn model_id(&self) -> &str {
        "unconfigured"
    }
}
