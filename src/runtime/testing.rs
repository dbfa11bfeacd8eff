//! Mock implementations for testing
//!
//! These mocks let the controller and adapters run without a real provider.

use super::traits::*;
use super::{CallSettings, TurnController};
use crate::llm::{LlmError, LlmRequest, LlmResponse};
use crate::session::InMemorySessionStore;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a plain-text reply
    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::text(text));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self) -> Result<LlmResponse, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.next_response()
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Delayed Mock LLM Client (for overlap testing)
// ============================================================================

/// Mock LLM client that holds every request for `delay` before answering
pub struct DelayedMockLlmClient {
    inner: MockLlmClient,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockLlmClient {
    pub fn new(model_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            inner: MockLlmClient::new(model_id),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_text(&self, text: &str) {
        self.inner.queue_text(text);
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.inner.recorded_requests()
    }
}

#[async_trait]
impl LlmClient for DelayedMockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.inner.requests.lock().unwrap().push(request.clone());
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.next_response()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// Failing LLM Client
// ============================================================================

/// Client whose every completion fails with the same error
pub struct FailingLlmClient {
    error: LlmError,
}

impl FailingLlmClient {
    pub fn new(error: LlmError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(self.error.clone())
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A controller over a fresh in-memory store
pub fn controller_with(
    llm: Arc<dyn LlmClient>,
    settings: CallSettings,
) -> (TurnController, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    let controller = TurnController::new(store.clone(), llm, settings);
    (controller, store)
}

/// Controller with default settings and a scripted client
pub fn test_controller() -> (TurnController, Arc<InMemorySessionStore>, Arc<MockLlmClient>) {
    let llm = Arc::new(MockLlmClient::new("mock-model"));
    let (controller, store) = controller_with(llm.clone(), CallSettings::default());
    (controller, store, llm)
}
