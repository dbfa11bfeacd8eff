//! `OpenAI` and `OpenAI`-compatible chat completions provider

use super::types::{LlmMessage, LlmRequest, LlmResponse, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completions must come back well inside a caller's patience on a live call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Chat models suitable for short spoken replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIModel {
    GPT4o,
    GPT4oMini,
    GPT41Mini,
    GPT41Nano,
}

impl OpenAIModel {
    pub const ALL: [OpenAIModel; 4] = [
        OpenAIModel::GPT4o,
        OpenAIModel::GPT4oMini,
        OpenAIModel::GPT41Mini,
        OpenAIModel::GPT41Nano,
    ];

    pub fn api_name(self) -> &'static str {
        match self {
            OpenAIModel::GPT4o => "gpt-4o",
            OpenAIModel::GPT4oMini => "gpt-4o-mini",
            OpenAIModel::GPT41Mini => "gpt-4.1-mini",
            OpenAIModel::GPT41Nano => "gpt-4.1-nano",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.api_name() == id)
    }
}

/// OpenAI-compatible service implementation
pub struct OpenAIService {
    client: Client,
    api_key: String,
    model: OpenAIModel,
    base_url: String,
    model_id: String,
}

impl OpenAIService {
    pub fn new(
        api_key: String,
        model: OpenAIModel,
        gateway: Option<&str>,
    ) -> Result<Self, LlmError> {
        let base_url = match gateway {
            Some(gw) => format!("{}/openai/v1/chat/completions", gw.trim_end_matches('/')),
            None => "https://api.openai.com/v1/chat/completions".to_string(),
        };

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            model_id: model.api_name().to_string(),
        })
    }

    pub(super) fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if !request.system.is_empty() {
            let system_text = request
                .system
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_text),
            });
        }

        messages.extend(request.messages.iter().map(Self::translate_message));

        OpenAIRequest {
            model: self.model.api_name().to_string(),
            messages,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }

    fn translate_message(msg: &LlmMessage) -> OpenAIMessage {
        OpenAIMessage {
            role: msg.role.as_str().to_string(),
            content: Some(msg.text.clone()),
        }
    }

    pub(super) fn normalize_response(resp: OpenAIResponse) -> Result<LlmResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::unknown("No choices in response"))?;

        let text = choice
            .message
            .content
            .ok_or_else(|| LlmError::unknown("Response message has no content"))?;

        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });

        Ok(LlmResponse {
            text,
            end_turn: choice.finish_reason.as_deref() == Some("stop"),
            usage,
        })
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            if let Ok(error_resp) = serde_json::from_str::<OpenAIErrorResponse>(&body) {
                return Err(LlmError::from_status(status.as_u16(), &error_resp.error.message));
            }
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(openai_response)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
pub(super) struct OpenAIRequest {
    pub(super) model: String,
    pub(super) messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_tokens: Option<u32>,
    pub(super) stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct OpenAIMessage {
    pub(super) role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAIResponse {
    pub(super) choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub(super) usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAIChoice {
    pub(super) message: OpenAIMessage,
    pub(super) finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
pub(super) struct OpenAIUsage {
    pub(super) prompt_tokens: u32,
    pub(super) completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
