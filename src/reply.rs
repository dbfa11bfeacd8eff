//! Reply engine
//!
//! Turns a call's recent history plus the caller's new utterance into one
//! assistant reply through a single completion request.

use crate::llm::{LlmError, LlmMessage, LlmRequest, SystemContent};
use crate::runtime::LlmClient;
use crate::session::{recent, Speaker, Turn};
use std::sync::Arc;
use thiserror::Error;

/// Default instruction given to the model
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful Hindi assistant. Reply in short Hindi.";

/// Spoken replies are short; this caps runaway completions
const MAX_REPLY_TOKENS: u32 = 300;

/// Why no reply could be produced
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),
    #[error("completion returned no text")]
    EmptyReply,
    #[error("utterance is empty")]
    EmptyUtterance,
}

impl ReplyError {
    pub fn llm_kind(&self) -> Option<crate::llm::LlmErrorKind> {
        match self {
            ReplyError::Completion(e) => Some(e.kind),
            ReplyError::EmptyReply | ReplyError::EmptyUtterance => None,
        }
    }
}

pub struct ReplyEngine {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    window: usize,
}

impl ReplyEngine {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, window: usize) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            window: window.max(1),
        }
    }

    /// Build the completion request: system instruction, then the last
    /// `window` turns counting the new utterance.
    pub fn build_request(&self, history: &[Turn], utterance: &str) -> LlmRequest {
        let older = recent(history, self.window - 1);
        let mut messages: Vec<LlmMessage> = older
            .iter()
            .map(|turn| match turn.speaker {
                Speaker::User => LlmMessage::user(&turn.text),
                Speaker::Assistant => LlmMessage::assistant(&turn.text),
            })
            .collect();
        messages.push(LlmMessage::user(utterance));

        LlmRequest {
            system: vec![SystemContent::new(&self.system_prompt)],
            messages,
            max_tokens: Some(MAX_REPLY_TOKENS),
        }
    }

    /// Generate the reply to `utterance`. One completion call, no retry.
    pub async fn generate_reply(
        &self,
        history: &[Turn],
        utterance: &str,
    ) -> Result<String, ReplyError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(ReplyError::EmptyUtterance);
        }

        let request = self.build_request(history, utterance);
        let response = self.llm.complete(&request).await?;
        if !response.end_turn {
            tracing::debug!(model = self.llm.model_id(), "Reply stopped before the model finished");
        }

        let reply = response.text.trim();
        if reply.is_empty() {
            return Err(ReplyError::EmptyReply);
        }
        Ok(reply.to_string())
    }
}
