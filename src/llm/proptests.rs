//! Property-based tests for the provider translation layer
//!
//! - Message order and text survive translation
//! - The system instruction is always the first wire message
//! - Responses without choices or content are rejected
//! - Every HTTP failure status maps to exactly one error kind

use super::openai::{OpenAIChoice, OpenAIMessage, OpenAIModel, OpenAIResponse, OpenAIService};
use super::types::{LlmMessage, LlmRequest, SystemContent};
use super::{LlmError, LlmErrorKind};
use proptest::prelude::*;

fn service() -> OpenAIService {
    OpenAIService::new("key".to_string(), OpenAIModel::GPT4oMini, None).unwrap()
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 .,!?]{1,60}",
        Just("नमस्ते".to_string()),
        Just("ठीक है, धन्यवाद।".to_string()),
    ]
}

fn arb_message() -> impl Strategy<Value = LlmMessage> {
    (any::<bool>(), arb_text()).prop_map(|(user, text)| {
        if user {
            LlmMessage::user(text)
        } else {
            LlmMessage::assistant(text)
        }
    })
}

fn choice(content: Option<String>) -> OpenAIChoice {
    OpenAIChoice {
        message: OpenAIMessage {
            role: "assistant".to_string(),
            content,
        },
        finish_reason: Some("stop".to_string()),
    }
}

proptest! {
    #[test]
    fn translation_preserves_messages(
        system in arb_text(),
        messages in proptest::collection::vec(arb_message(), 1..8),
    ) {
        let request = LlmRequest {
            system: vec![SystemContent::new(&system)],
            messages: messages.clone(),
            max_tokens: Some(300),
        };
        let wire = service().translate_request(&request);

        prop_assert_eq!(wire.messages.len(), messages.len() + 1);
        prop_assert_eq!(wire.messages[0].role.as_str(), "system");
        prop_assert_eq!(wire.messages[0].content.as_deref(), Some(system.as_str()));

        for (sent, original) in wire.messages[1..].iter().zip(&messages) {
            prop_assert_eq!(sent.role.as_str(), original.role.as_str());
            prop_assert_eq!(sent.content.as_deref(), Some(original.text.as_str()));
        }
    }

    #[test]
    fn first_choice_text_is_returned(texts in proptest::collection::vec(arb_text(), 1..4)) {
        let response = OpenAIResponse {
            choices: texts.iter().cloned().map(|t| choice(Some(t))).collect(),
            usage: None,
        };
        let normalized = OpenAIService::normalize_response(response).unwrap();
        prop_assert_eq!(normalized.text, texts[0].clone());
    }

    #[test]
    fn missing_content_is_rejected(extra in 0usize..3) {
        let response = OpenAIResponse {
            choices: std::iter::once(choice(None))
                .chain((0..extra).map(|i| choice(Some(format!("later {i}")))))
                .collect(),
            usage: None,
        };
        let err = OpenAIService::normalize_response(response).unwrap_err();
        prop_assert_eq!(err.kind, LlmErrorKind::Unknown);
    }

    #[test]
    fn failure_statuses_classify(status in 400u16..600) {
        let err = LlmError::from_status(status, "body");
        let expected = match status {
            401 | 403 => LlmErrorKind::Auth,
            429 => LlmErrorKind::RateLimit,
            400 => LlmErrorKind::InvalidRequest,
            500..=599 => LlmErrorKind::ServerError,
            _ => LlmErrorKind::Unknown,
        };
        prop_assert_eq!(err.kind, expected);
        let transient = matches!(expected, LlmErrorKind::RateLimit | LlmErrorKind::ServerError);
        prop_assert_eq!(err.kind.is_transient(), transient);
    }
}
