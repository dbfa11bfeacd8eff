//! API request and response types

use crate::inbound::InboundFields;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field names accepted for the call id, in the order they are tried
const CALL_SID_KEYS: &[&str] = &["CallSid", "callSid", "call_sid"];
const CALLER_KEYS: &[&str] = &["From", "CallFrom", "from"];
const UTTERANCE_KEYS: &[&str] = &["Transcription", "SpeechResult", "utterance"];
const STATUS_KEYS: &[&str] = &["Status", "CallStatus", "status"];
const RECORDING_KEYS: &[&str] = &["RecordingUrl", "recording_url"];

/// Call statuses after which the call is over
const TERMINAL_STATUSES: &[&str] = &["completed", "failed", "busy", "no-answer", "canceled"];

/// Flat provider parameters, merged from query string and body
#[derive(Debug, Clone, Default)]
pub struct WebhookParams {
    values: HashMap<String, String>,
}

impl WebhookParams {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Add `other`'s values for keys not already present
    pub fn merge(mut self, other: HashMap<String, String>) -> Self {
        for (key, value) in other {
            self.values.entry(key).or_insert(value);
        }
        self
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.values.get(*key).cloned())
    }

    pub fn inbound(&self) -> InboundFields {
        InboundFields {
            call_sid: self.first(CALL_SID_KEYS),
            caller: self.first(CALLER_KEYS),
            utterance: self.first(UTTERANCE_KEYS),
        }
    }

    /// True for the provider's post-recording callback
    pub fn is_recording_callback(&self) -> bool {
        self.first(RECORDING_KEYS).is_some()
    }

    pub fn status(&self) -> Option<String> {
        self.first(STATUS_KEYS).map(|s| s.trim().to_ascii_lowercase())
    }

    /// Whether the reported status ends the call
    pub fn is_terminal_status(&self) -> bool {
        self.status()
            .is_some_and(|status| TERMINAL_STATUSES.contains(&status.as_str()))
    }
}

/// Frames a streaming client sends as text
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Utterance {
        #[serde(default)]
        text: String,
    },
    Hangup,
}

/// Frames sent to a streaming client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Say { text: String },
    Hangup,
    Error { message: String },
}

/// Response for status callbacks
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ended: bool,
}

/// Response for session stats
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub open_sessions: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> WebhookParams {
        WebhookParams::new(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_field_aliases() {
        let fields =
            params(&[("callSid", "CA1"), ("CallFrom", "+91"), ("SpeechResult", "हाँ")]).inbound();
        assert_eq!(fields.call_sid.as_deref(), Some("CA1"));
        assert_eq!(fields.caller.as_deref(), Some("+91"));
        assert_eq!(fields.utterance.as_deref(), Some("हाँ"));
    }

    #[test]
    fn test_merge_keeps_existing_values() {
        let merged = params(&[("CallSid", "from-body")]).merge(
            [("CallSid", "from-query"), ("From", "+91")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let fields = merged.inbound();
        assert_eq!(fields.call_sid.as_deref(), Some("from-body"));
        assert_eq!(fields.caller.as_deref(), Some("+91"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(params(&[("Status", "completed")]).is_terminal_status());
        assert!(params(&[("CallStatus", "No-Answer")]).is_terminal_status());
        assert!(!params(&[("Status", "in-progress")]).is_terminal_status());
        assert!(!params(&[]).is_terminal_status());
    }

    #[test]
    fn test_client_frames() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"utterance","text":"नमस्ते"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Utterance {
                text: "नमस्ते".to_string()
            }
        );
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"utterance"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Utterance { text: String::new() });
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"hangup"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Hangup);
    }

    #[test]
    fn test_server_frame_shape() {
        let json = serde_json::to_value(ServerFrame::Say {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "say", "text": "hi"}));
    }
}
