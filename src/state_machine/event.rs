//! Events that drive a call

use crate::llm::LlmErrorKind;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Transport events
    /// The call started; no utterance yet
    CallStarted,
    /// Recognized speech for the current turn, possibly empty
    Utterance { text: String },
    /// The transport hung up or the connection closed
    Hangup,

    // Reply engine events
    ReplyReady {
        utterance: String,
        reply: String,
    },
    ReplyFailed {
        message: String,
        kind: Option<LlmErrorKind>,
    },
    /// A reply finished after the call ended and was not recorded
    ReplyDiscarded,
}

impl Event {
    /// Classify an inbound transport event.
    ///
    /// Any utterance field, even an empty one, makes it an utterance event;
    /// only its absence means the call just started.
    pub fn inbound(utterance: Option<String>) -> Self {
        match utterance {
            Some(text) => Event::Utterance { text },
            None => Event::CallStarted,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::CallStarted => "call_started",
            Event::Utterance { .. } => "utterance",
            Event::Hangup => "hangup",
            Event::ReplyReady { .. } => "reply_ready",
            Event::ReplyFailed { .. } => "reply_failed",
            Event::ReplyDiscarded => "reply_discarded",
        }
    }
}
