//! Call state types

use crate::session::{CallSession, SessionPhase};
use std::sync::Arc;
use std::time::Duration;

/// Where a call is in the turn-taking protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// No session for this call id
    Idle,
    /// Session open, listening for the caller
    AwaitingUtterance { turn_count: usize },
    /// A reply is in flight
    Responding { turn_count: usize },
    /// The call is over; the session is waiting out its grace delay
    Ended,
}

impl CallState {
    /// Derive the state from the stored session
    pub fn of(session: Option<&CallSession>) -> Self {
        match session {
            None => CallState::Idle,
            Some(s) => match s.phase {
                SessionPhase::Open => CallState::AwaitingUtterance {
                    turn_count: s.turn_count(),
                },
                SessionPhase::Responding => CallState::Responding {
                    turn_count: s.turn_count(),
                },
                SessionPhase::Closed => CallState::Ended,
                SessionPhase::Evicted => CallState::Idle,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::AwaitingUtterance { .. } => "awaiting_utterance",
            CallState::Responding { .. } => "responding",
            CallState::Ended => "ended",
        }
    }
}

/// Per-call limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Stored turns after which the next utterance ends the call
    pub max_turns: usize,
    /// Most recent turns sent to the reply engine
    pub history_window: usize,
    /// How long an ended call's session lingers to absorb late events
    pub hangup_grace: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            max_turns: 6,
            history_window: 5,
            hangup_grace: Duration::from_secs(60),
        }
    }
}

/// Fixed texts spoken by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub greeting: String,
    pub reprompt: String,
    pub wait: String,
    pub closing: String,
    pub apology: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            greeting: "बोलिए...".to_string(),
            reprompt: "क्षमा करें, मैं समझ नहीं पाया। कृपया दोबारा बोलें।".to_string(),
            wait: "कृपया एक क्षण रुकें, मैं अभी जवाब तैयार कर रहा हूँ।".to_string(),
            closing: "बात करने के लिए धन्यवाद। नमस्ते!".to_string(),
            apology: "क्षमा करें, त्रुटि हुई।".to_string(),
        }
    }
}

/// Everything the transition function needs besides state and event
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: String,
    pub policy: CallPolicy,
    pub prompts: Arc<Prompts>,
}

impl CallContext {
    pub fn new(call_id: impl Into<String>, policy: CallPolicy, prompts: Arc<Prompts>) -> Self {
        Self {
            call_id: call_id.into(),
            policy,
            prompts,
        }
    }

    pub fn budget_exhausted(&self, turn_count: usize) -> bool {
        turn_count >= self.policy.max_turns
    }
}
