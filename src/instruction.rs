//! Transport-neutral call-control instructions
//!
//! The turn controller decides what to say and whether to keep listening;
//! each transport renders that into its own wire format.

/// Why the text is being spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Greeting,
    Reprompt,
    /// A reply is still being generated for an earlier utterance
    Wait,
    Reply,
    Closing,
    Apology,
}

/// What the telephony layer does after speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Listen for the next utterance
    Capture,
    /// Terminate the call
    Hangup,
}

/// One outbound instruction: speak `text`, then `then`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub cue: Cue,
    pub text: String,
    pub then: FollowUp,
}

impl Instruction {
    pub fn greet(text: impl Into<String>) -> Self {
        Self::new(Cue::Greeting, text, FollowUp::Capture)
    }

    pub fn reprompt(text: impl Into<String>) -> Self {
        Self::new(Cue::Reprompt, text, FollowUp::Capture)
    }

    pub fn wait(text: impl Into<String>) -> Self {
        Self::new(Cue::Wait, text, FollowUp::Capture)
    }

    pub fn speak(text: impl Into<String>) -> Self {
        Self::new(Cue::Reply, text, FollowUp::Capture)
    }

    pub fn closing(text: impl Into<String>) -> Self {
        Self::new(Cue::Closing, text, FollowUp::Hangup)
    }

    pub fn apology(text: impl Into<String>) -> Self {
        Self::new(Cue::Apology, text, FollowUp::Hangup)
    }

    fn new(cue: Cue, text: impl Into<String>, then: FollowUp) -> Self {
        Self {
            cue,
            text: text.into(),
            then,
        }
    }

    pub fn ends_call(&self) -> bool {
        self.then == FollowUp::Hangup
    }
}
