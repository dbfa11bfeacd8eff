//! Effects produced by state transitions

use crate::instruction::Instruction;
use std::time::Duration;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Create the session if absent
    OpenSession,

    /// Admit and run one reply generation
    RequestReply { utterance: String },

    /// Store the user turn and its reply together
    RecordExchange { utterance: String, reply: String },

    /// Remove the session now
    DeleteSession,

    /// Mark the session ended and remove it after a delay
    ScheduleDeletion { after: Duration },

    /// Answer the transport
    Respond(Instruction),
}

impl Effect {
    pub fn respond(instruction: Instruction) -> Self {
        Effect::Respond(instruction)
    }
}
