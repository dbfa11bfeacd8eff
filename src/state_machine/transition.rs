//! Pure state transition function
//!
//! Given the same state, context and event it always produces the same new
//! state and effects, with no I/O.

use super::{CallContext, CallState, Effect, Event};
use crate::instruction::Instruction;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: CallState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: CallState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// The instruction this transition answers with, if any
    pub fn response(&self) -> Option<&Instruction> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::Respond(instruction) => Some(instruction),
            _ => None,
        })
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("reply event {event} arrived while {state}")]
    UnexpectedReply {
        event: &'static str,
        state: &'static str,
    },
}

/// Pure transition function
pub fn transition(
    state: &CallState,
    ctx: &CallContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let prompts = &ctx.prompts;

    match (*state, event) {
        // ============================================================
        // Call start
        // ============================================================

        (CallState::Idle, Event::CallStarted) => {
            Ok(TransitionResult::new(CallState::AwaitingUtterance { turn_count: 0 })
                .with_effect(Effect::OpenSession)
                .with_effect(Effect::respond(Instruction::greet(&prompts.greeting))))
        }

        // Duplicate start events greet again without touching history
        (
            current @ (CallState::AwaitingUtterance { .. } | CallState::Responding { .. }),
            Event::CallStarted,
        ) => Ok(TransitionResult::new(current)
            .with_effect(Effect::respond(Instruction::greet(&prompts.greeting)))),

        // ============================================================
        // Utterances
        // ============================================================

        // Unknown call id: start a fresh session silently
        (CallState::Idle, Event::Utterance { text }) => {
            let text = text.trim();
            if text.is_empty() {
                Ok(TransitionResult::new(CallState::AwaitingUtterance { turn_count: 0 })
                    .with_effect(Effect::OpenSession)
                    .with_effect(Effect::respond(Instruction::reprompt(&prompts.reprompt))))
            } else {
                Ok(TransitionResult::new(CallState::Responding { turn_count: 0 })
                    .with_effect(Effect::OpenSession)
                    .with_effect(Effect::RequestReply {
                        utterance: text.to_string(),
                    }))
            }
        }

        (current @ CallState::AwaitingUtterance { turn_count }, Event::Utterance { text }) => {
            let text = text.trim();
            if text.is_empty() {
                // Reprompts never count toward the budget
                Ok(TransitionResult::new(current)
                    .with_effect(Effect::respond(Instruction::reprompt(&prompts.reprompt))))
            } else if ctx.budget_exhausted(turn_count) {
                Ok(TransitionResult::new(CallState::Ended)
                    .with_effect(Effect::DeleteSession)
                    .with_effect(Effect::respond(Instruction::closing(&prompts.closing))))
            } else {
                Ok(TransitionResult::new(CallState::Responding { turn_count })
                    .with_effect(Effect::RequestReply {
                        utterance: text.to_string(),
                    }))
            }
        }

        // One reply in flight per call; the caller is asked to hold on
        (current @ CallState::Responding { .. }, Event::Utterance { text }) => {
            let instruction = if text.trim().is_empty() {
                Instruction::reprompt(&prompts.reprompt)
            } else {
                Instruction::wait(&prompts.wait)
            };
            Ok(TransitionResult::new(current).with_effect(Effect::respond(instruction)))
        }

        // Late events for a call that already ended
        (CallState::Ended, Event::CallStarted | Event::Utterance { .. }) => {
            Ok(TransitionResult::new(CallState::Ended)
                .with_effect(Effect::respond(Instruction::closing(&prompts.closing))))
        }

        // ============================================================
        // Reply engine outcomes
        // ============================================================

        (CallState::Responding { turn_count }, Event::ReplyReady { utterance, reply }) => {
            Ok(TransitionResult::new(CallState::AwaitingUtterance {
                turn_count: turn_count + 2,
            })
            .with_effect(Effect::RecordExchange {
                utterance,
                reply: reply.clone(),
            })
            .with_effect(Effect::respond(Instruction::speak(reply))))
        }

        // A technical failure ends the call; never retried
        (CallState::Responding { .. }, Event::ReplyFailed { .. }) => {
            Ok(TransitionResult::new(CallState::Ended)
                .with_effect(Effect::DeleteSession)
                .with_effect(Effect::respond(Instruction::apology(&prompts.apology))))
        }

        // The reply could not be recorded; the request it answers belongs to
        // a call that is over
        (_, Event::ReplyDiscarded) => Ok(TransitionResult::new(*state)
            .with_effect(Effect::respond(Instruction::closing(&prompts.closing)))),

        // The call ended while the reply was being generated
        (
            CallState::Ended | CallState::Idle,
            Event::ReplyReady { .. } | Event::ReplyFailed { .. },
        ) => Ok(TransitionResult::new(*state)
            .with_effect(Effect::respond(Instruction::closing(&prompts.closing)))),

        (
            CallState::AwaitingUtterance { .. },
            event @ (Event::ReplyReady { .. } | Event::ReplyFailed { .. }),
        ) => Err(TransitionError::UnexpectedReply {
            event: event.name(),
            state: state.name(),
        }),

        // ============================================================
        // Termination
        // ============================================================

        (CallState::Idle | CallState::Ended, Event::Hangup) => Ok(TransitionResult::new(*state)),

        (CallState::AwaitingUtterance { .. } | CallState::Responding { .. }, Event::Hangup) => {
            Ok(TransitionResult::new(CallState::Ended).with_effect(Effect::ScheduleDeletion {
                after: ctx.policy.hangup_grace,
            }))
        }
    }
}
