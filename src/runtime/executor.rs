//! Turn controller
//!
//! Reads the call's state from the store, runs the pure transition, and
//! executes the resulting effects. Effects that produce a new event (a reply
//! came back, the store refused a reply) feed it back into the same loop, so
//! every decision goes through `transition`.

use super::traits::LlmClient;
use crate::instruction::Instruction;
use crate::llm::LlmErrorKind;
use crate::reply::{ReplyEngine, DEFAULT_SYSTEM_PROMPT};
use crate::session::{Exchange, ReplyTicket, SessionStore};
use crate::state_machine::{
    transition, CallContext, CallPolicy, CallState, Effect, Event, Prompts,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

/// Events one transport request may produce before the controller gives up
const MAX_STEPS: usize = 8;

/// Behavior shared by every call
#[derive(Debug, Clone)]
pub struct CallSettings {
    pub policy: CallPolicy,
    pub prompts: Arc<Prompts>,
    pub system_prompt: String,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            policy: CallPolicy::default(),
            prompts: Arc::new(Prompts::default()),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Outcome of executing one effect
enum Step {
    Continue,
    Respond(Instruction),
    /// Abandon the remaining effects and evaluate this event next
    Redirect(Event),
}

/// Bookkeeping for one transport event as it moves through the loop
#[derive(Default)]
struct TurnScope {
    /// Epoch of the session the current event was decided on
    seen_epoch: Option<u64>,
    /// Reply slot held by this request
    ticket: Option<ReplyTicket>,
    admitted: Option<oneshot::Sender<()>>,
}

impl TurnScope {
    fn signal_admitted(&mut self) {
        if let Some(admitted) = self.admitted.take() {
            let _ = admitted.send(());
        }
    }
}

/// Drives calls through the turn-taking protocol
pub struct TurnController {
    store: Arc<dyn SessionStore>,
    engine: ReplyEngine,
    policy: CallPolicy,
    prompts: Arc<Prompts>,
}

impl TurnController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmClient>,
        settings: CallSettings,
    ) -> Self {
        let engine = ReplyEngine::new(llm, settings.system_prompt, settings.policy.history_window);
        Self {
            store,
            engine,
            policy: settings.policy,
            prompts: settings.prompts,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    /// Handle one transport event for `call_id`.
    ///
    /// Start events and utterances always get an instruction back; a hangup
    /// gets none.
    pub async fn handle(&self, call_id: &str, event: Event) -> Option<Instruction> {
        self.run(call_id, event, TurnScope::default()).await
    }

    /// Like [`handle`](Self::handle), signalling `admitted` as soon as it is
    /// settled whether this event holds the call's reply slot.
    ///
    /// Transports that must admit utterances in arrival order wait for the
    /// signal before handing over the next one. The sender is dropped
    /// without a signal when the event never asks for a reply.
    pub async fn handle_in_order(
        &self,
        call_id: &str,
        event: Event,
        admitted: oneshot::Sender<()>,
    ) -> Option<Instruction> {
        let scope = TurnScope {
            admitted: Some(admitted),
            ..TurnScope::default()
        };
        self.run(call_id, event, scope).await
    }

    async fn run(&self, call_id: &str, event: Event, mut scope: TurnScope) -> Option<Instruction> {
        let ctx = CallContext::new(call_id, self.policy, self.prompts.clone());
        let expects_answer = matches!(event, Event::CallStarted | Event::Utterance { .. });

        let mut response = None;
        let mut next = Some(event);
        let mut steps = 0;

        while let Some(event) = next.take() {
            steps += 1;
            if steps > MAX_STEPS {
                tracing::error!(call_id, "Turn did not settle, ending call");
                self.delete_seen(call_id, scope.seen_epoch).await;
                response = Some(Instruction::apology(&self.prompts.apology));
                break;
            }

            let session = self.store.get(call_id).await;
            scope.seen_epoch = session.as_ref().map(|s| s.epoch);
            let state = CallState::of(session.as_ref());

            // A reply only applies to the conversation it was generated for
            let outlived = matches!(event, Event::ReplyReady { .. } | Event::ReplyFailed { .. })
                && scope
                    .ticket
                    .as_ref()
                    .is_some_and(|held| scope.seen_epoch != Some(held.epoch));
            let event = if outlived {
                tracing::info!(call_id, event = event.name(), "Reply outlived its conversation");
                scope.ticket = None;
                Event::ReplyDiscarded
            } else {
                event
            };

            if let Event::ReplyFailed { message, kind } = &event {
                tracing::warn!(
                    call_id,
                    error = %message,
                    kind = kind.map_or("reply_error", LlmErrorKind::as_str),
                    transient = kind.is_some_and(LlmErrorKind::is_transient),
                    "Ending call after failed reply"
                );
            }

            let event_name = event.name();
            let result = match transition(&state, &ctx, event) {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(call_id, error = %e, "Invalid transition, ending call");
                    self.delete_seen(call_id, scope.seen_epoch).await;
                    response = Some(Instruction::apology(&self.prompts.apology));
                    break;
                }
            };
            tracing::debug!(
                call_id,
                event = event_name,
                from = state.name(),
                to = result.new_state.name(),
                "Transition"
            );

            for effect in result.effects {
                match self.execute_effect(&ctx, &state, effect, &mut scope).await {
                    Step::Continue => {}
                    Step::Respond(instruction) => response = Some(instruction),
                    Step::Redirect(event) => {
                        next = Some(event);
                        break;
                    }
                }
            }
        }

        // A ticket still held here was never recorded; release the call
        if let Some(ticket) = scope.ticket.take() {
            if let Err(e) = self.store.finish_reply(&ticket, None).await {
                tracing::debug!(call_id, error = %e, "Released reply slot for a finished call");
            }
        }

        if expects_answer && response.is_none() {
            tracing::error!(call_id, "Transport event produced no instruction");
            response = Some(Instruction::apology(&self.prompts.apology));
        }
        response
    }

    async fn execute_effect(
        &self,
        ctx: &CallContext,
        state: &CallState,
        effect: Effect,
        scope: &mut TurnScope,
    ) -> Step {
        let call_id = ctx.call_id.as_str();
        match effect {
            Effect::OpenSession => {
                if self.store.create(call_id).await {
                    tracing::info!(call_id, "Session opened");
                }
                Step::Continue
            }

            Effect::RequestReply { utterance } => {
                self.request_reply(call_id, state, utterance, scope).await
            }

            Effect::RecordExchange { utterance, reply } => {
                let Some(held) = scope.ticket.take() else {
                    tracing::warn!(call_id, "Reply arrived without a reply slot");
                    return Step::Redirect(Event::ReplyDiscarded);
                };
                let exchange = Exchange {
                    user: utterance,
                    assistant: reply,
                };
                match self.store.finish_reply(&held, Some(exchange)).await {
                    Ok(turns) => {
                        tracing::debug!(call_id, turns, "Exchange recorded");
                        Step::Continue
                    }
                    Err(e) => {
                        tracing::info!(call_id, error = %e, "Reply discarded");
                        Step::Redirect(Event::ReplyDiscarded)
                    }
                }
            }

            Effect::DeleteSession => {
                if self.delete_seen(call_id, scope.seen_epoch).await {
                    tracing::info!(call_id, "Session deleted");
                }
                Step::Continue
            }

            Effect::ScheduleDeletion { after } => {
                if let Some(epoch) = self.store.close(call_id).await {
                    tracing::info!(call_id, grace_secs = after.as_secs(), "Call ended");
                    let store = self.store.clone();
                    let call_id = call_id.to_string();
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        if store.delete_epoch(&call_id, epoch).await {
                            tracing::info!(call_id = %call_id, "Session deleted after hangup");
                        }
                    });
                }
                Step::Continue
            }

            Effect::Respond(instruction) => Step::Respond(instruction),
        }
    }

    /// Delete the conversation this turn was decided on, never a newer one
    async fn delete_seen(&self, call_id: &str, seen_epoch: Option<u64>) -> bool {
        match seen_epoch {
            Some(epoch) => self.store.delete_epoch(call_id, epoch).await,
            None => false,
        }
    }

    async fn request_reply(
        &self,
        call_id: &str,
        state: &CallState,
        utterance: String,
        scope: &mut TurnScope,
    ) -> Step {
        let retry = Event::Utterance {
            text: utterance.clone(),
        };

        let held = match self.store.begin_reply(call_id).await {
            Ok(held) => held,
            Err(e) => {
                // Someone else moved the call first; decide again on fresh state
                tracing::debug!(call_id, error = %e, "Reply slot refused");
                scope.signal_admitted();
                return Step::Redirect(retry);
            }
        };

        let expected = match state {
            CallState::AwaitingUtterance { turn_count } => *turn_count,
            _ => 0,
        };
        if held.turn_count() != expected {
            // History moved between reading the state and taking the slot
            if let Err(e) = self.store.finish_reply(&held, None).await {
                tracing::debug!(call_id, error = %e, "Released reply slot");
            }
            return Step::Redirect(retry);
        }
        scope.signal_admitted();

        let started = Instant::now();
        let outcome = self.engine.generate_reply(&held.history, &utterance).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        scope.ticket = Some(held);

        match outcome {
            Ok(reply) => {
                tracing::info!(call_id, duration_ms, "Reply generated");
                Step::Redirect(Event::ReplyReady { utterance, reply })
            }
            Err(e) => {
                tracing::debug!(call_id, duration_ms, "Reply generation failed");
                Step::Redirect(Event::ReplyFailed {
                    message: e.to_string(),
                    kind: e.llm_kind(),
                })
            }
        }
    }
}
