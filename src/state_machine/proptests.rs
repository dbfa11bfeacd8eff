//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::*;
use super::*;
use crate::instruction::Cue;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context(max_turns: usize) -> CallContext {
    let policy = CallPolicy {
        max_turns,
        ..CallPolicy::default()
    };
    CallContext::new("prop-call", policy, Arc::new(Prompts::default()))
}

fn turn_count(state: &CallState) -> usize {
    match state {
        CallState::AwaitingUtterance { turn_count } | CallState::Responding { turn_count } => {
            *turn_count
        }
        CallState::Idle | CallState::Ended => 0,
    }
}

fn requests_reply(result: &TransitionResult) -> bool {
    result
        .effects
        .iter()
        .any(|e| matches!(e, Effect::RequestReply { .. }))
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_blank() -> impl Strategy<Value = String> {
    "[ \t\n]{0,5}"
}

fn arb_words() -> impl Strategy<Value = String> {
    "[ ]{0,2}[a-zA-Z]{1,10}( [a-zA-Z]{1,10}){0,3}[ ]{0,2}"
}

fn arb_state() -> impl Strategy<Value = CallState> {
    prop_oneof![
        Just(CallState::Idle),
        (0usize..12).prop_map(|turn_count| CallState::AwaitingUtterance { turn_count }),
        (0usize..12).prop_map(|turn_count| CallState::Responding { turn_count }),
        Just(CallState::Ended),
    ]
}

/// One step a caller or the reply engine can take
#[derive(Debug, Clone)]
enum Step {
    Start,
    Speak(String),
    Silence(String),
    Hangup,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => Just(Step::Start),
        6 => arb_words().prop_map(Step::Speak),
        2 => arb_blank().prop_map(Step::Silence),
        1 => Just(Step::Hangup),
    ]
}

// ============================================================================
// Single-transition properties
// ============================================================================

proptest! {
    #[test]
    fn blank_utterance_never_requests_reply(state in arb_state(), text in arb_blank()) {
        let ctx = test_context(6);
        let result = transition(&state, &ctx, Event::Utterance { text }).unwrap();

        prop_assert!(!requests_reply(&result));
        prop_assert_eq!(turn_count(&result.new_state), turn_count(&state));
        let response = result.response().unwrap();
        if state == CallState::Ended {
            prop_assert_eq!(response.cue, Cue::Closing);
        } else {
            prop_assert_eq!(response.cue, Cue::Reprompt);
            prop_assert!(!response.ends_call());
        }
    }

    #[test]
    fn exhausted_budget_never_requests_reply(extra in 0usize..4, text in arb_words()) {
        let ctx = test_context(6);
        let state = CallState::AwaitingUtterance { turn_count: 6 + extra };
        let result = transition(&state, &ctx, Event::Utterance { text }).unwrap();

        prop_assert!(!requests_reply(&result));
        prop_assert_eq!(result.new_state, CallState::Ended);
        prop_assert!(result.response().unwrap().ends_call());
    }

    #[test]
    fn responding_never_requests_another_reply(turns in 0usize..12, text in "[ a-z]{0,20}") {
        let ctx = test_context(6);
        let state = CallState::Responding { turn_count: turns };
        let result = transition(&state, &ctx, Event::Utterance { text }).unwrap();

        prop_assert!(!requests_reply(&result));
        prop_assert_eq!(result.new_state, state);
    }

    #[test]
    fn transport_events_always_get_an_answer(state in arb_state(), text in "[ a-z]{0,20}") {
        let ctx = test_context(6);
        for event in [Event::CallStarted, Event::Utterance { text: text.clone() }] {
            let result = transition(&state, &ctx, event).unwrap();
            // Either the controller answers now, or it answers after the reply
            prop_assert!(result.response().is_some() != requests_reply(&result));
        }
    }

    #[test]
    fn hangup_never_answers(state in arb_state()) {
        let ctx = test_context(6);
        let result = transition(&state, &ctx, Event::Hangup).unwrap();
        prop_assert!(result.response().is_none());
        prop_assert!(matches!(result.new_state, CallState::Ended | CallState::Idle));
    }
}

// ============================================================================
// Whole-call simulation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Drive whole calls through the transition function, answering every
    /// reply request immediately, and check the turn invariants.
    #[test]
    fn calls_keep_turns_paired_and_bounded(
        steps in proptest::collection::vec(arb_step(), 1..40),
        max_pairs in 1usize..5,
        failures in proptest::collection::vec(any::<bool>(), 40),
    ) {
        let max_turns = max_pairs * 2;
        let ctx = test_context(max_turns);
        let mut state = CallState::Idle;
        let mut replies = 0usize;

        for (i, step) in steps.into_iter().enumerate() {
            let event = match step {
                Step::Start => Event::CallStarted,
                Step::Speak(text) | Step::Silence(text) => Event::Utterance { text },
                Step::Hangup => Event::Hangup,
            };
            let result = transition(&state, &ctx, event).unwrap();
            state = result.new_state;

            if let Some(Effect::RequestReply { utterance }) = result
                .effects
                .iter()
                .find(|e| matches!(e, Effect::RequestReply { .. }))
                .cloned()
            {
                let responding = matches!(state, CallState::Responding { .. });
                prop_assert!(responding, "reply requested outside Responding: {:?}", state);
                prop_assert!(!utterance.is_empty());
                prop_assert_eq!(utterance.trim(), utterance.as_str());

                let event = if failures[i] {
                    Event::ReplyFailed { message: "down".to_string(), kind: None }
                } else {
                    replies += 1;
                    Event::ReplyReady { utterance, reply: format!("reply {replies}") }
                };
                state = transition(&state, &ctx, event).unwrap().new_state;
            }

            let count = turn_count(&state);
            prop_assert_eq!(count % 2, 0);
            prop_assert!(count <= max_turns);
            let settled = !matches!(state, CallState::Responding { .. });
            prop_assert!(settled, "call left in Responding");

            // Model the session's removal; the next event starts a new call
            if state == CallState::Ended {
                state = CallState::Idle;
            }
        }
    }
}
