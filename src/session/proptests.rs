//! Property-based tests for the session store
//!
//! - Stored turns always come in user/assistant pairs
//! - At most one reply is admitted per call at a time
//! - Nothing is recorded after the call has been closed

use super::{Exchange, InMemorySessionStore, SessionStore, Speaker};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create,
    Begin,
    Finish { record: bool },
    Close,
    Delete,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Create),
        3 => Just(Op::Begin),
        3 => any::<bool>().prop_map(|record| Op::Finish { record }),
        1 => Just(Op::Close),
        1 => Just(Op::Delete),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn turns_stay_paired(ops in proptest::collection::vec(arb_op(), 1..30)) {
        runtime().block_on(async {
            let store = InMemorySessionStore::new();
            let mut held = None;

            for (i, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Create => {
                        store.create("c").await;
                    }
                    Op::Begin => {
                        let admitted = store.begin_reply("c").await;
                        if held.is_some() {
                            prop_assert!(admitted.is_err());
                        } else if let Ok(ticket) = admitted {
                            held = Some(ticket);
                        }
                    }
                    Op::Finish { record } => {
                        if let Some(ticket) = held.take() {
                            let exchange = record.then(|| Exchange {
                                user: format!("q{i}"),
                                assistant: format!("a{i}"),
                            });
                            let _ = store.finish_reply(&ticket, exchange).await;
                        }
                    }
                    Op::Close => {
                        let before = store.get("c").await.map(|s| s.turn_count());
                        store.close("c").await;
                        if let Some(ticket) = held.take() {
                            let exchange = Exchange {
                                user: "late".to_string(),
                                assistant: "late".to_string(),
                            };
                            let recorded = store.finish_reply(&ticket, Some(exchange)).await;
                            prop_assert!(recorded.is_err());
                        }
                        prop_assert_eq!(store.get("c").await.map(|s| s.turn_count()), before);
                    }
                    Op::Delete => {
                        store.delete("c").await;
                        held = None;
                    }
                }

                if let Some(session) = store.get("c").await {
                    prop_assert_eq!(session.turn_count() % 2, 0);
                    for (n, turn) in session.turns.iter().enumerate() {
                        let expected = if n % 2 == 0 { Speaker::User } else { Speaker::Assistant };
                        prop_assert_eq!(turn.speaker, expected);
                    }
                }
            }
            Ok(())
        })?;
    }
}
