//! Call sessions and the store that owns them
//!
//! A session is the ordered dialogue of one phone call, keyed by the call
//! identifier. Only a [`SessionStore`] mutates sessions; everything else
//! works on snapshots.

mod memory;
mod sweeper;

#[cfg(test)]
mod proptests;

pub use memory::InMemorySessionStore;
pub use sweeper::spawn_sweeper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// One utterance in a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}

/// Lifecycle mark kept on the stored session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the caller's next utterance
    Open,
    /// A reply is being generated; further utterances are rejected
    Responding,
    /// The transport hung up; kept only until the grace delay expires
    Closed,
    /// Removed from the store; any handle still pointing here is stale
    Evicted,
}

/// Conversation state for one call
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: String,
    /// Distinguishes this conversation from an earlier one under the same id
    pub epoch: u64,
    pub turns: Vec<Turn>,
    pub phase: SessionPhase,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(id: impl Into<String>, epoch: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            epoch,
            turns: Vec::new(),
            phase: SessionPhase::Open,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_activity_at < cutoff
    }
}

/// Tail of `turns` no longer than `window`
pub fn recent(turns: &[Turn], window: usize) -> &[Turn] {
    &turns[turns.len().saturating_sub(window)..]
}

/// Proof that a reply generation was admitted for a call.
///
/// Carries the history snapshot the reply is generated from and the epoch
/// the reply may be recorded against.
#[derive(Debug, Clone)]
pub struct ReplyTicket {
    pub call_id: String,
    pub epoch: u64,
    pub history: Vec<Turn>,
}

impl ReplyTicket {
    pub fn turn_count(&self) -> usize {
        self.history.len()
    }
}

/// A user utterance paired with the reply generated for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no open session for call {0}")]
    NotFound(String),
    #[error("call {0} has ended")]
    Closed(String),
    #[error("a reply is already being generated for call {0}")]
    ReplyInFlight(String),
    #[error("session for call {0} was replaced")]
    Stale(String),
}

/// Eviction policy for the periodic sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    /// Sessions with no activity for this long are evicted
    pub max_idle: Duration,
    /// Ceiling on stored sessions; least recently active ones go first
    pub max_sessions: usize,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(30 * 60),
            max_sessions: 1000,
        }
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub idle_evicted: usize,
    pub overflow_evicted: usize,
    /// Sessions left alone because a turn was in progress
    pub skipped_busy: usize,
    pub remaining: usize,
}

impl SweepReport {
    pub fn evicted(&self) -> usize {
        self.idle_evicted + self.overflow_evicted
    }
}

/// Exclusive owner of call sessions.
///
/// Every operation is atomic per call id; operations on different ids never
/// wait on each other beyond a map lookup.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create an empty session unless one exists. Returns whether it was created.
    async fn create(&self, call_id: &str) -> bool;

    /// Snapshot of the session, `None` when unknown
    async fn get(&self, call_id: &str) -> Option<CallSession>;

    /// Append one turn; returns the new turn count
    async fn append_turn(&self, call_id: &str, turn: Turn) -> Result<usize, StoreError>;

    /// Admit one reply generation for the call
    async fn begin_reply(&self, call_id: &str) -> Result<ReplyTicket, StoreError>;

    /// Release an admitted reply, recording the exchange when given.
    ///
    /// The exchange is discarded with an error when the call has ended or the
    /// session was replaced since the ticket was issued.
    async fn finish_reply(
        &self,
        ticket: &ReplyTicket,
        exchange: Option<Exchange>,
    ) -> Result<usize, StoreError>;

    /// Mark the call ended. Returns the epoch the first time only.
    async fn close(&self, call_id: &str) -> Option<u64>;

    /// Remove the session. Returns whether anything was removed.
    async fn delete(&self, call_id: &str) -> bool;

    /// Remove the session only if it is still the conversation `epoch`
    async fn delete_epoch(&self, call_id: &str, epoch: u64) -> bool;

    /// Evict idle sessions, then enforce the size ceiling
    async fn sweep(&self, policy: &SweepPolicy) -> SweepReport;

    /// Number of stored sessions
    async fn len(&self) -> usize;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn create(&self, call_id: &str) -> bool {
        (**self).create(call_id).await
    }

    async fn get(&self, call_id: &str) -> Option<CallSession> {
        (**self).get(call_id).await
    }

    async fn append_turn(&self, call_id: &str, turn: Turn) -> Result<usize, StoreError> {
        (**self).append_turn(call_id, turn).await
    }

    async fn begin_reply(&self, call_id: &str) -> Result<ReplyTicket, StoreError> {
        (**self).begin_reply(call_id).await
    }

    async fn finish_reply(
        &self,
        ticket: &ReplyTicket,
        exchange: Option<Exchange>,
    ) -> Result<usize, StoreError> {
        (**self).finish_reply(ticket, exchange).await
    }

    async fn close(&self, call_id: &str) -> Option<u64> {
        (**self).close(call_id).await
    }

    async fn delete(&self, call_id: &str) -> bool {
        (**self).delete(call_id).await
    }

    async fn delete_epoch(&self, call_id: &str, epoch: u64) -> bool {
        (**self).delete_epoch(call_id, epoch).await
    }

    async fn sweep(&self, policy: &SweepPolicy) -> SweepReport {
        (**self).sweep(policy).await
    }

    async fn len(&self) -> usize {
        (**self).len().await
    }
}
