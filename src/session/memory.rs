//! In-process session store
//!
//! A map of per-call mutexes. The map lock is held only to look up or
//! insert/remove an entry; all session mutation happens under that call's
//! own mutex, so unrelated calls never serialize on each other.

use super::{
    CallSession, Exchange, ReplyTicket, SessionPhase, SessionStore, StoreError, SweepPolicy,
    SweepReport, Turn,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

type Slot = Arc<Mutex<CallSession>>;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Slot>>,
    next_epoch: AtomicU64,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_epoch(&self) -> u64 {
        self.next_epoch.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Lock a live session. `None` when absent or already evicted.
    async fn lock_live(&self, call_id: &str) -> Option<OwnedMutexGuard<CallSession>> {
        let slot = self.sessions.read().await.get(call_id).cloned()?;
        let guard = slot.lock_owned().await;
        (guard.phase != SessionPhase::Evicted).then_some(guard)
    }

    /// Sweep against an explicit clock
    pub async fn sweep_at(&self, policy: &SweepPolicy, now: DateTime<Utc>) -> SweepReport {
        let cutoff = chrono::Duration::from_std(policy.max_idle)
            .ok()
            .and_then(|idle| now.checked_sub_signed(idle))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut report = SweepReport::default();
        let mut sessions = self.sessions.write().await;

        // Only sessions we can lock right now and that are not mid-turn are
        // candidates; their guards are held until they leave the map.
        let mut candidates: Vec<(String, OwnedMutexGuard<CallSession>)> = Vec::new();
        for (id, slot) in sessions.iter() {
            match Arc::clone(slot).try_lock_owned() {
                Ok(guard) if guard.phase != SessionPhase::Responding => {
                    candidates.push((id.clone(), guard));
                }
                _ => report.skipped_busy += 1,
            }
        }

        let (idle, mut live): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|(_, guard)| guard.is_idle_since(cutoff));

        for (id, mut guard) in idle {
            guard.phase = SessionPhase::Evicted;
            sessions.remove(&id);
            report.idle_evicted += 1;
            tracing::debug!(
                call_id = %id,
                age_secs = (now - guard.created_at).num_seconds(),
                "Evicted idle session"
            );
        }

        if sessions.len() > policy.max_sessions {
            live.sort_by_key(|(_, guard)| guard.last_activity_at);
            let excess = sessions.len() - policy.max_sessions;
            for (id, mut guard) in live.into_iter().take(excess) {
                guard.phase = SessionPhase::Evicted;
                sessions.remove(&id);
                report.overflow_evicted += 1;
                tracing::debug!(call_id = %id, "Evicted session over capacity");
            }
        }

        report.remaining = sessions.len();
        report
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, call_id: &str) -> bool {
        if let Some(mut guard) = self.lock_live(call_id).await {
            guard.touch(Utc::now());
            return false;
        }

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(call_id) {
            // Lost the race to another creator, or an evicted slot is still
            // being removed; either way the id is taken.
            return false;
        }
        let session = CallSession::new(call_id, self.next_epoch(), Utc::now());
        sessions.insert(call_id.to_string(), Arc::new(Mutex::new(session)));
        true
    }

    async fn get(&self, call_id: &str) -> Option<CallSession> {
        self.lock_live(call_id).await.map(|guard| guard.clone())
    }

    async fn append_turn(&self, call_id: &str, turn: Turn) -> Result<usize, StoreError> {
        let mut guard = self
            .lock_live(call_id)
            .await
            .ok_or_else(|| StoreError::NotFound(call_id.to_string()))?;
        if guard.phase == SessionPhase::Closed {
            return Err(StoreError::Closed(call_id.to_string()));
        }
        guard.turns.push(turn);
        guard.touch(Utc::now());
        Ok(guard.turn_count())
    }

    async fn begin_reply(&self, call_id: &str) -> Result<ReplyTicket, StoreError> {
        let mut guard = self
            .lock_live(call_id)
            .await
            .ok_or_else(|| StoreError::NotFound(call_id.to_string()))?;
        match guard.phase {
            SessionPhase::Open => {
                guard.phase = SessionPhase::Responding;
                guard.touch(Utc::now());
                Ok(ReplyTicket {
                    call_id: call_id.to_string(),
                    epoch: guard.epoch,
                    history: guard.turns.clone(),
                })
            }
            SessionPhase::Responding => Err(StoreError::ReplyInFlight(call_id.to_string())),
            SessionPhase::Closed | SessionPhase::Evicted => {
                Err(StoreError::Closed(call_id.to_string()))
            }
        }
    }

    async fn finish_reply(
        &self,
        ticket: &ReplyTicket,
        exchange: Option<Exchange>,
    ) -> Result<usize, StoreError> {
        let call_id = ticket.call_id.as_str();
        let mut guard = self
            .lock_live(call_id)
            .await
            .ok_or_else(|| StoreError::NotFound(call_id.to_string()))?;
        if guard.epoch != ticket.epoch {
            return Err(StoreError::Stale(call_id.to_string()));
        }
        if guard.phase == SessionPhase::Closed {
            return Err(StoreError::Closed(call_id.to_string()));
        }

        guard.phase = SessionPhase::Open;
        if let Some(Exchange { user, assistant }) = exchange {
            guard.turns.push(Turn::user(user));
            guard.turns.push(Turn::assistant(assistant));
        }
        guard.touch(Utc::now());
        Ok(guard.turn_count())
    }

    async fn close(&self, call_id: &str) -> Option<u64> {
        let mut guard = self.lock_live(call_id).await?;
        if guard.phase == SessionPhase::Closed {
            return None;
        }
        guard.phase = SessionPhase::Closed;
        guard.touch(Utc::now());
        Some(guard.epoch)
    }

    async fn delete(&self, call_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(call_id);
        match removed {
            Some(slot) => {
                slot.lock().await.phase = SessionPhase::Evicted;
                true
            }
            None => false,
        }
    }

    async fn delete_epoch(&self, call_id: &str, epoch: u64) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(slot) = sessions.get(call_id).cloned() else {
            return false;
        };
        // Holding the map lock while waiting on a session is safe: nothing
        // takes the map lock while holding a session lock.
        let mut guard = slot.lock().await;
        if guard.epoch != epoch {
            return false;
        }
        guard.phase = SessionPhase::Evicted;
        sessions.remove(call_id);
        true
    }

    async fn sweep(&self, policy: &SweepPolicy) -> SweepReport {
        self.sweep_at(policy, Utc::now()).await
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
