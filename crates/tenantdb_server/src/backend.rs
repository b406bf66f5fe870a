//! Shared server state.

use crate::config::ServerConfig;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tenantdb_core::{EmulatedStore, EntityId, Snapshot};

/// Identifier of a connected session.
pub type SessionId = u64;

/// Result of a row lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockOutcome {
    /// The lock was free (or freed while waiting) and is now held.
    Acquired,
    /// The requester already held the lock.
    AlreadyHeld,
    /// Waiting would close a cycle; nothing was acquired.
    Deadlock,
}

#[derive(Debug, Default)]
struct BackendState {
    store: EmulatedStore,
    lock_holders: HashMap<EntityId, SessionId>,
    waiting_for: HashMap<SessionId, EntityId>,
}

impl BackendState {
    /// Follows the wait-for chain starting at `holder` and reports whether it
    /// leads back to `requester`.
    fn closes_cycle(&self, requester: SessionId, holder: SessionId) -> bool {
        let mut current = holder;
        for _ in 0..=self.waiting_for.len() {
            if current == requester {
                return true;
            }
            let Some(entity) = self.waiting_for.get(&current) else {
                return false;
            };
            let Some(&next) = self.lock_holders.get(entity) else {
                return false;
            };
            current = next;
        }
        false
    }
}

/// The authoritative store shared by every session, plus the row lock table.
///
/// Documents, the ownership index and the lock table sit behind one mutex,
/// so every store operation is atomic with respect to the others. Sessions
/// waiting for a row lock park on a condition variable that is signalled
/// whenever locks are released.
#[derive(Debug)]
pub struct Backend {
    config: ServerConfig,
    state: Mutex<BackendState>,
    lock_released: Condvar,
    next_session: AtomicU64,
}

impl Backend {
    /// Creates a backend serving `store`.
    #[must_use]
    pub fn new(config: ServerConfig, store: EmulatedStore) -> Self {
        Self {
            config,
            state: Mutex::new(BackendState {
                store,
                ..BackendState::default()
            }),
            lock_released: Condvar::new(),
            next_session: AtomicU64::new(1),
        }
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runs `f` with exclusive access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut EmulatedStore) -> R) -> R {
        f(&mut self.state.lock().store)
    }

    /// Captures every entity.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().store.to_snapshot()
    }

    /// Returns true if the store changed since the last [`mark_clean`](Self::mark_clean).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.lock().store.is_dirty()
    }

    /// Clears the store's change flag.
    pub fn mark_clean(&self) {
        self.state.lock().store.mark_clean();
    }

    /// Captures every entity and clears the change flag, if the store
    /// changed since the last capture.
    #[must_use]
    pub fn snapshot_if_dirty(&self) -> Option<Snapshot> {
        let mut state = self.state.lock();
        if !state.store.is_dirty() {
            return None;
        }
        state.store.mark_clean();
        Some(state.store.to_snapshot())
    }

    /// Number of sessions blocked on a row lock.
    #[must_use]
    pub fn waiting_sessions(&self) -> usize {
        self.state.lock().waiting_for.len()
    }

    /// Returns true if the session is blocked on a row lock.
    #[must_use]
    pub fn is_waiting(&self, session: SessionId) -> bool {
        self.state.lock().waiting_for.contains_key(&session)
    }

    /// Session holding the row lock of an entity.
    #[must_use]
    pub fn lock_holder(&self, id: &EntityId) -> Option<SessionId> {
        self.state.lock().lock_holders.get(id).copied()
    }

    pub(crate) fn next_session_id(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Acquires the row lock of `id` for `session`, blocking while another
    /// session holds it unless waiting would deadlock.
    pub(crate) fn acquire_lock(&self, session: SessionId, id: &EntityId) -> LockOutcome {
        let mut state = self.state.lock();
        loop {
            match state.lock_holders.get(id).copied() {
                None => {
                    state.waiting_for.remove(&session);
                    state.lock_holders.insert(id.clone(), session);
                    return LockOutcome::Acquired;
                }
                Some(holder) if holder == session => {
                    state.waiting_for.remove(&session);
                    return LockOutcome::AlreadyHeld;
                }
                Some(holder) => {
                    if state.closes_cycle(session, holder) {
                        state.waiting_for.remove(&session);
                        tracing::warn!(
                            session,
                            holder,
                            entity_id = %id,
                            "deadlock detected"
                        );
                        return LockOutcome::Deadlock;
                    }
                    if state.waiting_for.insert(session, id.clone()).is_none() {
                        tracing::debug!(session, holder, entity_id = %id, "waiting for row lock");
                    }
                    self.lock_released.wait(&mut state);
                }
            }
        }
    }

    /// Releases row locks held by `session` and wakes waiting sessions.
    pub(crate) fn release_locks<'a, I>(&self, session: SessionId, ids: I)
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        let mut state = self.state.lock();
        let mut released = 0usize;
        for id in ids {
            if state.lock_holders.get(id) == Some(&session) {
                state.lock_holders.remove(id);
                released += 1;
            }
        }
        state.waiting_for.remove(&session);
        drop(state);
        if released > 0 {
            self.lock_released.notify_all();
        }
    }
}
