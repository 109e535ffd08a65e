// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Lock manager: shared/exclusive locks on opaque string IDs with
//! FIFO fairness, shared-to-exclusive upgrade, and background
//! deadlock detection.
//!
//! Lock identities carry no structure; callers pick the granularity
//! (table, page, row) by choice of ID.

mod deadlock;
#[allow(clippy::module_inception)]
mod lock;

use crate::stop_signal::StopSignal;
use lock::{LockState, Request};
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// Default deadlock detector period
pub const DEFAULT_DETECTOR_PERIOD: Duration = Duration::from_secs(1);

pub(crate) struct State {
    locks: FxHashMap<String, LockState>,
    held_by_client: FxHashMap<String, FxHashSet<String>>,
    pending_by_client: FxHashMap<String, Arc<Request>>,
}

pub(crate) struct Shared {
    pub state: Mutex<State>,
    pub detector_period: Duration,
}

/// Coordinates logical locks among concurrent clients
///
/// One mutex protects all state; every waiting request carries its own
/// condvar bound to that mutex. Requests are granted in FIFO order
/// subject to compatibility. A background thread breaks wait-for
/// cycles by making one victim's `acquire` return
/// [`Deadlock`](crate::Error::Deadlock).
pub struct LockManager {
    shared: Arc<Shared>,
    stop: StopSignal,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    /// Creates a manager with the default detector period.
    #[must_use]
    pub fn new() -> Self {
        Self::with_detector_period(DEFAULT_DETECTOR_PERIOD)
    }

    /// Creates a manager whose deadlock detector runs every `period`.
    #[must_use]
    pub fn with_detector_period(period: Duration) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                locks: FxHashMap::default(),
                held_by_client: FxHashMap::default(),
                pending_by_client: FxHashMap::default(),
            }),
            detector_period: period,
        });
        let stop = StopSignal::default();

        let detector_shared = shared.clone();
        let detector_stop = stop.clone();
        std::thread::spawn(move || deadlock::run(&detector_shared, &detector_stop));

        Self { shared, stop }
    }

    /// Acquires `lock_id` for `client_id`, blocking until granted.
    ///
    /// Re-entrant: a request for a lock the client already holds is a
    /// no-op, except an exclusive request while holding shared, which
    /// upgrades once every other holder is gone. A client has at most
    /// one in-flight request. Returns
    /// [`Deadlock`](crate::Error::Deadlock) when the detector picks
    /// this client as a cycle's victim; the client should then abort
    /// and [`release_all`](Self::release_all).
    pub fn acquire(&self, client_id: &str, lock_id: &str, exclusive: bool) -> crate::Result<()> {
        let mut guard = self.shared.state.lock().expect("lock is poisoned");

        let request = {
            let state = &mut *guard;
            let entry = state.locks.entry(lock_id.to_string()).or_default();

            if let Some(holder) = entry.holder_for(client_id) {
                if holder.is_exclusive() || !exclusive {
                    return Ok(());
                }
                // Held shared, exclusive requested: upgrade.
                let request = Arc::new(Request::new(client_id, true));
                entry.pending.push_back(request.clone());
                state
                    .pending_by_client
                    .insert(client_id.to_string(), request.clone());
                self.wait_for_upgrade(guard, &request, lock_id)?;
                log::trace!("{client_id} upgraded {lock_id} to exclusive");
                return Ok(());
            }

            let request = Arc::new(Request::new(client_id, exclusive));
            entry.pending.push_back(request.clone());
            state
                .pending_by_client
                .insert(client_id.to_string(), request.clone());
            request
        };

        self.wait_for_grant(guard, &request, client_id, lock_id, exclusive)?;
        log::trace!(
            "{client_id} acquired {lock_id} ({})",
            if exclusive { "exclusive" } else { "shared" },
        );
        Ok(())
    }

    /// Waits until the request heads the queue and the lock is
    /// compatible, then grants it.
    fn wait_for_grant(
        &self,
        mut guard: MutexGuard<'_, State>,
        request: &Arc<Request>,
        client_id: &str,
        lock_id: &str,
        exclusive: bool,
    ) -> crate::Result<()> {
        loop {
            {
                let state = &mut *guard;
                let entry = state.locks.get_mut(lock_id).expect("lock entity vanished");
                let at_head = entry
                    .pending
                    .front()
                    .is_some_and(|front| Arc::ptr_eq(front, request));
                if at_head && entry.can_acquire(exclusive) {
                    entry.pending.pop_front();
                    entry.holders.push(request.clone());
                    // A batch of shared requests is woken together; the
                    // new head re-signals so none are stranded asleep.
                    entry.signal_pending();
                    state.pending_by_client.remove(client_id);
                    state
                        .held_by_client
                        .entry(client_id.to_string())
                        .or_default()
                        .insert(lock_id.to_string());
                    return Ok(());
                }
            }
            guard = request.condvar.wait(guard).expect("lock is poisoned");
            if request.deadlock_detected() {
                Self::abandon_request(&mut guard, request, client_id, lock_id);
                return Err(crate::Error::Deadlock);
            }
        }
    }

    /// Waits until the upgrading client is the queue head and the sole
    /// holder, then flips its holder entry to exclusive.
    fn wait_for_upgrade(
        &self,
        mut guard: MutexGuard<'_, State>,
        request: &Arc<Request>,
        lock_id: &str,
    ) -> crate::Result<()> {
        let client_id = request.client_id.clone();
        loop {
            {
                let state = &mut *guard;
                let entry = state.locks.get_mut(lock_id).expect("lock entity vanished");
                let at_head = entry
                    .pending
                    .front()
                    .is_some_and(|front| Arc::ptr_eq(front, request));
                if at_head && entry.holders.len() == 1 {
                    entry.pending.pop_front();
                    if let Some(holder) = entry.holders.first() {
                        holder.make_exclusive();
                    }
                    state.pending_by_client.remove(&client_id);
                    return Ok(());
                }
            }
            guard = request.condvar.wait(guard).expect("lock is poisoned");
            if request.deadlock_detected() {
                Self::abandon_request(&mut guard, request, &client_id, lock_id);
                return Err(crate::Error::Deadlock);
            }
        }
    }

    /// The victim removes itself from the queue and lets dependents
    /// re-evaluate.
    fn abandon_request(
        guard: &mut MutexGuard<'_, State>,
        request: &Arc<Request>,
        client_id: &str,
        lock_id: &str,
    ) {
        let state = &mut **guard;
        if let Some(entry) = state.locks.get_mut(lock_id) {
            entry.remove_pending(request);
            entry.signal_pending();
        }
        state.pending_by_client.remove(client_id);
        log::debug!("{client_id} abandoned its request for {lock_id} after deadlock");
    }

    /// Releases every lock held by `client_id` and wakes dependents.
    pub fn release_all(&self, client_id: &str) {
        let mut guard = self.shared.state.lock().expect("lock is poisoned");
        let state = &mut *guard;

        let Some(lock_ids) = state.held_by_client.remove(client_id) else {
            return;
        };
        for lock_id in lock_ids {
            let mut unused = false;
            if let Some(entry) = state.locks.get_mut(&lock_id) {
                entry.holders.retain(|h| h.client_id != client_id);
                entry.signal_pending();
                unused = entry.is_unused();
            }
            if unused {
                state.locks.remove(&lock_id);
            }
        }
        log::trace!("released all locks held by {client_id}");
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        // The detector notices at its next tick and exits.
        self.stop.send();
    }
}
