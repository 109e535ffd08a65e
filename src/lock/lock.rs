// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar,
    },
};

/// One acquire call, granted or waiting
///
/// The condvar is bound to the manager's single mutex. Flags are
/// atomics only so the struct can be shared through `Arc`; they are
/// always read and written under that mutex.
pub(crate) struct Request {
    pub client_id: String,
    exclusive: AtomicBool,
    pub condvar: Condvar,
    deadlock_detected: AtomicBool,
}

impl Request {
    pub fn new(client_id: &str, exclusive: bool) -> Self {
        Self {
            client_id: client_id.to_string(),
            exclusive: AtomicBool::new(exclusive),
            condvar: Condvar::new(),
            deadlock_detected: AtomicBool::new(false),
        }
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive.load(Ordering::Relaxed)
    }

    /// Flips a granted shared holder to exclusive (lock upgrade).
    pub fn make_exclusive(&self) {
        self.exclusive.store(true, Ordering::Relaxed);
    }

    pub fn deadlock_detected(&self) -> bool {
        self.deadlock_detected.load(Ordering::Relaxed)
    }

    pub fn mark_deadlocked(&self) {
        self.deadlock_detected.store(true, Ordering::Relaxed);
    }
}

/// Per-lock state: granted holders plus the FIFO wait queue
///
/// Invariants: holders are either all shared or exactly one exclusive;
/// a client appears at most once in holders and at most once in
/// pending.
#[derive(Default)]
pub(crate) struct LockState {
    pub holders: Vec<Arc<Request>>,
    pub pending: VecDeque<Arc<Request>>,
}

impl LockState {
    pub fn holder_for(&self, client_id: &str) -> Option<&Arc<Request>> {
        self.holders.iter().find(|h| h.client_id == client_id)
    }

    /// Whether a new client could be granted the lock in this mode.
    pub fn can_acquire(&self, exclusive: bool) -> bool {
        match self.holders.first() {
            None => true,
            Some(first) => !exclusive && !first.is_exclusive(),
        }
    }

    pub fn remove_pending(&mut self, request: &Arc<Request>) {
        self.pending.retain(|p| !Arc::ptr_eq(p, request));
    }

    pub fn is_unused(&self) -> bool {
        self.holders.is_empty() && self.pending.is_empty()
    }

    /// Wakes whichever pending requests could now make progress.
    ///
    /// An exclusive head is woken when it could acquire or upgrade; a
    /// shared head is woken together with every following shared
    /// request up to the first exclusive one (FIFO fairness keeps
    /// later shared requests behind a waiting writer).
    pub fn signal_pending(&self) {
        let Some(head) = self.pending.front() else {
            return;
        };

        if head.is_exclusive() {
            let can_acquire = self.holders.is_empty();
            let can_upgrade = self
                .holders
                .first()
                .is_some_and(|only| self.holders.len() == 1 && only.client_id == head.client_id);
            if can_acquire || can_upgrade {
                head.condvar.notify_one();
            }
        } else {
            // Shared requests are only incompatible with an exclusive
            // holder.
            if self.holders.first().is_some_and(|h| h.is_exclusive()) {
                return;
            }
            for request in &self.pending {
                if request.is_exclusive() {
                    break;
                }
                request.condvar.notify_one();
            }
        }
    }
}
