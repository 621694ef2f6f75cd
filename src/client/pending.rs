use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::{CorrelationId, Envelope};

/// An outstanding call awaiting its reply.
struct PendingCall {
    // ---
    tx: oneshot::Sender<Envelope>,
    deadline: Instant,
}

/// Outcome of offering a reply to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// The waiter received the reply.
    Delivered,
    /// The call exists but its deadline passed, or its waiter already left.
    Late,
    /// No call with this correlation id is pending.
    Unmatched,
}

/// Outcome of registering a call.
#[derive(Debug)]
pub(crate) enum Registration {
    /// The call is pending; the receiver yields its reply.
    Registered(oneshot::Receiver<Envelope>),
    /// The correlation id is already pending.
    Duplicate,
    /// The registry was drained and accepts no new calls.
    Closed,
}

/// Registry of pending calls keyed by correlation id.
///
/// Every resolution path (reply, timeout, cancellation, shutdown) goes through
/// `remove` on the map, so a call is resolved at most once. The lock is never
/// held across an `.await`. Once drained the registry stays closed; the flag
/// lives under the same lock as the map so no registration can slip in after
/// a drain.
pub(crate) struct PendingCalls {
    // ---
    state: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    calls: HashMap<CorrelationId, PendingCall>,
    closed: bool,
}

/// Acquire the registry lock, ignoring poisoning.
///
/// The map has no cross-entry invariants; the worst outcome of a panic while
/// holding the lock is one dropped reply.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl PendingCalls {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            state: Mutex::new(Registry::default()),
        }
    }

    /// Register a call under `correlation_id`.
    ///
    /// On [`Registration::Duplicate`] the caller picks a new id.
    pub fn register(&self, correlation_id: CorrelationId, deadline: Instant) -> Registration {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        if state.closed {
            return Registration::Closed;
        }

        match state.calls.entry(correlation_id) {
            Entry::Occupied(_) => Registration::Duplicate,
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingCall { tx, deadline });
                Registration::Registered(rx)
            }
        }
    }

    /// Offer a reply to the call it belongs to.
    pub fn complete(&self, correlation_id: &CorrelationId, reply: Envelope) -> Completion {
        // ---
        let call = lock_ignore_poison(&self.state).calls.remove(correlation_id);

        let Some(call) = call else {
            return Completion::Unmatched;
        };

        if Instant::now() >= call.deadline {
            return Completion::Late;
        }

        match call.tx.send(reply) {
            Ok(()) => Completion::Delivered,
            Err(_) => Completion::Late,
        }
    }

    /// Remove a call without resolving it. Returns whether it was still pending.
    pub fn remove(&self, correlation_id: &CorrelationId) -> bool {
        // ---
        lock_ignore_poison(&self.state)
            .calls
            .remove(correlation_id)
            .is_some()
    }

    /// Drop every pending call and refuse new ones; waiters observe a closed
    /// channel.
    pub fn drain(&self) -> usize {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        state.closed = true;
        let n = state.calls.len();
        state.calls.clear();
        n
    }

    pub fn is_closed(&self) -> bool {
        lock_ignore_poison(&self.state).closed
    }

    pub fn len(&self) -> usize {
        // ---
        lock_ignore_poison(&self.state).calls.len()
    }
}

/// Removes its call from the registry when dropped.
///
/// Held by the issuing future for the whole publish-and-wait span, so a
/// cancelled call (future dropped) cannot leave an entry behind. An entry
/// still present at drop time of an unsettled guard counts as a cancellation.
pub(crate) struct PendingGuard<'a> {
    // ---
    registry: &'a PendingCalls,
    correlation_id: CorrelationId,
    cancellations: &'a AtomicU64,
    settled: bool,
}

impl<'a> PendingGuard<'a> {
    pub fn new(
        registry: &'a PendingCalls,
        correlation_id: CorrelationId,
        cancellations: &'a AtomicU64,
    ) -> Self {
        Self {
            registry,
            correlation_id,
            cancellations,
            settled: false,
        }
    }

    /// Mark the call as finished through a normal path (reply, timeout, error).
    pub fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        // ---
        if self.registry.remove(&self.correlation_id) && !self.settled {
            self.cancellations.fetch_add(1, Ordering::Relaxed);
        }
    }
}
