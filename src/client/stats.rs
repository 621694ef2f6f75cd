use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by [`RpcClient`](crate::RpcClient).
#[derive(Default)]
pub(crate) struct ClientStats {
    pub calls_started: AtomicU64,
    pub replies_matched: AtomicU64,
    pub unmatched_replies: AtomicU64,
    pub late_replies: AtomicU64,
    pub malformed_replies: AtomicU64,
    pub timeouts: AtomicU64,
    pub cancellations: AtomicU64,
    pub publish_failures: AtomicU64,
}

impl ClientStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        // ---
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        StatsSnapshot {
            calls_started: load(&self.calls_started),
            replies_matched: load(&self.replies_matched),
            unmatched_replies: load(&self.unmatched_replies),
            late_replies: load(&self.late_replies),
            malformed_replies: load(&self.malformed_replies),
            timeouts: load(&self.timeouts),
            cancellations: load(&self.cancellations),
            publish_failures: load(&self.publish_failures),
        }
    }
}

/// Point-in-time copy of the client counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls that reached the publish step.
    pub calls_started: u64,
    /// Replies delivered to their waiting call.
    pub replies_matched: u64,
    /// Replies whose correlation id was not pending.
    pub unmatched_replies: u64,
    /// Replies for a call past its deadline or whose waiter already left.
    pub late_replies: u64,
    /// Envelopes on the reply queue without a correlation id.
    pub malformed_replies: u64,
    pub timeouts: u64,
    /// Calls whose future was dropped before resolution.
    pub cancellations: u64,
    pub publish_failures: u64,
}
