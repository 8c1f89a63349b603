//! Per-connection counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ConnectionStats {
    requests_dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
    responses_matched: AtomicU64,
    stale_responses: AtomicU64,
    malformed_dropped: AtomicU64,
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Inbound requests handed to a handler.
    pub requests_dispatched: u64,
    /// Inbound requests rejected before reaching a handler.
    pub dispatch_failures: u64,
    /// Responses delivered to a waiting caller.
    pub responses_matched: u64,
    /// Responses whose id matched no outstanding call.
    pub stale_responses: u64,
    /// Envelopes that were neither a request nor a response.
    pub malformed_dropped: u64,
}

impl ConnectionStats {
    pub(crate) fn request_dispatched(&self) {
        self.requests_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatch_failed(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn response_matched(&self) {
        self.responses_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed_dropped(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ConnectionStats::default();
        stats.request_dispatched();
        stats.request_dispatched();
        stats.stale_response();
        stats.malformed_dropped();

        let snap = stats.snapshot();
        assert_eq!(snap.requests_dispatched, 2);
        assert_eq!(snap.stale_responses, 1);
        assert_eq!(snap.malformed_dropped, 1);
        assert_eq!(snap.responses_matched, 0);
        assert_eq!(snap.dispatch_failures, 0);
    }
}
