//! ---
//! snet_section: "04-client-session"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Connection session, receive loop and worker pool."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the session counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionMetrics {
    /// Messages written to the broker.
    pub sent: u64,
    /// Frames read from the broker, routable or not.
    pub received: u64,
    /// Routable messages that were discarded (bad fields or failed writes).
    pub dropped: u64,
    /// Frames whose `type` was missing or unknown.
    pub unroutable: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    unroutable: AtomicU64,
}

impl Counters {
    pub(crate) fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SessionMetrics {
        SessionMetrics {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
        }
    }
}
