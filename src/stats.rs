use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Agent-wide request counters, shared across the request loop, the
/// sampler, and the beacon emitter via `Arc`.
pub struct Stats {
    pub requests_received: AtomicU64,
    pub requests_processed: AtomicU64,
    pub requests_rejected: AtomicU64,
    pub duplicates_suppressed: AtomicU64,
    pub errors: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub beacons_sent: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            requests_received: AtomicU64::new(0),
            requests_processed: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            duplicates_suppressed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            beacons_sent: AtomicU64::new(0),
        }
    }

    pub fn log_stats(&self) {
        info!(
            "stats: received={} processed={} rejected={} duplicates={} errors={} notifications={} beacons={}",
            self.requests_received.load(Ordering::Relaxed),
            self.requests_processed.load(Ordering::Relaxed),
            self.requests_rejected.load(Ordering::Relaxed),
            self.duplicates_suppressed.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.notifications_sent.load(Ordering::Relaxed),
            self.beacons_sent.load(Ordering::Relaxed),
        );
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::new();
        assert_eq!(stats.requests_received.load(Ordering::Relaxed), 0);
        stats.requests_received.fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.requests_received.load(Ordering::Relaxed), 1);
    }
}
