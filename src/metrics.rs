use std::sync::atomic::{AtomicU64, Ordering};

/// Per-node activity counters.
///
/// Every pipeline node carries one of these; the counters are updated with
/// relaxed atomics on the hot path and read through [`snapshot`].
///
/// [`snapshot`]: NodeMetrics::snapshot
#[derive(Debug, Default)]
pub struct NodeMetrics {
    /// Values accepted by the sender surface
    enqueued: AtomicU64,
    /// Values consumed by the process
    processed: AtomicU64,
    /// Values broadcast to downstream stages
    broadcasts: AtomicU64,
    /// Scheduler steps entered
    steps: AtomicU64,
}

impl NodeMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the current counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            steps: self.steps.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of a node's counters at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub processed: u64,
    pub broadcasts: u64,
    pub steps: u64,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Enqueued: {}, Processed: {}, Broadcasts: {}, Steps: {}",
            self.enqueued, self.processed, self.broadcasts, self.steps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = NodeMetrics::new();
        for _ in 0..10 {
            metrics.record_enqueued();
        }
        metrics.record_processed();
        metrics.record_step();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.enqueued, 10);
        assert_eq!(snapshot.processed, 1);
        assert_eq!(snapshot.broadcasts, 0);
        assert_eq!(snapshot.steps, 1);
    }

    #[test]
    fn test_snapshot_format() {
        let metrics = NodeMetrics::new();
        metrics.record_enqueued();
        let text = metrics.snapshot().format();
        assert!(text.contains("Enqueued: 1"));
    }
}
