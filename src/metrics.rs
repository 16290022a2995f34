use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing import activity.
#[derive(Default)]
pub struct ImportMetrics {
    batches_started: AtomicU64,
    batches_completed: AtomicU64,
    notes_imported: AtomicU64,
    engine_errors: AtomicU64,
    jobs_failed: AtomicU64,
    files_discarded: AtomicU64,
}

impl ImportMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched batch and the number of exclusive files dropped while admitting it.
    pub fn record_batch_started(&self, discarded: u64) {
        self.batches_started.fetch_add(1, Ordering::Relaxed);
        self.files_discarded.fetch_add(discarded, Ordering::Relaxed);
    }

    /// Record a batch that reached its terminal completion event.
    pub fn record_batch_completed(&self, notes_imported: u64, jobs_failed: u64) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
        self.notes_imported
            .fetch_add(notes_imported, Ordering::Relaxed);
        self.jobs_failed.fetch_add(jobs_failed, Ordering::Relaxed);
    }

    /// Record an error event forwarded from an engine.
    pub fn record_engine_error(&self) {
        self.engine_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_started: self.batches_started.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            notes_imported: self.notes_imported.load(Ordering::Relaxed),
            engine_errors: self.engine_errors.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            files_discarded: self.files_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of import counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Batches dispatched since startup.
    pub batches_started: u64,
    /// Batches that emitted their terminal completion event.
    pub batches_completed: u64,
    /// Notes imported across all completed batches.
    pub notes_imported: u64,
    /// Error events forwarded from engines.
    pub engine_errors: u64,
    /// Jobs that terminated without reporting completion.
    pub jobs_failed: u64,
    /// Extra exclusive-format files dropped during admission.
    pub files_discarded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_batches_and_notes() {
        let metrics = ImportMetrics::new();
        metrics.record_batch_started(1);
        metrics.record_batch_completed(4, 0);
        metrics.record_batch_started(0);
        metrics.record_batch_completed(3, 1);
        metrics.record_engine_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_started, 2);
        assert_eq!(snapshot.batches_completed, 2);
        assert_eq!(snapshot.notes_imported, 7);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.engine_errors, 1);
        assert_eq!(snapshot.files_discarded, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(ImportMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
