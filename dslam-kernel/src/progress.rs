use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::store::rounded_percent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub phase: String,
    pub processed: usize,
    pub total: usize,
    pub reachable: usize,
    pub batches: usize,
    pub failures: usize,
    pub elapsed_secs: u64,
}

impl ProgressSnapshot {
    pub fn percent_done(&self) -> u8 {
        rounded_percent(self.processed, self.total)
    }

    pub fn reachable_rate(&self) -> u8 {
        rounded_percent(self.reachable, self.processed)
    }
}

/// Compteurs de progression partagés d'un run
#[derive(Clone)]
pub struct ProgressTracker {
    start_time: Arc<Mutex<Instant>>,
    processed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    reachable: Arc<AtomicUsize>,
    batches: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    phase: Arc<Mutex<String>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Arc::new(Mutex::new(Instant::now())),
            processed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(0)),
            reachable: Arc::new(AtomicUsize::new(0)),
            batches: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
            phase: Arc::new(Mutex::new("idle".to_string())),
        }
    }

    pub fn set_phase(&self, phase: &str) {
        *self.phase.lock() = phase.to_string();
    }

    /// Remet les compteurs à zéro pour une nouvelle passe sur `total` DSLAM
    pub fn start(&self, phase: &str, total: usize) {
        self.set_phase(phase);
        *self.start_time.lock() = Instant::now();
        self.total.store(total, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.reachable.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn record_batch(&self, processed: usize, reachable: usize, failures: usize) {
        self.processed.fetch_add(processed, Ordering::Relaxed);
        self.reachable.fetch_add(reachable, Ordering::Relaxed);
        self.failures.fetch_add(failures, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase.lock().clone(),
            processed: self.processed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            reachable: self.reachable.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed_secs: self.start_time.lock().elapsed().as_secs(),
        }
    }

    pub fn log_snapshot(&self) {
        let snap = self.snapshot();
        info!(
            "[{}] batch {}: {}/{} tested ({}%), reachable {}/{} ({}%), failures {}",
            snap.phase,
            snap.batches,
            snap.processed,
            snap.total,
            snap.percent_done(),
            snap.reachable,
            snap.processed,
            snap.reachable_rate(),
            snap.failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_accumulate_until_restart() {
        let tracker = ProgressTracker::new();
        tracker.start("connectivity", 20);
        tracker.record_batch(8, 3, 1);
        tracker.clone().record_batch(8, 5, 0);

        let snap = tracker.snapshot();
        assert_eq!(snap.phase, "connectivity");
        assert_eq!(snap.processed, 16);
        assert_eq!(snap.reachable, 8);
        assert_eq!(snap.batches, 2);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.percent_done(), 80);
        assert_eq!(snap.reachable_rate(), 50);

        tracker.start("retest", 5);
        let snap = tracker.snapshot();
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.total, 5);
    }
}
