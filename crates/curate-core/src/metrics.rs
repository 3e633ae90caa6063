//! Global atomic counters for curation runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (end of a CLI run, daemon tick).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    tasks_performed: AtomicU64,
    objects_visited: AtomicU64,
    walks_suspended: AtomicU64,
    commits: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tasks_performed: AtomicU64::new(0),
            objects_visited: AtomicU64::new(0),
            walks_suspended: AtomicU64::new(0),
            commits: AtomicU64::new(0),
        }
    }

    pub fn inc_tasks_performed(&self) {
        self.tasks_performed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tasks_performed", "counter incremented");
    }

    pub fn inc_objects_visited(&self) {
        self.objects_visited.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "objects_visited", "counter incremented");
    }

    pub fn inc_walks_suspended(&self) {
        self.walks_suspended.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "walks_suspended", "counter incremented");
    }

    pub fn inc_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "commits", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            tasks_performed = self.tasks_performed(),
            objects_visited = self.objects_visited(),
            walks_suspended = self.walks_suspended(),
            commits = self.commits(),
        );
    }

    pub fn tasks_performed(&self) -> u64 {
        self.tasks_performed.load(Ordering::Relaxed)
    }

    pub fn objects_visited(&self) -> u64 {
        self.objects_visited.load(Ordering::Relaxed)
    }

    pub fn walks_suspended(&self) -> u64 {
        self.walks_suspended.load(Ordering::Relaxed)
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.tasks_performed.store(0, Ordering::Relaxed);
        self.objects_visited.store(0, Ordering::Relaxed);
        self.walks_suspended.store(0, Ordering::Relaxed);
        self.commits.store(0, Ordering::Relaxed);
    }
}
