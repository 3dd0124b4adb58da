//! In-process execution counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineStats {
    warm_hits: AtomicU64,
    cold_starts: AtomicU64,
    recycled: AtomicU64,
    destroyed: AtomicU64,
    successes: AtomicU64,
    execution_failures: AtomicU64,
    timeouts: AtomicU64,
    infra_failures: AtomicU64,
    sandboxed_runs: AtomicU64,
}

/// Point-in-time copy of `EngineStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub warm_hits: u64,
    pub cold_starts: u64,
    pub recycled: u64,
    pub destroyed: u64,
    pub successes: u64,
    pub execution_failures: u64,
    pub timeouts: u64,
    pub infra_failures: u64,
    pub sandboxed_runs: u64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_warm_hit(&self) {
        self.warm_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cold_start(&self) {
        self.cold_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recycled(&self) {
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_execution_failure(&self) {
        self.execution_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_infra_failure(&self) {
        self.infra_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sandboxed_run(&self) {
        self.sandboxed_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            warm_hits: self.warm_hits.load(Ordering::Relaxed),
            cold_starts: self.cold_starts.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            execution_failures: self.execution_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            infra_failures: self.infra_failures.load(Ordering::Relaxed),
            sandboxed_runs: self.sandboxed_runs.load(Ordering::Relaxed),
        }
    }
}
