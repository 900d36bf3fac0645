use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Point-in-time view of the scheduler's runtime metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Tasks a worker finished with, including skipped and failed ones.
    pub completed_tasks: u64,
    /// Tasks whose body returned an error or panicked.
    pub failed_tasks: u64,
    /// Tasks skipped because they were cancelled before execution.
    pub cancelled_tasks: u64,
    /// Workers currently holding a task.
    pub active_workers: usize,
    /// Ready-queue depth last observed by a worker.
    pub queue_depth: usize,
    pub min_execution_time_ms: f64,
    pub max_execution_time_ms: f64,
    pub avg_execution_time_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct ExecutionTimes {
    samples: u64,
    min_ms: f64,
    max_ms: f64,
    total_ms: f64,
}

impl Default for ExecutionTimes {
    fn default() -> Self {
        Self {
            samples: 0,
            min_ms: f64::INFINITY,
            max_ms: 0.0,
            total_ms: 0.0,
        }
    }
}

/// Concurrently updated counters and execution-time aggregates.
///
/// Counters are lock-free; only the min/max/total aggregates share a mutex.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    active_workers: AtomicUsize,
    queue_depth: AtomicUsize,
    times: Mutex<ExecutionTimes>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn times(&self) -> MutexGuard<'_, ExecutionTimes> {
        self.times.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a finished task and its execution time.
    pub fn record_completion(&self, duration_ms: f64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let mut times = self.times();
        times.samples += 1;
        times.total_ms += duration_ms;
        times.min_ms = times.min_ms.min(duration_ms);
        times.max_ms = times.max_ms.max(duration_ms);
    }

    /// Convenience wrapper over [`record_completion`](Self::record_completion).
    pub fn record_duration(&self, elapsed: Duration) {
        self.record_completion(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_worker_active(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero so a `reset` racing a busy worker cannot underflow.
    pub fn mark_worker_idle(&self) {
        let _ = self
            .active_workers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let completed_tasks = self.completed.load(Ordering::Relaxed);
        let failed_tasks = self.failed.load(Ordering::Relaxed);
        let cancelled_tasks = self.cancelled.load(Ordering::Relaxed);
        let active_workers = self.active_workers.load(Ordering::Relaxed);
        let queue_depth = self.queue_depth.load(Ordering::Relaxed);
        let times = *self.times();

        let (min, avg) = if times.samples == 0 {
            (0.0, 0.0)
        } else {
            (times.min_ms, times.total_ms / times.samples as f64)
        };

        MetricsSnapshot {
            completed_tasks,
            failed_tasks,
            cancelled_tasks,
            active_workers,
            queue_depth,
            min_execution_time_ms: min,
            max_execution_time_ms: times.max_ms,
            avg_execution_time_ms: avg,
        }
    }

    /// Zero every counter and aggregate. A recording racing the reset may be lost.
    pub fn reset(&self) {
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.cancelled.store(0, Ordering::Relaxed);
        self.active_workers.store(0, Ordering::Relaxed);
        self.queue_depth.store(0, Ordering::Relaxed);
        *self.times() = ExecutionTimes::default();
    }
}
