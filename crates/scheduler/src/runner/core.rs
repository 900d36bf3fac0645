use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{JoinHandle, ThreadId};

use ordo_core::SchedulerConfig;

use crate::graph::DependencyGraph;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::queue::ReadyQueue;
use crate::task::TaskFailure;

/// Callback invoked on the worker thread when a task body fails or panics.
pub type FailureHook = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// Lifecycle of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Constructed, no threads yet.
    Created,
    Running,
    /// Draining every queued and waiting task before exiting.
    GracefullyStopping,
    /// Finishing only the tasks already handed to workers.
    ImmediatelyStopping,
    /// All workers joined. `start()` may run the pool again.
    Stopped,
}

/// State shared between the scheduler handle and its worker threads.
pub(super) struct Shared {
    pub(super) queue: ReadyQueue,
    pub(super) graph: DependencyGraph,
    pub(super) metrics: MetricsCollector,
    pub(super) on_failure: Option<FailureHook>,
}

/// Worker thread handles, including those a shutdown call is joining right now.
#[derive(Debug, Default)]
pub(super) struct WorkerSet {
    pub(super) handles: Vec<JoinHandle<()>>,
    /// Threads taken out of `handles` by the shutdown call joining them.
    pub(super) joining: Vec<ThreadId>,
}

impl WorkerSet {
    pub(super) fn live(&self) -> usize {
        self.handles.len() + self.joining.len()
    }

    pub(super) fn contains(&self, thread: ThreadId) -> bool {
        self.joining.contains(&thread) || self.handles.iter().any(|h| h.thread().id() == thread)
    }
}

/// A fixed-size pool of worker threads executing [`Task`](crate::Task)s in
/// deadline/priority order while respecting their dependencies.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) worker_threads: usize,
    pub(super) shared: Arc<Shared>,
    pub(super) lifecycle: RwLock<PoolState>,
    pub(super) workers: Mutex<WorkerSet>,
    /// Signalled when a shutdown call has joined every worker.
    pub(super) workers_exited: Condvar,
}

impl Scheduler {
    /// Create a pool with `worker_threads` workers (0 = available parallelism).
    pub fn new(worker_threads: usize) -> Self {
        SchedulerBuilder::new().worker_threads(worker_threads).build()
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        SchedulerBuilder::new().config(config).build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(super) fn read_state(&self) -> RwLockReadGuard<'_, PoolState> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn write_state(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.lifecycle.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn lock_workers(&self) -> MutexGuard<'_, WorkerSet> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PoolState {
        *self.read_state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PoolState::Running
    }

    /// Live worker threads (0 before `start` and after shutdown).
    pub fn worker_count(&self) -> usize {
        self.lock_workers().live()
    }

    /// Worker threads spawned by each `start`.
    pub fn configured_workers(&self) -> usize {
        self.worker_threads
    }

    /// Tasks not yet handed to a worker: ready plus waiting on predecessors.
    pub fn pending_count(&self) -> usize {
        self.ready_count() + self.waiting_count()
    }

    /// Tasks in the ready queue.
    pub fn ready_count(&self) -> usize {
        self.shared.queue.size()
    }

    /// Tasks held back by unfinished predecessors.
    pub fn waiting_count(&self) -> usize {
        self.shared.graph.pending_len()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.shared.metrics.reset();
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("worker_threads", &self.worker_threads)
            .field("ready", &self.ready_count())
            .field("in_flight", &self.shared.queue.in_flight())
            .field("waiting", &self.waiting_count())
            .finish()
    }
}

// ── SchedulerBuilder ─────────────────────────────────────────────────

/// Fluent builder for a [`Scheduler`].
///
/// # Example
/// ```
/// use ordo_scheduler::Scheduler;
///
/// let scheduler = Scheduler::builder()
///     .worker_threads(2)
///     .thread_name_prefix("io")
///     .on_task_failure(|failure| eprintln!("{} failed: {}", failure.id, failure.error))
///     .build();
/// scheduler.submit_fn(|| println!("hello")).unwrap();
/// scheduler.shutdown_graceful();
/// ```
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    on_failure: Option<FailureHook>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting with `config`.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Start the pool on the first `submit` (default: true).
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.config.auto_start = enabled;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Register a hook receiving every task body failure.
    pub fn on_task_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Scheduler {
        let worker_threads = self.config.resolved_worker_threads();
        Scheduler {
            config: self.config,
            worker_threads,
            shared: Arc::new(Shared {
                queue: ReadyQueue::new(),
                graph: DependencyGraph::new(),
                metrics: MetricsCollector::new(),
                on_failure: self.on_failure,
            }),
            lifecycle: RwLock::new(PoolState::Created),
            workers: Mutex::new(WorkerSet::default()),
            workers_exited: Condvar::new(),
        }
    }
}
