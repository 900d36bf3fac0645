use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ordo_core::{Priority, TaskId};

/// Error type for task execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),
    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// A unit of work that a worker runs at most once.
///
/// Closures are wrapped through [`Task::new`] and [`Task::fallible`]; implement
/// this trait directly when the work carries its own state or name.
pub trait Work: Send + 'static {
    /// Execute the work, consuming it.
    fn run(self: Box<Self>) -> Result<(), TaskError>;

    /// Human-readable name for logging and failure reports.
    fn name(&self) -> &str {
        "task"
    }
}

struct Infallible<F>(F);

impl<F> Work for Infallible<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) -> Result<(), TaskError> {
        (self.0)();
        Ok(())
    }
}

struct Fallible<F>(F);

impl<F> Work for Fallible<F>
where
    F: FnOnce() -> Result<(), TaskError> + Send + 'static,
{
    fn run(self: Box<Self>) -> Result<(), TaskError> {
        (self.0)()
    }
}

/// A task body failure, reported to the scheduler's failure hook.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub id: TaskId,
    pub name: String,
    pub error: TaskError,
}

/// A submitted unit of work plus its scheduling attributes.
///
/// A `Task` is moved, never shared, from the caller into the dependency graph
/// or ready queue and finally into exactly one worker.
pub struct Task {
    id: TaskId,
    name: Option<String>,
    priority: Priority,
    deadline: Option<Instant>,
    predecessors: Vec<TaskId>,
    cancelled: AtomicBool,
    work: Box<dyn Work>,
}

impl Task {
    /// Wrap a closure that cannot fail.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_boxed(Box::new(Infallible(f)))
    }

    /// Wrap a closure returning `Result<(), TaskError>`.
    pub fn fallible<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        Self::from_boxed(Box::new(Fallible(f)))
    }

    pub fn from_work(work: impl Work) -> Self {
        Self::from_boxed(Box::new(work))
    }

    fn from_boxed(work: Box<dyn Work>) -> Self {
        Self {
            id: TaskId::UNASSIGNED,
            name: None,
            priority: Priority::Normal,
            deadline: None,
            predecessors: Vec::new(),
            cancelled: AtomicBool::new(false),
            work,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Absolute deadline on the monotonic clock.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tasks that must complete before this one becomes ready.
    pub fn after(mut self, predecessors: impl IntoIterator<Item = TaskId>) -> Self {
        self.predecessors.extend(predecessors);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.work.name())
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn predecessors(&self) -> &[TaskId] {
        &self.predecessors
    }

    pub fn has_predecessors(&self) -> bool {
        !self.predecessors.is_empty()
    }

    /// Flag the task so that a worker skips its body. Returns `false` if it was
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Assign the identifier. Only the scheduler calls this, once, on submit.
    pub(crate) fn assign_id(&mut self, id: TaskId) {
        debug_assert!(!self.id.is_assigned(), "task id assigned twice");
        self.id = id;
    }

    /// Consume the task and run its body.
    pub(crate) fn execute(self) -> Result<(), TaskError> {
        self.work.run()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("priority", &self.priority)
            .field("deadline", &self.deadline)
            .field("predecessors", &self.predecessors)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
