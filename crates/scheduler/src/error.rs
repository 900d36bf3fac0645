use ordo_core::TaskId;
use thiserror::Error;

/// Errors surfaced by the scheduler's call surface.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is shutting down, submission rejected")]
    ShuttingDown,

    #[error("scheduler is stopped, submission rejected")]
    Stopped,

    #[error("unknown predecessor {0}")]
    UnknownPredecessor(TaskId),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
