use std::sync::RwLockReadGuard;

use ordo_core::TaskId;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::task::Task;

use super::core::{PoolState, Scheduler};

impl Scheduler {
    /// Submit a task and return its identifier without waiting for it to run.
    ///
    /// Starts a never-started pool when `auto_start` is enabled. Tasks without
    /// predecessors go straight to the ready queue; the rest wait in the
    /// dependency graph until every predecessor has completed.
    pub fn submit(&self, mut task: Task) -> Result<TaskId, SchedulerError> {
        let _accepting = self.accepting()?;

        let id = self.shared.graph.assign_id(&mut task)?;
        debug!(
            task = %id,
            name = task.name(),
            priority = %task.priority(),
            predecessors = task.predecessors().len(),
            "task submitted"
        );

        match self.shared.graph.register(task) {
            Ok(()) => {
                // Predecessors may all have finished already.
                let released = self.shared.graph.release_into(&self.shared.queue);
                if released > 0 {
                    debug!(task = %id, released, "dependencies already satisfied");
                }
            }
            Err(task) => {
                if !self.shared.queue.push(task) {
                    self.shared.graph.complete(id);
                    warn!(task = %id, "ready queue closed, submission rejected");
                    return Err(SchedulerError::ShuttingDown);
                }
            }
        }
        self.shared.metrics.set_queue_depth(self.shared.queue.size());
        Ok(id)
    }

    /// Submit a closure at normal priority with no dependencies.
    pub fn submit_fn<F>(&self, f: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(f))
    }

    /// Cancel a task that no worker has picked up yet.
    ///
    /// Returns `false` for unknown ids and for tasks already running or done.
    /// A cancelled task still counts as completed for its dependents.
    pub fn cancel(&self, id: TaskId) -> bool {
        let shared = &self.shared;
        let cancelled = shared.graph.cancel_or_else(id, |id| shared.queue.cancel(id));
        debug!(task = %id, cancelled, "cancel requested");
        cancelled
    }

    /// Hold the lifecycle read lock for the duration of a submission so a
    /// concurrent shutdown cannot close the queue halfway through it.
    fn accepting(&self) -> Result<RwLockReadGuard<'_, PoolState>, SchedulerError> {
        loop {
            let state = self.read_state();
            let current = *state;
            match current {
                PoolState::Running => return Ok(state),
                PoolState::Created if !self.config.auto_start => return Ok(state),
                PoolState::Created => {
                    drop(state);
                    self.start()?;
                }
                PoolState::GracefullyStopping | PoolState::ImmediatelyStopping => {
                    warn!("submission rejected, scheduler is shutting down");
                    return Err(SchedulerError::ShuttingDown);
                }
                PoolState::Stopped => {
                    warn!("submission rejected, scheduler is stopped");
                    return Err(SchedulerError::Stopped);
                }
            }
        }
    }
}
