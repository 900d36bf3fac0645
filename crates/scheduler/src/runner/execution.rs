use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::task::{Task, TaskError, TaskFailure};

use super::core::Shared;

/// Body of every worker thread. Returns once the queue is closed and drained,
/// or as soon as it is halted.
pub(super) fn worker_loop(shared: Arc<Shared>, index: usize) {
    debug!(worker = index, "worker started");

    loop {
        shared.metrics.set_queue_depth(shared.queue.size());

        let Some(task) = shared.queue.pop() else {
            break;
        };
        shared.metrics.mark_worker_active();

        let id = task.id();
        let elapsed = if task.is_cancelled() {
            debug!(worker = index, task = %id, "skipping cancelled task");
            shared.metrics.record_cancelled();
            Duration::ZERO
        } else {
            run_task(&shared, task)
        };

        // Dependents are released even when the task was skipped or failed.
        shared.graph.complete(id);
        let released = shared.graph.release_into(&shared.queue);
        if released > 0 {
            debug!(task = %id, released, "dependents released");
        }
        shared.queue.task_done();

        shared.metrics.record_duration(elapsed);
        shared.metrics.mark_worker_idle();
    }

    debug!(worker = index, "worker exiting");
}

/// Run one task body behind a panic boundary and report any failure.
fn run_task(shared: &Shared, task: Task) -> Duration {
    let id = task.id();
    let name = task.name().to_string();

    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || task.execute()));
    let elapsed = started.elapsed();

    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    };

    match result {
        Ok(()) => {
            debug!(
                task = %id,
                name = %name,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "task completed"
            );
        }
        Err(error) => {
            warn!(task = %id, name = %name, error = %error, "task failed");
            shared.metrics.record_failure();
            if let Some(hook) = &shared.on_failure {
                let failure = TaskFailure { id, name, error };
                if panic::catch_unwind(AssertUnwindSafe(|| (**hook)(&failure))).is_err() {
                    error!(task = %id, "task failure hook panicked");
                }
            }
        }
    }

    elapsed
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
