//! Dependency bookkeeping: identifier issue, predecessor counts and fan-out.
//!
//! All maps live in one [`GraphState`] behind a single mutex so that counts
//! and reverse edges are always updated together.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ordo_core::TaskId;

use crate::error::SchedulerError;
use crate::queue::ReadyQueue;
use crate::task::Task;

#[derive(Debug)]
struct PendingTask {
    task: Task,
    remaining: usize,
}

#[derive(Debug)]
struct GraphState {
    next_id: u64,
    /// Issued ids that have not reported completion yet.
    outstanding: HashSet<TaskId>,
    /// Tasks waiting on at least one predecessor.
    pending: HashMap<TaskId, PendingTask>,
    /// predecessor -> dependents awaiting it
    dependents: HashMap<TaskId, HashSet<TaskId>>,
}

impl GraphState {
    fn ready_ids(&self) -> Vec<TaskId> {
        self.pending
            .iter()
            .filter(|(_, p)| p.remaining == 0)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Default for GraphState {
    fn default() -> Self {
        Self {
            next_id: 1,
            outstanding: HashSet::new(),
            pending: HashMap::new(),
            dependents: HashMap::new(),
        }
    }
}

/// Tracks unsatisfied predecessors and turns completions into ready tasks.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    state: Mutex<GraphState>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue the next identifier to `task` and mark it outstanding.
    ///
    /// Every listed predecessor must be an identifier issued earlier, which
    /// also rules out cycles.
    pub fn assign_id(&self, task: &mut Task) -> Result<TaskId, SchedulerError> {
        let mut state = self.lock();
        if let Some(unknown) = task
            .predecessors()
            .iter()
            .copied()
            .find(|p| !p.is_assigned() || p.get() >= state.next_id)
        {
            return Err(SchedulerError::UnknownPredecessor(unknown));
        }
        let id = TaskId::new(state.next_id);
        state.next_id += 1;
        state.outstanding.insert(id);
        task.assign_id(id);
        Ok(id)
    }

    /// Hold a task until its predecessors complete.
    ///
    /// Predecessors that already completed count as satisfied, so a task
    /// registered after its last predecessor finished is returned by the next
    /// [`drain_ready`](Self::drain_ready). Tasks without predecessors are
    /// returned unchanged as `Err` for the caller to queue directly.
    pub fn register(&self, task: Task) -> Result<(), Task> {
        if !task.has_predecessors() {
            return Err(task);
        }
        let mut state = self.lock();
        let id = task.id();
        let mut remaining = 0;
        for pred in task.predecessors() {
            if !state.outstanding.contains(pred) {
                continue;
            }
            if state.dependents.entry(*pred).or_default().insert(id) {
                remaining += 1;
            }
        }
        state.pending.insert(id, PendingTask { task, remaining });
        Ok(())
    }

    /// Remove and return every pending task whose count reached zero.
    pub fn drain_ready(&self) -> Vec<Task> {
        let mut state = self.lock();
        let ready = state.ready_ids();
        ready
            .into_iter()
            .filter_map(|id| state.pending.remove(&id).map(|p| p.task))
            .collect()
    }

    /// Drain ready tasks straight into `queue` while holding the graph lock, so
    /// a task is always observable in exactly one of the two structures.
    /// Tasks the queue refuses (it was halted) are forgotten.
    pub fn release_into(&self, queue: &ReadyQueue) -> usize {
        let mut state = self.lock();
        let ready = state.ready_ids();
        let mut released = 0;
        for id in ready {
            let Some(pending) = state.pending.remove(&id) else {
                continue;
            };
            if queue.push_ready(pending.task) {
                released += 1;
            } else {
                state.outstanding.remove(&id);
            }
        }
        released
    }

    /// Record that `id` finished (or was skipped) and decrement its dependents.
    /// Call [`drain_ready`](Self::drain_ready) afterwards.
    pub fn complete(&self, id: TaskId) {
        let mut state = self.lock();
        state.outstanding.remove(&id);
        let Some(dependents) = state.dependents.remove(&id) else {
            return;
        };
        for dependent in dependents {
            if let Some(pending) = state.pending.get_mut(&dependent) {
                pending.remaining = pending.remaining.saturating_sub(1);
            }
        }
    }

    /// Flag a waiting task as cancelled. It still surfaces through
    /// `drain_ready` and must still be completed to release its dependents.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.cancel_or_else(id, |_| false)
    }

    /// Cancel `id` if it is waiting here, otherwise try `elsewhere` while the
    /// graph lock is still held (no task can move out of the graph meanwhile).
    pub fn cancel_or_else(&self, id: TaskId, elsewhere: impl FnOnce(TaskId) -> bool) -> bool {
        let state = self.lock();
        match state.pending.get(&id) {
            Some(pending) => {
                pending.task.cancel();
                true
            }
            None => elsewhere(id),
        }
    }

    /// Drop every waiting task and forget the given ids (tasks discarded
    /// elsewhere). Returns the discarded waiting tasks.
    pub fn discard_pending(&self, forgotten: impl IntoIterator<Item = TaskId>) -> Vec<Task> {
        let mut state = self.lock();
        let discarded: Vec<Task> = state.pending.drain().map(|(_, p)| p.task).collect();
        for task in &discarded {
            state.outstanding.remove(&task.id());
        }
        for id in forgotten {
            state.outstanding.remove(&id);
        }
        // Every dependent edge pointed at a task that is now gone.
        state.dependents.clear();
        discarded
    }

    /// Number of tasks waiting on predecessors.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Whether `id` was issued and has not completed.
    #[cfg(test)]
    pub(crate) fn is_outstanding(&self, id: TaskId) -> bool {
        self.lock().outstanding.contains(&id)
    }
}
