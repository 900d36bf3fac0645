//! Thread-safe ready queue ordered by deadline, priority, then submission order.
//!
//! Entries carrying a deadline always pop before entries without one. Among
//! deadline-bearing entries the earliest deadline wins; ties (and the
//! no-deadline class) are broken by priority, then FIFO by sequence number.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use ordo_core::TaskId;

use crate::task::Task;

/// A queued task plus the sequence number used as the final tie-break.
#[derive(Debug)]
struct QueueEntry {
    seq: u64,
    task: Task,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `BinaryHeap` is a max-heap: `Greater` pops first.
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_deadline = match (self.task.deadline(), other.task.deadline()) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        by_deadline
            .then_with(|| self.task.priority().cmp(&other.task.priority()))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
    /// Popped but not yet acknowledged through `task_done`.
    in_flight: usize,
    /// No external pushes accepted.
    closed: bool,
    /// Pops return `None` immediately; nothing is accepted.
    halted: bool,
}

impl QueueState {
    fn insert(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry { seq, task });
    }

    fn drained(&self) -> bool {
        self.closed && self.heap.is_empty() && self.in_flight == 0
    }
}

/// Blocking priority queue shared by the scheduler and its workers.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a newly submitted task. Returns `false` (dropping the task) once
    /// the queue is closed.
    pub fn push(&self, task: Task) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.insert(task);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Enqueue a task released by the dependency graph. Accepted after `close`
    /// so that a graceful drain still runs dependents; rejected after `halt`.
    pub fn push_ready(&self, task: Task) -> bool {
        let mut state = self.lock();
        if state.halted {
            return false;
        }
        state.insert(task);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Block until a task is available and return the highest-ordered one.
    ///
    /// Returns `None` once the queue is closed, empty and no popped task is
    /// still in flight (an in-flight task may release dependents), or as soon
    /// as the queue is halted. Every `Some` must be paired with `task_done`.
    pub fn pop(&self) -> Option<Task> {
        let mut state = self.lock();
        loop {
            if state.halted {
                return None;
            }
            if let Some(entry) = state.heap.pop() {
                state.in_flight += 1;
                return Some(entry.task);
            }
            if state.drained() {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking variant of [`pop`](Self::pop).
    #[cfg(test)]
    pub(crate) fn try_pop(&self) -> Option<Task> {
        let mut state = self.lock();
        if state.halted {
            return None;
        }
        let entry = state.heap.pop()?;
        state.in_flight += 1;
        Some(entry.task)
    }

    /// Acknowledge a task returned by `pop`, after any dependents it released
    /// have been pushed.
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let wake_all = state.drained();
        drop(state);
        if wake_all {
            self.available.notify_all();
        }
    }

    pub fn size(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Popped tasks not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Stop accepting submissions. Idempotent; wakes every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close the queue, make every pop return `None` immediately, and hand back
    /// the tasks that were still queued.
    pub fn halt(&self) -> Vec<Task> {
        let mut state = self.lock();
        state.closed = true;
        state.halted = true;
        let discarded = std::mem::take(&mut state.heap)
            .into_iter()
            .map(|entry| entry.task)
            .collect();
        drop(state);
        self.available.notify_all();
        discarded
    }

    #[cfg(test)]
    pub(crate) fn is_halted(&self) -> bool {
        self.lock().halted
    }

    /// Accept work again after `close` or `halt`. Sequence numbers keep
    /// increasing across reopenings.
    pub fn reopen(&self) {
        let mut state = self.lock();
        state.closed = false;
        state.halted = false;
    }

    /// Flag a queued task as cancelled. Returns `true` if the task is queued;
    /// it stays in the queue and is skipped by the worker that pops it.
    pub fn cancel(&self, id: TaskId) -> bool {
        let state = self.lock();
        match state.heap.iter().find(|entry| entry.task.id() == id) {
            Some(entry) => {
                entry.task.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use ordo_core::Priority;

    use super::*;

    fn task(id: u64, priority: Priority) -> Task {
        let mut t = Task::new(|| {}).with_priority(priority);
        t.assign_id(TaskId::new(id));
        t
    }

    fn drain_ids(queue: &ReadyQueue) -> Vec<u64> {
        let mut ids = Vec::new();
        while let Some(t) = queue.try_pop() {
            ids.push(t.id().get());
            queue.task_done();
        }
        ids
    }

    #[test]
    fn push_and_pop() {
        let queue = ReadyQueue::new();
        assert!(queue.push(task(1, Priority::Normal)));
        assert_eq!(queue.size(), 1);
        let popped = queue.pop().unwrap();
        assert_eq!(popped.id(), TaskId::new(1));
        assert!(queue.is_empty());
        assert_eq!(queue.in_flight(), 1);
        queue.task_done();
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn priority_order() {
        let queue = ReadyQueue::new();
        queue.push(task(1, Priority::Normal));
        queue.push(task(2, Priority::High));
        queue.push(task(3, Priority::Low));
        queue.push(task(4, Priority::Critical));
        assert_eq!(drain_ids(&queue), vec![4, 2, 1, 3]);
    }

    #[test]
    fn fifo_within_equal_priority() {
        let queue = ReadyQueue::new();
        for id in 1..=3 {
            queue.push(task(id, Priority::Normal));
        }
        assert_eq!(drain_ids(&queue), vec![1, 2, 3]);
    }

    #[test]
    fn earlier_deadline_first() {
        let now = Instant::now();
        let queue = ReadyQueue::new();
        queue.push(task(1, Priority::Normal).with_deadline(now + Duration::from_millis(100)));
        queue.push(task(2, Priority::Normal).with_deadline(now + Duration::from_millis(300)));
        queue.push(task(3, Priority::Normal).with_deadline(now + Duration::from_millis(200)));
        assert_eq!(drain_ids(&queue), vec![1, 3, 2]);
    }

    #[test]
    fn deadline_beats_priority() {
        let now = Instant::now();
        let queue = ReadyQueue::new();
        queue.push(task(1, Priority::Critical));
        queue.push(task(2, Priority::Low).with_deadline(now + Duration::from_secs(60)));
        queue.push(task(3, Priority::Critical).with_deadline(now + Duration::from_secs(120)));
        assert_eq!(drain_ids(&queue), vec![2, 3, 1]);
    }

    #[test]
    fn equal_deadline_falls_back_to_priority_then_fifo() {
        let deadline = Instant::now() + Duration::from_millis(500);
        let queue = ReadyQueue::new();
        queue.push(task(1, Priority::Normal).with_deadline(deadline));
        queue.push(task(2, Priority::High).with_deadline(deadline));
        queue.push(task(3, Priority::Normal).with_deadline(deadline));
        assert_eq!(drain_ids(&queue), vec![2, 1, 3]);
    }

    #[test]
    fn closed_queue_rejects_push_but_accepts_released() {
        let queue = ReadyQueue::new();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert!(!queue.push(task(1, Priority::Normal)));
        assert!(queue.push_ready(task(2, Priority::Normal)));
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn pop_returns_none_when_closed_and_drained() {
        let queue = ReadyQueue::new();
        queue.push(task(1, Priority::Normal));
        queue.close();
        assert!(queue.pop().is_some());
        queue.task_done();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn close_wakes_blocked_pop() {
        let queue = Arc::new(ReadyQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().is_none())
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn push_wakes_blocked_pop() {
        let queue = Arc::new(ReadyQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().map(|t| t.id()))
        };
        thread::sleep(Duration::from_millis(50));
        queue.push(task(9, Priority::Low));
        assert_eq!(waiter.join().unwrap(), Some(TaskId::new(9)));
    }

    #[test]
    fn closed_pop_waits_for_in_flight_releases() {
        let queue = Arc::new(ReadyQueue::new());
        queue.push(task(1, Priority::Normal));
        queue.close();
        let first = queue.pop().unwrap();

        // A second worker must not give up while the first one is still running.
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().map(|t| t.id()))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(queue.push_ready(task(2, Priority::Normal)));
        drop(first);
        queue.task_done();

        assert_eq!(waiter.join().unwrap(), Some(TaskId::new(2)));
        queue.task_done();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn halt_discards_and_unblocks() {
        let queue = ReadyQueue::new();
        queue.push(task(1, Priority::Normal));
        queue.push(task(2, Priority::Normal));
        let discarded = queue.halt();
        assert_eq!(discarded.len(), 2);
        assert!(queue.is_halted());
        assert!(queue.pop().is_none());
        assert!(!queue.push_ready(task(3, Priority::Normal)));
    }

    #[test]
    fn reopen_after_close() {
        let queue = ReadyQueue::new();
        queue.halt();
        queue.reopen();
        assert!(!queue.is_closed());
        assert!(queue.push(task(1, Priority::Normal)));
        assert_eq!(drain_ids(&queue), vec![1]);
    }

    #[test]
    fn cancel_flags_queued_task() {
        let queue = ReadyQueue::new();
        queue.push(task(1, Priority::Normal));
        assert!(queue.cancel(TaskId::new(1)));
        assert!(!queue.cancel(TaskId::new(42)));
        let popped = queue.pop().unwrap();
        assert!(popped.is_cancelled());
    }
}
