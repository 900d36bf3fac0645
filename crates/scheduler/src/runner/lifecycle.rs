use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;

use super::core::{PoolState, Scheduler};
use super::execution::worker_loop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownMode {
    Graceful,
    Immediate,
}

impl Scheduler {
    /// Spawn the worker threads. No-op when already running.
    ///
    /// A stopped pool is reopened and gets a fresh set of workers. Fails with
    /// [`SchedulerError::ShuttingDown`] while a shutdown is in progress.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.write_state();
        let current = *state;
        match current {
            PoolState::Running => return Ok(()),
            PoolState::GracefullyStopping | PoolState::ImmediatelyStopping => {
                return Err(SchedulerError::ShuttingDown);
            }
            PoolState::Stopped => self.shared.queue.reopen(),
            PoolState::Created => {}
        }

        let mut workers = self.lock_workers();
        for index in 0..self.worker_threads {
            match self.spawn_worker(index) {
                Ok(handle) => workers.handles.push(handle),
                Err(e) => {
                    error!(worker = index, error = %e, "failed to spawn worker, aborting start");
                    self.shared.queue.close();
                    let spawned = std::mem::take(&mut workers.handles);
                    drop(workers);
                    join_all(spawned);
                    *state = PoolState::Stopped;
                    return Err(SchedulerError::Spawn(e));
                }
            }
        }
        *state = PoolState::Running;

        info!(
            "Scheduler started with {} workers ({} tasks already queued)",
            self.worker_threads,
            self.shared.queue.size()
        );
        Ok(())
    }

    fn spawn_worker(&self, index: usize) -> std::io::Result<JoinHandle<()>> {
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.thread_name_prefix, index));
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }
        let shared = Arc::clone(&self.shared);
        builder.spawn(move || worker_loop(shared, index))
    }

    /// Stop accepting submissions and run every queued and waiting task to
    /// completion, then join the workers. Idempotent.
    ///
    /// A pool that was never started is started first when it holds accepted
    /// tasks, so that they still run.
    pub fn shutdown_graceful(&self) {
        self.shutdown(ShutdownMode::Graceful);
    }

    /// Stop accepting submissions, discard every task no worker has started,
    /// and join the workers once their current task returns. Idempotent.
    pub fn shutdown_immediate(&self) {
        self.shutdown(ShutdownMode::Immediate);
    }

    /// Blocks until every worker has exited, also when another call already
    /// started the shutdown. Returns early only on a worker thread.
    fn shutdown(&self, mode: ShutdownMode) {
        loop {
            let mut state = self.write_state();
            let current = *state;
            match current {
                PoolState::Running => {
                    self.begin_shutdown(&mut state, mode);
                    break;
                }
                PoolState::GracefullyStopping | PoolState::ImmediatelyStopping => {
                    debug!(?mode, state = ?current, "shutdown already in progress");
                    break;
                }
                PoolState::Stopped => return,
                PoolState::Created => {
                    let unstarted = self.pending_count();
                    if mode == ShutdownMode::Graceful && unstarted > 0 {
                        debug!(unstarted, "starting never-started pool to drain accepted tasks");
                        drop(state);
                        if let Err(e) = self.start() {
                            error!(
                                error = %e,
                                unstarted,
                                "could not start workers to drain accepted tasks"
                            );
                            return;
                        }
                        continue;
                    }
                    match mode {
                        ShutdownMode::Graceful => self.shared.queue.close(),
                        ShutdownMode::Immediate => self.discard_unstarted(),
                    }
                    *state = PoolState::Stopped;
                    info!("Scheduler stopped before start");
                    return;
                }
            }
        }
        self.join_workers();
    }

    fn begin_shutdown(&self, state: &mut PoolState, mode: ShutdownMode) {
        match mode {
            ShutdownMode::Graceful => {
                info!(
                    "Scheduler graceful shutdown requested ({} ready, {} waiting)",
                    self.shared.queue.size(),
                    self.shared.graph.pending_len()
                );
                *state = PoolState::GracefullyStopping;
                self.shared.queue.close();
            }
            ShutdownMode::Immediate => {
                info!("Scheduler immediate shutdown requested");
                *state = PoolState::ImmediatelyStopping;
                self.discard_unstarted();
            }
        }
    }

    /// Halt the queue and drop every task that has not reached a worker.
    fn discard_unstarted(&self) {
        let dropped = self.shared.queue.halt();
        let dropped_ids: Vec<_> = dropped.iter().map(|t| t.id()).collect();
        let waiting = self.shared.graph.discard_pending(dropped_ids);
        if !dropped.is_empty() || !waiting.is_empty() {
            warn!(
                ready = dropped.len(),
                waiting = waiting.len(),
                "discarded tasks that had not started"
            );
        }
    }

    /// Join the workers, or wait for the call that is already joining them.
    fn join_workers(&self) {
        let this_thread = thread::current().id();
        let mut workers = self.lock_workers();
        if workers.contains(this_thread) {
            // Joining here would wait on this very task; the workers exit
            // on their own and a later call from outside the pool joins them.
            debug!("shutdown requested from a worker thread, not waiting");
            return;
        }
        if workers.handles.is_empty() {
            if !workers.joining.is_empty() {
                debug!("workers are being joined by another shutdown call, waiting");
                let _joined = self
                    .workers_exited
                    .wait_while(workers, |w| !w.joining.is_empty())
                    .unwrap_or_else(PoisonError::into_inner);
            }
            return;
        }
        let handles = std::mem::take(&mut workers.handles);
        workers.joining = handles.iter().map(|h| h.thread().id()).collect();
        drop(workers);

        join_all(handles);

        if self.shared.graph.has_pending_tasks() {
            warn!(
                waiting = self.shared.graph.pending_len(),
                "workers stopped with tasks still waiting on predecessors"
            );
        }
        *self.write_state() = PoolState::Stopped;
        self.lock_workers().joining.clear();
        self.workers_exited.notify_all();
        info!("Scheduler stopped");
    }
}

fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            error!("worker thread panicked outside the task boundary");
        }
    }
}

impl Drop for Scheduler {
    /// Dropping a running pool drains it like [`Scheduler::shutdown_graceful`].
    fn drop(&mut self) {
        self.shutdown_graceful();
    }
}
