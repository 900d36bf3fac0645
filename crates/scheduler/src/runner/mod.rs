//! Worker pool runner -- owns the worker threads, the ready queue and the
//! dependency graph.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, builder, and accessor methods
//! - `lifecycle`: start, graceful and immediate shutdown
//! - `scheduling`: submission routing and cancellation
//! - `execution`: the per-thread worker loop and failure boundary

mod core;
mod execution;
mod lifecycle;
mod scheduling;

pub use self::core::{FailureHook, PoolState, Scheduler, SchedulerBuilder};
