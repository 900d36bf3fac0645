//! In-process task scheduler with deadline/priority ordering and task dependencies.
//!
//! A [`Scheduler`] owns a fixed pool of worker threads. Submitted [`Task`]s
//! without predecessors go straight to the [`ReadyQueue`]; the rest wait in
//! the [`DependencyGraph`] until every predecessor has completed. Workers
//! report execution times and counts to the [`MetricsCollector`].

pub mod error;
pub mod graph;
pub mod metrics;
pub mod queue;
pub mod runner;
pub mod task;

pub use error::SchedulerError;
pub use graph::DependencyGraph;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use queue::ReadyQueue;
pub use runner::{FailureHook, PoolState, Scheduler, SchedulerBuilder};
pub use task::{Task, TaskError, TaskFailure, Work};

pub use ordo_core::{Priority, SchedulerConfig, TaskId};
