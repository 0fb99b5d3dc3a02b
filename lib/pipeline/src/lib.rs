//! # strata Pipeline
//!
//! Materialization of signal outputs into dataset branches.
//!
//! - [`SignalPipeline`] - Computes a signal or embedding over a leaf and publishes the result
//!   atomically together with the matching config entry
//! - [`TaskManager`] - Runs long computations in the background behind a task id
//!
//! Writes to one dataset are serialized by the dataset's writer lock. Readers keep the snapshot
//! they opened until a publish swaps it.

pub mod pipeline;
pub mod tasks;

pub use pipeline::{check_compatibility, ResolvedSource, SignalPipeline};
pub use tasks::{TaskId, TaskInfo, TaskManager, TaskStatus, DEFAULT_RETAINED_TASKS};
