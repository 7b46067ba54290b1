//! # Fleet Scheduler - Job and Task Placement
//!
//! Decomposes submitted jobs into tasks and places them on healthy agents
//! from the discovery registry. Supports FIFO and static-priority ordering,
//! round-robin agent selection, and bounded retry of failed tasks.

pub mod scheduler;
pub mod types;

pub use scheduler::TaskScheduler;
pub use types::*;
