//! # Fleet Lifecycle - Agent Lifecycle Management
//!
//! Per-agent lifecycle state machine for the fleet control plane. Gates
//! deploy, scale, update, rollback, and stop operations against an explicit
//! transition table, records every transition, persists deployment and
//! rollback records in memory, and emits lifecycle events on the shared bus.

pub mod executor;
pub mod manager;
pub mod state_machine;
pub mod types;

pub use executor::{LifecycleExecutor, NoopExecutor};
pub use manager::LifecycleManager;
pub use state_machine::is_transition_allowed;
pub use types::*;
