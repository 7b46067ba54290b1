//! # Lifecycle State Machine
//!
//! The allowed-transition table. Every state change goes through
//! [`is_transition_allowed`]; anything outside the table is rejected before
//! any record is written.

use crate::types::LifecycleState;

/// Whether the state machine permits `from -> to`.
///
/// `deregistered` is terminal.
pub fn is_transition_allowed(from: LifecycleState, to: LifecycleState) -> bool {
    use LifecycleState::*;
    matches!(
        (from, to),
        (Initializing, Registered)
            | (Initializing, Failed)
            | (Registered, Deploying)
            | (Registered, Deregistered)
            | (Deploying, Running)
            | (Deploying, Failed)
            | (Running, Scaling)
            | (Running, Updating)
            | (Running, RollingBack)
            | (Running, Stopping)
            | (Running, Failed)
            | (Scaling, Running)
            | (Scaling, Failed)
            | (Updating, Running)
            | (Updating, Failed)
            | (RollingBack, Running)
            | (RollingBack, Failed)
            | (Failed, RollingBack)
            | (Failed, Stopping)
            | (Stopping, Stopped)
            | (Stopping, Failed)
            | (Stopped, Deploying)
            | (Stopped, Deregistered)
    )
}
