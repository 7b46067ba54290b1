//! # Control Plane Event Bus
//!
//! Typed events fanned out to registered listeners. Listener panics are
//! caught and logged so one misbehaving subscriber can never break the
//! emitting subsystem or starve other subscribers.

use crate::types::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Event kinds emitted by the health checker and lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlEventType {
    HealthCheckCompleted,
    HealthStatusChanged,
    AgentUnhealthy,
    AgentRecovered,
    StateChanged,
    DeploymentStarted,
    DeploymentCompleted,
    RollbackStarted,
    RollbackCompleted,
    Error,
}

/// A single control plane event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlEvent {
    #[serde(rename = "type")]
    pub event_type: ControlEventType,
    pub agent_id: AgentId,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl ControlEvent {
    pub fn new(event_type: ControlEventType, agent_id: AgentId, data: serde_json::Value) -> Self {
        Self {
            event_type,
            agent_id,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&ControlEvent) + Send + Sync>;

/// Subscription registry with isolated listener dispatch.
///
/// Listeners run synchronously on the emitting task; long-running work
/// belongs in a channel the listener forwards to.
pub struct EventBus {
    listeners: RwLock<HashMap<ListenerId, Listener>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener; the returned id unsubscribes it
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ControlEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.insert(id, Arc::new(listener));
        }
        debug!("Registered event listener {}", id);
        id
    }

    /// Remove a listener; returns whether it was present
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.remove(&id).is_some(),
            Err(_) => false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Fan an event out to every listener.
    ///
    /// The listener map lock is released before dispatch so listeners may
    /// subscribe or unsubscribe reentrantly.
    pub fn emit(&self, event: ControlEvent) {
        let snapshot: Vec<(ListenerId, Listener)> = match self.listeners.read() {
            Ok(listeners) => listeners.iter().map(|(id, l)| (*id, Arc::clone(l))).collect(),
            Err(_) => return,
        };

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(
                    "Event listener {} panicked handling {:?} for agent {}",
                    id, event.event_type, event.agent_id
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
