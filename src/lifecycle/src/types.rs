//! # Lifecycle Types
//!
//! States, transitions, deployment and rollback records, configuration, and
//! errors for the per-agent lifecycle state machine.

use chrono::{DateTime, Utc};
use fleet_registry::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Operational phase of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Initializing,
    Registered,
    Deploying,
    Running,
    Scaling,
    Updating,
    RollingBack,
    Stopping,
    Stopped,
    Failed,
    Deregistered,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::Registered => "registered",
            LifecycleState::Deploying => "deploying",
            LifecycleState::Running => "running",
            LifecycleState::Scaling => "scaling",
            LifecycleState::Updating => "updating",
            LifecycleState::RollingBack => "rolling_back",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
            LifecycleState::Deregistered => "deregistered",
        };
        f.write_str(s)
    }
}

/// One recorded state change; the per-agent log is append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Target environment for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentEnvironment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Failed,
    Superseded,
}

/// Record of one deployment of an agent version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub agent_id: AgentId,
    pub version: String,
    pub environment: DeploymentEnvironment,
    pub status: DeploymentStatus,
    pub instances: u32,
    #[serde(default)]
    pub resources: HashMap<String, String>,
    #[serde(default)]
    pub configuration: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStatus {
    Pending,
    Completed,
    Failed,
}

/// Record of one rollback attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rollback {
    pub id: String,
    pub deployment_id: String,
    pub from_version: String,
    pub to_version: String,
    pub reason: String,
    pub status: RollbackStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Lifecycle operation timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    pub deployment_timeout_secs: u64,
    pub rollback_timeout_secs: u64,
    pub health_check_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            deployment_timeout_secs: 300, // 5 minutes
            rollback_timeout_secs: 180,   // 3 minutes
            health_check_timeout_secs: 30,
        }
    }
}

/// Errors surfaced by the lifecycle manager
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Operation timeout: {operation} exceeded {seconds}s")]
    OperationTimeout { operation: String, seconds: u64 },

    #[error("Executor error during {operation}: {message}")]
    ExecutorError { operation: String, message: String },

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),
}
