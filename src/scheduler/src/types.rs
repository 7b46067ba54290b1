//! # Scheduler Types
//!
//! Jobs, tasks, assignments, and scheduler configuration.

use chrono::{DateTime, Utc};
use fleet_registry::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Caller-facing job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Priority applied to the decomposed tasks; defaults to 1
    #[serde(default)]
    pub priority: Option<i32>,
}

/// A submitted job and the tasks it decomposed into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub parameters: HashMap<String, serde_json::Value>,
    pub status: JobStatus,
    /// Ids of the tasks this job decomposed into
    pub tasks: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
}

/// Resource request attached to every task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResources {
    pub cpu: u32,
    /// Megabytes
    pub memory: u32,
    pub disk: u32,
    pub gpu: u32,
}

impl Default for TaskResources {
    fn default() -> Self {
        Self {
            cpu: 1,
            memory: 512,
            disk: 0,
            gpu: 0,
        }
    }
}

/// One schedulable unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub job_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub input: serde_json::Value,
    /// Task ids this task waits on
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    pub assigned_agent_id: Option<AgentId>,
    pub resources: TaskResources,
    /// Higher runs earlier under priority scheduling
    pub priority: i32,
    pub retries: u32,
    /// Set once the task has exhausted its retries, so the failure metric
    /// is bumped exactly once
    #[serde(default)]
    pub permanently_failed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Assigned,
    Completed,
    Failed,
}

/// A placement decision for one task; `agent_id` is `None` when no healthy
/// agent was available at scheduling time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: String,
    pub agent_id: Option<AgentId>,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
}

/// Task ordering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingType {
    #[serde(alias = "FIFO")]
    Fifo,
    Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub scheduling: SchedulingType,
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingType::Fifo,
            max_retries: 3,
        }
    }
}

/// Partial configuration overlay applied by `load_config`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfigPatch {
    pub scheduling: Option<SchedulingType>,
    pub max_retries: Option<u32>,
}

impl SchedulerConfig {
    pub fn merge(&mut self, patch: SchedulerConfigPatch) {
        if let Some(scheduling) = patch.scheduling {
            self.scheduling = scheduling;
        }
        if let Some(max_retries) = patch.max_retries {
            self.max_retries = max_retries;
        }
    }
}

/// Rolling counters kept by the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    pub jobs: u64,
    pub tasks: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Snapshot returned by `monitor`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorReport {
    pub jobs: usize,
    pub tasks: usize,
    /// Agents currently known to the discovery registry
    pub agents: usize,
    pub completed: u64,
    pub failed: u64,
}
