//! # Health Checker Types
//!
//! Configuration, probe request/response shapes, check results, and
//! per-agent statistics for the health checking supervisor.

use chrono::{DateTime, Utc};
use fleet_registry::{AgentId, HealthStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Response time thresholds used when an agent's body carries no status.
/// Below the first bound is healthy, below the second degraded, above it
/// unhealthy.
pub const HEALTHY_RESPONSE_MS: u64 = 1_000;
pub const DEGRADED_RESPONSE_MS: u64 = 5_000;

/// Bound on per-agent history; oldest results are evicted first
pub const HISTORY_LIMIT: usize = 100;

/// Health checker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Probe interval in milliseconds
    pub interval_ms: u64,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Total attempts per probe, including the first
    pub retries: u32,
    /// Consecutive successes before an agent is considered stable
    pub success_threshold: u32,
    /// Consecutive failures before an agent is considered down
    pub failure_threshold: u32,
    /// Extra headers sent with every probe
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
    /// When set, probes POST this body instead of GET
    #[serde(default)]
    pub custom_body: Option<serde_json::Value>,
    /// Path appended to the agent endpoint
    pub endpoint_path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000, // 30 seconds
            timeout_ms: 10_000,  // 10 seconds
            retries: 3,
            success_threshold: 2,
            failure_threshold: 3,
            custom_headers: HashMap::new(),
            custom_body: None,
            endpoint_path: "/health".to_string(),
        }
    }
}

/// Partial configuration overlay applied by `update_config`.
///
/// Every recognized option appears here explicitly; absent fields leave the
/// live value untouched. Changes take effect on the next probe tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheckConfigPatch {
    pub interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub success_threshold: Option<u32>,
    pub failure_threshold: Option<u32>,
    pub custom_headers: Option<HashMap<String, String>>,
    pub custom_body: Option<serde_json::Value>,
    pub endpoint_path: Option<String>,
}

impl HealthCheckConfig {
    /// Overlay a patch onto this configuration
    pub fn merge(&mut self, patch: HealthCheckConfigPatch) {
        if let Some(interval_ms) = patch.interval_ms {
            self.interval_ms = interval_ms;
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(retries) = patch.retries {
            self.retries = retries;
        }
        if let Some(success_threshold) = patch.success_threshold {
            self.success_threshold = success_threshold;
        }
        if let Some(failure_threshold) = patch.failure_threshold {
            self.failure_threshold = failure_threshold;
        }
        if let Some(custom_headers) = patch.custom_headers {
            self.custom_headers = custom_headers;
        }
        if let Some(custom_body) = patch.custom_body {
            self.custom_body = Some(custom_body);
        }
        if let Some(endpoint_path) = patch.endpoint_path {
            self.endpoint_path = endpoint_path;
        }
    }
}

/// HTTP method used by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeMethod {
    Get,
    Post,
}

/// A single outbound probe request handed to the transport
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub url: String,
    pub method: ProbeMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    /// Per-attempt timeout
    pub timeout: Duration,
}

/// Raw transport response before classification
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub reason: String,
    pub content_length: Option<u64>,
    pub body: Vec<u8>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Structured detail block attached to every check result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheckDetails {
    pub http_status: Option<u16>,
    pub response_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Outcome of one probe (after retries)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub agent_id: AgentId,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub details: HealthCheckDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Optional fields an agent may report from its health endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthReportBody {
    pub status: Option<String>,
    #[serde(rename = "resourceUsage")]
    pub resource_usage: Option<fleet_registry::ResourceUsage>,
    #[serde(rename = "customMetrics")]
    pub custom_metrics: Option<HashMap<String, serde_json::Value>>,
}

/// Aggregate statistics over an agent's recorded history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatistics {
    pub total_checks: usize,
    /// Checks whose status was healthy
    pub successful_checks: usize,
    /// Checks whose status was unhealthy
    pub failed_checks: usize,
    pub average_response_time_ms: f64,
    /// Fraction of checks that were healthy
    pub uptime: f64,
    pub last_check: Option<DateTime<Utc>>,
}

/// Errors surfaced by the health checking subsystem
#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Probe timed out after {0} ms")]
    Timeout(u64),

    #[error("Health checker is not running")]
    NotRunning,

    #[error("Invalid probe configuration: {0}")]
    InvalidConfiguration(String),
}
