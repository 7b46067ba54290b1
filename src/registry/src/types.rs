//! # Registry Types - Core Data Structures for Agent Discovery
//!
//! This module defines the core data structures shared across the control plane:
//! agent records, capability descriptors, health blocks, operational policies,
//! and the registry error types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Unique identifier for a registered agent.
///
/// Agent ids are caller-supplied (or generated by the registration protocol)
/// and globally unique within the discovery registry. Blank ids are rejected
/// at construction so downstream maps never see an empty key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent id, rejecting blank input
    pub fn new(id: impl Into<String>) -> Result<Self, RegistryError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RegistryError::InvalidAgentId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health classification for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Scheduling preference rank; higher ranks are preferred by discovery
    /// ordering (healthy > degraded > unknown > unhealthy).
    pub fn rank(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 3,
            HealthStatus::Degraded => 2,
            HealthStatus::Unknown => 1,
            HealthStatus::Unhealthy => 0,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Resource requirements declared by an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
}

/// A named, versioned unit of functionality an agent provides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Identity key across versions
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Semver version string
    pub version: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque parameter schema
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Return-type tag
    #[serde(default)]
    pub returns: String,
    #[serde(default)]
    pub examples: Vec<serde_json::Value>,
}

/// Per-capability record maintained by the capability registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedCapability {
    /// Descriptor from the highest-version registration
    pub descriptor: CapabilityDescriptor,
    /// All registered versions, sorted ascending
    pub versions: Vec<semver::Version>,
    /// Maximum registered version
    pub latest_version: semver::Version,
    /// Agents offering any version of this capability
    pub providers: HashSet<AgentId>,
    /// Set once every provider has deregistered; the record is kept
    pub deprecated: bool,
}

/// Descriptive metadata carried by an agent record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,
    /// Semver version string
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub capabilities: Vec<CapabilityDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Supported authentication schemes for agent endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    Basic,
    Bearer,
    OAuth2,
    Mtls,
}

/// Authentication block for an endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationInfo {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    /// Opaque credential material, passed through to transport
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

impl Default for AuthenticationInfo {
    fn default() -> Self {
        Self {
            auth_type: AuthType::None,
            credentials: HashMap::new(),
        }
    }
}

/// Network endpoint where an agent accepts work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpoint {
    /// Scheme + host + port
    pub url: String,
    /// Protocol identifier (http, https, grpc, ...)
    pub protocol: String,
    #[serde(default)]
    pub authentication: AuthenticationInfo,
}

/// Load balancing hints for scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancingPolicy {
    pub weight: u32,
    pub max_connections: u32,
    pub timeout_ms: u64,
}

impl Default for LoadBalancingPolicy {
    fn default() -> Self {
        Self {
            weight: 1,
            max_connections: 100,
            timeout_ms: 30_000, // 30 seconds
        }
    }
}

/// Isolation settings for the agent's runtime environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationPolicy {
    pub namespace: String,
    #[serde(default)]
    pub resource_limits: HashMap<String, String>,
    #[serde(default)]
    pub security_context: Option<String>,
}

impl Default for IsolationPolicy {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            resource_limits: HashMap::new(),
            security_context: None,
        }
    }
}

/// Horizontal scaling bounds and targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub min_instances: u32,
    pub max_instances: u32,
    pub target_cpu_percent: f64,
    pub target_memory_percent: f64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            min_instances: 1,
            max_instances: 10,
            target_cpu_percent: 70.0,
            target_memory_percent: 80.0,
        }
    }
}

/// Operational policy block of an agent record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationalPolicy {
    pub load_balancing: LoadBalancingPolicy,
    pub isolation: IsolationPolicy,
    pub scaling: ScalingPolicy,
}

/// Resource usage snapshot reported by an agent (each value 0-100)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
}

/// Health block of an agent record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub status: HealthStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Last observed probe round trip in milliseconds
    pub response_time_ms: Option<u64>,
    /// Cumulative error count; reset to zero on a healthy probe
    pub error_count: u64,
    pub uptime_seconds: u64,
    #[serde(default)]
    pub resource_usage: ResourceUsage,
    #[serde(default)]
    pub custom_metrics: HashMap<String, serde_json::Value>,
}

impl Default for AgentHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_heartbeat: None,
            response_time_ms: None,
            error_count: 0,
            uptime_seconds: 0,
            resource_usage: ResourceUsage::default(),
            custom_metrics: HashMap::new(),
        }
    }
}

/// Authoritative record for a registered agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub metadata: AgentMetadata,
    pub endpoint: AgentEndpoint,
    pub policy: OperationalPolicy,
    pub health: AgentHealth,
}

/// Multi-criteria discovery query; filters combine with AND
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    pub capabilities: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub namespace: Option<String>,
    pub status: Option<HealthStatus>,
    #[serde(default = "default_query_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for DiscoveryQuery {
    fn default() -> Self {
        Self {
            capabilities: None,
            tags: None,
            namespace: None,
            status: None,
            limit: default_query_limit(),
            offset: 0,
        }
    }
}

/// Capability search query; filters combine with AND
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityQuery {
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Case-insensitive substring match on name or description
    pub query: Option<String>,
    #[serde(default = "default_query_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for CapabilityQuery {
    fn default() -> Self {
        Self {
            category: None,
            tags: None,
            query: None,
            limit: default_query_limit(),
            offset: 0,
        }
    }
}

fn default_query_limit() -> usize {
    50
}

/// One page of discovery results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryPage {
    pub agents: Vec<AgentRecord>,
    /// Total matches before pagination
    pub total: usize,
}

/// One page of capability search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityPage {
    pub capabilities: Vec<VersionedCapability>,
    /// Total matches before pagination
    pub total: usize,
}

/// Aggregate registry statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_agents: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub by_namespace: HashMap<String, usize>,
    /// Provider count per capability id
    pub by_capability_count: HashMap<String, usize>,
}

/// Errors surfaced by the registration protocol and registries
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registration conflict: agent '{0}' is already registered")]
    RegistrationConflict(AgentId),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Invalid registration: {}", .0.join("; "))]
    InvalidRegistration(Vec<String>),

    #[error("Agent id must not be blank")]
    InvalidAgentId,

    #[error("Invalid capability version '{version}' for capability '{capability}'")]
    InvalidCapabilityVersion { capability: String, version: String },
}
