//! # Health Checker
//!
//! Long-running supervisor that probes every monitored agent on a fixed
//! interval, classifies responses, keeps bounded per-agent history, pushes
//! health updates into the discovery registry, and emits status-transition
//! events.
//!
//! ## Probe Serialization
//!
//! At most one probe is in flight per agent. The per-agent timer task holds
//! a probe lock for the duration of a check; a tick that fires while the
//! previous probe is still running is skipped, not queued.

use crate::metrics;
use crate::transport::{HttpProbeTransport, ProbeTransport};
use crate::types::*;
use chrono::Utc;
use fleet_registry::{
    AgentHealth, AgentId, AgentRecord, ControlEvent, ControlEventType, DiscoveryRegistry,
    EventBus, HealthStatus,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Shared state reachable from every per-agent monitor task
struct CheckerInner {
    config: RwLock<HealthCheckConfig>,
    registry: Arc<DiscoveryRegistry>,
    transport: Arc<dyn ProbeTransport>,
    events: Arc<EventBus>,
    history: RwLock<HashMap<AgentId, VecDeque<HealthCheckResult>>>,
    /// One lock per agent; holding it marks a probe in flight
    probe_locks: Mutex<HashMap<AgentId, Arc<Mutex<()>>>>,
    is_running: RwLock<bool>,
}

/// Health checking supervisor
pub struct HealthChecker {
    inner: Arc<CheckerInner>,
    /// agent id -> cancel handle for its periodic timer
    monitors: Mutex<HashMap<AgentId, JoinHandle<()>>>,
}

impl HealthChecker {
    /// Create a checker with the production HTTP transport
    pub fn new(
        registry: Arc<DiscoveryRegistry>,
        events: Arc<EventBus>,
        config: HealthCheckConfig,
    ) -> Result<Self, HealthCheckError> {
        let transport = Arc::new(HttpProbeTransport::new()?);
        Ok(Self::with_transport(registry, events, config, transport))
    }

    /// Create a checker around an arbitrary transport (used by tests)
    pub fn with_transport(
        registry: Arc<DiscoveryRegistry>,
        events: Arc<EventBus>,
        config: HealthCheckConfig,
        transport: Arc<dyn ProbeTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(CheckerInner {
                config: RwLock::new(config),
                registry,
                transport,
                events,
                history: RwLock::new(HashMap::new()),
                probe_locks: Mutex::new(HashMap::new()),
                is_running: RwLock::new(false),
            }),
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// Arm the periodic timer for one agent.
    ///
    /// Starting an agent that is already monitored cancels and replaces its
    /// timer, so repeated starts are idempotent.
    pub async fn start(&self, agent_id: AgentId) {
        *self.inner.is_running.write().await = true;

        let mut monitors = self.monitors.lock().await;
        if let Some(existing) = monitors.remove(&agent_id) {
            existing.abort();
            debug!("Replaced existing monitor for {}", agent_id);
        }

        let inner = Arc::clone(&self.inner);
        let task_agent_id = agent_id.clone();
        let handle = tokio::spawn(async move {
            let interval_ms = inner.config.read().await.interval_ms;
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately; consume it so probes
            // start one full interval after arming
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !*inner.is_running.read().await {
                    break;
                }
                let lock = inner.probe_lock(&task_agent_id).await;
                let try_lock_result = lock.try_lock();
                match try_lock_result {
                    Ok(_guard) => {
                        inner.check_cycle(&task_agent_id).await;
                    }
                    Err(_) => {
                        debug!("Probe for {} still in flight; skipping tick", task_agent_id);
                    }
                }
            }
        });

        monitors.insert(agent_id.clone(), handle);
        info!("Started health monitoring for {}", agent_id);
    }

    /// Cancel the timer for one agent
    pub async fn stop(&self, agent_id: &AgentId) {
        let mut monitors = self.monitors.lock().await;
        if let Some(handle) = monitors.remove(agent_id) {
            handle.abort();
            info!("Stopped health monitoring for {}", agent_id);
        }
    }

    /// Arm timers for every agent currently in the registry
    pub async fn start_all(&self) {
        *self.inner.is_running.write().await = true;
        let agents = self.inner.registry.all().await;
        info!("Starting health monitoring for {} agents", agents.len());
        for agent in agents {
            self.start(agent.id).await;
        }
    }

    /// Cancel every timer and abort in-flight probes; pending results are
    /// discarded
    pub async fn stop_all(&self) {
        *self.inner.is_running.write().await = false;
        let mut monitors = self.monitors.lock().await;
        let count = monitors.len();
        for (_, handle) in monitors.drain() {
            handle.abort();
        }
        info!("Stopped health monitoring ({} agents)", count);
    }

    pub async fn is_running(&self) -> bool {
        *self.inner.is_running.read().await
    }

    /// Run one full check cycle for an agent immediately: probe, record
    /// history, emit events, and push the health update into the registry.
    pub async fn perform_check(&self, agent_id: &AgentId) -> HealthCheckResult {
        let lock = self.inner.probe_lock(agent_id).await;
        let _guard = lock.lock().await;
        self.inner.check_cycle(agent_id).await
    }

    /// Recorded results for an agent, oldest first. `limit` keeps only the
    /// most recent entries.
    pub async fn history(&self, agent_id: &AgentId, limit: Option<usize>) -> Vec<HealthCheckResult> {
        let history = self.inner.history.read().await;
        let results = match history.get(agent_id) {
            Some(results) => results,
            None => return Vec::new(),
        };
        match limit {
            Some(limit) if limit < results.len() => {
                results.iter().skip(results.len() - limit).cloned().collect()
            }
            _ => results.iter().cloned().collect(),
        }
    }

    /// Aggregate statistics over an agent's recorded history
    pub async fn statistics(&self, agent_id: &AgentId) -> HealthStatistics {
        let history = self.inner.history.read().await;
        let results = match history.get(agent_id) {
            Some(results) if !results.is_empty() => results,
            _ => return HealthStatistics::default(),
        };

        let total_checks = results.len();
        let successful_checks = results
            .iter()
            .filter(|r| r.status == HealthStatus::Healthy)
            .count();
        let failed_checks = results
            .iter()
            .filter(|r| r.status == HealthStatus::Unhealthy)
            .count();
        let total_response_time: u64 = results.iter().map(|r| r.response_time_ms).sum();

        HealthStatistics {
            total_checks,
            successful_checks,
            failed_checks,
            average_response_time_ms: total_response_time as f64 / total_checks as f64,
            uptime: successful_checks as f64 / total_checks as f64,
            last_check: results.back().map(|r| r.timestamp),
        }
    }

    /// Merge a partial configuration into the live one. Running timers are
    /// not re-armed; an interval change applies to agents started afterwards,
    /// everything else applies on the next tick.
    pub async fn update_config(&self, patch: HealthCheckConfigPatch) {
        let mut config = self.inner.config.write().await;
        config.merge(patch);
        debug!("Health check configuration updated");
    }

    pub async fn config(&self) -> HealthCheckConfig {
        self.inner.config.read().await.clone()
    }
}

impl CheckerInner {
    async fn probe_lock(&self, agent_id: &AgentId) -> Arc<Mutex<()>> {
        let mut locks = self.probe_locks.lock().await;
        Arc::clone(locks.entry(agent_id.clone()).or_default())
    }

    /// One probe plus the full post-probe pipeline
    async fn check_cycle(&self, agent_id: &AgentId) -> HealthCheckResult {
        let config = self.config.read().await.clone();

        let agent = match self.registry.get(agent_id).await {
            Some(agent) => agent,
            None => {
                let result = HealthCheckResult {
                    agent_id: agent_id.clone(),
                    status: HealthStatus::Unknown,
                    response_time_ms: 0,
                    timestamp: Utc::now(),
                    details: HealthCheckDetails::default(),
                    error: Some("Agent not found".to_string()),
                };
                self.record(&result).await;
                self.events.emit(ControlEvent::new(
                    ControlEventType::HealthCheckCompleted,
                    agent_id.clone(),
                    serde_json::to_value(&result).unwrap_or_default(),
                ));
                return result;
            }
        };

        let previous = agent.health.status;
        let result = self.probe(&agent, &config).await;
        self.record(&result).await;
        self.emit_events(previous, &result);
        self.apply_health_update(&agent, &result).await;
        result
    }

    /// Execute the probe with retries and classify the final attempt.
    async fn probe(&self, agent: &AgentRecord, config: &HealthCheckConfig) -> HealthCheckResult {
        let url = format!(
            "{}{}",
            agent.endpoint.url.trim_end_matches('/'),
            config.endpoint_path
        );
        let method = if config.custom_body.is_some() {
            ProbeMethod::Post
        } else {
            ProbeMethod::Get
        };

        let attempts = config.retries.max(1);
        let started = Instant::now();
        let mut outcome: Result<ProbeResponse, HealthCheckError> =
            Err(HealthCheckError::Transport("no attempts made".to_string()));

        for attempt in 1..=attempts {
            let request = ProbeRequest {
                url: url.clone(),
                method,
                headers: config.custom_headers.clone(),
                body: config.custom_body.clone(),
                timeout: Duration::from_millis(config.timeout_ms),
            };
            match self.transport.execute(request).await {
                Ok(response) if response.is_success() => {
                    outcome = Ok(response);
                    break;
                }
                Ok(response) => {
                    debug!(
                        "Probe attempt {}/{} for {} returned HTTP {}",
                        attempt, attempts, agent.id, response.status_code
                    );
                    outcome = Ok(response);
                }
                Err(err) => {
                    debug!(
                        "Probe attempt {}/{} for {} failed: {}",
                        attempt, attempts, agent.id, err
                    );
                    outcome = Err(err);
                }
            }
        }

        let response_time_ms = started.elapsed().as_millis() as u64;
        let timestamp = Utc::now();

        match outcome {
            Ok(response) if response.is_success() => {
                let body: Option<serde_json::Value> = serde_json::from_slice(&response.body).ok();
                let report = body
                    .as_ref()
                    .and_then(|b| serde_json::from_value::<HealthReportBody>(b.clone()).ok())
                    .unwrap_or_default();

                let status = report
                    .status
                    .as_deref()
                    .and_then(parse_reported_status)
                    .unwrap_or_else(|| classify_response_time(response_time_ms));

                HealthCheckResult {
                    agent_id: agent.id.clone(),
                    status,
                    response_time_ms,
                    timestamp,
                    details: HealthCheckDetails {
                        http_status: Some(response.status_code),
                        response_size: response.content_length,
                        body,
                    },
                    error: None,
                }
            }
            Ok(response) => HealthCheckResult {
                agent_id: agent.id.clone(),
                status: HealthStatus::Unhealthy,
                response_time_ms,
                timestamp,
                details: HealthCheckDetails {
                    http_status: Some(response.status_code),
                    response_size: response.content_length,
                    body: None,
                },
                error: Some(format!("HTTP {}: {}", response.status_code, response.reason)),
            },
            Err(err) => HealthCheckResult {
                agent_id: agent.id.clone(),
                status: HealthStatus::Unhealthy,
                response_time_ms,
                timestamp,
                details: HealthCheckDetails::default(),
                error: Some(err.to_string()),
            },
        }
    }

    /// Append to the bounded per-agent history ring
    async fn record(&self, result: &HealthCheckResult) {
        let mut history = self.history.write().await;
        let ring = history.entry(result.agent_id.clone()).or_default();
        if ring.len() >= HISTORY_LIMIT {
            ring.pop_front();
        }
        ring.push_back(result.clone());
        metrics::record_probe(result.status, result.response_time_ms);
    }

    fn emit_events(&self, previous: HealthStatus, result: &HealthCheckResult) {
        self.events.emit(ControlEvent::new(
            ControlEventType::HealthCheckCompleted,
            result.agent_id.clone(),
            serde_json::to_value(result).unwrap_or_default(),
        ));

        if previous != result.status {
            self.events.emit(ControlEvent::new(
                ControlEventType::HealthStatusChanged,
                result.agent_id.clone(),
                serde_json::json!({
                    "previous": previous,
                    "current": result.status,
                }),
            ));
        }

        if result.status == HealthStatus::Unhealthy {
            self.events.emit(ControlEvent::new(
                ControlEventType::AgentUnhealthy,
                result.agent_id.clone(),
                serde_json::json!({ "error": result.error }),
            ));
        }

        if previous == HealthStatus::Unhealthy && result.status == HealthStatus::Healthy {
            self.events.emit(ControlEvent::new(
                ControlEventType::AgentRecovered,
                result.agent_id.clone(),
                serde_json::json!({
                    "previous": previous,
                    "current": result.status,
                }),
            ));
        }
    }

    /// Push the classification back into the discovery registry
    async fn apply_health_update(&self, agent: &AgentRecord, result: &HealthCheckResult) {
        let report = result
            .details
            .body
            .as_ref()
            .and_then(|b| serde_json::from_value::<HealthReportBody>(b.clone()).ok())
            .unwrap_or_default();

        let error_count = match result.status {
            HealthStatus::Healthy => 0,
            HealthStatus::Unhealthy | HealthStatus::Degraded => agent.health.error_count + 1,
            HealthStatus::Unknown => agent.health.error_count,
        };

        let health = AgentHealth {
            status: result.status,
            last_heartbeat: Some(result.timestamp),
            response_time_ms: Some(result.response_time_ms),
            error_count,
            uptime_seconds: agent.health.uptime_seconds,
            resource_usage: report
                .resource_usage
                .unwrap_or(agent.health.resource_usage),
            custom_metrics: report
                .custom_metrics
                .unwrap_or_else(|| agent.health.custom_metrics.clone()),
        };

        if let Err(err) = self.registry.update_health(&agent.id, health).await {
            warn!("Failed to store health update for {}: {}", agent.id, err);
        }
    }
}

fn parse_reported_status(value: &str) -> Option<HealthStatus> {
    match value {
        "healthy" => Some(HealthStatus::Healthy),
        "degraded" => Some(HealthStatus::Degraded),
        "unhealthy" => Some(HealthStatus::Unhealthy),
        _ => None,
    }
}

/// Latency classification used when the body carries no status field
fn classify_response_time(response_time_ms: u64) -> HealthStatus {
    if response_time_ms < HEALTHY_RESPONSE_MS {
        HealthStatus::Healthy
    } else if response_time_ms < DEGRADED_RESPONSE_MS {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}
