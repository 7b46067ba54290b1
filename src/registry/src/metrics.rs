//! # Registry Metrics
//!
//! Prometheus counters and gauges for the discovery and capability
//! registries. Exported through [`gather_metrics`] for embedding callers;
//! the control plane itself runs no exporter.

use crate::types::HealthStatus;
use lazy_static::lazy_static;
use prometheus::{register_counter, register_gauge, Counter, Encoder, Gauge, TextEncoder};
use tracing::debug;

lazy_static! {
    /// Counter for agent registrations
    static ref AGENTS_REGISTERED_TOTAL: Counter = register_counter!(
        "fleet_registry_agents_registered_total",
        "Total number of agents registered"
    ).expect("Can't create agents_registered_total metric");

    /// Counter for agent deregistrations
    static ref AGENTS_DEREGISTERED_TOTAL: Counter = register_counter!(
        "fleet_registry_agents_deregistered_total",
        "Total number of agents deregistered"
    ).expect("Can't create agents_deregistered_total metric");

    /// Gauge for currently registered agents
    static ref REGISTERED_AGENTS: Gauge = register_gauge!(
        "fleet_registry_registered_agents",
        "Number of currently registered agents"
    ).expect("Can't create registered_agents metric");

    /// Counter for health block updates
    static ref HEALTH_UPDATES_TOTAL: Counter = register_counter!(
        "fleet_registry_health_updates_total",
        "Total number of agent health updates applied"
    ).expect("Can't create health_updates_total metric");
}

/// Record an agent registration
pub fn record_agent_registered() {
    AGENTS_REGISTERED_TOTAL.inc();
    REGISTERED_AGENTS.inc();
}

/// Record an agent deregistration
pub fn record_agent_deregistered() {
    AGENTS_DEREGISTERED_TOTAL.inc();
    REGISTERED_AGENTS.dec();
}

/// Record a health update by resulting status
pub fn record_health_update(status: HealthStatus) {
    HEALTH_UPDATES_TOTAL.inc();
    debug!("Recorded health update: {}", status);
}

/// Render all registry metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
