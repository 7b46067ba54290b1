//! # Health Check Metrics
//!
//! Prometheus instrumentation for the probe loop.

use fleet_registry::HealthStatus;
use lazy_static::lazy_static;
use prometheus::{register_counter, register_histogram, Counter, Histogram};

lazy_static! {
    /// Counter for probes performed
    static ref PROBES_TOTAL: Counter = register_counter!(
        "fleet_healthcheck_probes_total",
        "Total number of health probes performed"
    ).expect("Can't create probes_total metric");

    /// Counter for probes that classified an agent unhealthy
    static ref UNHEALTHY_PROBES_TOTAL: Counter = register_counter!(
        "fleet_healthcheck_unhealthy_probes_total",
        "Total number of probes that classified an agent unhealthy"
    ).expect("Can't create unhealthy_probes_total metric");

    /// Histogram for probe round trip duration
    static ref PROBE_DURATION_SECONDS: Histogram = register_histogram!(
        "fleet_healthcheck_probe_duration_seconds",
        "Duration of health probes in seconds"
    ).expect("Can't create probe_duration_seconds metric");
}

/// Record one completed probe
pub fn record_probe(status: HealthStatus, response_time_ms: u64) {
    PROBES_TOTAL.inc();
    PROBE_DURATION_SECONDS.observe(response_time_ms as f64 / 1_000.0);
    if status == HealthStatus::Unhealthy {
        UNHEALTHY_PROBES_TOTAL.inc();
    }
}
