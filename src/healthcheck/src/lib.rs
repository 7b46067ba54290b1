//! # Fleet Healthcheck - Agent Health Supervision
//!
//! Continuous health checking for registered agents. The supervisor polls
//! each monitored agent's HTTP health endpoint on a configurable interval,
//! classifies responses (reported status first, latency thresholds as the
//! fallback), keeps a bounded per-agent history, pushes health updates into
//! the discovery registry, and emits status-transition events on the shared
//! event bus.

pub mod checker;
pub mod metrics;
pub mod transport;
pub mod types;

pub use checker::HealthChecker;
pub use transport::{HttpProbeTransport, ProbeTransport};
pub use types::*;
