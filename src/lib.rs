//! Fleet Control - Agent Fleet Control Plane
//!
//! The control plane for a fleet of network-reachable agents: a discovery
//! registry with capability indexing, a health checking supervisor, a
//! per-agent lifecycle state machine, and a job/task scheduler, wired
//! together over a shared event bus.

pub use fleet_healthcheck as healthcheck;
pub use fleet_lifecycle as lifecycle;
pub use fleet_registry as registry;
pub use fleet_scheduler as scheduler;

use anyhow::Result;
use fleet_healthcheck::{HealthCheckConfig, HealthChecker, ProbeTransport};
use fleet_lifecycle::{LifecycleConfig, LifecycleExecutor, LifecycleManager, NoopExecutor};
use fleet_registry::{
    to_record, validate, AgentId, AgentRecord, ControlEvent, DiscoveryRegistry, EventBus,
    ListenerId, RegistrationRequest, RegistryError,
};
use fleet_scheduler::{Job, JobSpec, SchedulerConfig, TaskScheduler};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Top-level configuration for the control plane
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default)]
    pub health: HealthCheckConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Initialize logging for embedding binaries.
///
/// `filter` takes the usual env-filter syntax, e.g. `"info,fleet_healthcheck=debug"`.
pub fn init_telemetry(filter: &str) {
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The assembled control plane: registries, health checker, lifecycle
/// manager, and scheduler sharing one event bus.
pub struct ControlPlane {
    registry: Arc<DiscoveryRegistry>,
    events: Arc<EventBus>,
    checker: Arc<HealthChecker>,
    lifecycle: Arc<LifecycleManager>,
    scheduler: Arc<TaskScheduler>,
}

impl ControlPlane {
    /// Build a control plane with the production HTTP probe transport and a
    /// no-op lifecycle executor
    pub fn new(config: ControlPlaneConfig) -> Result<Self> {
        let registry = Arc::new(DiscoveryRegistry::new());
        let events = Arc::new(EventBus::new());
        let checker = Arc::new(HealthChecker::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            config.health,
        )?);
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            Arc::new(NoopExecutor),
            config.lifecycle,
        ));
        let scheduler = Arc::new(TaskScheduler::new(Arc::clone(&registry), config.scheduler));

        Ok(Self {
            registry,
            events,
            checker,
            lifecycle,
            scheduler,
        })
    }

    /// Build a control plane around custom collaborators (tests, embedding)
    pub fn with_collaborators(
        config: ControlPlaneConfig,
        transport: Arc<dyn ProbeTransport>,
        executor: Arc<dyn LifecycleExecutor>,
    ) -> Self {
        let registry = Arc::new(DiscoveryRegistry::new());
        let events = Arc::new(EventBus::new());
        let checker = Arc::new(HealthChecker::with_transport(
            Arc::clone(&registry),
            Arc::clone(&events),
            config.health,
            transport,
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            executor,
            config.lifecycle,
        ));
        let scheduler = Arc::new(TaskScheduler::new(Arc::clone(&registry), config.scheduler));

        Self {
            registry,
            events,
            checker,
            lifecycle,
            scheduler,
        }
    }

    /// Admit an agent into the fleet: validate the request, store the
    /// record, run lifecycle initialization, and start health monitoring.
    pub async fn admit(&self, request: RegistrationRequest) -> Result<AgentRecord> {
        let report = validate(&request);
        if !report.valid {
            return Err(RegistryError::InvalidRegistration(report.errors).into());
        }
        let record = to_record(request)?;
        self.registry.register(record.clone()).await?;
        self.lifecycle.initialize(&record.id).await?;
        self.checker.start(record.id.clone()).await;
        Ok(record)
    }

    /// Remove an agent from the fleet: stop monitoring, deregister from the
    /// lifecycle manager, and drop the registry record.
    pub async fn evict(&self, agent_id: &AgentId) -> Result<()> {
        self.checker.stop(agent_id).await;
        self.lifecycle.deregister(agent_id).await?;
        self.registry.deregister(agent_id).await?;
        Ok(())
    }

    /// Submit a job for scheduling onto healthy agents
    pub async fn submit_job(&self, spec: JobSpec) -> Job {
        self.scheduler.submit(spec).await
    }

    /// Subscribe to control plane events
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ControlEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Stop all health monitoring; in-flight probes are aborted
    pub async fn shutdown(&self) {
        self.checker.stop_all().await;
    }

    pub fn registry(&self) -> Arc<DiscoveryRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn health_checker(&self) -> Arc<HealthChecker> {
        Arc::clone(&self.checker)
    }

    pub fn lifecycle(&self) -> Arc<LifecycleManager> {
        Arc::clone(&self.lifecycle)
    }

    pub fn scheduler(&self) -> Arc<TaskScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }
}
