//! # Lifecycle Manager
//!
//! Per-agent state machine driving registration, deployment, scaling,
//! rollback, and teardown. Every state change is gated by the transition
//! table, appended to the agent's transition log, and announced on the
//! event bus. The actual operation bodies are delegated to a
//! [`LifecycleExecutor`]; deploy and rollback are bounded by configured
//! timeouts and fail the agent on expiry.
//!
//! Operations for a single agent are serialized through a per-agent lock;
//! concurrent attempts resolve in acquisition order, with later attempts
//! observing the state the first one left behind.

use crate::executor::LifecycleExecutor;
use crate::state_machine::is_transition_allowed;
use crate::types::*;
use chrono::Utc;
use fleet_registry::{generate_id, AgentId, ControlEvent, ControlEventType, DiscoveryRegistry, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{info, warn};

/// Per-agent lifecycle state machine and deployment bookkeeping
pub struct LifecycleManager {
    config: LifecycleConfig,
    registry: Arc<DiscoveryRegistry>,
    executor: Arc<dyn LifecycleExecutor>,
    events: Arc<EventBus>,
    states: Arc<RwLock<HashMap<AgentId, LifecycleState>>>,
    transitions: Arc<RwLock<HashMap<AgentId, Vec<LifecycleTransition>>>>,
    deployments: Arc<RwLock<HashMap<String, Deployment>>>,
    /// agent id -> id of its active deployment
    current_deployments: Arc<RwLock<HashMap<AgentId, String>>>,
    rollbacks: Arc<RwLock<HashMap<String, Rollback>>>,
    /// agent id -> operation serialization lock
    op_locks: Mutex<HashMap<AgentId, Arc<Mutex<()>>>>,
}

impl LifecycleManager {
    pub fn new(
        registry: Arc<DiscoveryRegistry>,
        events: Arc<EventBus>,
        executor: Arc<dyn LifecycleExecutor>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            config,
            registry,
            executor,
            events,
            states: Arc::new(RwLock::new(HashMap::new())),
            transitions: Arc::new(RwLock::new(HashMap::new())),
            deployments: Arc::new(RwLock::new(HashMap::new())),
            current_deployments: Arc::new(RwLock::new(HashMap::new())),
            rollbacks: Arc::new(RwLock::new(HashMap::new())),
            op_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Current state, if the agent is tracked
    pub async fn state(&self, agent_id: &AgentId) -> Option<LifecycleState> {
        self.states.read().await.get(agent_id).copied()
    }

    /// Append-only transition log for an agent
    pub async fn transitions(&self, agent_id: &AgentId) -> Vec<LifecycleTransition> {
        self.transitions
            .read()
            .await
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The agent's active deployment record
    pub async fn current_deployment(&self, agent_id: &AgentId) -> Option<Deployment> {
        let current = self.current_deployments.read().await;
        let id = current.get(agent_id)?;
        self.deployments.read().await.get(id).cloned()
    }

    pub async fn deployment(&self, deployment_id: &str) -> Option<Deployment> {
        self.deployments.read().await.get(deployment_id).cloned()
    }

    pub async fn rollback_record(&self, rollback_id: &str) -> Option<Rollback> {
        self.rollbacks.read().await.get(rollback_id).cloned()
    }

    /// Run initialization work and move the agent to `registered`.
    ///
    /// An untracked agent starts at `initializing`. Executor failure moves
    /// it to `failed` and re-raises.
    pub async fn initialize(&self, agent_id: &AgentId) -> Result<(), LifecycleError> {
        let lock = self.op_lock(agent_id).await;
        let _guard = lock.lock().await;

        if self.registry.get(agent_id).await.is_none() {
            return Err(LifecycleError::AgentNotFound(agent_id.clone()));
        }

        self.states
            .write()
            .await
            .entry(agent_id.clone())
            .or_insert(LifecycleState::Initializing);

        let bound = Duration::from_secs(self.config.health_check_timeout_secs);
        let outcome = match timeout(bound, self.executor.initialize(agent_id)).await {
            Ok(result) => result,
            Err(_) => {
                self.transition(agent_id, LifecycleState::Failed, "initialize timeout")
                    .await?;
                self.emit_error(agent_id, "initialize", "initialize timeout");
                return Err(LifecycleError::OperationTimeout {
                    operation: "initialize".to_string(),
                    seconds: self.config.health_check_timeout_secs,
                });
            }
        };

        match outcome {
            Ok(()) => {
                self.transition(agent_id, LifecycleState::Registered, "initialization complete")
                    .await
            }
            Err(message) => {
                self.transition(
                    agent_id,
                    LifecycleState::Failed,
                    &format!("initialization failed: {}", message),
                )
                .await?;
                Err(LifecycleError::ExecutorError {
                    operation: "initialize".to_string(),
                    message,
                })
            }
        }
    }

    /// Deploy a version to a `registered` or `stopped` agent
    pub async fn deploy(
        &self,
        agent_id: &AgentId,
        version: &str,
        environment: DeploymentEnvironment,
    ) -> Result<Deployment, LifecycleError> {
        let lock = self.op_lock(agent_id).await;
        let _guard = lock.lock().await;

        let current = self.current_state(agent_id).await?;
        if !matches!(
            current,
            LifecycleState::Registered | LifecycleState::Stopped
        ) {
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: LifecycleState::Deploying,
            });
        }

        self.run_deployment(agent_id, version, environment, LifecycleState::Deploying, false)
            .await
    }

    /// Deploy a new version to a `running` agent, superseding the previous
    /// deployment
    pub async fn update(
        &self,
        agent_id: &AgentId,
        new_version: &str,
    ) -> Result<Deployment, LifecycleError> {
        let lock = self.op_lock(agent_id).await;
        let _guard = lock.lock().await;

        let current = self.current_state(agent_id).await?;
        if current != LifecycleState::Running {
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: LifecycleState::Updating,
            });
        }

        let environment = self
            .current_deployment_unlocked(agent_id)
            .await
            .map(|d| d.environment)
            .unwrap_or(DeploymentEnvironment::Production);

        self.run_deployment(agent_id, new_version, environment, LifecycleState::Updating, true)
            .await
    }

    /// Resize a `running` agent
    pub async fn scale(&self, agent_id: &AgentId, instances: u32) -> Result<(), LifecycleError> {
        let lock = self.op_lock(agent_id).await;
        let _guard = lock.lock().await;

        let current = self.current_state(agent_id).await?;
        if current != LifecycleState::Running {
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: LifecycleState::Scaling,
            });
        }

        self.transition(
            agent_id,
            LifecycleState::Scaling,
            &format!("scaling to {} instances", instances),
        )
        .await?;

        match self.executor.scale(agent_id, instances).await {
            Ok(()) => {
                if let Some(id) = self.current_deployments.read().await.get(agent_id).cloned() {
                    let mut deployments = self.deployments.write().await;
                    if let Some(deployment) = deployments.get_mut(&id) {
                        deployment.instances = instances;
                        deployment.updated_at = Utc::now();
                    }
                }
                self.transition(agent_id, LifecycleState::Running, "scaling complete")
                    .await
            }
            Err(message) => {
                self.transition(
                    agent_id,
                    LifecycleState::Failed,
                    &format!("scaling failed: {}", message),
                )
                .await?;
                self.emit_error(agent_id, "scale", &message);
                Err(LifecycleError::ExecutorError {
                    operation: "scale".to_string(),
                    message,
                })
            }
        }
    }

    /// Roll a `running` or `failed` agent back to an earlier version
    pub async fn rollback(
        &self,
        agent_id: &AgentId,
        target_version: &str,
        reason: &str,
    ) -> Result<Rollback, LifecycleError> {
        let lock = self.op_lock(agent_id).await;
        let _guard = lock.lock().await;

        let current = self.current_state(agent_id).await?;
        if !matches!(current, LifecycleState::Running | LifecycleState::Failed) {
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: LifecycleState::RollingBack,
            });
        }

        let deployment = self
            .current_deployment_unlocked(agent_id)
            .await
            .ok_or_else(|| LifecycleError::DeploymentNotFound(agent_id.to_string()))?;

        self.transition(agent_id, LifecycleState::RollingBack, reason)
            .await?;

        let mut record = Rollback {
            id: String::new(),
            deployment_id: deployment.id.clone(),
            from_version: deployment.version.clone(),
            to_version: target_version.to_string(),
            reason: reason.to_string(),
            status: RollbackStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        {
            let mut rollbacks = self.rollbacks.write().await;
            // re-roll on the (vanishingly rare) id collision
            let mut id = generate_id(&format!("rollback-{}", agent_id));
            while rollbacks.contains_key(&id) {
                id = generate_id(&format!("rollback-{}", agent_id));
            }
            record.id = id;
            rollbacks.insert(record.id.clone(), record.clone());
        }

        self.events.emit(ControlEvent::new(
            ControlEventType::RollbackStarted,
            agent_id.clone(),
            serde_json::json!({
                "rollback_id": record.id,
                "from_version": record.from_version,
                "to_version": record.to_version,
                "reason": reason,
            }),
        ));

        let bound = Duration::from_secs(self.config.rollback_timeout_secs);
        let outcome = match timeout(bound, self.executor.rollback(agent_id, &record)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Rollback of {} timed out", agent_id);
                self.finish_rollback(&mut record, RollbackStatus::Failed).await;
                self.transition(agent_id, LifecycleState::Failed, "rollback timeout")
                    .await?;
                self.emit_error(agent_id, "rollback", "rollback timeout");
                return Err(LifecycleError::OperationTimeout {
                    operation: "rollback".to_string(),
                    seconds: self.config.rollback_timeout_secs,
                });
            }
        };

        match outcome {
            Ok(()) => {
                self.finish_rollback(&mut record, RollbackStatus::Completed).await;
                self.transition(agent_id, LifecycleState::Running, "rollback complete")
                    .await?;
                self.events.emit(ControlEvent::new(
                    ControlEventType::RollbackCompleted,
                    agent_id.clone(),
                    serde_json::json!({
                        "rollback_id": record.id,
                        "to_version": record.to_version,
                    }),
                ));
                info!(
                    "Rolled back {} from v{} to v{}",
                    agent_id, record.from_version, record.to_version
                );
                Ok(record)
            }
            Err(message) => {
                self.finish_rollback(&mut record, RollbackStatus::Failed).await;
                self.transition(
                    agent_id,
                    LifecycleState::Failed,
                    &format!("rollback failed: {}", message),
                )
                .await?;
                self.emit_error(agent_id, "rollback", &message);
                Err(LifecycleError::ExecutorError {
                    operation: "rollback".to_string(),
                    message,
                })
            }
        }
    }

    /// Stop an agent. Already-stopped and deregistered agents are a no-op
    /// and record no transition.
    pub async fn stop(&self, agent_id: &AgentId) -> Result<(), LifecycleError> {
        let lock = self.op_lock(agent_id).await;
        let _guard = lock.lock().await;
        self.stop_locked(agent_id).await
    }

    /// Deregister an agent, stopping it first if it is running, then purge
    /// its transition log, deployments, and rollbacks. Already-deregistered
    /// agents are a no-op, like `stop` on a stopped agent.
    pub async fn deregister(&self, agent_id: &AgentId) -> Result<(), LifecycleError> {
        let lock = self.op_lock(agent_id).await;
        let _guard = lock.lock().await;

        let current = self.current_state(agent_id).await?;
        if current == LifecycleState::Deregistered {
            return Ok(());
        }
        if matches!(current, LifecycleState::Running | LifecycleState::Failed) {
            self.stop_locked(agent_id).await?;
        }

        self.transition(agent_id, LifecycleState::Deregistered, "deregistered")
            .await?;

        // purge history; the terminal state itself is kept
        self.transitions.write().await.remove(agent_id);
        let removed_deployment_ids: Vec<String> = {
            let mut deployments = self.deployments.write().await;
            let ids: Vec<String> = deployments
                .values()
                .filter(|d| &d.agent_id == agent_id)
                .map(|d| d.id.clone())
                .collect();
            for id in &ids {
                deployments.remove(id);
            }
            ids
        };
        self.current_deployments.write().await.remove(agent_id);
        {
            let mut rollbacks = self.rollbacks.write().await;
            rollbacks.retain(|_, r| !removed_deployment_ids.contains(&r.deployment_id));
        }

        info!("Deregistered agent {} from lifecycle tracking", agent_id);
        Ok(())
    }

    async fn stop_locked(&self, agent_id: &AgentId) -> Result<(), LifecycleError> {
        let current = self.current_state(agent_id).await?;
        if matches!(
            current,
            LifecycleState::Stopped | LifecycleState::Deregistered
        ) {
            return Ok(());
        }

        self.transition(agent_id, LifecycleState::Stopping, "stop requested")
            .await?;

        match self.executor.stop(agent_id).await {
            Ok(()) => {
                self.transition(agent_id, LifecycleState::Stopped, "stop complete")
                    .await
            }
            Err(message) => {
                self.transition(
                    agent_id,
                    LifecycleState::Failed,
                    &format!("stop failed: {}", message),
                )
                .await?;
                self.emit_error(agent_id, "stop", &message);
                Err(LifecycleError::ExecutorError {
                    operation: "stop".to_string(),
                    message,
                })
            }
        }
    }

    /// Shared deploy body used by both `deploy` and `update`
    async fn run_deployment(
        &self,
        agent_id: &AgentId,
        version: &str,
        environment: DeploymentEnvironment,
        via: LifecycleState,
        supersede_previous: bool,
    ) -> Result<Deployment, LifecycleError> {
        let previous_deployment_id = self
            .current_deployments
            .read()
            .await
            .get(agent_id)
            .cloned();

        self.transition(agent_id, via, &format!("deploying version {}", version))
            .await?;

        let now = Utc::now();
        let mut deployment = Deployment {
            id: String::new(),
            agent_id: agent_id.clone(),
            version: version.to_string(),
            environment,
            status: DeploymentStatus::Pending,
            instances: 1,
            resources: HashMap::new(),
            configuration: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        {
            let mut deployments = self.deployments.write().await;
            // re-roll on the (vanishingly rare) id collision
            let mut id = generate_id(&format!("deploy-{}", agent_id));
            while deployments.contains_key(&id) {
                id = generate_id(&format!("deploy-{}", agent_id));
            }
            deployment.id = id;
            deployments.insert(deployment.id.clone(), deployment.clone());
        }

        self.events.emit(ControlEvent::new(
            ControlEventType::DeploymentStarted,
            agent_id.clone(),
            serde_json::json!({
                "deployment_id": deployment.id,
                "version": version,
                "environment": environment,
            }),
        ));

        let bound = Duration::from_secs(self.config.deployment_timeout_secs);
        let outcome = match timeout(bound, self.executor.deploy(agent_id, &deployment)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Deployment {} for {} timed out", deployment.id, agent_id);
                self.set_deployment_status(&deployment.id, DeploymentStatus::Failed)
                    .await;
                self.transition(agent_id, LifecycleState::Failed, "deploy timeout")
                    .await?;
                self.emit_error(agent_id, "deploy", "deploy timeout");
                return Err(LifecycleError::OperationTimeout {
                    operation: "deploy".to_string(),
                    seconds: self.config.deployment_timeout_secs,
                });
            }
        };

        match outcome {
            Ok(()) => {
                self.set_deployment_status(&deployment.id, DeploymentStatus::Running)
                    .await;
                deployment.status = DeploymentStatus::Running;
                if supersede_previous {
                    if let Some(previous_id) = previous_deployment_id {
                        self.set_deployment_status(&previous_id, DeploymentStatus::Superseded)
                            .await;
                    }
                }
                self.current_deployments
                    .write()
                    .await
                    .insert(agent_id.clone(), deployment.id.clone());

                self.transition(agent_id, LifecycleState::Running, "deployment complete")
                    .await?;
                self.events.emit(ControlEvent::new(
                    ControlEventType::DeploymentCompleted,
                    agent_id.clone(),
                    serde_json::json!({
                        "deployment_id": deployment.id,
                        "version": version,
                    }),
                ));
                info!("Deployed {} v{} ({})", agent_id, version, deployment.id);
                Ok(deployment)
            }
            Err(message) => {
                self.set_deployment_status(&deployment.id, DeploymentStatus::Failed)
                    .await;
                self.transition(
                    agent_id,
                    LifecycleState::Failed,
                    &format!("deployment failed: {}", message),
                )
                .await?;
                self.emit_error(agent_id, "deploy", &message);
                Err(LifecycleError::ExecutorError {
                    operation: "deploy".to_string(),
                    message,
                })
            }
        }
    }

    /// Record and apply a state change; rejects anything outside the table
    async fn transition(
        &self,
        agent_id: &AgentId,
        to: LifecycleState,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        let from = {
            let mut states = self.states.write().await;
            let current = states
                .get(agent_id)
                .copied()
                .ok_or_else(|| LifecycleError::AgentNotFound(agent_id.clone()))?;
            if !is_transition_allowed(current, to) {
                return Err(LifecycleError::InvalidTransition { from: current, to });
            }
            states.insert(agent_id.clone(), to);
            current
        };

        let transition = LifecycleTransition {
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
            metadata: None,
        };
        self.transitions
            .write()
            .await
            .entry(agent_id.clone())
            .or_default()
            .push(transition);

        info!("Agent {} transitioned {} -> {} ({})", agent_id, from, to, reason);
        self.events.emit(ControlEvent::new(
            ControlEventType::StateChanged,
            agent_id.clone(),
            serde_json::json!({
                "from": from,
                "to": to,
                "reason": reason,
            }),
        ));
        Ok(())
    }

    async fn current_state(&self, agent_id: &AgentId) -> Result<LifecycleState, LifecycleError> {
        self.states
            .read()
            .await
            .get(agent_id)
            .copied()
            .ok_or_else(|| LifecycleError::AgentNotFound(agent_id.clone()))
    }

    async fn current_deployment_unlocked(&self, agent_id: &AgentId) -> Option<Deployment> {
        let current = self.current_deployments.read().await;
        let id = current.get(agent_id)?;
        self.deployments.read().await.get(id).cloned()
    }

    async fn set_deployment_status(&self, deployment_id: &str, status: DeploymentStatus) {
        let mut deployments = self.deployments.write().await;
        if let Some(deployment) = deployments.get_mut(deployment_id) {
            deployment.status = status;
            deployment.updated_at = Utc::now();
        }
    }

    async fn finish_rollback(&self, record: &mut Rollback, status: RollbackStatus) {
        record.status = status;
        record.completed_at = Some(Utc::now());
        let mut rollbacks = self.rollbacks.write().await;
        rollbacks.insert(record.id.clone(), record.clone());
    }

    async fn op_lock(&self, agent_id: &AgentId) -> Arc<Mutex<()>> {
        let mut locks = self.op_locks.lock().await;
        Arc::clone(locks.entry(agent_id.clone()).or_default())
    }

    fn emit_error(&self, agent_id: &AgentId, operation: &str, message: &str) {
        self.events.emit(ControlEvent::new(
            ControlEventType::Error,
            agent_id.clone(),
            serde_json::json!({
                "operation": operation,
                "message": message,
            }),
        ));
    }

    /// Discovery registry handle shared with the other subsystems
    pub fn registry(&self) -> Arc<DiscoveryRegistry> {
        Arc::clone(&self.registry)
    }
}
