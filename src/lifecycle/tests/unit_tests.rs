//! # Lifecycle Manager Unit Tests
//!
//! State machine gating, deployment and rollback bookkeeping, purge on
//! deregister, and operation timeouts.

use async_trait::async_trait;
use fleet_lifecycle::*;
use fleet_registry::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Executor that fails a chosen operation and succeeds at the rest
struct FailingExecutor {
    fail_operation: &'static str,
}

#[async_trait]
impl LifecycleExecutor for FailingExecutor {
    async fn initialize(&self, _agent_id: &AgentId) -> Result<(), String> {
        if self.fail_operation == "initialize" {
            return Err("boot loop".to_string());
        }
        Ok(())
    }

    async fn deploy(&self, _agent_id: &AgentId, _deployment: &Deployment) -> Result<(), String> {
        if self.fail_operation == "deploy" {
            return Err("image pull failed".to_string());
        }
        Ok(())
    }

    async fn scale(&self, _agent_id: &AgentId, _instances: u32) -> Result<(), String> {
        if self.fail_operation == "scale" {
            return Err("quota exceeded".to_string());
        }
        Ok(())
    }

    async fn rollback(&self, _agent_id: &AgentId, _rollback: &Rollback) -> Result<(), String> {
        if self.fail_operation == "rollback" {
            return Err("snapshot missing".to_string());
        }
        Ok(())
    }

    async fn stop(&self, _agent_id: &AgentId) -> Result<(), String> {
        if self.fail_operation == "stop" {
            return Err("hung process".to_string());
        }
        Ok(())
    }
}

/// Executor whose deploy never finishes in time
struct SlowDeployExecutor;

#[async_trait]
impl LifecycleExecutor for SlowDeployExecutor {
    async fn initialize(&self, _agent_id: &AgentId) -> Result<(), String> {
        Ok(())
    }

    async fn deploy(&self, _agent_id: &AgentId, _deployment: &Deployment) -> Result<(), String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    async fn scale(&self, _agent_id: &AgentId, _instances: u32) -> Result<(), String> {
        Ok(())
    }

    async fn rollback(&self, _agent_id: &AgentId, _rollback: &Rollback) -> Result<(), String> {
        Ok(())
    }

    async fn stop(&self, _agent_id: &AgentId) -> Result<(), String> {
        Ok(())
    }
}

fn agent_record(id: &str) -> AgentRecord {
    to_record(RegistrationRequest {
        agent_id: id.to_string(),
        name: format!("Agent {}", id),
        version: "1.0.0".to_string(),
        description: String::new(),
        author: String::new(),
        license: String::new(),
        repository: String::new(),
        documentation: String::new(),
        tags: Vec::new(),
        resources: ResourceRequirements::default(),
        dependencies: Vec::new(),
        capabilities: vec![CapabilityDescriptor {
            id: "echo".to_string(),
            name: "Echo".to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            category: String::new(),
            tags: Vec::new(),
            parameters: serde_json::Value::Null,
            returns: String::new(),
            examples: Vec::new(),
        }],
        endpoint: AgentEndpoint {
            url: format!("http://{}.internal:8080", id),
            protocol: "http".to_string(),
            authentication: AuthenticationInfo::default(),
        },
        load_balancing: None,
        isolation: None,
        scaling: None,
    })
    .unwrap()
}

async fn manager_with(executor: Arc<dyn LifecycleExecutor>) -> (LifecycleManager, Arc<EventBus>, AgentId) {
    let registry = Arc::new(DiscoveryRegistry::new());
    let events = Arc::new(EventBus::new());
    let agent = agent_record("agent-1");
    let agent_id = agent.id.clone();
    registry.register(agent).await.unwrap();

    let manager = LifecycleManager::new(
        registry,
        Arc::clone(&events),
        executor,
        LifecycleConfig::default(),
    );
    (manager, events, agent_id)
}

async fn noop_manager() -> (LifecycleManager, Arc<EventBus>, AgentId) {
    manager_with(Arc::new(NoopExecutor)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_happy_path_initialize_deploy_stop_redeploy() {
        let (manager, _events, agent_id) = noop_manager().await;

        manager.initialize(&agent_id).await.unwrap();
        assert_eq!(
            manager.state(&agent_id).await,
            Some(LifecycleState::Registered)
        );

        let first = manager
            .deploy(&agent_id, "1.0.0", DeploymentEnvironment::Production)
            .await
            .unwrap();
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Running));
        assert_eq!(first.status, DeploymentStatus::Running);
        assert_eq!(
            manager.current_deployment(&agent_id).await.unwrap().id,
            first.id
        );

        manager.stop(&agent_id).await.unwrap();
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Stopped));

        let second = manager
            .deploy(&agent_id, "1.1.0", DeploymentEnvironment::Production)
            .await
            .unwrap();
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Running));
        assert_ne!(second.id, first.id);
        assert_eq!(second.version, "1.1.0");
    }

    #[tokio::test]
    async fn test_scale_from_registered_is_rejected_without_side_effects() {
        let (manager, _events, agent_id) = noop_manager().await;
        manager.initialize(&agent_id).await.unwrap();
        let transitions_before = manager.transitions(&agent_id).await.len();

        let result = manager.scale(&agent_id, 3).await;
        assert!(matches!(
            result,
            Err(LifecycleError::InvalidTransition {
                from: LifecycleState::Registered,
                to: LifecycleState::Scaling,
            })
        ));
        // state untouched, nothing appended
        assert_eq!(
            manager.state(&agent_id).await,
            Some(LifecycleState::Registered)
        );
        assert_eq!(manager.transitions(&agent_id).await.len(), transitions_before);
    }

    #[tokio::test]
    async fn test_scale_round_trip_updates_instances() {
        let (manager, _events, agent_id) = noop_manager().await;
        manager.initialize(&agent_id).await.unwrap();
        manager
            .deploy(&agent_id, "1.0.0", DeploymentEnvironment::Staging)
            .await
            .unwrap();

        manager.scale(&agent_id, 4).await.unwrap();
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Running));
        assert_eq!(
            manager.current_deployment(&agent_id).await.unwrap().instances,
            4
        );
    }

    #[tokio::test]
    async fn test_update_supersedes_previous_deployment() {
        let (manager, _events, agent_id) = noop_manager().await;
        manager.initialize(&agent_id).await.unwrap();
        let first = manager
            .deploy(&agent_id, "1.0.0", DeploymentEnvironment::Staging)
            .await
            .unwrap();

        let second = manager.update(&agent_id, "1.1.0").await.unwrap();
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Running));
        // environment carries over from the deployment being replaced
        assert_eq!(second.environment, DeploymentEnvironment::Staging);
        assert_eq!(
            manager.deployment(&first.id).await.unwrap().status,
            DeploymentStatus::Superseded
        );
        assert_eq!(
            manager.current_deployment(&agent_id).await.unwrap().id,
            second.id
        );
    }

    #[tokio::test]
    async fn test_rollback_records_versions_and_returns_to_running() {
        let (manager, events, agent_id) = noop_manager().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        events.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.event_type);
        });

        manager.initialize(&agent_id).await.unwrap();
        manager
            .deploy(&agent_id, "2.0.0", DeploymentEnvironment::Production)
            .await
            .unwrap();

        let rollback = manager
            .rollback(&agent_id, "1.9.0", "regression in 2.0.0")
            .await
            .unwrap();
        assert_eq!(rollback.from_version, "2.0.0");
        assert_eq!(rollback.to_version, "1.9.0");
        assert_eq!(rollback.status, RollbackStatus::Completed);
        assert!(rollback.completed_at.is_some());
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Running));

        let stored = manager.rollback_record(&rollback.id).await.unwrap();
        assert_eq!(stored.status, RollbackStatus::Completed);

        let seen = seen.lock().unwrap();
        let rollback_events: Vec<_> = seen
            .iter()
            .filter(|t| {
                matches!(
                    t,
                    ControlEventType::RollbackStarted | ControlEventType::RollbackCompleted
                )
            })
            .collect();
        assert_eq!(
            rollback_events,
            vec![
                &ControlEventType::RollbackStarted,
                &ControlEventType::RollbackCompleted
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_deploy_moves_to_failed_and_marks_deployment() {
        let (manager, events, agent_id) = manager_with(Arc::new(FailingExecutor {
            fail_operation: "deploy",
        }))
        .await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        events.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.event_type);
        });

        manager.initialize(&agent_id).await.unwrap();
        let result = manager
            .deploy(&agent_id, "1.0.0", DeploymentEnvironment::Production)
            .await;
        assert!(matches!(result, Err(LifecycleError::ExecutorError { .. })));
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Failed));
        assert!(seen
            .lock()
            .unwrap()
            .contains(&ControlEventType::Error));

        // the failed agent can still be rolled back per the table, but has
        // no deployment to roll back to after a failed first deploy
        let rollback = manager.rollback(&agent_id, "0.9.0", "recover").await;
        assert!(rollback.is_err());
    }

    #[tokio::test]
    async fn test_failed_initialize_reraises() {
        let (manager, _events, agent_id) = manager_with(Arc::new(FailingExecutor {
            fail_operation: "initialize",
        }))
        .await;

        let result = manager.initialize(&agent_id).await;
        assert!(matches!(result, Err(LifecycleError::ExecutorError { .. })));
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Failed));
    }

    #[tokio::test]
    async fn test_stop_on_stopped_agent_is_noop() {
        let (manager, _events, agent_id) = noop_manager().await;
        manager.initialize(&agent_id).await.unwrap();
        manager
            .deploy(&agent_id, "1.0.0", DeploymentEnvironment::Production)
            .await
            .unwrap();
        manager.stop(&agent_id).await.unwrap();

        let transitions_before = manager.transitions(&agent_id).await.len();
        manager.stop(&agent_id).await.unwrap();
        assert_eq!(manager.transitions(&agent_id).await.len(), transitions_before);
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Stopped));
    }

    #[tokio::test]
    async fn test_deregister_stops_running_agent_and_purges() {
        let (manager, _events, agent_id) = noop_manager().await;
        manager.initialize(&agent_id).await.unwrap();
        let deployment = manager
            .deploy(&agent_id, "1.0.0", DeploymentEnvironment::Production)
            .await
            .unwrap();

        manager.deregister(&agent_id).await.unwrap();
        assert_eq!(
            manager.state(&agent_id).await,
            Some(LifecycleState::Deregistered)
        );
        assert!(manager.transitions(&agent_id).await.is_empty());
        assert!(manager.deployment(&deployment.id).await.is_none());
        assert!(manager.current_deployment(&agent_id).await.is_none());

        // terminal: nothing moves out of deregistered, and repeated
        // teardown calls stay no-ops
        assert!(manager.stop(&agent_id).await.is_ok()); // no-op
        assert!(manager.deregister(&agent_id).await.is_ok()); // no-op
        assert_eq!(
            manager.state(&agent_id).await,
            Some(LifecycleState::Deregistered)
        );
        assert!(manager
            .deploy(&agent_id, "1.1.0", DeploymentEnvironment::Production)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_initialize_unknown_agent_fails() {
        let registry = Arc::new(DiscoveryRegistry::new());
        let events = Arc::new(EventBus::new());
        let manager = LifecycleManager::new(
            registry,
            events,
            Arc::new(NoopExecutor),
            LifecycleConfig::default(),
        );

        let ghost = AgentId::new("ghost").unwrap();
        assert!(matches!(
            manager.initialize(&ghost).await,
            Err(LifecycleError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_log_respects_allowed_table() {
        let (manager, _events, agent_id) = noop_manager().await;
        manager.initialize(&agent_id).await.unwrap();
        manager
            .deploy(&agent_id, "1.0.0", DeploymentEnvironment::Production)
            .await
            .unwrap();
        manager.scale(&agent_id, 2).await.unwrap();
        manager.stop(&agent_id).await.unwrap();

        for transition in manager.transitions(&agent_id).await {
            assert!(
                is_transition_allowed(transition.from, transition.to),
                "recorded transition {} -> {} is outside the table",
                transition.from,
                transition.to
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_timeout_fails_agent() {
        let registry = Arc::new(DiscoveryRegistry::new());
        let events = Arc::new(EventBus::new());
        let agent = agent_record("agent-1");
        let agent_id = agent.id.clone();
        registry.register(agent).await.unwrap();

        let manager = LifecycleManager::new(
            registry,
            events,
            Arc::new(SlowDeployExecutor),
            LifecycleConfig {
                deployment_timeout_secs: 1,
                ..Default::default()
            },
        );

        manager.initialize(&agent_id).await.unwrap();
        let result = manager
            .deploy(&agent_id, "1.0.0", DeploymentEnvironment::Production)
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::OperationTimeout { .. })
        ));
        assert_eq!(manager.state(&agent_id).await, Some(LifecycleState::Failed));

        let transitions = manager.transitions(&agent_id).await;
        let last = transitions.last().unwrap();
        assert_eq!(last.to, LifecycleState::Failed);
        assert_eq!(last.reason, "deploy timeout");
    }
}
