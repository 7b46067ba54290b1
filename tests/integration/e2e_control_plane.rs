//! End-to-end control plane flow: admit an agent, deploy it, probe its
//! health, schedule work onto it, and evict it — with events observed at
//! every step.

use async_trait::async_trait;
use fleet_control::*;
use fleet_healthcheck::{HealthCheckError, ProbeRequest, ProbeResponse, ProbeTransport};
use fleet_lifecycle::{DeploymentEnvironment, LifecycleState, NoopExecutor};
use fleet_registry::*;
use fleet_scheduler::{JobSpec, TaskStatus};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Transport that replays a script of responses
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ProbeResponse, HealthCheckError>>>,
}

impl ScriptedTransport {
    fn healthy_forever() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
        })
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn execute(&self, _request: ProbeRequest) -> Result<ProbeResponse, HealthCheckError> {
        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return scripted;
        }
        let body = serde_json::to_vec(&serde_json::json!({"status": "healthy"})).unwrap();
        Ok(ProbeResponse {
            status_code: 200,
            reason: "OK".to_string(),
            content_length: Some(body.len() as u64),
            body,
        })
    }
}

fn registration(id: &str) -> RegistrationRequest {
    RegistrationRequest {
        agent_id: id.to_string(),
        name: format!("Agent {}", id),
        version: "1.0.0".to_string(),
        description: "summarization worker".to_string(),
        author: "fleet".to_string(),
        license: "MIT".to_string(),
        repository: String::new(),
        documentation: String::new(),
        tags: vec!["worker".to_string()],
        resources: ResourceRequirements::default(),
        dependencies: Vec::new(),
        capabilities: vec![CapabilityDescriptor {
            id: "summarize".to_string(),
            name: "Summarize".to_string(),
            description: "Summarize text".to_string(),
            version: "1.2.0".to_string(),
            category: "nlp".to_string(),
            tags: vec!["text".to_string()],
            parameters: serde_json::Value::Null,
            returns: "text".to_string(),
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
    }
}

fn control_plane() -> ControlPlane {
    ControlPlane::with_collaborators(
        ControlPlaneConfig::default(),
        ScriptedTransport::healthy_forever() as Arc<dyn ProbeTransport>,
        Arc::new(NoopExecutor),
    )
}

#[tokio::test]
async fn test_admit_probe_schedule_evict_flow() {
    let plane = control_plane();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    plane.subscribe(move |event| {
        seen_clone.lock().unwrap().push(event.event_type);
    });

    // admit: record stored, lifecycle registered, monitoring armed
    let record = plane.admit(registration("agent-1")).await.unwrap();
    assert_eq!(
        plane.lifecycle().state(&record.id).await,
        Some(LifecycleState::Registered)
    );
    assert!(plane.registry().get(&record.id).await.is_some());

    // capability search reaches the same agent
    let page = plane.registry().search_by_capability("summarize").await;
    assert_eq!(page.total, 1);

    // deploy to production
    plane
        .lifecycle()
        .deploy(&record.id, "1.0.0", DeploymentEnvironment::Production)
        .await
        .unwrap();
    assert_eq!(
        plane.lifecycle().state(&record.id).await,
        Some(LifecycleState::Running)
    );

    // probe: the scripted transport reports healthy, which lands in the
    // registry and makes the agent schedulable
    let result = plane.health_checker().perform_check(&record.id).await;
    assert_eq!(result.status, HealthStatus::Healthy);
    assert_eq!(
        plane.registry().get(&record.id).await.unwrap().health.status,
        HealthStatus::Healthy
    );

    // schedule a job onto the (only) healthy agent
    let job = plane
        .submit_job(JobSpec {
            name: "digest".to_string(),
            owner: "e2e".to_string(),
            parameters: Default::default(),
            priority: None,
        })
        .await;
    assert_eq!(job.tasks.len(), 1);
    let task = plane.scheduler().task(&job.tasks[0]).await.unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.assigned_agent_id.as_ref(), Some(&record.id));

    plane
        .scheduler()
        .complete_task(&job.tasks[0], record.id.clone())
        .await;
    assert_eq!(plane.scheduler().collect_metrics().await.completed, 1);

    // evict: monitoring stopped, lifecycle deregistered, record gone
    plane.evict(&record.id).await.unwrap();
    assert!(plane.registry().get(&record.id).await.is_none());
    assert_eq!(
        plane.lifecycle().state(&record.id).await,
        Some(LifecycleState::Deregistered)
    );

    let seen = seen.lock().unwrap();
    assert!(seen.contains(&ControlEventType::StateChanged));
    assert!(seen.contains(&ControlEventType::DeploymentStarted));
    assert!(seen.contains(&ControlEventType::DeploymentCompleted));
    assert!(seen.contains(&ControlEventType::HealthCheckCompleted));
    assert!(seen.contains(&ControlEventType::HealthStatusChanged));

    plane.shutdown().await;
}

#[tokio::test]
async fn test_admit_rejects_invalid_registration() {
    let plane = control_plane();
    let mut request = registration("agent-1");
    request.capabilities.clear();

    let result = plane.admit(request).await;
    assert!(result.is_err());
    assert!(plane.registry().is_empty().await);
}

#[tokio::test]
async fn test_admit_rejects_duplicate_agent() {
    let plane = control_plane();
    plane.admit(registration("agent-1")).await.unwrap();

    let result = plane.admit(registration("agent-1")).await;
    assert!(result.is_err());
    assert_eq!(plane.registry().len().await, 1);
    plane.shutdown().await;
}

#[tokio::test]
async fn test_statistics_reflect_probed_fleet() {
    let plane = control_plane();
    let a = plane.admit(registration("agent-a")).await.unwrap();
    let b = plane.admit(registration("agent-b")).await.unwrap();

    plane.health_checker().perform_check(&a.id).await;
    plane.health_checker().perform_check(&b.id).await;

    let stats = plane.registry().statistics().await;
    assert_eq!(stats.total_agents, 2);
    assert_eq!(stats.healthy, 2);
    assert_eq!(stats.by_capability_count.get("summarize"), Some(&2));

    plane.shutdown().await;
}
