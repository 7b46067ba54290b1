//! # Lifecycle Executor
//!
//! The manager owns the state machine but delegates the actual work of each
//! operation (provisioning, shipping a version, resizing, tearing down) to
//! an executor. Deployments in the real fleet go through an orchestration
//! backend; tests and embedded setups use [`NoopExecutor`].

use crate::types::*;
use async_trait::async_trait;
use fleet_registry::AgentId;
use tracing::debug;

/// External collaborator that performs lifecycle work
#[async_trait]
pub trait LifecycleExecutor: Send + Sync {
    /// Initialization work run between `initializing` and `registered`
    async fn initialize(&self, agent_id: &AgentId) -> Result<(), String>;

    /// Ship a version; runs while the agent is `deploying` or `updating`
    async fn deploy(&self, agent_id: &AgentId, deployment: &Deployment) -> Result<(), String>;

    /// Resize to the requested instance count
    async fn scale(&self, agent_id: &AgentId, instances: u32) -> Result<(), String>;

    /// Revert to the rollback's target version
    async fn rollback(&self, agent_id: &AgentId, rollback: &Rollback) -> Result<(), String>;

    /// Tear down the running agent
    async fn stop(&self, agent_id: &AgentId) -> Result<(), String>;
}

/// Executor that succeeds immediately without doing any work
pub struct NoopExecutor;

#[async_trait]
impl LifecycleExecutor for NoopExecutor {
    async fn initialize(&self, agent_id: &AgentId) -> Result<(), String> {
        debug!("No-op initialize for {}", agent_id);
        Ok(())
    }

    async fn deploy(&self, agent_id: &AgentId, deployment: &Deployment) -> Result<(), String> {
        debug!(
            "No-op deploy of {} v{} ({})",
            agent_id, deployment.version, deployment.id
        );
        Ok(())
    }

    async fn scale(&self, agent_id: &AgentId, instances: u32) -> Result<(), String> {
        debug!("No-op scale of {} to {} instances", agent_id, instances);
        Ok(())
    }

    async fn rollback(&self, agent_id: &AgentId, rollback: &Rollback) -> Result<(), String> {
        debug!(
            "No-op rollback of {} to v{} ({})",
            agent_id, rollback.to_version, rollback.id
        );
        Ok(())
    }

    async fn stop(&self, agent_id: &AgentId) -> Result<(), String> {
        debug!("No-op stop for {}", agent_id);
        Ok(())
    }
}
