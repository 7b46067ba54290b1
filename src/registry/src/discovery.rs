//! # Discovery Registry
//!
//! The authoritative in-memory index of agents. Holds the `agent_id` to
//! record map plus tag and namespace inverted indices, and cascades
//! capability registration into the [`CapabilityRegistry`]. Health updates
//! flow in from the health checker; scheduling and lifecycle decisions flow
//! out through queries.

use crate::capability::CapabilityRegistry;
use crate::metrics;
use crate::types::*;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Authoritative agent store with inverted indices
pub struct DiscoveryRegistry {
    /// agent id -> record
    agents: Arc<RwLock<HashMap<AgentId, AgentRecord>>>,
    /// tag -> agent ids
    by_tag: Arc<RwLock<HashMap<String, HashSet<AgentId>>>>,
    /// namespace -> agent ids
    by_namespace: Arc<RwLock<HashMap<String, HashSet<AgentId>>>>,
    /// shared capability index
    capabilities: Arc<CapabilityRegistry>,
}

impl DiscoveryRegistry {
    pub fn new() -> Self {
        Self::with_capabilities(Arc::new(CapabilityRegistry::new()))
    }

    /// Build around an existing capability registry (shared with callers)
    pub fn with_capabilities(capabilities: Arc<CapabilityRegistry>) -> Self {
        info!("Initializing discovery registry");
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            by_tag: Arc::new(RwLock::new(HashMap::new())),
            by_namespace: Arc::new(RwLock::new(HashMap::new())),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> Arc<CapabilityRegistry> {
        Arc::clone(&self.capabilities)
    }

    /// Register an agent record.
    ///
    /// Fails with `RegistrationConflict` when the id is taken. On success the
    /// agent's declared capabilities are registered and all indices updated.
    pub async fn register(&self, record: AgentRecord) -> Result<(), RegistryError> {
        {
            let mut agents = self.agents.write().await;
            if agents.contains_key(&record.id) {
                return Err(RegistryError::RegistrationConflict(record.id.clone()));
            }
            agents.insert(record.id.clone(), record.clone());
        }

        for capability in &record.metadata.capabilities {
            if let Err(err) = self.capabilities.register(&record.id, capability).await {
                // roll the insert back so a half-indexed agent never lingers
                self.capabilities.deregister(&record.id).await;
                self.agents.write().await.remove(&record.id);
                return Err(err);
            }
        }

        {
            let mut by_tag = self.by_tag.write().await;
            for tag in &record.metadata.tags {
                by_tag
                    .entry(tag.clone())
                    .or_default()
                    .insert(record.id.clone());
            }
        }
        {
            let mut by_namespace = self.by_namespace.write().await;
            by_namespace
                .entry(record.policy.isolation.namespace.clone())
                .or_default()
                .insert(record.id.clone());
        }

        metrics::record_agent_registered();
        info!(
            "Registered agent {} ({} capabilities)",
            record.id,
            record.metadata.capabilities.len()
        );
        Ok(())
    }

    /// Remove an agent and every index entry pointing at it
    pub async fn deregister(&self, agent_id: &AgentId) -> Result<AgentRecord, RegistryError> {
        let record = {
            let mut agents = self.agents.write().await;
            agents
                .remove(agent_id)
                .ok_or_else(|| RegistryError::AgentNotFound(agent_id.clone()))?
        };

        self.capabilities.deregister(agent_id).await;

        {
            let mut by_tag = self.by_tag.write().await;
            for tag in &record.metadata.tags {
                if let Some(ids) = by_tag.get_mut(tag) {
                    ids.remove(agent_id);
                    if ids.is_empty() {
                        by_tag.remove(tag);
                    }
                }
            }
        }
        {
            let mut by_namespace = self.by_namespace.write().await;
            let namespace = &record.policy.isolation.namespace;
            if let Some(ids) = by_namespace.get_mut(namespace) {
                ids.remove(agent_id);
                if ids.is_empty() {
                    by_namespace.remove(namespace);
                }
            }
        }

        metrics::record_agent_deregistered();
        info!("Deregistered agent {}", agent_id);
        Ok(record)
    }

    pub async fn get(&self, agent_id: &AgentId) -> Option<AgentRecord> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn all(&self) -> Vec<AgentRecord> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Replace an agent's health block atomically and bump `updated_at`
    pub async fn update_health(
        &self,
        agent_id: &AgentId,
        health: AgentHealth,
    ) -> Result<(), RegistryError> {
        let mut agents = self.agents.write().await;
        let record = agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::AgentNotFound(agent_id.clone()))?;

        debug!(
            "Health update for {}: {} (errors: {})",
            agent_id, health.status, health.error_count
        );
        record.health = health;
        record.metadata.updated_at = Utc::now();
        metrics::record_health_update(record.health.status);
        Ok(())
    }

    /// Agents providing any version of the given capability
    pub async fn search_by_capability(&self, capability_id: &str) -> DiscoveryPage {
        let providers = self.capabilities.providers_of(capability_id).await;
        let agents = self.agents.read().await;
        let mut matched: Vec<AgentRecord> = providers
            .iter()
            .filter_map(|id| agents.get(id).cloned())
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        DiscoveryPage {
            total: matched.len(),
            agents: matched,
        }
    }

    /// Multi-criteria discovery.
    ///
    /// Filters combine with AND. Results sort by health rank descending,
    /// load-balancing weight descending, then id ascending; pagination is
    /// applied after the sort.
    pub async fn discover(&self, query: &DiscoveryQuery) -> DiscoveryPage {
        let capability_filter: Option<HashSet<AgentId>> = match &query.capabilities {
            Some(capability_ids) => {
                let mut intersection: Option<HashSet<AgentId>> = None;
                for capability_id in capability_ids {
                    let providers = self.capabilities.providers_of(capability_id).await;
                    intersection = Some(match intersection {
                        None => providers,
                        Some(acc) => acc.intersection(&providers).cloned().collect(),
                    });
                }
                intersection
            }
            None => None,
        };

        let agents = self.agents.read().await;
        let mut matched: Vec<&AgentRecord> = agents
            .values()
            .filter(|record| {
                if let Some(providers) = &capability_filter {
                    if !providers.contains(&record.id) {
                        return false;
                    }
                }
                if let Some(tags) = &query.tags {
                    if !tags.iter().all(|t| record.metadata.tags.contains(t)) {
                        return false;
                    }
                }
                if let Some(namespace) = &query.namespace {
                    if &record.policy.isolation.namespace != namespace {
                        return false;
                    }
                }
                if let Some(status) = query.status {
                    if record.health.status != status {
                        return false;
                    }
                }
                true
            })
            .collect();

        matched.sort_by(|a, b| {
            b.health
                .status
                .rank()
                .cmp(&a.health.status.rank())
                .then_with(|| {
                    b.policy
                        .load_balancing
                        .weight
                        .cmp(&a.policy.load_balancing.weight)
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        DiscoveryPage {
            agents: page,
            total,
        }
    }

    /// Aggregate statistics over the whole registry
    pub async fn statistics(&self) -> RegistryStatistics {
        let agents = self.agents.read().await;
        let mut stats = RegistryStatistics {
            total_agents: agents.len(),
            ..Default::default()
        };

        for record in agents.values() {
            match record.health.status {
                HealthStatus::Healthy => stats.healthy += 1,
                HealthStatus::Degraded => stats.degraded += 1,
                HealthStatus::Unhealthy => stats.unhealthy += 1,
                HealthStatus::Unknown => stats.unknown += 1,
            }
            *stats
                .by_namespace
                .entry(record.policy.isolation.namespace.clone())
                .or_default() += 1;
        }
        drop(agents);

        stats.by_capability_count = self.capabilities.provider_counts().await;
        stats
    }
}

impl Default for DiscoveryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
