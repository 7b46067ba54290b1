//! # Capability Registry
//!
//! Versioned index of every capability offered across the fleet. Keeps three
//! indices: capability id to versioned record, category to ids, and tag to
//! ids. Version ordering is numeric semver, so `1.10.0` beats `1.9.0`.

use crate::types::*;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Registry of capabilities and their providers
pub struct CapabilityRegistry {
    /// capability id -> versioned record
    records: Arc<RwLock<HashMap<String, VersionedCapability>>>,
    /// category -> capability ids
    by_category: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    /// tag -> capability ids
    by_tag: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            by_category: Arc::new(RwLock::new(HashMap::new())),
            by_tag: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register one capability for an agent, inserting or merging.
    ///
    /// A new capability id creates a fresh record. A known id gets the
    /// version added to its sorted set and the provider recorded; the stored
    /// descriptor always comes from the highest-version registration. The
    /// same version re-registered with a differing descriptor is a conflict:
    /// the first descriptor wins and a warning is logged.
    pub async fn register(
        &self,
        agent_id: &AgentId,
        capability: &CapabilityDescriptor,
    ) -> Result<(), RegistryError> {
        let version = semver::Version::parse(&capability.version).map_err(|_| {
            RegistryError::InvalidCapabilityVersion {
                capability: capability.id.clone(),
                version: capability.version.clone(),
            }
        })?;

        let mut records = self.records.write().await;
        match records.entry(capability.id.clone()) {
            Entry::Vacant(slot) => {
                debug!(
                    "New capability '{}' v{} from agent {}",
                    capability.id, version, agent_id
                );
                let mut providers = HashSet::new();
                providers.insert(agent_id.clone());
                slot.insert(VersionedCapability {
                    descriptor: capability.clone(),
                    versions: vec![version.clone()],
                    latest_version: version,
                    providers,
                    deprecated: false,
                });
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.versions.contains(&version) {
                    if record.descriptor.version == capability.version
                        && record.descriptor != *capability
                    {
                        warn!(
                            "Capability version conflict: '{}' v{} re-registered by {} \
                             with a differing descriptor; keeping the first",
                            capability.id, version, agent_id
                        );
                    }
                } else {
                    record.versions.push(version.clone());
                    record.versions.sort();
                }
                // descriptor follows the highest version; on a tie the
                // first registration wins
                if version > record.latest_version {
                    record.latest_version = version;
                    record.descriptor = capability.clone();
                }
                record.providers.insert(agent_id.clone());
                record.deprecated = false;
            }
        }
        drop(records);

        self.index_capability(capability).await;
        Ok(())
    }

    async fn index_capability(&self, capability: &CapabilityDescriptor) {
        if !capability.category.is_empty() {
            let mut by_category = self.by_category.write().await;
            by_category
                .entry(capability.category.clone())
                .or_default()
                .insert(capability.id.clone());
        }
        let mut by_tag = self.by_tag.write().await;
        for tag in &capability.tags {
            by_tag
                .entry(tag.clone())
                .or_default()
                .insert(capability.id.clone());
        }
    }

    pub async fn get(&self, capability_id: &str) -> Option<VersionedCapability> {
        self.records.read().await.get(capability_id).cloned()
    }

    /// Agents offering any version of the capability
    pub async fn providers_of(&self, capability_id: &str) -> HashSet<AgentId> {
        self.records
            .read()
            .await
            .get(capability_id)
            .map(|r| r.providers.clone())
            .unwrap_or_default()
    }

    /// Search capabilities; filters combine with AND, results are sorted by
    /// latest version descending then name ascending, paginated after sort.
    pub async fn search(&self, query: &CapabilityQuery) -> CapabilityPage {
        let records = self.records.read().await;

        let mut matches: Vec<&VersionedCapability> = records
            .values()
            .filter(|record| {
                if let Some(category) = &query.category {
                    if &record.descriptor.category != category {
                        return false;
                    }
                }
                if let Some(tags) = &query.tags {
                    if !tags.iter().all(|t| record.descriptor.tags.contains(t)) {
                        return false;
                    }
                }
                if let Some(text) = &query.query {
                    let needle = text.to_lowercase();
                    let name_hit = record.descriptor.name.to_lowercase().contains(&needle);
                    let desc_hit = record
                        .descriptor
                        .description
                        .to_lowercase()
                        .contains(&needle);
                    if !name_hit && !desc_hit {
                        return false;
                    }
                }
                true
            })
            .collect();

        matches.sort_by(|a, b| {
            b.latest_version
                .cmp(&a.latest_version)
                .then_with(|| a.descriptor.name.cmp(&b.descriptor.name))
        });

        let total = matches.len();
        let capabilities = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        CapabilityPage {
            capabilities,
            total,
        }
    }

    /// Remove an agent from every capability it provides.
    ///
    /// Capabilities left with no providers are kept for history but marked
    /// deprecated.
    pub async fn deregister(&self, agent_id: &AgentId) {
        let mut records = self.records.write().await;
        for record in records.values_mut() {
            if record.providers.remove(agent_id) && record.providers.is_empty() {
                debug!(
                    "Capability '{}' has no remaining providers; marking deprecated",
                    record.descriptor.id
                );
                record.deprecated = true;
            }
        }
    }

    /// Provider count per capability id, for registry statistics
    pub async fn provider_counts(&self) -> HashMap<String, usize> {
        self.records
            .read()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.providers.len()))
            .collect()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, version: &str) -> CapabilityDescriptor {
        CapabilityDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            description: format!("{} capability", id),
            version: version.to_string(),
            category: "general".to_string(),
            tags: vec!["test".to_string()],
            parameters: serde_json::Value::Null,
            returns: "json".to_string(),
            examples: Vec::new(),
        }
    }

    fn agent(id: &str) -> AgentId {
        AgentId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_merge_versions() {
        let registry = CapabilityRegistry::new();
        registry
            .register(&agent("a1"), &descriptor("translate", "1.0.0"))
            .await
            .unwrap();
        registry
            .register(&agent("a2"), &descriptor("translate", "1.10.0"))
            .await
            .unwrap();
        registry
            .register(&agent("a3"), &descriptor("translate", "1.9.0"))
            .await
            .unwrap();

        let record = registry.get("translate").await.unwrap();
        assert_eq!(record.versions.len(), 3);
        // numeric semver ordering, not lexicographic
        assert_eq!(record.latest_version, semver::Version::new(1, 10, 0));
        assert_eq!(record.descriptor.version, "1.10.0");
        assert_eq!(record.providers.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_version_is_rejected() {
        let registry = CapabilityRegistry::new();
        let result = registry
            .register(&agent("a1"), &descriptor("translate", "latest"))
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::InvalidCapabilityVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_deregister_marks_deprecated() {
        let registry = CapabilityRegistry::new();
        registry
            .register(&agent("a1"), &descriptor("translate", "1.0.0"))
            .await
            .unwrap();
        registry.deregister(&agent("a1")).await;

        let record = registry.get("translate").await.unwrap();
        assert!(record.deprecated);
        assert!(record.providers.is_empty());
    }

    #[tokio::test]
    async fn test_search_filters_and_sorts() {
        let registry = CapabilityRegistry::new();
        registry
            .register(&agent("a1"), &descriptor("alpha", "2.0.0"))
            .await
            .unwrap();
        registry
            .register(&agent("a1"), &descriptor("beta", "3.0.0"))
            .await
            .unwrap();

        let page = registry
            .search(&CapabilityQuery {
                category: Some("general".to_string()),
                tags: None,
                query: None,
                limit: 10,
                offset: 0,
            })
            .await;
        assert_eq!(page.total, 2);
        // latest_version descending
        assert_eq!(page.capabilities[0].descriptor.id, "beta");

        let page = registry
            .search(&CapabilityQuery {
                category: None,
                tags: None,
                query: Some("ALPHA".to_string()),
                limit: 10,
                offset: 0,
            })
            .await;
        assert_eq!(page.total, 1);
        assert_eq!(page.capabilities[0].descriptor.id, "alpha");
    }
}
