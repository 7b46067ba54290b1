//! # Registration Protocol
//!
//! Stateless validation and materialization of registration requests. A
//! request is checked field by field, then turned into an [`AgentRecord`]
//! with operational defaults filled in. Id generation for callers that do
//! not supply their own ids lives here as well.

use crate::types::*;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use validator::Validate;

/// Protocols the control plane knows how to reach
pub const KNOWN_PROTOCOLS: &[&str] = &["http", "https", "grpc", "ws", "tcp"];

/// Incoming registration request, before validation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegistrationRequest {
    pub agent_id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Semver version string
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub capabilities: Vec<CapabilityDescriptor>,
    pub endpoint: AgentEndpoint,
    /// Optional policy overrides; defaults applied where absent
    #[serde(default)]
    pub load_balancing: Option<LoadBalancingPolicy>,
    #[serde(default)]
    pub isolation: Option<IsolationPolicy>,
    #[serde(default)]
    pub scaling: Option<ScalingPolicy>,
}

/// Outcome of validating a registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate a registration request without mutating any state.
///
/// Collects every problem rather than stopping at the first, so callers can
/// report the full list back to the registering agent.
pub fn validate(request: &RegistrationRequest) -> ValidationReport {
    let mut errors = Vec::new();

    if request.agent_id.trim().is_empty() {
        errors.push("agent_id must not be empty".to_string());
    }
    if request.name.trim().is_empty() {
        errors.push("name must not be empty".to_string());
    }
    if let Err(field_errors) = request.validate() {
        for (field, errs) in field_errors.field_errors() {
            for err in errs {
                errors.push(format!("{}: {}", field, err.code));
            }
        }
    }

    if request.capabilities.is_empty() {
        errors.push("at least one capability is required".to_string());
    }
    for (index, capability) in request.capabilities.iter().enumerate() {
        if capability.id.trim().is_empty() {
            errors.push(format!("capability[{}]: id must not be empty", index));
        }
        if capability.name.trim().is_empty() {
            errors.push(format!("capability[{}]: name must not be empty", index));
        }
        if capability.version.trim().is_empty() {
            errors.push(format!("capability[{}]: version must not be empty", index));
        } else if semver::Version::parse(&capability.version).is_err() {
            errors.push(format!(
                "capability[{}]: version '{}' is not valid semver",
                index, capability.version
            ));
        }
    }

    if Url::parse(&request.endpoint.url).is_err() {
        errors.push(format!(
            "endpoint url '{}' is not a valid URL",
            request.endpoint.url
        ));
    }
    if !KNOWN_PROTOCOLS.contains(&request.endpoint.protocol.as_str()) {
        errors.push(format!(
            "unknown endpoint protocol '{}'",
            request.endpoint.protocol
        ));
    }

    let valid = errors.is_empty();
    if !valid {
        debug!(
            "Registration request for '{}' failed validation with {} errors",
            request.agent_id,
            errors.len()
        );
    }

    ValidationReport { valid, errors }
}

/// Materialize an agent record from a validated request, filling defaults.
///
/// Returns `InvalidRegistration` if the request has not passed [`validate`].
pub fn to_record(request: RegistrationRequest) -> Result<AgentRecord, RegistryError> {
    let report = validate(&request);
    if !report.valid {
        return Err(RegistryError::InvalidRegistration(report.errors));
    }

    let now = Utc::now();
    let id = AgentId::new(request.agent_id)?;

    Ok(AgentRecord {
        id,
        metadata: AgentMetadata {
            name: request.name,
            version: request.version,
            description: request.description,
            author: request.author,
            license: request.license,
            repository: request.repository,
            documentation: request.documentation,
            tags: request.tags,
            resources: request.resources,
            dependencies: request.dependencies,
            capabilities: request.capabilities,
            created_at: now,
            updated_at: now,
        },
        endpoint: request.endpoint,
        policy: OperationalPolicy {
            load_balancing: request.load_balancing.unwrap_or_default(),
            isolation: request.isolation.unwrap_or_default(),
            scaling: request.scaling.unwrap_or_default(),
        },
        health: AgentHealth::default(),
    })
}

/// Generate an id of the form `{prefix}-{base36 millis}-{6 random base36 chars}`.
///
/// Collisions are astronomically unlikely but still possible; callers that
/// store these ids (jobs, deployments, rollbacks) re-roll on insert conflict
/// rather than trusting uniqueness here.
pub fn generate_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| BASE36_CHARS[rng.gen_range(0..BASE36_CHARS.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, base36(millis), suffix)
}

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_CHARS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> RegistrationRequest {
        RegistrationRequest {
            agent_id: "agent-1".to_string(),
            name: "Text Summarizer".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            author: String::new(),
            license: String::new(),
            repository: String::new(),
            documentation: String::new(),
            tags: vec!["nlp".to_string()],
            resources: ResourceRequirements::default(),
            dependencies: Vec::new(),
            capabilities: vec![CapabilityDescriptor {
                id: "summarize".to_string(),
                name: "Summarize".to_string(),
                description: "Summarize text".to_string(),
                version: "1.0.0".to_string(),
                category: "nlp".to_string(),
                tags: Vec::new(),
                parameters: serde_json::Value::Null,
                returns: "text".to_string(),
                examples: Vec::new(),
            }],
            endpoint: AgentEndpoint {
                url: "http://localhost:8080".to_string(),
                protocol: "http".to_string(),
                authentication: AuthenticationInfo::default(),
            },
            load_balancing: None,
            isolation: None,
            scaling: None,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        let report = validate(&sample_request());
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn test_missing_fields_are_collected() {
        let mut request = sample_request();
        request.agent_id = String::new();
        request.capabilities.clear();
        request.endpoint.url = "not a url".to_string();
        request.endpoint.protocol = "carrier-pigeon".to_string();

        let report = validate(&request);
        assert!(!report.valid);
        assert!(report.errors.len() >= 4);
    }

    #[test]
    fn test_capability_version_must_be_semver() {
        let mut request = sample_request();
        request.capabilities[0].version = "one".to_string();
        let report = validate(&request);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("semver")));
    }

    #[test]
    fn test_to_record_fills_defaults() {
        let record = to_record(sample_request()).unwrap();
        assert_eq!(record.id.as_str(), "agent-1");
        assert_eq!(record.policy.load_balancing.weight, 1);
        assert_eq!(record.policy.isolation.namespace, "default");
        assert_eq!(record.health.status, HealthStatus::Unknown);
        assert_eq!(record.health.error_count, 0);
    }

    #[test]
    fn test_generated_id_shape() {
        let id = generate_id("agent");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "agent");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[1].chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
