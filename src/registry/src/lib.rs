//! # Fleet Registry - Agent Discovery and Capability Indexing
//!
//! Foundation crate of the fleet control plane. It provides:
//!
//! - **Registration Protocol**: Validates registration requests and
//!   materializes agent records with operational defaults
//! - **Capability Registry**: Versioned index of capabilities and their
//!   providers with category and tag indices
//! - **Discovery Registry**: The authoritative agent store with
//!   multi-criteria search, health updates, and statistics
//! - **Event Bus**: Typed control plane events fanned out to isolated
//!   subscribers
//!
//! The health checker, lifecycle manager, and scheduler crates all build on
//! the types and registries defined here.

pub mod capability;
pub mod discovery;
pub mod events;
pub mod metrics;
pub mod registration;
pub mod types;

pub use capability::*;
pub use discovery::*;
pub use events::*;
pub use registration::{generate_id, to_record, validate, RegistrationRequest, ValidationReport};
pub use types::*;
