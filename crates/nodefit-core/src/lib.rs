//! Nodefit Core - Resource model for node fitness decisions
//!
//! This crate provides:
//! - Resource vectors and Kubernetes quantity parsing
//! - Workload and node snapshots converted from k8s-openapi objects
//! - Typed cluster change events
//! - Error types with miette diagnostics
//! - Serialization helpers

pub mod error;
pub mod events;
pub mod node;
pub mod resources;
pub mod workload;

// Re-export commonly used types
pub use error::{NodefitError, Result};
pub use events::{ActionType, ClusterEvent, EventKind, EventResource, ResourceEvent, WatchEventType};
pub use node::NodeState;
pub use resources::{ResourceList, ResourceVector};
pub use workload::{ContainerSpec, ResizeStatus, Workload};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};

/// Serialize a resource to JSON
pub fn to_json<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_json::to_string(resource).map_err(|e| {
        NodefitError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        NodefitError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Serialize a resource to YAML
pub fn to_yaml<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_yaml::to_string(resource).map_err(|e| {
        NodefitError::serialization_error(
            format!("Failed to serialize to YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        NodefitError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize every document of a multi-document YAML stream
pub fn from_yaml_documents<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<Vec<T>> {
    serde_yaml::Deserializer::from_str(data)
        .map(|doc| {
            T::deserialize(doc).map_err(|e| {
                NodefitError::serialization_error(
                    format!("Failed to deserialize from YAML: {}", e),
                    Some(Box::new(e)),
                )
            })
        })
        .collect()
}
