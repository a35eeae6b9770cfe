use crate::resources::names::PODS;
use crate::resources::quantities::parse_resource;
use crate::resources::ResourceVector;
use crate::{NodefitError, Result};
use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time view of a node's capacity and what is already committed on it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Capacity available for workloads
    pub allocatable: ResourceVector,
    /// Sum of the requests of workloads bound to this node
    pub committed: ResourceVector,
    /// Like `committed`, but with default cpu/memory substituted for
    /// containers that request none. Used for scoring only.
    pub non_zero_committed: ResourceVector,
    pub pod_count: i64,
    pub allowed_pod_count: i64,
}

impl NodeState {
    pub fn new(name: impl Into<String>, allocatable: ResourceVector, allowed_pod_count: i64) -> Self {
        Self {
            name: name.into(),
            allocatable,
            allowed_pod_count,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set committed usage. The non-zero view is set to the same vector.
    pub fn with_committed(mut self, committed: ResourceVector, pod_count: i64) -> Self {
        self.non_zero_committed = committed.clone();
        self.committed = committed;
        self.pod_count = pod_count;
        self
    }

    /// Account for one more workload bound to this node
    pub fn commit(&mut self, requests: &ResourceVector, non_zero_requests: &ResourceVector) {
        self.committed.add(requests);
        self.non_zero_committed.add(non_zero_requests);
        self.pod_count += 1;
    }

    /// The node as if nothing were bound to it yet
    pub fn fresh_view(&self) -> NodeState {
        NodeState {
            name: self.name.clone(),
            labels: self.labels.clone(),
            allocatable: self.allocatable.clone(),
            allowed_pod_count: self.allowed_pod_count,
            ..Default::default()
        }
    }
}

impl TryFrom<&Node> for NodeState {
    type Error = NodefitError;

    fn try_from(node: &Node) -> Result<Self> {
        let name = node
            .metadata
            .name
            .clone()
            .ok_or_else(|| NodefitError::missing_field("metadata.name"))?;

        let (allocatable, allowed_pod_count) =
            match node.status.as_ref().and_then(|s| s.allocatable.as_ref()) {
                Some(list) => {
                    let pods = match list.get(PODS) {
                        Some(q) => parse_resource(PODS, q)?,
                        None => 0,
                    };
                    (ResourceVector::from_resource_list(list)?, pods)
                }
                None => (ResourceVector::default(), 0),
            };

        Ok(Self {
            name,
            labels: node.metadata.labels.clone().unwrap_or_default(),
            allocatable,
            allowed_pod_count,
            ..Default::default()
        })
    }
}
