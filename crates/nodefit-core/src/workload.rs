use crate::resources::ResourceVector;
use crate::{NodefitError, Result};
use k8s_openapi::api::core::v1::{Container, Pod};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Container restart policy that turns an init container into a sidecar
pub const RESTART_POLICY_ALWAYS: &str = "Always";

/// Status of an in-place resize requested on a running pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeStatus {
    Proposed,
    InProgress,
    Deferred,
    Infeasible,
}

impl ResizeStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Proposed" => Some(Self::Proposed),
            "InProgress" => Some(Self::InProgress),
            "Deferred" => Some(Self::Deferred),
            "Infeasible" => Some(Self::Infeasible),
            _ => None,
        }
    }
}

/// A container as seen by the resource engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub requests: ResourceVector,
    /// Resources listed in the requests with an explicit zero amount
    #[serde(default)]
    pub explicit_zero: BTreeSet<String>,
    /// Init container that keeps running next to the regular containers
    #[serde(default)]
    pub restartable: bool,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, requests: ResourceVector) -> Self {
        Self {
            name: name.into(),
            requests,
            explicit_zero: BTreeSet::new(),
            restartable: false,
        }
    }

    /// Mark this (init) container as restartable
    pub fn restartable(mut self) -> Self {
        self.restartable = true;
        self
    }

    /// Record that the container asks for exactly zero of `resource`
    pub fn with_explicit_zero(mut self, resource: impl Into<String>) -> Self {
        self.explicit_zero.insert(resource.into());
        self
    }

    /// Whether `resource` is either requested or explicitly set to zero
    pub fn specifies(&self, resource: &str) -> bool {
        self.requests.get(resource) != 0 || self.explicit_zero.contains(resource)
    }
}

impl TryFrom<&Container> for ContainerSpec {
    type Error = NodefitError;

    fn try_from(container: &Container) -> Result<Self> {
        let list = container.resources.as_ref().and_then(|r| r.requests.as_ref());
        let requests = match list {
            Some(requests) => ResourceVector::from_resource_list(requests)?,
            None => ResourceVector::default(),
        };
        let explicit_zero = list
            .into_iter()
            .flat_map(|l| l.keys())
            .filter(|name| requests.get(name) == 0)
            .cloned()
            .collect();

        Ok(Self {
            name: container.name.clone(),
            requests,
            explicit_zero,
            restartable: container.restart_policy.as_deref() == Some(RESTART_POLICY_ALWAYS),
        })
    }
}

/// A pod reduced to what resource fitting needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    /// Node the workload is bound to, if any
    pub node_name: Option<String>,
    pub init_containers: Vec<ContainerSpec>,
    pub containers: Vec<ContainerSpec>,
    /// Fixed per-pod cost of the runtime sandbox
    pub overhead: Option<ResourceVector>,
    /// Resources the node has actually allocated, by container name
    #[serde(default)]
    pub allocated: BTreeMap<String, ResourceVector>,
    pub resize: Option<ResizeStatus>,
}

impl Workload {
    /// Create an unassigned workload with a fresh UID
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uuid::Uuid::new_v4().to_string(),
            namespace: namespace.into(),
            name: name.into(),
            node_name: None,
            init_containers: Vec::new(),
            containers: Vec::new(),
            overhead: None,
            allocated: BTreeMap::new(),
            resize: None,
        }
    }

    pub fn with_container(mut self, container: ContainerSpec) -> Self {
        self.containers.push(container);
        self
    }

    pub fn with_init_container(mut self, container: ContainerSpec) -> Self {
        self.init_containers.push(container);
        self
    }

    pub fn with_overhead(mut self, overhead: ResourceVector) -> Self {
        self.overhead = Some(overhead);
        self
    }

    /// Bind the workload to a node
    pub fn on_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    /// Whether the workload has been bound to a node
    pub fn is_assigned(&self) -> bool {
        self.node_name.is_some()
    }

    pub fn has_restartable_init_container(&self) -> bool {
        self.init_containers.iter().any(|c| c.restartable)
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

fn allocated_resources(pod: &Pod) -> Result<BTreeMap<String, ResourceVector>> {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref());

    let mut allocated = BTreeMap::new();
    for status in statuses.into_iter().flatten() {
        if let Some(resources) = &status.allocated_resources {
            allocated.insert(
                status.name.clone(),
                ResourceVector::from_resource_list(resources)?,
            );
        }
    }
    Ok(allocated)
}

impl TryFrom<&Pod> for Workload {
    type Error = NodefitError;

    fn try_from(pod: &Pod) -> Result<Self> {
        let name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| NodefitError::missing_field("metadata.name"))?;
        let spec = pod
            .spec
            .as_ref()
            .ok_or_else(|| NodefitError::missing_field("spec"))?;

        let containers = spec
            .containers
            .iter()
            .map(ContainerSpec::try_from)
            .collect::<Result<Vec<_>>>()?;
        let init_containers = spec
            .init_containers
            .iter()
            .flatten()
            .map(ContainerSpec::try_from)
            .collect::<Result<Vec<_>>>()?;
        let overhead = spec
            .overhead
            .as_ref()
            .map(ResourceVector::from_resource_list)
            .transpose()?;

        let resize = pod
            .status
            .as_ref()
            .and_then(|s| s.resize.as_deref())
            .and_then(ResizeStatus::parse);

        Ok(Self {
            uid: pod
                .metadata
                .uid
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            name,
            node_name: spec.node_name.clone().filter(|n| !n.is_empty()),
            init_containers,
            containers,
            overhead,
            allocated: allocated_resources(pod)?,
            resize,
        })
    }
}
