use crate::requests::{pod_requests, RequestOptions};
use nodefit_core::resources::is_extended_resource_name;
use nodefit_core::resources::names::{CPU, EPHEMERAL_STORAGE, MEMORY, PODS};
use nodefit_core::{NodeState, ResourceVector, Workload};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::warn;

/// A resource the node cannot provide for the pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientResource {
    pub resource_name: Cow<'static, str>,
    pub reason: Cow<'static, str>,
    pub requested: i64,
    pub used: i64,
    pub capacity: i64,
}

/// Which side of a capability comparison is better
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    /// The node must offer at least the requested value
    Higher,
    /// The node must offer at most the requested value
    Lower,
}

/// A node capability advertised through a label and requested as a scalar resource
#[derive(Debug, Clone, Copy)]
pub struct CapabilityDimension {
    pub resource: &'static str,
    pub label: &'static str,
    pub preference: Preference,
    pub record_name: &'static str,
    pub reason: &'static str,
}

impl CapabilityDimension {
    fn satisfied_by(&self, requested: i64, offered: i64) -> bool {
        match self.preference {
            Preference::Higher => requested <= offered,
            Preference::Lower => requested >= offered,
        }
    }
}

pub const CAPABILITY_DIMENSIONS: [CapabilityDimension; 3] = [
    CapabilityDimension {
        resource: "custom/custom.io-speed",
        label: "node.kubernetes.io/io-speed",
        preference: Preference::Higher,
        record_name: "I/O Speed",
        reason: "Insufficient I/O speed",
    },
    CapabilityDimension {
        resource: "custom/custom.latency",
        label: "node.kubernetes.io/latency",
        preference: Preference::Lower,
        record_name: "Latency",
        reason: "Insufficient latency capability",
    },
    CapabilityDimension {
        resource: "custom/custom.bandwidth",
        label: "node.kubernetes.io/bandwidth",
        preference: Preference::Higher,
        record_name: "Bandwidth",
        reason: "Insufficient bandwidth",
    },
];

fn check_fixed(
    insufficient: &mut Vec<InsufficientResource>,
    name: &'static str,
    reason: &'static str,
    requested: i64,
    allocatable: i64,
    committed: i64,
) {
    if requested > 0 && requested > allocatable - committed {
        insufficient.push(InsufficientResource {
            resource_name: Cow::Borrowed(name),
            reason: Cow::Borrowed(reason),
            requested,
            used: committed,
            capacity: allocatable,
        });
    }
}

/// Check a pod request against a node and return every shortfall.
///
/// The order of the result is pods, cpu, memory, ephemeral storage, label
/// capabilities, then scalar resources in name order. Extended resources in
/// `ignored_resources`, or whose group is in `ignored_groups`, are not checked.
pub fn fits_request(
    request: &ResourceVector,
    node: &NodeState,
    ignored_resources: &HashSet<String>,
    ignored_groups: &HashSet<String>,
) -> Vec<InsufficientResource> {
    let mut insufficient = Vec::new();

    if node.pod_count + 1 > node.allowed_pod_count {
        insufficient.push(InsufficientResource {
            resource_name: Cow::Borrowed(PODS),
            reason: Cow::Borrowed("Too many pods"),
            requested: 1,
            used: node.pod_count,
            capacity: node.allowed_pod_count,
        });
    }

    check_fixed(
        &mut insufficient,
        CPU,
        "Insufficient cpu",
        request.milli_cpu,
        node.allocatable.milli_cpu,
        node.committed.milli_cpu,
    );
    check_fixed(
        &mut insufficient,
        MEMORY,
        "Insufficient memory",
        request.memory,
        node.allocatable.memory,
        node.committed.memory,
    );
    check_fixed(
        &mut insufficient,
        EPHEMERAL_STORAGE,
        "Insufficient ephemeral-storage",
        request.ephemeral_storage,
        node.allocatable.ephemeral_storage,
        node.committed.ephemeral_storage,
    );

    for dimension in &CAPABILITY_DIMENSIONS {
        let Some(value) = node.labels.get(dimension.label) else {
            continue;
        };
        let requested = request.get(dimension.resource);
        if requested <= 0 {
            continue;
        }
        let offered = match value.trim().parse::<i64>() {
            Ok(offered) => offered,
            Err(e) => {
                warn!(
                    "Ignoring label {}={} on node {}: {}",
                    dimension.label, value, node.name, e
                );
                continue;
            }
        };
        if !dimension.satisfied_by(requested, offered) {
            insufficient.push(InsufficientResource {
                resource_name: Cow::Borrowed(dimension.record_name),
                reason: Cow::Borrowed(dimension.reason),
                requested,
                used: offered,
                capacity: offered,
            });
        }
    }

    for (name, &requested) in &request.scalar {
        if requested == 0 {
            continue;
        }
        if is_extended_resource_name(name) {
            let ignored_group = !ignored_groups.is_empty()
                && name
                    .split('/')
                    .next()
                    .is_some_and(|group| ignored_groups.contains(group));
            if ignored_resources.contains(name) || ignored_group {
                continue;
            }
        }

        let allocatable = node.allocatable.get(name);
        let committed = node.committed.get(name);
        if requested > allocatable - committed {
            insufficient.push(InsufficientResource {
                resource_name: Cow::Owned(name.clone()),
                reason: Cow::Owned(format!("Insufficient {}", name)),
                requested,
                used: committed,
                capacity: allocatable,
            });
        }
    }

    insufficient
}

/// Check a workload against a node with default aggregation and no exclusions
pub fn fits(workload: &Workload, node: &NodeState) -> Vec<InsufficientResource> {
    let request = pod_requests(workload, RequestOptions::default());
    fits_request(&request, node, &HashSet::new(), &HashSet::new())
}

/// Whether the workload would fit the node if nothing else were bound to it
pub fn is_fit(workload: &Workload, node: Option<&NodeState>) -> bool {
    match node {
        Some(node) => fits(workload, &node.fresh_view()).is_empty(),
        None => false,
    }
}
