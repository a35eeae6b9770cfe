use crate::config::FeatureGates;
use crate::requests::{pod_requests, RequestOptions};
use crate::{Result, SchedulerError};
use nodefit_core::{NodeState, Workload};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read access to the nodes of the current scheduling snapshot
pub trait NodeLister: Send + Sync {
    /// Get a node by name
    fn get(&self, node_name: &str) -> Result<Arc<NodeState>>;

    /// All nodes, in name order
    fn list(&self) -> Vec<Arc<NodeState>>;
}

/// Immutable view of the cluster taken at the start of a scheduling attempt
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    nodes: BTreeMap<String, Arc<NodeState>>,
}

impl Snapshot {
    /// Build a snapshot from nodes and the workloads already bound to them.
    /// Workloads bound to unknown nodes are ignored.
    pub fn new(
        nodes: impl IntoIterator<Item = NodeState>,
        workloads: &[Workload],
        features: &FeatureGates,
    ) -> Self {
        let mut states: BTreeMap<String, NodeState> =
            nodes.into_iter().map(|n| (n.name.clone(), n)).collect();

        let opts = RequestOptions::from_features(features);
        for workload in workloads {
            let Some(node_name) = &workload.node_name else {
                continue;
            };
            match states.get_mut(node_name) {
                Some(state) => {
                    state.commit(
                        &pod_requests(workload, opts),
                        &pod_requests(workload, opts.with_non_zero_defaults()),
                    );
                }
                None => {
                    warn!(
                        "Workload {} is bound to unknown node {}",
                        workload, node_name
                    );
                }
            }
        }

        debug!(
            "Built snapshot with {} nodes from {} workloads",
            states.len(),
            workloads.len()
        );

        Self {
            nodes: states
                .into_iter()
                .map(|(name, state)| (name, Arc::new(state)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl NodeLister for Snapshot {
    fn get(&self, node_name: &str) -> Result<Arc<NodeState>> {
        self.nodes
            .get(node_name)
            .cloned()
            .ok_or_else(|| SchedulerError::node_not_found(node_name))
    }

    fn list(&self) -> Vec<Arc<NodeState>> {
        self.nodes.values().cloned().collect()
    }
}
