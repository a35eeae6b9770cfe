use crate::config::{FeatureGates, FitArgs};
use crate::cycle_state::{CycleState, PreFilterState, PreScoreState};
use crate::fit::fits_request;
use crate::requests::{compute_pod_resource_request, resource_request_list};
use crate::requeue::{is_schedulable_after_node_change, is_schedulable_after_pod_change};
use crate::score::ResourceAllocationScorer;
use crate::snapshot::NodeLister;
use crate::types::{QueueingHint, Status};
use crate::Result;
use nodefit_core::{ActionType, ClusterEvent, EventKind, EventResource, NodeState, Workload};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Decides whether a cluster event may make a parked workload schedulable
pub type QueueingHintFn =
    Box<dyn Fn(&Workload, &ClusterEvent) -> Result<QueueingHint> + Send + Sync>;

/// An event registration together with the hint that evaluates it
pub struct ClusterEventWithHint {
    pub event: EventKind,
    pub hint: QueueingHintFn,
}

impl std::fmt::Debug for ClusterEventWithHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterEventWithHint")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Base trait of all scheduling plugins
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
}

/// Runs once per attempt before any node is filtered
pub trait PreFilterPlugin: Plugin {
    fn pre_filter(&self, state: &CycleState, workload: &Workload) -> Status;
}

/// Decides whether a single node can host the workload
pub trait FilterPlugin: Plugin {
    fn filter(&self, state: &CycleState, workload: &Workload, node: &NodeState) -> Status;
}

/// Runs once per attempt before any node is scored
pub trait PreScorePlugin: Plugin {
    fn pre_score(&self, state: &CycleState, workload: &Workload, nodes: &[Arc<NodeState>]) -> Status;
}

/// Ranks a feasible node (0-100, higher is better)
pub trait ScorePlugin: Plugin {
    fn score(
        &self,
        state: &CycleState,
        workload: &Workload,
        node_name: &str,
        lister: &dyn NodeLister,
    ) -> Result<i64>;
}

/// Declares which cluster events can make a rejected workload schedulable
pub trait EnqueueExtensions: Plugin {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint>;
}

/// Message returned when a sidecar pod meets a cluster without sidecar support
pub const SIDECARS_DISABLED_REASON: &str =
    "Pod has a restartable init container and the SidecarContainers feature is disabled";

/// Checks that a node has enough free resources for a workload and ranks
/// nodes by how the workload would load them
#[derive(Debug, Clone)]
pub struct Fit {
    ignored_resources: HashSet<String>,
    ignored_resource_groups: HashSet<String>,
    features: FeatureGates,
    scorer: ResourceAllocationScorer,
}

impl Fit {
    pub const NAME: &'static str = "NodeResourcesFit";

    /// Build the plugin from validated arguments
    pub fn new(args: &FitArgs, features: FeatureGates) -> Result<Self> {
        args.validate()?;
        let scorer = ResourceAllocationScorer::new(&args.scoring_strategy)?;

        debug!(
            "Created {} plugin with {} strategy",
            Self::NAME,
            scorer.strategy().name()
        );

        Ok(Self {
            ignored_resources: args.ignored_resources.iter().cloned().collect(),
            ignored_resource_groups: args.ignored_resource_groups.iter().cloned().collect(),
            features,
            scorer,
        })
    }

    pub fn features(&self) -> &FeatureGates {
        &self.features
    }

    pub fn scorer(&self) -> &ResourceAllocationScorer {
        &self.scorer
    }
}

impl Plugin for Fit {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl PreFilterPlugin for Fit {
    fn pre_filter(&self, state: &CycleState, workload: &Workload) -> Status {
        if !self.features.sidecar_containers && workload.has_restartable_init_container() {
            return Status::unresolvable(SIDECARS_DISABLED_REASON);
        }

        let request = compute_pod_resource_request(workload, &self.features);
        match state.write_pre_filter(PreFilterState(request)) {
            Ok(()) => Status::success(),
            Err(e) => Status::error(e),
        }
    }
}

impl FilterPlugin for Fit {
    fn filter(&self, state: &CycleState, workload: &Workload, node: &NodeState) -> Status {
        let request = match state.read_pre_filter() {
            Ok(s) => &s.0,
            Err(e) => return Status::error(e),
        };

        let insufficient = fits_request(
            request,
            node,
            &self.ignored_resources,
            &self.ignored_resource_groups,
        );
        if insufficient.is_empty() {
            return Status::success();
        }

        let reasons: Vec<String> = insufficient.iter().map(|r| r.reason.to_string()).collect();
        debug!(
            "Node {} cannot fit {}: {}",
            node.name,
            workload,
            reasons.join(", ")
        );
        Status::unschedulable(reasons)
    }
}

impl PreScorePlugin for Fit {
    fn pre_score(&self, state: &CycleState, workload: &Workload, _nodes: &[Arc<NodeState>]) -> Status {
        let pod_requests = resource_request_list(workload, self.scorer.resources(), &self.features);
        match state.write_pre_score(PreScoreState { pod_requests }) {
            Ok(()) => Status::success(),
            Err(e) => Status::error(e),
        }
    }
}

impl ScorePlugin for Fit {
    fn score(
        &self,
        state: &CycleState,
        workload: &Workload,
        node_name: &str,
        lister: &dyn NodeLister,
    ) -> Result<i64> {
        let node = lister.get(node_name)?;

        let recomputed;
        let pod_requests = match state.read_pre_score() {
            Ok(s) => s.pod_requests.as_slice(),
            Err(_) => {
                recomputed = resource_request_list(workload, self.scorer.resources(), &self.features);
                recomputed.as_slice()
            }
        };

        Ok(self.scorer.score(&node, pod_requests))
    }
}

impl EnqueueExtensions for Fit {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        let mut pod_actions = ActionType::DELETE;
        if self.features.in_place_pod_vertical_scaling {
            pod_actions = pod_actions | ActionType::UPDATE_POD_SCALE_DOWN;
        }

        let features = self.features;
        vec![
            ClusterEventWithHint {
                event: EventKind::new(EventResource::Pod, pod_actions),
                hint: Box::new(move |workload: &Workload, event: &ClusterEvent| {
                    is_schedulable_after_pod_change(workload, event, &features)
                }),
            },
            ClusterEventWithHint {
                event: EventKind::new(EventResource::Node, ActionType::ADD | ActionType::UPDATE),
                hint: Box::new(is_schedulable_after_node_change),
            },
        ]
    }
}
