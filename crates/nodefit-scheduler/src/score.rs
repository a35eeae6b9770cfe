use crate::config::{
    ResourceSpec, ScoringStrategyConfig, ScoringStrategyType, MAX_CUSTOM_PRIORITY_SCORE,
};
use crate::{Result, SchedulerError};
use nodefit_core::resources::is_scalar_resource_name;
use nodefit_core::resources::names::{CPU, EPHEMERAL_STORAGE, MEMORY};
use nodefit_core::NodeState;
use tracing::debug;

/// Highest score a node can receive
pub const MAX_NODE_SCORE: i64 = 100;

/// Utilization percentage used when the pod would overcommit the node
const MAX_UTILIZATION: i64 = 100;

/// A point of the broken-linear utilization function, already scaled to
/// the node score range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionShapePoint {
    pub utilization: i64,
    pub score: i64,
}

/// Evaluate the piecewise-linear function defined by `shape` at `p`
fn broken_linear(shape: &[FunctionShapePoint], p: i64) -> i64 {
    for (i, point) in shape.iter().enumerate() {
        if p <= point.utilization {
            if i == 0 {
                return point.score;
            }
            let prev = shape[i - 1];
            return prev.score
                + (point.score - prev.score) * (p - prev.utilization)
                    / (point.utilization - prev.utilization);
        }
    }
    shape.last().map(|last| last.score).unwrap_or(0)
}

fn least_requested_score(requested: i64, capacity: i64) -> i64 {
    if capacity == 0 || requested > capacity {
        return 0;
    }
    (capacity - requested) * MAX_NODE_SCORE / capacity
}

fn most_requested_score(requested: i64, capacity: i64) -> i64 {
    if capacity == 0 {
        return 0;
    }
    requested.min(capacity) * MAX_NODE_SCORE / capacity
}

/// How a node's allocation is turned into a score
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoringStrategy {
    /// Prefer nodes with the most free capacity left
    LeastAllocated,
    /// Prefer nodes that are already busy
    MostAllocated,
    /// Map utilization through a user supplied shape
    RequestedToCapacityRatio { shape: Vec<FunctionShapePoint> },
}

impl ScoringStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LeastAllocated => "LeastAllocated",
            Self::MostAllocated => "MostAllocated",
            Self::RequestedToCapacityRatio { .. } => "RequestedToCapacityRatio",
        }
    }

    /// Combine per-resource (requested, allocatable) pairs into a node score.
    /// A resource with nothing allocatable scores 0 but keeps its weight.
    fn combine(&self, resources: &[ResourceSpec], requested: &[i64], allocatable: &[i64]) -> i64 {
        let mut node_score = 0;
        let mut weight_sum = 0;

        match self {
            Self::LeastAllocated | Self::MostAllocated => {
                for (i, resource) in resources.iter().enumerate() {
                    weight_sum += resource.weight;
                    if allocatable[i] == 0 {
                        continue;
                    }
                    let score = if matches!(self, Self::LeastAllocated) {
                        least_requested_score(requested[i], allocatable[i])
                    } else {
                        most_requested_score(requested[i], allocatable[i])
                    };
                    node_score += score * resource.weight;
                }
                if weight_sum == 0 {
                    return 0;
                }
                node_score / weight_sum
            }
            Self::RequestedToCapacityRatio { shape } => {
                for (i, resource) in resources.iter().enumerate() {
                    weight_sum += resource.weight;
                    if allocatable[i] == 0 {
                        continue;
                    }
                    let utilization = if requested[i] > allocatable[i] {
                        MAX_UTILIZATION
                    } else {
                        requested[i] * MAX_UTILIZATION / allocatable[i]
                    };
                    node_score += broken_linear(shape, utilization) * resource.weight;
                }
                if weight_sum == 0 {
                    return 0;
                }
                (node_score as f64 / weight_sum as f64).round() as i64
            }
        }
    }
}

/// Scores nodes by how the pod's request would load the configured resources
#[derive(Debug, Clone)]
pub struct ResourceAllocationScorer {
    strategy: ScoringStrategy,
    resources: Vec<ResourceSpec>,
}

impl ResourceAllocationScorer {
    pub fn new(config: &ScoringStrategyConfig) -> Result<Self> {
        let strategy = match config.kind {
            ScoringStrategyType::LeastAllocated => ScoringStrategy::LeastAllocated,
            ScoringStrategyType::MostAllocated => ScoringStrategy::MostAllocated,
            ScoringStrategyType::RequestedToCapacityRatio => {
                let param = config.requested_to_capacity_ratio.as_ref().ok_or_else(|| {
                    SchedulerError::invalid_config(
                        "requestedToCapacityRatio is required for the RequestedToCapacityRatio strategy",
                        "Add a requestedToCapacityRatio.shape list",
                    )
                })?;
                let scale = MAX_NODE_SCORE / MAX_CUSTOM_PRIORITY_SCORE as i64;
                let shape = param
                    .shape
                    .iter()
                    .map(|p| FunctionShapePoint {
                        utilization: p.utilization as i64,
                        score: p.score as i64 * scale,
                    })
                    .collect();
                ScoringStrategy::RequestedToCapacityRatio { shape }
            }
        };

        Ok(Self {
            strategy,
            resources: config.resources.clone(),
        })
    }

    pub fn strategy(&self) -> &ScoringStrategy {
        &self.strategy
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    /// Allocatable and post-placement requested amount of one resource
    fn allocatable_and_requested(node: &NodeState, name: &str, pod_request: i64) -> (i64, i64) {
        if pod_request == 0 && is_scalar_resource_name(name) {
            return (0, 0);
        }
        match name {
            CPU | MEMORY | EPHEMERAL_STORAGE => (
                node.allocatable.get(name),
                node.non_zero_committed.get(name) + pod_request,
            ),
            _ => match node.allocatable.scalar.get(name) {
                Some(&allocatable) => (allocatable, node.committed.get(name) + pod_request),
                None => (0, 0),
            },
        }
    }

    /// Score a node given the pod's requests, ordered like `resources()`
    pub fn score(&self, node: &NodeState, pod_requests: &[i64]) -> i64 {
        let mut requested = vec![0; self.resources.len()];
        let mut allocatable = vec![0; self.resources.len()];

        for (i, resource) in self.resources.iter().enumerate() {
            let pod_request = pod_requests.get(i).copied().unwrap_or(0);
            let (alloc, req) = Self::allocatable_and_requested(node, &resource.name, pod_request);
            if alloc == 0 {
                continue;
            }
            allocatable[i] = alloc;
            requested[i] = req;
        }

        let score = self.strategy.combine(&self.resources, &requested, &allocatable);
        debug!(
            "Node {} {} score: {} (requested: {:?}, allocatable: {:?})",
            node.name,
            self.strategy.name(),
            score,
            requested,
            allocatable
        );
        score
    }
}
