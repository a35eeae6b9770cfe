use crate::config::FeatureGates;
use crate::fit::is_fit;
use crate::requests::{pod_requests, RequestOptions};
use crate::types::QueueingHint;
use crate::{Result, SchedulerError};
use nodefit_core::{ClusterEvent, Workload};
use tracing::debug;

/// Whether a pod change may have freed resources the waiting workload needs
pub fn is_schedulable_after_pod_change(
    workload: &Workload,
    event: &ClusterEvent,
    features: &FeatureGates,
) -> Result<QueueingHint> {
    match event {
        ClusterEvent::PodDeleted { old } => {
            if old.is_assigned() {
                debug!(
                    "Assigned pod {} was deleted, may make {} schedulable",
                    old, workload
                );
                Ok(QueueingHint::Queue)
            } else {
                debug!("Deleted pod {} was never assigned, skipping", old);
                Ok(QueueingHint::QueueSkip)
            }
        }
        ClusterEvent::PodUpdated { old, new } => {
            if !features.in_place_pod_vertical_scaling {
                return Ok(QueueingHint::QueueSkip);
            }
            if is_resource_scale_down(workload, old, new, features) {
                debug!(
                    "Pod {} scaled down a resource requested by {}",
                    new, workload
                );
                Ok(QueueingHint::Queue)
            } else {
                Ok(QueueingHint::QueueSkip)
            }
        }
        other => Err(SchedulerError::unexpected_event(
            "pod change",
            format!("{:?}", other.kind()),
        )),
    }
}

/// Whether `modified` requests less than `original` of something `target`
/// asks for, in a way that can help `target`
pub fn is_resource_scale_down(
    target: &Workload,
    original: &Workload,
    modified: &Workload,
    features: &FeatureGates,
) -> bool {
    if modified.uid != target.uid && !modified.is_assigned() {
        return false;
    }

    let opts = RequestOptions::from_features(features);
    let wanted = pod_requests(target, opts);
    let before = pod_requests(original, opts);
    let after = pod_requests(modified, opts);

    let scaled_down = wanted
        .requested_names()
        .any(|name| before.get(name) > after.get(name));
    scaled_down
}

/// Whether the waiting workload fits a node that was added or changed
pub fn is_schedulable_after_node_change(
    workload: &Workload,
    event: &ClusterEvent,
) -> Result<QueueingHint> {
    let node = match event {
        ClusterEvent::NodeAdded { new } | ClusterEvent::NodeUpdated { new, .. } => new,
        other => {
            return Err(SchedulerError::unexpected_event(
                "node change",
                format!("{:?}", other.kind()),
            ))
        }
    };

    if is_fit(workload, Some(node)) {
        debug!("Node {} may fit {}", node.name, workload);
        Ok(QueueingHint::Queue)
    } else {
        debug!("Node {} cannot fit {}", node.name, workload);
        Ok(QueueingHint::QueueSkip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodefit_core::{ContainerSpec, NodeState, ResourceVector};
    use std::sync::Arc;

    fn in_place() -> FeatureGates {
        FeatureGates {
            in_place_pod_vertical_scaling: true,
            ..Default::default()
        }
    }

    fn workload(name: &str, requests: ResourceVector) -> Workload {
        Workload::new("default", name).with_container(ContainerSpec::new("app", requests))
    }

    fn updated(old: Workload, new: Workload) -> ClusterEvent {
        ClusterEvent::PodUpdated {
            old: Arc::new(old),
            new: Arc::new(new),
        }
    }

    #[test]
    fn test_pod_deleted() {
        let waiting = workload("a", ResourceVector::new().with_milli_cpu(100));

        let assigned = ClusterEvent::PodDeleted {
            old: Arc::new(workload("b", ResourceVector::new()).on_node("node1")),
        };
        assert_eq!(
            is_schedulable_after_pod_change(&waiting, &assigned, &FeatureGates::default()).unwrap(),
            QueueingHint::Queue
        );

        let unassigned = ClusterEvent::PodDeleted {
            old: Arc::new(workload("b", ResourceVector::new())),
        };
        assert_eq!(
            is_schedulable_after_pod_change(&waiting, &unassigned, &FeatureGates::default()).unwrap(),
            QueueingHint::QueueSkip
        );
    }

    #[test]
    fn test_pod_update_without_in_place_scaling() {
        let waiting = workload("a", ResourceVector::new().with_milli_cpu(100));
        let event = updated(
            workload("b", ResourceVector::new().with_milli_cpu(1000)).on_node("node1"),
            workload("b", ResourceVector::new().with_milli_cpu(100)).on_node("node1"),
        );
        assert_eq!(
            is_schedulable_after_pod_change(&waiting, &event, &FeatureGates::default()).unwrap(),
            QueueingHint::QueueSkip
        );
    }

    #[test]
    fn test_scale_down_of_requested_resource() {
        let waiting = workload("a", ResourceVector::new().with_scalar("example.com/gpu", 1));

        let mut old = workload("b", ResourceVector::new().with_milli_cpu(1000).with_scalar("example.com/gpu", 2))
            .on_node("node1");
        old.uid = "uid-b".to_string();
        let mut gpu_down = old.clone();
        gpu_down.containers[0].requests.scalar.insert("example.com/gpu".to_string(), 1);
        assert_eq!(
            is_schedulable_after_pod_change(&waiting, &updated(old.clone(), gpu_down), &in_place()).unwrap(),
            QueueingHint::Queue
        );

        let mut cpu_down = old.clone();
        cpu_down.containers[0].requests.milli_cpu = 500;
        assert_eq!(
            is_schedulable_after_pod_change(&waiting, &updated(old, cpu_down), &in_place()).unwrap(),
            QueueingHint::QueueSkip
        );
    }

    #[test]
    fn test_scale_down_of_unassigned_pod() {
        let waiting = workload("a", ResourceVector::new().with_milli_cpu(100));
        let old = workload("b", ResourceVector::new().with_milli_cpu(1000));
        let mut new = old.clone();
        new.containers[0].requests.milli_cpu = 500;
        assert!(!is_resource_scale_down(&waiting, &old, &new, &in_place()));

        // the waiting pod itself shrinking counts even though it is unassigned
        let mut shrunk = waiting.clone();
        shrunk.containers[0].requests.milli_cpu = 50;
        assert!(is_resource_scale_down(&waiting, &waiting, &shrunk, &in_place()));
    }

    #[test]
    fn test_scale_up_is_skipped() {
        let waiting = workload("a", ResourceVector::new().with_memory(100));
        let old = workload("b", ResourceVector::new().with_memory(100)).on_node("node1");
        let mut new = old.clone();
        new.containers[0].requests.memory = 200;
        assert!(!is_resource_scale_down(&waiting, &old, &new, &in_place()));
    }

    #[test]
    fn test_node_change() {
        let waiting = workload("a", ResourceVector::new().with_milli_cpu(2000));
        let small = Arc::new(NodeState::new("small", ResourceVector::new().with_milli_cpu(1000), 10));
        let big = Arc::new(
            NodeState::new("big", ResourceVector::new().with_milli_cpu(4000), 10)
                .with_committed(ResourceVector::new().with_milli_cpu(4000), 4),
        );

        assert_eq!(
            is_schedulable_after_node_change(&waiting, &ClusterEvent::NodeAdded { new: small.clone() })
                .unwrap(),
            QueueingHint::QueueSkip
        );
        // committed usage is ignored: the node is judged fresh
        assert_eq!(
            is_schedulable_after_node_change(
                &waiting,
                &ClusterEvent::NodeUpdated {
                    old: small,
                    new: big
                }
            )
            .unwrap(),
            QueueingHint::Queue
        );
    }

    #[test]
    fn test_mismatched_events_are_errors() {
        let waiting = workload("a", ResourceVector::new());
        let node_event = ClusterEvent::NodeDeleted {
            old: Arc::new(NodeState::default()),
        };
        assert!(matches!(
            is_schedulable_after_pod_change(&waiting, &node_event, &FeatureGates::default()),
            Err(SchedulerError::UnexpectedEvent { .. })
        ));
        assert!(is_schedulable_after_node_change(&waiting, &node_event).is_err());

        let pod_event = ClusterEvent::PodAdded {
            new: Arc::new(waiting.clone()),
        };
        assert!(is_schedulable_after_node_change(&waiting, &pod_event).is_err());
    }
}
