use crate::node::NodeState;
use crate::workload::Workload;
use crate::{NodefitError, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Watch event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// A change notification as delivered by the watch layer, before typing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// Type of watch event (ADDED, MODIFIED, DELETED)
    pub event_type: WatchEventType,
    /// Kind of the object ("Pod" or "Node")
    pub kind: String,
    /// The object before the change, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<serde_json::Value>,
    /// The object after the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
}

impl ResourceEvent {
    /// Create an ADDED event
    pub fn added(kind: impl Into<String>, object: serde_json::Value) -> Self {
        Self {
            event_type: WatchEventType::Added,
            kind: kind.into(),
            old_object: None,
            object: Some(object),
        }
    }

    /// Create a MODIFIED event
    pub fn modified(
        kind: impl Into<String>,
        old_object: serde_json::Value,
        object: serde_json::Value,
    ) -> Self {
        Self {
            event_type: WatchEventType::Modified,
            kind: kind.into(),
            old_object: Some(old_object),
            object: Some(object),
        }
    }

    /// Create a DELETED event
    pub fn deleted(kind: impl Into<String>, old_object: serde_json::Value) -> Self {
        Self {
            event_type: WatchEventType::Deleted,
            kind: kind.into(),
            old_object: Some(old_object),
            object: None,
        }
    }
}

/// Kind of object a cluster event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventResource {
    Pod,
    Node,
}

/// Bit set of actions. Update is split into finer-grained bits so a plugin
/// can register interest in a subset of updates.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionType(u8);

impl ActionType {
    pub const ADD: ActionType = ActionType(1);
    pub const DELETE: ActionType = ActionType(1 << 1);
    pub const UPDATE_POD_SCALE_DOWN: ActionType = ActionType(1 << 2);
    pub const UPDATE_NODE_ALLOCATABLE: ActionType = ActionType(1 << 3);
    pub const UPDATE_NODE_LABEL: ActionType = ActionType(1 << 4);
    pub const UPDATE_OTHER: ActionType = ActionType(1 << 5);
    pub const UPDATE: ActionType = ActionType(0b11_1100);

    /// Whether the two sets share any action
    pub fn intersects(self, other: ActionType) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ActionType {
    type Output = ActionType;

    fn bitor(self, rhs: Self) -> Self::Output {
        ActionType(self.0 | rhs.0)
    }
}

impl fmt::Debug for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ActionType, &str); 6] = [
            (ActionType::ADD, "Add"),
            (ActionType::DELETE, "Delete"),
            (ActionType::UPDATE_POD_SCALE_DOWN, "UpdatePodScaleDown"),
            (ActionType::UPDATE_NODE_ALLOCATABLE, "UpdateNodeAllocatable"),
            (ActionType::UPDATE_NODE_LABEL, "UpdateNodeLabel"),
            (ActionType::UPDATE_OTHER, "UpdateOther"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(action, _)| self.intersects(*action))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Resource and action a cluster event carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind {
    pub resource: EventResource,
    pub action: ActionType,
}

impl EventKind {
    pub fn new(resource: EventResource, action: ActionType) -> Self {
        Self { resource, action }
    }

    /// Whether an event of kind `other` is covered by this registration
    pub fn matches(&self, other: &EventKind) -> bool {
        self.resource == other.resource && self.action.intersects(other.action)
    }
}

/// A typed cluster change with its before/after snapshots
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    PodAdded { new: Arc<Workload> },
    PodUpdated { old: Arc<Workload>, new: Arc<Workload> },
    PodDeleted { old: Arc<Workload> },
    NodeAdded { new: Arc<NodeState> },
    NodeUpdated { old: Arc<NodeState>, new: Arc<NodeState> },
    NodeDeleted { old: Arc<NodeState> },
}

impl ClusterEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PodAdded { .. } => EventKind::new(EventResource::Pod, ActionType::ADD),
            Self::PodUpdated { .. } => EventKind::new(EventResource::Pod, ActionType::UPDATE),
            Self::PodDeleted { .. } => EventKind::new(EventResource::Pod, ActionType::DELETE),
            Self::NodeAdded { .. } => EventKind::new(EventResource::Node, ActionType::ADD),
            Self::NodeUpdated { .. } => EventKind::new(EventResource::Node, ActionType::UPDATE),
            Self::NodeDeleted { .. } => EventKind::new(EventResource::Node, ActionType::DELETE),
        }
    }

    /// Type a raw watch event. Fails if the payload does not carry the
    /// objects its event type requires or they do not decode.
    pub fn from_watch(event: &ResourceEvent) -> Result<Self> {
        let label = format!("{}/{:?}", event.kind, event.event_type);
        let old = event.old_object.as_ref();
        let new = event.object.as_ref();

        match event.kind.as_str() {
            "Pod" => {
                let decode = |v: &serde_json::Value| -> Result<Arc<Workload>> {
                    let pod: Pod = decode_object(&label, v)?;
                    Ok(Arc::new(Workload::try_from(&pod)?))
                };
                match event.event_type {
                    WatchEventType::Added => Ok(Self::PodAdded {
                        new: decode(require(&label, new, "object")?)?,
                    }),
                    WatchEventType::Modified => Ok(Self::PodUpdated {
                        old: decode(require(&label, old, "old object")?)?,
                        new: decode(require(&label, new, "object")?)?,
                    }),
                    WatchEventType::Deleted => Ok(Self::PodDeleted {
                        old: decode(require(&label, old, "old object")?)?,
                    }),
                }
            }
            "Node" => {
                let decode = |v: &serde_json::Value| -> Result<Arc<NodeState>> {
                    let node: Node = decode_object(&label, v)?;
                    Ok(Arc::new(NodeState::try_from(&node)?))
                };
                match event.event_type {
                    WatchEventType::Added => Ok(Self::NodeAdded {
                        new: decode(require(&label, new, "object")?)?,
                    }),
                    WatchEventType::Modified => Ok(Self::NodeUpdated {
                        old: decode(require(&label, old, "old object")?)?,
                        new: decode(require(&label, new, "object")?)?,
                    }),
                    WatchEventType::Deleted => Ok(Self::NodeDeleted {
                        old: decode(require(&label, old, "old object")?)?,
                    }),
                }
            }
            other => Err(NodefitError::malformed_event(
                label.clone(),
                format!("unsupported kind {}", other),
            )),
        }
    }
}

fn require<'a>(
    label: &str,
    value: Option<&'a serde_json::Value>,
    what: &str,
) -> Result<&'a serde_json::Value> {
    value.ok_or_else(|| NodefitError::malformed_event(label, format!("missing {}", what)))
}

fn decode_object<T: for<'de> Deserialize<'de>>(label: &str, value: &serde_json::Value) -> Result<T> {
    T::deserialize(value).map_err(|e| {
        NodefitError::serialization_error(
            format!("Failed to decode {} payload: {}", label, e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_json(name: &str, node: Option<&str>) -> serde_json::Value {
        let mut spec = serde_json::json!({
            "containers": [{
                "name": "app",
                "resources": {"requests": {"cpu": "500m", "memory": "1Gi"}}
            }]
        });
        if let Some(node) = node {
            spec["nodeName"] = serde_json::json!(node);
        }
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "default", "uid": format!("uid-{}", name)},
            "spec": spec,
        })
    }

    fn node_json(name: &str, cpu: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": name},
            "status": {"allocatable": {"cpu": cpu, "memory": "8Gi", "pods": "110"}}
        })
    }

    #[test]
    fn test_resource_event_serde_roundtrip() {
        let event = ResourceEvent::added("Node", node_json("node1", "4"));

        let serialized = serde_json::to_string(&event).unwrap();
        let deserialized: ResourceEvent = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.event_type, WatchEventType::Added);
        assert_eq!(deserialized.kind, "Node");
        assert!(deserialized.old_object.is_none());
        assert!(serialized.contains("ADDED"));
    }

    #[test]
    fn test_from_watch_pod_events() {
        let event = ResourceEvent::modified(
            "Pod",
            pod_json("web", Some("node1")),
            pod_json("web", Some("node1")),
        );
        match ClusterEvent::from_watch(&event).unwrap() {
            ClusterEvent::PodUpdated { old, new } => {
                assert_eq!(old.uid, "uid-web");
                assert_eq!(new.node_name.as_deref(), Some("node1"));
                assert_eq!(new.containers[0].requests.milli_cpu, 500);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let event = ResourceEvent::deleted("Pod", pod_json("web", None));
        let typed = ClusterEvent::from_watch(&event).unwrap();
        assert!(matches!(typed, ClusterEvent::PodDeleted { .. }));
        assert_eq!(
            typed.kind(),
            EventKind::new(EventResource::Pod, ActionType::DELETE)
        );
    }

    #[test]
    fn test_from_watch_node_added() {
        let event = ResourceEvent::added("Node", node_json("node1", "4"));
        match ClusterEvent::from_watch(&event).unwrap() {
            ClusterEvent::NodeAdded { new } => {
                assert_eq!(new.name, "node1");
                assert_eq!(new.allocatable.milli_cpu, 4000);
                assert_eq!(new.allowed_pod_count, 110);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_from_watch_rejects_malformed_payloads() {
        let mut event = ResourceEvent::modified("Pod", pod_json("a", None), pod_json("a", None));
        event.old_object = None;
        assert!(matches!(
            ClusterEvent::from_watch(&event),
            Err(NodefitError::MalformedEvent { .. })
        ));

        let event = ResourceEvent::added("Service", serde_json::json!({}));
        assert!(matches!(
            ClusterEvent::from_watch(&event),
            Err(NodefitError::MalformedEvent { .. })
        ));

        let event = ResourceEvent::added("Node", serde_json::json!({"metadata": 7}));
        assert!(matches!(
            ClusterEvent::from_watch(&event),
            Err(NodefitError::SerializationError { .. })
        ));
    }

    #[test]
    fn test_event_kind_matching() {
        let registered = EventKind::new(EventResource::Pod, ActionType::DELETE | ActionType::UPDATE_POD_SCALE_DOWN);
        assert!(registered.matches(&EventKind::new(EventResource::Pod, ActionType::UPDATE)));
        assert!(registered.matches(&EventKind::new(EventResource::Pod, ActionType::DELETE)));
        assert!(!registered.matches(&EventKind::new(EventResource::Pod, ActionType::ADD)));
        assert!(!registered.matches(&EventKind::new(EventResource::Node, ActionType::DELETE)));
        assert_eq!(format!("{:?}", ActionType::ADD | ActionType::DELETE), "Add|Delete");
    }
}
