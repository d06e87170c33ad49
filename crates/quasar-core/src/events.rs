use crate::cluster::LogicalCluster;
use crate::error::{QuasarError, Result};
use crate::types::ReconcileKey;
use serde::{Deserialize, Serialize};

/// Watch event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// A watched object, decoded once at the watch boundary.
///
/// Closed set: only the resource kinds controllers actually watch appear
/// here, so downstream code never handles untyped payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WatchedObject {
    LogicalCluster(Box<LogicalCluster>),
}

impl WatchedObject {
    /// Derive the reconcile key for this object.
    ///
    /// Fails with `MalformedKey` when the object lacks a name or cluster
    /// identity; callers report the error and drop the event.
    pub fn reconcile_key(&self) -> Result<ReconcileKey> {
        match self {
            WatchedObject::LogicalCluster(lc) => {
                let name = lc
                    .metadata
                    .name
                    .as_deref()
                    .ok_or_else(|| QuasarError::malformed_key("", "object has no name"))?;
                let cluster = lc.cluster_name().ok_or_else(|| {
                    QuasarError::malformed_key(name, "object has no cluster annotation")
                })?;
                Ok(ReconcileKey::cluster_scoped(cluster, name))
            }
        }
    }
}

/// A resource event emitted by the watch bridge on mutations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// Type of watch event (ADDED, MODIFIED, DELETED)
    pub event_type: WatchEventType,
    /// The observed object
    pub object: WatchedObject,
    /// Resource version at the time of the event
    pub resource_version: String,
}

impl ResourceEvent {
    /// Create an ADDED event
    pub fn added(object: WatchedObject, resource_version: String) -> Self {
        Self {
            event_type: WatchEventType::Added,
            object,
            resource_version,
        }
    }

    /// Create a MODIFIED event
    pub fn modified(object: WatchedObject, resource_version: String) -> Self {
        Self {
            event_type: WatchEventType::Modified,
            object,
            resource_version,
        }
    }

    /// Create a DELETED event
    pub fn deleted(object: WatchedObject, resource_version: String) -> Self {
        Self {
            event_type: WatchEventType::Deleted,
            object,
            resource_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::CLUSTER_ANNOTATION;

    fn make_cluster(name: Option<&str>, cluster: Option<&str>) -> LogicalCluster {
        let mut lc = LogicalCluster::default();
        lc.metadata.name = name.map(str::to_string);
        if let Some(c) = cluster {
            lc.metadata.annotations = Some(
                [(CLUSTER_ANNOTATION.to_string(), c.to_string())]
                    .into_iter()
                    .collect(),
            );
        }
        lc
    }

    #[test]
    fn test_reconcile_key_from_object() {
        let object =
            WatchedObject::LogicalCluster(Box::new(make_cluster(Some("ws-1"), Some("root:org"))));
        let key = object.reconcile_key().unwrap();
        assert_eq!(key.to_string(), "root:org|ws-1");
    }

    #[test]
    fn test_reconcile_key_missing_parts() {
        let object = WatchedObject::LogicalCluster(Box::new(make_cluster(None, Some("root"))));
        assert!(object.reconcile_key().is_err());

        let object = WatchedObject::LogicalCluster(Box::new(make_cluster(Some("ws-1"), None)));
        assert!(object.reconcile_key().is_err());
    }

    #[test]
    fn test_event_serde_round_trip() {
        let object =
            WatchedObject::LogicalCluster(Box::new(make_cluster(Some("ws-1"), Some("root"))));
        let event = ResourceEvent::added(object, "42".to_string());

        let serialized = serde_json::to_string(&event).unwrap();
        let deserialized: ResourceEvent = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.event_type, WatchEventType::Added);
        assert_eq!(deserialized.resource_version, "42");
        let key = deserialized.object.reconcile_key().unwrap();
        assert_eq!(key.name, "ws-1");
    }
}
