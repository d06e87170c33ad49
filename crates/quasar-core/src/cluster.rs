use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, ObjectMeta};
use serde::{Deserialize, Serialize};

/// Finalizer held on a LogicalCluster while its content is being drained.
/// Removed only after the deleter confirms the cluster is empty.
pub const LOGICAL_CLUSTER_DELETION_FINALIZER: &str = "core.quasar.io/logicalcluster-deletion";

/// Finalizer held on the owner object (possibly on another shard) that caused
/// the logical cluster to exist. Removed by the cross-shard coordinator.
pub const LOGICAL_CLUSTER_FINALIZER: &str = "core.quasar.io/logicalcluster";

/// Annotation recording which logical cluster an object lives in
pub const CLUSTER_ANNOTATION: &str = "core.quasar.io/cluster";

/// LogicalCluster is the tenant-root resource: a workspace owning a subtree
/// of objects, potentially provisioned on behalf of an owner object on a
/// different shard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogicalCluster {
    pub metadata: ObjectMeta,
    pub spec: LogicalClusterSpec,
    pub status: LogicalClusterStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogicalClusterSpec {
    /// The object this logical cluster was created on behalf of, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerReference>,
    /// Whether deleting this cluster may also delete its owner
    pub directly_deletable: bool,
}

/// Reference to the object — potentially on a remote shard — that caused this
/// logical cluster to exist. Mutations of the owner are guarded by UID
/// equality so a recreated object with the same name is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// apiVersion of the owner ("v1" or "group/version")
    pub api_version: String,
    /// Lowercase plural resource name of the owner
    pub resource: String,
    /// Namespace of the owner, absent for cluster-scoped owners
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Name of the owner
    pub name: String,
    /// UID the owner had when the logical cluster was provisioned
    pub uid: String,
    /// Identity of the logical cluster the owner lives in
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogicalClusterStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

impl LogicalCluster {
    /// Identity of the logical cluster this object belongs to, from the
    /// cluster annotation
    pub fn cluster_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(CLUSTER_ANNOTATION))
            .map(String::as_str)
    }

    /// Whether a deletion timestamp has been set
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the given finalizer is present
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|s| s == finalizer))
    }

    /// Remove the first finalizer entry exactly matching `finalizer`,
    /// preserving the relative order of everything else. Returns whether an
    /// entry was removed.
    ///
    /// Only the first match is removed; duplicate entries are not expected
    /// and are left in place.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let Some(finalizers) = self.metadata.finalizers.as_mut() else {
            return false;
        };
        match finalizers.iter().position(|s| s == finalizer) {
            Some(idx) => {
                finalizers.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Set a status condition, replacing any existing condition of the same
    /// type.
    ///
    /// A condition whose status/reason/message are unchanged is left exactly
    /// as stored, and `last_transition_time` only moves when the status
    /// flips — repeated observations of the same state must not dirty the
    /// condition set, or every reconcile would trigger a needless write.
    pub fn set_condition(&mut self, mut condition: Condition) {
        let conditions = self.status.conditions.get_or_insert_with(Vec::new);
        match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status
                    && existing.reason == condition.reason
                    && existing.message == condition.message
                {
                    return;
                }
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time.clone();
                }
                *existing = condition;
            }
            None => conditions.push(condition),
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }
}
