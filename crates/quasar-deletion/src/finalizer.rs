use crate::client::DynamicClient;
use quasar_core::{
    GroupVersionResource, LogicalCluster, OwnerReference, QuasarError, Result,
    LOGICAL_CLUSTER_FINALIZER,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Removes the owner-side finalizer — and optionally the owner itself — once
/// a logical cluster has been drained.
///
/// The owner may live on a different shard, so all calls go through a client
/// bound to that shard's external front-door address. Every step is
/// idempotent: contacting an already-cleaned owner is a no-op, so the whole
/// finalizing cycle can be safely retried.
pub struct OwnerFinalizer {
    front_door: Arc<dyn DynamicClient>,
}

impl OwnerFinalizer {
    pub fn new(front_door: Arc<dyn DynamicClient>) -> Self {
        Self { front_door }
    }

    pub async fn finalize_owner(&self, lc: &LogicalCluster, owner: &OwnerReference) -> Result<()> {
        let gvr = GroupVersionResource::from_api_version(&owner.api_version, &owner.resource);
        let namespace = owner.namespace.as_deref();

        info!(
            owner.cluster = %owner.cluster,
            owner.resource = %gvr,
            owner.name = %owner.name,
            owner.uid = %owner.uid,
            "checking owner for finalizer"
        );

        let mut object = match self
            .front_door
            .get(&owner.cluster, &gvr, namespace, &owner.name)
            .await
        {
            Ok(object) => object,
            Err(e) if e.is_not_found() => {
                // owner already cleaned up
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let actual_uid = object
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if actual_uid != owner.uid {
            // the owner was deleted and recreated under the same name;
            // mutating the replacement would corrupt an unrelated object
            warn!(
                owner.name = %owner.name,
                expected_uid = %owner.uid,
                actual_uid = %actual_uid,
                "owner has changed, skipping finalizer removal"
            );
            return Err(QuasarError::owner_replaced(
                format!("{}/{}", gvr.resource, owner.name),
                &owner.uid,
                actual_uid,
            ));
        }

        let finalizers = object_finalizers(&object);
        if finalizers.iter().any(|f| f == LOGICAL_CLUSTER_FINALIZER) {
            info!(owner.name = %owner.name, "removing finalizer from owner");
            let remaining: Vec<String> = finalizers
                .into_iter()
                .filter(|f| f != LOGICAL_CLUSTER_FINALIZER)
                .collect();
            object["metadata"]["finalizers"] = json!(remaining);
            object = self
                .front_door
                .update(&owner.cluster, &gvr, namespace, &owner.name, &object)
                .await?;
        }

        let owner_deleting = object
            .pointer("/metadata/deletionTimestamp")
            .is_some_and(|v| !v.is_null());
        if !owner_deleting && lc.spec.directly_deletable {
            info!(owner.name = %owner.name, "deleting owner");
            match self
                .front_door
                .delete(&owner.cluster, &gvr, namespace, &owner.name, Some(&owner.uid))
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

fn object_finalizers(object: &Value) -> Vec<String> {
    object
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
