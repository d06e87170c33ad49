use crate::client::{ClusterClient, DynamicClient, HttpDynamicClient};
use crate::deleter::WorkspaceDeleter;
use crate::finalizer::OwnerFinalizer;
use async_trait::async_trait;
use quasar_core::{
    GroupVersionResource, LogicalCluster, ReconcileKey, ResourceEvent, Result, WatchedObject,
    LOGICAL_CLUSTER_DELETION_FINALIZER,
};
use quasar_reconciler::{Controller, EventBridge, Reconciler, WorkQueue};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const CONTROLLER_NAME: &str = "logicalcluster-deletion";

/// Resolves the externally reachable front-door address of the shard that
/// can route to owner objects. Re-invoked on every controller start.
pub type ShardUrlResolver = Arc<dyn Fn() -> String + Send + Sync>;

/// Configuration for the deletion controller
#[derive(Debug, Clone)]
pub struct DeletionControllerConfig {
    /// Number of parallel workers
    pub num_workers: usize,
}

impl Default for DeletionControllerConfig {
    fn default() -> Self {
        Self { num_workers: 2 }
    }
}

/// Event filter for the deletion controller: only logical clusters with a
/// deletion timestamp are worth queueing (Deleted events bypass this in the
/// bridge)
pub fn deleting_filter(event: &ResourceEvent) -> bool {
    let WatchedObject::LogicalCluster(lc) = &event.object;
    lc.is_deleting()
}

/// The cascading-deletion state machine, evaluated afresh on every dequeue.
///
/// No per-key state lives outside the queue: a missed or duplicated event
/// cannot corrupt the outcome, and every step is safe to repeat.
pub struct DeletionReconciler {
    client: Arc<dyn ClusterClient>,
    deleter: Arc<dyn WorkspaceDeleter>,
    owner_finalizer: OwnerFinalizer,
}

impl DeletionReconciler {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        deleter: Arc<dyn WorkspaceDeleter>,
        front_door: Arc<dyn DynamicClient>,
    ) -> Self {
        Self {
            client,
            deleter,
            owner_finalizer: OwnerFinalizer::new(front_door),
        }
    }

    async fn process(&self, key: &ReconcileKey) -> Result<()> {
        let lc = match self
            .client
            .get_logical_cluster(&key.cluster, &key.name)
            .await
        {
            Ok(lc) => lc,
            Err(e) if e.is_not_found() => {
                debug!(key = %key, "logical cluster already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if !lc.is_deleting() {
            return Ok(());
        }

        info!(key = %key, "deleting logical cluster content");
        let mut copy = lc.clone();
        match self.deleter.delete(&mut copy).await {
            Ok(()) => {
                info!(key = %key, "finished deleting logical cluster content");
                self.finalize(key, copy).await
            }
            Err(delete_err) => {
                // persist drain progress before surfacing the outcome; the
                // worker pool decides between estimate-wait and backoff
                self.patch_conditions(key, &lc, &copy).await?;
                Err(delete_err)
            }
        }
    }

    /// Merge-patch the status conditions, but only when they actually
    /// changed — byte-identical condition sets never produce a write
    async fn patch_conditions(
        &self,
        key: &ReconcileKey,
        old: &LogicalCluster,
        new: &LogicalCluster,
    ) -> Result<()> {
        if old.status.conditions == new.status.conditions {
            return Ok(());
        }

        // uid and resourceVersion ride along as patch preconditions
        let patch = json!({
            "metadata": {
                "uid": old.uid(),
                "resourceVersion": old.resource_version(),
            },
            "status": {
                "conditions": new.status.conditions,
            },
        });

        debug!(key = %key, "patching logical cluster conditions");
        self.client
            .patch_logical_cluster_status(&key.cluster, &key.name, &patch)
            .await
    }

    /// Finalizing: strip the deletion finalizer and, if the cluster was
    /// provisioned for an owner, clean the owner up first. Any owner error
    /// aborts before the local removal is persisted, so a retry re-runs the
    /// whole (idempotent) step.
    async fn finalize(&self, key: &ReconcileKey, mut ws: LogicalCluster) -> Result<()> {
        if !ws.has_finalizer(LOGICAL_CLUSTER_DELETION_FINALIZER) {
            return Ok(());
        }

        // authorization objects scoped to this cluster are not drained by
        // the content deleter; remove them here
        for gvr in [
            GroupVersionResource::new("rbac.authorization.k8s.io", "v1", "clusterroles"),
            GroupVersionResource::new("rbac.authorization.k8s.io", "v1", "clusterrolebindings"),
        ] {
            info!(key = %key, resource = %gvr, "deleting authorization objects");
            match self.client.delete_collection(&key.cluster, &gvr).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(owner) = ws.spec.owner.clone() {
            self.owner_finalizer.finalize_owner(&ws, &owner).await?;
        }

        ws.remove_finalizer(LOGICAL_CLUSTER_DELETION_FINALIZER);
        info!(key = %key, "removing finalizer from logical cluster");
        match self.client.update_logical_cluster(&key.cluster, &ws).await {
            Ok(_) => Ok(()),
            // concurrently finalized by a duplicate in-flight worker
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Reconciler for DeletionReconciler {
    async fn reconcile(&self, key: ReconcileKey) -> Result<()> {
        self.process(&key).await
    }
}

/// The logical-cluster deletion controller: queue, event filter, and worker
/// pool around a [`DeletionReconciler`].
pub struct DeletionController {
    client: Arc<dyn ClusterClient>,
    deleter: Arc<dyn WorkspaceDeleter>,
    shard_external_url: ShardUrlResolver,
    queue: Arc<WorkQueue>,
    config: DeletionControllerConfig,
}

impl DeletionController {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        deleter: Arc<dyn WorkspaceDeleter>,
        shard_external_url: ShardUrlResolver,
        config: DeletionControllerConfig,
    ) -> Self {
        Self {
            client,
            deleter,
            shard_external_url,
            queue: Arc::new(WorkQueue::new(CONTROLLER_NAME)),
            config,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        self.queue.clone()
    }

    /// Event bridge feeding this controller's queue
    pub fn event_bridge(&self) -> EventBridge {
        EventBridge::new(self.queue.clone()).with_filter(deleting_filter)
    }

    /// Run until the token is cancelled.
    ///
    /// The cross-shard client is built here, against the shard's external
    /// address as resolved at start — the owner's shard may not be reachable
    /// through internal addressing.
    pub async fn start(&self, token: CancellationToken) {
        let front_door_url = (self.shard_external_url)();
        info!(url = %front_door_url, "using shard front door for owner cleanup");
        let front_door: Arc<dyn DynamicClient> = Arc::new(HttpDynamicClient::new(&front_door_url));

        let reconciler = Arc::new(DeletionReconciler::new(
            self.client.clone(),
            self.deleter.clone(),
            front_door,
        ));

        Controller::new(CONTROLLER_NAME, self.queue.clone(), reconciler)
            .start(token, self.config.num_workers)
            .await;
    }
}
