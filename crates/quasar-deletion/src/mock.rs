//! In-memory fakes for tests and development.
//!
//! These record every mutation so tests can assert on exactly what the
//! controller did (or refrained from doing).

use crate::client::{ClusterClient, DynamicClient};
use crate::deleter::{content_deleted_condition, content_remaining_condition, WorkspaceDeleter};
use async_trait::async_trait;
use quasar_core::{Condition, GroupVersionResource, LogicalCluster, QuasarError, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// In-memory `ClusterClient`
#[derive(Default)]
pub struct FakeClusterClient {
    clusters: Mutex<HashMap<(String, String), LogicalCluster>>,
    resources: Mutex<HashMap<(String, GroupVersionResource), Vec<Value>>>,
    patches: Mutex<Vec<Value>>,
    updates: Mutex<Vec<LogicalCluster>>,
    deleted_collections: Mutex<Vec<(String, GroupVersionResource)>>,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a logical cluster, keyed by its cluster annotation and name
    pub fn insert_cluster(&self, lc: LogicalCluster) {
        let cluster = lc.cluster_name().unwrap_or_default().to_string();
        let name = lc.metadata.name.clone().unwrap_or_default();
        self.clusters.lock().unwrap().insert((cluster, name), lc);
    }

    pub fn remove_cluster(&self, cluster: &str, name: &str) {
        self.clusters
            .lock()
            .unwrap()
            .remove(&(cluster.to_string(), name.to_string()));
    }

    /// Seed the live content of a cluster for one resource type
    pub fn set_resources(&self, cluster: &str, gvr: &GroupVersionResource, items: Vec<Value>) {
        self.resources
            .lock()
            .unwrap()
            .insert((cluster.to_string(), gvr.clone()), items);
    }

    pub fn clear_resources(&self, cluster: &str, gvr: &GroupVersionResource) {
        self.resources
            .lock()
            .unwrap()
            .remove(&(cluster.to_string(), gvr.clone()));
    }

    /// All status patches issued so far
    pub fn patches(&self) -> Vec<Value> {
        self.patches.lock().unwrap().clone()
    }

    /// All full updates issued so far
    pub fn updates(&self) -> Vec<LogicalCluster> {
        self.updates.lock().unwrap().clone()
    }

    /// All delete-collection calls issued so far
    pub fn deleted_collections(&self) -> Vec<(String, GroupVersionResource)> {
        self.deleted_collections.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn get_logical_cluster(&self, cluster: &str, name: &str) -> Result<LogicalCluster> {
        self.clusters
            .lock()
            .unwrap()
            .get(&(cluster.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| QuasarError::not_found(format!("logicalclusters/{}", name)))
    }

    async fn update_logical_cluster(
        &self,
        cluster: &str,
        lc: &LogicalCluster,
    ) -> Result<LogicalCluster> {
        let name = lc.metadata.name.clone().unwrap_or_default();
        let key = (cluster.to_string(), name.clone());

        let mut clusters = self.clusters.lock().unwrap();
        if !clusters.contains_key(&key) {
            return Err(QuasarError::not_found(format!("logicalclusters/{}", name)));
        }
        clusters.insert(key, lc.clone());
        self.updates.lock().unwrap().push(lc.clone());
        Ok(lc.clone())
    }

    async fn patch_logical_cluster_status(
        &self,
        cluster: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()> {
        let key = (cluster.to_string(), name.to_string());
        let mut clusters = self.clusters.lock().unwrap();
        let lc = clusters
            .get_mut(&key)
            .ok_or_else(|| QuasarError::not_found(format!("logicalclusters/{}", name)))?;

        if let Some(conditions) = patch.pointer("/status/conditions") {
            let conditions: Vec<Condition> =
                serde_json::from_value(conditions.clone()).map_err(|e| {
                    QuasarError::serialization(
                        format!("Failed to parse conditions from patch: {}", e),
                        Some(Box::new(e)),
                    )
                })?;
            lc.status.conditions = Some(conditions);
        }
        self.patches.lock().unwrap().push(patch.clone());
        Ok(())
    }

    async fn list_logical_clusters(&self) -> Result<Vec<LogicalCluster>> {
        let mut clusters: Vec<LogicalCluster> =
            self.clusters.lock().unwrap().values().cloned().collect();
        clusters.sort_by_key(|lc| lc.metadata.name.clone());
        Ok(clusters)
    }

    async fn list_resources(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
    ) -> Result<Vec<Value>> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .get(&(cluster.to_string(), gvr.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_collection(&self, cluster: &str, gvr: &GroupVersionResource) -> Result<()> {
        self.deleted_collections
            .lock()
            .unwrap()
            .push((cluster.to_string(), gvr.clone()));
        Ok(())
    }
}

/// In-memory `DynamicClient` for owner objects
#[derive(Default)]
pub struct FakeDynamicClient {
    objects: Mutex<HashMap<(String, String, String, String), Value>>,
    updates: Mutex<Vec<Value>>,
    deletes: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeDynamicClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> (String, String, String, String) {
        (
            cluster.to_string(),
            gvr.to_string(),
            namespace.unwrap_or_default().to_string(),
            name.to_string(),
        )
    }

    pub fn insert(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        object: Value,
    ) {
        self.objects
            .lock()
            .unwrap()
            .insert(Self::key(cluster, gvr, namespace, name), object);
    }

    pub fn get_stored(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&Self::key(cluster, gvr, namespace, name))
            .cloned()
    }

    /// All object updates issued so far
    pub fn updates(&self) -> Vec<Value> {
        self.updates.lock().unwrap().clone()
    }

    /// All deletes issued so far, as (name, uid precondition)
    pub fn deletes(&self) -> Vec<(String, Option<String>)> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DynamicClient for FakeDynamicClient {
    async fn get(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&Self::key(cluster, gvr, namespace, name))
            .cloned()
            .ok_or_else(|| QuasarError::not_found(format!("{}/{}", gvr.resource, name)))
    }

    async fn update(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value> {
        let key = Self::key(cluster, gvr, namespace, name);
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            return Err(QuasarError::not_found(format!("{}/{}", gvr.resource, name)));
        }
        objects.insert(key, object.clone());
        self.updates.lock().unwrap().push(object.clone());
        Ok(object.clone())
    }

    async fn delete(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        uid_precondition: Option<&str>,
    ) -> Result<()> {
        let key = Self::key(cluster, gvr, namespace, name);
        let mut objects = self.objects.lock().unwrap();

        let Some(object) = objects.get(&key) else {
            return Err(QuasarError::not_found(format!("{}/{}", gvr.resource, name)));
        };

        if let Some(uid) = uid_precondition {
            let actual = object
                .pointer("/metadata/uid")
                .and_then(Value::as_str)
                .unwrap_or("");
            if actual != uid {
                return Err(QuasarError::conflict(format!("{}/{}", gvr.resource, name)));
            }
        }

        objects.remove(&key);
        self.deletes
            .lock()
            .unwrap()
            .push((name.to_string(), uid_precondition.map(str::to_string)));
        Ok(())
    }
}

/// Deleter that plays back a scripted sequence of outcomes, mutating
/// conditions the way the real deleter would
#[derive(Default)]
pub struct FakeDeleter {
    outcomes: Mutex<VecDeque<Result<()>>>,
    calls: Mutex<u32>,
}

impl FakeDeleter {
    /// Script the outcome sequence; once exhausted, every call succeeds
    pub fn with_outcomes(outcomes: Vec<Result<()>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl WorkspaceDeleter for FakeDeleter {
    async fn delete(&self, cluster: &mut LogicalCluster) -> Result<()> {
        *self.calls.lock().unwrap() += 1;
        let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()));
        match &outcome {
            Ok(()) => cluster.set_condition(content_deleted_condition()),
            Err(QuasarError::ResourcesRemaining { estimate }) => {
                cluster.set_condition(content_remaining_condition(*estimate))
            }
            Err(_) => {}
        }
        outcome
    }
}
