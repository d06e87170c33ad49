use crate::client::ClusterClient;
use async_trait::async_trait;
use chrono::Utc;
use quasar_core::{Condition, GroupVersionResource, LogicalCluster, QuasarError, Result, Time};
use std::sync::Arc;
use tracing::{debug, info};

/// Condition type recording content-drainage progress
pub const CONTENT_DELETED_CONDITION: &str = "ContentDeleted";

/// Drains all content of a doomed logical cluster.
///
/// `delete` returns `Ok` only once the cluster is confirmed empty. While
/// content remains it returns `ResourcesRemaining{estimate}` — a policy
/// signal, not a failure — and records progress on the cluster's conditions
/// in place. The caller persists condition changes and schedules the
/// re-check.
#[async_trait]
pub trait WorkspaceDeleter: Send + Sync {
    async fn delete(&self, cluster: &mut LogicalCluster) -> Result<()>;
}

/// Condition for a drain still in progress
pub fn content_remaining_condition(remaining: u64) -> Condition {
    Condition {
        type_: CONTENT_DELETED_CONDITION.to_string(),
        status: "False".to_string(),
        reason: "ContentRemaining".to_string(),
        message: format!("waiting for {} resources to be deleted", remaining),
        last_transition_time: Time(Utc::now()),
        observed_generation: None,
    }
}

/// Condition for a completed drain
pub fn content_deleted_condition() -> Condition {
    Condition {
        type_: CONTENT_DELETED_CONDITION.to_string(),
        status: "True".to_string(),
        reason: "ContentDeleted".to_string(),
        message: "all content has been deleted".to_string(),
        last_transition_time: Time(Utc::now()),
        observed_generation: None,
    }
}

/// Deleter that drains a fixed set of resource types through the store
/// client: issue a background delete-collection per type, then count what is
/// still live to produce the remaining estimate.
pub struct ContentDeleter {
    client: Arc<dyn ClusterClient>,
    resources: Vec<GroupVersionResource>,
}

impl ContentDeleter {
    pub fn new(client: Arc<dyn ClusterClient>, resources: Vec<GroupVersionResource>) -> Self {
        Self { client, resources }
    }
}

#[async_trait]
impl WorkspaceDeleter for ContentDeleter {
    async fn delete(&self, cluster: &mut LogicalCluster) -> Result<()> {
        let cluster_name = cluster
            .cluster_name()
            .ok_or_else(|| QuasarError::internal("LogicalCluster has no cluster annotation"))?
            .to_string();

        let mut remaining: u64 = 0;
        for gvr in &self.resources {
            debug!(cluster = %cluster_name, resource = %gvr, "deleting collection");
            match self.client.delete_collection(&cluster_name, gvr).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }

            // background propagation: deletions are asynchronous, so count
            // what is still visible
            match self.client.list_resources(&cluster_name, gvr).await {
                Ok(items) => remaining += items.len() as u64,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        if remaining > 0 {
            info!(cluster = %cluster_name, remaining, "content remaining in logical cluster");
            cluster.set_condition(content_remaining_condition(remaining));
            return Err(QuasarError::resources_remaining(remaining));
        }

        cluster.set_condition(content_deleted_condition());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::FakeClusterClient;
    use quasar_core::CLUSTER_ANNOTATION;
    use serde_json::json;

    fn make_cluster(name: &str, cluster: &str) -> LogicalCluster {
        let mut lc = LogicalCluster::default();
        lc.metadata.name = Some(name.to_string());
        lc.metadata.annotations = Some(
            [(CLUSTER_ANNOTATION.to_string(), cluster.to_string())]
                .into_iter()
                .collect(),
        );
        lc
    }

    fn widgets() -> GroupVersionResource {
        GroupVersionResource::new("tenancy.quasar.io", "v1alpha1", "widgets")
    }

    #[tokio::test]
    async fn test_remaining_content_yields_estimate() {
        let client = Arc::new(FakeClusterClient::new());
        client.set_resources("root:ws", &widgets(), vec![json!({}), json!({}), json!({})]);

        let deleter = ContentDeleter::new(client.clone(), vec![widgets()]);
        let mut lc = make_cluster("ws", "root:ws");

        let err = deleter.delete(&mut lc).await.unwrap_err();
        assert!(matches!(
            err,
            QuasarError::ResourcesRemaining { estimate: 3 }
        ));

        // delete-collection was issued despite content remaining
        assert_eq!(client.deleted_collections().len(), 1);

        // progress is recorded on the conditions
        let conditions = lc.status.conditions.as_ref().unwrap();
        assert_eq!(conditions[0].type_, CONTENT_DELETED_CONDITION);
        assert_eq!(conditions[0].status, "False");
        assert!(conditions[0].message.contains("3 resources"));
    }

    #[tokio::test]
    async fn test_empty_cluster_succeeds() {
        let client = Arc::new(FakeClusterClient::new());
        let deleter = ContentDeleter::new(client, vec![widgets()]);
        let mut lc = make_cluster("ws", "root:ws");

        deleter.delete(&mut lc).await.unwrap();

        let conditions = lc.status.conditions.as_ref().unwrap();
        assert_eq!(conditions[0].status, "True");
    }

    #[tokio::test]
    async fn test_drain_completes_after_content_disappears() {
        let client = Arc::new(FakeClusterClient::new());
        client.set_resources("root:ws", &widgets(), vec![json!({})]);

        let deleter = ContentDeleter::new(client.clone(), vec![widgets()]);
        let mut lc = make_cluster("ws", "root:ws");

        assert!(deleter.delete(&mut lc).await.is_err());

        // background deletion catches up between reconciles
        client.clear_resources("root:ws", &widgets());
        deleter.delete(&mut lc).await.unwrap();

        let conditions = lc.status.conditions.as_ref().unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
    }

    #[tokio::test]
    async fn test_missing_cluster_annotation_is_an_error() {
        let client = Arc::new(FakeClusterClient::new());
        let deleter = ContentDeleter::new(client, vec![widgets()]);

        let mut lc = LogicalCluster::default();
        lc.metadata.name = Some("ws".to_string());

        let err = deleter.delete(&mut lc).await.unwrap_err();
        assert!(matches!(err, QuasarError::Internal { .. }));
    }
}
