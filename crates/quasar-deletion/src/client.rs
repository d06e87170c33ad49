use async_trait::async_trait;
use quasar_core::{GroupVersionResource, LogicalCluster, QuasarError, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

/// URL path segment for the LogicalCluster API
const LOGICAL_CLUSTERS_PATH: &str = "apis/core.quasar.io/v1alpha1/logicalclusters";

/// Store/client operations against the shard this controller runs on.
///
/// Updates are guarded by resourceVersion optimistic concurrency (a stale
/// update fails with `Conflict`, callers re-fetch and retry); status patches
/// use merge-patch semantics.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_logical_cluster(&self, cluster: &str, name: &str) -> Result<LogicalCluster>;

    async fn update_logical_cluster(
        &self,
        cluster: &str,
        lc: &LogicalCluster,
    ) -> Result<LogicalCluster>;

    /// Apply a merge patch to the status subresource
    async fn patch_logical_cluster_status(
        &self,
        cluster: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()>;

    /// List logical clusters across all clusters on this shard
    async fn list_logical_clusters(&self) -> Result<Vec<LogicalCluster>>;

    /// List instances of an arbitrary resource type within one cluster
    async fn list_resources(&self, cluster: &str, gvr: &GroupVersionResource)
        -> Result<Vec<Value>>;

    /// Delete all instances of a resource type within one cluster, with
    /// background propagation
    async fn delete_collection(&self, cluster: &str, gvr: &GroupVersionResource) -> Result<()>;
}

/// Dynamic client for arbitrary objects, used to reach the owner of a
/// logical cluster through a shard's external front-door address.
#[async_trait]
pub trait DynamicClient: Send + Sync {
    async fn get(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value>;

    async fn update(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value>;

    /// Delete an object, optionally preconditioned on its UID. A stale UID
    /// fails with `Conflict` rather than deleting the wrong object.
    async fn delete(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        uid_precondition: Option<&str>,
    ) -> Result<()>;
}

/// Map a non-success response to the error taxonomy
async fn check_response(resp: reqwest::Response, resource: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => QuasarError::not_found(resource),
        StatusCode::CONFLICT => QuasarError::conflict(resource),
        _ => QuasarError::api(status.as_u16(), body),
    })
}

fn request_failed(e: reqwest::Error) -> QuasarError {
    QuasarError::internal(format!("HTTP request failed: {}", e))
}

fn parse_failed(what: &str, e: reqwest::Error) -> QuasarError {
    QuasarError::serialization(format!("Failed to parse {}: {}", what, e), Some(Box::new(e)))
}

/// Resource path for a dynamic object:
/// `/clusters/{cluster}/{api_path}/[namespaces/{ns}/]{resource}`
fn collection_url(
    base_url: &str,
    cluster: &str,
    gvr: &GroupVersionResource,
    namespace: Option<&str>,
) -> String {
    match namespace {
        Some(ns) => format!(
            "{}/clusters/{}/{}/namespaces/{}/{}",
            base_url,
            cluster,
            gvr.api_path(),
            ns,
            gvr.resource
        ),
        None => format!(
            "{}/clusters/{}/{}/{}",
            base_url,
            cluster,
            gvr.api_path(),
            gvr.resource
        ),
    }
}

/// HTTP client for the local shard's API endpoint
pub struct HttpClusterClient {
    base_url: String,
    client: Client,
}

impl HttpClusterClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn logical_cluster_url(&self, cluster: &str, name: &str) -> String {
        format!(
            "{}/clusters/{}/{}/{}",
            self.base_url, cluster, LOGICAL_CLUSTERS_PATH, name
        )
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn get_logical_cluster(&self, cluster: &str, name: &str) -> Result<LogicalCluster> {
        let url = self.logical_cluster_url(cluster, name);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await.map_err(request_failed)?;
        let resp = check_response(resp, &format!("logicalclusters/{}", name)).await?;
        resp.json::<LogicalCluster>()
            .await
            .map_err(|e| parse_failed("logical cluster", e))
    }

    async fn update_logical_cluster(
        &self,
        cluster: &str,
        lc: &LogicalCluster,
    ) -> Result<LogicalCluster> {
        let name = lc
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| QuasarError::internal("LogicalCluster has no name"))?;
        let url = self.logical_cluster_url(cluster, name);
        debug!("PUT {}", url);

        let resp = self
            .client
            .put(&url)
            .json(lc)
            .send()
            .await
            .map_err(request_failed)?;
        let resp = check_response(resp, &format!("logicalclusters/{}", name)).await?;
        resp.json::<LogicalCluster>()
            .await
            .map_err(|e| parse_failed("logical cluster", e))
    }

    async fn patch_logical_cluster_status(
        &self,
        cluster: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()> {
        let url = format!("{}/status", self.logical_cluster_url(cluster, name));
        debug!("PATCH {}", url);

        let resp = self
            .client
            .patch(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
            .json(patch)
            .send()
            .await
            .map_err(request_failed)?;
        check_response(resp, &format!("logicalclusters/{}", name)).await?;
        Ok(())
    }

    async fn list_logical_clusters(&self) -> Result<Vec<LogicalCluster>> {
        // the wildcard cluster path lists across every cluster on the shard
        let url = format!("{}/clusters/*/{}", self.base_url, LOGICAL_CLUSTERS_PATH);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await.map_err(request_failed)?;
        let resp = check_response(resp, "logicalclusters").await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| parse_failed("logical cluster list", e))?;

        let items = body["items"].as_array().cloned().unwrap_or_default();
        let mut clusters = Vec::with_capacity(items.len());
        for item in items {
            let lc: LogicalCluster = serde_json::from_value(item).map_err(|e| {
                QuasarError::serialization(
                    format!("Failed to parse logical cluster from list: {}", e),
                    Some(Box::new(e)),
                )
            })?;
            clusters.push(lc);
        }
        Ok(clusters)
    }

    async fn list_resources(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
    ) -> Result<Vec<Value>> {
        let url = collection_url(&self.base_url, cluster, gvr, None);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await.map_err(request_failed)?;
        let resp = check_response(resp, &gvr.resource).await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| parse_failed("resource list", e))?;
        Ok(body["items"].as_array().cloned().unwrap_or_default())
    }

    async fn delete_collection(&self, cluster: &str, gvr: &GroupVersionResource) -> Result<()> {
        let url = collection_url(&self.base_url, cluster, gvr, None);
        debug!("DELETE {}", url);

        let resp = self
            .client
            .delete(&url)
            .query(&[("propagationPolicy", "Background")])
            .send()
            .await
            .map_err(request_failed)?;
        check_response(resp, &gvr.resource).await?;
        Ok(())
    }
}

/// HTTP client bound to a shard's *external* front-door address.
///
/// The owner of a logical cluster may live on a shard only reachable through
/// its externally published URL, so this client never uses an internal
/// address.
pub struct HttpDynamicClient {
    base_url: String,
    client: Client,
}

impl HttpDynamicClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn object_url(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> String {
        format!(
            "{}/{}",
            collection_url(&self.base_url, cluster, gvr, namespace),
            name
        )
    }
}

#[async_trait]
impl DynamicClient for HttpDynamicClient {
    async fn get(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value> {
        let url = self.object_url(cluster, gvr, namespace, name);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await.map_err(request_failed)?;
        let resp = check_response(resp, &format!("{}/{}", gvr.resource, name)).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| parse_failed("object", e))
    }

    async fn update(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value> {
        let url = self.object_url(cluster, gvr, namespace, name);
        debug!("PUT {}", url);

        let resp = self
            .client
            .put(&url)
            .json(object)
            .send()
            .await
            .map_err(request_failed)?;
        let resp = check_response(resp, &format!("{}/{}", gvr.resource, name)).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| parse_failed("object", e))
    }

    async fn delete(
        &self,
        cluster: &str,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        uid_precondition: Option<&str>,
    ) -> Result<()> {
        let url = self.object_url(cluster, gvr, namespace, name);
        debug!("DELETE {}", url);

        let mut req = self.client.delete(&url);
        if let Some(uid) = uid_precondition {
            req = req.json(&serde_json::json!({ "preconditions": { "uid": uid } }));
        }

        let resp = req.send().await.map_err(request_failed)?;
        check_response(resp, &format!("{}/{}", gvr.resource, name)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_cluster_url() {
        let client = HttpClusterClient::new("http://127.0.0.1:6443/");
        assert_eq!(
            client.logical_cluster_url("root:org", "my-ws"),
            "http://127.0.0.1:6443/clusters/root:org/apis/core.quasar.io/v1alpha1/logicalclusters/my-ws"
        );
    }

    #[test]
    fn test_collection_url_core_group() {
        let gvr = GroupVersionResource::new("", "v1", "configmaps");
        assert_eq!(
            collection_url("http://host", "root", &gvr, Some("default")),
            "http://host/clusters/root/api/v1/namespaces/default/configmaps"
        );
    }

    #[test]
    fn test_collection_url_named_group() {
        let gvr = GroupVersionResource::new("rbac.authorization.k8s.io", "v1", "clusterroles");
        assert_eq!(
            collection_url("http://host", "root", &gvr, None),
            "http://host/clusters/root/apis/rbac.authorization.k8s.io/v1/clusterroles"
        );
    }

    #[test]
    fn test_dynamic_object_url() {
        let client = HttpDynamicClient::new("https://shard-b.example.com");
        let gvr = GroupVersionResource::new("tenancy.quasar.io", "v1alpha1", "widgets");
        assert_eq!(
            client.object_url("root:org", &gvr, None, "w1"),
            "https://shard-b.example.com/clusters/root:org/apis/tenancy.quasar.io/v1alpha1/widgets/w1"
        );
    }
}
