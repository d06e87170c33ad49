use crate::error::QuasarError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// GroupVersionResource identifies an API resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    /// API group (e.g., "", "rbac.authorization.k8s.io")
    pub group: String,
    /// API version (e.g., "v1", "v1alpha1")
    pub version: String,
    /// Resource name, lowercase plural (e.g., "widgets", "clusterroles")
    pub resource: String,
}

impl GroupVersionResource {
    /// Create a new GVR
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Create a GVR from an apiVersion string and a resource name.
    /// apiVersion format: "v1" or "group/version"
    pub fn from_api_version(api_version: &str, resource: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };

        Self {
            group,
            version,
            resource: resource.to_string(),
        }
    }

    /// Get the apiVersion string (group/version or just version)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Get the URL path segment for this API group/version
    pub fn api_path(&self) -> String {
        if self.group.is_empty() {
            format!("api/{}", self.version)
        } else {
            format!("apis/{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// ReconcileKey uniquely identifies one resource instance within its tenant
/// scope.
///
/// The wire format is `cluster|name` for cluster-scoped resources and
/// `cluster|namespace/name` for namespaced ones. The encoding is reversible
/// (`FromStr`) and stable, so the same object always maps to the same queue
/// key across reconciliations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReconcileKey {
    /// Identity of the logical cluster holding the resource
    pub cluster: String,
    /// Namespace, `None` for cluster-scoped resources
    pub namespace: Option<String>,
    /// Resource name
    pub name: String,
}

impl ReconcileKey {
    /// Create a cluster-scoped key
    pub fn cluster_scoped(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            namespace: None,
            name: name.into(),
        }
    }

    /// Create a namespaced key
    pub fn namespaced(
        cluster: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}|{}/{}", self.cluster, ns, self.name),
            None => write!(f, "{}|{}", self.cluster, self.name),
        }
    }
}

impl FromStr for ReconcileKey {
    type Err = QuasarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cluster, rest) = s
            .split_once('|')
            .ok_or_else(|| QuasarError::malformed_key(s, "missing '|' cluster separator"))?;

        if cluster.is_empty() {
            return Err(QuasarError::malformed_key(s, "empty cluster identity"));
        }

        let (namespace, name) = match rest.split_once('/') {
            Some((ns, name)) => (Some(ns.to_string()), name),
            None => (None, rest),
        };

        if name.is_empty() {
            return Err(QuasarError::malformed_key(s, "empty resource name"));
        }

        Ok(Self {
            cluster: cluster.to_string(),
            namespace,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gvr_from_api_version() {
        let gvr = GroupVersionResource::from_api_version("v1", "pods");
        assert_eq!(gvr.group, "");
        assert_eq!(gvr.version, "v1");
        assert_eq!(gvr.api_version(), "v1");
        assert_eq!(gvr.api_path(), "api/v1");

        let gvr = GroupVersionResource::from_api_version("tenancy.quasar.io/v1alpha1", "widgets");
        assert_eq!(gvr.group, "tenancy.quasar.io");
        assert_eq!(gvr.version, "v1alpha1");
        assert_eq!(gvr.api_version(), "tenancy.quasar.io/v1alpha1");
        assert_eq!(gvr.api_path(), "apis/tenancy.quasar.io/v1alpha1");
    }

    #[test]
    fn test_key_display_cluster_scoped() {
        let key = ReconcileKey::cluster_scoped("root:org:team", "my-cluster");
        assert_eq!(key.to_string(), "root:org:team|my-cluster");
    }

    #[test]
    fn test_key_display_namespaced() {
        let key = ReconcileKey::namespaced("root:org:team", "default", "widget-1");
        assert_eq!(key.to_string(), "root:org:team|default/widget-1");
    }

    #[test]
    fn test_key_round_trip() {
        for original in [
            ReconcileKey::cluster_scoped("root", "ws"),
            ReconcileKey::namespaced("root:org", "ns-1", "obj"),
        ] {
            let parsed: ReconcileKey = original.to_string().parse().unwrap();
            assert_eq!(parsed, original);
        }
    }

    #[test]
    fn test_key_parse_failures() {
        assert!("no-separator".parse::<ReconcileKey>().is_err());
        assert!("|name-only".parse::<ReconcileKey>().is_err());
        assert!("cluster|".parse::<ReconcileKey>().is_err());
        assert!("cluster|ns/".parse::<ReconcileKey>().is_err());
    }
}
