//! Quasar Core - Fundamental types for the Quasar multi-tenant control plane
//!
//! This crate provides:
//! - The LogicalCluster (workspace) resource and its owner reference
//! - Reversible reconcile keys and resource identifiers
//! - Error types with miette diagnostics
//! - Watch event types consumed by the reconciliation engine

pub mod cluster;
pub mod error;
pub mod events;
pub mod types;

// Re-export commonly used types
pub use cluster::{
    LogicalCluster, LogicalClusterSpec, LogicalClusterStatus, OwnerReference, CLUSTER_ANNOTATION,
    LOGICAL_CLUSTER_DELETION_FINALIZER, LOGICAL_CLUSTER_FINALIZER,
};
pub use error::{requeue_delay, QuasarError, Result};
pub use events::{ResourceEvent, WatchEventType, WatchedObject};
pub use types::{GroupVersionResource, ReconcileKey};

// Re-export k8s-openapi metadata types for convenience
pub use k8s_openapi;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, ObjectMeta, Time};
