//! Cascading deletion of logical clusters.
//!
//! When a logical cluster is marked for deletion, this controller drains its
//! content, records progress on the `ContentDeleted` condition, cleans up the
//! owner object (possibly on another shard, reached through that shard's
//! external front door), and finally releases the deletion finalizer so the
//! store can remove the object.

pub mod client;
pub mod controller;
pub mod deleter;
pub mod finalizer;
pub mod mock;
pub mod watch;

pub use client::{ClusterClient, DynamicClient, HttpClusterClient, HttpDynamicClient};
pub use controller::{
    deleting_filter, DeletionController, DeletionControllerConfig, DeletionReconciler,
    ShardUrlResolver, CONTROLLER_NAME,
};
pub use deleter::{ContentDeleter, WorkspaceDeleter, CONTENT_DELETED_CONDITION};
pub use finalizer::OwnerFinalizer;
pub use watch::{LogicalClusterWatcher, WatcherConfig};
