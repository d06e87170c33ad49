use crate::client::ClusterClient;
use quasar_core::{LogicalCluster, ResourceEvent, WatchedObject};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Configuration for the logical cluster watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How often to re-list logical clusters
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Level-triggered watch collaborator for logical clusters.
///
/// Periodically re-lists all logical clusters on the shard and diffs against
/// the previous snapshot, emitting ADDED/MODIFIED/DELETED events on a
/// broadcast channel. Subscribers that fall behind lose intermediate events,
/// which is fine: every event is only a hint to re-evaluate current state.
pub struct LogicalClusterWatcher {
    client: Arc<dyn ClusterClient>,
    tx: broadcast::Sender<ResourceEvent>,
    config: WatcherConfig,
    known: HashMap<String, LogicalCluster>,
}

impl LogicalClusterWatcher {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        tx: broadcast::Sender<ResourceEvent>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            client,
            tx,
            config,
            known: HashMap::new(),
        }
    }

    /// Run until the token is cancelled
    pub async fn run(mut self, token: CancellationToken) {
        info!(interval = ?self.config.poll_interval, "starting logical cluster watcher");
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("logical cluster watcher shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "failed to list logical clusters");
                    }
                }
            }
        }
    }

    /// List, diff against the snapshot, emit events
    async fn poll_once(&mut self) -> quasar_core::Result<()> {
        let clusters = self.client.list_logical_clusters().await?;

        let mut seen: HashMap<String, LogicalCluster> = HashMap::with_capacity(clusters.len());
        for lc in clusters {
            let Some(key) = snapshot_key(&lc) else {
                debug!("skipping logical cluster without identity");
                continue;
            };

            match self.known.get(&key) {
                None => self.emit(ResourceEvent::added(
                    WatchedObject::LogicalCluster(Box::new(lc.clone())),
                    version_of(&lc),
                )),
                Some(prev) if prev != &lc => self.emit(ResourceEvent::modified(
                    WatchedObject::LogicalCluster(Box::new(lc.clone())),
                    version_of(&lc),
                )),
                Some(_) => {}
            }
            seen.insert(key, lc);
        }

        for (key, lc) in &self.known {
            if !seen.contains_key(key) {
                self.emit(ResourceEvent::deleted(
                    WatchedObject::LogicalCluster(Box::new(lc.clone())),
                    version_of(lc),
                ));
            }
        }

        self.known = seen;
        Ok(())
    }

    fn emit(&self, event: ResourceEvent) {
        // a send error only means nobody is subscribed right now
        let _ = self.tx.send(event);
    }
}

fn snapshot_key(lc: &LogicalCluster) -> Option<String> {
    let cluster = lc.cluster_name()?;
    let name = lc.metadata.name.as_deref()?;
    Some(format!("{}|{}", cluster, name))
}

fn version_of(lc: &LogicalCluster) -> String {
    lc.resource_version().unwrap_or_default().to_string()
}
