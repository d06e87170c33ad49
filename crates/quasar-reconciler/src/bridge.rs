use crate::queue::WorkQueue;
use quasar_core::{ResourceEvent, WatchEventType};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Filter predicate deciding whether an event produces a queue insertion
pub type EventFilter = Box<dyn Fn(&ResourceEvent) -> bool + Send + Sync>;

/// Translates watch notifications for one resource type into queue
/// insertions.
///
/// Reconciliation stays edge-triggered for responsiveness but convergent
/// regardless of missed edges: the bridge only delivers keys, never state,
/// and a dropped or coalesced event is corrected by the next one.
pub struct EventBridge {
    queue: Arc<WorkQueue>,
    filter: Option<EventFilter>,
}

impl EventBridge {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self {
            queue,
            filter: None,
        }
    }

    /// Install a filter predicate. Deleted events always bypass the filter
    /// for robustness.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ResourceEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Consume events until the channel closes or the token is cancelled
    pub async fn run(self, mut rx: broadcast::Receiver<ResourceEvent>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(queue = %self.queue.name(), "event bridge shutting down");
                    return;
                }
                event = rx.recv() => match event {
                    Ok(event) => self.handle(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // level-triggered reconciliation tolerates missed
                        // edges; the next event re-converges the key
                        warn!(queue = %self.queue.name(), missed, "event bridge lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(queue = %self.queue.name(), "event channel closed");
                        return;
                    }
                },
            }
        }
    }

    /// Translate one event into a queue insertion (or drop it)
    pub fn handle(&self, event: ResourceEvent) {
        if event.event_type != WatchEventType::Deleted {
            if let Some(filter) = &self.filter {
                if !filter(&event) {
                    return;
                }
            }
        }

        match event.object.reconcile_key() {
            Ok(key) => {
                debug!(queue = %self.queue.name(), key = %key, "queueing object");
                self.queue.add(key.to_string());
            }
            Err(e) => {
                // never enqueue a malformed key
                error!(queue = %self.queue.name(), error = %e, "failed to derive key from event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quasar_core::{LogicalCluster, Time, WatchedObject, CLUSTER_ANNOTATION};

    fn make_event(event_type: WatchEventType, deleting: bool) -> ResourceEvent {
        let mut lc = LogicalCluster::default();
        lc.metadata.name = Some("ws-1".to_string());
        lc.metadata.annotations = Some(
            [(CLUSTER_ANNOTATION.to_string(), "root:org".to_string())]
                .into_iter()
                .collect(),
        );
        if deleting {
            lc.metadata.deletion_timestamp = Some(Time(Utc::now()));
        }
        ResourceEvent {
            event_type,
            object: WatchedObject::LogicalCluster(Box::new(lc)),
            resource_version: "1".to_string(),
        }
    }

    fn deleting_filter(event: &ResourceEvent) -> bool {
        let WatchedObject::LogicalCluster(lc) = &event.object;
        lc.is_deleting()
    }

    #[tokio::test]
    async fn test_matching_event_is_queued() {
        let queue = Arc::new(WorkQueue::new("test"));
        let bridge = EventBridge::new(queue.clone()).with_filter(deleting_filter);

        bridge.handle(make_event(WatchEventType::Modified, true));

        assert_eq!(queue.get().await, Some("root:org|ws-1".to_string()));
    }

    #[tokio::test]
    async fn test_filtered_event_is_dropped() {
        let queue = Arc::new(WorkQueue::new("test"));
        let bridge = EventBridge::new(queue.clone()).with_filter(deleting_filter);

        bridge.handle(make_event(WatchEventType::Added, false));

        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_bypasses_filter() {
        let queue = Arc::new(WorkQueue::new("test"));
        let bridge = EventBridge::new(queue.clone()).with_filter(deleting_filter);

        // not deleting, but DELETED events skip the filter
        bridge.handle(make_event(WatchEventType::Deleted, false));

        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_unkeyable_event_is_dropped() {
        let queue = Arc::new(WorkQueue::new("test"));
        let bridge = EventBridge::new(queue.clone());

        let mut lc = LogicalCluster::default();
        lc.metadata.name = Some("ws-1".to_string());
        // no cluster annotation: key derivation fails
        bridge.handle(ResourceEvent::added(
            WatchedObject::LogicalCluster(Box::new(lc)),
            "1".to_string(),
        ));

        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_run_consumes_broadcast_until_cancelled() {
        let queue = Arc::new(WorkQueue::new("test"));
        let (tx, rx) = broadcast::channel(16);
        let token = CancellationToken::new();

        let bridge = EventBridge::new(queue.clone()).with_filter(deleting_filter);
        let handle = {
            let token = token.clone();
            tokio::spawn(async move { bridge.run(rx, token).await })
        };

        tx.send(make_event(WatchEventType::Modified, true)).unwrap();
        assert_eq!(queue.get().await, Some("root:org|ws-1".to_string()));
        queue.done("root:org|ws-1");

        token.cancel();
        handle.await.unwrap();
    }
}
