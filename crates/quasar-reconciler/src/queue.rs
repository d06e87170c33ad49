use crate::backoff::ExponentialBackoff;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// A de-duplicating, rate-limited work queue keyed by strings.
///
/// Guarantees at most one in-flight worker per key: a key handed out by
/// `get` is not handed out again until `done` is called for it. An `add`
/// arriving while the key is in flight marks it dirty, so it is re-queued
/// exactly once after the current round completes — concurrent updates to
/// the same key coalesce into a single subsequent reconcile.
pub struct WorkQueue {
    name: String,
    inner: Mutex<Inner>,
    notify: Notify,
    backoff: ExponentialBackoff,
}

struct Inner {
    /// FIFO of keys ready for processing
    queue: VecDeque<String>,
    /// Keys that need processing (queued or awaiting re-queue)
    dirty: HashSet<String>,
    /// Keys currently held by a worker
    processing: HashSet<String>,
    shutting_down: bool,
}

impl WorkQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_backoff(name, ExponentialBackoff::default())
    }

    pub fn with_backoff(name: impl Into<String>, backoff: ExponentialBackoff) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a key for immediate processing. Idempotent: re-adding a
    /// queued key is a no-op, re-adding an in-flight key marks it dirty.
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.shutting_down {
                return;
            }
            if inner.dirty.contains(&key) {
                return;
            }
            inner.dirty.insert(key.clone());
            if inner.processing.contains(&key) {
                // re-queued by done() once the in-flight round completes
                return;
            }
            inner.queue.push_back(key);
        }
        self.notify.notify_one();
    }

    /// Schedule a delayed enqueue. Suspends only the key, not a worker; the
    /// timer is dropped if the queue shuts down before it fires.
    pub fn add_after(self: &Arc<Self>, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Enqueue after the exponential backoff computed from the key's
    /// failure count
    pub fn add_rate_limited(self: &Arc<Self>, key: &str) {
        let delay = self.backoff.delay(key);
        debug!(queue = %self.name, key, ?delay, "rate-limited requeue");
        self.add_after(key.to_string(), delay);
    }

    /// Reset the failure count for a key after a successful reconcile
    pub fn forget(&self, key: &str) {
        self.backoff.forget(key);
    }

    /// Number of failures recorded for a key
    pub fn failures(&self, key: &str) -> u32 {
        self.backoff.failures(key)
    }

    /// Block until a key is available or the queue is shut down. Returns
    /// `None` only after `shut_down` once the FIFO is drained. Every
    /// returned key must be released with `done`.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking state so a wakeup between the check
            // and the await is not lost
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Release the in-flight lock for a key. Must be called exactly once per
    /// `get`. If the key was marked dirty while in flight it is re-queued.
    pub fn done(&self, key: &str) {
        let requeued = {
            let mut inner = self.inner.lock().unwrap();
            inner.processing.remove(key);
            if inner.dirty.contains(key) {
                inner.queue.push_back(key.to_string());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stop accepting new keys and wake all waiting workers. Keys already in
    /// the FIFO are still handed out; `get` returns `None` once it drains.
    pub fn shut_down(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.shutting_down = true;
        }
        self.notify.notify_waiters();
    }

    /// Number of keys waiting in the FIFO (not counting in-flight keys)
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_add_deduplicates() {
        let queue = WorkQueue::new("test");

        queue.add("k");
        queue.add("k");
        queue.add("k");

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some("k".to_string()));
        queue.done("k");
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_dirty_while_processing_requeues_exactly_once() {
        let queue = WorkQueue::new("test");

        queue.add("k");
        let key = queue.get().await.unwrap();

        // updates arriving mid-flight coalesce into one re-delivery
        queue.add("k");
        queue.add("k");
        assert_eq!(queue.len(), 0);

        queue.done(&key);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some("k".to_string()));
        queue.done("k");
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_key_is_not_handed_out_twice() {
        let queue = Arc::new(WorkQueue::new("test"));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            handles.push(tokio::spawn(async move {
                while let Some(key) = queue.get().await {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    queue.done(&key);
                }
            }));
        }

        // hammer a single key; only one worker may ever hold it
        for _ in 0..20 {
            queue.add("contended");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.shut_down();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_delays_delivery() {
        let queue = Arc::new(WorkQueue::new("test"));

        queue.add_after("k", Duration::from_secs(5));
        tokio::task::yield_now().await;
        assert_eq!(queue.len(), 0);

        // paused clock auto-advances once all tasks are idle
        assert_eq!(queue.get().await, Some("k".to_string()));
        queue.done("k");
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_rate_limited_backs_off() {
        let queue = Arc::new(WorkQueue::new("test"));

        queue.add_rate_limited("k");
        assert_eq!(queue.failures("k"), 1);
        assert_eq!(queue.get().await, Some("k".to_string()));
        queue.done("k");

        queue.add_rate_limited("k");
        assert_eq!(queue.failures("k"), 2);

        queue.forget("k");
        assert_eq!(queue.failures("k"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_stops() {
        let queue = WorkQueue::new("test");

        queue.add("a");
        queue.shut_down();

        // queued work is still delivered, then get reports shutdown
        assert_eq!(queue.get().await, Some("a".to_string()));
        queue.done("a");
        assert_eq!(queue.get().await, None);

        // adds after shutdown are dropped
        queue.add("b");
        assert_eq!(queue.get().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_getters() {
        let queue = Arc::new(WorkQueue::new("test"));

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;

        queue.shut_down();
        assert_eq!(waiter.await.unwrap(), None);
    }
}
