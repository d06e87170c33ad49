use crate::queue::WorkQueue;
use async_trait::async_trait;
use quasar_core::{requeue_delay, QuasarError, ReconcileKey, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A reconcile function invoked with one key at a time.
///
/// Implementations must be level-triggered: re-evaluate current object state
/// on every call and tolerate repeats, since the engine retries the whole
/// cycle on any error.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    async fn reconcile(&self, key: ReconcileKey) -> Result<()>;
}

/// A fixed-size pool of workers pulling keys from one queue and applying the
/// shared retry policy. Every controller in the system reuses this verbatim;
/// only the reconciler and the event filter differ per controller.
pub struct Controller<R: Reconciler> {
    name: String,
    queue: Arc<WorkQueue>,
    reconciler: Arc<R>,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(name: impl Into<String>, queue: Arc<WorkQueue>, reconciler: Arc<R>) -> Self {
        Self {
            name: name.into(),
            queue,
            reconciler,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        self.queue.clone()
    }

    /// Run `num_workers` workers until the token is cancelled, then shut the
    /// queue down and wait for in-flight items to finish their current step.
    pub async fn start(&self, token: CancellationToken, num_workers: usize) {
        info!(controller = %self.name, num_workers, "starting controller");

        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let queue = self.queue.clone();
            let reconciler = self.reconciler.clone();
            let name = self.name.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(name, worker_id, queue, reconciler).await;
            }));
        }

        token.cancelled().await;
        self.queue.shut_down();
        futures_util::future::join_all(handles).await;

        info!(controller = %self.name, "controller shut down");
    }
}

async fn worker_loop<R: Reconciler>(
    name: String,
    worker_id: usize,
    queue: Arc<WorkQueue>,
    reconciler: Arc<R>,
) {
    while let Some(raw) = queue.get().await {
        process_one(&name, worker_id, &queue, reconciler.as_ref(), &raw).await;
        queue.done(&raw);
    }
    debug!(controller = %name, worker_id, "worker exiting");
}

async fn process_one<R: Reconciler>(
    name: &str,
    worker_id: usize,
    queue: &Arc<WorkQueue>,
    reconciler: &R,
    raw: &str,
) {
    debug!(controller = %name, worker_id, key = %raw, "processing key");

    let key: ReconcileKey = match raw.parse() {
        Ok(key) => key,
        Err(e) => {
            // retrying cannot fix a parse failure; report and drop
            error!(controller = %name, key = %raw, error = %e, "dropping malformed key");
            queue.forget(raw);
            return;
        }
    };

    match reconciler.reconcile(key).await {
        Ok(()) => {
            queue.forget(raw);
        }
        Err(QuasarError::ResourcesRemaining { estimate }) => {
            // not a failure: content is still draining, check back later
            let delay = requeue_delay(estimate);
            debug!(
                controller = %name,
                key = %raw,
                estimate,
                ?delay,
                "content remaining, waiting before re-checking"
            );
            queue.add_after(raw.to_string(), delay);
        }
        Err(e) => {
            error!(controller = %name, key = %raw, error = %e, "reconcile failed, requeuing");
            queue.add_rate_limited(raw);
        }
    }
}
