//! Quasar Reconciler - Level-triggered reconciliation engine
//!
//! The shared machinery behind every controller in the system:
//! - A de-duplicating, rate-limited work queue with per-key serialization
//! - A fixed-size worker pool applying the retry/backoff policy
//! - An event bridge translating watch notifications into queue insertions
//!
//! Controllers supply only a [`Reconciler`] implementation and an optional
//! event filter; everything else is reused verbatim.

pub mod backoff;
pub mod bridge;
pub mod queue;
pub mod worker;

pub use backoff::ExponentialBackoff;
pub use bridge::{EventBridge, EventFilter};
pub use queue::WorkQueue;
pub use worker::{Controller, Reconciler};
