// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Quasar operations.
///
/// This is a closed enum: controllers branch on variants directly rather than
/// downcasting through error chains. `ResourcesRemaining` in particular is a
/// policy signal ("still draining, come back later"), not a defect.
#[derive(Error, Debug, Diagnostic)]
pub enum QuasarError {
    /// Resource not found
    #[error("Resource not found: {resource}")]
    #[diagnostic(
        code(quasar::not_found),
        help("Verify the cluster, namespace, and name are correct")
    )]
    NotFound { resource: String },

    /// Optimistic-concurrency conflict
    #[error("Conflict detected for resource {resource}")]
    #[diagnostic(
        code(quasar::conflict),
        help("The resource was modified concurrently. Re-fetch and retry with the latest resourceVersion")
    )]
    Conflict { resource: String },

    /// Content is still being drained from a logical cluster
    #[error("{estimate} resources remaining in logical cluster")]
    #[diagnostic(
        code(quasar::resources_remaining),
        help("Not a failure. The controller re-queues the cluster and checks again later")
    )]
    ResourcesRemaining { estimate: u64 },

    /// An owner object exists but carries a different UID than recorded
    #[error("Owner {resource} has UID {actual_uid}, expected {expected_uid}")]
    #[diagnostic(
        code(quasar::owner_replaced),
        help("The owner was deleted and recreated under the same name. No mutation is performed on the replacement")
    )]
    OwnerReplaced {
        resource: String,
        expected_uid: String,
        actual_uid: String,
    },

    /// A reconcile key that cannot be split back into its components
    #[error("Malformed reconcile key {key:?}: {reason}")]
    #[diagnostic(
        code(quasar::malformed_key),
        help("Keys must look like 'cluster|name' or 'cluster|namespace/name'")
    )]
    MalformedKey { key: String, reason: String },

    /// Unexpected response from the API front door
    #[error("API error (status {status}): {message}")]
    #[diagnostic(
        code(quasar::api_error),
        help("Check the shard front-door address and server logs")
    )]
    Api { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(quasar::serialization_error),
        help("Ensure the resource format is valid JSON")
    )]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(quasar::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    Internal { message: String },
}

/// Result type alias for Quasar operations
pub type Result<T> = std::result::Result<T, QuasarError>;

impl QuasarError {
    /// Create a NotFound error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a Conflict error
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    /// Create a ResourcesRemaining signal
    pub fn resources_remaining(estimate: u64) -> Self {
        Self::ResourcesRemaining { estimate }
    }

    /// Create an OwnerReplaced error
    pub fn owner_replaced(
        resource: impl Into<String>,
        expected_uid: impl Into<String>,
        actual_uid: impl Into<String>,
    ) -> Self {
        Self::OwnerReplaced {
            resource: resource.into(),
            expected_uid: expected_uid.into(),
            actual_uid: actual_uid.into(),
        }
    }

    /// Create a MalformedKey error
    pub fn malformed_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an Api error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a Serialization error
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source,
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for not-found errors, which delete paths treat as success
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for optimistic-concurrency conflicts
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Delay before re-checking a cluster that still has `estimate` resources
/// left to drain.
///
/// Sub-linear on purpose: early in a large drain the controller re-checks
/// frequently, and the waits taper off as the estimate shrinks. Never less
/// than one second, to avoid busy-looping on estimate 0.
pub fn requeue_delay(estimate: u64) -> std::time::Duration {
    std::time::Duration::from_secs(estimate / 2 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = QuasarError::not_found("logicalclusters/root:org:team");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());

        let err = QuasarError::conflict("logicalclusters/root:org:team");
        assert!(err.is_conflict());

        let err = QuasarError::owner_replaced("widgets/w1", "abc", "xyz");
        assert!(matches!(err, QuasarError::OwnerReplaced { .. }));
    }

    #[test]
    fn test_requeue_delay_mapping() {
        // integer division: 9/2 + 1 = 5
        assert_eq!(requeue_delay(9), std::time::Duration::from_secs(5));
        assert_eq!(requeue_delay(4), std::time::Duration::from_secs(3));
        // floor of at least one second
        assert_eq!(requeue_delay(0), std::time::Duration::from_secs(1));
        assert_eq!(requeue_delay(1), std::time::Duration::from_secs(1));
    }
}
