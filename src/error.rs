//! Error types for the accelerator fabric driver
//!
//! Structured errors for the allocation control plane (controller) and the
//! node-local preparation engine (node plugin), plus the retry/requeue
//! policy that drives both the controller reconciliation loop and the
//! per-claim gRPC handlers.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the driver
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal / configuration
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes / ASR errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("allocation state record not found for node {node}")]
    AsrNotFound { node: String },

    #[error("allocation state record for node {node} is not Ready")]
    NotReady { node: String },

    #[error("optimistic write conflict on node {node}")]
    Conflict { node: String },

    #[error("allocation state record for node {node} is corrupt: {reason}")]
    Corruption { node: String, reason: String },

    // =========================================================================
    // Allocation pipeline errors (C8/C9)
    // =========================================================================
    #[error("insufficient resources for claim {claim} on node {node}: {reason}")]
    InsufficientResources {
        claim: String,
        node: String,
        reason: String,
    },

    #[error("device {uid} referenced by claim {claim} is unknown")]
    UnknownDevice { claim: String, uid: String },

    #[error("claim parameters invalid: {0}")]
    ValidationError(String),

    // =========================================================================
    // Node plugin errors (C5/C10)
    // =========================================================================
    #[error("claim preparation file IO error: {0}")]
    ClaimPreparationIo(String),

    #[error("injection registry lookup failed for {vendor}/{class}/{name}")]
    InjectionLookupFailed {
        vendor: String,
        class: String,
        name: String,
    },

    #[error("VF materialization failed on parent {parent}: {reason}")]
    VfMaterializationFailed { parent: String, reason: String },

    // =========================================================================
    // Transient / IO
    // =========================================================================
    #[error("transient IO error reading {resource}: {reason}")]
    TransientIo { resource: String, reason: String },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gRPC transport error: {0}")]
    Grpc(#[from] tonic::transport::Error),
}

/// Action to take in response to an error (controller reconcile loop and
/// node-plugin RPC handlers both consult this).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after a specific duration
    RequeueAfter(Duration),
    /// Don't requeue automatically; surface to the caller
    NoRequeue,
}

impl Error {
    /// Determine what action a caller should take for this error, per the
    /// error-kind policy table.
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::Conflict { .. } => ErrorAction::RequeueAfter(Duration::from_millis(50)),

            Error::Kube(_) | Error::TransientIo { .. } | Error::ClaimPreparationIo(_) => {
                ErrorAction::RequeueWithBackoff
            }

            Error::NotReady { .. } => ErrorAction::RequeueAfter(Duration::from_secs(5)),

            Error::InsufficientResources { .. } | Error::UnknownDevice { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(10))
            }

            Error::Corruption { .. } => ErrorAction::NoRequeue,

            Error::Configuration(_) | Error::ValidationError(_) => ErrorAction::NoRequeue,

            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Whether a caller should retry at all.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Whether this is a transient failure of an external dependency.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube(_) | Error::TransientIo { .. } | Error::Conflict { .. }
        )
    }

    /// Only `Corruption` is fatal to the process (exit code 2, spec §6/§7).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Corruption { .. })
    }
}

/// Result type alias for the driver
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_retries_quickly() {
        let err = Error::Conflict {
            node: "node-1".into(),
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_millis(50))
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn corruption_is_fatal_and_not_retried() {
        let err = Error::Corruption {
            node: "node-1".into(),
            reason: "bad invariant".into(),
        };
        assert_eq!(err.action(), ErrorAction::NoRequeue);
        assert!(!err.is_retryable());
        assert!(err.is_fatal());
    }

    #[test]
    fn not_ready_requeues_after_delay() {
        let err = Error::NotReady {
            node: "node-1".into(),
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(5))
        );
    }

    #[test]
    fn insufficient_resources_is_per_claim_and_retryable() {
        let err = Error::InsufficientResources {
            claim: "claim-1".into(),
            node: "node-1".into(),
            reason: "no capacity".into(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_transient());
    }
}
