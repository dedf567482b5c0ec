//! Fabric error taxonomy.
//!
//! The client distinguishes recoverable transport failures (retried)
//! from terminal conditions (cancellation, deadline, and semantic errors
//! propagated from the executor). Confusing the two breaks the retry
//! contract.

use thiserror::Error;

/// Errors surfaced by discovery, the circuit breaker, and the client.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("service '{service}' not found in discovery")]
    NotFound { service: String },

    #[error("circuit open for service '{service}'")]
    CircuitOpen { service: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Semantic errors propagated from the executor through a backend.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// Transient backend failure; retried by the client.
    #[error("transport error: {0}")]
    Transport(String),

    /// Final wrapped failure after retries were exhausted.
    #[error("service call {service}/{object}.{method} failed after {attempts} attempts: {source}")]
    ServiceCall {
        service: String,
        object: String,
        method: String,
        attempts: u32,
        #[source]
        source: Box<FabricError>,
    },

    #[error("teardown failed: {0}")]
    Teardown(String),
}

impl FabricError {
    /// Terminal errors are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FabricError::Cancelled
                | FabricError::DeadlineExceeded
                | FabricError::PermissionDenied(_)
                | FabricError::Validation(_)
                | FabricError::UnknownObject(_)
                | FabricError::CircuitOpen { .. }
                | FabricError::NotFound { .. }
        )
    }

    /// Stable string code for structured clients.
    pub fn code(&self) -> &'static str {
        match self {
            FabricError::NotFound { .. } => "NO_SERVICE_FOR_OBJECT",
            FabricError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            FabricError::Cancelled => "CANCELLED",
            FabricError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            FabricError::PermissionDenied(_) => "PERMISSION_DENIED",
            FabricError::Validation(_) => "VALIDATION_ERROR",
            FabricError::UnknownObject(_) => "UNKNOWN_OBJECT",
            FabricError::Transport(_) => "SERVICE_CALL_ERROR",
            FabricError::ServiceCall { .. } => "SERVICE_CALL_ERROR",
            FabricError::Teardown(_) => "INTERNAL_ERROR",
        }
    }
}
