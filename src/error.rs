//! Engine error taxonomy.
//!
//! Every user-visible failure carries a message, a stable string code,
//! and, for parse failures, a source position. Semantic errors are never
//! retried; transient service failures are retried inside the fabric.

use thiserror::Error;

use policy_core::{PipelineError, PolicyError};
use service_fabric::FabricError;
use tcol_core::{ParseError, Position};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parse error: {message} at {position}")]
    Parse { message: String, position: Position },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: user '{user}' may not {action} {object}")]
    PermissionDenied {
        user: String,
        object: String,
        action: String,
    },

    #[error("unknown object '{name}'")]
    UnknownObject {
        name: String,
        suggestion: Option<String>,
    },

    #[error("unknown method '{method}' on object '{object}'")]
    UnknownMethod {
        object: String,
        method: String,
        suggestion: Option<String>,
    },

    #[error("object '{object}' has no backing service")]
    NoService { object: String },

    #[error("chain depth {depth} exceeds the maximum of {max}")]
    ChainDepthExceeded { depth: u32, max: u32 },

    /// Not an engine failure: the request was blocked by policy and the
    /// result reports what happened.
    #[error("blocked by policy: {reason}")]
    PolicyBlock { reason: String },

    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable string code for structured clients.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Parse { .. } => "PARSE_ERROR",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::PermissionDenied { .. } => "PERMISSION_DENIED",
            EngineError::UnknownObject { .. } => "UNKNOWN_OBJECT",
            EngineError::UnknownMethod { .. } => "UNKNOWN_METHOD",
            EngineError::NoService { .. } => "NO_SERVICE_FOR_OBJECT",
            EngineError::ChainDepthExceeded { .. } => "VALIDATION_ERROR",
            EngineError::PolicyBlock { .. } => "POLICY_BLOCK",
            EngineError::Fabric(e) => e.code(),
            EngineError::Pipeline(e) => e.code(),
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// A "did you mean" candidate, when one was found.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            EngineError::UnknownObject { suggestion, .. }
            | EngineError::UnknownMethod { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }
}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> Self {
        let position = err.position();
        let message = match err {
            ParseError::Lex(lex) => format!("illegal character '{}'", lex.ch),
            ParseError::Unexpected {
                expected, found, ..
            } => format!("expected {expected}, found {found}"),
            ParseError::Invalid { message, .. } => message,
        };
        EngineError::Parse { message, position }
    }
}

impl From<PolicyError> for EngineError {
    fn from(err: PolicyError) -> Self {
        EngineError::Pipeline(PipelineError::Policy(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_keeps_position() {
        let parse_err = tcol_core::parse("CUSTOMER.").unwrap_err();
        let err = EngineError::from(parse_err);
        let EngineError::Parse { position, .. } = &err else {
            panic!("expected parse error");
        };
        assert_eq!(position.column, 10);
        assert_eq!(err.code(), "PARSE_ERROR");
        assert!(err.to_string().contains("line 1, column 10"));
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            EngineError::Validation("x".to_string()).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            EngineError::Fabric(FabricError::CircuitOpen {
                service: "s".to_string()
            })
            .code(),
            "CIRCUIT_OPEN"
        );
        assert_eq!(
            EngineError::PolicyBlock {
                reason: "pii".to_string()
            }
            .code(),
            "POLICY_BLOCK"
        );
    }

    #[test]
    fn suggestion_is_exposed() {
        let err = EngineError::UnknownObject {
            name: "CUSTOMR".to_string(),
            suggestion: Some("CUSTOMER".to_string()),
        };
        assert_eq!(err.suggestion(), Some("CUSTOMER"));
    }
}
