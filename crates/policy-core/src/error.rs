//! Policy and pipeline error types.

use thiserror::Error;

/// Errors raised while compiling or evaluating policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A rule pattern failed to compile.
    #[error("invalid pattern in policy '{policy_id}' rule '{rule_id}': {source}")]
    Pattern {
        policy_id: String,
        rule_id: String,
        #[source]
        source: regex::Error,
    },
}

impl PolicyError {
    /// Stable string code for structured clients.
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::Pattern { .. } => "PATTERN_ERROR",
        }
    }
}

/// Errors raised by the pipeline engine.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline '{pipeline}' references unknown handler '{handler}'")]
    UnknownHandler { pipeline: String, handler: String },

    #[error("pipeline '{pipeline}' has {stages} stages, exceeding the cap of {max}")]
    TooManyStages {
        pipeline: String,
        stages: usize,
        max: usize,
    },

    #[error("handler '{handler}' timed out after {timeout_ms} ms")]
    StageTimeout { handler: String, timeout_ms: u64 },

    #[error("pipeline '{pipeline}' timed out after {timeout_ms} ms")]
    TotalTimeout { pipeline: String, timeout_ms: u64 },

    #[error("pipeline cancelled during handler '{handler}'")]
    Cancelled { handler: String },

    #[error("backend call failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl PipelineError {
    /// Stable string code for structured clients.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::UnknownHandler { .. } => "UNKNOWN_HANDLER",
            PipelineError::TooManyStages { .. } => "VALIDATION_ERROR",
            PipelineError::StageTimeout { .. } => "DEADLINE_EXCEEDED",
            PipelineError::TotalTimeout { .. } => "DEADLINE_EXCEEDED",
            PipelineError::Cancelled { .. } => "CANCELLED",
            PipelineError::Backend(_) => "SERVICE_CALL_ERROR",
            PipelineError::Policy(e) => e.code(),
        }
    }
}
