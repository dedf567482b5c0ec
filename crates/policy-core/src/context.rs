//! Per-request pipeline context and audit trail.
//!
//! A context is owned by a single `process` call; it is never shared
//! across requests. Audit entries accumulate in execution order and are
//! never dropped, including on handler error and in dry-run mode.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::policy::{Decision, Violation};

/// Pipeline phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pre,
    Post,
}

/// Caller options for one request.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestOptions {
    /// Handlers run and audit accumulates, but no mutation is committed.
    pub dry_run: bool,
    pub debug: bool,
}

/// One record per handler invocation, ordered by execution.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEntry {
    pub handler: String,
    pub phase: Phase,
    pub decision: Decision,
    pub modified: bool,
    pub duration: Duration,
    pub error: Option<String>,
    pub violations: Vec<Violation>,
}

/// Shared state for one pipeline request, spanning both phases.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub request_id: Uuid,
    pub pipeline_id: String,
    pub phase: Phase,
    pub prompt: String,
    pub response: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub audit: Vec<AuditEntry>,
    pub blocked: bool,
    pub modified: bool,
    pub requires_review: bool,
    pub block_reason: Option<String>,
    pub options: RequestOptions,
}

impl PipelineContext {
    pub fn new(pipeline_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            pipeline_id: pipeline_id.into(),
            phase: Phase::Pre,
            prompt: prompt.into(),
            response: None,
            metadata: HashMap::new(),
            audit: Vec::new(),
            blocked: false,
            modified: false,
            requires_review: false,
            block_reason: None,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// The text the current phase operates on: the prompt in Pre, the
    /// response in Post (empty when no response has been produced yet).
    pub fn phase_text(&self) -> &str {
        match self.phase {
            Phase::Pre => &self.prompt,
            Phase::Post => self.response.as_deref().unwrap_or(""),
        }
    }

    pub fn set_phase_text(&mut self, text: String) {
        match self.phase {
            Phase::Pre => self.prompt = text,
            Phase::Post => self.response = Some(text),
        }
    }

    /// Aggregate decision over all audit entries so far.
    pub fn decision(&self) -> Decision {
        self.audit
            .iter()
            .fold(Decision::Allow, |acc, entry| acc.combine(entry.decision))
    }

    /// The persistable audit report for this request.
    pub fn audit_report(&self) -> AuditReport {
        AuditReport {
            request_id: self.request_id,
            timestamp: Utc::now(),
            decision: self.decision(),
            stages: self
                .audit
                .iter()
                .map(|entry| AuditStage {
                    handler: entry.handler.clone(),
                    phase: entry.phase,
                    modified: entry.modified,
                    duration_ms: entry.duration.as_millis() as u64,
                    error: entry.error.clone(),
                })
                .collect(),
        }
    }
}

/// Persisted handler-result shape.
#[derive(Clone, Debug, Serialize)]
pub struct AuditReport {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub stages: Vec<AuditStage>,
}

/// One stage of the persisted audit report.
#[derive(Clone, Debug, Serialize)]
pub struct AuditStage {
    pub handler: String,
    pub phase: Phase,
    pub modified: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
