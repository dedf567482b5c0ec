//! Handler contract and the policy-backed handler.
//!
//! Handlers are the units of a pipeline phase: each inspects the phase
//! text (prompt or response) and returns a [`HandlerResult`] the engine
//! merges into the request context.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::context::{Phase, PipelineContext};
use crate::evaluator::PolicySet;
use crate::policy::{Decision, Violation};

/// Which phases a handler participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    PreProcess,
    PostProcess,
    Both,
}

impl HandlerKind {
    pub fn applies_to(self, phase: Phase) -> bool {
        match self {
            HandlerKind::PreProcess => phase == Phase::Pre,
            HandlerKind::PostProcess => phase == Phase::Post,
            HandlerKind::Both => true,
        }
    }
}

/// Outcome of one handler invocation.
#[derive(Clone, Debug)]
pub struct HandlerResult {
    pub decision: Decision,
    /// Replacement for the phase text, when the handler rewrote it.
    pub modified_text: Option<String>,
    pub violations: Vec<Violation>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl HandlerResult {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            modified_text: None,
            violations: Vec::new(),
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = decision;
        self
    }

    pub fn with_modified_text(mut self, text: impl Into<String>) -> Self {
        self.modified_text = Some(text.into());
        self
    }
}

/// A unit in a pipeline phase.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> HandlerKind;

    /// Higher priority runs earlier; ties keep declaration order.
    fn priority(&self) -> i32 {
        0
    }

    fn enabled(&self) -> bool {
        true
    }

    /// Inspect the context's phase text and produce a result. The engine
    /// owns merging the result into the context; handlers must not assume
    /// their modifications are committed (dry-run).
    async fn evaluate(&self, ctx: &PipelineContext) -> HandlerResult;
}

/// A handler evaluating an ordered policy set against the phase text.
///
/// This is the bridge between the policy model and the pipeline: a stage
/// backed by compiled policies, usable in either phase.
pub struct PolicyHandler {
    name: String,
    kind: HandlerKind,
    priority: i32,
    enabled: bool,
    policies: PolicySet,
}

impl PolicyHandler {
    pub fn new(name: impl Into<String>, kind: HandlerKind, policies: PolicySet) -> Self {
        Self {
            name: name.into(),
            kind,
            priority: 0,
            enabled: true,
            policies,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[async_trait]
impl Handler for PolicyHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn evaluate(&self, ctx: &PipelineContext) -> HandlerResult {
        let start = Instant::now();
        let evaluation = self.policies.evaluate(ctx.phase_text());
        HandlerResult {
            decision: evaluation.decision,
            modified_text: evaluation.modified.then_some(evaluation.output),
            violations: evaluation.violations,
            error: None,
            duration: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Policy, PolicyRule, PolicyType, RuleAction};

    fn redaction_policy() -> Policy {
        Policy {
            id: "pii".to_string(),
            name: "pii".to_string(),
            description: String::new(),
            policy_type: PolicyType::Pii,
            enabled: true,
            priority: 0,
            rules: vec![PolicyRule {
                id: "ssn".to_string(),
                pattern: r"\d{3}-\d{2}-\d{4}".to_string(),
                action: RuleAction::Redact,
                message: "ssn detected".to_string(),
                replacement: Some("[SSN]".to_string()),
                case_sensitive: false,
            }],
        }
    }

    #[test]
    fn kind_applies_to_phase() {
        assert!(HandlerKind::PreProcess.applies_to(Phase::Pre));
        assert!(!HandlerKind::PreProcess.applies_to(Phase::Post));
        assert!(HandlerKind::Both.applies_to(Phase::Post));
    }

    #[tokio::test]
    async fn policy_handler_redacts_phase_text() {
        let set = PolicySet::compile(&[redaction_policy()]).unwrap();
        let handler = PolicyHandler::new("pii-redactor", HandlerKind::PreProcess, set);

        let ctx = PipelineContext::new("p1", "ssn is 123-45-6789 ok");
        let result = handler.evaluate(&ctx).await;
        assert_eq!(result.decision, Decision::Redact);
        assert_eq!(result.modified_text.as_deref(), Some("ssn is [SSN] ok"));
        assert_eq!(result.violations.len(), 1);
    }

    #[tokio::test]
    async fn policy_handler_allows_clean_text() {
        let set = PolicySet::compile(&[redaction_policy()]).unwrap();
        let handler = PolicyHandler::new("pii-redactor", HandlerKind::Both, set);

        let ctx = PipelineContext::new("p1", "all clear");
        let result = handler.evaluate(&ctx).await;
        assert_eq!(result.decision, Decision::Allow);
        assert!(result.modified_text.is_none());
    }
}
