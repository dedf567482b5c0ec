//! Policy evaluation.
//!
//! Rules are applied in order within a policy; policies are applied in
//! descending priority within a set, each seeing the text as modified by
//! its predecessors. Decisions aggregate under the dominance ordering.

use std::time::{Duration, Instant};

use regex::NoExpand;
use serde::Serialize;
use tracing::debug;

use crate::error::PolicyError;
use crate::policy::{
    CompiledPolicy, Decision, Policy, RuleAction, Violation, ViolationSeverity,
};

/// Outcome of evaluating one policy or a whole set against a text.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub decision: Decision,
    pub violations: Vec<Violation>,
    /// The text after any redactions.
    pub output: String,
    pub modified: bool,
    /// Number of rules whose action was `Allow` that matched.
    pub allow_matches: usize,
}

impl Evaluation {
    fn passthrough(text: &str) -> Self {
        Self {
            decision: Decision::Allow,
            violations: Vec::new(),
            output: text.to_string(),
            modified: false,
            allow_matches: 0,
        }
    }
}

/// Evaluate a single compiled policy against a text.
pub fn evaluate_policy(compiled: &CompiledPolicy, input: &str) -> Evaluation {
    let mut evaluation = Evaluation::passthrough(input);
    if !compiled.policy.enabled {
        return evaluation;
    }

    for compiled_rule in &compiled.rules {
        let rule = &compiled_rule.rule;
        let spans: Vec<(usize, usize)> = compiled_rule
            .regex
            .find_iter(&evaluation.output)
            .map(|m| (m.start(), m.end()))
            .collect();
        if spans.is_empty() {
            continue;
        }

        debug!(
            policy = %compiled.policy.id,
            rule = %rule.id,
            action = ?rule.action,
            matches = spans.len(),
            "policy rule matched"
        );

        let violation = |severity: ViolationSeverity| Violation {
            policy_id: compiled.policy.id.clone(),
            rule_id: rule.id.clone(),
            action: rule.action,
            severity,
            message: rule.message.clone(),
            spans: spans.clone(),
        };

        match rule.action {
            RuleAction::Allow => {
                evaluation.allow_matches += 1;
            }
            RuleAction::Block => {
                evaluation.violations.push(violation(ViolationSeverity::Critical));
                evaluation.decision = evaluation.decision.combine(Decision::Block);
                // Block is terminal for this policy.
                break;
            }
            RuleAction::Redact => {
                let replacement = rule.replacement.clone().unwrap_or_default();
                evaluation.output = compiled_rule
                    .regex
                    .replace_all(&evaluation.output, NoExpand(&replacement))
                    .into_owned();
                evaluation.modified = true;
                evaluation.violations.push(violation(ViolationSeverity::Warn));
                evaluation.decision = evaluation.decision.combine(Decision::Redact);
            }
            RuleAction::Warn => {
                evaluation.violations.push(violation(ViolationSeverity::Warn));
                evaluation.decision = evaluation.decision.combine(Decision::Warn);
            }
            RuleAction::Log => {
                evaluation.violations.push(violation(ViolationSeverity::Log));
            }
            RuleAction::Escalate => {
                evaluation.violations.push(violation(ViolationSeverity::Critical));
                evaluation.decision = evaluation.decision.combine(Decision::Escalate);
            }
        }
    }

    evaluation
}

/// An ordered, pre-compiled set of policies.
#[derive(Clone, Debug, Default)]
pub struct PolicySet {
    policies: Vec<CompiledPolicy>,
}

impl PolicySet {
    /// Compile a set of policies, ordering them by descending priority.
    /// Disabled policies are kept (and skipped at evaluation) so that the
    /// set mirrors its source definition.
    pub fn compile(policies: &[Policy]) -> Result<Self, PolicyError> {
        let mut compiled: Vec<CompiledPolicy> = policies
            .iter()
            .map(Policy::compile)
            .collect::<Result<_, _>>()?;
        compiled.sort_by_key(|c| std::cmp::Reverse(c.policy.priority));
        Ok(Self { policies: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn policies(&self) -> &[CompiledPolicy] {
        &self.policies
    }

    /// Evaluate all policies in priority order, threading redactions.
    pub fn evaluate(&self, input: &str) -> Evaluation {
        let mut aggregate = Evaluation::passthrough(input);
        for compiled in &self.policies {
            let evaluation = evaluate_policy(compiled, &aggregate.output);
            aggregate.decision = aggregate.decision.combine(evaluation.decision);
            aggregate.violations.extend(evaluation.violations);
            aggregate.allow_matches += evaluation.allow_matches;
            if evaluation.modified {
                aggregate.output = evaluation.output;
                aggregate.modified = true;
            }
        }
        aggregate
    }
}

/// Result of the [`test_policy`] harness.
#[derive(Clone, Debug, Serialize)]
pub struct PolicyTestReport {
    pub decision: Decision,
    pub violations: Vec<Violation>,
    pub modified_text: String,
    pub duration: Duration,
}

/// Apply one policy to a sample text without touching persisted state.
pub fn test_policy(policy: &Policy, sample_text: &str) -> Result<PolicyTestReport, PolicyError> {
    let compiled = policy.compile()?;
    let start = Instant::now();
    let evaluation = evaluate_policy(&compiled, sample_text);
    Ok(PolicyTestReport {
        decision: evaluation.decision,
        violations: evaluation.violations,
        modified_text: evaluation.output,
        duration: start.elapsed(),
    })
}
