//! Policy model.
//!
//! A policy is a named, prioritized collection of regex rules with typed
//! actions. Rule patterns are compiled once per policy version and cached
//! on the compiled form; compiling per evaluation is a hot-path bug.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Policy categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Pii,
    Content,
    Security,
    Custom,
}

/// Per-rule action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Block,
    Redact,
    Warn,
    Log,
    Escalate,
}

/// Aggregate decision of a policy, a handler, or a whole pipeline.
///
/// Dominance: Block > Escalate > Redact > Warn > Allow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Warn,
    Redact,
    Escalate,
    Block,
}

impl Decision {
    fn rank(self) -> u8 {
        match self {
            Decision::Allow => 0,
            Decision::Warn => 1,
            Decision::Redact => 2,
            Decision::Escalate => 3,
            Decision::Block => 4,
        }
    }

    /// Combine two decisions under the dominance ordering.
    pub fn combine(self, other: Decision) -> Decision {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Warn => "warn",
            Decision::Redact => "redact",
            Decision::Escalate => "escalate",
            Decision::Block => "block",
        }
    }
}

/// Severity attached to a recorded violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Log,
    Warn,
    Critical,
}

/// One rule match worth recording.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Violation {
    pub policy_id: String,
    pub rule_id: String,
    pub action: RuleAction,
    pub severity: ViolationSeverity,
    pub message: String,
    /// Byte spans of the matches in the text the rule saw.
    pub spans: Vec<(usize, usize)>,
}

/// A single policy rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub pattern: String,
    pub action: RuleAction,
    pub message: String,
    /// Replacement text for `Redact`; empty means deletion.
    #[serde(default)]
    pub replacement: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// A typed policy with ordered rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub policy_type: PolicyType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Higher priority evaluates earlier.
    #[serde(default)]
    pub priority: i32,
    pub rules: Vec<PolicyRule>,
}

fn default_enabled() -> bool {
    true
}

impl Policy {
    /// Compile every rule pattern, honoring the case-sensitivity flag.
    ///
    /// Fails with the policy and rule id of the first invalid pattern.
    pub fn compile(&self) -> Result<CompiledPolicy, PolicyError> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(!rule.case_sensitive)
                .build()
                .map_err(|source| PolicyError::Pattern {
                    policy_id: self.id.clone(),
                    rule_id: rule.id.clone(),
                    source,
                })?;
            rules.push(CompiledRule {
                rule: rule.clone(),
                regex,
            });
        }
        Ok(CompiledPolicy {
            policy: self.clone(),
            rules,
        })
    }
}

/// A rule with its compiled pattern.
#[derive(Clone, Debug)]
pub struct CompiledRule {
    pub rule: PolicyRule,
    pub regex: Regex,
}

/// A policy with all patterns compiled; owned regexes live and die with it.
#[derive(Clone, Debug)]
pub struct CompiledPolicy {
    pub policy: Policy,
    pub rules: Vec<CompiledRule>,
}
