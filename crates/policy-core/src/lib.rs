//! Policy model and pipeline engine.
//!
//! The crate covers the policy-driven half of the platform core:
//!
//! - [`policy`]: typed policies with ordered regex rules and the
//!   decision dominance ordering
//! - [`evaluator`]: rule evaluation, priority-ordered policy sets, and
//!   the `test_policy` harness
//! - [`handler`]: the pipeline handler contract plus the policy-backed
//!   handler
//! - [`context`]: per-request state and the audit trail
//! - [`pipeline`], [`engine`]: pipeline definitions and the two-phase
//!   execution engine (pre/post, dry-run, timeouts, fail-open)
//! - [`catalog`]: ready-made PII / security / content policies
//! - [`repository`]: injected persistence seams with in-memory defaults

pub mod catalog;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod handler;
pub mod pipeline;
pub mod policy;
pub mod repository;

pub use context::{AuditEntry, AuditReport, AuditStage, Phase, PipelineContext, RequestOptions};
pub use engine::{PhaseOutcome, PipelineEngine, ProcessOutcome};
pub use error::{PipelineError, PolicyError};
pub use evaluator::{evaluate_policy, test_policy, Evaluation, PolicySet, PolicyTestReport};
pub use handler::{Handler, HandlerKind, HandlerResult, PolicyHandler};
pub use pipeline::{Pipeline, PipelineSettings};
pub use repository::{
    AuditSink, InMemoryPipelineStore, InMemoryPolicyStore, MemoryAuditSink, PipelineStore,
    PolicyStore,
};
pub use policy::{
    CompiledPolicy, CompiledRule, Decision, Policy, PolicyRule, PolicyType, RuleAction, Violation,
    ViolationSeverity,
};
