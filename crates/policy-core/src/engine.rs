//! Pipeline engine.
//!
//! Runs a pipeline's handler chain in two independent phases over a
//! shared [`PipelineContext`]. Ordering within a phase is by handler
//! priority, declaration order on ties. Pre fully completes before Post
//! begins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::context::{AuditEntry, Phase, PipelineContext};
use crate::error::PipelineError;
use crate::handler::Handler;
use crate::pipeline::Pipeline;
use crate::policy::Decision;

/// What a phase concluded. In dry-run mode these fields report what
/// *would* have happened; the context's outgoing text is untouched.
#[derive(Clone, Debug)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub decision: Decision,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub modified: bool,
}

/// Outcome of a full `process` call.
#[derive(Clone, Debug)]
pub struct ProcessOutcome {
    pub pre: PhaseOutcome,
    pub post: Option<PhaseOutcome>,
}

impl ProcessOutcome {
    pub fn decision(&self) -> Decision {
        let post = self
            .post
            .as_ref()
            .map(|p| p.decision)
            .unwrap_or(Decision::Allow);
        self.pre.decision.combine(post)
    }

    pub fn blocked(&self) -> bool {
        self.pre.blocked || self.post.as_ref().is_some_and(|p| p.blocked)
    }
}

/// Executes one pipeline definition against per-request contexts.
pub struct PipelineEngine {
    pipeline: Pipeline,
    handlers: Vec<Arc<dyn Handler>>,
}

impl PipelineEngine {
    /// Resolve the pipeline's handler references against a handler map
    /// and order them by priority (stable on ties).
    pub fn new(
        pipeline: Pipeline,
        registry: &HashMap<String, Arc<dyn Handler>>,
    ) -> Result<Self, PipelineError> {
        let mut handlers = Vec::with_capacity(pipeline.handlers.len());
        for name in &pipeline.handlers {
            let handler = registry
                .get(name)
                .ok_or_else(|| PipelineError::UnknownHandler {
                    pipeline: pipeline.id.clone(),
                    handler: name.clone(),
                })?;
            handlers.push(Arc::clone(handler));
        }
        handlers.sort_by_key(|h| std::cmp::Reverse(h.priority()));
        Ok(Self { pipeline, handlers })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn phase_handlers(&self, phase: Phase) -> Vec<Arc<dyn Handler>> {
        if !self.pipeline.enabled {
            return Vec::new();
        }
        self.handlers
            .iter()
            .filter(|h| h.enabled() && h.kind().applies_to(phase))
            .cloned()
            .collect()
    }

    /// Run the Pre phase over `ctx.prompt`.
    #[instrument(skip_all, fields(pipeline = %self.pipeline.id, request = %ctx.request_id))]
    pub async fn process_pre(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<PhaseOutcome, PipelineError> {
        self.run_phase(ctx, Phase::Pre, cancel).await
    }

    /// Run the Post phase over `ctx.response`.
    #[instrument(skip_all, fields(pipeline = %self.pipeline.id, request = %ctx.request_id))]
    pub async fn process_post(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<PhaseOutcome, PipelineError> {
        self.run_phase(ctx, Phase::Post, cancel).await
    }

    /// Run Pre, call the backend if the request survived, then run Post.
    ///
    /// The backend is skipped when Pre blocked the request and in
    /// dry-run mode.
    pub async fn process<F, Fut>(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
        backend: F,
    ) -> Result<ProcessOutcome, PipelineError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, String>>,
    {
        let pre = self.process_pre(ctx, cancel).await?;
        if pre.blocked {
            return Ok(ProcessOutcome { pre, post: None });
        }

        if !ctx.options.dry_run {
            let response = backend(ctx.prompt.clone())
                .await
                .map_err(PipelineError::Backend)?;
            ctx.response = Some(response);
        }

        let post = self.process_post(ctx, cancel).await?;
        Ok(ProcessOutcome {
            pre,
            post: Some(post),
        })
    }

    async fn run_phase(
        &self,
        ctx: &mut PipelineContext,
        phase: Phase,
        cancel: &CancellationToken,
    ) -> Result<PhaseOutcome, PipelineError> {
        let handlers = self.phase_handlers(phase);
        if handlers.len() > self.pipeline.settings.max_stages {
            return Err(PipelineError::TooManyStages {
                pipeline: self.pipeline.id.clone(),
                stages: handlers.len(),
                max: self.pipeline.settings.max_stages,
            });
        }

        ctx.phase = phase;
        let total = self.pipeline.settings.total_timeout;
        match timeout(total, self.run_stages(ctx, phase, &handlers, cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::TotalTimeout {
                pipeline: self.pipeline.id.clone(),
                timeout_ms: total.as_millis() as u64,
            }),
        }
    }

    async fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        phase: Phase,
        handlers: &[Arc<dyn Handler>],
        cancel: &CancellationToken,
    ) -> Result<PhaseOutcome, PipelineError> {
        let settings = self.pipeline.settings;
        let dry_run = ctx.options.dry_run;

        // Handlers evaluate against a working copy so that dry-run can
        // simulate the full phase without committing mutations.
        let mut working = ctx.clone();
        working.phase = phase;

        let mut outcome = PhaseOutcome {
            phase,
            decision: Decision::Allow,
            blocked: false,
            block_reason: None,
            modified: false,
        };

        for handler in handlers {
            let name = handler.name().to_string();
            let start = Instant::now();

            let evaluated = tokio::select! {
                _ = cancel.cancelled() => {
                    ctx.audit.push(AuditEntry {
                        handler: name.clone(),
                        phase,
                        decision: Decision::Allow,
                        modified: false,
                        duration: start.elapsed(),
                        error: Some("cancelled".to_string()),
                        violations: Vec::new(),
                    });
                    return Err(PipelineError::Cancelled { handler: name });
                }
                result = timeout(settings.stage_timeout, handler.evaluate(&working)) => result,
            };

            match evaluated {
                Err(_) => {
                    warn!(handler = %name, "pipeline stage timed out");
                    ctx.audit.push(AuditEntry {
                        handler: name.clone(),
                        phase,
                        decision: Decision::Allow,
                        modified: false,
                        duration: start.elapsed(),
                        error: Some(format!(
                            "timed out after {} ms",
                            settings.stage_timeout.as_millis()
                        )),
                        violations: Vec::new(),
                    });
                    if settings.fail_open {
                        continue;
                    }
                    return Err(PipelineError::StageTimeout {
                        handler: name,
                        timeout_ms: settings.stage_timeout.as_millis() as u64,
                    });
                }
                Ok(result) => {
                    let modified = result.modified_text.is_some();
                    ctx.audit.push(AuditEntry {
                        handler: name.clone(),
                        phase,
                        decision: result.decision,
                        modified,
                        duration: start.elapsed(),
                        error: result.error.clone(),
                        violations: result.violations.clone(),
                    });

                    if let Some(text) = result.modified_text {
                        working.set_phase_text(text);
                        working.modified = true;
                        outcome.modified = true;
                    }
                    outcome.decision = outcome.decision.combine(result.decision);

                    match result.decision {
                        Decision::Block => {
                            outcome.blocked = true;
                            outcome.block_reason = Some(
                                result
                                    .violations
                                    .first()
                                    .map(|v| v.message.clone())
                                    .unwrap_or_else(|| format!("blocked by handler '{name}'")),
                            );
                            debug!(handler = %name, "phase short-circuited by block");
                            break;
                        }
                        Decision::Escalate => {
                            working.requires_review = true;
                        }
                        _ => {}
                    }
                }
            }
        }

        self.commit(ctx, &working, &outcome, dry_run);
        Ok(outcome)
    }

    /// Fold the working copy back into the request context. Dry-run
    /// keeps the outgoing text and flags untouched; audit entries were
    /// appended to the real context as they happened either way.
    fn commit(
        &self,
        ctx: &mut PipelineContext,
        working: &PipelineContext,
        outcome: &PhaseOutcome,
        dry_run: bool,
    ) {
        if dry_run {
            return;
        }
        match outcome.phase {
            Phase::Pre => ctx.prompt = working.prompt.clone(),
            Phase::Post => ctx.response = working.response.clone(),
        }
        ctx.modified |= outcome.modified;
        ctx.requires_review |= working.requires_review;
        if outcome.blocked {
            ctx.blocked = true;
            ctx.block_reason = outcome.block_reason.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerKind, HandlerResult};
    use crate::pipeline::PipelineSettings;
    use crate::policy::{RuleAction, Violation, ViolationSeverity};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedHandler {
        name: String,
        kind: HandlerKind,
        priority: i32,
        result: HandlerResult,
        delay: Duration,
    }

    impl FixedHandler {
        fn new(name: &str, result: HandlerResult) -> Self {
            Self {
                name: name.to_string(),
                kind: HandlerKind::Both,
                priority: 0,
                result,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Handler for FixedHandler {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> HandlerKind {
            self.kind
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn evaluate(&self, _ctx: &PipelineContext) -> HandlerResult {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }
    }

    fn registry(
        handlers: Vec<FixedHandler>,
    ) -> HashMap<String, Arc<dyn Handler>> {
        handlers
            .into_iter()
            .map(|h| (h.name.clone(), Arc::new(h) as Arc<dyn Handler>))
            .collect()
    }

    fn block_violation(message: &str) -> Violation {
        Violation {
            policy_id: "p".to_string(),
            rule_id: "r".to_string(),
            action: RuleAction::Block,
            severity: ViolationSeverity::Critical,
            message: message.to_string(),
            spans: Vec::new(),
        }
    }

    #[tokio::test]
    async fn block_dominates_and_short_circuits() {
        let redact = FixedHandler::new(
            "redactor",
            HandlerResult::allow()
                .with_decision(Decision::Redact)
                .with_modified_text("clean prompt"),
        );
        let mut block_result = HandlerResult::allow().with_decision(Decision::Block);
        block_result.violations.push(block_violation("forbidden content"));
        let block = FixedHandler::new("blocker", block_result);
        let tail = FixedHandler::new("never-runs", HandlerResult::allow());

        let mut redact = redact;
        redact.priority = 10;
        let mut block = block;
        block.priority = 5;
        let mut tail = tail;
        tail.priority = 1;

        let pipeline =
            Pipeline::new("p1", "test").with_handlers(["redactor", "blocker", "never-runs"]);
        let engine = PipelineEngine::new(pipeline, &registry(vec![redact, block, tail])).unwrap();

        let mut ctx = PipelineContext::new("p1", "dirty prompt");
        let cancel = CancellationToken::new();
        let outcome = engine.process_pre(&mut ctx, &cancel).await.unwrap();

        assert_eq!(outcome.decision, Decision::Block);
        assert!(ctx.blocked);
        assert_eq!(ctx.block_reason.as_deref(), Some("forbidden content"));
        // A then B, nothing after the block.
        assert_eq!(ctx.audit.len(), 2);
        assert_eq!(ctx.audit[0].handler, "redactor");
        assert_eq!(ctx.audit[1].handler, "blocker");
        // The redaction was committed before the block.
        assert_eq!(ctx.prompt, "clean prompt");
    }

    #[tokio::test]
    async fn audit_entries_match_enabled_handlers() {
        let a = FixedHandler::new("a", HandlerResult::allow());
        let b = FixedHandler::new("b", HandlerResult::allow());
        let pipeline = Pipeline::new("p1", "test").with_handlers(["a", "b"]);
        let engine = PipelineEngine::new(pipeline, &registry(vec![a, b])).unwrap();

        let mut ctx = PipelineContext::new("p1", "text");
        engine
            .process_pre(&mut ctx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ctx.audit.len(), 2);
    }

    #[tokio::test]
    async fn priority_orders_stages() {
        let mut low = FixedHandler::new("low", HandlerResult::allow());
        low.priority = 1;
        let mut high = FixedHandler::new("high", HandlerResult::allow());
        high.priority = 9;
        // Declared low before high; priority must win.
        let pipeline = Pipeline::new("p1", "test").with_handlers(["low", "high"]);
        let engine = PipelineEngine::new(pipeline, &registry(vec![low, high])).unwrap();

        let mut ctx = PipelineContext::new("p1", "text");
        engine
            .process_pre(&mut ctx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ctx.audit[0].handler, "high");
        assert_eq!(ctx.audit[1].handler, "low");
    }

    #[tokio::test]
    async fn dry_run_reports_without_committing() {
        let redact = FixedHandler::new(
            "redactor",
            HandlerResult::allow()
                .with_decision(Decision::Redact)
                .with_modified_text("scrubbed"),
        );
        let mut block_result = HandlerResult::allow().with_decision(Decision::Block);
        block_result.violations.push(block_violation("nope"));
        let block = FixedHandler::new("blocker", block_result);

        let pipeline = Pipeline::new("p1", "test").with_handlers(["redactor", "blocker"]);
        let engine = PipelineEngine::new(pipeline, &registry(vec![redact, block])).unwrap();

        let mut ctx = PipelineContext::new("p1", "original");
        ctx.options.dry_run = true;
        let outcome = engine
            .process_pre(&mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        // The caller sees what would have happened…
        assert!(outcome.blocked);
        assert!(outcome.modified);
        assert_eq!(ctx.audit.len(), 2);
        // …but nothing was committed.
        assert_eq!(ctx.prompt, "original");
        assert!(!ctx.blocked);
        assert!(!ctx.modified);
    }

    #[tokio::test]
    async fn stage_timeout_fail_open_continues_unchanged() {
        let mut slow = FixedHandler::new(
            "slow",
            HandlerResult::allow().with_modified_text("should not land"),
        );
        slow.delay = Duration::from_millis(200);
        slow.priority = 2;
        let fast = {
            let mut h = FixedHandler::new("fast", HandlerResult::allow());
            h.priority = 1;
            h
        };

        let mut pipeline = Pipeline::new("p1", "test").with_handlers(["slow", "fast"]);
        pipeline.settings = PipelineSettings {
            stage_timeout: Duration::from_millis(20),
            fail_open: true,
            ..PipelineSettings::default()
        };
        let engine = PipelineEngine::new(pipeline, &registry(vec![slow, fast])).unwrap();

        let mut ctx = PipelineContext::new("p1", "text");
        let outcome = engine
            .process_pre(&mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.blocked);
        assert_eq!(ctx.audit.len(), 2);
        assert!(ctx.audit[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(ctx.prompt, "text");
    }

    #[tokio::test]
    async fn stage_timeout_fail_closed_errors() {
        let mut slow = FixedHandler::new("slow", HandlerResult::allow());
        slow.delay = Duration::from_millis(200);

        let mut pipeline = Pipeline::new("p1", "test").with_handlers(["slow"]);
        pipeline.settings.stage_timeout = Duration::from_millis(20);
        let engine = PipelineEngine::new(pipeline, &registry(vec![slow])).unwrap();

        let mut ctx = PipelineContext::new("p1", "text");
        let err = engine
            .process_pre(&mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StageTimeout { .. }));
        // The timed-out stage still has its audit entry.
        assert_eq!(ctx.audit.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_marks_inflight_handler() {
        let mut slow = FixedHandler::new("slow", HandlerResult::allow());
        slow.delay = Duration::from_millis(500);

        let pipeline = Pipeline::new("p1", "test").with_handlers(["slow"]);
        let engine = PipelineEngine::new(pipeline, &registry(vec![slow])).unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let mut ctx = PipelineContext::new("p1", "text");
        let err = engine.process_pre(&mut ctx, &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert_eq!(ctx.audit.len(), 1);
        assert_eq!(ctx.audit[0].error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn stage_cap_is_enforced() {
        let a = FixedHandler::new("a", HandlerResult::allow());
        let b = FixedHandler::new("b", HandlerResult::allow());
        let mut pipeline = Pipeline::new("p1", "test").with_handlers(["a", "b"]);
        pipeline.settings.max_stages = 1;
        let engine = PipelineEngine::new(pipeline, &registry(vec![a, b])).unwrap();

        let mut ctx = PipelineContext::new("p1", "text");
        let err = engine
            .process_pre(&mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TooManyStages { .. }));
    }

    #[tokio::test]
    async fn process_runs_backend_between_phases() {
        let pre = FixedHandler::new(
            "pre",
            HandlerResult::allow().with_modified_text("cleaned prompt"),
        );
        let mut post = FixedHandler::new(
            "post",
            HandlerResult::allow().with_modified_text("cleaned response"),
        );
        post.kind = HandlerKind::PostProcess;
        let mut pre = pre;
        pre.kind = HandlerKind::PreProcess;

        let pipeline = Pipeline::new("p1", "test").with_handlers(["pre", "post"]);
        let engine = PipelineEngine::new(pipeline, &registry(vec![pre, post])).unwrap();

        let mut ctx = PipelineContext::new("p1", "raw prompt");
        let outcome = engine
            .process(&mut ctx, &CancellationToken::new(), |prompt| async move {
                assert_eq!(prompt, "cleaned prompt");
                Ok("raw response".to_string())
            })
            .await
            .unwrap();

        assert!(!outcome.blocked());
        assert_eq!(ctx.response.as_deref(), Some("cleaned response"));
        assert_eq!(ctx.audit.len(), 2);
        assert_eq!(ctx.audit[0].phase, Phase::Pre);
        assert_eq!(ctx.audit[1].phase, Phase::Post);
    }

    #[tokio::test]
    async fn blocked_pre_skips_backend() {
        let mut block_result = HandlerResult::allow().with_decision(Decision::Block);
        block_result.violations.push(block_violation("no"));
        let blocker = FixedHandler::new("blocker", block_result);

        let pipeline = Pipeline::new("p1", "test").with_handlers(["blocker"]);
        let engine = PipelineEngine::new(pipeline, &registry(vec![blocker])).unwrap();

        let mut ctx = PipelineContext::new("p1", "prompt");
        let outcome = engine
            .process(&mut ctx, &CancellationToken::new(), |_prompt| async move {
                Err::<String, String>("backend must not be called".to_string())
            })
            .await
            .unwrap();

        assert!(outcome.blocked());
        assert!(outcome.post.is_none());
        assert!(ctx.response.is_none());
    }

    #[tokio::test]
    async fn disabled_pipeline_runs_no_handlers() {
        let a = FixedHandler::new("a", HandlerResult::allow());
        let mut pipeline = Pipeline::new("p1", "test").with_handlers(["a"]);
        pipeline.enabled = false;
        let engine = PipelineEngine::new(pipeline, &registry(vec![a])).unwrap();

        let mut ctx = PipelineContext::new("p1", "text");
        let outcome = engine
            .process_pre(&mut ctx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.decision, Decision::Allow);
        assert!(ctx.audit.is_empty());
    }

    #[test]
    fn unknown_handler_is_rejected_at_construction() {
        let pipeline = Pipeline::new("p1", "test").with_handlers(["ghost"]);
        let err = PipelineEngine::new(pipeline, &HashMap::new()).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownHandler { .. }));
    }
}
