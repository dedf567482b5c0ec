//! Prompt gateway.
//!
//! The platform's main control flow: a user prompt runs the pipeline's
//! Pre phase, goes to the inference backend through the service client
//! if it survived, and the response runs the Post phase. The audit trail
//! for both phases travels with the outcome.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use policy_core::{
    AuditReport, AuditSink, Decision, PipelineContext, PipelineEngine, RequestOptions,
};
use service_fabric::ServiceClient;

use crate::error::EngineError;
use crate::logging::Logger;

/// Where prompt completions are routed.
#[derive(Clone, Debug)]
pub struct PromptRoute {
    pub service: String,
    pub object: String,
    pub method: String,
}

impl Default for PromptRoute {
    fn default() -> Self {
        Self {
            service: "llm-service".to_string(),
            object: "PROMPT".to_string(),
            method: "COMPLETE".to_string(),
        }
    }
}

/// Outcome of one prompt submission.
#[derive(Clone, Debug)]
pub struct PromptOutcome {
    pub request_id: Uuid,
    pub decision: Decision,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub requires_review: bool,
    /// The prompt as it left the Pre phase.
    pub prompt: String,
    /// The response as it left the Post phase; `None` when blocked or in
    /// dry-run mode.
    pub response: Option<String>,
    pub report: AuditReport,
}

/// Policy-gated access to the inference backend.
pub struct PromptService {
    pipeline: PipelineEngine,
    client: Arc<ServiceClient>,
    route: PromptRoute,
    audit: Option<Logger>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl PromptService {
    pub fn new(pipeline: PipelineEngine, client: Arc<ServiceClient>) -> Self {
        Self {
            pipeline,
            client,
            route: PromptRoute::default(),
            audit: None,
            audit_sink: None,
        }
    }

    pub fn with_route(mut self, route: PromptRoute) -> Self {
        self.route = route;
        self
    }

    pub fn with_audit_logger(mut self, logger: Logger) -> Self {
        self.audit = Some(logger);
        self
    }

    /// Persist every completed request's audit report through the sink.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Run one prompt through Pre → backend → Post.
    #[instrument(skip_all, fields(pipeline = %self.pipeline.pipeline().id))]
    pub async fn submit(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        options: RequestOptions,
    ) -> Result<PromptOutcome, EngineError> {
        let mut ctx = PipelineContext::new(self.pipeline.pipeline().id.clone(), prompt)
            .with_options(options);

        let client = Arc::clone(&self.client);
        let route = self.route.clone();
        let backend_cancel = cancel.clone();
        let outcome = self
            .pipeline
            .process(&mut ctx, cancel, move |prompt_text| async move {
                let mut params = serde_json::Map::new();
                params.insert("prompt".to_string(), json!(prompt_text));
                match client
                    .execute(
                        &backend_cancel,
                        &route.service,
                        &route.object,
                        &route.method,
                        params,
                    )
                    .await
                {
                    Ok(response) => Ok(match response.data {
                        serde_json::Value::String(text) => text,
                        other => other.to_string(),
                    }),
                    Err(err) => Err(err.to_string()),
                }
            })
            .await?;

        let block_reason = outcome
            .pre
            .block_reason
            .clone()
            .or_else(|| outcome.post.as_ref().and_then(|p| p.block_reason.clone()));

        let result = PromptOutcome {
            request_id: ctx.request_id,
            decision: outcome.decision(),
            blocked: outcome.blocked(),
            block_reason,
            requires_review: ctx.requires_review,
            prompt: ctx.prompt.clone(),
            response: ctx.response.clone(),
            report: ctx.audit_report(),
        };

        if let Some(sink) = &self.audit_sink {
            sink.record(result.report.clone()).await;
        }
        if let Some(logger) = &self.audit {
            logger
                .with_request_id(result.request_id.to_string())
                .with_field("decision", json!(result.decision.as_str()))
                .with_field("blocked", json!(result.blocked))
                .with_field("stages", json!(result.report.stages.len()))
                .audit("prompt processed");
        }

        Ok(result)
    }
}
