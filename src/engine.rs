//! Engine facade.
//!
//! Single entry point for tooling: validate the raw command string,
//! resolve aliases, parse, execute through the TCOL executor, and wrap
//! the outcome with the original string, AST, and timing.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use service_fabric::ServiceClient;
use tcol_core::Command;

use crate::error::EngineError;
use crate::executor::{ExecutionContext, TcolExecutor};
use crate::logging::Logger;
use crate::permission::PermissionChecker;
use crate::registry::Registry;

/// Facade tunables.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub max_command_length: usize,
    pub max_chain_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_command_length: 4096,
            max_chain_depth: 8,
        }
    }
}

/// Outcome of one `execute` call.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub request_id: Uuid,
    /// The original command string as submitted.
    pub command: String,
    pub ast: Command,
    pub data: serde_json::Value,
    pub metadata: HashMap<String, String>,
    pub duration: Duration,
}

/// Orchestrates validate → parse → execute for TCOL strings.
pub struct Engine {
    registry: Arc<Registry>,
    executor: TcolExecutor,
    audit: Option<Logger>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, client: Arc<ServiceClient>) -> Self {
        let config = EngineConfig::default();
        Self {
            executor: TcolExecutor::new(Arc::clone(&registry), client)
                .with_max_chain_depth(config.max_chain_depth),
            registry,
            audit: None,
            config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self.executor = self.executor.with_max_chain_depth(config.max_chain_depth);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.executor = self.executor.with_permissions(permissions);
        self
    }

    pub fn with_audit_logger(mut self, logger: Logger) -> Self {
        self.audit = Some(logger.clone());
        self.executor = self.executor.with_audit_logger(logger);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Validate, parse, and execute one command string.
    #[instrument(skip_all, fields(user = user_id.unwrap_or("anonymous")))]
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        user_id: Option<&str>,
        command: &str,
    ) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();
        let submitted = command.to_string();

        let command = self.validate_input(command)?;
        let command = self.resolve_alias(&command);
        let ast = tcol_core::parse(&command)?;

        let ctx = ExecutionContext::new(user_id.map(str::to_string));
        let result = self.executor.execute(cancel, &ast, &ctx).await;

        if let Some(logger) = &self.audit {
            let logger = logger
                .with_request_id(ctx.request_id.to_string())
                .with_field("command", json!(submitted));
            match &result {
                Ok(_) => logger.audit("execute succeeded"),
                Err(err) => logger
                    .with_field("error", json!(err.to_string()))
                    .with_field("code", json!(err.code()))
                    .audit("execute failed"),
            }
        }

        let response = result?;
        Ok(ExecutionResult {
            request_id: ctx.request_id,
            command: submitted,
            ast,
            data: response.data,
            metadata: response.metadata,
            duration: started.elapsed(),
        })
    }

    fn validate_input(&self, command: &str) -> Result<String, EngineError> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(EngineError::Validation("command is empty".to_string()));
        }
        if trimmed.len() > self.config.max_command_length {
            return Err(EngineError::Validation(format!(
                "command length {} exceeds the maximum of {}",
                trimmed.len(),
                self.config.max_command_length
            )));
        }
        if sql_fragments().is_match(trimmed) {
            return Err(EngineError::Validation(
                "command contains a rejected fragment".to_string(),
            ));
        }
        Ok(trimmed.to_string())
    }

    /// A bare word that names an alias is replaced by its command text.
    fn resolve_alias(&self, command: &str) -> String {
        let is_bare_word = !command
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '.' | ':' | '[' | '|' | '='));
        if is_bare_word {
            if let Some(resolved) = self.registry.resolve_alias(command) {
                return resolved;
            }
        }
        command.to_string()
    }
}

/// Conservative screen for obvious SQL-injection fragments.
fn sql_fragments() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(union\s+select|;\s*drop\s+|;\s*delete\s+from|;\s*truncate\s+|insert\s+into\s+\w+\s+(values|select)|xp_cmdshell|'\s*or\s+'1'\s*=\s*'1)",
        )
        .expect("screen pattern compiles")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogFormat, Logger, LoggerConfig, SharedBuffer};
    use crate::registry::{MethodDefinition, ObjectDefinition};
    use crate::testing::RecordingBackend;
    use service_fabric::{ServiceClientConfig, StaticDiscovery};

    fn engine_with(backend: Arc<RecordingBackend>) -> Engine {
        let registry = Arc::new(Registry::new());
        registry
            .register_object(
                ObjectDefinition::new("CUSTOMER", "customer-service")
                    .with_method(MethodDefinition::new("LIST")),
            )
            .unwrap();
        let client = Arc::new(ServiceClient::new(
            ServiceClientConfig::default(),
            Arc::new(StaticDiscovery::new()),
            backend,
        ));
        Engine::new(registry, client)
    }

    #[tokio::test]
    async fn executes_and_wraps_the_result() {
        let backend = Arc::new(RecordingBackend::new());
        let engine = engine_with(Arc::clone(&backend));

        let result = engine
            .execute(&CancellationToken::new(), Some("alice"), "CUSTOMER.LIST")
            .await
            .unwrap();

        assert_eq!(result.command, "CUSTOMER.LIST");
        assert_eq!(result.ast.object, "CUSTOMER");
        assert_eq!(result.data, serde_json::json!({"ok": true}));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_commands() {
        let engine = engine_with(Arc::new(RecordingBackend::new()))
            .with_config(EngineConfig {
                max_command_length: 20,
                max_chain_depth: 8,
            });
        let cancel = CancellationToken::new();

        let err = engine.execute(&cancel, None, "   ").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = engine
            .execute(&cancel, None, "CUSTOMER.LIST status=unpaid")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn rejects_sql_fragments() {
        let engine = engine_with(Arc::new(RecordingBackend::new()));
        let cancel = CancellationToken::new();

        for input in [
            "CUSTOMER.LIST q=\"1 UNION SELECT password\"",
            "CUSTOMER.LIST; DROP TABLE users",
            "CUSTOMER.FIND q=\"' or '1'='1\"",
        ] {
            let err = engine.execute(&cancel, None, input).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "input: {input}");
        }
    }

    #[tokio::test]
    async fn parse_errors_carry_position() {
        let engine = engine_with(Arc::new(RecordingBackend::new()));
        let err = engine
            .execute(&CancellationToken::new(), None, "CUSTOMER.")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
        assert!(err.to_string().contains("column 10"));
    }

    #[tokio::test]
    async fn bare_alias_resolves_before_parse() {
        let backend = Arc::new(RecordingBackend::new());
        let engine = engine_with(Arc::clone(&backend));
        engine
            .registry()
            .register_alias("uc", "CUSTOMER.LIST status=unpaid")
            .unwrap();

        let result = engine
            .execute(&CancellationToken::new(), None, "uc")
            .await
            .unwrap();

        assert_eq!(result.ast.object, "CUSTOMER");
        let calls = backend.calls();
        assert_eq!(calls[0].params["status"], serde_json::json!("unpaid"));
    }

    #[tokio::test]
    async fn audit_logger_sees_success_and_failure() {
        let buffer = SharedBuffer::new();
        let logger = Logger::with_writer(
            LoggerConfig {
                format: LogFormat::Json,
                ..LoggerConfig::default()
            },
            Box::new(buffer.clone()),
        );
        let engine = engine_with(Arc::new(RecordingBackend::new())).with_audit_logger(logger);
        let cancel = CancellationToken::new();

        engine
            .execute(&cancel, None, "CUSTOMER.LIST")
            .await
            .unwrap();
        let _ = engine.execute(&cancel, None, "GHOST.RUN").await;

        let lines = buffer.lines();
        // Executor STARTED/COMPLETED plus engine-level records.
        assert!(lines
            .iter()
            .any(|l| l.contains("execute succeeded")));
        assert!(lines.iter().any(|l| l.contains("execute failed")));
        assert!(lines.iter().any(|l| l.contains("UNKNOWN_OBJECT")));
    }
}
