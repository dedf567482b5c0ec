//! TCOL command executor.
//!
//! Dispatches parsed commands over the service fabric. Four paths:
//! direct object access (`GET`), field operations (`GET_FIELD` /
//! `SET_FIELD`), method calls, and the in-process builtins (ALIAS,
//! HELP). Chained commands execute after their parent; a chain failure
//! annotates the parent result instead of failing it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use service_fabric::{ServiceClient, ServiceResponse};
use tcol_core::{Command, Expr, FieldOpKind, Value, ValueKind};

use crate::error::EngineError;
use crate::logging::Logger;
use crate::permission::PermissionChecker;
use crate::registry::{Registry, INTERNAL_SERVICE};

/// Per-request execution state, copied (with an incremented depth and a
/// parent pointer) for each chained command.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub chain_depth: u32,
    pub parent_request: Option<Uuid>,
}

impl ExecutionContext {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id,
            timestamp: Utc::now(),
            chain_depth: 0,
            parent_request: None,
        }
    }

    /// Context for a chained command: fresh request id, incremented
    /// depth, parent pointer set.
    pub fn child(&self) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: self.user_id.clone(),
            timestamp: Utc::now(),
            chain_depth: self.chain_depth + 1,
            parent_request: Some(self.request_id),
        }
    }
}

/// Routes parsed commands to their backing services.
pub struct TcolExecutor {
    registry: Arc<Registry>,
    client: Arc<ServiceClient>,
    permissions: Option<Arc<dyn PermissionChecker>>,
    audit: Option<Logger>,
    max_chain_depth: u32,
}

impl TcolExecutor {
    pub fn new(registry: Arc<Registry>, client: Arc<ServiceClient>) -> Self {
        Self {
            registry,
            client,
            permissions: None,
            audit: None,
            max_chain_depth: 8,
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_audit_logger(mut self, logger: Logger) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn with_max_chain_depth(mut self, max_chain_depth: u32) -> Self {
        self.max_chain_depth = max_chain_depth;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Execute a command and its chain.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        command: &Command,
        ctx: &ExecutionContext,
    ) -> Result<ServiceResponse, EngineError> {
        self.execute_chained(cancel, command, ctx.clone()).await
    }

    fn execute_chained<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        command: &'a Command,
        ctx: ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ServiceResponse, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            if ctx.chain_depth > self.max_chain_depth {
                return Err(EngineError::ChainDepthExceeded {
                    depth: ctx.chain_depth,
                    max: self.max_chain_depth,
                });
            }

            self.audit_record(&ctx, command, "STARTED", None);
            let result = self.dispatch(cancel, command, &ctx).await;
            match &result {
                Ok(_) => self.audit_record(&ctx, command, "COMPLETED", None),
                Err(err) => self.audit_record(&ctx, command, "FAILED", Some(err)),
            }
            let mut response = result?;

            if let Some(next) = command.next.as_deref() {
                match self.execute_chained(cancel, next, ctx.child()).await {
                    Ok(child) => {
                        response
                            .metadata
                            .insert("chain_result".to_string(), child.data.to_string());
                    }
                    Err(err) => {
                        // A failed chain annotates the parent, it does
                        // not fail it.
                        debug!(error = %err, "chained command failed");
                        response
                            .metadata
                            .insert("chain_error".to_string(), err.to_string());
                    }
                }
            }
            Ok(response)
        })
    }

    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        command: &Command,
        ctx: &ExecutionContext,
    ) -> Result<ServiceResponse, EngineError> {
        let (object, method) = self
            .registry
            .validate_command(&command.object, command.method.as_deref())?;

        // METHOD_CALL and BUILTIN paths.
        if let Some(method) = method {
            if object == "ALIAS" || object == "HELP" {
                return self.execute_builtin(&object, &method, command);
            }
            self.check_permission(ctx, &object, &method).await?;

            let mut params = serde_json::Map::new();
            for (name, value) in &command.params {
                params.insert(name.clone(), value.to_json());
            }
            if let Some(filter) = &command.filter {
                params.insert("_filter".to_string(), serialize_filter(filter));
            }

            let service = self.registry.get_service_for_object(&object)?;
            return Ok(self
                .client
                .execute(cancel, &service, &object, &method, params)
                .await?);
        }

        // OBJECT_ACCESS and FIELD_OPERATION paths need a direct id.
        let Some(id) = &command.object_id else {
            return Err(EngineError::Validation(format!(
                "command '{}' has neither a method nor an object id",
                command.object
            )));
        };
        let service = self.registry.get_service_for_object(&object)?;

        match &command.field_op {
            None => {
                self.check_permission(ctx, &object, "READ").await?;
                let mut params = serde_json::Map::new();
                params.insert("id".to_string(), json!(id));
                Ok(self
                    .client
                    .execute(cancel, &service, &object, "GET", params)
                    .await?)
            }
            Some(field_op) => {
                let (action, backend_method) = match field_op.op {
                    FieldOpKind::Set => ("UPDATE", "SET_FIELD"),
                    FieldOpKind::Get => ("READ", "GET_FIELD"),
                };
                self.check_permission(ctx, &object, action).await?;

                let mut params = serde_json::Map::new();
                params.insert("id".to_string(), json!(id));
                params.insert("field".to_string(), json!(field_op.field.to_uppercase()));
                params.insert("op".to_string(), json!(field_op.op.as_str()));
                if let Some(value) = &field_op.value {
                    params.insert("value".to_string(), value.to_json());
                }
                Ok(self
                    .client
                    .execute(cancel, &service, &object, backend_method, params)
                    .await?)
            }
        }
    }

    async fn check_permission(
        &self,
        ctx: &ExecutionContext,
        object: &str,
        action: &str,
    ) -> Result<(), EngineError> {
        let Some(checker) = &self.permissions else {
            return Ok(());
        };
        let user = ctx.user_id.as_deref().unwrap_or("anonymous");
        if checker.allow(user, object, action).await {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied {
                user: user.to_string(),
                object: object.to_string(),
                action: action.to_string(),
            })
        }
    }

    // ── Builtins ───────────────────────────────────────────────────────

    fn execute_builtin(
        &self,
        object: &str,
        method: &str,
        command: &Command,
    ) -> Result<ServiceResponse, EngineError> {
        let started = Instant::now();
        let data = match (object, method) {
            ("ALIAS", "CREATE") => {
                let name = required_param(command, "name")?;
                let target = required_param(command, "command")?;
                self.registry.register_alias(&name, &target)?;
                json!({"alias": name.to_uppercase(), "command": target, "created": true})
            }
            ("ALIAS", "DELETE") => {
                let name = required_param(command, "name")?;
                let deleted = self.registry.remove_alias(&name);
                json!({"alias": name.to_uppercase(), "deleted": deleted})
            }
            ("ALIAS", "LIST") => {
                let aliases: Vec<serde_json::Value> = self
                    .registry
                    .get_aliases()
                    .into_iter()
                    .map(|(name, target)| json!({"alias": name, "command": target}))
                    .collect();
                json!(aliases)
            }
            ("HELP", "LIST") => json!(self.registry.get_object_names()),
            ("HELP", "OBJECT") => {
                let name = required_param(command, "name")?;
                let expanded = self.registry.expand_abbreviation(&name);
                let definition =
                    self.registry
                        .get_object(&expanded)
                        .ok_or_else(|| EngineError::UnknownObject {
                            name: expanded.to_uppercase(),
                            suggestion: None,
                        })?;
                let mut methods: Vec<&String> = definition.methods.keys().collect();
                methods.sort();
                let mut fields: Vec<&String> = definition.fields.keys().collect();
                fields.sort();
                json!({
                    "object": definition.name,
                    "description": definition.description,
                    "service": definition.service,
                    "methods": methods,
                    "fields": fields,
                })
            }
            ("HELP", "METHOD") => {
                let object_name = required_param(command, "object")?;
                let method_name = required_param(command, "method")?;
                let (object_name, method_name) = self
                    .registry
                    .validate_command(&object_name, Some(&method_name))?;
                let method_name = method_name.expect("validated with a method");
                let definition = self
                    .registry
                    .get_method(&object_name, &method_name)
                    .expect("validated method exists");
                json!({
                    "object": object_name,
                    "method": definition.name,
                    "description": definition.description,
                })
            }
            _ => {
                return Err(EngineError::Validation(format!(
                    "unsupported builtin {object}.{method}"
                )))
            }
        };
        Ok(ServiceResponse {
            service: INTERNAL_SERVICE.to_string(),
            data,
            metadata: HashMap::new(),
            duration: started.elapsed(),
        })
    }

    fn audit_record(
        &self,
        ctx: &ExecutionContext,
        command: &Command,
        status: &str,
        error: Option<&EngineError>,
    ) {
        let Some(logger) = &self.audit else {
            return;
        };
        let mut logger = logger
            .with_request_id(ctx.request_id.to_string())
            .with_field("object", json!(command.object))
            .with_field("status", json!(status))
            .with_field("chain_depth", json!(ctx.chain_depth));
        if let Some(method) = &command.method {
            logger = logger.with_field("method", json!(method));
        }
        if let Some(user) = &ctx.user_id {
            logger = logger.with_user_id(user.clone());
        }
        if let Some(parent) = &ctx.parent_request {
            logger = logger.with_field("parent_request", json!(parent.to_string()));
        }
        if let Some(error) = error {
            logger = logger.with_field("error", json!(error.to_string()));
        }
        logger.audit(&format!("command {status}"));
    }
}

/// Pull a scalar parameter as text.
fn required_param(command: &Command, name: &str) -> Result<String, EngineError> {
    let value = command.params.get(name).ok_or_else(|| {
        EngineError::Validation(format!(
            "{}.{} requires parameter '{name}'",
            command.object,
            command.method.as_deref().unwrap_or("?")
        ))
    })?;
    Ok(value_as_text(value))
}

fn value_as_text(value: &Value) -> String {
    match &value.kind {
        ValueKind::String(s) => s.clone(),
        ValueKind::Number(n) => {
            if value.raw.is_empty() {
                n.to_string()
            } else {
                value.raw.clone()
            }
        }
        ValueKind::Boolean(b) => b.to_string(),
        _ => value.to_json().to_string(),
    }
}

/// Serialize a filter expression into the nested tagged tree carried in
/// the `_filter` parameter. Operator strings are preserved.
pub fn serialize_filter(expr: &Expr) -> serde_json::Value {
    match expr {
        Expr::Binary {
            left, op, right, ..
        } => json!({
            "node": "binary",
            "op": op.as_str(),
            "left": serialize_filter(left),
            "right": serialize_filter(right),
        }),
        Expr::Unary { op, expr, .. } => json!({
            "node": "unary",
            "op": op.as_str(),
            "expr": serialize_filter(expr),
        }),
        Expr::Identifier { name, .. } => json!({
            "node": "identifier",
            "name": name,
        }),
        Expr::Literal { value, .. } => json!({
            "node": "literal",
            "value": value.to_json(),
        }),
        Expr::FunctionCall { name, args, .. } => json!({
            "node": "call",
            "name": name,
            "args": args.iter().map(serialize_filter).collect::<Vec<_>>(),
        }),
        Expr::Array { elems, .. } => json!({
            "node": "array",
            "elems": elems.iter().map(serialize_filter).collect::<Vec<_>>(),
        }),
        Expr::Object { fields, .. } => json!({
            "node": "object",
            "fields": fields
                .iter()
                .map(|(k, v)| (k.clone(), serialize_filter(v)))
                .collect::<serde_json::Map<_, _>>(),
        }),
    }
}
