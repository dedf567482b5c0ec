//! AST validator visitor.
//!
//! Collects structural violations as positioned diagnostics without
//! stopping at the first problem.

use crate::ast::{Command, Expr, Value, ValueKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::token::Position;
use crate::visitor::{walk_command, AstVisitor};

/// Structural validator for parsed (or programmatically built) commands.
#[derive(Default)]
pub struct AstValidator {
    diagnostics: Vec<Diagnostic>,
}

impl AstValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a command chain, returning all diagnostics found.
    pub fn validate(command: &Command) -> Vec<Diagnostic> {
        let mut validator = Self::new();
        validator.visit_command(command);
        validator.diagnostics
    }

    /// True when a command chain has no error-severity diagnostics.
    pub fn is_valid(command: &Command) -> bool {
        !Self::validate(command).iter().any(Diagnostic::is_error)
    }

    fn check_value(&mut self, value: &Value, position: Position) {
        // The tagged payload is authoritative; the raw spelling, when
        // present, must still denote the same value.
        match &value.kind {
            ValueKind::Number(n) => {
                if !value.raw.is_empty() && value.raw.parse::<f64>() != Ok(*n) {
                    self.diagnostics.push(
                        Diagnostic::error(
                            DiagnosticCode::ValueMismatch,
                            format!("number value {} does not match raw text '{}'", n, value.raw),
                        )
                        .at(position),
                    );
                }
            }
            ValueKind::Boolean(b) => {
                if !value.raw.is_empty() && value.raw.to_ascii_lowercase().parse::<bool>() != Ok(*b)
                {
                    self.diagnostics.push(
                        Diagnostic::error(
                            DiagnosticCode::ValueMismatch,
                            format!("boolean value {} does not match raw text '{}'", b, value.raw),
                        )
                        .at(position),
                    );
                }
            }
            ValueKind::Date(ts) => {
                if ts.timestamp() < 0 {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticCode::ValueMismatch,
                            format!("date value {} predates the epoch", ts.to_rfc3339()),
                        )
                        .at(position),
                    );
                }
            }
            ValueKind::Array(elems) => {
                for elem in elems {
                    self.check_value(elem, position);
                }
            }
            ValueKind::Object(fields) => {
                for value in fields.values() {
                    self.check_value(value, position);
                }
            }
            ValueKind::String(_) | ValueKind::Null => {}
        }
    }
}

impl AstVisitor for AstValidator {
    fn visit_command(&mut self, command: &Command) {
        if command.object.is_empty() {
            self.diagnostics.push(
                Diagnostic::error(DiagnosticCode::EmptyObjectName, "object name is empty")
                    .at(command.position),
            );
        }
        if command.method.is_none() && command.object_id.is_none() {
            self.diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::MissingTerminal,
                    format!(
                        "command '{}' has neither a method nor an object id",
                        command.object
                    ),
                )
                .at(command.position),
            );
        }
        if matches!(command.method.as_deref(), Some("")) {
            self.diagnostics.push(
                Diagnostic::error(DiagnosticCode::EmptyMethodName, "method name is empty")
                    .at(command.position),
            );
        }
        if matches!(command.object_id.as_deref(), Some("")) {
            self.diagnostics.push(
                Diagnostic::error(DiagnosticCode::EmptyObjectId, "object id is empty")
                    .at(command.position),
            );
        }
        if let Some(field_op) = &command.field_op {
            if field_op.field.is_empty() {
                self.diagnostics.push(
                    Diagnostic::error(DiagnosticCode::EmptyFieldName, "field name is empty")
                        .at(field_op.position),
                );
            }
            if field_op.op == crate::ast::FieldOpKind::Set && field_op.value.is_none() {
                self.diagnostics.push(
                    Diagnostic::error(
                        DiagnosticCode::MissingFieldValue,
                        format!("field assignment '{}' has no value", field_op.field),
                    )
                    .at(field_op.position),
                );
            }
        }
        walk_command(self, command);
    }

    fn visit_identifier(&mut self, name: &str, position: Position) {
        if name.is_empty() {
            self.diagnostics.push(
                Diagnostic::error(DiagnosticCode::EmptyIdentifier, "identifier is empty")
                    .at(position),
            );
        }
    }

    fn visit_literal(&mut self, value: &Value, position: Position) {
        self.check_value(value, position);
    }

    fn visit_function_call(&mut self, name: &str, args: &[Expr], position: Position) {
        if name.is_empty() {
            self.diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::EmptyFunctionName,
                    "function call has no name",
                )
                .at(position),
            );
        }
        for arg in args {
            crate::visitor::dispatch_expr(self, arg);
        }
    }
}
