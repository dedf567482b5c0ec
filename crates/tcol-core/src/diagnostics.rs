//! Validation diagnostics.
//!
//! Single diagnostic type shared by the AST validator and the tooling that
//! consumes it. Diagnostics carry an optional source position taken from
//! the offending node.

use serde::{Deserialize, Serialize};

use crate::token::Position;

/// Diagnostic severity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Hint,
}

/// Diagnostic codes for categorizing issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    EmptyObjectName,
    MissingTerminal,
    EmptyMethodName,
    EmptyObjectId,
    EmptyFieldName,
    EmptyIdentifier,
    EmptyFunctionName,
    MissingFieldValue,
    ValueMismatch,
}

/// A diagnostic message with optional location.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub position: Option<Position>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            position: None,
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builders() {
        let diag = Diagnostic::error(DiagnosticCode::EmptyObjectName, "object name is empty")
            .at(Position::new(3, 1, 4));
        assert!(diag.is_error());
        assert_eq!(diag.position.unwrap().column, 4);

        let warn = Diagnostic::warning(DiagnosticCode::ValueMismatch, "raw text mismatch");
        assert!(!warn.is_error());
    }
}
