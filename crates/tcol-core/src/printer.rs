//! Pretty-printer visitor.
//!
//! Produces a stable textual rendering of the AST: reparsing the output
//! yields a semantically identical tree. Parentheses are inserted only
//! where the grammar requires them.

use std::collections::BTreeMap;

use crate::ast::{BinaryOp, Command, Expr, FieldOpKind, UnaryOp, Value, ValueKind};
use crate::token::Position;
use crate::visitor::{dispatch_expr, AstVisitor};

/// Grammar level of an expression, used for parenthesization.
/// Higher binds tighter: Or < And < Not < comparison < primary.
fn expr_level(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary {
            op: BinaryOp::Or, ..
        } => 1,
        Expr::Binary {
            op: BinaryOp::And, ..
        } => 2,
        Expr::Unary { .. } => 3,
        Expr::Binary { .. } => 4,
        _ => 5,
    }
}

/// Stable AST renderer.
#[derive(Default)]
pub struct PrettyPrinter {
    out: String,
}

impl PrettyPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a command chain to TCOL source.
    pub fn print(command: &Command) -> String {
        let mut printer = Self::new();
        printer.visit_command(command);
        printer.out
    }

    /// Render a single expression to TCOL source.
    pub fn print_expr(expr: &Expr) -> String {
        let mut printer = Self::new();
        dispatch_expr(&mut printer, expr);
        printer.out
    }

    /// Render a value to TCOL source.
    pub fn print_value(value: &Value) -> String {
        let mut printer = Self::new();
        printer.write_value(value);
        printer.out
    }

    fn write_child(&mut self, child: &Expr, min_level: u8) {
        if expr_level(child) < min_level {
            self.out.push('(');
            dispatch_expr(self, child);
            self.out.push(')');
        } else {
            dispatch_expr(self, child);
        }
    }

    fn write_value(&mut self, value: &Value) {
        match &value.kind {
            ValueKind::String(s) => self.write_quoted(s),
            ValueKind::Number(n) => {
                // Prefer the source spelling when it still denotes the value.
                if !value.raw.is_empty() && value.raw.parse::<f64>() == Ok(*n) {
                    self.out.push_str(&value.raw);
                } else {
                    self.out.push_str(&n.to_string());
                }
            }
            ValueKind::Boolean(b) => {
                if !value.raw.is_empty() {
                    self.out.push_str(&value.raw);
                } else {
                    self.out.push_str(if *b { "true" } else { "false" });
                }
            }
            ValueKind::Date(ts) => {
                self.out.push('"');
                self.out.push_str(&ts.to_rfc3339());
                self.out.push('"');
            }
            ValueKind::Null => {
                self.out
                    .push_str(if value.raw.is_empty() { "null" } else { &value.raw });
            }
            ValueKind::Array(elems) => {
                self.out.push('[');
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.write_value(elem);
                }
                self.out.push(']');
            }
            ValueKind::Object(fields) => {
                self.out.push('{');
                for (i, (key, val)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.out.push_str(key);
                    self.out.push_str(": ");
                    self.write_value(val);
                }
                self.out.push('}');
            }
        }
    }

    fn write_quoted(&mut self, s: &str) {
        // Strings keep their escape sequences literally; a bare double
        // quote forces single-quote delimiters.
        let has_bare_double = {
            let mut prev_backslash = false;
            let mut found = false;
            for c in s.chars() {
                if c == '"' && !prev_backslash {
                    found = true;
                    break;
                }
                prev_backslash = c == '\\' && !prev_backslash;
            }
            found
        };
        let quote = if has_bare_double { '\'' } else { '"' };
        self.out.push(quote);
        self.out.push_str(s);
        self.out.push(quote);
    }
}

impl AstVisitor for PrettyPrinter {
    fn visit_command(&mut self, command: &Command) {
        self.out.push_str(&command.object);
        if let Some(filter) = &command.filter {
            self.out.push('[');
            dispatch_expr(self, filter);
            self.out.push(']');
        }
        if let Some(method) = &command.method {
            self.out.push('.');
            self.out.push_str(method);
            for (name, value) in &command.params {
                self.out.push(' ');
                self.out.push_str(name);
                self.out.push('=');
                self.write_value(value);
            }
        } else if let Some(id) = &command.object_id {
            self.out.push(':');
            self.out.push_str(id);
            if let Some(field_op) = &command.field_op {
                self.out.push(':');
                self.out.push_str(&field_op.field);
                if field_op.op == FieldOpKind::Set {
                    self.out.push('=');
                    if let Some(value) = &field_op.value {
                        self.write_value(value);
                    }
                }
            }
        }
        if let Some(next) = command.next.as_deref() {
            self.out.push_str(" | ");
            self.visit_command(next);
        }
    }

    fn visit_binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr, _position: Position) {
        // Left slot of an associative chain admits its own level; the
        // right slot and comparison operands require tighter binding.
        let (left_min, right_min) = match op {
            BinaryOp::Or => (1, 2),
            BinaryOp::And => (2, 3),
            _ => (5, 5),
        };
        self.write_child(left, left_min);
        self.out.push(' ');
        self.out.push_str(op.as_str());
        self.out.push(' ');
        self.write_child(right, right_min);
    }

    fn visit_unary(&mut self, op: UnaryOp, expr: &Expr, _position: Position) {
        self.out.push_str(op.as_str());
        self.out.push(' ');
        self.write_child(expr, 3);
    }

    fn visit_identifier(&mut self, name: &str, _position: Position) {
        self.out.push_str(name);
    }

    fn visit_literal(&mut self, value: &Value, _position: Position) {
        self.write_value(value);
    }

    fn visit_function_call(&mut self, name: &str, args: &[Expr], _position: Position) {
        self.out.push_str(name);
        self.out.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            dispatch_expr(self, arg);
        }
        self.out.push(')');
    }

    fn visit_array(&mut self, elems: &[Expr], _position: Position) {
        self.out.push('[');
        for (i, elem) in elems.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            dispatch_expr(self, elem);
        }
        self.out.push(']');
    }

    fn visit_object(&mut self, fields: &BTreeMap<String, Expr>, _position: Position) {
        self.out.push('{');
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(key);
            self.out.push_str(": ");
            dispatch_expr(self, value);
        }
        self.out.push('}');
    }
}

impl Command {
    /// Render this command chain back to TCOL source.
    pub fn to_tcol_string(&self) -> String {
        PrettyPrinter::print(self)
    }
}
