//! Polymorphic AST traversal.
//!
//! [`AstVisitor`] has one method per node kind; default implementations
//! walk children in source order, so a visitor only overrides the kinds it
//! cares about. Dispatch on the expression tag happens in
//! [`dispatch_expr`]; overriding methods that need their children walked
//! call back into the `walk_*` helpers.

use std::collections::BTreeMap;

use crate::ast::{BinaryOp, Command, Expr, UnaryOp, Value};
use crate::token::Position;

pub trait AstVisitor {
    fn visit_command(&mut self, command: &Command) {
        walk_command(self, command);
    }

    fn visit_binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr, position: Position) {
        let _ = (op, position);
        dispatch_expr(self, left);
        dispatch_expr(self, right);
    }

    fn visit_unary(&mut self, op: UnaryOp, expr: &Expr, position: Position) {
        let _ = (op, position);
        dispatch_expr(self, expr);
    }

    fn visit_identifier(&mut self, name: &str, position: Position) {
        let _ = (name, position);
    }

    fn visit_literal(&mut self, value: &Value, position: Position) {
        let _ = (value, position);
    }

    fn visit_function_call(&mut self, name: &str, args: &[Expr], position: Position) {
        let _ = (name, position);
        for arg in args {
            dispatch_expr(self, arg);
        }
    }

    fn visit_array(&mut self, elems: &[Expr], position: Position) {
        let _ = position;
        for elem in elems {
            dispatch_expr(self, elem);
        }
    }

    fn visit_object(&mut self, fields: &BTreeMap<String, Expr>, position: Position) {
        let _ = position;
        for value in fields.values() {
            dispatch_expr(self, value);
        }
    }
}

/// Dispatch an expression node to the matching visitor method.
pub fn dispatch_expr<V: AstVisitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::Binary {
            left,
            op,
            right,
            position,
        } => visitor.visit_binary(left, *op, right, *position),
        Expr::Unary { op, expr, position } => visitor.visit_unary(*op, expr, *position),
        Expr::Identifier { name, position } => visitor.visit_identifier(name, *position),
        Expr::Literal { value, position } => visitor.visit_literal(value, *position),
        Expr::FunctionCall {
            name,
            args,
            position,
        } => visitor.visit_function_call(name, args, *position),
        Expr::Array { elems, position } => visitor.visit_array(elems, *position),
        Expr::Object { fields, position } => visitor.visit_object(fields, *position),
    }
}

/// Walk a command's children: filter, parameter values, field value, and
/// the chained command, in source order.
pub fn walk_command<V: AstVisitor + ?Sized>(visitor: &mut V, command: &Command) {
    if let Some(filter) = &command.filter {
        dispatch_expr(visitor, filter);
    }
    for value in command.params.values() {
        visitor.visit_literal(value, command.position);
    }
    if let Some(field_op) = &command.field_op {
        if let Some(value) = &field_op.value {
            visitor.visit_literal(value, field_op.position);
        }
    }
    if let Some(next) = command.next.as_deref() {
        visitor.visit_command(next);
    }
}
