//! Node collector visitor.
//!
//! Gathers commands, identifiers, literals and function calls in
//! traversal order, for instrumentation and test assertions.

use crate::ast::{Command, Expr, Value};
use crate::token::Position;
use crate::visitor::{walk_command, AstVisitor};

/// Collects AST nodes in traversal order.
#[derive(Default)]
pub struct NodeCollector {
    pub commands: Vec<Command>,
    pub identifiers: Vec<String>,
    pub literals: Vec<Value>,
    pub function_calls: Vec<String>,
}

impl NodeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every node of interest from a command chain.
    pub fn collect(command: &Command) -> Self {
        let mut collector = Self::new();
        collector.visit_command(command);
        collector
    }
}

impl AstVisitor for NodeCollector {
    fn visit_command(&mut self, command: &Command) {
        // A shallow copy without the chain link keeps entries independent.
        let mut snapshot = command.clone();
        snapshot.next = None;
        self.commands.push(snapshot);
        walk_command(self, command);
    }

    fn visit_identifier(&mut self, name: &str, _position: Position) {
        self.identifiers.push(name.to_string());
    }

    fn visit_literal(&mut self, value: &Value, _position: Position) {
        self.literals.push(value.clone());
    }

    fn visit_function_call(&mut self, name: &str, args: &[Expr], _position: Position) {
        self.function_calls.push(name.to_string());
        for arg in args {
            crate::visitor::dispatch_expr(self, arg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ValueKind;
    use crate::parser::parse;

    #[test]
    fn collects_in_traversal_order() {
        let cmd = parse(
            r#"ORDER[status = "open" AND total > limit_for("gold")].LIST max=25 | EXPORT.CSV"#,
        )
        .unwrap();
        let collected = NodeCollector::collect(&cmd);

        assert_eq!(collected.commands.len(), 2);
        assert_eq!(collected.commands[0].object, "ORDER");
        assert_eq!(collected.commands[1].object, "EXPORT");

        // Filter identifiers before the parameter literal.
        assert_eq!(collected.identifiers, vec!["status", "total"]);
        assert_eq!(collected.function_calls, vec!["limit_for"]);

        let literal_kinds: Vec<_> = collected.literals.iter().map(|v| &v.kind).collect();
        assert!(matches!(literal_kinds[0], ValueKind::String(s) if s == "open"));
        // "gold" (function argument) precedes the max=25 parameter.
        assert!(matches!(literal_kinds[1], ValueKind::String(s) if s == "gold"));
        assert!(matches!(literal_kinds[2], ValueKind::Number(n) if *n == 25.0));
    }

    #[test]
    fn collected_commands_do_not_alias_the_chain() {
        let cmd = parse("A.RUN | B.RUN").unwrap();
        let collected = NodeCollector::collect(&cmd);
        assert!(collected.commands.iter().all(|c| c.next.is_none()));
    }
}
