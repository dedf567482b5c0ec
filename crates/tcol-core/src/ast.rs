//! TCOL abstract syntax tree.
//!
//! The tree is built from tagged variants: a [`Command`] is the operation
//! node, filters are [`Expr`] trees, and parameter/filter leaves are typed
//! [`Value`]s that keep their raw source text for diagnostics. Every node
//! carries the [`Position`] of the token that introduced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::token::Position;

/// A typed literal value with its raw source text preserved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub kind: ValueKind,
    /// Original source spelling; empty for programmatically built values.
    pub raw: String,
}

/// The tagged payload of a [`Value`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ValueKind {
    String(String),
    Number(f64),
    Boolean(bool),
    /// Built by tooling only; the grammar has no date literal.
    Date(DateTime<Utc>),
    Null,
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        let s = s.into();
        Self {
            raw: s.clone(),
            kind: ValueKind::String(s),
        }
    }

    pub fn number(n: f64) -> Self {
        Self {
            raw: n.to_string(),
            kind: ValueKind::Number(n),
        }
    }

    pub fn boolean(b: bool) -> Self {
        Self {
            raw: b.to_string(),
            kind: ValueKind::Boolean(b),
        }
    }

    pub fn date(ts: DateTime<Utc>) -> Self {
        Self {
            raw: ts.to_rfc3339(),
            kind: ValueKind::Date(ts),
        }
    }

    pub fn null() -> Self {
        Self {
            raw: "null".to_string(),
            kind: ValueKind::Null,
        }
    }

    pub fn array(elems: Vec<Value>) -> Self {
        Self {
            raw: String::new(),
            kind: ValueKind::Array(elems),
        }
    }

    pub fn object(fields: BTreeMap<String, Value>) -> Self {
        Self {
            raw: String::new(),
            kind: ValueKind::Object(fields),
        }
    }

    /// Convert to a JSON value for backend parameter serialization.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.kind {
            ValueKind::String(s) => serde_json::Value::String(s.clone()),
            ValueKind::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::Date(ts) => serde_json::Value::String(ts.to_rfc3339()),
            ValueKind::Null => serde_json::Value::Null,
            ValueKind::Array(elems) => {
                serde_json::Value::Array(elems.iter().map(Value::to_json).collect())
            }
            ValueKind::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Binary operators, in source spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::In => "IN",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "NOT",
        }
    }
}

/// Filter/parameter expression tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum Expr {
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
        position: Position,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        position: Position,
    },
    Identifier {
        name: String,
        position: Position,
    },
    Literal {
        value: Value,
        position: Position,
    },
    FunctionCall {
        name: String,
        args: Vec<Expr>,
        position: Position,
    },
    Array {
        elems: Vec<Expr>,
        position: Position,
    },
    Object {
        fields: BTreeMap<String, Expr>,
        position: Position,
    },
}

impl Expr {
    pub fn position(&self) -> Position {
        match self {
            Expr::Binary { position, .. }
            | Expr::Unary { position, .. }
            | Expr::Identifier { position, .. }
            | Expr::Literal { position, .. }
            | Expr::FunctionCall { position, .. }
            | Expr::Array { position, .. }
            | Expr::Object { position, .. } => *position,
        }
    }
}

/// How a field operation accesses its field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOpKind {
    /// Read: `OBJECT:id:FIELD`.
    Get,
    /// Write: `OBJECT:id:FIELD=value`.
    Set,
}

impl FieldOpKind {
    /// Operator string carried through serialization.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldOpKind::Get => "",
            FieldOpKind::Set => "=",
        }
    }
}

/// A field operation on a directly addressed object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldOp {
    pub field: String,
    pub op: FieldOpKind,
    /// Present when `op` is `Set`.
    pub value: Option<Value>,
    pub position: Position,
}

/// A parsed TCOL command, possibly the head of a chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Object name, case preserved; registry lookup is case-insensitive.
    pub object: String,
    pub method: Option<String>,
    /// Direct object access id (`OBJECT:id`).
    pub object_id: Option<String>,
    pub field_op: Option<FieldOp>,
    pub filter: Option<Expr>,
    pub params: BTreeMap<String, Value>,
    /// Next command in a `|` chain.
    pub next: Option<Box<Command>>,
    pub position: Position,
}

impl Command {
    pub fn new(object: impl Into<String>, position: Position) -> Self {
        Self {
            object: object.into(),
            method: None,
            object_id: None,
            field_op: None,
            filter: None,
            params: BTreeMap::new(),
            next: None,
            position,
        }
    }

    /// Length of the chain starting at this command (at least 1).
    pub fn chain_len(&self) -> usize {
        let mut len = 1;
        let mut cur = self;
        while let Some(next) = cur.next.as_deref() {
            len += 1;
            cur = next;
        }
        len
    }
}
