//! TCOL (Terminal Command Object Language) front-end.
//!
//! The crate covers the full source-to-tree path for TCOL command
//! strings:
//!
//! - [`lexer`]: deterministic scanner with position tracking
//! - [`parser`]: recursive-descent parser producing the [`ast`] types
//! - [`visitor`]: polymorphic tree-walk contract
//! - [`printer`], [`validator`], [`collector`]: the concrete visitors
//! - [`diagnostics`]: positioned validation diagnostics
//!
//! ```
//! use tcol_core::parse;
//!
//! let command = parse(r#"CUSTOMER[status = "unpaid"].LIST limit=10"#).unwrap();
//! assert_eq!(command.object, "CUSTOMER");
//! assert_eq!(command.method.as_deref(), Some("LIST"));
//! ```

pub mod ast;
pub mod collector;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod token;
pub mod validator;
pub mod visitor;

pub use ast::{BinaryOp, Command, Expr, FieldOp, FieldOpKind, UnaryOp, Value, ValueKind};
pub use collector::NodeCollector;
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use lexer::{tokenize, LexError, Lexer};
pub use parser::{parse, ParseError};
pub use printer::PrettyPrinter;
pub use token::{Position, Token, TokenKind};
pub use validator::AstValidator;
pub use visitor::{dispatch_expr, walk_command, AstVisitor};
