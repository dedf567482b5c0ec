//! Token model for the TCOL scanner.
//!
//! Every token carries its source position (byte offset plus 1-based
//! line/column) so that parse errors and validator diagnostics can point
//! at the offending input.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a token or AST node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Byte offset into the source string.
    pub offset: usize,
    /// 1-based line number; increments on `\n`.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Position {
    pub fn new(offset: usize, line: u32, column: u32) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Position of the first character of a source string.
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {} (position {})",
            self.line, self.column, self.offset
        )
    }
}

/// Kinds of token the TCOL scanner produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Identifier: `[A-Za-z_][A-Za-z0-9_-]*`, Unicode letters accepted.
    Ident,
    /// Integer or fixed-point number with a single dot.
    Number,
    /// Single- or double-quoted string; escapes preserved literally.
    Str,

    // Keywords (matched case-insensitively).
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Like,
    In,

    // Punctuation.
    Dot,
    Colon,
    Comma,
    Pipe,
    Semicolon,
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,

    // Operators (two-character forms resolved with one char of lookahead).
    Assign, // =
    Eq,     // ==
    NotEq,  // !=
    Lt,     // <
    Le,     // <=
    Gt,     // >
    Ge,     // >=

    /// Unrecognized input.
    Illegal,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// True for tokens that can begin a literal value.
    pub fn starts_value(self) -> bool {
        matches!(
            self,
            TokenKind::Str
                | TokenKind::Number
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::Ident
                | TokenKind::LBracket
                | TokenKind::LBrace
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Number => "number",
            TokenKind::Str => "string",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::Like => "LIKE",
            TokenKind::In => "IN",
            TokenKind::Dot => ".",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Pipe => "|",
            TokenKind::Semicolon => ";",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Assign => "=",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Illegal => "illegal",
            TokenKind::Eof => "end of input",
        };
        f.write_str(s)
    }
}

/// A single scanned token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Token text with the original casing; string tokens exclude quotes.
    pub text: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }
}

/// Resolve a keyword token kind from identifier text, case-insensitively.
pub(crate) fn keyword_kind(text: &str) -> Option<TokenKind> {
    match text.to_ascii_uppercase().as_str() {
        "AND" => Some(TokenKind::And),
        "OR" => Some(TokenKind::Or),
        "NOT" => Some(TokenKind::Not),
        "LIKE" => Some(TokenKind::Like),
        "IN" => Some(TokenKind::In),
        "TRUE" => Some(TokenKind::True),
        "FALSE" => Some(TokenKind::False),
        "NULL" => Some(TokenKind::Null),
        _ => None,
    }
}
