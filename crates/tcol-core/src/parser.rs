//! Recursive-descent parser for TCOL.
//!
//! Grammar (EBNF):
//!
//! ```text
//! command     = object_ref (method_part | field_part)? ("|" command)?
//! object_ref  = IDENT (filter)?
//! filter      = "[" expr "]"
//! method_part = "." IDENT (param)*
//! field_part  = ":" (IDENT|NUMBER) (":" IDENT ("=" value)?)?
//! param       = IDENT "=" value
//! value       = literal | identifier | array | object
//! expr        = or_expr
//! or_expr     = and_expr ("OR" and_expr)*
//! and_expr    = not_expr ("AND" not_expr)*
//! not_expr    = "NOT"? cmp_expr
//! cmp_expr    = primary (("="|"=="|"!="|"<"|"<="|">"|">="|"LIKE"|"IN") primary)?
//! primary     = literal | IDENT | func_call | array | object | "(" expr ")"
//! func_call   = IDENT "(" (expr ("," expr)*)? ")"
//! ```
//!
//! Precedence: NOT binds tighter than comparisons, which bind tighter than
//! AND, which binds tighter than OR. Every error carries the position of
//! the offending token.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ast::{BinaryOp, Command, Expr, FieldOp, FieldOpKind, UnaryOp, Value, ValueKind};
use crate::lexer::{tokenize, LexError};
use crate::token::{Position, Token, TokenKind};

/// Parse failure with source position.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("expected {expected}, found {found} at {position}")]
    Unexpected {
        expected: String,
        found: String,
        position: Position,
    },

    #[error("{message} at {position}")]
    Invalid { message: String, position: Position },
}

impl ParseError {
    /// Position of the offending input, when known.
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lex(e) => Position::new(e.offset, e.line, e.column),
            ParseError::Unexpected { position, .. } | ParseError::Invalid { position, .. } => {
                *position
            }
        }
    }
}

/// Parse a complete TCOL command string (one command, possibly chained).
pub fn parse(source: &str) -> Result<Command, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let command = parser.parse_command()?;
    // A single trailing statement terminator is permitted.
    if parser.peek_kind() == TokenKind::Semicolon {
        parser.advance();
    }
    parser.expect_eof()?;
    Ok(command)
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, idx: 0 }
    }

    fn peek(&self) -> &Token {
        // `tokenize` always terminates the stream with Eof.
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_next_kind(&self) -> TokenKind {
        self.tokens
            .get(self.idx + 1)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.peek_kind() == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = self.peek();
        let found_text = match found.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", found.text),
        };
        ParseError::Unexpected {
            expected: expected.to_string(),
            found: found_text,
            position: found.position,
        }
    }

    // ── Commands ───────────────────────────────────────────────────────

    fn parse_command(&mut self) -> Result<Command, ParseError> {
        let object_token = self.expect(TokenKind::Ident)?;
        let mut command = Command::new(object_token.text, object_token.position);

        if self.peek_kind() == TokenKind::LBracket {
            self.advance();
            command.filter = Some(self.parse_expr()?);
            self.expect(TokenKind::RBracket)?;
        }

        match self.peek_kind() {
            TokenKind::Dot => {
                self.advance();
                let method = self.expect(TokenKind::Ident)?;
                command.method = Some(method.text);
                while self.peek_kind() == TokenKind::Ident {
                    let (name, value) = self.parse_param()?;
                    command.params.insert(name, value);
                }
            }
            TokenKind::Colon => {
                self.advance();
                let id = match self.peek_kind() {
                    TokenKind::Ident | TokenKind::Number => self.advance(),
                    _ => return Err(self.unexpected("object id")),
                };
                command.object_id = Some(id.text);
                if self.peek_kind() == TokenKind::Colon {
                    self.advance();
                    let field = self.expect(TokenKind::Ident)?;
                    let field_position = field.position;
                    if self.peek_kind() == TokenKind::Assign {
                        self.advance();
                        let value = self.parse_value()?;
                        command.field_op = Some(FieldOp {
                            field: field.text,
                            op: FieldOpKind::Set,
                            value: Some(value),
                            position: field_position,
                        });
                    } else {
                        command.field_op = Some(FieldOp {
                            field: field.text,
                            op: FieldOpKind::Get,
                            value: None,
                            position: field_position,
                        });
                    }
                }
            }
            _ => {}
        }

        if self.peek_kind() == TokenKind::Pipe {
            self.advance();
            command.next = Some(Box::new(self.parse_command()?));
        }

        Ok(command)
    }

    fn parse_param(&mut self) -> Result<(String, Value), ParseError> {
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_value()?;
        Ok((name.text, value))
    }

    // ── Values ─────────────────────────────────────────────────────────

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        match self.peek_kind() {
            TokenKind::Str => {
                let token = self.advance();
                Ok(Value {
                    kind: ValueKind::String(token.text.clone()),
                    raw: token.text,
                })
            }
            TokenKind::Number => {
                let token = self.advance();
                let number = token.text.parse::<f64>().map_err(|_| ParseError::Invalid {
                    message: format!("invalid number '{}'", token.text),
                    position: token.position,
                })?;
                Ok(Value {
                    kind: ValueKind::Number(number),
                    raw: token.text,
                })
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                Ok(Value {
                    kind: ValueKind::Boolean(token.kind == TokenKind::True),
                    raw: token.text,
                })
            }
            TokenKind::Null => {
                let token = self.advance();
                Ok(Value {
                    kind: ValueKind::Null,
                    raw: token.text,
                })
            }
            TokenKind::Ident => {
                // Bare identifiers are string values (`status=unpaid`).
                let token = self.advance();
                Ok(Value {
                    kind: ValueKind::String(token.text.clone()),
                    raw: token.text,
                })
            }
            TokenKind::LBracket => self.parse_value_array(),
            TokenKind::LBrace => self.parse_value_object(),
            _ => Err(self.unexpected("value")),
        }
    }

    fn parse_value_array(&mut self) -> Result<Value, ParseError> {
        self.expect(TokenKind::LBracket)?;
        let mut elems = Vec::new();
        if self.peek_kind() != TokenKind::RBracket {
            loop {
                elems.push(self.parse_value()?);
                if self.peek_kind() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Value::array(elems))
    }

    fn parse_value_object(&mut self) -> Result<Value, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = BTreeMap::new();
        if self.peek_kind() != TokenKind::RBrace {
            loop {
                let key = self.expect(TokenKind::Ident)?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_value()?;
                fields.insert(key.text, value);
                if self.peek_kind() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Value::object(fields))
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek_kind() == TokenKind::Or {
            let op_token = self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
                position: op_token.position,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.peek_kind() == TokenKind::And {
            let op_token = self.advance();
            let right = self.parse_not()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
                position: op_token.position,
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.peek_kind() == TokenKind::Not {
            let op_token = self.advance();
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
                position: op_token.position,
            });
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_primary()?;
        let op = match self.peek_kind() {
            TokenKind::Assign | TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::Like => BinaryOp::Like,
            TokenKind::In => BinaryOp::In,
            _ => return Ok(left),
        };
        let op_token = self.advance();
        let right = self.parse_primary()?;
        Ok(Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
            position: op_token.position,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Str
            | TokenKind::Number
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null => {
                let position = self.peek().position;
                let value = self.parse_value()?;
                Ok(Expr::Literal { value, position })
            }
            TokenKind::Ident => {
                if self.peek_next_kind() == TokenKind::LParen {
                    return self.parse_func_call();
                }
                let token = self.advance();
                Ok(Expr::Identifier {
                    name: token.text,
                    position: token.position,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let position = self.peek().position;
                self.advance();
                let mut elems = Vec::new();
                if self.peek_kind() != TokenKind::RBracket {
                    loop {
                        elems.push(self.parse_expr()?);
                        if self.peek_kind() == TokenKind::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Array { elems, position })
            }
            TokenKind::LBrace => {
                let position = self.peek().position;
                self.advance();
                let mut fields = BTreeMap::new();
                if self.peek_kind() != TokenKind::RBrace {
                    loop {
                        let key = self.expect(TokenKind::Ident)?;
                        self.expect(TokenKind::Colon)?;
                        let value = self.parse_expr()?;
                        fields.insert(key.text, value);
                        if self.peek_kind() == TokenKind::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::Object { fields, position })
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_func_call(&mut self) -> Result<Expr, ParseError> {
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            loop {
                args.push(self.parse_expr()?);
                if self.peek_kind() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::FunctionCall {
            name: name.text,
            args,
            position: name.position,
        })
    }
}
