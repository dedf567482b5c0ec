//! TCOL scanner.
//!
//! Deterministic single-pass scanner with one character of lookahead,
//! enough to resolve the two-character operators `==`, `!=`, `<=`, `>=`.
//! Positions are tracked per character: `line` increments on `\n`,
//! `column` is 1-based within the line.

use thiserror::Error;

use crate::token::{keyword_kind, Position, Token, TokenKind};

/// Scanner failure surfaced by [`tokenize`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("illegal character '{ch}' at line {line}, column {column} (position {offset})")]
pub struct LexError {
    pub ch: char,
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

/// Streaming scanner over a TCOL source string.
pub struct Lexer {
    chars: Vec<(usize, char)>,
    src_len: usize,
    idx: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.char_indices().collect(),
            src_len: source.len(),
            idx: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|&(_, c)| c)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.idx + 1).map(|&(_, c)| c)
    }

    fn current_position(&self) -> Position {
        let offset = self
            .chars
            .get(self.idx)
            .map(|&(o, _)| o)
            .unwrap_or(self.src_len);
        Position::new(offset, self.line, self.column)
    }

    fn advance(&mut self) -> Option<char> {
        let &(_, c) = self.chars.get(self.idx)?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    /// Produce the next token. Returns an `Eof` token at end of input and
    /// keeps returning it on subsequent calls.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let position = self.current_position();

        let Some(c) = self.peek() else {
            return Token::new(TokenKind::Eof, "", position);
        };

        if is_ident_start(c) {
            return self.scan_identifier(position);
        }
        if c.is_ascii_digit() {
            return self.scan_number(position);
        }
        if c == '"' || c == '\'' {
            return self.scan_string(position);
        }

        self.advance();
        let kind = match c {
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '|' => TokenKind::Pipe,
            ';' => TokenKind::Semicolon,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    return Token::new(TokenKind::Eq, "==", position);
                }
                TokenKind::Assign
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    return Token::new(TokenKind::NotEq, "!=", position);
                }
                return Token::new(TokenKind::Illegal, "!", position);
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    return Token::new(TokenKind::Le, "<=", position);
                }
                TokenKind::Lt
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    return Token::new(TokenKind::Ge, ">=", position);
                }
                TokenKind::Gt
            }
            other => return Token::new(TokenKind::Illegal, other.to_string(), position),
        };
        Token::new(kind, c.to_string(), position)
    }

    fn scan_identifier(&mut self, position: Position) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match keyword_kind(&text) {
            Some(kind) => Token::new(kind, text, position),
            None => Token::new(TokenKind::Ident, text, position),
        }
    }

    fn scan_number(&mut self, position: Position) -> Token {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        // A single dot is part of the number only when followed by a digit;
        // otherwise it is the `.` operator (method part).
        if self.peek() == Some('.') && matches!(self.peek_next(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
        }
        Token::new(TokenKind::Number, text, position)
    }

    fn scan_string(&mut self, position: Position) -> Token {
        let quote = self.advance().unwrap();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    // Unterminated string: report the opening quote.
                    return Token::new(TokenKind::Illegal, quote.to_string(), position);
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Token::new(TokenKind::Str, text, position);
                }
                Some('\\') => {
                    // Escapes are preserved literally in the token value.
                    text.push(self.advance().unwrap());
                    if let Some(escaped) = self.advance() {
                        text.push(escaped);
                    }
                }
                Some(_) => {
                    text.push(self.advance().unwrap());
                }
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c == '-' || c.is_alphanumeric()
}

/// Scan a complete source string into tokens (terminated by `Eof`).
///
/// Fails on the first unrecognized character with a positioned message.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::Illegal {
            let ch = token.text.chars().next().unwrap_or('\u{fffd}');
            return Err(LexError {
                ch,
                offset: token.position.offset,
                line: token.position.line,
                column: token.position.column,
            });
        }
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
