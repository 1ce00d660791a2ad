//! On-demand scanner for Skiff source code.
//!
//! The compiler pulls one token at a time via [`Scanner::scan_token`];
//! nothing is buffered. Only ASCII is classified, so arbitrary bytes pass
//! through string literals untouched.

use crate::lexer::token::{Token, TokenKind};

/// The scanner transforms source text into a stream of tokens.
pub struct Scanner<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line: usize,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    /// Scan the next token.
    pub fn scan_token(&mut self) -> Token<'src> {
        self.skip_whitespace_and_comments();
        self.start = self.current;

        if self.is_at_end() {
            return Token::eof(self.line);
        }

        let c = self.advance();
        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b';' => self.make_token(TokenKind::Semicolon),
            b'/' => self.make_token(TokenKind::Slash),
            b'*' => self.make_token(TokenKind::Star),
            b'!' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::BangEqual)
                } else {
                    self.make_token(TokenKind::Bang)
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Equal)
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            b'"' => self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if is_alpha(c) => self.identifier(),
            _ => self.error_token("unexpected character"),
        }
    }

    /// Scan the whole source at once. Handy for tests; the compiler pulls
    /// tokens on demand instead.
    pub fn scan_tokens(&mut self) -> Vec<Token<'src>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.current += 1;
                }
                b'\n' => {
                    self.current += 1;
                    self.line += 1;
                }
                b'/' if self.peek_next() == b'/' => {
                    while !self.is_at_end() && self.peek() != b'\n' {
                        self.current += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn string(&mut self) -> Token<'src> {
        while !self.is_at_end() && self.peek() != b'"' {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.current += 1;
        }
        if self.is_at_end() {
            return self.error_token("unterminated string");
        }
        self.current += 1; // closing quote

        // Strip the quotes from the lexeme.
        Token::new(
            TokenKind::String,
            &self.source[self.start + 1..self.current - 1],
            self.line,
        )
    }

    fn number(&mut self) -> Token<'src> {
        while self.peek().is_ascii_digit() {
            self.current += 1;
        }
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.current += 1; // the '.'
            while self.peek().is_ascii_digit() {
                self.current += 1;
            }
        }
        self.make_token(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token<'src> {
        while is_alpha(self.peek()) || self.peek().is_ascii_digit() {
            self.current += 1;
        }
        let text = &self.source[self.start..self.current];
        let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> u8 {
        let byte = self.source.as_bytes()[self.current];
        self.current += 1;
        byte
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.source.as_bytes()[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.source.len() {
            0
        } else {
            self.source.as_bytes()[self.current + 1]
        }
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.source.as_bytes()[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, &self.source[self.start..self.current], self.line)
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token::new(TokenKind::Error, message, self.line)
    }
}

fn is_alpha(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}
