//! Lexer implementation

use super::token::*;
use std::iter::Peekable;
use std::str::CharIndices;

const OPERATOR_CHARS: &str = "=<>!+-/%|&^~:@?";

/// Lexer for SQL text.
///
/// Never fails: unterminated literals run to the end of input and unknown
/// characters become single-character [`TokenKind::Operator`]s. Comments
/// (`--`, `#`, `/* */`) are skipped.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            pos: 0,
        }
    }

    /// Tokenize the entire source. The last token is always `Eof`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.pos;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                '.' => {
                    self.advance();
                    TokenKind::Dot
                }
                ';' => {
                    self.advance();
                    TokenKind::Semicolon
                }
                '*' => {
                    self.advance();
                    TokenKind::Star
                }

                '\'' => TokenKind::StringLit(self.scan_quoted('\'')),
                '`' => TokenKind::QuotedIdent(self.scan_quoted('`')),
                '"' => TokenKind::QuotedIdent(self.scan_quoted('"')),

                c if c.is_ascii_digit() => self.scan_number(),

                c if c.is_alphabetic() || c == '_' => self.scan_word(),

                c if OPERATOR_CHARS.contains(c) => self.scan_operator(),

                c => {
                    self.advance();
                    TokenKind::Operator(c.to_string())
                }
            },
        };

        Token {
            kind,
            span: Span {
                start,
                end: self.pos,
            },
        }
    }

    fn scan_word(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Word(self.source[start..self.pos].to_string())
    }

    /// Scan a quoted run. A doubled quote char is an escaped quote; inside
    /// single-quoted strings a backslash escapes the next char.
    fn scan_quoted(&mut self, quote: char) -> String {
        self.advance();
        let mut value = String::new();

        while let Some(c) = self.advance() {
            if c == quote {
                if self.peek_char() == Some(quote) {
                    self.advance();
                    value.push(quote);
                    continue;
                }
                return value;
            }
            if c == '\\' && quote == '\'' {
                if let Some(escaped) = self.advance() {
                    value.push(escaped);
                }
                continue;
            }
            value.push(c);
        }

        value
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        let mut seen_dot = false;
        let mut seen_exp = false;

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                self.advance();
            } else if (c == 'e' || c == 'E') && !seen_exp {
                seen_exp = true;
                self.advance();
                if matches!(self.peek_char(), Some('+') | Some('-')) {
                    self.advance();
                }
            } else {
                break;
            }
        }

        TokenKind::Number(self.source[start..self.pos].to_string())
    }

    fn scan_operator(&mut self) -> TokenKind {
        let start = self.pos;
        self.advance();
        while let Some(c) = self.peek_char() {
            if !OPERATOR_CHARS.contains(c) || self.at_comment_start() {
                break;
            }
            self.advance();
        }
        TokenKind::Operator(self.source[start..self.pos].to_string())
    }

    fn at_comment_start(&self) -> bool {
        let rest = &self.source[self.pos..];
        rest.starts_with("--") || rest.starts_with("/*") || rest.starts_with('#')
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('-') | Some('#') | Some('/') if self.at_comment_start() => {
                    if self.source[self.pos..].starts_with("/*") {
                        // Block comment
                        self.advance();
                        self.advance();
                        loop {
                            match self.advance() {
                                None => break,
                                Some('*') if self.peek_char() == Some('/') => {
                                    self.advance();
                                    break;
                                }
                                _ => {}
                            }
                        }
                    } else {
                        // Line comment
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((i, c)) = self.chars.next() {
            self.pos = i + c.len_utf8();
            Some(c)
        } else {
            None
        }
    }
}

/// Tokenize `sql`, dropping the trailing `Eof`.
pub fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Lexer::new(sql).tokenize();
    tokens.pop();
    tokens
}
