//! Lexer token types

use std::fmt;

/// Token kinds for SQL text.
///
/// The lexer does not know SQL keywords; keywords are [`TokenKind::Word`]s
/// and callers compare them case-insensitively with [`Token::is_word`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword, original case
    Word(String),
    /// Backtick- or double-quoted identifier, without the quotes
    QuotedIdent(String),
    /// Single-quoted string literal, without the quotes
    StringLit(String),
    Number(String),

    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Star,

    /// Any other operator or punctuation run (`=`, `<>`, `->>`, `::`, ...)
    Operator(String),

    Eof,
}

/// Byte range of a token in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// True when this is a bare word equal to `word`, ignoring ASCII case.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(word))
    }

    /// True when this is a bare word in `words`, ignoring ASCII case.
    pub fn is_any_word(&self, words: &[&str]) -> bool {
        match &self.kind {
            TokenKind::Word(w) => words.iter().any(|k| w.eq_ignore_ascii_case(k)),
            _ => false,
        }
    }

    /// Identifier text for bare or quoted identifiers.
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(w) | TokenKind::QuotedIdent(w) => Some(w),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TokenKind::StringLit(_) | TokenKind::Number(_))
            || self.is_any_word(&["NULL", "TRUE", "FALSE"])
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "{}", w),
            TokenKind::QuotedIdent(w) => write!(f, "`{}`", w),
            TokenKind::StringLit(s) => write!(f, "'{}'", s),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Operator(op) => write!(f, "{}", op),
            TokenKind::Eof => write!(f, "<eof>"),
        }
    }
}
