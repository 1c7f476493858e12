//! Tokens produced by the lexer.

use std::fmt;

/// Location of a token in the filter source. `line` and `col` are 1-based,
/// `offset` is a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
    pub offset: usize,
}

impl Position {
    pub fn start() -> Self {
        Self { line: 1, col: 1, offset: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A character no token can start with.
    Illegal,
    Eof,
    /// Bareword text: keywords and implicit string literals.
    Word,
    /// Quoted text.
    Str,
    Number,
    Dot,
    Comma,
    Colon,
    Pipe,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Plus,
    Minus,
    Star,
    Slash,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Illegal => "illegal character",
            TokenKind::Eof => "end of input",
            TokenKind::Word => "text",
            TokenKind::Str => "quoted text",
            TokenKind::Number => "number",
            TokenKind::Dot => "`.`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Pipe => "`|`",
            TokenKind::LeftBracket => "`[`",
            TokenKind::RightBracket => "`]`",
            TokenKind::LeftBrace => "`{`",
            TokenKind::RightBrace => "`}`",
            TokenKind::LeftParen => "`(`",
            TokenKind::RightParen => "`)`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
    /// Raw token text. Empty for punctuation and end of input.
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, pos: Position, text: impl Into<String>) -> Self {
        Self { kind, pos, text: text.into() }
    }

    /// Human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Word | TokenKind::Str | TokenKind::Number | TokenKind::Illegal => {
                format!("{} {:?}", self.kind, self.text)
            }
            _ => self.kind.to_string(),
        }
    }
}
