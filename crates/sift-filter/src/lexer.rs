//! Filter source scanner.

use crate::error::FilterError;
use crate::token::{Position, Token, TokenKind};

/// Turns filter source text into tokens, one [`scan`](Lexer::scan) at a time.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0, line: 1, col: 1 }
    }

    /// Scans every token up to and including end of input.
    ///
    /// Fails on the first illegal character.
    pub fn tokenize(mut self) -> Result<Vec<Token>, FilterError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.scan();
            match tok.kind {
                TokenKind::Illegal => {
                    return Err(FilterError::Lex {
                        ch: tok.text.chars().next().unwrap_or('\0'),
                        pos: tok.pos,
                    })
                }
                TokenKind::Eof => {
                    tokens.push(tok);
                    return Ok(tokens);
                }
                _ => tokens.push(tok),
            }
        }
    }

    /// Reads one token. Returns an `Eof` token forever once input runs out.
    pub fn scan(&mut self) -> Token {
        loop {
            let start = self.position();
            let Some(ch) = self.peek() else {
                return Token::new(TokenKind::Eof, start, "");
            };

            let single = match ch {
                ' ' | '\r' => {
                    self.advance();
                    continue;
                }
                '|' => TokenKind::Pipe,
                '[' => TokenKind::LeftBracket,
                ']' => TokenKind::RightBracket,
                '(' => TokenKind::LeftParen,
                ')' => TokenKind::RightParen,
                '{' => TokenKind::LeftBrace,
                '}' => TokenKind::RightBrace,
                ':' => TokenKind::Colon,
                ',' => TokenKind::Comma,
                '+' => TokenKind::Plus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '.' | '-' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                    return self.scan_number(start);
                }
                '.' => TokenKind::Dot,
                '-' => TokenKind::Minus,
                '0'..='9' => return self.scan_number(start),
                '"' => return self.scan_quoted(start),
                c if is_word_char(c) => match self.scan_word(start) {
                    Some(tok) => return tok,
                    // only newlines: treat as whitespace
                    None => continue,
                },
                c => {
                    self.advance();
                    return Token::new(TokenKind::Illegal, start, c.to_string());
                }
            };
            self.advance();
            return Token::new(single, start, "");
        }
    }

    /// Digits and dots, greedily. Well-formedness is checked by the parser.
    fn scan_number(&mut self, start: Position) -> Token {
        let from = self.pos;
        // leading digit, `.` or `-`
        self.advance();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.advance();
            } else {
                break;
            }
        }
        Token::new(TokenKind::Number, start, &self.input[from..self.pos])
    }

    /// Everything up to the closing quote or end of input. No escapes.
    fn scan_quoted(&mut self, start: Position) -> Token {
        self.advance();
        let from = self.pos;
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            self.advance();
        }
        let text = &self.input[from..self.pos];
        // closing quote, if any
        self.advance();
        Token::new(TokenKind::Str, start, text)
    }

    fn scan_word(&mut self, start: Position) -> Option<Token> {
        let from = self.pos;
        while let Some(c) = self.peek() {
            if !is_word_char(c) {
                break;
            }
            self.advance();
        }
        let text = self.input[from..self.pos].trim();
        if text.is_empty() {
            return None;
        }
        Some(Token::new(TokenKind::Word, start, text))
    }

    fn position(&self) -> Position {
        Position { line: self.line, col: self.col, offset: self.pos }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.pos..].chars().nth(1)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '\n'
}
