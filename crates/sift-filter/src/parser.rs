//! Filter parser.
//!
//! Grammar, lowest binding first:
//!
//! ```text
//! program  := pipeline EOF
//! pipeline := list ('|' list)*
//! list     := binary (',' binary)*
//! binary   := term (op term)*
//! term     := chain | NUMBER | STRING | WORD | '[' bracket | '{' object | '(' pipeline ')'
//! chain    := ('.' (WORD | STRING)? | '[' bracket)+
//! ```

use crate::ast::Ast;
use crate::error::FilterError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use crate::types::*;

/// Deepest nesting of `(`, `[` and `{` the parser accepts.
pub const MAX_NESTING: usize = 128;

/// Filter parser. A cursor over the scanned token vector.
pub struct FilterParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl FilterParser {
    /// Parse filter source into a program.
    pub fn parse(input: &str) -> Result<Program, FilterError> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self { tokens, pos: 0, depth: 0 };
        parser.parse_program()
    }

    fn parse_program(&mut self) -> Result<Program, FilterError> {
        if self.peek_kind() == TokenKind::Eof {
            return Ok(Ast::program(vec![]));
        }
        let stages = self.parse_pipeline()?;
        self.expect(TokenKind::Eof, "`|`, `,` or end of input")?;
        Ok(Ast::program(stages))
    }

    fn parse_pipeline(&mut self) -> Result<Vec<FilterNode>, FilterError> {
        let mut stages = vec![self.parse_list()?];
        while self.peek_kind() == TokenKind::Pipe {
            self.advance();
            stages.push(self.parse_list()?);
        }
        Ok(stages)
    }

    /// Comma-separated expressions outside brackets build an implicit array.
    fn parse_list(&mut self) -> Result<FilterNode, FilterError> {
        let first = self.parse_binary(0)?;
        if self.peek_kind() != TokenKind::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.peek_kind() == TokenKind::Comma {
            self.advance();
            items.push(self.parse_binary(0)?);
        }
        Ok(Ast::array(items))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<FilterNode, FilterError> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek_operator() {
            if op.precedence() < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(op.precedence() + 1)?;
            left = Ast::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<FilterNode, FilterError> {
        if self.peek_kind() == TokenKind::Dot {
            return self.parse_chain();
        }
        let tok = self.advance();
        match tok.kind {
            TokenKind::Number => Ok(FilterNode::NumericLiteral(parse_number(&tok)?)),
            TokenKind::Str => Ok(Ast::string(tok.text)),
            TokenKind::Word => Ok(match tok.text.as_str() {
                "length" => FilterNode::Length,
                _ => Ast::string(tok.text),
            }),
            TokenKind::LeftBracket => self.nested(&tok, Self::parse_bracket),
            TokenKind::LeftBrace => self.nested(&tok, Self::parse_object),
            TokenKind::LeftParen => self.nested(&tok, |p| {
                let stages = p.parse_pipeline()?;
                p.expect(TokenKind::RightParen, "`)`")?;
                Ok(Ast::pipeline(stages))
            }),
            _ => Err(unexpected("a filter", &tok)),
        }
    }

    fn parse_chain(&mut self) -> Result<FilterNode, FilterError> {
        let mut steps = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    match self.peek_kind() {
                        TokenKind::Word | TokenKind::Str => {
                            let name = self.advance().text;
                            steps.push(Ast::key(name));
                        }
                        // `.[` selects on the current value directly
                        TokenKind::LeftBracket => {}
                        _ => steps.push(FilterNode::Identity),
                    }
                }
                TokenKind::LeftBracket if !steps.is_empty() || self.previous_is_dot() => {
                    let open = self.advance();
                    steps.push(self.nested(&open, Self::parse_bracket)?);
                }
                _ => break,
            }
        }
        Ok(Ast::chain(steps))
    }

    /// Disambiguates the four bracket productions. The opening `[` has been
    /// consumed.
    ///
    /// `[]` iterates, `[n]` indexes, `[a:b]` slices. Anything else rewinds
    /// and parses as array construction.
    fn parse_bracket(&mut self) -> Result<FilterNode, FilterError> {
        let checkpoint = self.pos;
        if let Some(selector) = self.parse_selector_brackets()? {
            return Ok(selector);
        }
        self.pos = checkpoint;
        self.parse_array_items()
    }

    fn parse_selector_brackets(&mut self) -> Result<Option<FilterNode>, FilterError> {
        if self.peek_kind() == TokenKind::RightBracket {
            self.advance();
            return Ok(Some(FilterNode::IterateAll));
        }

        let start = match self.peek_kind() {
            TokenKind::Number => Some(self.advance()),
            _ => None,
        };

        match self.peek_kind() {
            TokenKind::RightBracket => match start {
                Some(tok) => {
                    self.advance();
                    Ok(Some(Ast::index(parse_position(&tok)?)))
                }
                None => Ok(None),
            },
            TokenKind::Colon => {
                self.advance();
                let start = start.as_ref().map(parse_position).transpose()?;
                let stop = match self.peek_kind() {
                    TokenKind::Number => Some(parse_position(&self.advance())?),
                    _ => None,
                };
                self.expect(TokenKind::RightBracket, "`]` to close the range")?;
                Ok(Some(Ast::range(start, stop)))
            }
            _ => Ok(None),
        }
    }

    /// Comma-separated expressions up to `]` or end of input.
    fn parse_array_items(&mut self) -> Result<FilterNode, FilterError> {
        let mut items = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::RightBracket => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                _ => {}
            }
            items.push(self.parse_binary(0)?);
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RightBracket | TokenKind::Eof => {}
                _ => return Err(unexpected("`,` or `]`", &tok)),
            }
        }
        Ok(Ast::array(items))
    }

    /// `key: expr` pairs up to `}`. The opening `{` has been consumed.
    fn parse_object(&mut self) -> Result<FilterNode, FilterError> {
        let mut entries = Vec::new();
        if self.peek_kind() == TokenKind::RightBrace {
            self.advance();
            return Ok(Ast::object(entries));
        }
        loop {
            let key = self.advance();
            if !matches!(key.kind, TokenKind::Word | TokenKind::Str) {
                return Err(unexpected("an object key", &key));
            }
            self.expect(TokenKind::Colon, "`:` after object key")?;
            let value = self.parse_binary(0)?;
            entries.push((key.text, value));

            let tok = self.advance();
            match tok.kind {
                TokenKind::Comma => continue,
                TokenKind::RightBrace => break,
                _ => return Err(unexpected("`,` or `}`", &tok)),
            }
        }
        Ok(Ast::object(entries))
    }

    /// Runs `f` one nesting level below `open`.
    fn nested<T>(
        &mut self,
        open: &Token,
        f: impl FnOnce(&mut Self) -> Result<T, FilterError>,
    ) -> Result<T, FilterError> {
        if self.depth >= MAX_NESTING {
            return Err(FilterError::TooDeep { limit: MAX_NESTING, pos: open.pos });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek_operator(&self) -> Option<BinaryOperator> {
        match self.peek_kind() {
            TokenKind::Plus => Some(BinaryOperator::Add),
            TokenKind::Minus => Some(BinaryOperator::Subtract),
            TokenKind::Star => Some(BinaryOperator::Multiply),
            TokenKind::Slash => Some(BinaryOperator::Divide),
            _ => None,
        }
    }

    fn previous_is_dot(&self) -> bool {
        self.pos > 0 && self.tokens[self.pos - 1].kind == TokenKind::Dot
    }

    fn peek(&self) -> &Token {
        // the token vector always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// Consumes one token. Eof is never consumed past.
    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, FilterError> {
        let tok = self.advance();
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(unexpected(expected, &tok))
        }
    }
}

fn unexpected(expected: &'static str, found: &Token) -> FilterError {
    FilterError::Parse {
        expected,
        found: found.describe(),
        pos: found.pos,
    }
}

fn parse_number(tok: &Token) -> Result<f64, FilterError> {
    tok.text.parse::<f64>().map_err(|_| FilterError::InvalidNumber {
        text: tok.text.clone(),
        pos: tok.pos,
    })
}

/// Index and range bounds must be integers.
fn parse_position(tok: &Token) -> Result<i64, FilterError> {
    tok.text.parse::<i64>().map_err(|_| FilterError::InvalidNumber {
        text: tok.text.clone(),
        pos: tok.pos,
    })
}
