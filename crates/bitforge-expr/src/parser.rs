//! Pratt parser for the query DSL.
//!
//! Parses exactly one expression followed by end of stream. Operator
//! precedence from tight to loose: `!`, `&`, `^`, `|`. `!` is a
//! right-associative prefix; the binary operators are left-associative.

use bitforge_core::{Error, Result};

use crate::expr::{ExprBuilder, ExprId};
use crate::lexer::Lexer;
use crate::token::Token;

const NOT_PRECEDENCE: u8 = 4;
const AND_PRECEDENCE: u8 = 3;
const XOR_PRECEDENCE: u8 = 2;
const OR_PRECEDENCE: u8 = 1;

/// Parses `query` into `builder`, returning the root of the expression tree.
pub fn parse(query: &str, builder: &mut ExprBuilder) -> Result<ExprId> {
    Parser::new(query, builder).parse()
}

struct Parser<'a, 'b> {
    lexer: Lexer<'a>,
    builder: &'b mut ExprBuilder,
    // One-token buffer backing peek().
    next: Option<Token>,
}

impl<'a, 'b> Parser<'a, 'b> {
    fn new(query: &'a str, builder: &'b mut ExprBuilder) -> Self {
        Self {
            lexer: Lexer::new(query),
            builder,
            next: None,
        }
    }

    fn parse(mut self) -> Result<ExprId> {
        let expr = self.parse_expr(0)?;
        self.expect(Token::EndOfStream)?;
        Ok(expr)
    }

    // Lexer failures surface as parser errors.
    fn next_from_lexer(&mut self) -> Result<Token> {
        self.lexer.next_token().map_err(|e| match e {
            Error::Lexer(msg) => Error::Parser(msg),
            other => other,
        })
    }

    fn peek(&mut self) -> Result<&Token> {
        match self.next {
            Some(ref token) => Ok(token),
            None => {
                let token = self.next_from_lexer()?;
                Ok(self.next.get_or_insert(token))
            }
        }
    }

    fn consume(&mut self) -> Result<Token> {
        match self.next.take() {
            Some(token) => Ok(token),
            None => self.next_from_lexer(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<Token> {
        let token = self.consume()?;
        if token != expected {
            return Err(Error::Parser(format!(
                "unexpected token '{token}', expected '{expected}'"
            )));
        }
        Ok(token)
    }

    fn parse_expr(&mut self, precedence: u8) -> Result<ExprId> {
        let token = self.consume()?;
        let mut left = self.parse_prefix(token)?;

        while precedence < self.peek_precedence()? {
            let token = self.consume()?;
            left = self.parse_infix(token, left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self, token: Token) -> Result<ExprId> {
        match token {
            Token::EmptyLiteral => Ok(self.builder.empty()),
            Token::FullLiteral => Ok(self.builder.full()),
            Token::Variable(name) => Ok(self.builder.variable(name)),
            Token::Not => {
                let operand = self.parse_expr(NOT_PRECEDENCE)?;
                Ok(self.builder.not(operand))
            }
            Token::LeftParen => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            other => Err(Error::Parser(format!("unexpected token '{other}'"))),
        }
    }

    fn parse_infix(&mut self, token: Token, left: ExprId) -> Result<ExprId> {
        match token {
            Token::And => {
                let right = self.parse_expr(AND_PRECEDENCE)?;
                Ok(self.builder.and(left, right))
            }
            Token::Or => {
                let right = self.parse_expr(OR_PRECEDENCE)?;
                Ok(self.builder.or(left, right))
            }
            Token::Xor => {
                let right = self.parse_expr(XOR_PRECEDENCE)?;
                Ok(self.builder.xor(left, right))
            }
            other => Err(Error::Parser(format!("unexpected token '{other}'"))),
        }
    }

    fn peek_precedence(&mut self) -> Result<u8> {
        Ok(match self.peek()? {
            Token::And => AND_PRECEDENCE,
            Token::Xor => XOR_PRECEDENCE,
            Token::Or => OR_PRECEDENCE,
            _ => 0,
        })
    }
}
