//! Tokens of the query DSL.

use std::fmt;

/// A lexed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `$0`
    EmptyLiteral,
    /// `$1`
    FullLiteral,
    /// A maximal run of `[A-Za-z0-9_]`.
    Variable(String),
    LeftParen,
    RightParen,
    Not,
    And,
    Or,
    Xor,
    EndOfStream,
}

impl Token {
    /// True for `&`, `|`, and `^`.
    pub fn is_infix_operator(&self) -> bool {
        matches!(self, Token::And | Token::Or | Token::Xor)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::EmptyLiteral => write!(f, "$0"),
            Token::FullLiteral => write!(f, "$1"),
            Token::Variable(name) => write!(f, "{name}"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Not => write!(f, "!"),
            Token::And => write!(f, "&"),
            Token::Or => write!(f, "|"),
            Token::Xor => write!(f, "^"),
            Token::EndOfStream => write!(f, "<end of stream>"),
        }
    }
}
