//! Error types for BitForge

use thiserror::Error;

/// Main error type for BitForge operations.
///
/// Variants map one-to-one to the stage of the pipeline that produced the
/// error: tokenisation, parsing, compilation (name validation, codegen and
/// JIT failures), or evaluation.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed token or unrecognised character in a query string
    #[error("Lexer error: {0}")]
    Lexer(String),

    /// Grammar violation, unbalanced parenthesis, or unexpected end of input
    #[error("Parser error: {0}")]
    Parser(String),

    /// Codegen failure, LLVM error, duplicate symbol, or invalid query name
    #[error("Compiler error: {0}")]
    Compiler(String),

    /// Evaluation-time contract violation (missing input, size mismatch)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for BitForge operations
pub type Result<T> = std::result::Result<T, Error>;
