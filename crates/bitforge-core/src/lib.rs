//! BitForge Core - Shared types for the BitForge query pipeline
//!
//! This crate provides the fundamental pieces the rest of the workspace
//! builds on:
//! - Container geometry constants (bits, bytes, words per container)
//! - The `DenseContainer` bitmap buffer handed to compiled queries
//! - The error taxonomy shared by the lexer, parser, compiler, and runtime

pub mod container;
pub mod error;

pub use container::{DenseContainer, EMPTY, FULL};
pub use error::{Error, Result};

/// The word type compiled queries operate on.
pub type BitsetWord = u64;

/// Log2 of the number of bits per container.
pub const LOG_BITS_PER_CONTAINER: usize = 16;
/// Number of bits in a single dense container.
pub const BITS_PER_CONTAINER: usize = 1 << LOG_BITS_PER_CONTAINER;
/// Number of bytes in a single dense container.
pub const BYTES_PER_CONTAINER: usize = BITS_PER_CONTAINER / 8;
/// Number of bits per bitset word.
pub const BITS_PER_WORD: usize = BitsetWord::BITS as usize;
/// Number of words in a single dense container.
pub const WORDS_PER_CONTAINER: usize = BITS_PER_CONTAINER / BITS_PER_WORD;
/// Cache line size containers are aligned to.
pub const CACHE_LINE_SIZE: usize = 64;

/// Sentinel returned by evaluation paths that did not tally a popcount.
pub const UNKNOWN_POPCOUNT: i32 = -1;
