//! BitForge - JIT-compiled boolean algebra over dense bitmaps
//!
//! BitForge compiles boolean set-expressions like `(a & b) | !c` into native
//! machine code through LLVM and evaluates them over fixed-size 65 536-bit
//! containers at near-memory-bandwidth speed. One fused, vectorized loop per
//! query replaces a chain of generic per-operator passes.
//!
//! # Quick Start
//!
//! ```
//! use bitforge::{DenseContainer, EvalContext, ExecutionContext, Query};
//!
//! let context = ExecutionContext::new()?;
//! let query = Query::make("intersect", "a & b", &context)?;
//!
//! let a = DenseContainer::filled(0b1100);
//! let b = DenseContainer::filled(0b1010);
//! let mut out = DenseContainer::zeroed();
//!
//! let count = query.eval(
//!     &EvalContext::new().with_popcount(true),
//!     &[Some(&a), Some(&b)],
//!     &mut out,
//! )?;
//! assert_eq!(count, 1024); // one surviving bit per 64-bit word
//! # Ok::<(), bitforge::Error>(())
//! ```

mod context;
mod query;

// ============================================================================
// Core types
// ============================================================================

pub use bitforge_core::{
    BitsetWord, DenseContainer, Error, Result, BITS_PER_CONTAINER, BYTES_PER_CONTAINER,
    UNKNOWN_POPCOUNT, WORDS_PER_CONTAINER,
};

// ============================================================================
// Expression layer
// ============================================================================

pub use bitforge_expr::{parse, ExprBuilder, ExprId, ExprKind, Optimizer, OptimizerFlags};

// ============================================================================
// Compilation and evaluation
// ============================================================================

pub use bitforge_jit::CompilerOptions;

pub use context::ExecutionContext;
pub use query::{EvalContext, MissingPolicy, Query};

/// Convenience re-exports for the common entry points.
pub mod prelude {
    pub use crate::{
        CompilerOptions, DenseContainer, Error, EvalContext, ExecutionContext, MissingPolicy,
        Query, Result,
    };
}
