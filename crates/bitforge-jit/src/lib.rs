//! BitForge JIT - Compiles query expressions to native code via LLVM.
//!
//! The crate splits into:
//! - [`codegen`]: lowers an expression tree into an LLVM module holding one
//!   tight loop per query function
//! - [`engine`]: owns compiled code, runs the target-aware pass pipeline, and
//!   vends typed function pointers under stable symbols
//! - [`options`]: compiler configuration (optimization level, CPU override,
//!   vector width)

pub mod codegen;
pub mod engine;
pub mod options;


pub use codegen::QueryCodeGen;
pub use engine::{CompiledQuery, DenseEvalFn, DensePopcountEvalFn, JitEngine};
pub use options::CompilerOptions;
