//! Execution contexts.
//!
//! An [`ExecutionContext`] owns the JIT engine queries are compiled against.
//! The engine is reference-counted: queries keep their compiled code alive on
//! their own, and a context can be shared freely across threads.

use std::sync::Arc;

use bitforge_core::Result;
use bitforge_jit::{CompilerOptions, JitEngine};

use crate::query;

/// Owns the JIT engine a set of queries is compiled against.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    engine: Arc<JitEngine>,
}

impl ExecutionContext {
    /// Creates a context with default compiler options.
    pub fn new() -> Result<Self> {
        Self::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(JitEngine::new(options)?),
        })
    }

    pub fn engine(&self) -> &JitEngine {
        &self.engine
    }

    /// Returns the optimized LLVM IR a query would compile to, without
    /// registering any executable code.
    pub fn compile_ir(&self, name: &str, source: &str) -> Result<String> {
        let analyzed = query::analyze(name, source)?;
        self.engine.compile_ir(
            name,
            &analyzed.optimized_exprs,
            analyzed.optimized_root,
            &analyzed.variables,
        )
    }
}
