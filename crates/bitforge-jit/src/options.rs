//! Compiler configuration.

/// Options controlling code generation and JIT optimization.
///
/// # Example
///
/// ```
/// use bitforge_jit::CompilerOptions;
///
/// let options = CompilerOptions::new()
///     .with_optimization_level(2)
///     .with_vector_width(16);
///
/// assert_eq!(options.optimization_level(), 2);
/// assert_eq!(options.vector_width(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    optimization_level: u8,
    cpu: Option<String>,
    vector_width: u32,
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self {
            optimization_level: 3,
            cpu: None,
            vector_width: 8,
        }
    }

    /// Sets the optimization level, clamped to `0..=3`.
    pub fn with_optimization_level(mut self, level: u8) -> Self {
        self.optimization_level = level.min(3);
        self
    }

    /// Overrides host CPU detection with an explicit LLVM CPU name
    /// (the string given to `-mcpu`).
    pub fn with_cpu(mut self, cpu: impl Into<String>) -> Self {
        self.cpu = Some(cpu.into());
        self
    }

    /// Sets the number of 64-bit lanes per loop iteration. Must be a power
    /// of two between 1 and 64.
    pub fn with_vector_width(mut self, width: u32) -> Self {
        self.vector_width = width;
        self
    }

    pub fn optimization_level(&self) -> u8 {
        self.optimization_level
    }

    pub fn cpu(&self) -> Option<&str> {
        self.cpu.as_deref()
    }

    pub fn vector_width(&self) -> u32 {
        self.vector_width
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::new()
    }
}
