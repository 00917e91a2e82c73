//! The JIT engine: owns compiled query code and resolves symbols.
//!
//! The engine detects the host target once at construction, then compiles
//! each query into its own LLVM module: codegen, target-aware optimization
//! passes, JIT linking, and symbol resolution into typed function pointers.
//! Compiled code lives in a [`CompiledQuery`], which owns the LLVM context
//! and execution engine the code was linked with; function pointers stay
//! valid exactly as long as the `CompiledQuery` is alive.
//!
//! Symbols are process-stable: an engine refuses to register two queries
//! under the same name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use inkwell::attributes::AttributeLoc;
use inkwell::context::Context;
use inkwell::execution_engine::JitFunction;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use inkwell::OptimizationLevel;
use ouroboros::self_referencing;
use tracing::debug;

use bitforge_core::{BitsetWord, Error, Result};
use bitforge_expr::{ExprBuilder, ExprId};

use crate::codegen::QueryCodeGen;
use crate::options::CompilerOptions;

/// Signature of the plain variant of a compiled query.
pub type DenseEvalFn = unsafe extern "C" fn(*const *const BitsetWord, *mut BitsetWord);

/// Signature of the popcount variant of a compiled query.
pub type DensePopcountEvalFn =
    unsafe extern "C" fn(*const *const BitsetWord, *mut BitsetWord) -> i32;

// Explicit pass list mirroring the scalar/loop pipeline the queries rely on;
// the default<On> pipeline then runs on top at the configured level.
const QUERY_PASSES: &str =
    "instcombine,mem2reg,gvn,newgvn,simplifycfg,loop-simplify,loop-vectorize,loop-unroll";

/// A query compiled to native code.
///
/// Owns the LLVM context and execution engine backing the code, so the
/// vended function pointers are valid for the lifetime of this value.
#[self_referencing]
pub struct CompiledQuery {
    name: String,
    context: Context,
    #[borrows(context)]
    #[covariant]
    funcs: (
        JitFunction<'this, DenseEvalFn>,
        JitFunction<'this, DensePopcountEvalFn>,
    ),
}

// SAFETY: the execution engine's code memory is immutable once finalized and
// the context is never touched again after construction; calls only go
// through the finalized function pointers.
unsafe impl Send for CompiledQuery {}
unsafe impl Sync for CompiledQuery {}

impl CompiledQuery {
    pub fn name(&self) -> &str {
        self.borrow_name()
    }

    /// Runs the plain variant.
    ///
    /// # Safety
    ///
    /// `inputs` must point to one container pointer per query variable, in
    /// variable order, and every pointer must reference a readable container
    /// buffer; `output` must reference a writable one.
    pub unsafe fn call(&self, inputs: *const *const BitsetWord, output: *mut BitsetWord) {
        unsafe { self.borrow_funcs().0.call(inputs, output) }
    }

    /// Runs the popcount variant and returns the total popcount of the
    /// written output.
    ///
    /// # Safety
    ///
    /// Same contract as [`CompiledQuery::call`].
    pub unsafe fn call_popcount(
        &self,
        inputs: *const *const BitsetWord,
        output: *mut BitsetWord,
    ) -> i32 {
        unsafe { self.borrow_funcs().1.call(inputs, output) }
    }
}

impl std::fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// The BitForge JIT engine.
pub struct JitEngine {
    options: CompilerOptions,
    cpu: String,
    features: String,
    triple: String,
    // A `None` entry reserves a name whose compile is still in flight; the
    // lock only guards this bookkeeping, never the compile itself.
    queries: Mutex<HashMap<String, Option<Arc<CompiledQuery>>>>,
}

impl JitEngine {
    /// Initializes the native target and detects the host CPU.
    pub fn new(options: CompilerOptions) -> Result<Self> {
        Target::initialize_native(&InitializationConfig::default()).map_err(Error::Compiler)?;

        let width = options.vector_width();
        if !width.is_power_of_two() || width > 64 {
            return Err(Error::Compiler(format!(
                "vector width must be a power of two between 1 and 64, got {width}"
            )));
        }

        let cpu = match options.cpu() {
            Some(cpu) => cpu.to_owned(),
            None => TargetMachine::get_host_cpu_name()
                .to_str()
                .unwrap_or_default()
                .to_owned(),
        };
        let features = TargetMachine::get_host_cpu_features()
            .to_str()
            .unwrap_or_default()
            .to_owned();
        let triple = TargetMachine::get_default_triple()
            .as_str()
            .to_string_lossy()
            .into_owned();

        debug!(
            event = "jit_engine_init",
            cpu = %cpu,
            triple = %triple,
            opt_level = options.optimization_level(),
            vector_width = options.vector_width(),
        );

        Ok(Self {
            options,
            cpu,
            features,
            triple,
            queries: Mutex::new(HashMap::new()),
        })
    }

    /// LLVM name of the CPU code is tuned for (the `-mcpu` string).
    pub fn target_cpu(&self) -> &str {
        &self.cpu
    }

    /// Comma-separated LLVM feature string of the target CPU (`+avx2,...`).
    pub fn target_features(&self) -> &str {
        &self.features
    }

    /// Normalized LLVM target triple of the host.
    pub fn target_triple(&self) -> &str {
        &self.triple
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compiles a query and registers it under `name`.
    ///
    /// Emits both the plain and `_popcount` variants, runs the optimization
    /// pipeline, and links the module into executable memory. Fails if the
    /// name is already registered.
    pub fn compile(
        &self,
        name: &str,
        exprs: &ExprBuilder,
        root: ExprId,
        variables: &[String],
    ) -> Result<Arc<CompiledQuery>> {
        // Reserve the name first so a concurrent compile cannot register it;
        // the expensive build below then runs without the lock, and compiles
        // of distinct queries proceed in parallel.
        {
            let mut queries = self.queries.lock().unwrap_or_else(|e| e.into_inner());
            if queries.contains_key(name) {
                return Err(Error::Compiler(format!(
                    "query symbol '{name}' is already registered"
                )));
            }
            queries.insert(name.to_owned(), None);
        }

        let start = Instant::now();
        let built = CompiledQueryTryBuilder {
            name: name.to_owned(),
            context: Context::create(),
            funcs_builder: |context| {
                let module = self.build_module(context, name, exprs, root, variables)?;
                let engine = module
                    .create_jit_execution_engine(self.opt_level())
                    .map_err(|e| Error::Compiler(e.to_string()))?;
                let dense = unsafe { engine.get_function::<DenseEvalFn>(name) }
                    .map_err(|e| Error::Compiler(e.to_string()))?;
                let popcount = unsafe {
                    engine.get_function::<DensePopcountEvalFn>(&format!("{name}_popcount"))
                }
                .map_err(|e| Error::Compiler(e.to_string()))?;
                Ok((dense, popcount))
            },
        }
        .try_build();

        let mut queries = self.queries.lock().unwrap_or_else(|e| e.into_inner());
        match built {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                queries.insert(name.to_owned(), Some(Arc::clone(&compiled)));

                debug!(
                    event = "query_compiled",
                    query = name,
                    variable_count = variables.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                );

                Ok(compiled)
            }
            Err(e) => {
                // Release the reservation so the name can be retried.
                queries.remove(name);
                Err(e)
            }
        }
    }

    /// Resolves a previously compiled query by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<CompiledQuery>> {
        let queries = self.queries.lock().unwrap_or_else(|e| e.into_inner());
        queries
            .get(name)
            .and_then(|entry| entry.clone())
            .ok_or_else(|| Error::Compiler(format!("query symbol '{name}' is not registered")))
    }

    /// Returns the optimized textual LLVM IR for a query without registering
    /// any executable code. Debugging surface for tooling.
    pub fn compile_ir(
        &self,
        name: &str,
        exprs: &ExprBuilder,
        root: ExprId,
        variables: &[String],
    ) -> Result<String> {
        let context = Context::create();
        let module = self.build_module(&context, name, exprs, root, variables)?;
        Ok(module.print_to_string().to_string())
    }

    // Codegen plus the target-aware pass pipeline, shared by `compile` and
    // `compile_ir`.
    fn build_module<'ctx>(
        &self,
        context: &'ctx Context,
        name: &str,
        exprs: &ExprBuilder,
        root: ExprId,
        variables: &[String],
    ) -> Result<Module<'ctx>> {
        let codegen = QueryCodeGen::new(context, name, self.options.vector_width());
        codegen.compile(name, exprs, root, variables)?;
        let module = codegen.finish();

        // Pin every function to the detected CPU before module passes run.
        for function in module.get_functions() {
            function.add_attribute(
                AttributeLoc::Function,
                context.create_string_attribute("target-cpu", &self.cpu),
            );
            function.add_attribute(
                AttributeLoc::Function,
                context.create_string_attribute("target-features", &self.features),
            );
        }

        module
            .verify()
            .map_err(|e| Error::Compiler(e.to_string()))?;

        let machine = self.target_machine()?;
        module
            .run_passes(QUERY_PASSES, &machine, self.pass_options())
            .map_err(|e| Error::Compiler(e.to_string()))?;
        module
            .run_passes(
                &format!("default<O{}>", self.options.optimization_level()),
                &machine,
                self.pass_options(),
            )
            .map_err(|e| Error::Compiler(e.to_string()))?;

        Ok(module)
    }

    fn pass_options(&self) -> PassBuilderOptions {
        let options = PassBuilderOptions::create();
        options.set_loop_vectorization(true);
        options.set_loop_slp_vectorization(true);
        options.set_loop_unrolling(true);
        options.set_loop_interleaving(true);
        options
    }

    fn target_machine(&self) -> Result<TargetMachine> {
        let triple = TargetTriple::create(&self.triple);
        let target = Target::from_triple(&triple).map_err(|e| Error::Compiler(e.to_string()))?;
        target
            .create_target_machine(
                &triple,
                &self.cpu,
                &self.features,
                self.opt_level(),
                RelocMode::Default,
                CodeModel::JITDefault,
            )
            .ok_or_else(|| {
                Error::Compiler(format!("no target machine for triple '{}'", self.triple))
            })
    }

    fn opt_level(&self) -> OptimizationLevel {
        match self.options.optimization_level() {
            0 => OptimizationLevel::None,
            1 => OptimizationLevel::Less,
            2 => OptimizationLevel::Default,
            _ => OptimizationLevel::Aggressive,
        }
    }
}

impl std::fmt::Debug for JitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitEngine")
            .field("cpu", &self.cpu)
            .field("triple", &self.triple)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
