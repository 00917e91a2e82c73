//! LLVM IR generation for query expressions.
//!
//! One [`QueryCodeGen`] owns one LLVM module. Each compiled query contributes
//! two external functions built from a single lowering routine:
//!
//! - `NAME(inputs: *const *const u64, output: *mut u64)`
//! - `NAME_popcount(...) -> i32`, which additionally tallies the popcount of
//!   the written output
//!
//! The body is a single counted loop over the container. Per iteration it
//! loads one vector of words per bound variable, evaluates the expression on
//! the vectors, stores the result, and (in the popcount variant) accumulates
//! `llvm.ctpop` of the result into a vector accumulator that is
//! horizontally reduced after the loop. The loop is deliberately simple so
//! LLVM's loop vectorizer and unroller can widen it for the target.

use std::collections::HashMap;
use std::fmt::Display;

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::intrinsics::Intrinsic;
use inkwell::module::{Linkage, Module};
use inkwell::types::VectorType;
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, PointerValue, VectorValue};
use inkwell::{AddressSpace, IntPredicate};

use bitforge_core::{Error, Result, BITS_PER_CONTAINER, BITS_PER_WORD};
use bitforge_expr::{ExprBuilder, ExprId, ExprKind};

fn compiler_err(e: impl Display) -> Error {
    Error::Compiler(e.to_string())
}

/// Builds an LLVM module containing the compiled form of queries.
///
/// The module and its context are owned by the caller; `finish` hands the
/// populated module back for optimization and JIT linking.
pub struct QueryCodeGen<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    vector_width: u32,
}

impl<'ctx> QueryCodeGen<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str, vector_width: u32) -> Self {
        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            vector_width,
        }
    }

    /// Emits both variants of a query into the module.
    ///
    /// `variables` is the query's ordered variable list and defines the
    /// layout of the `inputs` pointer array; it must cover every variable
    /// the expression references.
    pub fn compile(
        &self,
        name: &str,
        exprs: &ExprBuilder,
        root: ExprId,
        variables: &[String],
    ) -> Result<()> {
        self.compile_function(name, exprs, root, variables, false)?;
        self.compile_function(&format!("{name}_popcount"), exprs, root, variables, true)
    }

    /// Consumes the generator and returns the populated module.
    pub fn finish(self) -> Module<'ctx> {
        self.module
    }

    fn vec_type(&self) -> VectorType<'ctx> {
        self.context.i64_type().vec_type(self.vector_width)
    }

    /// Alignment of the vector loads/stores. Containers are 64-byte aligned,
    /// so wider vectors still step on 64-byte boundaries.
    fn access_alignment(&self) -> u32 {
        (self.vector_width * (BITS_PER_WORD as u32 / 8)).min(64)
    }

    fn word_count(&self) -> u64 {
        (BITS_PER_CONTAINER / (BITS_PER_WORD * self.vector_width as usize)) as u64
    }

    fn compile_function(
        &self,
        symbol: &str,
        exprs: &ExprBuilder,
        root: ExprId,
        variables: &[String],
        with_popcount: bool,
    ) -> Result<()> {
        let function = self.declare_function(symbol, with_popcount)?;

        let i64_type = self.context.i64_type();
        let vec_type = self.vec_type();

        let entry_block = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry_block);

        let inputs_ptr = function
            .get_nth_param(0)
            .ok_or_else(|| Error::Compiler("missing inputs parameter".into()))?
            .into_pointer_value();
        let output_ptr = function
            .get_nth_param(1)
            .ok_or_else(|| Error::Compiler("missing output parameter".into()))?
            .into_pointer_value();

        // Unroll the inputs array into one base pointer per variable.
        let mut bases: Vec<PointerValue<'ctx>> = Vec::with_capacity(variables.len());
        for i in 0..variables.len() {
            let index = i64_type.const_int(i as u64, false);
            let gep = unsafe {
                self.builder.build_in_bounds_gep(
                    inputs_ptr,
                    &[index],
                    &format!("bitmap_gep_{i}"),
                )
            }
            .map_err(compiler_err)?;
            let base = self
                .builder
                .build_load(gep, &format!("bitmap_{i}"))
                .map_err(compiler_err)?
                .into_pointer_value();
            bases.push(base);
        }

        let zero = i64_type.const_int(0, false);
        let step = i64_type.const_int(1, false);
        let n_words = i64_type.const_int(self.word_count(), false);

        let loop_block = self.context.append_basic_block(function, "loop");
        let after_block = self.context.append_basic_block(function, "after_loop");

        self.builder
            .build_unconditional_branch(loop_block)
            .map_err(compiler_err)?;
        self.builder.position_at_end(loop_block);

        // Induction variable, and the popcount accumulator when requested.
        let i_phi = self.builder.build_phi(i64_type, "i").map_err(compiler_err)?;
        i_phi.add_incoming(&[(&zero, entry_block)]);
        let i_value = i_phi.as_basic_value().into_int_value();

        let acc_phi = if with_popcount {
            let phi = self
                .builder
                .build_phi(vec_type, "acc")
                .map_err(compiler_err)?;
            phi.add_incoming(&[(&vec_type.const_zero(), entry_block)]);
            Some(phi)
        } else {
            None
        };

        // Bind each variable to the vector of words loaded this iteration.
        let mut bound: HashMap<&str, VectorValue<'ctx>> = HashMap::with_capacity(variables.len());
        for (i, name) in variables.iter().enumerate() {
            let gep = unsafe {
                self.builder
                    .build_in_bounds_gep(bases[i], &[i_value], &format!("gep_{i}"))
            }
            .map_err(compiler_err)?;
            let load = self
                .builder
                .build_load(gep, &format!("load_{i}"))
                .map_err(compiler_err)?;
            if let Some(inst) = load.as_instruction_value() {
                inst.set_alignment(self.access_alignment())
                    .map_err(compiler_err)?;
            }
            bound.insert(name.as_str(), load.into_vector_value());
        }

        let result = self.lower_expr(exprs, root, &bound)?;

        let output_gep = unsafe {
            self.builder
                .build_in_bounds_gep(output_ptr, &[i_value], "gep_output")
        }
        .map_err(compiler_err)?;
        let store = self
            .builder
            .build_store(output_gep, result)
            .map_err(compiler_err)?;
        store
            .set_alignment(self.access_alignment())
            .map_err(compiler_err)?;

        let next_acc = match acc_phi {
            Some(phi) => {
                let popcnt = self
                    .call_vector_intrinsic("llvm.ctpop", result, "popcnt")?
                    .into_vector_value();
                let next = self
                    .builder
                    .build_int_add(phi.as_basic_value().into_vector_value(), popcnt, "next_acc")
                    .map_err(compiler_err)?;
                phi.add_incoming(&[(&next, loop_block)]);
                Some(next)
            }
            None => None,
        };

        let next_i = self
            .builder
            .build_int_add(i_value, step, "next_i")
            .map_err(compiler_err)?;
        let exit_cond = self
            .builder
            .build_int_compare(IntPredicate::EQ, next_i, n_words, "exit_cond")
            .map_err(compiler_err)?;
        self.builder
            .build_conditional_branch(exit_cond, after_block, loop_block)
            .map_err(compiler_err)?;
        i_phi.add_incoming(&[(&next_i, loop_block)]);

        self.builder.position_at_end(after_block);
        match next_acc {
            Some(acc) => {
                // Horizontal sum of the lane-wise popcounts.
                let sum = self
                    .call_vector_intrinsic("llvm.vector.reduce.add", acc, "hsum")?
                    .into_int_value();
                let total = self
                    .builder
                    .build_int_truncate(sum, self.context.i32_type(), "popcount")
                    .map_err(compiler_err)?;
                self.builder
                    .build_return(Some(&total))
                    .map_err(compiler_err)?;
            }
            None => {
                self.builder.build_return(None).map_err(compiler_err)?;
            }
        }

        Ok(())
    }

    fn declare_function(&self, symbol: &str, with_popcount: bool) -> Result<FunctionValue<'ctx>> {
        let vec_ptr_type = self.vec_type().ptr_type(AddressSpace::default());
        let inputs_ptr_type = vec_ptr_type.ptr_type(AddressSpace::default());
        let params = [inputs_ptr_type.into(), vec_ptr_type.into()];
        let fn_type = if with_popcount {
            self.context.i32_type().fn_type(&params, false)
        } else {
            self.context.void_type().fn_type(&params, false)
        };

        // Compiled queries are resolved by symbol name and called through a
        // plain function pointer, so they get external linkage and the C
        // calling convention (LLVM's default).
        let function = self
            .module
            .add_function(symbol, fn_type, Some(Linkage::External));

        let enum_attr = |name: &str| {
            self.context
                .create_enum_attribute(Attribute::get_named_enum_kind_id(name), 0)
        };
        // Neither pointer escapes; inputs are only read; the distinct output
        // pointer lets the vectorizer skip runtime aliasing checks.
        function.add_attribute(AttributeLoc::Param(0), enum_attr("nocapture"));
        function.add_attribute(AttributeLoc::Param(0), enum_attr("readonly"));
        function.add_attribute(AttributeLoc::Param(1), enum_attr("nocapture"));
        function.add_attribute(AttributeLoc::Param(1), enum_attr("noalias"));

        Ok(function)
    }

    // Reduces an expression to a single vector value over the bound inputs.
    fn lower_expr(
        &self,
        exprs: &ExprBuilder,
        id: ExprId,
        bound: &HashMap<&str, VectorValue<'ctx>>,
    ) -> Result<VectorValue<'ctx>> {
        match exprs.kind(id) {
            ExprKind::EmptyLiteral => Ok(self.vec_type().const_zero()),
            ExprKind::FullLiteral => {
                // All-ones splat, folded to a constant.
                self.builder
                    .build_not(self.vec_type().const_zero(), "full")
                    .map_err(compiler_err)
            }
            ExprKind::Variable(name) => bound.get(name.as_str()).copied().ok_or_else(|| {
                Error::Compiler(format!("referenced bitmap '{name}' not found"))
            }),
            ExprKind::Not(operand) => {
                let operand = self.lower_expr(exprs, *operand, bound)?;
                self.builder.build_not(operand, "not").map_err(compiler_err)
            }
            ExprKind::And(l, r) => {
                let (l, r) = self.lower_binary(exprs, *l, *r, bound)?;
                self.builder.build_and(l, r, "and").map_err(compiler_err)
            }
            ExprKind::Or(l, r) => {
                let (l, r) = self.lower_binary(exprs, *l, *r, bound)?;
                self.builder.build_or(l, r, "or").map_err(compiler_err)
            }
            ExprKind::Xor(l, r) => {
                let (l, r) = self.lower_binary(exprs, *l, *r, bound)?;
                self.builder.build_xor(l, r, "xor").map_err(compiler_err)
            }
        }
    }

    fn lower_binary(
        &self,
        exprs: &ExprBuilder,
        l: ExprId,
        r: ExprId,
        bound: &HashMap<&str, VectorValue<'ctx>>,
    ) -> Result<(VectorValue<'ctx>, VectorValue<'ctx>)> {
        Ok((
            self.lower_expr(exprs, l, bound)?,
            self.lower_expr(exprs, r, bound)?,
        ))
    }

    // Calls a unary intrinsic overloaded on the loop's vector type. The
    // result is a vector for `llvm.ctpop` and a scalar for
    // `llvm.vector.reduce.add`; the caller picks the view it expects.
    fn call_vector_intrinsic(
        &self,
        name: &str,
        value: VectorValue<'ctx>,
        result_name: &str,
    ) -> Result<BasicValueEnum<'ctx>> {
        let intrinsic = Intrinsic::find(name)
            .ok_or_else(|| Error::Compiler(format!("intrinsic '{name}' not found")))?;
        let declaration = intrinsic
            .get_declaration(&self.module, &[self.vec_type().into()])
            .ok_or_else(|| Error::Compiler(format!("failed to declare intrinsic '{name}'")))?;
        let call = self
            .builder
            .build_call(declaration, &[value.into()], result_name)
            .map_err(compiler_err)?;
        call.try_as_basic_value()
            .left()
            .ok_or_else(|| Error::Compiler(format!("intrinsic '{name}' returned no value")))
    }
}
