//! Named, compiled, executable queries.

use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

use bitforge_core::container::{EMPTY, FULL};
use bitforge_core::{BitsetWord, DenseContainer, Error, Result, UNKNOWN_POPCOUNT};
use bitforge_expr::{parse, ExprBuilder, ExprId, Optimizer, OptimizerFlags};
use bitforge_jit::CompiledQuery;

use crate::context::ExecutionContext;

/// How evaluation treats a missing input container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Fail with a runtime error naming the variable.
    #[default]
    Error,
    /// Substitute the shared read-only all-zeros container.
    ReplaceWithEmpty,
    /// Substitute the shared read-only all-ones container.
    ReplaceWithFull,
}

/// Per-call evaluation settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext {
    missing_policy: MissingPolicy,
    popcount: bool,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing_policy(mut self, policy: MissingPolicy) -> Self {
        self.missing_policy = policy;
        self
    }

    /// Requests the popcount variant, which returns the number of set bits
    /// in the output.
    pub fn with_popcount(mut self, popcount: bool) -> Self {
        self.popcount = popcount;
        self
    }

    pub fn missing_policy(&self) -> MissingPolicy {
        self.missing_policy
    }

    pub fn popcount(&self) -> bool {
        self.popcount
    }
}

// Front-end pipeline shared by Query::make and ExecutionContext::compile_ir:
// validate the name, parse, collect variables, optimize.
pub(crate) struct AnalyzedQuery {
    pub exprs: ExprBuilder,
    pub root: ExprId,
    pub optimized_exprs: ExprBuilder,
    pub optimized_root: ExprId,
    pub variables: Vec<String>,
}

pub(crate) fn analyze(name: &str, source: &str) -> Result<AnalyzedQuery> {
    validate_name(name)?;

    let mut exprs = ExprBuilder::new();
    let root = parse(source, &mut exprs)?;
    // The parsed expression defines the input ABI; optimization must not
    // change which inputs a caller has to supply.
    let variables = exprs.variables(root);

    let mut optimizer = Optimizer::new(OptimizerFlags::default());
    let optimized_root = optimizer.optimize(&exprs, root);
    let optimized_exprs = optimizer.into_builder();

    Ok(AnalyzedQuery {
        exprs,
        root,
        optimized_exprs,
        optimized_root,
        variables,
    })
}

fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric()
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(Error::Compiler(format!(
            "invalid query name {name:?}: expected an alphanumeric first character \
             followed by alphanumerics or underscores"
        )));
    }
    Ok(())
}

/// A named, parsed, optimized, and compiled boolean expression over variable
/// containers. Immutable after construction.
///
/// The order of [`Query::variables`] is the order in which inputs must be
/// supplied to [`Query::eval`], and is stable for the lifetime of the query.
pub struct Query {
    name: String,
    source: String,
    exprs: ExprBuilder,
    root: ExprId,
    optimized_exprs: ExprBuilder,
    optimized_root: ExprId,
    variables: Vec<String>,
    compiled: Arc<CompiledQuery>,
}

impl Query {
    /// Parses, optimizes, compiles, and registers a query.
    ///
    /// `name` becomes the symbol the compiled code is published under and
    /// must be unique within the context's engine.
    pub fn make(
        name: impl Into<String>,
        source: impl Into<String>,
        context: &ExecutionContext,
    ) -> Result<Self> {
        let name = name.into();
        let source = source.into();

        let analyzed = analyze(&name, &source)?;
        let compiled = context.engine().compile(
            &name,
            &analyzed.optimized_exprs,
            analyzed.optimized_root,
            &analyzed.variables,
        )?;

        debug!(
            event = "query_ready",
            query = %name,
            source = %source,
            variable_count = analyzed.variables.len(),
        );

        Ok(Self {
            name,
            source,
            exprs: analyzed.exprs,
            root: analyzed.root,
            optimized_exprs: analyzed.optimized_exprs,
            optimized_root: analyzed.optimized_root,
            variables: analyzed.variables,
            compiled,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The query string this query was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Printed form of the parsed expression.
    pub fn expression(&self) -> String {
        self.exprs.display(self.root).to_string()
    }

    /// Printed form of the optimized expression actually compiled.
    pub fn optimized_expression(&self) -> String {
        self.optimized_exprs.display(self.optimized_root).to_string()
    }

    /// Ordered variable names; inputs to `eval` are bound positionally in
    /// this order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Evaluates the query into `output`.
    ///
    /// `inputs` must hold one entry per variable, in [`Query::variables`]
    /// order. `None` entries are resolved according to the context's
    /// [`MissingPolicy`]. Returns the output popcount when the context
    /// requests it, [`UNKNOWN_POPCOUNT`] otherwise.
    pub fn eval(
        &self,
        ctx: &EvalContext,
        inputs: &[Option<&DenseContainer>],
        output: &mut DenseContainer,
    ) -> Result<i32> {
        if inputs.len() != self.variables.len() {
            return Err(Error::Runtime(format!(
                "query '{}' takes {} input(s), got {}",
                self.name,
                self.variables.len(),
                inputs.len()
            )));
        }

        let mut pointers: SmallVec<[*const BitsetWord; 8]> =
            SmallVec::with_capacity(inputs.len());
        for (name, input) in self.variables.iter().zip(inputs) {
            match input {
                Some(container) => pointers.push(container.as_ptr()),
                None => match ctx.missing_policy() {
                    MissingPolicy::Error => {
                        return Err(Error::Runtime(format!(
                            "missing input for variable '{name}'"
                        )))
                    }
                    MissingPolicy::ReplaceWithEmpty => pointers.push(EMPTY.as_ptr()),
                    MissingPolicy::ReplaceWithFull => pointers.push(FULL.as_ptr()),
                },
            }
        }

        Ok(if ctx.popcount() {
            unsafe { self.compiled.call_popcount(pointers.as_ptr(), output.as_mut_ptr()) }
        } else {
            unsafe { self.compiled.call(pointers.as_ptr(), output.as_mut_ptr()) };
            UNKNOWN_POPCOUNT
        })
    }

    /// Fast path skipping the length check and missing-input handling.
    ///
    /// # Safety
    ///
    /// `inputs` must hold exactly one container per variable, in
    /// [`Query::variables`] order.
    pub unsafe fn eval_unchecked(
        &self,
        inputs: &[&DenseContainer],
        output: &mut DenseContainer,
        popcount: bool,
    ) -> i32 {
        let pointers: SmallVec<[*const BitsetWord; 8]> =
            inputs.iter().map(|c| c.as_ptr()).collect();
        if popcount {
            unsafe { self.compiled.call_popcount(pointers.as_ptr(), output.as_mut_ptr()) }
        } else {
            unsafe { self.compiled.call(pointers.as_ptr(), output.as_mut_ptr()) };
            UNKNOWN_POPCOUNT
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        assert!(validate_name("a").is_ok());
        assert!(validate_name("0day").is_ok());
        assert!(validate_name("snake_case_2").is_ok());

        for bad in ["", "_a", "^x", "a^", "has space", "has-dash"] {
            assert!(
                matches!(validate_name(bad), Err(Error::Compiler(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_analyze_rejects_bad_queries() {
        for bad in ["", "a !^ b", "a b", "()", "(a"] {
            assert!(
                matches!(analyze("q", bad), Err(Error::Parser(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_analyze_keeps_parsed_variables() {
        // `a ^ a` folds to `$0`, but the eval ABI still takes `a`.
        let analyzed = analyze("q", "a ^ a").unwrap();
        assert_eq!(analyzed.variables, ["a"]);
        assert_eq!(
            analyzed
                .optimized_exprs
                .display(analyzed.optimized_root)
                .to_string(),
            "$0"
        );
    }
}
