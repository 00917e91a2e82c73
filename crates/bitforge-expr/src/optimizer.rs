//! Algebraic simplification of query expressions.
//!
//! The optimizer owns its own arena: `optimize` deep-copies the input tree
//! and rewrites it bottom-up, children before parents. At each node the
//! enabled passes run in a fixed order until none of them fires, so a single
//! sweep is idempotent even when a rewrite manufactures a new foldable node
//! (`$1 ^ $1` becomes `!$1`, which constant folding then closes to `$0`).
//!
//! A pass that does not apply returns the no-op sentinel (`None`) and the
//! node is left unchanged; optimizer misses are never errors.

use std::ops::BitOr;

use crate::expr::{ExprBuilder, ExprId, ExprKind, ExprType};
use crate::matcher::{ChainMatcher, MatchMode, Matcher, OperandMatcher, TypeMatcher};

const LITERAL: TypeMatcher = TypeMatcher::new(&[ExprType::EmptyLiteral, ExprType::FullLiteral]);
const NOT: TypeMatcher = TypeMatcher::new(&[ExprType::Not]);
const BINARY: TypeMatcher = TypeMatcher::new(&[ExprType::And, ExprType::Or, ExprType::Xor]);

/// Bit-set selecting which optimization passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerFlags(u32);

impl OptimizerFlags {
    pub const NONE: Self = Self(0);
    pub const CONSTANT_FOLDING: Self = Self(1 << 0);
    pub const SAME_OPERAND_FOLDING: Self = Self(1 << 1);
    pub const NOT_CHAIN_FOLDING: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OptimizerFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for OptimizerFlags {
    fn default() -> Self {
        Self::ALL
    }
}

/// A rewrite gated by a matcher.
///
/// `rewrite` returns the replacement node, or `None` when the rewrite does
/// not apply; `apply` folds the two together so a miss leaves the node as-is.
trait OptimizationPass {
    fn matches(&self, builder: &ExprBuilder, id: ExprId) -> bool;

    fn rewrite(&self, builder: &mut ExprBuilder, id: ExprId) -> Option<ExprId>;

    fn apply(&self, builder: &mut ExprBuilder, id: ExprId) -> ExprId {
        if !self.matches(builder, id) {
            return id;
        }
        self.rewrite(builder, id).unwrap_or(id)
    }
}

/// `!$0 -> $1`, `!$1 -> $0`, and the binary identities:
/// `$0 & e -> $0`, `$1 & e -> e`, `$0 | e -> e`, `$1 | e -> $1`,
/// `$0 ^ e -> e`, `$1 ^ e -> !e` (all symmetric).
struct ConstantFolding;

impl OptimizationPass for ConstantFolding {
    fn matches(&self, builder: &ExprBuilder, id: ExprId) -> bool {
        OperandMatcher::any(LITERAL).matches(builder, id)
    }

    fn rewrite(&self, builder: &mut ExprBuilder, id: ExprId) -> Option<ExprId> {
        // First element of the pair is the literal operand.
        fn unpack_literal(
            builder: &ExprBuilder,
            l: ExprId,
            r: ExprId,
        ) -> Option<(ExprId, ExprId)> {
            if builder.kind(l).is_literal() {
                Some((l, r))
            } else if builder.kind(r).is_literal() {
                Some((r, l))
            } else {
                None
            }
        }

        fn is_empty_literal(builder: &ExprBuilder, id: ExprId) -> bool {
            matches!(builder.kind(id), ExprKind::EmptyLiteral)
        }

        // The node's shape is copied out so the arms can append new nodes.
        let kind = builder.kind(id).clone();
        match kind {
            ExprKind::Not(operand) => match builder.kind(operand) {
                ExprKind::EmptyLiteral => Some(builder.full()),
                ExprKind::FullLiteral => Some(builder.empty()),
                _ => None,
            },
            ExprKind::And(l, r) => {
                let (literal, other) = unpack_literal(builder, l, r)?;
                if is_empty_literal(builder, literal) {
                    Some(builder.empty())
                } else {
                    Some(other)
                }
            }
            ExprKind::Or(l, r) => {
                let (literal, other) = unpack_literal(builder, l, r)?;
                if is_empty_literal(builder, literal) {
                    Some(other)
                } else {
                    Some(builder.full())
                }
            }
            ExprKind::Xor(l, r) => {
                let (literal, other) = unpack_literal(builder, l, r)?;
                if is_empty_literal(builder, literal) {
                    Some(other)
                } else {
                    Some(builder.not(other))
                }
            }
            _ => None,
        }
    }
}

/// `e & e -> e`, `e | e -> e`, `e ^ e -> $0`, by structural equality.
struct SameOperandFolding;

impl OptimizationPass for SameOperandFolding {
    fn matches(&self, builder: &ExprBuilder, id: ExprId) -> bool {
        BINARY.matches(builder, id)
            && builder
                .kind(id)
                .binary_operands()
                .is_some_and(|(l, r)| builder.expr_eq(l, builder, r))
    }

    fn rewrite(&self, builder: &mut ExprBuilder, id: ExprId) -> Option<ExprId> {
        match *builder.kind(id) {
            ExprKind::And(l, _) | ExprKind::Or(l, _) => Some(l),
            ExprKind::Xor(..) => Some(builder.empty()),
            _ => None,
        }
    }
}

/// Collapses `!!...!e` to `e` or `!e` depending on chain parity.
struct NotChainFolding;

impl OptimizationPass for NotChainFolding {
    fn matches(&self, builder: &ExprBuilder, id: ExprId) -> bool {
        let not_operand = OperandMatcher::any(NOT);
        let matchers: Vec<&dyn Matcher> = vec![&NOT, &not_operand];
        ChainMatcher::new(matchers, MatchMode::All).matches(builder, id)
    }

    fn rewrite(&self, builder: &mut ExprBuilder, id: ExprId) -> Option<ExprId> {
        let ExprKind::Not(mut operand) = *builder.kind(id) else {
            return None;
        };
        let mut count = 1usize;
        while let ExprKind::Not(inner) = *builder.kind(operand) {
            count += 1;
            operand = inner;
        }
        if count % 2 == 0 {
            Some(operand)
        } else {
            Some(builder.not(operand))
        }
    }
}

/// Bottom-up expression optimizer.
///
/// Owns the arena the optimized tree lives in; the returned [`ExprId`]
/// refers into [`Optimizer::builder`].
pub struct Optimizer {
    builder: ExprBuilder,
    flags: OptimizerFlags,
}

impl Optimizer {
    pub fn new(flags: OptimizerFlags) -> Self {
        Self {
            builder: ExprBuilder::new(),
            flags,
        }
    }

    pub fn flags(&self) -> OptimizerFlags {
        self.flags
    }

    /// Arena holding the optimized trees.
    pub fn builder(&self) -> &ExprBuilder {
        &self.builder
    }

    pub fn into_builder(self) -> ExprBuilder {
        self.builder
    }

    /// Copies the tree rooted at `root` out of `src` and simplifies it,
    /// returning the new root inside this optimizer's arena.
    pub fn optimize(&mut self, src: &ExprBuilder, root: ExprId) -> ExprId {
        match *src.kind(root) {
            ExprKind::EmptyLiteral => self.builder.empty(),
            ExprKind::FullLiteral => self.builder.full(),
            ExprKind::Variable(ref name) => {
                let name = name.clone();
                self.builder.variable(name)
            }
            ExprKind::Not(operand) => {
                let operand = self.optimize(src, operand);
                let id = self.builder.not(operand);
                self.apply_passes(id)
            }
            ExprKind::And(l, r) => {
                let (l, r) = (self.optimize(src, l), self.optimize(src, r));
                let id = self.builder.and(l, r);
                self.apply_passes(id)
            }
            ExprKind::Or(l, r) => {
                let (l, r) = (self.optimize(src, l), self.optimize(src, r));
                let id = self.builder.or(l, r);
                self.apply_passes(id)
            }
            ExprKind::Xor(l, r) => {
                let (l, r) = (self.optimize(src, l), self.optimize(src, r));
                let id = self.builder.xor(l, r);
                self.apply_passes(id)
            }
        }
    }

    // Runs the enabled passes in fixed order until none of them fires.
    // Every rewrite strictly shrinks the tree, so this terminates.
    fn apply_passes(&mut self, id: ExprId) -> ExprId {
        let passes: [(&dyn OptimizationPass, OptimizerFlags); 3] = [
            (&ConstantFolding, OptimizerFlags::CONSTANT_FOLDING),
            (&SameOperandFolding, OptimizerFlags::SAME_OPERAND_FOLDING),
            (&NotChainFolding, OptimizerFlags::NOT_CHAIN_FOLDING),
        ];

        let mut current = id;
        loop {
            let mut changed = false;
            for (pass, flag) in passes {
                if !self.flags.contains(flag) {
                    continue;
                }
                let next = pass.apply(&mut self.builder, current);
                if next != current {
                    current = next;
                    changed = true;
                }
            }
            if !changed {
                return current;
            }
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerFlags::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn optimize_with(flags: OptimizerFlags, query: &str) -> String {
        let mut builder = ExprBuilder::new();
        let root = parse(query, &mut builder).unwrap();
        let mut optimizer = Optimizer::new(flags);
        let optimized = optimizer.optimize(&builder, root);
        optimizer.builder().display(optimized).to_string()
    }

    fn optimize(query: &str) -> String {
        optimize_with(OptimizerFlags::ALL, query)
    }

    #[test]
    fn test_constant_folding() {
        let cf = OptimizerFlags::CONSTANT_FOLDING;
        assert_eq!(optimize_with(cf, "!$1"), "$0");
        assert_eq!(optimize_with(cf, "!$0"), "$1");
        assert_eq!(optimize_with(cf, "!a"), "!a");

        assert_eq!(optimize_with(cf, "$1 & $0"), "$0");
        assert_eq!(optimize_with(cf, "a & $0"), "$0");
        assert_eq!(optimize_with(cf, "$1 & a"), "a");
        assert_eq!(optimize_with(cf, "a & b"), "(a & b)");

        assert_eq!(optimize_with(cf, "$1 | $0"), "$1");
        assert_eq!(optimize_with(cf, "a | $0"), "a");
        assert_eq!(optimize_with(cf, "$1 | a"), "$1");
        assert_eq!(optimize_with(cf, "a | b"), "(a | b)");

        assert_eq!(optimize_with(cf, "a ^ $0"), "a");
        assert_eq!(optimize_with(cf, "$1 ^ a"), "!a");
        assert_eq!(optimize_with(cf, "a ^ b"), "(a ^ b)");
    }

    #[test]
    fn test_same_operand_folding() {
        let so = OptimizerFlags::SAME_OPERAND_FOLDING;
        assert_eq!(optimize_with(so, "a & a"), "a");
        assert_eq!(optimize_with(so, "a & b"), "(a & b)");
        assert_eq!(optimize_with(so, "a | a"), "a");
        assert_eq!(optimize_with(so, "a ^ a"), "$0");
        assert_eq!(optimize_with(so, "(a & b) ^ (a & b)"), "$0");
        // Equality is ordered, so this must not fold.
        assert_eq!(optimize_with(so, "(a & b) ^ (b & a)"), "((a & b) ^ (b & a))");
    }

    #[test]
    fn test_not_chain_folding() {
        let nc = OptimizerFlags::NOT_CHAIN_FOLDING;
        assert_eq!(optimize_with(nc, "!a"), "!a");
        assert_eq!(optimize_with(nc, "!!a"), "a");
        assert_eq!(optimize_with(nc, "!!!a"), "!a");
        assert_eq!(optimize_with(nc, "!!!!a"), "a");
        assert_eq!(optimize_with(nc, "!!!!!!!!!!!a"), "!a");
        assert_eq!(optimize_with(nc, "!!!!!!!!!!!!a"), "a");
    }

    #[test]
    fn test_passes_compose_at_a_node() {
        // Constant folding rewrites `$1 ^ $1` to `!$1`; the per-node fixpoint
        // then closes it to `$0` in the same sweep.
        assert_eq!(optimize("$1 ^ $1"), "$0");
        // Same-operand folding feeds constant folding at the parent.
        assert_eq!(optimize("(a & a) | (b ^ b)"), "a");
        // An all-literal query folds to a literal.
        assert_eq!(optimize("($0 | !$0) & $1"), "$1");
    }

    #[test]
    fn test_disabled_passes_leave_tree_alone() {
        assert_eq!(optimize_with(OptimizerFlags::NONE, "!!a"), "!!a");
        assert_eq!(optimize_with(OptimizerFlags::NONE, "a ^ a"), "(a ^ a)");
        assert_eq!(
            optimize_with(OptimizerFlags::CONSTANT_FOLDING, "a & a"),
            "(a & a)"
        );
    }

    #[test]
    fn test_optimize_is_idempotent() {
        for query in [
            "a",
            "!!!!!a",
            "$1 ^ $1",
            "(a & a) | (b ^ b)",
            "(a | b) & (((!a & c) | (d & b)) ^ (!e & b))",
            "!($0 | !!b) ^ (c & c)",
        ] {
            let once = optimize(query);
            assert_eq!(optimize(&once), once, "not idempotent for {query:?}");
        }
    }

    #[test]
    fn test_flags_bitops() {
        let flags = OptimizerFlags::CONSTANT_FOLDING | OptimizerFlags::NOT_CHAIN_FOLDING;
        assert!(flags.contains(OptimizerFlags::CONSTANT_FOLDING));
        assert!(!flags.contains(OptimizerFlags::SAME_OPERAND_FOLDING));
        assert!(OptimizerFlags::ALL.contains(flags));
    }
}
