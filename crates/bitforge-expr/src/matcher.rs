//! Composable predicates over expressions.
//!
//! Matchers are the substrate of the optimizer: cheap, stateless objects that
//! answer whether a node has a given shape. They compose through
//! [`OperandMatcher`] (lift a matcher onto an operator's operands) and
//! [`ChainMatcher`] (combine several matchers over the same node).

use crate::expr::{ExprBuilder, ExprId, ExprKind, ExprType};

/// A predicate over an expression node.
pub trait Matcher {
    fn matches(&self, builder: &ExprBuilder, id: ExprId) -> bool;
}

/// Combination mode for matchers over more than one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// At least one target must match.
    Any,
    /// All targets must match.
    All,
}

/// Matches nodes whose tag is in a set of [`ExprType`]s.
///
/// The set is an 8-bit mask indexed by tag discriminant.
#[derive(Debug, Clone, Copy)]
pub struct TypeMatcher {
    mask: u8,
}

impl TypeMatcher {
    pub const fn new(types: &[ExprType]) -> Self {
        let mut mask = 0u8;
        let mut i = 0;
        while i < types.len() {
            mask |= 1 << types[i] as u8;
            i += 1;
        }
        Self { mask }
    }
}

impl Matcher for TypeMatcher {
    fn matches(&self, builder: &ExprBuilder, id: ExprId) -> bool {
        self.mask & (1 << builder.kind(id).ty() as u8) != 0
    }
}

/// Applies an inner matcher to an operator's operand(s).
///
/// For `Not` the single operand decides. For binaries the mode decides
/// whether one (`Any`) or both (`All`) operands must match, short-circuiting
/// on the left operand. Leaves never match.
pub struct OperandMatcher<M> {
    inner: M,
    mode: MatchMode,
}

impl<M: Matcher> OperandMatcher<M> {
    pub fn new(inner: M, mode: MatchMode) -> Self {
        Self { inner, mode }
    }

    /// Shorthand for the common `Any` mode.
    pub fn any(inner: M) -> Self {
        Self::new(inner, MatchMode::Any)
    }
}

impl<M: Matcher> Matcher for OperandMatcher<M> {
    fn matches(&self, builder: &ExprBuilder, id: ExprId) -> bool {
        match *builder.kind(id) {
            ExprKind::Not(operand) => self.inner.matches(builder, operand),
            ExprKind::And(l, r) | ExprKind::Or(l, r) | ExprKind::Xor(l, r) => {
                let left = self.inner.matches(builder, l);
                match self.mode {
                    MatchMode::Any if left => true,
                    MatchMode::All if !left => false,
                    _ => self.inner.matches(builder, r),
                }
            }
            _ => false,
        }
    }
}

/// Applies a list of matchers to the same node, combined per mode with
/// short-circuiting: `All` is a conjunction, `Any` a disjunction.
///
/// An empty `All` chain matches everything; an empty `Any` chain matches
/// nothing.
pub struct ChainMatcher<'a> {
    matchers: Vec<&'a dyn Matcher>,
    mode: MatchMode,
}

impl<'a> ChainMatcher<'a> {
    pub fn new(matchers: Vec<&'a dyn Matcher>, mode: MatchMode) -> Self {
        Self { matchers, mode }
    }
}

impl Matcher for ChainMatcher<'_> {
    fn matches(&self, builder: &ExprBuilder, id: ExprId) -> bool {
        match self.mode {
            MatchMode::All => self.matchers.iter().all(|m| m.matches(builder, id)),
            MatchMode::Any => self.matchers.iter().any(|m| m.matches(builder, id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LITERAL: TypeMatcher = TypeMatcher::new(&[ExprType::EmptyLiteral, ExprType::FullLiteral]);
    const NOT: TypeMatcher = TypeMatcher::new(&[ExprType::Not]);

    #[test]
    fn test_type_matcher() {
        let mut b = ExprBuilder::new();
        let v = b.variable("a");
        let n = b.not(v);

        assert!(LITERAL.matches(&b, b.empty()));
        assert!(LITERAL.matches(&b, b.full()));
        assert!(!LITERAL.matches(&b, v));
        assert!(!LITERAL.matches(&b, n));
        assert!(NOT.matches(&b, n));
    }

    #[test]
    fn test_operand_matcher_unary() {
        let mut b = ExprBuilder::new();
        let e = b.empty();
        let not_lit = b.not(e);
        let v = b.variable("a");
        let not_var = b.not(v);

        let m = OperandMatcher::any(LITERAL);
        assert!(m.matches(&b, not_lit));
        assert!(!m.matches(&b, not_var));
    }

    #[test]
    fn test_operand_matcher_binary_modes() {
        let mut b = ExprBuilder::new();
        let v = b.variable("a");
        let e = b.empty();
        let mixed = b.and(v, e);
        let both = b.or(e, e);
        let neither = b.xor(v, v);

        let any = OperandMatcher::new(LITERAL, MatchMode::Any);
        let all = OperandMatcher::new(LITERAL, MatchMode::All);

        assert!(any.matches(&b, mixed));
        assert!(any.matches(&b, both));
        assert!(!any.matches(&b, neither));

        assert!(!all.matches(&b, mixed));
        assert!(all.matches(&b, both));
        assert!(!all.matches(&b, neither));
    }

    #[test]
    fn test_operand_matcher_rejects_leaves() {
        let mut b = ExprBuilder::new();
        let v = b.variable("a");
        let m = OperandMatcher::any(LITERAL);
        assert!(!m.matches(&b, v));
        assert!(!m.matches(&b, b.empty()));
    }

    #[test]
    fn test_chain_matcher() {
        let mut b = ExprBuilder::new();
        let e = b.empty();
        let not_lit = b.not(e);
        let v = b.variable("a");
        let not_var = b.not(v);

        let operand_lit = OperandMatcher::any(LITERAL);
        let all: Vec<&dyn Matcher> = vec![&NOT, &operand_lit];
        let chain = ChainMatcher::new(all, MatchMode::All);
        assert!(chain.matches(&b, not_lit));
        assert!(!chain.matches(&b, not_var));
        assert!(!chain.matches(&b, e));

        let any: Vec<&dyn Matcher> = vec![&NOT, &LITERAL];
        let either = ChainMatcher::new(any, MatchMode::Any);
        assert!(either.matches(&b, not_var));
        assert!(either.matches(&b, e));
        assert!(!either.matches(&b, v));
    }

    #[test]
    fn test_empty_chain_laws() {
        let b = ExprBuilder::new();
        let all = ChainMatcher::new(vec![], MatchMode::All);
        let any = ChainMatcher::new(vec![], MatchMode::Any);
        assert!(all.matches(&b, b.empty()));
        assert!(!any.matches(&b, b.empty()));
    }
}
