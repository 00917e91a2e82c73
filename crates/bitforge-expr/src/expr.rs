//! Expression trees for bitmap queries.
//!
//! Expressions are tagged nodes stored in an [`ExprBuilder`] arena and
//! referenced by [`ExprId`] index. The builder exclusively owns every node it
//! produces; nodes stay valid for the builder's lifetime and never move.
//! The `$0` (empty) and `$1` (full) literals are canonical singletons at
//! fixed indices, everything else is appended without deduplication.

use std::fmt;

/// The tag of an expression node.
///
/// Discriminant values index the 8-bit mask used by
/// [`TypeMatcher`](crate::matcher::TypeMatcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExprType {
    EmptyLiteral = 0,
    FullLiteral = 1,
    Variable = 2,
    Not = 3,
    And = 4,
    Or = 5,
    Xor = 6,
}

/// Index of an expression node within its [`ExprBuilder`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// An expression tree node.
///
/// Children are referenced by arena index; a node's operands always live in
/// the same builder as the node itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// The all-zeros bitmap literal, written `$0`.
    EmptyLiteral,
    /// The all-ones bitmap literal, written `$1`.
    FullLiteral,
    /// A named input bitmap.
    Variable(String),
    /// Bitwise complement.
    Not(ExprId),
    /// Bitwise intersection.
    And(ExprId, ExprId),
    /// Bitwise union.
    Or(ExprId, ExprId),
    /// Bitwise symmetric difference.
    Xor(ExprId, ExprId),
}

impl ExprKind {
    pub fn ty(&self) -> ExprType {
        match self {
            ExprKind::EmptyLiteral => ExprType::EmptyLiteral,
            ExprKind::FullLiteral => ExprType::FullLiteral,
            ExprKind::Variable(_) => ExprType::Variable,
            ExprKind::Not(_) => ExprType::Not,
            ExprKind::And(..) => ExprType::And,
            ExprKind::Or(..) => ExprType::Or,
            ExprKind::Xor(..) => ExprType::Xor,
        }
    }

    /// True for `$0` and `$1`.
    pub fn is_literal(&self) -> bool {
        matches!(self, ExprKind::EmptyLiteral | ExprKind::FullLiteral)
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, ExprKind::Variable(_))
    }

    pub fn is_operator(&self) -> bool {
        self.is_unary_operator() || self.is_binary_operator()
    }

    pub fn is_unary_operator(&self) -> bool {
        matches!(self, ExprKind::Not(_))
    }

    pub fn is_binary_operator(&self) -> bool {
        matches!(self, ExprKind::And(..) | ExprKind::Or(..) | ExprKind::Xor(..))
    }

    /// Operands of a binary operator, `None` otherwise.
    pub fn binary_operands(&self) -> Option<(ExprId, ExprId)> {
        match *self {
            ExprKind::And(l, r) | ExprKind::Or(l, r) | ExprKind::Xor(l, r) => Some((l, r)),
            _ => None,
        }
    }
}

/// Arena that owns expression nodes.
///
/// Indices 0 and 1 are reserved for the `$0`/`$1` singletons so repeated
/// literal uses share one node.
#[derive(Debug, Clone)]
pub struct ExprBuilder {
    nodes: Vec<ExprKind>,
}

impl ExprBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![ExprKind::EmptyLiteral, ExprKind::FullLiteral],
        }
    }

    /// The canonical `$0` literal.
    pub fn empty(&self) -> ExprId {
        ExprId(0)
    }

    /// The canonical `$1` literal.
    pub fn full(&self) -> ExprId {
        ExprId(1)
    }

    pub fn variable(&mut self, name: impl Into<String>) -> ExprId {
        let name = name.into();
        debug_assert!(
            !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'),
            "invalid variable name {name:?}"
        );
        self.push(ExprKind::Variable(name))
    }

    pub fn not(&mut self, operand: ExprId) -> ExprId {
        self.push(ExprKind::Not(operand))
    }

    pub fn and(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.push(ExprKind::And(lhs, rhs))
    }

    pub fn or(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.push(ExprKind::Or(lhs, rhs))
    }

    pub fn xor(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.push(ExprKind::Xor(lhs, rhs))
    }

    fn push(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(kind);
        id
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.index()]
    }

    /// Structural, ordered equality between two trees, possibly in different
    /// arenas. `And(a, b)` is not equal to `And(b, a)`.
    pub fn expr_eq(&self, a: ExprId, other: &ExprBuilder, b: ExprId) -> bool {
        match (self.kind(a), other.kind(b)) {
            (ExprKind::EmptyLiteral, ExprKind::EmptyLiteral) => true,
            (ExprKind::FullLiteral, ExprKind::FullLiteral) => true,
            (ExprKind::Variable(x), ExprKind::Variable(y)) => x == y,
            (ExprKind::Not(x), ExprKind::Not(y)) => self.expr_eq(*x, other, *y),
            (ExprKind::And(xl, xr), ExprKind::And(yl, yr))
            | (ExprKind::Or(xl, xr), ExprKind::Or(yl, yr))
            | (ExprKind::Xor(xl, xr), ExprKind::Xor(yl, yr)) => {
                self.expr_eq(*xl, other, *yl) && self.expr_eq(*xr, other, *yr)
            }
            _ => false,
        }
    }

    /// Visits every node of the tree rooted at `root` in left-to-right
    /// post-order: children before their parent, left before right.
    pub fn for_each_post_order(&self, root: ExprId, f: &mut impl FnMut(ExprId)) {
        match *self.kind(root) {
            ExprKind::EmptyLiteral | ExprKind::FullLiteral | ExprKind::Variable(_) => {}
            ExprKind::Not(operand) => self.for_each_post_order(operand, f),
            ExprKind::And(l, r) | ExprKind::Or(l, r) | ExprKind::Xor(l, r) => {
                self.for_each_post_order(l, f);
                self.for_each_post_order(r, f);
            }
        }
        f(root);
    }

    /// Ordered, deduplicated variable names, collected by left-to-right
    /// post-order traversal. This order defines the input ABI of a compiled
    /// query.
    pub fn variables(&self, root: ExprId) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        self.for_each_post_order(root, &mut |id| {
            if let ExprKind::Variable(name) = self.kind(id) {
                if !seen.iter().any(|n| n == name) {
                    seen.push(name.clone());
                }
            }
        });
        seen
    }

    /// Deep-copies the tree rooted at `id` into `target`, returning the new
    /// root. Literal singletons map onto the target's singletons.
    pub fn copy_into(&self, id: ExprId, target: &mut ExprBuilder) -> ExprId {
        match self.kind(id) {
            ExprKind::EmptyLiteral => target.empty(),
            ExprKind::FullLiteral => target.full(),
            ExprKind::Variable(name) => {
                let name = name.clone();
                target.variable(name)
            }
            ExprKind::Not(operand) => {
                let operand = self.copy_into(*operand, target);
                target.not(operand)
            }
            ExprKind::And(l, r) => {
                let (l, r) = (self.copy_into(*l, target), self.copy_into(*r, target));
                target.and(l, r)
            }
            ExprKind::Or(l, r) => {
                let (l, r) = (self.copy_into(*l, target), self.copy_into(*r, target));
                target.or(l, r)
            }
            ExprKind::Xor(l, r) => {
                let (l, r) = (self.copy_into(*l, target), self.copy_into(*r, target));
                target.xor(l, r)
            }
        }
    }

    /// Displayable view of the tree rooted at `id`.
    ///
    /// Literals print as `$0`/`$1`, variables print bare, `Not` prefixes `!`,
    /// and binaries parenthesise: `(a & b)`.
    pub fn display(&self, id: ExprId) -> ExprDisplay<'_> {
        ExprDisplay { builder: self, id }
    }
}

impl Default for ExprBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// See [`ExprBuilder::display`].
pub struct ExprDisplay<'a> {
    builder: &'a ExprBuilder,
    id: ExprId,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.builder;
        match b.kind(self.id) {
            ExprKind::EmptyLiteral => write!(f, "$0"),
            ExprKind::FullLiteral => write!(f, "$1"),
            ExprKind::Variable(name) => write!(f, "{name}"),
            ExprKind::Not(operand) => write!(f, "!{}", b.display(*operand)),
            ExprKind::And(l, r) => write!(f, "({} & {})", b.display(*l), b.display(*r)),
            ExprKind::Or(l, r) => write!(f, "({} | {})", b.display(*l), b.display(*r)),
            ExprKind::Xor(l, r) => write!(f, "({} ^ {})", b.display(*l), b.display(*r)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_singletons() {
        let mut b = ExprBuilder::new();
        assert_eq!(b.empty(), b.empty());
        assert_eq!(b.full(), b.full());
        assert_ne!(b.empty(), b.full());
        // Non-literal nodes are not deduplicated.
        let v1 = b.variable("a");
        let v2 = b.variable("a");
        assert_ne!(v1, v2);
        assert!(b.expr_eq(v1, &b, v2));
    }

    #[test]
    fn test_classification() {
        let mut b = ExprBuilder::new();
        let v = b.variable("a");
        let n = b.not(v);
        let a = b.and(v, n);

        assert!(b.kind(b.empty()).is_literal());
        assert!(b.kind(b.full()).is_literal());
        assert!(b.kind(v).is_variable());
        assert!(!b.kind(v).is_operator());
        assert!(b.kind(n).is_unary_operator());
        assert!(b.kind(n).is_operator());
        assert!(b.kind(a).is_binary_operator());
        assert!(!b.kind(a).is_unary_operator());
    }

    #[test]
    fn test_equality_is_ordered() {
        let mut b = ExprBuilder::new();
        let a = b.variable("a");
        let c = b.variable("b");
        let ab = b.and(a, c);
        let ba = b.and(c, a);
        assert!(!b.expr_eq(ab, &b, ba));
        assert!(b.expr_eq(ab, &b, ab));
    }

    #[test]
    fn test_display() {
        let mut b = ExprBuilder::new();
        let a = b.variable("a");
        let c = b.variable("b");
        let not_a = b.not(a);
        let and = b.and(not_a, c);
        let e = b.empty();
        let or = b.or(and, e);
        assert_eq!(b.display(or).to_string(), "((!a & b) | $0)");
        assert_eq!(b.display(b.full()).to_string(), "$1");
    }

    #[test]
    fn test_variables_post_order_dedup() {
        let mut b = ExprBuilder::new();
        let x = b.variable("x");
        let y = b.variable("y");
        let x2 = b.variable("x");
        let z = b.variable("z");
        // ((x & y) | (x & z))
        let l = b.and(x, y);
        let r = b.and(x2, z);
        let root = b.or(l, r);
        assert_eq!(b.variables(root), ["x", "y", "z"]);
    }

    #[test]
    fn test_post_order_visits_children_first() {
        let mut b = ExprBuilder::new();
        let a = b.variable("a");
        let c = b.variable("b");
        let and = b.and(a, c);
        let root = b.not(and);

        let mut order = Vec::new();
        b.for_each_post_order(root, &mut |id| order.push(id));
        assert_eq!(order, [a, c, and, root]);
    }

    #[test]
    fn test_copy_into() {
        let mut b = ExprBuilder::new();
        let a = b.variable("a");
        let f = b.full();
        let x = b.xor(a, f);
        let root = b.not(x);

        let mut target = ExprBuilder::new();
        let copied = b.copy_into(root, &mut target);
        assert!(b.expr_eq(root, &target, copied));
        assert_eq!(target.display(copied).to_string(), "!(a ^ $1)");
    }
}
