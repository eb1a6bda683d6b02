// src/compiler/analyzer.rs
//! Static classifiers over rule subtrees
//!
//! Each classifier answers "is this guaranteed?" by looking at the outermost
//! operator only. A `false` answer means "unknown", never "no": the compiler
//! then keeps the coercion or guard, which costs time but is always correct.
//! A `true` answer lets the compiler drop it, so it must never be wrong.
//!
//! Classification goes through the catalog of the current compile call. A key
//! that an extension operator shadows is opaque, whatever its builtin meaning.

use crate::operations::{Builtin, Options};
use crate::parser::RuleNode;

pub struct Analyzer<'a> {
    options: &'a Options,
}

impl<'a> Analyzer<'a> {
    pub fn new(options: &'a Options) -> Self {
        Self { options }
    }

    /// Builtin this node applies, if it is an unshadowed builtin operation.
    fn builtin(&self, node: &RuleNode) -> Option<Builtin> {
        node.op_key().and_then(|key| self.options.builtin(key))
    }

    /// Whether truthy normalization could differ from plain truthiness for
    /// this node's value. The two only disagree on arrays.
    pub fn may_need_truthy_coercion(&self, node: &RuleNode) -> bool {
        !self.is_statically_non_array(node)
    }

    /// Guaranteed to evaluate to an array.
    pub fn is_statically_array(&self, node: &RuleNode) -> bool {
        match node {
            RuleNode::List(_) => true,
            RuleNode::Operation { .. } => matches!(
                self.builtin(node),
                Some(
                    Builtin::Map
                        | Builtin::Filter
                        | Builtin::Merge
                        | Builtin::Missing
                        | Builtin::MissingSome
                )
            ),
            _ => false,
        }
    }

    /// Guaranteed to evaluate to something other than an array.
    pub fn is_statically_non_array(&self, node: &RuleNode) -> bool {
        match node {
            RuleNode::Literal(_) | RuleNode::Undefined => true,
            RuleNode::List(_) => false,
            RuleNode::Operation { .. } => match self.builtin(node) {
                Some(
                    Builtin::Eq
                    | Builtin::StrictEq
                    | Builtin::Ne
                    | Builtin::StrictNe
                    | Builtin::Not
                    | Builtin::NotNot
                    | Builtin::Gt
                    | Builtin::Gte
                    | Builtin::Lt
                    | Builtin::Lte
                    | Builtin::Max
                    | Builtin::Min
                    | Builtin::Add
                    | Builtin::Sub
                    | Builtin::Mul
                    | Builtin::Div
                    | Builtin::Mod
                    | Builtin::Cat
                    | Builtin::Substr
                    | Builtin::In
                    | Builtin::AllOf
                    | Builtin::NoneOf
                    | Builtin::SomeOf,
                ) => true,
                // The result is one of the operands.
                Some(Builtin::And | Builtin::Or) => node
                    .args()
                    .iter()
                    .all(|arg| self.is_statically_non_array(arg)),
                Some(Builtin::If) => self.if_branches_non_array(node.args()),
                _ => false,
            },
        }
    }

    /// Every value an `if` chain can yield, including the implicit null
    /// when there is no else branch.
    fn if_branches_non_array(&self, args: &[RuleNode]) -> bool {
        if args.len() < 2 {
            return true;
        }
        let mut pairs = args.chunks_exact(2);
        let consequents_ok = pairs
            .by_ref()
            .all(|pair| self.is_statically_non_array(&pair[1]));
        consequents_ok
            && pairs
                .remainder()
                .iter()
                .all(|otherwise| self.is_statically_non_array(otherwise))
    }

    /// Guaranteed to evaluate to a number.
    pub fn is_statically_numeric(&self, node: &RuleNode) -> bool {
        match node {
            RuleNode::Literal(value) => value.is_numeric(),
            RuleNode::Operation { .. } => matches!(
                self.builtin(node),
                Some(
                    Builtin::Add
                        | Builtin::Sub
                        | Builtin::Mul
                        | Builtin::Div
                        | Builtin::Mod
                        | Builtin::Max
                        | Builtin::Min
                )
            ),
            _ => false,
        }
    }
}
