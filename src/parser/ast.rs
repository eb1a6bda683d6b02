// src/parser/ast.rs
//! Rule tree definitions

use crate::Value;
use std::fmt;

/// One node of a rule tree
#[derive(Debug, Clone, PartialEq)]
pub enum RuleNode {
    /// null, boolean, number or string
    Literal(Value),

    /// Explicit "no value" marker. Evaluates to null.
    Undefined,

    /// Evaluated element-wise into an array
    List(Vec<RuleNode>),

    /// Single-key object `{key: args}`
    Operation { key: String, args: Box<RuleNode> },
}

impl RuleNode {
    pub fn literal(value: impl Into<Value>) -> Self {
        RuleNode::Literal(value.into())
    }

    /// Operation with a list of arguments.
    pub fn op(key: impl Into<String>, args: Vec<RuleNode>) -> Self {
        RuleNode::Operation {
            key: key.into(),
            args: Box::new(RuleNode::List(args)),
        }
    }

    /// Operation with a single, non-list argument (`{"var": "a"}`).
    pub fn unary(key: impl Into<String>, arg: RuleNode) -> Self {
        RuleNode::Operation {
            key: key.into(),
            args: Box::new(arg),
        }
    }

    /// Operator key, for operation nodes.
    pub fn op_key(&self) -> Option<&str> {
        match self {
            RuleNode::Operation { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Operation arguments. A non-list argument counts as a one-element list;
    /// non-operation nodes have none.
    pub fn args(&self) -> &[RuleNode] {
        match self {
            RuleNode::Operation { args, .. } => match args.as_ref() {
                RuleNode::List(items) => items,
                single => std::slice::from_ref(single),
            },
            _ => &[],
        }
    }

    /// JSON form of this node. `Undefined` renders as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RuleNode::Literal(value) => value.clone().into(),
            RuleNode::Undefined => serde_json::Value::Null,
            RuleNode::List(items) => {
                serde_json::Value::Array(items.iter().map(RuleNode::to_json).collect())
            }
            RuleNode::Operation { key, args } => {
                let mut map = serde_json::Map::with_capacity(1);
                map.insert(key.clone(), args.to_json());
                serde_json::Value::Object(map)
            }
        }
    }
}

impl fmt::Display for RuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
