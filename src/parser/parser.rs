// src/parser/parser.rs
//! Builds a rule tree from JSON, validating operation nodes on the way

use super::ast::RuleNode;
use crate::{CompilationError, Value};

/// Convert a JSON value into a rule tree.
///
/// Every object in the input is an operation and must have exactly one key;
/// the first object that does not fails with [`CompilationError::MalformedNode`].
pub fn from_json(json: &serde_json::Value) -> Result<RuleNode, CompilationError> {
    match json {
        serde_json::Value::Array(items) => {
            let nodes = items.iter().map(from_json).collect::<Result<Vec<_>, _>>()?;
            Ok(RuleNode::List(nodes))
        }

        serde_json::Value::Object(map) => {
            let mut entries = map.iter();
            match (entries.next(), entries.next()) {
                (Some((key, args)), None) => Ok(RuleNode::Operation {
                    key: key.clone(),
                    args: Box::new(from_json(args)?),
                }),
                _ => Err(CompilationError::MalformedNode {
                    rule: json.to_string(),
                }),
            }
        }

        scalar => Ok(RuleNode::Literal(Value::from(scalar))),
    }
}
