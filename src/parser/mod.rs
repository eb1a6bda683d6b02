// src/parser/mod.rs
//! Rule tree input
//!
//! Converts JSON rule text or an already-parsed `serde_json::Value` into a
//! validated [`RuleNode`] tree.

pub mod ast;
pub mod parser;

use crate::CompilationError;
pub use ast::RuleNode;
pub use parser::from_json;

/// Parse JSON rule text into a rule tree
pub fn parse(source: &str) -> Result<RuleNode, CompilationError> {
    let json: serde_json::Value = serde_json::from_str(source)?;
    from_json(&json)
}
