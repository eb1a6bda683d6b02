// src/lib.rs
//! # JSON Logic Compiler
//!
//! Compiles JSON rule trees (JsonLogic-style boolean, arithmetic, string and
//! array expressions) into evaluators that run a small bytecode program,
//! instead of re-walking the tree on every evaluation. Meant for rules that
//! are evaluated many times against different input records: feature flags,
//! validation, access policy, pricing.
//!
//! ## Example
//!
//! ```rust
//! use json_logic_compiler::{compile_to_evaluator, Options};
//! use serde_json::json;
//!
//! let rule = json!({
//!     "if": [
//!         {"in": [{"var": "user.role"}, ["admin", "owner"]]}, "full",
//!         {"missing": ["user.email"]}, "anonymous",
//!         "limited"
//!     ]
//! });
//!
//! let evaluator = compile_to_evaluator(&rule, &Options::new()).unwrap();
//!
//! let result = evaluator.evaluate_json(&json!({"user": {"role": "owner"}})).unwrap();
//! assert_eq!(result, json!("full"));
//!
//! let result = evaluator.evaluate_json(&json!({"user": {"role": "guest"}})).unwrap();
//! assert_eq!(result, json!("anonymous"));
//! ```
//!
//! Extension operators are registered per compile call:
//!
//! ```rust
//! use json_logic_compiler::{compile, link, Options, Value};
//! use serde_json::json;
//!
//! let options = Options::new().with_operation("is-even", |args: &[Value]| {
//!     Ok(Value::Bool(args[0].to_number() % 2.0 == 0.0))
//! });
//!
//! let compiled = compile(&json!({"filter": [{"var": "n"}, {"is-even": {"var": ""}}]}), &options).unwrap();
//! assert_eq!(compiled.identifiers().collect::<Vec<_>>(), vec!["isEven"]);
//!
//! let evaluator = link(&compiled);
//! let result = evaluator.evaluate_json(&json!({"n": [1, 2, 3, 4]})).unwrap();
//! assert_eq!(result, json!([2, 4]));
//! ```

pub mod compiler;
pub mod operations;
pub mod parser;
pub mod runtime;

use thiserror::Error;

pub use compiler::bytecode::Instruction;
pub use compiler::{compile, compile_node, CompiledRule};
pub use operations::{Operation, OperationError, Options};
pub use parser::RuleNode;
pub use runtime::linker::{link, Evaluator};
pub use runtime::value::Value;

/// Errors that can occur during compilation
///
/// Compilation stops at the first error. `rule` fields hold the JSON text of
/// the offending subrule.
#[derive(Error, Debug)]
pub enum CompilationError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Malformed node, an operation must have exactly one key: {rule}")]
    MalformedNode { rule: String },

    #[error("Unrecognized operator {operator:?}: {rule}")]
    UnrecognizedOperator { operator: String, rule: String },

    #[error("{operator} needs {expected}: {rule}")]
    Arity {
        operator: String,
        expected: &'static str,
        rule: String,
    },

    #[error("Illegal var key: {key}")]
    IllegalVarKey { key: String },
}

/// Errors during rule evaluation
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Support routine {0} is not linked")]
    Unlinked(&'static str),

    #[error("No extension operator bound to slot {0}")]
    UnboundOperation(usize),

    /// Raised by an extension operator, passed through unchanged
    #[error(transparent)]
    Operation(OperationError),
}

/// Compile and link in one step
pub fn compile_to_evaluator(
    rule: &serde_json::Value,
    options: &Options,
) -> Result<Evaluator, CompilationError> {
    let compiled = compile(rule, options)?;
    Ok(link(&compiled))
}
