// src/compiler/mod.rs
//! Compiler that converts rule trees to bytecode

pub mod analyzer;
pub mod bytecode;
pub mod compiler;
pub mod names;

use crate::operations::Options;
use crate::parser::{self, RuleNode};
use crate::runtime::support::{LogSink, Support};
use crate::CompilationError;
use bytecode::Instruction;
use compiler::{Compiler, OperationBinding};
use std::collections::BTreeSet;
use std::fmt;

/// A compiled rule ready for linking
///
/// Holds no reference to the rule tree or to compiler state.
#[derive(Clone)]
pub struct CompiledRule {
    pub code: Vec<Instruction>,

    /// Support routines the code calls. Only these get linked.
    pub support: BTreeSet<Support>,

    /// Extension operators the code calls, indexed by slot
    pub operations: Vec<OperationBinding>,

    /// Sink for the `log` operator, taken from the compile options
    pub log_sink: Option<LogSink>,
}

impl CompiledRule {
    /// Human-readable program text: the support routines and extension
    /// bindings it needs, followed by the instruction listing.
    pub fn source(&self) -> String {
        self.to_string()
    }

    /// Identifiers of the referenced extension operators, in slot order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|b| b.identifier.as_str())
    }
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.support.is_empty() {
            let names: Vec<&str> = self.support.iter().map(|s| s.name()).collect();
            writeln!(f, "; support: {}", names.join(", "))?;
        }
        for (slot, binding) in self.operations.iter().enumerate() {
            writeln!(f, "; #{} {} = {:?}", slot, binding.identifier, binding.key)?;
        }
        bytecode::write_listing(f, &self.code, 0)
    }
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("code", &self.code)
            .field("support", &self.support)
            .field("operations", &self.identifiers().collect::<Vec<_>>())
            .finish()
    }
}

/// Compile a JSON rule
pub fn compile(rule: &serde_json::Value, options: &Options) -> Result<CompiledRule, CompilationError> {
    let node = parser::from_json(rule)?;
    compile_node(&node, options)
}

/// Compile an already-built rule tree
pub fn compile_node(rule: &RuleNode, options: &Options) -> Result<CompiledRule, CompilationError> {
    let output = Compiler::new(options).compile_rule(rule)?;

    tracing::debug!(
        instructions = output.code.len(),
        support = ?output.support,
        operations = output.operations.len(),
        "compiled rule"
    );

    Ok(CompiledRule {
        code: output.code,
        support: output.support,
        operations: output.operations,
        log_sink: options.log_sink.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use serde_json::json;

    #[test]
    fn test_source_lists_only_referenced_support() {
        let compiled = compile(&json!({"substr": [{"var": "s"}, 1]}), &Options::new()).unwrap();
        let source = compiled.source();

        assert!(source.starts_with("; support: substr\n"));
        assert!(!source.contains("truthy"));
        assert!(source.ends_with("0002 call substr/2\n"));
    }

    #[test]
    fn test_source_lists_extension_bindings() {
        let options = Options::new().with_operation("is-nan", |_: &[Value]| Ok(Value::Null));
        let compiled = compile(&json!({"is-nan": "x"}), &options).unwrap();

        assert!(compiled.source().contains("; #0 isNan = \"is-nan\"\n"));
        assert_eq!(compiled.identifiers().collect::<Vec<_>>(), vec!["isNan"]);
    }

    #[test]
    fn test_display_matches_source() {
        let compiled = compile(&json!({"if": [{"var": "a"}, 1, 2]}), &Options::new()).unwrap();
        let shown = format!("{}", compiled);

        assert_eq!(shown, compiled.source());
        assert!(shown.contains("jump_if_false"));
    }

    #[test]
    fn test_compiles_are_independent() {
        let options = Options::new()
            .with_operation("a-b", |_: &[Value]| Ok(Value::Null))
            .with_operation("aB", |_: &[Value]| Ok(Value::Null));

        let first = compile(&json!({"aB": []}), &options).unwrap();
        let second = compile(&json!({"a-b": []}), &options).unwrap();
        assert_eq!(first.identifiers().collect::<Vec<_>>(), vec!["aB"]);
        assert_eq!(second.identifiers().collect::<Vec<_>>(), vec!["aB"]);
    }
}
