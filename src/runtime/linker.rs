// src/runtime/linker.rs
//! Linker: binds a compiled rule to the callables it references

use crate::compiler::bytecode::Instruction;
use crate::compiler::{self, CompiledRule};
use crate::operations::{Operation, Options};
use crate::runtime::context::ExecutionContext;
use crate::runtime::support::{Support, SupportTable};
use crate::runtime::vm::VM;
use crate::{parser, CompilationError, ExecutionError, Value};
use std::fmt;
use std::sync::Arc;

struct Program {
    code: Vec<Instruction>,
    support: SupportTable,
    /// Extension operators indexed by slot
    operations: Vec<Operation>,
    identifiers: Vec<String>,
}

/// An invocable rule
///
/// Cheap to clone and safe to share across threads. Evaluation is reentrant
/// as long as the extension operators it calls are.
#[derive(Clone)]
pub struct Evaluator {
    program: Arc<Program>,
}

/// Attach the support routines and extension operators `compiled` refers to.
pub fn link(compiled: &CompiledRule) -> Evaluator {
    let mut support = SupportTable::default();
    for routine in &compiled.support {
        support.attach(*routine, routine.routine(compiled.log_sink.as_ref()));
    }

    // Slot order is the binding order chosen by the compiler
    let operations = compiled
        .operations
        .iter()
        .map(|binding| Arc::clone(&binding.operation))
        .collect();
    let identifiers: Vec<String> = compiled.identifiers().map(str::to_string).collect();

    tracing::debug!(
        support = ?support,
        operations = ?identifiers,
        "linked evaluator"
    );

    Evaluator {
        program: Arc::new(Program {
            code: compiled.code.clone(),
            support,
            operations,
            identifiers,
        }),
    }
}

impl Evaluator {
    /// Parse, compile and link JSON rule text
    ///
    /// # Example
    ///
    /// ```rust
    /// use json_logic_compiler::{Evaluator, Options, Value};
    /// use serde_json::json;
    ///
    /// let evaluator = Evaluator::from_json_str(r#"{"<": [{"var": "age"}, 18]}"#, &Options::new()).unwrap();
    /// let result = evaluator.evaluate_json(&json!({"age": 12})).unwrap();
    /// assert_eq!(result, json!(true));
    /// ```
    pub fn from_json_str(rule: &str, options: &Options) -> Result<Self, CompilationError> {
        let node = parser::parse(rule)?;
        let compiled = compiler::compile_node(&node, options)?;
        Ok(link(&compiled))
    }

    /// Evaluate the rule against one input record
    pub fn evaluate(&self, record: &Value) -> Result<Value, ExecutionError> {
        let program = &self.program;
        let mut ctx = ExecutionContext::new(record);
        VM::new(&program.support, &program.operations).execute(&program.code, &mut ctx)?;
        ctx.pop()
    }

    /// Evaluate against a `serde_json` record, returning plain JSON
    pub fn evaluate_json(
        &self,
        record: &serde_json::Value,
    ) -> Result<serde_json::Value, ExecutionError> {
        let record = Value::from(record);
        self.evaluate(&record).map(serde_json::Value::from)
    }

    /// Support routines attached to this evaluator
    pub fn linked_support(&self) -> Vec<Support> {
        self.program.support.linked().collect()
    }

    /// Identifiers of the bound extension operators, in slot order
    pub fn identifiers(&self) -> &[String] {
        &self.program.identifiers
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("instructions", &self.program.code.len())
            .field("support", &self.program.support)
            .field("operations", &self.program.identifiers)
            .finish()
    }
}
