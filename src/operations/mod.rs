// src/operations/mod.rs
//! Operator catalog: the closed set of builtin operators plus the extension
//! operators a caller registers for one compile call.

pub mod extra;

use crate::runtime::support::LogSink;
use crate::Value;
use ahash::HashMap;
use std::fmt;
use std::sync::Arc;

/// Error type extension operators may fail with. It reaches the evaluator's
/// caller untouched, wrapped in [`ExecutionError::Operation`](crate::ExecutionError).
pub type OperationError = Box<dyn std::error::Error + Send + Sync>;

/// A caller-supplied operator implementation.
pub type Operation = Arc<dyn Fn(&[Value]) -> Result<Value, OperationError> + Send + Sync>;

/// Builtin operators, keyed by their rule spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Data access
    Var,
    Missing,
    MissingSome,

    // Boolean
    If,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Not,
    NotNot,
    And,
    Or,

    // Numeric
    Gt,
    Gte,
    Lt,
    Lte,
    Max,
    Min,
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Array
    Map,
    Filter,
    Reduce,
    AllOf,
    NoneOf,
    SomeOf,
    Merge,
    In,

    // String
    Cat,
    Substr,

    // Misc
    Log,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        let builtin = match name {
            "var" => Builtin::Var,
            "missing" => Builtin::Missing,
            "missing_some" => Builtin::MissingSome,
            "if" | "?:" => Builtin::If,
            "==" => Builtin::Eq,
            "===" => Builtin::StrictEq,
            "!=" => Builtin::Ne,
            "!==" => Builtin::StrictNe,
            "!" => Builtin::Not,
            "!!" => Builtin::NotNot,
            "and" => Builtin::And,
            "or" => Builtin::Or,
            ">" => Builtin::Gt,
            ">=" => Builtin::Gte,
            "<" => Builtin::Lt,
            "<=" => Builtin::Lte,
            "max" => Builtin::Max,
            "min" => Builtin::Min,
            "+" => Builtin::Add,
            "-" => Builtin::Sub,
            "*" => Builtin::Mul,
            "/" => Builtin::Div,
            "%" => Builtin::Mod,
            "map" => Builtin::Map,
            "filter" => Builtin::Filter,
            "reduce" => Builtin::Reduce,
            "all" => Builtin::AllOf,
            "none" => Builtin::NoneOf,
            "some" => Builtin::SomeOf,
            "merge" => Builtin::Merge,
            "in" => Builtin::In,
            "cat" => Builtin::Cat,
            "substr" => Builtin::Substr,
            "log" => Builtin::Log,
            _ => return None,
        };
        Some(builtin)
    }

    /// Canonical spelling (`?:` reports as `if`).
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Var => "var",
            Builtin::Missing => "missing",
            Builtin::MissingSome => "missing_some",
            Builtin::If => "if",
            Builtin::Eq => "==",
            Builtin::StrictEq => "===",
            Builtin::Ne => "!=",
            Builtin::StrictNe => "!==",
            Builtin::Not => "!",
            Builtin::NotNot => "!!",
            Builtin::And => "and",
            Builtin::Or => "or",
            Builtin::Gt => ">",
            Builtin::Gte => ">=",
            Builtin::Lt => "<",
            Builtin::Lte => "<=",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Add => "+",
            Builtin::Sub => "-",
            Builtin::Mul => "*",
            Builtin::Div => "/",
            Builtin::Mod => "%",
            Builtin::Map => "map",
            Builtin::Filter => "filter",
            Builtin::Reduce => "reduce",
            Builtin::AllOf => "all",
            Builtin::NoneOf => "none",
            Builtin::SomeOf => "some",
            Builtin::Merge => "merge",
            Builtin::In => "in",
            Builtin::Cat => "cat",
            Builtin::Substr => "substr",
            Builtin::Log => "log",
        }
    }
}

/// What an operator key resolves to within one compile call
#[derive(Clone, Copy)]
pub enum CatalogEntry<'a> {
    Builtin(Builtin),
    Extension(&'a Operation),
}

/// Options for one compile call
///
/// # Example
///
/// ```rust
/// use json_logic_compiler::{Options, Value};
///
/// let options = Options::new()
///     .with_operation("double", |args: &[Value]| {
///         Ok(Value::from_f64(args[0].to_number() * 2.0))
///     });
/// assert!(options.operations.contains_key("double"));
/// ```
#[derive(Clone, Default)]
pub struct Options {
    /// Extension operators by rule key. These shadow builtins of the same name.
    pub operations: HashMap<String, Operation>,

    /// Receives values passed to `log`. Defaults to a `tracing` event.
    pub log_sink: Option<LogSink>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation<F>(mut self, name: impl Into<String>, operation: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, OperationError> + Send + Sync + 'static,
    {
        self.operations.insert(name.into(), Arc::new(operation));
        self
    }

    pub fn with_operations<I, K>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = (K, Operation)>,
        K: Into<String>,
    {
        self.operations
            .extend(operations.into_iter().map(|(name, op)| (name.into(), op)));
        self
    }

    pub fn with_log_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    /// Resolve an operator key: extension first, builtin fallback.
    pub fn lookup(&self, key: &str) -> Option<CatalogEntry<'_>> {
        match self.operations.get(key) {
            Some(operation) => Some(CatalogEntry::Extension(operation)),
            None => Builtin::from_name(key).map(CatalogEntry::Builtin),
        }
    }

    /// The builtin a key names, unless an extension shadows it.
    pub fn builtin(&self, key: &str) -> Option<Builtin> {
        match self.lookup(key)? {
            CatalogEntry::Builtin(builtin) => Some(builtin),
            CatalogEntry::Extension(_) => None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Options")
            .field("operations", &names)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}
