// src/compiler/bytecode.rs
//! Bytecode instructions for the rule VM

use crate::runtime::support::Support;
use crate::Value;
use std::fmt::{self, Write};

/// Binding a data access reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Input record passed to the evaluator
    Arg,
    /// Current element inside `map`, `filter` and the quantifiers
    Item,
    /// `{accumulator, current, index, data}` inside `reduce`
    Context,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Arg => "arg",
            Scope::Item => "item",
            Scope::Context => "context",
        })
    }
}

/// Per-item array operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterKind {
    Map,
    Filter,
    All,
    Some,
    None,
}

impl IterKind {
    /// Result of the guarded form when the source is not an array.
    pub fn fallback(self) -> Value {
        match self {
            IterKind::Map | IterKind::Filter => Value::Array(Vec::new()),
            IterKind::All | IterKind::Some => Value::Bool(false),
            IterKind::None => Value::Bool(true),
        }
    }
}

impl fmt::Display for IterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IterKind::Map => "map",
            IterKind::Filter => "filter",
            IterKind::All => "all",
            IterKind::Some => "some",
            IterKind::None => "none",
        })
    }
}

/// Bytecode instructions executed by the VM
///
/// Jump targets are indices into the enclosing instruction list. Iteration
/// bodies are separate lists with their own targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Stack operations
    Push(Value),
    Pop,
    Dup,
    /// Collect the top n values into an array
    MakeArray(usize),

    // Data access
    Load(Scope),
    /// Null-propagating traversal of a literal path
    LoadPath { scope: Scope, path: Vec<String> },

    // Arithmetic; operands are coerced with ToNumber
    ToNumber,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Max(usize),
    Min(usize),

    // Comparison
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Gt,
    Gte,
    Lt,
    Lte,

    // Logical, plain JavaScript truthiness
    Not,
    ToBool,

    // Control flow
    Jump(usize),
    /// Pop and jump when falsy
    JumpIfFalse(usize),
    /// Pop and jump when truthy
    JumpIfTrue(usize),
    /// Jump if the top value is not null, keeping it; otherwise pop it
    JumpIfPresent(usize),

    // Arrays and strings
    /// Concatenate the top n arrays
    Concat(usize),
    /// Array membership or substring test; pops haystack, then needle
    Includes { guarded: bool },
    /// `String(value)`
    ToText,
    /// Join the top n values with no separator
    Join(usize),

    // Iteration
    Iterate {
        kind: IterKind,
        body: Vec<Instruction>,
        guarded: bool,
    },
    /// Pops the initial value (when seeded), then the source array
    Reduce {
        body: Vec<Instruction>,
        guarded: bool,
        seeded: bool,
        /// Whether the body reads `data`; the array is only bound if so
        with_data: bool,
    },

    // Calls
    CallSupport(Support, usize),
    CallOperation { slot: usize, argc: usize },
}

impl Instruction {
    /// Nested instruction list, for iteration instructions
    pub fn body(&self) -> Option<&[Instruction]> {
        match self {
            Instruction::Iterate { body, .. } | Instruction::Reduce { body, .. } => Some(body),
            _ => None,
        }
    }
}

fn guard(guarded: bool) -> &'static str {
    if guarded {
        " guarded"
    } else {
        ""
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(value) => write!(f, "push {}", value),
            Instruction::Pop => f.write_str("pop"),
            Instruction::Dup => f.write_str("dup"),
            Instruction::MakeArray(n) => write!(f, "make_array {}", n),
            Instruction::Load(scope) => write!(f, "load {}", scope),
            Instruction::LoadPath { scope, path } => {
                write!(f, "load_path {}", scope)?;
                for segment in path {
                    write!(f, " {:?}", segment)?;
                }
                Ok(())
            }
            Instruction::ToNumber => f.write_str("to_number"),
            Instruction::Add => f.write_str("add"),
            Instruction::Sub => f.write_str("sub"),
            Instruction::Mul => f.write_str("mul"),
            Instruction::Div => f.write_str("div"),
            Instruction::Mod => f.write_str("mod"),
            Instruction::Neg => f.write_str("neg"),
            Instruction::Max(n) => write!(f, "max {}", n),
            Instruction::Min(n) => write!(f, "min {}", n),
            Instruction::Eq => f.write_str("eq"),
            Instruction::StrictEq => f.write_str("strict_eq"),
            Instruction::Ne => f.write_str("ne"),
            Instruction::StrictNe => f.write_str("strict_ne"),
            Instruction::Gt => f.write_str("gt"),
            Instruction::Gte => f.write_str("gte"),
            Instruction::Lt => f.write_str("lt"),
            Instruction::Lte => f.write_str("lte"),
            Instruction::Not => f.write_str("not"),
            Instruction::ToBool => f.write_str("to_bool"),
            Instruction::Jump(target) => write!(f, "jump {:04}", target),
            Instruction::JumpIfFalse(target) => write!(f, "jump_if_false {:04}", target),
            Instruction::JumpIfTrue(target) => write!(f, "jump_if_true {:04}", target),
            Instruction::JumpIfPresent(target) => write!(f, "jump_if_present {:04}", target),
            Instruction::Concat(n) => write!(f, "concat {}", n),
            Instruction::Includes { guarded } => write!(f, "includes{}", guard(*guarded)),
            Instruction::ToText => f.write_str("to_text"),
            Instruction::Join(n) => write!(f, "join {}", n),
            Instruction::Iterate { kind, guarded, .. } => write!(f, "{}{}", kind, guard(*guarded)),
            Instruction::Reduce {
                guarded, seeded, ..
            } => {
                write!(f, "reduce{}", guard(*guarded))?;
                if *seeded {
                    f.write_str(" seeded")?;
                }
                Ok(())
            }
            Instruction::CallSupport(support, argc) => write!(f, "call {}/{}", support, argc),
            Instruction::CallOperation { slot, argc } => write!(f, "call_op #{}/{}", slot, argc),
        }
    }
}

/// Render instructions one per line, iteration bodies indented below their
/// instruction.
pub fn write_listing<W: fmt::Write>(out: &mut W, code: &[Instruction], depth: usize) -> fmt::Result {
    for (pc, instruction) in code.iter().enumerate() {
        writeln!(out, "{:indent$}{:04} {}", "", pc, instruction, indent = depth * 4)?;
        if let Some(body) = instruction.body() {
            write_listing(out, body, depth + 1)?;
        }
    }
    Ok(())
}
