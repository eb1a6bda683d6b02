// src/compiler/compiler.rs
//! Compiler that converts a rule tree to bytecode

use crate::compiler::analyzer::Analyzer;
use crate::compiler::bytecode::{Instruction, IterKind, Scope};
use crate::compiler::names::NameResolver;
use crate::operations::{Builtin, CatalogEntry, Operation, Options};
use crate::parser::RuleNode;
use crate::runtime::support::{self, Support};
use crate::runtime::value::format_number;
use crate::{CompilationError, Value};
use std::collections::BTreeSet;
use std::mem;

/// An extension operator referenced by a compiled rule
#[derive(Clone)]
pub struct OperationBinding {
    /// Rule key as registered in the options
    pub key: String,
    /// Synthesized identifier, unique within the compiled rule
    pub identifier: String,
    pub operation: Operation,
}

/// Instructions under construction, with their own jump labels
#[derive(Default)]
struct Block {
    instructions: Vec<Instruction>,
    label_counter: usize,
    labels: Vec<(usize, usize)>, // (label_id, instruction_index)
}

impl Block {
    fn resolve_labels(mut self) -> Vec<Instruction> {
        // Replace label IDs with actual instruction indices
        for instruction in &mut self.instructions {
            match instruction {
                Instruction::Jump(label)
                | Instruction::JumpIfFalse(label)
                | Instruction::JumpIfTrue(label)
                | Instruction::JumpIfPresent(label) => {
                    if let Some((_, pos)) = self.labels.iter().find(|(l, _)| l == label) {
                        *label = *pos;
                    }
                }
                _ => {}
            }
        }

        self.instructions
    }
}

/// Output of one compile pass
pub struct Output {
    pub code: Vec<Instruction>,
    pub support: BTreeSet<Support>,
    pub operations: Vec<OperationBinding>,
}

pub struct Compiler<'a> {
    options: &'a Options,
    analyzer: Analyzer<'a>,
    names: NameResolver,
    block: Block,
    support: BTreeSet<Support>,
    operations: Vec<OperationBinding>,
}

impl<'a> Compiler<'a> {
    pub fn new(options: &'a Options) -> Self {
        Self {
            options,
            analyzer: Analyzer::new(options),
            names: NameResolver::new(),
            block: Block::default(),
            support: BTreeSet::new(),
            operations: Vec::new(),
        }
    }

    /// Compile a whole rule. Consumes the compiler, so naming and analysis
    /// state cannot outlive the call.
    pub fn compile_rule(mut self, rule: &RuleNode) -> Result<Output, CompilationError> {
        self.compile(rule, Scope::Arg)?;

        Ok(Output {
            code: self.block.resolve_labels(),
            support: self.support,
            operations: self.operations,
        })
    }

    fn compile(&mut self, node: &RuleNode, scope: Scope) -> Result<(), CompilationError> {
        match node {
            RuleNode::Literal(value) => self.emit(Instruction::Push(value.clone())),
            RuleNode::Undefined => self.emit(Instruction::Push(Value::Null)),
            RuleNode::List(items) => match constant(node) {
                Some(value) => self.emit(Instruction::Push(value)),
                None => {
                    for item in items {
                        self.compile(item, scope)?;
                    }
                    self.emit(Instruction::MakeArray(items.len()));
                }
            },
            RuleNode::Operation { key, .. } => match Options::lookup(self.options, key) {
                Some(CatalogEntry::Extension(operation)) => {
                    let operation = operation.clone();
                    self.compile_extension(key, operation, node, scope)?;
                }
                Some(CatalogEntry::Builtin(builtin)) => {
                    self.compile_builtin(builtin, node, scope)?;
                }
                None => {
                    return Err(CompilationError::UnrecognizedOperator {
                        operator: key.clone(),
                        rule: node.to_string(),
                    });
                }
            },
        }

        Ok(())
    }

    /// Compile a value used as a condition. Truthy normalization is added
    /// unless the analyzer proves the value is not an array.
    fn compile_bool(&mut self, node: &RuleNode, scope: Scope) -> Result<(), CompilationError> {
        self.compile(node, scope)?;
        if self.analyzer.may_need_truthy_coercion(node) {
            self.emit_support(Support::Truthy, 1);
        }
        Ok(())
    }

    fn compile_all(&mut self, nodes: &[RuleNode], scope: Scope) -> Result<(), CompilationError> {
        for node in nodes {
            self.compile(node, scope)?;
        }
        Ok(())
    }

    /// Compile an operand for arithmetic, coercing it unless it is already
    /// known to be a number.
    fn compile_numeric(&mut self, node: &RuleNode, scope: Scope) -> Result<(), CompilationError> {
        self.compile(node, scope)?;
        if !self.analyzer.is_statically_numeric(node) {
            self.emit(Instruction::ToNumber);
        }
        Ok(())
    }

    /// Compile an iteration body into its own instruction list.
    fn compile_body(
        &mut self,
        node: &RuleNode,
        scope: Scope,
        as_bool: bool,
    ) -> Result<Vec<Instruction>, CompilationError> {
        let outer = mem::take(&mut self.block);
        let result = if as_bool {
            self.compile_bool(node, scope)
        } else {
            self.compile(node, scope)
        };
        let inner = mem::replace(&mut self.block, outer);
        result?;
        Ok(inner.resolve_labels())
    }

    fn compile_extension(
        &mut self,
        key: &str,
        operation: Operation,
        node: &RuleNode,
        scope: Scope,
    ) -> Result<(), CompilationError> {
        let binding = self.names.resolve(key).clone();
        if binding.slot == self.operations.len() {
            self.operations.push(OperationBinding {
                key: key.to_string(),
                identifier: binding.identifier,
                operation,
            });
        }

        let args = node.args();
        self.compile_all(args, scope)?;
        self.emit(Instruction::CallOperation {
            slot: binding.slot,
            argc: args.len(),
        });
        Ok(())
    }

    fn compile_builtin(
        &mut self,
        builtin: Builtin,
        node: &RuleNode,
        scope: Scope,
    ) -> Result<(), CompilationError> {
        let args = node.args();

        match builtin {
            Builtin::Var => self.compile_var(args, scope)?,

            Builtin::Missing => {
                self.emit(Instruction::Load(scope));
                self.compile_all(args, scope)?;
                self.emit_support(Support::Missing, args.len() + 1);
            }

            Builtin::MissingSome => {
                self.emit(Instruction::Load(scope));
                match args.first() {
                    Some(min) => self.compile(min, scope)?,
                    None => self.emit(Instruction::Push(Value::Int(0))),
                }
                match args.get(1) {
                    Some(keys) => self.compile(keys, scope)?,
                    None => self.emit(Instruction::Push(Value::Array(Vec::new()))),
                }
                self.emit_support(Support::MissingSome, 3);
            }

            Builtin::If => self.compile_if(args, scope)?,

            Builtin::Eq | Builtin::StrictEq | Builtin::Ne | Builtin::StrictNe => {
                check_arity(builtin, node, 2..=2, "exactly 2 arguments")?;
                self.compile_all(args, scope)?;
                self.emit(match builtin {
                    Builtin::Eq => Instruction::Eq,
                    Builtin::StrictEq => Instruction::StrictEq,
                    Builtin::Ne => Instruction::Ne,
                    _ => Instruction::StrictNe,
                });
            }

            Builtin::Not | Builtin::NotNot => {
                check_arity(builtin, node, 1..=1, "exactly 1 argument")?;
                let operand = &args[0];
                self.compile(operand, scope)?;
                let normalized = self.analyzer.may_need_truthy_coercion(operand);
                if normalized {
                    self.emit_support(Support::Truthy, 1);
                }
                if builtin == Builtin::Not {
                    self.emit(Instruction::Not);
                } else if !normalized {
                    self.emit(Instruction::ToBool);
                }
            }

            Builtin::And | Builtin::Or => self.compile_short_circuit(builtin, args, scope)?,

            Builtin::Gt | Builtin::Gte | Builtin::Lt | Builtin::Lte => {
                check_arity(builtin, node, 2..=3, "2 or 3 arguments")?;
                let compare = match builtin {
                    Builtin::Gt => Instruction::Gt,
                    Builtin::Gte => Instruction::Gte,
                    Builtin::Lt => Instruction::Lt,
                    _ => Instruction::Lte,
                };
                // a < b < c is a < b && b < c
                let end = self.new_label();
                for (index, pair) in args.windows(2).enumerate() {
                    if index > 0 {
                        self.emit(Instruction::Dup);
                        self.emit(Instruction::JumpIfFalse(end));
                        self.emit(Instruction::Pop);
                    }
                    self.compile_all(pair, scope)?;
                    self.emit(compare.clone());
                }
                self.place_label(end);
            }

            Builtin::Max | Builtin::Min => {
                self.compile_all(args, scope)?;
                self.emit(if builtin == Builtin::Max {
                    Instruction::Max(args.len())
                } else {
                    Instruction::Min(args.len())
                });
            }

            Builtin::Add => {
                check_arity(builtin, node, 1..=usize::MAX, "1 or more arguments")?;
                for (index, arg) in args.iter().enumerate() {
                    self.compile_numeric(arg, scope)?;
                    if index > 0 {
                        self.emit(Instruction::Add);
                    }
                }
            }

            Builtin::Sub => {
                check_arity(builtin, node, 1..=2, "1 or 2 arguments")?;
                self.compile_all(args, scope)?;
                self.emit(if args.len() == 1 {
                    Instruction::Neg
                } else {
                    Instruction::Sub
                });
            }

            Builtin::Mul => {
                check_arity(builtin, node, 1..=usize::MAX, "at least 1 argument")?;
                if let [single] = args {
                    self.compile_numeric(single, scope)?;
                } else {
                    for (index, arg) in args.iter().enumerate() {
                        self.compile(arg, scope)?;
                        if index > 0 {
                            self.emit(Instruction::Mul);
                        }
                    }
                }
            }

            Builtin::Div | Builtin::Mod => {
                check_arity(builtin, node, 2..=2, "exactly 2 arguments")?;
                self.compile_all(args, scope)?;
                self.emit(if builtin == Builtin::Div {
                    Instruction::Div
                } else {
                    Instruction::Mod
                });
            }

            Builtin::Map | Builtin::Filter | Builtin::AllOf | Builtin::NoneOf | Builtin::SomeOf => {
                check_arity(builtin, node, 2..=2, "exactly 2 arguments")?;
                let kind = match builtin {
                    Builtin::Map => IterKind::Map,
                    Builtin::Filter => IterKind::Filter,
                    Builtin::AllOf => IterKind::All,
                    Builtin::NoneOf => IterKind::None,
                    _ => IterKind::Some,
                };
                self.compile(&args[0], scope)?;
                let body = self.compile_body(&args[1], Scope::Item, kind != IterKind::Map)?;
                self.emit(Instruction::Iterate {
                    kind,
                    body,
                    guarded: !self.analyzer.is_statically_array(&args[0]),
                });
            }

            Builtin::Reduce => {
                check_arity(builtin, node, 2..=3, "2 to 3 arguments")?;
                self.compile(&args[0], scope)?;
                if let Some(initial) = args.get(2) {
                    self.compile(initial, scope)?;
                }
                let body = self.compile_body(&args[1], Scope::Context, false)?;
                let with_data = reads_data(&body);
                self.emit(Instruction::Reduce {
                    body,
                    guarded: !self.analyzer.is_statically_array(&args[0]),
                    seeded: args.len() == 3,
                    with_data,
                });
            }

            Builtin::Merge => self.compile_merge(args, scope)?,

            Builtin::In => {
                check_arity(builtin, node, 2..=2, "exactly 2 arguments")?;
                self.compile_all(args, scope)?;
                self.emit(Instruction::Includes {
                    guarded: !self.analyzer.is_statically_array(&args[1]),
                });
            }

            Builtin::Cat => match args {
                [] => self.emit(Instruction::Push(Value::from(""))),
                [single] => {
                    self.compile(single, scope)?;
                    self.emit(Instruction::ToText);
                }
                _ => {
                    self.compile_all(args, scope)?;
                    self.emit(Instruction::Join(args.len()));
                }
            },

            Builtin::Substr => {
                check_arity(builtin, node, 2..=3, "2 or 3 arguments")?;
                self.compile_all(args, scope)?;
                self.emit_support(Support::Substr, args.len());
            }

            Builtin::Log => {
                check_arity(builtin, node, 1..=1, "exactly 1 argument")?;
                self.compile(&args[0], scope)?;
                self.emit_support(Support::Log, 1);
            }
        }

        Ok(())
    }

    fn compile_var(&mut self, args: &[RuleNode], scope: Scope) -> Result<(), CompilationError> {
        let path = match args.first() {
            None | Some(RuleNode::Undefined) | Some(RuleNode::Literal(Value::Null)) => {
                self.emit(Instruction::Load(scope));
                return Ok(());
            }
            Some(RuleNode::Literal(Value::String(s))) if s.is_empty() => {
                self.emit(Instruction::Load(scope));
                return Ok(());
            }
            Some(dynamic @ RuleNode::Operation { .. }) => {
                self.emit(Instruction::Load(scope));
                self.compile(dynamic, scope)?;
                match args.get(1) {
                    Some(default) => self.compile(default, scope)?,
                    None => self.emit(Instruction::Push(Value::Null)),
                }
                self.emit_support(Support::Resolve, 3);
                return Ok(());
            }
            Some(RuleNode::Literal(Value::String(s))) => {
                s.split('.').map(str::to_string).collect()
            }
            Some(RuleNode::Literal(Value::Bool(b))) => vec![b.to_string()],
            Some(RuleNode::Literal(number)) if number.is_numeric() => {
                vec![format_number(number.to_number())]
            }
            Some(other) => {
                return Err(CompilationError::IllegalVarKey {
                    key: other.to_string(),
                });
            }
        };

        self.emit(Instruction::LoadPath { scope, path });
        if let Some(default) = args.get(1) {
            let end = self.new_label();
            self.emit(Instruction::JumpIfPresent(end));
            self.compile(default, scope)?;
            self.place_label(end);
        }
        Ok(())
    }

    fn compile_if(&mut self, args: &[RuleNode], scope: Scope) -> Result<(), CompilationError> {
        if args.len() < 2 {
            self.emit(Instruction::Push(Value::Null));
            return Ok(());
        }

        let end = self.new_label();
        let mut pairs = args.chunks_exact(2);
        for pair in pairs.by_ref() {
            let next = self.new_label();
            self.compile_bool(&pair[0], scope)?;
            self.emit(Instruction::JumpIfFalse(next));
            self.compile(&pair[1], scope)?;
            self.emit(Instruction::Jump(end));
            self.place_label(next);
        }
        match pairs.remainder() {
            [otherwise] => self.compile(otherwise, scope)?,
            _ => self.emit(Instruction::Push(Value::Null)),
        }
        self.place_label(end);
        Ok(())
    }

    /// `and`/`or` leave the deciding operand itself on the stack.
    fn compile_short_circuit(
        &mut self,
        builtin: Builtin,
        args: &[RuleNode],
        scope: Scope,
    ) -> Result<(), CompilationError> {
        let Some((last, rest)) = args.split_last() else {
            self.emit(Instruction::Push(Value::Null));
            return Ok(());
        };

        let end = self.new_label();
        for arg in rest {
            self.compile(arg, scope)?;
            self.emit(Instruction::Dup);
            if self.analyzer.may_need_truthy_coercion(arg) {
                self.emit_support(Support::Truthy, 1);
            }
            self.emit(if builtin == Builtin::And {
                Instruction::JumpIfFalse(end)
            } else {
                Instruction::JumpIfTrue(end)
            });
            self.emit(Instruction::Pop);
        }
        self.compile(last, scope)?;
        self.place_label(end);
        Ok(())
    }

    fn compile_merge(&mut self, args: &[RuleNode], scope: Scope) -> Result<(), CompilationError> {
        let constants: Option<Vec<Value>> = args.iter().map(constant).collect();
        if let Some(constants) = constants {
            let mut merged = Vec::new();
            for value in constants {
                support::merge(&mut merged, value);
            }
            self.emit(Instruction::Push(Value::Array(merged)));
            return Ok(());
        }

        self.compile_all(args, scope)?;
        if args.iter().all(|arg| self.analyzer.is_statically_array(arg)) {
            self.emit(Instruction::Concat(args.len()));
        } else {
            self.emit_support(Support::Merge, args.len());
        }
        Ok(())
    }

    fn emit(&mut self, instruction: Instruction) {
        self.block.instructions.push(instruction);
    }

    fn emit_support(&mut self, support: Support, argc: usize) {
        self.support.insert(support);
        self.emit(Instruction::CallSupport(support, argc));
    }

    fn new_label(&mut self) -> usize {
        let label = self.block.label_counter;
        self.block.label_counter += 1;
        label
    }

    fn place_label(&mut self, label: usize) {
        let position = self.block.instructions.len();
        self.block.labels.push((label, position));
    }
}

fn check_arity(
    builtin: Builtin,
    node: &RuleNode,
    allowed: std::ops::RangeInclusive<usize>,
    expected: &'static str,
) -> Result<(), CompilationError> {
    if allowed.contains(&node.args().len()) {
        Ok(())
    } else {
        Err(CompilationError::Arity {
            operator: builtin.name().to_string(),
            expected,
            rule: node.to_string(),
        })
    }
}

/// Value of a subtree made only of literals and lists.
fn constant(node: &RuleNode) -> Option<Value> {
    match node {
        RuleNode::Literal(value) => Some(value.clone()),
        RuleNode::Undefined => Some(Value::Null),
        RuleNode::List(items) => items
            .iter()
            .map(constant)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        RuleNode::Operation { .. } => None,
    }
}

/// Whether a reduce body can observe the `data` field of its context. Nested
/// iteration bodies see their own scope, so only their sources count.
fn reads_data(body: &[Instruction]) -> bool {
    body.iter().any(|instruction| match instruction {
        Instruction::Load(Scope::Context) => true,
        Instruction::LoadPath {
            scope: Scope::Context,
            path,
        } => path.first().is_some_and(|segment| segment == "data"),
        _ => false,
    })
}
