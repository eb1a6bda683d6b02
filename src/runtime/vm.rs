// src/runtime/vm.rs
//! Virtual Machine that executes bytecode
//!
//! This is the hot path: one call per evaluation, no allocation beyond the
//! values the rule itself produces.

use crate::compiler::bytecode::{Instruction, IterKind, Scope};
use crate::operations::Operation;
use crate::runtime::context::ExecutionContext;
use crate::runtime::support::{self, SupportTable};
use crate::runtime::value::join;
use crate::{ExecutionError, Value};
use std::cmp::Ordering;

/// A linked program's callables, borrowed for one evaluation
pub struct VM<'p> {
    support: &'p SupportTable,
    operations: &'p [Operation],
}

impl<'p> VM<'p> {
    pub fn new(support: &'p SupportTable, operations: &'p [Operation]) -> Self {
        Self {
            support,
            operations,
        }
    }

    /// Execute bytecode in the given context, leaving its result on the stack
    pub fn execute(
        &self,
        code: &[Instruction],
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<(), ExecutionError> {
        let mut pc = 0; // Program counter

        while pc < code.len() {
            match &code[pc] {
                Instruction::Push(value) => ctx.push(value.clone()),

                Instruction::Pop => {
                    ctx.pop()?;
                }

                Instruction::Dup => {
                    let value = ctx.peek()?.clone();
                    ctx.push(value);
                }

                Instruction::MakeArray(count) => {
                    let items = ctx.pop_n(*count)?;
                    ctx.push(Value::Array(items));
                }

                Instruction::Load(scope) => {
                    let value = Self::scope_data(ctx, *scope).clone();
                    ctx.push(value);
                }

                Instruction::LoadPath { scope, path } => {
                    let value = Self::scope_data(ctx, *scope)
                        .lookup_path(path.as_slice())
                        .cloned()
                        .unwrap_or(Value::Null);
                    ctx.push(value);
                }

                Instruction::ToNumber => {
                    let a = ctx.pop()?;
                    ctx.push(Value::from_f64(a.to_number()));
                }

                Instruction::Add => Self::arithmetic(ctx, |a, b| a + b)?,
                Instruction::Sub => Self::arithmetic(ctx, |a, b| a - b)?,
                Instruction::Mul => Self::arithmetic(ctx, |a, b| a * b)?,
                Instruction::Div => Self::arithmetic(ctx, |a, b| a / b)?,
                // f64 `%` truncates like JavaScript's
                Instruction::Mod => Self::arithmetic(ctx, |a, b| a % b)?,

                Instruction::Neg => {
                    let a = ctx.pop()?;
                    ctx.push(Value::from_f64(-a.to_number()));
                }

                Instruction::Max(count) => {
                    let values = ctx.pop_n(*count)?;
                    ctx.push(Value::from_f64(Self::extreme(&values, f64::NEG_INFINITY, f64::max)));
                }

                Instruction::Min(count) => {
                    let values = ctx.pop_n(*count)?;
                    ctx.push(Value::from_f64(Self::extreme(&values, f64::INFINITY, f64::min)));
                }

                Instruction::Eq => Self::compare(ctx, |a, b| a.loose_eq(b))?,
                Instruction::StrictEq => Self::compare(ctx, |a, b| a.strict_eq(b))?,
                Instruction::Ne => Self::compare(ctx, |a, b| !a.loose_eq(b))?,
                Instruction::StrictNe => Self::compare(ctx, |a, b| !a.strict_eq(b))?,
                Instruction::Gt => {
                    Self::compare(ctx, |a, b| a.js_compare(b) == Some(Ordering::Greater))?
                }
                Instruction::Gte => Self::compare(ctx, |a, b| {
                    matches!(a.js_compare(b), Some(Ordering::Greater | Ordering::Equal))
                })?,
                Instruction::Lt => {
                    Self::compare(ctx, |a, b| a.js_compare(b) == Some(Ordering::Less))?
                }
                Instruction::Lte => Self::compare(ctx, |a, b| {
                    matches!(a.js_compare(b), Some(Ordering::Less | Ordering::Equal))
                })?,

                Instruction::Not => {
                    let a = ctx.pop()?;
                    ctx.push(Value::Bool(!a.js_truthy()));
                }

                Instruction::ToBool => {
                    let a = ctx.pop()?;
                    ctx.push(Value::Bool(a.js_truthy()));
                }

                Instruction::Jump(target) => {
                    pc = *target;
                    continue;
                }

                Instruction::JumpIfFalse(target) => {
                    if !ctx.pop()?.js_truthy() {
                        pc = *target;
                        continue;
                    }
                }

                Instruction::JumpIfTrue(target) => {
                    if ctx.pop()?.js_truthy() {
                        pc = *target;
                        continue;
                    }
                }

                Instruction::JumpIfPresent(target) => {
                    if !ctx.peek()?.is_null() {
                        pc = *target;
                        continue;
                    }
                    ctx.pop()?;
                }

                Instruction::Concat(count) => {
                    let parts = ctx.pop_n(*count)?;
                    let mut merged = Vec::new();
                    for part in parts {
                        support::merge(&mut merged, part);
                    }
                    ctx.push(Value::Array(merged));
                }

                Instruction::Includes { guarded } => {
                    let haystack = ctx.pop()?;
                    let needle = ctx.pop()?;
                    let found = match &haystack {
                        Value::Array(items) => {
                            Value::Bool(items.iter().any(|item| item.same_value_zero(&needle)))
                        }
                        Value::String(text) => Value::Bool(text.contains(&needle.to_js_string())),
                        _ if *guarded => Value::Null,
                        other => {
                            return Err(ExecutionError::TypeMismatch(format!(
                                "in expects an array or string, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    ctx.push(found);
                }

                Instruction::ToText => {
                    let a = ctx.pop()?;
                    ctx.push(Value::String(a.to_js_string()));
                }

                Instruction::Join(count) => {
                    let parts = ctx.pop_n(*count)?;
                    ctx.push(Value::String(join(&parts, "")));
                }

                Instruction::Iterate {
                    kind,
                    body,
                    guarded,
                } => {
                    let result = match ctx.pop()? {
                        Value::Array(items) => self.iterate(*kind, body, items, ctx)?,
                        _ if *guarded => kind.fallback(),
                        other => {
                            return Err(ExecutionError::TypeMismatch(format!(
                                "{} expects an array, got {}",
                                kind,
                                other.type_name()
                            )))
                        }
                    };
                    ctx.push(result);
                }

                Instruction::Reduce {
                    body,
                    guarded,
                    seeded,
                    with_data,
                } => {
                    let initial = if *seeded { Some(ctx.pop()?) } else { None };
                    let result = match ctx.pop()? {
                        Value::Array(items) => {
                            self.reduce(body, items, initial, *with_data, ctx)?
                        }
                        _ if *guarded => Value::Null,
                        other => {
                            return Err(ExecutionError::TypeMismatch(format!(
                                "reduce expects an array, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    ctx.push(result);
                }

                Instruction::CallSupport(routine, argc) => {
                    let args = ctx.pop_n(*argc)?;
                    let result = self.support.call(*routine, &args)?;
                    ctx.push(result);
                }

                Instruction::CallOperation { slot, argc } => {
                    let args = ctx.pop_n(*argc)?;
                    let operation = self
                        .operations
                        .get(*slot)
                        .ok_or(ExecutionError::UnboundOperation(*slot))?;
                    let result = operation(args.as_slice()).map_err(ExecutionError::Operation)?;
                    ctx.push(result);
                }
            }

            pc += 1;
        }

        Ok(())
    }

    #[inline]
    fn scope_data<'c>(ctx: &'c ExecutionContext<'_>, scope: Scope) -> &'c Value {
        match scope {
            Scope::Arg => ctx.root(),
            Scope::Item | Scope::Context => ctx.data(),
        }
    }

    /// Run an iteration body with `binding` as its data and return its result.
    fn run_scoped(
        &self,
        body: &[Instruction],
        ctx: &mut ExecutionContext<'_>,
        binding: Value,
    ) -> Result<Value, ExecutionError> {
        ctx.enter_scope(binding);
        let result = self.execute(body, ctx).and_then(|()| ctx.pop());
        ctx.leave_scope();
        result
    }

    fn iterate(
        &self,
        kind: IterKind,
        body: &[Instruction],
        items: Vec<Value>,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Value, ExecutionError> {
        let result = match kind {
            IterKind::Map => {
                let mapped = items
                    .into_iter()
                    .map(|item| self.run_scoped(body, ctx, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(mapped)
            }
            IterKind::Filter => {
                let mut kept = Vec::new();
                for item in items {
                    if self.run_scoped(body, ctx, item.clone())?.js_truthy() {
                        kept.push(item);
                    }
                }
                Value::Array(kept)
            }
            IterKind::All => Value::Bool(support::all(
                &items,
                |item| -> Result<bool, ExecutionError> {
                    Ok(self.run_scoped(body, ctx, item.clone())?.js_truthy())
                },
            )?),
            IterKind::Some | IterKind::None => {
                let mut found = false;
                for item in items {
                    if self.run_scoped(body, ctx, item)?.js_truthy() {
                        found = true;
                        break;
                    }
                }
                Value::Bool(found == (kind == IterKind::Some))
            }
        };
        Ok(result)
    }

    /// `Array.prototype.reduce` with a `{accumulator, current, index, data}`
    /// context per step.
    fn reduce(
        &self,
        body: &[Instruction],
        items: Vec<Value>,
        initial: Option<Value>,
        with_data: bool,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Value, ExecutionError> {
        let data = if with_data {
            Value::Array(items.clone())
        } else {
            Value::Null
        };

        let mut steps = items.into_iter().enumerate();
        let mut accumulator = match initial {
            Some(initial) => initial,
            None => match steps.next() {
                Some((_, first)) => first,
                None => {
                    return Err(ExecutionError::TypeMismatch(
                        "reduce of empty array with no initial value".to_string(),
                    ))
                }
            },
        };

        for (index, current) in steps {
            let mut context = vec![
                ("accumulator", accumulator),
                ("current", current),
                ("index", Value::Int(index as i64)),
            ];
            if with_data {
                context.push(("data", data.clone()));
            }
            accumulator = self.run_scoped(body, ctx, Value::object(context))?;
        }

        Ok(accumulator)
    }

    // Binary helpers pop the right operand first
    #[inline]
    fn arithmetic(
        ctx: &mut ExecutionContext<'_>,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<(), ExecutionError> {
        let b = ctx.pop()?;
        let a = ctx.pop()?;
        ctx.push(Value::from_f64(op(a.to_number(), b.to_number())));
        Ok(())
    }

    #[inline]
    fn compare(
        ctx: &mut ExecutionContext<'_>,
        op: impl Fn(&Value, &Value) -> bool,
    ) -> Result<(), ExecutionError> {
        let b = ctx.pop()?;
        let a = ctx.pop()?;
        ctx.push(Value::Bool(op(&a, &b)));
        Ok(())
    }

    /// `Math.max`/`Math.min`: NaN if any operand is NaN.
    fn extreme(values: &[Value], empty: f64, pick: fn(f64, f64) -> f64) -> f64 {
        let mut result = empty;
        for value in values {
            let n = value.to_number();
            if n.is_nan() {
                return f64::NAN;
            }
            result = pick(result, n);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::support::Support;
    use serde_json::json;

    fn run(code: &[Instruction], data: &Value) -> Result<Value, ExecutionError> {
        let support = SupportTable::default();
        let mut ctx = ExecutionContext::new(data);
        VM::new(&support, &[]).execute(code, &mut ctx)?;
        ctx.pop()
    }

    #[test]
    fn test_arithmetic() {
        let bytecode = vec![
            Instruction::Push(Value::Int(10)),
            Instruction::Push(Value::from("5")),
            Instruction::Add,
        ];

        assert_eq!(run(&bytecode, &Value::Null).unwrap(), Value::Int(15));
    }

    #[test]
    fn test_division_stays_float() {
        let bytecode = vec![
            Instruction::Push(Value::Int(1)),
            Instruction::Push(Value::Int(4)),
            Instruction::Div,
        ];

        assert_eq!(run(&bytecode, &Value::Null).unwrap(), Value::Float(0.25));
    }

    #[test]
    fn test_comparison() {
        let bytecode = vec![
            Instruction::Push(Value::Int(10)),
            Instruction::Push(Value::Int(5)),
            Instruction::Gt,
        ];

        assert_eq!(run(&bytecode, &Value::Null).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_max_of_nothing() {
        let result = run(&[Instruction::Max(0)], &Value::Null).unwrap();
        assert_eq!(result, Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn test_load_path_propagates_null() {
        let data = Value::from(json!({"a": {"b": null}}));
        let bytecode = vec![Instruction::LoadPath {
            scope: Scope::Arg,
            path: vec!["a".into(), "b".into(), "c".into()],
        }];

        assert_eq!(run(&bytecode, &data).unwrap(), Value::Null);
    }

    #[test]
    fn test_unguarded_iteration_rejects_non_arrays() {
        let bytecode = vec![
            Instruction::Push(Value::from("abc")),
            Instruction::Iterate {
                kind: IterKind::Map,
                body: vec![Instruction::Load(Scope::Item)],
                guarded: false,
            },
        ];

        assert!(matches!(
            run(&bytecode, &Value::Null),
            Err(ExecutionError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_reduce_without_seed_starts_at_index_one() {
        let bytecode = vec![
            Instruction::Push(Value::from(vec![5, 6, 7])),
            Instruction::Reduce {
                body: vec![
                    Instruction::LoadPath {
                        scope: Scope::Context,
                        path: vec!["accumulator".into()],
                    },
                    Instruction::LoadPath {
                        scope: Scope::Context,
                        path: vec!["index".into()],
                    },
                    Instruction::Add,
                ],
                guarded: false,
                seeded: false,
                with_data: false,
            },
        ];

        // 5 + 1 + 2
        assert_eq!(run(&bytecode, &Value::Null).unwrap(), Value::Int(8));
    }

    #[test]
    fn test_unlinked_support_routine() {
        let bytecode = vec![
            Instruction::Push(Value::Null),
            Instruction::CallSupport(Support::Truthy, 1),
        ];

        assert!(matches!(
            run(&bytecode, &Value::Null),
            Err(ExecutionError::Unlinked("truthy"))
        ));
    }
}
