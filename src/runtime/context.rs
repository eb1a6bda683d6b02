// src/runtime/context.rs
//! Execution context that maintains state during one evaluation

use crate::{ExecutionError, Value};

/// Mutable context for one evaluation call
pub struct ExecutionContext<'d> {
    /// Operand stack for the bytecode VM
    pub stack: Vec<Value>,

    /// Input record the rule was invoked with
    root: &'d Value,

    /// Iteration scopes (`item`, reduce `context`), innermost last
    frames: Vec<Value>,
}

impl<'d> ExecutionContext<'d> {
    pub fn new(root: &'d Value) -> Self {
        Self {
            stack: Vec::with_capacity(32),
            root,
            frames: Vec::new(),
        }
    }

    /// Push value onto stack
    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop value from stack
    #[inline]
    pub fn pop(&mut self) -> Result<Value, ExecutionError> {
        self.stack.pop().ok_or(ExecutionError::StackUnderflow)
    }

    /// Pop the top `count` values, in push order.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, ExecutionError> {
        let len = self.stack.len();
        if count > len {
            return Err(ExecutionError::StackUnderflow);
        }
        Ok(self.stack.split_off(len - count))
    }

    /// Peek at top of stack without removing
    #[inline]
    pub fn peek(&self) -> Result<&Value, ExecutionError> {
        self.stack.last().ok_or(ExecutionError::StackUnderflow)
    }

    /// Input record, whatever scope is active
    #[inline]
    pub fn root(&self) -> &Value {
        self.root
    }

    /// Data visible to the current scope: the innermost iteration binding,
    /// or the input record at top level.
    #[inline]
    pub fn data(&self) -> &Value {
        self.frames.last().unwrap_or(self.root)
    }

    #[inline]
    pub fn enter_scope(&mut self, binding: Value) {
        self.frames.push(binding);
    }

    #[inline]
    pub fn leave_scope(&mut self) {
        self.frames.pop();
    }
}
