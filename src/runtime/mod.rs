// src/runtime/mod.rs
//! Runtime components for executing bytecode

pub mod context;
pub mod linker;
pub mod support;
pub mod value;
pub mod vm;

pub use context::ExecutionContext;
pub use linker::{link, Evaluator};
pub use support::Support;
pub use value::Value;
pub use vm::VM;
