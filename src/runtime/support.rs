// src/runtime/support.rs
//! Runtime support routines referenced by compiled programs
//!
//! The compiler records which routines a program calls; the linker attaches
//! only those to the evaluator's [`SupportTable`].

use crate::{ExecutionError, Value};
use ahash::HashSet;
use std::fmt;
use std::sync::Arc;

/// A support routine as stored in a linked evaluator.
pub type Routine = Arc<dyn Fn(&[Value]) -> Result<Value, ExecutionError> + Send + Sync>;

/// Destination for values passed to the `log` operator.
pub type LogSink = Arc<dyn Fn(&Value) + Send + Sync>;

/// Support routines a compiled program may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Support {
    Resolve,
    Missing,
    MissingSome,
    Truthy,
    Substr,
    Merge,
    Log,
}

impl Support {
    pub const COUNT: usize = 7;

    pub const ALL: [Support; Support::COUNT] = [
        Support::Resolve,
        Support::Missing,
        Support::MissingSome,
        Support::Truthy,
        Support::Substr,
        Support::Merge,
        Support::Log,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Support::Resolve => "resolve",
            Support::Missing => "missing",
            Support::MissingSome => "missing_some",
            Support::Truthy => "truthy",
            Support::Substr => "substr",
            Support::Merge => "merge",
            Support::Log => "log",
        }
    }

    /// Build the callable form of this routine. `sink` is only used by `log`.
    pub fn routine(self, sink: Option<&LogSink>) -> Routine {
        match self {
            Support::Resolve => routine(|args: &[Value]| {
                Ok(resolve(arg(args, 0), arg(args, 1), arg(args, 2)))
            }),
            Support::Missing => routine(|args: &[Value]| {
                let (data, keys) = args.split_first().ok_or(ExecutionError::StackUnderflow)?;
                Ok(Value::Array(missing(data, keys)))
            }),
            Support::MissingSome => routine(|args: &[Value]| {
                Ok(Value::Array(missing_some(arg(args, 0), arg(args, 1), arg(args, 2))))
            }),
            Support::Truthy => routine(|args: &[Value]| Ok(Value::Bool(truthy(arg(args, 0))))),
            Support::Substr => routine(|args: &[Value]| {
                Ok(Value::String(substr(arg(args, 0), arg(args, 1), args.get(2))))
            }),
            Support::Merge => routine(|args: &[Value]| {
                let mut merged = Vec::with_capacity(args.len());
                for item in args {
                    merge(&mut merged, item.clone());
                }
                Ok(Value::Array(merged))
            }),
            Support::Log => {
                let sink = sink.cloned();
                routine(move |args: &[Value]| {
                    let value = arg(args, 0);
                    match &sink {
                        Some(sink) => sink(value),
                        None => tracing::info!(target: "json_logic_compiler::log", %value, "log"),
                    }
                    Ok(value.clone())
                })
            }
        }
    }
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static NULL: Value = Value::Null;

fn routine(
    f: impl Fn(&[Value]) -> Result<Value, ExecutionError> + Send + Sync + 'static,
) -> Routine {
    Arc::new(f)
}

#[inline]
fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

/// Routines attached to a linked evaluator, indexed by [`Support`].
#[derive(Clone, Default)]
pub struct SupportTable {
    routines: [Option<Routine>; Support::COUNT],
}

impl SupportTable {
    pub fn attach(&mut self, support: Support, routine: Routine) {
        self.routines[support as usize] = Some(routine);
    }

    pub fn is_linked(&self, support: Support) -> bool {
        self.routines[support as usize].is_some()
    }

    /// Linked routines in declaration order.
    pub fn linked(&self) -> impl Iterator<Item = Support> + '_ {
        Support::ALL.into_iter().filter(|s| self.is_linked(*s))
    }

    #[inline]
    pub fn call(&self, support: Support, args: &[Value]) -> Result<Value, ExecutionError> {
        match &self.routines[support as usize] {
            Some(routine) => routine(args),
            None => Err(ExecutionError::Unlinked(support.name())),
        }
    }
}

impl fmt::Debug for SupportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.linked()).finish()
    }
}

/// Dynamic path lookup. An absent or empty path yields `data` itself; any
/// null met along the dotted path yields `default`.
pub fn resolve(data: &Value, path: &Value, default: &Value) -> Value {
    let path = match path {
        Value::Null => return data.clone(),
        other => other.to_js_string(),
    };
    if path.is_empty() {
        return data.clone();
    }
    let segments: Vec<&str> = path.split('.').collect();
    data.lookup_path(&segments)
        .cloned()
        .unwrap_or_else(|| default.clone())
}

fn is_missing(data: &Value, key: &str) -> bool {
    match resolve(data, &Value::from(key), &Value::Null) {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// The keys to check: a leading array argument stands for the whole list.
#[inline]
fn key_list(keys: &[Value]) -> &[Value] {
    match keys.first() {
        Some(Value::Array(list)) => list.as_slice(),
        _ => keys,
    }
}

/// Keys that resolve to null or an empty string. A leading array argument is
/// taken as the whole key list.
pub fn missing(data: &Value, keys: &[Value]) -> Vec<Value> {
    missing_keys(data, key_list(keys)).0
}

/// Missing keys of an already flattened list, with the number of distinct
/// keys checked.
fn missing_keys(data: &Value, keys: &[Value]) -> (Vec<Value>, usize) {
    let mut seen = HashSet::default();
    let mut result = Vec::new();
    for key in keys {
        let name = key.to_js_string();
        if seen.insert(name.clone()) && is_missing(data, &name) {
            result.push(key.clone());
        }
    }
    (result, seen.len())
}

/// `[]` when at least `min` of `keys` are present, otherwise the missing keys.
pub fn missing_some(data: &Value, min: &Value, keys: &Value) -> Vec<Value> {
    let keys: &[Value] = match keys {
        Value::Array(list) => list,
        Value::Null => &[],
        single => std::slice::from_ref(single),
    };
    let (missing, distinct) = missing_keys(data, key_list(keys));
    let present = (distinct - missing.len()) as f64;
    if present >= min.to_number() {
        Vec::new()
    } else {
        missing
    }
}

/// Truthy normalization: arrays are truthy iff non-empty.
#[inline]
pub fn truthy(value: &Value) -> bool {
    value.is_truthy()
}

/// PHP-style substring: a negative `end` drops that many characters from the
/// tail selected by `start`; otherwise `end` is a length.
pub fn substr(source: &Value, start: &Value, end: Option<&Value>) -> String {
    let chars: Vec<char> = source.to_js_string().chars().collect();
    let start = start.to_number();
    match end {
        Some(end) if end.to_number() < 0.0 => {
            let tail = slice(&chars, start, None);
            let keep = tail.len() as f64 + to_integer(end.to_number());
            tail.into_iter().take(keep.max(0.0) as usize).collect()
        }
        Some(end) => slice(&chars, start, Some(end.to_number())).into_iter().collect(),
        None => slice(&chars, start, None).into_iter().collect(),
    }
}

/// `String.prototype.substr(start, length)` over characters.
fn slice(chars: &[char], start: f64, length: Option<f64>) -> Vec<char> {
    let size = chars.len() as f64;
    let mut from = to_integer(start);
    if from < 0.0 {
        from = (size + from).max(0.0);
    }
    let from = from.min(size);
    let count = match length {
        Some(length) => to_integer(length).clamp(0.0, size - from),
        None => size - from,
    };
    chars[from as usize..(from + count) as usize].to_vec()
}

#[inline]
fn to_integer(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Append `item`'s elements if it is an array, else `item` itself.
#[inline]
pub fn merge(accumulator: &mut Vec<Value>, item: Value) {
    match item {
        Value::Array(items) => accumulator.extend(items),
        other => accumulator.push(other),
    }
}

/// Quantifier helper for `all`. An empty input is false, not vacuously true.
pub fn all<E>(
    items: &[Value],
    mut predicate: impl FnMut(&Value) -> Result<bool, E>,
) -> Result<bool, E> {
    if items.is_empty() {
        return Ok(false);
    }
    for item in items {
        if !predicate(item)? {
            return Ok(false);
        }
    }
    Ok(true)
}
