// src/operations/extra.rs
//! Optional extension operators
//!
//! None of these are builtins. Register them like any other extension:
//!
//! ```rust
//! use json_logic_compiler::{compile_to_evaluator, operations::extra, Options, Value};
//! use serde_json::json;
//!
//! let options = Options::new().with_operations(extra::extra_operations());
//! let evaluator = compile_to_evaluator(&json!({"floor": 2.7}), &options).unwrap();
//! assert_eq!(evaluator.evaluate(&Value::Null).unwrap(), Value::Int(2));
//! ```

use super::{Operation, OperationError};
use crate::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::RegexBuilder;
use std::f64::consts;
use std::sync::Arc;

const MS_PER_HOUR: f64 = 1000.0 * 60.0 * 60.0;
const MS_PER_DAY: f64 = MS_PER_HOUR * 24.0;

fn operation(
    f: impl Fn(&[Value]) -> Result<Value, OperationError> + Send + Sync + 'static,
) -> Operation {
    Arc::new(f)
}

fn constant(value: f64) -> Operation {
    operation(move |_| Ok(Value::Float(value)))
}

fn unary(f: fn(f64) -> f64) -> Operation {
    operation(move |args| Ok(Value::from_f64(f(number(args, 0)))))
}

fn binary(f: fn(f64, f64) -> f64) -> Operation {
    operation(move |args| Ok(Value::from_f64(f(number(args, 0), number(args, 1)))))
}

/// Numeric argument; a missing argument is NaN, as for an undefined operand.
#[inline]
fn number(args: &[Value], index: usize) -> f64 {
    args.get(index).map_or(f64::NAN, Value::to_number)
}

/// Every extra operator, keyed by rule spelling.
pub fn extra_operations() -> Vec<(&'static str, Operation)> {
    vec![
        // Predicates
        ("is-nan", operation(|args| Ok(Value::Bool(number(args, 0).is_nan())))),
        (
            "is-array",
            operation(|args| Ok(Value::Bool(matches!(args.first(), Some(Value::Array(_)))))),
        ),
        ("is-finite", operation(|args| Ok(Value::Bool(number(args, 0).is_finite())))),
        ("is-empty", operation(|args| Ok(Value::Bool(is_empty(args.first()))))),
        ("typeof", operation(|args| Ok(Value::from(type_of(args.first()))))),
        ("matches", operation(matches)),
        // Time, in milliseconds
        ("days", unary(|n| n * MS_PER_DAY)),
        ("hours", unary(|n| n * MS_PER_HOUR)),
        ("now", operation(|_| Ok(Value::Int(now())))),
        (
            "timestamp",
            operation(|args| Ok(Value::from_f64(epoch_millis(args.first())?))),
        ),
        (
            "time-since",
            operation(|args| {
                Ok(Value::from_f64(now() as f64 - epoch_millis(args.first())?))
            }),
        ),
        // Combinatorics
        ("combinations", operation(combinations)),
        ("zip", operation(zip)),
        // Math constants
        ("E", constant(consts::E)),
        ("LN10", constant(consts::LN_10)),
        ("LN2", constant(consts::LN_2)),
        ("LOG2E", constant(consts::LOG2_E)),
        ("LOG10E", constant(consts::LOG10_E)),
        ("PI", constant(consts::PI)),
        ("SQRT1_2", constant(consts::FRAC_1_SQRT_2)),
        ("SQRT2", constant(consts::SQRT_2)),
        // Math functions. `log` is the builtin logger, hence `logarthim`.
        ("abs", unary(f64::abs)),
        ("acos", unary(f64::acos)),
        ("asin", unary(f64::asin)),
        ("atan", unary(f64::atan)),
        ("atan2", binary(f64::atan2)),
        ("ceil", unary(f64::ceil)),
        ("cos", unary(f64::cos)),
        ("exp", unary(f64::exp)),
        ("floor", unary(f64::floor)),
        ("logarthim", unary(f64::ln)),
        ("pow", binary(f64::powf)),
        ("round", unary(round_half_up)),
        ("sin", unary(f64::sin)),
        ("sqrt", unary(f64::sqrt)),
        ("tan", unary(f64::tan)),
    ]
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::String(s)) => s.is_empty(),
        _ => true,
    }
}

fn type_of(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null | Value::Array(_) | Value::Object(_)) => "object",
        Some(other) => other.type_name(),
    }
}

/// Halves round towards positive infinity.
fn round_half_up(n: f64) -> f64 {
    (n + 0.5).floor()
}

fn now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds since the epoch. Numbers pass through; strings are parsed as
/// RFC 3339, a zone-less ISO date-time, or a bare date (both taken as UTC).
fn epoch_millis(value: Option<&Value>) -> Result<f64, OperationError> {
    match value {
        Some(Value::Int(n)) => Ok(*n as f64),
        Some(Value::Float(n)) => Ok(*n),
        Some(Value::String(text)) => parse_date(text)
            .map(|date| date.timestamp_millis() as f64)
            .ok_or_else(|| OperationError::from(format!("invalid date {:?}", text))),
        Some(other) => Err(format!("value is not a date but {}", other.type_name()).into()),
        None => Err("value is not a date but undefined".into()),
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(date.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc())
}

/// `matches(text, pattern, flags?)`: whether `pattern` matches anywhere in
/// `text`. Flags are `i`, `m`, `s` and `y` (anchor at the start); `g`, `u`
/// and `d` have no effect on a single test.
fn matches(args: &[Value]) -> Result<Value, OperationError> {
    let text = args.first().map_or_else(|| "undefined".to_string(), Value::to_js_string);
    let pattern = args.get(1).map_or_else(String::new, Value::to_js_string);
    let flags = match args.get(2) {
        None | Some(Value::Null) => String::new(),
        Some(flags) => flags.to_js_string(),
    };

    let source = if flags.contains('y') {
        format!(r"\A(?:{})", pattern)
    } else {
        pattern
    };

    let mut builder = RegexBuilder::new(&source);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'y' | 'g' | 'u' | 'd' => {}
            other => return Err(format!("invalid regular expression flag {:?}", other).into()),
        }
    }

    let regex = builder.build()?;
    Ok(Value::Bool(regex.is_match(&text)))
}

fn lists<'a>(name: &str, args: &'a [Value]) -> Result<Vec<&'a [Value]>, OperationError> {
    args.iter()
        .map(|arg| {
            arg.as_array()
                .ok_or_else(|| format!("{} expects arrays, got {}", name, arg.type_name()).into())
        })
        .collect()
}

/// Cartesian product of the argument lists, first list varying slowest.
fn combinations(args: &[Value]) -> Result<Value, OperationError> {
    let lists = lists("combinations", args)?;
    let mut product: Vec<Vec<Value>> = vec![Vec::with_capacity(lists.len())];
    for list in lists {
        product = product
            .into_iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut tuple = prefix.clone();
                    tuple.push(item.clone());
                    tuple
                })
            })
            .collect();
    }
    Ok(Value::from(product))
}

/// Tuples of same-index items, truncated to the shortest list.
fn zip(args: &[Value]) -> Result<Value, OperationError> {
    let lists = lists("zip", args)?;
    let Some(len) = lists.iter().map(|list| list.len()).min() else {
        return Ok(Value::Array(Vec::new()));
    };
    let zipped = (0..len)
        .map(|i| Value::Array(lists.iter().map(|list| list[i].clone()).collect()))
        .collect();
    Ok(Value::Array(zipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::HashMap;

    fn catalog() -> HashMap<&'static str, Operation> {
        extra_operations().into_iter().collect()
    }

    fn call(name: &str, args: Vec<Value>) -> Value {
        catalog()[name](&args[..]).unwrap()
    }

    #[test]
    fn test_predicates() {
        assert_eq!(call("is-nan", vec![Value::from("abc")]), Value::Bool(true));
        assert_eq!(call("is-nan", vec![Value::from("12")]), Value::Bool(false));
        assert_eq!(call("is-array", vec![Value::from(vec![1])]), Value::Bool(true));
        assert_eq!(call("is-finite", vec![Value::Float(f64::INFINITY)]), Value::Bool(false));
        assert_eq!(call("is-empty", vec![Value::from("")]), Value::Bool(true));
        assert_eq!(call("is-empty", vec![Value::from(vec![0])]), Value::Bool(false));
        assert_eq!(call("is-empty", vec![Value::Int(5)]), Value::Bool(true));
    }

    #[test]
    fn test_typeof() {
        assert_eq!(call("typeof", vec![Value::Null]), Value::from("object"));
        assert_eq!(call("typeof", vec![Value::from(vec![1])]), Value::from("object"));
        assert_eq!(call("typeof", vec![Value::Float(1.5)]), Value::from("number"));
        assert_eq!(call("typeof", vec![]), Value::from("undefined"));
    }

    #[test]
    fn test_combinations() {
        let result = call(
            "combinations",
            vec![Value::from(vec![1, 2]), Value::from(vec!["a", "b"])],
        );
        assert_eq!(
            result,
            Value::from(serde_json::json!([[1, "a"], [1, "b"], [2, "a"], [2, "b"]]))
        );
        assert_eq!(call("combinations", vec![]), Value::from(serde_json::json!([[]])));
        assert!(catalog()["combinations"](&[Value::Int(1)][..]).is_err());
    }

    #[test]
    fn test_zip_truncates() {
        let result = call(
            "zip",
            vec![Value::from(vec![1, 2, 3]), Value::from(vec!["a", "b"])],
        );
        assert_eq!(result, Value::from(serde_json::json!([[1, "a"], [2, "b"]])));
        assert_eq!(call("zip", vec![]), Value::Array(vec![]));
    }

    #[test]
    fn test_math() {
        assert_eq!(call("floor", vec![Value::Float(2.7)]), Value::Int(2));
        assert_eq!(call("round", vec![Value::Float(-2.5)]), Value::Int(-2));
        assert_eq!(call("round", vec![Value::Float(2.5)]), Value::Int(3));
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(10)]), Value::Int(1024));
        assert_eq!(call("days", vec![Value::Int(1)]), Value::Int(86_400_000));
        assert_eq!(call("PI", vec![]), Value::Float(consts::PI));
        assert!(call("abs", vec![]).as_f64().unwrap().is_nan());
    }

    fn fails(name: &str, args: Vec<Value>) -> String {
        match catalog()[name](&args[..]) {
            Ok(value) => panic!("{} returned {}", name, value),
            Err(err) => err.to_string(),
        }
    }

    #[test]
    fn test_matches() {
        let text = Value::from("Hello World");
        assert_eq!(call("matches", vec![text.clone(), Value::from("o W")]), Value::Bool(true));
        assert_eq!(call("matches", vec![text.clone(), Value::from("^world")]), Value::Bool(false));
        assert_eq!(
            call("matches", vec![text.clone(), Value::from("WORLD$"), Value::from("i")]),
            Value::Bool(true)
        );
        assert_eq!(call("matches", vec![Value::Int(2024), Value::from(r"^\d{4}$")]), Value::Bool(true));
    }

    #[test]
    fn test_matches_flags() {
        let lines = Value::from("first\nsecond");
        assert_eq!(call("matches", vec![lines.clone(), Value::from("^second")]), Value::Bool(false));
        assert_eq!(
            call("matches", vec![lines.clone(), Value::from("^second"), Value::from("m")]),
            Value::Bool(true)
        );
        assert_eq!(
            call("matches", vec![lines.clone(), Value::from("first.second"), Value::from("s")]),
            Value::Bool(true)
        );
        // sticky anchors at the start even in multi-line mode
        assert_eq!(
            call("matches", vec![lines.clone(), Value::from("second"), Value::from("my")]),
            Value::Bool(false)
        );
        assert_eq!(
            call("matches", vec![lines, Value::from("FIRST"), Value::from("yig")]),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_matches_errors() {
        assert!(fails("matches", vec![Value::from("a"), Value::from("a"), Value::from("x")])
            .contains("flag"));
        assert!(!fails("matches", vec![Value::from("a"), Value::from("(")]).is_empty());
    }

    #[test]
    fn test_timestamp() {
        let new_year = Value::Int(1_704_067_200_000);
        assert_eq!(call("timestamp", vec![Value::from("2024-01-01T00:00:00Z")]), new_year);
        assert_eq!(call("timestamp", vec![Value::from("2024-01-01T01:00:00+01:00")]), new_year);
        assert_eq!(call("timestamp", vec![Value::from("2024-01-01T00:00:00.000")]), new_year);
        assert_eq!(call("timestamp", vec![Value::from("2024-01-01")]), new_year);
        assert_eq!(call("timestamp", vec![Value::Float(12.5)]), Value::Float(12.5));

        assert!(fails("timestamp", vec![Value::from("yesterday")]).contains("invalid date"));
        assert!(fails("timestamp", vec![Value::Bool(true)]).contains("boolean"));
        assert!(fails("timestamp", vec![]).contains("undefined"));
    }

    #[test]
    fn test_time_since() {
        let since_new_year = call("time-since", vec![Value::from("2024-01-01")]).to_number();
        let since_epoch = call("time-since", vec![Value::Int(0)]).to_number();

        assert!(since_new_year > 0.0);
        assert!(since_epoch - since_new_year >= 1_704_067_200_000.0);
        assert!(fails("time-since", vec![Value::Null]).contains("null"));
    }
}
