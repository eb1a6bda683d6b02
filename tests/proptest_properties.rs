use json_logic_compiler::{compile, compile_to_evaluator, Options, Value};
use proptest::prelude::*;
use serde_json::{json, Value as Json};

/// Generate a random JSON scalar.
fn arb_scalar() -> impl Strategy<Value = Json> {
    prop_oneof![
        Just(Json::Null),
        any::<bool>().prop_map(Json::from),
        (-1000_i64..1000).prop_map(Json::from),
        // Integral floats read back as integers
        (-1000.0_f64..1000.0)
            .prop_filter("must have a fraction", |f| f.fract() != 0.0)
            .prop_map(Json::from),
        "[a-z]{0,6}".prop_map(Json::from),
    ]
}

/// Generate a JSON value up to two levels deep.
fn arb_json() -> impl Strategy<Value = Json> {
    arb_scalar().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Json::from),
            prop::collection::btree_map("[a-c]", inner, 0..3)
                .prop_map(|map| Json::Object(map.into_iter().collect())),
        ]
    })
}

/// Generate a key from a small alphabet to increase collisions.
fn arb_key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_owned)
}

/// Generate an input record over the small key alphabet.
fn arb_record() -> impl Strategy<Value = Json> {
    prop::collection::btree_map(arb_key(), arb_json(), 0..4)
        .prop_map(|map| Json::Object(map.into_iter().collect()))
}

/// Truthiness as `and`/`or` decide it: empty arrays are falsy.
fn truthy(value: &Json) -> bool {
    Value::from(value).is_truthy()
}

fn eval(rule: &Json, data: &Json) -> Json {
    compile_to_evaluator(rule, &Options::new())
        .unwrap()
        .evaluate_json(data)
        .unwrap()
}

proptest! {
    /// The default is used exactly when the path is absent or null.
    #[test]
    fn var_default_applies_to_absent_paths(
        record in arb_record(),
        key in arb_key(),
        default in arb_scalar(),
    ) {
        let rule = json!({"var": [key.clone(), default.clone()]});
        let result = eval(&rule, &record);

        match record.get(&key) {
            Some(found) if !found.is_null() => prop_assert_eq!(&result, found),
            _ => prop_assert_eq!(&result, &default),
        }
    }

    /// `all` over an empty array is false for any predicate.
    #[test]
    fn all_over_empty_array_is_false(predicate in arb_scalar()) {
        let rule = json!({"all": [[], predicate]});
        prop_assert_eq!(eval(&rule, &Json::Null), json!(false));
    }

    /// `and`/`or` return one of their operands, chosen by truthiness.
    #[test]
    fn and_or_return_operands(operands in prop::collection::vec(arb_scalar(), 1..5)) {
        let and = eval(&json!({"and": operands.clone()}), &Json::Null);
        let expected_and = operands
            .iter()
            .find(|operand| !truthy(operand))
            .unwrap_or(operands.last().unwrap());
        prop_assert_eq!(&and, expected_and);

        let or = eval(&json!({"or": operands.clone()}), &Json::Null);
        let expected_or = operands
            .iter()
            .find(|operand| truthy(operand))
            .unwrap_or(operands.last().unwrap());
        prop_assert_eq!(&or, expected_or);
    }

    /// Operand values read from the record behave like literal operands.
    #[test]
    fn and_with_record_operands(record in arb_record()) {
        let rule = json!({"and": [{"var": "a"}, {"var": "b"}]});
        let a = record.get("a").cloned().unwrap_or(Json::Null);
        let b = record.get("b").cloned().unwrap_or(Json::Null);

        let expected = if truthy(&a) { b } else { a };
        prop_assert_eq!(eval(&rule, &record), expected);
    }

    /// Merge flattens exactly one level.
    #[test]
    fn merge_flattens_one_level(items in prop::collection::vec(arb_json(), 0..5)) {
        let record = json!({"items": items.clone()});
        let args: Vec<Json> = (0..items.len())
            .map(|index| json!({"var": format!("items.{}", index)}))
            .collect();
        let result = eval(&json!({"merge": args}), &record);

        let mut expected = Vec::new();
        for item in items {
            match item {
                Json::Array(inner) => expected.extend(inner),
                // Absent and null paths both read as null
                other => expected.push(other),
            }
        }
        prop_assert_eq!(result, Json::Array(expected));
    }

    /// `missing_some` is empty when enough keys are present, else `missing`.
    #[test]
    fn missing_some_agrees_with_missing(
        record in arb_record(),
        keys in prop::collection::vec(arb_key(), 0..4),
        min in 0_i64..4,
        nested in any::<bool>(),
    ) {
        let missing = eval(&json!({"missing": [keys.clone()]}), &record);
        // A list wrapped in one more array stands for the same keys
        let key_arg = if nested { json!([keys.clone()]) } else { json!(keys.clone()) };
        let some = eval(&json!({"missing_some": [min, key_arg]}), &record);

        let mut distinct = keys.clone();
        distinct.sort();
        distinct.dedup();
        let absent = missing.as_array().map_or(0, Vec::len);
        let present = (distinct.len() - absent) as i64;

        if present >= min {
            prop_assert_eq!(some, json!([]));
        } else {
            prop_assert_eq!(some, missing);
        }
    }

    /// Compiling the same rule twice yields the same program.
    #[test]
    fn compile_is_deterministic(key in arb_key(), value in arb_scalar()) {
        let rule = json!({"if": [
            {"==": [{"var": key.clone()}, value.clone()]},
            {"merge": [{"var": key}, [value]]},
            {"substr": ["abcdef", 2]}
        ]});
        let first = compile(&rule, &Options::new()).unwrap();
        let second = compile(&rule, &Options::new()).unwrap();

        prop_assert_eq!(first.source(), second.source());
    }

    /// Evaluation never panics on arbitrary records.
    #[test]
    fn evaluation_never_panics(record in arb_record()) {
        let rule = json!({"or": [
            {"in": [{"var": "a"}, {"var": "b"}]},
            {"map": [{"var": "c"}, {"cat": [{"var": ""}, "!"]}]},
            {"reduce": [{"var": "d"}, {"+": [{"var": "current"}, {"var": "accumulator"}]}, 0]}
        ]});
        let evaluator = compile_to_evaluator(&rule, &Options::new()).unwrap();
        let _ = evaluator.evaluate_json(&record);
    }
}
