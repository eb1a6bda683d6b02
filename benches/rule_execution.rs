// benches/rule_execution.rs
//! Performance benchmarks for compiled rules
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use json_logic_compiler::{compile, compile_to_evaluator, link, Options, Value};
use serde_json::{json, Value as Json};

fn threshold_rule(count: usize) -> Json {
    let checks: Vec<Json> = (0..count)
        .map(|i| json!({">": [{"var": format!("f{}", i)}, i * 10]}))
        .collect();
    json!({ "and": checks })
}

fn wide_record(fields: usize) -> Value {
    let entries: serde_json::Map<String, Json> = (0..fields)
        .map(|i| (format!("f{}", i), json!(i * 10 + 5)))
        .collect();
    Value::from(Json::Object(entries))
}

fn benchmark_single_comparison(c: &mut Criterion) {
    let evaluator = compile_to_evaluator(&json!({">": [{"var": "amount"}, 1000]}), &Options::new()).unwrap();
    let record = Value::from(json!({"amount": 5000}));

    c.bench_function("single_comparison", |b| {
        b.iter(|| evaluator.evaluate(black_box(&record)))
    });
}

fn benchmark_conditional_pricing(c: &mut Criterion) {
    let rule = json!({"if": [
        {"and": [
            {"in": [{"var": "customer.tier"}, ["gold", "platinum"]]},
            {">=": [{"var": "cart.total"}, 100]}
        ]},
        {"*": [{"var": "cart.total"}, 0.8]},
        {"missing": ["customer.email"]},
        {"var": "cart.total"},
        {"-": [{"var": "cart.total"}, 5]}
    ]});
    let evaluator = compile_to_evaluator(&rule, &Options::new()).unwrap();
    let record = Value::from(json!({
        "customer": {"tier": "gold", "email": "a@b.c"},
        "cart": {"total": 250}
    }));

    c.bench_function("conditional_pricing", |b| {
        b.iter(|| evaluator.evaluate(black_box(&record)))
    });
}

fn benchmark_iteration(c: &mut Criterion) {
    let rule = json!({"reduce": [
        {"filter": [{"var": "orders"}, {">": [{"var": "amount"}, 50]}]},
        {"+": [{"var": "accumulator"}, {"var": "current.amount"}]},
        0
    ]});
    let evaluator = compile_to_evaluator(&rule, &Options::new()).unwrap();
    let orders: Vec<Json> = (0..100).map(|i| json!({"amount": i})).collect();
    let record = Value::from(json!({ "orders": orders }));

    c.bench_function("filter_reduce_100", |b| {
        b.iter(|| evaluator.evaluate(black_box(&record)))
    });
}

fn benchmark_extension_call(c: &mut Criterion) {
    let options = Options::new().with_operation("double", |args: &[Value]| {
        Ok(Value::from_f64(args.first().map_or(0.0, Value::to_number) * 2.0))
    });
    let evaluator = compile_to_evaluator(
        &json!({"map": [{"var": "xs"}, {"double": {"var": ""}}]}),
        &options,
    )
    .unwrap();
    let xs: Vec<i64> = (0..100).collect();
    let record = Value::from(json!({ "xs": xs }));

    c.bench_function("extension_map_100", |b| {
        b.iter(|| evaluator.evaluate(black_box(&record)))
    });
}

fn benchmark_compilation(c: &mut Criterion) {
    let rule = json!({"or": [
        {"and": [{">": [{"var": "a"}, 1]}, {"<": [{"var": "b"}, 2]}]},
        {"some": [{"var": "xs"}, {"==": [{"var": ""}, "x"]}]},
        {"in": [{"substr": [{"var": "s"}, 0, 3]}, ["abc", "def"]]}
    ]});
    let options = Options::new();

    c.bench_function("compile_rule", |b| {
        b.iter(|| compile(black_box(&rule), &options).unwrap())
    });

    let compiled = compile(&rule, &options).unwrap();
    c.bench_function("link_rule", |b| b.iter(|| link(black_box(&compiled))));
}

fn benchmark_by_check_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_count_scaling");

    for count in [1, 10, 50, 100, 250, 500].iter() {
        let evaluator = compile_to_evaluator(&threshold_rule(*count), &Options::new()).unwrap();
        let record = wide_record(*count);

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| evaluator.evaluate(black_box(&record)))
        });
    }

    group.finish();
}

fn benchmark_large_payload(c: &mut Criterion) {
    // Checks touch a small slice of a wide record
    let evaluator = compile_to_evaluator(&threshold_rule(20), &Options::new()).unwrap();
    let record = wide_record(5_000);

    c.bench_function("large_payload_20_checks", |b| {
        b.iter(|| evaluator.evaluate(black_box(&record)))
    });

    let json = Json::from(record);
    c.bench_function("large_payload_json_conversion", |b| {
        b.iter(|| evaluator.evaluate_json(black_box(&json)))
    });
}

criterion_group!(
    benches,
    benchmark_single_comparison,
    benchmark_conditional_pricing,
    benchmark_iteration,
    benchmark_extension_call,
    benchmark_compilation,
    benchmark_by_check_count,
    benchmark_large_payload,
);

criterion_main!(benches);
