// demos/basic_usage.rs
//! Basic usage example of the rule compiler

use json_logic_compiler::operations::extra::extra_operations;
use json_logic_compiler::{compile, link, Options, Value};
use serde_json::json;

fn main() {
    println!("=== JSON Logic Compiler - Basic Usage ===\n");

    // Shipping policy: free over a threshold, discounted for members,
    // otherwise a flat fee scaled by parcel weight
    let rule = json!({"if": [
        {">=": [{"var": "order.total"}, 100]}, 0,
        {"in": ["member", {"var": "customer.tags"}]},
        {"log": {"*": [{"var": "order.weight"}, 0.5]}},
        {"round": {"+": [4.99, {"*": [{"var": "order.weight"}, 1.2]}]}}
    ]});

    let options = Options::new()
        .with_operations(extra_operations())
        .with_log_sink(|value: &Value| println!("  [log] {}", value));

    // Compile rules
    println!("Compiling rule...");
    let compiled = compile(&rule, &options).expect("Failed to compile rule");
    println!("✓ Rule compiled successfully\n");

    println!("Program:");
    println!("{}", compiled.source());

    let evaluator = link(&compiled);
    println!("Linked: {:?}\n", evaluator);

    let records = [
        (
            "Large order",
            json!({"order": {"total": 180, "weight": 4}, "customer": {"tags": []}}),
        ),
        (
            "Member",
            json!({"order": {"total": 40, "weight": 3}, "customer": {"tags": ["member"]}}),
        ),
        (
            "Guest",
            json!({"order": {"total": 40, "weight": 3}, "customer": {"tags": ["new"]}}),
        ),
        ("Empty record", json!({})),
    ];

    for (name, record) in &records {
        println!("{}: {}", name, record);
        match evaluator.evaluate_json(record) {
            Ok(fee) => println!("  shipping = {}\n", fee),
            Err(e) => println!("  error: {}\n", e),
        }
    }

    // Errors carry the offending subrule
    println!("Compiling a rule with an unknown operator...");
    match compile(&json!({"and": [true, {"frobnicate": [1]}]}), &Options::new()) {
        Ok(_) => println!("  unexpectedly compiled"),
        Err(e) => println!("  error: {}", e),
    }

    println!("\n=== Example Complete ===");
}
