use schema_mapping as sm;
use sm::errors::EvalError;
use sm::{BatchRunner, MappingExpression};
use serde_json::json;

// One syntactically broken rule must not cost the record the other rules' output.
#[test]
fn test_error_isolation_in_iterative_batch() {
    let exprs = vec![
        MappingExpression::new("first", r#"{ "A": a }"#),
        MappingExpression::new("second", r#"{ "B": b "#).with_name("Broken"),
        MappingExpression::new("third", r#"{ "C": c }"#),
    ];
    let out = BatchRunner::default().run_iterative(&exprs, &json!({"a": 1, "b": 2, "c": 3}));
    assert_eq!(out.output, json!({"A": 1, "C": 3}));
    assert_eq!(out.errors.len(), 1);
    let err = &out.errors[0];
    assert_eq!(err.key, "second");
    assert_eq!(err.name.as_deref(), Some("Broken"));
    assert_eq!(err.expression, r#"{ "B": b "#);
    assert!(err.message.starts_with("parse error:"), "got: {}", err.message);
}

#[test]
fn test_runtime_failure_is_isolated_too() {
    let exprs = vec![
        MappingExpression::new("sum", r#"{ "Total": name + 1 }"#),
        MappingExpression::new("ok", r#"{ "Name": name }"#),
    ];
    let out = BatchRunner::default().run_iterative(&exprs, &json!({"name": "x"}));
    assert_eq!(out.output, json!({"Name": "x"}));
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].message.starts_with("runtime error:"));
}

#[test]
fn test_parse_errors_surface_from_evaluator() {
    let err = sm::evaluate("{ \"a\": 1", &json!({})).unwrap_err();
    assert!(matches!(err, EvalError::Parse(_)), "got: {err:?}");
    let err = sm::evaluate("$unknown(1)", &json!({})).unwrap_err();
    assert!(matches!(err, EvalError::Runtime(_)), "got: {err:?}");
}

#[test]
fn test_errors_serialize_with_wire_names() {
    let exprs = vec![MappingExpression::new("k", "(")];
    let out = BatchRunner::default().run_iterative(&exprs, &json!({}));
    let wire = serde_json::to_value(&out).unwrap();
    assert_eq!(wire["errors"][0]["key"], json!("k"));
    assert_eq!(wire["errors"][0]["expression"], json!("("));
    assert!(wire["errors"][0].get("name").is_none());
}

#[test]
fn test_deeply_nested_rule_is_an_error_not_a_crash() {
    let deep = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
    let exprs = vec![
        MappingExpression::new("first", r#"{ "A": a }"#),
        MappingExpression::new("deep", deep),
        MappingExpression::new("negations", "-".repeat(50_000) + "1"),
        MappingExpression::new("third", r#"{ "C": c }"#),
    ];
    let out = BatchRunner::default().run_iterative(&exprs, &json!({"a": 1, "c": 3}));
    assert_eq!(out.output, json!({"A": 1, "C": 3}));
    assert_eq!(out.errors.len(), 2);
    assert_eq!(out.errors[0].key, "deep");
    assert!(out.errors[0].message.starts_with("parse error:"), "got: {}", out.errors[0].message);
    assert_eq!(out.errors[1].key, "negations");
}
