use crate::comparison::{cmp_values, display_string, truthy, type_name, values_equal};
use crate::context::Context;
use crate::errors::{EvalError, Result};
use crate::expression::{BinOp, ENode, Step};
use crate::filter::apply_predicate;
use crate::functions::Registry;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Evaluate a parsed expression with `input` as both context item and root.
/// `Ok(None)` means the expression produced no value (undefined).
pub(crate) fn evaluate(
    node: &ENode,
    input: &Value,
    registry: &Registry,
    cx: &mut Context<'_>,
) -> Result<Option<Value>> {
    Engine { registry }.eval(node, input, cx)
}

/// Wrap an `f64` result; whole numbers come back as integers.
pub fn number_value(f: f64) -> Result<Value> {
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(f as i64));
    }
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EvalError::runtime("number out of range"))
}

struct Engine<'r> {
    registry: &'r Registry,
}

impl Engine<'_> {
    fn eval(&self, node: &ENode, item: &Value, cx: &mut Context<'_>) -> Result<Option<Value>> {
        if cx.depth >= cx.max_depth {
            return Err(EvalError::runtime(format!(
                "maximum evaluation depth {} exceeded",
                cx.max_depth
            )));
        }
        cx.depth += 1;
        let out = self.eval_node(node, item, cx);
        cx.depth -= 1;
        out
    }

    fn eval_node(&self, node: &ENode, item: &Value, cx: &mut Context<'_>) -> Result<Option<Value>> {
        match node {
            ENode::Str(s) => Ok(Some(Value::String(s.clone()))),
            ENode::Num(n) => Ok(Some(Value::Number(n.clone()))),
            ENode::Bool(b) => Ok(Some(Value::Bool(*b))),
            ENode::Null => Ok(Some(Value::Null)),
            ENode::Context => Ok(Some(item.clone())),
            ENode::Root => Ok(Some(cx.root.clone())),
            ENode::Var(_) => Ok(None),
            ENode::Name(n) => {
                let mut found = Vec::new();
                lookup_field(item, n, &mut found);
                Ok(collapse(found))
            }
            ENode::Path(steps) => self.eval_path(steps, item, cx),
            ENode::Object(pairs) => self.eval_object(pairs, item, cx),
            ENode::Array(elems) => {
                let mut out = Vec::new();
                for e in elems {
                    match (self.eval(e, item, cx)?, e) {
                        (None, _) => {}
                        // sequences produced by paths are spliced in
                        (Some(Value::Array(a)), ENode::Path(_)) => out.extend(a),
                        (Some(v), _) => out.push(v),
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            ENode::Block(body) => {
                let mut last = None;
                for e in body {
                    last = self.eval(e, item, cx)?;
                }
                Ok(last)
            }
            ENode::Call { name, args } => self.eval_call(name, args, item, cx),
            ENode::Neg(inner) => match self.eval(inner, item, cx)? {
                None => Ok(None),
                Some(v) => {
                    let f = v.as_f64().ok_or_else(|| {
                        EvalError::runtime(format!("cannot negate {}", type_name(&v)))
                    })?;
                    number_value(-f).map(Some)
                }
            },
            ENode::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, item, cx),
            ENode::Condition { cond, then, otherwise } => {
                if truthy(self.eval(cond, item, cx)?.as_ref()) {
                    self.eval(then, item, cx)
                } else if let Some(e) = otherwise {
                    self.eval(e, item, cx)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Each step runs once per item of the previous step's output; array results are flattened.
    fn eval_path(&self, steps: &[Step], item: &Value, cx: &mut Context<'_>) -> Result<Option<Value>> {
        let mut current = vec![item.clone()];
        for step in steps {
            let mut next = Vec::new();
            for it in &current {
                let mut produced = Vec::new();
                match &step.node {
                    ENode::Name(n) => lookup_field(it, n, &mut produced),
                    other => match self.eval(other, it, cx)? {
                        None => {}
                        Some(Value::Array(a)) => produced.extend(a),
                        Some(v) => produced.push(v),
                    },
                }
                for pred in &step.predicates {
                    produced = apply_predicate(produced, pred, |candidate, cx| self.eval(pred, candidate, cx), cx)?;
                }
                next.extend(produced);
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        Ok(collapse(current))
    }

    fn eval_object(
        &self,
        pairs: &[(ENode, ENode)],
        item: &Value,
        cx: &mut Context<'_>,
    ) -> Result<Option<Value>> {
        let mut out = Map::new();
        for (key_node, value_node) in pairs {
            let key = match self.eval(key_node, item, cx)? {
                Some(Value::String(s)) => s,
                None => continue,
                Some(other) => {
                    return Err(EvalError::runtime(format!(
                        "object key must be a string, got {}",
                        type_name(&other)
                    )))
                }
            };
            if let Some(v) = self.eval(value_node, item, cx)? {
                out.insert(key, v);
            }
        }
        Ok(Some(Value::Object(out)))
    }

    fn eval_call(
        &self,
        name: &str,
        args: &[ENode],
        item: &Value,
        cx: &mut Context<'_>,
    ) -> Result<Option<Value>> {
        let func = self
            .registry
            .get(name)
            .ok_or_else(|| EvalError::runtime(format!("unknown function ${name}")))?;
        if !func.arity().contains(&args.len()) {
            return Err(EvalError::runtime(format!(
                "${name} called with {} argument(s)",
                args.len()
            )));
        }
        let values = args
            .iter()
            .map(|a| self.eval(a, item, cx))
            .collect::<Result<Vec<_>>>()?;
        func.call(&values)
    }

    fn eval_binary(
        &self,
        op: BinOp,
        lhs: &ENode,
        rhs: &ENode,
        item: &Value,
        cx: &mut Context<'_>,
    ) -> Result<Option<Value>> {
        match op {
            BinOp::And => {
                let l = truthy(self.eval(lhs, item, cx)?.as_ref());
                let r = l && truthy(self.eval(rhs, item, cx)?.as_ref());
                return Ok(Some(Value::Bool(r)));
            }
            BinOp::Or => {
                let l = truthy(self.eval(lhs, item, cx)?.as_ref());
                let r = l || truthy(self.eval(rhs, item, cx)?.as_ref());
                return Ok(Some(Value::Bool(r)));
            }
            _ => {}
        }
        let l = self.eval(lhs, item, cx)?;
        let r = self.eval(rhs, item, cx)?;
        match op {
            BinOp::Concat => {
                let mut s = l.as_ref().map(display_string).unwrap_or_default();
                s.push_str(&r.as_ref().map(display_string).unwrap_or_default());
                Ok(Some(Value::String(s)))
            }
            BinOp::Eq | BinOp::Ne => {
                let eq = match (&l, &r) {
                    (Some(a), Some(b)) => values_equal(a, b),
                    _ => false,
                };
                let result = if op == BinOp::Eq { eq } else { !eq && l.is_some() && r.is_some() };
                Ok(Some(Value::Bool(result)))
            }
            BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => {
                let (Some(a), Some(b)) = (&l, &r) else { return Ok(Some(Value::Bool(false))) };
                let ord = cmp_values(a, b)?;
                let result = match op {
                    BinOp::Lt => ord == Ordering::Less,
                    BinOp::Lte => ord != Ordering::Greater,
                    BinOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                Ok(Some(Value::Bool(result)))
            }
            _ => arithmetic(op, l, r),
        }
    }
}

fn arithmetic(op: BinOp, l: Option<Value>, r: Option<Value>) -> Result<Option<Value>> {
    let (Some(l), Some(r)) = (l, r) else { return Ok(None) };
    let operand = |v: &Value| {
        v.as_f64().ok_or_else(|| {
            EvalError::runtime(format!(
                "arithmetic operand must be a number, got {}",
                type_name(v)
            ))
        })
    };
    let (a, b) = (operand(&l)?, operand(&r)?);
    if let (Some(ia), Some(ib)) = (l.as_i64(), r.as_i64()) {
        let exact = match op {
            BinOp::Add => ia.checked_add(ib),
            BinOp::Sub => ia.checked_sub(ib),
            BinOp::Mul => ia.checked_mul(ib),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Some(Value::from(v)));
        }
    }
    let f = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::Mod if b == 0.0 => {
            return Err(EvalError::runtime("division by zero"));
        }
        BinOp::Div => a / b,
        _ => a % b,
    };
    number_value(f).map(Some)
}

/// Field access that maps over arrays and flattens array-valued fields.
fn lookup_field(v: &Value, name: &str, out: &mut Vec<Value>) {
    match v {
        Value::Object(map) => match map.get(name) {
            Some(Value::Array(a)) => out.extend(a.iter().cloned()),
            Some(found) => out.push(found.clone()),
            None => {}
        },
        Value::Array(arr) => {
            for elt in arr {
                lookup_field(elt, name, out);
            }
        }
        _ => {}
    }
}

/// Empty → undefined, one → the value itself, more → an array.
fn collapse(mut seq: Vec<Value>) -> Option<Value> {
    match seq.len() {
        0 => None,
        1 => seq.pop(),
        _ => Some(Value::Array(seq)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Options;
    use crate::expression::parse_expr;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(expr: &str, input: &Value) -> Result<Option<Value>> {
        let ast = parse_expr(expr).map_err(|e| EvalError::Parse(e.to_string()))?;
        let opts = Options::default();
        let mut cx = Context::new(input, &opts);
        evaluate(&ast, input, &Registry::with_builtins(), &mut cx)
    }

    fn sample() -> Value {
        json!({
            "School": "North",
            "Students": [
                {"Name": "Ann", "Age": 12, "Tags": ["a", "b"]},
                {"Name": "Bo", "Age": 9, "Tags": ["c"]}
            ]
        })
    }

    #[test]
    fn path_over_array_maps_and_flattens() {
        assert_eq!(run("Students.Name", &sample()).unwrap(), Some(json!(["Ann", "Bo"])));
        assert_eq!(run("Students.Tags", &sample()).unwrap(), Some(json!(["a", "b", "c"])));
        assert_eq!(run("Missing.Name", &sample()).unwrap(), None);
    }

    #[test]
    fn per_element_object_mapping() {
        let out = run(r#"{ "Persons": [Students.{ "FullName": Name }] }"#, &sample()).unwrap();
        assert_eq!(out, Some(json!({"Persons": [{"FullName": "Ann"}, {"FullName": "Bo"}]})));
    }

    #[test]
    fn singleton_sequence_is_unwrapped_but_array_constructor_keeps_it() {
        let input = json!({"Students": [{"Name": "Ann"}]});
        assert_eq!(run("Students.{ \"N\": Name }", &input).unwrap(), Some(json!({"N": "Ann"})));
        assert_eq!(run("[Students.{ \"N\": Name }]", &input).unwrap(), Some(json!([{"N": "Ann"}])));
    }

    #[test]
    fn predicates_filter_and_index() {
        assert_eq!(run("Students[Age > 10].Name", &sample()).unwrap(), Some(json!("Ann")));
        assert_eq!(run("Students[-1].Name", &sample()).unwrap(), Some(json!("Bo")));
    }

    #[test]
    fn undefined_values_drop_object_keys() {
        let out = run(r#"{ "a": Missing, "b": School }"#, &sample()).unwrap();
        assert_eq!(out, Some(json!({"b": "North"})));
    }

    #[test]
    fn context_and_root_references() {
        let out = run(r#"Students.{ "n": $.Name, "s": $$.School }"#, &sample()).unwrap();
        assert_eq!(out, Some(json!([{"n": "Ann", "s": "North"}, {"n": "Bo", "s": "North"}])));
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(run("1 + 2 * 3", &json!({})).unwrap(), Some(json!(7)));
        assert_eq!(run("7 / 2", &json!({})).unwrap(), Some(json!(3.5)));
        assert_eq!(run("School & '-' & 1", &sample()).unwrap(), Some(json!("North-1")));
        assert!(run("School + 1", &sample()).is_err());
        assert!(run("1 / 0", &json!({})).is_err());
    }

    #[test]
    fn conditional_expression() {
        let out = run(r#"Students.(Age >= 10 ? "teen" : "child")"#, &sample()).unwrap();
        assert_eq!(out, Some(json!(["teen", "child"])));
    }

    #[test]
    fn unknown_function_is_a_runtime_error() {
        let err = run("$nope(1)", &json!({})).unwrap_err();
        assert_eq!(err, EvalError::Runtime("unknown function $nope".into()));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let ast = parse_expr("((((((1))))))").unwrap();
        let input = json!({});
        let opts = Options { max_depth: 3, ..Options::default() };
        let mut cx = Context::new(&input, &opts);
        assert!(evaluate(&ast, &input, &Registry::with_builtins(), &mut cx).is_err());
    }
}
