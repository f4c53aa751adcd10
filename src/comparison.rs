use crate::errors::{EvalError, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// Ordering for `<`, `<=`, `>`, `>=`. Both sides must be numbers or both strings.
pub fn cmp_values(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::String(sa), Value::String(sb)) => Ok(sa.cmp(sb)),
        (Value::Number(na), Value::Number(nb)) => {
            if let (Some(ia), Some(ib)) = (na.as_i64(), nb.as_i64()) {
                return Ok(ia.cmp(&ib));
            }
            let (da, db) = (na.as_f64().unwrap_or(f64::NAN), nb.as_f64().unwrap_or(f64::NAN));
            da.partial_cmp(&db)
                .ok_or_else(|| EvalError::runtime("numbers are not comparable"))
        }
        _ => Err(EvalError::runtime(format!(
            "cannot compare {} with {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

/// Structural equality where `1` and `1.0` are the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(na), Value::Number(nb)) => match (na.as_i64(), nb.as_i64()) {
            (Some(ia), Some(ib)) => ia == ib,
            _ => na.as_f64() == nb.as_f64(),
        },
        (Value::Array(xa), Value::Array(xb)) => {
            xa.len() == xb.len() && xa.iter().zip(xb).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(ma), Value::Object(mb)) => {
            ma.len() == mb.len()
                && ma
                    .iter()
                    .all(|(k, v)| mb.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Boolean cast used by `and`, `or`, `? :` and filter predicates.
pub fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => a.iter().any(|x| truthy(Some(x))),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// String form used by `&` and `$string`: strings verbatim, everything else as JSON.
pub fn display_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mixed_types_do_not_compare() {
        assert!(cmp_values(&json!(1), &json!("1")).is_err());
        assert_eq!(cmp_values(&json!(1), &json!(2.5)).unwrap(), Ordering::Less);
        assert_eq!(cmp_values(&json!("b"), &json!("a")).unwrap(), Ordering::Greater);
    }

    #[test]
    fn integer_and_float_are_equal() {
        assert!(values_equal(&json!({"a": [1]}), &json!({"a": [1.0]})));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&json!([0, ""]))));
        assert!(truthy(Some(&json!([0, "x"]))));
        assert!(!truthy(Some(&json!({}))));
    }
}
