use crate::comparison::truthy;
use crate::context::Context;
use crate::errors::Result;
use crate::expression::ENode;
use serde_json::Value;

/// Apply one `[predicate]` to the items a path step produced.
///
/// A numeric predicate selects by position (negative counts from the end);
/// anything else keeps the items for which the predicate is truthy.
pub(crate) fn apply_predicate<'c, F>(
    items: Vec<Value>,
    pred: &ENode,
    mut eval: F,
    cx: &mut Context<'c>,
) -> Result<Vec<Value>>
where
    F: FnMut(&Value, &mut Context<'c>) -> Result<Option<Value>>,
{
    if let ENode::Num(n) = pred {
        return Ok(select_index(items, n));
    }
    let len = items.len();
    let mut out = Vec::new();
    for (pos, candidate) in items.into_iter().enumerate() {
        let keep = match eval(&candidate, cx)? {
            Some(Value::Number(n)) => normalize_index(&n, len) == Some(pos),
            other => truthy(other.as_ref()),
        };
        if keep {
            out.push(candidate);
        }
    }
    Ok(out)
}

fn select_index(mut items: Vec<Value>, n: &serde_json::Number) -> Vec<Value> {
    match normalize_index(n, items.len()) {
        Some(idx) => vec![items.swap_remove(idx)],
        None => Vec::new(),
    }
}

/// Floor the number and resolve negative positions; `None` when out of range.
fn normalize_index(n: &serde_json::Number, len: usize) -> Option<usize> {
    let i = n.as_f64()?.floor() as i64;
    let len = len as i64;
    let idx = if i < 0 { len + i } else { i };
    (0..len).contains(&idx).then_some(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Options;
    use serde_json::json;

    fn items() -> Vec<Value> {
        vec![json!("a"), json!("b"), json!("c")]
    }

    fn pick(n: i64) -> Vec<Value> {
        let root = json!(null);
        let opts = Options::default();
        let mut cx = Context::new(&root, &opts);
        apply_predicate(items(), &ENode::Num(n.into()), |_, _| Ok(None), &mut cx).unwrap()
    }

    #[test]
    fn literal_index_selection() {
        assert_eq!(pick(0), vec![json!("a")]);
        assert_eq!(pick(-1), vec![json!("c")]);
        assert!(pick(3).is_empty());
    }

    #[test]
    fn truthy_filter_keeps_order() {
        let root = json!(null);
        let opts = Options::default();
        let mut cx = Context::new(&root, &opts);
        let out = apply_predicate(
            items(),
            &ENode::Bool(true),
            |v, _| Ok(Some(Value::Bool(v != &json!("b")))),
            &mut cx,
        )
        .unwrap();
        assert_eq!(out, vec![json!("a"), json!("c")]);
    }
}
