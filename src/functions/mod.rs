use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use crate::errors::Result;

/// Trait for pluggable `$name(...)` functions used by the expression evaluator.
///
/// `None` stands for an undefined argument or result (a path that matched nothing).
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> std::ops::RangeInclusive<usize>;
    fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>>;
}

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(builtins::Merge);
        reg.register(builtins::StringFn);
        reg.register(builtins::NumberFn);
        reg.register(builtins::BooleanFn);
        reg.register(builtins::Not);
        reg.register(builtins::Exists);
        reg.register(builtins::Count);
        reg.register(builtins::Sum);
        reg.register(builtins::Upper);
        reg.register(builtins::Lower);
        reg.register(builtins::Trim);
        reg.register(builtins::Join);
        reg.register(builtins::Distinct);
        reg.register(builtins::Keys);
        reg
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }
}

pub mod builtins {
    use super::*;
    use crate::comparison::{display_string, truthy, type_name};
    use crate::errors::EvalError;
    use itertools::Itertools;
    use serde_json::Map;

    fn arg(args: &[Option<Value>], i: usize) -> Option<&Value> {
        args.get(i).and_then(|a| a.as_ref())
    }

    /// Undefined → empty, array → its elements, anything else → itself.
    fn items(v: Option<&Value>) -> Vec<&Value> {
        match v {
            None => Vec::new(),
            Some(Value::Array(a)) => a.iter().collect(),
            Some(other) => vec![other],
        }
    }

    fn string_arg<'a>(fname: &str, v: &'a Value) -> Result<&'a str> {
        v.as_str().ok_or_else(|| {
            EvalError::runtime(format!("${fname}: expected a string, got {}", type_name(v)))
        })
    }

    /// Shallow merge; later objects override earlier keys.
    pub struct Merge;
    impl Function for Merge {
        fn name(&self) -> &'static str { "merge" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=usize::MAX }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            let mut out = Map::new();
            for v in args.iter().flat_map(|a| items(a.as_ref())) {
                match v {
                    Value::Object(m) => {
                        for (k, val) in m {
                            out.insert(k.clone(), val.clone());
                        }
                    }
                    Value::Null => {}
                    other => {
                        return Err(EvalError::runtime(format!(
                            "$merge: expected objects, got {}",
                            type_name(other)
                        )))
                    }
                }
            }
            Ok(Some(Value::Object(out)))
        }
    }

    pub struct StringFn;
    impl Function for StringFn {
        fn name(&self) -> &'static str { "string" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            Ok(arg(args, 0).map(|v| Value::String(display_string(v))))
        }
    }

    pub struct NumberFn;
    impl Function for NumberFn {
        fn name(&self) -> &'static str { "number" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            let Some(v) = arg(args, 0) else { return Ok(None) };
            match v {
                Value::Number(_) => Ok(Some(v.clone())),
                Value::Bool(b) => Ok(Some(Value::from(*b as i64))),
                Value::String(s) => {
                    let f: f64 = s.trim().parse().map_err(|_| {
                        EvalError::runtime(format!("$number: cannot convert {s:?} to a number"))
                    })?;
                    crate::engine::number_value(f).map(Some)
                }
                other => Err(EvalError::runtime(format!(
                    "$number: cannot convert {} to a number",
                    type_name(other)
                ))),
            }
        }
    }

    pub struct BooleanFn;
    impl Function for BooleanFn {
        fn name(&self) -> &'static str { "boolean" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            Ok(arg(args, 0).map(|v| Value::Bool(truthy(Some(v)))))
        }
    }

    pub struct Not;
    impl Function for Not {
        fn name(&self) -> &'static str { "not" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            Ok(arg(args, 0).map(|v| Value::Bool(!truthy(Some(v)))))
        }
    }

    pub struct Exists;
    impl Function for Exists {
        fn name(&self) -> &'static str { "exists" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            Ok(Some(Value::Bool(arg(args, 0).is_some())))
        }
    }

    pub struct Count;
    impl Function for Count {
        fn name(&self) -> &'static str { "count" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            Ok(Some(Value::from(items(arg(args, 0)).len())))
        }
    }

    pub struct Sum;
    impl Function for Sum {
        fn name(&self) -> &'static str { "sum" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            let mut total = 0.0;
            for v in items(arg(args, 0)) {
                total += v.as_f64().ok_or_else(|| {
                    EvalError::runtime(format!("$sum: expected numbers, got {}", type_name(v)))
                })?;
            }
            crate::engine::number_value(total).map(Some)
        }
    }

    pub struct Upper;
    impl Function for Upper {
        fn name(&self) -> &'static str { "uppercase" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            let Some(v) = arg(args, 0) else { return Ok(None) };
            Ok(Some(Value::String(string_arg(self.name(), v)?.to_uppercase())))
        }
    }

    pub struct Lower;
    impl Function for Lower {
        fn name(&self) -> &'static str { "lowercase" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            let Some(v) = arg(args, 0) else { return Ok(None) };
            Ok(Some(Value::String(string_arg(self.name(), v)?.to_lowercase())))
        }
    }

    /// Trims both ends and collapses inner whitespace runs to one space.
    pub struct Trim;
    impl Function for Trim {
        fn name(&self) -> &'static str { "trim" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            let Some(v) = arg(args, 0) else { return Ok(None) };
            let s = string_arg(self.name(), v)?;
            Ok(Some(Value::String(s.split_whitespace().join(" "))))
        }
    }

    pub struct Join;
    impl Function for Join {
        fn name(&self) -> &'static str { "join" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=2 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            let sep = match arg(args, 1) {
                Some(v) => string_arg(self.name(), v)?,
                None => "",
            };
            let parts = items(arg(args, 0))
                .into_iter()
                .map(|v| string_arg(self.name(), v))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Value::String(parts.join(sep))))
        }
    }

    pub struct Distinct;
    impl Function for Distinct {
        fn name(&self) -> &'static str { "distinct" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            Ok(arg(args, 0).map(|v| match v {
                Value::Array(a) => Value::Array(
                    a.iter()
                        .unique_by(|x| crate::merge::canonical_key(x))
                        .cloned()
                        .collect(),
                ),
                other => other.clone(),
            }))
        }
    }

    pub struct Keys;
    impl Function for Keys {
        fn name(&self) -> &'static str { "keys" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Option<Value>]) -> Result<Option<Value>> {
            let keys: Vec<Value> = items(arg(args, 0))
                .into_iter()
                .filter_map(Value::as_object)
                .flat_map(|m| m.keys())
                .unique()
                .map(|k| Value::String(k.clone()))
                .collect();
            Ok(if keys.is_empty() { None } else { Some(Value::Array(keys)) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<Option<Value>>) -> Result<Option<Value>> {
        Registry::with_builtins().get(name).expect("builtin").call(&args)
    }

    #[test]
    fn merge_is_shallow_and_ordered() {
        let out = call("merge", vec![Some(json!([{"a": {"x": 1}, "b": 1}, {"a": {"y": 2}}]))]).unwrap();
        assert_eq!(out, Some(json!({"a": {"y": 2}, "b": 1})));
    }

    #[test]
    fn merge_rejects_scalars() {
        assert!(call("merge", vec![Some(json!([{"a": 1}, 3]))]).is_err());
    }

    #[test]
    fn undefined_propagates_through_string_functions() {
        assert_eq!(call("uppercase", vec![None]).unwrap(), None);
        assert_eq!(call("exists", vec![None]).unwrap(), Some(json!(false)));
        assert_eq!(call("count", vec![None]).unwrap(), Some(json!(0)));
    }

    #[test]
    fn custom_function_registration() {
        struct Answer;
        impl Function for Answer {
            fn name(&self) -> &'static str { "answer" }
            fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
            fn call(&self, _args: &[Option<Value>]) -> Result<Option<Value>> {
                Ok(Some(json!(42)))
            }
        }
        let mut reg = Registry::new();
        reg.register(Answer);
        assert_eq!(reg.get("answer").unwrap().call(&[]).unwrap(), Some(json!(42)));
        assert!(reg.get("merge").is_none());
    }
}
