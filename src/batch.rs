//! Runs a set of mapping expressions against one input document.
//!
//! Two strategies with different merge semantics:
//! * iterative: evaluate each expression separately and deep-merge the
//!   results; a failing expression is reported and the rest still contribute.
//! * combined: rewrite every expression into one `$merge([...])` call and
//!   evaluate once; later fragments override top-level keys (shallow).

use crate::errors::EvalError;
use crate::merge::merge_into;
use crate::Evaluator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

/// Key used for the error entry when a combined evaluation fails.
pub const COMBINED_ERROR_KEY: &str = "$combined";

/// One declarative rule projecting part of a source record into the target record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingExpression {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "expressionText")]
    pub expression: String,
    #[serde(default, alias = "languageTag", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl MappingExpression {
    pub fn new(key: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            expression: expression.into(),
            language: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Trimmed display name when non-empty, otherwise the key.
    pub fn output_key(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n,
            _ => self.key.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationError {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expression: String,
    pub message: String,
}

impl EvaluationError {
    fn from_failure(expr: &MappingExpression, err: &EvalError) -> Self {
        Self {
            key: expr.key.clone(),
            name: expr.name.clone(),
            expression: expr.expression.clone(),
            message: err.to_string(),
        }
    }
}

/// Composite output plus the per-expression failures that did not contribute to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutput {
    pub output: Value,
    pub errors: Vec<EvaluationError>,
}

impl BatchOutput {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of [`BatchRunner::build_combined`]. `count == 0` means there is nothing to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedExpression {
    pub text: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Iterative,
    Combined,
}

pub struct BatchRunner {
    evaluator: Evaluator,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(Evaluator::default())
    }
}

impl BatchRunner {
    pub fn new(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn run(&self, strategy: Strategy, expressions: &[MappingExpression], input: &Value) -> BatchOutput {
        match strategy {
            Strategy::Iterative => self.run_iterative(expressions, input),
            Strategy::Combined => self.run_combined(expressions, input),
        }
    }

    /// Evaluate in input order, deep-merging object results into the output.
    pub fn run_iterative(&self, expressions: &[MappingExpression], input: &Value) -> BatchOutput {
        let mut output = Value::Object(Map::new());
        let mut errors = Vec::new();
        for expr in expressions.iter().filter(|e| self.qualifies(e)) {
            trace!(key = %expr.key, "evaluating mapping expression");
            match self.evaluator.evaluate_optional(&expr.expression, input) {
                Ok(Some(value @ Value::Object(_))) => merge_into(&mut output, &value),
                Ok(Some(value)) => {
                    if let Some(map) = output.as_object_mut() {
                        map.insert(expr.output_key().to_string(), value);
                    }
                }
                Ok(None) => trace!(key = %expr.key, "expression produced no value"),
                Err(err) => {
                    warn!(key = %expr.key, error = %err, "mapping expression failed");
                    errors.push(EvaluationError::from_failure(expr, &err));
                }
            }
        }
        BatchOutput { output, errors }
    }

    /// Rewrite the qualifying expressions into one shallow-merge expression.
    pub fn build_combined(&self, expressions: &[MappingExpression]) -> CombinedExpression {
        let fragments: Vec<String> = expressions
            .iter()
            .filter(|e| self.qualifies(e))
            .map(fragment)
            .collect();
        let count = fragments.len();
        let text = if count == 0 {
            String::new()
        } else {
            format!("$merge([{}])", fragments.join(", "))
        };
        CombinedExpression { text, count }
    }

    /// Evaluate the combined expression once; no qualifying expressions yields `null`.
    pub fn run_combined(&self, expressions: &[MappingExpression], input: &Value) -> BatchOutput {
        let combined = self.build_combined(expressions);
        if combined.count == 0 {
            return BatchOutput { output: Value::Null, errors: Vec::new() };
        }
        match self.evaluator.evaluate(&combined.text, input) {
            Ok(output) => BatchOutput { output, errors: Vec::new() },
            Err(err) => {
                warn!(error = %err, count = combined.count, "combined expression failed");
                BatchOutput {
                    output: Value::Null,
                    errors: vec![EvaluationError {
                        key: COMBINED_ERROR_KEY.to_string(),
                        name: None,
                        expression: combined.text,
                        message: err.to_string(),
                    }],
                }
            }
        }
    }

    fn qualifies(&self, expr: &MappingExpression) -> bool {
        if expr.expression.trim().is_empty() {
            trace!(key = %expr.key, "skipping empty expression");
            return false;
        }
        if !self.evaluator.options().accepts_language(expr.language.as_deref()) {
            debug!(
                key = %expr.key,
                language = expr.language.as_deref().unwrap_or_default(),
                "skipping expression in non-standard language"
            );
            return false;
        }
        true
    }
}

fn fragment(expr: &MappingExpression) -> String {
    let text = expr.expression.trim();
    if looks_like_object(text) {
        return text.to_string();
    }
    let key = Value::String(expr.output_key().to_string());
    format!("{{{key}: ({text})}}")
}

/// Brace sniffing, after peeling one layer of wrapping parentheses.
///
/// Text such as `"{" & x & "}"` is misread as an object; that is accepted
/// rather than parsing the expression here.
pub fn looks_like_object(text: &str) -> bool {
    let mut t = text.trim();
    if t.len() >= 2 && t.starts_with('(') && t.ends_with(')') {
        t = t[1..t.len() - 1].trim();
    }
    t.starts_with('{') && t.ends_with('}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn output_key_prefers_trimmed_name() {
        let e = MappingExpression::new("k1", "x").with_name("  Label ");
        assert_eq!(e.output_key(), "Label");
        let e = MappingExpression::new("k1", "x").with_name("   ");
        assert_eq!(e.output_key(), "k1");
    }

    #[test]
    fn object_sniffing() {
        assert!(looks_like_object(r#"{"a": b}"#));
        assert!(looks_like_object(r#" ( {"a": b} ) "#));
        assert!(!looks_like_object("Age"));
        assert!(!looks_like_object("(Age)"));
        assert!(!looks_like_object("(("));
    }

    #[test]
    fn non_object_results_use_synthesized_key() {
        let runner = BatchRunner::default();
        let exprs = vec![
            MappingExpression::new("k1", "Age").with_name("AgeValue"),
            MappingExpression::new("k2", "Tags"),
            MappingExpression::new("k3", "Missing"),
        ];
        let out = runner.run_iterative(&exprs, &json!({"Age": 7, "Tags": ["a", "b"]}));
        assert_eq!(out.output, json!({"AgeValue": 7, "k2": ["a", "b"]}));
        assert!(out.is_clean());
    }

    #[test]
    fn empty_and_foreign_expressions_are_skipped() {
        let runner = BatchRunner::default();
        let exprs = vec![
            MappingExpression::new("blank", "   "),
            MappingExpression::new("xslt", "Age").with_language("xslt"),
            MappingExpression::new("ok", "Age").with_language("JSONata"),
        ];
        let out = runner.run_iterative(&exprs, &json!({"Age": 7}));
        assert_eq!(out.output, json!({"ok": 7}));
        assert_eq!(runner.build_combined(&exprs).count, 1);
    }

    #[test]
    fn combined_with_nothing_is_null() {
        let runner = BatchRunner::default();
        let combined = runner.build_combined(&[MappingExpression::new("k", " ")]);
        assert_eq!(combined, CombinedExpression { text: String::new(), count: 0 });
        let out = runner.run(Strategy::Combined, &[], &json!({}));
        assert_eq!(out.output, Value::Null);
    }

    #[test]
    fn combined_failure_is_one_error() {
        let runner = BatchRunner::default();
        let exprs = vec![MappingExpression::new("a", "{ \"x\": }")];
        let out = runner.run_combined(&exprs, &json!({}));
        assert_eq!(out.output, Value::Null);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].key, COMBINED_ERROR_KEY);
    }

    #[test]
    fn wire_shape_accepts_aliases() {
        let e: MappingExpression = serde_json::from_str(
            r#"{"key": "k", "name": "N", "expressionText": "A.B", "languageTag": "jsonata"}"#,
        )
        .unwrap();
        assert_eq!(e, MappingExpression::new("k", "A.B").with_name("N").with_language("jsonata"));
    }
}
