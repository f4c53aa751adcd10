pub mod errors;
pub mod context;
pub mod functions;  // plugin model
pub mod schema;
pub mod synthesize;
pub mod merge;
pub mod batch;
mod engine;
mod expression;
mod parser;
mod filter;
mod comparison;

use serde_json::Value;
use errors::{Result, EvalError};
use context::{Context, Options};
use functions::Registry;

/// Evaluates mapping-expression text against one input document.
///
/// Holds no per-call state, so one evaluator can serve any number of
/// documents, including from several threads.
#[derive(Clone)]
pub struct Evaluator {
    options: Options,
    registry: Registry,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Registry::with_builtins())
    }
}

impl Evaluator {
    pub fn new(registry: Registry) -> Self {
        Self { options: Options::default(), registry }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Evaluate an expression; an expression that matches nothing yields `null`.
    pub fn evaluate(&self, expr: &str, input: &Value) -> Result<Value> {
        Ok(self.evaluate_optional(expr, input)?.unwrap_or(Value::Null))
    }

    /// Like [`Evaluator::evaluate`] but keeps "no value" distinct from an explicit `null`.
    pub fn evaluate_optional(&self, expr: &str, input: &Value) -> Result<Option<Value>> {
        let ast = expression::parse_expr(expr).map_err(|e| EvalError::Parse(e.to_string()))?;
        let mut cx = Context::new(input, &self.options);
        engine::evaluate(&ast, input, &self.registry, &mut cx)
    }
}

/// Convenience: evaluate with the built-in registry and default options.
pub fn evaluate(expr: &str, input: &Value) -> Result<Value> {
    Evaluator::default().evaluate(expr, input)
}

pub use batch::{BatchOutput, BatchRunner, CombinedExpression, EvaluationError, MappingExpression, Strategy};
pub use merge::{merge, merge_into};
pub use schema::{child_schema, is_array_segment, resolve, AttributePath, SchemaNode};
pub use synthesize::build_default_assignment_expression;
