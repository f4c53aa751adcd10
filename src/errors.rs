use thiserror::Error; // Import the `Error` derive macro from the `thiserror` crate

// Errors raised while parsing or evaluating a single mapping expression
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    // Malformed expression text; the message carries the byte position
    #[error("parse error: {0}")]
    Parse(String),

    // Fault while evaluating a well-formed expression against a document
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl EvalError {
    pub(crate) fn runtime(msg: impl Into<String>) -> Self {
        EvalError::Runtime(msg.into())
    }
}

// Type alias for results that use `EvalError` as the error type
pub type Result<T> = std::result::Result<T, EvalError>;
