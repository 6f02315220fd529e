//! Error types for formula evaluation

use al_core::EngineError;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = Result<T, FormulaError>;

/// Errors that can occur while evaluating a formula
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormulaError {
    /// A substitution token could not be resolved
    #[error("unresolved token: {token}")]
    UnresolvedToken { token: String },

    /// The expression is malformed
    #[error("parse error at {position}: {message}")]
    Parse { message: String, position: usize },

    /// Division by zero during evaluation
    #[error("division by zero")]
    DivisionByZero,
}

impl FormulaError {
    pub(crate) fn parse(message: impl Into<String>, position: usize) -> Self {
        FormulaError::Parse {
            message: message.into(),
            position,
        }
    }
}

impl From<FormulaError> for EngineError {
    fn from(err: FormulaError) -> Self {
        match err {
            FormulaError::UnresolvedToken { token } => EngineError::UnresolvedToken { token },
            FormulaError::Parse { message, position } => {
                EngineError::ParseError { message, position }
            }
            FormulaError::DivisionByZero => EngineError::DivisionByZero,
        }
    }
}
