//! Error taxonomy shared by the engine crates
//!
//! None of these errors abort a running sequence. Steps recover from them
//! locally, log a warning and carry on; they exist as values so callers and
//! tests can observe exactly what went wrong.

use crate::value::ValueKind;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the variable, parameter, formula and scheduling layers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Source and target kinds are incompatible
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },

    /// Variable, parameter, definition or object could not be found
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// A formula token could not be resolved to a numeric value
    #[error("unresolved formula token: {token}")]
    UnresolvedToken { token: String },

    /// A formula could not be parsed
    #[error("formula parse error at {position}: {message}")]
    ParseError { message: String, position: usize },

    /// A formula divided by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Local scope accessed from an asset-level definition
    #[error("no local variable context for '{0}'")]
    NoLocalContext(String),

    /// A step would invoke the sequence it belongs to
    #[error("sequence '{0}' cannot invoke itself")]
    SelfReferenceRejected(String),

    /// An exclusive definition is already running, or its instance cap is reached
    #[error("sequence '{0}' is already running")]
    MultipleInstanceConflict(String),

    /// Authored data is structurally invalid
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),
}

impl EngineError {
    /// Shorthand for a type mismatch between two kinds
    pub fn mismatch(expected: ValueKind, found: ValueKind) -> Self {
        EngineError::TypeMismatch { expected, found }
    }

    /// Shorthand for an unresolved reference
    pub fn unresolved(what: impl Into<String>) -> Self {
        EngineError::UnresolvedReference(what.into())
    }
}
