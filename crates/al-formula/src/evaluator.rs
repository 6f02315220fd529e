//! Formula evaluator

use crate::error::FormulaResult;
use crate::parser::parse;
use crate::token::{substitute, TokenSource};
use al_core::{EngineError, EngineResult, Value, ValueKind};
use tracing::debug;

/// Evaluates formulas against a [`TokenSource`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaEvaluator;

impl FormulaEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Substitute tokens, parse and evaluate to a double
    pub fn evaluate(&self, formula: &str, source: &dyn TokenSource) -> FormulaResult<f64> {
        let substituted = substitute(formula, source)?;
        debug!(formula, substituted = %substituted, "Evaluating formula");
        parse(&substituted)?.eval()
    }

    /// Evaluate and narrow the result to a numeric kind
    ///
    /// Integer results truncate toward zero.
    pub fn evaluate_as(
        &self,
        formula: &str,
        kind: ValueKind,
        source: &dyn TokenSource,
    ) -> EngineResult<Value> {
        if !kind.is_numeric() {
            return Err(EngineError::mismatch(ValueKind::Float, kind));
        }
        let result = self.evaluate(formula, source)?;
        Value::from_f64(kind, result).ok_or(EngineError::mismatch(ValueKind::Float, kind))
    }
}
