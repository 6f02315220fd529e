//! Value comparison
//!
//! Floats compare with an epsilon tolerance, strings optionally fold case,
//! and object references fall back to their persisted stable ids.

use al_core::{EngineError, EngineResult, Value, FLOAT_EPSILON};
use serde::{Deserialize, Serialize};

/// Comparison operator used by conditional steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    #[default]
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Contains,
    NotContains,
}

/// Options affecting comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Fold case when comparing strings
    #[serde(default)]
    pub case_insensitive: bool,
}

/// Equality between two values of compatible kinds
pub fn values_equal(a: &Value, b: &Value, options: CompareOptions) -> EngineResult<bool> {
    compare(a, ComparisonOp::Equal, b, options)
}

/// Evaluate `a <op> b`
///
/// Integers and floats compare with each other. Any other pairing of
/// different kinds is a type mismatch; operators that make no sense for a
/// kind (ordering on booleans, `contains` on numbers) are invalid.
pub fn compare(a: &Value, op: ComparisonOp, b: &Value, options: CompareOptions) -> EngineResult<bool> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => ordered(op, x.cmp(y), a),
        (Value::Float(_), Value::Float(_) | Value::Integer(_))
        | (Value::Integer(_), Value::Float(_)) => {
            let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            let ordering = if (x - y).abs() <= f64::from(FLOAT_EPSILON) {
                std::cmp::Ordering::Equal
            } else if x < y {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            };
            ordered(op, ordering, a)
        }
        (Value::Bool(x), Value::Bool(y)) => equality(op, x == y, a),
        (Value::String(x), Value::String(y)) => compare_strings(x, op, y, options),
        (Value::Vector3(x), Value::Vector3(y)) => equality(op, x.approx_eq(*y, FLOAT_EPSILON), a),
        (Value::Object(x), Value::Object(y))
        | (Value::ExternalObject(x), Value::ExternalObject(y)) => {
            let same = match (x, y) {
                (None, None) => true,
                (Some(x), Some(y)) => x.same_object(y),
                _ => false,
            };
            equality(op, same, a)
        }
        _ => Err(EngineError::mismatch(a.kind(), b.kind())),
    }
}

fn compare_strings(
    a: &str,
    op: ComparisonOp,
    b: &str,
    options: CompareOptions,
) -> EngineResult<bool> {
    let (a, b) = if options.case_insensitive {
        (a.to_lowercase(), b.to_lowercase())
    } else {
        (a.to_string(), b.to_string())
    };
    match op {
        ComparisonOp::Equal => Ok(a == b),
        ComparisonOp::NotEqual => Ok(a != b),
        ComparisonOp::Contains => Ok(a.contains(&b)),
        ComparisonOp::NotContains => Ok(!a.contains(&b)),
        _ => Err(unsupported(op, &Value::String(a))),
    }
}

fn ordered(op: ComparisonOp, ordering: std::cmp::Ordering, lhs: &Value) -> EngineResult<bool> {
    use std::cmp::Ordering::*;
    match op {
        ComparisonOp::Equal => Ok(ordering == Equal),
        ComparisonOp::NotEqual => Ok(ordering != Equal),
        ComparisonOp::Less => Ok(ordering == Less),
        ComparisonOp::LessOrEqual => Ok(ordering != Greater),
        ComparisonOp::Greater => Ok(ordering == Greater),
        ComparisonOp::GreaterOrEqual => Ok(ordering != Less),
        ComparisonOp::Contains | ComparisonOp::NotContains => Err(unsupported(op, lhs)),
    }
}

fn equality(op: ComparisonOp, equal: bool, lhs: &Value) -> EngineResult<bool> {
    match op {
        ComparisonOp::Equal => Ok(equal),
        ComparisonOp::NotEqual => Ok(!equal),
        _ => Err(unsupported(op, lhs)),
    }
}

fn unsupported(op: ComparisonOp, lhs: &Value) -> EngineError {
    EngineError::InvalidDefinition(format!(
        "operator {:?} is not supported for {:?} values",
        op,
        lhs.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use al_core::{ObjectRef, ValueKind, Vector3};

    const EXACT: CompareOptions = CompareOptions {
        case_insensitive: false,
    };

    #[test]
    fn test_float_equality_is_epsilon_tolerant() {
        let a = Value::Float(0.1 + 0.2);
        let b = Value::Float(0.3);
        assert!(values_equal(&a, &b, EXACT).unwrap());
        assert!(!values_equal(&a, &Value::Float(0.31), EXACT).unwrap());
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(compare(&Value::Integer(5), ComparisonOp::Greater, &Value::Integer(3), EXACT).unwrap());
        assert!(compare(&Value::Integer(3), ComparisonOp::LessOrEqual, &Value::Float(3.0), EXACT).unwrap());
        assert!(!compare(&Value::Float(2.0), ComparisonOp::GreaterOrEqual, &Value::Integer(3), EXACT).unwrap());
    }

    #[test]
    fn test_string_case_modes() {
        let a = Value::from("Hello World");
        let b = Value::from("hello world");
        assert!(!values_equal(&a, &b, EXACT).unwrap());
        assert!(values_equal(&a, &b, CompareOptions { case_insensitive: true }).unwrap());
        assert!(compare(&a, ComparisonOp::Contains, &Value::from("World"), EXACT).unwrap());
        assert!(compare(&a, ComparisonOp::NotContains, &Value::from("world"), EXACT).unwrap());
    }

    #[test]
    fn test_object_equality_falls_back_to_stable_id() {
        let live = Value::Object(Some(ObjectRef::live(4, 100)));
        let restored = Value::Object(Some(ObjectRef::persisted(100)));
        assert!(values_equal(&live, &restored, EXACT).unwrap());
        assert!(!values_equal(&live, &Value::Object(None), EXACT).unwrap());
        assert!(values_equal(&Value::Object(None), &Value::Object(None), EXACT).unwrap());
    }

    #[test]
    fn test_vector_equality() {
        let a = Value::Vector3(Vector3::new(1.0, 2.0, 3.0));
        let b = Value::Vector3(Vector3::new(1.0, 2.0, 3.000001));
        assert!(values_equal(&a, &b, EXACT).unwrap());
    }

    #[test]
    fn test_mismatched_kinds() {
        let err = values_equal(&Value::Bool(true), &Value::Integer(1), EXACT).unwrap_err();
        assert_eq!(err, EngineError::mismatch(ValueKind::Bool, ValueKind::Integer));
    }

    #[test]
    fn test_unsupported_operator() {
        let result = compare(&Value::Bool(true), ComparisonOp::Less, &Value::Bool(false), EXACT);
        assert!(matches!(result, Err(EngineError::InvalidDefinition(_))));
    }
}
