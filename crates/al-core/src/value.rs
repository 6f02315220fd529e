//! Tagged value union
//!
//! A [`Value`] is the payload of every variable and parameter. Its kind is
//! fixed at creation; changing it is only possible through a type-checked
//! assignment.

use crate::object::ObjectRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Integer,
    Float,
    String,
    Vector3,
    Object,
    ExternalObject,
}

impl ValueKind {
    /// Whether the kind holds a single number
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Float)
    }

    /// Whether the kind holds an object reference
    pub fn is_object(self) -> bool {
        matches!(self, ValueKind::Object | ValueKind::ExternalObject)
    }
}

/// Three-component vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise sum
    pub fn add(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Scale every component
    pub fn scale(self, factor: f32) -> Vector3 {
        Vector3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Epsilon-tolerant equality
    pub fn approx_eq(self, other: Vector3, epsilon: f32) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.z - other.z).abs() <= epsilon
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Integer(i32),
    Float(f32),
    String(String),
    Vector3(Vector3),
    Object(Option<ObjectRef>),
    ExternalObject(Option<ObjectRef>),
}

impl Value {
    /// The default value of a kind
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Integer => Value::Integer(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::String => Value::String(String::new()),
            ValueKind::Vector3 => Value::Vector3(Vector3::ZERO),
            ValueKind::Object => Value::Object(None),
            ValueKind::ExternalObject => Value::ExternalObject(None),
        }
    }

    /// Kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Vector3(_) => ValueKind::Vector3,
            Value::Object(_) => ValueKind::Object,
            Value::ExternalObject(_) => ValueKind::ExternalObject,
        }
    }

    /// Numeric view of integer and float values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(f64::from(*i)),
            Value::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<Vector3> {
        match self {
            Value::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    /// Object reference held by either object kind
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) | Value::ExternalObject(o) => o.as_ref(),
            _ => None,
        }
    }

    /// Build a numeric value of `kind` from a double
    ///
    /// Integer narrowing truncates toward zero and saturates at the i32
    /// bounds. Returns `None` for non-numeric kinds.
    pub fn from_f64(kind: ValueKind, n: f64) -> Option<Self> {
        match kind {
            ValueKind::Integer => Some(Value::Integer(n.trunc() as i32)),
            ValueKind::Float => Some(Value::Float(n as f32)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// The display representation used when a string target accepts any kind
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::Vector3(v) => write!(f, "{}", v),
            Value::Object(Some(o)) | Value::ExternalObject(Some(o)) => write!(f, "{}", o),
            Value::Object(None) | Value::ExternalObject(None) => f.write_str("None"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vector3> for Value {
    fn from(v: Vector3) -> Self {
        Value::Vector3(v)
    }
}
