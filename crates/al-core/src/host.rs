//! Read-only collaborator interfaces implemented by the host

use crate::value::Value;

/// Bridge to an external animation-parameter-like store
pub trait ExternalParameterSource: Send + Sync {
    fn get_bool(&self, name: &str) -> Option<Value>;
    fn get_int(&self, name: &str) -> Option<Value>;
    fn get_float(&self, name: &str) -> Option<Value>;
}

/// Bridge to text rendered by a UI element
pub trait MenuTextSource: Send + Sync {
    fn get_text(&self, container: &str, element: &str, slot: Option<usize>) -> Option<String>;
}
