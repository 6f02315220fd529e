//! Parameter slots

use al_core::{EngineError, EngineResult, ParameterId, Value, ValueKind};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A typed input slot on a sequence definition
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    id: ParameterId,
    label: String,
    value: Value,
}

impl Parameter {
    /// Create a parameter whose kind is taken from its default value
    pub fn new(id: ParameterId, label: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            label: label.into(),
            value,
        }
    }

    pub fn id(&self) -> ParameterId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Type-checked write
    ///
    /// String parameters accept any value through its display form.
    pub fn set(&mut self, value: Value) -> EngineResult<()> {
        let found = value.kind();
        if found == self.kind() {
            self.value = value;
        } else if self.kind() == ValueKind::String {
            self.value = Value::String(value.to_string());
        } else {
            return Err(EngineError::mismatch(self.kind(), found));
        }
        Ok(())
    }
}

/// Parameter declaration from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// Parameter ID, unique within the definition
    pub id: u32,

    /// Human-readable label
    #[serde(default)]
    pub label: String,

    /// Default value (also fixes the kind)
    pub value: Value,
}

impl From<ParameterConfig> for Parameter {
    fn from(config: ParameterConfig) -> Self {
        Parameter::new(ParameterId(config.id), config.label, config.value)
    }
}

impl From<&Parameter> for ParameterConfig {
    fn from(parameter: &Parameter) -> Self {
        Self {
            id: parameter.id.0,
            label: parameter.label.clone(),
            value: parameter.value.clone(),
        }
    }
}

/// The ordered parameters of one definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterList {
    parameters: Vec<Parameter>,
    next_id: u64,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from declared parameters, rejecting duplicate ids
    pub fn from_vec(parameters: Vec<Parameter>) -> EngineResult<Self> {
        let mut list = Self::new();
        for parameter in parameters {
            list.insert(parameter)?;
        }
        Ok(list)
    }

    /// Build from configuration
    pub fn from_configs(configs: Vec<ParameterConfig>) -> EngineResult<Self> {
        Self::from_vec(configs.into_iter().map(Parameter::from).collect())
    }

    /// Append a parameter with the next free id
    pub fn add(&mut self, label: impl Into<String>, value: Value) -> EngineResult<ParameterId> {
        let id = u32::try_from(self.next_id)
            .map(ParameterId)
            .map_err(|_| EngineError::InvalidDefinition("parameter ids exhausted".to_string()))?;
        self.next_id += 1;
        self.parameters.push(Parameter::new(id, label, value));
        Ok(id)
    }

    /// Append a parameter with a preassigned id
    pub fn insert(&mut self, parameter: Parameter) -> EngineResult<()> {
        if self.get(parameter.id).is_some() {
            return Err(EngineError::InvalidDefinition(format!(
                "duplicate parameter id {}",
                parameter.id
            )));
        }
        self.next_id = self.next_id.max(u64::from(parameter.id.0) + 1);
        self.parameters.push(parameter);
        Ok(())
    }

    /// Remove a parameter; the ids of the others are unaffected
    pub fn remove(&mut self, id: ParameterId) -> Option<Parameter> {
        let index = self.position(id)?;
        Some(self.parameters.remove(index))
    }

    /// Move a parameter to a new position
    pub fn move_to(&mut self, id: ParameterId, index: usize) -> bool {
        let Some(from) = self.position(id) else {
            return false;
        };
        let parameter = self.parameters.remove(from);
        let index = index.min(self.parameters.len());
        self.parameters.insert(index, parameter);
        true
    }

    pub fn get(&self, id: ParameterId) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: ParameterId) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }

    /// Type-checked write by id
    pub fn set_value(&mut self, id: ParameterId, value: Value) -> EngineResult<()> {
        let parameter = self
            .get_mut(id)
            .ok_or_else(|| EngineError::unresolved(format!("parameter {}", id)))?;
        trace!(parameter = %id, value = %value, "Setting parameter");
        parameter.set(value)
    }

    /// Ids in declaration order
    pub fn ids(&self) -> Vec<ParameterId> {
        self.parameters.iter().map(|p| p.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    fn position(&self, id: ParameterId) -> Option<usize> {
        self.parameters.iter().position(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_type_checked() {
        let mut p = Parameter::new(ParameterId(1), "count", Value::Integer(0));
        assert_eq!(
            p.set(Value::Float(1.0)),
            Err(EngineError::mismatch(ValueKind::Integer, ValueKind::Float))
        );
        assert_eq!(p.value(), &Value::Integer(0));

        let mut s = Parameter::new(ParameterId(2), "label", Value::from(""));
        s.set(Value::Integer(4)).unwrap();
        assert_eq!(s.value(), &Value::from("4"));
    }

    #[test]
    fn test_ids_survive_reordering() {
        let mut list = ParameterList::new();
        let a = list.add("a", Value::Integer(1)).unwrap();
        let b = list.add("b", Value::Integer(2)).unwrap();
        let c = list.add("c", Value::Integer(3)).unwrap();

        assert!(list.move_to(c, 0));
        assert_eq!(list.ids(), vec![c, a, b]);

        list.remove(a);
        let d = list.add("d", Value::Bool(true)).unwrap();
        assert_eq!(d, ParameterId(3));
        assert_eq!(list.ids(), vec![c, b, d]);
    }

    #[test]
    fn test_add_fails_when_ids_exhausted() {
        let mut list = ParameterList::new();
        list.insert(Parameter::new(ParameterId(u32::MAX), "last", Value::Integer(1)))
            .unwrap();

        assert!(matches!(
            list.add("next", Value::Integer(0)),
            Err(EngineError::InvalidDefinition(_))
        ));
        assert_eq!(list.ids(), vec![ParameterId(u32::MAX)]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = ParameterList::from_vec(vec![
            Parameter::new(ParameterId(4), "x", Value::Integer(0)),
            Parameter::new(ParameterId(4), "y", Value::Integer(0)),
        ]);
        assert!(matches!(result, Err(EngineError::InvalidDefinition(_))));
    }

    #[test]
    fn test_set_value_unknown_id() {
        let mut list = ParameterList::new();
        assert!(matches!(
            list.set_value(ParameterId(9), Value::Integer(1)),
            Err(EngineError::UnresolvedReference(_))
        ));
    }
}
