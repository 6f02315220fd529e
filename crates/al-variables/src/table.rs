//! Variables of one container

use crate::variable::Variable;
use al_core::{EngineError, EngineResult, Value, VariableId};
use indexmap::IndexMap;

/// The variables owned by one container, in declaration order
///
/// Ids are never reused while the table lives: removing a variable does not
/// give its id back.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: IndexMap<VariableId, Variable>,
    /// One past the highest id handed out; wider than an id so it can run out
    next_id: u64,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from declared variables, rejecting duplicate ids
    pub fn from_variables(variables: impl IntoIterator<Item = Variable>) -> EngineResult<Self> {
        let mut table = Self::new();
        for variable in variables {
            table.insert(variable)?;
        }
        Ok(table)
    }

    /// Create a variable with the next free id
    ///
    /// Fails once the id space is used up; ids are never recycled.
    pub fn create(&mut self, label: impl Into<String>, value: Value) -> EngineResult<VariableId> {
        let id = u32::try_from(self.next_id)
            .map(VariableId)
            .map_err(|_| EngineError::InvalidDefinition("variable ids exhausted".to_string()))?;
        self.next_id += 1;
        self.variables.insert(id, Variable::new(id, label, value));
        Ok(id)
    }

    /// Insert a variable with a preassigned id
    pub fn insert(&mut self, variable: Variable) -> EngineResult<()> {
        let id = variable.id();
        if self.variables.contains_key(&id) {
            return Err(EngineError::InvalidDefinition(format!(
                "duplicate variable id {}",
                id
            )));
        }
        self.next_id = self.next_id.max(u64::from(id.0) + 1);
        self.variables.insert(id, variable);
        Ok(())
    }

    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(&id)
    }

    pub fn get_mut(&mut self, id: VariableId) -> Option<&mut Variable> {
        self.variables.get_mut(&id)
    }

    /// Remove a variable, preserving the order of the rest
    pub fn remove(&mut self, id: VariableId) -> Option<Variable> {
        self.variables.shift_remove(&id)
    }

    pub fn find_by_label(&self, label: &str) -> Option<&Variable> {
        self.variables.values().find(|v| v.label() == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_not_reused() {
        let mut table = VariableTable::new();
        let a = table.create("a", Value::Integer(0)).unwrap();
        let b = table.create("b", Value::Integer(0)).unwrap();
        table.remove(b);
        let c = table.create("c", Value::Integer(0)).unwrap();

        assert_eq!(a, VariableId(0));
        assert_eq!(c, VariableId(2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_insert_advances_next_id() {
        let mut table = VariableTable::new();
        table
            .insert(Variable::new(VariableId(10), "x", Value::Bool(false)))
            .unwrap();
        assert_eq!(table.create("y", Value::Bool(true)).unwrap(), VariableId(11));
    }

    #[test]
    fn test_create_fails_when_ids_exhausted() {
        let mut table = VariableTable::new();
        table
            .insert(Variable::new(VariableId(u32::MAX), "last", Value::Integer(7)))
            .unwrap();

        assert!(matches!(
            table.create("next", Value::Integer(0)),
            Err(EngineError::InvalidDefinition(_))
        ));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(VariableId(u32::MAX)).unwrap().value(),
            &Value::Integer(7)
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = VariableTable::from_variables([
            Variable::new(VariableId(1), "a", Value::Integer(0)),
            Variable::new(VariableId(1), "b", Value::Integer(0)),
        ]);
        assert!(matches!(result, Err(EngineError::InvalidDefinition(_))));
    }

    #[test]
    fn test_find_by_label_and_order() {
        let mut table = VariableTable::new();
        table.create("first", Value::Integer(1)).unwrap();
        table.create("second", Value::Integer(2)).unwrap();

        assert_eq!(
            table.find_by_label("second").map(|v| v.value().clone()),
            Some(Value::Integer(2))
        );
        let labels: Vec<_> = table.iter().map(|v| v.label().to_string()).collect();
        assert_eq!(labels, vec!["first", "second"]);
    }
}
