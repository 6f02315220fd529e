//! Scope resolution
//!
//! [`VariableScopes`] owns every variable container and resolves a
//! (scope, id, container) triple to the live variable. Resolution is
//! read-through: nothing is cached between calls, since containers can be
//! swapped at any time.

use crate::table::VariableTable;
use crate::variable::Variable;
use al_core::{
    DefinitionId, EngineError, EngineResult, LocalHostId, ObjectRef, VariableId, VariableScope,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Serializable address of a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRef {
    /// Scope the variable lives in
    #[serde(default)]
    pub scope: VariableScope,

    /// Variable ID within its container
    pub id: VariableId,

    /// Owning object, required for component scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ObjectRef>,
}

impl VariableRef {
    pub fn global(id: u32) -> Self {
        Self {
            scope: VariableScope::Global,
            id: VariableId(id),
            container: None,
        }
    }

    pub fn local(id: u32) -> Self {
        Self {
            scope: VariableScope::Local,
            id: VariableId(id),
            container: None,
        }
    }

    pub fn component(id: u32, container: ObjectRef) -> Self {
        Self {
            scope: VariableScope::Component,
            id: VariableId(id),
            container: Some(container),
        }
    }
}

impl std::fmt::Display for VariableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.container {
            Some(container) => write!(f, "{}:{}@{}", self.scope, self.id, container),
            None => write!(f, "{}:{}", self.scope, self.id),
        }
    }
}

/// Where local-scope lookups are anchored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalContext {
    /// Calls originating from a sequence hosted by a local-variable holder
    Host(LocalHostId),
    /// Calls originating from an asset-level definition, which has no
    /// single scene instance to anchor local variables to
    AssetLevel(DefinitionId),
}

/// Variable containers of all three scopes
#[derive(Debug, Default)]
pub struct VariableScopes {
    global: VariableTable,
    locals: HashMap<LocalHostId, VariableTable>,
    components: Vec<(ObjectRef, VariableTable)>,
}

impl VariableScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a pre-populated global table
    pub fn with_globals(global: VariableTable) -> Self {
        Self {
            global,
            ..Self::default()
        }
    }

    pub fn global(&self) -> &VariableTable {
        &self.global
    }

    pub fn global_mut(&mut self) -> &mut VariableTable {
        &mut self.global
    }

    /// Create (or replace) the local table of a host
    pub fn create_local_host(&mut self, host: LocalHostId, table: VariableTable) {
        debug!(host = %host, variables = table.len(), "Creating local variable host");
        self.locals.insert(host, table);
    }

    /// Destroy the local table of a host
    pub fn remove_local_host(&mut self, host: &LocalHostId) -> Option<VariableTable> {
        debug!(host = %host, "Removing local variable host");
        self.locals.remove(host)
    }

    pub fn local(&self, host: &LocalHostId) -> Option<&VariableTable> {
        self.locals.get(host)
    }

    /// Register the variables owned by an external object
    ///
    /// A previously registered table for the same object is replaced.
    pub fn register_component(&mut self, owner: ObjectRef, table: VariableTable) {
        debug!(owner = %owner, variables = table.len(), "Registering component variables");
        match self.components.iter_mut().find(|(o, _)| o.same_object(&owner)) {
            Some(entry) => *entry = (owner, table),
            None => self.components.push((owner, table)),
        }
    }

    pub fn remove_component(&mut self, owner: &ObjectRef) -> Option<VariableTable> {
        let index = self.components.iter().position(|(o, _)| o.same_object(owner))?;
        Some(self.components.remove(index).1)
    }

    pub fn component(&self, owner: &ObjectRef) -> Option<&VariableTable> {
        self.components
            .iter()
            .find(|(o, _)| o.same_object(owner))
            .map(|(_, t)| t)
    }

    /// Resolve a variable for reading
    pub fn resolve(
        &self,
        scope: VariableScope,
        id: VariableId,
        container: Option<&ObjectRef>,
        local: &LocalContext,
    ) -> EngineResult<&Variable> {
        let table = self.table(scope, container, local)?;
        table.get(id).ok_or_else(|| not_found(scope, id))
    }

    /// Resolve a variable for writing
    pub fn resolve_mut(
        &mut self,
        scope: VariableScope,
        id: VariableId,
        container: Option<&ObjectRef>,
        local: &LocalContext,
    ) -> EngineResult<&mut Variable> {
        let table = self.table_mut(scope, container, local)?;
        table.get_mut(id).ok_or_else(|| not_found(scope, id))
    }

    /// Resolve a [`VariableRef`] for reading
    pub fn get(&self, var: &VariableRef, local: &LocalContext) -> EngineResult<&Variable> {
        self.resolve(var.scope, var.id, var.container.as_ref(), local)
    }

    /// Resolve a [`VariableRef`] for writing
    pub fn get_mut(&mut self, var: &VariableRef, local: &LocalContext) -> EngineResult<&mut Variable> {
        self.resolve_mut(var.scope, var.id, var.container.as_ref(), local)
    }

    fn table(
        &self,
        scope: VariableScope,
        container: Option<&ObjectRef>,
        local: &LocalContext,
    ) -> EngineResult<&VariableTable> {
        match scope {
            VariableScope::Global => Ok(&self.global),
            VariableScope::Local => {
                let host = local_host(local)?;
                self.locals
                    .get(host)
                    .ok_or_else(|| EngineError::unresolved(format!("local variable host '{}'", host)))
            }
            VariableScope::Component => {
                let owner = component_owner(container)?;
                self.component(owner)
                    .ok_or_else(|| EngineError::unresolved(format!("component variables on {}", owner)))
            }
        }
    }

    fn table_mut(
        &mut self,
        scope: VariableScope,
        container: Option<&ObjectRef>,
        local: &LocalContext,
    ) -> EngineResult<&mut VariableTable> {
        match scope {
            VariableScope::Global => Ok(&mut self.global),
            VariableScope::Local => {
                let host = local_host(local)?;
                self.locals
                    .get_mut(host)
                    .ok_or_else(|| EngineError::unresolved(format!("local variable host '{}'", host)))
            }
            VariableScope::Component => {
                let owner = component_owner(container)?;
                self.components
                    .iter_mut()
                    .find(|(o, _)| o.same_object(owner))
                    .map(|(_, t)| t)
                    .ok_or_else(|| EngineError::unresolved(format!("component variables on {}", owner)))
            }
        }
    }
}

fn local_host(local: &LocalContext) -> EngineResult<&LocalHostId> {
    match local {
        LocalContext::Host(host) => Ok(host),
        LocalContext::AssetLevel(definition) => {
            trace!(definition = %definition, "Local scope requested from asset-level definition");
            Err(EngineError::NoLocalContext(definition.to_string()))
        }
    }
}

fn component_owner(container: Option<&ObjectRef>) -> EngineResult<&ObjectRef> {
    container.ok_or_else(|| EngineError::unresolved("component scope requires a container object"))
}

fn not_found(scope: VariableScope, id: VariableId) -> EngineError {
    EngineError::unresolved(format!("{} variable {}", scope, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use al_core::Value;

    fn scopes() -> (VariableScopes, LocalContext, ObjectRef) {
        let mut scopes = VariableScopes::new();
        scopes
            .global_mut()
            .insert(Variable::new(VariableId(7), "global", Value::Integer(10)))
            .unwrap();

        let host = LocalHostId::new("intro");
        let mut local = VariableTable::new();
        local
            .insert(Variable::new(VariableId(1), "local", Value::Float(1.5)))
            .unwrap();
        scopes.create_local_host(host.clone(), local);

        let owner = ObjectRef::live(5, 500);
        let mut component = VariableTable::new();
        component
            .insert(Variable::new(VariableId(2), "hp", Value::Integer(3)))
            .unwrap();
        scopes.register_component(owner, component);

        (scopes, LocalContext::Host(host), owner)
    }

    #[test]
    fn test_resolve_global_ignores_container() {
        let (scopes, local, owner) = scopes();
        let var = scopes
            .resolve(VariableScope::Global, VariableId(7), Some(&owner), &local)
            .unwrap();
        assert_eq!(var.value(), &Value::Integer(10));
    }

    #[test]
    fn test_resolve_local() {
        let (scopes, local, _) = scopes();
        let var = scopes.get(&VariableRef::local(1), &local).unwrap();
        assert_eq!(var.label(), "local");
    }

    #[test]
    fn test_local_from_asset_level_fails() {
        let (scopes, _, _) = scopes();
        let asset = LocalContext::AssetLevel(DefinitionId::new("shared"));
        let err = scopes.get(&VariableRef::local(1), &asset).unwrap_err();
        assert_eq!(err, EngineError::NoLocalContext("shared".to_string()));
    }

    #[test]
    fn test_component_requires_container() {
        let (scopes, local, owner) = scopes();
        let missing = VariableRef {
            scope: VariableScope::Component,
            id: VariableId(2),
            container: None,
        };
        assert!(matches!(
            scopes.get(&missing, &local),
            Err(EngineError::UnresolvedReference(_))
        ));

        let var = scopes.get(&VariableRef::component(2, owner), &local).unwrap();
        assert_eq!(var.value(), &Value::Integer(3));
    }

    #[test]
    fn test_component_resolves_restored_reference() {
        let (scopes, local, _) = scopes();
        let restored = VariableRef::component(2, ObjectRef::persisted(500));
        assert!(scopes.get(&restored, &local).is_ok());
    }

    #[test]
    fn test_resolution_is_read_through() {
        let (mut scopes, local, _) = scopes();
        let host = LocalHostId::new("intro");
        let mut replacement = VariableTable::new();
        replacement
            .insert(Variable::new(VariableId(1), "swapped", Value::Float(0.0)))
            .unwrap();
        scopes.create_local_host(host, replacement);

        assert_eq!(
            scopes.get(&VariableRef::local(1), &local).unwrap().label(),
            "swapped"
        );
    }

    #[test]
    fn test_missing_variable() {
        let (mut scopes, local, _) = scopes();
        assert!(matches!(
            scopes.get_mut(&VariableRef::global(99), &local),
            Err(EngineError::UnresolvedReference(_))
        ));
    }
}
