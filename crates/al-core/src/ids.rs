//! Identifier types
//!
//! Variables and parameters are addressed by numeric ids that stay stable
//! while their container lives. Definitions are addressed by name, running
//! instances by a ULID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Id of a variable, unique within one (scope, container) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableId(pub u32);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a parameter, unique within one sequence definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterId(pub u32);

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a sequence definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionId(String);

impl DefinitionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DefinitionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DefinitionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of one running instance of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(Ulid);

impl InstanceId {
    /// Create a fresh instance id
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a local-variable host (typically a scene)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalHostId(String);

impl LocalHostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalHostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    /// Process-wide table
    #[default]
    Global,
    /// Owned by the host of one sequence definition
    Local,
    /// Owned by an arbitrary external object
    Component,
}

impl FromStr for VariableScope {
    type Err = String;

    /// Parse a scope code as used in formula tokens
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "g" => Ok(VariableScope::Global),
            "local" | "l" => Ok(VariableScope::Local),
            "component" | "c" => Ok(VariableScope::Component),
            other => Err(format!("unknown variable scope '{}'", other)),
        }
    }
}

impl fmt::Display for VariableScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableScope::Global => f.write_str("global"),
            VariableScope::Local => f.write_str("local"),
            VariableScope::Component => f.write_str("component"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_codes() {
        assert_eq!("global".parse::<VariableScope>(), Ok(VariableScope::Global));
        assert_eq!("L".parse::<VariableScope>(), Ok(VariableScope::Local));
        assert_eq!("c".parse::<VariableScope>(), Ok(VariableScope::Component));
        assert!("scene".parse::<VariableScope>().is_err());
    }

    #[test]
    fn test_instance_ids_are_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }

    #[test]
    fn test_definition_id_serde_is_transparent() {
        let id: DefinitionId = serde_json::from_str("\"intro\"").unwrap();
        assert_eq!(id.as_str(), "intro");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"intro\"");
    }
}
