//! Object references
//!
//! The engine never owns scene objects. It holds references that carry a
//! live handle (valid for this process only) and an optional persisted
//! stable id (valid across save/restore). A reference restored from saved
//! state has no handle until the host rehydrates it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-local identity of a live object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(pub u64);

/// Persisted identifier of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(pub i32);

/// Reference to an external object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ObjectRef {
    /// Live handle, absent for references restored from persisted state
    #[serde(default, skip_serializing)]
    pub handle: Option<ObjectHandle>,

    /// Persisted stable id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<StableId>,
}

impl ObjectRef {
    /// Reference to a live object with a persisted id
    pub fn live(handle: u64, stable_id: i32) -> Self {
        Self {
            handle: Some(ObjectHandle(handle)),
            stable_id: Some(StableId(stable_id)),
        }
    }

    /// Reference carrying only a persisted id
    pub fn persisted(stable_id: i32) -> Self {
        Self {
            handle: None,
            stable_id: Some(StableId(stable_id)),
        }
    }

    /// Whether the reference points at a live object
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Drop the live handle, keeping only what survives persistence
    pub fn to_persisted(self) -> Self {
        Self {
            handle: None,
            stable_id: self.stable_id,
        }
    }

    /// Whether two references denote the same object
    ///
    /// Live handles are compared first. When that fails, the persisted
    /// stable ids are compared so that a live reference matches a value
    /// restored from saved state.
    pub fn same_object(&self, other: &ObjectRef) -> bool {
        if let (Some(a), Some(b)) = (self.handle, other.handle) {
            if a == b {
                return true;
            }
        }
        matches!((self.stable_id, other.stable_id), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.stable_id, self.handle) {
            (Some(id), _) => write!(f, "#{}", id.0),
            (None, Some(handle)) => write!(f, "@{}", handle.0),
            (None, None) => f.write_str("None"),
        }
    }
}

/// Maps persisted stable ids to live objects
///
/// Implemented by the host. Used whenever a step or variable holds an
/// object value that must survive a save/restore boundary.
pub trait ExternalObjectResolver: Send + Sync {
    fn resolve_by_stable_id(&self, id: StableId) -> Option<ObjectRef>;
}
