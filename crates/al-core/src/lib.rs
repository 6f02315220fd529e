//! Core types for the action-list engine
//!
//! This crate provides the fundamental types shared by every other crate in
//! the workspace: the tagged [`Value`] union, stable identifiers, object
//! references that survive save/restore boundaries, the collaborator traits a
//! host implements, and the [`EngineError`] taxonomy.

mod error;
mod host;
mod ids;
mod object;
mod value;

pub use error::{EngineError, EngineResult};
pub use host::{ExternalParameterSource, MenuTextSource};
pub use ids::{DefinitionId, InstanceId, LocalHostId, ParameterId, VariableId, VariableScope};
pub use object::{ExternalObjectResolver, ObjectHandle, ObjectRef, StableId};
pub use value::{Value, ValueKind, Vector3};

/// Tolerance used when comparing float values for equality
pub const FLOAT_EPSILON: f32 = 1e-5;
