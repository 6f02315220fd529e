//! Sequence parameters
//!
//! A [`ParameterList`] is the set of typed input slots a sequence definition
//! declares. Steps that start another sequence keep a [`ParameterBindings`]
//! cache of values to pass in, keyed by the target's parameter ids. When
//! the target's list is edited the cache is resynchronized by id, never by
//! position.

mod binder;
mod parameter;

pub use binder::{BoundParameter, ParameterBindings, ResyncReport};
pub use parameter::{Parameter, ParameterConfig, ParameterList};
