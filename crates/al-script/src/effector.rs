//! Effector registry
//!
//! Effectors perform the perceptual part of a step (animation, audio,
//! camera moves) on behalf of the host. The engine only knows them through
//! the [`Effector`] trait; hosts register one factory per [`EffectorKind`].

use al_core::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Discriminator used to pick an effector factory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectorKind {
    Animation,
    Audio,
    Camera,
    Dialogue,
    Movement,
    /// Host-defined effector
    Custom(String),
}

impl fmt::Display for EffectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectorKind::Animation => f.write_str("animation"),
            EffectorKind::Audio => f.write_str("audio"),
            EffectorKind::Camera => f.write_str("camera"),
            EffectorKind::Dialogue => f.write_str("dialogue"),
            EffectorKind::Movement => f.write_str("movement"),
            EffectorKind::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// Resolved effector arguments
pub type EffectArgs = IndexMap<String, Value>;

/// A running effect
pub trait Effector: fmt::Debug + Send {
    /// Begin the effect; returns the seconds it still needs (0 = done)
    fn start(&mut self, args: &EffectArgs) -> f32;

    /// Advance by `delta` seconds; returns the seconds it still needs
    fn poll(&mut self, delta: f32) -> f32;

    /// Jump to the end state without intermediate effects
    fn finish(&mut self, args: &EffectArgs);
}

type Factory = Box<dyn Fn() -> Box<dyn Effector> + Send + Sync>;

/// Map from effector kind to constructor
#[derive(Default)]
pub struct EffectorRegistry {
    factories: HashMap<EffectorKind, Factory>,
}

impl EffectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for a kind
    pub fn register<F>(&mut self, kind: EffectorKind, factory: F)
    where
        F: Fn() -> Box<dyn Effector> + Send + Sync + 'static,
    {
        debug!(kind = %kind, "Registering effector");
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn contains(&self, kind: &EffectorKind) -> bool {
        self.factories.contains_key(kind)
    }

    /// Build a fresh effector
    pub fn create(&self, kind: &EffectorKind) -> Option<Box<dyn Effector>> {
        self.factories.get(kind).map(|factory| factory())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for EffectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectorRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
