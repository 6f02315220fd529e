//! Sequence definitions
//!
//! A [`SequenceDefinition`] is immutable step data plus the metadata the
//! scheduler needs. Running state lives in the scheduler, never here.

use crate::action::{RunSequenceStep, Step, StepKind};
use al_core::{DefinitionId, EngineError, EngineResult, LocalHostId};
use al_parameters::{ParameterConfig, ParameterList};
use al_variables::LocalContext;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Whether invoking steps wait for this sequence by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Invokers wait for completion
    #[default]
    Sequential,

    /// Invokers carry on immediately
    Parallel,
}

/// What to do when the instance cap is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxExceeded {
    /// Log a warning
    #[default]
    Warning,
    /// Silently refuse
    Silent,
}

/// Owner of a definition's local variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SequenceHost {
    /// Asset-level definition with no scene instance
    #[default]
    Asset,

    /// Hosted by a scene's local-variable holder
    Scene(LocalHostId),
}

fn default_max_instances() -> usize {
    10
}

/// Sequence configuration from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Owner of local variables
    #[serde(default)]
    pub host: SequenceHost,

    /// Default wait behavior of invokers
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Allow several live instances at once
    #[serde(default)]
    pub allow_multiple: bool,

    /// Instance cap when `allow_multiple` is set
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,

    #[serde(default)]
    pub max_exceeded: MaxExceeded,

    /// Declared parameters
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,

    /// Steps
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// An immutable sequence definition
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDefinition {
    id: DefinitionId,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub host: SequenceHost,
    pub mode: ExecutionMode,
    pub allow_multiple: bool,
    pub max_instances: usize,
    pub max_exceeded: MaxExceeded,
    pub parameters: ParameterList,
    steps: Vec<Step>,
}

impl SequenceDefinition {
    /// Create a definition, rejecting steps that would invoke it
    pub fn new(id: impl Into<DefinitionId>, steps: Vec<Step>) -> EngineResult<Self> {
        let id = id.into();
        reject_self_reference(&id, &steps)?;
        Ok(Self {
            id,
            alias: None,
            description: None,
            host: SequenceHost::Asset,
            mode: ExecutionMode::Sequential,
            allow_multiple: false,
            max_instances: default_max_instances(),
            max_exceeded: MaxExceeded::Warning,
            parameters: ParameterList::new(),
            steps,
        })
    }

    /// Create from config
    pub fn from_config(id: impl Into<DefinitionId>, config: SequenceConfig) -> EngineResult<Self> {
        let mut definition = Self::new(id, config.steps)?;
        definition.alias = config.alias;
        definition.description = config.description;
        definition.host = config.host;
        definition.mode = config.mode;
        definition.allow_multiple = config.allow_multiple;
        definition.max_instances = config.max_instances.max(1);
        definition.max_exceeded = config.max_exceeded;
        definition.parameters = ParameterList::from_configs(config.parameters)?;
        Ok(definition)
    }

    pub fn with_host(mut self, host: SequenceHost) -> Self {
        self.host = host;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_multiple(mut self, max_instances: usize) -> Self {
        self.allow_multiple = true;
        self.max_instances = max_instances.max(1);
        self
    }

    pub fn with_parameters(mut self, parameters: ParameterList) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn id(&self) -> &DefinitionId {
        &self.id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn is_asset_scoped(&self) -> bool {
        self.host == SequenceHost::Asset
    }

    /// Anchor for local-scope lookups made by this definition's steps
    pub fn local_context(&self) -> LocalContext {
        match &self.host {
            SequenceHost::Scene(host) => LocalContext::Host(host.clone()),
            SequenceHost::Asset => LocalContext::AssetLevel(self.id.clone()),
        }
    }

    fn run_steps_mut(&mut self) -> impl Iterator<Item = &mut RunSequenceStep> {
        self.steps.iter_mut().filter_map(|step| match &mut step.kind {
            StepKind::RunSequence(run) => Some(run),
            _ => None,
        })
    }
}

fn reject_self_reference(id: &DefinitionId, steps: &[Step]) -> EngineResult<()> {
    let invokes_self = steps.iter().any(|step| match &step.kind {
        StepKind::RunSequence(run) => &run.target == id,
        _ => false,
    });
    if invokes_self {
        return Err(EngineError::SelfReferenceRejected(id.to_string()));
    }
    Ok(())
}

/// All loaded definitions, by id
#[derive(Debug, Clone, Default)]
pub struct SequenceLibrary {
    definitions: IndexMap<DefinitionId, Arc<SequenceDefinition>>,
}

impl SequenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configs, in order
    pub fn from_configs(
        configs: impl IntoIterator<Item = (String, SequenceConfig)>,
    ) -> EngineResult<Self> {
        let mut library = Self::new();
        for (id, config) in configs {
            library.insert(SequenceDefinition::from_config(id, config)?)?;
        }
        Ok(library)
    }

    /// Add or replace a definition, returning the one it replaced
    ///
    /// Running instances keep the version they were started with.
    pub fn insert(
        &mut self,
        definition: SequenceDefinition,
    ) -> EngineResult<Option<Arc<SequenceDefinition>>> {
        reject_self_reference(&definition.id, &definition.steps)?;
        debug!(definition = %definition.id, steps = definition.steps.len(), "Loading sequence");
        Ok(self
            .definitions
            .insert(definition.id.clone(), Arc::new(definition)))
    }

    pub fn get(&self, id: &DefinitionId) -> Option<&Arc<SequenceDefinition>> {
        self.definitions.get(id)
    }

    pub fn remove(&mut self, id: &DefinitionId) -> Option<Arc<SequenceDefinition>> {
        self.definitions.shift_remove(id)
    }

    pub fn contains(&self, id: &DefinitionId) -> bool {
        self.definitions.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &DefinitionId> {
        self.definitions.keys()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Resynchronize every `run_sequence` parameter cache against its target
    ///
    /// Call after editing a definition's parameter list. Returns the number
    /// of caches that changed structurally.
    pub fn resync_bindings(&mut self) -> usize {
        let targets: IndexMap<DefinitionId, ParameterList> = self
            .definitions
            .iter()
            .map(|(id, def)| (id.clone(), def.parameters.clone()))
            .collect();

        let mut changed = 0;
        for definition in self.definitions.values_mut() {
            let stale = definition.steps.iter().any(|step| match &step.kind {
                StepKind::RunSequence(run) => targets
                    .get(&run.target)
                    .is_some_and(|params| run.parameters.needs_resync(params)),
                _ => false,
            });
            if !stale {
                continue;
            }

            let definition = Arc::make_mut(definition);
            let owner = definition.id.clone();
            for run in definition.run_steps_mut() {
                let Some(params) = targets.get(&run.target) else {
                    continue;
                };
                if run.parameters.resync(params).changed() {
                    info!(
                        definition = %owner,
                        target = %run.target,
                        "Parameter bindings resynchronized"
                    );
                    changed += 1;
                }
            }
        }
        changed
    }
}
