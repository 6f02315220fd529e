//! Engine context
//!
//! [`EngineContext`] bundles everything one engine owns: the variable
//! scopes, the loaded definitions, the scheduler and the host's
//! collaborators. It is passed explicitly; several engines can coexist in
//! one process.

use crate::effector::EffectorRegistry;
use crate::instance::{Outcome, RunningInstance};
use crate::scheduler::{SchedulerEvent, SequenceScheduler};
use crate::sequence::{MaxExceeded, SequenceLibrary};
use crate::settings::EngineSettings;
use al_core::{
    DefinitionId, EngineError, EngineResult, ExternalObjectResolver, ExternalParameterSource,
    InstanceId, MenuTextSource,
};
use al_formula::FormulaEvaluator;
use al_parameters::ParameterList;
use al_variables::VariableScopes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace, warn};

/// Read-only collaborators supplied by the host
#[derive(Clone, Default)]
pub struct HostServices {
    pub objects: Option<Arc<dyn ExternalObjectResolver>>,
    pub parameters: Option<Arc<dyn ExternalParameterSource>>,
    pub menus: Option<Arc<dyn MenuTextSource>>,
}

impl HostServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(mut self, objects: Arc<dyn ExternalObjectResolver>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn with_parameters(mut self, parameters: Arc<dyn ExternalParameterSource>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_menus(mut self, menus: Arc<dyn MenuTextSource>) -> Self {
        self.menus = Some(menus);
        self
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices")
            .field("objects", &self.objects.is_some())
            .field("parameters", &self.parameters.is_some())
            .field("menus", &self.menus.is_some())
            .finish()
    }
}

/// One action-list engine
#[derive(Debug)]
pub struct EngineContext {
    pub variables: VariableScopes,
    pub library: SequenceLibrary,
    pub scheduler: SequenceScheduler,
    pub host: HostServices,
    pub effectors: EffectorRegistry,
    pub formula: FormulaEvaluator,
    pub settings: EngineSettings,
    pub(crate) rng: StdRng,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl EngineContext {
    /// Create an empty engine
    pub fn new(settings: EngineSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            variables: VariableScopes::new(),
            library: SequenceLibrary::new(),
            scheduler: SequenceScheduler::default(),
            host: HostServices::new(),
            effectors: EffectorRegistry::new(),
            formula: FormulaEvaluator::new(),
            settings,
            rng,
        }
    }

    pub fn with_variables(mut self, variables: VariableScopes) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_library(mut self, library: SequenceLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn with_host(mut self, host: HostServices) -> Self {
        self.host = host;
        self
    }

    pub fn with_effectors(mut self, effectors: EffectorRegistry) -> Self {
        self.effectors = effectors;
        self
    }

    /// Advance every live instance once
    ///
    /// Instances are advanced in start order. Instances started during the
    /// tick are first advanced on the next one. Signals raised before or
    /// during the tick are cleared at its end.
    pub fn tick(&mut self, dt: f32) {
        let ids = self.scheduler.ids();
        trace!(instances = ids.len(), dt, "Tick");

        for id in ids {
            let Some(mut instance) = self.scheduler.take(id) else {
                continue;
            };
            let outcome = instance.advance(self, dt);
            self.settle(instance, outcome);
        }

        self.scheduler.clear_signals();
    }

    /// Start a definition with its default parameters
    pub fn start(
        &mut self,
        definition: &DefinitionId,
        from_index: usize,
        exclusive_run_only: bool,
    ) -> EngineResult<InstanceId> {
        self.start_with(definition, from_index, exclusive_run_only, None, None)
    }

    /// Start a definition
    ///
    /// While the definition is live, `exclusive_run_only` refuses the start.
    /// Otherwise a single-instance definition is restarted (its live
    /// instance is ended first) and a multi-instance definition gains an
    /// instance unless its cap is reached.
    #[instrument(skip(self, parameters), fields(definition = %definition))]
    pub fn start_with(
        &mut self,
        definition: &DefinitionId,
        from_index: usize,
        exclusive_run_only: bool,
        parameters: Option<ParameterList>,
        parent: Option<InstanceId>,
    ) -> EngineResult<InstanceId> {
        let def = self
            .library
            .get(definition)
            .cloned()
            .ok_or_else(|| EngineError::unresolved(format!("sequence '{}'", definition)))?;

        let live = self.scheduler.live_count(definition);
        if live > 0 {
            if exclusive_run_only {
                warn!("Sequence is already running, refusing exclusive start");
                return Err(EngineError::MultipleInstanceConflict(definition.to_string()));
            }
            if !def.allow_multiple {
                debug!("Restarting single-instance sequence");
                self.end_all(definition);
            } else if live >= def.max_instances {
                match def.max_exceeded {
                    MaxExceeded::Warning => {
                        warn!(max = def.max_instances, "Maximum instances reached")
                    }
                    MaxExceeded::Silent => {
                        debug!(max = def.max_instances, "Maximum instances reached")
                    }
                }
                return Err(EngineError::MultipleInstanceConflict(definition.to_string()));
            }
        }

        let parameters = parameters.unwrap_or_else(|| def.parameters.clone());
        let instance = RunningInstance::new(def, from_index, parameters, parent);
        let id = instance.id();
        self.scheduler.insert(instance);
        self.scheduler.emit(SchedulerEvent::Started {
            definition: definition.clone(),
            instance: id,
            parent,
        });
        info!(instance = %id, from_index, "Started sequence");
        Ok(id)
    }

    /// Skip every live instance of a definition to its end
    ///
    /// Returns the number of instances skipped.
    #[instrument(skip(self), fields(definition = %definition))]
    pub fn skip(&mut self, definition: &DefinitionId) -> usize {
        self.scheduler
            .instances_of(definition)
            .into_iter()
            .filter(|id| self.skip_instance(*id, 0))
            .count()
    }

    pub fn is_running(&self, definition: &DefinitionId) -> bool {
        self.scheduler.is_running(definition)
    }

    /// End every live instance of a definition without running its steps
    ///
    /// Returns the number of instances ended.
    #[instrument(skip(self), fields(definition = %definition))]
    pub fn end_all(&mut self, definition: &DefinitionId) -> usize {
        let removed = self.scheduler.remove_definition(definition);
        for (id, instance) in &removed {
            if let Some(instance) = instance {
                instance.release_backups(&mut self.variables);
            }
            self.scheduler.emit(SchedulerEvent::Ended {
                definition: definition.clone(),
                instance: *id,
            });
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "Ended sequence");
        }
        removed.len()
    }

    /// Latch a named signal for `wait_for_signal` steps
    pub fn raise_signal(&mut self, name: impl Into<String>) {
        self.scheduler.raise_signal(name);
    }

    /// Subscribe to scheduler lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.scheduler.subscribe()
    }

    /// Skip one instance; `false` if it is not live or currently executing
    pub(crate) fn skip_instance(&mut self, id: InstanceId, depth: usize) -> bool {
        let Some(mut instance) = self.scheduler.take(id) else {
            return false;
        };
        self.scheduler.emit(SchedulerEvent::Skipped {
            definition: instance.definition().id().clone(),
            instance: id,
        });
        let outcome = instance.skip_to_end(self, depth);
        self.settle(instance, outcome);
        true
    }

    /// End one instance
    pub(crate) fn end_instance(&mut self, id: InstanceId) {
        if let Some(instance) = self.scheduler.remove(id) {
            instance.release_backups(&mut self.variables);
            self.scheduler.emit(SchedulerEvent::Ended {
                definition: instance.definition().id().clone(),
                instance: id,
            });
        }
    }

    fn settle(&mut self, instance: RunningInstance, outcome: Outcome) {
        let id = instance.id();
        let definition = instance.definition().id().clone();
        match outcome {
            Outcome::Suspended => {
                if let Err(instance) = self.scheduler.restore(instance) {
                    instance.release_backups(&mut self.variables);
                }
            }
            Outcome::Completed => {
                self.scheduler.remove(id);
                instance.release_backups(&mut self.variables);
                debug!(definition = %definition, instance = %id, "Sequence completed");
                self.scheduler
                    .emit(SchedulerEvent::Completed { definition, instance: id });
            }
            Outcome::Halted(index) => {
                self.scheduler.remove(id);
                instance.release_backups(&mut self.variables);
                info!(definition = %definition, instance = %id, index, "Sequence halted");
                self.scheduler.emit(SchedulerEvent::Halted {
                    definition,
                    instance: id,
                    index,
                });
            }
            Outcome::Ended => instance.release_backups(&mut self.variables),
        }
    }
}
