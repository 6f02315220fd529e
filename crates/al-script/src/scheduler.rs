//! Sequence scheduler
//!
//! Owns the live instances, keyed by instance id and grouped by definition.
//! An instance is taken out of its slot while it executes so that the step
//! being run can reach the rest of the engine; the slot stays behind so the
//! instance still counts as running and can be ended from inside its own
//! step.

use crate::instance::{InstanceState, RunningInstance};
use al_core::{DefinitionId, InstanceId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Lifecycle notification broadcast to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    Started {
        definition: DefinitionId,
        instance: InstanceId,
        parent: Option<InstanceId>,
    },
    Completed {
        definition: DefinitionId,
        instance: InstanceId,
    },
    /// A conditional step returned a negative branch
    Halted {
        definition: DefinitionId,
        instance: InstanceId,
        index: usize,
    },
    /// Ended from outside before completing
    Ended {
        definition: DefinitionId,
        instance: InstanceId,
    },
    Skipped {
        definition: DefinitionId,
        instance: InstanceId,
    },
}

impl SchedulerEvent {
    pub fn definition(&self) -> &DefinitionId {
        match self {
            SchedulerEvent::Started { definition, .. }
            | SchedulerEvent::Completed { definition, .. }
            | SchedulerEvent::Halted { definition, .. }
            | SchedulerEvent::Ended { definition, .. }
            | SchedulerEvent::Skipped { definition, .. } => definition,
        }
    }

    pub fn instance(&self) -> InstanceId {
        match self {
            SchedulerEvent::Started { instance, .. }
            | SchedulerEvent::Completed { instance, .. }
            | SchedulerEvent::Halted { instance, .. }
            | SchedulerEvent::Ended { instance, .. }
            | SchedulerEvent::Skipped { instance, .. } => *instance,
        }
    }
}

/// Snapshot of one live instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub definition: DefinitionId,
    pub current_index: usize,
    pub state: InstanceState,
    pub parent: Option<InstanceId>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Slot {
    definition: DefinitionId,
    instance: Option<RunningInstance>,
}

/// The set of live sequence instances
#[derive(Debug)]
pub struct SequenceScheduler {
    slots: IndexMap<InstanceId, Slot>,
    events: broadcast::Sender<SchedulerEvent>,
    signals: HashSet<String>,
}

impl Default for SequenceScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl SequenceScheduler {
    /// Create with the given event channel capacity
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            slots: IndexMap::new(),
            events,
            signals: HashSet::new(),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Whether any instance of `definition` is live
    pub fn is_running(&self, definition: &DefinitionId) -> bool {
        self.slots.values().any(|slot| &slot.definition == definition)
    }

    /// Number of live instances of `definition`
    pub fn live_count(&self, definition: &DefinitionId) -> usize {
        self.slots
            .values()
            .filter(|slot| &slot.definition == definition)
            .count()
    }

    /// Live instance ids of `definition`, in start order
    pub fn instances_of(&self, definition: &DefinitionId) -> Vec<InstanceId> {
        self.slots
            .iter()
            .filter(|(_, slot)| &slot.definition == definition)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Snapshot of a live instance that is not currently executing
    pub fn info(&self, id: InstanceId) -> Option<InstanceInfo> {
        self.slots
            .get(&id)
            .and_then(|slot| slot.instance.as_ref())
            .map(RunningInstance::info)
    }

    /// Snapshots of every idle or waiting instance, in start order
    pub fn instances(&self) -> Vec<InstanceInfo> {
        self.slots
            .values()
            .filter_map(|slot| slot.instance.as_ref())
            .map(RunningInstance::info)
            .collect()
    }

    /// Latch a signal for the rest of the current tick
    pub fn raise_signal(&mut self, name: impl Into<String>) {
        let name = name.into();
        trace!(signal = %name, "Signal raised");
        self.signals.insert(name);
    }

    pub fn signal_raised(&self, name: &str) -> bool {
        self.signals.contains(name)
    }

    pub(crate) fn clear_signals(&mut self) {
        self.signals.clear();
    }

    pub(crate) fn emit(&self, event: SchedulerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn ids(&self) -> Vec<InstanceId> {
        self.slots.keys().copied().collect()
    }

    pub(crate) fn insert(&mut self, instance: RunningInstance) {
        self.slots.insert(
            instance.id(),
            Slot {
                definition: instance.definition().id().clone(),
                instance: Some(instance),
            },
        );
    }

    /// Take an instance out of its slot for execution
    pub(crate) fn take(&mut self, id: InstanceId) -> Option<RunningInstance> {
        self.slots.get_mut(&id)?.instance.take()
    }

    /// Put an executed instance back; fails if it was ended meanwhile
    pub(crate) fn restore(&mut self, instance: RunningInstance) -> Result<(), RunningInstance> {
        match self.slots.get_mut(&instance.id()) {
            Some(slot) => {
                slot.instance = Some(instance);
                Ok(())
            }
            None => Err(instance),
        }
    }

    pub(crate) fn remove(&mut self, id: InstanceId) -> Option<RunningInstance> {
        self.slots.shift_remove(&id).and_then(|slot| slot.instance)
    }

    /// Remove every instance of `definition`
    ///
    /// Instances currently executing come back as `None`; their owner drops
    /// them once it notices the missing slot.
    pub(crate) fn remove_definition(
        &mut self,
        definition: &DefinitionId,
    ) -> Vec<(InstanceId, Option<RunningInstance>)> {
        let ids = self.instances_of(definition);
        ids.into_iter()
            .filter_map(|id| {
                self.slots
                    .shift_remove(&id)
                    .map(|slot| (id, slot.instance))
            })
            .collect()
    }
}
