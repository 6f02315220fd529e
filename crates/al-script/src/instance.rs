//! Running sequence instances

use crate::action::{Step, StepKind};
use crate::context::EngineContext;
use crate::executor::{self, Frame, StepPoll, StepState};
use crate::scheduler::InstanceInfo;
use crate::sequence::SequenceDefinition;
use al_core::{InstanceId, FLOAT_EPSILON};
use al_parameters::ParameterList;
use al_variables::{BackupOwner, LocalContext, VariableScopes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{trace, warn};

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Started, first step not yet activated
    #[default]
    Idle,
    Running,
    /// Suspended on the current step
    Waiting,
    Skipping,
    Completed,
}

/// How far an instance got in one advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Still live, resume next tick
    Suspended,
    Completed,
    /// Halted by a conditional step at this index
    Halted(usize),
    /// Its slot was removed while it executed
    Ended,
}

/// A definition plus per-instance progress
#[derive(Debug)]
pub struct RunningInstance {
    id: InstanceId,
    definition: Arc<SequenceDefinition>,
    current_index: usize,
    steps: Vec<StepState>,
    parameters: ParameterList,
    parent: Option<InstanceId>,
    started_at: DateTime<Utc>,
    state: InstanceState,
    wait_remaining: f32,
    since_poll: f32,
    local: LocalContext,
}

impl RunningInstance {
    pub(crate) fn new(
        definition: Arc<SequenceDefinition>,
        from_index: usize,
        parameters: ParameterList,
        parent: Option<InstanceId>,
    ) -> Self {
        let steps = definition.steps().iter().map(|_| StepState::default()).collect();
        Self {
            id: InstanceId::new(),
            local: definition.local_context(),
            definition,
            current_index: from_index,
            steps,
            parameters,
            parent,
            started_at: Utc::now(),
            state: InstanceState::Idle,
            wait_remaining: 0.0,
            since_poll: 0.0,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn definition(&self) -> &Arc<SequenceDefinition> {
        &self.definition
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn parameters(&self) -> &ParameterList {
        &self.parameters
    }

    pub fn info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.id,
            definition: self.definition.id().clone(),
            current_index: self.current_index,
            state: self.state,
            parent: self.parent,
            started_at: self.started_at,
        }
    }

    /// Run steps until one suspends or the sequence finishes
    pub(crate) fn advance(&mut self, ctx: &mut EngineContext, dt: f32) -> Outcome {
        if self.state == InstanceState::Waiting {
            self.wait_remaining -= dt;
            self.since_poll += dt;
            if self.wait_remaining > FLOAT_EPSILON {
                return Outcome::Suspended;
            }
        }

        let definition = Arc::clone(&self.definition);
        let steps = definition.steps();
        let mut budget = ctx.settings.max_steps_per_tick;
        self.state = InstanceState::Running;

        loop {
            let index = self.current_index;
            let Some(step) = steps.get(index) else {
                self.state = InstanceState::Completed;
                return Outcome::Completed;
            };
            if !step.enabled {
                trace!(definition = %definition.id(), index, "Passing over disabled step");
                self.current_index += 1;
                continue;
            }
            if budget == 0 {
                warn!(
                    definition = %definition.id(),
                    index,
                    "Step limit per tick reached, resuming next tick"
                );
                return Outcome::Suspended;
            }
            budget -= 1;

            let elapsed = std::mem::take(&mut self.since_poll);
            let frame = Frame {
                instance: self.id,
                definition: &definition,
                index,
                parameters: &self.parameters,
                local: &self.local,
            };
            let poll = executor::execute(step, &mut self.steps[index], &frame, ctx, elapsed);

            if !ctx.scheduler.contains(self.id) {
                return Outcome::Ended;
            }

            if let StepPoll::Pending(wait) = poll {
                self.state = InstanceState::Waiting;
                self.wait_remaining = wait;
                return Outcome::Suspended;
            }
            match next_index(step, index, poll) {
                Next::Goto(next) => self.current_index = next,
                Next::Finish => {
                    self.state = InstanceState::Completed;
                    return Outcome::Completed;
                }
                Next::Halt => return Outcome::Halted(index),
            }
        }
    }

    /// Fast-forward to the end without letting time pass
    pub(crate) fn skip_to_end(&mut self, ctx: &mut EngineContext, depth: usize) -> Outcome {
        let definition = Arc::clone(&self.definition);
        let steps = definition.steps();
        let mut budget = ctx.settings.max_steps_per_tick;
        self.state = InstanceState::Skipping;
        self.wait_remaining = 0.0;
        self.since_poll = 0.0;

        loop {
            let index = self.current_index;
            let Some(step) = steps.get(index) else {
                self.state = InstanceState::Completed;
                return Outcome::Completed;
            };
            if !step.enabled {
                self.current_index += 1;
                continue;
            }
            if budget == 0 {
                warn!(
                    definition = %definition.id(),
                    index,
                    "Skip did not reach the end within the step limit, halting"
                );
                return Outcome::Halted(index);
            }
            budget -= 1;

            let frame = Frame {
                instance: self.id,
                definition: &definition,
                index,
                parameters: &self.parameters,
                local: &self.local,
            };
            let poll = executor::skip(step, &mut self.steps[index], &frame, ctx, depth);

            if !ctx.scheduler.contains(self.id) {
                return Outcome::Ended;
            }
            match next_index(step, index, poll) {
                Next::Goto(next) => self.current_index = next,
                Next::Finish => {
                    self.state = InstanceState::Completed;
                    return Outcome::Completed;
                }
                Next::Halt => return Outcome::Halted(index),
            }
        }
    }

    /// Give back every variable backup slot this instance still holds
    pub(crate) fn release_backups(&self, variables: &mut VariableScopes) {
        for (index, state) in self.steps.iter().enumerate() {
            if !state.holds_backup() {
                continue;
            }
            let Some(Step {
                kind: StepKind::SetVariable(set),
                ..
            }) = self.definition.steps().get(index)
            else {
                continue;
            };
            if let Ok(variable) = variables.get_mut(&set.target, &self.local) {
                variable.release_backup(BackupOwner {
                    instance: self.id,
                    step: index,
                });
            }
        }
    }
}

enum Next {
    Goto(usize),
    Finish,
    Halt,
}

fn next_index(step: &Step, index: usize, poll: StepPoll) -> Next {
    let target = match poll {
        StepPoll::Branch(branch) if branch < 0 => return Next::Halt,
        StepPoll::Branch(branch) => step
            .branches()
            .get(branch as usize)
            .copied()
            .unwrap_or(step.after),
        _ => step.after,
    };
    match target.resolve(index) {
        Some(next) => Next::Goto(next),
        None => Next::Finish,
    }
}
