//! Sequence Engine
//!
//! This crate runs action lists: ordered steps that read and write
//! variables, wait, branch on conditions, drive host effects and start
//! other sequences. Instances are advanced cooperatively, one tick at a
//! time, by [`EngineContext::tick`].
//!
//! # Step Types
//!
//! - Set variable (value, increase, random, formula, copy, toggle)
//! - Check variable / check running
//! - Wait and wait for signal
//! - Run sequence / end sequence
//! - Effects through the effector registry
//!
//! # Key Types
//!
//! - [`Step`] - A single step in a sequence
//! - [`SequenceDefinition`] - A complete action list
//! - [`SequenceScheduler`] - The live instances
//! - [`EngineContext`] - Everything one engine owns

pub mod action;
pub mod context;
pub mod effector;
pub mod executor;
pub mod instance;
pub mod scheduler;
pub mod sequence;
pub mod settings;

pub use action::{
    BranchTarget, CheckRunningStep, CheckVariableStep, EffectStep, EndSequenceStep, Input,
    RunSequenceStep, SetMode, SetVariableStep, Step, StepKind, WaitForSignalStep, WaitStep,
};
pub use context::{EngineContext, HostServices};
pub use effector::{EffectArgs, Effector, EffectorKind, EffectorRegistry};
pub use executor::{BoundInputs, StepPoll, StepState, HALT};
pub use instance::{InstanceState, RunningInstance};
pub use scheduler::{InstanceInfo, SchedulerEvent, SequenceScheduler};
pub use sequence::{
    ExecutionMode, MaxExceeded, SequenceConfig, SequenceDefinition, SequenceHost, SequenceLibrary,
};
pub use settings::EngineSettings;
