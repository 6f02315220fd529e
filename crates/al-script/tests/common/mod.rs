//! Common test utilities for the sequence engine
//!
//! Step builders, host mocks and a recording effector shared by the
//! integration tests.

#![allow(dead_code)]

use al_core::{ExternalParameterSource, MenuTextSource, ParameterId, Value};
use al_script::{
    BranchTarget, CheckVariableStep, EffectArgs, Effector, EngineContext, EngineSettings, Input,
    SequenceDefinition, SequenceLibrary, SetMode, SetVariableStep, Step, StepKind, WaitStep,
};
use al_variables::{CompareOptions, ComparisonOp, VariableRef, VariableScopes, VariableTable};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Seconds per test tick
pub const DT: f32 = 0.1;

/// Engine with a fixed seed and the given globals and definitions
pub fn engine(globals: VariableTable, definitions: Vec<SequenceDefinition>) -> EngineContext {
    let mut library = SequenceLibrary::new();
    for definition in definitions {
        library.insert(definition).unwrap();
    }
    let settings = EngineSettings {
        seed: Some(42),
        ..EngineSettings::default()
    };
    EngineContext::new(settings)
        .with_variables(VariableScopes::with_globals(globals))
        .with_library(library)
}

/// Tick until nothing is live; returns the number of ticks taken
pub fn run_until_idle(ctx: &mut EngineContext, max_ticks: usize) -> usize {
    for tick in 0..max_ticks {
        if ctx.scheduler.is_empty() {
            return tick;
        }
        ctx.tick(DT);
    }
    panic!("Engine still busy after {} ticks", max_ticks);
}

pub fn global(ctx: &EngineContext, id: u32) -> Value {
    ctx.variables
        .global()
        .get(al_core::VariableId(id))
        .map(|v| v.value().clone())
        .expect("global variable exists")
}

pub fn set(target: VariableRef, mode: SetMode) -> Step {
    Step::new(StepKind::SetVariable(SetVariableStep { target, mode }))
}

pub fn set_value(target: VariableRef, value: impl Into<Value>) -> Step {
    set(
        target,
        SetMode::SetValue {
            value: Input::Literal(value.into()),
        },
    )
}

pub fn increase_by(target: VariableRef, value: impl Into<Value>, over_seconds: f32) -> Step {
    set(
        target,
        SetMode::IncreaseBy {
            value: Input::Literal(value.into()),
            over_seconds,
        },
    )
}

pub fn formula(target: VariableRef, formula: &str) -> Step {
    set(
        target,
        SetMode::Formula {
            formula: formula.to_string(),
        },
    )
}

pub fn check(target: VariableRef, op: ComparisonOp, value: impl Into<Value>) -> CheckVariableStep {
    CheckVariableStep {
        target,
        op,
        value: Input::Literal(value.into()),
        options: CompareOptions::default(),
        on_true: BranchTarget::Continue,
        on_false: BranchTarget::Stop,
    }
}

pub fn wait(seconds: f32) -> Step {
    Step::new(StepKind::Wait(WaitStep {
        seconds: Input::Literal(Value::Float(seconds)),
    }))
}

pub fn param(id: u32) -> Input {
    Input::Parameter(ParameterId(id))
}

/// External parameter store backed by a map
#[derive(Debug, Default)]
pub struct MockParameters {
    pub values: HashMap<String, Value>,
}

impl MockParameters {
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    fn typed(&self, name: &str, pick: fn(&Value) -> bool) -> Option<Value> {
        self.values.get(name).filter(|v| pick(v)).cloned()
    }
}

impl ExternalParameterSource for MockParameters {
    fn get_bool(&self, name: &str) -> Option<Value> {
        self.typed(name, |v| matches!(v, Value::Bool(_)))
    }

    fn get_int(&self, name: &str) -> Option<Value> {
        self.typed(name, |v| matches!(v, Value::Integer(_)))
    }

    fn get_float(&self, name: &str) -> Option<Value> {
        self.typed(name, |v| matches!(v, Value::Float(_)))
    }
}

/// Menu text keyed by `container/element`
#[derive(Debug, Default)]
pub struct MockMenus {
    pub texts: HashMap<String, Vec<String>>,
}

impl MockMenus {
    pub fn with(mut self, container: &str, element: &str, texts: &[&str]) -> Self {
        self.texts.insert(
            format!("{}/{}", container, element),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }
}

impl MenuTextSource for MockMenus {
    fn get_text(&self, container: &str, element: &str, slot: Option<usize>) -> Option<String> {
        let texts = self.texts.get(&format!("{}/{}", container, element))?;
        texts.get(slot.unwrap_or(0)).cloned()
    }
}

/// Calls seen by a [`RecordingEffector`]
pub type EffectLog = Arc<Mutex<Vec<String>>>;

/// Effector that takes `duration` seconds and records every call
#[derive(Debug)]
pub struct RecordingEffector {
    pub log: EffectLog,
    pub duration: f32,
    remaining: f32,
}

impl RecordingEffector {
    pub fn new(log: EffectLog, duration: f32) -> Self {
        Self {
            log,
            duration,
            remaining: 0.0,
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().expect("log lock").push(entry);
    }
}

impl Effector for RecordingEffector {
    fn start(&mut self, args: &EffectArgs) -> f32 {
        let clip = args.get("clip").map(|v| v.to_string()).unwrap_or_default();
        self.record(format!("start {}", clip));
        self.remaining = self.duration;
        self.remaining
    }

    fn poll(&mut self, delta: f32) -> f32 {
        self.remaining = (self.remaining - delta).max(0.0);
        if self.remaining <= 0.0 {
            self.record("done".to_string());
        }
        self.remaining
    }

    fn finish(&mut self, args: &EffectArgs) {
        let clip = args.get("clip").map(|v| v.to_string()).unwrap_or_default();
        self.record(format!("finish {}", clip));
    }
}

pub fn entries(log: &EffectLog) -> Vec<String> {
    log.lock().expect("log lock").clone()
}
