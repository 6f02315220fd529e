//! Step types
//!
//! Steps are the building blocks of sequences. The set of step kinds is
//! closed: each [`StepKind`] variant is one kind of work, selected in
//! configuration by its `type` tag.

use crate::effector::EffectorKind;
use al_core::{DefinitionId, ParameterId, Value};
use al_parameters::ParameterBindings;
use al_variables::{CompareOptions, ComparisonOp, VariableRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Where control goes once a step finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BranchTarget {
    /// Next step in order
    #[default]
    Continue,

    /// Complete the sequence
    Stop,

    /// Jump to a step index; past the end completes the sequence
    Jump(usize),
}

impl BranchTarget {
    /// Index to continue at, given the index of the finishing step
    pub fn resolve(self, current: usize) -> Option<usize> {
        match self {
            BranchTarget::Continue => Some(current + 1),
            BranchTarget::Stop => None,
            BranchTarget::Jump(index) => Some(index),
        }
    }
}

fn default_on_false() -> BranchTarget {
    BranchTarget::Stop
}

/// A configurable step input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    /// Fixed value
    Literal(Value),

    /// Parameter of the running sequence
    Parameter(ParameterId),

    /// Variable resolved through the scopes at bind time
    Variable(VariableRef),
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

/// A single step in a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Optional alias for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Disabled steps are passed over
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Branch taken on completion (ignored by conditional steps)
    #[serde(default)]
    pub after: BranchTarget,

    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            alias: None,
            enabled: true,
            after: BranchTarget::Continue,
            kind,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_after(mut self, after: BranchTarget) -> Self {
        self.after = after;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Name for diagnostics
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.kind.type_name())
    }

    /// Targets selected by branch index
    ///
    /// Conditional steps return the index into this list; plain steps only
    /// ever use index 0.
    pub fn branches(&self) -> Vec<BranchTarget> {
        match &self.kind {
            StepKind::CheckVariable(check) => vec![check.on_true, check.on_false],
            StepKind::CheckRunning(check) => vec![check.on_true, check.on_false],
            StepKind::WaitForSignal(wait) => vec![self.after, wait.on_timeout],
            _ => vec![self.after],
        }
    }
}

impl From<StepKind> for Step {
    fn from(kind: StepKind) -> Self {
        Step::new(kind)
    }
}

/// Step kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Write a variable
    SetVariable(SetVariableStep),

    /// Branch on a variable comparison
    CheckVariable(CheckVariableStep),

    /// Wait a number of seconds
    Wait(WaitStep),

    /// Wait for a host signal
    WaitForSignal(WaitForSignalStep),

    /// Start another sequence
    RunSequence(RunSequenceStep),

    /// End every live instance of a sequence
    EndSequence(EndSequenceStep),

    /// Branch on whether a sequence is running
    CheckRunning(CheckRunningStep),

    /// Drive an effector
    Effect(EffectStep),
}

impl StepKind {
    /// Configuration tag of this kind
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::SetVariable(_) => "set_variable",
            StepKind::CheckVariable(_) => "check_variable",
            StepKind::Wait(_) => "wait",
            StepKind::WaitForSignal(_) => "wait_for_signal",
            StepKind::RunSequence(_) => "run_sequence",
            StepKind::EndSequence(_) => "end_sequence",
            StepKind::CheckRunning(_) => "check_running",
            StepKind::Effect(_) => "effect",
        }
    }

    /// Whether this kind returns a branch index instead of a wait
    pub fn is_conditional(&self) -> bool {
        matches!(self, StepKind::CheckVariable(_) | StepKind::CheckRunning(_))
    }
}

/// Variable write step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVariableStep {
    /// Variable to write
    pub target: VariableRef,

    #[serde(flatten)]
    pub mode: SetMode,
}

/// How a [`SetVariableStep`] computes the new value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SetMode {
    /// Assign the input
    SetValue { value: Input },

    /// Add the input (numbers and vectors), optionally spread over time
    IncreaseBy {
        value: Input,
        #[serde(default)]
        over_seconds: f32,
    },

    /// Random number in `[0, value)`
    SetRandom { value: Input },

    /// Evaluate an arithmetic formula
    Formula { formula: String },

    /// Copy another variable
    CopyFromVariable { source: VariableRef },

    /// Read a named value from the host's external parameter store
    CopyFromExternal { name: String },

    /// Read the text rendered by a UI element
    CopyFromMenuText {
        container: String,
        element: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slot: Option<usize>,
    },

    /// Flip a boolean
    Toggle,
}

/// Variable comparison step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckVariableStep {
    /// Variable on the left-hand side
    pub target: VariableRef,

    #[serde(default)]
    pub op: ComparisonOp,

    /// Right-hand side
    pub value: Input,

    #[serde(default)]
    pub options: CompareOptions,

    #[serde(default)]
    pub on_true: BranchTarget,

    #[serde(default = "default_on_false")]
    pub on_false: BranchTarget,
}

/// Timed wait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitStep {
    /// Seconds to wait (numeric)
    pub seconds: Input,
}

/// Event-driven wait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitForSignalStep {
    /// Signal name
    pub signal: String,

    /// Give up after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f32>,

    /// Branch taken on timeout
    #[serde(default)]
    pub on_timeout: BranchTarget,
}

/// Sub-sequence invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSequenceStep {
    /// Definition to start
    pub target: DefinitionId,

    /// Step index to start from
    #[serde(default)]
    pub from_index: usize,

    /// Wait for the sub-sequence to finish; defaults to the target's mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,

    /// Refuse to start while the target is already running
    #[serde(default)]
    pub exclusive_run_only: bool,

    /// Values passed into the target's parameters
    #[serde(default, skip_serializing_if = "ParameterBindings::is_empty")]
    pub parameters: ParameterBindings,
}

/// Sub-sequence cancellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndSequenceStep {
    pub target: DefinitionId,
}

/// Running-state check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRunningStep {
    pub target: DefinitionId,

    #[serde(default)]
    pub on_true: BranchTarget,

    #[serde(default = "default_on_false")]
    pub on_false: BranchTarget,
}

/// Effector invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectStep {
    /// Effector to drive
    pub effector: EffectorKind,

    /// Named inputs handed to the effector
    #[serde(default)]
    pub args: IndexMap<String, Input>,

    /// Hold the sequence until the effector reports completion
    #[serde(default)]
    pub wait_until_finish: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use al_core::{VariableId, VariableScope};
    use serde_json::json;

    #[test]
    fn test_parse_set_variable() {
        let step: Step = serde_json::from_value(json!({
            "type": "set_variable",
            "alias": "Bump score",
            "target": {"scope": "global", "id": 3},
            "mode": "increase_by",
            "value": {"literal": {"integer": 5}},
            "over_seconds": 1.5
        }))
        .unwrap();

        assert_eq!(step.display_name(), "Bump score");
        assert!(step.enabled);
        let StepKind::SetVariable(set) = step.kind else {
            panic!("Expected set_variable");
        };
        assert_eq!(set.target.scope, VariableScope::Global);
        assert_eq!(set.target.id, VariableId(3));
        assert_eq!(
            set.mode,
            SetMode::IncreaseBy {
                value: Input::Literal(Value::Integer(5)),
                over_seconds: 1.5
            }
        );
    }

    #[test]
    fn test_parse_check_defaults() {
        let step: Step = serde_json::from_value(json!({
            "type": "check_variable",
            "target": {"id": 1},
            "op": "greater",
            "value": {"parameter": 2}
        }))
        .unwrap();

        assert_eq!(
            step.branches(),
            vec![BranchTarget::Continue, BranchTarget::Stop]
        );
        assert!(step.kind.is_conditional());
    }

    #[test]
    fn test_branch_targets() {
        let jump: BranchTarget = serde_json::from_value(json!({"jump": 4})).unwrap();
        assert_eq!(jump, BranchTarget::Jump(4));
        assert_eq!(jump.resolve(1), Some(4));
        assert_eq!(BranchTarget::Continue.resolve(1), Some(2));
        assert_eq!(BranchTarget::Stop.resolve(1), None);

        let stop: BranchTarget = serde_json::from_value(json!("stop")).unwrap();
        assert_eq!(stop, BranchTarget::Stop);
    }

    #[test]
    fn test_parse_run_sequence() {
        let step: Step = serde_json::from_value(json!({
            "type": "run_sequence",
            "target": "door_open",
            "exclusive_run_only": true,
            "parameters": [{"id": 1, "value": {"bool": true}}],
            "after": {"jump": 0}
        }))
        .unwrap();

        assert_eq!(step.after, BranchTarget::Jump(0));
        let StepKind::RunSequence(run) = step.kind else {
            panic!("Expected run_sequence");
        };
        assert_eq!(run.target.as_str(), "door_open");
        assert_eq!(run.wait, None);
        assert_eq!(run.parameters.len(), 1);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result: Result<Step, _> = serde_json::from_value(json!({"type": "teleport"}));
        assert!(result.is_err());
    }
}
