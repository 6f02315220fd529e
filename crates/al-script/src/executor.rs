//! Step executor
//!
//! Implements the three-phase step contract for every [`StepKind`]:
//!
//! - bind: resolve configured inputs into concrete values, reading only
//! - execute: perform the work, possibly across several polls
//! - skip: reach the same end state immediately
//!
//! Failures never abort a sequence. They are logged and the step completes
//! as a no-op; conditional steps halt only when their comparison target
//! cannot be resolved.

use crate::action::{
    CheckVariableStep, EffectStep, Input, RunSequenceStep, SetMode, SetVariableStep, Step,
    StepKind, WaitForSignalStep,
};
use crate::context::EngineContext;
use crate::effector::{EffectArgs, Effector};
use crate::sequence::{ExecutionMode, SequenceDefinition};
use al_core::{
    EngineError, EngineResult, InstanceId, ObjectRef, Value, ValueKind, FLOAT_EPSILON,
};
use al_formula::{Token, TokenSource};
use al_parameters::ParameterList;
use al_variables::{compare, BackupOwner, LocalContext, VariableRef, VariableScopes};
use rand::Rng;
use tracing::{debug, trace, warn};

/// Branch index meaning "halt this sequence"
pub const HALT: i32 = -1;

/// Result of one execute or skip call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepPoll {
    /// Poll again after at least this many seconds (0 = next tick)
    Pending(f32),
    /// Done; continue at the step's `after` target
    Complete,
    /// Done; continue at the branch with this index, negative halts
    Branch(i32),
}

/// Inputs resolved at activation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundInputs {
    /// The step's single value input, if it has one
    pub value: Option<Value>,
    /// Effector arguments
    pub args: EffectArgs,
}

#[derive(Debug, Default)]
enum StepRuntime {
    #[default]
    Idle,
    Timer {
        remaining: f32,
    },
    Interpolation {
        elapsed: f32,
    },
    Signal {
        elapsed: f32,
    },
    Child(InstanceId),
    Effect(Box<dyn Effector>),
}

/// Per-instance state of one step
#[derive(Debug, Default)]
pub struct StepState {
    is_running: bool,
    wait_time: f32,
    bound: BoundInputs,
    bind_error: Option<EngineError>,
    runtime: StepRuntime,
}

impl StepState {
    /// Whether the step is mid-activation
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Wait requested by the last poll
    pub fn wait_time(&self) -> f32 {
        self.wait_time
    }

    pub fn bound(&self) -> &BoundInputs {
        &self.bound
    }

    pub(crate) fn holds_backup(&self) -> bool {
        matches!(self.runtime, StepRuntime::Interpolation { .. })
    }

    fn activate(&mut self, step: &Step, frame: &Frame<'_>, ctx: &EngineContext) {
        self.is_running = true;
        self.wait_time = 0.0;
        self.runtime = StepRuntime::Idle;
        match bind_inputs(step, frame, ctx) {
            Ok(bound) => {
                self.bound = bound;
                self.bind_error = None;
            }
            Err(e) => {
                self.bound = BoundInputs::default();
                self.bind_error = Some(e);
            }
        }
    }

    fn settle(&mut self, poll: StepPoll) -> StepPoll {
        match poll {
            StepPoll::Pending(wait) => self.wait_time = wait.max(0.0),
            _ => {
                self.is_running = false;
                self.wait_time = 0.0;
                self.runtime = StepRuntime::Idle;
            }
        }
        poll
    }

    fn value(&self) -> EngineResult<&Value> {
        self.bound
            .value
            .as_ref()
            .ok_or_else(|| EngineError::InvalidDefinition("step has no value input".to_string()))
    }
}

/// What a step can see of the instance running it
pub(crate) struct Frame<'a> {
    pub instance: InstanceId,
    pub definition: &'a SequenceDefinition,
    pub index: usize,
    pub parameters: &'a ParameterList,
    pub local: &'a LocalContext,
}

impl Frame<'_> {
    fn owner(&self) -> BackupOwner {
        BackupOwner {
            instance: self.instance,
            step: self.index,
        }
    }
}

/// Resolve every configured input of `step`
pub(crate) fn bind_inputs(
    step: &Step,
    frame: &Frame<'_>,
    ctx: &EngineContext,
) -> EngineResult<BoundInputs> {
    let mut bound = BoundInputs::default();
    let single = match &step.kind {
        StepKind::SetVariable(set) => match &set.mode {
            SetMode::SetValue { value }
            | SetMode::IncreaseBy { value, .. }
            | SetMode::SetRandom { value } => Some(value),
            _ => None,
        },
        StepKind::CheckVariable(check) => Some(&check.value),
        StepKind::Wait(wait) => Some(&wait.seconds),
        StepKind::Effect(effect) => {
            for (name, input) in &effect.args {
                bound.args.insert(name.clone(), resolve_input(input, frame, ctx)?);
            }
            None
        }
        _ => None,
    };
    if let Some(input) = single {
        bound.value = Some(resolve_input(input, frame, ctx)?);
    }
    Ok(bound)
}

fn resolve_input(input: &Input, frame: &Frame<'_>, ctx: &EngineContext) -> EngineResult<Value> {
    let value = match input {
        Input::Literal(value) => value.clone(),
        Input::Parameter(id) => frame
            .parameters
            .get(*id)
            .map(|p| p.value().clone())
            .ok_or_else(|| EngineError::unresolved(format!("parameter {}", id)))?,
        Input::Variable(var) => ctx.variables.get(var, frame.local)?.value().clone(),
    };
    Ok(rehydrate(value, ctx))
}

/// Swap persisted object references for live ones where the host can
fn rehydrate(value: Value, ctx: &EngineContext) -> Value {
    let live = |o: Option<ObjectRef>| -> Option<ObjectRef> {
        let o = o?;
        if o.is_live() {
            return Some(o);
        }
        let resolved = o
            .stable_id
            .zip(ctx.host.objects.as_ref())
            .and_then(|(id, objects)| objects.resolve_by_stable_id(id));
        Some(resolved.unwrap_or(o))
    };
    match value {
        Value::Object(o) => Value::Object(live(o)),
        Value::ExternalObject(o) => Value::ExternalObject(live(o)),
        other => other,
    }
}

/// Execute `step` once
pub(crate) fn execute(
    step: &Step,
    state: &mut StepState,
    frame: &Frame<'_>,
    ctx: &mut EngineContext,
    elapsed: f32,
) -> StepPoll {
    let first = !state.is_running;
    if first {
        trace!(
            definition = %frame.definition.id(),
            index = frame.index,
            step = step.display_name(),
            "Activating step"
        );
        state.activate(step, frame, ctx);
    }

    let result = match state.bind_error.take() {
        Some(e) => Err(e),
        None => match &step.kind {
            StepKind::SetVariable(set) => set_variable(set, state, frame, ctx, elapsed, false),
            StepKind::CheckVariable(check) => check_variable(check, state, frame, ctx),
            StepKind::Wait(_) => wait(state, elapsed, first),
            StepKind::WaitForSignal(wait) => wait_for_signal(wait, state, ctx, elapsed),
            StepKind::RunSequence(run) => run_sequence(run, state, frame, ctx),
            StepKind::EndSequence(end) => {
                ctx.end_all(&end.target);
                Ok(StepPoll::Complete)
            }
            StepKind::CheckRunning(check) => Ok(branch(ctx.is_running(&check.target))),
            StepKind::Effect(effect) => run_effect(effect, state, ctx, elapsed),
        },
    };

    let poll = result.unwrap_or_else(|e| recover(step, frame, &e));
    state.settle(poll)
}

/// Bring `step` to its end state immediately
pub(crate) fn skip(
    step: &Step,
    state: &mut StepState,
    frame: &Frame<'_>,
    ctx: &mut EngineContext,
    depth: usize,
) -> StepPoll {
    if !state.is_running {
        state.activate(step, frame, ctx);
    }

    let result = match state.bind_error.take() {
        Some(e) => Err(e),
        None => match &step.kind {
            StepKind::SetVariable(set) => set_variable(set, state, frame, ctx, 0.0, true),
            StepKind::CheckVariable(check) => check_variable(check, state, frame, ctx),
            StepKind::Wait(_) => Ok(StepPoll::Complete),
            // as if the signal had arrived
            StepKind::WaitForSignal(_) => Ok(StepPoll::Branch(0)),
            StepKind::RunSequence(run) => skip_run_sequence(run, state, frame, ctx, depth),
            StepKind::EndSequence(end) => {
                ctx.end_all(&end.target);
                Ok(StepPoll::Complete)
            }
            StepKind::CheckRunning(check) => Ok(branch(ctx.is_running(&check.target))),
            StepKind::Effect(effect) => skip_effect(effect, state, ctx),
        },
    };

    let poll = match result.unwrap_or_else(|e| recover(step, frame, &e)) {
        StepPoll::Pending(_) => StepPoll::Complete,
        poll => poll,
    };
    state.settle(poll)
}

fn branch(condition: bool) -> StepPoll {
    StepPoll::Branch(if condition { 0 } else { 1 })
}

/// Log a failure and pick the no-op outcome
fn recover(step: &Step, frame: &Frame<'_>, error: &EngineError) -> StepPoll {
    warn!(
        definition = %frame.definition.id(),
        index = frame.index,
        step = step.display_name(),
        error = %error,
        "Step failed, continuing"
    );
    if !step.kind.is_conditional() {
        return StepPoll::Complete;
    }
    match error {
        EngineError::UnresolvedReference(_) | EngineError::NoLocalContext(_) => {
            StepPoll::Branch(HALT)
        }
        _ => StepPoll::Branch(1),
    }
}

fn set_variable(
    set: &SetVariableStep,
    state: &mut StepState,
    frame: &Frame<'_>,
    ctx: &mut EngineContext,
    elapsed: f32,
    skipping: bool,
) -> EngineResult<StepPoll> {
    if let SetMode::IncreaseBy { over_seconds, .. } = set.mode {
        if over_seconds > 0.0 {
            return increase_over_time(set, over_seconds, state, frame, ctx, elapsed, skipping);
        }
    }

    let current = ctx.variables.get(&set.target, frame.local)?.value().clone();
    let new_value = match &set.mode {
        SetMode::SetValue { .. } => state.value()?.clone(),
        SetMode::IncreaseBy { .. } => add_scaled(&current, state.value()?, 1.0)?,
        SetMode::SetRandom { .. } => random(current.kind(), state.value()?, &mut ctx.rng)?,
        SetMode::Formula { formula } => {
            let tokens = InstanceTokens {
                scopes: &ctx.variables,
                local: frame.local,
                parameters: frame.parameters,
                container: set.target.container.as_ref(),
            };
            ctx.formula.evaluate_as(formula, current.kind(), &tokens)?
        }
        SetMode::CopyFromVariable { source } => {
            ctx.variables.get(source, frame.local)?.value().clone()
        }
        SetMode::CopyFromExternal { name } => read_external(ctx, name, current.kind())?,
        SetMode::CopyFromMenuText {
            container,
            element,
            slot,
        } => {
            let menus = ctx
                .host
                .menus
                .as_ref()
                .ok_or_else(|| EngineError::unresolved("menu text source"))?;
            let text = menus.get_text(container, element, *slot).ok_or_else(|| {
                EngineError::unresolved(format!("menu element {}/{}", container, element))
            })?;
            if current.kind() != ValueKind::String {
                return Err(EngineError::mismatch(current.kind(), ValueKind::String));
            }
            Value::String(text)
        }
        SetMode::Toggle => match current {
            Value::Bool(b) => Value::Bool(!b),
            other => return Err(EngineError::mismatch(ValueKind::Bool, other.kind())),
        },
    };

    write(ctx, &set.target, frame.local, new_value)?;
    Ok(StepPoll::Complete)
}

fn write(
    ctx: &mut EngineContext,
    target: &VariableRef,
    local: &LocalContext,
    value: Value,
) -> EngineResult<()> {
    debug!(variable = %target, value = %value, "Setting variable");
    ctx.variables.get_mut(target, local)?.set(value)
}

/// Interpolated `increase_by`
///
/// The starting value is kept in the variable's backup slot, owned by this
/// step instance. The final write is always the exact sum, so skipping and
/// running to completion agree.
fn increase_over_time(
    set: &SetVariableStep,
    over_seconds: f32,
    state: &mut StepState,
    frame: &Frame<'_>,
    ctx: &mut EngineContext,
    elapsed: f32,
    skipping: bool,
) -> EngineResult<StepPoll> {
    let owner = frame.owner();
    let amount = state.value()?.clone();
    let variable = ctx.variables.get_mut(&set.target, frame.local)?;

    if !state.holds_backup() {
        if skipping || !variable.begin_backup(owner) {
            if !skipping {
                warn!(
                    variable = %set.target,
                    "Variable is already being interpolated, applying increase at once"
                );
            }
            let end = add_scaled(variable.value(), &amount, 1.0)?;
            variable.set(end)?;
            return Ok(StepPoll::Complete);
        }
        state.runtime = StepRuntime::Interpolation { elapsed: 0.0 };
        return Ok(StepPoll::Pending(0.0));
    }

    let so_far = match &mut state.runtime {
        StepRuntime::Interpolation { elapsed: so_far } => {
            *so_far += elapsed;
            *so_far
        }
        _ => over_seconds,
    };
    let Some(start) = variable.backup_for(owner).cloned() else {
        return Ok(StepPoll::Complete);
    };

    let fraction = if skipping { 1.0 } else { (so_far / over_seconds).min(1.0) };
    let result = add_scaled(&start, &amount, fraction).and_then(|v| variable.set(v));
    if result.is_err() || fraction >= 1.0 {
        variable.release_backup(owner);
        result?;
        return Ok(StepPoll::Complete);
    }
    Ok(StepPoll::Pending(0.0))
}

/// `start + amount * fraction`, in the kind of `start`
fn add_scaled(start: &Value, amount: &Value, fraction: f32) -> EngineResult<Value> {
    match (start, amount) {
        (Value::Vector3(a), Value::Vector3(b)) => Ok(Value::Vector3(a.add(b.scale(fraction)))),
        (Value::Integer(_) | Value::Float(_), _) => {
            let base = start.as_f64().unwrap_or_default();
            let delta = amount
                .as_f64()
                .ok_or_else(|| EngineError::mismatch(start.kind(), amount.kind()))?;
            Value::from_f64(start.kind(), base + delta * f64::from(fraction))
                .ok_or_else(|| EngineError::mismatch(start.kind(), amount.kind()))
        }
        _ => Err(EngineError::mismatch(start.kind(), amount.kind())),
    }
}

/// Random number in `[0, n)`, or `(n, 0]` for negative `n`
fn random(kind: ValueKind, bound: &Value, rng: &mut impl Rng) -> EngineResult<Value> {
    let n = bound
        .as_f64()
        .ok_or_else(|| EngineError::mismatch(kind, bound.kind()))?;
    if !n.is_finite() || (kind == ValueKind::Float && !(n as f32).is_finite()) {
        return Err(EngineError::InvalidDefinition(format!(
            "random bound {} is not finite",
            n
        )));
    }
    match kind {
        ValueKind::Integer => {
            let n = n.trunc() as i32;
            let value = match n {
                0 => 0,
                n if n > 0 => rng.gen_range(0..n),
                n => rng.gen_range(n.saturating_add(1)..=0),
            };
            Ok(Value::Integer(value))
        }
        ValueKind::Float => {
            let n = n as f32;
            let value = if n.abs() <= f32::EPSILON {
                0.0
            } else if n > 0.0 {
                rng.gen_range(0.0..n)
            } else {
                -rng.gen_range(0.0..-n)
            };
            Ok(Value::Float(value))
        }
        other => Err(EngineError::mismatch(ValueKind::Float, other)),
    }
}

fn read_external(ctx: &EngineContext, name: &str, kind: ValueKind) -> EngineResult<Value> {
    let source = ctx
        .host
        .parameters
        .as_ref()
        .ok_or_else(|| EngineError::unresolved("external parameter source"))?;
    let value = match kind {
        ValueKind::Bool => source.get_bool(name),
        ValueKind::Integer => source.get_int(name),
        ValueKind::Float => source.get_float(name),
        other => return Err(EngineError::mismatch(ValueKind::Float, other)),
    };
    value.ok_or_else(|| EngineError::unresolved(format!("external parameter '{}'", name)))
}

fn check_variable(
    check: &CheckVariableStep,
    state: &StepState,
    frame: &Frame<'_>,
    ctx: &EngineContext,
) -> EngineResult<StepPoll> {
    let current = ctx.variables.get(&check.target, frame.local)?.value();
    let result = compare(current, check.op, state.value()?, check.options)?;
    trace!(variable = %check.target, op = ?check.op, result, "Checked variable");
    Ok(branch(result))
}

fn wait(state: &mut StepState, elapsed: f32, first: bool) -> EngineResult<StepPoll> {
    if first {
        let value = state.value()?;
        let seconds = value
            .as_f64()
            .ok_or_else(|| EngineError::mismatch(ValueKind::Float, value.kind()))?
            as f32;
        if !seconds.is_finite() {
            return Err(EngineError::InvalidDefinition(format!(
                "wait of {} seconds",
                seconds
            )));
        }
        if seconds <= 0.0 {
            return Ok(StepPoll::Complete);
        }
        state.runtime = StepRuntime::Timer { remaining: seconds };
        return Ok(StepPoll::Pending(seconds));
    }

    let StepRuntime::Timer { remaining } = &mut state.runtime else {
        return Ok(StepPoll::Complete);
    };
    *remaining -= elapsed;
    if *remaining <= FLOAT_EPSILON {
        Ok(StepPoll::Complete)
    } else {
        Ok(StepPoll::Pending(*remaining))
    }
}

fn wait_for_signal(
    wait: &WaitForSignalStep,
    state: &mut StepState,
    ctx: &EngineContext,
    elapsed: f32,
) -> EngineResult<StepPoll> {
    if ctx.scheduler.signal_raised(&wait.signal) {
        debug!(signal = %wait.signal, "Signal received");
        return Ok(StepPoll::Branch(0));
    }

    let waited = match &mut state.runtime {
        StepRuntime::Signal { elapsed: so_far } => {
            *so_far += elapsed;
            *so_far
        }
        runtime => {
            *runtime = StepRuntime::Signal { elapsed: 0.0 };
            0.0
        }
    };

    match wait.timeout {
        Some(timeout) if waited >= timeout => {
            debug!(signal = %wait.signal, timeout, "Signal wait timed out");
            Ok(StepPoll::Branch(1))
        }
        _ => Ok(StepPoll::Pending(0.0)),
    }
}

/// Start the target with parameters bound from the step's cache
fn start_child(
    run: &RunSequenceStep,
    frame: &Frame<'_>,
    ctx: &mut EngineContext,
) -> EngineResult<(InstanceId, bool)> {
    let target = ctx
        .library
        .get(&run.target)
        .cloned()
        .ok_or_else(|| EngineError::unresolved(format!("sequence '{}'", run.target)))?;

    let mut parameters = target.parameters.clone();
    if run.parameters.needs_resync(&parameters) {
        if run.parameters.is_empty() {
            debug!(
                definition = %frame.definition.id(),
                target = %run.target,
                "No parameter bindings cached, using target defaults"
            );
        } else {
            warn!(
                definition = %frame.definition.id(),
                target = %run.target,
                "Parameter bindings are stale, resynchronizing for this run"
            );
        }
        let mut bindings = run.parameters.clone();
        bindings.resync(&parameters);
        bindings.bulk_assign(&mut parameters, Some(frame.parameters), target.is_asset_scoped());
    } else {
        run.parameters
            .bulk_assign(&mut parameters, Some(frame.parameters), target.is_asset_scoped());
    }

    let child = ctx.start_with(
        &run.target,
        run.from_index,
        run.exclusive_run_only,
        Some(parameters),
        Some(frame.instance),
    )?;
    let wait = run.wait.unwrap_or(target.mode == ExecutionMode::Sequential);
    Ok((child, wait))
}

fn run_sequence(
    run: &RunSequenceStep,
    state: &mut StepState,
    frame: &Frame<'_>,
    ctx: &mut EngineContext,
) -> EngineResult<StepPoll> {
    if let StepRuntime::Child(child) = state.runtime {
        return Ok(if ctx.scheduler.contains(child) {
            StepPoll::Pending(0.0)
        } else {
            StepPoll::Complete
        });
    }

    let (child, wait) = start_child(run, frame, ctx)?;
    if !wait {
        return Ok(StepPoll::Complete);
    }
    state.runtime = StepRuntime::Child(child);
    Ok(StepPoll::Pending(0.0))
}

fn skip_run_sequence(
    run: &RunSequenceStep,
    state: &mut StepState,
    frame: &Frame<'_>,
    ctx: &mut EngineContext,
    depth: usize,
) -> EngineResult<StepPoll> {
    let child = match state.runtime {
        StepRuntime::Child(child) => child,
        _ => start_child(run, frame, ctx)?.0,
    };
    if !ctx.scheduler.contains(child) {
        return Ok(StepPoll::Complete);
    }

    if depth >= ctx.settings.max_nesting {
        warn!(
            target = %run.target,
            depth,
            "Sub-sequence nesting too deep to skip, ending it instead"
        );
        ctx.end_instance(child);
    } else {
        ctx.skip_instance(child, depth + 1);
    }
    Ok(StepPoll::Complete)
}

fn run_effect(
    effect: &EffectStep,
    state: &mut StepState,
    ctx: &EngineContext,
    elapsed: f32,
) -> EngineResult<StepPoll> {
    if let StepRuntime::Effect(effector) = &mut state.runtime {
        let remaining = effector.poll(elapsed);
        return Ok(if remaining <= 0.0 {
            StepPoll::Complete
        } else {
            StepPoll::Pending(remaining)
        });
    }

    let mut effector = ctx
        .effectors
        .create(&effect.effector)
        .ok_or_else(|| EngineError::unresolved(format!("effector '{}'", effect.effector)))?;
    let remaining = effector.start(&state.bound.args);
    if !effect.wait_until_finish || remaining <= 0.0 {
        return Ok(StepPoll::Complete);
    }
    state.runtime = StepRuntime::Effect(effector);
    Ok(StepPoll::Pending(remaining))
}

fn skip_effect(
    effect: &EffectStep,
    state: &mut StepState,
    ctx: &EngineContext,
) -> EngineResult<StepPoll> {
    let mut effector = match std::mem::take(&mut state.runtime) {
        StepRuntime::Effect(effector) => effector,
        _ => ctx
            .effectors
            .create(&effect.effector)
            .ok_or_else(|| EngineError::unresolved(format!("effector '{}'", effect.effector)))?,
    };
    effector.finish(&state.bound.args);
    Ok(StepPoll::Complete)
}

/// Formula tokens resolved against the running instance
struct InstanceTokens<'a> {
    scopes: &'a VariableScopes,
    local: &'a LocalContext,
    parameters: &'a ParameterList,
    container: Option<&'a ObjectRef>,
}

impl TokenSource for InstanceTokens<'_> {
    fn resolve(&self, token: &Token) -> Option<f64> {
        match token {
            Token::Variable { scope, id } => self
                .scopes
                .resolve(*scope, *id, self.container, self.local)
                .ok()?
                .value()
                .as_f64(),
            Token::Parameter(id) => self.parameters.get(*id)?.value().as_f64(),
        }
    }
}
