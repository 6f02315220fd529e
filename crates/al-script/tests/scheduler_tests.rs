//! Scheduler behavior: ticking, start rules, skip and end

mod common;

use al_core::{DefinitionId, EngineError, Value, VariableId};
use al_script::{
    BranchTarget, EndSequenceStep, MaxExceeded, SchedulerEvent, SequenceDefinition, Step,
    StepKind,
};
use al_variables::{ComparisonOp, VariableRef, VariableTable};
use common::*;

fn counters() -> VariableTable {
    let mut globals = VariableTable::new();
    globals.create("x", Value::Integer(0)).unwrap();
    globals.create("y", Value::String(String::new())).unwrap();
    globals
}

#[test]
fn test_linear_sequence_runs_in_one_tick() {
    let def = SequenceDefinition::new(
        "linear",
        vec![
            set_value(VariableRef::global(0), 5),
            set_value(VariableRef::global(1), "done"),
        ],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("linear");

    ctx.start(&id, 0, false).unwrap();
    assert!(ctx.is_running(&id));

    ctx.tick(DT);
    assert!(!ctx.is_running(&id));
    assert_eq!(global(&ctx, 0), Value::Integer(5));
    assert_eq!(global(&ctx, 1), Value::String("done".to_string()));
}

#[test]
fn test_set_increase_check_then_done() {
    let mut is_large = check(VariableRef::global(0), ComparisonOp::Greater, 3);
    is_large.on_true = BranchTarget::Continue;
    is_large.on_false = BranchTarget::Stop;
    let def = SequenceDefinition::new(
        "scenario",
        vec![
            set_value(VariableRef::global(0), 0),
            increase_by(VariableRef::global(0), 5, 0.0),
            Step::new(StepKind::CheckVariable(is_large)),
            set_value(VariableRef::global(1), "done"),
        ],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);

    ctx.start(&DefinitionId::new("scenario"), 0, false).unwrap();
    run_until_idle(&mut ctx, 5);

    assert_eq!(global(&ctx, 0), Value::Integer(5));
    assert_eq!(global(&ctx, 1), Value::String("done".to_string()));
}

#[test]
fn test_step_limit_resumes_next_tick() {
    let def = SequenceDefinition::new(
        "runaway",
        vec![increase_by(VariableRef::global(0), 1, 0.0).with_after(BranchTarget::Jump(0))],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    ctx.settings.max_steps_per_tick = 3;
    let id = DefinitionId::new("runaway");

    ctx.start(&id, 0, false).unwrap();
    ctx.tick(DT);
    assert_eq!(global(&ctx, 0), Value::Integer(3));
    assert!(ctx.is_running(&id));

    ctx.tick(DT);
    assert_eq!(global(&ctx, 0), Value::Integer(6));
    assert!(ctx.is_running(&id));
}

#[test]
fn test_start_from_index() {
    let def = SequenceDefinition::new(
        "linear",
        vec![
            set_value(VariableRef::global(0), 5),
            set_value(VariableRef::global(1), "done"),
        ],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);

    ctx.start(&DefinitionId::new("linear"), 1, false).unwrap();
    ctx.tick(DT);

    assert_eq!(global(&ctx, 0), Value::Integer(0));
    assert_eq!(global(&ctx, 1), Value::String("done".to_string()));
}

#[test]
fn test_start_past_end_completes_on_first_tick() {
    let def = SequenceDefinition::new("short", vec![set_value(VariableRef::global(0), 5)]).unwrap();
    let mut ctx = engine(counters(), vec![def]);

    ctx.start(&DefinitionId::new("short"), 4, false).unwrap();
    assert_eq!(run_until_idle(&mut ctx, 5), 1);
    assert_eq!(global(&ctx, 0), Value::Integer(0));
}

#[test]
fn test_start_unknown_definition() {
    let mut ctx = engine(counters(), vec![]);
    let err = ctx.start(&DefinitionId::new("missing"), 0, false).unwrap_err();
    assert!(matches!(err, EngineError::UnresolvedReference(_)));
}

#[test]
fn test_wait_suspends_instance() {
    let def = SequenceDefinition::new(
        "timed",
        vec![
            set_value(VariableRef::global(0), 1),
            wait(0.25),
            set_value(VariableRef::global(0), 2),
        ],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("timed");
    ctx.start(&id, 0, false).unwrap();

    for _ in 0..3 {
        ctx.tick(DT);
        assert_eq!(global(&ctx, 0), Value::Integer(1));
        assert!(ctx.is_running(&id));
    }

    ctx.tick(DT);
    assert_eq!(global(&ctx, 0), Value::Integer(2));
    assert!(!ctx.is_running(&id));
}

#[test]
fn test_disabled_step_is_passed_over() {
    let def = SequenceDefinition::new(
        "partial",
        vec![
            set_value(VariableRef::global(0), 5).disabled(),
            set_value(VariableRef::global(1), "ran"),
        ],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);

    ctx.start(&DefinitionId::new("partial"), 0, false).unwrap();
    ctx.tick(DT);

    assert_eq!(global(&ctx, 0), Value::Integer(0));
    assert_eq!(global(&ctx, 1), Value::String("ran".to_string()));
}

#[test]
fn test_single_instance_restarts() {
    let def = SequenceDefinition::new("door", vec![wait(1.0)]).unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("door");

    let first = ctx.start(&id, 0, false).unwrap();
    let second = ctx.start(&id, 0, false).unwrap();

    assert_ne!(first, second);
    assert_eq!(ctx.scheduler.live_count(&id), 1);
    assert_eq!(ctx.scheduler.instances_of(&id), vec![second]);
}

#[test]
fn test_double_start_in_one_tick_leaves_one_instance() {
    let def = SequenceDefinition::new(
        "door",
        vec![increase_by(VariableRef::global(0), 1, 0.0), wait(1.0)],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("door");

    ctx.start(&id, 0, false).unwrap();
    let second = ctx.start(&id, 0, false).unwrap();
    ctx.tick(DT);

    assert_eq!(ctx.scheduler.live_count(&id), 1);
    assert_eq!(ctx.scheduler.instances_of(&id), vec![second]);
    // only the surviving instance ran its first step
    assert_eq!(global(&ctx, 0), Value::Integer(1));
}

#[test]
fn test_exclusive_start_refused_while_running() {
    let def = SequenceDefinition::new("door", vec![wait(1.0)]).unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("door");

    let first = ctx.start(&id, 0, true).unwrap();
    let err = ctx.start(&id, 0, true).unwrap_err();

    assert_eq!(err, EngineError::MultipleInstanceConflict("door".to_string()));
    assert_eq!(ctx.scheduler.instances_of(&id), vec![first]);
}

#[test]
fn test_multiple_instances_capped() {
    let mut def = SequenceDefinition::new("spark", vec![wait(1.0)])
        .unwrap()
        .with_multiple(2);
    def.max_exceeded = MaxExceeded::Silent;
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("spark");

    ctx.start(&id, 0, false).unwrap();
    ctx.start(&id, 0, false).unwrap();
    assert!(ctx.start(&id, 0, false).is_err());
    assert_eq!(ctx.scheduler.live_count(&id), 2);
}

#[test]
fn test_end_all_stops_without_running_steps() {
    let def = SequenceDefinition::new(
        "timed",
        vec![wait(1.0), set_value(VariableRef::global(0), 9)],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("timed");

    ctx.start(&id, 0, false).unwrap();
    ctx.tick(DT);
    assert_eq!(ctx.end_all(&id), 1);
    assert!(!ctx.is_running(&id));

    run_until_idle(&mut ctx, 20);
    assert_eq!(global(&ctx, 0), Value::Integer(0));
}

#[test]
fn test_end_sequence_step_ends_its_own_sequence() {
    let def = SequenceDefinition::new(
        "quit",
        vec![
            set_value(VariableRef::global(0), 1),
            Step::new(StepKind::EndSequence(EndSequenceStep {
                target: DefinitionId::new("quit"),
            })),
            set_value(VariableRef::global(0), 2),
        ],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let mut events = ctx.subscribe();

    let instance = ctx.start(&DefinitionId::new("quit"), 0, false).unwrap();
    ctx.tick(DT);

    assert!(ctx.scheduler.is_empty());
    assert_eq!(global(&ctx, 0), Value::Integer(1));

    assert!(matches!(events.try_recv(), Ok(SchedulerEvent::Started { .. })));
    assert_eq!(
        events.try_recv().ok(),
        Some(SchedulerEvent::Ended {
            definition: DefinitionId::new("quit"),
            instance,
        })
    );
}

#[test]
fn test_skip_matches_running_to_completion() {
    let steps = vec![
        set_value(VariableRef::global(0), 1),
        wait(0.5),
        increase_by(VariableRef::global(0), 10, 1.0),
        set_value(VariableRef::global(1), "end"),
    ];
    let run_def = SequenceDefinition::new("scene", steps.clone()).unwrap();
    let skip_def = SequenceDefinition::new("scene", steps).unwrap();
    let id = DefinitionId::new("scene");

    let mut ran = engine(counters(), vec![run_def]);
    ran.start(&id, 0, false).unwrap();
    run_until_idle(&mut ran, 100);

    let mut skipped = engine(counters(), vec![skip_def]);
    skipped.start(&id, 0, false).unwrap();
    assert_eq!(skipped.skip(&id), 1);
    assert!(skipped.scheduler.is_empty());

    assert_eq!(global(&ran, 0), Value::Integer(11));
    assert_eq!(global(&ran, 0), global(&skipped, 0));
    assert_eq!(global(&ran, 1), global(&skipped, 1));
}

#[test]
fn test_skip_mid_interpolation_releases_backup() {
    let def = SequenceDefinition::new(
        "ramp",
        vec![increase_by(VariableRef::global(0), 10, 1.0)],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("ramp");

    ctx.start(&id, 0, false).unwrap();
    for _ in 0..4 {
        ctx.tick(DT);
    }
    let partial = global(&ctx, 0);
    assert!(partial != Value::Integer(0) && partial != Value::Integer(10));
    let variable = ctx.variables.global().get(VariableId(0)).unwrap();
    assert!(variable.backup_in_use());

    ctx.skip(&id);

    let variable = ctx.variables.global().get(VariableId(0)).unwrap();
    assert_eq!(variable.value(), &Value::Integer(10));
    assert!(!variable.backup_in_use());
}

#[test]
fn test_end_all_releases_backup() {
    let def = SequenceDefinition::new(
        "ramp",
        vec![increase_by(VariableRef::global(0), 10, 1.0)],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let id = DefinitionId::new("ramp");

    ctx.start(&id, 0, false).unwrap();
    ctx.tick(DT);
    ctx.tick(DT);
    ctx.end_all(&id);

    let variable = ctx.variables.global().get(VariableId(0)).unwrap();
    assert!(!variable.backup_in_use());
}

#[test]
fn test_concurrent_interpolation_applies_at_once() {
    let ramp = |name: &str| {
        SequenceDefinition::new(name, vec![increase_by(VariableRef::global(0), 10, 1.0)]).unwrap()
    };
    let mut ctx = engine(counters(), vec![ramp("first"), ramp("second")]);

    ctx.start(&DefinitionId::new("first"), 0, false).unwrap();
    ctx.tick(DT);
    ctx.start(&DefinitionId::new("second"), 0, false).unwrap();
    ctx.tick(DT);

    // the second ramp found the backup slot taken and added its amount at once
    assert!(!ctx.is_running(&DefinitionId::new("second")));
    assert!(ctx.is_running(&DefinitionId::new("first")));

    // the owning ramp interpolates from its own backed-up start
    run_until_idle(&mut ctx, 100);
    assert_eq!(global(&ctx, 0), Value::Integer(10));
    let variable = ctx.variables.global().get(VariableId(0)).unwrap();
    assert!(!variable.backup_in_use());
}

#[test]
fn test_instances_report_progress() {
    let def = SequenceDefinition::new(
        "timed",
        vec![set_value(VariableRef::global(0), 1), wait(1.0)],
    )
    .unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let instance = ctx.start(&DefinitionId::new("timed"), 0, false).unwrap();
    ctx.tick(DT);

    let info = ctx.scheduler.info(instance).unwrap();
    assert_eq!(info.current_index, 1);
    assert_eq!(info.state, al_script::InstanceState::Waiting);
    assert_eq!(ctx.scheduler.instances().len(), 1);
}

#[tokio::test]
async fn test_lifecycle_events_broadcast() {
    let def = SequenceDefinition::new("linear", vec![set_value(VariableRef::global(0), 5)]).unwrap();
    let mut ctx = engine(counters(), vec![def]);
    let mut events = ctx.subscribe();
    let id = DefinitionId::new("linear");

    let instance = ctx.start(&id, 0, false).unwrap();
    ctx.tick(DT);

    let started = events.recv().await.unwrap();
    assert_eq!(
        started,
        SchedulerEvent::Started {
            definition: id.clone(),
            instance,
            parent: None,
        }
    );
    let completed = events.recv().await.unwrap();
    assert_eq!(completed.instance(), instance);
    assert!(matches!(completed, SchedulerEvent::Completed { .. }));
}
