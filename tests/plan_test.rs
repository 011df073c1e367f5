mod common;

use tempfile::TempDir;

use common::{driver_config, write_file};
use tick_golem::driver::{Driver, PhaseSource};
use tick_golem::plan::{
    default_plan_toml, load_plan, load_valid_plan, validate_plan, ExecutedItem, ExecutionLog, Plan,
    PlanPhase, PlanSource,
};
use tick_golem::tick_error::TickError;
use tick_golem::types::{HaltReason, Suspension, TickOutcome};

const SORTER_PLAN: &str = r#"
[[phases]]
name = "assemblers"
items = ["steel-plate", "motor"]

[[phases]]
name = "refineries"
repeat = 3

[[phases]]
name = "connectors"
items = ["ice"]
enabled = false

[[phases]]
name = "containers"
items = ["iron-ore"]
"#;

fn plan_source(dir: &TempDir, contents: &str) -> (PlanSource, ExecutionLog) {
    let path = write_file(dir.path(), "plan.toml", contents);
    let log = ExecutionLog::new(true);
    (PlanSource::new(path, log.clone()), log)
}

// --- Plan file ---

#[test]
fn load_plan_reads_phases_in_order() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "plan.toml", SORTER_PLAN);

    let plan = load_plan(&path).unwrap();
    let names: Vec<&str> = plan.phases.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["assemblers", "refineries", "connectors", "containers"]);
    assert!(!plan.phases[2].enabled);
    assert!(plan.phases[0].enabled);
}

#[test]
fn repeat_generates_numbered_labels() {
    let phase = PlanPhase {
        repeat: Some(3),
        ..PlanPhase::new("sweep", &[])
    };
    assert_eq!(phase.labels(), vec!["sweep-1", "sweep-2", "sweep-3"]);

    let listed = PlanPhase::new("intake", &["a", "b"]);
    assert_eq!(listed.labels(), vec!["a", "b"]);
}

#[test]
fn load_plan_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_plan(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, TickError::Io { .. }), "got: {:?}", err);
}

#[test]
fn load_plan_malformed_file_is_plan_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "plan.toml", "[[phases]]\nitems = 3\n");
    let err = load_plan(&path).unwrap_err();
    assert!(matches!(err, TickError::Plan(_)), "got: {:?}", err);
}

#[test]
fn default_plan_is_valid() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "plan.toml", &default_plan_toml());
    let plan = load_plan(&path).unwrap();
    assert!(validate_plan(&plan).is_ok());
    assert_eq!(plan.phases.len(), 3);
}

#[test]
fn validate_plan_reports_each_problem() {
    let plan = Plan {
        phases: vec![
            PlanPhase::new("a", &["x"]),
            PlanPhase::new("a", &["y"]),
            PlanPhase::new(" ", &[]),
            PlanPhase {
                repeat: Some(2),
                ..PlanPhase::new("both", &["z"])
            },
        ],
    };

    let errors = validate_plan(&plan).unwrap_err();
    assert_eq!(errors.len(), 3, "errors: {:?}", errors);
    assert!(errors.iter().any(|e| e.contains("duplicate phase name 'a'")));
    assert!(errors.iter().any(|e| e.contains("phases[2]")));
    assert!(errors.iter().any(|e| e.contains("'both'")));
}

#[test]
fn validate_plan_requires_an_enabled_phase() {
    let plan = Plan {
        phases: vec![PlanPhase {
            enabled: false,
            ..PlanPhase::new("off", &["x"])
        }],
    };
    let errors = validate_plan(&plan).unwrap_err();
    assert!(errors[0].contains("at least one enabled phase"));

    assert!(validate_plan(&Plan::default()).is_err());
}

// --- PlanSource ---

#[test]
fn plan_source_skips_disabled_phases() {
    let dir = TempDir::new().unwrap();
    let (mut source, _log) = plan_source(&dir, SORTER_PLAN);

    let phases = source.phases().unwrap();
    let names: Vec<&str> = phases.iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["assemblers", "refineries", "containers"]);
}

#[test]
fn driver_runs_plan_items_in_order() {
    let dir = TempDir::new().unwrap();
    let (source, log) = plan_source(&dir, SORTER_PLAN);
    let mut driver = Driver::new(source, driver_config(2));

    let mut outcomes = Vec::new();
    loop {
        let outcome = driver.tick();
        let done = matches!(outcome, TickOutcome::CycleCompleted { .. });
        outcomes.push(outcome);
        if done || outcomes.len() > 20 {
            break;
        }
    }

    assert_eq!(
        log.labels(),
        vec![
            "steel-plate",
            "motor",
            "refineries-1",
            "refineries-2",
            "refineries-3",
            "iron-ore"
        ]
    );
    assert_eq!(
        outcomes,
        vec![
            TickOutcome::Suspended(Suspension::PhaseBoundary {
                finished: "assemblers".to_string()
            }),
            TickOutcome::Suspended(Suspension::Budget),
            TickOutcome::Suspended(Suspension::PhaseBoundary {
                finished: "refineries".to_string()
            }),
            TickOutcome::CycleCompleted { cycle: 1 },
        ]
    );

    assert!(log.entries().iter().all(|e| e.cycle == 1));
    assert_eq!(log.total(), 6);
    assert_eq!(log.per_phase().get("refineries"), Some(&3));
}

#[test]
fn edits_to_later_phases_apply_within_the_running_cycle() {
    let dir = TempDir::new().unwrap();
    let (source, log) = plan_source(
        &dir,
        "[[phases]]\nname = \"first\"\nitems = [\"a\"]\n\n[[phases]]\nname = \"second\"\nitems = [\"old\"]\n",
    );
    let mut driver = Driver::new(source, driver_config(10));

    driver.tick();
    assert_eq!(log.labels(), vec!["a"]);

    write_file(
        dir.path(),
        "plan.toml",
        "[[phases]]\nname = \"first\"\nitems = [\"a\"]\n\n[[phases]]\nname = \"second\"\nitems = [\"new-1\", \"new-2\"]\n",
    );

    assert_eq!(driver.tick(), TickOutcome::CycleCompleted { cycle: 1 });
    assert_eq!(log.labels(), vec!["a", "new-1", "new-2"]);
}

#[test]
fn phase_removed_mid_cycle_fails_the_cycle() {
    let dir = TempDir::new().unwrap();
    let (source, log) = plan_source(
        &dir,
        "[[phases]]\nname = \"first\"\nitems = [\"a\"]\n\n[[phases]]\nname = \"second\"\nitems = [\"b\"]\n",
    );
    let mut driver = Driver::new(source, driver_config(10));

    driver.tick();
    write_file(
        dir.path(),
        "plan.toml",
        "[[phases]]\nname = \"first\"\nitems = [\"a\"]\n",
    );

    match driver.tick() {
        TickOutcome::CycleFailed { cycle, error } => {
            assert_eq!(cycle, 1);
            assert!(error.contains("'second'"), "got: {}", error);
        }
        other => panic!("expected CycleFailed, got {:?}", other),
    }

    // Next cycle picks up the edited plan
    assert_eq!(driver.tick(), TickOutcome::CycleCompleted { cycle: 2 });
    assert_eq!(
        log.entries(),
        vec![
            ExecutedItem {
                cycle: 1,
                phase: "first".to_string(),
                label: "a".to_string()
            },
            ExecutedItem {
                cycle: 2,
                phase: "first".to_string(),
                label: "a".to_string()
            },
        ]
    );
}

#[test]
fn duplicate_name_introduced_between_cycles_fails_the_next_cycle() {
    let dir = TempDir::new().unwrap();
    let (source, log) = plan_source(&dir, "[[phases]]\nname = \"x\"\nitems = [\"a\"]\n");
    let mut driver = Driver::new(source, driver_config(10));

    assert_eq!(driver.tick(), TickOutcome::CycleCompleted { cycle: 1 });

    write_file(
        dir.path(),
        "plan.toml",
        "[[phases]]\nname = \"x\"\nitems = [\"a\"]\n\n[[phases]]\nname = \"x\"\nitems = [\"b\"]\n",
    );

    match driver.tick() {
        TickOutcome::CycleFailed { cycle, error } => {
            assert_eq!(cycle, 2);
            assert!(error.contains("duplicate phase name 'x'"), "got: {}", error);
        }
        other => panic!("expected CycleFailed, got {:?}", other),
    }
    // Neither entry ran in the rejected cycle
    assert_eq!(log.labels(), vec!["a"]);
}

#[test]
fn duplicate_name_introduced_mid_cycle_fails_the_cycle() {
    let dir = TempDir::new().unwrap();
    let (source, log) = plan_source(
        &dir,
        "[[phases]]\nname = \"first\"\nitems = [\"a\"]\n\n[[phases]]\nname = \"second\"\nitems = [\"b\"]\n",
    );
    let mut driver = Driver::new(source, driver_config(10));

    driver.tick();
    write_file(
        dir.path(),
        "plan.toml",
        "[[phases]]\nname = \"first\"\nitems = [\"a\"]\n\n[[phases]]\nname = \"second\"\nitems = [\"b\"]\n\n[[phases]]\nname = \"second\"\nitems = [\"c\"]\n",
    );

    match driver.tick() {
        TickOutcome::CycleFailed { cycle, error } => {
            assert_eq!(cycle, 1);
            assert!(error.contains("'second'"), "got: {}", error);
            assert!(error.contains("duplicate phase name"), "got: {}", error);
        }
        other => panic!("expected CycleFailed, got {:?}", other),
    }
    assert_eq!(log.labels(), vec!["a"]);
}

#[test]
fn load_valid_plan_reports_validation_errors() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "plan.toml",
        "[[phases]]\nname = \"x\"\n\n[[phases]]\nname = \"x\"\n",
    );

    let err = load_valid_plan(&path).unwrap_err();
    assert!(matches!(err, TickError::Plan(_)), "got: {:?}", err);
    assert!(err.to_string().contains("duplicate phase name 'x'"));

    let path = write_file(dir.path(), "plan.toml", &default_plan_toml());
    assert_eq!(load_valid_plan(&path).unwrap().phases.len(), 3);
}

#[test]
fn invalid_plan_halts_the_driver_on_first_tick() {
    let dir = TempDir::new().unwrap();
    let (source, log) = plan_source(
        &dir,
        "[[phases]]\nname = \"dup\"\n\n[[phases]]\nname = \"dup\"\n",
    );
    let mut driver = Driver::new(source, driver_config(10));

    match driver.tick() {
        TickOutcome::Halted(HaltReason::SetupInvalid(errors)) => {
            assert_eq!(errors, vec!["duplicate phase name 'dup'".to_string()]);
        }
        other => panic!("expected SetupInvalid, got {:?}", other),
    }
    assert_eq!(log.total(), 0);
}

#[test]
fn missing_plan_file_halts_the_driver() {
    let dir = TempDir::new().unwrap();
    let log = ExecutionLog::new(true);
    let source = PlanSource::new(dir.path().join("absent.toml"), log);
    let mut driver = Driver::new(source, driver_config(10));

    assert!(matches!(
        driver.tick(),
        TickOutcome::Halted(HaltReason::SetupInvalid(_))
    ));
}

#[test]
fn execution_log_without_retention_only_counts() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "plan.toml", SORTER_PLAN);
    let log = ExecutionLog::new(false);
    let mut driver = Driver::new(PlanSource::new(path, log.clone()), driver_config(100));

    for _ in 0..6 {
        driver.tick();
    }

    // 3 ticks per cycle with three enabled phases
    assert_eq!(driver.stats().cycles_completed, 2);
    assert_eq!(log.total(), 12);
    assert!(log.entries().is_empty());
    assert_eq!(log.per_phase().get("assemblers"), Some(&4));
}
