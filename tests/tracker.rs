// tests/tracker.rs

mod common;
use crate::common::builders::{RelationTable, SpecBuilder};
use crate::common::runner::RunReport;
use crate::common::{first_instance, init_tracing, name, roomy_config, roomy_runner};

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dagtrack::config::TrackerConfig;
use dagtrack::fs::mock::MockFileSystem;
use dagtrack::runner::{PlanStep, SimulatedRunner};
use dagtrack::structs::{Artifact, DelayedSpec, TaskName, Value};
use dagtrack::tracker::{BuildSources, Next, Node, Status, TaskStatus, Tracker};

type TestResult = Result<(), Box<dyn Error>>;

fn before(report: &RunReport, first: &str, second: &str) -> bool {
    match (report.position(first), report.position(second)) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}

/// Index of the first step that matches `pred`.
fn step_index(report: &RunReport, pred: impl Fn(&PlanStep) -> bool) -> Option<usize> {
    report.steps.iter().position(pred)
}

fn ran_step(task: &'static str) -> impl Fn(&PlanStep) -> bool {
    move |s| matches!(s, PlanStep::Ran { task: t, .. } if t.de_uniq() == name(task))
}

fn created_step(path: &'static str) -> impl Fn(&PlanStep) -> bool {
    move |s| matches!(s, PlanStep::Created(a) if a.as_str() == path)
}

#[test]
fn dependencies_run_first_and_cleanups_follow() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(SpecBuilder::new("basic::build").depends_on("basic::fetch").build())
        .with_spec(SpecBuilder::new("basic::fetch").build())
        .target("basic::build")
        .run()?;

    assert_eq!(report.ran().len(), 4, "{:?}", report.ran());
    assert!(before(&report, "basic::fetch", "basic::build"));
    assert!(before(&report, "basic::fetch", "basic::fetch..$cleanup$"));
    assert!(before(&report, "basic::build", "basic::build..$cleanup$"));
    assert!(report
        .steps
        .iter()
        .all(|s| matches!(s, PlanStep::Ran { outcome: TaskStatus::Success, .. })));

    assert_eq!(report.trace().first().map(String::as_str), Some("basic::fetch"));
    assert!(report.tracker.queue_state().is_empty());
    Ok(())
}

#[test]
fn a_failed_dependency_halts_its_dependents() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(SpecBuilder::new("basic::build").depends_on("basic::fetch").build())
        .with_spec(SpecBuilder::new("basic::fetch").build())
        .target("basic::build")
        .fail("basic::fetch")
        .run()?;

    let ran = report.ran();
    assert!(!ran.contains(&"basic::build".to_string()), "{ran:?}");
    assert!(ran.contains(&"basic::fetch..$cleanup$".to_string()), "{ran:?}");
    assert!(ran.contains(&"basic::build..$cleanup$".to_string()), "{ran:?}");

    let registry = report.tracker.registry();
    let build = first_instance(&report.tracker, "basic::build");
    let fetch = first_instance(&report.tracker, "basic::fetch");
    assert_eq!(registry.outcome(&build), Some(TaskStatus::Halted));
    assert_eq!(registry.outcome(&fetch), Some(TaskStatus::Failed));
    assert!(
        !report.trace().contains(&"basic::build".to_string()),
        "only successes enter the trace"
    );
    Ok(())
}

#[test]
fn jobs_hand_over_to_their_head() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(SpecBuilder::new("basic::deploy").flag("JOB").build())
        .target("basic::deploy")
        .run()?;

    assert_eq!(
        report.ran(),
        vec![
            "basic::deploy".to_string(),
            "basic::deploy..$head$".to_string(),
            "basic::deploy..$head$.$cleanup$".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn missing_artifacts_are_handed_out_after_their_producer() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(SpecBuilder::new("basic::consume").depends_on("file::>out.txt").build())
        .with_spec(SpecBuilder::new("basic::produce").required_for("file::>out.txt").build())
        .target("basic::consume")
        .run()?;

    let produce = step_index(&report, ran_step("basic::produce")).ok_or("producer never ran")?;
    let created = step_index(&report, created_step("out.txt")).ok_or("artifact never handed out")?;
    let consume = step_index(&report, ran_step("basic::consume")).ok_or("consumer never ran")?;
    assert!(produce < created && created < consume, "{:?}", report.steps);

    let (status, _) = report
        .tracker
        .get_status(&Node::Artifact(Artifact::new("out.txt")?));
    assert_eq!(status, Status::Artifact(dagtrack::tracker::ArtifactStatus::Exists));
    Ok(())
}

#[test]
fn fresh_artifacts_skip_their_producer() -> TestResult {
    init_tracing();

    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("out.txt", "already here");

    let report = roomy_runner()
        .with_fs(fs)
        .with_spec(SpecBuilder::new("basic::consume").depends_on("file::>out.txt").build())
        .with_spec(SpecBuilder::new("basic::produce").required_for("file::>out.txt").build())
        .target("basic::consume")
        .run()?;

    assert!(report.position("basic::produce").is_none(), "{:?}", report.ran());
    assert!(report.position("basic::consume").is_some());
    assert!(step_index(&report, created_step("out.txt")).is_none());
    let trace = report.trace();
    assert_eq!(trace.iter().filter(|n| *n == "file::>out.txt").count(), 1, "{trace:?}");
    Ok(())
}

#[test]
fn stale_artifacts_are_rebuilt() -> TestResult {
    init_tracing();

    let fs = Arc::new(MockFileSystem::new());
    let yesterday = SystemTime::now() - Duration::from_secs(24 * 60 * 60);
    fs.add_file_modified("out.txt", "old", yesterday);
    let config = TrackerConfig {
        artifact_stale_after_secs: Some(60 * 60),
        ..roomy_config()
    };

    let report = roomy_runner()
        .with_config(config)
        .with_fs(fs)
        .with_spec(SpecBuilder::new("basic::consume").depends_on("file::>out.txt").build())
        .with_spec(SpecBuilder::new("basic::produce").required_for("file::>out.txt").build())
        .target("basic::consume")
        .run()?;

    assert!(before(&report, "basic::produce", "basic::consume"), "{:?}", report.ran());
    Ok(())
}

#[test]
fn transformers_fill_in_missing_producers() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(
            SpecBuilder::new("basic::compile")
                .flag("TRANSFORMER")
                .depends_on("file::>src/*.c")
                .required_for("file::>build/*.o")
                .build(),
        )
        .with_spec(SpecBuilder::new("basic::link").depends_on("file::>build/main.o").build())
        .target("basic::link")
        .run()?;

    let source = step_index(&report, created_step("src/main.c")).ok_or("input never handed out")?;
    let compile = step_index(&report, ran_step("basic::compile")).ok_or("transformer never ran")?;
    let link = step_index(&report, ran_step("basic::link")).ok_or("link never ran")?;
    assert!(source < compile && compile < link, "{:?}", report.steps);
    Ok(())
}

#[test]
fn blockers_run_before_what_they_block() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(SpecBuilder::new("basic::ship").build())
        .with_spec(SpecBuilder::new("basic::lint").required_for("basic::ship").build())
        .target("basic::ship")
        .run()?;

    assert!(before(&report, "basic::lint", "basic::ship"), "{:?}", report.ran());
    Ok(())
}

#[test]
fn auto_specs_activate_once_in_the_network() -> TestResult {
    init_tracing();

    let tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::serve").depends_on("basic::watch").build())
        .with_spec(SpecBuilder::new("basic::watch").queue_behaviour("auto").build())
        .target("basic::serve")
        .prepare()?;

    let watch = Node::Task(first_instance(&tracker, "basic::watch"));
    assert!(tracker.queue_state().is_active(&watch));
    Ok(())
}

#[test]
fn state_injections_copy_the_live_control_state() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(
            SpecBuilder::new("basic::announce")
                .extra("token", "abc")
                .depends_on_table(
                    RelationTable::task("basic::report")
                        .inject("from_state", "token", "token")
                        .build(),
                )
                .build(),
        )
        .with_spec(SpecBuilder::new("basic::report").build())
        .target("basic::announce")
        .run()?;

    assert!(before(&report, "basic::report", "basic::announce"));
    let report_task = first_instance(&report.tracker, "basic::report");
    let state = report
        .tracker
        .registry()
        .state_of(&report_task)
        .ok_or("report left no state")?;
    assert_eq!(state.get("token"), Some(&Value::from("abc")));
    Ok(())
}

#[test]
fn next_for_refuses_an_unbuilt_network() -> TestResult {
    init_tracing();

    let mut tracker = Tracker::with_fs(roomy_config(), Arc::new(MockFileSystem::new()));
    tracker.register([SpecBuilder::new("basic::a").build()])?;
    tracker.queue(&name("basic::a"), true)?;

    assert!(!tracker.is_valid());
    assert!(tracker.next_for(None).is_err());
    Ok(())
}

#[test]
fn next_for_targets_must_be_in_the_network() -> TestResult {
    init_tracing();

    let mut tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::a").build())
        .with_spec(SpecBuilder::new("basic::b").build())
        .target("basic::a")
        .prepare()?;

    assert!(tracker.next_for(Some(&name("basic::b"))).is_err());
    let next = tracker.next_for(Some(&name("basic::a")))?;
    match next {
        Some(Next::Task(task)) => assert_eq!(task.name().de_uniq(), name("basic::a")),
        other => panic!("expected basic::a, got {other:?}"),
    }
    Ok(())
}

#[test]
fn the_loop_limit_stops_next_for() -> TestResult {
    init_tracing();

    let config = TrackerConfig {
        max_loop: 1,
        ..roomy_config()
    };
    let mut tracker = roomy_runner()
        .with_config(config)
        .with_spec(SpecBuilder::new("basic::a").build())
        .target("basic::a")
        .prepare()?;

    assert!(tracker.next_for(None)?.is_none());
    assert!(!tracker.queue_state().is_empty());
    Ok(())
}

#[test]
fn handed_out_tasks_are_running() -> TestResult {
    init_tracing();

    let mut tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::a").build())
        .target("basic::a")
        .prepare()?;

    let node = match tracker.next_for(None)? {
        Some(next) => next.node(),
        None => return Err("nothing handed out".into()),
    };
    assert_eq!(tracker.get_status(&node).0, Status::Task(TaskStatus::Running));

    tracker.set_status(&node, TaskStatus::Success)?;
    tracker.clear();
    assert!(tracker.next_for(None)?.is_none());
    Ok(())
}

#[test]
fn queue_with_status_forces_the_outcome() -> TestResult {
    init_tracing();

    let mut tracker = Tracker::with_fs(roomy_config(), Arc::new(MockFileSystem::new()));
    tracker.register([SpecBuilder::new("basic::a").build()])?;
    let queued = tracker
        .queue_with_status(&name("basic::a"), true, TaskStatus::Success)?
        .ok_or("nothing queued")?;
    assert_eq!(
        tracker.get_status(&Node::Task(queued)).0,
        Status::Task(TaskStatus::Success)
    );
    Ok(())
}

#[test]
fn queue_spec_registers_before_queueing() -> TestResult {
    init_tracing();

    let mut tracker = Tracker::with_fs(roomy_config(), Arc::new(MockFileSystem::new()));
    let queued = tracker
        .queue_spec(SpecBuilder::new("basic::adhoc").build(), true)?
        .ok_or("nothing queued")?;
    assert_eq!(queued.de_uniq(), name("basic::adhoc"));
    assert!(tracker.registry().spec(&name("basic::adhoc")).is_some());
    Ok(())
}

#[test]
fn queueing_unknown_names_fails() {
    init_tracing();

    let mut tracker = Tracker::with_fs(roomy_config(), Arc::new(MockFileSystem::new()));
    assert!(tracker.queue(&name("basic::ghost"), true).is_err());
    assert!(tracker.queue(&name("basic::ghost").to_uniq(), true).is_err());
}

#[test]
fn next_for_hands_out_the_dependency_first() -> TestResult {
    init_tracing();

    let mut tracker = Tracker::with_fs(TrackerConfig::default(), Arc::new(MockFileSystem::new()));
    tracker.register([
        SpecBuilder::new("basic::a").depends_on("basic::b").build(),
        SpecBuilder::new("basic::b").build(),
    ])?;
    tracker.queue(&name("basic::a"), true)?;
    tracker.build(dagtrack::tracker::BuildSources::Root)?;

    let first = match tracker.next_for(None)? {
        Some(Next::Task(task)) => {
            assert_eq!(task.status, TaskStatus::Running);
            task.name().clone()
        }
        other => return Err(format!("expected a task, got {other:?}").into()),
    };
    assert_eq!(first.de_uniq(), name("basic::b"));
    tracker.set_status(&Node::Task(first), TaskStatus::Success)?;

    match tracker.next_for(None)? {
        Some(Next::Task(task)) => {
            assert_eq!(task.name().de_uniq(), name("basic::a"));
            assert_eq!(task.status, TaskStatus::Running);
        }
        other => return Err(format!("expected basic::a, got {other:?}").into()),
    }
    Ok(())
}

#[test]
fn required_for_injections_land_on_the_queued_target() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(SpecBuilder::new("basic::target").build())
        .with_spec(
            SpecBuilder::new("basic::prep")
                .extra("x", 1_i64)
                .required_for_table(
                    RelationTable::task("basic::target")
                        .inject("from_spec", "x", "x")
                        .build(),
                )
                .build(),
        )
        .target("basic::target")
        .run()?;

    let ran = report.ran();
    assert_eq!(ran.iter().filter(|n| *n == "basic::target").count(), 1, "{ran:?}");
    assert_eq!(ran.iter().filter(|n| *n == "basic::prep").count(), 1, "{ran:?}");
    assert!(before(&report, "basic::prep", "basic::target"), "{ran:?}");

    let registry = report.tracker.registry();
    let targets = registry.instances(&name("basic::target"));
    assert_eq!(targets.len(), 1, "{targets:?}");
    let state = registry.state_of(&targets[0]).ok_or("target left no state")?;
    assert_eq!(state.get("x"), Some(&Value::from(1_i64)));
    Ok(())
}

#[test]
fn required_for_constraints_pick_a_matching_blocker() -> TestResult {
    init_tracing();

    let report = roomy_runner()
        .with_spec(SpecBuilder::new("basic::target").extra("mode", "fast").build())
        .with_spec(
            SpecBuilder::new("basic::prep")
                .extra("mode", "slow")
                .required_for_table(
                    RelationTable::task("basic::target")
                        .constraint("mode", "mode")
                        .build(),
                )
                .build(),
        )
        .target("basic::target")
        .run()?;

    let registry = report.tracker.registry();
    let targets = registry.instances(&name("basic::target"));
    assert_eq!(targets.len(), 1, "{targets:?}");
    let preps = registry.instances(&name("basic::prep"));
    assert_eq!(preps.len(), 1, "{preps:?}");
    let state = registry.state_of(&preps[0]).ok_or("prep left no state")?;
    assert_eq!(state.get("mode"), Some(&Value::from("fast")));

    let ran_at = |inst: &TaskName| {
        report
            .steps
            .iter()
            .position(|s| matches!(s, PlanStep::Ran { task, .. } if task == inst))
    };
    let (prep_at, target_at) = (ran_at(&preps[0]), ran_at(&targets[0]));
    assert!(prep_at.is_some() && prep_at < target_at, "{:?}", report.steps);
    Ok(())
}

#[test]
fn conflicting_required_for_injections_fail_the_build() -> TestResult {
    init_tracing();

    let result = roomy_runner()
        .with_spec(SpecBuilder::new("basic::target").extra("x", 2_i64).build())
        .with_spec(
            SpecBuilder::new("basic::prep")
                .extra("x", 1_i64)
                .required_for_table(
                    RelationTable::task("basic::target")
                        .inject("from_spec", "x", "x")
                        .build(),
                )
                .build(),
        )
        .target("basic::target")
        .prepare();

    assert!(
        matches!(result, Err(dagtrack::errors::DagtrackError::InjectionError(_))),
        "{result:?}"
    );
    Ok(())
}

#[test]
fn jobs_register_subtasks_while_running() -> TestResult {
    init_tracing();

    let mut tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::job").flag("JOB").build())
        .with_spec(SpecBuilder::new("basic::step").build())
        .target("basic::job")
        .prepare()?;

    let job = match tracker.next_for(None)? {
        Some(Next::Task(task)) => task.name().clone(),
        other => return Err(format!("expected the job, got {other:?}").into()),
    };
    assert_eq!(job.de_uniq(), name("basic::job"));

    let delayed = DelayedSpec::new(name("basic::step"), name("basic::job.sub"));
    let sub = tracker.register_delayed(&delayed)?;
    assert_eq!(sub, name("basic::job.sub"));
    let queued = tracker.queue(&sub, true)?.ok_or("subtask was not queued")?;
    tracker.build(BuildSources::Root)?;
    assert!(tracker.is_valid());
    assert!(tracker.validate()?);

    tracker.set_status(&Node::Task(job), TaskStatus::Success)?;
    let mut ran = vec!["basic::job".to_string()];
    for _ in 0..100 {
        let node = match tracker.next_for(None)? {
            Some(next) => next.node(),
            None => break,
        };
        if let Node::Task(task) = &node {
            ran.push(task.de_uniq().to_string());
        }
        tracker.set_status(&node, TaskStatus::Success)?;
    }

    let pos = |n: &str| ran.iter().position(|r| r == n);
    assert!(pos("basic::job.sub").is_some(), "{ran:?}");
    assert!(pos("basic::job") < pos("basic::job..$head$"), "{ran:?}");
    assert!(tracker.registry().is_retired(&queued));
    assert!(tracker.is_valid());
    assert!(tracker.queue_state().is_empty());
    Ok(())
}

#[test]
fn artifacts_can_be_queued_directly() -> TestResult {
    init_tracing();

    let mut tracker = Tracker::with_fs(roomy_config(), Arc::new(MockFileSystem::new()));
    tracker.register([SpecBuilder::new("basic::produce").required_for("file::>out.txt").build()])?;
    tracker.queue_artifact(Artifact::new("out.txt")?, true)?;
    tracker.build(BuildSources::Root)?;

    let steps = SimulatedRunner::new().run(&mut tracker)?;
    let produced = steps
        .iter()
        .position(|s| matches!(s, PlanStep::Ran { task, .. } if task.de_uniq() == name("basic::produce")))
        .ok_or("producer never ran")?;
    let created = steps
        .iter()
        .position(|s| matches!(s, PlanStep::Created(a) if a.as_str() == "out.txt"))
        .ok_or("artifact never handed out")?;
    assert!(produced < created, "{steps:?}");

    let producer = first_instance(&tracker, "basic::produce");
    assert!(tracker.registry().is_retired(&producer));
    Ok(())
}
