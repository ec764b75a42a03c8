// tests/config_loading.rs

mod common;
use crate::common::builders::{SpecBuilder, TaskFileBuilder};
use crate::common::{init_tracing, name};

use std::error::Error;
use std::fs;

use dagtrack::config::{TrackerConfig, load_and_validate, load_from_fs, load_from_str};
use dagtrack::errors::DagtrackError;
use dagtrack::fs::mock::MockFileSystem;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const TASK_FILE: &str = r#"
[tracker]
max_loop = 50
artifact_stale_after_secs = 3600

[[tasks.basic]]
name = "fetch"
actions = [{ do = "tasks.http:get" }]

[[tasks.basic]]
name = "build"
depends_on = ["basic::fetch", "file::>src/main.c"]
required_for = ["file::>build/app"]
mode = "release"

[[tasks.deploy]]
name = "ship"
flags = ["JOB"]
depends_on = [{ task = "basic::build", constraints = ["mode"] }]
"#;

fn expect_config_error(result: dagtrack::errors::Result<dagtrack::config::TaskFile>, needle: &str) {
    match result {
        Err(DagtrackError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "expected '{needle}' in: {msg}")
        }
        Err(other) => panic!("expected ConfigError containing '{needle}', got {other:?}"),
        Ok(_) => panic!("expected ConfigError containing '{needle}', got Ok"),
    }
}

#[test]
fn loads_a_task_file_from_disk() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    let path = dir.path().join("dagtrack.toml");
    fs::write(&path, TASK_FILE)?;

    let file = load_and_validate(&path)?;
    assert_eq!(file.tracker.max_loop, 50);
    assert_eq!(file.tracker.artifact_stale_after_secs, Some(3600));
    assert_eq!(file.tracker.min_priority, TrackerConfig::default().min_priority);
    assert_eq!(file.specs.len(), 3);

    let build = file
        .specs
        .iter()
        .find(|s| s.name == name("basic::build"))
        .ok_or("basic::build missing")?;
    assert_eq!(build.relations().count(), 3);

    let ship = file
        .specs
        .iter()
        .find(|s| s.name == name("deploy::ship"))
        .ok_or("deploy::ship missing")?;
    assert!(ship.is_job());
    Ok(())
}

#[test]
fn loads_through_the_mock_filesystem() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file("project/dagtrack.toml", TASK_FILE);

    let raw = load_from_fs(&fs, "project/dagtrack.toml")?;
    assert_eq!(raw.tasks.get("basic").map(Vec::len), Some(2));
    assert!(load_from_fs(&fs, "project/missing.toml").is_err());
    Ok(())
}

#[test]
fn missing_files_are_io_errors() {
    init_tracing();

    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
    match load_and_validate(dir.path().join("nope.toml")) {
        Err(DagtrackError::IoError(_)) => {}
        other => panic!("expected IoError, got {other:?}"),
    }
}

#[test]
fn an_empty_file_uses_defaults() -> TestResult {
    init_tracing();

    let raw = load_from_str("")?;
    assert_eq!(raw.tracker, TrackerConfig::default());
    assert!(raw.tasks.is_empty());
    Ok(())
}

#[test]
fn unknown_tracker_keys_are_rejected() {
    init_tracing();

    let result = load_from_str("[tracker]\nmax_loops = 5\n");
    assert!(matches!(result, Err(DagtrackError::TomlError(_))), "{result:?}");
}

#[test]
fn bad_tracker_settings_are_rejected() {
    init_tracing();

    expect_config_error(TaskFileBuilder::new().with_max_loop(0).try_build(), "max_loop");

    let inverted = TrackerConfig {
        declare_priority: 0,
        min_priority: 5,
        ..TrackerConfig::default()
    };
    expect_config_error(
        TaskFileBuilder::new().with_tracker(inverted).try_build(),
        "min_priority",
    );
}

#[test]
fn duplicate_names_are_rejected() {
    init_tracing();

    let result = TaskFileBuilder::new()
        .with_spec(SpecBuilder::new("basic::a"))
        .with_spec(SpecBuilder::new("basic::a").action("tasks.shell:run"))
        .try_build();
    expect_config_error(result, "declared more than once");
}

#[test]
fn unknown_relations_and_sources_are_rejected() {
    init_tracing();

    let result = TaskFileBuilder::new()
        .with_spec(SpecBuilder::new("basic::a").depends_on("basic::ghost"))
        .try_build();
    expect_config_error(result, "relates to unknown task");

    let result = TaskFileBuilder::new()
        .with_spec(SpecBuilder::new("basic::a").source("basic::ghost"))
        .try_build();
    expect_config_error(result, "unknown source");
}

#[test]
fn artifact_relations_need_no_declaration() -> TestResult {
    init_tracing();

    let file = TaskFileBuilder::new()
        .with_spec(SpecBuilder::new("basic::a").depends_on("file::>anything.txt"))
        .try_build()?;
    assert_eq!(file.specs.len(), 1);
    Ok(())
}

#[test]
fn self_relations_are_rejected() {
    init_tracing();

    let result = TaskFileBuilder::new()
        .with_spec(SpecBuilder::new("basic::a").depends_on("basic::a"))
        .try_build();
    expect_config_error(result, "itself");
}

#[test]
fn declared_cycles_are_rejected() {
    init_tracing();

    let result = TaskFileBuilder::new()
        .with_spec(SpecBuilder::new("basic::a").depends_on("basic::b"))
        .with_spec(SpecBuilder::new("basic::b").depends_on("basic::c"))
        .with_spec(SpecBuilder::new("basic::c").depends_on("basic::a"))
        .try_build();
    expect_config_error(result, "cycle detected in task declarations");
}

#[test]
fn malformed_tables_surface_as_struct_errors() {
    init_tracing();

    let result = TaskFileBuilder::new()
        .with_spec(SpecBuilder::new("basic::a").extra("depends_on", 5_i64))
        .try_build();
    assert!(
        matches!(result, Err(DagtrackError::StructLoadError(_))),
        "{result:?}"
    );
}
