// tests/fs_abstraction.rs

mod common;
use crate::common::builders::SpecBuilder;
use crate::common::{init_tracing, roomy_config};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use dagtrack::config::load_from_fs;
use dagtrack::fs::mock::MockFileSystem;
use dagtrack::fs::{FileSystem, RealFileSystem};
use dagtrack::structs::Artifact;
use dagtrack::tracker::{ArtifactStatus, Registry};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn rooted_real_filesystem_resolves_relative_paths() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    let fs = RealFileSystem::rooted(dir.path());
    fs.write(Path::new("dagtrack.toml"), b"[tracker]\nmax_loop = 7\n")?;

    assert!(fs.exists(Path::new("dagtrack.toml")));
    assert!(fs.is_file(&dir.path().join("dagtrack.toml")));
    assert!(fs.modified(Path::new("dagtrack.toml")).is_ok());
    assert!(fs.modified(Path::new("missing")).is_err());

    let raw = load_from_fs(&fs, "dagtrack.toml")?;
    assert_eq!(raw.tracker.max_loop, 7);
    Ok(())
}

#[test]
fn artifacts_on_a_rooted_filesystem() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    std::fs::create_dir(dir.path().join("out"))?;
    std::fs::write(dir.path().join("out/report.txt"), "done")?;

    let registry = Registry::new(&roomy_config(), Arc::new(RealFileSystem::rooted(dir.path())));
    assert_eq!(
        registry.artifact_status(&Artifact::new("out/report.txt")?),
        ArtifactStatus::Exists
    );
    assert_eq!(
        registry.artifact_status(&Artifact::new("out/other.txt")?),
        ArtifactStatus::Declared
    );
    Ok(())
}

#[test]
fn mock_filesystem_writes_and_removes() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.write(Path::new("./a.txt"), b"hello")?;
    assert_eq!(fs.read_to_string(Path::new("a.txt"))?, "hello");

    let shared = fs.clone();
    assert!(shared.exists(Path::new("a.txt")), "clones share files");

    assert!(fs.remove("a.txt"));
    assert!(!fs.remove("a.txt"));
    assert!(!shared.is_file(Path::new("a.txt")));
    assert!(fs.read_to_string(Path::new("a.txt")).is_err());
    Ok(())
}

#[test]
fn removing_an_artifact_makes_it_missing_again() -> TestResult {
    init_tracing();

    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("out.txt", "x");
    let report = crate::common::roomy_runner()
        .with_fs(fs.clone())
        .with_spec(SpecBuilder::new("basic::read").depends_on("file::>out.txt").build())
        .target("basic::read")
        .run()?;
    assert!(report.position("basic::read").is_some());

    fs.remove("out.txt");
    let registry = report.tracker.registry();
    assert!(!registry.artifact_exists(&Artifact::new("out.txt")?));
    Ok(())
}
