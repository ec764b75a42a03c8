// tests/network.rs

mod common;
use crate::common::builders::SpecBuilder;
use crate::common::{first_instance, init_tracing, name, roomy_runner};

use std::error::Error;
use std::sync::Arc;

use dagtrack::config::TrackerConfig;
use dagtrack::errors::DagtrackError;
use dagtrack::fs::mock::MockFileSystem;
use dagtrack::structs::Artifact;
use dagtrack::tracker::{
    BuildSources, EdgeKind, Instantiation, Node, Registry, TaskNetwork, Tracker,
};

type TestResult = Result<(), Box<dyn Error>>;

fn task_node(tracker: &Tracker, abstract_name: &str) -> Node {
    Node::Task(first_instance(tracker, abstract_name))
}

fn art_node(path: &str) -> Node {
    Node::Artifact(Artifact::new(path).unwrap_or_else(|e| panic!("bad artifact '{path}': {e}")))
}

#[test]
fn dependencies_point_at_their_dependents() -> TestResult {
    init_tracing();

    let tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::build").depends_on("basic::fetch").build())
        .with_spec(SpecBuilder::new("basic::fetch").build())
        .target("basic::build")
        .prepare()?;

    let network = tracker.network();
    let build = task_node(&tracker, "basic::build");
    let fetch = task_node(&tracker, "basic::fetch");

    assert!(network.is_valid());
    assert_eq!(network.edge_kind(&fetch, &build), Some(EdgeKind::Task));
    assert_eq!(network.edge_kind(&build, &fetch), None);
    assert_eq!(network.edge_kind(&build, &Node::Root), Some(EdgeKind::TaskCross));
    assert_eq!(network.pred(&Node::Root), vec![build.clone()]);

    // both instances bring their cleanups, which wait on them
    let build_name = first_instance(&tracker, "basic::build");
    let cleanup = Node::Task(build_name.with_cleanup());
    assert!(network.contains(&cleanup));
    assert!(network.pred(&cleanup).contains(&build));
    assert!(network.is_reactive(&cleanup));
    assert_eq!(network.len(), 4);
    Ok(())
}

#[test]
fn required_for_pulls_in_the_blocker() -> TestResult {
    init_tracing();

    let tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::ship").build())
        .with_spec(SpecBuilder::new("basic::lint").required_for("basic::ship").build())
        .target("basic::ship")
        .prepare()?;

    let ship = task_node(&tracker, "basic::ship");
    let lint = task_node(&tracker, "basic::lint");
    assert_eq!(tracker.network().edge_kind(&lint, &ship), Some(EdgeKind::Task));
    Ok(())
}

#[test]
fn artifacts_link_producers_and_consumers() -> TestResult {
    init_tracing();

    let tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::consume").depends_on("file::>out.txt").build())
        .with_spec(SpecBuilder::new("basic::produce").required_for("file::>out.txt").build())
        .target("basic::consume")
        .prepare()?;

    let network = tracker.network();
    let consume = task_node(&tracker, "basic::consume");
    let produce = task_node(&tracker, "basic::produce");
    let out = art_node("out.txt");

    assert_eq!(network.edge_kind(&out, &consume), Some(EdgeKind::ArtifactCross));
    assert_eq!(network.edge_kind(&produce, &out), Some(EdgeKind::ArtifactCross));

    let edges = network.concrete_edges(&out);
    assert_eq!(edges.pred.tasks, vec![first_instance(&tracker, "basic::produce")]);
    assert_eq!(edges.succ.tasks, vec![first_instance(&tracker, "basic::consume")]);
    assert!(!edges.succ.root);
    Ok(())
}

#[test]
fn abstract_artifacts_gather_matching_concrete_ones() -> TestResult {
    init_tracing();

    let tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::bundle").depends_on("file::>out/*.txt").build())
        .with_spec(SpecBuilder::new("basic::write").required_for("file::>out/a.txt").build())
        .target("basic::bundle")
        .prepare()?;

    let network = tracker.network();
    let pattern = art_node("out/*.txt");
    let concrete = art_node("out/a.txt");
    let write = task_node(&tracker, "basic::write");

    assert_eq!(network.edge_kind(&concrete, &pattern), Some(EdgeKind::ArtifactDown));
    assert_eq!(network.edge_kind(&write, &concrete), Some(EdgeKind::ArtifactCross));

    let edges = network.concrete_edges(&pattern);
    assert_eq!(edges.pred.concrete_artifacts, vec![Artifact::new("out/a.txt")?]);
    assert!(edges.pred.abstract_artifacts.is_empty());
    Ok(())
}

#[test]
fn concrete_artifacts_point_up_to_known_patterns() -> TestResult {
    init_tracing();

    let tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::read").depends_on("file::>logs/today.log").build())
        .with_spec(SpecBuilder::new("basic::archive").depends_on("file::>logs/*.log").build())
        .target("basic::read")
        .prepare()?;

    let edge = tracker
        .network()
        .edge_kind(&art_node("logs/today.log"), &art_node("logs/*.log"));
    assert_eq!(edge, Some(EdgeKind::ArtifactUp));
    Ok(())
}

#[test]
fn transformers_are_instantiated_for_missing_producers() -> TestResult {
    init_tracing();

    let tracker = roomy_runner()
        .with_spec(
            SpecBuilder::new("basic::compile")
                .flag("TRANSFORMER")
                .depends_on("file::>src/*.c")
                .required_for("file::>build/*.o")
                .build(),
        )
        .with_spec(SpecBuilder::new("basic::link").depends_on("file::>build/main.o").build())
        .target("basic::link")
        .prepare()?;

    let network = tracker.network();
    let object = art_node("build/main.o");
    let source = art_node("src/main.c");

    let producers: Vec<Node> = network.pred(&object);
    let compile = producers
        .iter()
        .find_map(|n| n.as_task().filter(|t| t.de_uniq() == name("basic::compile")))
        .cloned()
        .ok_or("no transformer instance produces build/main.o")?;
    let compile = Node::Task(compile);

    assert_eq!(network.edge_kind(&compile, &object), Some(EdgeKind::ArtifactCross));
    assert_eq!(network.edge_kind(&source, &compile), Some(EdgeKind::ArtifactCross));
    Ok(())
}

#[test]
fn cycles_fail_the_build() {
    init_tracing();

    let result = roomy_runner()
        .with_spec(SpecBuilder::new("basic::a").depends_on("basic::b").build())
        .with_spec(SpecBuilder::new("basic::b").depends_on("basic::a").build())
        .target("basic::a")
        .prepare();

    match result {
        Err(DagtrackError::TrackingError(msg)) => assert!(msg.contains("cycle"), "{msg}"),
        Err(e) => panic!("expected a cycle error, got {e:?}"),
        Ok(_) => panic!("expected a cycle error"),
    }
}

#[test]
fn validation_passes_for_a_built_network() -> TestResult {
    init_tracing();

    let mut tracker = roomy_runner()
        .with_spec(SpecBuilder::new("basic::build").depends_on("basic::fetch").build())
        .with_spec(SpecBuilder::new("basic::fetch").build())
        .target("basic::build")
        .prepare()?;
    assert!(tracker.validate()?);
    Ok(())
}

fn bare_registry(specs: Vec<dagtrack::structs::TaskSpec>) -> Registry {
    let mut registry = Registry::new(&TrackerConfig::default(), Arc::new(MockFileSystem::new()));
    registry
        .register_spec(specs)
        .unwrap_or_else(|e| panic!("registration failed: {e}"));
    registry
}

#[test]
fn only_registered_concrete_tasks_join_the_network() -> TestResult {
    init_tracing();

    let mut registry = bare_registry(vec![SpecBuilder::new("basic::build").build()]);
    let mut network = TaskNetwork::new();

    assert!(network.add_node(&mut registry, Node::Task(name("basic::build"))).is_err());
    assert!(network
        .add_node(&mut registry, Node::Task(name("basic::ghost").to_uniq()))
        .is_err());

    let inst = registry
        .instantiate_spec(&name("basic::build"), Instantiation::Reuse)?
        .ok_or("no instance")?;
    network.add_node(&mut registry, Node::Task(inst.clone()))?;
    assert!(!network.is_valid(), "new nodes invalidate the network");
    assert!(network
        .connect(&mut registry, Node::Task(inst.clone()), Node::Task(inst), EdgeKind::Task)
        .is_err());
    Ok(())
}

#[test]
fn unknown_artifacts_are_registered_on_sight() -> TestResult {
    init_tracing();

    let mut registry = bare_registry(Vec::new());
    let mut network = TaskNetwork::new();
    let node = art_node("notes.md");

    network.add_node(&mut registry, node.clone())?;
    assert!(registry.has_artifact(&Artifact::new("notes.md")?));
    network.build(&mut registry, BuildSources::Nodes(vec![node.clone()]))?;
    assert!(network.is_valid());
    assert!(network.is_expanded(&node));
    Ok(())
}

#[test]
fn building_from_connected_nodes_sweeps_everything() -> TestResult {
    init_tracing();

    let mut registry = bare_registry(vec![
        SpecBuilder::new("basic::build").depends_on("basic::fetch").build(),
        SpecBuilder::new("basic::fetch").build(),
    ]);
    let mut network = TaskNetwork::new();
    let build = registry
        .instantiate_spec(&name("basic::build"), Instantiation::Reuse)?
        .ok_or("no instance")?;
    network.connect_to_root(&mut registry, Node::Task(build.clone()))?;

    network.build(&mut registry, BuildSources::Connected)?;
    assert!(network.nodes().all(|n| network.is_expanded(n)));
    assert!(network.validate_network(&registry, true)?);
    assert_eq!(network.pred(&Node::Task(build)).len(), 1);
    Ok(())
}
