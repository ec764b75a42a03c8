// tests/names.rs

mod common;
use crate::common::{init_tracing, name};

use std::cmp::Ordering;
use std::error::Error;

use proptest::prelude::*;

use dagtrack::errors::DagtrackError;
use dagtrack::structs::{NameMark, TaskName};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn parses_group_and_body() -> TestResult {
    init_tracing();

    let n: TaskName = "basic::build.docs".parse()?;
    assert_eq!(n.group(), ["basic"]);
    assert_eq!(n.body(), ["build", "docs"]);
    assert!(!n.is_concrete());
    assert_eq!(n.to_string(), "basic::build.docs");
    Ok(())
}

#[test]
fn tasks_prefix_is_dropped_from_group() -> TestResult {
    init_tracing();

    let n: TaskName = "tasks.basic::build".parse()?;
    assert_eq!(n.to_string(), "basic::build");
    Ok(())
}

#[test]
fn malformed_names_are_rejected() {
    init_tracing();

    for bad in ["basic:build", "no_group", "a::b::c", "basic::", "basic::.x", "basic::a...b", ".x::a"] {
        match bad.parse::<TaskName>() {
            Err(DagtrackError::NameFormatError(_)) => {}
            other => panic!("expected NameFormatError for '{bad}', got {other:?}"),
        }
    }
}

#[test]
fn generated_marks_open_their_section() -> TestResult {
    init_tracing();

    let head: TaskName = "basic::job.$head$".parse()?;
    assert_eq!(head.to_string(), "basic::job..$head$");
    assert!(head.is_head());
    assert!(head.has_generated_section());

    let same = name("basic::job").with_head();
    assert_eq!(head, same);
    assert_eq!(same.with_head(), same);
    Ok(())
}

#[test]
fn cleanup_of_a_head_keeps_one_section() {
    init_tracing();

    let cleanup = name("basic::job").with_head().with_cleanup();
    assert_eq!(cleanup.to_string(), "basic::job..$head$.$cleanup$");
    assert!(cleanup.is_cleanup());
    assert!(!cleanup.is_head());
    assert_eq!(cleanup.last_mark(), Some(NameMark::Cleanup));
    assert_eq!(cleanup.root(), name("basic::job"));
}

#[test]
fn uuid_suffix_round_trips_through_text() -> TestResult {
    init_tracing();

    let inst = name("basic::build").to_uniq();
    assert!(inst.is_concrete());
    let text = inst.to_string();
    assert!(text.starts_with("basic::build[<"));
    assert!(text.ends_with(">]"));

    let parsed: TaskName = text.parse()?;
    assert_eq!(parsed, inst);
    assert_eq!(parsed.de_uniq(), name("basic::build"));
    Ok(())
}

#[test]
fn derived_names_keep_the_uuid() {
    init_tracing();

    let inst = name("basic::build").to_uniq();
    let cleanup = inst.with_cleanup();
    assert_eq!(cleanup.uuid(), inst.uuid());
    assert_eq!(cleanup.pop(true), inst);
}

#[test]
fn subnames_are_ordered_by_prefix() {
    init_tracing();

    let base = name("basic::build");
    let child = name("basic::build.docs");
    let other = name("basic::test");
    let foreign = name("other::build");

    assert!(base < child);
    assert!(child > base);
    assert_eq!(base.partial_cmp(&other), None);
    assert_eq!(base.partial_cmp(&foreign), None);
    assert_eq!(base.partial_cmp(&base.clone()), Some(Ordering::Equal));
}

#[test]
fn instances_only_order_against_their_own_uuid() {
    init_tracing();

    let base = name("basic::build");
    let a = base.to_uniq();
    let b = base.to_uniq();

    assert!(base < a);
    assert!(a < a.with_cleanup());
    assert_eq!(a.partial_cmp(&b), None);
    assert_eq!(a.partial_cmp(&b.with_cleanup()), None);
}

#[test]
fn push_and_pop_work_on_the_innermost_section() {
    init_tracing();

    let base = name("basic::build");
    let plain = base.push("docs");
    assert_eq!(plain.to_string(), "basic::build.docs");
    assert_eq!(plain.pop(false), plain, "no generated section to pop");

    let data = base.push_mark(NameMark::Data).push_mark(NameMark::Customised);
    assert_eq!(data.to_string(), "basic::build..$data$.$+$");
    assert_eq!(data.pop(false), base);
    assert_eq!(base.push(""), base);
}

fn word() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
}

proptest! {
    #[test]
    fn extending_a_body_always_gives_a_larger_name(
        group in word(),
        body in proptest::collection::vec(word(), 1..4),
        extra in word(),
    ) {
        let base = TaskName::new(&group, &body.join(".")).unwrap();
        let longer = base.push(&extra);

        prop_assert!(base < longer);
        prop_assert!(base < base.to_uniq());
        prop_assert!(!(longer < base));
    }

    #[test]
    fn display_then_parse_is_identity(
        group in word(),
        body in proptest::collection::vec(word(), 1..4),
        concrete in any::<bool>(),
    ) {
        let mut n = TaskName::new(&group, &body.join(".")).unwrap();
        if concrete {
            n = n.to_uniq();
        }
        let parsed: TaskName = n.to_string().parse().unwrap();
        prop_assert_eq!(parsed, n);
    }
}
