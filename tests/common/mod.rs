#![allow(dead_code)]

pub use dagtrack_test_utils::builders;
pub use dagtrack_test_utils::runner;
pub use dagtrack_test_utils::{init_tracing, name};

use dagtrack::config::TrackerConfig;
use dagtrack::tracker::Tracker;

/// Tracker settings with enough priority headroom and loop budget that
/// decay never halts a task in a test graph.
pub fn roomy_config() -> TrackerConfig {
    TrackerConfig {
        declare_priority: 10,
        min_priority: -10_000,
        max_loop: 10_000,
        ..TrackerConfig::default()
    }
}

/// A runner over a fresh mock filesystem with [`roomy_config`].
pub fn roomy_runner() -> runner::Runner {
    runner::Runner::new().with_config(roomy_config())
}

/// The first concrete instance of an abstract name.
pub fn first_instance(tracker: &Tracker, abstract_name: &str) -> dagtrack::structs::TaskName {
    tracker
        .registry()
        .instances(&name(abstract_name))
        .first()
        .cloned()
        .unwrap_or_else(|| panic!("no instance of {abstract_name}"))
}
