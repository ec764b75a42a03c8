pub mod builders;
pub mod runner;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs go through `with_test_writer()`, so the harness only shows them for
/// failing tests (or with `-- --nocapture`). Pick levels with `RUST_LOG`,
/// e.g. `RUST_LOG=dagtrack::tracker=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Parse a task name in a test, panicking on bad input.
pub fn name(s: &str) -> dagtrack::structs::TaskName {
    s.parse()
        .unwrap_or_else(|e| panic!("bad test task name '{s}': {e}"))
}
