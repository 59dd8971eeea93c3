//! Shared chart/machine builders for the scenario tests in this directory.
//! Mirrors `tests/common/mod.rs` in the orca test suite: a grab-bag of
//! fixture constructors the individual test files import, never a test
//! binary of its own.

use std::sync::Arc;
use std::time::Duration;

use statecraft_core::prelude::*;
use statecraft_core::chart::Chart;

pub fn build(root_id: &str, root: NodeSpec) -> Arc<Chart> {
    Arc::new(ChartBuilder::new(root_id, root).build().expect("chart should build"))
}

pub fn build_with_context(
    root_id: &str,
    root: NodeSpec,
    context: serde_json::Map<String, serde_json::Value>,
) -> Arc<Chart> {
    Arc::new(ChartBuilder::new(root_id, root).context(context).build().expect("chart should build"))
}

pub fn machine(chart: Arc<Chart>, registry: Registry) -> Machine {
    Machine::new(chart, Arc::new(registry), MachineOptions::default())
}

/// Short, test-speed stand-in for the spec's millisecond figures. Scenarios
/// in SPEC_FULL.md §8 use delays like 1000-1234ms; scaled down here so the
/// suite runs quickly without changing any of the interpreter's semantics.
pub const STEP: Duration = Duration::from_millis(60);

pub async fn wait_steps(n: u32) {
    tokio::time::sleep(STEP * n).await;
}
