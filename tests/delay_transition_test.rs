//! SPEC_FULL.md §8 scenario 1: a single `after` transition fires once, after
//! its delay, and runs its action exactly once.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use statecraft_core::prelude::*;

#[tokio::test]
async fn after_transition_fires_once_and_runs_its_action() {
    let chart = common::build(
        "m",
        NodeSpec::compound("m", "a")
            .child(
                NodeSpec::atomic("a").after_millis(
                    common::STEP.as_millis() as u64,
                    TransitionSpec::new().target("b").action("logA"),
                ),
            )
            .child(NodeSpec::atomic("b")),
    );

    let log_count = Arc::new(AtomicUsize::new(0));
    let log_count_for_action = Arc::clone(&log_count);
    let registry = Registry::new().action("logA", move |_ctx| {
        log_count_for_action.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let machine = common::machine(chart, registry);
    machine.start().await.unwrap();
    assert_eq!(machine.active_leaves().await, "a");

    machine.wait_for_state("b", common::STEP * 5).await.unwrap();
    assert_eq!(machine.active_leaves().await, "b");
    assert_eq!(log_count.load(Ordering::SeqCst), 1);

    // Give any (incorrect) re-arming a chance to fire a second time.
    common::wait_steps(3).await;
    assert_eq!(log_count.load(Ordering::SeqCst), 1, "logA must run exactly once");

    machine.stop().await.unwrap();
}
