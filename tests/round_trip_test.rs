//! SPEC_FULL.md §8 round-trip / idempotence properties: `start(); stop();
//! start()` matches a fresh `start()`, and `reset()` is idempotent.

mod common;

use statecraft_core::prelude::*;

fn counter_chart() -> std::sync::Arc<statecraft_core::chart::Chart> {
    common::build(
        "root",
        NodeSpec::compound("root", "a")
            .child(NodeSpec::atomic("a").on("next", TransitionSpec::new().target("b")))
            .child(NodeSpec::atomic("b")),
    )
}

#[tokio::test]
async fn start_stop_start_matches_a_fresh_start() {
    let machine = common::machine(counter_chart(), Registry::new());
    machine.start().await.unwrap();
    assert_eq!(machine.active_leaves().await, "a");
    machine.send("next").await.unwrap();
    assert_eq!(machine.active_leaves().await, "b");

    machine.stop().await.unwrap();
    assert_eq!(machine.active_full().await, "");

    machine.start().await.unwrap();
    assert_eq!(machine.active_leaves().await, "a", "restarting re-enters the initial configuration, not where it left off");

    machine.stop().await.unwrap();
}

#[tokio::test]
async fn reset_is_idempotent() {
    let machine = common::machine(counter_chart(), Registry::new());
    machine.start().await.unwrap();
    machine.send("next").await.unwrap();
    assert_eq!(machine.active_leaves().await, "b");

    machine.reset().await.unwrap();
    let after_first_reset = machine.active_leaves().await;
    assert_eq!(after_first_reset, "a");

    machine.reset().await.unwrap();
    assert_eq!(machine.active_leaves().await, after_first_reset);

    machine.stop().await.unwrap();
}

#[tokio::test]
async fn operations_after_stop_are_rejected() {
    let machine = common::machine(counter_chart(), Registry::new());
    machine.start().await.unwrap();
    machine.stop().await.unwrap();

    let err = machine.send("next").await.unwrap_err();
    assert!(matches!(err, MachineError::Stopped));
}
