//! SPEC_FULL.md §8 scenario 6: resetting out of a state cancels its invoked
//! service, and the service's eventual completion is never observed.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use statecraft_core::prelude::*;

#[tokio::test]
async fn reset_cancels_the_invoked_service() {
    let long_delay = common::STEP * 5;

    let chart = common::build(
        "root",
        NodeSpec::compound("root", "idle")
            .child(NodeSpec::atomic("idle").on("GO", TransitionSpec::new().target("running")))
            .child(NodeSpec::atomic("running").invoke(
                Some("slowService".to_string()),
                "slow",
                Some(TransitionSpec::new().target("idle")),
                None,
            )),
    );

    let done_count = Arc::new(AtomicUsize::new(0));
    let done_count_for_service = Arc::clone(&done_count);
    let registry = Registry::new().service("slow", move |_token| {
        let done_count = Arc::clone(&done_count_for_service);
        let delay = long_delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            done_count.fetch_add(1, Ordering::SeqCst);
            statecraft_core::registry::ServiceOutcome::Done(serde_json::json!({ "ok": true }))
        })
    });

    let machine = common::machine(chart, registry);
    machine.start().await.unwrap();
    assert_eq!(machine.active_leaves().await, "idle");

    machine.send("GO").await.unwrap();
    assert_eq!(machine.active_leaves().await, "running");

    // Reset well before the service would complete.
    common::wait_steps(1).await;
    machine.reset().await.unwrap();
    assert_eq!(machine.active_leaves().await, "idle");

    // Wait past the point the service would have completed had it not
    // been cancelled, then confirm it never ran to completion.
    tokio::time::sleep(long_delay + Duration::from_millis(100)).await;
    assert_eq!(machine.active_leaves().await, "idle");
    assert_eq!(done_count.load(Ordering::SeqCst), 0, "cancelled service must never complete");

    machine.stop().await.unwrap();
}
