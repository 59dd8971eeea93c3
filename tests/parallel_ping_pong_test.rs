//! SPEC_FULL.md §8 scenario 2: two parallel regions handing a timed
//! ping-pong back and forth via actions that raise an internal event.

mod common;

use statecraft_core::prelude::*;

#[tokio::test]
async fn parallel_regions_ping_pong_on_a_timer() {
    let ms = common::STEP.as_millis() as u64;

    let chart = common::build(
        "m",
        NodeSpec::parallel("m")
            .child(
                NodeSpec::compound("A", "a")
                    .child(NodeSpec::atomic("a").after_millis(ms, TransitionSpec::new().target("b").action("sendToB")))
                    .child(NodeSpec::atomic("b").on("to_a", TransitionSpec::new().target("a"))),
            )
            .child(
                NodeSpec::compound("B", "a")
                    .child(NodeSpec::atomic("a").on("to_b", TransitionSpec::new().target("b")))
                    .child(NodeSpec::atomic("b").after_millis(ms, TransitionSpec::new().target("a").action("sendToA"))),
            ),
    );

    let registry = Registry::new()
        .action("sendToB", |ctx| {
            ctx.raise("to_b");
            Ok(())
        })
        .action("sendToA", |ctx| {
            ctx.raise("to_a");
            Ok(())
        });

    let machine = common::machine(chart, registry);
    machine.start().await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.a;B.a");

    // A.a's `after` fires, enters A.b, whose action raises `to_b`, which is
    // drained in the same run-to-completion drain and flips B into B.b
    // before this wait ever observes the intermediate state.
    machine.wait_for_state("A.b", common::STEP * 5).await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.b;B.b");

    // B.b's `after` now fires, raising `to_a`, bouncing both regions home.
    machine.wait_for_state("B.a", common::STEP * 5).await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.a;B.a");

    machine.stop().await.unwrap();
}
