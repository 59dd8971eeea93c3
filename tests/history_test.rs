//! SPEC_FULL.md §8 scenarios 3 and 4: shallow and deep history recall.

mod common;

use statecraft_core::prelude::*;

#[tokio::test]
async fn shallow_history_recalls_only_the_immediate_child() {
    let chart = common::build(
        "root",
        NodeSpec::compound("root", "A")
            .child(
                NodeSpec::compound("A", "A1")
                    .child(NodeSpec::atomic("A1"))
                    .child(NodeSpec::atomic("A2"))
                    .child(NodeSpec::history("hist", HistoryFlavor::Shallow)),
            )
            .child(NodeSpec::atomic("B"))
            .on("toA2", TransitionSpec::new().target("A.A2"))
            .on("toB", TransitionSpec::new().target("B"))
            .on("toHist", TransitionSpec::new().target("A.hist")),
    );

    let machine = common::machine(chart, Registry::new());
    machine.start().await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.A1");

    machine.send("toA2").await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.A2");

    machine.send("toB").await.unwrap();
    assert_eq!(machine.active_leaves().await, "B");

    machine.send("toHist").await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.A2");

    machine.stop().await.unwrap();
}

#[tokio::test]
async fn deep_history_recalls_the_full_descendant_set() {
    let chart = common::build(
        "root",
        NodeSpec::compound("root", "A")
            .child(
                NodeSpec::compound("A", "A1")
                    .child(
                        NodeSpec::compound("A1", "A1a")
                            .child(NodeSpec::atomic("A1a"))
                            .child(NodeSpec::atomic("A1b")),
                    )
                    .child(NodeSpec::atomic("A2"))
                    .child(NodeSpec::history("hist", HistoryFlavor::Deep)),
            )
            .child(NodeSpec::atomic("B"))
            .on("toA1b", TransitionSpec::new().target("A.A1.A1b"))
            .on("toB", TransitionSpec::new().target("B"))
            .on("toHist", TransitionSpec::new().target("A.hist")),
    );

    let machine = common::machine(chart, Registry::new());
    machine.start().await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.A1.A1a");

    machine.send("toA1b").await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.A1.A1b");

    machine.send("toB").await.unwrap();
    assert_eq!(machine.active_leaves().await, "B");

    machine.send("toHist").await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.A1.A1b");

    machine.stop().await.unwrap();
}

#[tokio::test]
async fn history_with_no_prior_visit_falls_back_to_configured_initial() {
    let chart = common::build(
        "root",
        NodeSpec::compound("root", "B")
            .child(
                NodeSpec::compound("A", "A1")
                    .child(NodeSpec::atomic("A1"))
                    .child(NodeSpec::atomic("A2"))
                    .child(NodeSpec::history("hist", HistoryFlavor::Shallow)),
            )
            .child(NodeSpec::atomic("B"))
            .on("toHist", TransitionSpec::new().target("A.hist")),
    );

    let machine = common::machine(chart, Registry::new());
    machine.start().await.unwrap();
    assert_eq!(machine.active_leaves().await, "B");

    // `A` was never entered, so its history record is empty; the fallback
    // is A's own configured `initial` (SPEC_FULL.md §4.5 step 5).
    machine.send("toHist").await.unwrap();
    assert_eq!(machine.active_leaves().await, "A.A1");

    machine.stop().await.unwrap();
}
