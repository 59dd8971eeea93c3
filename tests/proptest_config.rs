//! Property-based tests for the Active Configuration's renderable
//! invariants (SPEC_FULL.md §8: "Rendering: `active_full()` parsed back via
//! `is_in` matches every substring of every active path").

mod common;

use proptest::prelude::*;
use statecraft_core::prelude::*;

fn ping_pong_chart() -> std::sync::Arc<statecraft_core::chart::Chart> {
    common::build(
        "root",
        NodeSpec::parallel("root")
            .child(
                NodeSpec::compound("R1", "x")
                    .child(NodeSpec::atomic("x").on("e1", TransitionSpec::new().target("y")))
                    .child(NodeSpec::atomic("y").on("e1", TransitionSpec::new().target("x"))),
            )
            .child(
                NodeSpec::compound("R2", "p")
                    .child(NodeSpec::atomic("p").on("e2", TransitionSpec::new().target("q")))
                    .child(NodeSpec::atomic("q").on("e2", TransitionSpec::new().target("p"))),
            ),
    )
}

fn ancestor_prefixes(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('.').collect();
    (1..segments.len()).map(|i| segments[..i].join(".")).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn active_full_is_always_ancestor_closed_and_self_consistent(events in proptest::collection::vec(prop_oneof![Just("e1"), Just("e2")], 0..12)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let chart = ping_pong_chart();
            let machine = common::machine(chart, Registry::new());
            machine.start().await.unwrap();

            for event in &events {
                machine.send(*event).await.unwrap();
            }

            let full = machine.active_full().await;
            let paths: Vec<&str> = if full.is_empty() { Vec::new() } else { full.split(';').collect() };

            for &path in &paths {
                // I4: every ancestor of an active path is itself active.
                for ancestor in ancestor_prefixes(path) {
                    prop_assert!(paths.contains(&ancestor.as_str()), "missing ancestor '{}' of active path '{}' in '{}'", ancestor, path, full);
                }
                // The rendered path round-trips through `is_in`.
                prop_assert!(machine.is_in(path).await);
            }

            // Exactly one of R1's children and one of R2's children are
            // active at any time (I2), never both or neither.
            let r1_active: Vec<&&str> = paths.iter().filter(|p| p.starts_with("R1.")).collect();
            let r2_active: Vec<&&str> = paths.iter().filter(|p| p.starts_with("R2.")).collect();
            prop_assert_eq!(r1_active.len(), 1);
            prop_assert_eq!(r2_active.len(), 1);

            machine.stop().await.unwrap();
        });
    }
}
