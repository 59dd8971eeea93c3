//! Transition Resolver (SPEC_FULL.md §4.4, component C4).
//!
//! Pure function over `(Chart, Configuration, EventDescriptor, Context)`:
//! no mutation happens here. [`crate::microstep`] is the only caller that
//! turns a selection into state changes.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use crate::chart::{Chart, EventDescriptor, NodeId, Transition};
use crate::config::Configuration;
use crate::context::Context;
use crate::error::panic_message;
use crate::registry::Registry;

/// Which list on the source node a [`Candidate`] was selected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Normal,
    OnError,
}

/// A transition selected to fire in the current microstep, with its exit
/// scope (SPEC_FULL.md §4.4 rule 6) already computed.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: NodeId,
    pub transition_index: usize,
    pub scope: NodeId,
    pub kind: CandidateKind,
}

/// Resolves a [`Candidate`] back to the [`Transition`] it refers to.
pub fn transition<'a>(chart: &'a Chart, candidate: &Candidate) -> &'a Transition {
    let node = chart.node(candidate.source);
    match candidate.kind {
        CandidateKind::Normal => &node.transitions[candidate.transition_index],
        CandidateKind::OnError => &node.on_error[candidate.transition_index],
    }
}

/// Selects the transitions to fire for `event` against `config`
/// (SPEC_FULL.md §4.4 rules 1-6).
///
/// `owner` scopes a timer/service-originated event (SPEC_FULL.md §4.7's
/// "enqueue a synthetic event `after:<duration>` scoped to that node") to
/// the single node that armed it; `None` for externally sent and raised
/// events, which any active node may match. Without this, two regions of a
/// parallel state that both declare the same `after` duration would both
/// fire off one region's timer.
pub fn select(
    chart: &Chart,
    config: &Configuration,
    event: &EventDescriptor,
    context: &Context,
    registry: &Registry,
    owner: Option<NodeId>,
) -> Vec<Candidate> {
    let mut per_node: Vec<Candidate> = Vec::new();

    for node_id in config.iter() {
        if let Some(owner) = owner {
            if node_id != owner {
                continue;
            }
        }
        let node = chart.node(node_id);
        for (idx, t) in node.transitions.iter().enumerate() {
            if &t.event != event {
                continue;
            }
            if guard_enabled(t.guard.as_deref(), context, registry, &node.path) {
                per_node.push(Candidate {
                    source: node_id,
                    transition_index: idx,
                    scope: candidate_scope(chart, node_id, t),
                    kind: CandidateKind::Normal,
                });
                break; // ordered if/else chain: first enabled transition wins for this node.
            }
        }
    }

    // Rule 3: deepest source wins. Drop any candidate whose source is an
    // ancestor of another candidate's source.
    let sources: Vec<NodeId> = per_node.iter().map(|c| c.source).collect();
    per_node.retain(|c| !sources.iter().any(|&other| other != c.source && chart.is_ancestor(c.source, other)));

    // Rule 4: parallel-region independence via disjoint exit closures,
    // document-order earlier region wins on conflict.
    per_node.sort_by_key(|c| chart.node(c.source).doc_order);
    let mut accepted: Vec<Candidate> = Vec::new();
    let mut claimed: HashSet<NodeId> = HashSet::new();
    for c in per_node {
        let closure = exit_closure(chart, config, c.scope);
        if closure.is_disjoint(&claimed) {
            claimed.extend(closure);
            accepted.push(c);
        }
    }
    accepted
}

/// Walks from `origin` outward through ancestors looking for the first
/// enabled `onError` handler (SPEC_FULL.md §7's propagation policy).
pub fn find_on_error_handler(
    chart: &Chart,
    origin: NodeId,
    context: &Context,
    registry: &Registry,
) -> Option<Candidate> {
    let mut cur = Some(origin);
    while let Some(node_id) = cur {
        let node = chart.node(node_id);
        for (idx, t) in node.on_error.iter().enumerate() {
            if guard_enabled(t.guard.as_deref(), context, registry, &node.path) {
                return Some(Candidate {
                    source: node_id,
                    transition_index: idx,
                    scope: candidate_scope(chart, node_id, t),
                    kind: CandidateKind::OnError,
                });
            }
        }
        cur = node.parent;
    }
    None
}

fn candidate_scope(chart: &Chart, source: NodeId, t: &Transition) -> NodeId {
    if t.targets.is_empty() {
        source
    } else {
        chart.scope_of(source, &t.targets)
    }
}

/// The set of active nodes that would exit if `scope` became the exit
/// boundary: `scope` itself plus every active descendant. Used only to
/// detect whether two parallel-region candidates conflict; the actual
/// exit set excludes `scope` (SPEC_FULL.md §4.5 step 1).
fn exit_closure(chart: &Chart, config: &Configuration, scope: NodeId) -> HashSet<NodeId> {
    config.iter().filter(|&n| n == scope || chart.is_ancestor(scope, n)).collect()
}

/// `None`/absent guard is always enabled. A missing registry entry is
/// treated as disabled and logged. A panicking guard is treated as
/// disabled (SPEC_FULL.md §7) rather than propagated.
fn guard_enabled(guard_name: Option<&str>, context: &Context, registry: &Registry, state_path: &str) -> bool {
    let Some(guard_name) = guard_name else { return true };
    let Some(guard) = registry.get_guard(guard_name) else {
        tracing::warn!(state = state_path, guard = guard_name, "guard not registered, treating as false");
        return false;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| guard(context))) {
        Ok(result) => result,
        Err(payload) => {
            tracing::trace!(
                state = state_path,
                guard = guard_name,
                message = %panic_message(&payload),
                "guard panicked, treating as false"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartBuilder, NodeSpec, TransitionSpec};
    use crate::config::Configuration;
    use crate::registry::Registry;

    fn two_region_chart_with_the_same_delay_in_each_region() -> Chart {
        ChartBuilder::new(
            "root",
            NodeSpec::parallel("root")
                .child(
                    NodeSpec::compound("A", "a")
                        .child(NodeSpec::atomic("a").after_millis(5000, TransitionSpec::new().target("a2")))
                        .child(NodeSpec::atomic("a2")),
                )
                .child(
                    NodeSpec::compound("B", "b")
                        .child(NodeSpec::atomic("b").after_millis(5000, TransitionSpec::new().target("b2")))
                        .child(NodeSpec::atomic("b2")),
                ),
        )
        .build()
        .unwrap()
    }

    /// Regression test: a timer fire owned by one region must not also
    /// select the other region's identically-named `after:*` transition.
    #[test]
    fn after_event_with_an_owner_only_selects_that_node() {
        let chart = two_region_chart_with_the_same_delay_in_each_region();
        let a_leaf = *chart.path_index.get("A.a").unwrap();
        let b_leaf = *chart.path_index.get("B.b").unwrap();

        let mut config = Configuration::empty();
        for n in [chart.root, *chart.path_index.get("A").unwrap(), a_leaf, *chart.path_index.get("B").unwrap(), b_leaf] {
            config.insert(n);
        }

        let context = Context::new(Default::default());
        let registry = Registry::new();
        let descriptor = EventDescriptor::Named("after:5000".to_string());

        let candidates = select(&chart, &config, &descriptor, &context, &registry, Some(a_leaf));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, a_leaf);

        let candidates = select(&chart, &config, &descriptor, &context, &registry, Some(b_leaf));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, b_leaf);
    }
}
