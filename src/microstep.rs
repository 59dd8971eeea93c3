//! Microstep Executor (SPEC_FULL.md §4.5, component C5).
//!
//! Applies a selected [`resolver::Candidate`] set: computes exit/entry
//! sets, runs actions in exit → transition → entry order, records history,
//! arms timers, launches services, and updates the Active Configuration
//! atomically. Everything here runs under the single machine lock; nothing
//! in this module awaits.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use crate::chart::{Chart, HistoryFlavor, NodeId, StateKind};
use crate::config::Configuration;
use crate::context::Context;
use crate::error::{panic_message, MachineError};
use crate::event_loop::InternalEvent;
use crate::history::HistoryStore;
use crate::machine::{EventSink, MachineState, SubscriberList, TransitionNotice};
use crate::registry::Registry;
use crate::resolver::{self, Candidate};

/// Enters the root's initial configuration (`start()`/post-`RESET`
/// re-entry). Root is entered the same way any compound/parallel target
/// would be: descend through `initial`/all-regions to the atomic leaves.
pub(crate) fn run_initial_entry(
    chart: &Chart,
    registry: &Registry,
    sink: &EventSink,
    _subscribers: &SubscriberList,
    state: &mut MachineState,
) -> Vec<InternalEvent> {
    let mut entry_nodes = Vec::new();
    entry_set_for_target(chart, &state.history, chart.root, &mut entry_nodes);
    // Root itself is already active (caller inserted it); drop it from the
    // ordered entry-action list so it isn't entered twice.
    entry_nodes.retain(|&n| n != chart.root);
    sort_entry(chart, &mut entry_nodes);

    let mut raised = Vec::new();
    for &n in &entry_nodes {
        state.configuration.insert(n);
    }
    run_entry_actions(chart, registry, state, &entry_nodes, &mut raised);
    arm_timers_and_services(chart, registry, sink, state, &entry_nodes);
    raised.extend(detect_done_state(chart, &state.configuration, &entry_nodes));
    raised
}

/// Exits every active non-root node innermost-first, running exit actions
/// (`stop()`). Does not touch timers/services — callers cancel those
/// separately since `stop()` and `reset()` do so at slightly different
/// points in their respective sequences.
pub(crate) fn run_full_exit(chart: &Chart, registry: &Registry, state: &mut MachineState) {
    let mut exit_nodes: Vec<NodeId> = state.configuration.iter().filter(|&n| n != chart.root).collect();
    sort_exit(chart, &mut exit_nodes);
    let config_before = state.configuration.clone();
    record_histories(chart, &mut state.history, &config_before, &exit_nodes);
    for &n in &exit_nodes {
        let node = chart.node(n);
        for action in &node.exit {
            if let Err(err) = run_action(registry, &node.path, action, &mut state.context) {
                tracing::warn!(state = %node.path, action = %action, error = %err, "exit action failed");
            }
            // The machine is tearing down; any raised events have nowhere to go.
            state.context.take_raised();
        }
        state.configuration.remove(n);
    }
}

/// Exits every active non-root node innermost-first for `reset()`, without
/// running exit actions (SPEC_FULL.md §4.9: "without running user exit
/// actions that would observe stale context" — by the time this runs,
/// context has already been replaced by the initial snapshot, so an exit
/// action here would see the *new* machine's data rather than the state it
/// was actually exiting with).
pub(crate) fn run_silent_exit(chart: &Chart, state: &mut MachineState) {
    let mut exit_nodes: Vec<NodeId> = state.configuration.iter().filter(|&n| n != chart.root).collect();
    sort_exit(chart, &mut exit_nodes);
    for &n in &exit_nodes {
        state.configuration.remove(n);
    }
}

/// Applies one selected transition set (SPEC_FULL.md §4.5 steps 1-9).
/// Returns the internal events it raised (synthetic `done.state.*` and
/// `onError` dispatch requests for entry/exit/transition actions that
/// failed) for the event loop to drain next.
pub(crate) fn run_microstep(
    chart: &Chart,
    registry: &Registry,
    sink: &EventSink,
    subscribers: &SubscriberList,
    state: &mut MachineState,
    candidates: &[Candidate],
    event_name: &str,
) -> Vec<InternalEvent> {
    let mut raised = Vec::new();
    if candidates.is_empty() {
        return raised;
    }

    let config_before = state.configuration.clone();

    // ---- step 1: exit set ----
    let mut exit_set: HashSet<NodeId> = HashSet::new();
    for c in candidates {
        let t = resolver::transition(chart, c);
        if t.internal {
            continue;
        }
        for n in config_before.iter() {
            if n != c.scope && chart.is_ancestor(c.scope, n) {
                exit_set.insert(n);
            }
        }
    }
    let mut exit_nodes: Vec<NodeId> = exit_set.into_iter().collect();
    sort_exit(chart, &mut exit_nodes);

    // ---- step 2: history recording ----
    record_histories(chart, &mut state.history, &config_before, &exit_nodes);

    // ---- step 4a: exit actions (innermost-first) ----
    for &n in &exit_nodes {
        let node = chart.node(n);
        for action in &node.exit {
            if let Err(err) = run_action(registry, &node.path, action, &mut state.context) {
                tracing::warn!(state = %node.path, action = %action, error = %err, "exit action failed");
                state.context.record_error("ActionError", &err.to_string());
                raised.push(InternalEvent::on_error(n));
            }
            drain_raised(&mut state.context, &mut raised);
        }
    }

    // ---- step 3: cancel timers/services owned by exiting states ----
    for &n in &exit_nodes {
        state.bump_generation(n);
        for idx in 0..chart.node(n).transitions.len() {
            if let Some(handle) = state.timers.remove(&(n, idx)) {
                handle.abort();
            }
        }
        for idx in 0..chart.node(n).invokes.len() {
            if let Some((_, token)) = state.services.remove(&(n, idx)) {
                token.cancel();
            }
        }
    }
    for &n in &exit_nodes {
        state.configuration.remove(n);
    }

    // ---- step 4b: transition actions ----
    for c in candidates {
        let t = resolver::transition(chart, c);
        let source_path = chart.node(c.source).path.clone();
        for action in &t.actions {
            if let Err(err) = run_action(registry, &source_path, action, &mut state.context) {
                tracing::warn!(state = %source_path, action = %action, error = %err, "transition action failed");
                state.context.record_error("ActionError", &err.to_string());
                raised.push(InternalEvent::on_error(c.source));
            }
            drain_raised(&mut state.context, &mut raised);
        }
    }

    // ---- step 5+6: entry set, outermost-first ----
    let mut entry_nodes: Vec<NodeId> = Vec::new();
    for c in candidates {
        let t = resolver::transition(chart, c);
        if t.internal {
            continue;
        }
        for &target in &t.targets {
            full_entry_for_target(chart, &state.history, c.scope, target, &mut entry_nodes);
        }
    }
    dedup_preserve_order(&mut entry_nodes);
    sort_entry(chart, &mut entry_nodes);

    for &n in &entry_nodes {
        state.configuration.insert(n);
    }
    run_entry_actions(chart, registry, state, &entry_nodes, &mut raised);

    // ---- step 7: arm timers / launch services ----
    arm_timers_and_services(chart, registry, sink, state, &entry_nodes);

    // ---- step 8: done.state detection ----
    raised.extend(detect_done_state(chart, &state.configuration, &entry_nodes));

    // ---- subscriber notification ----
    notify_subscribers(subscribers, chart, candidates, event_name);

    raised
}

fn run_entry_actions(chart: &Chart, registry: &Registry, state: &mut MachineState, entry_nodes: &[NodeId], raised: &mut Vec<InternalEvent>) {
    for &n in entry_nodes {
        let node = chart.node(n);
        for action in &node.entry {
            if let Err(err) = run_action(registry, &node.path, action, &mut state.context) {
                tracing::warn!(state = %node.path, action = %action, error = %err, "entry action failed");
                state.context.record_error("ActionError", &err.to_string());
                raised.push(InternalEvent::on_error(n));
            }
            drain_raised(&mut state.context, raised);
        }
    }
}

fn run_action(registry: &Registry, state_path: &str, action_name: &str, context: &mut Context) -> Result<(), MachineError> {
    let Some(action) = registry.get_action(action_name) else {
        return Err(MachineError::action_error(state_path, action_name, "action not registered"));
    };
    match panic::catch_unwind(AssertUnwindSafe(|| action(context))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(message)) => Err(MachineError::action_error(state_path, action_name, message)),
        Err(payload) => Err(MachineError::action_error(state_path, action_name, panic_message(&payload))),
    }
}

/// Moves whatever the just-run action queued via [`Context::raise`] onto
/// this microstep's raised-event list (SPEC_FULL.md §4.6 step 4).
fn drain_raised(context: &mut Context, raised: &mut Vec<InternalEvent>) {
    raised.extend(context.take_raised().into_iter().map(InternalEvent::plain));
}

fn arm_timers_and_services(chart: &Chart, registry: &Registry, sink: &EventSink, state: &mut MachineState, entry_nodes: &[NodeId]) {
    for &n in entry_nodes {
        let node = chart.node(n);
        for (idx, t) in node.transitions.iter().enumerate() {
            let Some(delay) = &t.delay else { continue };
            let ms = match delay {
                crate::chart::DelaySpec::Millis(ms) => *ms,
                crate::chart::DelaySpec::Named(name) => match registry.resolve_delay(name) {
                    Some(ms) => ms,
                    None => {
                        tracing::warn!(state = %node.path, delay = %name, "named delay not registered, timer not armed");
                        continue;
                    }
                },
            };
            let crate::chart::EventDescriptor::Named(event_name) = &t.event else { continue };
            let generation = state.generation_of(n);
            let handle = crate::timer::arm(sink.clone(), event_name.clone(), n, generation, ms);
            state.timers.insert((n, idx), handle);
        }
        for (idx, inv) in node.invokes.iter().enumerate() {
            let Some(factory) = registry.get_service(&inv.src) else {
                tracing::warn!(state = %node.path, service = %inv.src, "service not registered, invoke skipped");
                continue;
            };
            let token = crate::registry::CancellationToken::new();
            let generation = state.generation_of(n);
            let handle = crate::service::launch(factory, sink.clone(), inv.id.clone(), n, generation, token.clone());
            state.services.insert((n, idx), (handle, token));
        }
    }
}

fn detect_done_state(chart: &Chart, config: &Configuration, entry_nodes: &[NodeId]) -> Vec<InternalEvent> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &n in entry_nodes {
        if chart.node(n).kind != StateKind::Final {
            continue;
        }
        let Some(parent) = chart.node(n).parent else { continue };
        if !seen.insert(parent) {
            continue;
        }
        let done = match chart.node(parent).kind {
            StateKind::Compound => true,
            StateKind::Parallel => chart
                .node(parent)
                .children
                .iter()
                .filter(|&&c| chart.node(c).kind != StateKind::History)
                .all(|&c| region_is_done(chart, config, c)),
            _ => false,
        };
        if done {
            out.push(InternalEvent::plain(format!("done.state.{}", chart.node(parent).path)));
        }
    }
    out
}

fn region_is_done(chart: &Chart, config: &Configuration, node: NodeId) -> bool {
    match chart.node(node).kind {
        StateKind::Final => true,
        StateKind::Compound => chart
            .node(node)
            .children
            .iter()
            .filter(|&&c| config.contains(c))
            .any(|&c| region_is_done(chart, config, c)),
        StateKind::Parallel => chart
            .node(node)
            .children
            .iter()
            .filter(|&&c| chart.node(c).kind != StateKind::History)
            .all(|&c| region_is_done(chart, config, c)),
        _ => false,
    }
}

fn notify_subscribers(subscribers: &SubscriberList, chart: &Chart, candidates: &[Candidate], event_name: &str) {
    let subs = subscribers.lock().expect("subscriber list poisoned");
    if subs.is_empty() {
        return;
    }
    for c in candidates {
        let t = resolver::transition(chart, c);
        let from = Some(chart.node(c.source).path.clone());
        let to = if t.targets.is_empty() {
            None
        } else {
            Some(t.targets.iter().map(|&id| chart.node(id).path.clone()).collect::<Vec<_>>().join(";"))
        };
        let notice = TransitionNotice { from, to, event: event_name.to_string() };
        for cb in subs.iter() {
            cb(&notice);
        }
    }
}

/// All ancestors of `target` strictly between `scope` (exclusive) and
/// `target` (inclusive), outermost-first.
fn path_from_scope(chart: &Chart, scope: NodeId, target: NodeId) -> Vec<NodeId> {
    let mut chain = vec![target];
    let mut cur = chart.node(target).parent;
    while let Some(n) = cur {
        if n == scope {
            break;
        }
        chain.push(n);
        cur = chart.node(n).parent;
    }
    chain.reverse();
    chain
}

/// The full set of nodes to activate when `target` is entered directly
/// (not via a multi-target transition's ancestor chain): the target plus,
/// recursively, whatever its kind requires (`initial` child for compound,
/// every region for parallel, the history record or its fallback for
/// history).
fn entry_set_for_target(chart: &Chart, history: &HistoryStore, target: NodeId, acc: &mut Vec<NodeId>) {
    let node = chart.node(target);
    match node.kind {
        StateKind::Atomic | StateKind::Final => acc.push(target),
        StateKind::Compound => {
            acc.push(target);
            if let Some(initial) = node.initial {
                entry_set_for_target(chart, history, initial, acc);
            }
        }
        StateKind::Parallel => {
            acc.push(target);
            for &child in &node.children {
                if chart.node(child).kind == StateKind::History {
                    continue;
                }
                entry_set_for_target(chart, history, child, acc);
            }
        }
        StateKind::History => resolve_history(chart, history, target, acc),
    }
}

/// SPEC_FULL.md §4.5 step 5's history fallback: re-enter the recorded
/// descendants if present, otherwise behave as a fresh entry of the
/// history's parent.
fn resolve_history(chart: &Chart, history: &HistoryStore, hist_node: NodeId, acc: &mut Vec<NodeId>) {
    let node = chart.node(hist_node);
    let parent = node.parent.expect("history node always has a parent");
    if let Some(recorded) = history.get(hist_node).filter(|r| !r.is_empty()) {
        match node.history_flavor {
            Some(HistoryFlavor::Deep) => acc.extend(recorded.iter().copied()),
            _ => {
                for &n in recorded {
                    entry_set_for_target(chart, history, n, acc);
                }
            }
        }
        return;
    }
    match chart.node(parent).kind {
        StateKind::Compound => {
            if let Some(initial) = chart.node(parent).initial {
                entry_set_for_target(chart, history, initial, acc);
            }
        }
        StateKind::Parallel => {
            for &child in &chart.node(parent).children {
                if chart.node(child).kind == StateKind::History {
                    continue;
                }
                entry_set_for_target(chart, history, child, acc);
            }
        }
        _ => {}
    }
}

/// The entry set for one target of a multi-target transition: ancestors
/// from just inside `scope` down to `target`, expanding any parallel
/// sibling regions not already on that direct path (SPEC_FULL.md §4.5
/// step 5).
fn full_entry_for_target(chart: &Chart, history: &HistoryStore, scope: NodeId, target: NodeId, acc: &mut Vec<NodeId>) {
    let chain = path_from_scope(chart, scope, target);
    for i in 0..chain.len() {
        let n = chain[i];
        if i == chain.len() - 1 {
            entry_set_for_target(chart, history, n, acc);
        } else {
            if !acc.contains(&n) {
                acc.push(n);
            }
            if chart.node(n).kind == StateKind::Parallel {
                let next = chain[i + 1];
                for &child in &chart.node(n).children {
                    if child == next || chart.node(child).kind == StateKind::History {
                        continue;
                    }
                    entry_set_for_target(chart, history, child, acc);
                }
            }
        }
    }
}

/// Records pre-exit active descendants into any history child of an
/// exiting compound/parallel (SPEC_FULL.md §4.5 step 2).
fn record_histories(chart: &Chart, history: &mut HistoryStore, config_before: &Configuration, exit_nodes: &[NodeId]) {
    for &n in exit_nodes {
        let node = chart.node(n);
        if !matches!(node.kind, StateKind::Compound | StateKind::Parallel) {
            continue;
        }
        let Some(&hist_child) = node.children.iter().find(|&&c| chart.node(c).kind == StateKind::History) else {
            continue;
        };
        let flavor = chart.node(hist_child).history_flavor.unwrap_or(HistoryFlavor::Shallow);
        let recorded: HashSet<NodeId> = match flavor {
            HistoryFlavor::Shallow => node
                .children
                .iter()
                .copied()
                .filter(|&c| chart.node(c).kind != StateKind::History && config_before.contains(c))
                .collect(),
            HistoryFlavor::Deep => config_before.iter().filter(|&d| chart.is_ancestor(n, d)).collect(),
        };
        history.record(hist_child, recorded);
    }
}

fn sort_exit(chart: &Chart, nodes: &mut [NodeId]) {
    nodes.sort_by(|&a, &b| {
        chart
            .node(b)
            .depth
            .cmp(&chart.node(a).depth)
            .then_with(|| chart.node(a).doc_order.cmp(&chart.node(b).doc_order))
    });
}

fn sort_entry(chart: &Chart, nodes: &mut Vec<NodeId>) {
    nodes.sort_by(|&a, &b| chart.node(a).depth.cmp(&chart.node(b).depth).then_with(|| chart.node(a).doc_order.cmp(&chart.node(b).doc_order)));
}

fn dedup_preserve_order(nodes: &mut Vec<NodeId>) {
    let mut seen = HashSet::new();
    nodes.retain(|n| seen.insert(*n));
}
