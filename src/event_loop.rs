//! Event Loop (SPEC_FULL.md §4.6, component C6).
//!
//! Single-threaded, run-to-completion: one event is fully processed,
//! including its eventless cascade, before the next. Lives entirely inside
//! the critical section [`crate::machine::MachineInner`] holds for one
//! drain; never awaits anything itself.

use std::collections::VecDeque;

use crate::chart::{Chart, EventDescriptor, NodeId};
use crate::error::{MachineError, Result};
use crate::machine::{EventOutcome, EventSink, MachineOptions, MachineState, SubscriberList};
use crate::microstep;
use crate::registry::Registry;
use crate::resolver;

/// One event moving through the local, per-drain queue: an external send,
/// a timer/service completion, a synthesized `done.state.*`, or a request
/// to dispatch an `onError` handler.
pub(crate) struct InternalEvent {
    pub name: String,
    pub origin_generation: Option<(NodeId, u64)>,
    pub outcome: EventOutcome,
    pub on_error_origin: Option<NodeId>,
    pub external: bool,
}

impl InternalEvent {
    pub fn plain(name: String) -> Self {
        Self { name, origin_generation: None, outcome: EventOutcome::Plain, on_error_origin: None, external: false }
    }

    pub fn on_error(origin: NodeId) -> Self {
        Self {
            name: "onError".to_string(),
            origin_generation: None,
            outcome: EventOutcome::Plain,
            on_error_origin: Some(origin),
            external: false,
        }
    }
}

/// Drains one externally/timer/service-raised event plus everything it
/// cascades into (SPEC_FULL.md §4.6).
pub(crate) fn drain(
    chart: &Chart,
    registry: &Registry,
    options: &MachineOptions,
    sink: &EventSink,
    subscribers: &SubscriberList,
    state: &mut MachineState,
    initial: InternalEvent,
) -> Result<()> {
    drain_many(chart, registry, options, sink, subscribers, state, vec![initial])
}

fn drain_many(
    chart: &Chart,
    registry: &Registry,
    options: &MachineOptions,
    sink: &EventSink,
    subscribers: &SubscriberList,
    state: &mut MachineState,
    initial_events: Vec<InternalEvent>,
) -> Result<()> {
    let mut queue: VecDeque<InternalEvent> = initial_events.into();
    while let Some(ev) = queue.pop_front() {
        let span = tracing::info_span!("microstep", event = %ev.name);
        let _enter = span.enter();
        process_one(chart, registry, options, sink, subscribers, state, &ev, &mut queue)?;
        run_eventless_cascade(chart, registry, options, sink, subscribers, state, &mut queue);
    }
    Ok(())
}

fn process_one(
    chart: &Chart,
    registry: &Registry,
    options: &MachineOptions,
    sink: &EventSink,
    subscribers: &SubscriberList,
    state: &mut MachineState,
    ev: &InternalEvent,
    queue: &mut VecDeque<InternalEvent>,
) -> Result<()> {
    if let Some((owner, generation)) = ev.origin_generation {
        if state.generation_of(owner) != generation {
            tracing::trace!(event = %ev.name, "discarding stale synthetic event");
            return Ok(());
        }
    }

    match &ev.outcome {
        EventOutcome::Plain => {}
        EventOutcome::ServiceDone(value) => state.context.record_done_data(value.clone()),
        EventOutcome::ServiceError(message) => state.context.record_error("ServiceError", message),
    }

    if ev.name == "onError" {
        if let Some(origin) = ev.on_error_origin {
            if let Some(candidate) = resolver::find_on_error_handler(chart, origin, &state.context, registry) {
                let raised = microstep::run_microstep(chart, registry, sink, subscribers, state, &[candidate], "onError");
                queue.extend(raised);
            }
        }
        return Ok(());
    }

    let descriptor = EventDescriptor::Named(ev.name.clone());
    let owner = ev.origin_generation.map(|(owner, _)| owner);
    let candidates = resolver::select(chart, &state.configuration, &descriptor, &state.context, registry, owner);
    if candidates.is_empty() {
        if ev.external && options.strict {
            return Err(MachineError::NoMatchingTransition(ev.name.clone()));
        }
        tracing::trace!(event = %ev.name, "no enabled transition, dropping");
        return Ok(());
    }
    let raised = microstep::run_microstep(chart, registry, sink, subscribers, state, &candidates, &ev.name);
    queue.extend(raised);
    Ok(())
}

/// SPEC_FULL.md §4.6 step 3: loop the resolver against the eventless marker
/// until nothing fires or the loop-protection limit trips.
fn run_eventless_cascade(
    chart: &Chart,
    registry: &Registry,
    options: &MachineOptions,
    sink: &EventSink,
    subscribers: &SubscriberList,
    state: &mut MachineState,
    queue: &mut VecDeque<InternalEvent>,
) {
    let mut streak = 0usize;
    loop {
        if streak >= options.eventless_limit {
            tracing::warn!(limit = options.eventless_limit, "eventless loop-protection limit reached");
            break;
        }
        let candidates = resolver::select(chart, &state.configuration, &EventDescriptor::Eventless, &state.context, registry, None);
        if candidates.is_empty() {
            break;
        }
        let raised = microstep::run_microstep(chart, registry, sink, subscribers, state, &candidates, "");
        queue.extend(raised);
        streak += 1;
    }
}

/// `start()` (SPEC_FULL.md §4.9): enter the root's initial configuration and
/// drain whatever that entry cascades into.
pub(crate) fn run_start(
    chart: &Chart,
    registry: &Registry,
    options: &MachineOptions,
    sink: &EventSink,
    subscribers: &SubscriberList,
    state: &mut MachineState,
) {
    state.configuration.insert(chart.root);
    let raised = microstep::run_initial_entry(chart, registry, sink, subscribers, state);
    let _ = drain_many(chart, registry, options, sink, subscribers, state, raised);
}

/// `reset()` (SPEC_FULL.md §4.9): cancel everything, clear history, restore
/// the initial context, exit every active node, then re-enter as `start()`
/// would.
pub(crate) fn run_reset(
    chart: &Chart,
    registry: &Registry,
    options: &MachineOptions,
    sink: &EventSink,
    subscribers: &SubscriberList,
    state: &mut MachineState,
) {
    state.clear_all_timers_and_services();
    state.history.clear();
    state.context.restore(chart.initial_context.clone());
    microstep::run_silent_exit(chart, state);
    run_start(chart, registry, options, sink, subscribers, state);
}

/// `stop()` (SPEC_FULL.md §4.9): exit every active non-root node
/// innermost-first, leaving the configuration empty.
pub(crate) fn run_exit_all(chart: &Chart, registry: &Registry, state: &mut MachineState) {
    microstep::run_full_exit(chart, registry, state);
    state.configuration.remove(chart.root);
}
