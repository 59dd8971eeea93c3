//! Timer Scheduler (SPEC_FULL.md §4.7, component C7).
//!
//! One `tokio::spawn`ed sleep per armed `after` transition; no bespoke timer
//! thread, matching the teacher's preference for tokio-native primitives
//! over hand-rolled scheduling.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::chart::NodeId;
use crate::machine::{EventOutcome, EventSink, RaisedEvent};

/// Arms one timer. On fire, pushes a synthetic event onto the machine's
/// dispatcher channel tagged with the activation-generation it was armed
/// under, so a state that has since exited silently discards it
/// (SPEC_FULL.md §5 "Cancellation"). Runs no user code, so the owning
/// microstep is free to `abort()` this task directly on exit rather than
/// going through cooperative cancellation.
pub(crate) fn arm(sink: EventSink, event_name: String, owner: NodeId, generation: u64, delay_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let _ = sink.send(RaisedEvent {
            name: event_name,
            origin_generation: Some((owner, generation)),
            outcome: EventOutcome::Plain,
            ack: None,
        });
    })
}
