//! Service Supervisor (SPEC_FULL.md §4.8, component C8).
//!
//! Cooperative cancellation only: the supervisor never aborts the spawned
//! task, it signals the service's [`CancellationToken`] and stops listening
//! for a result, grounded on the same idiom the teacher uses for node task
//! supervision in `pregel/executor.rs`.

use tokio::task::JoinHandle;

use crate::chart::NodeId;
use crate::machine::{EventOutcome, EventSink, RaisedEvent};
use crate::registry::{CancellationToken, ServiceFactory, ServiceOutcome};

/// Launches one invoked service and races its completion against
/// cancellation. A result that arrives after cancellation is dropped
/// without touching the event sink — the generation check on the receiving
/// end would discard it anyway, but there is no point emitting it.
pub(crate) fn launch(
    factory: ServiceFactory,
    sink: EventSink,
    invoke_id: String,
    owner: NodeId,
    generation: u64,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let future = factory(token.clone());
        tokio::select! {
            outcome = future => {
                if token.is_cancelled() {
                    return;
                }
                let (name, outcome) = match outcome {
                    ServiceOutcome::Done(value) => (format!("done.invoke.{invoke_id}"), EventOutcome::ServiceDone(value)),
                    ServiceOutcome::Error(message) => (format!("error.platform.{invoke_id}"), EventOutcome::ServiceError(message)),
                };
                let _ = sink.send(RaisedEvent {
                    name,
                    origin_generation: Some((owner, generation)),
                    outcome,
                    ack: None,
                });
            }
            _ = token.cancelled() => {}
        }
    })
}
