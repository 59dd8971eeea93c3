//! Observation & Control API (SPEC_FULL.md §4.9, component C9).
//!
//! [`Machine`] is the public handle; [`MachineInner`] holds the single
//! `tokio::sync::Mutex`-guarded [`MachineState`] plus the dispatcher task
//! that serializes every drain (SPEC_FULL.md §5). Grounded on the teacher's
//! `Runtime`/`StreamWriter` pairing in `runtime.rs`: a cheap `Arc`-cloneable
//! handle in front of state that only one task at a time is allowed to
//! touch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::chart::{Chart, NodeId};
use crate::config::Configuration;
use crate::context::Context;
use crate::error::{MachineError, Result};
use crate::event_loop::{self, InternalEvent};
use crate::history::HistoryStore;
use crate::registry::{CancellationToken, Registry};

/// Tunable knobs threaded through construction (SPEC_FULL.md §1.1), mirroring
/// the teacher's plain `RuntimeConfig`-style options struct rather than
/// globals.
#[derive(Debug, Clone)]
pub struct MachineOptions {
    /// Consecutive eventless microsteps allowed between external events
    /// before loop protection trips (SPEC_FULL.md §4.6).
    pub eventless_limit: usize,
    /// When `true`, an externally sent event with no enabled transition
    /// anywhere in the active configuration surfaces
    /// [`MachineError::NoMatchingTransition`] instead of being dropped
    /// (SPEC_FULL.md §1.2).
    pub strict: bool,
    /// Used only when a chart author specifies `after` with a bare integer
    /// and no delay registry entry overrides it.
    pub default_timer_resolution_ms: u64,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self { eventless_limit: 10, strict: false, default_timer_resolution_ms: 0 }
    }
}

/// What actually rode in on a [`RaisedEvent`]: a plain named event, or a
/// service outcome that must populate context (`_doneData` /
/// `_errorMessage`/`_errorType`/`_lastError`) before resolution runs
/// (SPEC_FULL.md §4.8).
#[derive(Debug, Clone)]
pub(crate) enum EventOutcome {
    Plain,
    ServiceDone(serde_json::Value),
    ServiceError(String),
}

/// One event traveling through the dispatcher channel: an external `send`,
/// a timer fire, or a service completion.
pub(crate) struct RaisedEvent {
    pub name: String,
    /// `Some((owner, generation))` for timer/service-originated events;
    /// discarded by the event loop if the owner's generation has since
    /// advanced (SPEC_FULL.md §5 "Cancellation").
    pub origin_generation: Option<(NodeId, u64)>,
    pub outcome: EventOutcome,
    /// Present only for externally sent events; completed once this
    /// event's full drain (including its eventless cascade) finishes.
    pub ack: Option<oneshot::Sender<Result<()>>>,
}

pub(crate) type EventSink = mpsc::UnboundedSender<RaisedEvent>;

/// A transition observed by [`Machine::subscribe_transitions`]
/// (SPEC_FULL.md §4.9).
#[derive(Debug, Clone)]
pub struct TransitionNotice {
    pub from: Option<String>,
    pub to: Option<String>,
    pub event: String,
}

type Subscriber = Box<dyn Fn(&TransitionNotice) + Send + Sync>;
pub(crate) type SubscriberList = Arc<std::sync::Mutex<Vec<Subscriber>>>;

/// Everything the Machine owns exclusively (SPEC_FULL.md §3 "Ownership").
pub(crate) struct MachineState {
    pub configuration: Configuration,
    pub context: Context,
    pub history: HistoryStore,
    pub generations: HashMap<NodeId, u64>,
    pub timers: HashMap<(NodeId, usize), JoinHandle<()>>,
    pub services: HashMap<(NodeId, usize), (JoinHandle<()>, CancellationToken)>,
    pub running: bool,
}

impl MachineState {
    fn new(chart: &Chart) -> Self {
        Self {
            configuration: Configuration::empty(),
            context: Context::new(chart.initial_context.clone()),
            history: HistoryStore::new(),
            generations: HashMap::new(),
            timers: HashMap::new(),
            services: HashMap::new(),
            running: false,
        }
    }

    pub fn generation_of(&self, node: NodeId) -> u64 {
        self.generations.get(&node).copied().unwrap_or(0)
    }

    pub fn bump_generation(&mut self, node: NodeId) -> u64 {
        let next = self.generation_of(node) + 1;
        self.generations.insert(node, next);
        next
    }

    pub(crate) fn clear_all_timers_and_services(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        for (_, (_, token)) in self.services.drain() {
            token.cancel();
        }
    }
}

struct MachineInner {
    chart: Arc<Chart>,
    registry: Arc<Registry>,
    options: MachineOptions,
    state: Mutex<MachineState>,
    subscribers: SubscriberList,
    sink: EventSink,
}

/// A running (or not-yet-started) statechart instance. Cheap to clone: it
/// is an `Arc` handle, matching the teacher's `Runtime` ergonomics.
#[derive(Clone)]
pub struct Machine {
    inner: Arc<MachineInner>,
}

impl Machine {
    pub fn new(chart: Arc<Chart>, registry: Arc<Registry>, options: MachineOptions) -> Self {
        let (sink, mut rx) = mpsc::unbounded_channel::<RaisedEvent>();
        let state = MachineState::new(&chart);
        let inner = Arc::new(MachineInner {
            chart,
            registry,
            options,
            state: Mutex::new(state),
            subscribers: Arc::new(std::sync::Mutex::new(Vec::new())),
            sink,
        });

        // Dispatcher task: the sole place that ever locks `state` long
        // enough to run a drain, per SPEC_FULL.md §5's single-drain-at-a-time
        // rule. Lives for as long as `inner` does.
        let dispatch_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(raised) = rx.recv().await {
                // Only a user-sent event (no origin generation: not a timer
                // fire, not a service outcome) counts as "externally sent"
                // for `strict` mode (SPEC_FULL.md §1.2/§6) — `after:*`,
                // `done.invoke.*`, and `error.platform.*` are reserved,
                // non-user events and must never abort a drain in strict
                // mode just because nothing happens to handle them.
                let external = raised.origin_generation.is_none();
                let result = dispatch_inner.handle_raised(raised.name, raised.origin_generation, raised.outcome, external).await;
                if let Some(ack) = raised.ack {
                    let _ = ack.send(result);
                }
            }
        });

        Machine { inner }
    }

    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.running {
            return Ok(());
        }
        state.running = true;
        drop(state);
        tracing::info!("machine starting");
        self.send_internal("__start__".to_string(), None, EventOutcome::Plain).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if !state.running {
            return Ok(());
        }
        event_loop::run_exit_all(&self.inner.chart, &self.inner.registry, &mut state);
        state.clear_all_timers_and_services();
        state.running = false;
        tracing::info!("machine stopped");
        Ok(())
    }

    pub async fn send(&self, event: impl Into<String>) -> Result<()> {
        self.send_internal(event.into(), None, EventOutcome::Plain).await
    }

    /// Identical semantics to [`Machine::send`]; named separately per
    /// SPEC_FULL.md §4.9 so callers on another task have an explicit,
    /// documented entry point even though both share one drain.
    pub async fn send_async(&self, event: impl Into<String>) -> Result<()> {
        self.send(event).await
    }

    async fn send_internal(&self, name: String, origin_generation: Option<(NodeId, u64)>, outcome: EventOutcome) -> Result<()> {
        if !self.inner.state.lock().await.running && name != "__start__" {
            return Err(MachineError::Stopped);
        }
        let (tx, rx) = oneshot::channel();
        let raised = RaisedEvent { name, origin_generation, outcome, ack: Some(tx) };
        self.inner.sink.send(raised).map_err(|_| MachineError::Stopped)?;
        rx.await.map_err(|_| MachineError::Stopped)?
    }

    pub async fn is_in(&self, path: &str) -> bool {
        let state = self.inner.state.lock().await;
        state.configuration.contains_path(&self.inner.chart, path)
    }

    pub async fn active_leaves(&self) -> String {
        let state = self.inner.state.lock().await;
        state.configuration.leaves_rendering(&self.inner.chart)
    }

    pub async fn active_full(&self) -> String {
        let state = self.inner.state.lock().await;
        state.configuration.full_rendering(&self.inner.chart)
    }

    pub async fn wait_for_state(&self, substring: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.active_full().await.contains(substring) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MachineError::Timeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn subscribe_transitions(&self, callback: impl Fn(&TransitionNotice) + Send + Sync + 'static) {
        self.inner.subscribers.lock().expect("subscriber list poisoned").push(Box::new(callback));
    }

    #[tracing::instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        tracing::info!("machine reset requested");
        self.send_internal("RESET".to_string(), None, EventOutcome::Plain).await
    }

    pub async fn dispose(&self) -> Result<()> {
        self.stop().await?;
        self.inner.subscribers.lock().expect("subscriber list poisoned").clear();
        Ok(())
    }
}

impl MachineInner {
    async fn handle_raised(
        &self,
        name: String,
        origin_generation: Option<(NodeId, u64)>,
        outcome: EventOutcome,
        external: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if name == "__start__" {
            event_loop::run_start(&self.chart, &self.registry, &self.options, &self.sink, &self.subscribers, &mut state);
            return Ok(());
        }
        if name == "RESET" {
            event_loop::run_reset(&self.chart, &self.registry, &self.options, &self.sink, &self.subscribers, &mut state);
            return Ok(());
        }
        let initial = InternalEvent { name, origin_generation, outcome, on_error_origin: None, external };
        event_loop::drain(&self.chart, &self.registry, &self.options, &self.sink, &self.subscribers, &mut state, initial)
    }
}
