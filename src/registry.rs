//! The action/guard/service registry contract (SPEC_FULL.md §9 "Dynamic
//! action/guard registries"): a lookup from name to callable. The chart only
//! carries names; a [`Registry`] built by the host application supplies the
//! callables. Grounded on the teacher's `NodeFn` trait-object pattern in
//! `graph.rs`, adapted to the three callable shapes this interpreter needs
//! (action, guard, service factory).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::Context;

/// An entry/exit/transition action. Receives a mutable handle to the
/// context (SPEC_FULL.md §4.2). Returning `Err` is equivalent to the source
/// language's "action throws" and is converted to [`crate::error::MachineError::ActionError`]
/// by the microstep executor.
pub type Action = Arc<dyn Fn(&mut Context) -> std::result::Result<(), String> + Send + Sync>;

/// A transition guard. Receives a read-only handle to the context. A
/// guard that panics is caught and treated as `false` (SPEC_FULL.md §7).
pub type Guard = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// The outcome of an invoked service (SPEC_FULL.md §4.8).
#[derive(Debug, Clone)]
pub enum ServiceOutcome {
    Done(serde_json::Value),
    Error(String),
}

pub type ServiceFuture = BoxFuture<'static, ServiceOutcome>;

/// A service factory: given a cancellation token, produces the future that
/// represents one invocation. Called synchronously when the owning state is
/// entered; the returned future is what gets spawned.
pub type ServiceFactory = Arc<dyn Fn(CancellationToken) -> ServiceFuture + Send + Sync>;

/// Cooperative cancellation handle handed to an invoked service
/// (SPEC_FULL.md §4.8 / §5 "Cancellation"). The supervisor never aborts the
/// spawned task; it signals this token and stops listening for the result.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<tokio::sync::Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancellationToken::cancel`] has been called. A
    /// well-behaved service races this against its own work.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Resolves named `after` delays (SPEC_FULL.md §4.7's "delay-registry
/// collaborator").
pub trait DelayRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<u64>;
}

impl DelayRegistry for HashMap<String, u64> {
    fn resolve(&self, name: &str) -> Option<u64> {
        self.get(name).copied()
    }
}

/// The host-supplied bundle of named actions, guards, and service
/// factories, plus the delay registry. Constructed once and shared
/// read-only by every [`crate::machine::Machine`] using it.
#[derive(Default)]
pub struct Registry {
    actions: HashMap<String, Action>,
    guards: HashMap<String, Guard>,
    services: HashMap<String, ServiceFactory>,
    delays: HashMap<String, u64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, name: impl Into<String>, f: impl Fn(&mut Context) -> std::result::Result<(), String> + Send + Sync + 'static) -> Self {
        self.actions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn guard(mut self, name: impl Into<String>, f: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        self.guards.insert(name.into(), Arc::new(f));
        self
    }

    pub fn service(mut self, name: impl Into<String>, f: impl Fn(CancellationToken) -> ServiceFuture + Send + Sync + 'static) -> Self {
        self.services.insert(name.into(), Arc::new(f));
        self
    }

    pub fn delay(mut self, name: impl Into<String>, ms: u64) -> Self {
        self.delays.insert(name.into(), ms);
        self
    }

    pub fn get_action(&self, name: &str) -> Option<Action> {
        self.actions.get(name).cloned()
    }

    pub fn get_guard(&self, name: &str) -> Option<Guard> {
        self.guards.get(name).cloned()
    }

    pub fn get_service(&self, name: &str) -> Option<ServiceFactory> {
        self.services.get(name).cloned()
    }

    pub fn resolve_delay(&self, name: &str) -> Option<u64> {
        DelayRegistry::resolve(&self.delays, name)
    }
}
