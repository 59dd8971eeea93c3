//! Error types for chart construction, transition resolution, and execution.
//!
//! Mirrors the error-handling shape of the teacher crate's `GraphError`: one
//! `thiserror`-derived enum, `#[from]` conversions for the handful of upstream
//! errors we wrap, and helper constructors for the variants callers build most
//! often. See SPEC_FULL.md §7 for the taxonomy this enum implements.

use thiserror::Error;

/// Convenience result type using [`MachineError`].
pub type Result<T> = std::result::Result<T, MachineError>;

/// Every failure mode a [`crate::machine::Machine`] can produce.
#[derive(Error, Debug)]
pub enum MachineError {
    /// The chart passed to [`crate::chart::ChartBuilder::build`] is structurally
    /// invalid: a transition target could not be resolved, a compound state is
    /// missing its `initial` child, or a parallel state's child is not itself a
    /// compound/atomic region root.
    #[error("chart validation failed: {0}")]
    Validation(String),

    /// A transition's guard callback panicked. Treated as `guard = false`; the
    /// transition is not taken.
    #[error("guard '{guard}' on state '{state}' panicked: {message}")]
    GuardError { state: String, guard: String, message: String },

    /// An entry, exit, or transition action returned an error or panicked.
    #[error("action '{action}' on state '{state}' failed: {message}")]
    ActionError { state: String, action: String, message: String },

    /// An invoked service's future resolved to an error.
    #[error("service '{id}' invoked from state '{state}' failed: {message}")]
    ServiceError { state: String, id: String, message: String },

    /// A transition's target path could not be resolved to a node in this
    /// chart. Fatal to the microstep that selected the transition; the
    /// configuration is left unchanged.
    #[error("could not resolve transition target '{target}' from state '{from}'")]
    ResolutionError { from: String, target: String },

    /// `wait_for_state` did not observe the requested substring before its
    /// deadline elapsed. Does not affect machine state.
    #[error("timed out after {0:?} waiting for state")]
    Timeout(std::time::Duration),

    /// The operation was attempted after `stop()`/`dispose()`.
    #[error("machine is stopped")]
    Stopped,

    /// `MachineOptions::strict` is set and an externally sent event matched no
    /// enabled transition anywhere in the active configuration.
    #[error("no matching transition for event '{0}'")]
    NoMatchingTransition(String),

    /// Context value failed to (de)serialize. Wraps `serde_json::Error`.
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Renders a `catch_unwind` payload as a string, for guard/action panics
/// that get folded into the taxonomy above (SPEC_FULL.md §7).
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl MachineError {
    pub fn guard_error(state: impl Into<String>, guard: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GuardError { state: state.into(), guard: guard.into(), message: message.into() }
    }

    pub fn action_error(state: impl Into<String>, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActionError { state: state.into(), action: action.into(), message: message.into() }
    }

    pub fn service_error(state: impl Into<String>, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceError { state: state.into(), id: id.into(), message: message.into() }
    }

    /// `true` for the error kinds that are routed to an `onError` handler
    /// rather than returned to the caller of `send`/`send_async`.
    pub fn is_recoverable_by_on_error(&self) -> bool {
        matches!(self, Self::ActionError { .. } | Self::ServiceError { .. })
    }
}
