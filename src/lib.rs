//! A hierarchical statechart interpreter following the SCXML/Harel
//! conventions popularized by XState: atomic, compound, parallel, final,
//! and history state nodes; guarded transitions; delayed (`after`) and
//! eventless (`always`) transitions; invoked asynchronous services; and a
//! run-to-completion event loop.
//!
//! ```text
//!                     ┌───────────────────────────────┐
//!                     │        Machine (C9)            │
//!                     │  start / send / is_in / reset   │
//!                     └───────────────┬─────────────────┘
//!                                     │ enqueue
//!                     ┌───────────────▼─────────────────┐
//!                     │        Event Loop (C6)           │◄──┐
//!                     │  run-to-completion drain          │   │ after:/done.*/
//!                     └───────────────┬─────────────────┘   │ error.* events
//!                                     │ resolve              │
//!                     ┌───────────────▼─────────────────┐   │
//!                     │   Transition Resolver (C4)        │   │
//!                     └───────────────┬─────────────────┘   │
//!                                     │ selected set         │
//!                     ┌───────────────▼─────────────────┐   │
//!                     │   Microstep Executor (C5)         │──┘
//!                     │  exit → transition → entry        │
//!                     └──┬─────────┬─────────┬───────────┘
//!                        │         │         │
//!                 Configuration  Context   Timers (C7) / Services (C8)
//!                      (C3)       (C2)
//! ```
//!
//! The [`chart`] module builds the immutable chart a parser would hand this
//! crate; [`registry`] is where a host application registers the named
//! actions, guards, services, and delays a chart refers to by name;
//! [`machine`] is the entry point most callers want.

pub mod chart;
pub mod config;
pub mod context;
pub mod error;
mod event_loop;
pub mod history;
pub mod machine;
mod microstep;
pub mod path;
pub mod registry;
mod resolver;
mod service;
mod timer;

pub mod prelude {
    pub use crate::chart::{Chart, ChartBuilder, HistoryFlavor, NodeSpec, StateKind, TransitionSpec};
    pub use crate::error::{MachineError, Result};
    pub use crate::machine::{Machine, MachineOptions, TransitionNotice};
    pub use crate::registry::{CancellationToken, Registry, ServiceOutcome};
}
