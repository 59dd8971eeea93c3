//! History tracking (SPEC_FULL.md §3 "History Record", §4.5 step 2).
//!
//! Grounded on the shallow/deep distinction in `bevy_gearbox`'s
//! `history::History`/`HistoryState` components, adapted here to a plain
//! owned map instead of ECS components since the interpreter has no entity
//! world to attach them to.

use std::collections::{HashMap, HashSet};

use crate::chart::NodeId;

/// Per-history-node record of the descendants that were active the last
/// time the history node's parent was exited.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    records: HashMap<NodeId, HashSet<NodeId>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, history_node: NodeId, descendants: HashSet<NodeId>) {
        self.records.insert(history_node, descendants);
    }

    pub fn get(&self, history_node: NodeId) -> Option<&HashSet<NodeId>> {
        self.records.get(&history_node)
    }

    /// Cleared on RESET (SPEC_FULL.md §4.9).
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
