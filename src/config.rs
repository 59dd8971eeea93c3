//! Active Configuration (SPEC_FULL.md §4.3, component C3).
//!
//! [`NodeId`]s are assigned by [`crate::chart::ChartBuilder`] in document
//! pre-order, so a plain sorted set of active ids already renders in
//! parent-before-child, document order — no separate ordering key needed.

use std::collections::BTreeSet;

use crate::chart::{Chart, NodeId, StateKind};
use crate::path;

/// The set of currently active state nodes. Invariants I1–I5 (SPEC_FULL.md
/// §3) are maintained by [`crate::microstep::MicrostepExecutor`]; this type
/// only stores and renders the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    active: BTreeSet<NodeId>,
}

impl Configuration {
    pub fn empty() -> Self {
        Self { active: BTreeSet::new() }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.active.contains(&node)
    }

    pub fn insert(&mut self, node: NodeId) {
        self.active.insert(node);
    }

    pub fn remove(&mut self, node: NodeId) {
        self.active.remove(&node);
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.active.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// The deepest active descendants of each parallel region / compound
    /// chain: nodes that are active but have no active child.
    pub fn atomic_leaves(&self, chart: &Chart) -> Vec<NodeId> {
        self.active
            .iter()
            .copied()
            .filter(|&n| chart.node(n).children.iter().all(|c| !self.active.contains(c)))
            .collect()
    }

    /// Every active node except the root, parent-before-child, document order.
    pub fn full(&self, chart: &Chart) -> Vec<NodeId> {
        self.active.iter().copied().filter(|&n| n != chart.root).collect()
    }

    pub fn leaves_rendering(&self, chart: &Chart) -> String {
        self.atomic_leaves(chart)
            .into_iter()
            .filter(|&n| n != chart.root)
            .map(|n| chart.node(n).path.clone())
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn full_rendering(&self, chart: &Chart) -> String {
        self.full(chart).into_iter().map(|n| chart.node(n).path.clone()).collect::<Vec<_>>().join(";")
    }

    /// `is_in`/`IsInState` semantics: `query` matches if it equals, or is a
    /// dot-boundary prefix of, any active node's full path.
    pub fn contains_path(&self, chart: &Chart, query: &str) -> bool {
        self.full(chart).into_iter().any(|n| path::is_prefix_at_boundary(query, &chart.node(n).path))
    }

    /// Checks invariants I1–I5. Used by property tests and debug assertions;
    /// not on the hot path of ordinary execution.
    pub fn check_invariants(&self, chart: &Chart) -> Result<(), String> {
        if !self.active.contains(&chart.root) {
            return Err("I1 violated: root is not active".into());
        }
        for &n in &self.active {
            let node = chart.node(n);
            match node.kind {
                StateKind::Compound => {
                    let active_children: Vec<_> = node.children.iter().copied().filter(|c| self.active.contains(c)).collect();
                    if active_children.len() != 1 {
                        return Err(format!(
                            "I2 violated: compound '{}' has {} active children, expected 1",
                            node.path,
                            active_children.len()
                        ));
                    }
                }
                StateKind::Parallel => {
                    for &c in &node.children {
                        if chart.node(c).kind == StateKind::History {
                            continue;
                        }
                        if !self.active.contains(&c) {
                            return Err(format!("I3 violated: parallel '{}' region '{}' inactive", node.path, chart.node(c).path));
                        }
                    }
                }
                StateKind::Atomic | StateKind::Final => {
                    if let Some(parent) = node.parent {
                        if !self.active.contains(&parent) {
                            return Err(format!("I4 violated: '{}' active without parent active", node.path));
                        }
                    }
                    if node.kind == StateKind::Final {
                        let has_active_descendant = node.children.iter().any(|c| self.active.contains(c));
                        if has_active_descendant {
                            return Err(format!("I5 violated: final '{}' has active descendants", node.path));
                        }
                    }
                }
                StateKind::History => {}
            }
        }
        Ok(())
    }
}
