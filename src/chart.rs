//! Chart Model (SPEC_FULL.md §4.1, component C1).
//!
//! A [`Chart`] is the immutable, flattened, index-resolved tree a parser
//! collaborator would hand the interpreter after parsing a JSON/JSON-5
//! document. [`ChartBuilder`] is the narrow in-crate convenience mentioned in
//! §4.1: it performs the same identifier resolution and structural checks a
//! real parser would, so tests (and any caller without a separate parsing
//! front end) can construct a valid [`Chart`] directly.

use std::collections::HashMap;

use crate::error::{MachineError, Result};
use crate::path::{self, TargetRef};

/// Index into [`Chart::nodes`]. Stable for the lifetime of a compiled chart.
pub type NodeId = usize;

/// What kind of state node this is. See SPEC_FULL.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History,
}

/// History flavor, meaningful only when [`StateKind::History`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFlavor {
    Shallow,
    Deep,
}

/// How a timer's delay is specified: a literal millisecond count, or a name
/// resolved at arm-time via the host's delay registry (SPEC_FULL.md §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelaySpec {
    Millis(u64),
    Named(String),
}

/// A fully resolved transition: every target is a [`NodeId`], every event is
/// a concrete [`EventDescriptor`]. See SPEC_FULL.md §3 and §4.4.
#[derive(Debug, Clone)]
pub struct Transition {
    pub source: NodeId,
    pub event: EventDescriptor,
    /// Empty ⇔ internal/targetless transition.
    pub targets: Vec<NodeId>,
    pub guard: Option<String>,
    pub actions: Vec<String>,
    /// `true` for targetless transitions and explicit `.` self-targets.
    pub internal: bool,
    /// Delay this transition is armed under, for `after` transitions only.
    pub delay: Option<DelaySpec>,
    /// Global document-order sequence number, used by the resolver's
    /// same-depth tie-break (SPEC_FULL.md §4.4 rule 4).
    pub doc_order: usize,
}

/// The event a transition matches. Synthetic events (`after:*`,
/// `done.invoke.*`, `error.platform.*`, `done.state.*`) are plain `Named`
/// strings — see SPEC_FULL.md §1.2 and §4.4 for why no separate variants are
/// needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventDescriptor {
    Named(String),
    Eventless,
}

/// An `invoke` declaration on a state node.
#[derive(Debug, Clone)]
pub struct InvokeDescriptor {
    pub id: String,
    pub src: String,
}

/// An immutable state node. See SPEC_FULL.md §3.
#[derive(Debug, Clone)]
pub struct StateNode {
    pub id: NodeId,
    pub name: String,
    /// Dotted path from (but excluding) the chart root, e.g. `"A.A1.A1b"`.
    /// The root node's own path is the empty string.
    pub path: String,
    pub parent: Option<NodeId>,
    pub kind: StateKind,
    /// Document order among all nodes in the chart; used for deterministic
    /// entry/exit ordering and resolver tie-breaks.
    pub doc_order: usize,
    pub depth: usize,
    /// Ordered children (document order). Includes history pseudo-states.
    pub children: Vec<NodeId>,
    /// Meaningful only for [`StateKind::Compound`].
    pub initial: Option<NodeId>,
    /// Meaningful only for [`StateKind::History`].
    pub history_flavor: Option<HistoryFlavor>,
    pub entry: Vec<String>,
    pub exit: Vec<String>,
    /// Outgoing transitions in source-declaration order, including
    /// synthesized `after`/`invoke.onDone`/`invoke.onError` transitions.
    pub transitions: Vec<Transition>,
    pub invokes: Vec<InvokeDescriptor>,
    /// `onError` handlers declared directly on this node.
    pub on_error: Vec<Transition>,
}

/// The compiled, read-only chart. Shared (`Arc<Chart>`) across every
/// [`crate::machine::Machine`] built from the same source document.
#[derive(Debug)]
pub struct Chart {
    pub root_id: String,
    pub root: NodeId,
    pub nodes: Vec<StateNode>,
    pub path_index: HashMap<String, NodeId>,
    pub initial_context: serde_json::Map<String, serde_json::Value>,
}

impl Chart {
    pub fn node(&self, id: NodeId) -> &StateNode {
        &self.nodes[id]
    }

    pub fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut cur = self.node(of).parent;
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.node(n).parent;
        }
        false
    }

    pub fn ancestors(&self, of: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.node(of).parent;
        while let Some(n) = cur {
            out.push(n);
            cur = self.node(n).parent;
        }
        out
    }

    /// The least-common-compound-ancestor of `a` and all of `targets`
    /// (SPEC_FULL.md §4.4 rule 6 / GLOSSARY "Scope").
    pub fn scope_of(&self, source: NodeId, targets: &[NodeId]) -> NodeId {
        let mut common: Vec<NodeId> = self.ancestors(source);
        common.insert(0, source);
        for &t in targets {
            let mut t_chain: Vec<NodeId> = self.ancestors(t);
            t_chain.insert(0, t);
            common.retain(|n| t_chain.contains(n));
        }
        // Narrowest common ancestor is the one with the greatest depth.
        common
            .into_iter()
            .max_by_key(|&n| self.node(n).depth)
            .unwrap_or(self.root)
    }
}

// ---------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------

/// A single authored transition, before target-path resolution.
#[derive(Debug, Clone, Default)]
pub struct TransitionSpec {
    pub targets: Vec<String>,
    pub guard: Option<String>,
    pub actions: Vec<String>,
}

impl TransitionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }
}

#[derive(Debug, Clone)]
struct AfterSpec {
    delay: DelaySpec,
    transition: TransitionSpec,
}

#[derive(Debug, Clone)]
struct InvokeSpec {
    id: Option<String>,
    src: String,
    on_done: Option<TransitionSpec>,
    on_error: Option<TransitionSpec>,
}

/// A node under construction. Build a tree of these with [`ChartBuilder`] and
/// call [`ChartBuilder::build`] to resolve it into an immutable [`Chart`].
#[derive(Debug, Clone)]
pub struct NodeSpec {
    name: String,
    kind: StateKind,
    initial: Option<String>,
    history_flavor: Option<HistoryFlavor>,
    entry: Vec<String>,
    exit: Vec<String>,
    children: Vec<NodeSpec>,
    on: Vec<(Option<String>, Vec<TransitionSpec>)>,
    after: Vec<AfterSpec>,
    invokes: Vec<InvokeSpec>,
    on_error: Vec<TransitionSpec>,
}

impl NodeSpec {
    pub fn atomic(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::Atomic)
    }

    pub fn compound(name: impl Into<String>, initial: impl Into<String>) -> Self {
        let mut n = Self::new(name, StateKind::Compound);
        n.initial = Some(initial.into());
        n
    }

    pub fn parallel(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::Parallel)
    }

    pub fn r#final(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::Final)
    }

    pub fn history(name: impl Into<String>, flavor: HistoryFlavor) -> Self {
        let mut n = Self::new(name, StateKind::History);
        n.history_flavor = Some(flavor);
        n
    }

    fn new(name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            initial: None,
            history_flavor: None,
            entry: Vec::new(),
            exit: Vec::new(),
            children: Vec::new(),
            on: Vec::new(),
            after: Vec::new(),
            invokes: Vec::new(),
            on_error: Vec::new(),
        }
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn entry(mut self, action: impl Into<String>) -> Self {
        self.entry.push(action.into());
        self
    }

    pub fn exit(mut self, action: impl Into<String>) -> Self {
        self.exit.push(action.into());
        self
    }

    pub fn on(mut self, event: impl Into<String>, transition: TransitionSpec) -> Self {
        self.on.push((Some(event.into()), vec![transition]));
        self
    }

    pub fn on_many(mut self, event: impl Into<String>, transitions: Vec<TransitionSpec>) -> Self {
        self.on.push((Some(event.into()), transitions));
        self
    }

    pub fn always(mut self, transition: TransitionSpec) -> Self {
        self.on.push((None, vec![transition]));
        self
    }

    pub fn always_many(mut self, transitions: Vec<TransitionSpec>) -> Self {
        self.on.push((None, transitions));
        self
    }

    pub fn after_millis(mut self, ms: u64, transition: TransitionSpec) -> Self {
        self.after.push(AfterSpec { delay: DelaySpec::Millis(ms), transition });
        self
    }

    pub fn after_named(mut self, name: impl Into<String>, transition: TransitionSpec) -> Self {
        self.after.push(AfterSpec { delay: DelaySpec::Named(name.into()), transition });
        self
    }

    pub fn invoke(
        mut self,
        id: Option<String>,
        src: impl Into<String>,
        on_done: Option<TransitionSpec>,
        on_error: Option<TransitionSpec>,
    ) -> Self {
        self.invokes.push(InvokeSpec { id, src: src.into(), on_done, on_error });
        self
    }

    pub fn on_error(mut self, transition: TransitionSpec) -> Self {
        self.on_error.push(transition);
        self
    }
}

/// Builds and validates a [`Chart`] from a tree of [`NodeSpec`]s.
pub struct ChartBuilder {
    root_id: String,
    root_spec: NodeSpec,
    initial_context: serde_json::Map<String, serde_json::Value>,
}

impl ChartBuilder {
    pub fn new(root_id: impl Into<String>, root: NodeSpec) -> Self {
        Self { root_id: root_id.into(), root_spec: root, initial_context: serde_json::Map::new() }
    }

    pub fn context(mut self, ctx: serde_json::Map<String, serde_json::Value>) -> Self {
        self.initial_context = ctx;
        self
    }

    pub fn build(self) -> Result<Chart> {
        let mut nodes: Vec<StateNode> = Vec::new();
        let mut path_index: HashMap<String, NodeId> = HashMap::new();
        let mut doc_order = 0usize;

        let root = flatten(&self.root_spec, None, "", 0, &mut nodes, &mut path_index, &mut doc_order)?;

        // Second pass: resolve per-node `initial`, transitions, invokes, onError,
        // using a scratch copy of the spec tree walked in lockstep with `nodes`.
        let mut doc_order2 = 0usize;
        resolve_node(&self.root_spec, None, "", &mut nodes, &path_index, &mut doc_order2)?;

        validate(&nodes, root)?;

        Ok(Chart {
            root_id: self.root_id,
            root,
            nodes,
            path_index,
            initial_context: self.initial_context,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn flatten(
    spec: &NodeSpec,
    parent: Option<NodeId>,
    parent_path: &str,
    depth: usize,
    nodes: &mut Vec<StateNode>,
    path_index: &mut HashMap<String, NodeId>,
    doc_order: &mut usize,
) -> Result<NodeId> {
    let path = if parent_path.is_empty() { String::new() } else { parent_path.to_string() };
    let path = if parent.is_none() {
        String::new()
    } else if path.is_empty() {
        spec.name.clone()
    } else {
        format!("{path}.{}", spec.name)
    };

    let id = nodes.len();
    *doc_order += 1;
    nodes.push(StateNode {
        id,
        name: spec.name.clone(),
        path: path.clone(),
        parent,
        kind: spec.kind,
        doc_order: *doc_order,
        depth,
        children: Vec::new(),
        initial: None,
        history_flavor: spec.history_flavor,
        entry: spec.entry.clone(),
        exit: spec.exit.clone(),
        transitions: Vec::new(),
        invokes: Vec::new(),
        on_error: Vec::new(),
    });
    if parent.is_some() {
        path_index.insert(path, id);
    }

    let mut children = Vec::with_capacity(spec.children.len());
    for child in &spec.children {
        let child_path = nodes[id].path.clone();
        let child_id = flatten(child, Some(id), &child_path, depth + 1, nodes, path_index, doc_order)?;
        children.push(child_id);
    }
    nodes[id].children = children;
    Ok(id)
}

fn resolve_target(
    raw: &str,
    source: NodeId,
    nodes: &[StateNode],
    path_index: &HashMap<String, NodeId>,
) -> Result<Vec<NodeId>> {
    match path::parse_target(raw) {
        TargetRef::SelfTarget => Ok(vec![]),
        TargetRef::Absolute(segments) => {
            let candidate = path::join(&segments);
            path_index
                .get(&candidate)
                .copied()
                .map(|id| vec![id])
                .ok_or_else(|| MachineError::Validation(format!(
                    "transition from '{}' targets unresolved absolute path '{}'",
                    node_label(nodes, source),
                    raw
                )))
        }
        TargetRef::Relative(segments) => {
            let src_path = &nodes[source].path;
            let candidate = if src_path.is_empty() {
                path::join(&segments)
            } else {
                format!("{}.{}", src_path, path::join(&segments))
            };
            path_index
                .get(&candidate)
                .copied()
                .map(|id| vec![id])
                .ok_or_else(|| MachineError::Validation(format!(
                    "transition from '{}' targets unresolved relative path '{}'",
                    node_label(nodes, source),
                    raw
                )))
        }
        TargetRef::Unqualified(segments) => {
            let src_path = &nodes[source].path;
            let as_descendant = if src_path.is_empty() {
                path::join(&segments)
            } else {
                format!("{}.{}", src_path, path::join(&segments))
            };
            if let Some(&id) = path_index.get(&as_descendant) {
                return Ok(vec![id]);
            }
            if let Some(parent) = nodes[source].parent {
                let parent_path = &nodes[parent].path;
                let as_sibling = if parent_path.is_empty() {
                    path::join(&segments)
                } else {
                    format!("{}.{}", parent_path, path::join(&segments))
                };
                if let Some(&id) = path_index.get(&as_sibling) {
                    return Ok(vec![id]);
                }
            }
            let as_absolute = path::join(&segments);
            if let Some(&id) = path_index.get(&as_absolute) {
                return Ok(vec![id]);
            }
            Err(MachineError::Validation(format!(
                "transition from '{}' targets unresolved path '{}'",
                node_label(nodes, source),
                raw
            )))
        }
    }
}

fn node_label(nodes: &[StateNode], id: NodeId) -> String {
    if nodes[id].path.is_empty() { "<root>".to_string() } else { nodes[id].path.clone() }
}

fn build_transition(
    spec: &TransitionSpec,
    source: NodeId,
    event: EventDescriptor,
    delay: Option<DelaySpec>,
    nodes: &[StateNode],
    path_index: &HashMap<String, NodeId>,
    doc_order: &mut usize,
) -> Result<Transition> {
    *doc_order += 1;
    let explicit_self = spec.targets.len() == 1 && spec.targets[0] == ".";
    let mut targets = Vec::new();
    for raw in &spec.targets {
        targets.extend(resolve_target(raw, source, nodes, path_index)?);
    }
    let internal = spec.targets.is_empty() || explicit_self;
    Ok(Transition {
        source,
        event,
        targets,
        guard: spec.guard.clone(),
        actions: spec.actions.clone(),
        internal,
        delay,
        doc_order: *doc_order,
    })
}

fn resolve_node(
    spec: &NodeSpec,
    parent: Option<NodeId>,
    parent_path: &str,
    nodes: &mut Vec<StateNode>,
    path_index: &HashMap<String, NodeId>,
    doc_order: &mut usize,
) -> Result<()> {
    let path = if parent.is_none() {
        String::new()
    } else if parent_path.is_empty() {
        spec.name.clone()
    } else {
        format!("{parent_path}.{}", spec.name)
    };
    let id = *path_index
        .get(&path)
        .or_else(|| if parent.is_none() { Some(&0) } else { None })
        .ok_or_else(|| MachineError::Validation(format!("internal: missing node for path '{path}'")))?;

    if let Some(initial_name) = &spec.initial {
        let initial_path = if path.is_empty() { initial_name.clone() } else { format!("{path}.{initial_name}") };
        let initial_id = path_index.get(&initial_path).copied().ok_or_else(|| {
            MachineError::Validation(format!(
                "compound state '{}' has initial child '{}' which does not exist",
                node_label(nodes, id),
                initial_name
            ))
        })?;
        nodes[id].initial = Some(initial_id);
    }

    let mut transitions = Vec::new();
    for (event, specs) in &spec.on {
        let descriptor = match event {
            Some(name) if !name.is_empty() => EventDescriptor::Named(name.clone()),
            _ => EventDescriptor::Eventless,
        };
        for t in specs {
            transitions.push(build_transition(t, id, descriptor.clone(), None, nodes, path_index, doc_order)?);
        }
    }
    for after in &spec.after {
        let name = match &after.delay {
            DelaySpec::Millis(ms) => format!("after:{ms}"),
            DelaySpec::Named(n) => format!("after:{n}"),
        };
        transitions.push(build_transition(
            &after.transition,
            id,
            EventDescriptor::Named(name),
            Some(after.delay.clone()),
            nodes,
            path_index,
            doc_order,
        )?);
    }

    let mut invokes = Vec::new();
    for (idx, inv) in spec.invokes.iter().enumerate() {
        let invoke_id = inv.id.clone().unwrap_or_else(|| format!("{}-invoke{idx}", node_label(nodes, id)));
        if let Some(on_done) = &inv.on_done {
            transitions.push(build_transition(
                on_done,
                id,
                EventDescriptor::Named(format!("done.invoke.{invoke_id}")),
                None,
                nodes,
                path_index,
                doc_order,
            )?);
        }
        if let Some(on_error) = &inv.on_error {
            transitions.push(build_transition(
                on_error,
                id,
                EventDescriptor::Named(format!("error.platform.{invoke_id}")),
                None,
                nodes,
                path_index,
                doc_order,
            )?);
        }
        invokes.push(InvokeDescriptor { id: invoke_id, src: inv.src.clone() });
    }

    let mut on_error = Vec::new();
    for t in &spec.on_error {
        on_error.push(build_transition(t, id, EventDescriptor::Named("onError".into()), None, nodes, path_index, doc_order)?);
    }

    nodes[id].transitions = transitions;
    nodes[id].invokes = invokes;
    nodes[id].on_error = on_error;

    for child in &spec.children {
        resolve_node(child, Some(id), &path, nodes, path_index, doc_order)?;
    }
    Ok(())
}

fn validate(nodes: &[StateNode], root: NodeId) -> Result<()> {
    for node in nodes {
        match node.kind {
            StateKind::Compound => {
                if node.children.is_empty() {
                    return Err(MachineError::Validation(format!(
                        "compound state '{}' has no children",
                        node_label(nodes, node.id)
                    )));
                }
                if node.initial.is_none() {
                    return Err(MachineError::Validation(format!(
                        "compound state '{}' is missing its 'initial' child",
                        node_label(nodes, node.id)
                    )));
                }
            }
            StateKind::Parallel => {
                if node.children.len() < 2 {
                    return Err(MachineError::Validation(format!(
                        "parallel state '{}' must have at least two regions",
                        node_label(nodes, node.id)
                    )));
                }
            }
            StateKind::Atomic => {
                if !node.children.is_empty() {
                    return Err(MachineError::Validation(format!(
                        "atomic state '{}' has children; did you mean to make it compound?",
                        node_label(nodes, node.id)
                    )));
                }
            }
            StateKind::Final | StateKind::History => {
                if !node.children.is_empty() {
                    return Err(MachineError::Validation(format!(
                        "'{}' state '{}' cannot have children",
                        if matches!(node.kind, StateKind::Final) { "final" } else { "history" },
                        node_label(nodes, node.id)
                    )));
                }
            }
        }
        let mut seen = std::collections::HashSet::new();
        for &c in &node.children {
            if !seen.insert(nodes[c].name.clone()) {
                return Err(MachineError::Validation(format!(
                    "state '{}' has duplicate child name '{}'",
                    node_label(nodes, node.id),
                    nodes[c].name
                )));
            }
        }
    }
    if matches!(nodes[root].kind, StateKind::Final | StateKind::History) {
        return Err(MachineError::Validation("root state cannot be final or history".into()));
    }
    Ok(())
}
