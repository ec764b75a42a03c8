// src/tracker/network.rs

//! The dependency network of concrete tasks and artifacts.
//!
//! Edges point from a predecessor to the node that waits on it. Every
//! queued target is a predecessor of the single `Root` node.
//!
//! Adding nodes marks the network invalid; [`TaskNetwork::build`] expands
//! new nodes through the registry and checks for cycles before the tracker
//! may use it again.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::{debug, info, trace, warn};

use crate::errors::{Result, tracking};
use crate::structs::{Artifact, QueueBehaviour, RelationSpec, RelationTarget, TaskName};
use crate::tracker::registry::{Instantiation, Registry};
use crate::tracker::status::{ArtifactStatus, Status, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Root,
    Task(TaskName),
    Artifact(Artifact),
}

impl Node {
    pub fn as_task(&self) -> Option<&TaskName> {
        match self {
            Node::Task(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            Node::Artifact(art) => Some(art),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Root => f.write_str("__root__"),
            Node::Task(name) => write!(f, "{name}"),
            Node::Artifact(art) => write!(f, "{art}"),
        }
    }
}

impl From<TaskName> for Node {
    fn from(name: TaskName) -> Self {
        Node::Task(name)
    }
}

impl From<Artifact> for Node {
    fn from(art: Artifact) -> Self {
        Node::Artifact(art)
    }
}

/// Where [`TaskNetwork::build`] starts expanding.
#[derive(Debug, Clone, Default)]
pub enum BuildSources {
    /// The root's predecessors.
    #[default]
    Root,
    Nodes(Vec<Node>),
    /// Unexpanded nodes that already have an edge.
    Connected,
}

/// Why two nodes are connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Task to task.
    Task,
    /// Task to a task it generated, or to the root.
    TaskCross,
    /// Between a task and an artifact.
    ArtifactCross,
    /// Concrete artifact to an abstract one it matches, found from the
    /// concrete side.
    ArtifactUp,
    /// As `ArtifactUp`, found from the abstract side.
    ArtifactDown,
}

#[derive(Debug, Clone)]
struct NodeData {
    node: Node,
    expanded: bool,
    reactive: bool,
}

#[derive(Debug)]
pub struct TaskNetwork {
    graph: DiGraph<NodeData, EdgeKind>,
    index: HashMap<Node, NodeIndex>,
    root: NodeIndex,
    is_valid: bool,
}

impl Default for TaskNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskNetwork {
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(NodeData {
            node: Node::Root,
            expanded: true,
            reactive: false,
        });
        let mut index = HashMap::new();
        index.insert(Node::Root, root);
        Self {
            graph,
            index,
            root,
            is_valid: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.index.contains_key(node)
    }

    /// Nodes other than the root.
    pub fn len(&self) -> usize {
        self.graph.node_count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph
            .node_indices()
            .filter(|ix| *ix != self.root)
            .map(|ix| &self.graph[ix].node)
    }

    pub fn is_reactive(&self, node: &Node) -> bool {
        self.index
            .get(node)
            .is_some_and(|ix| self.graph[*ix].reactive)
    }

    pub fn is_expanded(&self, node: &Node) -> bool {
        self.index
            .get(node)
            .is_some_and(|ix| self.graph[*ix].expanded)
    }

    /// Nodes the given node waits on.
    pub fn pred(&self, node: &Node) -> Vec<Node> {
        self.neighbours(node, Direction::Incoming)
    }

    /// Nodes waiting on the given node.
    pub fn succ(&self, node: &Node) -> Vec<Node> {
        self.neighbours(node, Direction::Outgoing)
    }

    fn neighbours(&self, node: &Node, dir: Direction) -> Vec<Node> {
        let Some(ix) = self.index.get(node) else {
            return Vec::new();
        };
        // petgraph yields neighbours newest first.
        let mut found: Vec<Node> = self
            .graph
            .neighbors_directed(*ix, dir)
            .map(|n| self.graph[n].node.clone())
            .collect();
        found.reverse();
        found.dedup();
        found
    }

    pub fn edge_kind(&self, from: &Node, to: &Node) -> Option<EdgeKind> {
        let (a, b) = (self.index.get(from)?, self.index.get(to)?);
        self.graph.find_edge(*a, *b).map(|e| self.graph[e])
    }

    /// Every edge as `(from, to, kind)`.
    pub fn edges(&self) -> Vec<(Node, Node, EdgeKind)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].node.clone(),
                    self.graph[e.target()].node.clone(),
                    *e.weight(),
                )
            })
            .collect()
    }

    // ---- mutation ----

    /// Add a node if it is new. Tasks must be registered and concrete.
    pub fn add_node(&mut self, registry: &mut Registry, node: Node) -> Result<NodeIndex> {
        if let Some(ix) = self.index.get(&node) {
            return Ok(*ix);
        }
        let mut reactive = false;
        match &node {
            Node::Root => return Ok(self.root),
            Node::Task(name) => {
                if !name.is_concrete() {
                    return Err(tracking(format!(
                        "tried to add the abstract task {name} to the network"
                    )));
                }
                let spec = registry.spec(name).ok_or_else(|| {
                    tracking(format!("tried to add the unregistered task {name} to the network"))
                })?;
                reactive = spec.queue_behaviour == QueueBehaviour::Reactive;
            }
            Node::Artifact(art) => {
                if !registry.has_artifact(art) {
                    registry.register_artifact(art.clone(), None, None);
                }
            }
        }

        trace!(node = %node, "adding node");
        let ix = self.graph.add_node(NodeData {
            node: node.clone(),
            expanded: false,
            reactive,
        });
        self.index.insert(node, ix);
        self.is_valid = false;
        Ok(ix)
    }

    /// Connect `left -> right`, adding either node if needed.
    pub fn connect(
        &mut self,
        registry: &mut Registry,
        left: Node,
        right: Node,
        kind: EdgeKind,
    ) -> Result<()> {
        let l = self.add_node(registry, left)?;
        let r = self.add_node(registry, right)?;
        if l == r {
            return Err(tracking(format!(
                "tried to connect {} to itself",
                self.graph[l].node
            )));
        }
        if self.graph.find_edge(l, r).is_none() {
            trace!(from = %self.graph[l].node, to = %self.graph[r].node, ?kind, "connecting");
            self.graph.add_edge(l, r, kind);
            self.is_valid = false;
        }
        Ok(())
    }

    /// Make `node` a predecessor of the root.
    pub fn connect_to_root(&mut self, registry: &mut Registry, node: Node) -> Result<()> {
        self.connect(registry, node, Node::Root, EdgeKind::TaskCross)
    }

    // ---- building ----

    /// Expand nodes until nothing new appears, then check for cycles.
    ///
    /// Any node still unexpanded once `sources` are exhausted is swept up
    /// too.
    pub fn build(&mut self, registry: &mut Registry, sources: BuildSources) -> Result<()> {
        let mut queue: VecDeque<Node> = match sources {
            BuildSources::Root => self.pred(&Node::Root).into(),
            BuildSources::Nodes(nodes) => nodes.into(),
            BuildSources::Connected => self
                .graph
                .node_indices()
                .filter(|ix| !self.graph[*ix].expanded)
                .filter(|ix| self.graph.neighbors_undirected(*ix).next().is_some())
                .map(|ix| self.graph[ix].node.clone())
                .collect(),
        };
        let mut expanded = 0usize;

        loop {
            while let Some(node) = queue.pop_front() {
                if node == Node::Root || self.is_expanded(&node) {
                    continue;
                }
                self.add_node(registry, node.clone())?;
                for next in self.expand(registry, &node)? {
                    queue.push_back(next);
                }
                if let Some(ix) = self.index.get(&node) {
                    self.graph[*ix].expanded = true;
                }
                expanded += 1;
            }

            let pending: Vec<Node> = self
                .graph
                .node_indices()
                .filter(|ix| !self.graph[*ix].expanded)
                .map(|ix| self.graph[ix].node.clone())
                .collect();
            if pending.is_empty() {
                break;
            }
            queue.extend(pending);
        }

        self.validate()?;
        info!(expanded, nodes = self.len(), "network built");
        Ok(())
    }

    /// Fail if the network has a cycle, otherwise mark it valid.
    pub fn validate(&mut self) -> Result<()> {
        if let Err(cycle) = toposort(&self.graph, None) {
            self.is_valid = false;
            return Err(tracking(format!(
                "network contains a cycle through {}",
                self.graph[cycle.node_id()].node
            )));
        }
        self.is_valid = true;
        Ok(())
    }

    /// Full structural check: acyclic, fully expanded, every task backed by
    /// a concrete spec, every abstract artifact fed by something.
    ///
    /// Strict mode fails on the first problem; otherwise problems are
    /// logged and `false` returned.
    pub fn validate_network(&mut self, registry: &Registry, strict: bool) -> Result<bool> {
        let mut failures = Vec::new();
        if let Err(cycle) = toposort(&self.graph, None) {
            failures.push(format!("cycle through {}", self.graph[cycle.node_id()].node));
        }
        for ix in self.graph.node_indices().filter(|ix| *ix != self.root) {
            let data = &self.graph[ix];
            if !data.expanded {
                failures.push(format!("{} is not expanded", data.node));
            }
            match &data.node {
                Node::Task(name) if !name.is_concrete() => {
                    failures.push(format!("{name} has no uuid"));
                }
                Node::Task(name) if registry.spec(name).is_none() => {
                    failures.push(format!("{name} has no spec"));
                }
                Node::Artifact(art) if art.is_abstract() => {
                    let fed = self
                        .graph
                        .neighbors_directed(ix, Direction::Incoming)
                        .any(|p| matches!(&self.graph[p].node, Node::Artifact(a) if a.is_concrete()));
                    if !fed {
                        warn!(artifact = %art, "abstract artifact has no concrete predecessor");
                    }
                }
                _ => {}
            }
        }

        if failures.is_empty() {
            self.is_valid = true;
            return Ok(true);
        }
        self.is_valid = false;
        if strict {
            Err(tracking(format!("network failed validation: {failures:?}")))
        } else {
            warn!(?failures, "network failed validation");
            Ok(false)
        }
    }

    /// Predecessors and successors of `node`, split by kind.
    pub fn concrete_edges(&self, node: &Node) -> ConcreteEdges {
        ConcreteEdges {
            pred: EdgeSummary::collect(self.pred(node)),
            succ: EdgeSummary::collect(self.succ(node)),
        }
    }

    /// Predecessors of `node` that do not yet let it run.
    pub fn incomplete_dependencies(&self, registry: &Registry, node: &Node) -> Vec<Node> {
        self.pred(node)
            .into_iter()
            .filter(|dep| !is_satisfied(registry, node, dep))
            .collect()
    }

    fn expand(&mut self, registry: &mut Registry, node: &Node) -> Result<Vec<Node>> {
        match node {
            Node::Root => Ok(Vec::new()),
            Node::Task(name) => self.expand_task(registry, name),
            Node::Artifact(art) => self.expand_artifact(registry, art),
        }
    }

    /// Resolve every relation of a concrete task, plus any abstract specs
    /// that declared they block it, and the specs it generated.
    fn expand_task(&mut self, registry: &mut Registry, name: &TaskName) -> Result<Vec<Node>> {
        debug!(task = %name, "expanding task");
        let spec = registry
            .spec(name)
            .cloned()
            .ok_or_else(|| tracking(format!("cannot expand unregistered task {name}")))?;
        let mut found = Vec::new();

        for rel in spec.relations() {
            let other = self.resolve(registry, rel, name)?;
            let kind = match other {
                Node::Task(_) => EdgeKind::Task,
                _ => EdgeKind::ArtifactCross,
            };
            let (left, right) = rel.to_ordered_pair(Node::Task(name.clone()), other.clone());
            self.connect(registry, left, right, kind)?;
            found.push(other);
        }

        let blockers = registry
            .blockers
            .get(&name.de_uniq())
            .cloned()
            .unwrap_or_default();
        for rel in blockers {
            let Some(blocker) = registry.instantiate_blocker(&rel, name)? else {
                continue;
            };
            let node = Node::Task(blocker);
            self.connect(registry, node.clone(), Node::Task(name.clone()), EdgeKind::Task)?;
            found.push(node);
        }

        let generated = registry.generated.get(name).cloned().unwrap_or_default();
        for gen_name in generated {
            let node = Node::Task(gen_name);
            self.add_node(registry, node.clone())?;
            found.push(node);
        }

        Ok(found)
    }

    fn resolve(&mut self, registry: &mut Registry, rel: &RelationSpec, control: &TaskName) -> Result<Node> {
        match &rel.target {
            RelationTarget::Task(_) => Ok(Node::Task(registry.instantiate_relation(rel, control)?)),
            RelationTarget::Artifact(art) => Ok(Node::Artifact(art.clone())),
        }
    }

    /// Link an artifact to the artifacts it matches and the tasks that
    /// build it.
    fn expand_artifact(&mut self, registry: &mut Registry, art: &Artifact) -> Result<Vec<Node>> {
        debug!(artifact = %art, "expanding artifact");
        let mut found = Vec::new();

        if art.is_concrete() {
            let abstracts: Vec<Artifact> = registry
                .abstract_artifacts
                .iter()
                .filter(|abs| abs.matches(art))
                .cloned()
                .collect();
            for abs in abstracts {
                let node = Node::Artifact(abs);
                self.connect(registry, Node::Artifact(art.clone()), node.clone(), EdgeKind::ArtifactUp)?;
                found.push(node);
            }
        } else {
            let concretes: Vec<Artifact> = registry
                .concrete_artifacts
                .iter()
                .filter(|conc| art.matches(conc))
                .cloned()
                .collect();
            for conc in concretes {
                let node = Node::Artifact(conc);
                self.connect(registry, node.clone(), Node::Artifact(art.clone()), EdgeKind::ArtifactDown)?;
                found.push(node);
            }
        }

        let builders = registry
            .artifact_builders
            .get(art)
            .cloned()
            .unwrap_or_default();
        let abstract_builders = builders
            .iter()
            .filter(|b| !b.is_concrete() && !registry.transformers.contains(b));
        for builder in abstract_builders.cloned().collect::<Vec<_>>() {
            let Some(inst) = registry.instantiate_spec(&builder, Instantiation::Reuse)? else {
                continue;
            };
            let node = Node::Task(inst);
            self.connect(registry, node.clone(), Node::Artifact(art.clone()), EdgeKind::ArtifactCross)?;
            found.push(node);
        }

        if art.is_concrete() && builders.is_empty() {
            found.extend(self.instantiate_transformers(registry, art)?);
        }
        Ok(found)
    }

    /// Instantiate every transformer whose output pattern matches `art`.
    fn instantiate_transformers(&mut self, registry: &mut Registry, art: &Artifact) -> Result<Vec<Node>> {
        let mut found = Vec::new();
        for t_name in registry.transformers.clone() {
            let Some(spec) = registry.spec(&t_name) else {
                continue;
            };
            let produces = spec
                .transformer_of()
                .and_then(|(_, post)| post.artifact_target())
                .is_some_and(|out| out.matches(art));
            if !produces {
                continue;
            }
            let Some(instance) = spec.instantiate_transformer(art)? else {
                continue;
            };
            let inst_name = instance.name.clone();
            info!(transformer = %t_name, artifact = %art, instance = %inst_name, "instantiated transformer");
            registry.register_spec([instance])?;
            let node = Node::Task(inst_name);
            self.connect(registry, node.clone(), Node::Artifact(art.clone()), EdgeKind::ArtifactCross)?;
            found.push(node);
        }
        Ok(found)
    }
}

/// Neighbours of one direction, split by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeSummary {
    pub tasks: Vec<TaskName>,
    pub abstract_artifacts: Vec<Artifact>,
    pub concrete_artifacts: Vec<Artifact>,
    pub root: bool,
}

impl EdgeSummary {
    fn collect(nodes: Vec<Node>) -> Self {
        let mut out = Self::default();
        for node in nodes {
            match node {
                Node::Root => out.root = true,
                Node::Task(name) => out.tasks.push(name),
                Node::Artifact(art) if art.is_abstract() => out.abstract_artifacts.push(art),
                Node::Artifact(art) => out.concrete_artifacts.push(art),
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConcreteEdges {
    pub pred: EdgeSummary,
    pub succ: EdgeSummary,
}

/// Whether `dep` no longer holds up `node`.
///
/// Artifacts must exist. Tasks must have succeeded or been skipped, except
/// that a cleanup only waits for its owner to finish.
pub fn is_satisfied(registry: &Registry, node: &Node, dep: &Node) -> bool {
    match (dep, registry.get_status(dep)) {
        (Node::Root, _) => true,
        (Node::Artifact(_), Status::Artifact(status)) => status == ArtifactStatus::Exists,
        (Node::Task(name), Status::Task(status)) => {
            if is_owner(node, name) {
                return status.is_terminal();
            }
            match status {
                TaskStatus::Success | TaskStatus::Skipped => true,
                TaskStatus::Teardown | TaskStatus::Dead => matches!(
                    registry.outcome(name),
                    Some(TaskStatus::Success | TaskStatus::Skipped)
                ),
                _ => false,
            }
        }
        _ => false,
    }
}

/// Whether `dep` failed in a way that should halt `node`.
pub fn is_blocked_by(registry: &Registry, node: &Node, dep: &Node) -> bool {
    let Node::Task(name) = dep else {
        return false;
    };
    if is_owner(node, name) {
        return false;
    }
    match registry.task_status(name) {
        TaskStatus::Failed | TaskStatus::Halted => true,
        TaskStatus::Teardown | TaskStatus::Dead => {
            registry.outcome(name).is_some_and(TaskStatus::is_failure)
        }
        _ => false,
    }
}

/// A cleanup is owned by the task whose name prefixes its own.
pub(crate) fn is_owner(node: &Node, dep: &TaskName) -> bool {
    match node {
        Node::Task(name) => name.is_cleanup() && dep != name && dep.is_prefix_of(name),
        _ => false,
    }
}
