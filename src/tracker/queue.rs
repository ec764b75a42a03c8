// src/tracker/queue.rs

//! Priority queue over active network nodes.
//!
//! The highest priority is dequeued first, FIFO among equals. Nodes leave
//! the active set lazily: stale heap entries are skipped on pop.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use tracing::{debug, warn};

use crate::tracker::network::Node;
use crate::tracker::registry::Registry;
use crate::tracker::status::{Status, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    priority: i64,
    seq: u64,
    node: Node,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct TrackerQueue {
    heap: BinaryHeap<Entry>,
    /// Nodes with a live heap entry.
    queued: HashSet<Node>,
    active: HashSet<Node>,
    trace: Vec<Node>,
    seq: u64,
    min_priority: i64,
}

impl TrackerQueue {
    pub fn new(min_priority: i64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            queued: HashSet::new(),
            active: HashSet::new(),
            trace: Vec::new(),
            seq: 0,
            min_priority,
        }
    }

    /// Activate `node` and give it a heap entry at its current priority.
    ///
    /// A node already waiting in the heap keeps its entry.
    pub fn push(&mut self, registry: &Registry, node: Node) {
        self.active.insert(node.clone());
        if self.queued.contains(&node) {
            return;
        }
        let priority = registry.get_priority(&node);
        debug!(node = %node, priority, "queued");
        self.seq += 1;
        self.queued.insert(node.clone());
        self.heap.push(Entry {
            priority,
            seq: self.seq,
            node,
        });
    }

    /// Pop the top active node, decaying its priority.
    ///
    /// A task that decays below `min_priority` is set HALTED unless it is
    /// already running or finished; an artifact that does is dropped with a
    /// warning.
    pub fn deque_entry(&mut self, registry: &mut Registry) -> Option<Node> {
        while let Some(entry) = self.heap.pop() {
            self.queued.remove(&entry.node);
            if !self.active.contains(&entry.node) {
                continue;
            }
            match &entry.node {
                Node::Task(name) => {
                    let Some(task) = registry.task_mut(name) else {
                        return Some(entry.node);
                    };
                    task.priority -= 1;
                    let halts = !task.status.is_terminal() && task.status != TaskStatus::Running;
                    if task.priority < self.min_priority && halts {
                        warn!(task = %name, priority = task.priority, "priority decayed, halting");
                        task.set_status(TaskStatus::Halted);
                    }
                }
                Node::Artifact(art) => {
                    if registry.decrement_artifact_priority(art) < self.min_priority {
                        warn!(artifact = %art, "priority decayed, dropping artifact");
                        self.active.remove(&entry.node);
                        continue;
                    }
                }
                Node::Root => continue,
            }
            return Some(entry.node);
        }
        None
    }

    /// The node [`deque_entry`](Self::deque_entry) would return next,
    /// without any priority decay.
    pub fn peek(&self) -> Option<&Node> {
        let mut entries: Vec<&Entry> = self
            .heap
            .iter()
            .filter(|e| self.active.contains(&e.node))
            .collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.first().map(|e| &e.node)
    }

    pub fn deactivate(&mut self, node: &Node) {
        self.active.remove(node);
    }

    pub fn is_active(&self, node: &Node) -> bool {
        self.active.contains(node)
    }

    pub fn active_set(&self) -> &HashSet<Node> {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Record a node as completed.
    pub(crate) fn record(&mut self, node: Node, status: Status) {
        debug!(node = %node, %status, "completed");
        self.trace.push(node);
    }

    /// Record `node` unless it is already in the trace.
    pub(crate) fn record_once(&mut self, node: Node, status: Status) {
        if !self.trace.contains(&node) {
            self.record(node, status);
        }
    }

    /// Completed nodes, in order.
    pub fn execution_trace(&self) -> &[Node] {
        &self.trace
    }

    pub fn clear_queue(&mut self) {
        self.heap.clear();
        self.queued.clear();
        self.active.clear();
    }
}
