//! Update Scheduler
//!
//! The scheduler owns the dependency graph and determines the order in which
//! affected nodes are processed after a source changes. Dependencies always
//! come before their dependents.
//!
//! # Algorithm
//!
//! 1. When a source node changes, walk its dependents breadth-first and
//!    collect every reachable node.
//! 2. Sort the collected nodes topologically (Kahn's algorithm, restricted to
//!    edges inside the collected set).
//! 3. Ties are broken by node ID, which is allocation order. Effects created
//!    earlier (outer elements) therefore run before effects created later.
//!
//! Derived nodes in the result only need to be marked stale; they recompute
//! lazily on their next read. Effect nodes need to be queued.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::node::{GraphNode, NodeId, NodeKind};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    nodes: HashMap<NodeId, GraphNode>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph, along with every edge touching it.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            for dep_id in node.dependencies() {
                if let Some(dep) = self.nodes.get_mut(dep_id) {
                    dep.remove_dependent(node_id);
                }
            }
            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_dependency(node_id);
                }
            }
        }
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Add a dependency edge: `dependent` reads from `dependency`.
    ///
    /// Edges to unknown nodes are ignored.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if dependency == dependent
            || !self.nodes.contains_key(&dependency)
            || !self.nodes.contains_key(&dependent)
        {
            return;
        }
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Remove every edge where `node_id` is the reader.
    ///
    /// Called before a memo or effect re-runs so stale dependencies from the
    /// previous run do not linger.
    pub fn clear_dependencies(&mut self, node_id: NodeId) {
        let deps = match self.nodes.get_mut(&node_id) {
            Some(node) => node.take_dependencies(),
            None => return,
        };
        for dep_id in deps {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(node_id);
            }
        }
    }

    /// Collect every node affected by a change to `source_id`, in
    /// topological order. The source itself is not included.
    pub fn mark_changed(&self, source_id: NodeId) -> Vec<NodeId> {
        let mut affected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            queue.extend(source.dependents().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                affected.push(node_id);
                // Effects are leaves; only derived nodes propagate further.
                if node.kind() == NodeKind::Derived {
                    queue.extend(node.dependents().iter().copied());
                }
            }
        }

        self.topological_sort(affected)
    }

    /// Perform a topological sort of the given nodes.
    fn topological_sort(&self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut ready = BTreeSet::new();
        let mut result = Vec::with_capacity(nodes.len());

        for &node_id in &nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(*d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    ready.insert(node_id);
                }
            }
        }

        while let Some(node_id) = ready.pop_first() {
            result.push(node_id);
            if let Some(node) = self.nodes.get(&node_id) {
                for dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.insert(*dependent_id);
                        }
                    }
                }
            }
        }

        result
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
