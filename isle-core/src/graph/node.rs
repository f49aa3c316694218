//! Graph Nodes
//!
//! A store property read through a reactive cell is a `Source`, a getter
//! memoized for one scope is `Derived`, and an element render or watch
//! callback is an `Effect`. Most properties are read by a handful of
//! elements, so edges are kept inline.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate the next id. Ids grow monotonically, so comparing two ids
    /// compares creation order.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A signal. Changes start here.
    Source,
    /// A memo. Marked stale by a change, recomputed on the next read.
    Derived,
    /// An effect. Nothing reads from it.
    Effect,
}

/// Edge list of one node.
pub type Edges = SmallVec<[NodeId; 4]>;

/// A node in the dependency graph.
#[derive(Debug)]
pub struct GraphNode {
    id: NodeId,
    kind: NodeKind,
    /// What this node read during its last run.
    reads: Edges,
    /// Who read this node.
    readers: Edges,
}

fn insert(edges: &mut Edges, id: NodeId) -> bool {
    if edges.contains(&id) {
        return false;
    }
    edges.push(id);
    true
}

fn remove(edges: &mut Edges, id: NodeId) -> bool {
    match edges.iter().position(|edge| *edge == id) {
        Some(index) => {
            edges.swap_remove(index);
            true
        }
        None => false,
    }
}

impl GraphNode {
    /// A node for an id its reactive primitive already allocated.
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            reads: Edges::new(),
            readers: Edges::new(),
        }
    }

    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Record that this node read `source`. Returns `false` if it already
    /// had.
    pub fn add_dependency(&mut self, source: NodeId) -> bool {
        insert(&mut self.reads, source)
    }

    pub fn remove_dependency(&mut self, source: NodeId) -> bool {
        remove(&mut self.reads, source)
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.reads
    }

    pub fn add_dependent(&mut self, reader: NodeId) -> bool {
        insert(&mut self.readers, reader)
    }

    pub fn remove_dependent(&mut self, reader: NodeId) -> bool {
        remove(&mut self.readers, reader)
    }

    pub fn dependents(&self) -> &[NodeId] {
        &self.readers
    }

    /// Forget everything this node read, returning it.
    pub fn take_dependencies(&mut self) -> Edges {
        std::mem::take(&mut self.reads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_creation_order() {
        let first = NodeId::new();
        let second = NodeId::new();
        assert!(second > first);
        assert_eq!(second.raw(), first.raw() + 1);
    }

    #[test]
    fn edges_are_deduplicated() {
        let mut render = GraphNode::new(NodeKind::Effect);
        let label = NodeId::new();
        let count = NodeId::new();

        assert!(render.add_dependency(label));
        assert!(!render.add_dependency(label));
        assert!(render.add_dependency(count));
        assert_eq!(render.dependencies(), &[label, count]);

        assert!(render.remove_dependency(label));
        assert!(!render.remove_dependency(label));

        let taken = render.take_dependencies();
        assert_eq!(taken.as_slice(), &[count]);
        assert!(render.dependencies().is_empty());
    }

    #[test]
    fn many_readers_spill_past_the_inline_capacity() {
        let mut cell = GraphNode::new(NodeKind::Source);
        let readers: Vec<NodeId> = (0..10).map(|_| NodeId::new()).collect();
        for reader in &readers {
            cell.add_dependent(*reader);
        }
        assert_eq!(cell.dependents().len(), 10);
        for reader in &readers[..5] {
            cell.remove_dependent(*reader);
        }
        assert_eq!(cell.dependents().len(), 5);
        assert!(readers[5..].iter().all(|reader| cell.dependents().contains(reader)));
    }
}
