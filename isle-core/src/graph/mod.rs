//! Dependency Graph
//!
//! The graph tracks which reactive computations read which reactive values.
//!
//! - Nodes are signals (sources), memos (derived) and effects.
//! - An edge from B to A means A read B during its last run.
//!
//! Reactive cells in the state layer are built from signals and memos, so
//! every property read performed by a directive ends up as an edge here.
//! A write walks the edges to find exactly the effects (element renders,
//! watch callbacks) that read the changed property.

mod node;
mod scheduler;

pub use node::{Edges, GraphNode, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
