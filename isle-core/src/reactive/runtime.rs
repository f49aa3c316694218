//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and schedules updates when signals
//! change.
//!
//! # How It Works
//!
//! 1. When a signal is created, it registers a source node with the runtime.
//!
//! 2. When a memo or effect reads a signal, the runtime records an edge.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Finds every affected node in topological order
//!    b. Marks derived nodes dirty (they recompute lazily on next read)
//!    c. Queues effects
//!    d. Flushes the queue unless a batch is open
//!
//! # Threading
//!
//! The runtime state is thread-local. The interactivity model is single
//! threaded, so every island, store and effect of one document must live on
//! the same thread (a current-thread tokio runtime when async work is
//! involved). Values are still `Send + Sync` so they can be captured by
//! futures.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexSet;

use super::context::ReactiveContext;
use crate::graph::{GraphNode, NodeId, NodeKind, UpdateScheduler};

/// Upper bound on effect runs in one flush. Effects that keep re-triggering
/// each other past this point are dropped with an error.
pub const MAX_FLUSH_ITERATIONS: usize = 10_000;

/// A trait for types that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// The node this reactive value occupies in the dependency graph.
    fn node_id(&self) -> NodeId;

    /// Mark this reactive value as needing recomputation (memos).
    fn mark_dirty(&self);

    /// Run or hand off this reactive value (effects).
    fn schedule(&self);

    /// Effects are eager; memos are lazy.
    fn is_eager(&self) -> bool;
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
pub struct ReactiveHandle {
    id: NodeId,
}

impl ReactiveHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.id);
    }
}

#[derive(Default)]
struct RuntimeState {
    graph: UpdateScheduler,
    registry: HashMap<NodeId, Weak<dyn Reactive>>,
    batch_depth: usize,
    pending: IndexSet<NodeId>,
    flushing: bool,
}

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

/// Access the runtime state. Must never call out to user code while the
/// state is borrowed.
fn with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> Option<R> {
    RUNTIME
        .try_with(|state| f(&mut state.borrow_mut()))
        .ok()
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Add a source node for a signal.
    pub fn register_source(id: NodeId) {
        with_state(|rt| {
            rt.graph.add_node(GraphNode::with_id(id, NodeKind::Source));
        });
    }

    /// Register a memo or effect.
    ///
    /// The runtime only keeps a weak reference; the returned handle removes
    /// the registration when dropped.
    pub fn register(reactive: &Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.node_id();
        let kind = if reactive.is_eager() {
            NodeKind::Effect
        } else {
            NodeKind::Derived
        };
        with_state(|rt| {
            rt.graph.add_node(GraphNode::with_id(id, kind));
            rt.registry.insert(id, Arc::downgrade(reactive));
        });
        ReactiveHandle { id }
    }

    /// Remove a node and all of its edges.
    pub fn unregister(id: NodeId) {
        with_state(|rt| {
            rt.graph.remove_node(id);
            rt.registry.remove(&id);
            rt.pending.shift_remove(&id);
        });
    }

    /// Record a read of `source` by whichever computation is running.
    pub fn track(source: NodeId) {
        if let Some(subscriber) = ReactiveContext::track_dependency(source) {
            Self::add_dependency(source, subscriber);
        }
    }

    /// Record that `subscriber` depends on `source`.
    pub fn add_dependency(source: NodeId, subscriber: NodeId) {
        with_state(|rt| rt.graph.add_edge(source, subscriber));
    }

    /// Remove all dependencies of a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies(subscriber: NodeId) {
        with_state(|rt| rt.graph.clear_dependencies(subscriber));
    }

    /// Propagate a change of `source` through the graph.
    pub fn notify_change(source: NodeId) {
        let Some(derived) = with_state(|rt| {
            let affected = rt.graph.mark_changed(source);
            let mut derived = Vec::new();
            for id in affected {
                let Some(reactive) = rt.registry.get(&id).and_then(Weak::upgrade) else {
                    continue;
                };
                if reactive.is_eager() {
                    rt.pending.insert(id);
                } else {
                    derived.push(reactive);
                }
            }
            derived
        }) else {
            return;
        };

        for reactive in derived {
            reactive.mark_dirty();
        }

        if !Self::is_batching() {
            Self::flush();
        }
    }

    /// Run `f` with change propagation deferred until it returns.
    ///
    /// Nested batches flush once, when the outermost batch closes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        with_state(|rt| rt.batch_depth += 1);
        let guard = BatchGuard;
        let result = f();
        drop(guard);
        result
    }

    pub fn is_batching() -> bool {
        with_state(|rt| rt.batch_depth > 0).unwrap_or(false)
    }

    /// Run every queued effect.
    pub fn flush() {
        let started = with_state(|rt| {
            if rt.flushing {
                false
            } else {
                rt.flushing = true;
                true
            }
        });
        if started != Some(true) {
            return;
        }
        let _guard = FlushGuard;

        let mut iterations = 0usize;
        loop {
            let next = with_state(|rt| {
                let id = rt.pending.shift_remove_index(0)?;
                Some(rt.registry.get(&id).and_then(Weak::upgrade))
            })
            .flatten();
            let Some(next) = next else { break };
            let Some(reactive) = next else { continue };

            iterations += 1;
            if iterations > MAX_FLUSH_ITERATIONS {
                tracing::error!(
                    iterations,
                    "reactive flush did not settle; dropping remaining effects"
                );
                with_state(|rt| rt.pending.clear());
                break;
            }

            tracing::trace!(node = reactive.node_id().raw(), "running effect");
            reactive.schedule();
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Number of nodes reading from `id`.
    pub fn dependent_count(id: NodeId) -> usize {
        with_state(|rt| rt.graph.get_node(id).map_or(0, |n| n.dependents().len())).unwrap_or(0)
    }

    /// Number of nodes `id` reads from.
    pub fn dependency_count(id: NodeId) -> usize {
        with_state(|rt| rt.graph.get_node(id).map_or(0, |n| n.dependencies().len()))
            .unwrap_or(0)
    }

    pub fn is_registered(id: NodeId) -> bool {
        with_state(|rt| rt.graph.contains(id)).unwrap_or(false)
    }
}

/// Run `f` as one batch.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(f)
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = with_state(|rt| {
            rt.batch_depth = rt.batch_depth.saturating_sub(1);
            rt.batch_depth
        });
        if depth == Some(0) && !std::thread::panicking() {
            Runtime::flush();
        }
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        with_state(|rt| rt.flushing = false);
    }
}
