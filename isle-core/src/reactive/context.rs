//! Reactive Context
//!
//! The reactive context tracks which computation is currently running, so
//! that a read can register the running computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running a memo or effect pushes its node ID;
//! the guard pops it on drop, including during unwinding. An "untracked"
//! entry masks the computations below it, so reads performed while it is on
//! top create no edges.

use std::cell::RefCell;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone)]
struct ContextEntry {
    /// `None` for an untracked section.
    subscriber: Option<NodeId>,
    /// Node IDs read while this entry was on top.
    dependencies: Vec<NodeId>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    pub fn enter(subscriber: NodeId) -> Self {
        Self::push(Some(subscriber))
    }

    /// Enter a section in which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber,
                dependencies: Vec::new(),
            });
        });
        Self { subscriber }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber))
    }

    /// Record a read of `source` in the current context.
    ///
    /// Returns the subscriber the read was attributed to.
    pub fn track_dependency(source: NodeId) -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let subscriber = entry.subscriber?;
            entry.dependencies.push(source);
            Some(subscriber)
        })
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber, self.subscriber,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber, entry.subscriber
                );
            }
        });
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
