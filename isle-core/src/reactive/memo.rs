//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. While clean, further accesses return the cached value.
//!
//! 3. When a dependency changes, the runtime marks the memo dirty. Nothing is
//!    recomputed yet.
//!
//! 4. The next access recomputes, re-tracking dependencies from scratch.
//!
//! Memos are how reactive cells expose a getter-backed property: each scope
//! that reads the property gets its own memo, so a getter that reads
//! `context` is evaluated once per element and re-evaluated only when
//! something it read changes.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use crate::graph::NodeId;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// The memo needs to recompute before its value can be used.
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T> {
    id: NodeId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    state: RwLock<MemoState>,
    _handle: Mutex<Option<ReactiveHandle>>,
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn mark_dirty(&self) {
        *self.state.write() = MemoState::Dirty;
    }

    fn schedule(&self) {}

    fn is_eager(&self) -> bool {
        false
    }
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            id: NodeId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            state: RwLock::new(MemoState::Dirty),
            _handle: Mutex::new(None),
        });
        let as_reactive: Arc<dyn Reactive> = inner.clone();
        *inner._handle.lock() = Some(Runtime::register(&as_reactive));
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.id);

        if self.state() == MemoState::Clean {
            if let Some(value) = self.inner.value.read().clone() {
                return value;
            }
        }
        self.recompute()
    }

    /// Force a recomputation on the next access.
    pub fn mark_dirty(&self) {
        self.inner.mark_dirty();
    }

    fn recompute(&self) -> T {
        Runtime::clear_dependencies(self.inner.id);

        let new_value = {
            let _ctx = ReactiveContext::enter(self.inner.id);
            (self.inner.compute)()
        };

        *self.inner.value.write() = Some(new_value.clone());
        *self.inner.state.write() = MemoState::Clean;
        new_value
    }

    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Number of computations reading this memo.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id)
    }

    /// Number of values this memo read during its last computation.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }

    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Whether two handles refer to the same memo.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn memo_computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert!(!memo.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(memo.has_value());
    }

    #[test]
    fn memo_caches_until_dependency_changes() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let source = Signal::new(2);
        let source_clone = source.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            source_clone.get() * 10
        });

        assert_eq!(memo.get(), 20);
        assert_eq!(memo.get(), 20);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(memo.dependency_count(), 1);

        source.set(3);
        assert_eq!(memo.state(), MemoState::Dirty);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        assert_eq!(memo.get(), 30);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn memo_drops_stale_dependencies() {
        let use_a = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);
        let (use_a_c, a_c, b_c) = (use_a.clone(), a.clone(), b.clone());

        let memo = Memo::new(move || if use_a_c.get() { a_c.get() } else { b_c.get() });

        assert_eq!(memo.get(), 1);
        assert_eq!(a.subscriber_count(), 1);

        use_a.set(false);
        assert_eq!(memo.get(), 2);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| 42);
        assert_eq!(memo1.get(), 42);

        let memo2 = memo1.clone();
        assert!(memo1.ptr_eq(&memo2));
        assert!(memo2.has_value());

        memo1.mark_dirty();
        assert_eq!(memo2.state(), MemoState::Dirty);
    }
}
