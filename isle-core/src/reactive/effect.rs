//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. `Effect::new` runs the function immediately to establish initial
//!    dependencies. `Effect::new_lazy` waits for an explicit `execute`.
//!
//! 2. When any dependency changes, the runtime schedules the effect.
//!
//! 3. Before re-running, the effect clears its old dependencies and tracks
//!    new ones during execution.
//!
//! # Notifiers
//!
//! An effect built with `Effect::with_notify` does not re-run when a
//! dependency changes. Its notifier is called instead and decides when to
//! call `execute`. Watch callbacks use this to defer their flush to the next
//! frame.
//!
//! # Reentrancy
//!
//! An effect that is already running ignores further `execute` calls until
//! it finishes, so its own writes cannot re-enter it mid-flight. Writes made
//! during a run are batched and picked up once the run is over.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use crate::graph::NodeId;

type Notify = Box<dyn Fn(&Effect) + Send + Sync>;

/// A side-effecting computation that runs when dependencies change.
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let effect = Effect::new(move || println!("Count is: {}", count.get()));
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    id: NodeId,
    run: Box<dyn Fn() + Send + Sync>,
    notify: Option<Notify>,
    this: Weak<EffectInner>,
    disposed: AtomicBool,
    running: AtomicBool,
    run_count: AtomicUsize,
    _handle: Mutex<Option<ReactiveHandle>>,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) || self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        // Writes made by the run are queued and flushed once it has finished.
        Runtime::batch(|| {
            let _running = RunningGuard(&self.running);
            Runtime::clear_dependencies(self.id);
            {
                let _ctx = ReactiveContext::enter(self.id);
                (self.run)();
            }
            self.run_count.fetch_add(1, Ordering::SeqCst);
        });
    }
}

impl Reactive for EffectInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn mark_dirty(&self) {}

    fn schedule(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        match (&self.notify, self.this.upgrade()) {
            (Some(notify), Some(inner)) => notify(&Effect { inner }),
            _ => self.execute(),
        }
    }

    fn is_eager(&self) -> bool {
        true
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Effect {
    /// Create a new effect and run it immediately.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Box::new(run), None)
    }

    /// Create an effect whose re-runs are delegated to `notify`.
    ///
    /// The effect does not run on creation.
    pub fn with_notify<F, N>(run: F, notify: N) -> Self
    where
        F: Fn() + Send + Sync + 'static,
        N: Fn(&Effect) + Send + Sync + 'static,
    {
        Self::build(Box::new(run), Some(Box::new(notify)))
    }

    fn build(run: Box<dyn Fn() + Send + Sync>, notify: Option<Notify>) -> Self {
        let inner = Arc::new_cyclic(|this| EffectInner {
            id: NodeId::new(),
            run,
            notify,
            this: this.clone(),
            disposed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            _handle: Mutex::new(None),
        });
        let as_reactive: Arc<dyn Reactive> = inner.clone();
        *inner._handle.lock() = Some(Runtime::register(&as_reactive));
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the effect function, tracking its dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Hand the effect to the runtime's scheduling path, as a dependency
    /// change would.
    pub fn schedule(&self) {
        self.inner.schedule();
    }

    /// Stop the effect. It will not run again and holds no dependencies.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        Runtime::clear_dependencies(self.inner.id);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
