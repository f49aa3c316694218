//! Element instances and the render loop.
//!
//! Every element that carries directives becomes an [`Instance`]. An
//! instance owns a render effect: each run clones the element's base
//! snapshot, lets the directive handlers modify it, and commits the result
//! through the [`Reconciler`](crate::reconcile::Reconciler). Reads made by
//! the handlers are tracked by that effect, so a state change re-renders
//! exactly the elements that read it.
//!
//! Children are hydrated after the first commit, in the scope the handlers
//! left behind. Work registered with `on_mount` runs once the outermost
//! render in progress has finished, so it sees the whole subtree in place.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::diagnostics;
use crate::directive::{DirectiveContext, DirectiveRegistry, Slots};
use crate::dom::{Document, Node};
use crate::reactive::{untrack, Effect};
use crate::reconcile::Reconciler;
use crate::scope::Scope;
use crate::store::StoreRegistry;
use crate::vdom::{VElement, VNode};

/// Work to run when an element is unmounted.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Services shared by every instance of one runtime.
pub(crate) struct Renderer {
    pub(crate) stores: Arc<StoreRegistry>,
    pub(crate) directives: Arc<DirectiveRegistry>,
    pub(crate) reconciler: Arc<dyn Reconciler>,
    pub(crate) document: Document,
    pub(crate) config: RuntimeConfig,
}

type MountTask = Box<dyn FnOnce()>;

thread_local! {
    static MOUNTS: RefCell<VecDeque<MountTask>> = RefCell::new(VecDeque::new());
    static MOUNT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct MountGuard;

impl Drop for MountGuard {
    fn drop(&mut self) {
        let depth = MOUNT_DEPTH.with(|depth| {
            let next = depth.get() - 1;
            depth.set(next);
            next
        });
        if depth == 0 {
            flush_mounts();
        }
    }
}

/// Run `f`; mount work queued inside runs when the outermost call returns.
pub(crate) fn mount_batch<R>(f: impl FnOnce() -> R) -> R {
    MOUNT_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let _guard = MountGuard;
    f()
}

fn flush_mounts() {
    loop {
        let next = MOUNTS.with(|queue| queue.borrow_mut().pop_front());
        match next {
            Some(task) => untrack(task),
            None => return,
        }
    }
}

/// Hydrate `vnodes` in `scope`, returning the instances created for
/// elements with directives.
pub(crate) fn hydrate_nodes(renderer: &Arc<Renderer>, vnodes: &[VNode], scope: &Scope) -> Vec<Instance> {
    let mut instances = Vec::new();
    mount_batch(|| {
        for vnode in vnodes {
            collect(renderer, vnode, scope, &mut instances);
        }
    });
    instances
}

fn collect(renderer: &Arc<Renderer>, vnode: &VNode, scope: &Scope, out: &mut Vec<Instance>) {
    let VNode::Element(element) = vnode else {
        return;
    };
    if element.has_directives() {
        out.extend(Instance::mount(renderer, element, scope));
    } else if element.inner_html.is_none() {
        for child in &element.children {
            collect(renderer, child, scope, out);
        }
    }
}

/// A rendered element with directives.
#[derive(Clone)]
pub(crate) struct Instance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    renderer: Arc<Renderer>,
    base: VElement,
    node: Node,
    scope: Scope,
    committed: Mutex<Option<VElement>>,
    slots: Mutex<Slots>,
    cleanups: Mutex<Vec<Cleanup>>,
    children: Mutex<Vec<Instance>>,
    effect: Mutex<Option<Effect>>,
    rendered: AtomicBool,
    unmounted: AtomicBool,
}

impl Instance {
    /// Create the instance for `base` and run its first render.
    ///
    /// Returns `None` when the element has no live node or removed itself
    /// during the first render.
    pub(crate) fn mount(renderer: &Arc<Renderer>, base: &VElement, parent_scope: &Scope) -> Option<Instance> {
        let node = base.node.clone()?;
        let scope = parent_scope.for_element(node.clone(), base.props.clone());
        let instance = Instance {
            inner: Arc::new(InstanceInner {
                renderer: renderer.clone(),
                base: base.clone(),
                node,
                scope,
                committed: Mutex::new(None),
                slots: Mutex::new(Slots::new()),
                cleanups: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
                effect: Mutex::new(None),
                rendered: AtomicBool::new(false),
                unmounted: AtomicBool::new(false),
            }),
        };

        let weak = Arc::downgrade(&instance.inner);
        mount_batch(|| {
            let effect = Effect::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Instance { inner }.render();
                }
            });
            if instance.is_unmounted() {
                effect.dispose();
            } else {
                *instance.inner.effect.lock() = Some(effect);
            }
        });
        (!instance.is_unmounted()).then_some(instance)
    }

    pub(crate) fn base(&self) -> &VElement {
        &self.inner.base
    }

    pub(crate) fn node(&self) -> &Node {
        &self.inner.node
    }

    pub(crate) fn renderer(&self) -> &Arc<Renderer> {
        &self.inner.renderer
    }

    pub(crate) fn is_unmounted(&self) -> bool {
        self.inner.unmounted.load(Ordering::SeqCst)
    }

    /// The snapshot committed by the last render.
    pub(crate) fn committed(&self) -> Option<VElement> {
        self.inner.committed.lock().clone()
    }

    pub(crate) fn children(&self) -> Vec<Instance> {
        self.inner.children.lock().clone()
    }

    pub(crate) fn slot<T>(&self, key: &str, init: impl FnOnce() -> T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        let existing = self
            .inner
            .slots
            .lock()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned());
        if let Some(value) = existing {
            return value;
        }
        // `init` may itself use slots; the lock is not held while it runs.
        let value = init();
        let mut slots = self.inner.slots.lock();
        let stored = slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(value.clone()) as Arc<dyn Any + Send + Sync>);
        stored.downcast_ref::<T>().cloned().unwrap_or(value)
    }

    pub(crate) fn on_mount(&self, f: impl FnOnce() -> Option<Cleanup> + 'static) {
        let weak = Arc::downgrade(&self.inner);
        MOUNTS.with(|queue| {
            queue.borrow_mut().push_back(Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.unmounted.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(cleanup) = f() {
                    inner.cleanups.lock().push(cleanup);
                }
            }))
        });
    }

    pub(crate) fn add_cleanup(&self, cleanup: Cleanup) {
        if self.is_unmounted() {
            cleanup();
        } else {
            self.inner.cleanups.lock().push(cleanup);
        }
    }

    fn render(&self) {
        let inner = &self.inner;
        if inner.unmounted.load(Ordering::SeqCst) {
            return;
        }
        mount_batch(|| {
            let first = !inner.rendered.swap(true, Ordering::SeqCst);
            let mut next = inner.base.clone();
            let (scope, removed) = {
                let mut ctx = DirectiveContext::new(self, &mut next, inner.scope.clone(), first);
                for (name, handler) in inner.renderer.directives.ordered(&inner.base.directives) {
                    if let Err(error) = handler(&mut ctx) {
                        tracing::debug!(directive = %name, %error, "directive handler failed");
                        diagnostics::report(&error);
                    }
                    if ctx.is_removed() {
                        break;
                    }
                }
                (ctx.scope().clone(), ctx.is_removed())
            };

            if removed {
                self.unmount();
                inner.node.remove();
                return;
            }

            let previous = inner
                .committed
                .lock()
                .take()
                .unwrap_or_else(|| inner.base.clone());
            let stats = inner.renderer.reconciler.commit(&inner.node, &previous, &mut next);
            if stats.mutations() > 0 {
                tracing::trace!(tag = %next.tag, mutations = stats.mutations(), "element committed");
            }
            let children = (first && next.inner_html.is_none()).then(|| next.children.clone());
            *inner.committed.lock() = Some(next);

            if let Some(children) = children {
                let instances = untrack(|| hydrate_nodes(&inner.renderer, &children, &scope));
                inner.children.lock().extend(instances);
            }
        });
    }

    /// Stop rendering, unmount the subtree and run cleanups, last
    /// registered first.
    pub(crate) fn unmount(&self) {
        let inner = &self.inner;
        if inner.unmounted.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(effect) = inner.effect.lock().take() {
            effect.dispose();
        }
        let children = std::mem::take(&mut *inner.children.lock());
        for child in children {
            child.unmount();
        }
        let cleanups = std::mem::take(&mut *inner.cleanups.lock());
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        inner.slots.lock().clear();
        inner.scope.dispose();
    }
}
