//! Evaluation scopes and the ambient namespace.
//!
//! Every element with directives gets a [`Scope`]: the per-namespace context
//! objects visible to it, the server context, and a reference to the
//! element. While a directive callback runs, its scope and the namespace of
//! the store it came from sit on a thread-local frame stack, which is what
//! [`get_context`], [`get_server_context`] and [`get_element`] read.
//!
//! Async actions lose the stack across `.await`. [`ScopedFuture`] restores
//! it on every poll, and [`with_scope`] does the same for plain callbacks
//! handed to the host.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use indexmap::IndexMap;

use crate::dom::Node;
use crate::error::{Error, Result};
use crate::reactive::{batch, Signal};
use crate::state::{ObjectHandle, PropCell};

/// Identity of a scope, used to key per-scope getter caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a directive callback can see.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

#[derive(Clone, Default)]
struct ScopeInner {
    id: ScopeId,
    context: IndexMap<String, ObjectHandle>,
    server_context: IndexMap<String, ObjectHandle>,
    element: Option<Node>,
    attributes: IndexMap<String, String>,
    navigation: Option<Signal<u64>>,
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// A root scope with no context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner::default()),
        }
    }

    /// A root scope whose server accessors re-run readers on navigation.
    pub fn with_navigation(navigation: Signal<u64>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                navigation: Some(navigation),
                ..ScopeInner::default()
            }),
        }
    }

    fn derive(&self, f: impl FnOnce(&mut ScopeInner)) -> Self {
        let mut inner = (*self.inner).clone();
        inner.id = ScopeId::new();
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// A child scope for `element`, inheriting this scope's contexts.
    pub fn for_element(&self, element: Node, attributes: IndexMap<String, String>) -> Self {
        self.derive(|inner| {
            inner.element = Some(element);
            inner.attributes = attributes;
        })
    }

    /// A copy with the client context for `namespace` replaced.
    pub fn with_context(&self, namespace: &str, context: ObjectHandle) -> Self {
        self.derive(|inner| {
            inner.context.insert(namespace.to_string(), context);
        })
    }

    /// A copy with the client and server contexts for `namespace` replaced.
    pub fn with_contexts(
        &self,
        namespace: &str,
        context: ObjectHandle,
        server_context: ObjectHandle,
    ) -> Self {
        self.derive(|inner| {
            inner.context.insert(namespace.to_string(), context);
            inner.server_context.insert(namespace.to_string(), server_context);
        })
    }

    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    pub fn context(&self, namespace: &str) -> Option<ObjectHandle> {
        self.inner.context.get(namespace).cloned()
    }

    pub fn contexts(&self) -> &IndexMap<String, ObjectHandle> {
        &self.inner.context
    }

    pub fn server_context(&self, namespace: &str) -> Option<ObjectHandle> {
        self.inner.server_context.get(namespace).cloned()
    }

    pub fn element(&self) -> Option<&Node> {
        self.inner.element.as_ref()
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.inner.attributes
    }

    pub fn navigation(&self) -> Option<&Signal<u64>> {
        self.inner.navigation.as_ref()
    }

    pub(crate) fn track_cell(&self, cell: Weak<PropCell>) {
        CACHES.with(|caches| {
            caches.borrow_mut().entry(self.inner.id).or_default().push(cell);
        });
    }

    /// Release the getter caches held for this scope.
    pub fn dispose(&self) {
        let cells = CACHES.with(|caches| caches.borrow_mut().remove(&self.inner.id));
        for cell in cells.into_iter().flatten() {
            if let Some(cell) = cell.upgrade() {
                cell.release_scope(self.inner.id);
            }
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("context", &self.inner.context.keys().collect::<Vec<_>>())
            .field("element", &self.inner.element.as_ref().map(Node::tag_name))
            .finish()
    }
}

/// One entry of the ambient stack.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub namespace: Option<String>,
    pub scope: Option<Scope>,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static CACHES: RefCell<HashMap<ScopeId, Vec<Weak<PropCell>>>> = RefCell::new(HashMap::new());
}

/// Pops its frame when dropped.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard {
    depth: usize,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            debug_assert_eq!(frames.len(), self.depth, "scope frames popped out of order");
            frames.pop();
        });
    }
}

/// Push a frame for `namespace` and `scope`.
pub fn enter(namespace: Option<String>, scope: Option<Scope>) -> FrameGuard {
    enter_frame(Frame { namespace, scope })
}

pub fn enter_frame(frame: Frame) -> FrameGuard {
    let depth = FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        frames.push(frame);
        frames.len()
    });
    FrameGuard { depth }
}

/// The innermost frame, or an empty one.
pub fn current_frame() -> Frame {
    FRAMES.with(|frames| frames.borrow().last().cloned().unwrap_or_default())
}

pub fn current_scope() -> Option<Scope> {
    FRAMES.with(|frames| frames.borrow().last().and_then(|frame| frame.scope.clone()))
}

pub fn current_namespace() -> Option<String> {
    FRAMES.with(|frames| frames.borrow().last().and_then(|frame| frame.namespace.clone()))
}

fn resolve_namespace(namespace: Option<&str>, method: &'static str) -> Result<String> {
    match namespace {
        Some(namespace) => Ok(namespace.to_string()),
        None => current_namespace().ok_or(Error::NoNamespace { method }),
    }
}

/// The context of `namespace` (default: the current one) in the current
/// scope.
pub fn get_context(namespace: Option<&str>) -> Result<ObjectHandle> {
    let scope = current_scope().ok_or(Error::NoScope {
        method: "get_context",
    })?;
    let namespace = resolve_namespace(namespace, "get_context")?;
    scope
        .context(&namespace)
        .ok_or(Error::MissingContext { namespace })
}

/// The context the server rendered for `namespace`. Re-read after client
/// navigation replaces server data.
pub fn get_server_context(namespace: Option<&str>) -> Result<ObjectHandle> {
    let scope = current_scope().ok_or(Error::NoScope {
        method: "get_server_context",
    })?;
    let namespace = resolve_namespace(namespace, "get_server_context")?;
    if let Some(navigation) = scope.navigation() {
        navigation.get();
    }
    Ok(scope
        .server_context(&namespace)
        .unwrap_or_else(|| ObjectHandle::new(Some(&namespace))))
}

/// The element a directive callback runs for.
#[derive(Debug, Clone)]
pub struct ElementRef {
    pub node: Option<Node>,
    pub attributes: IndexMap<String, String>,
}

pub fn get_element() -> Result<ElementRef> {
    let scope = current_scope().ok_or(Error::NoScope {
        method: "get_element",
    })?;
    Ok(ElementRef {
        node: scope.element().cloned(),
        attributes: scope.attributes().clone(),
    })
}

/// Capture the current frame and return a callback that runs `f` inside it.
pub fn with_scope<A, R>(f: impl Fn(A) -> R) -> impl Fn(A) -> R {
    let frame = current_frame();
    move |arg| {
        let _frame = enter_frame(frame.clone());
        f(arg)
    }
}

/// A future that runs every poll inside a captured frame. The writes of
/// one poll land as one batch.
pub struct ScopedFuture<F> {
    frame: Frame,
    future: F,
}

impl<F> ScopedFuture<F>
where
    F: Future + Unpin,
{
    pub fn new(frame: Frame, future: F) -> Self {
        Self { frame, future }
    }
}

impl<F> Future for ScopedFuture<F>
where
    F: Future + Unpin,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _frame = enter_frame(this.frame.clone());
        batch(|| Pin::new(&mut this.future).poll(cx))
    }
}

/// Wrap `future` so it runs inside the current frame.
pub fn scoped<F>(future: F) -> ScopedFuture<Pin<Box<F>>>
where
    F: Future,
{
    ScopedFuture::new(current_frame(), Box::pin(future))
}
