//! Events and event targets.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::Node;
use crate::diagnostics;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registration {
    id: ListenerId,
    event_type: String,
    callback: Listener,
}

/// Anything listeners can be attached to: a node, the document or the
/// window.
#[derive(Clone, Default)]
pub struct EventTarget {
    listeners: Arc<RwLock<Vec<Registration>>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, event_type: impl Into<String>, callback: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.write().push(Registration {
            id,
            event_type: event_type.into(),
            callback,
        });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|registration| registration.event_type == event_type)
            .count()
    }

    /// Call the listeners registered for the event's type.
    pub(crate) fn invoke(&self, event: &Event) {
        let callbacks: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|registration| registration.event_type == event.event_type())
            .map(|registration| registration.callback.clone())
            .collect();
        for callback in callbacks {
            callback(event);
            if event.immediate_propagation_stopped() {
                break;
            }
        }
    }

    /// Dispatch directly on this target, without bubbling.
    pub fn dispatch(&self, event: &Event) {
        self.invoke(event);
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.listeners, &other.listeners)
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

/// A dispatched event.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

struct EventInner {
    event_type: String,
    detail: serde_json::Value,
    target: RwLock<Option<Node>>,
    current_target: RwLock<Option<Node>>,
    default_prevented: AtomicBool,
    propagation_stopped: AtomicBool,
    immediate_propagation_stopped: AtomicBool,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::with_detail(event_type, serde_json::Value::Null)
    }

    pub fn with_detail(event_type: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            inner: Arc::new(EventInner {
                event_type: event_type.into(),
                detail,
                target: RwLock::new(None),
                current_target: RwLock::new(None),
                default_prevented: AtomicBool::new(false),
                propagation_stopped: AtomicBool::new(false),
                immediate_propagation_stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.inner.event_type
    }

    pub fn detail(&self) -> &serde_json::Value {
        &self.inner.detail
    }

    pub fn target(&self) -> Option<Node> {
        self.inner.target.read().clone()
    }

    pub fn current_target(&self) -> Option<Node> {
        self.inner.current_target.read().clone()
    }

    pub(crate) fn set_target(&self, node: &Node) {
        *self.inner.target.write() = Some(node.clone());
    }

    pub(crate) fn set_current_target(&self, node: Option<&Node>) {
        *self.inner.current_target.write() = node.cloned();
    }

    pub fn prevent_default(&self) {
        self.inner.default_prevented.store(true, Ordering::SeqCst);
    }

    pub fn default_prevented(&self) -> bool {
        self.inner.default_prevented.load(Ordering::SeqCst)
    }

    pub fn stop_propagation(&self) {
        self.inner.propagation_stopped.store(true, Ordering::SeqCst);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.inner.propagation_stopped.load(Ordering::SeqCst)
    }

    pub fn stop_immediate_propagation(&self) {
        self.inner
            .immediate_propagation_stopped
            .store(true, Ordering::SeqCst);
        self.stop_propagation();
    }

    pub fn immediate_propagation_stopped(&self) -> bool {
        self.inner.immediate_propagation_stopped.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.inner.event_type)
            .field("default_prevented", &self.default_prevented())
            .finish()
    }
}

/// The event as seen by an action.
///
/// Actions that did not opt into synchronous event access may run after
/// the dispatch has finished, when `current_target`, `prevent_default` and
/// `stop_propagation` no longer mean anything. Touching them warns.
#[derive(Debug, Clone)]
pub struct EventArg {
    event: Event,
    synchronous: bool,
}

impl EventArg {
    pub fn new(event: Event, synchronous: bool) -> Self {
        Self { event, synchronous }
    }

    pub fn event_type(&self) -> &str {
        self.event.event_type()
    }

    pub fn detail(&self) -> &serde_json::Value {
        self.event.detail()
    }

    pub fn target(&self) -> Option<Node> {
        self.event.target()
    }

    pub fn current_target(&self) -> Option<Node> {
        self.warn_unless_sync("currentTarget");
        self.event.current_target()
    }

    pub fn prevent_default(&self) {
        self.warn_unless_sync("preventDefault");
        self.event.prevent_default();
    }

    pub fn stop_propagation(&self) {
        self.warn_unless_sync("stopPropagation");
        self.event.stop_propagation();
    }

    pub fn stop_immediate_propagation(&self) {
        self.warn_unless_sync("stopImmediatePropagation");
        self.event.stop_immediate_propagation();
    }

    /// The wrapped event, without the access checks.
    pub fn raw(&self) -> &Event {
        &self.event
    }

    fn warn_unless_sync(&self, property: &str) {
        if !self.synchronous {
            diagnostics::warn(format!(
                "Accessing the synchronous event.{property} in an action without \
                 `with_sync_event` is deprecated. Wrap the action with `with_sync_event`."
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::capture::capture;

    #[test]
    fn listeners_are_removed_by_id() {
        let target = EventTarget::new();
        let id = target.add_listener("click", Arc::new(|_: &Event| {}));
        target.add_listener("keydown", Arc::new(|_: &Event| {}));

        assert_eq!(target.listener_count("click"), 1);
        assert!(target.remove_listener(id));
        assert!(!target.remove_listener(id));
        assert_eq!(target.listener_count("click"), 0);
        assert_eq!(target.listener_count("keydown"), 1);
    }

    #[test]
    fn stop_immediate_skips_remaining_listeners() {
        let target = EventTarget::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h1 = hits.clone();
        let h2 = hits.clone();
        target.add_listener(
            "click",
            Arc::new(move |event: &Event| {
                h1.fetch_add(1, Ordering::SeqCst);
                event.stop_immediate_propagation();
            }),
        );
        target.add_listener(
            "click",
            Arc::new(move |_: &Event| {
                h2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        target.dispatch(&Event::new("click"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn async_event_access_warns() {
        diagnostics::set_debug(true);
        let (_, captured) = capture(|| {
            let arg = EventArg::new(Event::new("submit"), false);
            arg.prevent_default();
            assert!(arg.raw().default_prevented());

            let sync = EventArg::new(Event::new("submit"), true);
            sync.stop_propagation();
        });
        let warnings = captured.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("event.preventDefault"));
    }
}
