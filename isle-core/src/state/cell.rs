//! Per-property reactive cells.
//!
//! Every property of a reactive object that has been read is backed by a
//! [`PropCell`]: a value signal, a getter signal, and one memo per scope
//! that reads it. Plain values flow through the memo unchanged; getters are
//! evaluated inside the reading scope, so a getter that calls
//! `get_context()` sees the context of whichever element asked.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::object::{ObjectHandle, ObjectInner};
use super::Value;
use crate::reactive::{batch, untrack, Memo, Signal};
use crate::scope::{self, Scope, ScopeId};
use crate::task;

/// A derived property. Called with the object that owns it.
#[derive(Clone)]
pub struct Getter(Arc<dyn Fn(&ObjectHandle) -> Value + Send + Sync>);

impl Getter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ObjectHandle) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, owner: &ObjectHandle) -> Value {
        (self.0)(owner)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Getter {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Getter")
    }
}

pub(crate) struct PropCell {
    owner: Weak<ObjectInner>,
    namespace: Option<String>,
    value: Signal<Value>,
    getter: Signal<Option<Getter>>,
    pending_getter: Mutex<Option<Getter>>,
    computeds: Mutex<HashMap<Option<ScopeId>, Memo<Value>>>,
}

impl PropCell {
    pub(crate) fn new(
        owner: Weak<ObjectInner>,
        namespace: Option<String>,
        value: Value,
        getter: Option<Getter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            owner,
            namespace,
            value: Signal::new(value),
            getter: Signal::new(getter),
            pending_getter: Mutex::new(None),
            computeds: Mutex::new(HashMap::new()),
        })
    }

    /// Read through the memo of `scope`, tracking the read.
    pub(crate) fn read(self: &Arc<Self>, scope: Option<&Scope>) -> Value {
        self.computed(scope).get()
    }

    fn computed(self: &Arc<Self>, scope: Option<&Scope>) -> Memo<Value> {
        self.consolidate_pending();
        let key = scope.map(Scope::id);
        if let Some(memo) = self.computeds.lock().get(&key) {
            return memo.clone();
        }

        let value = self.value.clone();
        let getter = self.getter.clone();
        let owner = self.owner.clone();
        let namespace = self.namespace.clone();
        let memo_scope = scope.cloned();
        let memo = Memo::new(move || match getter.get() {
            Some(getter) => {
                let Some(owner) = owner.upgrade() else {
                    return Value::Undefined;
                };
                let _frame = scope::enter(namespace.clone(), memo_scope.clone());
                getter.call(&ObjectHandle::from_inner(owner))
            }
            None => value.get(),
        });

        self.computeds.lock().insert(key, memo.clone());
        if let Some(scope) = scope {
            scope.track_cell(Arc::downgrade(self));
        }
        memo
    }

    /// Replace the value and getter, notifying only what changed.
    pub(crate) fn update(&self, value: Value, getter: Option<Getter>) {
        batch(|| {
            self.value.set_if_changed(value);
            self.getter.set_if_changed(getter);
        });
    }

    pub(crate) fn set_value(&self, value: Value) {
        *self.pending_getter.lock() = None;
        self.update(value, None);
    }

    /// Install `getter` at the next microtask, or on the next read if that
    /// comes first.
    pub(crate) fn set_pending_getter(self: &Arc<Self>, getter: Getter) {
        *self.pending_getter.lock() = Some(getter);
        let cell = Arc::downgrade(self);
        task::queue_microtask(move || {
            if let Some(cell) = cell.upgrade() {
                cell.consolidate_pending();
            }
        });
    }

    fn consolidate_pending(&self) {
        let pending = self.pending_getter.lock().take();
        if let Some(getter) = pending {
            self.update(Value::Undefined, Some(getter));
        }
    }

    /// Current value without tracking or evaluating getters.
    pub(crate) fn raw_value(&self) -> Value {
        self.value.get_untracked()
    }

    /// Getter in effect, including one still pending.
    pub(crate) fn current_getter(&self) -> Option<Getter> {
        let pending = self.pending_getter.lock().clone();
        pending.or_else(|| self.getter.get_untracked())
    }

    /// Read without tracking, under the current scope.
    pub(crate) fn peek(self: &Arc<Self>) -> Value {
        let scope = scope::current_scope();
        untrack(|| self.read(scope.as_ref()))
    }

    /// Drop the memo cached for `scope`.
    pub(crate) fn release_scope(&self, scope: ScopeId) {
        self.computeds.lock().remove(&Some(scope));
    }

    #[cfg(test)]
    pub(crate) fn cached_scopes(&self) -> usize {
        self.computeds.lock().len()
    }
}
