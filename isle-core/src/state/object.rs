//! Reactive objects and arrays.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::cell::{Getter, PropCell};
use super::Value;
use crate::reactive::{batch, untrack, Signal};
use crate::scope;

/// Identity of a reactive object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Object,
    Array,
}

/// The raw content of a property, as written.
#[derive(Debug, Clone)]
pub enum Slot {
    Value(Value),
    Getter(Getter),
}

enum Prop {
    /// Written but never read. Promoted to a cell on first read.
    Raw(Slot),
    Cell(Arc<PropCell>),
}

pub(crate) struct ObjectInner {
    id: ObjectId,
    namespace: Option<String>,
    kind: ObjectKind,
    props: RwLock<IndexMap<String, Prop>>,
    /// Bumped whenever a key is added or removed.
    keys: Signal<u64>,
    /// Context objects fall through to the parent context.
    parent: Option<ObjectHandle>,
}

/// A shared handle to a reactive object or array.
///
/// Reads inside an effect or memo subscribe to the property read; writes
/// notify only the readers of the property written. Key additions and
/// removals notify readers that enumerated the keys or missed a key.
///
/// Arrays are objects keyed `"0"`, `"1"`, ... with a tracked `"length"`.
#[derive(Clone)]
pub struct ObjectHandle {
    inner: Arc<ObjectInner>,
}

impl ObjectHandle {
    /// An empty object owned by `namespace`.
    pub fn new(namespace: Option<&str>) -> Self {
        Self::build(namespace, ObjectKind::Object, None)
    }

    pub fn new_array(namespace: Option<&str>) -> Self {
        Self::build(namespace, ObjectKind::Array, None)
    }

    /// A context layer: own keys shadow `parent`, missing keys read through
    /// to it.
    pub fn with_parent(namespace: Option<&str>, parent: Option<ObjectHandle>) -> Self {
        Self::build(namespace, ObjectKind::Object, parent)
    }

    fn build(namespace: Option<&str>, kind: ObjectKind, parent: Option<ObjectHandle>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: ObjectId::new(),
                namespace: namespace.map(str::to_string),
                kind,
                props: RwLock::new(IndexMap::new()),
                keys: Signal::new(0),
                parent,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ObjectInner>) -> Self {
        Self { inner }
    }

    /// Build from JSON. Scalars produce an empty object.
    pub fn from_json(namespace: Option<&str>, json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Array(items) => {
                let array = Self::new_array(namespace);
                {
                    let mut props = array.inner.props.write();
                    for (index, item) in items.iter().enumerate() {
                        props.insert(
                            index.to_string(),
                            Prop::Raw(Slot::Value(Value::from_json(namespace, item))),
                        );
                    }
                }
                array
            }
            serde_json::Value::Object(map) => {
                let object = Self::new(namespace);
                {
                    let mut props = object.inner.props.write();
                    for (key, item) in map {
                        props.insert(
                            key.clone(),
                            Prop::Raw(Slot::Value(Value::from_json(namespace, item))),
                        );
                    }
                }
                object
            }
            _ => Self::new(namespace),
        }
    }

    /// An array holding `items`.
    pub fn array_from(namespace: Option<&str>, items: impl IntoIterator<Item = Value>) -> Self {
        let array = Self::new_array(namespace);
        {
            let mut props = array.inner.props.write();
            for (index, item) in items.into_iter().enumerate() {
                props.insert(index.to_string(), Prop::Raw(Slot::Value(item)));
            }
        }
        array
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn namespace(&self) -> Option<&str> {
        self.inner.namespace.as_deref()
    }

    pub fn kind(&self) -> ObjectKind {
        self.inner.kind
    }

    pub fn is_array(&self) -> bool {
        self.inner.kind == ObjectKind::Array
    }

    pub fn parent(&self) -> Option<&ObjectHandle> {
        self.inner.parent.as_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read `key`, tracking the read.
    ///
    /// Getters run inside the current scope. A key the object does not own
    /// reads through to the parent context, if any.
    pub fn get(&self, key: &str) -> Value {
        if self.is_array() && key == "length" {
            self.inner.keys.get();
            return Value::from(self.inner.props.read().len());
        }
        match self.cell(key) {
            Some(cell) => cell.read(scope::current_scope().as_ref()),
            None => {
                self.inner.keys.get();
                match &self.inner.parent {
                    Some(parent) => parent.get(key),
                    None => Value::Undefined,
                }
            }
        }
    }

    /// Read `key` without tracking.
    pub fn peek(&self, key: &str) -> Value {
        untrack(|| self.get(key))
    }

    /// Follow a dotted path, tracking every step.
    pub fn get_path(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Value::Undefined;
        };
        let mut current = self.get(first);
        for segment in segments {
            current = match &current {
                Value::Object(object) => object.get(segment),
                _ => return Value::Undefined,
            };
        }
        current
    }

    pub fn peek_path(&self, path: &str) -> Value {
        untrack(|| self.get_path(path))
    }

    /// The cell backing an own property, promoting a raw slot on first use.
    fn cell(&self, key: &str) -> Option<Arc<PropCell>> {
        if let Some(Prop::Cell(cell)) = self.inner.props.read().get(key) {
            return Some(cell.clone());
        }
        let mut props = self.inner.props.write();
        let prop = props.get_mut(key)?;
        let cell = match prop {
            Prop::Cell(cell) => cell.clone(),
            Prop::Raw(slot) => {
                let (value, getter) = match slot.clone() {
                    Slot::Value(value) => (value, None),
                    Slot::Getter(getter) => (Value::Undefined, Some(getter)),
                };
                let cell = PropCell::new(
                    Arc::downgrade(&self.inner),
                    self.inner.namespace.clone(),
                    value,
                    getter,
                );
                *prop = Prop::Cell(cell.clone());
                cell
            }
        };
        Some(cell)
    }

    /// Write an own property, replacing any getter.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.write_slot(key, Slot::Value(value.into()));
    }

    /// Install a getter on an own property.
    pub fn set_getter(&self, key: &str, getter: Getter) {
        self.write_slot(key, Slot::Getter(getter));
    }

    fn write_slot(&self, key: &str, slot: Slot) {
        batch(|| {
            let (cell, added) = {
                let mut props = self.inner.props.write();
                match props.get_mut(key) {
                    Some(Prop::Cell(cell)) => (Some(cell.clone()), false),
                    Some(Prop::Raw(raw)) => {
                        *raw = slot.clone();
                        (None, false)
                    }
                    None => {
                        props.insert(key.to_string(), Prop::Raw(slot.clone()));
                        (None, true)
                    }
                }
            };
            if let Some(cell) = cell {
                match slot {
                    Slot::Value(value) => cell.set_value(value),
                    Slot::Getter(getter) => cell.update(Value::Undefined, Some(getter)),
                }
            }
            if added {
                self.bump_keys();
            }
        });
    }

    /// Install a getter that takes effect at the next microtask, or on the
    /// next read. Properties never read take it immediately.
    pub(crate) fn install_pending_getter(&self, key: &str, getter: Getter) {
        let cell = match self.inner.props.read().get(key) {
            Some(Prop::Cell(cell)) => Some(cell.clone()),
            _ => None,
        };
        match cell {
            Some(cell) => cell.set_pending_getter(getter),
            None => self.set_getter(key, getter),
        }
    }

    /// Remove an own property. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        batch(|| {
            let removed = self.inner.props.write().shift_remove(key);
            match removed {
                Some(prop) => {
                    if let Prop::Cell(cell) = prop {
                        cell.set_value(Value::Undefined);
                    }
                    self.bump_keys();
                    true
                }
                None => false,
            }
        })
    }

    fn bump_keys(&self) {
        self.inner.keys.update(|n| *n = n.wrapping_add(1));
    }

    /// Whether `key` is an own or inherited property, tracking key changes.
    pub fn has(&self, key: &str) -> bool {
        self.inner.keys.get();
        self.has_own(key) || self.inner.parent.as_ref().is_some_and(|parent| parent.has(key))
    }

    /// Whether `key` is an own property. Not tracked.
    pub fn has_own(&self, key: &str) -> bool {
        self.inner.props.read().contains_key(key)
    }

    /// Own keys in insertion order, tracking key changes.
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys.get();
        self.inner.props.read().keys().cloned().collect()
    }

    /// Own keys followed by inherited keys not shadowed.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = self.keys();
        if let Some(parent) = &self.inner.parent {
            for key in parent.all_keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// The raw slot of an own property, without tracking or evaluating
    /// getters.
    pub fn own_slot(&self, key: &str) -> Option<Slot> {
        let props = self.inner.props.read();
        match props.get(key)? {
            Prop::Raw(slot) => Some(slot.clone()),
            Prop::Cell(cell) => Some(match cell.current_getter() {
                Some(getter) => Slot::Getter(getter),
                None => Slot::Value(cell.raw_value()),
            }),
        }
    }

    /// Array length, tracked. Zero for plain objects.
    pub fn len(&self) -> usize {
        self.inner.keys.get();
        if self.is_array() {
            self.inner.props.read().len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.keys.get();
        self.inner.props.read().is_empty()
    }

    /// Array items in order, tracking each read.
    pub fn items(&self) -> Vec<Value> {
        (0..self.len()).map(|index| self.get(&index.to_string())).collect()
    }

    pub fn push(&self, value: impl Into<Value>) {
        let index = self.inner.props.read().len();
        self.set(&index.to_string(), value);
    }

    pub fn pop(&self) -> Option<Value> {
        let len = self.inner.props.read().len();
        let last = (len.checked_sub(1)?).to_string();
        let value = self.peek(&last);
        self.delete(&last);
        Some(value)
    }

    /// Remove the item at `index`, shifting later items down.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = untrack(|| self.items());
        if index >= items.len() {
            return None;
        }
        let removed = items.remove(index);
        self.replace_items(items);
        Some(removed)
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let mut items = untrack(|| self.items());
        items.insert(index.min(items.len()), value.into());
        self.replace_items(items);
    }

    /// Rewrite the array in one batch. Each index keeps its cell, so readers
    /// of an index are notified only when the item there changed.
    pub fn replace_items(&self, items: Vec<Value>) {
        batch(|| {
            let old_len = self.inner.props.read().len();
            let new_len = items.len();
            for (index, item) in items.into_iter().enumerate() {
                self.set(&index.to_string(), item);
            }
            for index in (new_len..old_len).rev() {
                self.delete(&index.to_string());
            }
        });
    }

    /// Snapshot as JSON without tracking. Getters are evaluated.
    pub fn to_json(&self) -> serde_json::Value {
        untrack(|| {
            if self.is_array() {
                serde_json::Value::Array(self.items().iter().map(Value::to_json).collect())
            } else {
                let keys: Vec<String> = self.inner.props.read().keys().cloned().collect();
                serde_json::Value::Object(
                    keys.into_iter()
                        .map(|key| {
                            let value = self.get(&key).to_json();
                            (key, value)
                        })
                        .collect(),
                )
            }
        })
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.inner.props.read().keys().cloned().collect();
        f.debug_struct(if self.is_array() { "Array" } else { "Object" })
            .field("id", &self.inner.id.0)
            .field("namespace", &self.inner.namespace)
            .field("keys", &keys)
            .finish()
    }
}
