//! Deep merge into reactive objects.

use indexmap::IndexMap;

use super::cell::Getter;
use super::object::{ObjectHandle, Slot};
use super::Value;
use crate::reactive::batch;

/// Something that can be merged into a reactive object.
#[derive(Debug, Clone)]
pub enum Source {
    /// JSON data. Objects merge key by key, everything else is a leaf.
    Json(serde_json::Value),
    /// A leaf value: scalars, functions and existing handles are assigned
    /// as they are.
    Value(Value),
    Getter(Getter),
    /// A nested plain object.
    Object(IndexMap<String, Source>),
}

impl Source {
    /// An object source from `(key, source)` pairs.
    pub fn object<K, S>(entries: impl IntoIterator<Item = (K, S)>) -> Self
    where
        K: Into<String>,
        S: Into<Source>,
    {
        Source::Object(
            entries
                .into_iter()
                .map(|(key, source)| (key.into(), source.into()))
                .collect(),
        )
    }

    /// Entries of an object source. `None` for leaves.
    pub fn entries(&self) -> Option<IndexMap<String, Source>> {
        match self {
            Source::Object(entries) => Some(entries.clone()),
            Source::Json(serde_json::Value::Object(map)) => Some(
                map.iter()
                    .map(|(key, value)| (key.clone(), Source::Json(value.clone())))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Source {
    fn from(value: serde_json::Value) -> Self {
        Source::Json(value)
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        Source::Value(value)
    }
}

impl From<Getter> for Source {
    fn from(getter: Getter) -> Self {
        Source::Getter(getter)
    }
}

impl From<super::Function> for Source {
    fn from(function: super::Function) -> Self {
        Source::Value(Value::Function(function))
    }
}

/// Merge `source` into `target`.
///
/// Plain objects merge recursively. Other values are assigned when the key
/// is new, when `overwrite` is set, or when the existing value is the
/// pending marker. Arrays are replaced whole. Getters replace a property
/// that was already read through a pending getter, so readers see the
/// switch at the next microtask. Change notifications are batched.
pub fn deep_merge(target: &ObjectHandle, source: &Source, overwrite: bool) {
    let Some(entries) = source.entries() else {
        return;
    };
    batch(|| merge_entries(target, &entries, overwrite));
}

fn merge_entries(target: &ObjectHandle, entries: &IndexMap<String, Source>, overwrite: bool) {
    for (key, source) in entries {
        let existing = target.own_slot(key);
        let replaceable = match &existing {
            None => true,
            Some(Slot::Value(Value::Pending)) => true,
            Some(_) => overwrite,
        };

        if let Source::Getter(getter) = source {
            if replaceable {
                target.install_pending_getter(key, getter.clone());
            }
            continue;
        }

        if let Some(nested) = source.entries() {
            match existing {
                Some(Slot::Value(Value::Object(object))) if !object.is_array() => {
                    merge_entries(&object, &nested, overwrite);
                }
                _ if replaceable => {
                    let object = ObjectHandle::new(target.namespace());
                    merge_entries(&object, &nested, overwrite);
                    target.set(key, object);
                }
                _ => {}
            }
            continue;
        }

        if replaceable {
            let value = match source {
                Source::Json(json) => Value::from_json(target.namespace(), json),
                Source::Value(value) => value.clone(),
                Source::Getter(_) | Source::Object(_) => continue,
            };
            target.set(key, value);
        }
    }
}
