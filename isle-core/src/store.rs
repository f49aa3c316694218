//! The store registry.
//!
//! A store is the per-namespace root object holding `state`, `actions`,
//! `callbacks` and any other named parts. Directives resolve their paths
//! against it. Registration is additive: registering the same namespace
//! again deep-merges the new part without overwriting what is there.
//!
//! Stores may be locked at first registration. A private store can only be
//! extended by callers presenting the same key (or [`UNIVERSAL_UNLOCK`]).

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::dom::Document;
use crate::error::{Error, Result};
use crate::reactive::{batch, Signal};
use crate::scope;
use crate::state::{deep_merge, Function, Getter, ObjectHandle, Slot, Source, Value};

/// Lock key that opens any store. Using it means relying on internals that
/// may change between releases.
pub const UNIVERSAL_UNLOCK: &str = "I acknowledge that using a private store means my plugin will inevitably break on the next store release.";

/// Access control for a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreLock {
    /// Anyone may extend the store. A public store can never be locked.
    #[default]
    Public,
    /// Only the caller that registered the store holds a reference to it.
    Private,
    /// Callers presenting the same key may extend the store.
    Key(String),
}

impl StoreLock {
    pub fn universal() -> Self {
        StoreLock::Key(UNIVERSAL_UNLOCK.to_string())
    }

    pub fn is_universal(&self) -> bool {
        matches!(self, StoreLock::Key(key) if key == UNIVERSAL_UNLOCK)
    }
}

impl From<bool> for StoreLock {
    fn from(locked: bool) -> Self {
        if locked {
            StoreLock::Private
        } else {
            StoreLock::Public
        }
    }
}

impl From<&str> for StoreLock {
    fn from(key: &str) -> Self {
        StoreLock::Key(key.to_string())
    }
}

/// A piece of a store to register.
///
/// ```rust,ignore
/// let part = StorePart::new()
///     .state(json!({ "count": 0 }))
///     .derived("double", Getter::new(|state| /* ... */ Value::Undefined))
///     .action("increment", Function::new(|_| Ok(Value::Undefined)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StorePart {
    state: IndexMap<String, Source>,
    parts: IndexMap<String, IndexMap<String, Source>>,
}

impl StorePart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the entries of a JSON object to `state`. Other JSON is ignored.
    pub fn state(mut self, state: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = state {
            for (key, value) in map {
                self.state.insert(key, Source::Json(value));
            }
        }
        self
    }

    /// Set one `state` entry.
    pub fn state_entry(mut self, key: impl Into<String>, source: impl Into<Source>) -> Self {
        self.state.insert(key.into(), source.into());
        self
    }

    /// A derived `state` property.
    pub fn derived(self, key: impl Into<String>, getter: Getter) -> Self {
        self.state_entry(key, Source::Getter(getter))
    }

    pub fn action(self, name: impl Into<String>, action: Function) -> Self {
        self.entry("actions", name, action)
    }

    pub fn callback(self, name: impl Into<String>, callback: Function) -> Self {
        self.entry("callbacks", name, callback)
    }

    /// Set `key` in the named part (`actions`, `callbacks`, or any other).
    pub fn entry(
        mut self,
        part: impl Into<String>,
        key: impl Into<String>,
        source: impl Into<Source>,
    ) -> Self {
        self.parts
            .entry(part.into())
            .or_default()
            .insert(key.into(), source.into());
        self
    }
}

/// A registered store.
#[derive(Debug, Clone)]
pub struct Store {
    namespace: Arc<str>,
    root: ObjectHandle,
}

impl Store {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The object paths resolve against.
    pub fn root(&self) -> &ObjectHandle {
        &self.root
    }

    pub fn state(&self) -> ObjectHandle {
        self.part("state")
            .unwrap_or_else(|| ObjectHandle::new(Some(&self.namespace)))
    }

    /// A named part, without tracking.
    pub fn part(&self, name: &str) -> Option<ObjectHandle> {
        match self.root.own_slot(name) {
            Some(Slot::Value(Value::Object(object))) => Some(object),
            _ => None,
        }
    }

    pub fn actions(&self) -> Option<ObjectHandle> {
        self.part("actions")
    }

    pub fn callbacks(&self) -> Option<ObjectHandle> {
        self.part("callbacks")
    }

    /// Look up a function stored at `path`, e.g. `actions.toggle`.
    pub fn function(&self, path: &str) -> Option<Function> {
        self.root.peek_path(path).as_function().cloned()
    }
}

/// Initial data rendered by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerData {
    /// State per namespace.
    pub state: IndexMap<String, serde_json::Value>,
    /// Static configuration per namespace.
    pub config: IndexMap<String, serde_json::Value>,
    /// Dotted paths, from the store root, of state derived on the server by
    /// closures the client must provide.
    pub derived_state_closures: IndexMap<String, Vec<String>>,
}

impl ServerData {
    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Read the server data embedded in `document`.
///
/// The first element found among the configured ids wins. A missing element
/// or unparsable content yields empty data.
pub fn parse_server_data(document: &Document, config: &RuntimeConfig) -> ServerData {
    let Some(element) = config
        .server_data_ids
        .iter()
        .find_map(|id| document.get_element_by_id(id))
    else {
        return ServerData::default();
    };
    let text = element.text_content();
    if text.trim().is_empty() {
        return ServerData::default();
    }
    match ServerData::from_json_str(&text) {
        Ok(data) => data,
        Err(error) => {
            tracing::debug!(%error, "ignoring unparsable server data");
            ServerData::default()
        }
    }
}

/// All stores of one runtime, with their locks and server snapshots.
pub struct StoreRegistry {
    stores: DashMap<String, Store>,
    locks: DashMap<String, StoreLock>,
    configs: DashMap<String, ObjectHandle>,
    server_states: DashMap<String, ObjectHandle>,
    navigation: Signal<u64>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self {
            stores: DashMap::new(),
            locks: DashMap::new(),
            configs: DashMap::new(),
            server_states: DashMap::new(),
            navigation: Signal::new(0),
        }
    }

    /// Register `part` under `namespace` and return the store.
    ///
    /// Fails when the store is locked and `lock` does not open it, or when
    /// a public store is registered again with a lock.
    pub fn store(&self, namespace: &str, part: StorePart, lock: StoreLock) -> Result<Store> {
        let existing = self.stores.get(namespace).map(|store| store.clone());
        let Some(store) = existing else {
            if !lock.is_universal() {
                self.locks.insert(namespace.to_string(), lock);
            }
            let store = Store {
                namespace: Arc::from(namespace),
                root: ObjectHandle::new(Some(namespace)),
            };
            let state = ObjectHandle::new(Some(namespace));
            batch(|| {
                store.root.set("state", state.clone());
                deep_merge(&state, &Source::Object(part.state), true);
                for (name, entries) in part.parts {
                    deep_merge(
                        &store.root,
                        &Source::object([(name, Source::Object(entries))]),
                        true,
                    );
                }
            });
            self.stores.insert(namespace.to_string(), store.clone());
            tracing::debug!(namespace, "store registered");
            return Ok(store);
        };

        self.check_lock(namespace, lock)?;
        let state = store.state();
        batch(|| {
            for (name, entries) in part.parts {
                deep_merge(
                    &store.root,
                    &Source::object([(name, Source::Object(entries))]),
                    false,
                );
            }
            deep_merge(&state, &Source::Object(part.state), false);
        });
        tracing::debug!(namespace, "store extended");
        Ok(store)
    }

    fn check_lock(&self, namespace: &str, lock: StoreLock) -> Result<()> {
        let current = self.locks.get(namespace).map(|lock| lock.clone());
        let Some(current) = current else {
            if !lock.is_universal() {
                self.locks.insert(namespace.to_string(), lock);
            }
            return Ok(());
        };
        let valid = lock.is_universal() || (lock != StoreLock::Private && lock == current);
        if valid {
            Ok(())
        } else if current == StoreLock::Public {
            Err(Error::PublicStoreLock {
                namespace: namespace.to_string(),
            })
        } else {
            Err(Error::InvalidLock {
                namespace: namespace.to_string(),
            })
        }
    }

    /// The store for `namespace`, created empty and unlocked-by-default if
    /// it does not exist yet.
    pub fn ensure(&self, namespace: &str) -> Store {
        if let Some(store) = self.get(namespace) {
            return store;
        }
        let store = Store {
            namespace: Arc::from(namespace),
            root: ObjectHandle::new(Some(namespace)),
        };
        store.root.set("state", ObjectHandle::new(Some(namespace)));
        self.stores
            .entry(namespace.to_string())
            .or_insert(store)
            .clone()
    }

    pub fn get(&self, namespace: &str) -> Option<Store> {
        self.stores.get(namespace).map(|store| store.clone())
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.stores.contains_key(namespace)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.stores.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn lock(&self, namespace: &str) -> Option<StoreLock> {
        self.locks.get(namespace).map(|lock| lock.clone())
    }

    /// Bumped on every server population.
    pub fn navigation(&self) -> &Signal<u64> {
        &self.navigation
    }

    /// Server configuration for `namespace` (default: the current one).
    /// Empty when none was sent.
    pub fn get_config(&self, namespace: Option<&str>) -> Result<ObjectHandle> {
        let namespace = resolve(namespace, "get_config")?;
        Ok(self
            .configs
            .get(&namespace)
            .map(|config| config.clone())
            .unwrap_or_else(|| ObjectHandle::new(Some(&namespace))))
    }

    /// The state as last rendered by the server, independent of the client
    /// copy. Readers re-run after each population.
    pub fn get_server_state(&self, namespace: Option<&str>) -> Result<ObjectHandle> {
        let namespace = resolve(namespace, "get_server_state")?;
        self.navigation.get();
        Ok(self
            .server_states
            .get(&namespace)
            .map(|state| state.clone())
            .unwrap_or_else(|| ObjectHandle::new(Some(&namespace))))
    }

    /// Load server data: merge state into the client stores, replace the
    /// server snapshots and configs, and mark derived paths as pending.
    pub fn populate_server_data(&self, data: &ServerData) {
        self.server_states.clear();
        self.configs.clear();

        batch(|| {
            for (namespace, state) in &data.state {
                let store = self.ensure(namespace);
                deep_merge(&store.state(), &Source::Json(state.clone()), true);
                self.server_states.insert(
                    namespace.clone(),
                    ObjectHandle::from_json(Some(namespace), state),
                );
            }
            for (namespace, config) in &data.config {
                self.configs.insert(
                    namespace.clone(),
                    ObjectHandle::from_json(Some(namespace), config),
                );
            }
            for (namespace, paths) in &data.derived_state_closures {
                let store = self.ensure(namespace);
                for path in paths {
                    mark_pending(store.root(), path);
                }
            }
        });

        tracing::debug!(
            namespaces = data.state.len(),
            configs = data.config.len(),
            "server data populated"
        );
        self.navigation.update(|n| *n += 1);
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(namespace: Option<&str>, method: &'static str) -> Result<String> {
    match namespace {
        Some(namespace) => Ok(namespace.to_string()),
        None => scope::current_namespace().ok_or(Error::NoNamespace { method }),
    }
}

/// Replace the value at `path` with the pending marker when the server sent
/// a plain object there, which is how it serializes closures.
fn mark_pending(root: &ObjectHandle, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(prop) = segments.pop() else {
        return;
    };
    let mut parent = root.clone();
    for segment in segments {
        match parent.own_slot(segment) {
            Some(Slot::Value(Value::Object(object))) => parent = object,
            _ => return,
        }
    }
    if let Some(Slot::Value(Value::Object(object))) = parent.own_slot(prop) {
        if !object.is_array() {
            parent.set(prop, Value::Pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registration_merges_without_clobbering() {
        let registry = StoreRegistry::new();
        let first = registry
            .store("ns", StorePart::new().state(json!({"a": 1})), StoreLock::Public)
            .unwrap();
        registry
            .store("ns", StorePart::new().state(json!({"b": 2})), StoreLock::Public)
            .unwrap();
        let again = registry
            .store("ns", StorePart::new().state(json!({"a": 99})), StoreLock::Public)
            .unwrap();

        assert!(first.root().ptr_eq(again.root()));
        assert_eq!(first.state().to_json(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn private_stores_need_their_key() {
        let registry = StoreRegistry::new();
        registry.store("locked", StorePart::new(), StoreLock::Private).unwrap();
        assert!(matches!(
            registry.store("locked", StorePart::new(), StoreLock::Public),
            Err(Error::InvalidLock { .. })
        ));
        assert!(matches!(
            registry.store("locked", StorePart::new(), StoreLock::Private),
            Err(Error::InvalidLock { .. })
        ));
        assert!(registry
            .store("locked", StorePart::new(), StoreLock::universal())
            .is_ok());

        registry.store("keyed", StorePart::new(), "secret".into()).unwrap();
        assert!(registry.store("keyed", StorePart::new(), "secret".into()).is_ok());
        assert!(matches!(
            registry.store("keyed", StorePart::new(), "wrong".into()),
            Err(Error::InvalidLock { .. })
        ));
    }

    #[test]
    fn public_stores_cannot_be_locked_later() {
        let registry = StoreRegistry::new();
        registry.store("open", StorePart::new(), StoreLock::Public).unwrap();
        assert!(matches!(
            registry.store("open", StorePart::new(), true.into()),
            Err(Error::PublicStoreLock { .. })
        ));
    }

    #[test]
    fn stores_created_by_the_server_take_the_first_lock() {
        let registry = StoreRegistry::new();
        registry.populate_server_data(&ServerData {
            state: [("ns".to_string(), json!({"x": 1}))].into_iter().collect(),
            ..ServerData::default()
        });
        assert_eq!(registry.lock("ns"), None);
        registry.store("ns", StorePart::new(), "key".into()).unwrap();
        assert_eq!(registry.lock("ns"), Some(StoreLock::Key("key".into())));
        assert!(registry.store("ns", StorePart::new(), StoreLock::Public).is_err());
    }

    #[test]
    fn population_marks_derived_paths_pending() {
        let registry = StoreRegistry::new();
        let data = ServerData::from_json_str(
            r#"{
                "state": {"ns": {"closure": {}, "scalar": 1, "nested": {"inner": {}}}},
                "config": {"ns": {"flag": true}},
                "derivedStateClosures": {"ns": ["state.closure", "state.scalar", "state.nested.inner"]}
            }"#,
        )
        .unwrap();
        registry.populate_server_data(&data);

        let state = registry.get("ns").unwrap().state();
        assert_eq!(state.peek("closure"), Value::Pending);
        assert_eq!(state.peek("scalar"), Value::from(1));
        assert_eq!(state.peek_path("nested.inner"), Value::Pending);
        assert_eq!(registry.get_config(Some("ns")).unwrap().peek("flag"), Value::Bool(true));
        assert_eq!(registry.navigation().get_untracked(), 1);

        let getter = Getter::new(|_| Value::from("client"));
        registry
            .store("ns", StorePart::new().derived("closure", getter), StoreLock::Public)
            .unwrap();
        assert_eq!(state.peek("closure"), Value::from("client"));
    }

    #[test]
    fn server_state_is_a_separate_snapshot() {
        let registry = StoreRegistry::new();
        registry.populate_server_data(&ServerData {
            state: [("ns".to_string(), json!({"x": 1}))].into_iter().collect(),
            ..ServerData::default()
        });
        registry.get("ns").unwrap().state().set("x", 5);
        let server = registry.get_server_state(Some("ns")).unwrap();
        assert_eq!(server.peek("x"), Value::from(1));

        registry.populate_server_data(&ServerData::default());
        assert!(registry.get_server_state(Some("ns")).unwrap().keys().is_empty());
        assert!(registry.get_config(Some("ns")).unwrap().keys().is_empty());
    }

    #[test]
    fn server_data_is_found_by_id() {
        let document = Document::parse(
            r#"<script type="application/json" id="wp-interactivity-data">{"state":{"a":{"b":1}}}</script>"#,
        );
        let data = parse_server_data(&document, &RuntimeConfig::default());
        assert_eq!(data.state["a"], json!({"b": 1}));

        let broken = Document::parse(r#"<script id="wp-interactivity-data">{oops</script>"#);
        assert_eq!(parse_server_data(&broken, &RuntimeConfig::default()), ServerData::default());
    }

    #[test]
    fn server_data_decodes_from_msgpack() {
        let data = ServerData {
            config: [("ns".to_string(), json!({"n": 2}))].into_iter().collect(),
            ..ServerData::default()
        };
        let bytes = rmp_serde::to_vec_named(&data).unwrap();
        assert_eq!(ServerData::from_msgpack(&bytes).unwrap(), data);
    }
}
