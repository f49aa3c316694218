//! The directive engine.
//!
//! A directive is a handler registered under a name. When an element is
//! rendered, the handlers for every directive present on it run in
//! descending priority order (ties in registration order). Each handler gets
//! a [`DirectiveContext`]: the element's directive entries, the element
//! snapshot it may modify, the scope evaluations run in, and per-element
//! storage that survives re-renders.
//!
//! Handlers run inside the element's render effect, so any reactive read
//! made while evaluating re-renders the element when it changes.

mod builtin;
mod evaluate;
mod parse;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::config::RuntimeConfig;
use crate::dom::{Document, Node};
use crate::error::Result;
use crate::render::{Cleanup, Instance};
use crate::scope::Scope;
use crate::state::Value;
use crate::store::StoreRegistry;
use crate::vdom::{DirectiveEntry, DirectiveMap, VElement, VNode};

pub use evaluate::{evaluate, evaluate_and_call};
pub use parse::{parse_directive_name, ParsedDirectiveName};

/// Priority of directives registered without one.
pub const DEFAULT_PRIORITY: i32 = 10;
/// `context` runs before the default directives so they see its scope.
pub const CONTEXT_PRIORITY: i32 = 20;
/// `each-child` runs first: it may remove the element.
pub const EACH_CHILD_PRIORITY: i32 = 25;
/// `each` runs last, after everything that may change the element's scope.
pub const EACH_PRIORITY: i32 = 5;

pub type DirectiveHandler = Arc<dyn Fn(&mut DirectiveContext<'_>) -> Result<()> + Send + Sync>;

struct Registration {
    priority: i32,
    handler: DirectiveHandler,
}

/// Directive handlers by name.
pub struct DirectiveRegistry {
    handlers: RwLock<IndexMap<String, Registration>>,
}

impl DirectiveRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(IndexMap::new()),
        }
    }

    /// A registry with the builtin directives.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_all(&registry);
        registry
    }

    /// Register `handler` for directive `name`. Registering a name again
    /// replaces the handler and priority but keeps its registration order.
    pub fn register<F>(&self, name: impl Into<String>, priority: i32, handler: F)
    where
        F: Fn(&mut DirectiveContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::trace!(directive = %name, priority, "directive registered");
        self.handlers.write().insert(
            name,
            Registration {
                priority,
                handler: Arc::new(handler),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    pub fn priority(&self, name: &str) -> Option<i32> {
        self.handlers.read().get(name).map(|registration| registration.priority)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Handlers for the directives in `directives`, in the order they run.
    /// Directives without a handler are skipped.
    pub fn ordered(&self, directives: &DirectiveMap) -> Vec<(String, DirectiveHandler)> {
        let handlers = self.handlers.read();
        let mut found: Vec<(usize, i32, String, DirectiveHandler)> = directives
            .keys()
            .filter_map(|name| {
                let (index, _, registration) = handlers.get_full(name)?;
                Some((index, registration.priority, name.clone(), registration.handler.clone()))
            })
            .collect();
        found.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        found
            .into_iter()
            .map(|(_, _, name, handler)| (name, handler))
            .collect()
    }
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        f.debug_map()
            .entries(handlers.iter().map(|(name, registration)| (name, registration.priority)))
            .finish()
    }
}

/// What a handler sees while its element renders.
pub struct DirectiveContext<'a> {
    instance: &'a Instance,
    element: &'a mut VElement,
    scope: Scope,
    first_render: bool,
    removed: bool,
}

impl<'a> DirectiveContext<'a> {
    pub(crate) fn new(instance: &'a Instance, element: &'a mut VElement, scope: Scope, first_render: bool) -> Self {
        Self {
            instance,
            element,
            scope,
            first_render,
            removed: false,
        }
    }

    /// Entries of directive `name` on this element.
    pub fn entries(&self, name: &str) -> &'a [DirectiveEntry] {
        self.instance.base().directive(name)
    }

    /// The snapshot being rendered. Changes are committed after all
    /// handlers have run.
    pub fn element(&self) -> &VElement {
        &*self.element
    }

    pub fn element_mut(&mut self) -> &mut VElement {
        &mut *self.element
    }

    /// The live element.
    pub fn node(&self) -> &Node {
        self.instance.node()
    }

    /// The scope evaluations run in.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Replace the scope for the handlers that follow and for the
    /// element's children.
    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
    }

    pub fn is_first_render(&self) -> bool {
        self.first_render
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.instance.renderer().stores
    }

    pub(crate) fn stores_arc(&self) -> Arc<StoreRegistry> {
        self.instance.renderer().stores.clone()
    }

    pub fn document(&self) -> &Document {
        &self.instance.renderer().document
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.instance.renderer().config
    }

    /// Full attribute name of directive `name`, for messages.
    pub fn attribute_name(&self, name: &str) -> String {
        self.config().attribute(name)
    }

    /// Resolve `entry` in the current scope.
    pub fn evaluate(&self, entry: &DirectiveEntry) -> Result<Value> {
        evaluate(entry, &self.scope, self.stores())
    }

    /// Resolve `entry` and call the result if it is a function.
    pub fn evaluate_and_call(&self, entry: &DirectiveEntry) -> Result<Value> {
        evaluate_and_call(entry, &self.scope, self.stores())
    }

    /// Per-element storage under `key`, created by `init` on first use.
    pub fn slot<T>(&self, key: &str, init: impl FnOnce() -> T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.instance.slot(key, init)
    }

    /// Run `f` once the element and its subtree are in place. A returned
    /// cleanup runs when the element is unmounted.
    pub fn on_mount(&self, f: impl FnOnce() -> Option<Cleanup> + 'static) {
        self.instance.on_mount(f);
    }

    /// Run `f` when the element is unmounted.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.instance.add_cleanup(Box::new(f));
    }

    /// Take the element out of the tree. Remaining handlers are skipped.
    pub fn remove_element(&mut self) {
        self.removed = true;
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Hydrate freshly created nodes in `scope`. The returned instances
    /// belong to the caller, which must unmount them.
    pub(crate) fn hydrate(&self, vnodes: &[VNode], scope: &Scope) -> Vec<Instance> {
        crate::render::hydrate_nodes(self.instance.renderer(), vnodes, scope)
    }
}

/// Storage shared between renders, type-erased for [`DirectiveContext::slot`].
pub(crate) type Slots = HashMap<String, Arc<dyn Any + Send + Sync>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::DirectiveValue;

    fn directives(names: &[&str]) -> DirectiveMap {
        names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    vec![DirectiveEntry {
                        namespace: None,
                        value: DirectiveValue::Text(String::new()),
                        suffix: None,
                        unique_id: None,
                    }],
                )
            })
            .collect()
    }

    fn order(registry: &DirectiveRegistry, names: &[&str]) -> Vec<String> {
        registry
            .ordered(&directives(names))
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    #[test]
    fn higher_priorities_run_first_then_registration_order() {
        let registry = DirectiveRegistry::new();
        registry.register("b", 10, |_| Ok(()));
        registry.register("a", 10, |_| Ok(()));
        registry.register("outer", 20, |_| Ok(()));
        registry.register("inner", 5, |_| Ok(()));

        assert_eq!(
            order(&registry, &["inner", "a", "unknown", "b", "outer"]),
            vec!["outer", "b", "a", "inner"]
        );
    }

    #[test]
    fn re_registration_replaces_the_handler() {
        let registry = DirectiveRegistry::new();
        registry.register("x", 1, |_| Ok(()));
        registry.register("y", 1, |_| Ok(()));
        registry.register("x", 30, |_| Ok(()));
        assert_eq!(registry.priority("x"), Some(30));
        assert_eq!(registry.names(), vec!["x", "y"]);
        assert_eq!(order(&registry, &["y", "x"]), vec!["x", "y"]);
    }

    #[test]
    fn builtins_are_registered_with_their_priorities() {
        let registry = DirectiveRegistry::with_builtins();
        for name in ["context", "each", "each-child", "text", "bind", "class", "style", "on", "watch", "init", "run"] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert_eq!(
            order(&registry, &["each", "text", "context", "each-child"]),
            vec!["each-child", "context", "text", "each"]
        );
    }
}
