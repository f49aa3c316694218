//! The builtin directives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{
    evaluate, evaluate_and_call, DirectiveContext, DirectiveRegistry, CONTEXT_PRIORITY, DEFAULT_PRIORITY,
    EACH_CHILD_PRIORITY, EACH_PRIORITY,
};
use crate::diagnostics;
use crate::dom::{Event, EventArg, EventTarget, Listener, Node};
use crate::error::Result;
use crate::reactive::{batch, Effect};
use crate::reconcile::text_children;
use crate::render::{Cleanup, Instance};
use crate::scope::Scope;
use crate::state::{deep_merge, CallArgs, ObjectHandle, Source, Value, ValueKey};
use crate::store::StoreRegistry;
use crate::task;
use crate::utils::{css_string_to_map, kebab_to_camel_case, map_to_css_string};
use crate::vdom::{DirectiveEntry, DirectiveValue, VNode};

pub(super) fn register_all(registry: &DirectiveRegistry) {
    registry.register("context", CONTEXT_PRIORITY, context);
    registry.register("watch", DEFAULT_PRIORITY, watch);
    registry.register("init", DEFAULT_PRIORITY, init);
    registry.register("run", DEFAULT_PRIORITY, run);
    registry.register("on", DEFAULT_PRIORITY, on);
    registry.register("on-async", DEFAULT_PRIORITY, on_async);
    registry.register("on-window", DEFAULT_PRIORITY, |ctx| global_event(ctx, "on-window", Global::Window, false));
    registry.register("on-document", DEFAULT_PRIORITY, |ctx| {
        global_event(ctx, "on-document", Global::Document, false)
    });
    registry.register("on-async-window", DEFAULT_PRIORITY, |ctx| {
        global_event(ctx, "on-async-window", Global::Window, true)
    });
    registry.register("on-async-document", DEFAULT_PRIORITY, |ctx| {
        global_event(ctx, "on-async-document", Global::Document, true)
    });
    registry.register("class", DEFAULT_PRIORITY, class);
    registry.register("style", DEFAULT_PRIORITY, style);
    registry.register("bind", DEFAULT_PRIORITY, bind);
    registry.register("ignore", DEFAULT_PRIORITY, ignore);
    registry.register("text", DEFAULT_PRIORITY, text);
    registry.register("each", EACH_PRIORITY, each);
    registry.register("each-child", EACH_CHILD_PRIORITY, each_child);
}

fn warn_two_hyphens(ctx: &DirectiveContext<'_>, name: &str, suffix: &str, unique_id: Option<&str>) {
    let attribute = ctx.attribute_name(name);
    let (old, new) = match unique_id {
        Some(id) => (format!("--{suffix}--{id}"), format!("--{suffix}---{id}")),
        None => (format!("--{suffix}"), format!("---{suffix}")),
    };
    diagnostics::warn(format!(
        "The usage of {attribute}{old} (two hyphens for unique ID) is deprecated. \
         Please use {attribute}{new} (three hyphens for unique ID) from now on."
    ));
}

fn warn_unique_id_not_supported(ctx: &DirectiveContext<'_>, name: &str, unique_id: &str) {
    diagnostics::warn(format!(
        "Unique IDs are not supported for the {} directive. Ignoring the directive with unique ID \"{unique_id}\".",
        ctx.attribute_name(name)
    ));
}

fn warn_sync_event(ctx: &DirectiveContext<'_>, wrong: &str, right: &str) {
    diagnostics::warn(format!(
        "The usage of {} is deprecated. Please use {} with the `with_sync_event` helper from now on.",
        ctx.attribute_name(wrong),
        ctx.attribute_name(right)
    ));
}

/// Entries carrying a suffix, minus those with an unsupported unique id.
fn suffixed<'a>(ctx: &DirectiveContext<'a>, name: &str) -> Vec<&'a DirectiveEntry> {
    ctx.entries(name)
        .iter()
        .filter(|entry| !entry.is_default())
        .filter(|entry| match &entry.unique_id {
            Some(id) => {
                warn_unique_id_not_supported(ctx, name, id);
                false
            }
            None => true,
        })
        .collect()
}

// ----------------------------------------------------------------------
// context
// ----------------------------------------------------------------------

#[derive(Default)]
struct ContextState {
    client: IndexMap<String, ObjectHandle>,
    server: IndexMap<String, ObjectHandle>,
    scope: Option<Scope>,
}

fn context(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    let defaults: Vec<&DirectiveEntry> = ctx.entries("context").iter().filter(|e| e.is_default()).collect();
    if defaults.is_empty() {
        diagnostics::warn(format!(
            "The usage of {}--unique-id (two hyphens) is not supported. To add a unique ID to the directive, \
             please use {}---unique-id (three hyphens) instead.",
            ctx.attribute_name("context"),
            ctx.attribute_name("context")
        ));
        return Ok(());
    }

    let state = ctx.slot("context", || Arc::new(Mutex::new(ContextState::default())));
    let inherited = ctx.scope().clone();
    let mut state = state.lock();

    // Unique ids sort after the default entry; merging in reverse lets
    // them win over it.
    for entry in defaults.into_iter().rev() {
        let Some(namespace) = entry.namespace.as_deref() else {
            diagnostics::warn("Namespace missing for a context directive. The context won't be created.");
            continue;
        };
        let DirectiveValue::Object(map) = &entry.value else {
            let unique = entry.unique_id.as_deref().map(|id| format!("---{id}")).unwrap_or_default();
            diagnostics::warn(format!(
                "The value of {}{unique} on the {namespace} namespace must be a valid stringified JSON object.",
                ctx.attribute_name("context")
            ));
            continue;
        };
        let json = Source::Json(serde_json::Value::Object(map.clone()));
        let client = state
            .client
            .entry(namespace.to_string())
            .or_insert_with(|| ObjectHandle::with_parent(Some(namespace), inherited.context(namespace)))
            .clone();
        deep_merge(&client, &json, false);
        let server = state
            .server
            .entry(namespace.to_string())
            .or_insert_with(|| {
                ObjectHandle::with_parent(Some(namespace), inherited.server_context(namespace))
            })
            .clone();
        deep_merge(&server, &json, true);
    }

    if state.scope.is_none() && !state.client.is_empty() {
        let mut scope = inherited.clone();
        for (namespace, client) in &state.client {
            let server = state
                .server
                .get(namespace)
                .cloned()
                .unwrap_or_else(|| ObjectHandle::new(Some(namespace)));
            scope = scope.with_contexts(namespace, client.clone(), server);
        }
        let disposed = scope.clone();
        ctx.on_cleanup(move || disposed.dispose());
        state.scope = Some(scope);
    }
    let scope = state.scope.clone();
    drop(state);
    if let Some(scope) = scope {
        ctx.set_scope(scope);
    }
    Ok(())
}

// ----------------------------------------------------------------------
// watch, init, run
// ----------------------------------------------------------------------

fn report(result: Result<Value>) {
    if let Err(error) = result {
        diagnostics::report(&error);
    }
}

fn watch(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    for entry in ctx.entries("watch") {
        if let Some(suffix) = &entry.suffix {
            warn_two_hyphens(ctx, "watch", suffix, None);
        }
        if !ctx.is_first_render() {
            continue;
        }
        let (entry, scope, stores) = (entry.clone(), ctx.scope().clone(), ctx.stores_arc());
        ctx.on_mount(move || {
            let busy = Arc::new(AtomicBool::new(false));
            let effect = Effect::with_notify(
                move || batch(|| report(evaluate_and_call(&entry, &scope, &stores))),
                move |effect| {
                    if busy.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    let (effect, busy) = (effect.clone(), busy.clone());
                    task::after_next_frame(move || {
                        busy.store(false, Ordering::SeqCst);
                        effect.execute();
                    });
                },
            );
            effect.execute();
            Some(Box::new(move || effect.dispose()) as Cleanup)
        });
    }
    Ok(())
}

fn init(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    for entry in ctx.entries("init") {
        if let Some(suffix) = &entry.suffix {
            warn_two_hyphens(ctx, "init", suffix, None);
        }
        if !ctx.is_first_render() {
            continue;
        }
        let (entry, scope, stores) = (entry.clone(), ctx.scope().clone(), ctx.stores_arc());
        ctx.on_mount(move || {
            batch(|| report(evaluate_and_call(&entry, &scope, &stores)));
            None
        });
    }
    Ok(())
}

fn run(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    for entry in ctx.entries("run") {
        if let Some(suffix) = &entry.suffix {
            warn_two_hyphens(ctx, "run", suffix, None);
        }
        batch(|| report(ctx.evaluate_and_call(entry)));
    }
    Ok(())
}

// ----------------------------------------------------------------------
// events
// ----------------------------------------------------------------------

/// Group suffixed entries by event type, the part of the suffix before any
/// `--`.
fn group_by_event<'a>(
    ctx: &DirectiveContext<'a>,
    name: &str,
    warn: bool,
) -> IndexMap<String, Vec<DirectiveEntry>> {
    let mut events: IndexMap<String, Vec<DirectiveEntry>> = IndexMap::new();
    for entry in ctx.entries(name).iter().filter(|entry| !entry.is_default()) {
        let suffix = entry.suffix.as_deref().unwrap_or_default();
        let (event, rest) = match suffix.split_once("--") {
            Some((event, rest)) => (event, Some(rest)),
            None => (suffix, None),
        };
        if let (true, Some(rest)) = (warn, rest.filter(|rest| !rest.is_empty())) {
            warn_two_hyphens(ctx, name, event, Some(rest));
        }
        events.entry(event.to_string()).or_default().push(entry.clone());
    }
    events
}

/// Call every entry's action with the event, synchronously. Their writes
/// land as one batch.
fn dispatch_sync(entries: &[DirectiveEntry], scope: &Scope, stores: &StoreRegistry, event: &Event) {
    batch(|| {
        for entry in entries {
            match evaluate(entry, scope, stores) {
                Ok(Value::Function(action)) => {
                    let arg = EventArg::new(event.clone(), action.requires_sync_event());
                    report(action.call(CallArgs::with_event(arg)));
                }
                Ok(_) => {}
                Err(error) => diagnostics::report(&error),
            }
        }
    });
}

/// Call every entry's action with the event, each in a later task.
fn dispatch_deferred(entries: &[DirectiveEntry], scope: &Scope, stores: &Arc<StoreRegistry>, event: &Event) {
    for entry in entries {
        let (entry, scope, stores, event) = (entry.clone(), scope.clone(), stores.clone(), event.clone());
        task::defer(move || {
            if let Ok(Value::Function(action)) = evaluate(&entry, &scope, &stores) {
                batch(|| report(action.call(CallArgs::with_event(EventArg::new(event, false)))));
            }
        });
    }
}

fn listener(entries: Vec<DirectiveEntry>, scope: Scope, stores: Arc<StoreRegistry>, deferred: bool) -> Listener {
    Arc::new(move |event: &Event| {
        if deferred {
            dispatch_deferred(&entries, &scope, &stores, event);
        } else {
            dispatch_sync(&entries, &scope, &stores, event);
        }
    })
}

fn on(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    let events = group_by_event(ctx, "on", true);
    if !ctx.is_first_render() {
        return Ok(());
    }
    for (event_type, entries) in events {
        let node = ctx.node().clone();
        let id = node.add_event_listener(&event_type, listener(entries, ctx.scope().clone(), ctx.stores_arc(), false));
        ctx.on_cleanup(move || {
            node.remove_event_listener(id);
        });
    }
    Ok(())
}

fn on_async(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    warn_sync_event(ctx, "on-async", "on");
    let events = group_by_event(ctx, "on-async", false);
    if !ctx.is_first_render() {
        return Ok(());
    }
    for (event_type, entries) in events {
        let node = ctx.node().clone();
        let id = node.add_event_listener(&event_type, listener(entries, ctx.scope().clone(), ctx.stores_arc(), true));
        ctx.on_cleanup(move || {
            node.remove_event_listener(id);
        });
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Global {
    Window,
    Document,
}

fn global_target(ctx: &DirectiveContext<'_>, global: Global) -> EventTarget {
    match global {
        Global::Window => ctx.document().window().clone(),
        Global::Document => ctx.document().document_target().clone(),
    }
}

fn global_event(ctx: &mut DirectiveContext<'_>, name: &str, global: Global, deferred: bool) -> Result<()> {
    if deferred {
        let right = name.replacen("on-async", "on", 1);
        warn_sync_event(ctx, name, &right);
    }
    let events = group_by_event(ctx, name, !deferred);
    if !ctx.is_first_render() {
        return Ok(());
    }
    let target = global_target(ctx, global);
    for (event_type, entries) in events {
        let callback = listener(entries, ctx.scope().clone(), ctx.stores_arc(), deferred);
        let target = target.clone();
        ctx.on_mount(move || {
            let id = target.add_listener(event_type, callback);
            Some(Box::new(move || {
                target.remove_listener(id);
            }) as Cleanup)
        });
    }
    Ok(())
}

// ----------------------------------------------------------------------
// class, style, bind, text, ignore
// ----------------------------------------------------------------------

/// Evaluate for an attribute-like directive: pending values are skipped,
/// functions are called.
fn resolve_value(ctx: &DirectiveContext<'_>, entry: &DirectiveEntry) -> Result<Option<Value>> {
    match ctx.evaluate(entry)? {
        Value::Pending => Ok(None),
        Value::Function(function) => match function.call(CallArgs::none())? {
            Value::Pending => Ok(None),
            value => Ok(Some(value)),
        },
        value => Ok(Some(value)),
    }
}

/// [`resolve_value`] for one entry among several: a failing entry is
/// reported and skipped.
fn resolve_entry(ctx: &DirectiveContext<'_>, entry: &DirectiveEntry) -> Option<Value> {
    resolve_value(ctx, entry).unwrap_or_else(|error| {
        diagnostics::report(&error);
        None
    })
}

fn class(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    for entry in ctx.entries("class").iter().filter(|entry| !entry.is_default()) {
        let suffix = entry.suffix.as_deref().unwrap_or_default();
        let class_name = match &entry.unique_id {
            Some(id) => format!("{suffix}---{id}"),
            None => suffix.to_string(),
        };
        let Some(value) = resolve_entry(ctx, entry) else {
            continue;
        };
        let props = &mut ctx.element_mut().props;
        let current = props.get("class").cloned().unwrap_or_default();
        let present = current.split_whitespace().any(|token| token == class_name);
        if value.is_truthy() && !present {
            let updated = if current.trim().is_empty() {
                class_name
            } else {
                format!("{} {class_name}", current.trim_end())
            };
            props.insert("class".to_string(), updated);
        } else if !value.is_truthy() && present {
            let updated: Vec<&str> = current.split_whitespace().filter(|token| *token != class_name).collect();
            props.insert("class".to_string(), updated.join(" "));
        }
    }
    Ok(())
}

fn style(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    for entry in suffixed(ctx, "style") {
        let property = entry.suffix.as_deref().unwrap_or_default();
        let Some(value) = resolve_entry(ctx, entry) else {
            continue;
        };
        let props = &mut ctx.element_mut().props;
        let current = props.get("style").cloned().unwrap_or_default();
        let mut map = css_string_to_map(&current);
        let changed = if value.is_truthy() {
            let rendered = value.to_js_string();
            map.insert(property.to_string(), rendered.clone()) != Some(rendered)
        } else {
            map.shift_remove(property).is_some()
        };
        if !changed {
            continue;
        }
        if map.is_empty() {
            props.shift_remove("style");
        } else {
            props.insert("style".to_string(), map_to_css_string(&map));
        }
    }
    Ok(())
}

/// The attribute value `value` renders as, `None` to remove the attribute.
///
/// `aria-*` and `data-*` attributes keep `true`/`false` as text; other
/// attributes treat them as boolean attributes.
pub(crate) fn attribute_value(attribute: &str, value: &Value) -> Option<String> {
    let keeps_booleans = attribute.as_bytes().get(4) == Some(&b'-');
    match value {
        Value::Undefined | Value::Null | Value::Pending => None,
        Value::Bool(false) if !keeps_booleans => None,
        Value::Bool(true) if !keeps_booleans => Some(String::new()),
        other => Some(other.to_js_string()),
    }
}

fn bind(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    for entry in suffixed(ctx, "bind") {
        let attribute = entry.suffix.as_deref().unwrap_or_default();
        let Some(value) = resolve_entry(ctx, entry) else {
            continue;
        };
        let props = &mut ctx.element_mut().props;
        match attribute_value(attribute, &value) {
            Some(rendered) => {
                props.insert(attribute.to_string(), rendered);
            }
            None => {
                props.shift_remove(attribute);
            }
        }
    }
    Ok(())
}

fn text(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    let entries: Vec<&DirectiveEntry> = ctx.entries("text").iter().filter(|e| e.is_default()).collect();
    if entries.is_empty() {
        diagnostics::warn(format!(
            "The usage of {}--suffix is not supported. Please use {} instead.",
            ctx.attribute_name("text"),
            ctx.attribute_name("text")
        ));
        return Ok(());
    }
    for entry in entries {
        if let Some(id) = &entry.unique_id {
            warn_unique_id_not_supported(ctx, "text", id);
            continue;
        }
        let text = match resolve_value(ctx, entry) {
            Ok(None) => continue,
            Ok(Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_)))) => Some(value.to_js_string()),
            Ok(Some(_)) => None,
            Err(error) => {
                tracing::debug!(%error, "text directive evaluation failed");
                None
            }
        };
        ctx.element_mut().children = text_children(text);
    }
    Ok(())
}

fn ignore(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    diagnostics::warn(format!(
        "The {} directive is deprecated and will be removed in a future version.",
        ctx.attribute_name("ignore")
    ));
    Ok(())
}

// ----------------------------------------------------------------------
// each, each-child
// ----------------------------------------------------------------------

struct Item {
    context: ObjectHandle,
    scope: Scope,
    nodes: Vec<Node>,
    instances: Vec<Instance>,
}

impl Item {
    fn dispose(self) {
        for instance in &self.instances {
            instance.unmount();
        }
        for node in &self.nodes {
            node.remove();
        }
        self.scope.dispose();
    }
}

/// Rendered items by key. A key is the item's key plus its occurrence
/// number, so repeated keys still get distinct items.
type Items = IndexMap<(ValueKey, usize), Item>;

fn each(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    if ctx.element().tag != "template" {
        diagnostics::warn(format!(
            "The {} directive can only be used on <template> elements.",
            ctx.attribute_name("each")
        ));
        return Ok(());
    }
    let entries = ctx.entries("each");
    if entries.len() > 1 {
        diagnostics::warn(format!(
            "The usage of multiple {} directives on the same element is not supported. Please pick only one.",
            ctx.attribute_name("each")
        ));
        return Ok(());
    }
    let Some(entry) = entries.first() else {
        return Ok(());
    };
    if let Some(id) = &entry.unique_id {
        warn_unique_id_not_supported(ctx, "each", id);
        return Ok(());
    }

    let items = ctx.slot("each", || Arc::new(Mutex::new(Items::new())));
    if ctx.is_first_render() {
        let items = items.clone();
        ctx.on_cleanup(move || {
            for (_, item) in std::mem::take(&mut *items.lock()) {
                item.dispose();
            }
        });
    }

    let list = match resolve_value(ctx, entry)? {
        None => return Ok(()),
        Some(Value::Object(list)) if list.is_array() => list.items(),
        Some(_) => Vec::new(),
    };
    let Some(namespace) = entry.namespace.as_deref() else {
        return Ok(());
    };
    let item_prop = entry
        .suffix
        .as_deref()
        .map(kebab_to_camel_case)
        .unwrap_or_else(|| "item".to_string());
    let each_key = ctx.entries("each-key").first();
    let inherited = ctx.scope().context(namespace);

    let mut previous = std::mem::take(&mut *items.lock());
    let mut next = Items::new();
    let mut fresh = Vec::new();
    let mut seen: HashMap<ValueKey, usize> = HashMap::new();

    for value in list {
        let key = match each_key {
            Some(key_entry) => {
                let lookup = ObjectHandle::with_parent(Some(namespace), inherited.clone());
                lookup.set(&item_prop, value.clone());
                let scope = ctx.scope().with_context(namespace, lookup);
                let key = evaluate_and_call(key_entry, &scope, ctx.stores());
                scope.dispose();
                match key {
                    Ok(key) => key.key(),
                    Err(error) => {
                        diagnostics::report(&error);
                        value.key()
                    }
                }
            }
            None => value.key(),
        };
        let occurrence = seen.entry(key.clone()).or_insert(0);
        let slot_key = (key, *occurrence);
        *occurrence += 1;

        let item = match previous.shift_remove(&slot_key) {
            Some(item) => item,
            None => {
                let context = ObjectHandle::with_parent(Some(namespace), inherited.clone());
                let scope = ctx.scope().with_context(namespace, context.clone());
                let content: Vec<VNode> = ctx
                    .element()
                    .content
                    .iter()
                    .flatten()
                    .map(VNode::instantiate)
                    .collect();
                let nodes = content.iter().filter_map(|vnode| vnode.node().cloned()).collect();
                fresh.push((slot_key.clone(), content));
                Item {
                    context,
                    scope,
                    nodes,
                    instances: Vec::new(),
                }
            }
        };
        item.context.set(&item_prop, value);
        next.insert(slot_key, item);
    }

    for (_, stale) in previous {
        stale.dispose();
    }

    let template = ctx.node().clone();
    if let Some(parent) = template.parent() {
        let mut anchor = template;
        for item in next.values() {
            for node in &item.nodes {
                if !anchor.next_sibling().is_some_and(|sibling| sibling.ptr_eq(node)) {
                    parent.insert_after(node, &anchor);
                }
                anchor = node.clone();
            }
        }
    }

    for (key, content) in fresh {
        if let Some(item) = next.get_mut(&key) {
            item.instances = ctx.hydrate(&content, &item.scope);
        }
    }
    *items.lock() = next;
    Ok(())
}

fn each_child(ctx: &mut DirectiveContext<'_>) -> Result<()> {
    let Some(entry) = ctx.entries("each-child").iter().find(|entry| entry.is_default()) else {
        return Ok(());
    };
    if !ctx.evaluate(entry)?.is_pending() {
        ctx.remove_element();
    }
    Ok(())
}
