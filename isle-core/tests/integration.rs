//! Integration Tests for Hydration
//!
//! These tests drive whole documents through the runtime: server data,
//! stores, island discovery, directives and reconciliation.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use isle_core::dom::{Document, Event, Node};
use isle_core::reconcile::{DomPatcher, PatchStats, Reconciler};
use isle_core::scope::get_context;
use isle_core::state::{Function, Getter, Value};
use isle_core::store::{StoreLock, StorePart, StoreRegistry};
use isle_core::vdom::{to_vdom, VElement, VNode};
use isle_core::{task, Error, Interactivity, RuntimeConfig};

fn config(prefix: &str) -> RuntimeConfig {
    let mut config = RuntimeConfig::with_prefix(prefix);
    config.yield_between_islands = false;
    config
}

fn runtime(markup: &str) -> Interactivity {
    Interactivity::new(Document::parse(markup), config("data-wp-")).unwrap()
}

fn by_id(runtime: &Interactivity, id: &str) -> Node {
    runtime
        .document()
        .get_element_by_id(id)
        .unwrap_or_else(|| panic!("no element #{id}"))
}

fn ns_runtime(markup: &str) -> Interactivity {
    Interactivity::new(Document::parse(markup), config("data-ns-")).unwrap()
}

/// Test that text follows the state it is bound to.
#[tokio::test]
async fn text_follows_state() {
    let runtime = ns_runtime(r#"<div id="count" data-ns-interactive="counter" data-ns-text="state.count"></div>"#);
    let store = runtime
        .store("counter", StorePart::new().state(json!({"count": 1})), StoreLock::Public)
        .unwrap();
    assert_eq!(runtime.init().await.unwrap(), 1);

    let div = by_id(&runtime, "count");
    assert_eq!(div.text_content(), "1");

    store.state().set("count", 2);
    assert_eq!(div.text_content(), "2");
}

/// Test that a negated context binding toggles a boolean attribute.
#[test]
fn negated_binding_toggles_hidden() {
    let runtime = ns_runtime(
        r#"<div id="panel" data-ns-interactive="panel" data-ns-context='{"isOpen": false}' data-ns-bind--hidden="!context.isOpen" data-ns-on--open="actions.open"></div>"#,
    );
    runtime
        .store(
            "panel",
            StorePart::new().action(
                "open",
                Function::new(|_| {
                    get_context(None)?.set("isOpen", true);
                    Ok(Value::Undefined)
                }),
            ),
            StoreLock::Public,
        )
        .unwrap();
    let panel = by_id(&runtime, "panel");
    runtime.hydrate_island(&panel).unwrap();
    assert_eq!(panel.get_attribute("hidden").as_deref(), Some(""));

    panel.dispatch_event(&Event::new("open"));
    assert!(!panel.has_attribute("hidden"));
}

/// Test that entries of one directive are ordered by unique id, whatever
/// the attribute order.
#[test]
fn unique_ids_sort_independently_of_source_order() {
    let document = Document::parse(r#"<div data-ns-interactive="ns" data-ns-test---b="x" data-ns-test---a="y"></div>"#);
    let root = document.root().first_child().unwrap();
    let tree = to_vdom(&root, &config("data-ns-"));
    let element = tree.root.as_ref().and_then(VNode::as_element).unwrap();
    let ids: Vec<Option<&str>> = element
        .directive("test")
        .iter()
        .map(|entry| entry.unique_id.as_deref())
        .collect();
    assert_eq!(ids, vec![Some("a"), Some("b")]);
}

/// Test that a custom directive prefix is honoured end to end.
#[tokio::test]
async fn custom_prefix() {
    let html = r#"<div data-isle-interactive="ns"><b id="b" data-isle-text="state.label"></b><i id="i" data-wp-text="state.label"></i></div>"#;
    let runtime = Interactivity::new(Document::parse(html), config("data-isle-")).unwrap();
    runtime
        .store("ns", StorePart::new().state(json!({"label": "hi"})), StoreLock::Public)
        .unwrap();
    runtime.init().await.unwrap();

    assert_eq!(by_id(&runtime, "b").text_content(), "hi");
    assert_eq!(by_id(&runtime, "i").text_content(), "");
}

/// Test that class tokens are added and removed independently.
#[test]
fn class_tokens_follow_state() {
    let runtime = runtime(
        r#"<div id="root" data-wp-interactive="ns" class="base" data-wp-class--active="state.on" data-wp-class--muted="!state.on"></div>"#,
    );
    let store = runtime
        .store("ns", StorePart::new().state(json!({"on": true})), StoreLock::Public)
        .unwrap();
    let root = by_id(&runtime, "root");
    runtime.hydrate_island(&root).unwrap();
    assert_eq!(root.get_attribute("class").as_deref(), Some("base active"));

    store.state().set("on", false);
    assert_eq!(root.get_attribute("class").as_deref(), Some("base muted"));
}

/// Test that server data seeds stores and registration merges into it.
#[test]
fn server_state_and_registration_merge() {
    let runtime = runtime(
        r#"<script type="application/json" id="wp-script-module-data-@wordpress/interactivity">{"state":{"ns":{"fromServer":1,"shared":"server"}}}</script>"#,
    );
    let store = runtime
        .store(
            "ns",
            StorePart::new().state(json!({"shared": "client", "fromClient": 2})),
            StoreLock::Public,
        )
        .unwrap();
    let state = store.state();
    assert_eq!(state.get("fromServer").as_f64(), Some(1.0));
    assert_eq!(state.get("fromClient").as_f64(), Some(2.0));
    assert_eq!(state.get("shared").as_str(), Some("server"));
    assert_eq!(
        runtime.stores().get_server_state(Some("ns")).unwrap().get("shared").as_str(),
        Some("server")
    );
}

/// Test store lock rules.
#[test]
fn store_locks() {
    let stores = StoreRegistry::new();
    stores
        .store("private", StorePart::new().state(json!({"a": 1})), "secret".into())
        .unwrap();
    assert!(matches!(
        stores.store("private", StorePart::new(), StoreLock::Public),
        Err(Error::InvalidLock { .. })
    ));

    let store = stores
        .store("private", StorePart::new().state(json!({"a": 2, "b": 3})), "secret".into())
        .unwrap();
    assert_eq!(store.state().get("a").as_f64(), Some(1.0));
    assert_eq!(store.state().get("b").as_f64(), Some(3.0));
    assert!(stores.store("private", StorePart::new(), StoreLock::universal()).is_ok());

    stores.store("public", StorePart::new(), StoreLock::Public).unwrap();
    assert!(matches!(
        stores.store("public", StorePart::new(), "late".into()),
        Err(Error::PublicStoreLock { .. })
    ));
}

/// Test that keyed lists move existing items instead of recreating them.
#[test]
fn each_reorders_by_key() {
    let runtime = runtime(
        r#"<ul id="list" data-wp-interactive="list"><template data-wp-each="state.items" data-wp-each-key="context.item.id"><li data-wp-text="context.item.name"></li></template></ul>"#,
    );
    let items = json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}, {"id": 3, "name": "c"}]);
    let store = runtime
        .store("list", StorePart::new().state(json!({"items": items})), StoreLock::Public)
        .unwrap();
    let ul = by_id(&runtime, "list");
    runtime.hydrate_island(&ul).unwrap();

    let rendered = ul.children();
    assert_eq!(rendered.len(), 4);
    assert_eq!(rendered[0].tag_name(), "template");
    let texts: Vec<String> = rendered[1..].iter().map(Node::text_content).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);

    let reordered = json!([{"id": 3, "name": "c"}, {"id": 1, "name": "a!"}, {"id": 2, "name": "b"}]);
    store
        .state()
        .set("items", Value::from_json(Some("list"), &reordered));

    let moved = ul.children();
    assert!(moved[1].ptr_eq(&rendered[3]));
    assert!(moved[2].ptr_eq(&rendered[1]));
    assert!(moved[3].ptr_eq(&rendered[2]));
    assert_eq!(moved[2].text_content(), "a!");

    store
        .state()
        .set("items", Value::from_json(Some("list"), &json!([{"id": 2, "name": "b"}])));
    let remaining = ul.children();
    assert_eq!(remaining.len(), 2);
    assert!(remaining[1].ptr_eq(&rendered[2]));
}

/// Test that nested contexts inherit and shadow their parents.
#[test]
fn context_inheritance_and_shadowing() {
    let runtime = runtime(
        r#"<div id="root" data-wp-interactive="ns" data-wp-context='{"a": 1, "b": {"x": 7}}'>
            <span id="outer" data-wp-text="context.a"></span>
            <div data-wp-context='{"a": 2}'>
                <span id="inner-a" data-wp-text="context.a"></span>
                <span id="inner-x" data-wp-text="context.b.x"></span>
            </div>
        </div>"#,
    );
    runtime.hydrate_island(&by_id(&runtime, "root")).unwrap();

    assert_eq!(by_id(&runtime, "outer").text_content(), "1");
    assert_eq!(by_id(&runtime, "inner-a").text_content(), "2");
    assert_eq!(by_id(&runtime, "inner-x").text_content(), "7");
}

/// Test that an action reached through an event handler sees its element's
/// context and updates the tree.
#[test]
fn click_runs_action() {
    let runtime = runtime(
        r#"<div data-wp-interactive="counter" data-wp-context='{"step": 2}'><button id="btn" data-wp-on--click="actions.increment" data-wp-text="state.count">0</button></div>"#,
    );
    let store = runtime
        .store("counter", StorePart::new().state(json!({"count": 0})), StoreLock::Public)
        .unwrap();
    let state = store.state();
    runtime
        .store(
            "counter",
            StorePart::new().action(
                "increment",
                Function::new(move |_| {
                    let step = get_context(None)?.get("step").as_f64().unwrap_or(1.0);
                    let count = state.peek("count").as_f64().unwrap_or(0.0);
                    state.set("count", count + step);
                    Ok(Value::Undefined)
                }),
            ),
            StoreLock::Public,
        )
        .unwrap();
    let root = runtime.document().root().first_child().unwrap();
    runtime.hydrate_island(&root).unwrap();

    let button = by_id(&runtime, "btn");
    assert_eq!(button.text_content(), "0");
    button.dispatch_event(&Event::new("click"));
    button.dispatch_event(&Event::new("click"));
    assert_eq!(button.text_content(), "4");
}

/// Test that async actions keep their scope across awaits.
#[tokio::test]
async fn async_actions_keep_their_scope() {
    let runtime = runtime(
        r#"<div data-wp-interactive="ns"><button id="a" data-wp-context='{"id": "first"}' data-wp-on--click="actions.report"></button></div>"#,
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    runtime
        .store(
            "ns",
            StorePart::new().action(
                "report",
                Function::new_async(move |_| {
                    let tx = tx.clone();
                    async move {
                        task::split_task().await;
                        let id = get_context(None)?.get("id").to_js_string();
                        let _ = tx.send(id);
                        Ok::<_, Error>(Value::Undefined)
                    }
                }),
            ),
            StoreLock::Public,
        )
        .unwrap();
    runtime.init().await.unwrap();

    by_id(&runtime, "a").dispatch_event(&Event::new("click"));
    assert_eq!(rx.recv().await.as_deref(), Some("first"));
}

/// Test that islands hydrate once, in document order.
#[tokio::test]
async fn init_hydrates_islands_in_order() {
    let runtime = runtime(
        r#"<section id="one" data-wp-interactive="a" data-wp-log=""></section><section id="two" data-wp-interactive="b" data-wp-log=""></section>"#,
    );
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    runtime
        .directives()
        .register("log", isle_core::directive::DEFAULT_PRIORITY, move |ctx| {
            sink.lock().push(ctx.node().get_attribute("id").unwrap_or_default());
            Ok(())
        });

    assert_eq!(runtime.init().await.unwrap(), 2);
    assert_eq!(*log.lock(), vec!["one", "two"]);
    assert_eq!(runtime.init().await.unwrap(), 0);
    assert_eq!(log.lock().len(), 2);
}

/// Test that watchers run once on mount and then once per frame.
#[test]
fn watch_coalesces_per_frame() {
    let runtime = runtime(r#"<div id="root" data-wp-interactive="ns" data-wp-watch="callbacks.log"></div>"#);
    let store = runtime
        .store("ns", StorePart::new().state(json!({"count": 0})), StoreLock::Public)
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (sink, state) = (seen.clone(), store.state());
    runtime
        .store(
            "ns",
            StorePart::new().callback(
                "log",
                Function::new(move |_| {
                    sink.lock().push(state.get("count").to_js_string());
                    Ok(Value::Undefined)
                }),
            ),
            StoreLock::Public,
        )
        .unwrap();
    runtime.hydrate_island(&by_id(&runtime, "root")).unwrap();
    assert_eq!(*seen.lock(), vec!["0"]);

    store.state().set("count", 1);
    assert_eq!(seen.lock().len(), 1);
    task::run_frame();
    assert_eq!(*seen.lock(), vec!["0", "1"]);

    store.state().set("count", 2);
    store.state().set("count", 3);
    task::run_frame();
    assert_eq!(*seen.lock(), vec!["0", "1", "3"]);
}

/// Test that comments and processing instructions are dropped from
/// islands while the rest of the markup is kept.
#[test]
fn comments_are_removed_from_islands() {
    let runtime = runtime(r#"<div id="root" data-wp-interactive="ns"><!-- note --><p>x</p><?pi data?></div>"#);
    let root = by_id(&runtime, "root");
    runtime.hydrate_island(&root).unwrap();
    assert_eq!(root.inner_html(), "<p>x</p>");
}

struct Counting {
    stats: Arc<Mutex<PatchStats>>,
}

impl Reconciler for Counting {
    fn commit(&self, node: &Node, previous: &VElement, next: &mut VElement) -> PatchStats {
        let stats = DomPatcher.commit(node, previous, next);
        *self.stats.lock() += stats;
        stats
    }
}

/// Test that hydrating markup that already matches the state leaves the
/// tree untouched.
#[test]
fn matching_markup_hydrates_without_mutations() {
    let html = r#"<div id="root" data-wp-interactive="ns" data-wp-context='{"open": true}'>
        <span data-wp-text="state.label" data-wp-bind--title="state.label" title="hi">hi</span>
        <p class="shown" data-wp-class--shown="context.open" data-wp-bind--hidden="!context.open">x</p>
    </div>"#;
    let stats = Arc::new(Mutex::new(PatchStats::default()));
    let runtime = Interactivity::with_reconciler(
        Document::parse(html),
        config("data-wp-"),
        Arc::new(Counting { stats: stats.clone() }),
    )
    .unwrap();
    runtime
        .store("ns", StorePart::new().state(json!({"label": "hi"})), StoreLock::Public)
        .unwrap();
    let before = runtime.document().to_html();
    runtime.hydrate_island(&by_id(&runtime, "root")).unwrap();

    assert_eq!(stats.lock().mutations(), 0);
    assert_eq!(runtime.document().to_html(), before);
}

/// Test that the writes of one event handler re-render their readers once,
/// with every write already applied.
#[test]
fn event_writes_render_once() {
    let runtime = runtime(
        r#"<div data-wp-interactive="ns"><button id="btn" data-wp-on--click="actions.both" data-wp-text="state.label"></button></div>"#,
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let store = runtime
        .store(
            "ns",
            StorePart::new().state(json!({"a": 0, "b": 0})).derived(
                "label",
                Getter::new(move |state| {
                    let label = format!("{}-{}", state.get("a").to_js_string(), state.get("b").to_js_string());
                    sink.lock().push(label.clone());
                    Value::from(label)
                }),
            ),
            StoreLock::Public,
        )
        .unwrap();
    let state = store.state();
    runtime
        .store(
            "ns",
            StorePart::new().action(
                "both",
                Function::new(move |_| {
                    state.set("a", 1);
                    state.set("b", 1);
                    Ok(Value::Undefined)
                }),
            ),
            StoreLock::Public,
        )
        .unwrap();
    let root = runtime.document().root().first_child().unwrap();
    runtime.hydrate_island(&root).unwrap();
    assert_eq!(*seen.lock(), vec!["0-0"]);

    let button = by_id(&runtime, "btn");
    button.dispatch_event(&Event::new("click"));
    assert_eq!(*seen.lock(), vec!["0-0", "1-1"]);
    assert_eq!(button.text_content(), "1-1");
}

/// Test that a failing entry leaves the other entries of the same directive
/// applied.
#[test]
fn failing_entries_do_not_block_their_siblings() {
    let runtime = runtime(
        r#"<div id="root" data-wp-interactive="ns" data-wp-bind--aaa="actions.bad" data-wp-bind--title="state.t" data-wp-class--broken="actions.bad" data-wp-class--fine="state.on" data-wp-style--width="actions.bad" data-wp-style--color="state.color"></div>"#,
    );
    runtime
        .store(
            "ns",
            StorePart::new()
                .state(json!({"t": "hello", "on": true, "color": "red"}))
                .action("bad", Function::new(|_| Err(Error::action("broken")))),
            StoreLock::Public,
        )
        .unwrap();
    let root = by_id(&runtime, "root");
    runtime.hydrate_island(&root).unwrap();

    assert_eq!(root.get_attribute("title").as_deref(), Some("hello"));
    assert!(!root.has_attribute("aaa"));
    assert_eq!(root.get_attribute("class").as_deref(), Some("fine"));
    assert_eq!(root.get_attribute("style").as_deref(), Some("color: red;"));
}

/// Test that a list whose key callback fails keeps exactly one element per
/// item, and recovers once the callback works again.
#[test]
fn each_survives_failing_keys() {
    let runtime = runtime(
        r#"<ul id="list" data-wp-interactive="list"><template data-wp-each="state.items" data-wp-each-key="actions.key"><li data-wp-text="context.item"></li></template></ul>"#,
    );
    let store = runtime
        .store(
            "list",
            StorePart::new().state(json!({"items": ["a", "b"], "fail": false})),
            StoreLock::Public,
        )
        .unwrap();
    let state = store.state();
    runtime
        .store(
            "list",
            StorePart::new().action(
                "key",
                Function::new(move |_| {
                    if state.get("fail").is_truthy() {
                        return Err(Error::action("no key"));
                    }
                    Ok(get_context(None)?.get("item"))
                }),
            ),
            StoreLock::Public,
        )
        .unwrap();
    let ul = by_id(&runtime, "list");
    runtime.hydrate_island(&ul).unwrap();

    let texts = |ul: &Node| -> Vec<String> { ul.children()[1..].iter().map(Node::text_content).collect() };
    assert_eq!(texts(&ul), vec!["a", "b"]);

    store.state().set("fail", true);
    store
        .state()
        .set("items", Value::from_json(Some("list"), &json!(["a", "b", "c"])));
    assert_eq!(texts(&ul), vec!["a", "b", "c"]);

    store.state().set("fail", false);
    assert_eq!(texts(&ul), vec!["a", "b", "c"]);
}

/// Test that directives reading a pending value leave the element as it is.
#[test]
fn pending_values_leave_elements_untouched() {
    let runtime = runtime(
        r#"<div id="root" data-wp-interactive="ns"><span id="text" data-wp-text="state.label">server</span><a id="link" title="server" data-wp-bind--title="state.label"></a><p id="cls" class="on" data-wp-class--on="state.label"></p><p id="sty" style="color: red;" data-wp-style--color="state.label"></p><ul id="pending"><template data-wp-each="state.later"><li data-wp-text="context.item"></li></template><li id="kept" data-wp-each-child="state.later">s</li></ul><ul id="ready"><template data-wp-each="state.now"><li data-wp-text="context.item"></li></template><li id="stale" data-wp-each-child="state.now">s</li></ul></div>"#,
    );
    let store = runtime
        .store("ns", StorePart::new().state(json!({"now": ["x"]})), StoreLock::Public)
        .unwrap();
    store.state().set("label", Value::Pending);
    store.state().set("later", Value::Pending);
    let before = runtime.document().to_html();
    let root = by_id(&runtime, "root");
    runtime.hydrate_island(&root).unwrap();

    assert_eq!(by_id(&runtime, "text").text_content(), "server");
    assert_eq!(by_id(&runtime, "link").get_attribute("title").as_deref(), Some("server"));
    assert_eq!(by_id(&runtime, "cls").get_attribute("class").as_deref(), Some("on"));
    assert_eq!(by_id(&runtime, "sty").get_attribute("style").as_deref(), Some("color: red;"));
    assert!(runtime.document().get_element_by_id("kept").is_some());
    assert!(runtime.document().get_element_by_id("stale").is_none());
    assert_ne!(runtime.document().to_html(), before);

    store.state().set("label", "blue");
    assert_eq!(by_id(&runtime, "text").text_content(), "blue");
    assert_eq!(by_id(&runtime, "link").get_attribute("title").as_deref(), Some("blue"));
    assert_eq!(by_id(&runtime, "sty").get_attribute("style").as_deref(), Some("color: blue;"));
}
