//! Island discovery and hydration.
//!
//! [`Interactivity`] is the entry point a host embeds: it owns the store
//! registry, the directive registry and the document, loads server data on
//! creation and hydrates every island on [`init`](Interactivity::init).

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Instrument;

use crate::config::RuntimeConfig;
use crate::diagnostics;
use crate::directive::DirectiveRegistry;
use crate::dom::{Document, DomId, Node};
use crate::error::{Error, Result};
use crate::reconcile::{DomPatcher, Reconciler};
use crate::render::{hydrate_nodes, Instance, Renderer};
use crate::scope::Scope;
use crate::store::{parse_server_data, ServerData, Store, StoreLock, StorePart, StoreRegistry};
use crate::task::split_task;
use crate::vdom::{to_vdom, VNode};

struct Island {
    node: Node,
    vdom: VNode,
    instances: Vec<Instance>,
}

/// One interactivity runtime bound to one document.
///
/// ```rust,ignore
/// let runtime = Interactivity::new(Document::parse(html), RuntimeConfig::default())?;
/// runtime.store("counter", StorePart::new().state(json!({ "count": 0 })), StoreLock::Public)?;
/// runtime.init().await?;
/// ```
pub struct Interactivity {
    renderer: Arc<Renderer>,
    root_scope: Scope,
    hydrated: Mutex<HashSet<DomId>>,
    islands: Mutex<Vec<Island>>,
}

impl Interactivity {
    /// Create a runtime for `document` and load the server data it embeds.
    pub fn new(document: Document, config: RuntimeConfig) -> Result<Self> {
        Self::with_reconciler(document, config, Arc::new(DomPatcher))
    }

    pub fn with_reconciler(
        document: Document,
        config: RuntimeConfig,
        reconciler: Arc<dyn Reconciler>,
    ) -> Result<Self> {
        config.validate()?;
        diagnostics::set_debug(config.debug);
        let stores = Arc::new(StoreRegistry::new());
        let root_scope = Scope::with_navigation(stores.navigation().clone());
        let runtime = Self {
            renderer: Arc::new(Renderer {
                stores,
                directives: Arc::new(DirectiveRegistry::with_builtins()),
                reconciler,
                document,
                config,
            }),
            root_scope,
            hydrated: Mutex::new(HashSet::new()),
            islands: Mutex::new(Vec::new()),
        };
        runtime.populate_from_document();
        Ok(runtime)
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.renderer.stores
    }

    /// Register a store part. See [`StoreRegistry::store`].
    pub fn store(&self, namespace: &str, part: StorePart, lock: impl Into<StoreLock>) -> Result<Store> {
        self.renderer.stores.store(namespace, part, lock.into())
    }

    /// The directive registry. Directives registered before an island is
    /// hydrated apply to it.
    pub fn directives(&self) -> &DirectiveRegistry {
        &self.renderer.directives
    }

    pub fn document(&self) -> &Document {
        &self.renderer.document
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.renderer.config
    }

    /// The scope islands are hydrated in.
    pub fn root_scope(&self) -> &Scope {
        &self.root_scope
    }

    /// Read the server data embedded in the document and apply it.
    pub fn populate_from_document(&self) -> ServerData {
        let data = parse_server_data(&self.renderer.document, &self.renderer.config);
        self.populate(&data);
        data
    }

    /// Apply server data: state is merged into the stores, config and
    /// server state snapshots are replaced.
    pub fn populate(&self, data: &ServerData) {
        self.renderer.stores.populate_server_data(data);
    }

    /// Hydrate every island in the document, in document order.
    ///
    /// Yields to the scheduler before starting and, when
    /// `yield_between_islands` is set, before building each island and
    /// again before rendering it. Islands nested in an island are hydrated
    /// with it. Returns the number of islands hydrated by this call.
    pub async fn init(&self) -> Result<usize> {
        async {
            let attribute = self.renderer.config.interactive_attribute();
            let candidates = self.renderer.document.query_all_with_attribute(&attribute);
            let yielding = self.renderer.config.yield_between_islands;
            split_task().await;

            let mut count = 0;
            for node in candidates {
                if self.is_hydrated(&node) {
                    continue;
                }
                if yielding {
                    split_task().await;
                }
                let Some(vdom) = self.build(&node)? else {
                    continue;
                };
                if yielding {
                    split_task().await;
                }
                self.render_island(node, vdom);
                count += 1;
            }
            tracing::debug!(islands = count, "hydration finished");
            Ok(count)
        }
        .instrument(tracing::debug_span!("init"))
        .await
    }

    /// Hydrate one island now. Returns `false` when it was already
    /// hydrated.
    pub fn hydrate_island(&self, node: &Node) -> Result<bool> {
        let _span = tracing::debug_span!("hydrate_island", tag = node.tag_name()).entered();
        if self.is_hydrated(node) {
            return Ok(false);
        }
        let Some(vdom) = self.build(node)? else {
            return Ok(false);
        };
        self.render_island(node.clone(), vdom);
        Ok(true)
    }

    pub fn is_hydrated(&self, node: &Node) -> bool {
        self.hydrated.lock().contains(&node.id())
    }

    /// The tree an island was hydrated from.
    pub fn initial_vdom(&self, node: &Node) -> Option<VNode> {
        self.islands
            .lock()
            .iter()
            .find(|island| island.node.ptr_eq(node))
            .map(|island| island.vdom.clone())
    }

    /// Unmount every island: render effects stop, cleanups run and
    /// listeners are removed. The live tree keeps its last state.
    pub fn unmount_all(&self) {
        let islands = std::mem::take(&mut *self.islands.lock());
        for island in islands {
            for instance in &island.instances {
                instance.unmount();
            }
        }
        self.hydrated.lock().clear();
    }

    fn build(&self, node: &Node) -> Result<Option<VNode>> {
        if node.parent().is_none() {
            return Err(Error::Detached { what: "island" });
        }
        let tree = to_vdom(node, &self.renderer.config);
        self.hydrated
            .lock()
            .extend(tree.islands.iter().map(Node::id));
        Ok(tree.root)
    }

    fn render_island(&self, node: Node, vdom: VNode) {
        let instances = hydrate_nodes(&self.renderer, std::slice::from_ref(&vdom), &self.root_scope);
        tracing::debug!(tag = node.tag_name(), instances = instances.len(), "island hydrated");
        self.islands.lock().push(Island {
            node,
            vdom,
            instances,
        });
    }
}

impl fmt::Debug for Interactivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interactivity")
            .field("config", &self.renderer.config)
            .field("islands", &self.islands.lock().len())
            .finish()
    }
}
