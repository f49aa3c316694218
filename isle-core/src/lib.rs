//! Isle Core
//!
//! This crate provides the runtime of the Isle interactivity layer: server
//! rendered HTML marked up with directive attributes becomes interactive
//! once its islands are hydrated against client-side stores.
//!
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects) and a dependency graph
//! - Reactive store state with per-scope getter caching
//! - Namespaced stores with optional locks, fed by embedded server data
//! - Directive parsing, a virtual tree of islands and a directive engine
//! - Reconciliation of rendered snapshots against the live tree
//!
//! # Architecture
//!
//! - `reactive` and `graph`: signals, memos, effects and their dependencies
//! - `state`: reactive objects, getters, functions and deep merge
//! - `scope`: element scopes, context layering and the evaluation frame
//! - `store`: the store registry and server data
//! - `dom`: the document the runtime hydrates
//! - `vdom`: the virtual tree built from an island
//! - `directive`: directive names, evaluation and the builtin directives
//! - `render` and `reconcile`: element instances and DOM patching
//! - `hydrate`: island discovery and the [`Interactivity`] entry point
//! - `task`: microtasks, frames and cooperative yields
//!
//! # Example
//!
//! ```rust,ignore
//! use isle_core::{Document, Interactivity, RuntimeConfig, StoreLock, StorePart};
//! use serde_json::json;
//!
//! let html = r#"<div data-wp-interactive="counter">
//!     <span data-wp-text="state.count">0</span>
//! </div>"#;
//!
//! let runtime = Interactivity::new(Document::parse(html), RuntimeConfig::default())?;
//! let store = runtime.store("counter", StorePart::new().state(json!({ "count": 1 })), StoreLock::Public)?;
//! runtime.init().await?;
//!
//! // Renders "1", then "2" once the write lands.
//! store.state().set("count", 2.0);
//! ```

pub mod config;
pub mod diagnostics;
pub mod directive;
pub mod dom;
pub mod error;
pub mod graph;
pub mod hydrate;
pub mod reactive;
pub mod reconcile;
pub mod render;
pub mod scope;
pub mod state;
pub mod store;
pub mod task;
pub mod utils;
pub mod vdom;

pub use config::RuntimeConfig;
pub use directive::{DirectiveContext, DirectiveRegistry};
pub use dom::{Document, Event, EventArg, Node};
pub use error::{Error, Result};
pub use hydrate::Interactivity;
pub use reactive::{batch, untrack, Effect, Memo, Signal};
pub use reconcile::{DomPatcher, PatchStats, Reconciler};
pub use render::Cleanup;
pub use scope::{get_context, get_element, get_server_context, scoped, with_scope, Scope};
pub use state::{CallArgs, Function, Getter, ObjectHandle, Source, Value};
pub use store::{Store, StoreLock, StorePart, StoreRegistry, UNIVERSAL_UNLOCK};
