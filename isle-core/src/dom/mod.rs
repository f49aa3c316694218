//! In-memory UI tree.
//!
//! The runtime treats the DOM as an external substrate: it walks it once per
//! hydration pass, reads attributes, attaches listeners and hands committed
//! snapshots to a reconciler. This module provides that substrate natively
//! so the whole pipeline runs (and is tested) without a browser:
//!
//! - [`Node`]: a shared handle to an element, text run, comment, processing
//!   instruction, CDATA section, fragment or document.
//! - [`Event`] / [`EventTarget`]: listener registration and bubbling
//!   dispatch.
//! - [`Document`]: a document node plus the window target that global event
//!   directives attach to.
//! - A small markup reader and serializer.

mod event;
pub mod markup;
mod node;

pub use event::{Event, EventArg, EventTarget, Listener, ListenerId};
pub use node::{DomId, Node, NodeType};

/// A document and its window.
#[derive(Debug, Clone)]
pub struct Document {
    root: Node,
    window: EventTarget,
}

impl Document {
    pub fn new() -> Self {
        Self {
            root: Node::document(),
            window: EventTarget::new(),
        }
    }

    /// Build a document from markup.
    pub fn parse(markup: &str) -> Self {
        let document = Self::new();
        markup::parse_into(&document.root, markup);
        document
    }

    /// The document node.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Listeners for `document`-level events.
    pub fn document_target(&self) -> &EventTarget {
        self.root.event_target()
    }

    /// Listeners for `window`-level events.
    pub fn window(&self) -> &EventTarget {
        &self.window
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Node> {
        self.root.get_element_by_id(id)
    }

    pub fn query_all_with_attribute(&self, attribute: &str) -> Vec<Node> {
        self.root.query_all_with_attribute(attribute)
    }

    pub fn to_html(&self) -> String {
        self.root.inner_html()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_in_document_order() {
        let document = Document::parse(
            r#"<div data-x="1"><p data-x="2"></p></div><span data-x="3"></span>
               <template><b data-x="hidden"></b></template>"#,
        );
        let found: Vec<_> = document
            .query_all_with_attribute("data-x")
            .iter()
            .filter_map(|node| node.get_attribute("data-x"))
            .collect();
        assert_eq!(found, vec!["1", "2", "3"]);
    }

    #[test]
    fn element_lookup_by_id() {
        let document = Document::parse(r#"<main><script id="data">{}</script></main>"#);
        let script = document.get_element_by_id("data").unwrap();
        assert_eq!(script.tag_name(), "script");
        assert!(document.get_element_by_id("missing").is_none());
    }
}
