//! UI tree nodes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::event::{Event, EventTarget, Listener, ListenerId};
use super::markup;

/// Stable identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomId(u64);

impl DomId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Document,
    Fragment,
    Element,
    Text,
    Comment,
    ProcessingInstruction,
    CData,
}

/// A node of the UI tree. Clones are handles to the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    id: DomId,
    node_type: NodeType,
    /// Tag name for elements, target for processing instructions.
    name: String,
    /// Character data for text-like nodes.
    data: RwLock<String>,
    attributes: RwLock<IndexMap<String, String>>,
    children: RwLock<Vec<Node>>,
    parent: RwLock<Weak<NodeInner>>,
    /// Declarative content of `<template>` elements.
    content: Option<Node>,
    events: EventTarget,
}

impl Node {
    fn build(node_type: NodeType, name: &str, data: String) -> Self {
        let content = (node_type == NodeType::Element && name == "template")
            .then(|| Self::build(NodeType::Fragment, "", String::new()));
        Self {
            inner: Arc::new(NodeInner {
                id: DomId::new(),
                node_type,
                name: name.to_string(),
                data: RwLock::new(data),
                attributes: RwLock::new(IndexMap::new()),
                children: RwLock::new(Vec::new()),
                parent: RwLock::new(Weak::new()),
                content,
                events: EventTarget::new(),
            }),
        }
    }

    pub fn document() -> Self {
        Self::build(NodeType::Document, "#document", String::new())
    }

    pub fn fragment() -> Self {
        Self::build(NodeType::Fragment, "", String::new())
    }

    pub fn element(tag: &str) -> Self {
        Self::build(NodeType::Element, &tag.to_ascii_lowercase(), String::new())
    }

    pub fn text(data: impl Into<String>) -> Self {
        Self::build(NodeType::Text, "", data.into())
    }

    pub fn comment(data: impl Into<String>) -> Self {
        Self::build(NodeType::Comment, "", data.into())
    }

    pub fn processing_instruction(target: &str, data: impl Into<String>) -> Self {
        Self::build(NodeType::ProcessingInstruction, target, data.into())
    }

    pub fn cdata(data: impl Into<String>) -> Self {
        Self::build(NodeType::CData, "", data.into())
    }

    /// Parse markup into a detached fragment.
    pub fn from_markup(markup: &str) -> Self {
        markup::parse_fragment(markup)
    }

    pub fn id(&self) -> DomId {
        self.inner.id
    }

    pub fn node_type(&self) -> NodeType {
        self.inner.node_type
    }

    pub fn is_element(&self) -> bool {
        self.inner.node_type == NodeType::Element
    }

    /// Lowercase tag name of an element; empty for other nodes.
    pub fn tag_name(&self) -> &str {
        match self.inner.node_type {
            NodeType::Element => &self.inner.name,
            _ => "",
        }
    }

    /// Target of a processing instruction.
    pub fn target(&self) -> &str {
        &self.inner.name
    }

    /// Character data of a text, comment, CDATA or processing instruction.
    pub fn data(&self) -> String {
        self.inner.data.read().clone()
    }

    pub fn set_data(&self, data: impl Into<String>) {
        *self.inner.data.write() = data.into();
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match self.inner.node_type {
            NodeType::Text | NodeType::CData => self.data(),
            NodeType::Comment | NodeType::ProcessingInstruction => String::new(),
            _ => {
                let mut out = String::new();
                for child in self.children() {
                    if matches!(
                        child.node_type(),
                        NodeType::Text | NodeType::CData | NodeType::Element
                    ) {
                        out.push_str(&child.text_content());
                    }
                }
                out
            }
        }
    }

    /// Replace all children with a single text node (none if empty).
    pub fn set_text_content(&self, text: &str) {
        for child in self.children() {
            self.remove_child(&child);
        }
        if !text.is_empty() {
            self.append_child(&Node::text(text));
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.inner.attributes.read().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.attributes.read().contains_key(name)
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        self.inner
            .attributes
            .write()
            .insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        self.inner.attributes.write().shift_remove(name).is_some()
    }

    /// Snapshot of the attributes in document order.
    pub fn attributes(&self) -> IndexMap<String, String> {
        self.inner.attributes.read().clone()
    }

    // ------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.read().upgrade().map(|inner| Node { inner })
    }

    pub fn children(&self) -> Vec<Node> {
        self.inner.children.read().clone()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.read().len()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.inner.children.read().first().cloned()
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let children = parent.inner.children.read();
        let index = children.iter().position(|child| child.ptr_eq(self))?;
        children.get(index + 1).cloned()
    }

    /// Content fragment of a `<template>` element.
    pub fn template_content(&self) -> Option<&Node> {
        self.inner.content.as_ref()
    }

    /// Append `child`, detaching it from its current parent first.
    pub fn append_child(&self, child: &Node) {
        child.remove();
        *child.inner.parent.write() = Arc::downgrade(&self.inner);
        self.inner.children.write().push(child.clone());
    }

    /// Insert `child` before `reference`, or at the end if `reference` is
    /// `None` or not a child of this node.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if reference.is_some_and(|r| r.ptr_eq(child)) {
            return;
        }
        child.remove();
        *child.inner.parent.write() = Arc::downgrade(&self.inner);
        let mut children = self.inner.children.write();
        let index = reference
            .and_then(|r| children.iter().position(|c| c.ptr_eq(r)))
            .unwrap_or(children.len());
        children.insert(index, child.clone());
    }

    /// Insert `child` right after `reference`.
    pub fn insert_after(&self, child: &Node, reference: &Node) {
        match reference.next_sibling() {
            Some(next) => self.insert_before(child, Some(&next)),
            None => self.append_child(child),
        }
    }

    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut children = self.inner.children.write();
            let before = children.len();
            children.retain(|c| !c.ptr_eq(child));
            children.len() != before
        };
        if removed {
            *child.inner.parent.write() = Weak::new();
        }
        removed
    }

    /// Detach this node from its parent.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Put `replacement` where this node is.
    pub fn replace_with(&self, replacement: &Node) {
        if let Some(parent) = self.parent() {
            parent.insert_before(replacement, Some(self));
            parent.remove_child(self);
        }
    }

    pub fn is_connected_to(&self, ancestor: &Node) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.ptr_eq(ancestor) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Descendant elements carrying `attribute`, in document order.
    ///
    /// Template content is not searched.
    pub fn query_all_with_attribute(&self, attribute: &str) -> Vec<Node> {
        let mut found = Vec::new();
        self.collect_with_attribute(attribute, &mut found);
        found
    }

    fn collect_with_attribute(&self, attribute: &str, found: &mut Vec<Node>) {
        for child in self.children() {
            if child.is_element() {
                if child.has_attribute(attribute) {
                    found.push(child.clone());
                }
                child.collect_with_attribute(attribute, found);
            }
        }
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Node> {
        for child in self.children() {
            if child.is_element() {
                if child.get_attribute("id").as_deref() == Some(id) {
                    return Some(child);
                }
                if let Some(found) = child.get_element_by_id(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn event_target(&self) -> &EventTarget {
        &self.inner.events
    }

    pub fn add_event_listener(&self, event_type: &str, callback: Listener) -> ListenerId {
        self.inner.events.add_listener(event_type, callback)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    /// Dispatch `event` at this node and bubble it up through its ancestors.
    pub fn dispatch_event(&self, event: &Event) {
        event.set_target(self);
        let mut current = Some(self.clone());
        while let Some(node) = current {
            event.set_current_target(Some(&node));
            node.inner.events.invoke(event);
            if event.propagation_stopped() {
                break;
            }
            current = node.parent();
        }
        event.set_current_target(None);
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn inner_html(&self) -> String {
        markup::serialize_children(self)
    }

    pub fn outer_html(&self) -> String {
        markup::serialize(self)
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.node_type {
            NodeType::Element => write!(f, "<{}#{}>", self.inner.name, self.inner.id.0),
            other => write!(f, "{other:?}#{}", self.inner.id.0),
        }
    }
}
