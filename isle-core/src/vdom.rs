//! The tree builder.
//!
//! [`to_vdom`] walks a live subtree once and produces the intermediate tree
//! the directive engine renders from: elements with their attributes and
//! parsed directive entries, text runs, and template content as a separate
//! subtree. Island roots found on the way are reported so that hydration
//! does not process them twice.
//!
//! The walk normalizes the live tree as a side effect: comments and
//! processing instructions are removed, CDATA sections become text. A second
//! pass over the same subtree therefore sees exactly what the first pass
//! produced.

use indexmap::IndexMap;

use crate::config::RuntimeConfig;
use crate::diagnostics;
use crate::directive::parse_directive_name;
use crate::dom::{markup, Node, NodeType};

/// The value of a directive attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveValue {
    /// A path expression or any other non-object text.
    Text(String),
    /// A JSON object, as used by `context`.
    Object(serde_json::Map<String, serde_json::Value>),
}

impl DirectiveValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DirectiveValue::Text(text) => Some(text),
            DirectiveValue::Object(_) => None,
        }
    }

    fn parse(raw: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => DirectiveValue::Object(map),
            _ => DirectiveValue::Text(raw.to_string()),
        }
    }
}

/// One directive attribute on one element.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveEntry {
    pub namespace: Option<String>,
    pub value: DirectiveValue,
    pub suffix: Option<String>,
    pub unique_id: Option<String>,
}

impl DirectiveEntry {
    /// Entries without a suffix are the directive's default entries.
    pub fn is_default(&self) -> bool {
        self.suffix.is_none()
    }
}

/// Directive entries of an element, grouped by directive name in order of
/// first appearance. Each group is sorted by suffix, then unique id.
pub type DirectiveMap = IndexMap<String, Vec<DirectiveEntry>>;

/// A node of the intermediate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum VNode {
    Text(VText),
    Element(VElement),
}

impl VNode {
    /// The live node this vnode is bound to, if any.
    pub fn node(&self) -> Option<&Node> {
        match self {
            VNode::Text(text) => text.node.as_ref(),
            VNode::Element(element) => element.node.as_ref(),
        }
    }

    pub fn as_element(&self) -> Option<&VElement> {
        match self {
            VNode::Element(element) => Some(element),
            VNode::Text(_) => None,
        }
    }

    /// Create live nodes for this vnode and return a copy bound to them.
    pub fn instantiate(&self) -> VNode {
        match self {
            VNode::Text(text) => VNode::Text(VText::bound(text.text.clone(), Node::text(text.text.clone()))),
            VNode::Element(element) => VNode::Element(element.instantiate()),
        }
    }
}

/// A text run.
#[derive(Debug, Clone)]
pub struct VText {
    pub text: String,
    pub node: Option<Node>,
}

impl VText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            node: None,
        }
    }

    pub fn bound(text: impl Into<String>, node: Node) -> Self {
        Self {
            text: text.into(),
            node: Some(node),
        }
    }
}

impl PartialEq for VText {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

/// An element.
///
/// Equality compares structure only, not the live node a vnode is bound to.
#[derive(Debug, Clone, Default)]
pub struct VElement {
    pub tag: String,
    /// Every attribute except `ref`, directives included.
    pub props: IndexMap<String, String>,
    pub directives: DirectiveMap,
    pub children: Vec<VNode>,
    /// Opaque markup kept verbatim instead of children.
    pub inner_html: Option<String>,
    /// Content of a `<template>`.
    pub content: Option<Vec<VNode>>,
    /// Whether this element is an island root.
    pub island: bool,
    pub node: Option<Node>,
}

impl VElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Entries of directive `name`, empty when absent.
    pub fn directive(&self, name: &str) -> &[DirectiveEntry] {
        self.directives.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_directives(&self) -> bool {
        !self.directives.is_empty()
    }

    fn instantiate(&self) -> VElement {
        let node = Node::element(&self.tag);
        for (name, value) in &self.props {
            node.set_attribute(name, value.clone());
        }
        let mut copy = VElement {
            tag: self.tag.clone(),
            props: self.props.clone(),
            directives: self.directives.clone(),
            children: Vec::with_capacity(self.children.len()),
            inner_html: self.inner_html.clone(),
            content: None,
            island: self.island,
            node: None,
        };
        if let Some(html) = &self.inner_html {
            markup::parse_into(&node, html);
        }
        for child in &self.children {
            let child = child.instantiate();
            if let Some(live) = child.node() {
                node.append_child(live);
            }
            copy.children.push(child);
        }
        if let (Some(content), Some(fragment)) = (&self.content, node.template_content()) {
            let mut bound = Vec::with_capacity(content.len());
            for child in content {
                let child = child.instantiate();
                if let Some(live) = child.node() {
                    fragment.append_child(live);
                }
                bound.push(child);
            }
            copy.content = Some(bound);
        }
        copy.node = Some(node);
        copy
    }
}

impl PartialEq for VElement {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.props == other.props
            && self.directives == other.directives
            && self.children == other.children
            && self.inner_html == other.inner_html
            && self.content == other.content
            && self.island == other.island
    }
}

/// Output of [`to_vdom`].
#[derive(Debug, Clone)]
pub struct BuiltTree {
    pub root: Option<VNode>,
    /// Island roots met during the walk, in document order.
    pub islands: Vec<Node>,
}

/// Build the intermediate tree for the subtree at `root`.
pub fn to_vdom(root: &Node, config: &RuntimeConfig) -> BuiltTree {
    let mut builder = TreeBuilder::new(config);
    let tree = builder.walk(root);
    builder.finish();
    BuiltTree {
        root: tree,
        islands: builder.islands,
    }
}

struct TreeBuilder<'a> {
    prefix: &'a str,
    interactive: String,
    ignore: String,
    namespaces: Vec<Option<String>>,
    islands: Vec<Node>,
    to_remove: Vec<Node>,
    to_replace: Vec<(Node, Node)>,
}

impl<'a> TreeBuilder<'a> {
    fn new(config: &'a RuntimeConfig) -> Self {
        Self {
            prefix: &config.directive_prefix,
            interactive: config.interactive_attribute(),
            ignore: config.ignore_attribute(),
            namespaces: Vec::new(),
            islands: Vec::new(),
            to_remove: Vec::new(),
            to_replace: Vec::new(),
        }
    }

    fn current_namespace(&self) -> Option<String> {
        self.namespaces.last().cloned().flatten()
    }

    fn walk(&mut self, node: &Node) -> Option<VNode> {
        match node.node_type() {
            NodeType::Text => {
                let text = node.data();
                (!text.is_empty()).then(|| VNode::Text(VText::bound(text, node.clone())))
            }
            NodeType::CData => {
                let text = node.data();
                let replacement = Node::text(text.clone());
                self.to_replace.push((node.clone(), replacement.clone()));
                (!text.is_empty()).then(|| VNode::Text(VText::bound(text, replacement)))
            }
            NodeType::Comment | NodeType::ProcessingInstruction => {
                self.to_remove.push(node.clone());
                None
            }
            NodeType::Document | NodeType::Fragment => None,
            NodeType::Element => Some(VNode::Element(self.walk_element(node))),
        }
    }

    fn walk_element(&mut self, node: &Node) -> VElement {
        let mut element = VElement::new(node.tag_name());
        element.node = Some(node.clone());

        let mut pending: Vec<(String, Option<String>, DirectiveValue)> = Vec::new();
        let mut ignore = false;
        let mut island = false;

        for (name, value) in node.attributes() {
            if name.len() > self.prefix.len() && name.starts_with(self.prefix) {
                if name == self.ignore {
                    ignore = true;
                } else {
                    let (namespace, raw) = split_namespace(&value);
                    let parsed = DirectiveValue::parse(raw);
                    if name == self.interactive {
                        island = true;
                        let namespace = match &parsed {
                            DirectiveValue::Text(text) => Some(text.clone()),
                            DirectiveValue::Object(map) => map
                                .get("namespace")
                                .and_then(serde_json::Value::as_str)
                                .map(str::to_string),
                        };
                        self.namespaces.push(namespace.filter(|ns| !ns.is_empty()));
                    } else {
                        pending.push((name.clone(), namespace.map(str::to_string), parsed));
                    }
                }
            } else if name == "ref" {
                continue;
            }
            element.props.insert(name, value);
        }

        if ignore && !island {
            element.inner_html = Some(node.inner_html());
            element.directives.insert(
                "ignore".to_string(),
                vec![DirectiveEntry {
                    namespace: self.current_namespace(),
                    value: DirectiveValue::Text(String::new()),
                    suffix: None,
                    unique_id: None,
                }],
            );
            return element;
        }
        if island {
            element.island = true;
            self.islands.push(node.clone());
        }

        for (name, namespace, value) in pending {
            let Some(parsed) = parse_directive_name(&name, self.prefix) else {
                diagnostics::warn(format!("Found malformed directive name: {name}."));
                continue;
            };
            element
                .directives
                .entry(parsed.prefix)
                .or_default()
                .push(DirectiveEntry {
                    namespace: namespace.or_else(|| self.current_namespace()),
                    value,
                    suffix: parsed.suffix,
                    unique_id: parsed.unique_id,
                });
        }
        for entries in element.directives.values_mut() {
            sort_entries(entries);
        }

        if element.directives.contains_key("each-child") {
            element.inner_html = Some(node.inner_html());
        } else if let Some(content) = node.template_content() {
            let children = content.children();
            element.content = Some(children.iter().filter_map(|child| self.walk(child)).collect());
        } else {
            element.children = node
                .children()
                .iter()
                .filter_map(|child| self.walk(child))
                .collect();
        }

        if island {
            self.namespaces.pop();
        }
        element
    }

    fn finish(&mut self) {
        for node in self.to_remove.drain(..) {
            node.remove();
        }
        for (cdata, text) in self.to_replace.drain(..) {
            cdata.replace_with(&text);
        }
    }
}

/// Sort entries by suffix, then unique id, with missing parts first.
pub fn sort_entries(entries: &mut [DirectiveEntry]) {
    entries.sort_by(|a, b| {
        let suffix = a.suffix.as_deref().unwrap_or("").cmp(b.suffix.as_deref().unwrap_or(""));
        suffix.then_with(|| {
            a.unique_id
                .as_deref()
                .unwrap_or("")
                .cmp(b.unique_id.as_deref().unwrap_or(""))
        })
    });
}

/// Split `ns::rest` into its namespace and reference. The namespace may
/// contain word characters, `-` and `/`; the reference must be non-empty
/// and on one line.
fn split_namespace(value: &str) -> (Option<&str>, &str) {
    let Some(index) = value.find("::") else {
        return (None, value);
    };
    let (namespace, rest) = (&value[..index], &value[index + 2..]);
    let valid_namespace = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '/');
    let valid_rest = !rest.is_empty()
        && !rest.contains(['\n', '\r', '\u{2028}', '\u{2029}']);
    if valid_namespace && valid_rest {
        (Some(namespace), rest)
    } else {
        (None, value)
    }
}
