//! Committing rendered element snapshots to the live tree.
//!
//! Rendering never touches the live tree directly. Each element instance
//! produces a fresh [`VElement`] per pass and hands it, together with the
//! snapshot it committed last time, to a [`Reconciler`]. The reconciler
//! applies the difference and binds the new snapshot to the live nodes it
//! reused or created, so the next pass diffs against it.
//!
//! Committing a snapshot against an identical previous one performs no
//! mutations. Nested island roots are left alone: they own their subtree.

use crate::dom::{markup, Node};
use crate::vdom::{VElement, VNode, VText};

/// Mutations performed by one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub attributes_set: usize,
    pub attributes_removed: usize,
    pub text_updated: usize,
    pub nodes_created: usize,
    pub nodes_removed: usize,
    pub inner_html_set: usize,
}

impl PatchStats {
    /// Total number of live-tree mutations.
    pub fn mutations(&self) -> usize {
        self.attributes_set
            + self.attributes_removed
            + self.text_updated
            + self.nodes_created
            + self.nodes_removed
            + self.inner_html_set
    }
}

impl std::ops::AddAssign for PatchStats {
    fn add_assign(&mut self, other: Self) {
        self.attributes_set += other.attributes_set;
        self.attributes_removed += other.attributes_removed;
        self.text_updated += other.text_updated;
        self.nodes_created += other.nodes_created;
        self.nodes_removed += other.nodes_removed;
        self.inner_html_set += other.inner_html_set;
    }
}

/// Applies element snapshots to the live tree.
pub trait Reconciler: Send + Sync {
    /// Bring `node` from `previous` to `next`, binding `next` and its
    /// descendants to the live nodes they now correspond to.
    fn commit(&self, node: &Node, previous: &VElement, next: &mut VElement) -> PatchStats;
}

/// The default reconciler: positional child diffing with in-place patches.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomPatcher;

impl Reconciler for DomPatcher {
    fn commit(&self, node: &Node, previous: &VElement, next: &mut VElement) -> PatchStats {
        let mut stats = PatchStats::default();
        next.node = Some(node.clone());
        patch_attributes(node, previous, next, &mut stats);

        match &next.inner_html {
            Some(html) => {
                if previous.inner_html.as_ref() != Some(html) {
                    for child in node.children() {
                        node.remove_child(&child);
                    }
                    markup::parse_into(node, html);
                    stats.inner_html_set += 1;
                }
            }
            None => self.patch_children(node, &previous.children, &mut next.children, &mut stats),
        }
        stats
    }
}

impl DomPatcher {
    fn patch_children(
        &self,
        parent: &Node,
        previous: &[VNode],
        next: &mut [VNode],
        stats: &mut PatchStats,
    ) {
        let mut last: Option<Node> = None;
        for (index, child) in next.iter_mut().enumerate() {
            let reusable = previous
                .get(index)
                .and_then(|old| old.node().cloned().map(|live| (old, live)));
            let live = match (reusable, child) {
                (Some((VNode::Text(old), live)), VNode::Text(new)) => {
                    if old.text != new.text {
                        live.set_data(new.text.clone());
                        stats.text_updated += 1;
                    }
                    new.node = Some(live.clone());
                    live
                }
                (Some((VNode::Element(old), live)), VNode::Element(new)) if old.tag == new.tag => {
                    if new.island {
                        new.node = Some(live.clone());
                    } else if old != new || new.node.is_none() {
                        *stats += self.commit(&live, old, new);
                    }
                    live
                }
                (reusable, child) => {
                    let created = child.instantiate();
                    let live = created.node().cloned().unwrap_or_else(|| Node::text(""));
                    *child = created;
                    match reusable {
                        Some((_, stale)) if stale.parent().is_some_and(|p| p.ptr_eq(parent)) => {
                            stale.replace_with(&live);
                            stats.nodes_removed += 1;
                        }
                        _ => insert_after(parent, &live, last.as_ref()),
                    }
                    stats.nodes_created += 1;
                    live
                }
            };
            last = Some(live);
        }

        for stale in previous.iter().skip(next.len()) {
            if let Some(node) = stale.node() {
                if parent.remove_child(node) {
                    stats.nodes_removed += 1;
                }
            }
        }
    }
}

fn patch_attributes(node: &Node, previous: &VElement, next: &VElement, stats: &mut PatchStats) {
    for (name, value) in &next.props {
        if previous.props.get(name) != Some(value) {
            node.set_attribute(name, value.clone());
            stats.attributes_set += 1;
        }
    }
    for name in previous.props.keys() {
        if !next.props.contains_key(name) && node.remove_attribute(name) {
            stats.attributes_removed += 1;
        }
    }
}

fn insert_after(parent: &Node, child: &Node, reference: Option<&Node>) {
    match reference {
        Some(reference) => parent.insert_after(child, reference),
        None => parent.insert_before(child, parent.first_child().as_ref()),
    }
}

/// A text-only child list, as rendered by text-setting directives.
pub fn text_children(text: Option<String>) -> Vec<VNode> {
    text.map(|text| vec![VNode::Text(VText::new(text))]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::dom::markup::parse_fragment;
    use crate::vdom::to_vdom;

    fn tree(markup: &str) -> (Node, VElement) {
        let fragment = parse_fragment(markup);
        let node = fragment.first_child().unwrap();
        let built = to_vdom(&node, &RuntimeConfig::default());
        let element = built.root.and_then(|root| root.as_element().cloned()).unwrap();
        (node, element)
    }

    #[test]
    fn identical_snapshots_commit_nothing() {
        let (node, element) = tree(
            r#"<div data-wp-interactive="ns" class="a"><p data-wp-text="state.x">1</p><template data-wp-each="state.l"><i></i></template>text</div>"#,
        );
        let before = node.outer_html();
        let mut next = element.clone();
        let stats = DomPatcher.commit(&node, &element, &mut next);
        assert_eq!(stats.mutations(), 0);
        assert_eq!(node.outer_html(), before);
        assert!(next.children[0].node().unwrap().ptr_eq(element.children[0].node().unwrap()));
    }

    #[test]
    fn attributes_and_text_are_patched_in_place() {
        let (node, element) = tree(r#"<p class="a" title="t">1</p>"#);
        let text_node = element.children[0].node().unwrap().clone();

        let mut next = element.clone();
        next.props.insert("class".into(), "a b".into());
        next.props.shift_remove("title");
        next.children = text_children(Some("2".into()));

        let stats = DomPatcher.commit(&node, &element, &mut next);
        assert_eq!(
            stats,
            PatchStats {
                attributes_set: 1,
                attributes_removed: 1,
                text_updated: 1,
                ..PatchStats::default()
            }
        );
        assert_eq!(node.outer_html(), r#"<p class="a b">2</p>"#);
        assert!(next.children[0].node().unwrap().ptr_eq(&text_node));
    }

    #[test]
    fn children_are_created_replaced_and_removed() {
        let (node, element) = tree("<ul><li>a</li><li>b</li><li>c</li></ul>");

        let mut next = element.clone();
        next.children.truncate(1);
        next.children.push(VNode::Text(VText::new("tail")));
        let stats = DomPatcher.commit(&node, &element, &mut next);
        assert_eq!(node.outer_html(), "<ul><li>a</li>tail</ul>");
        assert_eq!(stats.nodes_created, 1);
        assert_eq!(stats.nodes_removed, 2);

        let previous = next.clone();
        let mut emptied = next.clone();
        emptied.children.clear();
        DomPatcher.commit(&node, &previous, &mut emptied);
        assert_eq!(node.outer_html(), "<ul></ul>");

        let mut refilled = emptied.clone();
        refilled.children = text_children(Some("x".into()));
        let stats = DomPatcher.commit(&node, &emptied, &mut refilled);
        assert_eq!(stats.nodes_created, 1);
        assert_eq!(node.outer_html(), "<ul>x</ul>");
    }

    #[test]
    fn nested_islands_are_not_entered() {
        let (node, element) = tree(
            r#"<div data-wp-interactive="a"><section data-wp-interactive="b"><span>1</span></section></div>"#,
        );
        let mut next = element.clone();
        if let VNode::Element(section) = &mut next.children[0] {
            section.children.clear();
        }
        let stats = DomPatcher.commit(&node, &element, &mut next);
        assert_eq!(stats.mutations(), 0);
        assert!(node.outer_html().contains("<span>1</span>"));
    }

    #[test]
    fn inner_html_is_replaced_wholesale() {
        let (node, element) = tree("<div><b>x</b></div>");
        let mut next = element.clone();
        next.inner_html = Some("<i>y</i>".into());
        let stats = DomPatcher.commit(&node, &element, &mut next);
        assert_eq!(stats.inner_html_set, 1);
        assert_eq!(node.outer_html(), "<div><i>y</i></div>");
    }
}
