//! Markup reading and serialization.
//!
//! The reader is deliberately small: it handles the server-rendered markup
//! the runtime hydrates (elements, attributes, text, comments, processing
//! instructions, CDATA sections, void and raw-text elements, `<template>`
//! content) and recovers from stray end tags instead of failing. It is not
//! a conforming HTML5 parser.

use super::node::{Node, NodeType};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Parse markup into a detached fragment.
pub fn parse_fragment(markup: &str) -> Node {
    let root = Node::fragment();
    Reader::new(markup).read_into(&root);
    root
}

/// Parse markup into the children of `parent`.
pub fn parse_into(parent: &Node, markup: &str) {
    Reader::new(markup).read_into(parent);
}

struct Reader<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Read up to `terminator`, consuming it. Reads to the end if missing.
    fn take_until(&mut self, terminator: &str) -> &'a str {
        let rest = self.rest();
        match rest.find(terminator) {
            Some(end) => {
                self.pos += end + terminator.len();
                &rest[..end]
            }
            None => {
                self.pos = self.input.len();
                rest
            }
        }
    }

    fn read_into(&mut self, root: &Node) {
        let mut open: Vec<Node> = vec![root.clone()];

        while self.pos < self.input.len() {
            let container = container_of(open.last().unwrap_or(root));
            let rest = self.rest();

            if rest.starts_with("<!--") {
                self.pos += 4;
                let data = self.take_until("-->");
                container.append_child(&Node::comment(data));
            } else if rest.starts_with("<![CDATA[") {
                self.pos += 9;
                let data = self.take_until("]]>");
                container.append_child(&Node::cdata(data));
            } else if rest.starts_with("<?") {
                self.pos += 2;
                let body = self.take_until("?>");
                let (target, data) = match body.find(char::is_whitespace) {
                    Some(split) => (&body[..split], body[split..].trim_start()),
                    None => (body, ""),
                };
                container.append_child(&Node::processing_instruction(target, data));
            } else if rest.starts_with("<!") {
                // Doctype and other declarations carry nothing we keep.
                self.take_until(">");
            } else if rest.starts_with("</") {
                self.pos += 2;
                let name = self.take_until(">").trim().to_ascii_lowercase();
                if let Some(index) = open.iter().rposition(|node| node.tag_name() == name) {
                    if index > 0 {
                        open.truncate(index);
                    }
                }
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                let (element, self_closing) = self.read_start_tag();
                container.append_child(&element);
                let tag = element.tag_name().to_string();
                if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) && !self_closing {
                    let text = self.take_until(&format!("</{tag}>"));
                    if !text.is_empty() {
                        let text = if tag == "textarea" || tag == "title" {
                            decode_entities(text)
                        } else {
                            text.to_string()
                        };
                        element.append_child(&Node::text(text));
                    }
                } else if !self_closing && !is_void(&tag) {
                    open.push(element);
                }
            } else {
                let first = rest.chars().next().map_or(1, char::len_utf8);
                let end = rest[first..].find('<').map_or(rest.len(), |i| i + first);
                self.pos += end;
                container.append_child(&Node::text(decode_entities(&rest[..end])));
            }
        }
    }

    /// Read `<name attr=...>`; the reader is positioned on `<`.
    fn read_start_tag(&mut self) -> (Node, bool) {
        self.pos += 1;
        let name_len = self
            .rest()
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(self.rest().len());
        let element = Node::element(&self.rest()[..name_len]);
        self.pos += name_len;

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return (element, false);
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return (element, true);
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return (element, false);
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }

            let name_len = match rest
                .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/')
                .unwrap_or(rest.len())
            {
                0 => rest.chars().next().map_or(1, char::len_utf8),
                len => len,
            };
            let name = rest[..name_len].to_ascii_lowercase();
            self.pos += name_len;
            self.skip_whitespace();

            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.read_attribute_value()
            } else {
                String::new()
            };

            // The first occurrence of a duplicated attribute wins.
            if !element.has_attribute(&name) {
                element.set_attribute(&name, value);
            }
        }
    }

    fn read_attribute_value(&mut self) -> String {
        let rest = self.rest();
        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let raw = self.take_until(if quote == '"' { "\"" } else { "'" });
                decode_entities(raw)
            }
            _ => {
                let len = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += len;
                decode_entities(&rest[..len])
            }
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }
}

/// Children of a template go to its content fragment.
fn container_of(node: &Node) -> Node {
    node.template_content().cloned().unwrap_or_else(|| node.clone())
}

pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_text(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attribute(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

pub fn serialize(node: &Node) -> String {
    let mut out = String::new();
    write_node(node, false, &mut out);
    out
}

pub fn serialize_children(node: &Node) -> String {
    let mut out = String::new();
    write_children(node, &mut out);
    out
}

fn write_children(node: &Node, out: &mut String) {
    let source = container_of(node);
    let raw = RAW_TEXT_ELEMENTS.contains(&node.tag_name())
        && node.tag_name() != "textarea"
        && node.tag_name() != "title";
    for child in source.children() {
        write_node(&child, raw, out);
    }
}

fn write_node(node: &Node, raw_text: bool, out: &mut String) {
    match node.node_type() {
        NodeType::Text if raw_text => out.push_str(&node.data()),
        NodeType::Text => escape_text(&node.data(), out),
        NodeType::Comment => {
            out.push_str("<!--");
            out.push_str(&node.data());
            out.push_str("-->");
        }
        NodeType::CData => {
            out.push_str("<![CDATA[");
            out.push_str(&node.data());
            out.push_str("]]>");
        }
        NodeType::ProcessingInstruction => {
            out.push_str("<?");
            out.push_str(node.target());
            let data = node.data();
            if !data.is_empty() {
                out.push(' ');
                out.push_str(&data);
            }
            out.push_str("?>");
        }
        NodeType::Document | NodeType::Fragment => write_children(node, out),
        NodeType::Element => {
            let tag = node.tag_name();
            out.push('<');
            out.push_str(tag);
            for (name, value) in node.attributes() {
                out.push(' ');
                out.push_str(&name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    escape_attribute(&value, out);
                    out.push('"');
                }
            }
            out.push('>');
            if !is_void(tag) {
                write_children(node, out);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("<div>text</div>")]
    #[case::attributes(r#"<div id="a" data-wp-bind--hidden="!state.open">x</div>"#)]
    #[case::nested("<ul><li>1</li><li>2</li></ul>")]
    #[case::void_element(r#"<p>a<br>b<img src="x.png"></p>"#)]
    #[case::comment("<div><!-- note --></div>")]
    #[case::processing_instruction("<div><?pi data?></div>")]
    #[case::cdata("<div><![CDATA[raw]]></div>")]
    #[case::template("<template><span>item</span></template>")]
    #[case::boolean_attribute("<input disabled>")]
    #[case::escaped_text("<p>a &amp; b &lt; c</p>")]
    fn markup_round_trips(#[case] markup: &str) {
        assert_eq!(parse_fragment(markup).inner_html(), markup);
    }

    #[test]
    fn template_children_go_to_content() {
        let root = parse_fragment("<template><p>x</p></template>");
        let template = root.first_child().unwrap();
        assert_eq!(template.child_count(), 0);
        assert_eq!(template.template_content().unwrap().child_count(), 1);
    }

    #[test]
    fn attribute_quoting_variants() {
        let root = parse_fragment(r#"<a href=/x title='it"s' data-v="{&quot;a&quot;:1}" flag/>"#);
        let a = root.first_child().unwrap();
        assert_eq!(a.get_attribute("href").as_deref(), Some("/x"));
        assert_eq!(a.get_attribute("title").as_deref(), Some("it\"s"));
        assert_eq!(a.get_attribute("data-v").as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(a.get_attribute("flag").as_deref(), Some(""));
    }

    #[test]
    fn stray_end_tags_are_ignored() {
        let root = parse_fragment("<div><span>a</b></span></div>text");
        assert_eq!(root.inner_html(), "<div><span>a</span></div>text");
    }

    #[test]
    fn script_content_is_raw() {
        let root = parse_fragment(r#"<script type="application/json">{"a":"<b>"}</script>"#);
        let script = root.first_child().unwrap();
        assert_eq!(script.text_content(), r#"{"a":"<b>"}"#);
        assert_eq!(script.inner_html(), r#"{"a":"<b>"}"#);
    }

    #[test]
    fn numeric_entities_decode() {
        assert_eq!(decode_entities("&#65;&#x42;&unknown;&"), "AB&unknown;&");
    }
}
