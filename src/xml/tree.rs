//! Owned, mutable XML element tree.
//!
//! `roxmltree` gives a fast read-only parse; the structural rewriter needs to
//! mutate and re-serialize, so the parse is converted into an owned tree
//! first. Text placement follows the lxml model: an element's `text` sits
//! between its opening tag and its first child, a node's `tail` between its
//! closing tag and the next sibling. That keeps surrounding indentation
//! attached to the nodes being moved.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("document has no root element")]
    NoRoot,
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Comment(Comment),
    Instruction(Instruction),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn tail(&self) -> &str {
        match self {
            Node::Element(el) => &el.tail,
            Node::Comment(c) => &c.tail,
            Node::Instruction(pi) => &pi.tail,
        }
    }

    pub fn set_tail(&mut self, tail: impl Into<String>) {
        let tail = tail.into();
        match self {
            Node::Element(el) => el.tail = tail,
            Node::Comment(c) => c.tail = tail,
            Node::Instruction(pi) => pi.tail = tail,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub text: String,
    pub tail: String,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub target: String,
    pub value: Option<String>,
    pub tail: String,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    /// Attributes in document order
    pub attrs: Vec<(String, String)>,
    /// Text between the opening tag and the first child
    pub text: String,
    /// Text between this element's closing tag and the next sibling
    pub tail: String,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            text: String::new(),
            tail: String::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(index).1)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }
}

/// A parsed XML document ready for mutation and re-serialization.
#[derive(Debug, Clone)]
pub struct Document {
    /// The `<?xml ...?>` declaration with its trailing whitespace, verbatim
    pub decl: Option<String>,
    /// Top-level nodes: the root element plus any surrounding comments
    pub nodes: Vec<Node>,
    crlf: bool,
}

impl Document {
    pub fn parse(source: &str) -> Result<Self, XmlError> {
        let crlf = source.contains("\r\n");
        let decl = capture_declaration(source);

        let parsed = roxmltree::Document::parse(source)?;
        let mut nodes = Vec::new();
        for child in parsed.root().children() {
            if let Some(node) = convert_node(child) {
                nodes.push(node);
            }
        }
        // Whitespace between top-level nodes is not reported by the parser;
        // a newline separator matches how these files are written.
        for node in nodes.iter_mut() {
            node.set_tail("\n");
        }
        if nodes.iter().all(|n| n.as_element().is_none()) {
            return Err(XmlError::NoRoot);
        }

        Ok(Self { decl, nodes, crlf })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(Node::as_element)
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(Node::as_element_mut)
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if let Some(decl) = &self.decl {
            out.push_str(decl);
        }
        for node in &self.nodes {
            write_node(&mut out, node);
        }
        if self.crlf {
            out = out.replace('\n', "\r\n");
        }
        out
    }
}

fn capture_declaration(source: &str) -> Option<String> {
    let start = source.find("<?xml")?;
    if !source[..start].trim().is_empty() {
        return None;
    }
    let end = start + source[start..].find("?>")? + 2;
    let trailing = source[end..].len() - source[end..].trim_start().len();
    Some(source[..end + trailing].replace('\r', ""))
}

fn convert_node(node: roxmltree::Node<'_, '_>) -> Option<Node> {
    match node.node_type() {
        roxmltree::NodeType::Element => Some(Node::Element(convert_element(node))),
        roxmltree::NodeType::Comment => Some(Node::Comment(Comment {
            text: node.text().unwrap_or_default().to_string(),
            tail: String::new(),
        })),
        roxmltree::NodeType::PI => node.pi().map(|pi| {
            Node::Instruction(Instruction {
                target: pi.target.to_string(),
                value: pi.value.map(str::to_string),
                tail: String::new(),
            })
        }),
        _ => None,
    }
}

fn convert_element(node: roxmltree::Node<'_, '_>) -> Element {
    let mut attrs = namespace_declarations(node);
    for attr in node.attributes() {
        attrs.push((qualified_attr_name(node, &attr), attr.value().to_string()));
    }

    let mut element = Element {
        tag: qualified_tag_name(node),
        attrs,
        text: String::new(),
        tail: String::new(),
        children: Vec::new(),
    };

    for child in node.children() {
        if child.node_type() == roxmltree::NodeType::Text {
            let text = child.text().unwrap_or_default();
            match element.children.last_mut() {
                Some(last) => {
                    let mut tail = last.tail().to_string();
                    tail.push_str(text);
                    last.set_tail(tail);
                }
                None => element.text.push_str(text),
            }
        } else if let Some(converted) = convert_node(child) {
            element.children.push(converted);
        }
    }

    element
}

fn qualified_tag_name(node: roxmltree::Node<'_, '_>) -> String {
    let name = node.tag_name().name();
    match node
        .tag_name()
        .namespace()
        .and_then(|uri| node.lookup_prefix(uri))
        .filter(|prefix| !prefix.is_empty())
    {
        Some(prefix) => format!("{prefix}:{name}"),
        None => name.to_string(),
    }
}

fn qualified_attr_name(node: roxmltree::Node<'_, '_>, attr: &roxmltree::Attribute<'_, '_>) -> String {
    match attr
        .namespace()
        .and_then(|uri| node.lookup_prefix(uri))
        .filter(|prefix| !prefix.is_empty())
    {
        Some(prefix) => format!("{prefix}:{}", attr.name()),
        None => attr.name().to_string(),
    }
}

/// Namespace declarations introduced on this element (not inherited ones).
fn namespace_declarations(node: roxmltree::Node<'_, '_>) -> Vec<(String, String)> {
    let parent_scope: Vec<(Option<&str>, &str)> = node
        .parent()
        .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();

    node.namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .filter(|ns| !parent_scope.contains(&(ns.name(), ns.uri())))
        .map(|ns| match ns.name() {
            Some(prefix) => (format!("xmlns:{prefix}"), ns.uri().to_string()),
            None => ("xmlns".to_string(), ns.uri().to_string()),
        })
        .collect()
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Element(el) => write_element(out, el),
        Node::Comment(c) => {
            out.push_str("<!--");
            out.push_str(&c.text);
            out.push_str("-->");
            out.push_str(&escape_text(&c.tail));
        }
        Node::Instruction(pi) => {
            out.push_str("<?");
            out.push_str(&pi.target);
            if let Some(value) = &pi.value {
                out.push(' ');
                out.push_str(value);
            }
            out.push_str("?>");
            out.push_str(&escape_text(&pi.tail));
        }
    }
}

fn write_element(out: &mut String, el: &Element) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    if el.children.is_empty() && el.text.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        out.push_str(&escape_text(&el.text));
        for child in &el.children {
            write_node(out, child);
        }
        out.push_str("</");
        out.push_str(&el.tag);
        out.push('>');
    }
    out.push_str(&escape_text(&el.tail));
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_structure_and_indentation() {
        let source = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<odoo>\n    <record id=\"view\" model=\"ir.ui.view\">\n        <field name=\"arch\" type=\"xml\"/>\n    </record>\n</odoo>\n";
        let doc = Document::parse(source).unwrap();
        assert_eq!(doc.serialize(), source);
    }

    #[test]
    fn round_trip_preserves_comments() {
        let source = "<odoo>\n    <!-- a note -->\n    <record id=\"x\"/>\n</odoo>\n";
        let doc = Document::parse(source).unwrap();
        assert_eq!(doc.serialize(), source);
    }

    #[test]
    fn entities_are_re_escaped() {
        let source = "<odoo>\n    <field name=\"invisible\">qty &lt; 2 &amp; done</field>\n</odoo>\n";
        let doc = Document::parse(source).unwrap();
        assert_eq!(doc.serialize(), source);
    }

    #[test]
    fn attribute_entities_round_trip() {
        let source = "<odoo>\n    <field invisible=\"qty &lt; 2\"/>\n</odoo>\n";
        let doc = Document::parse(source).unwrap();
        assert_eq!(doc.serialize(), source);
    }

    #[test]
    fn crlf_input_serializes_with_crlf() {
        let source = "<odoo>\r\n    <record id=\"x\"/>\r\n</odoo>\r\n";
        let doc = Document::parse(source).unwrap();
        assert_eq!(doc.serialize(), source);
    }

    #[test]
    fn single_quoted_attributes_are_normalized() {
        let source = "<odoo>\n    <field states='draft'/>\n</odoo>\n";
        let doc = Document::parse(source).unwrap();
        assert_eq!(
            doc.serialize(),
            "<odoo>\n    <field states=\"draft\"/>\n</odoo>\n"
        );
    }

    #[test]
    fn malformed_markup_is_a_parse_error() {
        assert!(matches!(
            Document::parse("<odoo><record></odoo>"),
            Err(XmlError::Parse(_))
        ));
    }

    #[test]
    fn attribute_mutation_helpers() {
        let mut doc = Document::parse("<odoo><field a=\"1\" b=\"2\"/></odoo>").unwrap();
        let field = doc.root_mut().unwrap().children[0].as_element_mut().unwrap();
        field.set_attr("b", "3");
        field.set_attr("c", "4");
        assert_eq!(field.remove_attr("a").as_deref(), Some("1"));
        assert_eq!(
            doc.serialize(),
            "<odoo><field b=\"3\" c=\"4\"/></odoo>\n"
        );
    }

    #[test]
    fn namespace_declarations_survive() {
        let source =
            "<odoo xmlns:t=\"http://example.com/t\">\n    <t:call name=\"x\"/>\n</odoo>\n";
        let doc = Document::parse(source).unwrap();
        assert_eq!(doc.serialize(), source);
    }
}
