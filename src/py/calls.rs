//! Method call-site extraction.
//!
//! Locates `recv.method(...)` calls in a parsed tree and exposes their
//! positional and keyword arguments with byte spans and line/column points,
//! ready to be turned into [`Edit`]s.

use crate::edit::{Edit, Position};
use crate::py::parser::ParsedSource;
use tree_sitter::Node;

/// A node captured with its span, points and text.
#[derive(Debug, Clone)]
pub struct Argument {
    pub byte_start: usize,
    pub byte_end: usize,
    pub start: Position,
    pub end: Position,
    pub text: String,
}

impl Argument {
    fn from_node(node: Node<'_>, source: &str) -> Self {
        Self {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            start: point(node.start_position()),
            end: point(node.end_position()),
            text: source[node.byte_range()].to_string(),
        }
    }

    /// An edit replacing this node, verified against its current text.
    pub fn replace_with(&self, new_text: impl Into<String>) -> Edit {
        Edit::replace(self.byte_start, self.byte_end, self.start, self.end, new_text)
            .with_expected(&self.text)
    }
}

/// A `name=value` keyword argument.
#[derive(Debug, Clone)]
pub struct KeywordArg {
    pub name: String,
    /// The name identifier alone
    pub name_node: Argument,
    /// The value expression alone
    pub value: Argument,
    /// The whole `name=value` node
    pub whole: Argument,
}

/// One `recv.method(...)` call site.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub receiver: String,
    pub method: String,
    pub start: Position,
    pub args: Vec<Argument>,
    pub keywords: Vec<KeywordArg>,
}

impl CallSite {
    pub fn keyword(&self, name: &str) -> Option<&KeywordArg> {
        self.keywords.iter().find(|kw| kw.name == name)
    }

    pub fn keyword_index(&self, name: &str) -> Option<usize> {
        self.keywords.iter().position(|kw| kw.name == name)
    }
}

/// Find all attribute-method call sites whose method name is in `methods`.
pub fn find_method_calls(parsed: &ParsedSource<'_>, methods: &[&str]) -> Vec<CallSite> {
    let mut sites = Vec::new();
    visit(parsed.root_node(), parsed.source, methods, &mut sites);
    sites
}

fn visit(node: Node<'_>, source: &str, methods: &[&str], sites: &mut Vec<CallSite>) {
    if node.kind() == "call" {
        if let Some(site) = call_site(node, source, methods) {
            sites.push(site);
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, source, methods, sites);
    }
}

fn call_site(node: Node<'_>, source: &str, methods: &[&str]) -> Option<CallSite> {
    let function = node.child_by_field_name("function")?;
    if function.kind() != "attribute" {
        return None;
    }
    let attr = function.child_by_field_name("attribute")?;
    let method = &source[attr.byte_range()];
    if !methods.contains(&method) {
        return None;
    }
    let object = function.child_by_field_name("object")?;
    let arguments = node.child_by_field_name("arguments")?;

    let mut args = Vec::new();
    let mut keywords = Vec::new();
    let mut cursor = arguments.walk();
    for child in arguments.named_children(&mut cursor) {
        match child.kind() {
            "keyword_argument" => {
                let (Some(name_node), Some(value_node)) = (
                    child.child_by_field_name("name"),
                    child.child_by_field_name("value"),
                ) else {
                    continue;
                };
                keywords.push(KeywordArg {
                    name: source[name_node.byte_range()].to_string(),
                    name_node: Argument::from_node(name_node, source),
                    value: Argument::from_node(value_node, source),
                    whole: Argument::from_node(child, source),
                });
            }
            "comment" | "dictionary_splat" => {}
            _ => args.push(Argument::from_node(child, source)),
        }
    }

    Some(CallSite {
        receiver: source[object.byte_range()].to_string(),
        method: method.to_string(),
        start: point(node.start_position()),
        args,
        keywords,
    })
}

fn point(p: tree_sitter::Point) -> Position {
    Position::new(p.row, p.column)
}
