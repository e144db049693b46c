//! Legacy conditional-visibility collapse.
//!
//! Up to 16.0, view elements carried an `attrs` attribute holding a dict
//! literal of domains, and/or a `states` attribute holding a comma-separated
//! state list. 17.0 replaced both with plain Python expressions on
//! `invisible`/`required`/`readonly`/`column_invisible`. This rewriter works
//! on the parsed element tree directly (not on text edits) and re-serializes
//! the document once at the end.

use crate::expr::{compile_attr, literal::parse_mapping, Value};
use crate::passes::{Pass, PassAction, PassError};
use crate::xml::tree::{Comment, Document, Element, Node};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Attribute names the new scheme recognizes; every other `attrs` key is
/// dropped for the user to review after conversion.
pub const TARGET_ATTRS: [&str; 4] = ["invisible", "required", "readonly", "column_invisible"];

pub struct CollapseVisibilityAttrs;

impl Pass for CollapseVisibilityAttrs {
    fn name(&self) -> &'static str {
        "collapse-visibility-attrs"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }

    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !source.contains("attrs") && !source.contains("states") {
            return Ok(PassAction::NoMatch);
        }
        let mut doc = Document::parse(source)
            .map_err(|e| PassError::parse("xml document", e.to_string()))?;
        let mut changed = false;
        if let Some(root) = doc.root_mut() {
            rewrite_children(root, &mut changed)?;
        }
        if changed {
            Ok(PassAction::Rewrite(doc.serialize()))
        } else {
            Ok(PassAction::NoMatch)
        }
    }
}

fn rewrite_children(parent: &mut Element, changed: &mut bool) -> Result<(), PassError> {
    let mut i = 0;
    while i < parent.children.len() {
        let Some(el) = parent.children[i].as_element() else {
            i += 1;
            continue;
        };

        if el.tag == "attribute" {
            match el.attr("name") {
                Some("attrs") => {
                    i = restructure_attrs_override(parent, i, changed)?;
                    continue;
                }
                Some("states") => {
                    i = restructure_states_override(parent, i, changed)?;
                    continue;
                }
                _ => {}
            }
        }

        let has_attrs = el.has_attr("attrs");
        let has_states = el.has_attr("states");
        if has_attrs {
            let el = parent.children[i].as_element_mut().expect("checked element");
            convert_inline_attrs(el, changed)?;
        }
        if has_states {
            let indent = indent_at(parent, i);
            let el = parent.children[i].as_element().expect("checked element");
            let comment = states_comment(el, &indent);
            let el = parent.children[i].as_element_mut().expect("checked element");
            convert_inline_states(el, changed);
            parent.children.insert(
                i,
                Node::Comment(Comment {
                    text: comment,
                    tail: indent,
                }),
            );
            i += 1;
        }

        if let Some(el) = parent.children[i].as_element_mut() {
            rewrite_children(el, changed)?;
        }
        i += 1;
    }
    Ok(())
}

/// Indentation in front of the child at `index`: the previous sibling's tail,
/// or the parent's text for the first child.
fn indent_at(parent: &Element, index: usize) -> String {
    if index == 0 {
        parent.text.clone()
    } else {
        parent.children[index - 1].tail().to_string()
    }
}

/// Parse and compile an `attrs` mapping into `(attribute, condition)` pairs.
fn compile_attrs_mapping(text: &str) -> Result<Vec<(String, String)>, PassError> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        // Empty or overridden-away attrs; nothing to convert.
        return Ok(Vec::new());
    }
    let pairs =
        parse_mapping(trimmed).map_err(|e| PassError::parse("attrs mapping", e.to_string()))?;
    let mut out = Vec::new();
    for (key, value) in pairs {
        if !TARGET_ATTRS.contains(&key.as_str()) {
            debug!(key, "attrs key without a new-attribute equivalent; dropped");
            continue;
        }
        let condition = compile_attr(&value).map_err(|e| {
            PassError::ambiguous(format!("attrs domain for {key:?}"), e.to_string())
        })?;
        out.push((key, condition));
    }
    Ok(out)
}

/// Merge a compiled condition with a pre-existing attribute value. Literal
/// booleans keep their textual form instead of producing `... or True`.
fn merge_existing(old: Option<&str>, new: &str) -> String {
    match old.map(str::trim) {
        None => new.to_string(),
        Some("True") | Some("1") => format!("True or ({new})"),
        Some("False") | Some("0") => format!("False or ({new})"),
        Some(old) => format!("({old}) or ({new})"),
    }
}

fn convert_inline_attrs(el: &mut Element, changed: &mut bool) -> Result<(), PassError> {
    let attrs_text = el.attr("attrs").unwrap_or_default().to_string();
    let new_attrs = compile_attrs_mapping(&attrs_text)?;
    let mut rebuilt = Vec::with_capacity(el.attrs.len() + new_attrs.len());
    for (name, value) in el.attrs.clone() {
        if name == "attrs" {
            for (target, condition) in &new_attrs {
                rebuilt.push((target.clone(), merge_existing(el.attr(target), condition)));
            }
        } else if !new_attrs.iter().any(|(target, _)| target == &name) {
            rebuilt.push((name, value));
        }
    }
    el.attrs = rebuilt;
    *changed = true;
    Ok(())
}

fn convert_inline_states(el: &mut Element, changed: &mut bool) {
    let states = el.attr("states").unwrap_or_default().to_string();
    let invisible = el.attr("invisible").unwrap_or_default().to_string();
    let combined = combined_invisible_condition(&invisible, &states);
    let mut rebuilt = Vec::with_capacity(el.attrs.len());
    for (name, value) in el.attrs.clone() {
        if name == "invisible" || (name == "states" && invisible.is_empty()) {
            if !combined.is_empty() {
                rebuilt.push(("invisible".to_string(), combined.clone()));
            }
        } else if name != "states" {
            rebuilt.push((name, value));
        }
    }
    el.attrs = rebuilt;
    *changed = true;
}

/// `states="a,b"` → `state not in ['a', 'b']`, merged into an existing
/// condition with `or` — unless that condition already ends in a dangling
/// connective left by a single-combinator domain, which it completes.
pub fn combined_invisible_condition(invisible: &str, states: &str) -> String {
    let invisible = invisible.trim();
    let states = states.trim();
    if states.is_empty() {
        return invisible.to_string();
    }
    let items: Vec<Value> = states
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Value::Str(s.to_string()))
        .collect();
    let states_clause = format!("state not in {}", Value::List(items).py_repr());
    if invisible.is_empty() {
        states_clause
    } else if invisible.ends_with(" or") || invisible.ends_with(" and") {
        format!("{invisible} {states_clause}")
    } else {
        format!("{invisible} or {states_clause}")
    }
}

fn find_attribute_child(parent: &Element, name: &str, exclude: Option<usize>) -> Option<usize> {
    parent.children.iter().enumerate().find_map(|(idx, node)| {
        if exclude == Some(idx) {
            return None;
        }
        let el = node.as_element()?;
        (el.tag == "attribute" && el.attr("name") == Some(name)).then_some(idx)
    })
}

/// The tag an inheritance patch applies to, for comment wording: the last
/// path segment of the parent's xpath `expr`, or the parent's own tag.
fn inherited_tag_type(parent: &Element) -> Option<String> {
    static EXPR_TAIL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^.*/(\w+)[^/]*$").expect("hardcoded pattern"));
    match parent.attr("expr") {
        Some(expr) => EXPR_TAIL.captures(expr).map(|caps| caps[1].to_string()),
        None => Some(parent.tag.clone()),
    }
}

fn tag_phrase(tag_type: Option<&str>) -> String {
    tag_type.map(|t| format!("{t} ")).unwrap_or_default()
}

fn states_comment(el: &Element, indent: &str) -> String {
    let states = el.attr("states").unwrap_or_default();
    let action = if el.has_attr("invisible") {
        format!("Result from merging \"states='{states}'\" attribute with an 'invisible' attribute")
    } else {
        format!(
            "Result from converting \"states='{states}'\" attribute into an 'invisible' attribute"
        )
    };
    format!(
        "TODO: {action}{indent}     Manually combine the states condition into any 'invisible' overrides in inheriting views as well"
    )
}

fn attrs_override_comment(tag_type: Option<&str>, indent: &str) -> String {
    format!(
        "TODO: Result from 'attrs' -> 'invisible' conversion without also overriding 'states' attribute{indent}     Check if this {}tag carried a states attribute in any parent view, in which case it should be combined into this 'invisible' attribute",
        tag_phrase(tag_type)
    )
}

fn states_override_comment(tag_type: Option<&str>, states: &str, indent: &str) -> String {
    format!(
        "TODO: Result from \"states='{states}'\" -> 'invisible' conversion without also overriding 'attrs' attribute{indent}     Check if this {}tag carries an invisible attribute in any parent view, in which case it should be combined into this new 'invisible' attribute",
        tag_phrase(tag_type)
    )
}

/// Rewrite an `<attribute name="attrs">` inheritance patch into separate
/// `<attribute>` nodes at the same position, merging and removing same-named
/// sibling overrides. Returns the index to resume the sweep from.
fn restructure_attrs_override(
    parent: &mut Element,
    i: usize,
    changed: &mut bool,
) -> Result<usize, PassError> {
    let indent = indent_at(parent, i);
    let (attrs_text, old_tail) = {
        let el = parent.children[i].as_element().expect("checked element");
        (el.text.clone(), el.tail.clone())
    };
    let tag_type = inherited_tag_type(parent);
    let new_attrs = compile_attrs_mapping(&attrs_text)?;
    let has_states_sibling = find_attribute_child(parent, "states", Some(i)).is_some();

    let mut remove_indices = Vec::new();
    let mut inserted: Vec<Node> = Vec::new();
    for (target, condition) in &new_attrs {
        let value = match find_attribute_child(parent, target, Some(i)) {
            Some(sibling) => {
                remove_indices.push(sibling);
                let old = parent.children[sibling]
                    .as_element()
                    .expect("attribute element")
                    .text
                    .clone();
                merge_existing(Some(&old), condition)
            }
            None => condition.clone(),
        };
        if target == "invisible" && !has_states_sibling {
            // A parent view might still carry a states attribute; that can
            // only be checked by a human.
            inserted.push(Node::Comment(Comment {
                text: attrs_override_comment(tag_type.as_deref(), &indent),
                tail: indent.clone(),
            }));
        }
        let mut attr_el = Element::new("attribute");
        attr_el.set_attr("name", target.clone());
        attr_el.text = value;
        attr_el.tail = indent.clone();
        inserted.push(Node::Element(attr_el));
    }
    if let Some(last) = inserted.last_mut() {
        last.set_tail(old_tail);
    }

    let old_children = std::mem::take(&mut parent.children);
    let mut new_children: Vec<Node> = Vec::with_capacity(old_children.len() + inserted.len());
    let mut resume_at = 0;
    for (index, node) in old_children.into_iter().enumerate() {
        if index == i {
            new_children.append(&mut inserted);
            resume_at = new_children.len();
            continue;
        }
        if remove_indices.contains(&index) {
            let tail = node.tail().to_string();
            if let Some(prev) = new_children.last_mut() {
                prev.set_tail(tail);
            }
            continue;
        }
        new_children.push(node);
    }
    parent.children = new_children;
    *changed = true;
    Ok(resume_at)
}

/// Fold an `<attribute name="states">` inheritance patch into the sibling
/// `invisible` override, creating one (plus the advisory comment) when none
/// exists. Returns the index to resume the sweep from.
fn restructure_states_override(
    parent: &mut Element,
    i: usize,
    changed: &mut bool,
) -> Result<usize, PassError> {
    let indent = indent_at(parent, i);
    let (states_text, old_tail) = {
        let el = parent.children[i].as_element().expect("checked element");
        (el.text.trim().to_string(), el.tail.clone())
    };
    let tag_type = inherited_tag_type(parent);
    *changed = true;

    if let Some(invisible) = find_attribute_child(parent, "invisible", Some(i)) {
        let combined = {
            let el = parent.children[invisible]
                .as_element()
                .expect("attribute element");
            combined_invisible_condition(&el.text, &states_text)
        };
        parent.children[invisible]
            .as_element_mut()
            .expect("attribute element")
            .text = combined;
        if i > 0 {
            let tail = parent.children[i].tail().to_string();
            parent.children[i - 1].set_tail(tail);
        }
        parent.children.remove(i);
        Ok(i)
    } else {
        let comment = Node::Comment(Comment {
            text: states_override_comment(tag_type.as_deref(), &states_text, &indent),
            tail: indent.clone(),
        });
        let mut attr_el = Element::new("attribute");
        attr_el.set_attr("name", "invisible");
        attr_el.text = combined_invisible_condition("", &states_text);
        attr_el.tail = old_tail;
        parent.children.remove(i);
        parent.children.insert(i, comment);
        parent.children.insert(i + 1, Node::Element(attr_el));
        Ok(i + 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::PassAction;

    fn rewrite(source: &str) -> String {
        match CollapseVisibilityAttrs
            .apply(Path::new("view.xml"), source)
            .unwrap()
        {
            PassAction::Rewrite(text) => text,
            PassAction::NoMatch => source.to_string(),
            PassAction::Edits(_) => panic!("rewriter never produces edits"),
        }
    }

    #[test]
    fn attrs_domain_becomes_invisible_attribute() {
        let source = "<odoo>\n    <field name=\"x\" attrs=\"{'invisible': [('state', '=', 'done')]}\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("<field name=\"x\" invisible=\"state == 'done'\"/>"));
        assert!(!result.contains("attrs"));
    }

    #[test]
    fn attrs_keeps_other_attributes_in_place() {
        let source = "<odoo>\n    <field name=\"x\" attrs=\"{'required': [('a', '!=', False)]}\" widget=\"many2one\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("<field name=\"x\" required=\"a\" widget=\"many2one\"/>"));
    }

    #[test]
    fn attrs_merges_with_existing_attribute() {
        let source = "<odoo>\n    <field name=\"x\" invisible=\"context.get('hide')\" attrs=\"{'invisible': [('a', '=', 1)]}\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("invisible=\"(context.get('hide')) or (a == 1)\""));
    }

    #[test]
    fn attrs_merges_with_existing_boolean_literal() {
        let source =
            "<odoo>\n    <field name=\"x\" invisible=\"1\" attrs=\"{'invisible': [('a', '=', 1)]}\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("invisible=\"False or (a == 1)\"") == false);
        assert!(result.contains("invisible=\"True or (a == 1)\""));
    }

    #[test]
    fn multiple_attrs_keys_expand_in_order() {
        let source = "<odoo>\n    <field name=\"x\" attrs=\"{'invisible': [('s', '=', 'a')], 'readonly': [('s', '=', 'b')]}\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("invisible=\"s == 'a'\" readonly=\"s == 'b'\""));
    }

    #[test]
    fn states_becomes_invisible_with_comment() {
        let source = "<odoo>\n    <button name=\"go\" states=\"draft,sent\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("<button name=\"go\" invisible=\"state not in ['draft', 'sent']\"/>"));
        assert!(result.contains("<!--TODO: Result from converting"));
        assert!(!result.contains("states="));
    }

    #[test]
    fn states_merges_into_existing_invisible() {
        let source =
            "<odoo>\n    <button name=\"go\" invisible=\"amount == 0\" states=\"draft\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("invisible=\"amount == 0 or state not in ['draft']\""));
    }

    #[test]
    fn dangling_connective_is_completed_by_states() {
        // A single '|' combinator expects the states list as second operand.
        let source = "<odoo>\n    <field name=\"x\" attrs=\"{'invisible': ['|', ('a', '=', 1)]}\" states=\"done\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("invisible=\"a == 1 or state not in ['done']\""));
    }

    #[test]
    fn attribute_override_is_split_into_new_attributes() {
        let source = concat!(
            "<odoo>\n",
            "    <xpath expr=\"//field[@name='partner_id']\" position=\"attributes\">\n",
            "        <attribute name=\"attrs\">{'invisible': [('state', '=', 'done')]}</attribute>\n",
            "    </xpath>\n",
            "</odoo>\n",
        );
        let result = rewrite(source);
        assert!(result.contains("<attribute name=\"invisible\">state == 'done'</attribute>"));
        assert!(result.contains("<!--TODO: Result from 'attrs' -> 'invisible' conversion"));
        assert!(result.contains("this field tag"));
        assert!(!result.contains("name=\"attrs\""));
    }

    #[test]
    fn attribute_override_merges_sibling() {
        let source = concat!(
            "<odoo>\n",
            "    <xpath expr=\"//button\" position=\"attributes\">\n",
            "        <attribute name=\"attrs\">{'invisible': [('a', '=', 1)]}</attribute>\n",
            "        <attribute name=\"invisible\">old</attribute>\n",
            "    </xpath>\n",
            "</odoo>\n",
        );
        let result = rewrite(source);
        assert!(result.contains("<attribute name=\"invisible\">(old) or (a == 1)</attribute>"));
        assert_eq!(result.matches("<attribute").count(), 1);
    }

    #[test]
    fn states_override_folds_into_invisible_override() {
        let source = concat!(
            "<odoo>\n",
            "    <xpath expr=\"//button\" position=\"attributes\">\n",
            "        <attribute name=\"invisible\">a == 1</attribute>\n",
            "        <attribute name=\"states\">draft</attribute>\n",
            "    </xpath>\n",
            "</odoo>\n",
        );
        let result = rewrite(source);
        assert!(result.contains("<attribute name=\"invisible\">a == 1 or state not in ['draft']</attribute>"));
        assert!(!result.contains("name=\"states\""));
    }

    #[test]
    fn states_override_without_invisible_creates_one() {
        let source = concat!(
            "<odoo>\n",
            "    <xpath expr=\"//button\" position=\"attributes\">\n",
            "        <attribute name=\"states\">draft,sent</attribute>\n",
            "    </xpath>\n",
            "</odoo>\n",
        );
        let result = rewrite(source);
        assert!(result
            .contains("<attribute name=\"invisible\">state not in ['draft', 'sent']</attribute>"));
        assert!(result.contains("<!--TODO: Result from \"states='draft,sent'\""));
    }

    #[test]
    fn unknown_attrs_keys_are_dropped() {
        let source =
            "<odoo>\n    <field name=\"x\" attrs=\"{'domain': [('a', '=', 1)]}\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("<field name=\"x\"/>"));
    }

    #[test]
    fn unparsable_mapping_fails_the_file() {
        let source = "<odoo>\n    <field attrs=\"{'invisible': [(}\"/>\n</odoo>\n";
        let result = CollapseVisibilityAttrs.apply(Path::new("view.xml"), source);
        assert!(matches!(result, Err(PassError::Parse { .. })));
    }

    #[test]
    fn wildcard_like_fails_the_file() {
        let source =
            "<odoo>\n    <field attrs=\"{'invisible': [('name', 'like', 'a%')]}\"/>\n</odoo>\n";
        let result = CollapseVisibilityAttrs.apply(Path::new("view.xml"), source);
        assert!(matches!(result, Err(PassError::Ambiguous { .. })));
    }

    #[test]
    fn files_without_legacy_attributes_are_untouched() {
        let source = "<odoo>\n    <field name=\"x\" invisible=\"1\"/>\n</odoo>\n";
        let action = CollapseVisibilityAttrs
            .apply(Path::new("view.xml"), source)
            .unwrap();
        assert!(matches!(action, PassAction::NoMatch));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let source = "<odoo>\n    <field name=\"x\" attrs=\"{'invisible': [('state', '=', 'done')]}\" states=\"draft\"/>\n</odoo>\n";
        let once = rewrite(source);
        let action = CollapseVisibilityAttrs
            .apply(Path::new("view.xml"), &once)
            .unwrap();
        assert!(matches!(action, PassAction::NoMatch));
    }

    #[test]
    fn opaque_operands_survive_verbatim() {
        let source = "<odoo>\n    <field name=\"x\" attrs=\"{'invisible': [('company_id', '!=', parent.company_id)]}\"/>\n</odoo>\n";
        let result = rewrite(source);
        assert!(result.contains("invisible=\"company_id != parent.company_id\""));
    }
}
