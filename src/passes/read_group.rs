//! `read_group` signature migration (16.0 → 17.0).
//!
//! The 17.0 private `_read_group` swapped the `fields`/`groupby` argument
//! order, renamed keywords, changed the aggregate spec format and dropped
//! `lazy`. The pipeline runs the positional reorder on `.read_group(` calls
//! first, then privatizes the name; the remaining passes match the private
//! name and find nothing to do on already-migrated sources.

use crate::edit::Edit;
use crate::expr::{literal, Value};
use crate::passes::{Pass, PassAction, PassError};
use crate::py::{find_method_calls, CallSite, PythonParser};
use std::path::Path;

fn read_group_sites(source: &str, methods: &[&str]) -> Result<Vec<CallSite>, PassError> {
    let mut parser =
        PythonParser::new().map_err(|e| PassError::parse("python grammar", e.to_string()))?;
    let parsed = parser
        .parse(source)
        .and_then(|parsed| parsed.check())
        .map_err(|e| PassError::parse("python source", e.to_string()))?;
    Ok(find_method_calls(&parsed, methods)
        .into_iter()
        .filter(|site| !site.receiver.contains("super("))
        .collect())
}

fn construct(site: &CallSite) -> String {
    format!("{} call (line {})", site.method, site.start.line())
}

/// Reorder the legacy `(domain, fields, groupby, ...)` arguments into the
/// 17.0 `(domain, groupby, aggregates, ...)` shape. Runs before
/// privatization, so it only ever sees legacy `.read_group(` calls.
pub struct SwapGroupbyAggregates;

impl Pass for SwapGroupbyAggregates {
    fn name(&self) -> &'static str {
        "swap-groupby-aggregates"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !source.contains(".read_group(") {
            return Ok(PassAction::NoMatch);
        }
        let mut edits = Vec::new();
        for site in read_group_sites(source, &["read_group"])? {
            if site.args.len() >= 3 {
                edits.push(site.args[1].replace_with(&site.args[2].text));
                edits.push(site.args[2].replace_with(&site.args[1].text));
            } else if site.args.len() == 2 {
                match site.keyword("groupby") {
                    Some(groupby) => {
                        edits.push(site.args[1].replace_with(&groupby.value.text));
                        edits.push(
                            groupby
                                .whole
                                .replace_with(format!("fields={}", site.args[1].text)),
                        );
                    }
                    None => {
                        edits.push(
                            site.args[1].replace_with(format!("[], {}", site.args[1].text)),
                        );
                    }
                }
            } else {
                let groupby = site.keyword_index("groupby");
                let fields = site.keyword_index("fields");
                match (groupby, fields) {
                    (Some(g), Some(f)) if g > f => {
                        let g = &site.keywords[g];
                        let f = &site.keywords[f];
                        edits.push(g.whole.replace_with(&f.whole.text));
                        edits.push(f.whole.replace_with(&g.whole.text));
                    }
                    _ if fields.is_some()
                        || site.keyword("orderby").is_some()
                        || site.keyword("lazy").is_some() =>
                    {
                        return Err(PassError::ambiguous(
                            construct(&site),
                            "unsupported argument ordering",
                        ));
                    }
                    // No legacy markers: nothing to reorder.
                    _ => {}
                }
            }
        }
        if edits.is_empty() {
            Ok(PassAction::NoMatch)
        } else {
            Ok(PassAction::Edits(edits))
        }
    }
}

/// `.read_group(` → `._read_group(` outside `super(` lines.
pub struct PrivatizeReadGroup;

impl Pass for PrivatizeReadGroup {
    fn name(&self) -> &'static str {
        "privatize-read-group"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !source.contains(".read_group(") {
            return Ok(PassAction::NoMatch);
        }
        let rewritten: Vec<String> = source
            .split('\n')
            .map(|line| {
                if line.contains("super(") {
                    line.to_string()
                } else {
                    line.replace(".read_group(", "._read_group(")
                }
            })
            .collect();
        let rewritten = rewritten.join("\n");
        if rewritten == source {
            Ok(PassAction::NoMatch)
        } else {
            Ok(PassAction::Rewrite(rewritten))
        }
    }
}

/// Keyword renames on the privatized call: `fields` → `aggregates`,
/// `orderby` → `order`.
pub struct RenameReadGroupKeywords;

impl Pass for RenameReadGroupKeywords {
    fn name(&self) -> &'static str {
        "rename-read-group-keywords"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !source.contains("_read_group(") {
            return Ok(PassAction::NoMatch);
        }
        let mut edits = Vec::new();
        for site in read_group_sites(source, &["_read_group"])? {
            for kw in &site.keywords {
                match kw.name.as_str() {
                    "fields" => edits.push(kw.name_node.replace_with("aggregates")),
                    "orderby" => edits.push(kw.name_node.replace_with("order")),
                    _ => {}
                }
            }
        }
        if edits.is_empty() {
            Ok(PassAction::NoMatch)
        } else {
            Ok(PassAction::Edits(edits))
        }
    }
}

/// Rewrite aggregate specs to the 17.0 `field:agg` form. Only literal lists
/// are touched; anything dynamic is left for the user.
pub struct RewriteAggregateSpecs;

impl Pass for RewriteAggregateSpecs {
    fn name(&self) -> &'static str {
        "rewrite-aggregate-specs"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !source.contains("_read_group(") {
            return Ok(PassAction::NoMatch);
        }
        let mut edits = Vec::new();
        for site in read_group_sites(source, &["_read_group"])? {
            let aggregates_node = if site.args.len() >= 3 {
                &site.args[2]
            } else if let Some(kw) = site.keyword("aggregates") {
                &kw.value
            } else {
                continue;
            };
            let groupby_node = if site.args.len() >= 2 {
                Some(&site.args[1])
            } else {
                site.keyword("groupby").map(|kw| &kw.value)
            };

            let Some(aggregates) = literal_string_list(&aggregates_node.text) else {
                continue;
            };
            let groupby = match groupby_node {
                Some(node) => match literal_groupby(&node.text) {
                    Some(g) => g,
                    None => continue,
                },
                None => Vec::new(),
            };

            let rewritten = rewrite_aggregates(&aggregates, &groupby);
            let new_text = Value::List(rewritten.into_iter().map(Value::Str).collect()).py_repr();
            if new_text != aggregates_node.text {
                edits.push(aggregates_node.replace_with(new_text));
            }
        }
        if edits.is_empty() {
            Ok(PassAction::NoMatch)
        } else {
            Ok(PassAction::Edits(edits))
        }
    }
}

fn literal_string_list(text: &str) -> Option<Vec<String>> {
    match literal::parse_value(text).ok()? {
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Str(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn literal_groupby(text: &str) -> Option<Vec<String>> {
    match literal::parse_value(text).ok()? {
        Value::Str(s) => Some(vec![s]),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Str(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn rewrite_aggregates(specs: &[String], groupby: &[String]) -> Vec<String> {
    let mut converted: Vec<String> = specs
        .iter()
        .map(|spec| convert_spec(spec).unwrap_or_else(|| spec.clone()))
        .map(|spec| {
            if spec == "id:count" || spec == "id:count_distinct" {
                "__count".to_string()
            } else {
                spec
            }
        })
        .collect();

    converted.retain(|spec| !groupby.contains(spec));
    let mut result: Vec<String> = converted
        .into_iter()
        .map(|spec| {
            if !spec.contains(':') && spec != "__count" {
                format!("{spec}:sum")
            } else {
                spec
            }
        })
        .collect();
    if result.is_empty() {
        result.push("__count".to_string());
    }
    result
}

/// `alias:agg(field)` → `field:agg`; specs without a call stay as-is.
fn convert_spec(spec: &str) -> Option<String> {
    let open = match spec.find('(') {
        Some(open) => open,
        None => return Some(spec.to_string()),
    };
    let close = spec.rfind(')')?;
    if close <= open {
        return None;
    }
    let field = &spec[open + 1..close];
    let agg = spec.split(':').nth(1)?.split('(').next().unwrap_or("");
    Some(format!("{field}:{agg}"))
}

/// Remove the dropped `lazy` argument, eating the separator it leaves behind.
pub struct StripLazyArgument;

impl Pass for StripLazyArgument {
    fn name(&self) -> &'static str {
        "strip-lazy-argument"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !source.contains("_read_group(") {
            return Ok(PassAction::NoMatch);
        }
        let mut edits = Vec::new();
        for site in read_group_sites(source, &["_read_group"])? {
            if site.args.len() == 7 {
                let lazy = &site.args[6];
                edits.push(Edit::delete_with_leading_separator(
                    source,
                    lazy.byte_start,
                    lazy.byte_end,
                ));
            } else if let Some(kw) = site.keyword("lazy") {
                edits.push(Edit::delete_with_leading_separator(
                    source,
                    kw.whole.byte_start,
                    kw.whole.byte_end,
                ));
            }
        }
        if edits.is_empty() {
            Ok(PassAction::NoMatch)
        } else {
            Ok(PassAction::Edits(edits))
        }
    }
}

/// The five passes in pipeline order.
pub fn pipeline() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(SwapGroupbyAggregates),
        Box::new(PrivatizeReadGroup),
        Box::new(RenameReadGroupKeywords),
        Box::new(RewriteAggregateSpecs),
        Box::new(StripLazyArgument),
    ]
}
