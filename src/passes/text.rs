//! Single-pattern substitution passes.
//!
//! These cover the migrations that need no tree analysis: each pass is a set
//! of compiled regex rules applied to the whole document. The Rust regex
//! engine has no backreferences or lookarounds, so quote-sensitive patterns
//! are expanded into explicit single/double-quote alternations and the
//! line-cleanup variants match the whole line including its newline.

use crate::passes::{Pass, PassAction, PassError};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("hardcoded pattern")
}

fn apply_rules(source: &str, rules: &[(Regex, &str)]) -> String {
    let mut text = source.to_string();
    for (regex, replacement) in rules {
        text = regex.replace_all(&text, *replacement).into_owned();
    }
    text
}

fn rewrite_action(source: &str, rewritten: String) -> PassAction {
    if rewritten == source {
        PassAction::NoMatch
    } else {
        PassAction::Rewrite(rewritten)
    }
}

/// 18.0 renamed tree views to list views across view definitions, xpath
/// expressions, action view modes and prose.
pub struct TreeToListViews;

static TREE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            re(r#"(<field[^>]* name=["'](view_mode|name|binding_view_types)["'][^>]*>([^<>]+[,.])?\s*)tree(\s*([,.][^<>]+)?</field>)"#),
            "${1}list${4}",
        ),
        (re(r"([<,/])tree([ \n\r,>/])"), "${1}list${2}"),
        (
            re(r#"(<xpath[^>]* expr=['"])([^<>]*/)?tree(/|[\['"])"#),
            "${1}${2}list${3}",
        ),
        (re(r"tree_view_ref"), "list_view_ref"),
        (re(r#"(mode=['"][^'"]*)tree([^'"]*['"])"#), "${1}list${2}"),
        (
            re(r#"(['"]view_mode['"][^'":=]*[:=].*['"]([^'"]+,)?\s*)tree(\s*(,[^'"]+)?['"])"#),
            "${1}list${3}",
        ),
        (
            re(r#"(['"]views['"][^'":]*[:=].*['"])tree(['"])"#),
            "${1}list${2}",
        ),
        (re(r#"([ '">)])tree( [vV]iews?[ '"<.)])"#), "${1}list${2}"),
        (re(r#"([ '">)])Tree( [vV]iews?[ '"<.)])"#), "${1}List${2}"),
        (re(r#"(self\.env\.ref\(.*['"])tree(['"])"#), "${1}list${2}"),
    ]
});

impl Pass for TreeToListViews {
    fn name(&self) -> &'static str {
        "tree-to-list-views"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml", "js", "py"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        let text = source.replace(" tree view ", " list view ");
        Ok(rewrite_action(source, apply_rules(&text, &TREE_RULES)))
    }
}

/// 18.0 replaced the `oe_chatter` div block with the `<chatter/>` element.
pub struct ChatterBlocks;

static CHATTER_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| re(r#"<div class=["']oe_chatter["']([^>]*)>[\s\S]*?</div>"#));
static CHATTER_XPATH: LazyLock<Regex> =
    LazyLock::new(|| re(r#"//div\[hasclass\(['"]oe_chatter['"]\)\]"#));
static CHATTER_POSITIONED: LazyLock<Regex> =
    LazyLock::new(|| re(r#"<div class=["']oe_chatter["']\s*(position=["'][^"']+["'])\s*/>"#));

impl Pass for ChatterBlocks {
    fn name(&self) -> &'static str {
        "chatter-blocks"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        let text = CHATTER_BLOCK.replace_all(source, |caps: &regex::Captures<'_>| {
            if caps[1].contains("position=") {
                caps[0].to_string()
            } else {
                "<chatter/>".to_string()
            }
        });
        let text = CHATTER_XPATH.replace_all(&text, "//chatter");
        let text = CHATTER_POSITIONED
            .replace_all(&text, "<chatter ${1}/>")
            .into_owned();
        Ok(rewrite_action(source, text))
    }
}

/// 18.0 kanban template renames.
pub struct KanbanRenames;

impl Pass for KanbanRenames {
    fn name(&self) -> &'static str {
        "kanban-renames"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml", "js", "py"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        let text = source
            .replace("kanban-card", "card")
            .replace("kanban-box", "card")
            .replace("kanban-menu", "menu");
        Ok(rewrite_action(source, text))
    }
}

/// `self.user_has_groups(...)` was split into `has_group` (single group) and
/// `has_groups` (comma/negation lists) on `env.user`.
pub struct UserHasGroups;

static HAS_GROUP_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            re(r"self\.user_has_groups\(\s*'([\w.]+)'\s*\)"),
            "self.env.user.has_group('${1}')",
        ),
        (
            re(r#"self\.user_has_groups\(\s*"([\w.]+)"\s*\)"#),
            "self.env.user.has_group(\"${1}\")",
        ),
        (
            re(r#"self\.user_has_groups\(\s*'([^'"]*[,!][^'"]*?)'\s*\)"#),
            "self.env.user.has_groups('${1}')",
        ),
        (
            re(r#"self\.user_has_groups\(\s*"([^'"]*[,!][^'"]*?)"\s*\)"#),
            "self.env.user.has_groups(\"${1}\")",
        ),
    ]
});

impl Pass for UserHasGroups {
    fn name(&self) -> &'static str {
        "user-has-groups"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        Ok(rewrite_action(source, apply_rules(source, &HAS_GROUP_RULES)))
    }
}

/// The `unaccent=` field parameter disappeared in 18.0; remove it wherever it
/// sits in the argument list.
pub struct UnaccentParameter;

static UNACCENT_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            re(r"(?s)fields\.(Char|Text|Html|Properties)\(\s*unaccent\s*=\s*(False|True)\s*,?\s*\)"),
            "fields.${1}()",
        ),
        (
            re(r"(?s)fields\.(Char|Text|Html|Properties)\(\s*unaccent\s*=\s*(False|True)\s*,\s*([^)]+?)\)"),
            "fields.${1}(${3})",
        ),
        (
            re(r"(?s)fields\.(Char|Text|Html|Properties)\(([^)]+?),\s*unaccent\s*=\s*(False|True)\s*,\s*([^)]+?)\)"),
            "fields.${1}(${2}, ${4})",
        ),
        (
            re(r"(?s)fields\.(Char|Text|Html|Properties)\(([^)]+?),\s*unaccent\s*=\s*(False|True)\s*\)"),
            "fields.${1}(${2})",
        ),
    ]
});

impl Pass for UnaccentParameter {
    fn name(&self) -> &'static str {
        "unaccent-parameter"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        Ok(rewrite_action(source, apply_rules(source, &UNACCENT_RULES)))
    }
}

/// `odoo.tools.ustr` was removed; drop imports and unwrap calls.
pub struct UstrRemoval;

static USTR_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (re(r"from\s+odoo\.tools\s+import\s+ustr\s*\n"), ""),
        (re(r"from\s+odoo\.tools\.misc\s+import\s+ustr\s*\n"), ""),
        (
            re(r"from\s+odoo\.tools\s+import\s+([^,\n]*,\s*)?ustr,\s*([^,\n]*)"),
            "from odoo.tools import ${1}${2}",
        ),
        (
            re(r"from\s+odoo\.tools\.misc\s+import\s+([^,\n]*,\s*)?ustr,\s*([^,\n]*)"),
            "from odoo.tools.misc import ${1}${2}",
        ),
        (re(r",\s*ustr(\s*,)?"), "${1}"),
        (re(r"tools\.ustr\(([^)]+)\)"), "${1}"),
        (re(r"misc\.ustr\(([^)]+)\)"), "${1}"),
        (re(r"=\s*ustr\(([^)]+)\)"), "= ${1}"),
    ]
});

impl Pass for UstrRemoval {
    fn name(&self) -> &'static str {
        "ustr-removal"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        Ok(rewrite_action(source, apply_rules(source, &USTR_RULES)))
    }
}

/// `<field name="type">tree</field>` is not accepted by 18.0 anymore.
pub struct FieldTypeTree;

static FIELD_TYPE_TREE: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?i)(<field\s+name=["']\s*type\s*["']\s*>\s*)tree(\s*</field>)"#));

impl Pass for FieldTypeTree {
    fn name(&self) -> &'static str {
        "field-type-tree"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        let text = FIELD_TYPE_TREE
            .replace_all(source, "${1}list${2}")
            .into_owned();
        Ok(rewrite_action(source, text))
    }
}

/// `ir.cron` records lost `numbercall` and `doall` in 18.0; both fields are
/// removed entirely, in every attribute order, quote style and closing form.
pub struct IrCronDeprecatedFields;

static IR_CRON_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // Whole-line forms first, so the indentation goes with the field.
        (
            re(r#"(?i)[ \t]*<field\s+name=(?:"numbercall"|'numbercall')\s*>-?\d+</field>[ \t]*\r?\n"#),
            "",
        ),
        (
            re(r#"(?i)<field\s+name=(?:"numbercall"|'numbercall')\s*>-?\d+</field>\s*"#),
            "",
        ),
        (
            re(r#"(?i)[ \t]*<field\s+name=(?:"doall"|'doall')\s+eval=(?:"(?:False|True)"|'(?:False|True)')\s*/>[ \t]*\r?\n"#),
            "",
        ),
        (
            re(r#"(?i)<field\s+name=(?:"doall"|'doall')\s+eval=(?:"(?:False|True)"|'(?:False|True)')\s*/>\s*"#),
            "",
        ),
        (
            re(r#"(?i)[ \t]*<field\s+eval=(?:"(?:False|True)"|'(?:False|True)')\s+name=(?:"doall"|'doall')\s*/>[ \t]*\r?\n"#),
            "",
        ),
        (
            re(r#"(?i)<field\s+eval=(?:"(?:False|True)"|'(?:False|True)')\s+name=(?:"doall"|'doall')\s*/>\s*"#),
            "",
        ),
        (
            re(r#"(?i)[ \t]*<field\s+name=(?:"doall"|'doall')\s*>(?:False|True)</field>[ \t]*\r?\n"#),
            "",
        ),
        (
            re(r#"(?i)<field\s+name=(?:"doall"|'doall')\s*>(?:False|True)</field>\s*"#),
            "",
        ),
    ]
});

impl Pass for IrCronDeprecatedFields {
    fn name(&self) -> &'static str {
        "ir-cron-deprecated-fields"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !source.contains("ir.cron") {
            return Ok(PassAction::NoMatch);
        }
        Ok(rewrite_action(source, apply_rules(source, &IR_CRON_RULES)))
    }
}

/// Inside field `context` mappings, `active_id` refers to the parent record
/// since 18.0.
pub struct ActiveIdToParent;

static ACTIVE_ID: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?i)(['"][^'"]*['"]:\s*)active_id(\s*[,}\s])"#));

impl Pass for ActiveIdToParent {
    fn name(&self) -> &'static str {
        "active-id-to-parent"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !source.contains("context=") || !source.contains("active_id") {
            return Ok(PassAction::NoMatch);
        }
        let text = ACTIVE_ID
            .replace_all(source, "${1}parent.id${2}")
            .into_owned();
        Ok(rewrite_action(source, text))
    }
}

/// `res.config.settings` forms lost the `settings` div; xpaths must target
/// the form itself.
pub struct ConfigSettingsXpath;

static SETTINGS_XPATH_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            re(r#"expr="//div\[hasclass\('settings'\)\]""#),
            r#"expr="//form""#,
        ),
        (
            re(r#"expr="//div\[hasclass\("settings"\)\]""#),
            r#"expr="//form""#,
        ),
        (
            re(r#"expr\s*=\s*"//div\[hasclass\(\s*'settings'\s*\)\]""#),
            r#"expr="//form""#,
        ),
        (
            re(r#"expr\s*=\s*"//div\[hasclass\(\s*"settings"\s*\)\]""#),
            r#"expr="//form""#,
        ),
    ]
});

impl Pass for ConfigSettingsXpath {
    fn name(&self) -> &'static str {
        "config-settings-xpath"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        if !["res.config.settings", "res_config_settings"]
            .iter()
            .any(|needle| source.contains(needle))
        {
            return Ok(PassAction::NoMatch);
        }
        Ok(rewrite_action(
            source,
            apply_rules(source, &SETTINGS_XPATH_RULES),
        ))
    }
}

/// `noupdate="0"` is the default and is dropped on every migration.
pub struct DataNoupdate;

static DATA_NOUPDATE: LazyLock<Regex> = LazyLock::new(|| re(r#"<data +noupdate="0" *>"#));

impl Pass for DataNoupdate {
    fn name(&self) -> &'static str {
        "data-noupdate"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }
    fn apply(&self, _path: &Path, source: &str) -> Result<PassAction, PassError> {
        let text = DATA_NOUPDATE.replace_all(source, "<data>").into_owned();
        Ok(rewrite_action(source, text))
    }
}

/// Advisory only: buttons opening a form from a list view should probably
/// become `open_form_view="True"` in 17.0.
pub struct OpenFormViewCheck;

static FORMVIEW_BUTTON: LazyLock<Regex> =
    LazyLock::new(|| re(r#"<button[^>]*name=["']get_formview_action["']"#));

impl Pass for OpenFormViewCheck {
    fn name(&self) -> &'static str {
        "open-form-view-check"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }
    fn apply(&self, path: &Path, source: &str) -> Result<PassAction, PassError> {
        for found in FORMVIEW_BUTTON.find_iter(source) {
            let line = source[..found.start()].bytes().filter(|&b| b == b'\n').count() + 1;
            warn!(
                file = %path.display(),
                line,
                "button opening a form from a list view; consider open_form_view=\"True\""
            );
        }
        Ok(PassAction::NoMatch)
    }
}
