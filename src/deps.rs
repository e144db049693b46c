//! Cross-file dependency reconciliation.
//!
//! Rewritten XML frequently references records from other modules
//! (`parent="project.menu_project_config"`). The two functions here are the
//! whole interface: scan XML text for module-qualified identifiers, and merge
//! the findings into an existing dependency list.

use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

static KNOWN_ODOO_MODULES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        // Core
        "base", "web", "mail", "portal", "resource", "barcodes", "bus", "contacts",
        "calendar", "crm", "digest", "fetchmail", "gamification", "hr", "hr_attendance",
        "hr_holidays", "hr_maintenance", "hr_recruitment", "hr_timesheet", "im_livechat",
        "link_tracker", "mass_mailing", "note", "phone_validation", "rating", "sms",
        "snailmail", "social_media", "survey", "utm", "voip", "website",
        // Accounting
        "account", "account_accountant", "account_asset", "account_budget",
        "account_check_printing", "account_followup", "account_invoice_extract",
        "account_payment", "account_reports", "account_sequence", "account_tax_python",
        "analytic", "payment", "payment_adyen", "payment_authorize", "payment_buckaroo",
        "payment_paypal", "payment_stripe", "payment_transfer",
        // Inventory and manufacturing
        "stock", "stock_account", "stock_barcode", "stock_dropshipping",
        "stock_landed_costs", "stock_picking_batch", "mrp", "mrp_account",
        "mrp_bom_cost", "mrp_byproduct", "mrp_mps", "mrp_plm", "mrp_repair",
        "mrp_subcontracting", "mrp_workorder", "quality", "quality_control",
        "quality_mrp", "maintenance",
        // Sales and purchase
        "sale", "sale_management", "sale_margin", "sale_stock", "sale_timesheet",
        "purchase", "purchase_requisition", "purchase_stock", "pos_discount",
        "pos_hr", "pos_mercury", "pos_restaurant", "point_of_sale",
        // Project and services
        "project", "project_forecast", "project_timesheet_holidays", "timesheet_grid",
        "planning", "helpdesk", "field_service", "industry_fsm",
        // Website and eCommerce
        "website_blog", "website_crm", "website_event", "website_event_track",
        "website_form", "website_forum", "website_hr_recruitment", "website_livechat",
        "website_mass_mailing", "website_partner", "website_payment", "website_profile",
        "website_quote", "website_sale", "website_sale_comparison",
        "website_sale_delivery", "website_sale_digital", "website_sale_stock",
        "website_sale_wishlist", "website_slides", "website_twitter", "website_version",
        // Marketing and events
        "marketing_automation", "event", "event_booth", "event_sale", "social",
        // Localization
        "l10n_us", "l10n_ca", "l10n_mx", "l10n_eu_oss", "l10n_generic_coa",
        // Other common modules
        "documents", "sign", "spreadsheet_dashboard", "approvals", "fleet",
        "lunch", "hr_expense", "hr_skills", "website_appointment", "appointment",
        "whatsapp", "discuss", "knowledge", "industry_fsm_sale", "industry_fsm_stock",
        "hr_work_entry", "hr_work_entry_contract", "hr_payroll", "hr_contract",
    ])
});

/// Prefixes that look like module names in qualified identifiers but are
/// framework namespaces or local shorthand, never installable modules.
static IGNORE_PREFIXES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "ir", "res", "wizard", "report", "workflow", "base_import", "web_editor",
        "web_tour", "object", "record", "widget",
    ])
});

static REFERENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // ref-like attributes holding a module.record identifier
        r#"(?:parent|action|model|res_model|view_id|inherit_id|ref)=["']([A-Za-z_][A-Za-z0-9_]*)\.[A-Za-z_][A-Za-z0-9_]*["']"#,
        // record model names
        r#"<record[^>]+model=["']([A-Za-z_][A-Za-z0-9_]*)\.[A-Za-z_][A-Za-z0-9_]*["']"#,
        // field ref attributes
        r#"<field[^>]+ref=["']([A-Za-z_][A-Za-z0-9_]*)\.[A-Za-z_][A-Za-z0-9_]*["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("hardcoded pattern"))
    .collect()
});

/// Qualifiers that are local names in view context, not modules.
const LOCAL_NAMES: [&str; 5] = ["self", "parent", "context", "request", "env"];

/// Scan XML text for module-qualified identifiers and return the plausible
/// module names. Unknown names are kept with a warning rather than dropped;
/// a missing dependency breaks installation, a spurious one is easy to spot.
pub fn extract_references(xml: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for pattern in REFERENCE_PATTERNS.iter() {
        for caps in pattern.captures_iter(xml) {
            let name = &caps[1];
            if LOCAL_NAMES.contains(&name) || name.starts_with('_') {
                continue;
            }
            if IGNORE_PREFIXES.contains(name) {
                debug!(module = name, "ignoring framework reference");
                continue;
            }
            if found.insert(name.to_string()) && !KNOWN_ODOO_MODULES.contains(name) {
                warn!(
                    module = name,
                    "unknown module reference; verify it is a real dependency"
                );
            }
        }
    }
    found
}

/// Merge found references into an existing dependency list, preserving the
/// existing order and appending new entries in sorted order.
pub fn merge_dependencies(existing: &[String], found: &BTreeSet<String>) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    for name in found {
        if !merged.iter().any(|dep| dep == name) {
            merged.push(name.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_qualified_references() {
        let xml = concat!(
            "<odoo>\n",
            "    <menuitem id=\"menu\" parent=\"project.menu_project_config\"/>\n",
            "    <field name=\"group_id\" ref=\"stock.group_stock_manager\"/>\n",
            "</odoo>\n",
        );
        let refs = extract_references(xml);
        assert!(refs.contains("project"));
        assert!(refs.contains("stock"));
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn framework_prefixes_are_ignored() {
        let xml = concat!(
            "<record id=\"x\" model=\"ir.ui.view\">\n",
            "    <field name=\"model\">res.partner</field>\n",
            "    <field name=\"inherit_id\" ref=\"mail.view_partner_form\"/>\n",
            "</record>\n",
        );
        let refs = extract_references(xml);
        assert_eq!(refs, BTreeSet::from(["mail".to_string()]));
    }

    #[test]
    fn unknown_modules_are_kept() {
        let xml = "<field name=\"view_id\" ref=\"my_custom_module.view_form\"/>";
        let refs = extract_references(xml);
        assert!(refs.contains("my_custom_module"));
    }

    #[test]
    fn merge_preserves_existing_order_and_appends() {
        let existing = deps(&["web", "base"]);
        let found = BTreeSet::from(["stock".to_string(), "base".to_string()]);
        assert_eq!(
            merge_dependencies(&existing, &found),
            deps(&["web", "base", "stock"])
        );
    }

    #[test]
    fn merge_with_nothing_found_is_identity() {
        let existing = deps(&["base"]);
        assert_eq!(merge_dependencies(&existing, &BTreeSet::new()), existing);
    }
}
