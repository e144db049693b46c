//! Manifest operations.
//!
//! The manifest is a Python dict literal (`__manifest__.py`), edited with
//! targeted regexes rather than parsed wholesale: the edits touch single
//! values and must not disturb the author's formatting elsewhere.

use crate::deps::{extract_references, merge_dependencies};
use crate::module::{read_text, write_text, ModuleDir, ModuleError};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{info, warn};

/// A module-level operation run once per migration step, after the file
/// passes. Returns whether anything changed.
pub trait ModuleOp {
    fn name(&self) -> &'static str;

    fn run(&self, module: &ModuleDir, target_series: &str) -> Result<bool, ModuleError>;
}

static VERSION_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(["']version["']\s*:\s*["'])([^"']+)(["'])"#).expect("hardcoded pattern")
});

/// Rewrite a manifest version for the target series: `16.0.1.2.3` becomes
/// `17.0.1.2.3`, anything that does not carry a module version tail becomes
/// `<series>.1.0.0`.
pub fn bump_version(version: &str, target_series: &str) -> String {
    let parts: Vec<&str> = version.split('.').collect();
    let series: Vec<&str> = target_series.split('.').collect();
    if parts.len() >= 2 && parts[..2] == series[..] {
        return version.to_string();
    }
    if parts.len() >= 3 {
        format!("{target_series}.{}", parts[2..].join("."))
    } else {
        format!("{target_series}.1.0.0")
    }
}

/// Bump the manifest `version` value to the target series.
pub struct BumpManifestVersion;

impl ModuleOp for BumpManifestVersion {
    fn name(&self) -> &'static str {
        "bump-manifest-version"
    }

    fn run(&self, module: &ModuleDir, target_series: &str) -> Result<bool, ModuleError> {
        let path = module.manifest_path();
        let content = read_text(path)?;
        let Some(caps) = VERSION_VALUE.captures(&content) else {
            warn!(file = %path.display(), "no version key found in manifest");
            return Ok(false);
        };
        let old_version = caps[2].to_string();
        let new_version = bump_version(&old_version, target_series);
        if new_version == old_version {
            return Ok(false);
        }
        let updated = VERSION_VALUE
            .replace(&content, format!("${{1}}{new_version}${{3}}"))
            .into_owned();
        write_text(path, &updated)?;
        info!(
            file = %path.display(),
            from = old_version,
            to = new_version,
            "updated manifest version"
        );
        Ok(true)
    }
}

static INSTALLABLE_FALSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(["'])installable(["'])\s*:\s*False"#).expect("hardcoded pattern")
});

/// Force `'installable': True`.
pub struct SetInstallable;

impl ModuleOp for SetInstallable {
    fn name(&self) -> &'static str {
        "set-installable"
    }

    fn run(&self, module: &ModuleDir, _target_series: &str) -> Result<bool, ModuleError> {
        let path = module.manifest_path();
        let content = read_text(path)?;
        let updated = INSTALLABLE_FALSE
            .replace_all(&content, "${1}installable${2}: True")
            .into_owned();
        if updated == content {
            return Ok(false);
        }
        write_text(path, &updated)?;
        info!(file = %path.display(), "set module installable");
        Ok(true)
    }
}

static DEPENDS_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(["']depends["']\s*:\s*\[)([^\]]*)\]"#).expect("hardcoded pattern")
});
static QUOTED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"']+)["']"#).expect("hardcoded pattern"));

/// The manifest `depends` entries, in declaration order.
pub fn manifest_dependencies(content: &str) -> Vec<String> {
    let Some(caps) = DEPENDS_LIST.captures(content) else {
        return Vec::new();
    };
    QUOTED_NAME
        .captures_iter(&caps[2])
        .map(|name| name[1].to_string())
        .collect()
}

/// Scan the module's XML files for references to other modules and append
/// any missing ones to the manifest `depends` list.
pub struct SyncXmlDependencies;

impl ModuleOp for SyncXmlDependencies {
    fn name(&self) -> &'static str {
        "sync-xml-dependencies"
    }

    fn run(&self, module: &ModuleDir, _target_series: &str) -> Result<bool, ModuleError> {
        let mut found = BTreeSet::new();
        for xml_file in module.list_files(&["xml"])? {
            found.extend(extract_references(&read_text(&xml_file)?));
        }
        found.remove(&module.name());
        if found.is_empty() {
            return Ok(false);
        }

        let path = module.manifest_path();
        let content = read_text(path)?;
        if !DEPENDS_LIST.is_match(&content) {
            warn!(file = %path.display(), "no depends list found in manifest");
            return Ok(false);
        }
        let existing = manifest_dependencies(&content);
        let merged = merge_dependencies(&existing, &found);
        if merged == existing {
            return Ok(false);
        }

        let added: Vec<&String> = merged.iter().filter(|d| !existing.contains(d)).collect();
        let rendered = merged
            .iter()
            .map(|dep| format!("'{dep}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let updated = DEPENDS_LIST
            .replace(&content, format!("${{1}}{rendered}]"))
            .into_owned();
        write_text(path, &updated)?;
        info!(
            file = %path.display(),
            added = ?added,
            "added missing dependencies from XML references"
        );
        Ok(true)
    }
}
