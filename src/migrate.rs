//! Sequential migration driver.
//!
//! Strictly sequential: modules in argument order, steps in chronological
//! order, files in listing order, passes in step order. The only
//! fault-tolerance device is per-file isolation — one file failing to parse
//! or patch is reported and left byte-identical, and the run moves on.

use crate::module::{read_text, write_text, ModuleDir, ModuleError, ALLOWED_EXTENSIONS};
use crate::passes::{eligible_passes, run_passes, FileState};
use crate::steps::MigrationStep;
use std::path::PathBuf;
use tracing::{error, info};

/// A committed rewrite of one file within one step, with both versions kept
/// for diff rendering.
#[derive(Debug)]
pub struct FileChange {
    pub path: PathBuf,
    pub before: String,
    pub after: String,
}

/// A file left untouched because a pass failed or its text could not be
/// read or written.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub construct: String,
    pub message: String,
}

#[derive(Debug)]
pub struct StepReport {
    pub step: MigrationStep,
    pub changed: Vec<FileChange>,
    pub failed: Vec<FileFailure>,
    /// Names of module operations that modified the manifest.
    pub ops_applied: Vec<&'static str>,
}

#[derive(Debug)]
pub struct ModuleReport {
    pub module: String,
    pub steps: Vec<StepReport>,
}

impl ModuleReport {
    pub fn files_changed(&self) -> usize {
        self.steps.iter().map(|s| s.changed.len()).sum()
    }

    pub fn failures(&self) -> usize {
        self.steps.iter().map(|s| s.failed.len()).sum()
    }
}

/// Run a sequence of migration steps over one module, rewriting files in
/// place. Returns an error only when the module itself cannot be enumerated;
/// per-file problems are collected in the report.
pub fn migrate_module(
    module: &ModuleDir,
    steps: &[MigrationStep],
) -> Result<ModuleReport, ModuleError> {
    let mut report = ModuleReport {
        module: module.name(),
        steps: Vec::new(),
    };

    for step in steps {
        info!(module = report.module, step = step.name(), "running step");
        report.steps.push(run_step(module, *step)?);
    }

    Ok(report)
}

fn run_step(module: &ModuleDir, step: MigrationStep) -> Result<StepReport, ModuleError> {
    let mut result = StepReport {
        step,
        changed: Vec::new(),
        failed: Vec::new(),
        ops_applied: Vec::new(),
    };

    let passes = step.passes();
    for path in module.list_files(&ALLOWED_EXTENSIONS)? {
        let eligible = eligible_passes(&passes, &path);
        if eligible.is_empty() {
            continue;
        }
        let original = match read_text(&path) {
            Ok(text) => text,
            Err(e) => {
                error!(file = %path.display(), error = %e, "cannot read file; skipped");
                result.failed.push(FileFailure {
                    path,
                    construct: "file read".to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        let outcome = run_passes(&path, &original, &eligible);
        match outcome.state {
            FileState::Failed => {
                let (pass, error) = outcome.error.expect("failed outcome carries its error");
                result.failed.push(FileFailure {
                    path,
                    construct: pass.to_string(),
                    message: error.to_string(),
                });
            }
            _ => {
                if let Some(new_text) = outcome.new_text {
                    if let Err(e) = write_text(&path, &new_text) {
                        error!(file = %path.display(), error = %e, "cannot write file");
                        result.failed.push(FileFailure {
                            path,
                            construct: "file write".to_string(),
                            message: e.to_string(),
                        });
                        continue;
                    }
                    result.changed.push(FileChange {
                        path,
                        before: original,
                        after: new_text,
                    });
                }
            }
        }
    }

    for op in step.module_ops() {
        match op.run(module, step.to) {
            Ok(true) => result.ops_applied.push(op.name()),
            Ok(false) => {}
            Err(e) => {
                error!(op = op.name(), error = %e, "module operation failed");
                result.failed.push(FileFailure {
                    path: module.manifest_path().to_path_buf(),
                    construct: op.name().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(result)
}
