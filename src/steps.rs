//! Migration step registry.
//!
//! Each step is one version-to-version upgrade unit: an ordered list of file
//! passes plus the module-level operations run after them. The registry is
//! compiled in; adding a series means adding an entry here and wiring its
//! passes.

use crate::manifest::{BumpManifestVersion, ModuleOp, SetInstallable, SyncXmlDependencies};
use crate::passes::text::{
    ActiveIdToParent, ChatterBlocks, ConfigSettingsXpath, DataNoupdate, FieldTypeTree,
    IrCronDeprecatedFields, KanbanRenames, OpenFormViewCheck, TreeToListViews, UnaccentParameter,
    UserHasGroups, UstrRemoval,
};
use crate::passes::{read_group, Pass};
use crate::xml::CollapseVisibilityAttrs;
use thiserror::Error;

/// One version-to-version upgrade unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStep {
    pub from: &'static str,
    pub to: &'static str,
}

/// All supported steps, in chronological order.
pub const STEPS: [MigrationStep; 4] = [
    MigrationStep { from: "15.0", to: "16.0" },
    MigrationStep { from: "16.0", to: "17.0" },
    MigrationStep { from: "17.0", to: "18.0" },
    MigrationStep { from: "18.0", to: "19.0" },
];

impl MigrationStep {
    pub fn name(&self) -> String {
        format!("{} -> {}", self.from, self.to)
    }

    /// The step's file passes, in execution order.
    pub fn passes(&self) -> Vec<Box<dyn Pass>> {
        let mut passes: Vec<Box<dyn Pass>> = Vec::new();
        match self.to {
            "17.0" => {
                passes.extend(read_group::pipeline());
                passes.push(Box::new(CollapseVisibilityAttrs));
                passes.push(Box::new(ConfigSettingsXpath));
                passes.push(Box::new(OpenFormViewCheck));
            }
            "18.0" => {
                passes.push(Box::new(UnaccentParameter));
                passes.push(Box::new(KanbanRenames));
                passes.push(Box::new(TreeToListViews));
                passes.push(Box::new(ChatterBlocks));
                passes.push(Box::new(UserHasGroups));
                passes.push(Box::new(UstrRemoval));
                passes.push(Box::new(FieldTypeTree));
                passes.push(Box::new(IrCronDeprecatedFields));
                passes.push(Box::new(ActiveIdToParent));
            }
            _ => {}
        }
        passes.push(Box::new(DataNoupdate));
        passes
    }

    /// Module-level operations run once per step, after the file passes.
    pub fn module_ops(&self) -> Vec<Box<dyn ModuleOp>> {
        let mut ops: Vec<Box<dyn ModuleOp>> = vec![
            Box::new(BumpManifestVersion),
            Box::new(SetInstallable),
        ];
        if self.to == "17.0" {
            ops.push(Box::new(SyncXmlDependencies));
        }
        ops
    }
}

#[derive(Error, Debug)]
pub enum StepError {
    #[error("unknown origin version {found:?}; available: {}", available_origins().join(", "))]
    UnknownOrigin { found: String },

    #[error("unknown target version {found:?}; available: {}", available_targets().join(", "))]
    UnknownTarget { found: String },

    #[error("origin version {from} is not older than target version {to}")]
    EmptyRange { from: String, to: String },
}

pub fn available_origins() -> Vec<&'static str> {
    STEPS.iter().map(|s| s.from).collect()
}

pub fn available_targets() -> Vec<&'static str> {
    STEPS.iter().map(|s| s.to).collect()
}

pub fn latest_target() -> &'static str {
    STEPS[STEPS.len() - 1].to
}

/// The contiguous run of steps taking a module from `from` to `to`.
pub fn steps_between(from: &str, to: &str) -> Result<Vec<MigrationStep>, StepError> {
    let start = STEPS
        .iter()
        .position(|s| s.from == from)
        .ok_or_else(|| StepError::UnknownOrigin {
            found: from.to_string(),
        })?;
    let end = STEPS
        .iter()
        .position(|s| s.to == to)
        .ok_or_else(|| StepError::UnknownTarget {
            found: to.to_string(),
        })?;
    if end < start {
        return Err(StepError::EmptyRange {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(STEPS[start..=end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_range_covers_every_step() {
        let steps = steps_between("15.0", "19.0").unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].name(), "15.0 -> 16.0");
        assert_eq!(steps[3].name(), "18.0 -> 19.0");
    }

    #[test]
    fn single_step_range() {
        let steps = steps_between("16.0", "17.0").unwrap();
        assert_eq!(steps, vec![MigrationStep { from: "16.0", to: "17.0" }]);
    }

    #[test]
    fn unknown_versions_are_rejected() {
        assert!(matches!(
            steps_between("14.0", "17.0"),
            Err(StepError::UnknownOrigin { .. })
        ));
        assert!(matches!(
            steps_between("16.0", "20.0"),
            Err(StepError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            steps_between("17.0", "16.0"),
            Err(StepError::EmptyRange { .. })
        ));
    }

    #[test]
    fn every_step_carries_passes_and_ops() {
        for step in STEPS {
            assert!(!step.passes().is_empty(), "{} has no passes", step.name());
            assert!(step.module_ops().len() >= 2);
        }
    }

    #[test]
    fn structural_steps_have_their_pipelines() {
        let to_17 = steps_between("16.0", "17.0").unwrap()[0].passes();
        assert!(to_17.iter().any(|p| p.name() == "collapse-visibility-attrs"));
        assert!(to_17.iter().any(|p| p.name() == "swap-groupby-aggregates"));
        let to_18 = steps_between("17.0", "18.0").unwrap()[0].passes();
        assert!(to_18.iter().any(|p| p.name() == "tree-to-list-views"));
        assert!(to_18.iter().any(|p| p.name() == "ir-cron-deprecated-fields"));
    }
}
