//! Odoo Migrator: source-level migration of Odoo addon modules
//!
//! Rewrites a module's Python models, XML views/data and JS sources to track
//! Odoo's syntax changes across versions 15.0 through 19.0.
//!
//! # Architecture
//!
//! Code edits compile down to a single primitive: [`Edit`], a byte-span
//! replacement over an immutable snapshot, applied bottom-up in one batch.
//! Intelligence lives in span acquisition — tree-sitter analysis of Python
//! call sites, regex passes for single-pattern substitutions — not in the
//! application logic. XML restructuring is the one exception: the legacy
//! `attrs`/`states` collapse mutates a parsed element tree directly and
//! re-serializes once.
//!
//! Each migration step is an ordered list of [`passes::Pass`]es chained per
//! file, followed by module-level manifest operations. A pass that cannot
//! safely resolve what it matched fails the whole file: the file stays
//! byte-identical and the run moves on to the next one.
//!
//! # Example
//!
//! ```no_run
//! use odoo_migrator::{migrate_module, steps_between, ModuleDir};
//!
//! # fn main() -> anyhow::Result<()> {
//! let module = ModuleDir::open("addons/my_module")?;
//! let steps = steps_between("16.0", "18.0")?;
//! let report = migrate_module(&module, &steps)?;
//! println!("{} files changed", report.files_changed());
//! # Ok(())
//! # }
//! ```

pub mod deps;
pub mod edit;
pub mod expr;
pub mod manifest;
pub mod migrate;
pub mod module;
pub mod passes;
pub mod py;
pub mod steps;
pub mod xml;

// Re-exports
pub use edit::{apply_edits, Edit, EditError, EditVerification, Patched};
pub use migrate::{migrate_module, FileChange, FileFailure, ModuleReport, StepReport};
pub use module::{ModuleDir, ModuleError};
pub use steps::{steps_between, MigrationStep, StepError};
