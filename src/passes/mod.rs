//! Pass pipeline.
//!
//! A migration step is an ordered list of passes. For each eligible file the
//! pipeline feeds the current text through every pass in order: parse, match
//! the pass's target construct, convert matches to edits (or a full rewrite),
//! apply, hand the result to the next pass. A failing pass abandons the whole
//! file: nothing is written and the input stays byte-identical.

pub mod read_group;
pub mod text;

use crate::edit::{apply_edits, Edit, EditError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// A named, pure transformation over one document.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// File extensions (without dot) this pass is eligible for.
    fn extensions(&self) -> &'static [&'static str];

    fn apply(&self, path: &Path, source: &str) -> Result<PassAction, PassError>;
}

/// What a pass produced for one document.
#[derive(Debug)]
pub enum PassAction {
    /// The document is already in target shape.
    NoMatch,
    /// Located edits for the patch engine.
    Edits(Vec<Edit>),
    /// A fully rewritten document.
    Rewrite(String),
}

#[derive(Error, Debug)]
pub enum PassError {
    #[error("cannot parse {construct}: {detail}")]
    Parse { construct: String, detail: String },

    #[error("ambiguous {construct}: {detail}")]
    Ambiguous { construct: String, detail: String },

    #[error(transparent)]
    Edit(#[from] EditError),
}

impl PassError {
    pub fn parse(construct: impl Into<String>, detail: impl Into<String>) -> Self {
        PassError::Parse {
            construct: construct.into(),
            detail: detail.into(),
        }
    }

    pub fn ambiguous(construct: impl Into<String>, detail: impl Into<String>) -> Self {
        PassError::Ambiguous {
            construct: construct.into(),
            detail: detail.into(),
        }
    }
}

/// Per-file progression through a step's passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileState {
    Unvisited,
    Parsed,
    Matched,
    Patched,
    Done,
    Failed,
}

/// Result of running a step's passes over one file. A `Failed` outcome always
/// has `new_text == None`: no partial result survives.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub state: FileState,
    /// The rewritten text, present only when the file changed and every pass
    /// succeeded.
    pub new_text: Option<String>,
    pub error: Option<(&'static str, PassError)>,
}

/// Filter a step's passes down to those eligible for `path`.
pub fn eligible_passes<'a>(passes: &'a [Box<dyn Pass>], path: &Path) -> Vec<&'a dyn Pass> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Vec::new();
    };
    passes
        .iter()
        .filter(|p| p.extensions().contains(&ext))
        .map(|p| p.as_ref())
        .collect()
}

/// Run passes over one file's text, chaining each pass's output into the
/// next. Cross-line edits rejected by the patch engine are reported here and
/// the pass's remaining edits still apply.
pub fn run_passes(path: &Path, original: &str, passes: &[&dyn Pass]) -> FileOutcome {
    let mut state = FileState::Unvisited;
    let mut current = original.to_string();

    for pass in passes {
        match pass.apply(path, &current) {
            Ok(PassAction::NoMatch) => {
                state = state.max(FileState::Parsed);
            }
            Ok(PassAction::Edits(edits)) => {
                state = state.max(FileState::Matched);
                match apply_edits(&current, edits) {
                    Ok(patched) => {
                        for edit in &patched.rejected {
                            warn!(
                                file = %path.display(),
                                pass = pass.name(),
                                line = edit.start.line(),
                                end_line = edit.end.line(),
                                "edit spans multiple lines; not applied"
                            );
                        }
                        if patched.changed(&current) {
                            state = state.max(FileState::Patched);
                            info!(file = %path.display(), pass = pass.name(), "patched");
                        }
                        current = patched.text;
                    }
                    Err(e) => {
                        return failed(path, pass.name(), e.into());
                    }
                }
            }
            Ok(PassAction::Rewrite(new_text)) => {
                state = state.max(FileState::Matched);
                if new_text != current {
                    state = state.max(FileState::Patched);
                    info!(file = %path.display(), pass = pass.name(), "rewritten");
                    current = new_text;
                }
            }
            Err(e) => {
                return failed(path, pass.name(), e);
            }
        }
    }

    FileOutcome {
        path: path.to_path_buf(),
        state: FileState::Done,
        new_text: (current != original).then_some(current),
        error: None,
    }
}

fn failed(path: &Path, pass: &'static str, error: PassError) -> FileOutcome {
    warn!(
        file = %path.display(),
        pass,
        error = %error,
        "pass failed; file left unmodified"
    );
    FileOutcome {
        path: path.to_path_buf(),
        state: FileState::Failed,
        new_text: None,
        error: Some((pass, error)),
    }
}
