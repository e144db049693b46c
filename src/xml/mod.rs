//! XML view/data handling: an owned element tree plus the structural
//! rewriter that collapses the legacy conditional-visibility attributes.

pub mod rewrite;
pub mod tree;

pub use rewrite::{combined_invisible_condition, CollapseVisibilityAttrs, TARGET_ATTRS};
pub use tree::{Comment, Document, Element, Instruction, Node, XmlError};
