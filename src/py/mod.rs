//! Python source analysis built on tree-sitter.

pub mod calls;
pub mod errors;
pub mod parser;

pub use calls::{find_method_calls, Argument, CallSite, KeywordArg};
pub use errors::PyError;
pub use parser::{ParsedSource, PythonParser};
