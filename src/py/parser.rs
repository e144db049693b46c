use crate::py::errors::PyError;
use tree_sitter::{Parser, Tree};

/// Tree-sitter parser wrapper for Python source code.
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self, PyError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|_| PyError::LanguageSet)?;
        Ok(Self { parser })
    }

    /// Parse source code and return the tree along with the source.
    pub fn parse<'a>(&mut self, source: &'a str) -> Result<ParsedSource<'a>, PyError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or(PyError::ParseFailed)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl<'a> ParsedSource<'a> {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    /// Check if the tree contains any ERROR or MISSING nodes.
    pub fn has_errors(&self) -> bool {
        has_error_nodes(self.tree.root_node())
    }

    /// One-based line of the first ERROR node, for reporting.
    pub fn first_error_line(&self) -> Option<usize> {
        first_error_node(self.tree.root_node()).map(|line| line + 1)
    }

    /// Require an error-free tree.
    pub fn check(self) -> Result<Self, PyError> {
        match self.first_error_line() {
            Some(line) => Err(PyError::SyntaxError { line }),
            None => Ok(self),
        }
    }

    /// Extract text for a node's byte range.
    pub fn node_text(&self, node: tree_sitter::Node<'_>) -> &'a str {
        &self.source[node.byte_range()]
    }
}

fn has_error_nodes(node: tree_sitter::Node<'_>) -> bool {
    if node.is_error() || node.is_missing() {
        return true;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if has_error_nodes(child) {
            return true;
        }
    }
    false
}

fn first_error_node(node: tree_sitter::Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(row) = first_error_node(child) {
            return Some(row);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_python() {
        let mut parser = PythonParser::new().unwrap();
        let parsed = parser.parse("def main():\n    pass\n").unwrap();
        assert!(!parsed.has_errors());
        assert_eq!(parsed.root_node().kind(), "module");
    }

    #[test]
    fn parse_invalid_python_reports_line() {
        let mut parser = PythonParser::new().unwrap();
        let parsed = parser.parse("def main(:\n    pass\n").unwrap();
        assert!(parsed.has_errors());
        assert!(parsed.first_error_line().is_some());
        assert!(matches!(
            parsed.check(),
            Err(PyError::SyntaxError { .. })
        ));
    }
}
