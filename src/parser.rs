//! Parser façade over the tree-sitter C grammar.
//!
//! CAPL is close enough to C that the C grammar produces a usable tree;
//! the CAPL-specific keywords (`variables`, `on`, `testcase`, timer types)
//! are not in the grammar and surface as plain identifiers or local
//! `ERROR` regions. Positional recognition of those lives in
//! [`crate::patterns`]; this module only parses, queries, and walks.

use std::path::Path;

use streaming_iterator::StreamingIterator as _;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, Tree};

use crate::error::Error;

/// The one grammar the analyzer speaks.
pub fn language() -> Language {
    tree_sitter_c::LANGUAGE.into()
}

/// Map a file extension to its grammar. Both CAPL extensions use the C
/// grammar; anything else is unsupported.
///
/// # Errors
///
/// Returns `Error::ParseFailed` for unknown extensions.
pub fn language_for_path(path: &Path) -> Result<Language, Error> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "can" | "cin" => Ok(language()),
        _ => Err(Error::ParseFailed {
            file: path.to_path_buf(),
            reason: format!("unsupported extension: .{ext}"),
        }),
    }
}

/// Parse source into a tree. A tree containing `ERROR` nodes is still
/// returned; only the absence of any tree is a failure.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the language cannot be set or
/// tree-sitter yields no tree.
pub fn parse(path: &Path, source: &str) -> Result<Tree, Error> {
    let language = language_for_path(path)?;
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| Error::ParseFailed {
            file: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    parser.parse(source, None).ok_or_else(|| Error::ParseFailed {
        file: path.to_path_buf(),
        reason: "tree-sitter returned no tree".to_string(),
    })
}

/// One query match: capture names bound to nodes.
pub struct Match<'t> {
    pub captures: Vec<(String, Node<'t>)>,
}

impl<'t> Match<'t> {
    /// The node bound to a capture name, if present.
    pub fn capture(&self, name: &str) -> Option<Node<'t>> {
        self.captures
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| *node)
    }
}

/// Run an s-expression query below `node` and collect all matches.
///
/// # Errors
///
/// Returns `Error::InvalidQuery` for a malformed pattern.
pub fn query<'t>(node: Node<'t>, source: &str, pattern: &str) -> Result<Vec<Match<'t>>, Error> {
    let query = Query::new(&language(), pattern).map_err(|e| Error::InvalidQuery {
        reason: e.to_string(),
    })?;
    let names = query.capture_names();

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, node, source.as_bytes());
    let mut out = Vec::new();
    while let Some(m) = matches.next() {
        let captures = m
            .captures
            .iter()
            .map(|c| (names[c.index as usize].to_string(), c.node))
            .collect();
        out.push(Match { captures });
    }
    Ok(out)
}

/// Depth-first, document-order iterator over a subtree, yielding each node
/// with its depth below the walk root. The yield surface stays outside the
/// rules: each consumer filters the stream itself.
pub fn walk(root: Node<'_>) -> Walker<'_> {
    Walker {
        stack: vec![(root, 0)],
    }
}

pub struct Walker<'t> {
    stack: Vec<(Node<'t>, usize)>,
}

impl<'t> Iterator for Walker<'t> {
    type Item = (Node<'t>, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        // Push children in reverse so the leftmost is visited first.
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            self.stack.push((child, depth + 1));
        }
        Some((node, depth))
    }
}

/// All direct children of a node, collected. `Node` is `Copy`, so this is
/// cheap and sidesteps cursor borrow gymnastics at call sites.
pub fn children_of(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// First direct child with the given kind.
pub fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    children_of(node).into_iter().find(|c| c.kind() == kind)
}

/// First ancestor with the given kind.
pub fn parent_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == kind {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn parses_plain_c() {
        let tree = parse(Path::new("t.can"), "int a;\n").unwrap();
        assert_eq!(tree.root_node().kind(), "translation_unit");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn language_for_capl_extensions() {
        assert!(language_for_path(Path::new("node.can")).is_ok());
        assert!(language_for_path(Path::new("common.cin")).is_ok());
        assert!(language_for_path(Path::new("main.c")).is_err());
    }

    #[test]
    fn walk_yields_document_order_with_depth() {
        let source = "void f() { int a; }\n";
        let tree = parse(Path::new("t.can"), source).unwrap();
        let nodes: Vec<(String, usize)> = walk(tree.root_node())
            .map(|(n, d)| (n.kind().to_string(), d))
            .collect();
        assert_eq!(nodes[0], ("translation_unit".to_string(), 0));
        assert!(nodes.iter().any(|(k, _)| k == "function_definition"));
        let decl_depth = nodes.iter().find(|(k, _)| k == "declaration").unwrap().1;
        assert!(decl_depth >= 2);
    }

    #[test]
    fn query_binds_captures() {
        let source = "#include \"util.cin\"\n";
        let tree = parse(Path::new("t.can"), source).unwrap();
        let matches = query(
            tree.root_node(),
            source,
            "(preproc_include path: (string_literal) @path)",
        )
        .unwrap();
        assert_eq!(matches.len(), 1);
        let path = matches[0].capture("path").unwrap();
        assert_eq!(&source[path.start_byte()..path.end_byte()], "\"util.cin\"");
    }

    #[test]
    fn malformed_query_is_an_error() {
        let tree = parse(Path::new("t.can"), "int a;\n").unwrap();
        let result = query(tree.root_node(), "int a;\n", "(this_is_not_a_node)");
        assert!(result.is_err());
    }
}
