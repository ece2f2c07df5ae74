//! Immutable source buffers with a computed parse tree and position index.

use std::path::{Path, PathBuf};

use sha2::{Digest as _, Sha256};
use tree_sitter::{Node, Tree};

use crate::error::Error;
use crate::parser;

/// Maximum source file size (16 MiB).
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// A row/column pair. Rows and columns are 0-based internally; rendering
/// for reports adds 1 to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub row: usize,
    pub column: usize,
}

/// A half-open byte interval `[start, end)` into a source buffer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn of(node: Node<'_>) -> Self {
        Self {
            start: node.start_byte(),
            end: node.end_byte(),
        }
    }
}

/// A parsed source file. Never mutates: every rewrite produces a new
/// `SourceFile` with a fresh parse, so the tree, the line index, and the
/// content hash always agree with `text`.
pub struct SourceFile {
    path: PathBuf,
    text: String,
    tree: Tree,
    line_starts: Vec<usize>,
    hash: String,
}

impl SourceFile {
    /// Parse a source buffer into an immutable `SourceFile`.
    ///
    /// A tree with `ERROR` nodes is still a successful parse; only a
    /// grammar that yields no tree at all is an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileTooLarge` past the size limit or
    /// `Error::ParseFailed` if tree-sitter produces no tree.
    pub fn parse(path: &Path, text: String) -> Result<Self, Error> {
        let size: u64 = text.len().try_into().unwrap_or(u64::MAX);
        if size > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge {
                file: path.to_path_buf(),
                size_bytes: size,
                max_bytes: MAX_FILE_SIZE,
            });
        }

        let tree = parser::parse(path, &text)?;
        let line_starts = compute_line_starts(&text);
        let hash = format!("{:x}", Sha256::digest(text.as_bytes()));

        Ok(Self {
            path: path.to_path_buf(),
            text,
            tree,
            line_starts,
            hash,
        })
    }

    /// Decode raw bytes and parse.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` for non-UTF-8 input, plus the errors
    /// of [`SourceFile::parse`].
    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self, Error> {
        let text = String::from_utf8(bytes).map_err(|_e| Error::InvalidUtf8 {
            file: path.to_path_buf(),
        })?;
        Self::parse(path, text)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Lowercase hex SHA-256 of the buffer.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Whether the grammar emitted any `ERROR` or missing subtree.
    pub fn has_parse_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Count of `ERROR` nodes in the tree. Used by the no-regression guard:
    /// a rewrite may not increase this number.
    pub fn error_count(&self) -> usize {
        parser::walk(self.root())
            .filter(|(n, _)| n.is_error() || n.is_missing())
            .count()
    }

    /// Text of a node, by its byte range.
    pub fn node_text(&self, node: Node<'_>) -> &str {
        &self.text[node.start_byte()..node.end_byte()]
    }

    /// O(log n) byte offset to row/column.
    pub fn position(&self, byte: usize) -> Position {
        let row = match self.line_starts.binary_search(&byte) {
            Ok(row) => row,
            Err(next) => next.saturating_sub(1),
        };
        Position {
            row,
            column: byte - self.line_starts[row],
        }
    }

    /// O(1) row to starting byte offset.
    pub fn line_start(&self, row: usize) -> usize {
        self.line_starts
            .get(row)
            .copied()
            .unwrap_or(self.text.len())
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The text of one line, without its trailing newline.
    pub fn line(&self, row: usize) -> &str {
        let start = self.line_start(row);
        let end = if row + 1 < self.line_starts.len() {
            self.line_starts[row + 1]
        } else {
            self.text.len()
        };
        self.text[start..end].trim_end_matches('\n')
    }
}

/// Byte offset of the start of every line. Always contains at least one
/// entry (offset 0), so every byte maps to a row.
fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(text: &str) -> SourceFile {
        SourceFile::parse(Path::new("test.can"), text.to_string()).unwrap()
    }

    #[test]
    fn line_starts_map_positions_consistently() {
        let sf = parse("int a;\nint b;\n");
        assert_eq!(sf.position(0), Position { row: 0, column: 0 });
        assert_eq!(sf.position(4), Position { row: 0, column: 4 });
        assert_eq!(sf.position(7), Position { row: 1, column: 0 });
        assert_eq!(sf.position(11), Position { row: 1, column: 4 });
        assert_eq!(sf.line_start(1), 7);
    }

    #[test]
    fn line_text_excludes_newline() {
        let sf = parse("int a;\nint b;\n");
        assert_eq!(sf.line(0), "int a;");
        assert_eq!(sf.line(1), "int b;");
    }

    #[test]
    fn hash_is_lowercase_hex() {
        let sf = parse("int a;\n");
        assert_eq!(sf.hash().len(), 64);
        assert!(sf.hash().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn clean_c_has_no_parse_errors() {
        let sf = parse("void f() { int a; a = 1; }\n");
        assert!(!sf.has_parse_errors());
        assert_eq!(sf.error_count(), 0);
    }

    #[test]
    fn rejects_invalid_utf8() {
        let result = SourceFile::from_bytes(Path::new("x.can"), vec![0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(Error::InvalidUtf8 { .. })));
    }
}
