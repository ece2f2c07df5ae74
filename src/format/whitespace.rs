//! Vertical whitespace: top-level column reset, blank-line collapse, and
//! the setup/logic zone discipline inside blocks.

use regex::Regex;

use crate::edit::{Transformation, TransformationSet};
use crate::parser;
use crate::source::SourceFile;

use super::push_first_wins;

/// Phase 1: every top-level item starts at column zero. Items buried in
/// top-level `ERROR` wrappers (handler headers, the `variables` keyword)
/// count as top-level too.
pub fn pre_normalize(sf: &SourceFile) -> TransformationSet {
    let mut set = TransformationSet::new();
    let rule = "pre-normalization";

    let mut items = Vec::new();
    for child in parser::children_of(sf.root()) {
        if child.kind() == "ERROR" {
            items.extend(parser::children_of(child));
        } else {
            items.push(child);
        }
    }

    for item in items {
        if item.kind() == "comment" {
            continue;
        }
        let col = item.start_position().column;
        if col == 0 {
            continue;
        }
        let line_start = sf.line_start(item.start_position().row);
        if sf.text()[line_start..item.start_byte()]
            .chars()
            .all(|c| c == ' ' || c == '\t')
        {
            push_first_wins(
                &mut set,
                Transformation::delete(rule, line_start, item.start_byte()),
            );
        }
    }
    set
}

/// Strip trailing whitespace from every line and normalize the end of the
/// buffer to exactly one newline.
pub fn strip_trailing(sf: &SourceFile) -> TransformationSet {
    let mut set = TransformationSet::new();
    let rule = "trailing-whitespace";
    let text = sf.text();

    let trailing = Regex::new(r"[ \t]+\n").expect("static regex");
    for m in trailing.find_iter(text) {
        push_first_wins(&mut set, Transformation::replace(rule, m.start(), m.end(), "\n"));
    }

    let tail_len = text.len() - text.trim_end().len();
    if tail_len > 0 && &text[text.len() - tail_len..] != "\n" {
        push_first_wins(
            &mut set,
            Transformation::replace(rule, text.len() - tail_len, text.len(), "\n"),
        );
    } else if tail_len == 0 && !text.is_empty() {
        push_first_wins(&mut set, Transformation::insert(rule, text.len(), "\n"));
    }
    set
}

/// Collapse every run of three or more newlines (blank lines may carry
/// stray whitespace) down to exactly two, globally.
pub fn collapse_global_blanks(sf: &SourceFile) -> TransformationSet {
    let mut set = TransformationSet::new();
    let runs = Regex::new(r"\n(?:[ \t]*\n){2,}").expect("static regex");
    for m in runs.find_iter(sf.text()) {
        push_first_wins(
            &mut set,
            Transformation::replace("blank-collapse", m.start(), m.end(), "\n\n"),
        );
    }
    set
}

/// Setup/logic zones inside every block body. The setup zone (leading
/// declarations and comments) holds no blank lines; the logic zone keeps
/// at most one blank between siblings; the brace lines keep none. A
/// header comment directly above its target stays glued to it.
pub fn zone_blanks(sf: &SourceFile) -> TransformationSet {
    let mut set = TransformationSet::new();
    let rule = "setup-logic-zones";

    for (node, _) in parser::walk(sf.root()) {
        if node.kind() != "compound_statement" {
            continue;
        }
        let children = parser::children_of(node);
        let items: Vec<_> = children
            .iter()
            .copied()
            .filter(|c| c.kind() != "{" && c.kind() != "}")
            .collect();
        if items.is_empty() {
            continue;
        }

        // Comments are transparent: the logic zone starts at the first
        // child that is neither a declaration nor a comment.
        let first_logic = items
            .iter()
            .position(|c| !matches!(c.kind(), "declaration" | "comment"))
            .unwrap_or(usize::MAX);

        let open = children.iter().copied().find(|c| c.kind() == "{");
        let close = children.iter().copied().rev().find(|c| c.kind() == "}");

        if let Some(open) = open {
            limit_gap(sf, rule, open.end_byte(), open.end_position().row, items[0], 0, &mut set);
        }

        for (i, pair) in items.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            let current = b
                .start_position()
                .row
                .saturating_sub(a.end_position().row + 1);
            let desired = if i + 1 < first_logic {
                0
            } else if a.kind() == "comment" && current <= 1 {
                // Header comment proximity: no blank between a comment and
                // the code it annotates.
                0
            } else {
                current.min(1)
            };
            limit_gap(sf, rule, a.end_byte(), a.end_position().row, b, desired, &mut set);
        }

        if let Some(close) = close {
            if let Some(last) = items.last() {
                let region_start = last.end_byte();
                let row = last.end_position().row;
                let close_row = close.start_position().row;
                if close_row > row {
                    let current = close_row - row - 1;
                    if current > 0 {
                        push_first_wins(
                            &mut set,
                            Transformation::replace(
                                rule,
                                region_start,
                                sf.line_start(close_row),
                                "\n".to_string(),
                            ),
                        );
                    }
                }
            }
        }
    }
    set
}

/// Rewrite the whitespace between the end of `a` (at `a_end`, on row
/// `a_row`) and the line start of `b` so exactly `desired` blank lines
/// remain. Same-row pairs are structural business, not vertical.
fn limit_gap(
    sf: &SourceFile,
    rule: &str,
    a_end: usize,
    a_row: usize,
    b: tree_sitter::Node<'_>,
    desired: usize,
    set: &mut TransformationSet,
) {
    let b_row = b.start_position().row;
    if b_row <= a_row {
        return;
    }
    let current = b_row - a_row - 1;
    if current <= desired {
        return;
    }
    push_first_wins(
        set,
        Transformation::replace(
            rule,
            a_end,
            sf.line_start(b_row),
            "\n".repeat(desired + 1),
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn fixpoint<F: Fn(&SourceFile) -> TransformationSet>(f: F, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..10 {
            let sf = SourceFile::parse(Path::new("t.can"), current.clone()).unwrap();
            let next = f(&sf).apply(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    #[test]
    fn top_level_items_start_at_column_zero() {
        let out = fixpoint(pre_normalize, "   int gA;\n  void f() {\n  g();\n}\n");
        assert!(out.starts_with("int gA;"), "got: {out}");
    }

    #[test]
    fn strips_trailing_spaces_and_fixes_eof() {
        let out = fixpoint(strip_trailing, "int a;   \nint b;\n\n\n");
        assert_eq!(out, "int a;\nint b;\n");
    }

    #[test]
    fn collapses_three_plus_newlines() {
        let out = fixpoint(collapse_global_blanks, "int a;\n\n\n\nint b;\n");
        assert_eq!(out, "int a;\n\nint b;\n");
    }

    #[test]
    fn setup_zone_blank_lines_collapse() {
        // Declarations glue together; logic statements keep single blanks;
        // the blank after `{` and before `}` goes away.
        let src = "void f() {\n\n  int x;\n\n  int y;\n\n  write(\"hi\");\n\n  write(\"bye\");\n\n}\n";
        let out = fixpoint(zone_blanks, src);
        assert_eq!(
            out,
            "void f() {\n  int x;\n  int y;\n\n  write(\"hi\");\n\n  write(\"bye\");\n}\n"
        );
    }

    #[test]
    fn header_comment_stays_glued_to_target() {
        let src = "void f() {\n  write(\"a\");\n\n  // explains b\n\n  write(\"b\");\n}\n";
        let out = fixpoint(zone_blanks, src);
        assert!(
            out.contains("// explains b\n  write(\"b\");"),
            "comment separated from target: {out}"
        );
    }
}
