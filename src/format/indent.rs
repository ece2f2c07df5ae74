//! Indentation: each line gets `indent_size × level` spaces, where the
//! level is the minimum AST depth over the tokens starting on that line.

use tree_sitter::Node;

use crate::config::Config;
use crate::edit::{Transformation, TransformationSet};
use crate::parser;
use crate::patterns::BLOCK_KINDS;
use crate::source::SourceFile;

use super::push_first_wins;

/// Recompute leading whitespace for every line that starts a token.
/// Continuation lines of multi-line tokens (block comments, rare string
/// shapes) start no token and keep their own alignment.
pub fn reindent(sf: &SourceFile, config: &Config) -> TransformationSet {
    let mut set = TransformationSet::new();
    let rule = "indentation";

    // Minimum depth per row, over leaf tokens starting on that row.
    let mut row_level: Vec<Option<usize>> = vec![None; sf.line_count()];
    for (node, _) in parser::walk(sf.root()) {
        if node.child_count() > 0 {
            continue;
        }
        let row = node.start_position().row;
        let depth = nesting_depth(node);
        let entry = &mut row_level[row];
        *entry = Some(entry.map_or(depth, |d| d.min(depth)));
    }

    for (row, level) in row_level.iter().enumerate() {
        let Some(level) = level else {
            continue;
        };
        let line = sf.line(row);
        let existing: usize = line.len() - line.trim_start().len();
        let wanted = " ".repeat(config.indent_size * level);
        if line[..existing] != wanted {
            let start = sf.line_start(row);
            push_first_wins(
                &mut set,
                Transformation::replace(rule, start, start + existing, wanted),
            );
        }
    }
    set
}

/// How deeply nested a token is: one level per enclosing braced block the
/// token is strictly inside, one for the body of a `case`/`default` label
/// (labels themselves stay at the switch-body level), and one per
/// multi-line parenthesized construct.
fn nesting_depth(token: Node<'_>) -> usize {
    let mut depth = 0;
    let mut current = token.parent();
    while let Some(ancestor) = current {
        match ancestor.kind() {
            kind if BLOCK_KINDS.contains(&kind) => {
                if strictly_inside_braces(token, ancestor) {
                    depth += 1;
                }
            }
            "case_statement" => {
                if after_label_colon(token, ancestor) {
                    depth += 1;
                }
            }
            "argument_list" | "parameter_list" | "parenthesized_expression" => {
                if ancestor.start_position().row != ancestor.end_position().row
                    && token.start_byte() > ancestor.start_byte()
                    && token.end_byte() < ancestor.end_byte()
                {
                    depth += 1;
                }
            }
            _ => {}
        }
        current = ancestor.parent();
    }
    depth
}

/// True when the token sits between the block's braces, excluding the
/// braces themselves.
fn strictly_inside_braces(token: Node<'_>, block: Node<'_>) -> bool {
    let Some(open) = parser::child_of_kind(block, "{") else {
        return false;
    };
    let Some(close) = parser::children_of(block)
        .into_iter()
        .rev()
        .find(|c| c.kind() == "}")
    else {
        return false;
    };
    token.start_byte() >= open.end_byte() && token.start_byte() < close.start_byte()
}

/// True when the token comes after the label's colon.
fn after_label_colon(token: Node<'_>, case_stmt: Node<'_>) -> bool {
    parser::child_of_kind(case_stmt, ":")
        .map(|colon| token.start_byte() >= colon.end_byte())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn indented(text: &str) -> String {
        let sf = SourceFile::parse(Path::new("t.can"), text.to_string()).unwrap();
        reindent(&sf, &Config::default()).apply(sf.text())
    }

    #[test]
    fn function_body_gets_one_level() {
        let out = indented("void f() {\nint a;\na = 1;\n}\n");
        assert_eq!(out, "void f() {\n  int a;\n  a = 1;\n}\n");
    }

    #[test]
    fn closing_brace_returns_to_header_column() {
        let out = indented("void f() {\n    g();\n    }\n");
        assert_eq!(out, "void f() {\n  g();\n}\n");
    }

    #[test]
    fn case_labels_dedent_relative_to_their_body() {
        let out = indented(
            "void f() {\nswitch (x) {\ncase 1:\ng();\nbreak;\ndefault:\nh();\n}\n}\n",
        );
        assert_eq!(
            out,
            "void f() {\n  switch (x) {\n    case 1:\n      g();\n      break;\n    default:\n      h();\n  }\n}\n"
        );
    }

    #[test]
    fn nested_blocks_accumulate() {
        let out = indented("void f() {\nif (x) {\ng();\n}\n}\n");
        assert_eq!(out, "void f() {\n  if (x) {\n    g();\n  }\n}\n");
    }

    #[test]
    fn multiline_call_arguments_indent_one_level() {
        // The closing paren's depth is the call's own, so the final line
        // takes the minimum of its tokens.
        let out = indented("void f() {\ng(\n1,\n2\n);\n}\n");
        assert_eq!(out, "void f() {\n  g(\n    1,\n    2\n  );\n}\n");
    }

    #[test]
    fn respects_configured_indent_size() {
        let sf = SourceFile::parse(Path::new("t.can"), "void f() {\ng();\n}\n".to_string()).unwrap();
        let mut config = Config::default();
        config.indent_size = 4;
        let out = reindent(&sf, &config).apply(sf.text());
        assert_eq!(out, "void f() {\n    g();\n}\n");
    }

    #[test]
    fn block_comment_continuation_lines_keep_alignment() {
        let src = "void f() {\n/*\n * art\n */\ng();\n}\n";
        let out = indented(src);
        assert!(out.contains(" * art"), "got: {out}");
    }
}
