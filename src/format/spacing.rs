//! Horizontal spacing rules: operators, keywords, commas, braces.

use regex::Regex;
use tree_sitter::Node;

use crate::config::Config;
use crate::edit::{Transformation, TransformationSet};
use crate::parser;
use crate::patterns::BLOCK_KINDS;
use crate::source::SourceFile;

use super::{push_first_wins, FormatRule};

const RULE: &str = "spacing";

/// Assignment-shaped operator tokens that want one space each side.
const ASSIGN_OPS: [&str; 11] = [
    "=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=",
];

/// Exactly one space around binary and assignment operators, one space
/// after `,` and `;` (when not line-terminal), one space after control
/// keywords before `(`, and no space between a function name and its
/// argument list. The AST decides what is an operator; a masked text
/// cleanup handles the residue regexes can judge safely.
pub struct SpacingRule;

impl FormatRule for SpacingRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn analyze(&self, sf: &SourceFile, _config: &Config) -> TransformationSet {
        let mut set = TransformationSet::new();
        let text = sf.text();

        for (node, _) in parser::walk(sf.root()) {
            match node.kind() {
                "binary_expression" => {
                    let children = parser::children_of(node);
                    if children.len() >= 3 {
                        let (left, op, right) = (children[0], children[1], children[2]);
                        if op.kind() != "." && op.kind() != "->" {
                            space_between(&mut set, text, left, op);
                            space_between(&mut set, text, op, right);
                        }
                    }
                }
                "assignment_expression" | "init_declarator" => {
                    let children = parser::children_of(node);
                    if let Some(pos) = children.iter().position(|c| ASSIGN_OPS.contains(&c.kind()))
                    {
                        if pos > 0 {
                            space_between(&mut set, text, children[pos - 1], children[pos]);
                        }
                        if pos + 1 < children.len() {
                            space_between(&mut set, text, children[pos], children[pos + 1]);
                        }
                    }
                }
                "if_statement" | "for_statement" | "while_statement" | "switch_statement" => {
                    let children = parser::children_of(node);
                    if children.len() >= 2 {
                        space_between(&mut set, text, children[0], children[1]);
                    }
                }
                "return_statement" => {
                    let children = parser::children_of(node);
                    if children.len() >= 2 && children[1].kind() == "parenthesized_expression" {
                        space_between(&mut set, text, children[0], children[1]);
                    }
                }
                "{" => {
                    let at = node.start_byte();
                    if at > 0 {
                        let before = text.as_bytes()[at - 1];
                        if !matches!(before, b' ' | b'\t' | b'(' | b'{' | b'\n') {
                            push_first_wins(&mut set, Transformation::insert(RULE, at, " "));
                        }
                    }
                }
                "else" => {
                    let at = node.start_byte();
                    if at > 0 && text.as_bytes()[at - 1] == b'}' {
                        push_first_wins(&mut set, Transformation::insert(RULE, at, " "));
                    }
                }
                "," | ";" => {
                    if let Some(next) = node.next_sibling() {
                        let gap_free = next.start_byte() == node.end_byte();
                        let wants = !matches!(next.kind(), ")" | "}" | "]" | ";" | ",");
                        if gap_free && wants {
                            push_first_wins(
                                &mut set,
                                Transformation::insert(RULE, node.end_byte(), " "),
                            );
                        }
                    }
                }
                "call_expression" => {
                    close_name_paren_gap(&mut set, sf, node, "function", "arguments");
                }
                "function_declarator" => {
                    close_name_paren_gap(&mut set, sf, node, "declarator", "parameters");
                }
                _ => {}
            }
        }

        masked_cleanup(sf, &mut set);
        set
    }
}

/// Insert one space between two abutting nodes.
fn space_between(set: &mut TransformationSet, _text: &str, a: Node<'_>, b: Node<'_>) {
    if a.end_byte() == b.start_byte() {
        push_first_wins(set, Transformation::insert(RULE, a.end_byte(), " "));
    }
}

/// Delete same-line whitespace between a callee/declarator name and its
/// parenthesized list.
fn close_name_paren_gap(
    set: &mut TransformationSet,
    sf: &SourceFile,
    node: Node<'_>,
    name_field: &str,
    list_field: &str,
) {
    let (Some(name), Some(list)) = (
        node.child_by_field_name(name_field),
        node.child_by_field_name(list_field),
    ) else {
        return;
    };
    let gap = &sf.text()[name.end_byte()..list.start_byte()];
    if !gap.is_empty() && gap.chars().all(|c| c == ' ' || c == '\t') {
        push_first_wins(
            set,
            Transformation::delete(RULE, name.end_byte(), list.start_byte()),
        );
    }
}

/// Text cleanup applied only to code, with comments and string literals
/// masked out: tighten `word . word` member access, collapse interior
/// space runs, and trim space inside parentheses.
fn masked_cleanup(sf: &SourceFile, set: &mut TransformationSet) {
    let dot = Regex::new(r"(\w)[ \t]*\.[ \t]*(\w)").expect("static regex");
    let runs = Regex::new(r"[ \t]{2,}").expect("static regex");
    let open = Regex::new(r"\([ \t]+").expect("static regex");
    let close = Regex::new(r"[ \t]+\)").expect("static regex");

    for (chunk, offset) in code_chunks(sf.text()) {
        for caps in dot.captures_iter(chunk) {
            let Some(m) = caps.get(0) else {
                continue;
            };
            let tight = format!("{}.{}", &caps[1], &caps[2]);
            if m.as_str() != tight {
                push_first_wins(
                    set,
                    Transformation::replace(RULE, offset + m.start(), offset + m.end(), tight),
                );
            }
        }
        for m in runs.find_iter(chunk) {
            let at_line_start =
                m.start() == 0 || chunk.as_bytes().get(m.start() - 1) == Some(&b'\n');
            if !at_line_start {
                push_first_wins(
                    set,
                    Transformation::replace(RULE, offset + m.start(), offset + m.end(), " "),
                );
            }
        }
        for m in open.find_iter(chunk) {
            push_first_wins(
                set,
                Transformation::replace(RULE, offset + m.start(), offset + m.end(), "("),
            );
        }
        for m in close.find_iter(chunk) {
            push_first_wins(
                set,
                Transformation::replace(RULE, offset + m.start(), offset + m.end(), ")"),
            );
        }
    }
}

/// Split source into code chunks between comments and string/char
/// literals, yielding `(chunk, byte_offset)` pairs.
pub(super) fn code_chunks(text: &str) -> Vec<(&str, usize)> {
    let mask =
        Regex::new(r#"//[^\n]*|/\*[\s\S]*?\*/|"(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#)
            .expect("static regex");
    let mut chunks = Vec::new();
    let mut last = 0;
    for m in mask.find_iter(text) {
        if m.start() > last {
            chunks.push((&text[last..m.start()], last));
        }
        last = m.end();
    }
    if last < text.len() {
        chunks.push((&text[last..], last));
    }
    chunks
}

/// K&R brace placement: `{` on the header line, separated by one space.
/// A `{` alone at the start of its line is pulled up to the previous
/// line's end.
pub struct BraceStyleRule;

impl FormatRule for BraceStyleRule {
    fn name(&self) -> &'static str {
        "brace-style"
    }

    fn analyze(&self, sf: &SourceFile, config: &Config) -> TransformationSet {
        let mut set = TransformationSet::new();
        if config.brace_style != "k&r" {
            return set;
        }

        for (node, _) in parser::walk(sf.root()) {
            let braced = BLOCK_KINDS.contains(&node.kind())
                || node.kind() == "struct_specifier"
                || node.kind() == "enum_specifier";
            if !braced {
                continue;
            }
            let Some(open) = parser::child_of_kind(node, "{") else {
                continue;
            };
            let row = open.start_position().row;
            if row == 0 {
                continue;
            }
            let line = sf.line(row);
            let col = open.start_position().column;
            if !line[..col].trim().is_empty() {
                continue;
            }
            let prev_line = sf.line(row - 1);
            let prev_trimmed = prev_line.trim_end();
            if prev_trimmed.is_empty() {
                continue;
            }
            let join_from = sf.line_start(row - 1) + prev_trimmed.len();
            push_first_wins(
                &mut set,
                Transformation::replace("brace-style", join_from, open.start_byte(), " "),
            );
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::Path;

    fn run(rule: &dyn FormatRule, text: &str) -> String {
        let config = Config::default();
        let mut current = text.to_string();
        // Iterate like the engine does, to a fixpoint.
        for _ in 0..10 {
            let sf = SourceFile::parse(Path::new("t.can"), current.clone()).unwrap();
            let set = rule.analyze(&sf, &config);
            let next = set.apply(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    #[test]
    fn spaces_around_binary_operators() {
        let out = run(&SpacingRule, "void f() {\n  x = a+b;\n}\n");
        assert!(out.contains("x = a + b;"), "got: {out}");
    }

    #[test]
    fn spaces_around_assignment() {
        let out = run(&SpacingRule, "void f() {\n  x=1;\n}\n");
        assert!(out.contains("x = 1;"), "got: {out}");
    }

    #[test]
    fn keyword_before_paren() {
        let out = run(&SpacingRule, "void f() {\n  if(x) {\n    g();\n  }\n}\n");
        assert!(out.contains("if (x)"), "got: {out}");
    }

    #[test]
    fn no_space_between_call_and_paren() {
        let out = run(&SpacingRule, "void f() {\n  g (1, 2);\n}\n");
        assert!(out.contains("g(1, 2);"), "got: {out}");
    }

    #[test]
    fn space_after_comma() {
        let out = run(&SpacingRule, "void f() {\n  g(1,2,3);\n}\n");
        assert!(out.contains("g(1, 2, 3);"), "got: {out}");
    }

    #[test]
    fn tightens_member_access() {
        let out = run(&SpacingRule, "void f() {\n  a . b = 1;\n}\n");
        assert!(out.contains("a.b = 1;"), "got: {out}");
    }

    #[test]
    fn string_contents_untouched() {
        let src = "void f() {\n  write(\"a+b  ,  c\");\n}\n";
        let out = run(&SpacingRule, src);
        assert!(out.contains("\"a+b  ,  c\""), "got: {out}");
    }

    #[test]
    fn brace_pulled_onto_header_line() {
        let out = run(&BraceStyleRule, "void f()\n{\n  g();\n}\n");
        assert!(out.starts_with("void f() {"), "got: {out}");
    }
}
