//! Structural rules: block expansion, statement splitting, switch labels,
//! and quote normalization.

use regex::Regex;

use crate::config::Config;
use crate::edit::{Transformation, TransformationSet};
use crate::parser;
use crate::source::SourceFile;

use super::{push_first_wins, FormatRule};

/// Any brace-enclosed block with content on the same line as `{` is split:
/// newline after `{`, newline before `}`. Struct and enum member lists are
/// also split member-per-line here (statement splitting skips them).
/// Empty blocks stay `{ }` on one line.
pub struct BlockExpansionRule;

impl FormatRule for BlockExpansionRule {
    fn name(&self) -> &'static str {
        "block-expansion"
    }

    fn analyze(&self, sf: &SourceFile, _config: &Config) -> TransformationSet {
        let mut set = TransformationSet::new();
        let rule = self.name();

        for (node, _) in parser::walk(sf.root()) {
            let is_block = matches!(
                node.kind(),
                "compound_statement" | "field_declaration_list" | "enumerator_list"
            );
            if !is_block {
                continue;
            }
            let Some(open) = parser::child_of_kind(node, "{") else {
                continue;
            };
            let Some(close) = parser::children_of(node)
                .into_iter()
                .rev()
                .find(|c| c.kind() == "}")
            else {
                continue;
            };

            // Empty blocks remain on one line.
            if sf.text()[open.end_byte()..close.start_byte()].trim().is_empty() {
                continue;
            }

            let open_row = open.end_position().row;
            let rest_of_line = &sf.line(open_row)[open.end_position().column..];
            let after = rest_of_line.trim_start();
            if !after.is_empty() && !after.starts_with("//") && !after.starts_with("/*") {
                push_first_wins(&mut set, Transformation::insert(rule, open.end_byte(), "\n"));
            }

            let close_row = close.start_position().row;
            let before = &sf.line(close_row)[..close.start_position().column];
            if !before.trim().is_empty() {
                push_first_wins(&mut set, Transformation::insert(rule, close.start_byte(), "\n"));
            }

            if node.kind() != "compound_statement" {
                split_members(sf, node, rule, &mut set);
            }
        }
        set
    }
}

/// Newline before each struct field / enumerator that shares a line with
/// the previous member. Single-member lists stay as they are.
fn split_members(
    sf: &SourceFile,
    list: tree_sitter::Node<'_>,
    rule: &str,
    set: &mut TransformationSet,
) {
    let members: Vec<_> = parser::children_of(list)
        .into_iter()
        .filter(|c| matches!(c.kind(), "field_declaration" | "enumerator"))
        .collect();
    if members.len() <= 1 {
        return;
    }
    for pair in members.windows(2) {
        if pair[1].start_position().row == pair[0].end_position().row {
            push_first_wins(set, Transformation::insert(rule, pair[1].start_byte(), "\n"));
        }
    }
}

/// When several statements separated by `;` share a line, each goes onto
/// its own. Never fires inside struct/enum bodies, and never separates
/// `}` from a following `else`/`while`.
pub struct StatementSplitRule;

impl FormatRule for StatementSplitRule {
    fn name(&self) -> &'static str {
        "statement-split"
    }

    fn analyze(&self, sf: &SourceFile, _config: &Config) -> TransformationSet {
        let mut set = TransformationSet::new();
        let rule = self.name();

        for (node, _) in parser::walk(sf.root()) {
            let splittable = matches!(
                node.kind(),
                "compound_statement" | "translation_unit" | "case_statement"
            );
            if !splittable {
                continue;
            }

            let mut prev: Option<tree_sitter::Node<'_>> = None;
            for child in parser::children_of(node) {
                if matches!(child.kind(), "{" | "}" | ":" | "case" | "default" | "else") {
                    prev = Some(child);
                    continue;
                }
                if let Some(p) = prev {
                    let same_line = child.start_position().row == p.end_position().row;
                    let child_is_stmt =
                        child.kind().ends_with("statement") || child.kind() == "declaration";
                    let prev_ends_stmt = matches!(p.kind(), ";" | "}")
                        || p.kind().ends_with("statement")
                        || p.kind() == "declaration";
                    let label_boundary = matches!(p.kind(), "case" | "default" | ":");
                    let brace_keyword = p.kind() == "}"
                        && matches!(child.kind(), "else_clause" | "while_statement");

                    if same_line && child_is_stmt && prev_ends_stmt && !label_boundary
                        && !brace_keyword
                    {
                        push_first_wins(
                            &mut set,
                            Transformation::insert(rule, child.start_byte(), "\n"),
                        );
                    }
                }
                prev = Some(child);
            }
        }
        set
    }
}

/// Each `case L:` / `default:` label begins a new line and the statements
/// after the colon move off the label line.
pub struct SwitchNormalizationRule;

impl FormatRule for SwitchNormalizationRule {
    fn name(&self) -> &'static str {
        "switch-normalization"
    }

    fn analyze(&self, sf: &SourceFile, _config: &Config) -> TransformationSet {
        let mut set = TransformationSet::new();
        let rule = self.name();

        for (node, _) in parser::walk(sf.root()) {
            if node.kind() != "case_statement" {
                continue;
            }
            let children = parser::children_of(node);
            let Some(colon_idx) = children.iter().position(|c| c.kind() == ":") else {
                continue;
            };
            if let Some(next) = children.get(colon_idx + 1) {
                if next.start_position().row == children[colon_idx].end_position().row {
                    push_first_wins(&mut set, Transformation::insert(rule, next.start_byte(), "\n"));
                }
            }

            // A case label sharing a line with the previous statement also
            // starts fresh.
            if let Some(prev) = node.prev_sibling() {
                if prev.kind() != "{" && node.start_position().row == prev.end_position().row {
                    push_first_wins(&mut set, Transformation::insert(rule, node.start_byte(), "\n"));
                }
            }
        }
        set
    }
}

/// String literals use double quotes. A single-quoted literal that is
/// clearly a string (spaces, or more than one character of content) is
/// rewritten; genuine character literals stay single-quoted.
pub struct QuoteNormalizationRule;

impl FormatRule for QuoteNormalizationRule {
    fn name(&self) -> &'static str {
        "quote-normalization"
    }

    fn analyze(&self, sf: &SourceFile, config: &Config) -> TransformationSet {
        let mut set = TransformationSet::new();
        if config.quote_style != "double" {
            return set;
        }
        for (span, content) in single_quoted_strings(sf) {
            let converted = content.replace("\\'", "'").replace('"', "\\\"");
            push_first_wins(
                &mut set,
                Transformation::replace(self.name(), span.0, span.1, format!("\"{converted}\"")),
            );
        }
        set
    }
}

/// Violations for the report: every single-quoted string literal is an
/// error under the double-quote style, whether or not it gets rewritten.
pub fn quote_violations(sf: &SourceFile, config: &Config) -> Vec<String> {
    if config.quote_style != "double" {
        return Vec::new();
    }
    single_quoted_strings(sf)
        .into_iter()
        .map(|(span, content)| {
            let row = sf.position(span.0).row + 1;
            format!("line {row}: single-quoted string literal '{content}'")
        })
        .collect()
}

/// Find single-quoted literals that hold string content, masked against
/// comments and double-quoted strings. Returns `(byte span, content)`.
fn single_quoted_strings(sf: &SourceFile) -> Vec<((usize, usize), String)> {
    let mask = Regex::new(r#"//[^\n]*|/\*[\s\S]*?\*/|"(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#)
        .expect("static regex");

    let mut out = Vec::new();
    for m in mask.find_iter(sf.text()) {
        let lit = m.as_str();
        if !lit.starts_with('\'') || !lit.ends_with('\'') || lit.len() < 2 {
            continue;
        }
        let content = &lit[1..lit.len() - 1];
        // 'a' and escapes like '\n' or '\xFF' are character literals.
        let is_string = content.contains(' ')
            || (lit.len() > 4 && !content.starts_with('\\'));
        if is_string {
            out.push(((m.start(), m.end()), content.to_string()));
        }
    }
    out
}
