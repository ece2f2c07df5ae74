//! Comment handling: the attachment map, trailing-comment alignment, and
//! prose reflow.

use tree_sitter::Node;

use crate::config::Config;
use crate::edit::{Transformation, TransformationSet};
use crate::parser;
use crate::source::{SourceFile, Span};

use super::push_first_wins;

/// How a comment relates to the code around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// First non-blank structure in the file.
    FileHeader,
    /// On the line(s) above its target, at most one blank between.
    Header,
    /// On the same line as its target, after the code.
    Trailing,
    /// Between siblings inside a block, not adjacent to either.
    BlockInternal,
    /// Inside a block with no adjacent code at all.
    Floating,
}

/// One comment bound to its classification and, for header/trailing
/// comments, the span of the code it annotates.
#[derive(Debug, Clone)]
pub struct CommentBinding {
    pub span: Span,
    pub row: usize,
    pub attachment: Attachment,
    pub target: Option<Span>,
}

/// Classify every comment in the file.
pub fn attachment_map(sf: &SourceFile) -> Vec<CommentBinding> {
    let mut bindings = Vec::new();
    for (node, _) in parser::walk(sf.root()) {
        if node.kind() != "comment" {
            continue;
        }
        bindings.push(classify(sf, node));
    }
    bindings.sort_by_key(|b| b.span.start);
    bindings
}

fn classify(sf: &SourceFile, comment: Node<'_>) -> CommentBinding {
    let span = Span::of(comment);
    let row = comment.start_position().row;

    // Trailing: code of the previous sibling ends on the comment's line.
    if let Some(prev) = comment.prev_sibling() {
        if prev.kind() != "comment" && prev.end_position().row == row {
            return CommentBinding {
                span,
                row,
                attachment: Attachment::Trailing,
                target: Some(Span::of(prev)),
            };
        }
    }

    // File header: nothing but blank space above, at the top level.
    let is_top_level = comment
        .parent()
        .map(|p| p.kind() == "translation_unit")
        .unwrap_or(false);
    if is_top_level && sf.text()[..span.start].trim().is_empty() {
        return CommentBinding {
            span,
            row,
            attachment: Attachment::FileHeader,
            target: None,
        };
    }

    // Header: next non-comment sibling begins within one blank line below.
    if let Some(next) = next_code_sibling(comment) {
        let gap = next
            .start_position()
            .row
            .saturating_sub(comment.end_position().row);
        if gap >= 1 && gap <= 2 {
            return CommentBinding {
                span,
                row,
                attachment: Attachment::Header,
                target: Some(Span::of(next)),
            };
        }
    }

    let inside_block = parser::parent_of_kind(comment, "compound_statement").is_some();
    let has_code_sibling =
        next_code_sibling(comment).is_some() || prev_code_sibling(comment).is_some();
    let attachment = if inside_block && !has_code_sibling {
        Attachment::Floating
    } else {
        Attachment::BlockInternal
    };
    CommentBinding {
        span,
        row,
        attachment,
        target: None,
    }
}

fn next_code_sibling<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let mut current = node.next_sibling();
    while let Some(n) = current {
        if n.kind() != "comment" && n.kind() != "}" {
            return Some(n);
        }
        if n.kind() == "}" {
            return None;
        }
        current = n.next_sibling();
    }
    None
}

fn prev_code_sibling<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let mut current = node.prev_sibling();
    while let Some(n) = current {
        if n.kind() != "comment" && n.kind() != "{" {
            return Some(n);
        }
        if n.kind() == "{" {
            return None;
        }
        current = n.prev_sibling();
    }
    None
}

/// Align runs of two or more consecutive trailing comments to a shared
/// column: the rightmost comment start in the run, clamped to the line
/// length, never closer than one space after the code.
pub fn align_trailing(sf: &SourceFile, config: &Config) -> TransformationSet {
    let mut set = TransformationSet::new();
    let rule = "comment-alignment";

    let trailing: Vec<CommentBinding> = attachment_map(sf)
        .into_iter()
        .filter(|b| b.attachment == Attachment::Trailing)
        .collect();

    let mut run: Vec<&CommentBinding> = Vec::new();
    let mut runs: Vec<Vec<&CommentBinding>> = Vec::new();
    for binding in &trailing {
        match run.last() {
            Some(last) if binding.row == last.row + 1 => run.push(binding),
            _ => {
                if run.len() >= 2 {
                    runs.push(std::mem::take(&mut run));
                } else {
                    run.clear();
                }
                run.push(binding);
            }
        }
    }
    if run.len() >= 2 {
        runs.push(run);
    }

    for group in runs {
        let mut target_col = 0usize;
        for binding in &group {
            let code_end = code_end_column(sf, binding);
            let comment_col = sf.position(binding.span.start).column;
            target_col = target_col.max(comment_col).max(code_end + 1);
        }
        target_col = target_col.min(config.line_length.saturating_sub(1));

        for binding in &group {
            let code_end = code_end_column(sf, binding);
            let line_start = sf.line_start(binding.row);
            let want_col = target_col.max(code_end + 1);
            let pad = " ".repeat(want_col - code_end);
            let region = Span::new(line_start + code_end, binding.span.start);
            if &sf.text()[region.start..region.end] != pad.as_str() {
                push_first_wins(
                    &mut set,
                    Transformation::replace(rule, region.start, region.end, pad),
                );
            }
        }
    }
    set
}

/// Column where the code before a trailing comment ends.
fn code_end_column(sf: &SourceFile, binding: &CommentBinding) -> usize {
    let line = sf.line(binding.row);
    let col = sf.position(binding.span.start).column;
    line[..col].trim_end().len()
}

/// Wrap over-long line and single-line block comments at word boundaries.
/// Continuation lines match the start column of the comment so the prose
/// stays one visual block. Doxygen blocks, banners, diagrams, and
/// `#pragma` lines are left alone.
pub fn reflow(sf: &SourceFile, config: &Config) -> TransformationSet {
    let mut set = TransformationSet::new();
    let rule = "comment-reflow";

    for (node, _) in parser::walk(sf.root()) {
        if node.kind() != "comment" {
            continue;
        }
        let text = sf.node_text(node);
        let col = node.start_position().column;

        if should_exclude(text) {
            continue;
        }

        if text.starts_with("//") {
            if col + text.len() <= config.line_length {
                continue;
            }
            let content = text[2..].trim();
            let width = wrap_width(config.line_length, col + 3);
            let wrapped = wrap_words(content, width);
            if wrapped.len() < 2 {
                continue;
            }
            let sep = format!("\n{}// ", " ".repeat(col));
            let replacement = format!("// {}", wrapped.join(&sep));
            if replacement != text {
                push_first_wins(
                    &mut set,
                    Transformation::replace(rule, node.start_byte(), node.end_byte(), replacement),
                );
            }
        } else if text.starts_with("/*") && !text.contains('\n') {
            if col + text.len() <= config.line_length {
                continue;
            }
            let content = text
                .trim_start_matches("/*")
                .trim_end_matches("*/")
                .trim();
            if content.is_empty() {
                continue;
            }
            let indent = " ".repeat(col);
            let width = wrap_width(config.line_length, col + 3);
            let wrapped = wrap_words(content, width);
            let mut replacement = String::from("/*\n");
            for line in &wrapped {
                replacement.push_str(&format!("{indent} * {line}\n"));
            }
            replacement.push_str(&format!("{indent} */"));
            push_first_wins(
                &mut set,
                Transformation::replace(rule, node.start_byte(), node.end_byte(), replacement),
            );
        }
    }
    set
}

fn wrap_width(line_length: usize, prefix: usize) -> usize {
    line_length.saturating_sub(prefix).max(20)
}

/// Greedy word wrap; words longer than the width get their own line.
fn wrap_words(content: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in content.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Doxygen tag blocks, doc markers, banners, and ASCII diagrams keep
/// their shape.
fn should_exclude(comment: &str) -> bool {
    if comment.starts_with("//!") || comment.starts_with("///") || comment.starts_with("/**") {
        return true;
    }

    const DOC_TAGS: [&str; 12] = [
        "@param", "@return", "@brief", "@details", "@see", "@note", r"\param", r"\return",
        r"\brief", r"\details", r"\see", r"\note",
    ];
    if DOC_TAGS.iter().any(|tag| comment.contains(tag)) {
        return true;
    }

    for line in comment.lines() {
        let stripped = line.trim();
        // Banner lines: long runs of box-drawing punctuation.
        if stripped.len() > 5
            && stripped
                .chars()
                .all(|c| matches!(c, '*' | '/' | '-' | '=' | ' '))
        {
            return true;
        }
        // Diagrams and arrows.
        let symbols = stripped
            .chars()
            .filter(|c| matches!(c, '+' | '|' | '<' | '>'))
            .count();
        if symbols > 2 || stripped.contains("-->") || stripped.contains("<--") {
            return true;
        }
    }
    false
}
