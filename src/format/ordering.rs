//! Optional top-level reordering: includes, then the variables block, then
//! testcases in source order, then handlers, then functions. Attached
//! header comments travel with their targets.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::edit::{Transformation, TransformationSet};
use crate::parser;
use crate::patterns;
use crate::source::{SourceFile, Span};

use super::comments::{attachment_map, Attachment};
use super::push_first_wins;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SegmentClass {
    /// File header comments and pragmas, kept first in source order.
    Prologue(usize),
    /// `.cin` group before `.can` group, alphabetical, deduplicated.
    Include(u8, String),
    /// Anything unclassified, kept in source order after the includes.
    Other(usize),
    Variables,
    /// Testcases keep source order.
    Testcase(usize),
    /// Handlers sort by `(kind, subject)`.
    Handler(String, String),
    /// User functions sort by name.
    Function(String),
}

#[derive(Debug)]
struct Segment {
    class: SegmentClass,
    span: Span,
    /// For includes: the quoted path, used for deduplication.
    include_path: Option<String>,
}

/// Produce the single whole-buffer transformation that re-orders the top
/// level, or nothing when the file is already in order.
pub fn reorder_top_level(sf: &SourceFile, config: &Config) -> TransformationSet {
    let mut set = TransformationSet::new();
    if !config.reorder_top_level {
        return set;
    }

    let Some(mut segments) = collect_segments(sf) else {
        return set;
    };
    segments.sort_by(|a, b| a.class.cmp(&b.class));

    let rebuilt = render(sf, &segments);
    if rebuilt != sf.text() {
        push_first_wins(
            &mut set,
            Transformation::replace("top-level-ordering", 0, sf.text().len(), rebuilt),
        );
    }
    set
}

/// Split the buffer into classified top-level segments, each covering
/// whole lines. Returns `None` when classification would lose bytes.
fn collect_segments(sf: &SourceFile) -> Option<Vec<Segment>> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut claimed: Vec<Span> = Vec::new();
    let mut order = 0usize;

    // Includes, via facts-level recognition.
    for (node, _) in parser::walk(sf.root()) {
        if node.kind() != "preproc_include" {
            continue;
        }
        let span = full_lines(sf, Span::of(node));
        let path = node
            .child_by_field_name("path")
            .map(|p| sf.node_text(p).trim_matches(&['"', '<', '>'][..]).to_string())?;
        let group = if path.to_lowercase().ends_with(".cin") { 0 } else { 1 };
        segments.push(Segment {
            class: SegmentClass::Include(group, path.to_lowercase()),
            span,
            include_path: Some(path),
        });
        claimed.push(span);
    }

    if let Some(block) = patterns::variables_block(sf) {
        let span = full_lines(sf, block.span());
        segments.push(Segment {
            class: SegmentClass::Variables,
            span,
            include_path: None,
        });
        claimed.push(span);
    }

    for handler in patterns::handlers(sf) {
        let span = full_lines(sf, handler.span);
        let class = if handler.kind == "testcase" {
            order += 1;
            SegmentClass::Testcase(order)
        } else {
            SegmentClass::Handler(handler.kind.clone(), handler.subject.clone())
        };
        segments.push(Segment {
            class,
            span,
            include_path: None,
        });
        claimed.push(span);
    }

    for (node, _) in parser::walk(sf.root()) {
        if node.kind() != "function_definition" || node.parent() != Some(sf.root()) {
            continue;
        }
        let span = full_lines(sf, Span::of(node));
        if claimed.iter().any(|c| overlaps(*c, span)) {
            continue;
        }
        let Some(name) = patterns::function_name(sf, node) else {
            continue;
        };
        segments.push(Segment {
            class: SegmentClass::Function(name),
            span,
            include_path: None,
        });
        claimed.push(span);
    }

    // Header comments travel with their targets: grow segment spans over
    // attached comments before computing the leftovers.
    attach_header_comments(sf, &mut segments);
    claimed = segments.iter().map(|s| s.span).collect();

    // Everything left over, line by line, grouped into contiguous runs.
    claimed.sort();
    let mut other_start: Option<usize> = None;
    let mut row = 0;
    let mut pending: Vec<(usize, usize)> = Vec::new();
    while row < sf.line_count() {
        let start = sf.line_start(row);
        let end = sf.line_start(row + 1);
        let line_span = Span::new(start, end);
        let is_claimed = claimed.iter().any(|c| overlaps(*c, line_span));
        let is_blank = sf.text()[start..end].trim().is_empty();
        if is_claimed || is_blank {
            if let Some(s) = other_start.take() {
                pending.push((s, start));
            }
        } else if other_start.is_none() {
            other_start = Some(start);
        }
        row += 1;
    }
    if let Some(s) = other_start {
        pending.push((s, sf.text().len()));
    }

    for (i, (start, end)) in pending.into_iter().enumerate() {
        let chunk = sf.text()[start..end].trim_start();
        let class = if chunk.starts_with("#pragma") || chunk.starts_with("/*") || chunk.starts_with("//") {
            SegmentClass::Prologue(i)
        } else {
            SegmentClass::Other(i)
        };
        segments.push(Segment {
            class,
            span: Span::new(start, end),
            include_path: None,
        });
    }

    Some(segments)
}

/// Header comments move with the segment they annotate: grow each
/// segment's span upward over its attached comments.
fn attach_header_comments(sf: &SourceFile, segments: &mut [Segment]) {
    let headers: Vec<(Span, Span)> = attachment_map(sf)
        .into_iter()
        .filter(|b| b.attachment == Attachment::Header)
        .filter_map(|b| b.target.map(|t| (b.span, t)))
        .collect();

    for segment in segments.iter_mut() {
        for (comment, target) in &headers {
            if target.start >= segment.span.start
                && target.start < segment.span.end
                && comment.start < segment.span.start
            {
                let grown = full_lines(sf, Span::new(comment.start, segment.span.end));
                segment.span = grown;
            }
        }
    }
}

/// Assemble the ordered segments into a new buffer: includes grouped with
/// a blank between `.cin` and `.can`, one blank line between everything
/// else, deduplicated includes, single trailing newline.
fn render(sf: &SourceFile, segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut seen_includes: BTreeSet<String> = BTreeSet::new();
    let mut last_include_group: Option<u8> = None;
    let mut wrote_any = false;

    for segment in segments {
        let text = sf.text()[segment.span.start..segment.span.end].trim_end();
        if text.is_empty() {
            continue;
        }

        if let SegmentClass::Include(group, _) = &segment.class {
            if let Some(path) = &segment.include_path {
                if !seen_includes.insert(path.clone()) {
                    continue;
                }
            }
            match last_include_group {
                Some(prev) if prev == *group => out.push_str(&format!("{text}\n")),
                Some(_) => out.push_str(&format!("\n{text}\n")),
                None => {
                    if wrote_any {
                        out.push('\n');
                    }
                    out.push_str(&format!("{text}\n"));
                }
            }
            last_include_group = Some(*group);
            wrote_any = true;
            continue;
        }

        last_include_group = None;
        if wrote_any {
            out.push('\n');
        }
        out.push_str(text);
        out.push('\n');
        wrote_any = true;
    }
    out
}

fn full_lines(sf: &SourceFile, span: Span) -> Span {
    let start_row = sf.position(span.start).row;
    let end_row = sf.position(span.end.saturating_sub(1).max(span.start)).row;
    Span::new(sf.line_start(start_row), sf.line_start(end_row + 1))
}

fn overlaps(a: Span, b: Span) -> bool {
    a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn reorder(text: &str) -> String {
        let sf = SourceFile::parse(Path::new("t.can"), text.to_string()).unwrap();
        let mut config = Config::default();
        config.reorder_top_level = true;
        reorder_top_level(&sf, &config).apply(sf.text())
    }

    #[test]
    fn includes_sort_cin_before_can_and_dedup() {
        let out = reorder(
            "#include \"zeta.can\"\n#include \"alpha.cin\"\n#include \"zeta.can\"\nvariables {\n  int gA;\n}\n",
        );
        let alpha = out.find("alpha.cin").unwrap();
        let zeta = out.find("zeta.can").unwrap();
        assert!(alpha < zeta, "got: {out}");
        assert_eq!(out.matches("zeta.can").count(), 1, "got: {out}");
    }

    #[test]
    fn variables_block_precedes_handlers_and_functions() {
        let out = reorder(
            "void zzz() {\n  write(\"z\");\n}\non start {\n  write(\"s\");\n}\nvariables {\n  int gA;\n}\n",
        );
        let vars = out.find("variables {").unwrap();
        let handler = out.find("on start").unwrap();
        let func = out.find("void zzz()").unwrap();
        assert!(vars < handler && handler < func, "got: {out}");
    }

    #[test]
    fn functions_sort_alphabetically() {
        let out = reorder(
            "void zebra() {\n  write(\"z\");\n}\nvoid alpha() {\n  write(\"a\");\n}\n",
        );
        let a = out.find("void alpha()").unwrap();
        let z = out.find("void zebra()").unwrap();
        assert!(a < z, "got: {out}");
    }

    #[test]
    fn header_comment_travels_with_its_function() {
        let out = reorder(
            "void zebra() {\n  write(\"z\");\n}\n// alpha does a thing\nvoid alpha() {\n  write(\"a\");\n}\n",
        );
        let comment = out.find("// alpha does a thing").unwrap();
        let alpha = out.find("void alpha()").unwrap();
        let zebra = out.find("void zebra()").unwrap();
        assert!(comment < alpha && alpha < zebra, "got: {out}");
    }

    #[test]
    fn disabled_by_default() {
        let sf = SourceFile::parse(
            Path::new("t.can"),
            "void z() {\n}\nvoid a() {\n}\n".to_string(),
        )
        .unwrap();
        assert!(reorder_top_level(&sf, &Config::default()).is_empty());
    }
}
