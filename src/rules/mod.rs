//! Rule contract and registry.
//!
//! Every rule is a value implementing `Rule`; the registry is a plain
//! ordered list and adding a rule is one `Box::new` line. Order matters
//! and is fixed: E-series before W-series, and within E the placement
//! rules (E003/E006/E007) after the keyword rules, so a keyword fix in
//! pass N creates the condition a placement rule observes in pass N+1
//! instead of the two compounding inside one pass.

mod semantic;
mod syntax;
mod types;
mod variables;

use crate::config::Config;
use crate::edit::Transformation;
use crate::error::Error;
use crate::facts::FileFacts;
use crate::issue::{Issue, Severity};
use crate::source::{SourceFile, Span};
use crate::store::SymbolStore;

/// Everything a rule may look at. The file is immutable for the pass; the
/// store is reader-shared.
pub struct RuleContext<'a> {
    pub file: &'a SourceFile,
    pub facts: &'a FileFacts,
    pub store: &'a SymbolStore,
    pub config: &'a Config,
}

/// The capability set of a lint rule: identify, detect, optionally fix.
pub trait Rule {
    /// Stable id, e.g. `E001`.
    fn id(&self) -> &'static str;

    /// Human slug, e.g. `extern-keyword`.
    fn name(&self) -> &'static str;

    fn severity(&self) -> Severity;

    fn auto_fixable(&self) -> bool {
        false
    }

    /// Detect violations. Pure with respect to the file content; may read
    /// the store.
    ///
    /// # Errors
    ///
    /// A rule error is caught by the engine and converted to a synthetic
    /// issue; it never aborts the other rules.
    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error>;

    /// Produce fixes for the given issues. Must be a pure function of the
    /// issues and the file.
    ///
    /// # Errors
    ///
    /// A fix error discards this rule's transformations for the pass.
    fn fix(&self, ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        let _ = (ctx, issues);
        Ok(Vec::new())
    }
}

/// The builtin rules in their fixed execution order.
pub fn registry() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(syntax::ExternKeyword),
        Box::new(syntax::FunctionDeclaration),
        Box::new(types::MissingEnumKeyword),
        Box::new(types::MissingStructKeyword),
        Box::new(syntax::ArrowOperator),
        Box::new(syntax::PointerParameter),
        Box::new(types::GlobalTypeDefinition),
        Box::new(variables::VariableOutsideBlock),
        Box::new(variables::VariableMidBlock),
        Box::new(semantic::UndefinedSymbol),
        Box::new(semantic::DuplicateFunction),
        Box::new(semantic::CircularInclude),
        Box::new(semantic::DuplicateHandler),
    ]
}

/// All ids the registry knows, for unknown-filter reporting.
pub fn known_rule_ids() -> Vec<&'static str> {
    registry().iter().map(|r| r.id()).collect()
}

/// Issue constructor that fills in the rule's own attributes and derives
/// the row/column from the span.
pub(crate) fn issue_at(
    rule: &dyn Rule,
    file: &SourceFile,
    span: Span,
    message: String,
    fix_hint: Option<String>,
) -> Issue {
    let pos = file.position(span.start);
    Issue {
        rule_id: rule.id().to_string(),
        severity: rule.severity(),
        file: file.path().to_path_buf(),
        span,
        row: pos.row,
        column: pos.column,
        message,
        auto_fixable: rule.auto_fixable(),
        fix_hint,
    }
}

/// Shared Collect-Remove-Insert implementation for the rules that move
/// code (E003, E006, E007): full-line deletions for every item, in AST
/// order, plus one insertion whose replacement is the moved text in
/// original relative order with a trailing newline per item. Line ranges
/// are merged first so two items on one line cannot produce overlapping
/// deletions.
pub(crate) fn collect_remove_insert(
    rule_id: &str,
    file: &SourceFile,
    item_spans: &[Span],
    insert_at: usize,
    indent: usize,
    wrap_in_new_block: bool,
) -> Vec<Transformation> {
    let mut line_ranges: Vec<(usize, usize)> = item_spans
        .iter()
        .map(|span| {
            let start_row = file.position(span.start).row;
            let end_row = file.position(span.end.saturating_sub(1).max(span.start)).row;
            (file.line_start(start_row), file.line_start(end_row + 1))
        })
        .collect();
    line_ranges.sort();
    line_ranges.dedup();

    // Merge ranges that touch or overlap.
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in line_ranges {
        match merged.last_mut() {
            Some((_, prev_end)) if start <= *prev_end => {
                *prev_end = (*prev_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }

    let pad = " ".repeat(indent);
    let mut moved = String::new();
    for (start, end) in &merged {
        for line in file.text()[*start..*end].lines() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                moved.push_str(&pad);
                moved.push_str(trimmed);
                moved.push('\n');
            }
        }
    }

    if wrap_in_new_block {
        moved = format!("variables {{\n{moved}}}\n\n");
    }

    let mut out = Vec::new();
    if insert_at > 0 && !file.text()[..insert_at].ends_with('\n') {
        moved.insert(0, '\n');
    }
    out.push(Transformation::insert(rule_id, insert_at, moved));
    for (start, end) in merged {
        out.push(Transformation::delete(rule_id, start, end));
    }
    out
}

/// Where a created or existing `variables` block receives moved items:
/// just before the closing brace of the existing block, or `None` when the
/// file has no block yet.
pub(crate) fn variables_insert_point(file: &SourceFile) -> Option<usize> {
    let block = crate::patterns::variables_block(file)?;
    let close = crate::parser::children_of(block.body)
        .into_iter()
        .rev()
        .find(|c| c.kind() == "}")?;
    Some(close.start_byte())
}

/// Insertion offset for a brand-new `variables` block: after the last
/// top-level include line, else the start of the file.
pub(crate) fn after_includes_offset(file: &SourceFile, facts: &FileFacts) -> usize {
    facts
        .includes
        .iter()
        .map(|i| file.line_start(i.row + 1))
        .max()
        .unwrap_or(0)
}
