//! Variable placement rules.

use std::collections::BTreeMap;

use crate::edit::Transformation;
use crate::error::Error;
use crate::facts::{DeclScope, SymbolKind};
use crate::issue::{Issue, Severity};
use crate::parser;
use crate::source::Span;

use super::{
    after_includes_offset, collect_remove_insert, issue_at, variables_insert_point, Rule,
    RuleContext,
};

/// E006: global variables must live inside the `variables { }` block.
pub struct VariableOutsideBlock;

impl Rule for VariableOutsideBlock {
    fn id(&self) -> &'static str {
        "E006"
    }

    fn name(&self) -> &'static str {
        "variable-outside-block"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn auto_fixable(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let issues = ctx
            .facts
            .symbols
            .iter()
            .filter(|s| {
                matches!(
                    s.kind,
                    SymbolKind::Variable | SymbolKind::Timer | SymbolKind::Message
                ) && s.declared_in_scope == DeclScope::TopLevel
            })
            .map(|s| {
                issue_at(
                    self,
                    ctx.file,
                    s.span,
                    format!("variable '{}' declared outside 'variables {{}}' block", s.name),
                    Some("move into variables block".to_string()),
                )
            })
            .collect();
        Ok(issues)
    }

    /// Collect-Remove-Insert into the variables block, preserving the
    /// original relative order of the moved declarations; creates the
    /// block after the includes when missing.
    fn fix(&self, ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        let sf = ctx.file;
        let mut spans: Vec<Span> = issues.iter().map(|i| i.span).collect();
        spans.sort();

        let transformations = match variables_insert_point(sf) {
            Some(at) => collect_remove_insert(self.id(), sf, &spans, at, ctx.config.indent_size, false),
            None => {
                let at = after_includes_offset(sf, ctx.facts);
                collect_remove_insert(self.id(), sf, &spans, at, ctx.config.indent_size, true)
            }
        };
        Ok(transformations)
    }
}

/// E007: local variables are declared at the start of their block, before
/// the first executable statement.
pub struct VariableMidBlock;

impl Rule for VariableMidBlock {
    fn id(&self) -> &'static str {
        "E007"
    }

    fn name(&self) -> &'static str {
        "variable-mid-block"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn auto_fixable(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let issues = ctx
            .facts
            .symbols
            .iter()
            .filter(|s| {
                s.declared_in_scope == DeclScope::LocalBlock && s.statements_before_in_block > 0
            })
            .map(|s| {
                let parent = s.parent_symbol.as_deref().unwrap_or("block");
                issue_at(
                    self,
                    ctx.file,
                    s.span,
                    format!(
                        "variable '{}' declared after executable statements in '{parent}'",
                        s.name
                    ),
                    Some("declare at the start of the block".to_string()),
                )
            })
            .collect();
        Ok(issues)
    }

    /// Move each declaration to the start of its own enclosing block,
    /// grouped so one insertion per block carries all of that block's
    /// moved declarations in source order.
    fn fix(&self, ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        let sf = ctx.file;

        // Group issue spans by the enclosing block's opening brace.
        let mut by_block: BTreeMap<usize, Vec<Span>> = BTreeMap::new();
        for issue in issues {
            let Some(open_end) = enclosing_block_open_end(sf, issue.span) else {
                continue;
            };
            by_block.entry(open_end).or_default().push(issue.span);
        }

        let mut out = Vec::new();
        for (insert_at, mut spans) in by_block {
            spans.sort();
            out.extend(collect_remove_insert(
                self.id(),
                sf,
                &spans,
                insert_at,
                ctx.config.indent_size,
                false,
            ));
        }
        Ok(out)
    }
}

/// Byte offset just after the `{` of the block containing the span.
fn enclosing_block_open_end(sf: &crate::source::SourceFile, span: Span) -> Option<usize> {
    for (node, _) in parser::walk(sf.root()) {
        if node.kind() == "declaration"
            && node.start_byte() == span.start
            && node.end_byte() == span.end
        {
            let block = parser::parent_of_kind(node, "compound_statement")?;
            let open = parser::child_of_kind(block, "{")?;
            return Some(open.end_byte());
        }
    }
    None
}
