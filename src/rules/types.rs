//! Type rules: enum/struct placement and keyword usage.

use crate::edit::Transformation;
use crate::error::Error;
use crate::facts::{DeclScope, SymbolKind};
use crate::issue::{Issue, Severity};
use crate::parser;
use crate::patterns;
use crate::source::{SourceFile, Span};

use super::{
    after_includes_offset, collect_remove_insert, issue_at, variables_insert_point, Rule,
    RuleContext,
};

/// E003: enum/struct definitions belong inside the `variables { }` block.
pub struct GlobalTypeDefinition;

impl Rule for GlobalTypeDefinition {
    fn id(&self) -> &'static str {
        "E003"
    }

    fn name(&self) -> &'static str {
        "global-type-definition"
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
                matches!(s.kind, SymbolKind::Enum | SymbolKind::Struct)
                    && s.declared_in_scope == DeclScope::TopLevel
            })
            .map(|s| {
                let kind_word = if s.kind == SymbolKind::Enum { "Enum" } else { "Struct" };
                issue_at(
                    self,
                    ctx.file,
                    s.span,
                    format!(
                        "{kind_word} '{}' must be defined inside the 'variables {{}}' block",
                        s.name
                    ),
                    Some("move into variables block".to_string()),
                )
            })
            .collect();
        Ok(issues)
    }

    /// Collect-Remove-Insert: move every definition (including its
    /// terminating semicolon) to the end of the variables block, creating
    /// the block after the includes when the file has none.
    fn fix(&self, ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        let sf = ctx.file;
        let spans: Vec<Span> = issues
            .iter()
            .map(|i| definition_span_with_terminator(sf, i.span))
            .collect();

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

/// Grow a type-specifier span to cover the enclosing declaration, or at
/// least the `;` that follows, so the move takes the whole statement.
fn definition_span_with_terminator(sf: &SourceFile, span: Span) -> Span {
    for (node, _) in parser::walk(sf.root()) {
        if node.start_byte() != span.start || node.end_byte() != span.end {
            continue;
        }
        if let Some(parent) = node.parent() {
            if parent.kind() == "declaration" {
                return Span::of(parent);
            }
        }
        let mut end = span.end;
        let bytes = sf.text().as_bytes();
        while bytes.get(end).is_some_and(|b| *b == b' ' || *b == b'\t') {
            end += 1;
        }
        if bytes.get(end).is_some_and(|b| *b == b';') {
            end += 1;
        }
        return Span::new(span.start, end);
    }
    span
}

/// E004: a declaration uses a known enum type without the `enum` keyword.
pub struct MissingEnumKeyword;

impl Rule for MissingEnumKeyword {
    fn id(&self) -> &'static str {
        "E004"
    }

    fn name(&self) -> &'static str {
        "missing-enum-keyword"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn auto_fixable(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        check_missing_keyword(self, ctx, SymbolKind::Enum, "enum")
    }

    fn fix(&self, _ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        Ok(issues
            .iter()
            .map(|i| Transformation::insert(self.id(), i.span.start, "enum "))
            .collect())
    }
}

/// E005: same as E004, for `struct`.
pub struct MissingStructKeyword;

impl Rule for MissingStructKeyword {
    fn id(&self) -> &'static str {
        "E005"
    }

    fn name(&self) -> &'static str {
        "missing-struct-keyword"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn auto_fixable(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        check_missing_keyword(self, ctx, SymbolKind::Struct, "struct")
    }

    fn fix(&self, _ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        Ok(issues
            .iter()
            .map(|i| Transformation::insert(self.id(), i.span.start, "struct "))
            .collect())
    }
}

/// CAPL type words that look like bare type identifiers to the C grammar
/// but are never user types.
const CAPL_TYPE_WORDS: [&str; 6] = ["timer", "msTimer", "message", "frame", "byte", "word"];

fn check_missing_keyword(
    rule: &dyn Rule,
    ctx: &RuleContext<'_>,
    wanted: SymbolKind,
    keyword: &str,
) -> Result<Vec<Issue>, Error> {
    let sf = ctx.file;
    let visible = ctx.store.visible_symbols(sf.path())?;

    let mut issues = Vec::new();
    for (node, _) in parser::walk(sf.root()) {
        if node.kind() != "declaration" {
            continue;
        }
        let Some(type_node) = patterns::bare_type_identifier(node) else {
            continue;
        };
        let type_name = sf.node_text(type_node);
        if CAPL_TYPE_WORDS.contains(&type_name) {
            continue;
        }
        let is_known = visible
            .iter()
            .chain(ctx.facts.symbols.iter())
            .any(|s| s.kind == wanted && s.name == type_name);
        if !is_known {
            continue;
        }
        let var_name = patterns::variable_name(sf, node).unwrap_or_else(|| "?".to_string());
        issues.push(issue_at(
            rule,
            sf,
            Span::of(type_node),
            format!(
                "type '{type_name}' used without '{keyword}' keyword in declaration of '{var_name}'"
            ),
            Some(format!("write '{keyword} {type_name}'")),
        ));
    }
    Ok(issues)
}
