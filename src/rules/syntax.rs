//! Syntax rules: constructs CAPL forbids outright.

use crate::edit::Transformation;
use crate::error::Error;
use crate::issue::{Issue, Severity};
use crate::parser;
use crate::patterns;
use crate::source::Span;

use super::{issue_at, Rule, RuleContext};

/// E001: the `extern` keyword does not exist in CAPL.
pub struct ExternKeyword;

impl Rule for ExternKeyword {
    fn id(&self) -> &'static str {
        "E001"
    }

    fn name(&self) -> &'static str {
        "extern-keyword"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn auto_fixable(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let sf = ctx.file;
        let mut issues = Vec::new();
        for (node, _) in parser::walk(sf.root()) {
            if node.kind() != "declaration" {
                continue;
            }
            if let Some(token) = patterns::extern_token(sf, node) {
                issues.push(issue_at(
                    self,
                    sf,
                    Span::of(token),
                    "'extern' keyword is not supported in CAPL".to_string(),
                    Some("remove the keyword".to_string()),
                ));
            }
        }
        Ok(issues)
    }

    /// Delete the token and the whitespace that follows it, so the
    /// declaration closes up cleanly. A declaration this leaves at top
    /// level is E006's business on the next pass.
    fn fix(&self, ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        let text = ctx.file.text();
        let mut out = Vec::new();
        for issue in issues {
            let mut end = issue.span.end;
            while text.as_bytes().get(end).is_some_and(|b| *b == b' ' || *b == b'\t') {
                end += 1;
            }
            out.push(Transformation::delete(self.id(), issue.span.start, end));
        }
        Ok(out)
    }
}

/// E002: function forward declarations are not allowed.
pub struct FunctionDeclaration;

impl Rule for FunctionDeclaration {
    fn id(&self) -> &'static str {
        "E002"
    }

    fn name(&self) -> &'static str {
        "function-declaration"
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
            .filter(|s| s.is_forward_declaration)
            .map(|s| {
                issue_at(
                    self,
                    ctx.file,
                    s.span,
                    format!("function forward declaration '{}' is not allowed in CAPL", s.name),
                    Some("delete the declaration".to_string()),
                )
            })
            .collect();
        Ok(issues)
    }

    /// Delete the declaration's full lines including the terminator.
    fn fix(&self, ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        let sf = ctx.file;
        let mut out = Vec::new();
        for issue in issues {
            let start_row = sf.position(issue.span.start).row;
            let end_row = sf.position(issue.span.end.saturating_sub(1)).row;
            out.push(Transformation::delete(
                self.id(),
                sf.line_start(start_row),
                sf.line_start(end_row + 1),
            ));
        }
        Ok(out)
    }
}

/// E008: the arrow operator. CAPL has no pointers, so member access is
/// always `.`.
pub struct ArrowOperator;

impl Rule for ArrowOperator {
    fn id(&self) -> &'static str {
        "E008"
    }

    fn name(&self) -> &'static str {
        "arrow-operator"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn auto_fixable(&self) -> bool {
        true
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let sf = ctx.file;
        let mut issues = Vec::new();
        for (node, _) in parser::walk(sf.root()) {
            if node.kind() == "->" {
                issues.push(issue_at(
                    self,
                    sf,
                    Span::of(node),
                    "arrow operator '->' is not valid CAPL member access".to_string(),
                    Some("use '.'".to_string()),
                ));
            }
        }
        Ok(issues)
    }

    fn fix(&self, _ctx: &RuleContext<'_>, issues: &[Issue]) -> Result<Vec<Transformation>, Error> {
        Ok(issues
            .iter()
            .map(|i| Transformation::replace(self.id(), i.span.start, i.span.end, "."))
            .collect())
    }
}

/// E009: pointer parameters. The single sanctioned exception is
/// `ethernetPacket`, which CAPL passes by pointer-shaped syntax.
pub struct PointerParameter;

impl Rule for PointerParameter {
    fn id(&self) -> &'static str {
        "E009"
    }

    fn name(&self) -> &'static str {
        "pointer-parameter"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let sf = ctx.file;
        let mut issues = Vec::new();
        for (node, _) in parser::walk(sf.root()) {
            if node.kind() != "parameter_declaration" {
                continue;
            }
            let has_pointer = parser::children_of(node).into_iter().any(|c| {
                c.kind() == "pointer_declarator" || c.kind() == "abstract_pointer_declarator"
            });
            if !has_pointer {
                continue;
            }
            let type_text = patterns::declared_type_text(sf, node).unwrap_or_default();
            if type_text.eq_ignore_ascii_case("ethernetpacket") {
                continue;
            }
            issues.push(issue_at(
                self,
                sf,
                Span::of(node),
                format!("pointer parameter of type '{type_text}' is not supported in CAPL"),
                None,
            ));
        }
        Ok(issues)
    }
}
