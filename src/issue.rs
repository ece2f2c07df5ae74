//! Lint issues and severities.

use std::path::PathBuf;

use serde::Serialize;

use crate::source::Span;

/// Severity is an attribute of the rule, never of user preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Style,
}

/// Synthetic rule id used when a rule's own check panics or errors; the
/// failure becomes an issue at the file's first byte instead of aborting
/// the other rules.
pub const RULE_INTERNAL_ERROR: &str = "rule-internal-error";

/// One detected violation.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub rule_id: String,
    pub severity: Severity,
    pub file: PathBuf,
    pub span: Span,
    /// 0-based row/column of the primary span; rendering adds 1 to both.
    pub row: usize,
    pub column: usize,
    pub message: String,
    pub auto_fixable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

impl Issue {
    /// The internal issue a failed rule collapses into.
    pub fn internal(file: &std::path::Path, rule_id: &str, reason: &str) -> Self {
        Self {
            rule_id: RULE_INTERNAL_ERROR.to_string(),
            severity: Severity::Warning,
            file: file.to_path_buf(),
            span: Span::new(0, 0),
            row: 0,
            column: 0,
            message: format!("rule {rule_id} failed: {reason}"),
            auto_fixable: false,
            fix_hint: None,
        }
    }
}
