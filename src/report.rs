//! Structured outcomes handed back across the core boundary.
//!
//! The core never raises across component boundaries; a batch is never
//! aborted by one file. Each entry point returns one of these values and
//! the caller decides what to render and which exit code to use.

use serde::Serialize;

use crate::issue::{Issue, Severity};

/// Result of `analyze`: issues found plus what the store absorbed.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub issues: Vec<Issue>,
    pub symbols_added: usize,
    pub references_added: usize,
}

impl AnalysisReport {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }
}

/// Result of `lint_fix`: the rewritten buffer and what remains.
#[derive(Debug, Serialize)]
pub struct FixReport {
    pub new_bytes: String,
    pub remaining_issues: Vec<Issue>,
    pub applied_rule_ids: Vec<String>,
    pub passes_used: usize,
    /// Set when the pass cap was reached before a fixpoint.
    pub converged: bool,
}

/// Result of `format`. In check-only mode `new_bytes` is `None` and
/// `changed` says whether differences exist.
#[derive(Debug, Serialize)]
pub struct FormatReport {
    pub new_bytes: Option<String>,
    pub changed: bool,
    pub violations: Vec<String>,
}
