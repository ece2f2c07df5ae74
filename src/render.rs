//! Human-readable rendering of issues for the CLI. One line per issue,
//! `path:line:col [ID] message`, followed by a severity summary.

use std::fmt::Write as _;

use crate::issue::{Issue, Severity};

/// Render issues as plain lines. Rows and columns go out 1-based.
pub fn render_issues(issues: &[Issue]) -> String {
    let mut out = String::new();
    for issue in issues {
        let _ = writeln!(
            out,
            "{}:{}:{} [{}] {}",
            issue.file.display(),
            issue.row + 1,
            issue.column + 1,
            issue.rule_id,
            issue.message
        );
        if let Some(hint) = &issue.fix_hint {
            let _ = writeln!(out, "    hint: {hint}");
        }
    }
    out
}

/// One-line totals: `2 errors, 1 warning`.
pub fn render_summary(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "no issues found".to_string();
    }
    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let warnings = issues
        .iter()
        .filter(|i| i.severity == Severity::Warning)
        .count();
    let style = issues.iter().filter(|i| i.severity == Severity::Style).count();

    let mut parts = Vec::new();
    if errors > 0 {
        parts.push(format!("{errors} error{}", plural(errors)));
    }
    if warnings > 0 {
        parts.push(format!("{warnings} warning{}", plural(warnings)));
    }
    if style > 0 {
        parts.push(format!("{style} style issue{}", plural(style)));
    }
    parts.join(", ")
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Span;
    use std::path::PathBuf;

    fn issue(severity: Severity) -> Issue {
        Issue {
            rule_id: "E001".to_string(),
            severity,
            file: PathBuf::from("node.can"),
            span: Span::new(4, 10),
            row: 2,
            column: 4,
            message: "something".to_string(),
            auto_fixable: true,
            fix_hint: None,
        }
    }

    #[test]
    fn renders_one_based_rows() {
        let out = render_issues(&[issue(Severity::Error)]);
        assert!(out.contains("node.can:3:"), "got: {out}");
        assert!(out.contains("[E001]"), "got: {out}");
    }

    #[test]
    fn summarizes_counts() {
        let issues = vec![
            issue(Severity::Error),
            issue(Severity::Error),
            issue(Severity::Warning),
        ];
        assert_eq!(render_summary(&issues), "2 errors, 1 warning");
    }

    #[test]
    fn empty_summary() {
        assert_eq!(render_summary(&[]), "no issues found");
    }
}
