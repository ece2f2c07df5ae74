//! The iterative check-and-fix loop.
//!
//! Each pass re-extracts facts, runs every enabled rule, applies the
//! accepted fix batches, re-parses, and goes again until a fixpoint or the
//! pass cap. Two guards hold the line: a batch whose transformations
//! overlap an earlier-accepted batch is deferred to the next pass, and a
//! pass whose output parses with new `ERROR` nodes is rejected wholesale
//! with the offending rules barred from fixing this file again.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use crate::config::Config;
use crate::edit::TransformationSet;
use crate::error::Error;
use crate::extract;
use crate::issue::Issue;
use crate::report::FixReport;
use crate::rules::{registry, Rule as _, RuleContext};
use crate::source::SourceFile;
use crate::store::SymbolStore;
use crate::CancelFlag;

/// Run every enabled rule's check, converting a rule failure into a
/// synthetic issue instead of aborting the others. Output order is
/// deterministic: by row, then span, then rule id.
pub fn run_checks(ctx: &RuleContext<'_>) -> Vec<Issue> {
    let mut issues = Vec::new();
    for rule in registry() {
        if !ctx.config.rule_enabled(rule.id()) {
            continue;
        }
        match rule.check(ctx) {
            Ok(found) => issues.extend(found),
            Err(e) => issues.push(Issue::internal(ctx.file.path(), rule.id(), &e.to_string())),
        }
    }
    issues.sort_by(|a, b| {
        (a.row, a.span.start, a.rule_id.as_str()).cmp(&(b.row, b.span.start, b.rule_id.as_str()))
    });
    issues
}

/// Fix a file to a fixpoint. `bytes` in, rewritten buffer out; the store
/// receives refreshed facts for every intermediate buffer so rules always
/// see the current state.
///
/// # Errors
///
/// Returns `Error::Cancelled` at a pass boundary if the flag is set, or a
/// parse/store error. Rule failures never surface here; they become
/// issues in the report.
pub fn lint_fix(
    path: &Path,
    bytes: Vec<u8>,
    store: &SymbolStore,
    config: &Config,
    cancel: &CancelFlag,
) -> Result<FixReport, Error> {
    let mut sf = SourceFile::from_bytes(path, bytes)?;
    // Rules whose fixes were rejected for this file; they keep reporting,
    // they just no longer rewrite.
    let mut fix_disabled: BTreeSet<String> = BTreeSet::new();
    let mut applied_rule_ids: Vec<String> = Vec::new();
    let mut passes = 0;
    let mut converged = false;

    while passes < config.max_passes {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        passes += 1;

        let facts = extract::extract(&sf);
        store.upsert(&facts)?;
        let ctx = RuleContext {
            file: &sf,
            facts: &facts,
            store,
            config,
        };

        let (set, pass_rules) = collect_pass_fixes(&ctx, &fix_disabled);
        if set.is_empty() {
            converged = true;
            break;
        }

        let pre_errors = sf.error_count();
        let new_text = set.apply(sf.text());
        if new_text == sf.text() {
            // No byte made progress; a fixpoint in disguise.
            converged = true;
            break;
        }

        let new_sf = SourceFile::parse(path, new_text)?;
        if new_sf.error_count() > pre_errors {
            debug!(
                file = %path.display(),
                rules = ?pass_rules,
                "fix pass introduced parse errors; rejecting and disabling"
            );
            for id in pass_rules {
                fix_disabled.insert(id);
            }
            continue;
        }

        for id in pass_rules {
            if !applied_rule_ids.contains(&id) {
                applied_rule_ids.push(id);
            }
        }
        sf = new_sf;
    }

    // Final verdict on the resulting buffer.
    let facts = extract::extract(&sf);
    store.upsert(&facts)?;
    let ctx = RuleContext {
        file: &sf,
        facts: &facts,
        store,
        config,
    };
    let remaining_issues = run_checks(&ctx);

    debug!(
        file = %path.display(),
        passes,
        converged,
        remaining = remaining_issues.len(),
        "lint fix finished"
    );

    Ok(FixReport {
        new_bytes: sf.text().to_string(),
        remaining_issues,
        applied_rule_ids,
        passes_used: passes,
        converged,
    })
}

/// One pass worth of fixes. Rules are consulted in registry order; a batch
/// that overlaps an already-accepted batch is deferred (the next pass sees
/// the world after the earlier fix and re-derives). A rule whose `fix`
/// itself fails simply contributes nothing this pass.
fn collect_pass_fixes(
    ctx: &RuleContext<'_>,
    fix_disabled: &BTreeSet<String>,
) -> (TransformationSet, Vec<String>) {
    let mut set = TransformationSet::new();
    let mut pass_rules = Vec::new();

    for rule in registry() {
        let id = rule.id();
        if !rule.auto_fixable()
            || !ctx.config.rule_fixable(id)
            || fix_disabled.contains(id)
        {
            continue;
        }
        let issues = match rule.check(ctx) {
            Ok(issues) => issues,
            Err(_) => continue,
        };
        if issues.is_empty() {
            continue;
        }
        let batch = match rule.fix(ctx, &issues) {
            Ok(batch) => batch,
            Err(e) => {
                debug!(rule = id, error = %e, "fix failed; discarding for this pass");
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }
        match set.push_all(batch) {
            Ok(()) => pass_rules.push(id.to_string()),
            Err(_) => {
                debug!(rule = id, "fix batch overlaps an earlier batch; deferring a pass");
            }
        }
    }

    (set, pass_rules)
}
