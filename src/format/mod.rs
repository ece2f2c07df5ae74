//! The opinionated formatter: five ordered phases over a shared buffer.
//!
//! 1. pre-normalization (top-level items to column zero)
//! 2. structural convergence (spacing, block expansion, statement split,
//!    brace style, switch normalization, quote normalization)
//! 3. vertical whitespace (setup/logic zones, blank-line collapse)
//! 4. comments (attachment map, alignment, reflow)
//! 5. indentation (minimum AST depth per line)
//!
//! Between rewrites the buffer is re-parsed, and any rewrite that would
//! introduce new `ERROR` nodes is discarded. The whole pipeline repeats
//! until a fixpoint or the pass cap, which is what makes
//! `format(format(f)) == format(f)` hold.

mod comments;
mod indent;
mod ordering;
mod spacing;
mod structure;
mod whitespace;

use std::path::Path;

use tracing::debug;

use crate::config::Config;
use crate::edit::TransformationSet;
use crate::error::Error;
use crate::report::FormatReport;
use crate::source::SourceFile;
use crate::CancelFlag;

/// A formatter rule: look at the buffer, emit transformations. Rules never
/// apply anything themselves; the engine owns application and re-parsing.
pub(crate) trait FormatRule {
    fn name(&self) -> &'static str;
    fn analyze(&self, sf: &SourceFile, config: &Config) -> TransformationSet;
}

/// Format a buffer. In check-only mode no bytes are returned, only the
/// `changed` verdict and any violations.
///
/// # Errors
///
/// Returns `Error::Cancelled` at a phase boundary, `Error::InvalidUtf8`,
/// or a parse failure on the original input. Rewrites that would break
/// the parse are skipped and noted as violations, never errors.
pub fn format_source(
    path: &Path,
    bytes: Vec<u8>,
    config: &Config,
    cancel: &CancelFlag,
    check_only: bool,
) -> Result<FormatReport, Error> {
    let mut sf = SourceFile::from_bytes(path, bytes)?;
    let original = sf.text().to_string();
    let mut violations = structure::quote_violations(&sf, config);

    for pipeline_pass in 0..config.max_passes {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let before = sf.text().to_string();
        sf = run_pipeline(path, sf, config, cancel, &mut violations)?;
        if sf.text() == before {
            debug!(file = %path.display(), passes = pipeline_pass + 1, "formatter reached fixpoint");
            break;
        }
        if pipeline_pass + 1 == config.max_passes {
            violations.push(format!(
                "formatter did not converge within {} passes",
                config.max_passes
            ));
        }
    }

    let changed = sf.text() != original;
    Ok(FormatReport {
        new_bytes: if check_only {
            None
        } else {
            Some(sf.text().to_string())
        },
        changed,
        violations,
    })
}

/// One run of the five phases.
fn run_pipeline(
    path: &Path,
    mut sf: SourceFile,
    config: &Config,
    cancel: &CancelFlag,
    violations: &mut Vec<String>,
) -> Result<SourceFile, Error> {
    // Phase 1: top-level items to column zero.
    let set = whitespace::pre_normalize(&sf);
    sf = apply_guarded(path, sf, set, violations, "pre-normalization")?.0;

    if config.reorder_top_level {
        let set = ordering::reorder_top_level(&sf, config);
        sf = apply_guarded(
            path,
            sf,
            set,
            violations,
            "top-level-ordering",
        )?
        .0;
    }

    // Phase 2: structural convergence. After each rule that produced any
    // transformation the buffer is re-parsed before the next rule runs;
    // the phase repeats until none of the rules has anything left.
    let rules: Vec<Box<dyn FormatRule>> = vec![
        Box::new(spacing::SpacingRule),
        Box::new(structure::BlockExpansionRule),
        Box::new(structure::StatementSplitRule),
        Box::new(spacing::BraceStyleRule),
        Box::new(structure::SwitchNormalizationRule),
        Box::new(structure::QuoteNormalizationRule),
    ];
    for _ in 0..config.max_passes {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut changed = false;
        for rule in &rules {
            let set = rule.analyze(&sf, config);
            let (next, applied) = apply_guarded(path, sf, set, violations, rule.name())?;
            sf = next;
            changed |= applied;
        }
        if !changed {
            break;
        }
    }

    // Phase 3: vertical whitespace, to its own fixpoint.
    for _ in 0..config.max_passes {
        let mut changed = false;
        for (set, label) in [
            (whitespace::strip_trailing(&sf), "trailing-whitespace"),
            (whitespace::collapse_global_blanks(&sf), "blank-collapse"),
            (whitespace::zone_blanks(&sf), "setup-logic-zones"),
        ] {
            let (next, applied) = apply_guarded(path, sf, set, violations, label)?;
            sf = next;
            changed |= applied;
        }
        if !changed {
            break;
        }
    }

    // Phase 4: comments.
    if config.enable_comment_features {
        for _ in 0..config.max_passes {
            let mut changed = false;
            for (set, label) in [
                (comments::align_trailing(&sf, config), "comment-alignment"),
                (comments::reflow(&sf, config), "comment-reflow"),
            ] {
                let (next, applied) = apply_guarded(path, sf, set, violations, label)?;
                sf = next;
                changed |= applied;
            }
            if !changed {
                break;
            }
        }
    }

    // Phase 5: indentation, a single deterministic pass.
    let set = indent::reindent(&sf, config);
    sf = apply_guarded(path, sf, set, violations, "indentation")?.0;

    Ok(sf)
}

/// Apply a transformation set with the no-regression guard: a result that
/// parses with more `ERROR` nodes than before is discarded and noted.
fn apply_guarded(
    path: &Path,
    sf: SourceFile,
    set: TransformationSet,
    violations: &mut Vec<String>,
    label: &str,
) -> Result<(SourceFile, bool), Error> {
    if set.is_empty() {
        return Ok((sf, false));
    }
    let pre_errors = sf.error_count();
    let new_text = set.apply(sf.text());
    if new_text == sf.text() {
        return Ok((sf, false));
    }
    let new_sf = SourceFile::parse(path, new_text)?;
    if new_sf.error_count() > pre_errors {
        violations.push(format!("{label}: rewrite would introduce parse errors; skipped"));
        return Ok((sf, false));
    }
    Ok((new_sf, true))
}

/// First-wins push used by rules that may derive the same region twice in
/// one analysis: overlap within a single rule resolves to the earliest
/// transformation, and the next pipeline pass picks up the remainder.
pub(crate) fn push_first_wins(set: &mut TransformationSet, t: crate::edit::Transformation) {
    let _ = set.push(t);
}
