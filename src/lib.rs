//! caplint: static analyzer, linter, and opinionated formatter for CAPL
//! (`.can` / `.cin`) sources.
//!
//! The core is three tightly coupled engines over one parser façade:
//! neutral fact extraction into a queryable store, rule-driven linting
//! with convergent auto-fixes, and a multi-phase AST-aware formatter.
//! All rewrites share the byte-offset transformation model and the
//! guarantee that no rewrite introduces a grammar error.

pub mod autofix;
pub mod config;
pub mod edit;
pub mod error;
pub mod extract;
pub mod facts;
pub mod format;
pub mod issue;
pub mod parser;
pub mod patterns;
pub mod render;
pub mod report;
pub mod rules;
pub mod source;
pub mod store;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use config::Config;
pub use error::Error;
pub use issue::{Issue, Severity};
pub use report::{AnalysisReport, FixReport, FormatReport};
pub use source::SourceFile;
pub use store::SymbolStore;

/// Cooperative cancellation, checked at pass boundaries and between
/// files. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The three entry points over one store and one configuration. Files are
/// handed in as bytes; the analyzer performs no I/O beyond the store's
/// own persistence.
pub struct Analyzer {
    store: SymbolStore,
    config: Config,
    cancel: CancelFlag,
}

impl Analyzer {
    pub fn new(store: SymbolStore, config: Config) -> Self {
        Self {
            store,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Share the cancellation flag with a caller that wants to stop work.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Layer command-line rule filters over the loaded configuration.
    pub fn with_rule_filters(mut self, fix_only: &[String], disable: &[String]) -> Self {
        self.config.fix_only.extend(fix_only.iter().cloned());
        self.config.disabled_rules.extend(disable.iter().cloned());
        self
    }

    /// Filter entries that name no known rule. Unknown ids are reported by
    /// the caller, never fatal.
    pub fn unknown_rule_ids(&self) -> Vec<String> {
        let known = rules::known_rule_ids();
        self.config
            .disabled_rules
            .iter()
            .chain(self.config.fix_only.iter())
            .filter(|id| !known.contains(&id.as_str()))
            .cloned()
            .collect()
    }

    pub fn store(&self) -> &SymbolStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract facts, persist them, and run every enabled rule.
    ///
    /// # Errors
    ///
    /// Returns parse, store, or cancellation errors. Rule failures are
    /// folded into the report as synthetic issues.
    pub fn analyze(&self, path: &Path, bytes: Vec<u8>) -> Result<AnalysisReport, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let sf = SourceFile::from_bytes(path, bytes)?;
        let facts = extract::extract(&sf);
        let stats = self.store.upsert(&facts)?;

        let ctx = rules::RuleContext {
            file: &sf,
            facts: &facts,
            store: &self.store,
            config: &self.config,
        };
        let issues = autofix::run_checks(&ctx);

        Ok(AnalysisReport {
            issues,
            symbols_added: stats.symbols_added,
            references_added: stats.references_added,
        })
    }

    /// Fix a file to a fixpoint and report what remains.
    ///
    /// # Errors
    ///
    /// Returns parse, store, or cancellation errors.
    pub fn lint_fix(&self, path: &Path, bytes: Vec<u8>) -> Result<FixReport, Error> {
        autofix::lint_fix(path, bytes, &self.store, &self.config, &self.cancel)
    }

    /// Format a file. With `check_only` no bytes are produced, only the
    /// changed verdict and violations.
    ///
    /// # Errors
    ///
    /// Returns parse or cancellation errors.
    pub fn format(
        &self,
        path: &Path,
        bytes: Vec<u8>,
        check_only: bool,
    ) -> Result<FormatReport, Error> {
        format::format_source(path, bytes, &self.config, &self.cancel, check_only)
    }
}
