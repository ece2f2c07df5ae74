//! Cross-reference rules: rules that need the store, not just the file.

use std::collections::{BTreeMap, HashSet};

use crate::error::Error;
use crate::facts::SymbolKind;
use crate::issue::{Issue, Severity};
use crate::source::Span;

use super::{issue_at, Rule, RuleContext};

/// CAPL built-in functions and keywords a reference may name without a
/// project definition. Not exhaustive, deliberately: unknown names in this
/// list's spirit are cheaper to whitelist than to false-positive on.
const BUILTINS: [&str; 24] = [
    "write",
    "writeEx",
    "output",
    "setTimer",
    "setTimerCyclic",
    "cancelTimer",
    "getValue",
    "putValue",
    "setValue",
    "this",
    "elCount",
    "timeNow",
    "runError",
    "snprintf",
    "strncpy",
    "strncat",
    "strstr",
    "testStepPass",
    "testStepFail",
    "testCaseTitle",
    "testWaitForTimeout",
    "msgBeep",
    "resetCan",
    "canOnline",
];

/// E011: a reference to a name with no visible definition.
pub struct UndefinedSymbol;

impl Rule for UndefinedSymbol {
    fn id(&self) -> &'static str {
        "E011"
    }

    fn name(&self) -> &'static str {
        "undefined-symbol"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let visible: HashSet<String> = ctx
            .store
            .visible_symbols(ctx.file.path())?
            .into_iter()
            .map(|s| s.name)
            .chain(ctx.facts.symbols.iter().map(|s| s.name.clone()))
            .collect();

        let mut reported: HashSet<String> = HashSet::new();
        let mut issues = Vec::new();
        for reference in &ctx.facts.references {
            let name = reference.referenced_name.as_str();
            // Single-letter names are loop counters more often than typos.
            if name.len() <= 1 || BUILTINS.contains(&name) || visible.contains(name) {
                continue;
            }
            if !reported.insert(name.to_string()) {
                continue;
            }
            issues.push(issue_at(
                self,
                ctx.file,
                reference.span,
                format!("reference to undefined symbol '{name}'"),
                Some("check spelling or add an #include for the definition".to_string()),
            ));
        }
        Ok(issues)
    }
}

/// E012: the same function name defined with a body more than once across
/// the project.
pub struct DuplicateFunction;

impl Rule for DuplicateFunction {
    fn id(&self) -> &'static str {
        "E012"
    }

    fn name(&self) -> &'static str {
        "duplicate-function"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let duplicates = ctx.store.duplicate_functions()?;
        let mut issues = Vec::new();
        for (name, files) in duplicates {
            let local = ctx
                .facts
                .symbols
                .iter()
                .find(|s| s.kind == SymbolKind::Function && s.has_body && s.name == name);
            let Some(local) = local else {
                continue;
            };
            let others: Vec<String> = files
                .iter()
                .filter(|f| f.as_path() != ctx.file.path())
                .map(|f| f.display().to_string())
                .collect();
            let where_else = if others.is_empty() {
                "this project".to_string()
            } else {
                others.join(", ")
            };
            issues.push(issue_at(
                self,
                ctx.file,
                local.span,
                format!("function '{name}' is defined more than once (also in {where_else})"),
                None,
            ));
        }
        Ok(issues)
    }
}

/// W001: a cycle in the include graph. Each cycle is reported exactly once
/// project-wide, attached to its lexicographically smallest file.
pub struct CircularInclude;

impl Rule for CircularInclude {
    fn id(&self) -> &'static str {
        "W001"
    }

    fn name(&self) -> &'static str {
        "circular-include"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let mut issues = Vec::new();
        for cycle in ctx.store.include_cycles()? {
            // Cycles come back sorted; the first member is the anchor.
            if cycle.first().map(|p| p.as_path()) != Some(ctx.file.path()) {
                continue;
            }
            let chain: Vec<String> = cycle
                .iter()
                .chain(cycle.first())
                .map(|p| p.display().to_string())
                .collect();
            issues.push(issue_at(
                self,
                ctx.file,
                Span::new(0, 0),
                format!("circular include: {}", chain.join(" -> ")),
                Some("break the cycle by moving shared declarations into one .cin".to_string()),
            ));
        }
        Ok(issues)
    }
}

/// W002: two handlers with the same `(kind, subject)` identity in one
/// file. `on start` is a system event and may legitimately repeat.
pub struct DuplicateHandler;

impl Rule for DuplicateHandler {
    fn id(&self) -> &'static str {
        "W002"
    }

    fn name(&self) -> &'static str {
        "duplicate-handler"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Issue>, Error> {
        let mut by_identity: BTreeMap<&str, Vec<&crate::facts::Symbol>> = BTreeMap::new();
        for symbol in &ctx.facts.symbols {
            if symbol.kind == SymbolKind::EventHandler && symbol.name != "on start" {
                by_identity.entry(symbol.name.as_str()).or_default().push(symbol);
            }
        }

        let mut issues = Vec::new();
        for (identity, occurrences) in by_identity {
            if occurrences.len() < 2 {
                continue;
            }
            let rows: Vec<String> = occurrences.iter().map(|s| (s.row + 1).to_string()).collect();
            let first = occurrences[0];
            issues.push(issue_at(
                self,
                ctx.file,
                first.span,
                format!(
                    "duplicate event handler '{identity}' defined {} times (lines {})",
                    occurrences.len(),
                    rows.join(", ")
                ),
                Some("keep a single handler per event".to_string()),
            ));
        }
        Ok(issues)
    }
}
