//! Neutral facts about CAPL sources.
//!
//! Everything in this module is state, not judgment: a mid-block local
//! variable is recorded with its ordering relative to executable statements,
//! a forward declaration is recorded as body-less, and the verdicts stay
//! with the rules. All types serialize to JSON for the store, which keeps
//! readers tolerant of fields added later.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::source::Span;

/// What a symbol is, independent of whether it is allowed to be there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Variable,
    Function,
    EventHandler,
    Testcase,
    Enum,
    EnumMember,
    Struct,
    StructMember,
    Timer,
    Message,
    IncludeTarget,
}

/// Where a declaration sits, lexically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclScope {
    /// Inside the global `variables { }` block.
    GlobalVariablesBlock,
    /// At the start or middle of a function/handler body.
    LocalBlock,
    /// At the top level of the file, outside any block.
    TopLevel,
    /// Nested inside some other braced construct (struct body, etc.).
    InsideBlock,
}

/// A single extracted symbol fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub defining_file: PathBuf,
    pub span: Span,
    /// 0-based row of the defining token.
    pub row: usize,
    pub declared_in_scope: DeclScope,
    /// Free-form token sequence of the declared type, when one exists.
    #[serde(default)]
    pub type_text: Option<String>,
    /// For functions: whether a body is present.
    #[serde(default)]
    pub has_body: bool,
    #[serde(default)]
    pub param_count: usize,
    /// For functions: declaration without body.
    #[serde(default)]
    pub is_forward_declaration: bool,
    /// Enclosing function/handler/type for members and locals.
    #[serde(default)]
    pub parent_symbol: Option<String>,
    /// For locals: executable statements preceding this declaration in its
    /// block. Zero means the declaration is in the block's setup zone.
    #[serde(default)]
    pub statements_before_in_block: usize,
}

/// An `#include` fact. `resolved_path` is `None` when the target does not
/// resolve; angle-bracket includes are recorded but never resolved against
/// user paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Include {
    pub source_file: PathBuf,
    pub target_path_text: String,
    #[serde(default)]
    pub resolved_path: Option<PathBuf>,
    pub span: Span,
    pub row: usize,
    #[serde(default)]
    pub is_system: bool,
}

/// How a name is used at a reference site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefContext {
    Call,
    Read,
    Write,
    MemberAccess,
    TimerSet,
}

/// A symbol usage site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub file: PathBuf,
    pub span: Span,
    pub row: usize,
    pub referenced_name: String,
    pub context_kind: RefContext,
}

/// Everything extracted from one file in one pass, keyed by content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFacts {
    pub path: PathBuf,
    pub hash: String,
    pub symbols: Vec<Symbol>,
    pub includes: Vec<Include>,
    pub references: Vec<Reference>,
}
