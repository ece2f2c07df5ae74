//! Fact extraction: one AST walk per file, neutral records out.
//!
//! Nothing here judges. A declaration after executable statements is
//! recorded with its ordering; a forward declaration is recorded as
//! body-less; whether either is a violation is the rules' business.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::facts::{DeclScope, FileFacts, Include, RefContext, Reference, Symbol, SymbolKind};
use crate::parser;
use crate::patterns;
use crate::source::{SourceFile, Span};

/// Extract all facts from a parsed file.
pub fn extract(sf: &SourceFile) -> FileFacts {
    let mut symbols = Vec::new();

    let handler_list = patterns::handlers(sf);
    let handler_bodies: HashSet<usize> = handler_list.iter().map(|h| h.body.id()).collect();
    let variables_body_id = patterns::variables_block(sf).map(|b| b.body.id());

    for handler in &handler_list {
        let kind = if handler.kind == "testcase" {
            SymbolKind::Testcase
        } else {
            SymbolKind::EventHandler
        };
        symbols.push(Symbol {
            name: handler.identity(),
            kind,
            defining_file: sf.path().to_path_buf(),
            span: handler.span,
            row: handler.row,
            declared_in_scope: DeclScope::TopLevel,
            type_text: None,
            has_body: true,
            param_count: 0,
            is_forward_declaration: false,
            parent_symbol: None,
            statements_before_in_block: 0,
        });
        extract_locals(sf, handler.body, &handler.identity(), &mut symbols);
    }

    for (node, _) in parser::walk(sf.root()) {
        match node.kind() {
            "function_definition" => {
                let body = parser::child_of_kind(node, "compound_statement");
                let is_handler_body = body.map(|b| handler_bodies.contains(&b.id())).unwrap_or(true);
                if is_handler_body {
                    continue;
                }
                if let Some(name) = patterns::function_name(sf, node) {
                    symbols.push(Symbol {
                        name: name.clone(),
                        kind: SymbolKind::Function,
                        defining_file: sf.path().to_path_buf(),
                        span: Span::of(node),
                        row: node.start_position().row,
                        declared_in_scope: DeclScope::TopLevel,
                        type_text: patterns::declared_type_text(sf, node),
                        has_body: true,
                        param_count: patterns::param_count(node),
                        is_forward_declaration: false,
                        parent_symbol: None,
                        statements_before_in_block: 0,
                    });
                    if let Some(body) = body {
                        extract_locals(sf, body, &name, &mut symbols);
                    }
                }
            }
            "declaration" => {
                if let Some(symbol) = extract_declaration(sf, node) {
                    symbols.push(symbol);
                }
            }
            "parameter_declaration" => {
                if let Some(name_node) = patterns::declarator_identifier(node) {
                    symbols.push(Symbol {
                        name: sf.node_text(name_node).to_string(),
                        kind: SymbolKind::Variable,
                        defining_file: sf.path().to_path_buf(),
                        span: Span::of(node),
                        row: node.start_position().row,
                        declared_in_scope: DeclScope::LocalBlock,
                        type_text: patterns::declared_type_text(sf, node),
                        has_body: false,
                        param_count: 0,
                        is_forward_declaration: false,
                        parent_symbol: None,
                        statements_before_in_block: 0,
                    });
                }
            }
            "enum_specifier" => {
                extract_type_definition(sf, node, SymbolKind::Enum, &mut symbols);
            }
            "struct_specifier" => {
                extract_type_definition(sf, node, SymbolKind::Struct, &mut symbols);
            }
            // Nested blocks (if/for/while bodies) carry locals too; their
            // declarations are facts like any other.
            "compound_statement" => {
                if handler_bodies.contains(&node.id())
                    || variables_body_id == Some(node.id())
                    || node.parent().map(|p| p.kind()) == Some("function_definition")
                {
                    continue;
                }
                let parent_name = parser::parent_of_kind(node, "function_definition")
                    .and_then(|f| patterns::function_name(sf, f))
                    .or_else(|| {
                        handler_list
                            .iter()
                            .find(|h| {
                                h.span.start <= node.start_byte() && node.end_byte() <= h.span.end
                            })
                            .map(|h| h.identity())
                    });
                if let Some(parent_name) = parent_name {
                    extract_locals(sf, node, &parent_name, &mut symbols);
                }
            }
            _ => {}
        }
    }

    dedup_symbols(&mut symbols);

    FileFacts {
        path: sf.path().to_path_buf(),
        hash: sf.hash().to_string(),
        symbols,
        includes: extract_includes(sf),
        references: extract_references(sf),
    }
}

/// A top-level or variables-block declaration fact. Local declarations are
/// handled by `extract_locals`; function prototypes become body-less
/// function facts.
fn extract_declaration(sf: &SourceFile, decl: Node<'_>) -> Option<Symbol> {
    if !patterns::is_global_scope(sf, decl) {
        return None;
    }

    if patterns::is_function_declaration(decl) {
        let name = patterns::variable_name(sf, decl)?;
        return Some(Symbol {
            name,
            kind: SymbolKind::Function,
            defining_file: sf.path().to_path_buf(),
            span: Span::of(decl),
            row: decl.start_position().row,
            declared_in_scope: DeclScope::TopLevel,
            type_text: patterns::declared_type_text(sf, decl),
            has_body: false,
            param_count: 0,
            is_forward_declaration: true,
            parent_symbol: None,
            statements_before_in_block: 0,
        });
    }

    let scope = if patterns::is_inside_variables_block(sf, decl) {
        DeclScope::GlobalVariablesBlock
    } else {
        DeclScope::TopLevel
    };

    let (kind, name, type_text) = classify_variable(sf, decl)?;
    Some(Symbol {
        name,
        kind,
        defining_file: sf.path().to_path_buf(),
        span: Span::of(decl),
        row: decl.start_position().row,
        declared_in_scope: scope,
        type_text,
        has_body: false,
        param_count: 0,
        is_forward_declaration: false,
        parent_symbol: None,
        statements_before_in_block: 0,
    })
}

/// Work out kind, name, and type text for a variable-like declaration.
///
/// Timer and message declarations use CAPL-only type words, so the grammar
/// often misparses the declarator; tokenizing the declaration text is the
/// reliable path for those.
fn classify_variable(
    sf: &SourceFile,
    decl: Node<'_>,
) -> Option<(SymbolKind, String, Option<String>)> {
    if patterns::is_timer_declaration(sf, decl) || patterns::is_message_declaration(sf, decl) {
        let text = sf.node_text(decl);
        let stripped = text
            .split(&['=', ';'][..])
            .next()
            .unwrap_or(text)
            .trim();
        let tokens: Vec<&str> = stripped.split_whitespace().collect();
        let name = tokens.last()?.split('[').next()?.to_string();
        let type_text = tokens[..tokens.len().saturating_sub(1)].join(" ");
        let kind = if patterns::is_timer_declaration(sf, decl) {
            SymbolKind::Timer
        } else {
            SymbolKind::Message
        };
        return Some((kind, name, Some(type_text)));
    }

    let name = patterns::variable_name(sf, decl)?;
    Some((
        SymbolKind::Variable,
        name,
        patterns::declared_type_text(sf, decl),
    ))
}

/// Local declarations of a body, with their ordering relative to
/// executable statements recorded but not judged.
fn extract_locals(sf: &SourceFile, body: Node<'_>, parent: &str, symbols: &mut Vec<Symbol>) {
    let mut executable_seen = 0;
    for child in parser::children_of(body) {
        match child.kind() {
            "{" | "}" | "comment" => {}
            "declaration" => {
                let Some((kind, name, type_text)) = classify_variable(sf, child) else {
                    continue;
                };
                symbols.push(Symbol {
                    name,
                    kind,
                    defining_file: sf.path().to_path_buf(),
                    span: Span::of(child),
                    row: child.start_position().row,
                    declared_in_scope: DeclScope::LocalBlock,
                    type_text,
                    has_body: false,
                    param_count: 0,
                    is_forward_declaration: false,
                    parent_symbol: Some(parent.to_string()),
                    statements_before_in_block: executable_seen,
                });
            }
            _ => {
                executable_seen += 1;
            }
        }
    }
}

/// Enum/struct definitions with their members. Position inside or outside
/// the variables block is recorded, because E003 needs it later.
fn extract_type_definition(
    sf: &SourceFile,
    node: Node<'_>,
    kind: SymbolKind,
    symbols: &mut Vec<Symbol>,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let name = sf.node_text(name_node).to_string();

    let scope = if patterns::is_inside_variables_block(sf, node) {
        DeclScope::GlobalVariablesBlock
    } else if patterns::is_global_scope(sf, node) {
        DeclScope::TopLevel
    } else {
        DeclScope::InsideBlock
    };

    symbols.push(Symbol {
        name: name.clone(),
        kind,
        defining_file: sf.path().to_path_buf(),
        span: Span::of(node),
        row: node.start_position().row,
        declared_in_scope: scope,
        type_text: None,
        has_body: true,
        param_count: 0,
        is_forward_declaration: false,
        parent_symbol: None,
        statements_before_in_block: 0,
    });

    let member_kind = match kind {
        SymbolKind::Enum => SymbolKind::EnumMember,
        _ => SymbolKind::StructMember,
    };
    for child in parser::children_of(body) {
        let member_name = match child.kind() {
            "enumerator" => child
                .child_by_field_name("name")
                .map(|n| sf.node_text(n).to_string()),
            "field_declaration" => patterns::declarator_identifier(child)
                .map(|n| sf.node_text(n).to_string())
                .or_else(|| {
                    parser::child_of_kind(child, "field_identifier")
                        .map(|n| sf.node_text(n).to_string())
                }),
            _ => None,
        };
        if let Some(member_name) = member_name {
            symbols.push(Symbol {
                name: member_name,
                kind: member_kind,
                defining_file: sf.path().to_path_buf(),
                span: Span::of(child),
                row: child.start_position().row,
                declared_in_scope: scope,
                type_text: None,
                has_body: false,
                param_count: 0,
                is_forward_declaration: false,
                parent_symbol: Some(name.clone()),
                statements_before_in_block: 0,
            });
        }
    }
}

/// `#include` facts via the query interface. Resolution happens in the
/// store, which knows the registered file set.
fn extract_includes(sf: &SourceFile) -> Vec<Include> {
    let matches = parser::query(
        sf.root(),
        sf.text(),
        "(preproc_include path: [(string_literal) (system_lib_string)] @path)",
    )
    .unwrap_or_default();

    let mut includes = Vec::new();
    for m in matches {
        let Some(path_node) = m.capture("path") else {
            continue;
        };
        let raw = sf.node_text(path_node);
        let is_system = raw.starts_with('<');
        let target = raw.trim_matches(&['"', '<', '>'][..]).to_string();
        includes.push(Include {
            source_file: sf.path().to_path_buf(),
            target_path_text: target,
            resolved_path: None,
            span: Span::of(path_node),
            row: path_node.start_position().row,
            is_system,
        });
    }
    includes.sort_by_key(|i| i.span.start);
    includes
}

/// Reference sites, classified by the parent expression shape.
fn extract_references(sf: &SourceFile) -> Vec<Reference> {
    let mut references = Vec::new();

    for (node, _) in parser::walk(sf.root()) {
        if node.kind() != "identifier" {
            continue;
        }
        let Some(parent) = node.parent() else {
            continue;
        };

        let context = match parent.kind() {
            "call_expression" => {
                if parent.child_by_field_name("function").map(|f| f.id()) == Some(node.id()) {
                    Some(RefContext::Call)
                } else {
                    None
                }
            }
            "assignment_expression" => {
                if parent.child_by_field_name("left").map(|f| f.id()) == Some(node.id()) {
                    Some(RefContext::Write)
                } else {
                    Some(RefContext::Read)
                }
            }
            "field_expression" => {
                if parent.child_by_field_name("argument").map(|f| f.id()) == Some(node.id()) {
                    Some(RefContext::MemberAccess)
                } else {
                    None
                }
            }
            "binary_expression" | "argument_list" | "parenthesized_expression"
            | "return_statement" | "subscript_expression" | "unary_expression"
            | "update_expression" | "conditional_expression" | "initializer_list" => {
                Some(RefContext::Read)
            }
            "init_declarator" => {
                // Only the value side of `int a = b;` is a reference.
                if parent.child_by_field_name("value").map(|f| f.id()) == Some(node.id()) {
                    Some(RefContext::Read)
                } else {
                    None
                }
            }
            _ => None,
        };

        let Some(mut context) = context else {
            continue;
        };

        let name = sf.node_text(node).to_string();
        // setTimer/cancelTimer arguments are timer references, not reads.
        if context == RefContext::Read && parent.kind() == "argument_list" {
            if let Some(call) = parent.parent().filter(|p| p.kind() == "call_expression") {
                let callee = call
                    .child_by_field_name("function")
                    .map(|f| sf.node_text(f).to_string())
                    .unwrap_or_default();
                if callee == "setTimer" || callee == "cancelTimer" {
                    context = RefContext::TimerSet;
                }
            }
        }

        references.push(Reference {
            file: sf.path().to_path_buf(),
            span: Span::of(node),
            row: node.start_position().row,
            referenced_name: name,
            context_kind: context,
        });
    }

    references.sort_by_key(|r| r.span.start);
    references.dedup_by(|a, b| a.span == b.span && a.referenced_name == b.referenced_name);
    references
}

/// Query overlaps can produce the same fact twice; keep the first.
fn dedup_symbols(symbols: &mut Vec<Symbol>) {
    let mut seen = HashSet::new();
    symbols.retain(|s| seen.insert((s.name.clone(), s.kind as u8, s.row)));
    symbols.sort_by_key(|s| s.span.start);
}
