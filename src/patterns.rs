//! Positional recognition of CAPL constructs in the C parse tree.
//!
//! The grammar has no idea what `variables`, `on message`, or `testcase`
//! mean, so these surface as identifiers, sibling-text pairs, or local
//! `ERROR` regions. Every function here recognizes a construct by position
//! and neighboring token text, the only reliable signal the tree offers.
//! Recognition is tolerant by design: it must keep working inside `ERROR`
//! subtrees, because that is exactly where CAPL-only syntax ends up.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::parser;
use crate::source::{SourceFile, Span};

/// Kinds of braced bodies that define a nesting level.
pub const BLOCK_KINDS: [&str; 4] = [
    "compound_statement",
    "field_declaration_list",
    "enumerator_list",
    "initializer_list",
];

/// The global `variables { … }` block: the keyword token and the braced body.
pub struct VariablesBlock<'t> {
    pub keyword: Node<'t>,
    pub body: Node<'t>,
}

impl VariablesBlock<'_> {
    /// Byte span covering keyword through closing brace.
    pub fn span(&self) -> Span {
        Span::new(self.keyword.start_byte(), self.body.end_byte())
    }
}

/// Find the global variables block.
pub fn variables_block(sf: &SourceFile) -> Option<VariablesBlock<'_>> {
    for (node, _) in parser::walk(sf.root()) {
        if let Some(keyword) = variables_keyword_for_body(sf, node) {
            return Some(VariablesBlock {
                keyword,
                body: node,
            });
        }
    }
    None
}

/// The `variables` keyword token of a block body, for either shape the
/// grammar repair produces: the keyword as a loose sibling token right
/// before the brace, or a `function_definition` whose entire header text
/// is the keyword (the missing-declarator repair).
fn variables_keyword_for_body<'t>(sf: &SourceFile, block: Node<'t>) -> Option<Node<'t>> {
    if block.kind() != "compound_statement" {
        return None;
    }
    if let Some(keyword) = preceding_keyword(sf, block, "variables") {
        return Some(keyword);
    }
    let parent = block.parent()?;
    if parent.kind() == "function_definition"
        && sf.text()[parent.start_byte()..block.start_byte()].trim() == "variables"
    {
        return parser::children_of(parent).into_iter().next();
    }
    None
}

/// Whether a node sits inside the global variables block.
pub fn is_inside_variables_block(sf: &SourceFile, node: Node<'_>) -> bool {
    match parser::parent_of_kind(node, "compound_statement") {
        Some(block) => variables_keyword_for_body(sf, block).is_some(),
        None => false,
    }
}

/// Whether a node is at global scope: no enclosing compound statement
/// other than the `variables` block itself.
pub fn is_global_scope(sf: &SourceFile, node: Node<'_>) -> bool {
    match parser::parent_of_kind(node, "compound_statement") {
        None => parser::parent_of_kind(node, "function_definition").is_none(),
        // The only compound allowed above a global item is the variables
        // block; anything else is a function or handler body.
        Some(block) => variables_keyword_for_body(sf, block).is_some(),
    }
}

/// Scan up to three preceding siblings (skipping comments) for a token
/// whose text matches `keyword`. Mirrors how the constructs parse: the
/// keyword lands as a loose identifier right before the brace.
fn preceding_keyword<'t>(sf: &SourceFile, node: Node<'t>, keyword: &str) -> Option<Node<'t>> {
    let mut current = node.prev_sibling();
    let mut hops = 0;
    while let Some(sib) = current {
        if hops >= 3 {
            return None;
        }
        if sib.kind() != "comment" {
            if sf.node_text(sib) == keyword {
                return Some(sib);
            }
            hops += 1;
        }
        current = sib.prev_sibling();
    }
    None
}

/// A recognized event handler or testcase header.
#[derive(Debug)]
pub struct Handler<'t> {
    /// Event kind: `message`, `timer`, `key`, `start`, … or `testcase`.
    pub kind: String,
    /// Subject text after the kind (message name, timer name, key expr).
    /// Empty for system events like `on start`.
    pub subject: String,
    /// Full span from the leading keyword through the closing brace.
    pub span: Span,
    pub body: Node<'t>,
    /// 0-based row of the header.
    pub row: usize,
}

impl Handler<'_> {
    /// Display identity, e.g. `on message EngineMsg` or `testcase Init`.
    pub fn identity(&self) -> String {
        if self.kind == "testcase" {
            format!("testcase {}", self.subject)
        } else if self.subject.is_empty() {
            format!("on {}", self.kind)
        } else {
            format!("on {} {}", self.kind, self.subject)
        }
    }
}

/// Collect every `on …` handler and `testcase` in the file.
///
/// Two recognition paths, deduplicated by body node: clean parses where the
/// construct became a `function_definition`, and degraded parses where the
/// header tokens sit as loose siblings before a `compound_statement`.
pub fn handlers(sf: &SourceFile) -> Vec<Handler<'_>> {
    let mut found = Vec::new();
    let mut claimed: HashSet<usize> = HashSet::new();

    for (node, _) in parser::walk(sf.root()) {
        if node.kind() == "function_definition" {
            if let Some(handler) = handler_from_function(sf, node) {
                claimed.insert(handler.body.id());
                found.push(handler);
            }
            continue;
        }
        if node.kind() != "compound_statement" || claimed.contains(&node.id()) {
            continue;
        }
        if parser::parent_of_kind(node, "function_definition").is_some() {
            continue;
        }
        if let Some(handler) = handler_from_loose_tokens(sf, node) {
            claimed.insert(node.id());
            found.push(handler);
        }
    }

    found.sort_by_key(|h| h.span.start);
    found
}

/// Recognize a handler that parsed cleanly as a function definition, which
/// happens for `testcase Name(…) { }` (testcase as return type) and for
/// some `on …` shapes the grammar repairs into a definition.
fn handler_from_function<'t>(sf: &SourceFile, func: Node<'t>) -> Option<Handler<'t>> {
    let body = parser::child_of_kind(func, "compound_statement")?;
    let signature = sf.text()[func.start_byte()..body.start_byte()].trim();
    let handler = parse_header(signature, func, body, sf)?;
    Some(handler)
}

/// Recognize a handler whose header tokens were scattered by error
/// recovery: look back from the brace for an `on` or `testcase` token and
/// take everything between it and the brace as the header.
fn handler_from_loose_tokens<'t>(sf: &SourceFile, body: Node<'t>) -> Option<Handler<'t>> {
    let mut current = body.prev_sibling();
    let mut leader: Option<Node<'t>> = None;
    let mut hops = 0;
    while let Some(sib) = current {
        if hops >= 4 {
            break;
        }
        if sib.kind() != "comment" {
            let text = sf.node_text(sib);
            if text == "on" || text == "testcase" {
                leader = Some(sib);
                break;
            }
            if text.starts_with("on ") || text.starts_with("testcase ") {
                leader = Some(sib);
                break;
            }
            hops += 1;
        }
        current = sib.prev_sibling();
    }

    let leader = leader?;
    let signature = sf.text()[leader.start_byte()..body.start_byte()].trim();
    parse_header(signature, leader, body, sf)
}

/// Parse `on <kind> <subject…>` or `testcase <name>(…)` header text.
fn parse_header<'t>(
    signature: &str,
    start: Node<'t>,
    body: Node<'t>,
    sf: &SourceFile,
) -> Option<Handler<'t>> {
    let mut tokens = signature.split_whitespace();
    let first = tokens.next()?;

    if first == "testcase" {
        let rest: Vec<&str> = tokens.collect();
        let name_part = rest.first()?;
        let name = name_part.split('(').next().unwrap_or(name_part).to_string();
        if name.is_empty() {
            return None;
        }
        return Some(Handler {
            kind: "testcase".to_string(),
            subject: name,
            span: Span::new(start.start_byte(), body.end_byte()),
            body,
            row: sf.position(start.start_byte()).row,
        });
    }

    if first != "on" {
        return None;
    }
    let kind = tokens.next()?.to_string();
    let subject = tokens.collect::<Vec<&str>>().join(" ");
    Some(Handler {
        kind,
        subject,
        span: Span::new(start.start_byte(), body.end_byte()),
        body,
        row: sf.position(start.start_byte()).row,
    })
}

/// Extract the identifier out of a (possibly nested) declarator chain:
/// `init_declarator`, `array_declarator`, `pointer_declarator`, and
/// `function_declarator` all eventually wrap one.
pub fn declarator_identifier<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.kind() == "identifier" {
        return Some(node);
    }
    for child in parser::children_of(node) {
        match child.kind() {
            "identifier" => return Some(child),
            "init_declarator" | "array_declarator" | "pointer_declarator"
            | "function_declarator" | "parenthesized_declarator" => {
                if let Some(found) = declarator_identifier(child) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

/// Variable name of a `declaration` node, if one can be found.
pub fn variable_name(sf: &SourceFile, decl: Node<'_>) -> Option<String> {
    declarator_identifier(decl).map(|n| sf.node_text(n).to_string())
}

/// Function name from a `function_definition`.
pub fn function_name(sf: &SourceFile, func: Node<'_>) -> Option<String> {
    let declarator = parser::child_of_kind(func, "function_declarator")
        .or_else(|| parser::child_of_kind(func, "pointer_declarator"))?;
    declarator_identifier(declarator).map(|n| sf.node_text(n).to_string())
}

/// Parameter count of a function declarator's parameter list.
pub fn param_count(func: Node<'_>) -> usize {
    let Some(declarator) = parser::child_of_kind(func, "function_declarator") else {
        return 0;
    };
    let Some(params) = parser::child_of_kind(declarator, "parameter_list") else {
        return 0;
    };
    parser::children_of(params)
        .into_iter()
        .filter(|c| c.kind() == "parameter_declaration")
        .count()
}

/// Whether a declaration carries the `extern` storage class.
pub fn has_extern_keyword(sf: &SourceFile, decl: Node<'_>) -> bool {
    parser::child_of_kind(decl, "storage_class_specifier")
        .map(|n| sf.node_text(n) == "extern")
        .unwrap_or(false)
}

/// The `extern` token node itself, for fix spans.
pub fn extern_token<'t>(sf: &SourceFile, decl: Node<'t>) -> Option<Node<'t>> {
    parser::child_of_kind(decl, "storage_class_specifier").filter(|n| sf.node_text(*n) == "extern")
}

/// Whether a `declaration` is a function prototype: it has a function
/// declarator and, being a declaration, no body.
pub fn is_function_declaration(decl: Node<'_>) -> bool {
    if decl.kind() != "declaration" {
        return false;
    }
    parser::children_of(decl).into_iter().any(|c| {
        c.kind() == "function_declarator"
            || (c.kind() == "init_declarator"
                && parser::child_of_kind(c, "function_declarator").is_some())
    })
}

/// The declared type as source text: `struct X`, `enum Color`, `int`, a
/// bare `type_identifier`, whatever the declaration says.
pub fn declared_type_text(sf: &SourceFile, decl: Node<'_>) -> Option<String> {
    for child in parser::children_of(decl) {
        match child.kind() {
            "struct_specifier" | "enum_specifier" | "primitive_type" | "type_identifier"
            | "sized_type_specifier" => {
                return Some(sf.node_text(child).to_string());
            }
            _ => {}
        }
    }
    None
}

/// The bare `type_identifier` node of a declaration, when its type is an
/// unadorned name (the E004/E005 shape: `Color c;` with `Color` an enum).
pub fn bare_type_identifier<'t>(decl: Node<'t>) -> Option<Node<'t>> {
    parser::child_of_kind(decl, "type_identifier")
}

/// Whether a declaration declares a CAPL timer (`timer` / `msTimer`).
pub fn is_timer_declaration(sf: &SourceFile, decl: Node<'_>) -> bool {
    matches!(
        declared_type_text(sf, decl).as_deref(),
        Some("timer") | Some("msTimer")
    )
}

/// Whether a declaration declares a CAPL message/frame variable.
pub fn is_message_declaration(sf: &SourceFile, decl: Node<'_>) -> bool {
    matches!(
        declared_type_text(sf, decl).as_deref(),
        Some("message") | Some("frame")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(text: &str) -> SourceFile {
        SourceFile::parse(Path::new("test.can"), text.to_string()).unwrap()
    }

    #[test]
    fn finds_variables_block() {
        let sf = parse("variables {\n  int gCount;\n}\n");
        let block = variables_block(&sf).expect("variables block");
        assert_eq!(sf.node_text(block.keyword), "variables");
        assert!(sf.node_text(block.body).contains("gCount"));
    }

    #[test]
    fn no_variables_block_in_plain_function() {
        let sf = parse("void helper() {\n  int a;\n}\n");
        assert!(variables_block(&sf).is_none());
    }

    #[test]
    fn recognizes_on_message_handler() {
        let sf = parse("on message EngineMsg {\n  write(\"got it\");\n}\n");
        let found = handlers(&sf);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, "message");
        assert_eq!(found[0].subject, "EngineMsg");
        assert_eq!(found[0].identity(), "on message EngineMsg");
    }

    #[test]
    fn recognizes_on_start_without_subject() {
        let sf = parse("on start {\n  write(\"boot\");\n}\n");
        let found = handlers(&sf);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, "start");
        assert!(found[0].subject.is_empty());
    }

    #[test]
    fn recognizes_testcase() {
        let sf = parse("testcase CheckInit() {\n  write(\"tc\");\n}\n");
        let found = handlers(&sf);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, "testcase");
        assert_eq!(found[0].subject, "CheckInit");
    }

    #[test]
    fn plain_function_is_not_a_handler() {
        let sf = parse("void doWork() {\n  write(\"x\");\n}\n");
        assert!(handlers(&sf).is_empty());
    }

    #[test]
    fn detects_extern_and_forward_declaration() {
        let sf = parse("extern int gOther;\nint helper(int a);\n");
        let decls: Vec<_> = parser::walk(sf.root())
            .filter(|(n, _)| n.kind() == "declaration")
            .map(|(n, _)| n)
            .collect();
        assert_eq!(decls.len(), 2);
        assert!(has_extern_keyword(&sf, decls[0]));
        assert!(!is_function_declaration(decls[0]));
        assert!(is_function_declaration(decls[1]));
    }

    #[test]
    fn extracts_variable_and_type_names() {
        let sf = parse("int gSpeed = 3;\nstruct Point p;\n");
        let decls: Vec<_> = parser::walk(sf.root())
            .filter(|(n, _)| n.kind() == "declaration")
            .map(|(n, _)| n)
            .collect();
        assert_eq!(variable_name(&sf, decls[0]).as_deref(), Some("gSpeed"));
        assert_eq!(declared_type_text(&sf, decls[0]).as_deref(), Some("int"));
        assert_eq!(
            declared_type_text(&sf, decls[1]).as_deref(),
            Some("struct Point")
        );
    }

    #[test]
    fn timer_and_message_declarations() {
        let sf = parse("variables {\n  msTimer tPoll;\n  int gA;\n}\n");
        let decls: Vec<_> = parser::walk(sf.root())
            .filter(|(n, _)| n.kind() == "declaration")
            .map(|(n, _)| n)
            .collect();
        assert!(decls.iter().any(|d| is_timer_declaration(&sf, *d)));
        assert!(!decls.iter().all(|d| is_timer_declaration(&sf, *d)));
    }
}
