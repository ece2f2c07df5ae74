//! End-to-end lint scenarios: detection, convergent fixing, idempotency.

use std::path::Path;

use caplint::{Analyzer, Config, Severity, SymbolStore};

fn analyzer() -> Analyzer {
    Analyzer::new(SymbolStore::in_memory().unwrap(), Config::default())
}

fn fix(text: &str) -> caplint::FixReport {
    analyzer()
        .lint_fix(Path::new("test.can"), text.as_bytes().to_vec())
        .unwrap()
}

fn issue_ids(report: &caplint::FixReport) -> Vec<&str> {
    report
        .remaining_issues
        .iter()
        .map(|i| i.rule_id.as_str())
        .collect()
}

// ── E008: arrow operator ──────────────────────────────────────────────

#[test]
fn arrow_operator_detected_and_fixed() {
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), b"void f() { x->y = 1; }\n".to_vec())
        .unwrap();
    assert!(
        report.issues.iter().any(|i| i.rule_id == "E008"),
        "E008 should fire: {:?}",
        report.issues
    );

    let fixed = fix("void f() { x->y = 1; }\n");
    assert!(fixed.new_bytes.contains("x.y = 1;"), "got: {}", fixed.new_bytes);
    assert!(!issue_ids(&fixed).contains(&"E008"), "E008 should be gone");
    assert!(fixed.applied_rule_ids.contains(&"E008".to_string()));
}

// ── E006: variable outside block ──────────────────────────────────────

#[test]
fn variable_outside_block_moves_into_it() {
    let src = "variables {\n  int a;\n}\nint b;\non start {\n  b = a;\n}\n";
    let fixed = fix(src);

    assert!(!fixed.new_bytes.contains("}\nint b;"), "b still outside: {}", fixed.new_bytes);
    let vars_start = fixed.new_bytes.find("variables {").unwrap();
    let vars_end = fixed.new_bytes[vars_start..].find("\n}").unwrap() + vars_start;
    let block = &fixed.new_bytes[vars_start..vars_end];
    assert!(block.contains("int b;"), "b not moved into block: {}", fixed.new_bytes);
    assert!(fixed.new_bytes.contains("b = a;"), "handler body changed: {}", fixed.new_bytes);
    assert!(!issue_ids(&fixed).contains(&"E006"));
}

#[test]
fn variable_outside_block_creates_block_when_missing() {
    let fixed = fix("int gLoose;\nvoid f() {\n  gLoose = 1;\n}\n");
    assert!(fixed.new_bytes.contains("variables {"), "got: {}", fixed.new_bytes);
    assert!(!issue_ids(&fixed).contains(&"E006"));
}

// ── E005: missing struct keyword ──────────────────────────────────────

#[test]
fn missing_struct_keyword_fixed() {
    let src = "variables {\n  struct Point {\n    int x;\n  };\n}\nvoid f() {\n  Point p;\n  p.x = 1;\n}\n";
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    assert!(
        report.issues.iter().any(|i| i.rule_id == "E005"),
        "E005 should fire: {:?}",
        report.issues
    );

    let fixed = fix(src);
    assert!(fixed.new_bytes.contains("struct Point p;"), "got: {}", fixed.new_bytes);
    assert!(!issue_ids(&fixed).contains(&"E005"));
}

// ── E001 then E006 across passes ──────────────────────────────────────

#[test]
fn extern_removal_then_move_converges() {
    let src = "extern int gOther;\nvariables {\n  int gA;\n}\n";
    let fixed = fix(src);

    assert!(!fixed.new_bytes.contains("extern"), "got: {}", fixed.new_bytes);
    let vars_start = fixed.new_bytes.find("variables {").unwrap();
    let gother = fixed.new_bytes.find("int gOther;").unwrap();
    assert!(gother > vars_start, "gOther not moved inside: {}", fixed.new_bytes);
    assert!(fixed.applied_rule_ids.contains(&"E001".to_string()));
    assert!(fixed.applied_rule_ids.contains(&"E006".to_string()));
    assert!(fixed.passes_used >= 2, "fix should take two passes");
    assert!(fixed.converged);
}

// ── E002: forward declaration ─────────────────────────────────────────

#[test]
fn forward_declaration_removed() {
    let src = "int helper(int a);\nvoid f() {\n  write(\"x\");\n}\n";
    let fixed = fix(src);
    assert!(!fixed.new_bytes.contains("int helper(int a);"), "got: {}", fixed.new_bytes);
    assert!(!issue_ids(&fixed).contains(&"E002"));
}

// ── E007: mid-block variable ──────────────────────────────────────────

#[test]
fn mid_block_variable_moves_to_block_start() {
    let src = "void f() {\n  int a;\n  a = 1;\n  int b;\n  b = 2;\n}\n";
    let fixed = fix(src);

    let a_pos = fixed.new_bytes.find("int b;").unwrap();
    let stmt_pos = fixed.new_bytes.find("a = 1;").unwrap();
    assert!(a_pos < stmt_pos, "b not moved above statements: {}", fixed.new_bytes);
    assert!(!issue_ids(&fixed).contains(&"E007"));
}

// ── E009 / E011 / E012: report-only rules ─────────────────────────────

#[test]
fn pointer_parameter_reported_not_fixed() {
    let src = "void f(int* p) {\n  write(\"x\");\n}\n";
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    let e009: Vec<_> = report.issues.iter().filter(|i| i.rule_id == "E009").collect();
    assert_eq!(e009.len(), 1);
    assert!(!e009[0].auto_fixable);

    let fixed = fix(src);
    assert!(fixed.new_bytes.contains("int* p"), "E009 must not rewrite: {}", fixed.new_bytes);
}

#[test]
fn ethernet_packet_pointer_is_exempt() {
    let src = "void f(ethernetPacket* p) {\n  write(\"x\");\n}\n";
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    assert!(!report.issues.iter().any(|i| i.rule_id == "E009"));
}

#[test]
fn undefined_symbol_reported() {
    let src = "void f() {\n  gMissing = 1;\n}\n";
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    assert!(
        report.issues.iter().any(|i| i.rule_id == "E011" && i.message.contains("gMissing")),
        "got: {:?}",
        report.issues
    );
}

#[test]
fn builtins_are_not_undefined() {
    let src = "variables {\n  msTimer tP;\n}\non timer tP {\n  setTimer(tP, 50);\n  write(\"tick\");\n}\n";
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    assert!(
        !report.issues.iter().any(|i| i.rule_id == "E011"),
        "spurious E011: {:?}",
        report.issues
    );
}

#[test]
fn duplicate_function_reported_across_files() {
    let a = analyzer();
    a.analyze(Path::new("one.can"), b"void shared() {\n  write(\"1\");\n}\n".to_vec())
        .unwrap();
    let report = a
        .analyze(Path::new("two.can"), b"void shared() {\n  write(\"2\");\n}\n".to_vec())
        .unwrap();
    assert!(
        report.issues.iter().any(|i| i.rule_id == "E012"),
        "got: {:?}",
        report.issues
    );
}

// ── W002: duplicate handler ───────────────────────────────────────────

#[test]
fn duplicate_message_handler_reported() {
    let src = "on message EngineMsg {\n  write(\"a\");\n}\non message EngineMsg {\n  write(\"b\");\n}\n";
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    assert!(
        report.issues.iter().any(|i| i.rule_id == "W002"),
        "got: {:?}",
        report.issues
    );
}

#[test]
fn repeated_on_start_is_allowed() {
    let src = "on start {\n  write(\"a\");\n}\non start {\n  write(\"b\");\n}\n";
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    assert!(
        !report.issues.iter().any(|i| i.rule_id == "W002"),
        "on start may repeat: {:?}",
        report.issues
    );
}

// ── S4: circular includes ─────────────────────────────────────────────

#[test]
fn circular_include_reported_once_without_spurious_undefined() {
    let tmp = tempfile::TempDir::new().unwrap();
    let a_path = tmp.path().join("a.can");
    let b_path = tmp.path().join("b.can");
    std::fs::write(
        &a_path,
        "#include \"b.can\"\nvariables {\n  int gA;\n}\non start {\n  gA = gB;\n}\n",
    )
    .unwrap();
    std::fs::write(
        &b_path,
        "#include \"a.can\"\nvariables {\n  int gB;\n}\n",
    )
    .unwrap();

    let an = analyzer();
    let report_a = an
        .analyze(&a_path, std::fs::read(&a_path).unwrap())
        .unwrap();
    let report_b = an
        .analyze(&b_path, std::fs::read(&b_path).unwrap())
        .unwrap();

    // Re-check a now that both files are registered.
    let report_a2 = an
        .analyze(&a_path, std::fs::read(&a_path).unwrap())
        .unwrap();

    let w001_total = report_a2
        .issues
        .iter()
        .chain(report_b.issues.iter())
        .filter(|i| i.rule_id == "W001")
        .count();
    assert_eq!(w001_total, 1, "exactly one cycle report expected");

    let w001 = report_a2
        .issues
        .iter()
        .find(|i| i.rule_id == "W001")
        .expect("cycle attaches to the alphabetically first file");
    assert!(w001.message.contains("a.can") && w001.message.contains("b.can"));

    assert!(
        !report_a2.issues.iter().any(|i| i.rule_id == "E011"),
        "cycle must not cause spurious undefined symbols: {:?}",
        report_a2.issues
    );
    let _ = report_a;
}

// ── Properties ────────────────────────────────────────────────────────

#[test]
fn lint_fix_is_idempotent() {
    let src = "extern int gOther;\nvariables {\n  int gA;\n}\nint gLate;\nvoid f() {\n  int a;\n  a = 1;\n  int b;\n  gOther = b;\n}\n";
    let first = fix(src);
    let second = fix(&first.new_bytes);
    assert_eq!(
        first.new_bytes, second.new_bytes,
        "autofix(autofix(f)) must equal autofix(f)"
    );
    assert!(second.applied_rule_ids.is_empty(), "second run must fix nothing");
}

#[test]
fn fixes_never_introduce_parse_errors() {
    let sources = [
        "void f() { x->y = 1; }\n",
        "extern int gOther;\nvariables {\n  int gA;\n}\n",
        "int b;\non start {\n  b = 1;\n}\n",
        "enum Color {\n  RED,\n  GREEN\n};\nvariables {\n  int gA;\n}\n",
    ];
    for src in sources {
        let pre = caplint::SourceFile::parse(Path::new("t.can"), src.to_string())
            .unwrap()
            .error_count();
        let fixed = fix(src);
        let post = caplint::SourceFile::parse(Path::new("t.can"), fixed.new_bytes.clone())
            .unwrap()
            .error_count();
        assert!(post <= pre, "new parse errors after fixing {src:?}: {}", fixed.new_bytes);
    }
}

#[test]
fn issues_enumerate_in_byte_order() {
    let src = "void f() {\n  x->y = 1;\n  z->w = 2;\n}\n";
    let a = analyzer();
    let report = a
        .analyze(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    let spans: Vec<usize> = report
        .issues
        .iter()
        .filter(|i| i.rule_id == "E008")
        .map(|i| i.span.start)
        .collect();
    let mut sorted = spans.clone();
    sorted.sort_unstable();
    assert_eq!(spans, sorted);
}

#[test]
fn disabled_rules_do_not_report() {
    let mut config = Config::default();
    config.disabled_rules.insert("E008".to_string());
    let a = Analyzer::new(SymbolStore::in_memory().unwrap(), config);
    let report = a
        .analyze(Path::new("test.can"), b"void f() { x->y = 1; }\n".to_vec())
        .unwrap();
    assert!(!report.issues.iter().any(|i| i.rule_id == "E008"));
}

#[test]
fn fix_only_restricts_applied_rules() {
    let mut config = Config::default();
    config.fix_only.insert("E008".to_string());
    let a = Analyzer::new(SymbolStore::in_memory().unwrap(), config);
    let src = "int gLoose;\nvoid f() {\n  gLoose = 1;\n  x->y = 2;\n}\n";
    let report = a
        .lint_fix(Path::new("test.can"), src.as_bytes().to_vec())
        .unwrap();
    assert!(report.new_bytes.contains("x.y = 2;"));
    assert!(report.new_bytes.starts_with("int gLoose;"), "E006 must not move: {}", report.new_bytes);
    assert_eq!(report.applied_rule_ids, vec!["E008".to_string()]);
}

#[test]
fn severity_is_a_rule_attribute() {
    let a = analyzer();
    let report = a
        .analyze(
            Path::new("test.can"),
            b"on message M {\n  write(\"a\");\n}\non message M {\n  write(\"b\");\n}\n".to_vec(),
        )
        .unwrap();
    for issue in &report.issues {
        if issue.rule_id == "W002" {
            assert_eq!(issue.severity, Severity::Warning);
        }
        if issue.rule_id.starts_with('E') {
            assert_eq!(issue.severity, Severity::Error);
        }
    }
}
