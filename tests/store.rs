//! Store-level behavior through the public API: visibility closure,
//! staleness, persistence.

use caplint::{Analyzer, Config, SymbolStore};

#[test]
fn visibility_closes_over_include_chains() {
    // a.can -> b.cin -> c.cin; a sees symbols defined in c.
    let tmp = tempfile::TempDir::new().unwrap();
    let a = tmp.path().join("a.can");
    let b = tmp.path().join("b.cin");
    let c = tmp.path().join("c.cin");
    std::fs::write(&a, "#include \"b.cin\"\non start {\n  gDeep = 1;\n}\n").unwrap();
    std::fs::write(&b, "#include \"c.cin\"\n").unwrap();
    std::fs::write(&c, "variables {\n  int gDeep;\n}\n").unwrap();

    let analyzer = Analyzer::new(SymbolStore::in_memory().unwrap(), Config::default());
    for path in [&c, &b, &a] {
        analyzer.analyze(path, std::fs::read(path).unwrap()).unwrap();
    }

    let visible = analyzer.store().visible_symbols(&a).unwrap();
    assert!(
        visible.iter().any(|s| s.name == "gDeep"),
        "closure must reach c.cin"
    );

    // And therefore no E011 for the transitively visible symbol.
    let report = analyzer.analyze(&a, std::fs::read(&a).unwrap()).unwrap();
    assert!(
        !report.issues.iter().any(|i| i.rule_id == "E011"),
        "got: {:?}",
        report.issues
    );
}

#[test]
fn reanalysis_is_hash_gated() {
    let analyzer = Analyzer::new(SymbolStore::in_memory().unwrap(), Config::default());
    let path = std::path::Path::new("node.can");
    let src = b"variables {\n  int gA;\n}\n".to_vec();

    let first = analyzer.analyze(path, src.clone()).unwrap();
    assert!(first.symbols_added > 0);

    let second = analyzer.analyze(path, src).unwrap();
    assert_eq!(second.symbols_added, 0, "unchanged content re-adds nothing");

    let third = analyzer
        .analyze(path, b"variables {\n  int gA;\n  int gB;\n}\n".to_vec())
        .unwrap();
    assert!(third.symbols_added > 0, "changed content re-extracts");
}

#[test]
fn store_persists_between_openings() {
    let tmp = tempfile::TempDir::new().unwrap();
    let db = tmp.path().join("aic.db");
    let path = std::path::Path::new("node.can");

    {
        let analyzer = Analyzer::new(SymbolStore::open(&db).unwrap(), Config::default());
        analyzer
            .analyze(path, b"variables {\n  int gKeep;\n}\n".to_vec())
            .unwrap();
    }

    let store = SymbolStore::open(&db).unwrap();
    let symbols = store.symbols_in(path).unwrap();
    assert!(symbols.iter().any(|s| s.name == "gKeep"));
}

#[test]
fn eviction_forgets_a_file() {
    let analyzer = Analyzer::new(SymbolStore::in_memory().unwrap(), Config::default());
    let path = std::path::Path::new("gone.can");
    analyzer
        .analyze(path, b"variables {\n  int gBye;\n}\n".to_vec())
        .unwrap();
    analyzer.store().evict(path).unwrap();
    assert!(analyzer.store().symbols_in(path).unwrap().is_empty());
}
