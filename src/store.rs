//! Persistent symbol store backed by an embedded redb database.
//!
//! A single database file (conventionally `aic.db`) holds per-file tables
//! for facts plus a derived visibility table. Values are JSON, so a reader
//! built against an older schema tolerates fields it does not know —
//! migrations are additive only. redb gives the concurrency contract the
//! engine needs for free: one writer, many readers, read-your-writes
//! within a transaction.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableTable as _, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{store_err, Error};
use crate::facts::{FileFacts, Include, Reference, Symbol, SymbolKind};

const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const SYMBOLS: TableDefinition<&str, &[u8]> = TableDefinition::new("symbols");
const INCLUDES: TableDefinition<&str, &[u8]> = TableDefinition::new("includes");
const REFERENCES: TableDefinition<&str, &[u8]> = TableDefinition::new("references");
const VISIBILITY: TableDefinition<&str, &[u8]> = TableDefinition::new("visibility");

/// Per-file bookkeeping record.
#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    hash: String,
    #[serde(default)]
    last_modified: Option<u64>,
}

/// What an upsert did, for the analysis report.
#[derive(Debug, Clone, Copy)]
pub struct UpsertStats {
    pub changed: bool,
    pub symbols_added: usize,
    pub references_added: usize,
}

pub struct SymbolStore {
    db: Database,
}

impl SymbolStore {
    /// Create or open the store at a path.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` on any database-level failure.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(store_err)?;
        let store = Self { db };
        store.init_tables()?;
        Ok(store)
    }

    /// An in-memory store with identical semantics; used by tests and by
    /// callers that do not want a persisted artifact.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` on any database-level failure.
    pub fn in_memory() -> Result<Self, Error> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(store_err)?;
        let store = Self { db };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), Error> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            txn.open_table(FILES).map_err(store_err)?;
            txn.open_table(SYMBOLS).map_err(store_err)?;
            txn.open_table(INCLUDES).map_err(store_err)?;
            txn.open_table(REFERENCES).map_err(store_err)?;
            txn.open_table(VISIBILITY).map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Store or refresh the facts for one file. A matching content hash is
    /// a no-op; a mismatch invalidates and replaces everything recorded for
    /// the file, resolves its includes, and refreshes the derived
    /// visibility edges.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn upsert(&self, facts: &FileFacts) -> Result<UpsertStats, Error> {
        if self.file_hash(&facts.path)?.as_deref() == Some(facts.hash.as_str()) {
            return Ok(UpsertStats {
                changed: false,
                symbols_added: 0,
                references_added: 0,
            });
        }

        let key = key_of(&facts.path);
        let includes = self.resolve_includes(facts)?;
        let record = FileRecord {
            hash: facts.hash.clone(),
            last_modified: unix_now(),
        };
        let direct_targets: Vec<PathBuf> = includes
            .iter()
            .filter_map(|i| i.resolved_path.clone())
            .collect();

        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut files = txn.open_table(FILES).map_err(store_err)?;
            files
                .insert(key.as_str(), serde_json::to_vec(&record)?.as_slice())
                .map_err(store_err)?;

            let mut symbols = txn.open_table(SYMBOLS).map_err(store_err)?;
            symbols
                .insert(key.as_str(), serde_json::to_vec(&facts.symbols)?.as_slice())
                .map_err(store_err)?;

            let mut inc = txn.open_table(INCLUDES).map_err(store_err)?;
            inc.insert(key.as_str(), serde_json::to_vec(&includes)?.as_slice())
                .map_err(store_err)?;

            let mut refs = txn.open_table(REFERENCES).map_err(store_err)?;
            refs.insert(
                key.as_str(),
                serde_json::to_vec(&facts.references)?.as_slice(),
            )
            .map_err(store_err)?;

            let mut vis = txn.open_table(VISIBILITY).map_err(store_err)?;
            vis.insert(
                key.as_str(),
                serde_json::to_vec(&direct_targets)?.as_slice(),
            )
            .map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;

        Ok(UpsertStats {
            changed: true,
            symbols_added: facts.symbols.len(),
            references_added: facts.references.len(),
        })
    }

    /// Drop everything recorded for a file.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure`.
    pub fn evict(&self, path: &Path) -> Result<(), Error> {
        let key = key_of(path);
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut files = txn.open_table(FILES).map_err(store_err)?;
            files.remove(key.as_str()).map_err(store_err)?;
            let mut symbols = txn.open_table(SYMBOLS).map_err(store_err)?;
            symbols.remove(key.as_str()).map_err(store_err)?;
            let mut includes = txn.open_table(INCLUDES).map_err(store_err)?;
            includes.remove(key.as_str()).map_err(store_err)?;
            let mut refs = txn.open_table(REFERENCES).map_err(store_err)?;
            refs.remove(key.as_str()).map_err(store_err)?;
            let mut vis = txn.open_table(VISIBILITY).map_err(store_err)?;
            vis.remove(key.as_str()).map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Stored content hash for a file, if it has been analyzed.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn file_hash(&self, path: &Path) -> Result<Option<String>, Error> {
        let record: Option<FileRecord> = self.read_value(FILES, &key_of(path))?;
        Ok(record.map(|r| r.hash))
    }

    /// All symbol facts for one file.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn symbols_in(&self, path: &Path) -> Result<Vec<Symbol>, Error> {
        Ok(self.read_value(SYMBOLS, &key_of(path))?.unwrap_or_default())
    }

    /// Include facts for one file, resolution applied.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn includes_of(&self, path: &Path) -> Result<Vec<Include>, Error> {
        Ok(self.read_value(INCLUDES, &key_of(path))?.unwrap_or_default())
    }

    /// Symbols visible from a file: its own plus those of every file
    /// transitively reachable over resolved includes. A breadth-first walk
    /// with a visited set makes cycles harmless — each cycle member sees
    /// the union of the cycle's facts.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn visible_symbols(&self, path: &Path) -> Result<Vec<Symbol>, Error> {
        let mut visible = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: Vec<PathBuf> = vec![path.to_path_buf()];

        while let Some(current) = queue.pop() {
            let key = key_of(&current);
            if !visited.insert(key.clone()) {
                continue;
            }
            visible.extend(self.symbols_in(&current)?);
            for include in self.includes_of(&current)? {
                if let Some(target) = include.resolved_path {
                    queue.push(target);
                }
            }
        }

        Ok(visible)
    }

    /// All references recorded for one file.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn references_from(&self, path: &Path) -> Result<Vec<Reference>, Error> {
        Ok(self
            .read_value(REFERENCES, &key_of(path))?
            .unwrap_or_default())
    }

    /// Every reference to a name, across the whole project.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn references_to(&self, name: &str) -> Result<Vec<Reference>, Error> {
        let mut out = Vec::new();
        for path in self.registered_files()? {
            out.extend(
                self.references_from(&path)?
                    .into_iter()
                    .filter(|r| r.referenced_name == name),
            );
        }
        Ok(out)
    }

    /// All files the store knows about, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure`.
    pub fn registered_files(&self) -> Result<Vec<PathBuf>, Error> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let table = txn.open_table(FILES).map_err(store_err)?;
        let mut out = Vec::new();
        let mut iter = table.iter().map_err(store_err)?;
        while let Some(entry) = iter.next() {
            let (key, _) = entry.map_err(store_err)?;
            out.push(PathBuf::from(key.value()));
        }
        out.sort();
        Ok(out)
    }

    /// Include cycles: strongly connected components of the resolved
    /// include graph with two or more members, plus self-loops. Each cycle
    /// is sorted lexicographically and the set of cycles is ordered by its
    /// smallest member, so reporting is deterministic.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn include_cycles(&self) -> Result<Vec<Vec<PathBuf>>, Error> {
        let edges = self.include_edges()?;
        let mut cycles = strongly_connected_components(&edges)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1
                    || edges
                        .get(&scc[0])
                        .map(|targets| targets.contains(&scc[0]))
                        .unwrap_or(false)
            })
            .map(|mut scc| {
                scc.sort();
                scc
            })
            .collect::<Vec<_>>();
        cycles.sort();
        Ok(cycles)
    }

    /// Function names defined with a body more than once across the
    /// project, with the defining files.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreFailure` or `Error::Json`.
    pub fn duplicate_functions(&self) -> Result<Vec<(String, Vec<PathBuf>)>, Error> {
        let mut definitions: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for path in self.registered_files()? {
            for symbol in self.symbols_in(&path)? {
                if symbol.kind == SymbolKind::Function && symbol.has_body {
                    definitions.entry(symbol.name).or_default().push(path.clone());
                }
            }
        }
        Ok(definitions
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(name, mut files)| {
                files.sort();
                (name, files)
            })
            .collect())
    }

    fn read_value<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Option<T>, Error> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let table = txn.open_table(table).map_err(store_err)?;
        match table.get(key).map_err(store_err)? {
            None => Ok(None),
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        }
    }

    /// Resolve quote-includes against the including file's directory.
    /// A target resolves when it exists on disk or is already registered;
    /// angle-bracket includes never resolve against user paths.
    fn resolve_includes(&self, facts: &FileFacts) -> Result<Vec<Include>, Error> {
        let registered: BTreeSet<String> = self
            .registered_files()?
            .iter()
            .map(|p| key_of(p))
            .collect();
        let parent = facts.path.parent().unwrap_or(Path::new("")).to_path_buf();

        let mut resolved = Vec::with_capacity(facts.includes.len());
        for include in &facts.includes {
            let mut include = include.clone();
            if !include.is_system {
                let candidate = normalize_path(&parent.join(&include.target_path_text));
                if candidate.exists() || registered.contains(&key_of(&candidate)) {
                    include.resolved_path = Some(candidate);
                }
            }
            resolved.push(include);
        }
        Ok(resolved)
    }

    fn include_edges(&self) -> Result<HashMap<PathBuf, Vec<PathBuf>>, Error> {
        let mut edges: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
        for path in self.registered_files()? {
            let targets = self
                .includes_of(&path)?
                .into_iter()
                .filter_map(|i| i.resolved_path)
                .collect();
            edges.insert(path, targets);
        }
        Ok(edges)
    }
}

fn key_of(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn unix_now() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// Collapse `.` and `..` components without touching the filesystem.
/// Preserves leading `..` when there is nothing left to pop.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<std::path::Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                let can_pop = matches!(
                    components.last(),
                    Some(c) if !matches!(c, std::path::Component::ParentDir)
                );
                if can_pop {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Iterative Tarjan over the include graph. The node set is every key plus
/// every target, so files mentioned but not yet analyzed still participate.
fn strongly_connected_components(edges: &HashMap<PathBuf, Vec<PathBuf>>) -> Vec<Vec<PathBuf>> {
    let mut nodes: Vec<PathBuf> = edges.keys().cloned().collect();
    for targets in edges.values() {
        for t in targets {
            if !edges.contains_key(t) {
                nodes.push(t.clone());
            }
        }
    }
    nodes.sort();
    nodes.dedup();

    let index_of: HashMap<&PathBuf, usize> = nodes.iter().enumerate().map(|(i, n)| (n, i)).collect();
    let adjacency: Vec<Vec<usize>> = nodes
        .iter()
        .map(|n| {
            edges
                .get(n)
                .map(|ts| ts.iter().filter_map(|t| index_of.get(t).copied()).collect())
                .unwrap_or_default()
        })
        .collect();

    let n = nodes.len();
    let mut state = TarjanState {
        index: vec![None; n],
        lowlink: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };

    for v in 0..n {
        if state.index[v].is_none() {
            tarjan_visit(v, &adjacency, &mut state);
        }
    }

    state
        .components
        .into_iter()
        .map(|component| component.into_iter().map(|i| nodes[i].clone()).collect())
        .collect()
}

struct TarjanState {
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    components: Vec<Vec<usize>>,
}

/// Explicit-stack Tarjan so deep include chains cannot overflow.
fn tarjan_visit(root: usize, adjacency: &[Vec<usize>], state: &mut TarjanState) {
    let mut work: Vec<(usize, usize)> = vec![(root, 0)];
    while let Some((v, child_idx)) = work.last().copied() {
        if state.index[v].is_none() {
            state.index[v] = Some(state.next_index);
            state.lowlink[v] = state.next_index;
            state.next_index += 1;
            state.stack.push(v);
            state.on_stack[v] = true;
        }

        if child_idx < adjacency[v].len() {
            if let Some(frame) = work.last_mut() {
                frame.1 += 1;
            }
            let w = adjacency[v][child_idx];
            match state.index[w] {
                None => work.push((w, 0)),
                Some(w_index) => {
                    if state.on_stack[w] {
                        state.lowlink[v] = state.lowlink[v].min(w_index);
                    }
                }
            }
            continue;
        }

        work.pop();
        if let Some(&(parent, _)) = work.last() {
            state.lowlink[parent] = state.lowlink[parent].min(state.lowlink[v]);
        }
        if state.index[v] == Some(state.lowlink[v]) {
            let mut component = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            state.components.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract;
    use crate::source::SourceFile;

    fn facts_for(path: &str, text: &str) -> FileFacts {
        let sf = SourceFile::parse(Path::new(path), text.to_string()).unwrap();
        extract::extract(&sf)
    }

    #[test]
    fn upsert_is_hash_gated() {
        let store = SymbolStore::in_memory().unwrap();
        let facts = facts_for("a.can", "variables {\n  int gA;\n}\n");
        let first = store.upsert(&facts).unwrap();
        assert!(first.changed);
        assert!(first.symbols_added > 0);

        let second = store.upsert(&facts).unwrap();
        assert!(!second.changed);
        assert_eq!(second.symbols_added, 0);
    }

    #[test]
    fn content_change_replaces_facts() {
        let store = SymbolStore::in_memory().unwrap();
        store
            .upsert(&facts_for("a.can", "variables {\n  int gOld;\n}\n"))
            .unwrap();
        store
            .upsert(&facts_for("a.can", "variables {\n  int gNew;\n}\n"))
            .unwrap();

        let names: Vec<String> = store
            .symbols_in(Path::new("a.can"))
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert!(names.contains(&"gNew".to_string()));
        assert!(!names.contains(&"gOld".to_string()));
    }

    #[test]
    fn visibility_is_transitive() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a.can");
        let b = tmp.path().join("b.cin");
        let c = tmp.path().join("c.cin");
        std::fs::write(&a, "#include \"b.cin\"\n").unwrap();
        std::fs::write(&b, "#include \"c.cin\"\n").unwrap();
        std::fs::write(&c, "variables {\n  int gDeep;\n}\n").unwrap();

        let store = SymbolStore::in_memory().unwrap();
        for path in [&c, &b, &a] {
            let text = std::fs::read_to_string(path).unwrap();
            store
                .upsert(&facts_for(path.to_str().unwrap(), &text))
                .unwrap();
        }

        let visible = store.visible_symbols(&a).unwrap();
        assert!(
            visible.iter().any(|s| s.name == "gDeep"),
            "a.can should see gDeep through b.cin -> c.cin"
        );
    }

    #[test]
    fn cycles_are_detected_and_harmless() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a.can");
        let b = tmp.path().join("b.can");
        std::fs::write(&a, "#include \"b.can\"\nvariables {\n  int gA;\n}\n").unwrap();
        std::fs::write(&b, "#include \"a.can\"\nvariables {\n  int gB;\n}\n").unwrap();

        let store = SymbolStore::in_memory().unwrap();
        for path in [&a, &b] {
            let text = std::fs::read_to_string(path).unwrap();
            store
                .upsert(&facts_for(path.to_str().unwrap(), &text))
                .unwrap();
        }
        // Re-upsert a so its include of b resolves now that b is registered.
        let text = format!("{} ", std::fs::read_to_string(&a).unwrap());
        store.upsert(&facts_for(a.to_str().unwrap(), &text)).unwrap();

        let cycles = store.include_cycles().unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 2);

        // Visibility terminates and unions the cycle members.
        let visible = store.visible_symbols(&a).unwrap();
        assert!(visible.iter().any(|s| s.name == "gA"));
        assert!(visible.iter().any(|s| s.name == "gB"));
    }

    #[test]
    fn duplicate_function_definitions_across_files() {
        let store = SymbolStore::in_memory().unwrap();
        store
            .upsert(&facts_for("x.can", "void shared() {\n}\n"))
            .unwrap();
        store
            .upsert(&facts_for("y.can", "void shared() {\n}\nvoid only() {\n}\n"))
            .unwrap();

        let dupes = store.duplicate_functions().unwrap();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].0, "shared");
        assert_eq!(dupes[0].1.len(), 2);
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("aic.db");
        {
            let store = SymbolStore::open(&db_path).unwrap();
            store
                .upsert(&facts_for("a.can", "variables {\n  int gKeep;\n}\n"))
                .unwrap();
        }
        let store = SymbolStore::open(&db_path).unwrap();
        let symbols = store.symbols_in(Path::new("a.can")).unwrap();
        assert!(symbols.iter().any(|s| s.name == "gKeep"));
    }

    #[test]
    fn eviction_removes_all_facts() {
        let store = SymbolStore::in_memory().unwrap();
        store
            .upsert(&facts_for("a.can", "variables {\n  int gA;\n}\n"))
            .unwrap();
        store.evict(Path::new("a.can")).unwrap();
        assert!(store.symbols_in(Path::new("a.can")).unwrap().is_empty());
        assert!(store.file_hash(Path::new("a.can")).unwrap().is_none());
    }
}
