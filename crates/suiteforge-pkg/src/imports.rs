//! Transitive suite import resolution.
//!
//! Starting from the root suite, imports are walked breadth first in
//! declaration order. Each suite name is pinned to one revision; when two
//! importers disagree the importing suite's conflict policy decides. A
//! `latest` upgrade changes which manifest a suite contributes, so the walk
//! restarts from the root until no further upgrade happens. Each upgrade
//! strictly raises the winning revision stamp, so the loop terminates.

use crate::error::{ConflictError, ResolveError};
use crate::fetch::{RevisionStamp, Snapshot, SuiteFetcher};
use crate::loader::ManifestLoader;
use crate::manifest::{ConflictPolicy, ImportLocation, ManifestError, SuiteImport, SuiteManifest};
use crate::transport::FetchError;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A suite admitted into the resolved set.
#[derive(Debug, Clone)]
pub struct ResolvedSuite {
    pub name: String,
    pub manifest: SuiteManifest,
    /// Directory containing the suite's manifest.
    pub root: PathBuf,
    /// Pinned revision, `None` for the root suite.
    pub revision: Option<String>,
    pub stamp: Option<RevisionStamp>,
    /// Location the suite was fetched from, `None` for the root suite.
    pub location: Option<ImportLocation>,
    /// Position in resolution order.
    pub index: usize,
}

/// A directed import edge, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEdge {
    pub importer: String,
    pub imported: String,
    pub revision: String,
}

/// A revision disagreement that was settled without failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictNote {
    pub suite: String,
    pub importer: String,
    pub kept: String,
    pub discarded: String,
    pub policy: ConflictPolicy,
}

impl std::fmt::Display for ConflictNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "suite '{}': kept revision {} over {} requested by '{}' ({})",
            self.suite, self.kept, self.discarded, self.importer, self.policy
        )
    }
}

/// The merged set of suites, in resolution order.
#[derive(Debug, Clone)]
pub struct SuiteSet {
    suites: Vec<ResolvedSuite>,
    by_name: HashMap<String, usize>,
    edges: Vec<ImportEdge>,
    notes: Vec<ConflictNote>,
}

impl SuiteSet {
    pub(crate) fn new(suites: Vec<ResolvedSuite>, edges: Vec<ImportEdge>, notes: Vec<ConflictNote>) -> Self {
        let by_name = suites
            .iter()
            .map(|s| (s.name.clone(), s.index))
            .collect();
        Self {
            suites,
            by_name,
            edges,
            notes,
        }
    }

    /// The suite resolution started from.
    #[must_use]
    pub fn root(&self) -> &ResolvedSuite {
        &self.suites[0]
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResolvedSuite> {
        self.by_name.get(name).map(|&i| &self.suites[i])
    }

    /// Position of a suite in resolution order.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedSuite> {
        self.suites.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.suites.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    #[must_use]
    pub fn edges(&self) -> &[ImportEdge] {
        &self.edges
    }

    #[must_use]
    pub fn notes(&self) -> &[ConflictNote] {
        &self.notes
    }

    /// Suites reachable from `name` through imports, excluding `name` itself.
    #[must_use]
    pub fn visible_from(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            for edge in self.edges.iter().filter(|e| e.importer == current) {
                if edge.imported != name && seen.insert(edge.imported.clone()) {
                    queue.push_back(edge.imported.clone());
                }
            }
        }
        seen
    }
}

/// A fetched and loaded suite revision.
#[derive(Debug, Clone)]
struct Candidate {
    manifest: SuiteManifest,
    snapshot: Snapshot,
    location: ImportLocation,
}

/// Outcome of one revision disagreement that has already been settled.
#[derive(Debug, Default)]
struct Settled {
    winner: String,
    losers: HashSet<String>,
}

/// Per-walk state.
#[derive(Default)]
struct Walk {
    pins: HashMap<String, String>,
    pinned_by: HashMap<String, String>,
    order: Vec<String>,
    edges: Vec<ImportEdge>,
    notes: Vec<ConflictNote>,
}

impl Walk {
    fn note(&mut self, note: ConflictNote) {
        if !self.notes.contains(&note) {
            self.notes.push(note);
        }
    }
}

/// Resolves a root suite and its transitive imports into a [`SuiteSet`].
pub struct ImportResolver<'a> {
    loader: &'a dyn ManifestLoader,
    fetcher: &'a dyn SuiteFetcher,
    policy_override: Option<ConflictPolicy>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(loader: &'a dyn ManifestLoader, fetcher: &'a dyn SuiteFetcher) -> Self {
        Self {
            loader,
            fetcher,
            policy_override: None,
        }
    }

    /// Replace every suite's declared conflict policy.
    #[must_use]
    pub fn with_policy_override(mut self, policy: Option<ConflictPolicy>) -> Self {
        self.policy_override = policy;
        self
    }

    /// Load the root suite from `root_dir` and resolve its imports.
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest is invalid, an import cannot be fetched
    /// from any location, or two revisions conflict under the strict policy.
    pub fn resolve(&self, root_dir: &Path) -> Result<SuiteSet, ResolveError> {
        let root = self.loader.load_suite(root_dir)?;
        info!(suite = root.name(), "resolving imports");

        let mut candidates: HashMap<(String, String), Candidate> = HashMap::new();
        let mut preferred: HashMap<String, String> = HashMap::new();
        let mut settled: HashMap<String, Settled> = HashMap::new();

        let mut rounds = 0;
        let walk = loop {
            rounds += 1;
            match self.walk(&root, &mut candidates, &preferred, &mut settled)? {
                Some(walk) => break walk,
                None => {
                    for (name, outcome) in &settled {
                        preferred.insert(name.clone(), outcome.winner.clone());
                    }
                    debug!(rounds, "revision upgraded, restarting import walk");
                }
            }
        };

        let mut suites = Vec::with_capacity(walk.order.len());
        suites.push(ResolvedSuite {
            name: root.name().to_string(),
            manifest: root.clone(),
            root: root_dir.to_path_buf(),
            revision: None,
            stamp: None,
            location: None,
            index: 0,
        });
        for name in walk.order.iter().skip(1) {
            let revision = &walk.pins[name];
            let candidate = &candidates[&(name.clone(), revision.clone())];
            suites.push(ResolvedSuite {
                name: name.clone(),
                manifest: candidate.manifest.clone(),
                root: candidate.snapshot.path.clone(),
                revision: Some(revision.clone()),
                stamp: Some(candidate.snapshot.stamp.clone()),
                location: Some(candidate.location.clone()),
                index: suites.len(),
            });
        }

        info!(suites = suites.len(), rounds, "imports resolved");
        Ok(SuiteSet::new(suites, walk.edges, walk.notes))
    }

    /// One breadth-first pass. Returns `None` when a `latest` upgrade
    /// requires another pass.
    fn walk(
        &self,
        root: &SuiteManifest,
        candidates: &mut HashMap<(String, String), Candidate>,
        preferred: &HashMap<String, String>,
        settled: &mut HashMap<String, Settled>,
    ) -> Result<Option<Walk>, ResolveError> {
        let root_name = root.name().to_string();
        let mut walk = Walk::default();
        walk.order.push(root_name.clone());
        let mut queue = VecDeque::from([root_name.clone()]);

        while let Some(importer) = queue.pop_front() {
            let (imports, declared) = if importer == root_name {
                (root.imports.clone(), root.suite.conflict_resolution)
            } else {
                let key = (importer.clone(), walk.pins[&importer].clone());
                let manifest = &candidates[&key].manifest;
                (manifest.imports.clone(), manifest.suite.conflict_resolution)
            };
            let policy = self
                .policy_override
                .or(declared)
                .or(root.suite.conflict_resolution)
                .unwrap_or_default();

            for import in &imports {
                walk.edges.push(ImportEdge {
                    importer: importer.clone(),
                    imported: import.name.clone(),
                    revision: import.revision.clone(),
                });

                if import.name == root_name {
                    walk.note(ConflictNote {
                        suite: root_name.clone(),
                        importer: importer.clone(),
                        kept: "(root checkout)".to_string(),
                        discarded: import.revision.clone(),
                        policy,
                    });
                    continue;
                }

                let Some(pinned) = walk.pins.get(&import.name).cloned() else {
                    let revision = preferred
                        .get(&import.name)
                        .cloned()
                        .unwrap_or_else(|| import.revision.clone());
                    if revision != import.revision {
                        self.record_settled(&mut walk, settled, import, &importer, &revision, policy);
                    }
                    let pinned_import = SuiteImport {
                        revision: revision.clone(),
                        ..import.clone()
                    };
                    self.candidate(candidates, &pinned_import)?;
                    walk.pins.insert(import.name.clone(), revision);
                    walk.pinned_by.insert(import.name.clone(), importer.clone());
                    walk.order.push(import.name.clone());
                    queue.push_back(import.name.clone());
                    continue;
                };

                if pinned == import.revision {
                    continue;
                }

                let already = settled
                    .get(&import.name)
                    .is_some_and(|s| s.winner == pinned && s.losers.contains(&import.revision));
                if already {
                    self.record_settled(&mut walk, settled, import, &importer, &pinned, policy);
                    continue;
                }

                match policy {
                    ConflictPolicy::Strict => {
                        return Err(ConflictError::SuiteRevision {
                            suite: import.name.clone(),
                            pinned: pinned.clone(),
                            pinned_by: walk.pinned_by[&import.name].clone(),
                            requested: import.revision.clone(),
                            requested_by: importer.clone(),
                        }
                        .into());
                    }
                    ConflictPolicy::Ignore => {
                        warn!(
                            suite = %import.name,
                            kept = %pinned,
                            ignored = %import.revision,
                            "ignoring conflicting import revision"
                        );
                        walk.note(ConflictNote {
                            suite: import.name.clone(),
                            importer: importer.clone(),
                            kept: pinned,
                            discarded: import.revision.clone(),
                            policy,
                        });
                    }
                    ConflictPolicy::Latest => {
                        let pinned_key = (import.name.clone(), pinned.clone());
                        let pinned_stamp = candidates[&pinned_key].snapshot.stamp.clone();
                        let requested_stamp = self.candidate(candidates, import)?.snapshot.stamp.clone();

                        let entry = settled.entry(import.name.clone()).or_default();
                        if requested_stamp > pinned_stamp {
                            info!(
                                suite = %import.name,
                                from = %pinned_stamp,
                                to = %requested_stamp,
                                "upgrading to later revision"
                            );
                            entry.losers.insert(pinned);
                            entry.losers.remove(&import.revision);
                            entry.winner = import.revision.clone();
                            return Ok(None);
                        }
                        entry.winner = pinned.clone();
                        entry.losers.insert(import.revision.clone());
                        walk.note(ConflictNote {
                            suite: import.name.clone(),
                            importer: importer.clone(),
                            kept: pinned,
                            discarded: import.revision.clone(),
                            policy,
                        });
                    }
                }
            }
        }

        Ok(Some(walk))
    }

    fn record_settled(
        &self,
        walk: &mut Walk,
        settled: &HashMap<String, Settled>,
        import: &SuiteImport,
        importer: &str,
        kept: &str,
        policy: ConflictPolicy,
    ) {
        debug!(suite = %import.name, kept, requested = %import.revision, "revision already settled");
        let policy = if settled.contains_key(&import.name) {
            ConflictPolicy::Latest
        } else {
            policy
        };
        walk.note(ConflictNote {
            suite: import.name.clone(),
            importer: importer.to_string(),
            kept: kept.to_string(),
            discarded: import.revision.clone(),
            policy,
        });
    }

    /// Fetch and load one suite revision, trying locations in order.
    fn candidate<'c>(
        &self,
        candidates: &'c mut HashMap<(String, String), Candidate>,
        import: &SuiteImport,
    ) -> Result<&'c Candidate, ResolveError> {
        let key = (import.name.clone(), import.revision.clone());
        if !candidates.contains_key(&key) {
            let loaded = self.fetch_import(import)?;
            candidates.insert(key.clone(), loaded);
        }
        Ok(&candidates[&key])
    }

    fn fetch_import(&self, import: &SuiteImport) -> Result<Candidate, ResolveError> {
        let mut attempts = Vec::new();
        for location in &import.urls {
            let snapshot = match self.fetcher.fetch(location, &import.name, &import.revision) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    debug!(suite = %import.name, url = %location.url, "fetch failed: {err}");
                    attempts.push(format!("{} ({}): {err}", location.url, location.kind));
                    continue;
                }
            };

            let manifest = self.loader.load_suite(&snapshot.path)?;
            if manifest.name() != import.name {
                return Err(ManifestError::NameMismatch {
                    location: location.url.clone(),
                    expected: import.name.clone(),
                    found: manifest.name().to_string(),
                }
                .into());
            }

            debug!(suite = %import.name, revision = %import.revision, url = %location.url, "fetched");
            return Ok(Candidate {
                manifest,
                snapshot,
                location: location.clone(),
            });
        }

        Err(FetchError::Exhausted {
            what: format!("suite '{}' at revision {}", import.name, import.revision),
            attempts,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::LocationKind;
    use std::sync::Mutex;

    /// Serves manifests from memory, keyed by directory path.
    #[derive(Default)]
    struct MemoryLoader {
        suites: HashMap<PathBuf, String>,
    }

    impl MemoryLoader {
        fn add(&mut self, path: &str, toml: &str) {
            self.suites.insert(PathBuf::from(path), toml.to_string());
        }
    }

    impl ManifestLoader for MemoryLoader {
        fn load_suite(&self, location: &Path) -> Result<SuiteManifest, ManifestError> {
            let toml = self
                .suites
                .get(location)
                .ok_or_else(|| ManifestError::NotFound(location.to_path_buf()))?;
            SuiteManifest::parse(toml)
        }
    }

    /// Resolves `<url>` + `/<suite>/<revision>` to a path; unknown urls fail.
    #[derive(Default)]
    struct MemoryFetcher {
        stamps: HashMap<(String, String), i64>,
        dead: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl SuiteFetcher for MemoryFetcher {
        fn fetch(
            &self,
            location: &ImportLocation,
            suite: &str,
            revision: &str,
        ) -> Result<Snapshot, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}/{suite}/{revision}", location.url));
            if self.dead.contains(&location.url) {
                return Err(FetchError::Network {
                    url: location.url.clone(),
                    reason: "connection refused".into(),
                });
            }
            let stamp = match self.stamps.get(&(suite.to_string(), revision.to_string())) {
                Some(&t) => RevisionStamp::at(revision, t),
                None => RevisionStamp::unknown(revision),
            };
            Ok(Snapshot {
                path: PathBuf::from(format!("/{suite}/{revision}")),
                stamp,
            })
        }
    }

    fn import(name: &str, revision: &str) -> String {
        format!(
            "[[import]]\nname = \"{name}\"\nrevision = \"{revision}\"\nurls = [{{ url = \"mem\", kind = \"git\" }}]\n"
        )
    }

    fn suite(name: &str, policy: Option<&str>, imports: &[(&str, &str)]) -> String {
        let mut toml = format!("[suite]\nname = \"{name}\"\nversion = \"1.0.0\"\n");
        if let Some(policy) = policy {
            toml.push_str(&format!("conflict-resolution = \"{policy}\"\n"));
        }
        for (n, r) in imports {
            toml.push_str(&import(n, r));
        }
        toml
    }

    #[test]
    fn test_breadth_first_order() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", None, &[("b", "1"), ("a", "1")]));
        loader.add("/b/1", &suite("b", None, &[("c", "1")]));
        loader.add("/a/1", &suite("a", None, &[]));
        loader.add("/c/1", &suite("c", None, &[]));
        let fetcher = MemoryFetcher::default();

        let set = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap();
        let names: Vec<_> = set.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["app", "b", "a", "c"]);
        assert_eq!(set.index_of("c"), Some(3));
        assert_eq!(set.get("b").unwrap().revision.as_deref(), Some("1"));
        assert_eq!(
            set.visible_from("app"),
            BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(set.visible_from("b"), BTreeSet::from(["c".to_string()]));
    }

    #[test]
    fn test_diamond_converges() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", None, &[("a", "1"), ("b", "1")]));
        loader.add("/a/1", &suite("a", None, &[("base", "7")]));
        loader.add("/b/1", &suite("b", None, &[("base", "7")]));
        loader.add("/base/7", &suite("base", None, &[]));
        let fetcher = MemoryFetcher::default();

        let set = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.notes().is_empty());
        let fetches = fetcher.calls.lock().unwrap();
        assert_eq!(fetches.iter().filter(|c| c.contains("/base/")).count(), 1);
    }

    #[test]
    fn test_strict_conflict() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", None, &[("a", "1"), ("b", "1")]));
        loader.add("/a/1", &suite("a", None, &[("base", "r1")]));
        loader.add("/b/1", &suite("b", None, &[("base", "r2")]));
        loader.add("/base/r1", &suite("base", None, &[]));
        loader.add("/base/r2", &suite("base", None, &[]));
        let fetcher = MemoryFetcher::default();

        let err = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap_err();
        match err {
            ResolveError::Conflict(ConflictError::SuiteRevision {
                suite,
                pinned_by,
                requested_by,
                ..
            }) => {
                assert_eq!(suite, "base");
                assert_eq!(pinned_by, "a");
                assert_eq!(requested_by, "b");
            }
            other => panic!("expected revision conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_ignore_keeps_first_seen() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", Some("ignore"), &[("a", "1"), ("b", "1")]));
        loader.add("/a/1", &suite("a", None, &[("base", "r1")]));
        loader.add("/b/1", &suite("b", None, &[("base", "r2")]));
        loader.add("/base/r1", &suite("base", None, &[]));
        let fetcher = MemoryFetcher::default();

        let set = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap();
        assert_eq!(set.get("base").unwrap().revision.as_deref(), Some("r1"));
        assert_eq!(set.notes().len(), 1);
        assert_eq!(set.notes()[0].discarded, "r2");
        assert_eq!(set.notes()[0].policy, ConflictPolicy::Ignore);
    }

    #[test]
    fn test_latest_upgrades_and_rewalks() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", Some("latest"), &[("a", "1"), ("b", "1")]));
        loader.add("/a/1", &suite("a", None, &[("base", "old")]));
        loader.add("/b/1", &suite("b", None, &[("base", "new")]));
        loader.add("/base/old", &suite("base", None, &[("legacy", "1")]));
        loader.add("/base/new", &suite("base", None, &[]));
        loader.add("/legacy/1", &suite("legacy", None, &[]));
        let mut fetcher = MemoryFetcher::default();
        fetcher.stamps.insert(("base".into(), "old".into()), 100);
        fetcher.stamps.insert(("base".into(), "new".into()), 200);

        let set = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap();
        assert_eq!(set.get("base").unwrap().revision.as_deref(), Some("new"));
        assert!(set.get("legacy").is_none());
        assert_eq!(set.notes().len(), 1);
        assert_eq!(set.notes()[0].kept, "new");
        assert_eq!(set.notes()[0].discarded, "old");
    }

    #[test]
    fn test_latest_keeps_newer_pin() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", Some("latest"), &[("a", "1"), ("b", "1")]));
        loader.add("/a/1", &suite("a", None, &[("base", "new")]));
        loader.add("/b/1", &suite("b", None, &[("base", "old")]));
        loader.add("/base/old", &suite("base", None, &[]));
        loader.add("/base/new", &suite("base", None, &[]));
        let mut fetcher = MemoryFetcher::default();
        fetcher.stamps.insert(("base".into(), "old".into()), 100);
        fetcher.stamps.insert(("base".into(), "new".into()), 200);

        let set = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap();
        assert_eq!(set.get("base").unwrap().revision.as_deref(), Some("new"));
        assert_eq!(set.notes()[0].discarded, "old");
    }

    #[test]
    fn test_override_replaces_declared_policy() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", Some("ignore"), &[("a", "1"), ("b", "1")]));
        loader.add("/a/1", &suite("a", None, &[("base", "r1")]));
        loader.add("/b/1", &suite("b", None, &[("base", "r2")]));
        loader.add("/base/r1", &suite("base", None, &[]));
        loader.add("/base/r2", &suite("base", None, &[]));
        let fetcher = MemoryFetcher::default();

        let err = ImportResolver::new(&loader, &fetcher)
            .with_policy_override(Some(ConflictPolicy::Strict))
            .resolve(Path::new("/root"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::Conflict(_)));
    }

    #[test]
    fn test_root_reimport_is_noted() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", None, &[("a", "1")]));
        loader.add("/a/1", &suite("a", None, &[("app", "ancient")]));
        let fetcher = MemoryFetcher::default();

        let set = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.notes()[0].suite, "app");
        assert_eq!(set.notes()[0].discarded, "ancient");
    }

    #[test]
    fn test_location_fallback_and_exhaustion() {
        let toml = "[suite]\nname = \"app\"\nversion = \"1.0.0\"\n\
            [[import]]\nname = \"a\"\nrevision = \"1\"\n\
            urls = [{ url = \"down\", kind = \"git\" }, { url = \"up\", kind = \"binary\" }]\n";
        let mut loader = MemoryLoader::default();
        loader.add("/root", toml);
        loader.add("/a/1", &suite("a", None, &[]));
        let mut fetcher = MemoryFetcher::default();
        fetcher.dead.insert("down".into());

        let set = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap();
        let a = set.get("a").unwrap();
        assert_eq!(a.location.as_ref().unwrap().kind, LocationKind::Binary);

        fetcher.dead.insert("up".into());
        let err = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap_err();
        match err {
            ResolveError::Fetch(FetchError::Exhausted { attempts, .. }) => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("down (git)"));
            }
            other => panic!("expected exhausted fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_name_mismatch() {
        let mut loader = MemoryLoader::default();
        loader.add("/root", &suite("app", None, &[("a", "1")]));
        loader.add("/a/1", &suite("not-a", None, &[]));
        let fetcher = MemoryFetcher::default();

        let err = ImportResolver::new(&loader, &fetcher)
            .resolve(Path::new("/root"))
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Manifest(ManifestError::NameMismatch { .. })
        ));
    }
}
